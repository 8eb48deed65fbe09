//! Member definitions: variables, functions, options, components and delegations.

use std::{collections::HashSet, fmt, rc::Rc};

use crate::{ll::value::Value, ClassId, Engine, Error};

/// The implementation of a method, proc, constructor, destructor or configuration hook.
///
/// Bodies receive the raw arguments of the call; the arguments bound through the function's
/// [`ArgSpec`] are also available as local variables through [`Engine::var`].
pub type Body = Rc<dyn Fn(&mut Engine, &[Value]) -> Result<Value, Error>>;

/// Visibility of a class member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protection {
    Public,
    Protected,
    Private,
}

impl Protection {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Protected => "protected",
            Self::Private => "private",
        }
    }
}

impl fmt::Display for Protection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Parameter {
    Required(Rc<str>),
    Optional(Rc<str>, Value),
}

/// The argument list of a function.
///
/// # Examples
/// ```
/// use heritage::ArgSpec;
///
/// let args = ArgSpec::parse("x {y 2} args");
/// assert_eq!(args.usage("obj move"), "obj move x ?y? ?arg ...?");
/// assert_eq!(args, ArgSpec::new().required("x").optional("y", "2").rest());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArgSpec {
    parameters: Vec<Parameter>,
    rest: bool,
}

impl ArgSpec {
    /// Creates an empty argument list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses an argument list written the host's way: a list of names, where `{name default}`
    /// pairs declare optional parameters and a final `args` collects the remaining arguments.
    pub fn parse(list: &str) -> Self {
        let words = Value::from(list).to_list();
        let mut spec = Self::new();
        let count = words.len();
        for (i, word) in words.into_iter().enumerate() {
            let parts = word.to_list();
            match parts.as_slice() {
                [name] if i + 1 == count && &*name.as_str() == "args" => spec.rest = true,
                [name] => spec.parameters.push(Parameter::Required(name.to_rc_str())),
                [name, default, ..] => spec
                    .parameters
                    .push(Parameter::Optional(name.to_rc_str(), default.clone())),
                [] => (),
            }
        }
        spec
    }

    /// Adds a required parameter.
    pub fn required(mut self, name: &str) -> Self {
        self.parameters.push(Parameter::Required(Rc::from(name)));
        self
    }

    /// Adds an optional parameter with a default value.
    pub fn optional(mut self, name: &str, default: impl Into<Value>) -> Self {
        self.parameters.push(Parameter::Optional(Rc::from(name), default.into()));
        self
    }

    /// Makes the function accept any number of trailing arguments, collected into `args`.
    pub fn rest(mut self) -> Self {
        self.rest = true;
        self
    }

    /// Returns whether the function takes no arguments at all.
    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty() && !self.rest
    }

    /// Returns the usage line of a command taking these arguments.
    pub fn usage(&self, command: &str) -> String {
        let mut usage = String::from(command);
        for parameter in &self.parameters {
            match parameter {
                Parameter::Required(name) => {
                    usage.push(' ');
                    usage.push_str(name);
                }
                Parameter::Optional(name, _) => {
                    usage.push_str(" ?");
                    usage.push_str(name);
                    usage.push('?');
                }
            }
        }
        if self.rest {
            usage.push_str(" ?arg ...?");
        }
        usage
    }

    /// Binds call arguments to parameter names.
    pub fn bind(&self, command: &str, args: &[Value]) -> Result<Vec<(Rc<str>, Value)>, Error> {
        let required =
            self.parameters.iter().filter(|p| matches!(p, Parameter::Required(_))).count();
        if args.len() < required || (!self.rest && args.len() > self.parameters.len()) {
            return Err(Error::wrong_args(self.usage(command)));
        }
        // Optional parameters are filled left to right with whatever is left over after the
        // required ones.
        let mut spare = args.len().saturating_sub(required);
        let mut args = args.iter();
        let mut bound = Vec::with_capacity(self.parameters.len() + usize::from(self.rest));
        for parameter in &self.parameters {
            match parameter {
                Parameter::Required(name) => {
                    let value = args.next().cloned().unwrap_or_default();
                    bound.push((Rc::clone(name), value));
                }
                Parameter::Optional(name, default) => {
                    let value = if spare > 0 {
                        spare -= 1;
                        args.next().cloned().unwrap_or_default()
                    } else {
                        default.clone()
                    };
                    bound.push((Rc::clone(name), value));
                }
            }
        }
        if self.rest {
            bound.push((Rc::from("args"), Value::list(args.cloned())));
        }
        Ok(bound)
    }
}

impl From<&str> for ArgSpec {
    fn from(list: &str) -> Self {
        Self::parse(list)
    }
}

impl fmt::Display for ArgSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut words: Vec<Value> = self
            .parameters
            .iter()
            .map(|parameter| match parameter {
                Parameter::Required(name) => Value::from(name),
                Parameter::Optional(name, default) => {
                    Value::list([Value::from(name), default.clone()])
                }
            })
            .collect();
        if self.rest {
            words.push(Value::from("args"));
        }
        fmt::Display::fmt(&Value::list(words), f)
    }
}

/// A variable declared in a class.
#[derive(Clone)]
pub struct Variable {
    pub name: Rc<str>,
    pub full_name: Rc<str>,
    pub class: ClassId,
    pub protection: Protection,
    /// The initial value. Instance variables without one start out unset.
    pub init: Option<Value>,
    /// Code run after the variable is changed through `configure`.
    pub config: Option<Body>,
    /// Shared between all instances and stored in the class's namespace.
    pub common: bool,
    /// Holds a component.
    pub component: bool,
    /// One of the variables every class gets automatically, like `this`.
    pub builtin: bool,
}

impl fmt::Debug for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Variable")
            .field("full_name", &self.full_name)
            .field("protection", &self.protection)
            .field("init", &self.init)
            .field("common", &self.common)
            .finish_non_exhaustive()
    }
}

/// What role a function plays in its class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    Method,
    Proc,
    Constructor,
    Destructor,
}

impl FunctionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Method => "method",
            Self::Proc => "proc",
            Self::Constructor => "constructor",
            Self::Destructor => "destructor",
        }
    }
}

/// A method, proc, constructor or destructor declared in a class.
#[derive(Clone)]
pub struct Function {
    pub name: Rc<str>,
    pub full_name: Rc<str>,
    pub class: ClassId,
    pub protection: Protection,
    pub kind: FunctionKind,
    pub args: ArgSpec,
    /// The body. Functions declared without one can be given one later, and fail when called
    /// until then.
    pub body: Option<Body>,
    /// Constructor initialization code, run before base classes are constructed.
    pub init: Option<Body>,
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function")
            .field("full_name", &self.full_name)
            .field("protection", &self.protection)
            .field("kind", &self.kind)
            .field("args", &self.args)
            .field("defined", &self.body.is_some())
            .finish_non_exhaustive()
    }
}

/// Declaration of an option. Options are available in every class kind but plain classes.
///
/// # Examples
/// ```
/// use heritage::OptionSpec;
///
/// let spec = OptionSpec::new("-background").default("white").validate_method("check_color");
/// assert_eq!(&*spec.resource, "background");
/// assert_eq!(&*spec.class_name, "Background");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionSpec {
    /// The name of the option, including its leading dash.
    pub name: Rc<str>,
    pub resource: Rc<str>,
    pub class_name: Rc<str>,
    pub default: Value,
    /// Readonly options can only be set while the object is being created.
    pub readonly: bool,
    /// Method called with the option name and the new value before the value is stored.
    pub validate_method: Option<Rc<str>>,
    /// Method called with the option name and the new value instead of storing it.
    pub configure_method: Option<Rc<str>>,
    /// Variable holding the name of the method to call instead of storing the value. The
    /// variable is read on every `configure`.
    pub configure_method_var: Option<Rc<str>>,
    /// Method called with the option name to compute the value returned by `cget`.
    pub cget_method: Option<Rc<str>>,
}

impl OptionSpec {
    /// Declares an option with the given name. The resource name defaults to the name without
    /// its dash, and the class name to the resource name with its first letter capitalized.
    pub fn new(name: &str) -> Self {
        let resource = name.trim_start_matches('-');
        let mut chars = resource.chars();
        let class_name = match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
            None => String::new(),
        };
        Self {
            name: Rc::from(name),
            resource: Rc::from(resource),
            class_name: Rc::from(class_name),
            default: Value::empty(),
            readonly: false,
            validate_method: None,
            configure_method: None,
            configure_method_var: None,
            cget_method: None,
        }
    }

    pub fn resource(mut self, resource: &str) -> Self {
        self.resource = Rc::from(resource);
        self
    }

    pub fn class_name(mut self, class_name: &str) -> Self {
        self.class_name = Rc::from(class_name);
        self
    }

    pub fn default(mut self, default: impl Into<Value>) -> Self {
        self.default = default.into();
        self
    }

    pub fn readonly(mut self) -> Self {
        self.readonly = true;
        self
    }

    pub fn validate_method(mut self, method: &str) -> Self {
        self.validate_method = Some(Rc::from(method));
        self
    }

    pub fn configure_method(mut self, method: &str) -> Self {
        self.configure_method = Some(Rc::from(method));
        self
    }

    pub fn configure_method_var(mut self, variable: &str) -> Self {
        self.configure_method_var = Some(Rc::from(variable));
        self
    }

    pub fn cget_method(mut self, method: &str) -> Self {
        self.cget_method = Some(Rc::from(method));
        self
    }
}

/// An option declared in a class.
#[derive(Debug, Clone)]
pub struct OptionDef {
    pub class: ClassId,
    pub spec: OptionSpec,
}

/// Declaration of a component.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ComponentSpec {
    /// Delegate every method and option not handled otherwise to the component.
    pub inherit: bool,
    /// Make the component's forwarding method public.
    pub public: bool,
    /// Store the component in a common variable shared by all instances.
    pub common: bool,
}

/// A component declared in a class.
#[derive(Debug, Clone)]
pub struct Component {
    pub name: Rc<str>,
    pub class: ClassId,
    pub spec: ComponentSpec,
}

/// Declaration of a delegated method, proc or option.
///
/// # Examples
/// ```
/// use heritage::DelegationSpec;
///
/// // delegate method * to tail except {wag bark}
/// let spec = DelegationSpec::new("*").to("tail").except(["wag", "bark"]);
/// assert!(spec.is_wildcard());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DelegationSpec {
    /// The delegated name, or `*` for everything not handled otherwise.
    pub name: Rc<str>,
    pub component: Option<Rc<str>>,
    /// The words the name is replaced with when forwarding.
    pub as_target: Vec<Value>,
    /// A pattern the forwarded command is built from, instead of the component and target.
    pub using: Option<Rc<str>>,
    /// Names a wildcard delegation does not cover.
    pub except: HashSet<Rc<str>>,
}

impl DelegationSpec {
    pub fn new(name: &str) -> Self {
        Self { name: Rc::from(name), ..Default::default() }
    }

    pub fn to(mut self, component: &str) -> Self {
        self.component = Some(Rc::from(component));
        self
    }

    /// Forwards the call under a different name. The name may consist of several words.
    pub fn as_target(mut self, target: &str) -> Self {
        self.as_target = Value::from(target).to_list();
        self
    }

    /// Builds the forwarded command from a pattern. The pattern is split into words after
    /// `%c` (component), `%m` (member name), `%n` (object name without namespace), `%s` (object
    /// name), `%t` (class name) and `%%` are substituted.
    pub fn using(mut self, pattern: &str) -> Self {
        self.using = Some(Rc::from(pattern));
        self
    }

    pub fn except<'a>(mut self, names: impl IntoIterator<Item = &'a str>) -> Self {
        self.except.extend(names.into_iter().map(Rc::from));
        self
    }

    pub fn is_wildcard(&self) -> bool {
        &*self.name == "*"
    }
}

/// A delegated method, proc or option declared in a class.
#[derive(Debug, Clone)]
pub struct Delegation {
    pub class: ClassId,
    pub spec: DelegationSpec,
    pub proc: bool,
}

impl Delegation {
    pub fn name(&self) -> &Rc<str> {
        &self.spec.name
    }

    pub fn is_wildcard(&self) -> bool {
        self.spec.is_wildcard()
    }

    /// Returns whether a wildcard delegation excludes `name`.
    pub fn excludes(&self, name: &str) -> bool {
        self.spec.except.contains(name)
    }

    /// Creates the concrete delegation a wildcard resolves to for one particular name.
    pub fn concretize(&self, name: &str) -> Self {
        Self {
            class: self.class,
            spec: DelegationSpec {
                name: Rc::from(name),
                component: self.spec.component.clone(),
                as_target: Vec::new(),
                using: self.spec.using.clone(),
                except: HashSet::new(),
            },
            proc: self.proc,
        }
    }
}
