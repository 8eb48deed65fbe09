//! Defining classes.

use std::{collections::HashSet, rc::Rc};

use tracing::debug;

use crate::{
    ll::namespace::{split_qualified, SEPARATOR},
    ArgSpec, Body, ClassId, ClassKind, Component, ComponentSpec, Delegation, DelegationSpec,
    Engine, Error, ErrorKind, Function, FunctionKind, HeritageWalk, OptionDef, OptionSpec,
    Protection, Value, Variable,
};

/// Adds members to a class.
///
/// Every call is applied immediately and the resolution tables of the class and of every class
/// deriving from it are rebuilt. A call that fails leaves the members added by earlier calls in
/// place.
///
/// # Examples
/// ```
/// use heritage::{ArgSpec, Engine, Protection};
///
/// let mut engine = Engine::new();
/// engine
///     .build_class("Counter")?
///     .variable(Protection::Protected, "count", Some("0"))?
///     .method(Protection::Public, "bump", ArgSpec::new(), |engine, _| {
///         let count: i64 = engine.var("count")?.as_str().parse().unwrap_or(0);
///         engine.set_var("count", count + 1)
///     })?;
/// engine.call(["Counter", "c"])?;
/// assert_eq!(engine.call(["c", "bump"])?.to_string(), "1");
/// # Ok::<(), heritage::Error>(())
/// ```
pub struct ClassBuilder<'e> {
    engine: &'e mut Engine,
    class: ClassId,
}

fn body<F>(f: F) -> Body
where
    F: Fn(&mut Engine, &[Value]) -> Result<Value, Error> + 'static,
{
    Rc::new(f)
}

fn check_member_name(name: &str) -> Result<(), Error> {
    if name.is_empty() || name.contains(SEPARATOR) {
        return Err(ErrorKind::InvalidName {
            name: name.to_owned(),
            reason: "member names must be simple",
        }
        .into());
    }
    Ok(())
}

impl Engine {
    /// Creates a plain class and returns a builder for defining its members.
    pub fn build_class(&mut self, name: &str) -> Result<ClassBuilder<'_>, Error> {
        self.build_class_of_kind(ClassKind::Class, name)
    }

    /// Creates a class of a particular kind and returns a builder for defining its members.
    pub fn build_class_of_kind(
        &mut self,
        kind: ClassKind,
        name: &str,
    ) -> Result<ClassBuilder<'_>, Error> {
        let class = self.create_class(name, kind)?;
        Ok(ClassBuilder { engine: self, class })
    }

    /// Returns a builder for adding members to an existing class.
    pub fn class_builder(&mut self, name: &str) -> Result<ClassBuilder<'_>, Error> {
        let class = self.find_class(name)?;
        Ok(self.class_builder_for(class))
    }

    pub(crate) fn class_builder_for(&mut self, class: ClassId) -> ClassBuilder<'_> {
        ClassBuilder { engine: self, class }
    }

    /// Splits `Class::member` into the class and the member name.
    fn member_of(&mut self, name: &str, what: &str) -> Result<(ClassId, Rc<str>), Error> {
        let (Some(head), tail) = split_qualified(name) else {
            return Err(Error::syntax(format!(
                "missing class specifier for {what} declaration \"{name}\""
            )));
        };
        let head = if head.is_empty() { SEPARATOR } else { head };
        Ok((self.find_class(head)?, Rc::from(tail)))
    }

    /// Gives a method or proc declared without a body its implementation, or replaces the
    /// implementation of one that has a body. If `args` is given, it must match the declared
    /// argument list.
    ///
    /// `name` is qualified with the class, as in `Counter::bump`.
    pub fn define_body<F>(&mut self, name: &str, args: Option<ArgSpec>, f: F) -> Result<(), Error>
    where
        F: Fn(&mut Engine, &[Value]) -> Result<Value, Error> + 'static,
    {
        let (class, member) = self.member_of(name, "body")?;
        let function = self
            .class_ref(class)?
            .functions
            .get(&member)
            .cloned()
            .ok_or_else(|| Error::not_found("function", name))?;
        if let Some(args) = args {
            if args != function.args {
                return Err(Error::syntax(format!(
                    "argument list changed for function \"{}\": should be \"{}\"",
                    function.full_name, function.args
                )));
            }
        }
        let mut function = (*function).clone();
        function.body = Some(body(f));
        self.class_mut(class)?.functions.insert(member, Rc::new(function));
        self.rebuild_virtual_tables(class)
    }

    /// Replaces the configuration code of a public variable. `name` is qualified with the
    /// class, as in `Window::title`.
    pub fn define_config_body<F>(&mut self, name: &str, f: F) -> Result<(), Error>
    where
        F: Fn(&mut Engine, &[Value]) -> Result<Value, Error> + 'static,
    {
        let (class, member) = self.member_of(name, "configbody")?;
        let variable = self
            .class_ref(class)?
            .variables
            .get(&member)
            .cloned()
            .ok_or_else(|| Error::not_found("variable", name))?;
        if variable.protection != Protection::Public || variable.common {
            return Err(Error::syntax(format!(
                "option \"-{}\" is not a public configuration option",
                variable.name
            )));
        }
        let mut variable = (*variable).clone();
        variable.config = Some(body(f));
        self.class_mut(class)?.variables.insert(member, Rc::new(variable));
        self.rebuild_virtual_tables(class)
    }

    /// Recomputes the heritage sets of a class and every class deriving from it.
    fn recompute_heritage(&mut self, class: ClassId) -> Result<(), Error> {
        let mut pending = vec![class];
        while let Some(class) = pending.pop() {
            let heritage: HashSet<ClassId> = HeritageWalk::new(&self.classes, class).collect();
            let class = self.class_mut(class)?;
            class.heritage = heritage;
            pending.extend(class.derived.iter().copied());
        }
        Ok(())
    }
}

impl<'e> ClassBuilder<'e> {
    /// Returns the ID of the class being built.
    pub fn id(&self) -> ClassId {
        self.class
    }

    fn full_name(&self, member: &str) -> Result<Rc<str>, Error> {
        Ok(Rc::from(format!("{}::{member}", self.engine.class_ref(self.class)?.full_name)))
    }

    fn duplicate(&self, what: &'static str, name: &str) -> Error {
        let scope = self.engine.class(self.class).map(|class| class.scope_description());
        ErrorKind::DuplicateDefinition { what, name: name.to_owned(), scope }.into()
    }

    fn require_options(&self, what: &str) -> Result<(), Error> {
        let class = self.engine.class_ref(self.class)?;
        if !class.kind.supports_options() {
            return Err(Error::syntax(format!(
                "{what} cannot be declared in {}",
                class.scope_description()
            )));
        }
        Ok(())
    }

    fn finish(self) -> Result<Self, Error> {
        self.engine.rebuild_virtual_tables(self.class)?;
        Ok(self)
    }

    /// Declares the base classes. A class can only declare its bases once.
    pub fn inherit(self, bases: &[&str]) -> Result<Self, Error> {
        let (kind, declared, scope) = {
            let class = self.engine.class_ref(self.class)?;
            (class.kind, class.inherit_declared, class.scope_description())
        };
        if declared {
            return Err(Error::syntax(format!("inheritance already defined for {scope}")));
        }
        if !kind.supports_inheritance() {
            return Err(Error::syntax(format!("{scope} cannot inherit from other classes")));
        }

        let mut resolved: Vec<ClassId> = Vec::with_capacity(bases.len());
        for &base in bases {
            let id = self.engine.find_class(base)?;
            if id == self.class {
                return Err(Error::syntax(format!("{scope} cannot inherit from itself")));
            }
            if resolved.contains(&id) {
                return Err(Error::syntax(format!(
                    "class \"{base}\" cannot be inherited more than once"
                )));
            }
            if self.engine.class_ref(id)?.is_a(self.class) {
                return Err(Error::syntax(format!(
                    "class \"{base}\" cannot be inherited by {scope}: it derives from it"
                )));
            }
            resolved.push(id);
        }

        for &base in &resolved {
            self.engine.class_mut(base)?.derived.push(self.class);
        }
        let class = self.engine.class_mut(self.class)?;
        class.bases = resolved;
        class.inherit_declared = true;
        self.engine.recompute_heritage(self.class)?;
        debug!(class = %scope, ?bases, "declared bases");
        self.finish()
    }

    fn function(
        self,
        kind: FunctionKind,
        protection: Protection,
        name: &str,
        args: ArgSpec,
        body: Option<Body>,
        init: Option<Body>,
    ) -> Result<Self, Error> {
        check_member_name(name)?;
        if self.engine.class_ref(self.class)?.functions.contains(name) {
            return Err(self.duplicate(kind.as_str(), name));
        }
        let function = Function {
            name: Rc::from(name),
            full_name: self.full_name(name)?,
            class: self.class,
            protection,
            kind,
            args,
            body,
            init,
        };
        let class = self.engine.class_mut(self.class)?;
        class.functions.insert(Rc::clone(&function.name), Rc::new(function));
        self.finish()
    }

    pub fn constructor<F>(self, args: impl Into<ArgSpec>, f: F) -> Result<Self, Error>
    where
        F: Fn(&mut Engine, &[Value]) -> Result<Value, Error> + 'static,
    {
        let (args, f) = (args.into(), Some(body(f)));
        self.function(FunctionKind::Constructor, Protection::Public, "constructor", args, f, None)
    }

    /// Declares a constructor with initialization code, which runs before the bases are
    /// constructed. Bases constructed from the initialization code with
    /// [`Engine::construct_base`] or [`Engine::chain`] receive the arguments given there.
    pub fn constructor_with_init<I, F>(
        self,
        args: impl Into<ArgSpec>,
        init: I,
        f: F,
    ) -> Result<Self, Error>
    where
        I: Fn(&mut Engine, &[Value]) -> Result<Value, Error> + 'static,
        F: Fn(&mut Engine, &[Value]) -> Result<Value, Error> + 'static,
    {
        let (args, init, f) = (args.into(), Some(body(init)), Some(body(f)));
        self.function(FunctionKind::Constructor, Protection::Public, "constructor", args, f, init)
    }

    pub fn destructor<F>(self, f: F) -> Result<Self, Error>
    where
        F: Fn(&mut Engine, &[Value]) -> Result<Value, Error> + 'static,
    {
        let (args, f) = (ArgSpec::new(), Some(body(f)));
        self.function(FunctionKind::Destructor, Protection::Public, "destructor", args, f, None)
    }

    pub fn method<F>(
        self,
        protection: Protection,
        name: &str,
        args: impl Into<ArgSpec>,
        f: F,
    ) -> Result<Self, Error>
    where
        F: Fn(&mut Engine, &[Value]) -> Result<Value, Error> + 'static,
    {
        let args = args.into();
        self.function(FunctionKind::Method, protection, name, args, Some(body(f)), None)
    }

    /// Declares a method without an implementation. Calling it fails until it is given one
    /// through [`Engine::define_body`].
    pub fn method_stub(
        self,
        protection: Protection,
        name: &str,
        args: impl Into<ArgSpec>,
    ) -> Result<Self, Error> {
        self.function(FunctionKind::Method, protection, name, args.into(), None, None)
    }

    /// Declares a proc: a function that runs without an object.
    pub fn proc<F>(
        self,
        protection: Protection,
        name: &str,
        args: impl Into<ArgSpec>,
        f: F,
    ) -> Result<Self, Error>
    where
        F: Fn(&mut Engine, &[Value]) -> Result<Value, Error> + 'static,
    {
        let args = args.into();
        self.function(FunctionKind::Proc, protection, name, args, Some(body(f)), None)
    }

    fn add_variable(self, variable: Variable) -> Result<Self, Error> {
        check_member_name(&variable.name)?;
        if self.engine.class_ref(self.class)?.variables.contains(&variable.name) {
            return Err(self.duplicate("variable", &variable.name));
        }
        if variable.common {
            if let Some(init) = &variable.init {
                let namespace = self.engine.class_ref(self.class)?.namespace;
                self.engine.namespaces.set_variable(namespace, &variable.name, init.clone());
            }
        }
        let class = self.engine.class_mut(self.class)?;
        class.variables.insert(Rc::clone(&variable.name), Rc::new(variable));
        self.finish()
    }

    fn new_variable(
        &self,
        protection: Protection,
        name: &str,
        init: Option<&str>,
    ) -> Result<Variable, Error> {
        Ok(Variable {
            name: Rc::from(name),
            full_name: self.full_name(name)?,
            class: self.class,
            protection,
            init: init.map(Value::from),
            config: None,
            common: false,
            component: false,
            builtin: false,
        })
    }

    /// Declares an instance variable. Variables without an initial value start out unset.
    pub fn variable(
        self,
        protection: Protection,
        name: &str,
        init: Option<&str>,
    ) -> Result<Self, Error> {
        let variable = self.new_variable(protection, name, init)?;
        self.add_variable(variable)
    }

    /// Declares a public instance variable with code that runs whenever the variable is
    /// changed through `configure`.
    pub fn variable_with_config<F>(
        self,
        name: &str,
        init: Option<&str>,
        config: F,
    ) -> Result<Self, Error>
    where
        F: Fn(&mut Engine, &[Value]) -> Result<Value, Error> + 'static,
    {
        let mut variable = self.new_variable(Protection::Public, name, init)?;
        variable.config = Some(body(config));
        self.add_variable(variable)
    }

    /// Declares a variable shared by all instances of the class.
    pub fn common(
        self,
        protection: Protection,
        name: &str,
        init: Option<&str>,
    ) -> Result<Self, Error> {
        let mut variable = self.new_variable(protection, name, init)?;
        variable.common = true;
        self.add_variable(variable)
    }

    pub fn option(self, spec: OptionSpec) -> Result<Self, Error> {
        self.require_options("options")?;
        if !spec.name.starts_with('-') || spec.name.len() < 2 {
            return Err(Error::syntax(format!(
                "bad option name \"{}\": options must start with \"-\"",
                spec.name
            )));
        }
        let class = self.engine.class_ref(self.class)?;
        if class.options.contains(&spec.name) || class.delegated_options.contains(&spec.name) {
            return Err(self.duplicate("option", &spec.name));
        }
        let name = Rc::clone(&spec.name);
        let option = OptionDef { class: self.class, spec };
        self.engine.class_mut(self.class)?.options.insert(name, Rc::new(option));
        self.finish()
    }

    /// Declares a component: a variable holding the name of an object that calls can be
    /// delegated to, and a method of the same name forwarding to it.
    pub fn component(self, name: &str, spec: ComponentSpec) -> Result<Self, Error> {
        self.require_options("components")?;
        if self.engine.class_ref(self.class)?.components.contains(name) {
            return Err(self.duplicate("component", name));
        }
        let mut variable = self.new_variable(Protection::Protected, name, None)?;
        variable.common = spec.common;
        variable.component = true;
        let mut builder = self.add_variable(variable)?;

        let component = Component { name: Rc::from(name), class: builder.class, spec };
        builder
            .engine
            .class_mut(builder.class)?
            .components
            .insert(Rc::clone(&component.name), Rc::new(component));

        let protection = if spec.public { Protection::Public } else { Protection::Protected };
        let variable: Rc<str> = Rc::from(name);
        builder = builder.method(protection, name, ArgSpec::new().rest(), move |engine, args| {
            let target = engine.var(&variable).unwrap_or_default();
            if target.is_empty() {
                return Err(ErrorKind::ComponentNotInitialized {
                    component: variable.to_string(),
                    object: engine.this()?.to_string(),
                }
                .into());
            }
            let mut argv = vec![target];
            argv.extend_from_slice(args);
            engine.invoke(&argv)
        })?;

        if spec.inherit {
            let class = builder.engine.class_ref(builder.class)?;
            let wildcard_methods = class.delegated_methods.contains("*");
            let wildcard_options = class.delegated_options.contains("*");
            if !wildcard_methods {
                builder = builder.delegate_method(DelegationSpec::new("*").to(name))?;
            }
            if !wildcard_options {
                builder = builder.delegate_option(DelegationSpec::new("*").to(name))?;
            }
        }
        Ok(builder)
    }

    fn check_delegation(&self, spec: &DelegationSpec, what: &str) -> Result<(), Error> {
        self.require_options("delegations")?;
        if spec.is_wildcard() && !spec.as_target.is_empty() {
            return Err(Error::syntax(format!("cannot delegate {what} \"*\" with \"as\"")));
        }
        if !spec.is_wildcard() && !spec.except.is_empty() {
            return Err(Error::syntax(format!(
                "cannot delegate {what} \"{}\" with \"except\": only \"*\" has exceptions",
                spec.name
            )));
        }
        match &spec.component {
            Some(component) => {
                let known = HeritageWalk::new(&self.engine.classes, self.class).any(|class| {
                    self.engine
                        .class(class)
                        .map_or(false, |class| class.components.contains(component))
                });
                if !known {
                    return Err(Error::not_found("component", &**component));
                }
            }
            None if spec.using.is_none() => {
                return Err(Error::syntax(format!(
                    "delegated {what} \"{}\" needs a component or a \"using\" pattern",
                    spec.name
                )));
            }
            None => (),
        }
        Ok(())
    }

    fn add_delegated_function(self, spec: DelegationSpec, proc: bool) -> Result<Self, Error> {
        let what = if proc { "proc" } else { "method" };
        self.check_delegation(&spec, what)?;
        check_member_name(&spec.name)?;
        let class = self.engine.class_ref(self.class)?;
        if class.delegations(proc).contains(&spec.name) {
            let kind = if proc { "delegated proc" } else { "delegated method" };
            return Err(self.duplicate(kind, &spec.name));
        }
        if class.functions.contains(&spec.name) {
            return Err(self.duplicate(what, &spec.name));
        }
        let name = Rc::clone(&spec.name);
        let delegation = Delegation { class: self.class, spec, proc };
        let class = self.engine.class_mut(self.class)?;
        let table = if proc { &mut class.delegated_procs } else { &mut class.delegated_methods };
        table.insert(name, Rc::new(delegation));
        self.finish()
    }

    /// Delegates a method, or with the name `*` every method not handled otherwise, to a
    /// component.
    pub fn delegate_method(self, spec: DelegationSpec) -> Result<Self, Error> {
        self.add_delegated_function(spec, false)
    }

    /// Delegates a proc to a common component.
    pub fn delegate_proc(self, spec: DelegationSpec) -> Result<Self, Error> {
        if let Some(component) = &spec.component {
            let common = HeritageWalk::new(&self.engine.classes, self.class).any(|class| {
                self.engine
                    .class(class)
                    .and_then(|class| class.components.get(component))
                    .map_or(false, |component| component.spec.common)
            });
            if !common {
                return Err(Error::syntax(format!(
                    "procs can only be delegated to common components, \"{component}\" is not one"
                )));
            }
        }
        self.add_delegated_function(spec, true)
    }

    /// Delegates an option, or with the name `*` every option not declared otherwise, to a
    /// component.
    pub fn delegate_option(self, spec: DelegationSpec) -> Result<Self, Error> {
        self.check_delegation(&spec, "option")?;
        if !spec.is_wildcard() && !spec.name.starts_with('-') {
            return Err(Error::syntax(format!(
                "bad option name \"{}\": options must start with \"-\"",
                spec.name
            )));
        }
        let class = self.engine.class_ref(self.class)?;
        if class.delegated_options.contains(&spec.name) || class.options.contains(&spec.name) {
            return Err(self.duplicate("option", &spec.name));
        }
        let name = Rc::clone(&spec.name);
        let delegation = Delegation { class: self.class, spec, proc: false };
        self.engine.class_mut(self.class)?.delegated_options.insert(name, Rc::new(delegation));
        self.finish()
    }
}
