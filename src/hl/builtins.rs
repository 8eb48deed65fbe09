//! Methods every object has without declaring them.

use std::rc::Rc;

use crate::{
    ClassId, ClassKind, Delegation, Engine, Error, ErrorKind, HeritageWalk, ObjectId, Value,
};

/// A built-in method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Configure,
    Cget,
    /// `cget` and `configure` in one; only objects of classes with options have it.
    Setget,
    Isa,
    Info,
}

const INFO_SUBCOMMANDS: &[&str] =
    &["class", "component", "delegated", "function", "heritage", "inherit", "option", "variable"];

impl Builtin {
    pub const ALL: [Builtin; 5] =
        [Builtin::Configure, Builtin::Cget, Builtin::Setget, Builtin::Isa, Builtin::Info];

    pub fn lookup(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|builtin| builtin.as_str() == name)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Configure => "configure",
            Self::Cget => "cget",
            Self::Setget => "setget",
            Self::Isa => "isa",
            Self::Info => "info",
        }
    }

    /// Returns whether objects of a class of the given kind have this method.
    pub fn is_available(self, kind: ClassKind) -> bool {
        match self {
            Self::Setget => kind.supports_options(),
            _ => true,
        }
    }
}

fn names<'a>(names: impl IntoIterator<Item = &'a Rc<str>>) -> Value {
    Value::list(names.into_iter().map(Value::from))
}

impl Engine {
    /// Runs a built-in method. `argv[0]` is the object's command and `argv[1]` the method.
    pub(crate) fn call_builtin(
        &mut self,
        object: ObjectId,
        builtin: Builtin,
        argv: &[Value],
    ) -> Result<Value, Error> {
        let args = argv.get(2..).unwrap_or_default();
        match builtin {
            Builtin::Configure => self.configure_object(object, args),
            Builtin::Cget => match args {
                [name] => self.cget(object, &name.as_str()),
                _ => Err(Error::wrong_args(format!("{} cget option", argv[0]))),
            },
            Builtin::Setget => self.setget(object, args),
            Builtin::Isa => match args {
                [class] => {
                    let class = self.find_class(&class.as_str())?;
                    Ok(Value::from(self.class_ref(self.object_ref(object)?.class)?.is_a(class)))
                }
                _ => Err(Error::wrong_args(format!("{} isa className", argv[0]))),
            },
            Builtin::Info => self.info(object, &argv[0], args),
        }
    }

    /// The class `info` describes: the class of the running body if it runs on this object,
    /// otherwise the object's most specific class.
    fn info_class(&self, object: ObjectId) -> Result<ClassId, Error> {
        match self.current_context() {
            Some(context) if context.object == Some(object) => Ok(context.class),
            _ => Ok(self.object_ref(object)?.class),
        }
    }

    fn info(&mut self, object: ObjectId, command: &Value, args: &[Value]) -> Result<Value, Error> {
        let Some((subcommand, args)) = args.split_first() else {
            return Err(Error::wrong_args(format!("{command} info option ?arg ...?")));
        };
        let class = self.info_class(object)?;
        let levels: Vec<ClassId> = HeritageWalk::new(&self.classes, class).distinct().collect();
        let usage = |rest: &str| Error::wrong_args(format!("{command} info {subcommand}{rest}"));

        match (&*subcommand.as_str(), args) {
            ("class", []) => {
                let class = self.object_ref(object)?.class;
                Ok(Value::from(self.class_name(class)?))
            }
            ("inherit", []) => {
                let bases = &self.class_ref(class)?.bases;
                let bases: Vec<Rc<str>> =
                    bases.iter().map(|&base| self.class_name(base)).collect::<Result<_, _>>()?;
                Ok(names(&bases))
            }
            ("heritage", []) => {
                let heritage: Vec<Rc<str>> =
                    levels.iter().map(|&level| self.class_name(level)).collect::<Result<_, _>>()?;
                Ok(names(&heritage))
            }
            ("variable", []) => {
                let mut all = Vec::new();
                for &level in &levels {
                    let level = self.class_ref(level)?;
                    all.extend(level.variables.values().map(|v| Rc::clone(&v.full_name)));
                }
                Ok(names(&all))
            }
            ("variable", [name]) => {
                let variable = self
                    .class_ref(class)?
                    .resolve_vars
                    .get(&*name.as_str())
                    .map(|lookup| Rc::clone(&lookup.variable))
                    .ok_or_else(|| Error::not_found("variable", &*name.as_str()))?;
                let current = self
                    .read_member(Some(object), &variable)
                    .unwrap_or_else(|_| Value::from("<undefined>"));
                Ok(Value::list([
                    Value::from(variable.protection.as_str()),
                    Value::from(if variable.common { "common" } else { "variable" }),
                    Value::from(&variable.full_name),
                    variable.init.clone().unwrap_or_default(),
                    current,
                ]))
            }
            ("variable", _) => Err(usage(" ?name?")),
            ("function", []) => {
                let mut all = Vec::new();
                for &level in &levels {
                    let level = self.class_ref(level)?;
                    all.extend(level.functions.values().map(|f| Rc::clone(&f.full_name)));
                }
                Ok(names(&all))
            }
            ("function", [name]) => {
                let class = self.class_ref(class)?;
                let function = match &*name.as_str() {
                    "constructor" => class.constructor().cloned(),
                    "destructor" => class.destructor().cloned(),
                    name => class.resolve_cmds.get(name).map(|l| Rc::clone(&l.function)),
                }
                .ok_or_else(|| Error::not_found("function", &*name.as_str()))?;
                Ok(Value::list([
                    Value::from(function.protection.as_str()),
                    Value::from(function.kind.as_str()),
                    Value::from(&function.full_name),
                    Value::from(function.args.to_string()),
                ]))
            }
            ("function", _) => Err(usage(" ?name?")),
            ("option", []) => {
                let mut all: Vec<Rc<str>> = Vec::new();
                for &level in &levels {
                    for name in self.class_ref(level)?.options.names() {
                        if !all.contains(name) {
                            all.push(Rc::clone(name));
                        }
                    }
                }
                Ok(names(&all))
            }
            ("option", [name]) => {
                let option = levels
                    .iter()
                    .find_map(|&level| self.classes.get(level.0)?.options.get(&name.as_str()))
                    .cloned()
                    .ok_or_else(|| ErrorKind::UnknownOption { name: name.to_string() })?;
                self.option_tuple(object, &option)
            }
            ("option", _) => Err(usage(" ?name?")),
            ("component", []) => {
                let mut all = Vec::new();
                for &level in &levels {
                    all.extend(self.class_ref(level)?.components.names().cloned());
                }
                Ok(names(&all))
            }
            ("component", [name]) => {
                let declared = levels.iter().any(|&level| {
                    self.classes
                        .get(level.0)
                        .map_or(false, |c| c.components.contains(&name.as_str()))
                });
                if !declared {
                    return Err(Error::not_found("component", &*name.as_str()));
                }
                let variable = self
                    .member_variable(class, &name.as_str())
                    .ok_or_else(|| Error::not_found("component", &*name.as_str()))?;
                Ok(self.read_member(Some(object), &variable).unwrap_or_default())
            }
            ("component", _) => Err(usage(" ?name?")),
            ("delegated", [what]) => {
                let options = match &*what.as_str() {
                    "method" => false,
                    "option" => true,
                    _ => {
                        return Err(ErrorKind::UnknownSubcommand {
                            name: what.to_string(),
                            candidates: vec![String::from("method"), String::from("option")],
                        }
                        .into())
                    }
                };
                let mut all: Vec<Rc<Delegation>> = Vec::new();
                for &level in &levels {
                    let level = self.class_ref(level)?;
                    let table = if options {
                        &level.delegated_options
                    } else {
                        &level.delegated_methods
                    };
                    all.extend(table.values().cloned());
                }
                Ok(Value::list(all.iter().map(|delegation| {
                    let component = delegation.spec.component.clone().unwrap_or_else(|| "".into());
                    Value::list([Value::from(delegation.name()), Value::from(component)])
                })))
            }
            ("delegated", _) => Err(usage(" method|option")),
            (name, _) if INFO_SUBCOMMANDS.contains(&name) => Err(usage("")),
            (name, _) => Err(ErrorKind::UnknownSubcommand {
                name: name.to_owned(),
                candidates: INFO_SUBCOMMANDS.iter().map(|&c| c.to_owned()).collect(),
            }
            .into()),
        }
    }
}
