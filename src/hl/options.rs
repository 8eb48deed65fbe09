//! `configure` and `cget`: reading and writing options and public variables.

use std::rc::Rc;

use tracing::trace;

use super::engine::{Context, Frame};
use crate::{
    ClassId, Delegation, Engine, Error, ErrorKind, HeritageWalk, ObjectId, ObjectState,
    OptionDef, Protection, Value, Variable,
};

/// What `cget` returns for values that cannot be determined.
const UNDEFINED: &str = "<undefined>";

fn is_uninitialized(error: &Error) -> bool {
    matches!(error.kind(), ErrorKind::ComponentNotInitialized { .. })
}

impl Engine {
    fn class_of(&self, object: ObjectId) -> Result<ClassId, Error> {
        Ok(self.object_ref(object)?.class)
    }

    /// Finds the most specific declaration of an option in the hierarchy of a class.
    fn find_option(&self, class: ClassId, name: &str) -> Option<Rc<OptionDef>> {
        HeritageWalk::new(&self.classes, class)
            .find_map(|level| self.classes.get(level.0)?.options.get(name).cloned())
    }

    /// Finds the public instance variable `-name` refers to.
    fn find_public_variable(&self, class: ClassId, name: &str) -> Option<Rc<Variable>> {
        let name = name.strip_prefix('-')?;
        let lookup = self.classes.get(class.0)?.resolve_vars.get(name)?;
        let variable = &lookup.variable;
        (variable.protection == Protection::Public && !variable.common && !variable.builtin)
            .then(|| Rc::clone(variable))
    }

    /// Finds the delegation handling an option, exact delegations taking precedence over
    /// wildcards anywhere in the hierarchy.
    fn find_delegated_option(&self, class: ClassId, name: &str) -> Option<Rc<Delegation>> {
        let levels: Vec<ClassId> = HeritageWalk::new(&self.classes, class).distinct().collect();
        let table = |level: &ClassId| self.classes.get(level.0).map(|c| &c.delegated_options);
        levels
            .iter()
            .find_map(|level| table(level)?.get(name).filter(|d| !d.is_wildcard()).cloned())
            .or_else(|| {
                levels.iter().find_map(|level| {
                    table(level)?.get("*").filter(|d| !d.excludes(name)).cloned()
                })
            })
    }

    /// Resolves the component a delegated option is forwarded to, along with the option name
    /// the component knows it under.
    fn delegated_option_target(
        &self,
        object: ObjectId,
        delegation: &Delegation,
        name: &str,
    ) -> Result<(Value, Value), Error> {
        let component = delegation
            .spec
            .component
            .as_ref()
            .ok_or_else(|| Error::syntax(format!("option \"{name}\" is delegated to nothing")))?;
        let class = self.class_of(object)?;
        let value = self.component_value(class, Some(object), component)?;
        let target =
            delegation.spec.as_target.first().cloned().unwrap_or_else(|| Value::from(name));
        Ok((value, target))
    }

    /// Implements the `configure` built-in. Without arguments, lists every option and public
    /// variable; with one, describes a single one; otherwise sets name/value pairs.
    pub(crate) fn configure_object(
        &mut self,
        object: ObjectId,
        args: &[Value],
    ) -> Result<Value, Error> {
        match args {
            [] => Ok(Value::list(self.configuration(object)?)),
            [name] => self.describe_option(object, &name.as_str()),
            _ => {
                if args.len() % 2 != 0 {
                    let last = &args[args.len() - 1];
                    return Err(Error::syntax(format!("value for \"{last}\" missing")));
                }
                self.configure_pairs(object, args)?;
                Ok(Value::empty())
            }
        }
    }

    fn configure_pairs(&mut self, object: ObjectId, args: &[Value]) -> Result<(), Error> {
        let class = self.class_of(object)?;
        // Names nothing local claims are left for delegated options.
        let mut unparsed = Vec::new();
        for pair in args.chunks_exact(2) {
            let (name, value) = (pair[0].to_rc_str(), &pair[1]);
            if let Some(option) = self.find_option(class, &name) {
                self.set_option(object, &option, value.clone())?;
            } else if let Some(variable) = self.find_public_variable(class, &name) {
                self.set_public_variable(object, &variable, value.clone())?;
            } else {
                unparsed.push((name, value.clone()));
            }
        }
        for (name, value) in unparsed {
            let delegation = self
                .find_delegated_option(class, &name)
                .ok_or_else(|| ErrorKind::UnknownOption { name: name.to_string() })?;
            let (component, target) = self.delegated_option_target(object, &delegation, &name)?;
            trace!(option = %name, %component, "forwarding configure");
            self.invoke(&[component, Value::from("configure"), target, value])?;
        }
        Ok(())
    }

    fn set_option(
        &mut self,
        object: ObjectId,
        option: &OptionDef,
        value: Value,
    ) -> Result<(), Error> {
        let spec = &option.spec;
        if spec.readonly && self.object_ref(object)?.state != ObjectState::Constructing {
            return Err(ErrorKind::ProtectionViolation {
                name: spec.name.to_string(),
                protection: "readonly",
                what: "option",
            }
            .into());
        }
        let name = Value::from(&spec.name);
        if let Some(method) = &spec.validate_method {
            self.call_method(object, method, &[name.clone(), value.clone()])?;
        }
        let configure_method = match &spec.configure_method_var {
            // The variable may change between calls, so it is read every time.
            Some(variable) => {
                let method = self
                    .member_variable(option.class, variable)
                    .ok_or_else(|| Error::not_found("variable", &**variable))
                    .and_then(|variable| self.read_member(Some(object), &variable))?;
                (!method.is_empty()).then(|| method.to_rc_str())
            }
            None => spec.configure_method.clone(),
        };
        match configure_method {
            Some(method) => {
                self.call_method(object, &method, &[name, value])?;
            }
            None => {
                self.object_mut(object)?.options.insert(Rc::clone(&spec.name), value);
            }
        }
        Ok(())
    }

    /// Sets a public variable and runs its configuration code. If the code fails, the variable
    /// gets its previous value back.
    fn set_public_variable(
        &mut self,
        object: ObjectId,
        variable: &Rc<Variable>,
        value: Value,
    ) -> Result<(), Error> {
        let key = (variable.class, Rc::clone(&variable.name));
        let previous = self.object_mut(object)?.slots.insert(key.clone(), Some(value)).flatten();
        let Some(config) = variable.config.clone() else { return Ok(()) };

        let namespace = self.class_ref(variable.class)?.namespace;
        let frame = Frame::call(
            namespace,
            Context { class: variable.class, object: Some(object), function: None },
            Vec::new(),
        );
        if let Err(error) = self.with_frame(frame, |engine| config(engine, &[])) {
            self.object_mut(object)?.slots.insert(key, previous);
            return Err(error.with_context(format!(
                "(error in configuration of public variable \"{}\")",
                variable.full_name
            )));
        }
        Ok(())
    }

    /// Implements the `cget` built-in.
    pub(crate) fn cget(&mut self, object: ObjectId, name: &str) -> Result<Value, Error> {
        let class = self.class_of(object)?;
        if let Some(option) = self.find_option(class, name) {
            if let Some(method) = &option.spec.cget_method {
                return self.call_method(object, method, &[Value::from(name)]);
            }
            let options = &self.object_ref(object)?.options;
            return Ok(options.get(name).cloned().unwrap_or_else(|| Value::from(UNDEFINED)));
        }
        if let Some(variable) = self.find_public_variable(class, name) {
            let slot = self.object_ref(object)?.slots.get(&(variable.class, variable.name.clone()));
            return Ok(slot.cloned().flatten().unwrap_or_else(|| Value::from(UNDEFINED)));
        }
        if let Some(delegation) = self.find_delegated_option(class, name) {
            let (component, target) = match self.delegated_option_target(object, &delegation, name)
            {
                Ok(resolved) => resolved,
                Err(error) if is_uninitialized(&error) => return Ok(Value::from(UNDEFINED)),
                Err(error) => return Err(error),
            };
            return self.invoke(&[component, Value::from("cget"), target]);
        }
        Err(ErrorKind::UnknownOption { name: name.to_owned() }.into())
    }

    /// Implements the `setget` built-in: `cget` with one argument, `configure` with two.
    pub(crate) fn setget(&mut self, object: ObjectId, args: &[Value]) -> Result<Value, Error> {
        match args {
            [name] => self.cget(object, &name.as_str()),
            [name, value] => {
                self.configure_pairs(object, &[name.clone(), value.clone()])?;
                Ok(value.clone())
            }
            _ => Err(Error::wrong_args(format!(
                "{} setget option ?value?",
                self.object_ref(object)?.name
            ))),
        }
    }

    fn variable_tuple(&self, object: ObjectId, variable: &Variable) -> Result<Value, Error> {
        let class = self.class_of(object)?;
        let spelling = self
            .class_ref(class)?
            .resolve_vars
            .get(&*variable.full_name)
            .map(|lookup| Rc::clone(&lookup.least_qualified))
            .unwrap_or_else(|| Rc::clone(&variable.name));
        let current = self
            .object_ref(object)?
            .slots
            .get(&(variable.class, Rc::clone(&variable.name)))
            .cloned()
            .flatten()
            .unwrap_or_else(|| Value::from(UNDEFINED));
        Ok(Value::list([
            Value::from(format!("-{spelling}")),
            variable.init.clone().unwrap_or_default(),
            current,
        ]))
    }

    pub(crate) fn option_tuple(
        &self,
        object: ObjectId,
        option: &OptionDef,
    ) -> Result<Value, Error> {
        let spec = &option.spec;
        let current =
            self.object_ref(object)?.options.get(&spec.name).cloned().unwrap_or_default();
        Ok(Value::list([
            Value::from(&spec.name),
            Value::from(&spec.resource),
            Value::from(&spec.class_name),
            spec.default.clone(),
            current,
        ]))
    }

    /// Describes a delegated option by asking the component about it.
    fn delegated_tuple(
        &mut self,
        object: ObjectId,
        delegation: &Delegation,
        name: &str,
    ) -> Result<Value, Error> {
        let (component, target) = self.delegated_option_target(object, delegation, name)?;
        let answer = self.invoke(&[component, Value::from("configure"), target])?;
        let mut tuple = answer.to_list();
        if let Some(first) = tuple.first_mut() {
            *first = Value::from(name);
        }
        Ok(Value::from(tuple))
    }

    fn describe_option(&mut self, object: ObjectId, name: &str) -> Result<Value, Error> {
        let class = self.class_of(object)?;
        if let Some(option) = self.find_option(class, name) {
            return self.option_tuple(object, &option);
        }
        if let Some(variable) = self.find_public_variable(class, name) {
            return self.variable_tuple(object, &variable);
        }
        if let Some(delegation) = self.find_delegated_option(class, name) {
            return self.delegated_tuple(object, &delegation, name);
        }
        Err(ErrorKind::UnknownOption { name: name.to_owned() }.into())
    }

    /// Lists the public variables and options of the object's hierarchy, most specific first,
    /// followed by delegated options nothing local overrides.
    fn configuration(&mut self, object: ObjectId) -> Result<Vec<Value>, Error> {
        let class = self.class_of(object)?;
        let levels: Vec<ClassId> = HeritageWalk::new(&self.classes, class).distinct().collect();
        let mut listed: Vec<Rc<str>> = Vec::new();
        let mut tuples = Vec::new();
        for &level in &levels {
            let (variables, options) = {
                let level = self.class_ref(level)?;
                let variables: Vec<Rc<Variable>> = level
                    .variables
                    .values()
                    .filter(|v| v.protection == Protection::Public && !v.common && !v.builtin)
                    .cloned()
                    .collect();
                let options: Vec<Rc<OptionDef>> = level.options.values().cloned().collect();
                (variables, options)
            };
            for variable in variables {
                tuples.push(self.variable_tuple(object, &variable)?);
            }
            for option in options {
                if !listed.contains(&option.spec.name) {
                    listed.push(Rc::clone(&option.spec.name));
                    tuples.push(self.option_tuple(object, &option)?);
                }
            }
        }

        let mut delegations: Vec<Rc<Delegation>> = Vec::new();
        for &level in &levels {
            delegations.extend(self.class_ref(level)?.delegated_options.values().cloned());
        }
        for delegation in delegations.iter().filter(|d| !d.is_wildcard()) {
            let name = Rc::clone(delegation.name());
            if listed.contains(&name) {
                continue;
            }
            listed.push(Rc::clone(&name));
            match self.delegated_tuple(object, delegation, &name) {
                Ok(tuple) => tuples.push(tuple),
                Err(error) if is_uninitialized(&error) => (),
                Err(error) => return Err(error),
            }
        }
        for delegation in delegations.iter().filter(|d| d.is_wildcard()) {
            let component = match self.delegated_option_target(object, delegation, "*") {
                Ok((component, _)) => component,
                Err(error) if is_uninitialized(&error) => continue,
                Err(error) => return Err(error),
            };
            let answer = self.invoke(&[component, Value::from("configure")])?;
            for tuple in answer.to_list() {
                let Some(name) = tuple.to_list().first().map(Value::to_rc_str) else { continue };
                if listed.contains(&name) || delegation.excludes(&name) {
                    continue;
                }
                listed.push(name);
                tuples.push(tuple);
            }
        }
        Ok(tuples)
    }
}
