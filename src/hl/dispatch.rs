//! Dispatching calls on objects and classes.
//!
//! Resolution and execution are separate steps: [`Engine::resolve_object_call`] and
//! [`Engine::resolve_class_call`] look at the current state of the engine and decide what a call
//! should do, without side effects. Executing the resulting [`Dispatch`] is what runs code.

use std::rc::Rc;

use tracing::trace;

use super::engine::{Context, Frame};
use crate::{
    Builtin, ClassId, Delegation, Engine, Error, ErrorKind, Function, FunctionKind, HeritageWalk,
    ObjectId, Protection, Value,
};

/// A call forwarded to a component.
#[derive(Debug, Clone)]
pub struct Forward {
    /// The command the call is forwarded as.
    pub argv: Vec<Value>,
    /// The leading words of the forwarded command, as they appear in its usage messages.
    pub internal: String,
    /// The leading words of the original call.
    pub visible: String,
    /// A concrete delegation to remember in `class`'s cache for its kind once the forward succeeds.
    pub memoize: Option<(ClassId, Rc<Delegation>)>,
}

/// What a call on an object or class resolves to.
#[derive(Debug, Clone)]
pub enum Dispatch {
    /// A method or proc of the class hierarchy.
    ResolvedLocal(Rc<Function>),
    /// One of the methods every object has.
    Builtin(Builtin),
    /// A delegated call.
    ForwardToComponent(Forward),
    /// Creation of a new object.
    CreateInstance { class: ClassId, name: Value, args: Vec<Value> },
    /// Nothing handles the call.
    Unresolved { name: String, candidates: Vec<String> },
    /// A class invoked without arguments.
    Noop,
}

/// Substitutes the `%` escapes of a `using` pattern.
fn expand_pattern(pattern: &str, substitutions: &[(char, &str)]) -> String {
    let mut expanded = String::with_capacity(pattern.len());
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        if c != '%' {
            expanded.push(c);
            continue;
        }
        match chars.next() {
            Some('%') => expanded.push('%'),
            Some(escape) => match substitutions.iter().find(|(e, _)| *e == escape) {
                Some((_, value)) => expanded.push_str(value),
                None => {
                    expanded.push('%');
                    expanded.push(escape);
                }
            },
            None => expanded.push('%'),
        }
    }
    expanded
}

impl Engine {
    /// Returns whether the current context may call a member with the given protection that
    /// is declared in `class`.
    pub(crate) fn can_access(&self, class: ClassId, protection: Protection) -> bool {
        let caller = self.current_context().map(|c| c.class);
        match (protection, caller) {
            (Protection::Public, _) => true,
            (Protection::Private, caller) => caller == Some(class),
            (Protection::Protected, None) => false,
            (Protection::Protected, Some(caller)) => {
                let related = |a: ClassId, b: ClassId| {
                    self.classes.get(a.0).map_or(false, |class| class.is_a(b))
                };
                related(caller, class) || related(class, caller)
            }
        }
    }

    pub(crate) fn check_access(&self, function: &Function) -> Result<(), Error> {
        if self.can_access(function.class, function.protection) {
            Ok(())
        } else {
            Err(ErrorKind::ProtectionViolation {
                name: function.full_name.to_string(),
                protection: function.protection.as_str(),
                what: "function",
            }
            .into())
        }
    }

    /// Reads the value of a component, as seen from `class`.
    pub(crate) fn component_value(
        &self,
        class: ClassId,
        object: Option<ObjectId>,
        component: &str,
    ) -> Result<Value, Error> {
        let variable = self
            .class_ref(class)?
            .resolve_vars
            .get(component)
            .filter(|lookup| lookup.variable.component)
            .map(|lookup| Rc::clone(&lookup.variable))
            .ok_or_else(|| Error::not_found("component", component))?;
        let value = self.read_member(object, &variable).unwrap_or_default();
        if value.is_empty() {
            let object = match object {
                Some(object) => self.object_ref(object)?.name.to_string(),
                None => self.class_ref(class)?.full_name.to_string(),
            };
            return Err(ErrorKind::ComponentNotInitialized {
                component: component.to_owned(),
                object,
            }
            .into());
        }
        Ok(value)
    }

    /// Finds the delegation handling `member`: an exact delegation anywhere in the hierarchy,
    /// then a memoized one, then a wildcard.
    fn find_delegated_function(
        &self,
        class: ClassId,
        object: Option<ObjectId>,
        member: &str,
        proc: bool,
    ) -> Result<Option<(Rc<Delegation>, bool)>, Error> {
        let levels: Vec<ClassId> = HeritageWalk::new(&self.classes, class).distinct().collect();
        for &level in &levels {
            let delegation = self.class_ref(level)?.delegations(proc).get(member);
            if let Some(delegation) = delegation.filter(|d| !d.is_wildcard()) {
                return Ok(Some((Rc::clone(delegation), false)));
            }
        }
        if let Some(cached) = self.class_ref(class)?.delegation_cache(proc).get(member) {
            return Ok(Some((Rc::clone(cached), false)));
        }
        for &level in &levels {
            let Some(delegation) = self.class_ref(level)?.delegations(proc).get("*") else {
                continue;
            };
            if delegation.excludes(member) {
                let candidates = self.exported_methods(level, object, delegation)?;
                return Err(ErrorKind::UnknownSubcommand { name: member.to_owned(), candidates }
                    .into());
            }
            return Ok(Some((Rc::clone(delegation), true)));
        }
        Ok(None)
    }

    /// Lists the public methods of the object a wildcard delegation forwards to, minus the
    /// ones it excludes.
    fn exported_methods(
        &self,
        class: ClassId,
        object: Option<ObjectId>,
        delegation: &Delegation,
    ) -> Result<Vec<String>, Error> {
        let Some(component) = &delegation.spec.component else { return Ok(Vec::new()) };
        let value = match self.component_value(class, object, component) {
            Ok(value) => value,
            Err(_) => return Ok(Vec::new()),
        };
        let Some(target) = self.lookup_object(&value.as_str()) else { return Ok(Vec::new()) };
        let target_class = self.object_ref(target)?.class;
        let mut methods = self.public_methods(target_class)?;
        methods.retain(|name| !delegation.excludes(name));
        Ok(methods)
    }

    /// Lists the unqualified names of a class's public methods and of the built-in methods,
    /// sorted.
    pub(crate) fn public_methods(&self, class: ClassId) -> Result<Vec<String>, Error> {
        let class = self.class_ref(class)?;
        let mut methods: Vec<String> = class
            .resolve_cmds
            .iter()
            .filter(|(name, lookup)| {
                let function = &lookup.function;
                function.kind == FunctionKind::Method
                    && function.protection == Protection::Public
                    && **name == function.name
            })
            .map(|(name, _)| name.to_string())
            .chain(
                Builtin::ALL
                    .iter()
                    .filter(|b| b.is_available(class.kind))
                    .map(|b| b.as_str().to_owned()),
            )
            .collect();
        methods.sort();
        methods.dedup();
        Ok(methods)
    }

    fn build_forward(
        &self,
        class: ClassId,
        object: Option<ObjectId>,
        delegation: &Rc<Delegation>,
        wildcard: bool,
        argv: &[Value],
    ) -> Result<Forward, Error> {
        let member = argv[1].as_str();
        let spec = &delegation.spec;
        let component = match &spec.component {
            Some(component) => Some(self.component_value(class, object, component)?),
            None => None,
        };
        let words: Vec<Value> = match &spec.using {
            Some(pattern) => {
                let component = component.as_ref().map(Value::to_string).unwrap_or_default();
                let (full_name, tail) = match object {
                    Some(object) => {
                        let object = self.object_ref(object)?;
                        (object.name.to_string(), object.tail.to_string())
                    }
                    None => (String::new(), String::new()),
                };
                let class_name = self.class_ref(class)?.full_name.to_string();
                let expanded = expand_pattern(
                    pattern,
                    &[
                        ('c', component.as_str()),
                        ('m', &*member),
                        ('n', tail.as_str()),
                        ('s', full_name.as_str()),
                        ('t', class_name.as_str()),
                    ],
                );
                Value::from(expanded).to_list()
            }
            None => {
                let mut words: Vec<Value> = component.into_iter().collect();
                if spec.as_target.is_empty() {
                    words.push(argv[1].clone());
                } else {
                    words.extend(spec.as_target.iter().cloned());
                }
                words
            }
        };
        let internal = words.iter().map(|w| w.to_string()).collect::<Vec<_>>().join(" ");
        let visible = format!("{} {member}", argv[0]);
        let memoize = wildcard.then(|| (class, Rc::new(delegation.concretize(&member))));
        let mut forwarded = words;
        forwarded.extend_from_slice(&argv[2..]);
        Ok(Forward { argv: forwarded, internal, visible, memoize })
    }

    /// Forwards a call unchanged to the first initialized component declared with `inherit`.
    /// Calls on the class itself only consider common components.
    fn forward_to_inherited(
        &self,
        class_id: ClassId,
        object: Option<ObjectId>,
        argv: &[Value],
    ) -> Result<Option<Forward>, Error> {
        let levels: Vec<ClassId> = HeritageWalk::new(&self.classes, class_id).distinct().collect();
        for &level in &levels {
            let components = self.class_ref(level)?.components.values();
            for component in components.filter(|c| c.spec.inherit) {
                if object.is_none() && !component.spec.common {
                    continue;
                }
                if let Ok(value) = self.component_value(class_id, object, &component.name) {
                    let mut forwarded = vec![value.clone()];
                    forwarded.extend_from_slice(&argv[1..]);
                    return Ok(Some(Forward {
                        argv: forwarded,
                        internal: value.to_string(),
                        visible: argv[0].to_string(),
                        memoize: None,
                    }));
                }
            }
        }
        Ok(None)
    }

    /// Decides what a call on an object does. `argv[0]` is the object's command and `argv[1]`
    /// the member being called.
    pub fn resolve_object_call(&self, object: ObjectId, argv: &[Value]) -> Result<Dispatch, Error> {
        let Some(member) = argv.get(1).map(|m| m.to_rc_str()) else {
            return Err(Error::wrong_args(format!("{} option ?arg ...?", argv[0])));
        };
        let class_id = self.object_ref(object)?.class;
        let class = self.class_ref(class_id)?;

        if let Some(lookup) = class.resolve_cmds.get(&*member) {
            if lookup.function.kind == FunctionKind::Method {
                self.check_access(&lookup.function)?;
                return Ok(Dispatch::ResolvedLocal(Rc::clone(&lookup.function)));
            }
        }
        if let Some(builtin) = Builtin::lookup(&member).filter(|b| b.is_available(class.kind)) {
            return Ok(Dispatch::Builtin(builtin));
        }

        if let Some(forward) = self.forward_to_inherited(class_id, Some(object), argv)? {
            return Ok(Dispatch::ForwardToComponent(forward));
        }

        match self.find_delegated_function(class_id, Some(object), &member, false)? {
            Some((delegation, wildcard)) => Ok(Dispatch::ForwardToComponent(self.build_forward(
                class_id,
                Some(object),
                &delegation,
                wildcard,
                argv,
            )?)),
            None => Ok(Dispatch::Unresolved {
                name: member.to_string(),
                candidates: self.public_methods(class_id)?,
            }),
        }
    }

    /// Decides what a call on a class does. `argv[0]` is the class's command.
    pub fn resolve_class_call(&self, class_id: ClassId, argv: &[Value]) -> Result<Dispatch, Error> {
        let Some(member) = argv.get(1).map(|m| m.to_rc_str()) else { return Ok(Dispatch::Noop) };
        let class = self.class_ref(class_id)?;

        if let Some(lookup) = class.resolve_cmds.get(&*member) {
            if lookup.function.kind == FunctionKind::Proc {
                self.check_access(&lookup.function)?;
                return Ok(Dispatch::ResolvedLocal(Rc::clone(&lookup.function)));
            }
        }
        if &*member == "create" {
            let name = argv.get(2).cloned().ok_or_else(|| {
                Error::wrong_args(format!("{} create objectName ?arg ...?", argv[0]))
            })?;
            return Ok(Dispatch::CreateInstance {
                class: class_id,
                name,
                args: argv[3..].to_vec(),
            });
        }
        if let Some(forward) = self.forward_to_inherited(class_id, None, argv)? {
            return Ok(Dispatch::ForwardToComponent(forward));
        }
        if let Some((delegation, wildcard)) =
            self.find_delegated_function(class_id, None, &member, true)?
        {
            let forward = self.build_forward(class_id, None, &delegation, wildcard, argv)?;
            return Ok(Dispatch::ForwardToComponent(forward));
        }
        Ok(Dispatch::CreateInstance {
            class: class_id,
            name: argv[1].clone(),
            args: argv[2..].to_vec(),
        })
    }

    pub(crate) fn dispatch_object(
        &mut self,
        object: ObjectId,
        argv: &[Value],
    ) -> Result<Value, Error> {
        let dispatch = self.resolve_object_call(object, argv)?;
        trace!(object = %argv[0], ?dispatch, "dispatching");
        self.execute(dispatch, Some(object), argv)
    }

    pub(crate) fn dispatch_class(
        &mut self,
        class: ClassId,
        argv: &[Value],
    ) -> Result<Value, Error> {
        let dispatch = self.resolve_class_call(class, argv)?;
        trace!(class = %argv[0], ?dispatch, "dispatching");
        self.execute(dispatch, None, argv)
    }

    fn execute(
        &mut self,
        dispatch: Dispatch,
        object: Option<ObjectId>,
        argv: &[Value],
    ) -> Result<Value, Error> {
        match dispatch {
            Dispatch::ResolvedLocal(function) => {
                let object = if function.kind == FunctionKind::Method { object } else { None };
                let command = format!("{} {}", argv[0], argv[1]);
                self.call_function(&function, object, &command, &argv[2..])
            }
            Dispatch::Builtin(builtin) => match object {
                Some(object) => self.call_builtin(object, builtin, argv),
                None => Err(Error::internal("built-in method called without an object")),
            },
            Dispatch::ForwardToComponent(forward) => {
                trace!(argv = ?forward.argv, "forwarding to component");
                let result = self
                    .invoke(&forward.argv)
                    .map_err(|error| error.rewrite_usage(&forward.internal, &forward.visible))?;
                if let Some((class, delegation)) = forward.memoize {
                    if let Ok(class) = self.class_mut(class) {
                        let cache = class.delegation_cache_mut(delegation.proc);
                        cache.insert(Rc::clone(delegation.name()), delegation);
                    }
                }
                Ok(result)
            }
            Dispatch::CreateInstance { class, name, args } => {
                self.create_object(class, &name.as_str(), &args)
            }
            Dispatch::Unresolved { name, candidates } => {
                Err(ErrorKind::UnknownSubcommand { name, candidates }.into())
            }
            Dispatch::Noop => Ok(Value::empty()),
        }
    }

    /// Calls a method or proc. `command` is how the call is spelled in usage messages.
    pub(crate) fn call_function(
        &mut self,
        function: &Rc<Function>,
        object: Option<ObjectId>,
        command: &str,
        args: &[Value],
    ) -> Result<Value, Error> {
        let Some(body) = function.body.clone() else {
            return Err(Error::not_found("implementation for", &*function.full_name));
        };
        let locals = function.args.bind(command, args)?;
        let namespace = self.class_ref(function.class)?.namespace;
        let context =
            Context { class: function.class, object, function: Some(Rc::clone(function)) };
        self.with_frame(Frame::call(namespace, context, locals), |engine| body(engine, args))
            .map_err(|error| {
                let line = match object.and_then(|o| self.objects.get(o.0)) {
                    Some(object) => format!(
                        "(object \"{}\" {} \"{}\" body)",
                        object.name,
                        function.kind.as_str(),
                        function.full_name
                    ),
                    None => format!("(procedure \"{}\" body)", function.full_name),
                };
                error.with_context(line)
            })
    }

    /// Calls a method of an object by name, bypassing protection checks.
    pub(crate) fn call_method(
        &mut self,
        object: ObjectId,
        method: &str,
        args: &[Value],
    ) -> Result<Value, Error> {
        let (class, name) = {
            let object = self.object_ref(object)?;
            (object.class, Rc::clone(&object.name))
        };
        let function = self
            .class_ref(class)?
            .resolve_cmds
            .get(method)
            .map(|lookup| Rc::clone(&lookup.function))
            .ok_or_else(|| Error::not_found("method", method))?;
        self.call_function(&function, Some(object), &format!("{name} {method}"), args)
    }

    /// Calls the next implementation of the current method or proc in the hierarchy of the
    /// current object. In a constructor, constructs the next base class that hasn't been
    /// constructed yet with the given arguments instead.
    ///
    /// Returns an empty value if there is nothing to chain to.
    pub fn chain(&mut self, args: &[Value]) -> Result<Value, Error> {
        let context = self
            .current_context()
            .cloned()
            .ok_or_else(|| Error::syntax("cannot chain functions outside of a class context"))?;
        let function = context
            .function
            .ok_or_else(|| Error::syntax("cannot chain functions outside of a class context"))?;

        match function.kind {
            FunctionKind::Constructor => {
                let object = context
                    .object
                    .ok_or_else(|| Error::internal("constructor running without an object"))?;
                let constructed = self.object_ref(object)?.constructed.clone();
                let next = self
                    .class_ref(context.class)?
                    .bases
                    .iter()
                    .copied()
                    .find(|base| !constructed.contains(base));
                if let Some(base) = next {
                    self.construct_level(object, base, args, false)?;
                }
                Ok(Value::empty())
            }
            // Every level is destructed anyway.
            FunctionKind::Destructor => Ok(Value::empty()),
            FunctionKind::Method | FunctionKind::Proc => {
                let start = match context.object {
                    Some(object) => self.object_ref(object)?.class,
                    None => context.class,
                };
                let next = HeritageWalk::new(&self.classes, start)
                    .distinct()
                    .skip_while(|&class| class != context.class)
                    .skip(1)
                    .find_map(|class| {
                        self.classes.get(class.0)?.functions.get(&function.name).cloned()
                    });
                match next {
                    Some(next) => {
                        let command = next.full_name.to_string();
                        self.call_function(&next, context.object, &command, args)
                    }
                    None => Ok(Value::empty()),
                }
            }
        }
    }
}
