use std::{fmt, rc::Rc};

use hashbrown::HashMap;
use tracing::debug;

use crate::{
    ll::{
        arena::Arena,
        namespace::{split_qualified, Command, NamespaceId, NamespaceTree, NativeFn, SEPARATOR},
        value::Value,
    },
    Builtin, Class, ClassId, Error, ErrorKind, Function, FunctionKind, Object, ObjectId, Variable,
};

/// Options for debugging the object system.
#[derive(Debug, Clone, Copy, Default)]
pub struct DebugOptions {
    /// Set to `true` to print every rebuilt resolution table to stderr.
    pub dump_virtual_tables: bool,
}

/// Options for configuring an [`Engine`].
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// The token in object names that gets replaced with a generated unique name.
    pub auto_name_placeholder: String,
    /// Whether class lookups may try to load missing classes through stubs or the autoloader.
    pub autoload: bool,
    pub debug: DebugOptions,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            auto_name_placeholder: String::from("#auto"),
            autoload: true,
            debug: DebugOptions::default(),
        }
    }
}

/// Loads the definition of a class that could not be found. Receives the name that was looked up.
pub type Autoloader = Rc<dyn Fn(&mut Engine, &str) -> Result<(), Error>>;

/// The class and object a body is running on behalf of.
#[derive(Debug, Clone)]
pub(crate) struct Context {
    pub(crate) class: ClassId,
    pub(crate) object: Option<ObjectId>,
    pub(crate) function: Option<Rc<Function>>,
}

#[derive(Debug)]
pub(crate) struct Frame {
    pub(crate) namespace: NamespaceId,
    pub(crate) context: Option<Context>,
    /// Frames that belong to a function call have local variables; others create variables in
    /// their namespace.
    pub(crate) locals: Option<HashMap<Rc<str>, Value>>,
}

impl Frame {
    pub(crate) fn namespace(namespace: NamespaceId) -> Self {
        Self { namespace, context: None, locals: None }
    }

    pub(crate) fn call(
        namespace: NamespaceId,
        context: Context,
        locals: impl IntoIterator<Item = (Rc<str>, Value)>,
    ) -> Self {
        Self { namespace, context: Some(context), locals: Some(locals.into_iter().collect()) }
    }
}

/// **Start here!** The context every class, object and command lives in.
///
/// Engines are completely independent of each other; nothing is stored globally.
pub struct Engine {
    pub(crate) namespaces: NamespaceTree,
    pub(crate) classes: Arena<Class>,
    pub(crate) objects: Arena<Object>,
    /// Classes by their fully qualified names.
    pub(crate) class_names: HashMap<Rc<str>, ClassId>,
    /// Classes by the namespaces that back them.
    pub(crate) class_namespaces: HashMap<NamespaceId, ClassId>,
    pub(crate) frames: Vec<Frame>,
    pub(crate) options: EngineOptions,
    autoloader: Option<Autoloader>,
}

impl Engine {
    /// Creates a new engine with the default options.
    ///
    /// # Examples
    /// ```
    /// use heritage::Engine;
    ///
    /// let mut engine = Engine::new();
    /// ```
    pub fn new() -> Self {
        Self::with_options(EngineOptions::default())
    }

    /// Creates a new engine with specific options.
    ///
    /// # Examples
    /// ```
    /// use heritage::{DebugOptions, Engine, EngineOptions};
    ///
    /// let mut engine = Engine::with_options(EngineOptions {
    ///     auto_name_placeholder: String::from("%AUTO%"),
    ///     autoload: false,
    ///     debug: DebugOptions { dump_virtual_tables: true },
    /// });
    /// ```
    pub fn with_options(options: EngineOptions) -> Self {
        let mut engine = Self {
            namespaces: NamespaceTree::new(),
            classes: Arena::new(),
            objects: Arena::new(),
            class_names: HashMap::new(),
            class_namespaces: HashMap::new(),
            frames: Vec::new(),
            options,
            autoloader: None,
        };
        engine.add_function("chain", |engine, args| engine.chain(args));
        engine
    }

    /// Returns the options the engine was created with.
    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Installs the loader consulted when a class cannot be found and autoloading is enabled.
    pub fn set_autoloader<F>(&mut self, loader: F)
    where
        F: Fn(&mut Engine, &str) -> Result<(), Error> + 'static,
    {
        self.autoloader = Some(Rc::new(loader));
    }

    pub(crate) fn autoloader(&self) -> Option<Autoloader> {
        self.autoloader.clone()
    }

    /// Declares a native command. Missing namespaces in a qualified name are created.
    ///
    /// # Examples
    /// ```
    /// use heritage::{Engine, Value};
    ///
    /// let mut engine = Engine::new();
    /// engine.add_function("::util::join", |_, args| {
    ///     Ok(Value::from(args.iter().map(|a| a.to_string()).collect::<Vec<_>>().join("-")))
    /// });
    /// assert_eq!(engine.call(["util::join", "a", "b"]).unwrap().to_string(), "a-b");
    /// ```
    pub fn add_function<F>(&mut self, name: &str, f: F)
    where
        F: Fn(&mut Engine, &[Value]) -> Result<Value, Error> + 'static,
    {
        let (namespace, tail) = self.container_for_new(name);
        self.namespaces.set_command(namespace, tail, Command::Native(Rc::new(f)));
    }

    /// Declares a stub: a placeholder command that runs `loader` the first time it's invoked or
    /// looked up as a class. The loader is expected to replace the stub with the real definition.
    pub fn create_stub<F>(&mut self, name: &str, loader: F)
    where
        F: Fn(&mut Engine, &[Value]) -> Result<Value, Error> + 'static,
    {
        let (namespace, tail) = self.container_for_new(name);
        let loader: NativeFn = Rc::new(loader);
        self.namespaces.set_command(namespace, tail, Command::Stub(loader));
    }

    fn container_for_new<'n>(&mut self, name: &'n str) -> (NamespaceId, &'n str) {
        let current = self.current_namespace();
        match split_qualified(name) {
            (Some(""), tail) if name.starts_with(SEPARATOR) => (self.namespaces.root(), tail),
            // Absolute heads keep their leading separator.
            (Some(head), tail) => (self.namespaces.create(current, head), tail),
            (None, tail) => (current, tail),
        }
    }

    /// Invokes a command with the given words. A shorthand for [`Engine::invoke`].
    ///
    /// # Examples
    /// ```
    /// use heritage::Engine;
    ///
    /// let mut engine = Engine::new();
    /// engine.add_function("greet", |_, args| Ok(format!("hello {}", args[0]).into()));
    /// assert_eq!(engine.call(["greet", "world"]).unwrap().to_string(), "hello world");
    /// ```
    pub fn call<I, V>(&mut self, words: I) -> Result<Value, Error>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let argv: Vec<Value> = words.into_iter().map(Into::into).collect();
        self.invoke(&argv)
    }

    /// Invokes a command. The first word names the command, the rest are its arguments.
    ///
    /// Inside a method or proc body, the members of the current class are visible as commands:
    /// unqualified method names dispatch virtually on the current object.
    pub fn invoke(&mut self, argv: &[Value]) -> Result<Value, Error> {
        let Some(first) = argv.first() else { return Ok(Value::empty()) };
        let name = first.to_rc_str();

        if let Some(result) = self.invoke_member(&name, argv) {
            return result;
        }

        let current = self.current_namespace();
        if let Some((namespace, tail)) = self.namespaces.resolve_command(current, &name) {
            if let Some(command) = self.namespaces.command(namespace, tail).cloned() {
                let full_name = self.namespaces.qualify(namespace, tail);
                return self.run_command(command, &full_name, argv);
            }
        }

        // `Class::proc` from anywhere.
        if let (Some(head), tail) = split_qualified(&name) {
            let head = if head.is_empty() { String::from(SEPARATOR) } else { head.to_owned() };
            if let Some(class) = self.lookup_class(&head) {
                let lookup = self.class_ref(class)?.resolve_cmds.get(tail).cloned();
                if let Some(lookup) = lookup {
                    if lookup.function.kind == FunctionKind::Proc {
                        self.check_access(&lookup.function)?;
                        return self.call_function(&lookup.function, None, &name, &argv[1..]);
                    }
                }
            }
        }

        Err(Error::not_found("command", &*name))
    }

    /// Resolves a command name against the members of the current class, then against the
    /// built-in methods of the current object.
    fn invoke_member(&mut self, name: &str, argv: &[Value]) -> Option<Result<Value, Error>> {
        let context = self.current_context()?.clone();
        let lookup = self
            .classes
            .get(context.class.0)?
            .resolve_cmds
            .get(name)
            .filter(|lookup| lookup.accessible)
            .cloned();
        let Some(lookup) = lookup else {
            let object = context.object?;
            let builtin = Builtin::lookup(name)?;
            let this = Value::from(&self.objects.get(object.0)?.name);
            let mut argv = argv.to_vec();
            argv.insert(0, this);
            return Some(self.call_builtin(object, builtin, &argv));
        };
        let function = match (lookup.function.kind, context.object) {
            (FunctionKind::Method, Some(object)) if !name.contains(SEPARATOR) => {
                // Unqualified method calls are virtual.
                let class = self.objects.get(object.0)?.class;
                self.classes
                    .get(class.0)
                    .and_then(|c| c.resolve_cmds.get(name))
                    .map(|l| Rc::clone(&l.function))
                    .unwrap_or_else(|| Rc::clone(&lookup.function))
            }
            (FunctionKind::Method, None) => {
                return Some(Err(Error::syntax(format!(
                    "cannot call method \"{name}\" without an object context"
                ))));
            }
            _ => Rc::clone(&lookup.function),
        };
        let object = match function.kind {
            FunctionKind::Method => context.object,
            _ => None,
        };
        Some(self.call_function(&function, object, name, &argv[1..]))
    }

    fn run_command(
        &mut self,
        command: Command,
        full_name: &str,
        argv: &[Value],
    ) -> Result<Value, Error> {
        match command {
            Command::Native(f) => f(self, &argv[1..]),
            Command::Class(class) => self.dispatch_class(class, argv),
            Command::Object(object) => self.dispatch_object(object, argv),
            Command::Stub(loader) => {
                debug!(command = full_name, "loading stub");
                loader(self, &[Value::from(full_name)])?;
                let (namespace, tail) = self
                    .namespaces
                    .resolve_command(self.namespaces.root(), full_name)
                    .ok_or_else(|| Error::not_found("command", full_name))?;
                match self.namespaces.command(namespace, tail).cloned() {
                    Some(Command::Stub(_)) | None => Err(Error::not_found("command", full_name)),
                    Some(command) => self.run_command(command, full_name, argv),
                }
            }
        }
    }

    pub(crate) fn current_namespace(&self) -> NamespaceId {
        self.frames.last().map(|f| f.namespace).unwrap_or_else(|| self.namespaces.root())
    }

    pub(crate) fn current_context(&self) -> Option<&Context> {
        self.frames.last()?.context.as_ref()
    }

    /// Runs `f` inside a new frame, pinning the frame's class and object for the duration.
    pub(crate) fn with_frame<R>(
        &mut self,
        frame: Frame,
        f: impl FnOnce(&mut Self) -> Result<R, Error>,
    ) -> Result<R, Error> {
        let pinned = frame.context.as_ref().map(|c| (c.class, c.object));
        if let Some((class, object)) = pinned {
            self.classes.pin(class.0);
            if let Some(object) = object {
                self.objects.pin(object.0);
            }
        }
        self.frames.push(frame);
        let result = f(self);
        self.frames.pop();
        if let Some((class, object)) = pinned {
            if let Some(object) = object {
                self.objects.unpin(object.0);
            }
            self.classes.unpin(class.0);
        }
        result
    }

    /// Runs `f` with `path` as the current namespace, creating the namespace if needed.
    pub fn in_namespace<R>(
        &mut self,
        path: &str,
        f: impl FnOnce(&mut Self) -> Result<R, Error>,
    ) -> Result<R, Error> {
        let current = self.current_namespace();
        let namespace = self.namespaces.create(current, path);
        self.with_frame(Frame::namespace(namespace), f)
    }

    pub(crate) fn class_ref(&self, id: ClassId) -> Result<&Class, Error> {
        self.classes.get(id.0).ok_or_else(|| Error::internal("stale class reference"))
    }

    pub(crate) fn class_mut(&mut self, id: ClassId) -> Result<&mut Class, Error> {
        self.classes.get_mut(id.0).ok_or_else(|| Error::internal("stale class reference"))
    }

    pub(crate) fn object_ref(&self, id: ObjectId) -> Result<&Object, Error> {
        self.objects.get(id.0).ok_or_else(|| Error::internal("stale object reference"))
    }

    pub(crate) fn object_mut(&mut self, id: ObjectId) -> Result<&mut Object, Error> {
        self.objects.get_mut(id.0).ok_or_else(|| Error::internal("stale object reference"))
    }

    /// Returns a class by its ID, if it still exists.
    pub fn class(&self, id: ClassId) -> Option<&Class> {
        self.classes.get(id.0).filter(|_| self.classes.is_live(id.0))
    }

    /// Returns the name of the object the current body runs on.
    pub fn this(&self) -> Result<Value, Error> {
        let object = self.current_context().and_then(|c| c.object).ok_or_else(|| {
            Error::syntax("cannot access object-specific info without an object context")
        })?;
        Ok(Value::from(&self.object_ref(object)?.name))
    }

    /// Reads a variable.
    ///
    /// Unqualified names are looked up in the locals of the current call, then among the
    /// variables of the current class, then in the current namespace and finally in the global
    /// namespace. `itcl_options(-name)` reads an option of the current object.
    pub fn var(&self, name: &str) -> Result<Value, Error> {
        if let Some(option) = option_element(name) {
            let object = self.option_context(name)?;
            return Ok(self.object_ref(object)?.options.get(option).cloned().unwrap_or_default());
        }
        if let Some(frame) = self.frames.last() {
            if let Some(value) = frame.locals.as_ref().and_then(|locals| locals.get(name)) {
                return Ok(value.clone());
            }
            if let Some(context) = &frame.context {
                if let Some(variable) = self.member_variable(context.class, name) {
                    return self.read_member(context.object, &variable);
                }
            }
        }
        let current = self.current_namespace();
        self.namespaces
            .resolve_variable(current, name)
            .and_then(|(namespace, tail)| self.namespaces.variable(namespace, tail))
            .cloned()
            .ok_or_else(|| Error::not_found("variable", name))
    }

    /// Writes a variable, following the same lookup rules as [`Engine::var`]. Variables that
    /// don't exist yet are created as locals inside calls, and in the current namespace outside
    /// of them.
    pub fn set_var(&mut self, name: &str, value: impl Into<Value>) -> Result<Value, Error> {
        let value = value.into();
        if let Some(option) = option_element(name) {
            let object = self.option_context(name)?;
            self.object_mut(object)?.options.insert(Rc::from(option), value.clone());
            return Ok(value);
        }
        if let Some(frame) = self.frames.last_mut() {
            if let Some(local) = frame.locals.as_mut().and_then(|locals| locals.get_mut(name)) {
                *local = value.clone();
                return Ok(value);
            }
        }
        if let Some(context) = self.current_context().cloned() {
            if let Some(variable) = self.member_variable(context.class, name) {
                self.write_member(context.object, &variable, value.clone())?;
                return Ok(value);
            }
        }
        let current = self.current_namespace();
        if let Some((namespace, tail)) = self.namespaces.resolve_variable(current, name) {
            self.namespaces.set_variable(namespace, tail, value.clone());
            return Ok(value);
        }
        if !name.contains(SEPARATOR) {
            if let Some(locals) = self.frames.last_mut().and_then(|f| f.locals.as_mut()) {
                locals.insert(Rc::from(name), value.clone());
                return Ok(value);
            }
        }
        let (namespace, tail) = self
            .namespaces
            .resolve_container(current, name)
            .ok_or_else(|| Error::not_found("namespace", name))?;
        self.namespaces.set_variable(namespace, tail, value.clone());
        Ok(value)
    }

    fn option_context(&self, name: &str) -> Result<ObjectId, Error> {
        self.current_context()
            .filter(|c| self.classes.get(c.class.0).map_or(false, |c| c.kind.supports_options()))
            .and_then(|c| c.object)
            .ok_or_else(|| Error::not_found("variable", name))
    }

    /// Finds an accessible variable through a class's resolution table.
    pub(crate) fn member_variable(&self, class: ClassId, name: &str) -> Option<Rc<Variable>> {
        let lookup = self.classes.get(class.0)?.resolve_vars.get(name)?;
        lookup.accessible.then(|| Rc::clone(&lookup.variable))
    }

    /// Reads a class member variable, either from an object's storage or from the namespace of
    /// its class if it's common.
    pub(crate) fn read_member(
        &self,
        object: Option<ObjectId>,
        variable: &Variable,
    ) -> Result<Value, Error> {
        if variable.common {
            let namespace = self.class_ref(variable.class)?.namespace;
            return self
                .namespaces
                .variable(namespace, &variable.name)
                .cloned()
                .ok_or_else(|| Error::not_found("variable", &*variable.full_name));
        }
        let object = object.ok_or_else(|| {
            Error::syntax(format!(
                "can't read \"{}\": cannot access object-specific info without an object context",
                variable.name
            ))
        })?;
        let object = self.object_ref(object)?;
        if variable.builtin {
            return Ok(match &*variable.name {
                "this" => Value::from(&object.name),
                _ => Value::list(
                    object.options.iter().flat_map(|(k, v)| [Value::from(k), v.clone()]),
                ),
            });
        }
        object
            .slots
            .get(&(variable.class, Rc::clone(&variable.name)))
            .cloned()
            .flatten()
            .ok_or_else(|| Error::not_found("variable", &*variable.full_name))
    }

    pub(crate) fn write_member(
        &mut self,
        object: Option<ObjectId>,
        variable: &Variable,
        value: Value,
    ) -> Result<(), Error> {
        if variable.builtin {
            return Err(ErrorKind::ProtectionViolation {
                name: variable.name.to_string(),
                protection: "readonly",
                what: "variable",
            }
            .into());
        }
        if variable.common {
            let namespace = self.class_ref(variable.class)?.namespace;
            self.namespaces.set_variable(namespace, &variable.name, value);
            return Ok(());
        }
        let object = object.ok_or_else(|| {
            Error::syntax(format!(
                "can't set \"{}\": cannot access object-specific info without an object context",
                variable.name
            ))
        })?;
        self.object_mut(object)?
            .slots
            .insert((variable.class, Rc::clone(&variable.name)), Some(value));
        Ok(())
    }

    /// Renames a command. Renaming to the empty string deletes the command; for object handles
    /// this destroys the object.
    pub fn rename_command(&mut self, old: &str, new: &str) -> Result<(), Error> {
        let current = self.current_namespace();
        let (namespace, tail) = self
            .namespaces
            .resolve_command(current, old)
            .ok_or_else(|| Error::not_found("command", old))?;
        let tail: Rc<str> = Rc::from(tail);
        let command = self
            .namespaces
            .command(namespace, &tail)
            .cloned()
            .ok_or_else(|| Error::not_found("command", old))?;

        if new.is_empty() {
            return match command {
                Command::Object(object) => self.delete_object_id(object),
                Command::Class(class) => self.delete_class_id(class),
                Command::Native(_) | Command::Stub(_) => {
                    self.namespaces.remove_command(namespace, &tail);
                    Ok(())
                }
            };
        }

        if let Command::Class(_) = command {
            return Err(Error::syntax(format!("can't rename class \"{old}\"")));
        }
        let (new_namespace, new_tail) = self
            .namespaces
            .resolve_container(current, new)
            .ok_or_else(|| Error::not_found("namespace", new))?;
        if new_tail.is_empty() {
            return Err(ErrorKind::InvalidName { name: new.into(), reason: "empty name" }.into());
        }
        if self.namespaces.command(new_namespace, new_tail).is_some() {
            return Err(ErrorKind::DuplicateDefinition {
                what: "command",
                name: new.into(),
                scope: None,
            }
            .into());
        }
        let new_tail: Rc<str> = Rc::from(new_tail);
        self.namespaces.remove_command(namespace, &tail);
        self.namespaces.set_command(new_namespace, &new_tail, command.clone());
        if let Command::Object(object) = command {
            let full_name = Rc::from(self.namespaces.qualify(new_namespace, &new_tail));
            let object = self.object_mut(object)?;
            debug!(from = %object.name, to = %full_name, "renamed object");
            object.name = full_name;
            object.namespace = new_namespace;
            object.tail = new_tail;
            object.renamed = true;
        }
        Ok(())
    }

    /// Deletes a namespace along with its child namespaces, the classes backed by them and the
    /// objects whose handles live in them.
    pub fn delete_namespace(&mut self, path: &str) -> Result<(), Error> {
        let current = self.current_namespace();
        let namespace = self
            .namespaces
            .find(current, path)
            .ok_or_else(|| Error::not_found("namespace", path))?;
        if namespace == self.namespaces.root() {
            return Err(Error::syntax("can't delete the global namespace"));
        }
        self.delete_namespace_id(namespace)
    }

    pub(crate) fn delete_namespace_id(&mut self, namespace: NamespaceId) -> Result<(), Error> {
        for child in self.namespaces.subtree(namespace) {
            if !self.namespaces.exists(child) {
                continue;
            }
            if let Some(&class) = self.class_namespaces.get(&child) {
                if !self.class_ref(class)?.deleting {
                    self.delete_class_id(class)?;
                    continue;
                }
            }
            let objects: Vec<ObjectId> = self
                .namespaces
                .get(child)
                .into_iter()
                .flat_map(|ns| ns.command_names())
                .filter_map(|name| match self.namespaces.command(child, name) {
                    Some(Command::Object(object)) => Some(*object),
                    _ => None,
                })
                .collect();
            for object in objects {
                self.delete_object_id(object)?;
            }
            self.namespaces.remove(child);
        }
        Ok(())
    }

    /// Returns the fully qualified name of the variable that `name` resolves to in the given
    /// class, whether accessible from that class or not.
    pub fn resolve_variable(&mut self, class: &str, name: &str) -> Result<Option<Rc<str>>, Error> {
        let class = self.find_class(class)?;
        let lookup = self.class_ref(class)?.resolve_vars.get(name);
        Ok(lookup.map(|l| Rc::clone(&l.variable.full_name)))
    }

    /// Returns the fully qualified name of the function that `name` resolves to in the given
    /// class.
    pub fn resolve_function(&mut self, class: &str, name: &str) -> Result<Option<Rc<str>>, Error> {
        let class = self.find_class(class)?;
        let lookup = self.class_ref(class)?.resolve_cmds.get(name);
        Ok(lookup.map(|l| Rc::clone(&l.function.full_name)))
    }
}

/// Splits `itcl_options(-name)` into the option name.
fn option_element(name: &str) -> Option<&str> {
    name.strip_prefix("itcl_options(")?.strip_suffix(')')
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("classes", &self.classes.len())
            .field("objects", &self.objects.len())
            .field("frames", &self.frames.len())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
