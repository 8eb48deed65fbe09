//! Creating, finding and deleting classes.

use std::rc::Rc;

use tracing::debug;

use crate::{
    ll::{
        glob::string_match,
        namespace::{split_qualified, Command, SEPARATOR},
    },
    Class, ClassId, ClassKind, Engine, Error, ErrorKind, HeritageWalk, ObjectId, ObjectState,
    Protection, Value, Variable,
};

impl Engine {
    /// Creates an empty class. Missing namespaces in a qualified name are created.
    ///
    /// Fails if a class or a command other than a stub already exists under that name. A stub
    /// is replaced by the class.
    pub(crate) fn create_class(&mut self, name: &str, kind: ClassKind) -> Result<ClassId, Error> {
        let (head, tail) = split_qualified(name);
        if tail.is_empty() {
            return Err(ErrorKind::InvalidName {
                name: name.into(),
                reason: "class names cannot be empty",
            }
            .into());
        }
        if tail.contains(':') {
            return Err(ErrorKind::InvalidName {
                name: name.into(),
                reason: "class names cannot contain \":\"",
            }
            .into());
        }

        let current = self.current_namespace();
        let parent = match head {
            Some("") if name.starts_with(SEPARATOR) => self.namespaces.root(),
            Some(head) => self.namespaces.create(current, head),
            None => current,
        };
        let full_name: Rc<str> = Rc::from(self.namespaces.qualify(parent, tail));
        if self.class_names.contains_key(&full_name) {
            return Err(ErrorKind::DuplicateDefinition {
                what: "class",
                name: full_name.to_string(),
                scope: None,
            }
            .into());
        }
        if let Some(command) = self.namespaces.command(parent, tail) {
            if !command.is_stub() {
                return Err(ErrorKind::DuplicateDefinition {
                    what: "command",
                    name: full_name.to_string(),
                    scope: None,
                }
                .into());
            }
        }

        let namespace = self.namespaces.create(parent, tail);
        let class = Class::new(Rc::from(tail), Rc::clone(&full_name), namespace, kind);
        let id = ClassId(self.classes.insert(class));
        self.class_mut(id)?.heritage.insert(id);
        self.class_names.insert(Rc::clone(&full_name), id);
        self.class_namespaces.insert(namespace, id);
        self.namespaces.set_command(parent, tail, Command::Class(id));

        let mut builtins = vec!["this"];
        if kind.supports_options() {
            builtins.push("itcl_options");
        }
        for variable in builtins {
            let variable = Variable {
                name: Rc::from(variable),
                full_name: Rc::from(format!("{full_name}::{variable}")),
                class: id,
                protection: Protection::Protected,
                init: None,
                config: None,
                common: false,
                component: false,
                builtin: true,
            };
            self.class_mut(id)?.variables.insert(Rc::clone(&variable.name), Rc::new(variable));
        }
        self.rebuild_virtual_tables(id)?;

        debug!(class = %full_name, %kind, "created class");
        Ok(id)
    }

    /// Looks up a class by name without autoloading. Relative names are resolved against the
    /// current namespace first, then the global namespace.
    pub(crate) fn lookup_class(&self, name: &str) -> Option<ClassId> {
        let live = |id: &ClassId| self.classes.is_live(id.0);
        if name.starts_with(SEPARATOR) {
            return self.class_names.get(name).copied().filter(live);
        }
        let current = self.current_namespace();
        let relative = self.namespaces.qualify(current, name);
        self.class_names
            .get(relative.as_str())
            .or_else(|| self.class_names.get(format!("::{name}").as_str()))
            .copied()
            .filter(live)
    }

    /// Finds a class by name. If the class doesn't exist and autoloading is enabled, a stub
    /// command by that name or the autoloader is given a chance to define it, after which the
    /// lookup is retried once.
    pub fn find_class(&mut self, name: &str) -> Result<ClassId, Error> {
        if let Some(id) = self.lookup_class(name) {
            return Ok(id);
        }
        if self.options.autoload {
            let current = self.current_namespace();
            let stub = self
                .namespaces
                .resolve_command(current, name)
                .and_then(|(namespace, tail)| self.namespaces.command(namespace, tail))
                .and_then(|command| match command {
                    Command::Stub(loader) => Some(Rc::clone(loader)),
                    _ => None,
                });
            if let Some(loader) = stub {
                debug!(class = name, "autoloading class through stub");
                loader(self, &[Value::from(name)])?;
            } else if let Some(loader) = self.autoloader() {
                debug!(class = name, "autoloading class");
                loader(self, name)?;
            }
            if let Some(id) = self.lookup_class(name) {
                return Ok(id);
            }
        }
        Err(Error::not_found("class", name))
    }

    /// Returns whether a class by that name exists. Never autoloads.
    pub fn is_class(&self, name: &str) -> bool {
        self.lookup_class(name).is_some()
    }

    /// Returns the fully qualified name of a class.
    pub fn class_name(&self, id: ClassId) -> Result<Rc<str>, Error> {
        Ok(Rc::clone(&self.class_ref(id)?.full_name))
    }

    /// Lists the fully qualified names of all classes whose simple or fully qualified name
    /// matches the glob pattern, sorted.
    pub fn find_classes(&self, pattern: Option<&str>) -> Vec<Rc<str>> {
        let mut names: Vec<Rc<str>> = self
            .classes
            .iter()
            .map(|(_, class)| class)
            .filter(|class| !class.deleting)
            .filter(|class| {
                pattern.map_or(true, |p| {
                    string_match(p, &class.name) || string_match(p, &class.full_name)
                })
            })
            .map(|class| Rc::clone(&class.full_name))
            .collect();
        names.sort();
        names
    }

    /// Lists the fully qualified names of the classes in the hierarchy of a class, in the order
    /// the hierarchy is walked: most specific first, depth-first, with classes reachable through
    /// several paths repeated.
    pub fn heritage_walk(&mut self, class: &str) -> Result<Vec<Rc<str>>, Error> {
        let class = self.find_class(class)?;
        HeritageWalk::new(&self.classes, class)
            .map(|id| self.class_name(id))
            .collect()
    }

    /// Deletes a class, its derived classes and all of their objects.
    ///
    /// Derived classes are deleted first, then the objects of the class, then its namespace.
    /// Deleting a class that is already gone does nothing.
    pub fn delete_class(&mut self, name: &str) -> Result<(), Error> {
        match self.lookup_class(name) {
            Some(id) => self.delete_class_id(id),
            None => Ok(()),
        }
    }

    /// Deletes a class by ID. Deleting a class that is already gone, or in the middle of being
    /// deleted, does nothing.
    pub(crate) fn delete_class_id(&mut self, id: ClassId) -> Result<(), Error> {
        let Some(class) = self.classes.get_mut(id.0).filter(|c| !c.deleting) else {
            return Ok(());
        };
        class.deleting = true;
        let full_name = Rc::clone(&class.full_name);
        debug!(class = %full_name, "deleting class");

        let result = self.tear_down_class(id);
        if let Err(error) = result {
            if let Some(class) = self.classes.get_mut(id.0) {
                class.deleting = false;
            }
            return Err(error.with_context(format!("(while deleting class \"{full_name}\")")));
        }
        Ok(())
    }

    fn tear_down_class(&mut self, id: ClassId) -> Result<(), Error> {
        // Every deletion can change the derived list and the object set, so both loops start
        // over after each one.
        while let Some(derived) = self.class_ref(id)?.derived.first().copied() {
            self.delete_class_id(derived)?;
            self.class_mut(id)?.derived.retain(|&d| d != derived);
        }
        loop {
            let next = self
                .objects
                .iter()
                .find(|(_, object)| object.class == id && object.state != ObjectState::Destructing)
                .map(|(index, _)| ObjectId(index));
            match next {
                Some(object) => self.delete_object_id(object)?,
                None => break,
            }
        }

        let (bases, namespace, full_name) = {
            let class = self.class_ref(id)?;
            (class.bases.clone(), class.namespace, Rc::clone(&class.full_name))
        };
        for base in bases {
            if let Ok(base) = self.class_mut(base) {
                base.derived.retain(|&d| d != id);
            }
        }
        self.delete_namespace_id(namespace)?;

        self.class_names.remove(&full_name);
        self.class_namespaces.remove(&namespace);
        let root = self.namespaces.root();
        if let Some((parent, tail)) = self.namespaces.resolve_container(root, &full_name) {
            if let Some(Command::Class(class)) = self.namespaces.command(parent, tail) {
                if *class == id {
                    self.namespaces.remove_command(parent, tail);
                }
            }
        }
        self.classes.remove(id.0);
        debug!(class = %full_name, "deleted class");
        Ok(())
    }
}
