//! Objects and their lifecycle.

use std::{collections::HashSet, rc::Rc};

use hashbrown::HashMap;
use tracing::debug;

use super::engine::{Context, Frame};
use crate::{
    ll::{
        arena::Index,
        glob::string_match,
        namespace::{Command, NamespaceId},
    },
    ClassId, Engine, Error, ErrorKind, Function, FunctionKind, HeritageWalk, Value,
};

/// The unique ID of an object. IDs of destroyed objects never resolve to anything again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct ObjectId(pub(crate) Index);

/// Where an object is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectState {
    Constructing,
    Live,
    Destructing,
}

/// An instance of a class.
#[derive(Debug)]
pub struct Object {
    /// The most specific class of the object.
    pub(crate) class: ClassId,
    /// The fully qualified name of the object's access command.
    pub(crate) name: Rc<str>,
    pub(crate) namespace: NamespaceId,
    pub(crate) tail: Rc<str>,
    /// Instance variables, keyed by the class that declares them, so that variables of the same
    /// name declared at different levels of the hierarchy stay distinct. `None` means unset.
    pub(crate) slots: HashMap<(ClassId, Rc<str>), Option<Value>>,
    pub(crate) options: HashMap<Rc<str>, Value>,
    /// Hierarchy levels whose construction finished, in order.
    pub(crate) constructed: Vec<ClassId>,
    pub(crate) destructed: HashSet<ClassId>,
    pub(crate) state: ObjectState,
    pub(crate) renamed: bool,
}

impl Object {
    /// Returns the fully qualified name of the object.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn class(&self) -> ClassId {
        self.class
    }

    pub fn state(&self) -> ObjectState {
        self.state
    }

    /// Returns whether the object's access command has been renamed since its creation.
    pub fn is_renamed(&self) -> bool {
        self.renamed
    }
}

/// Lowercases the first letter of a class name, for generated object names.
fn auto_name_stem(class_name: &str) -> String {
    let mut chars = class_name.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

impl Engine {
    /// Creates an object of a class, runs its constructors and returns its name.
    ///
    /// If the name contains the auto-naming placeholder, it is replaced with a generated name
    /// that doesn't collide with any existing command. If any constructor fails, the destructors
    /// of the levels that were already constructed run in reverse order and the object is
    /// removed before the error is returned.
    pub(crate) fn create_object(
        &mut self,
        class: ClassId,
        name: &str,
        args: &[Value],
    ) -> Result<Value, Error> {
        let class_name = Rc::clone(&self.class_ref(class)?.full_name);
        if self.class_ref(class)?.deleting {
            return Err(Error::not_found("class", &*class_name));
        }

        let name = if name.contains(self.options.auto_name_placeholder.as_str()) {
            self.generate_object_name(class, name)?
        } else {
            name.to_owned()
        };
        let current = self.current_namespace();
        let (namespace, tail) = self
            .namespaces
            .resolve_container(current, &name)
            .ok_or_else(|| Error::not_found("namespace", &*name))?;
        if tail.is_empty() {
            return Err(ErrorKind::InvalidName {
                name: name.clone(),
                reason: "object names cannot be empty",
            }
            .into());
        }
        if self.namespaces.command(namespace, tail).is_some() {
            return Err(ErrorKind::DuplicateDefinition {
                what: "command",
                name: name.clone(),
                scope: None,
            }
            .into());
        }
        let tail: Rc<str> = Rc::from(tail);
        let full_name: Rc<str> = Rc::from(self.namespaces.qualify(namespace, &tail));

        let mut slots = HashMap::new();
        let mut options = HashMap::new();
        let levels: Vec<ClassId> = HeritageWalk::new(&self.classes, class).distinct().collect();
        for &level in &levels {
            let level = self.class_ref(level)?;
            for variable in level.variables.values().filter(|v| !v.common && !v.builtin) {
                slots.insert((variable.class, Rc::clone(&variable.name)), variable.init.clone());
            }
            // The most specific declaration of an option provides its default.
            for option in level.options.values() {
                options
                    .entry(Rc::clone(&option.spec.name))
                    .or_insert_with(|| option.spec.default.clone());
            }
        }

        let id = ObjectId(self.objects.insert(Object {
            class,
            name: Rc::clone(&full_name),
            namespace,
            tail: Rc::clone(&tail),
            slots,
            options,
            constructed: Vec::new(),
            destructed: HashSet::new(),
            state: ObjectState::Constructing,
            renamed: false,
        }));
        self.namespaces.set_command(namespace, &tail, Command::Object(id));
        debug!(object = %full_name, class = %class_name, "creating object");

        self.objects.pin(id.0);
        let result = self.construct_level(id, class, args, true);
        match result {
            Ok(()) => {
                self.object_mut(id)?.state = ObjectState::Live;
                self.objects.unpin(id.0);
                // Names relative to a namespace other than the global one would not resolve from
                // everywhere.
                if current == self.namespaces.root() {
                    Ok(Value::from(name))
                } else {
                    Ok(Value::from(full_name))
                }
            }
            Err(error) => {
                self.roll_back_construction(id);
                self.objects.unpin(id.0);
                let object = full_name.to_string();
                Err(error.map_kind(|cause| ErrorKind::ConstructionFailure {
                    object,
                    cause: Box::new(cause),
                }))
            }
        }
    }

    fn generate_object_name(&mut self, class: ClassId, pattern: &str) -> Result<String, Error> {
        let stem = auto_name_stem(&self.class_ref(class)?.name);
        let current = self.current_namespace();
        loop {
            let entry = self.class_mut(class)?;
            let counter = entry.unique;
            entry.unique += 1;
            let candidate = pattern
                .replace(self.options.auto_name_placeholder.as_str(), &format!("{stem}{counter}"));
            if self.namespaces.resolve_command(current, &candidate).is_none() {
                return Ok(candidate);
            }
        }
    }

    /// Constructs one level of an object's hierarchy: runs the constructor's initialization
    /// code, constructs the bases that haven't been constructed yet, then runs the constructor
    /// body. Levels are constructed only once.
    pub(crate) fn construct_level(
        &mut self,
        object: ObjectId,
        class: ClassId,
        args: &[Value],
        most_specific: bool,
    ) -> Result<(), Error> {
        if self.object_ref(object)?.constructed.contains(&class) {
            return Ok(());
        }
        let (constructor, bases, namespace, class_name) = {
            let class = self.class_ref(class)?;
            (
                class.constructor().cloned(),
                class.bases.clone(),
                class.namespace,
                Rc::clone(&class.full_name),
            )
        };
        let usage = format!("{class_name}::constructor");
        let locals = match &constructor {
            Some(constructor) => constructor.args.bind(&usage, args)?,
            None if !most_specific && !args.is_empty() => {
                return Err(Error::wrong_args(usage));
            }
            None => Vec::new(),
        };

        let frame = Frame::call(
            namespace,
            Context { class, object: Some(object), function: constructor.clone() },
            locals,
        );
        let result = self.with_frame(frame, |engine| {
            if let Some(init) = constructor.as_ref().and_then(|c| c.init.clone()) {
                init(engine, args)?;
            }
            for base in bases {
                engine.construct_level(object, base, &[], false)?;
            }
            if constructor.is_none() && most_specific && !args.is_empty() {
                engine.configure_object(object, args)?;
            }
            if let Some(body) = constructor.as_ref().and_then(|c| c.body.clone()) {
                body(engine, args)?;
            }
            Ok(())
        });
        if let Err(error) = result {
            let object = self.object_ref(object)?;
            return Err(error.with_context(format!(
                "(while constructing object \"{}\" in {usage})",
                object.name
            )));
        }
        self.object_mut(object)?.constructed.push(class);
        Ok(())
    }

    fn roll_back_construction(&mut self, id: ObjectId) {
        let Ok(object) = self.object_mut(id) else { return };
        object.state = ObjectState::Destructing;
        let constructed = object.constructed.clone();
        debug!(object = %object.name, levels = constructed.len(), "rolling back construction");
        for &level in constructed.iter().rev() {
            if let Err(error) = self.run_destructor(id, level) {
                debug!(%error, "destructor failed during rollback");
            }
        }
        self.release_object(id);
    }

    /// Constructs a base class of the object under construction with explicit arguments. Meant
    /// to be called from constructor initialization code; bases constructed this way are not
    /// constructed again implicitly.
    pub fn construct_base(&mut self, base: &str, args: &[Value]) -> Result<Value, Error> {
        let in_constructor = |context: &&Context| {
            context.function.as_ref().map(|f| f.kind) == Some(FunctionKind::Constructor)
        };
        let context = self
            .current_context()
            .filter(in_constructor)
            .cloned()
            .ok_or_else(|| Error::syntax("bases can only be constructed from a constructor"))?;
        let object = context
            .object
            .ok_or_else(|| Error::internal("constructor running without an object"))?;
        let bases = self.class_ref(context.class)?.bases.clone();
        let wanted = self.lookup_class(base);
        let base_id = bases
            .into_iter()
            .find(|&id| {
                Some(id) == wanted || self.classes.get(id.0).map_or(false, |c| &*c.name == base)
            })
            .ok_or_else(|| Error::not_found("base class", base))?;
        self.construct_level(object, base_id, args, false)?;
        Ok(Value::empty())
    }

    fn run_destructor(&mut self, object: ObjectId, class: ClassId) -> Result<(), Error> {
        let (destructor, namespace): (Option<Rc<Function>>, _) = {
            let class = self.class_ref(class)?;
            (class.destructor().cloned(), class.namespace)
        };
        let Some(destructor) = destructor else { return Ok(()) };
        let Some(body) = destructor.body.clone() else { return Ok(()) };
        let frame = Frame::call(
            namespace,
            Context { class, object: Some(object), function: Some(Rc::clone(&destructor)) },
            [],
        );
        self.with_frame(frame, |engine| body(engine, &[]).map(|_| ())).map_err(|error| {
            let name = self.objects.get(object.0).map(|o| o.name.to_string()).unwrap_or_default();
            error.with_context(format!("(object \"{name}\" {})", destructor.full_name))
        })
    }

    /// Destroys an object: runs its destructors in the reverse order of construction, then
    /// removes its command and storage.
    ///
    /// If a destructor fails, destruction stops there and the object stays alive. The levels
    /// whose destructors already ran are not destructed again by a later attempt.
    pub(crate) fn delete_object_id(&mut self, id: ObjectId) -> Result<(), Error> {
        let Some(object) = self.objects.get_mut(id.0) else { return Ok(()) };
        if object.state == ObjectState::Destructing {
            return Ok(());
        }
        let previous = object.state;
        object.state = ObjectState::Destructing;
        let levels: Vec<ClassId> = object
            .constructed
            .iter()
            .rev()
            .filter(|level| !object.destructed.contains(level))
            .copied()
            .collect();
        debug!(object = %object.name, "destroying object");

        self.objects.pin(id.0);
        for level in levels {
            if let Err(error) = self.run_destructor(id, level) {
                if let Ok(object) = self.object_mut(id) {
                    object.state = previous;
                }
                self.objects.unpin(id.0);
                let object = self.objects.get(id.0).map(|o| o.name.to_string()).unwrap_or_default();
                return Err(error.map_kind(|cause| ErrorKind::DestructionFailure {
                    object,
                    cause: Box::new(cause),
                }));
            }
            self.object_mut(id)?.destructed.insert(level);
        }
        self.objects.unpin(id.0);
        self.release_object(id);
        Ok(())
    }

    /// Removes an object's command and frees it, or condemns it if it's still running code.
    fn release_object(&mut self, id: ObjectId) {
        let Some(object) = self.objects.get(id.0) else { return };
        let (namespace, tail) = (object.namespace, Rc::clone(&object.tail));
        if let Some(Command::Object(handle)) = self.namespaces.command(namespace, &tail) {
            if *handle == id {
                self.namespaces.remove_command(namespace, &tail);
            }
        }
        self.objects.remove(id.0);
    }

    /// Finds the object a command name refers to.
    pub fn lookup_object(&self, name: &str) -> Option<ObjectId> {
        let current = self.current_namespace();
        let (namespace, tail) = self.namespaces.resolve_command(current, name)?;
        match self.namespaces.command(namespace, tail)? {
            Command::Object(id) => Some(*id),
            _ => None,
        }
    }

    /// Destroys an object by name.
    pub fn delete_object(&mut self, name: &str) -> Result<(), Error> {
        let id = self.lookup_object(name).ok_or_else(|| Error::not_found("object", name))?;
        self.delete_object_id(id)
    }

    /// Returns whether `name` names an object, optionally requiring its most specific class to
    /// be `class`.
    pub fn is_object(&self, name: &str, class: Option<&str>) -> bool {
        let Some(object) = self.lookup_object(name).and_then(|id| self.objects.get(id.0)) else {
            return false;
        };
        match class {
            Some(class) => self.lookup_class(class) == Some(object.class),
            None => true,
        }
    }

    /// Returns the fully qualified name of the most specific class of an object.
    pub fn object_class(&self, name: &str) -> Result<Rc<str>, Error> {
        let id = self.lookup_object(name).ok_or_else(|| Error::not_found("object", name))?;
        self.class_name(self.object_ref(id)?.class)
    }

    /// Lists the fully qualified names of objects, sorted. Objects can be filtered by a glob
    /// pattern matched against their simple or fully qualified name, by their most specific
    /// class, and by a class they must be an instance of.
    pub fn find_objects(
        &self,
        pattern: Option<&str>,
        class: Option<&str>,
        isa: Option<&str>,
    ) -> Result<Vec<Rc<str>>, Error> {
        let resolve =
            |name: &str| self.lookup_class(name).ok_or_else(|| Error::not_found("class", name));
        let class = class.map(resolve).transpose()?;
        let isa = isa.map(resolve).transpose()?;
        let mut names: Vec<Rc<str>> = self
            .objects
            .iter()
            .map(|(_, object)| object)
            .filter(|object| object.state != ObjectState::Destructing)
            .filter(|object| class.map_or(true, |class| object.class == class))
            .filter(|object| {
                isa.map_or(true, |isa| {
                    self.classes.get(object.class.0).map_or(false, |c| c.is_a(isa))
                })
            })
            .filter(|object| {
                pattern.map_or(true, |p| {
                    string_match(p, &object.name) || string_match(p, &object.tail)
                })
            })
            .map(|object| Rc::clone(&object.name))
            .collect();
        names.sort();
        Ok(names)
    }
}
