//! Hierarchical namespaces holding variables and commands.

use std::{fmt, rc::Rc};

use hashbrown::HashMap;

use super::{
    arena::{Arena, Index, Removal},
    value::Value,
};
use crate::{ClassId, Engine, Error, ObjectId};

/// The separator between the components of a qualified name.
pub const SEPARATOR: &str = "::";

/// A native command implementation.
pub type NativeFn = Rc<dyn Fn(&mut Engine, &[Value]) -> Result<Value, Error>>;

/// A named, callable handle.
#[derive(Clone)]
pub enum Command {
    /// A command implemented in Rust.
    Native(NativeFn),
    /// The access handle of a class.
    Class(ClassId),
    /// The access handle of an object.
    Object(ObjectId),
    /// A placeholder that loads the real definition when first used.
    Stub(NativeFn),
}

impl Command {
    /// Returns whether the command is an autoload placeholder.
    pub fn is_stub(&self) -> bool {
        matches!(self, Self::Stub(_))
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Native(_) => f.write_str("Native(..)"),
            Self::Class(id) => f.debug_tuple("Class").field(id).finish(),
            Self::Object(id) => f.debug_tuple("Object").field(id).finish(),
            Self::Stub(_) => f.write_str("Stub(..)"),
        }
    }
}

/// The unique ID of a namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct NamespaceId(Index);

/// A single namespace.
#[derive(Debug)]
pub struct Namespace {
    pub name: Rc<str>,
    /// The fully qualified name, `::` for the global namespace.
    pub full_name: Rc<str>,
    pub parent: Option<NamespaceId>,
    children: HashMap<Rc<str>, NamespaceId>,
    variables: HashMap<Rc<str>, Value>,
    commands: HashMap<Rc<str>, Command>,
}

impl Namespace {
    /// Returns the fully qualified name of a member of this namespace.
    pub fn qualify(&self, name: &str) -> String {
        if self.parent.is_none() {
            format!("::{name}")
        } else {
            format!("{}::{name}", self.full_name)
        }
    }

    /// Iterates over the names of the commands in this namespace.
    pub fn command_names(&self) -> impl Iterator<Item = &Rc<str>> + '_ {
        self.commands.keys()
    }
}

/// Splits a possibly qualified name into its namespace part and its tail.
///
/// `a::b::c` yields `(Some("a::b"), "c")`, `::a::c` yields `(Some("::a"), "c")`, `::c` yields
/// `(Some(""), "c")` (the global namespace) and `c` yields `(None, "c")`.
pub fn split_qualified(name: &str) -> (Option<&str>, &str) {
    match name.rfind(SEPARATOR) {
        Some(at) => {
            let head = name[..at].trim_end_matches(':');
            (Some(head), &name[at + SEPARATOR.len()..])
        }
        None => (None, name),
    }
}

/// The tree of all namespaces.
#[derive(Debug)]
pub struct NamespaceTree {
    arena: Arena<Namespace>,
    root: NamespaceId,
}

impl NamespaceTree {
    /// Creates a new tree with just the global namespace.
    pub fn new() -> Self {
        let mut arena = Arena::new();
        let root = NamespaceId(arena.insert(Namespace {
            name: Rc::from(""),
            full_name: Rc::from(SEPARATOR),
            parent: None,
            children: HashMap::new(),
            variables: HashMap::new(),
            commands: HashMap::new(),
        }));
        Self { arena, root }
    }

    /// Returns the global namespace.
    pub fn root(&self) -> NamespaceId {
        self.root
    }

    pub fn get(&self, id: NamespaceId) -> Option<&Namespace> {
        self.arena.get(id.0)
    }

    fn get_mut(&mut self, id: NamespaceId) -> Option<&mut Namespace> {
        self.arena.get_mut(id.0)
    }

    /// Returns whether the namespace still exists.
    pub fn exists(&self, id: NamespaceId) -> bool {
        self.arena.is_live(id.0)
    }

    /// Returns the fully qualified name of a namespace.
    pub fn full_name(&self, id: NamespaceId) -> Rc<str> {
        self.get(id).map(|ns| Rc::clone(&ns.full_name)).unwrap_or_else(|| Rc::from(""))
    }

    /// Returns the fully qualified name of `name` as a member of namespace `id`.
    pub fn qualify(&self, id: NamespaceId, name: &str) -> String {
        self.get(id).map(|ns| ns.qualify(name)).unwrap_or_else(|| format!("::{name}"))
    }

    /// Walks a relative path down from `from`, without falling back to the global namespace.
    fn walk(&self, from: NamespaceId, path: &str) -> Option<NamespaceId> {
        let mut current = from;
        for component in path.split(SEPARATOR).filter(|c| !c.is_empty()) {
            current = *self.get(current)?.children.get(component)?;
        }
        Some(current)
    }

    /// Finds a namespace by path. Absolute paths start at the global namespace, relative paths
    /// are looked up in `from` first and then in the global namespace.
    pub fn find(&self, from: NamespaceId, path: &str) -> Option<NamespaceId> {
        if let Some(absolute) = path.strip_prefix(SEPARATOR) {
            return self.walk(self.root, absolute);
        }
        self.walk(from, path).or_else(|| self.walk(self.root, path))
    }

    /// Finds or creates a namespace by path, creating any missing intermediate namespaces.
    /// Relative paths are created under `from`.
    pub fn create(&mut self, from: NamespaceId, path: &str) -> NamespaceId {
        let (mut current, path) = match path.strip_prefix(SEPARATOR) {
            Some(absolute) => (self.root, absolute),
            None => (from, path),
        };
        for component in path.split(SEPARATOR).filter(|c| !c.is_empty()) {
            let existing = self.get(current).and_then(|ns| ns.children.get(component).copied());
            current = match existing {
                Some(child) => child,
                None => {
                    let full_name = Rc::from(self.qualify(current, component));
                    let child = NamespaceId(self.arena.insert(Namespace {
                        name: Rc::from(component),
                        full_name,
                        parent: Some(current),
                        children: HashMap::new(),
                        variables: HashMap::new(),
                        commands: HashMap::new(),
                    }));
                    if let Some(parent) = self.get_mut(current) {
                        parent.children.insert(Rc::from(component), child);
                    }
                    child
                }
            };
        }
        current
    }

    /// Returns the namespace and all of its descendants, children before parents.
    pub fn subtree(&self, id: NamespaceId) -> Vec<NamespaceId> {
        let mut order = Vec::new();
        let mut stack = vec![(id, false)];
        while let Some((current, expanded)) = stack.pop() {
            if expanded {
                order.push(current);
                continue;
            }
            stack.push((current, true));
            if let Some(ns) = self.get(current) {
                stack.extend(ns.children.values().map(|&child| (child, false)));
            }
        }
        order
    }

    /// Removes a single namespace, detaching it from its parent. The namespace should have no
    /// children left. The global namespace cannot be removed.
    pub fn remove(&mut self, id: NamespaceId) -> Option<Namespace> {
        if id == self.root {
            return None;
        }
        let (parent, name) = {
            let ns = self.get(id)?;
            (ns.parent, Rc::clone(&ns.name))
        };
        if let Some(parent) = parent.and_then(|p| self.get_mut(p)) {
            parent.children.remove(&name);
        }
        match self.arena.remove(id.0) {
            Removal::Freed(ns) => Some(ns),
            Removal::Deferred | Removal::Missing => None,
        }
    }

    pub fn variable(&self, ns: NamespaceId, name: &str) -> Option<&Value> {
        self.get(ns)?.variables.get(name)
    }

    pub fn set_variable(&mut self, ns: NamespaceId, name: &str, value: Value) {
        if let Some(ns) = self.get_mut(ns) {
            ns.variables.insert(Rc::from(name), value);
        }
    }

    pub fn unset_variable(&mut self, ns: NamespaceId, name: &str) -> Option<Value> {
        self.get_mut(ns)?.variables.remove(name)
    }

    /// Resolves a possibly qualified variable name to the namespace that holds it.
    /// Unqualified names are looked up in `from` and then in the global namespace.
    pub fn resolve_variable<'n>(
        &self,
        from: NamespaceId,
        name: &'n str,
    ) -> Option<(NamespaceId, &'n str)> {
        let (head, tail) = split_qualified(name);
        let holder = |ns: NamespaceId| self.variable(ns, tail).map(|_| (ns, tail));
        match head {
            Some(_) => {
                let (ns, tail) = self.resolve_container(from, name)?;
                self.variable(ns, tail).map(|_| (ns, tail))
            }
            None => holder(from).or_else(|| holder(self.root)),
        }
    }

    pub fn command(&self, ns: NamespaceId, name: &str) -> Option<&Command> {
        self.get(ns)?.commands.get(name)
    }

    pub fn set_command(&mut self, ns: NamespaceId, name: &str, command: Command) {
        if let Some(ns) = self.get_mut(ns) {
            ns.commands.insert(Rc::from(name), command);
        }
    }

    pub fn remove_command(&mut self, ns: NamespaceId, name: &str) -> Option<Command> {
        self.get_mut(ns)?.commands.remove(name)
    }

    /// Resolves a possibly qualified name to the namespace it lives in and its tail, using the
    /// host's lookup rules, without requiring that anything by that name exists. Unqualified
    /// names resolve to `from`.
    pub fn resolve_container<'n>(
        &self,
        from: NamespaceId,
        name: &'n str,
    ) -> Option<(NamespaceId, &'n str)> {
        let (head, tail) = split_qualified(name);
        match head {
            Some("") if name.starts_with(SEPARATOR) => Some((self.root, tail)),
            // Absolute heads keep their leading separator.
            Some(path) => Some((self.find(from, path)?, tail)),
            None => Some((from, tail)),
        }
    }

    /// Resolves a possibly qualified command name. Unqualified names are looked up in `from`
    /// and then in the global namespace.
    pub fn resolve_command<'n>(
        &self,
        from: NamespaceId,
        name: &'n str,
    ) -> Option<(NamespaceId, &'n str)> {
        let (head, tail) = split_qualified(name);
        let holder = |ns: NamespaceId| self.command(ns, tail).map(|_| (ns, tail));
        match head {
            Some(_) => {
                let (ns, tail) = self.resolve_container(from, name)?;
                self.command(ns, tail).map(|_| (ns, tail))
            }
            None => holder(from).or_else(|| holder(self.root)),
        }
    }
}

impl Default for NamespaceTree {
    fn default() -> Self {
        Self::new()
    }
}
