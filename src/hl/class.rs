//! Classes.

use std::{collections::HashSet, fmt, rc::Rc};

use hashbrown::HashMap;

use super::symbols::SymbolTable;
use crate::{
    ll::{arena::Index, namespace::NamespaceId},
    Component, Delegation, Function, OptionDef, Variable,
};

/// The unique ID of a class. IDs of deleted classes never resolve to anything again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct ClassId(pub(crate) Index);

/// The flavor of a class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClassKind {
    /// A plain class.
    Class,
    /// A class with options, components and delegation.
    ExtendedClass,
    /// Like an extended class, but without inheritance.
    Type,
    /// An extended class backed by a widget.
    Widget,
    /// A widget that adapts an existing one; cannot inherit.
    WidgetAdaptor,
}

impl ClassKind {
    /// Returns whether classes of this kind may declare options, components and delegations.
    pub fn supports_options(self) -> bool {
        !matches!(self, Self::Class)
    }

    /// Returns whether classes of this kind may inherit from other classes.
    pub fn supports_inheritance(self) -> bool {
        !matches!(self, Self::Type | Self::WidgetAdaptor)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Class => "class",
            Self::ExtendedClass => "extendedclass",
            Self::Type => "type",
            Self::Widget => "widget",
            Self::WidgetAdaptor => "widgetadaptor",
        }
    }
}

impl fmt::Display for ClassKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An entry in a class's variable resolution table.
#[derive(Debug)]
pub struct VarLookup {
    pub variable: Rc<Variable>,
    /// How many spellings of the variable's name resolve to it.
    pub usage: usize,
    /// The shortest spelling that resolves to the variable.
    pub least_qualified: Rc<str>,
    /// `false` for variables private to another class in the hierarchy.
    pub accessible: bool,
}

/// An entry in a class's function resolution table.
#[derive(Debug)]
pub struct FnLookup {
    pub function: Rc<Function>,
    pub accessible: bool,
}

/// A class.
#[derive(Debug)]
pub struct Class {
    pub(crate) name: Rc<str>,
    pub(crate) full_name: Rc<str>,
    pub(crate) namespace: NamespaceId,
    pub(crate) kind: ClassKind,

    pub(crate) bases: Vec<ClassId>,
    /// Non-owning back references, cleaned up when the derived class goes away.
    pub(crate) derived: Vec<ClassId>,
    /// The class itself and all of its transitive bases.
    pub(crate) heritage: HashSet<ClassId>,
    pub(crate) inherit_declared: bool,

    pub(crate) variables: SymbolTable<Rc<Variable>>,
    pub(crate) functions: SymbolTable<Rc<Function>>,
    pub(crate) options: SymbolTable<Rc<OptionDef>>,
    pub(crate) components: SymbolTable<Rc<Component>>,
    pub(crate) delegated_methods: SymbolTable<Rc<Delegation>>,
    pub(crate) delegated_procs: SymbolTable<Rc<Delegation>>,
    pub(crate) delegated_options: SymbolTable<Rc<Delegation>>,

    pub(crate) resolve_vars: HashMap<Rc<str>, Rc<VarLookup>>,
    pub(crate) resolve_cmds: HashMap<Rc<str>, Rc<FnLookup>>,
    /// Concrete delegations memoized from successful wildcard forwards, for methods and procs
    /// separately.
    pub(crate) method_cache: HashMap<Rc<str>, Rc<Delegation>>,
    pub(crate) proc_cache: HashMap<Rc<str>, Rc<Delegation>>,

    /// Counter for automatically generated object names.
    pub(crate) unique: u64,
    pub(crate) deleting: bool,
}

impl Class {
    /// Creates an empty class. The heritage set is filled in once the class has an ID.
    pub(crate) fn new(
        name: Rc<str>,
        full_name: Rc<str>,
        namespace: NamespaceId,
        kind: ClassKind,
    ) -> Self {
        Self {
            name,
            full_name,
            namespace,
            kind,
            bases: Vec::new(),
            derived: Vec::new(),
            heritage: HashSet::new(),
            inherit_declared: false,
            variables: SymbolTable::new(),
            functions: SymbolTable::new(),
            options: SymbolTable::new(),
            components: SymbolTable::new(),
            delegated_methods: SymbolTable::new(),
            delegated_procs: SymbolTable::new(),
            delegated_options: SymbolTable::new(),
            resolve_vars: HashMap::new(),
            resolve_cmds: HashMap::new(),
            method_cache: HashMap::new(),
            proc_cache: HashMap::new(),
            unique: 0,
            deleting: false,
        }
    }

    /// Returns the simple name of the class.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the fully qualified name of the class.
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    pub fn kind(&self) -> ClassKind {
        self.kind
    }

    /// Returns the direct base classes, in declaration order.
    pub fn bases(&self) -> &[ClassId] {
        &self.bases
    }

    /// Returns whether `other` is this class or one of its bases.
    pub fn is_a(&self, other: ClassId) -> bool {
        self.heritage.contains(&other)
    }

    pub(crate) fn constructor(&self) -> Option<&Rc<Function>> {
        self.functions.get("constructor")
    }

    pub(crate) fn destructor(&self) -> Option<&Rc<Function>> {
        self.functions.get("destructor")
    }

    /// The delegations for methods or for procs.
    pub(crate) fn delegations(&self, proc: bool) -> &SymbolTable<Rc<Delegation>> {
        if proc {
            &self.delegated_procs
        } else {
            &self.delegated_methods
        }
    }

    pub(crate) fn delegation_cache(&self, proc: bool) -> &HashMap<Rc<str>, Rc<Delegation>> {
        if proc {
            &self.proc_cache
        } else {
            &self.method_cache
        }
    }

    pub(crate) fn delegation_cache_mut(
        &mut self,
        proc: bool,
    ) -> &mut HashMap<Rc<str>, Rc<Delegation>> {
        if proc {
            &mut self.proc_cache
        } else {
            &mut self.method_cache
        }
    }

    pub(crate) fn scope_description(&self) -> String {
        format!("{} \"{}\"", self.kind, self.full_name)
    }
}
