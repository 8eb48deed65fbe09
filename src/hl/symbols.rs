//! Ordered symbol tables.

use std::rc::Rc;

use hashbrown::HashMap;

/// A map from names to symbols that remembers declaration order.
#[derive(Debug, Clone)]
pub struct SymbolTable<T> {
    entries: Vec<(Rc<str>, T)>,
    indices: HashMap<Rc<str>, usize>,
}

impl<T> SymbolTable<T> {
    pub fn new() -> Self {
        Self { entries: Vec::new(), indices: HashMap::new() }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.indices.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&T> {
        self.indices.get(name).map(|&index| &self.entries[index].1)
    }

    /// Inserts a symbol. A symbol that already exists is replaced in place, keeping its original
    /// position, and the old symbol is returned.
    pub fn insert(&mut self, name: Rc<str>, symbol: T) -> Option<T> {
        if let Some(&index) = self.indices.get(&name) {
            return Some(std::mem::replace(&mut self.entries[index].1, symbol));
        }
        self.indices.insert(Rc::clone(&name), self.entries.len());
        self.entries.push((name, symbol));
        None
    }

    /// Iterates over the names in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &Rc<str>> + '_ {
        self.entries.iter().map(|(name, _)| name)
    }

    pub fn values(&self) -> impl Iterator<Item = &T> + '_ {
        self.entries.iter().map(|(_, symbol)| symbol)
    }
}

impl<T> Default for SymbolTable<T> {
    fn default() -> Self {
        Self::new()
    }
}
