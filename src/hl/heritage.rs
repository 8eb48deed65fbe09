//! Walking class hierarchies.

use std::collections::HashSet;

use crate::{ll::arena::Arena, Class, ClassId};

/// Iterates over a class hierarchy from the most specific class to the least specific ones.
///
/// The walk is depth-first over the base class lists, in declaration order. A class reachable
/// through several inheritance paths is visited once per path; use [`HeritageWalk::distinct`]
/// to visit each class once.
pub struct HeritageWalk<'a> {
    classes: &'a Arena<Class>,
    stack: Vec<ClassId>,
}

impl<'a> HeritageWalk<'a> {
    pub fn new(classes: &'a Arena<Class>, start: ClassId) -> Self {
        Self { classes, stack: vec![start] }
    }

    /// Skips classes that have already been visited through another path.
    pub fn distinct(self) -> impl Iterator<Item = ClassId> + 'a {
        let mut seen = HashSet::new();
        self.filter(move |&id| seen.insert(id))
    }
}

impl Iterator for HeritageWalk<'_> {
    type Item = ClassId;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let id = self.stack.pop()?;
            // Classes deleted in the middle of a walk are skipped along with their bases.
            if let Some(class) = self.classes.get(id.0) {
                self.stack.extend(class.bases.iter().rev().copied());
                return Some(id);
            }
        }
    }
}
