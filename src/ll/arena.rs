//! Generation-checked storage for long-lived runtime entities.
//!
//! Entries can be *pinned* by whoever is currently using them (for example a call frame that
//! executes a method of a class). Removing a pinned entry *condemns* it instead: the entry is no
//! longer considered live, but stays readable through its index until the last pin is released,
//! at which point it's freed for real.

use std::mem;

/// The index of an entry in an [`Arena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Index {
    slot: u32,
    generation: u32,
}

#[derive(Debug)]
enum Slot<T> {
    Vacant { generation: u32 },
    Live { generation: u32, value: T, pins: u32 },
    Condemned { generation: u32, value: T, pins: u32 },
}

impl<T> Slot<T> {
    fn generation(&self) -> u32 {
        match self {
            Self::Vacant { generation }
            | Self::Live { generation, .. }
            | Self::Condemned { generation, .. } => *generation,
        }
    }
}

/// The outcome of removing an entry.
#[derive(Debug)]
pub enum Removal<T> {
    /// The entry wasn't pinned and has been freed.
    Freed(T),
    /// The entry is pinned; it'll be freed once all pins are released.
    Deferred,
    /// There is no such entry, or it has already been condemned.
    Missing,
}

/// Arena storage with generation-checked indices.
#[derive(Debug)]
pub struct Arena<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    live: usize,
}

impl<T> Arena<T> {
    /// Creates a new, empty arena.
    pub fn new() -> Self {
        Self { slots: Vec::new(), free: Vec::new(), live: 0 }
    }

    /// Returns the number of live entries.
    pub fn len(&self) -> usize {
        self.live
    }

    /// Returns whether there are no live entries.
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Inserts a value and returns its index.
    pub fn insert(&mut self, value: T) -> Index {
        self.live += 1;
        if let Some(slot) = self.free.pop() {
            let entry = &mut self.slots[slot as usize];
            let generation = entry.generation().wrapping_add(1);
            *entry = Slot::Live { generation, value, pins: 0 };
            Index { slot, generation }
        } else {
            let slot = u32::try_from(self.slots.len()).expect("arena index overflow");
            self.slots.push(Slot::Live { generation: 0, value, pins: 0 });
            Index { slot, generation: 0 }
        }
    }

    fn slot(&self, index: Index) -> Option<&Slot<T>> {
        self.slots.get(index.slot as usize).filter(|s| s.generation() == index.generation)
    }

    fn slot_mut(&mut self, index: Index) -> Option<&mut Slot<T>> {
        self.slots.get_mut(index.slot as usize).filter(|s| s.generation() == index.generation)
    }

    /// Returns whether the entry exists and hasn't been condemned.
    pub fn is_live(&self, index: Index) -> bool {
        matches!(self.slot(index), Some(Slot::Live { .. }))
    }

    /// Returns a reference to a live or condemned entry.
    pub fn get(&self, index: Index) -> Option<&T> {
        match self.slot(index)? {
            Slot::Live { value, .. } | Slot::Condemned { value, .. } => Some(value),
            Slot::Vacant { .. } => None,
        }
    }

    /// Returns a mutable reference to a live or condemned entry.
    pub fn get_mut(&mut self, index: Index) -> Option<&mut T> {
        match self.slot_mut(index)? {
            Slot::Live { value, .. } | Slot::Condemned { value, .. } => Some(value),
            Slot::Vacant { .. } => None,
        }
    }

    /// Pins an entry so that removing it is deferred. Returns `false` if there's no such entry.
    pub fn pin(&mut self, index: Index) -> bool {
        match self.slot_mut(index) {
            Some(Slot::Live { pins, .. } | Slot::Condemned { pins, .. }) => {
                *pins += 1;
                true
            }
            _ => false,
        }
    }

    /// Releases a pin. If this was the last pin of a condemned entry, the entry is freed and
    /// returned.
    pub fn unpin(&mut self, index: Index) -> Option<T> {
        let slot = self.slot_mut(index)?;
        match slot {
            Slot::Live { pins, .. } => {
                *pins = pins.saturating_sub(1);
                None
            }
            Slot::Condemned { pins, .. } if *pins > 1 => {
                *pins -= 1;
                None
            }
            Slot::Condemned { .. } => self.free_slot(index),
            Slot::Vacant { .. } => None,
        }
    }

    /// Removes an entry, or condemns it if it's pinned.
    pub fn remove(&mut self, index: Index) -> Removal<T> {
        let Some(slot) = self.slot_mut(index) else { return Removal::Missing };
        match slot {
            Slot::Live { pins: 0, .. } => {
                self.live -= 1;
                match self.free_slot(index) {
                    Some(value) => Removal::Freed(value),
                    None => Removal::Missing,
                }
            }
            Slot::Live { .. } => {
                let generation = index.generation;
                if let Slot::Live { value, pins, .. } =
                    mem::replace(slot, Slot::Vacant { generation })
                {
                    *slot = Slot::Condemned { generation, value, pins };
                }
                self.live -= 1;
                Removal::Deferred
            }
            Slot::Condemned { .. } | Slot::Vacant { .. } => Removal::Missing,
        }
    }

    fn free_slot(&mut self, index: Index) -> Option<T> {
        let slot = self.slots.get_mut(index.slot as usize)?;
        let generation = slot.generation();
        match mem::replace(slot, Slot::Vacant { generation }) {
            Slot::Live { value, .. } | Slot::Condemned { value, .. } => {
                self.free.push(index.slot);
                Some(value)
            }
            Slot::Vacant { .. } => None,
        }
    }

    /// Iterates over all live entries.
    pub fn iter(&self) -> impl Iterator<Item = (Index, &T)> + '_ {
        self.slots.iter().enumerate().filter_map(|(slot, entry)| match entry {
            Slot::Live { generation, value, .. } => {
                Some((Index { slot: slot as u32, generation: *generation }, value))
            }
            _ => None,
        })
    }
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}
