//! Stabile Handles in die Arenen der Szene.
//!
//! Ein Handle besteht aus Slot-Index und Generation. Wird ein Slot
//! freigegeben und neu belegt, erhöht sich die Generation, sodass alte
//! Handles zuverlässig als "tot" erkannt werden.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Roh-Schlüssel (Index + Generation) einer Arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RawKey {
    pub index: u32,
    pub generation: u32,
}

/// Handle auf ein Objekt/Node der Szene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Handle(pub(crate) RawKey);

/// Handle auf einen Wert-Slot (geteilt von allen Objekten, die den Wert halten).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ValueId(pub(crate) RawKey);

/// Handle auf einen registrierten externen Observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(pub(crate) RawKey);

impl Handle {
    /// Slot-Index (nur für Diagnose).
    pub fn index(&self) -> u32 {
        self.0.index
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}v{}", self.0.index, self.0.generation)
    }
}

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "value#{}v{}", self.0.index, self.0.generation)
    }
}

// ── Arena ───────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct ArenaSlot<T> {
    generation: u32,
    item: Option<T>,
}

/// Generische Arena mit Free-List und Generationszählern.
#[derive(Debug, Clone)]
pub(crate) struct Arena<T> {
    slots: Vec<ArenaSlot<T>>,
    free: Vec<u32>,
    len: usize,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            len: 0,
        }
    }
}

impl<T> Arena<T> {
    pub fn insert(&mut self, item: T) -> RawKey {
        self.len += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.generation = slot.generation.wrapping_add(1);
            slot.item = Some(item);
            return RawKey {
                index,
                generation: slot.generation,
            };
        }
        let index = self.slots.len() as u32;
        self.slots.push(ArenaSlot {
            generation: 0,
            item: Some(item),
        });
        RawKey {
            index,
            generation: 0,
        }
    }

    pub fn get(&self, key: RawKey) -> Option<&T> {
        self.slots
            .get(key.index as usize)
            .filter(|slot| slot.generation == key.generation)
            .and_then(|slot| slot.item.as_ref())
    }

    pub fn get_mut(&mut self, key: RawKey) -> Option<&mut T> {
        self.slots
            .get_mut(key.index as usize)
            .filter(|slot| slot.generation == key.generation)
            .and_then(|slot| slot.item.as_mut())
    }

    pub fn contains(&self, key: RawKey) -> bool {
        self.get(key).is_some()
    }

    pub fn remove(&mut self, key: RawKey) -> Option<T> {
        let slot = self.slots.get_mut(key.index as usize)?;
        if slot.generation != key.generation {
            return None;
        }
        let item = slot.item.take()?;
        self.free.push(key.index);
        self.len -= 1;
        Some(item)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn keys(&self) -> impl Iterator<Item = RawKey> + '_ {
        self.slots.iter().enumerate().filter_map(|(i, slot)| {
            slot.item.as_ref().map(|_| RawKey {
                index: i as u32,
                generation: slot.generation,
            })
        })
    }
}
