//! Fixed-capacity arena with generation-tagged ids.
//!
//! Control blocks live in a `Registry` owned by the engine instead of global
//! arrays. Every slot carries a generation counter that is bumped on free, so
//! a [`SlotId`] held across a deallocation (a timer token, a queued event)
//! fails to resolve rather than aliasing the slot's next occupant.

use crate::types::SlotId;

#[derive(Debug)]
struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

#[derive(Debug)]
pub struct Registry<T> {
    slots: Vec<Slot<T>>,
}

impl<T> Registry<T> {
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let slots = (0..capacity)
            .map(|_| Slot {
                generation: 0,
                value: None,
            })
            .collect();
        Self { slots }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.value.is_some()).count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Place a value in the lowest free slot. The closure receives the id the
    /// value will live under. Returns `None` when every slot is occupied.
    pub fn insert_with(&mut self, make: impl FnOnce(SlotId) -> T) -> Option<SlotId> {
        let (index, slot) = self
            .slots
            .iter_mut()
            .enumerate()
            .find(|(_, s)| s.value.is_none())?;
        let id = SlotId {
            index,
            generation: slot.generation,
        };
        slot.value = Some(make(id));
        Some(id)
    }

    pub fn insert(&mut self, value: T) -> Option<SlotId> {
        self.insert_with(|_| value)
    }

    #[must_use]
    pub fn get(&self, id: SlotId) -> Option<&T> {
        self.slots
            .get(id.index)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.value.as_ref())
    }

    pub fn get_mut(&mut self, id: SlotId) -> Option<&mut T> {
        self.slots
            .get_mut(id.index)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.value.as_mut())
    }

    #[must_use]
    pub fn contains(&self, id: SlotId) -> bool {
        self.get(id).is_some()
    }

    /// Current id of an occupied slot.
    #[must_use]
    pub fn id_at(&self, index: usize) -> Option<SlotId> {
        self.slots.get(index).and_then(|s| {
            s.value.as_ref().map(|_| SlotId {
                index,
                generation: s.generation,
            })
        })
    }

    /// Free a slot and bump its generation.
    pub fn remove(&mut self, id: SlotId) -> Option<T> {
        let slot = self
            .slots
            .get_mut(id.index)
            .filter(|s| s.generation == id.generation)?;
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        Some(value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (SlotId, &T)> {
        self.slots.iter().enumerate().filter_map(|(index, s)| {
            s.value.as_ref().map(|v| {
                (
                    SlotId {
                        index,
                        generation: s.generation,
                    },
                    v,
                )
            })
        })
    }

    /// First live id whose value matches.
    pub fn find(&self, mut pred: impl FnMut(&T) -> bool) -> Option<SlotId> {
        self.iter().find(|(_, v)| pred(v)).map(|(id, _)| id)
    }
}
