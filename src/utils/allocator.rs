use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Non-owning reference to a body slot. The generation invalidates the handle
/// once the body is removed, so stale handles resolve to `None` instead of
/// aliasing whatever reuses the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct BodyHandle {
    index: u32,
    generation: u32,
}

impl BodyHandle {
    pub const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    pub fn index(&self) -> usize {
        self.index as usize
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Packs index and generation into one word, used for hashing.
    pub fn to_bits(&self) -> u64 {
        (u64::from(self.generation) << 32) | u64::from(self.index)
    }
}

/// Generational arena that hands out stable handles while preventing use-after-free.
#[derive(Debug, Clone)]
pub struct Arena<T> {
    items: Vec<Option<T>>,
    generations: Vec<u32>,
    free_list: VecDeque<usize>,
    len: usize,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Arena<T> {
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            generations: Vec::new(),
            free_list: VecDeque::new(),
            len: 0,
        }
    }

    pub fn insert(&mut self, item: T) -> BodyHandle {
        self.len += 1;
        if let Some(index) = self.free_list.pop_front() {
            self.items[index] = Some(item);
            return BodyHandle::new(index as u32, self.generations[index]);
        }

        let index = self.items.len();
        self.items.push(Some(item));
        self.generations.push(0);
        BodyHandle::new(index as u32, 0)
    }

    pub fn get(&self, handle: BodyHandle) -> Option<&T> {
        if self.is_valid(handle) {
            self.items.get(handle.index()).and_then(|slot| slot.as_ref())
        } else {
            None
        }
    }

    pub fn get_mut(&mut self, handle: BodyHandle) -> Option<&mut T> {
        if self.is_valid(handle) {
            self.items.get_mut(handle.index()).and_then(|slot| slot.as_mut())
        } else {
            None
        }
    }

    pub fn get2_mut(&mut self, a: BodyHandle, b: BodyHandle) -> Option<(&mut T, &mut T)> {
        if a.index() == b.index() || !self.is_valid(a) || !self.is_valid(b) {
            return None;
        }

        let (first, second, flipped) = if a.index() < b.index() {
            (a, b, false)
        } else {
            (b, a, true)
        };

        let (left, right) = self.items.split_at_mut(second.index());
        let first_slot = left.get_mut(first.index()).and_then(|slot| slot.as_mut())?;
        let second_slot = right.get_mut(0).and_then(|slot| slot.as_mut())?;

        if flipped {
            Some((second_slot, first_slot))
        } else {
            Some((first_slot, second_slot))
        }
    }

    pub fn remove(&mut self, handle: BodyHandle) -> Option<T> {
        if !self.is_valid(handle) {
            return None;
        }
        let index = handle.index();
        let item = self.items.get_mut(index)?.take()?;
        self.generations[index] = self.generations[index].wrapping_add(1);
        self.free_list.push_back(index);
        self.len -= 1;
        Some(item)
    }

    pub fn contains(&self, handle: BodyHandle) -> bool {
        self.get(handle).is_some()
    }

    /// Live items paired with their handles, in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (BodyHandle, &T)> + '_ {
        self.items.iter().enumerate().filter_map(|(index, slot)| {
            slot.as_ref()
                .map(|item| (BodyHandle::new(index as u32, self.generations[index]), item))
        })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (BodyHandle, &mut T)> + '_ {
        let generations = &self.generations;
        self.items.iter_mut().enumerate().filter_map(move |(index, slot)| {
            slot.as_mut()
                .map(|item| (BodyHandle::new(index as u32, generations[index]), item))
        })
    }

    pub fn handles(&self) -> impl Iterator<Item = BodyHandle> + '_ {
        self.iter().map(|(handle, _)| handle)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn is_valid(&self, handle: BodyHandle) -> bool {
        self.generations
            .get(handle.index())
            .is_some_and(|generation| *generation == handle.generation())
    }
}
