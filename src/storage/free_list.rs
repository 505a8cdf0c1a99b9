//! Free slot management.
//!
//! Tracks recycled datablock slots so they can be handed out again. The
//! lowest slot is always reissued first, which keeps live records packed
//! toward the front of a datablock.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// Min-ordered set of recycled slots
#[derive(Debug, Default)]
pub struct FreeList {
    /// Min-heap of free slot indices
    slots: BinaryHeap<Reverse<u32>>,
}

impl FreeList {
    /// Create a new empty free list
    pub fn new() -> Self {
        Self {
            slots: BinaryHeap::new(),
        }
    }

    /// Add a slot to the free list
    pub fn push(&mut self, slot: u32) {
        self.slots.push(Reverse(slot));
    }

    /// Take the lowest free slot, if any
    pub fn pop(&mut self) -> Option<u32> {
        self.slots.pop().map(|Reverse(slot)| slot)
    }

    /// Check whether a slot is currently free
    pub fn contains(&self, slot: u32) -> bool {
        self.slots.iter().any(|&Reverse(s)| s == slot)
    }

    /// Get the number of free slots
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Check if the free list is empty
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Forget every free slot
    pub fn clear(&mut self) {
        self.slots.clear();
    }
}
