//! Datablocks: fixed-capacity slabs of same-typed records.
//!
//! A datablock owns one contiguous buffer of `capacity * record_size` bytes.
//! Slots are handed out fresh from a running counter until the block is
//! exhausted, then recycled slots are reissued lowest first. Recycled memory is
//! only reset when the slot is reissued.
//!
//! The buffer is committed lazily on the first slot request and can be
//! released again with [`Datablock::garbage_collect`] once nothing in it is in
//! use.

use crate::error::{Result, TableError};
use crate::record::RecordTypeRef;
use crate::storage::FreeList;
use crate::types::MAX_DATABLOCK_CAPACITY;
use tracing::{debug, warn};

/// A slab of records for one record type
pub struct Datablock {
    /// Record type used to build, reset and tear down our memory
    record: RecordTypeRef,
    /// Backing memory, `None` until first use or after garbage collection
    buffer: Option<Vec<u8>>,
    /// Number of records this block can hold
    capacity: u32,
    /// Cached record size
    record_size: usize,
    /// Next never-issued slot
    next_slot: u32,
    /// Recycled slots
    free: FreeList,
}

impl Datablock {
    /// Create a datablock.
    ///
    /// `desired_capacity` is capped at [`MAX_DATABLOCK_CAPACITY`]. With
    /// `alloc_now` the buffer is committed immediately, otherwise on the first
    /// slot request.
    pub fn new(record: RecordTypeRef, desired_capacity: u32, alloc_now: bool) -> Result<Self> {
        if desired_capacity == 0 {
            return Err(TableError::invalid_operation(format!(
                "datablock for '{}' needs a non-zero capacity",
                record.name()
            )));
        }

        let record_size = record.size();
        if record_size == 0 {
            return Err(TableError::invalid_operation(format!(
                "record type '{}' reports a zero size",
                record.name()
            )));
        }

        let capacity = desired_capacity.min(MAX_DATABLOCK_CAPACITY);
        if capacity != desired_capacity {
            warn!(
                record_type = record.name(),
                desired_capacity, capacity, "datablock capacity capped"
            );
        }

        let mut block = Self {
            record,
            buffer: None,
            capacity,
            record_size,
            next_slot: 0,
            free: FreeList::new(),
        };

        if alloc_now {
            block.alloc();
        }

        Ok(block)
    }

    /// Issue a slot ready to hold a record. Returns `None` when full.
    pub fn new_slot(&mut self) -> Option<u32> {
        if self.buffer.is_none() {
            self.alloc();
        }

        // Fresh slot
        if self.next_slot < self.capacity {
            let slot = self.next_slot;
            self.next_slot += 1;
            return Some(slot);
        }

        // Recycled slot
        let slot = self.free.pop()?;
        let record = self.record.clone();
        if let Some(memory) = self.record_mut(slot) {
            record.clear_one(memory);
        }
        Some(slot)
    }

    /// Return a slot to the block. Its memory is reset when reissued.
    pub fn recycle(&mut self, slot: u32) -> Result<()> {
        if slot >= self.next_slot || self.buffer.is_none() {
            return Err(TableError::invalid_operation(format!(
                "slot {} of '{}' datablock was never issued",
                slot,
                self.record.name()
            )));
        }
        if self.free.contains(slot) {
            return Err(TableError::invalid_operation(format!(
                "slot {} of '{}' datablock recycled twice",
                slot,
                self.record.name()
            )));
        }
        self.free.push(slot);
        Ok(())
    }

    /// Release the buffer if no issued slot is still in use.
    ///
    /// Returns true if memory was released.
    pub fn garbage_collect(&mut self) -> bool {
        if self.buffer.is_some() && self.free.len() == self.next_slot as usize {
            self.dealloc();
            return true;
        }
        false
    }

    /// Record bytes for a slot
    pub fn record(&self, slot: u32) -> Option<&[u8]> {
        if slot >= self.capacity {
            return None;
        }
        let start = slot as usize * self.record_size;
        self.buffer
            .as_ref()
            .map(|buf| &buf[start..start + self.record_size])
    }

    /// Mutable record bytes for a slot
    pub fn record_mut(&mut self, slot: u32) -> Option<&mut [u8]> {
        if slot >= self.capacity {
            return None;
        }
        let start = slot as usize * self.record_size;
        let size = self.record_size;
        self.buffer
            .as_mut()
            .map(|buf| &mut buf[start..start + size])
    }

    /// Number of records this block can hold
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Size of one record in bytes
    pub fn record_size(&self) -> usize {
        self.record_size
    }

    /// Whether the buffer is committed
    pub fn is_allocated(&self) -> bool {
        self.buffer.is_some()
    }

    /// Slots issued and not recycled
    pub fn live_count(&self) -> u32 {
        self.next_slot - self.free.len() as u32
    }

    /// Slots waiting to be reissued
    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    /// Slots that can still be issued
    pub fn available_slots(&self) -> u32 {
        if self.buffer.is_none() {
            return self.capacity;
        }
        (self.capacity - self.next_slot) + self.free.len() as u32
    }

    /// Whether a slot can be issued without growing
    pub fn has_room(&self) -> bool {
        self.available_slots() > 0
    }

    fn alloc(&mut self) {
        debug_assert!(self.buffer.is_none());
        debug_assert!(self.free.is_empty());

        let mut buffer = vec![0u8; self.record_size * self.capacity as usize];
        self.record
            .construct_in_place(&mut buffer, self.capacity as usize);
        self.buffer = Some(buffer);
        self.next_slot = 0;
    }

    fn dealloc(&mut self) {
        let Some(mut buffer) = self.buffer.take() else {
            return;
        };

        // A record type can go stale before its table is torn down. Asking it to
        // destroy records then is unsafe, so skip the call and only free memory.
        if self.record.is_valid() {
            self.record
                .destroy_in_place(&mut buffer, self.capacity as usize);
        } else {
            warn!(
                record_type = self.record.name(),
                "record type went stale before its datablock was released"
            );
        }

        debug!(
            record_type = self.record.name(),
            capacity = self.capacity,
            "datablock released"
        );
        self.next_slot = 0;
        self.free.clear();
    }
}

impl Drop for Datablock {
    fn drop(&mut self) {
        self.dealloc();
    }
}

impl std::fmt::Debug for Datablock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Datablock")
            .field("record_type", &self.record.name())
            .field("capacity", &self.capacity)
            .field("allocated", &self.is_allocated())
            .field("next_slot", &self.next_slot)
            .field("free", &self.free.len())
            .finish()
    }
}
