//! Fixed-capacity ring buffer for recent thought history.
//!
//! Slots are allocated once at construction. Once full, every `add`
//! overwrites the oldest entry; the buffer is a bounded working set, not an
//! archive.

use crate::error::{AppError, AppResult};

/// Fixed-capacity circular buffer.
///
/// Logical position `i` (0 = oldest) lives in physical slot
/// `(head + capacity - size + i) % capacity`.
#[derive(Debug, Clone)]
pub struct CircularBuffer<T> {
    slots: Vec<Option<T>>,
    /// Next slot to write.
    head: usize,
    size: usize,
}

impl<T> CircularBuffer<T> {
    /// Create an empty buffer holding at most `capacity` items.
    pub fn new(capacity: usize) -> AppResult<Self> {
        if capacity == 0 {
            return Err(AppError::InvalidCapacity { capacity });
        }
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Ok(Self {
            slots,
            head: 0,
            size: 0,
        })
    }

    /// Append an item, overwriting the oldest one when full. O(1).
    pub fn add(&mut self, item: T) {
        let capacity = self.capacity();
        self.slots[self.head] = Some(item);
        self.head = (self.head + 1) % capacity;
        if self.size < capacity {
            self.size += 1;
        }
    }

    /// The most recent `min(limit, size)` items, oldest first.
    ///
    /// `None` returns everything; `Some(0)` returns nothing.
    pub fn get_all(&self, limit: Option<usize>) -> Vec<&T> {
        let count = limit.map_or(self.size, |l| l.min(self.size));
        (self.size - count..self.size)
            .filter_map(|i| self.get(i))
            .collect()
    }

    /// Item at logical position `index` (0 = oldest).
    pub fn get(&self, index: usize) -> Option<&T> {
        if index >= self.size {
            return None;
        }
        self.slots[self.physical_index(index)].as_ref()
    }

    pub fn get_oldest(&self) -> Option<&T> {
        self.get(0)
    }

    pub fn get_newest(&self) -> Option<&T> {
        self.size.checked_sub(1).and_then(|last| self.get(last))
    }

    /// Iterate oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        (0..self.size).filter_map(move |i| self.get(i))
    }

    /// Drop all items. Capacity is kept.
    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
        self.head = 0;
        self.size = 0;
    }

    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn is_full(&self) -> bool {
        self.size == self.capacity()
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn physical_index(&self, logical: usize) -> usize {
        let capacity = self.capacity();
        (self.head + capacity - self.size + logical) % capacity
    }
}
