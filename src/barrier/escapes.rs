//! Values parked in precise stack slots.
//!
//! Storing a fresh value to a known stack slot does not count as an escape:
//! the value keeps its epoch until the slot is read back through an
//! overlapping read, the block ends, or a GC point clears the table. The table
//! has a small fixed capacity; when it is full the oldest entry is evicted and
//! the caller must treat it as escaped.

use crate::core::heap::AbstractHeap;

#[derive(Debug)]
pub struct StackEscapes<I> {
    entries: Vec<(AbstractHeap, I)>,
    capacity: usize,
}

impl<I: Copy + Eq> StackEscapes<I> {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Park `value` in `slot`. A value previously parked in the same slot is
    /// overwritten without escaping. Returns the value evicted when the table
    /// was full; it has escaped.
    pub fn pin(&mut self, slot: AbstractHeap, value: I) -> Option<I> {
        if let Some(entry) = self.entries.iter_mut().find(|(heap, _)| *heap == slot) {
            entry.1 = value;
            return None;
        }
        if self.capacity == 0 {
            return Some(value);
        }
        let evicted = if self.entries.len() >= self.capacity {
            Some(self.entries.remove(0).1)
        } else {
            None
        };
        self.entries.push((slot, value));
        evicted
    }

    /// Remove and return the values whose slots overlap `read`.
    pub fn remove_overlapping(&mut self, read: &AbstractHeap) -> Vec<I> {
        let mut removed = Vec::new();
        self.entries.retain(|(heap, value)| {
            if heap.overlaps(read) {
                removed.push(*value);
                false
            } else {
                true
            }
        });
        removed
    }

    /// Remove and return every parked value.
    pub fn drain(&mut self) -> Vec<I> {
        self.entries.drain(..).map(|(_, value)| value).collect()
    }

    /// Forget every parked value without escaping it.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
impl<I: Copy + Eq> StackEscapes<I> {
    fn len(&self) -> usize {
        self.entries.len()
    }

    fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn contains(&self, value: I) -> bool {
        self.entries.iter().any(|(_, v)| *v == value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pin_same_slot_overwrites() {
        let mut escapes = StackEscapes::new(4);
        assert_eq!(escapes.pin(AbstractHeap::stack_slot(1), 10u32), None);
        assert_eq!(escapes.pin(AbstractHeap::stack_slot(1), 11), None);
        assert_eq!(escapes.len(), 1);
        assert!(escapes.contains(11));
        assert!(!escapes.contains(10));
    }

    #[test]
    fn test_full_table_evicts_oldest() {
        let mut escapes = StackEscapes::new(2);
        assert_eq!(escapes.pin(AbstractHeap::stack_slot(1), 1u32), None);
        assert_eq!(escapes.pin(AbstractHeap::stack_slot(2), 2), None);
        assert_eq!(escapes.pin(AbstractHeap::stack_slot(3), 3), Some(1));
        assert_eq!(escapes.len(), 2);
        assert!(escapes.contains(2) && escapes.contains(3));
    }

    #[test]
    fn test_zero_capacity_escapes_immediately() {
        let mut escapes = StackEscapes::new(0);
        assert_eq!(escapes.pin(AbstractHeap::stack_slot(1), 7u32), Some(7));
        assert!(escapes.is_empty());
    }

    #[test]
    fn test_remove_overlapping() {
        let mut escapes = StackEscapes::new(8);
        escapes.pin(AbstractHeap::stack_slot(1), 1u32);
        escapes.pin(AbstractHeap::stack_slot(2), 2);
        assert_eq!(escapes.remove_overlapping(&AbstractHeap::stack_slot(2)), vec![2]);
        assert!(escapes.remove_overlapping(&AbstractHeap::HEAP).is_empty());
        escapes.pin(AbstractHeap::stack_slot(3), 3);
        let mut all = escapes.remove_overlapping(&AbstractHeap::STACK);
        all.sort();
        assert_eq!(all, vec![1, 3]);
        assert!(escapes.is_empty());
    }

    #[test]
    fn test_drain_and_clear() {
        let mut escapes = StackEscapes::new(8);
        escapes.pin(AbstractHeap::stack_slot(1), 1u32);
        escapes.pin(AbstractHeap::stack_slot(2), 2);
        assert_eq!(escapes.drain(), vec![1, 2]);
        escapes.pin(AbstractHeap::stack_slot(1), 1);
        escapes.clear();
        assert!(escapes.drain().is_empty());
    }
}
