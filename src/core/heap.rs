//! Abstract heaps and instruction effects.
//!
//! The host reports, per instruction, which abstract memory regions it reads
//! and writes. The hierarchy is deliberately shallow:
//!
//! ```text
//! World
//! ├── Stack            (generic, or one concrete slot)
//! ├── SideState
//! └── Heap
//!     ├── JsCellFields
//!     ├── NamedProperties
//!     └── IndexedProperties
//! ```

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeapKind {
    World,
    Stack,
    SideState,
    Heap,
    JsCellFields,
    NamedProperties,
    IndexedProperties,
}

impl HeapKind {
    fn parent(self) -> Option<HeapKind> {
        match self {
            HeapKind::World => None,
            HeapKind::Stack | HeapKind::SideState | HeapKind::Heap => Some(HeapKind::World),
            HeapKind::JsCellFields | HeapKind::NamedProperties | HeapKind::IndexedProperties => {
                Some(HeapKind::Heap)
            }
        }
    }

    /// Whether `self` is `other` or one of its descendants.
    fn is_subkind_of(self, other: HeapKind) -> bool {
        let mut cur = Some(self);
        while let Some(kind) = cur {
            if kind == other {
                return true;
            }
            cur = kind.parent();
        }
        false
    }
}

/// A region of abstract memory.
///
/// Only `Stack` heaps carry a slot; `slot: None` is the whole stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AbstractHeap {
    pub kind: HeapKind,
    pub slot: Option<i32>,
}

impl AbstractHeap {
    pub const WORLD: AbstractHeap = AbstractHeap::new(HeapKind::World);
    pub const HEAP: AbstractHeap = AbstractHeap::new(HeapKind::Heap);
    pub const STACK: AbstractHeap = AbstractHeap::new(HeapKind::Stack);
    pub const SIDE_STATE: AbstractHeap = AbstractHeap::new(HeapKind::SideState);

    pub const fn new(kind: HeapKind) -> Self {
        Self { kind, slot: None }
    }

    pub const fn stack_slot(slot: i32) -> Self {
        Self {
            kind: HeapKind::Stack,
            slot: Some(slot),
        }
    }

    /// A single, statically identified stack slot.
    #[inline]
    pub fn is_precise_stack(&self) -> bool {
        self.kind == HeapKind::Stack && self.slot.is_some()
    }

    pub fn overlaps(&self, other: &AbstractHeap) -> bool {
        if self.kind == other.kind {
            return match (self.slot, other.slot) {
                (Some(a), Some(b)) => a == b,
                _ => true,
            };
        }
        self.kind.is_subkind_of(other.kind) || other.kind.is_subkind_of(self.kind)
    }
}

impl fmt::Display for AbstractHeap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.slot {
            Some(slot) => write!(f, "{:?}({})", self.kind, slot),
            None => write!(f, "{:?}", self.kind),
        }
    }
}

/// Reads and writes of one instruction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Effects {
    pub reads: Vec<AbstractHeap>,
    pub writes: Vec<AbstractHeap>,
}

impl Effects {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn read(mut self, heap: AbstractHeap) -> Self {
        self.reads.push(heap);
        self
    }

    pub fn write(mut self, heap: AbstractHeap) -> Self {
        self.writes.push(heap);
        self
    }

    /// Reads and writes everything.
    pub fn top() -> Self {
        Self::none()
            .read(AbstractHeap::WORLD)
            .write(AbstractHeap::WORLD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_world_overlaps_everything() {
        let named = AbstractHeap::new(HeapKind::NamedProperties);
        assert!(AbstractHeap::WORLD.overlaps(&named));
        assert!(AbstractHeap::WORLD.overlaps(&AbstractHeap::stack_slot(3)));
        assert!(named.overlaps(&AbstractHeap::WORLD));
    }

    #[test]
    fn test_heap_and_stack_are_disjoint() {
        assert!(!AbstractHeap::HEAP.overlaps(&AbstractHeap::STACK));
        assert!(!AbstractHeap::stack_slot(1).overlaps(&AbstractHeap::HEAP));
        assert!(!AbstractHeap::SIDE_STATE.overlaps(&AbstractHeap::HEAP));
    }

    #[test]
    fn test_heap_subkinds() {
        let named = AbstractHeap::new(HeapKind::NamedProperties);
        let indexed = AbstractHeap::new(HeapKind::IndexedProperties);
        assert!(named.overlaps(&AbstractHeap::HEAP));
        assert!(!named.overlaps(&indexed));
    }

    #[test]
    fn test_stack_slots() {
        let a = AbstractHeap::stack_slot(1);
        let b = AbstractHeap::stack_slot(2);
        assert!(a.overlaps(&a));
        assert!(!a.overlaps(&b));
        assert!(a.overlaps(&AbstractHeap::STACK));
        assert!(AbstractHeap::STACK.overlaps(&b));
        assert!(a.is_precise_stack());
        assert!(!AbstractHeap::STACK.is_precise_stack());
    }
}
