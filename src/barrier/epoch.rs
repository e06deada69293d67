//! GC epochs.
//!
//! An epoch names the stretch of execution between two GC points. A value
//! stamped with the current epoch is the newest object in the heap, or was
//! barriered since the last GC point, and stores into it need no barrier.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Epoch(u32);

impl Epoch {
    /// Older than every real epoch; never fresh.
    pub const PRIMORDIAL: Epoch = Epoch(0);

    /// Epoch every block starts in.
    pub const fn first() -> Self {
        Epoch(1)
    }

    /// The epoch after a GC point.
    #[inline]
    pub fn next(self) -> Self {
        Epoch(self.0.wrapping_add(1).max(1))
    }

    #[inline]
    pub fn bump(&mut self) {
        *self = self.next();
    }

    #[inline]
    pub fn is_primordial(self) -> bool {
        self == Self::PRIMORDIAL
    }

    pub fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Epoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_primordial() {
            f.write_str("primordial")
        } else {
            write!(f, "e{}", self.0)
        }
    }
}

/// Side table of per-instruction epochs, keyed by instruction index.
///
/// Instructions never stamped read as primordial.
#[derive(Debug, Default, Clone)]
pub struct EpochTable {
    epochs: Vec<Epoch>,
}

impl EpochTable {
    pub fn with_capacity(inst_count: usize) -> Self {
        Self {
            epochs: vec![Epoch::PRIMORDIAL; inst_count],
        }
    }

    #[inline]
    pub fn get(&self, index: usize) -> Epoch {
        self.epochs.get(index).copied().unwrap_or(Epoch::PRIMORDIAL)
    }

    pub fn set(&mut self, index: usize, epoch: Epoch) {
        if index >= self.epochs.len() {
            if epoch.is_primordial() {
                return;
            }
            self.epochs.resize(index + 1, Epoch::PRIMORDIAL);
        }
        self.epochs[index] = epoch;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_epoch_ordering() {
        let mut e = Epoch::first();
        assert!(!e.is_primordial());
        assert!(Epoch::PRIMORDIAL < e);
        e.bump();
        assert_eq!(e.raw(), 2);
        assert!(Epoch::first() < e);
        assert_eq!(e.to_string(), "e2");
        assert_eq!(Epoch::PRIMORDIAL.to_string(), "primordial");
    }

    #[test]
    fn test_epoch_table_defaults_to_primordial() {
        let mut table = EpochTable::with_capacity(2);
        assert_eq!(table.get(0), Epoch::PRIMORDIAL);
        assert_eq!(table.get(100), Epoch::PRIMORDIAL);
        table.set(10, Epoch::first());
        assert_eq!(table.get(10), Epoch::first());
        table.set(50, Epoch::PRIMORDIAL);
        assert_eq!(table.get(50), Epoch::PRIMORDIAL);
        table.set(10, Epoch::PRIMORDIAL);
        assert_eq!(table.get(10), Epoch::PRIMORDIAL);
    }
}
