use std::ops::{Index, IndexMut};

/// Dense per-block storage keyed by block index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockMap<T> {
    entries: Vec<T>,
}

impl<T> BlockMap<T> {
    /// One entry per block, built by `init`.
    pub fn from_fn(block_count: usize, init: impl FnMut(usize) -> T) -> Self {
        Self {
            entries: (0..block_count).map(init).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, block_index: usize) -> Option<&T> {
        self.entries.get(block_index)
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &T)> {
        self.entries.iter().enumerate()
    }
}

impl<T: Default> BlockMap<T> {
    pub fn new(block_count: usize) -> Self {
        Self::from_fn(block_count, |_| T::default())
    }
}

impl<T> Index<usize> for BlockMap<T> {
    type Output = T;

    fn index(&self, block_index: usize) -> &T {
        &self.entries[block_index]
    }
}

impl<T> IndexMut<usize> for BlockMap<T> {
    fn index_mut(&mut self, block_index: usize) -> &mut T {
        &mut self.entries[block_index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_map_indexing() {
        let mut map: BlockMap<Vec<u32>> = BlockMap::new(3);
        map[1].push(5);
        assert_eq!(map.len(), 3);
        assert_eq!(map[1], vec![5]);
        assert!(map[0].is_empty());
        assert!(map.get(3).is_none());
    }

    #[test]
    fn test_block_map_from_fn() {
        let map = BlockMap::from_fn(4, |i| i * 2);
        let collected: Vec<_> = map.iter().map(|(i, v)| (i, *v)).collect();
        assert_eq!(collected, vec![(0, 0), (1, 2), (2, 4), (3, 6)]);
    }
}
