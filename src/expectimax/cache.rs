use std::collections::HashMap;

use ahash::RandomState;

use crate::engine::{Board, Move};

/// A search position: the board plus how much search is left below it.
///
/// `fours_left` is the remaining four-tile budget when a per-path cap is
/// configured; without a cap it stays constant for the whole search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SearchKey {
    pub board: Board,
    pub depth: u32,
    pub fours_left: u8,
}

/// Expected score of a position and the move that achieves it.
///
/// `direction` is `None` at leaves and at positions with no legal move.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchResult {
    pub score: f64,
    pub direction: Option<Move>,
}

/// Transposition table for one top-level search.
///
/// Build a fresh one per decision; results are only valid for the
/// configuration that produced them.
#[derive(Debug, Default)]
pub struct TranspositionCache {
    map: HashMap<SearchKey, SearchResult, RandomState>,
}

impl TranspositionCache {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn get(&self, key: &SearchKey) -> Option<SearchResult> {
        self.map.get(key).copied()
    }

    #[inline]
    pub fn insert(&mut self, key: SearchKey, result: SearchResult) {
        self.map.insert(key, result);
    }

    pub fn clear(&mut self) {
        self.map.clear();
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_distinguish_depth_and_budget() {
        let board = Board::from_raw(0x1001);
        let mut cache = TranspositionCache::new();
        let key = SearchKey { board, depth: 2, fours_left: 0 };
        cache.insert(key, SearchResult { score: 3.5, direction: Some(Move::Left) });
        assert_eq!(cache.get(&key).map(|r| r.direction), Some(Some(Move::Left)));
        assert!(cache.get(&SearchKey { depth: 1, ..key }).is_none());
        assert!(cache.get(&SearchKey { fours_left: 1, ..key }).is_none());
        assert_eq!(cache.len(), 1);
        cache.clear();
        assert!(cache.is_empty());
    }
}
