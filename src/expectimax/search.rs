use std::cmp::Ordering;
use std::time::{Duration, Instant};

use rand::Rng;

use crate::engine::{self, Board, Move};

use super::cache::{SearchKey, SearchResult, TranspositionCache};
use super::heuristic::{Heuristic, LOSS_SCORE};
use super::{BranchEval, ConfigError, Decision, SearchConfig, SearchStats};
use super::{FOUR_PROBABILITY, TWO_PROBABILITY};

/// Per-call bookkeeping threaded through the recursion.
struct Walk<'c> {
    cache: &'c mut TranspositionCache,
    deadline: Option<Instant>,
    timed_out: bool,
    nodes: u64,
    cache_hits: u64,
}

impl<'c> Walk<'c> {
    fn new(cache: &'c mut TranspositionCache, deadline: Option<Instant>) -> Self {
        Self { cache, deadline, timed_out: false, nodes: 0, cache_hits: 0 }
    }

    /// Sticky: once the budget is gone nothing more is cached, so partial
    /// results never leak into the table.
    fn out_of_time(&mut self) -> bool {
        if !self.timed_out {
            if let Some(deadline) = self.deadline {
                if Instant::now() >= deadline {
                    log::trace!("search budget spent after {} nodes", self.nodes);
                    self.timed_out = true;
                }
            }
        }
        self.timed_out
    }
}

/// Single-threaded Expectimax search.
///
/// Each top-level call builds its own [`TranspositionCache`] and drops it
/// on return. Only [`Self::last_stats`] survives between calls.
#[derive(Debug, Clone)]
pub struct Expectimax {
    cfg: SearchConfig,
    heuristic: Heuristic,
    stats: SearchStats,
}

impl Expectimax {
    pub fn new() -> Self {
        Self::build(SearchConfig::default())
    }

    pub fn with_config(cfg: SearchConfig) -> Result<Self, ConfigError> {
        cfg.validate()?;
        Ok(Self::build(cfg))
    }

    fn build(cfg: SearchConfig) -> Self {
        engine::new();
        let heuristic = Heuristic::new(cfg.heuristic.clone());
        Self { cfg, heuristic, stats: SearchStats::default() }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.cfg
    }

    pub fn heuristic(&self) -> &Heuristic {
        &self.heuristic
    }

    /// Choose a move at the configured depth.
    ///
    /// Equivalent to [`Self::choose_move`] with `self.config().depth`.
    #[inline]
    pub fn best_move<R: Rng + ?Sized>(&mut self, board: Board, rng: &mut R) -> Decision {
        self.choose_move(board, self.cfg.depth, rng)
    }

    /// Choose the move with the highest expected score `depth` layers deep.
    ///
    /// The caller is expected to check [`Board::moves_available`] first. If
    /// no direction is legal anyway, a uniformly random direction is drawn
    /// from `rng` and the decision is flagged as a fallback.
    ///
    /// Example
    /// ```
    /// use solver_2048::engine::{Board, Move};
    /// use solver_2048::expectimax::Expectimax;
    /// use rand::{SeedableRng, rngs::StdRng};
    /// let b = Board::from_rows([[1, 1, 0, 0], [0; 4], [0; 4], [0; 4]]);
    /// let mut ex = Expectimax::new();
    /// let d = ex.choose_move(b, 2, &mut StdRng::seed_from_u64(1));
    /// assert!(b.apply_move(d.direction).1);
    /// ```
    pub fn choose_move<R: Rng + ?Sized>(&mut self, board: Board, depth: u32, rng: &mut R) -> Decision {
        let depth = depth.max(1);
        let mut cache = TranspositionCache::new();
        let mut walk = Walk::new(&mut cache, self.deadline());
        let result = self.evaluate_moves(board, depth, self.root_fours(), &mut walk);
        self.record(&walk);
        log::debug!(
            "depth {depth}: {} nodes, {} cache hits, best {:?} ({:.1})",
            walk.nodes,
            walk.cache_hits,
            result.direction,
            result.score
        );
        match result.direction {
            Some(direction) => Decision { direction, score: result.score, fallback: false },
            None => {
                let direction = Move::ALL[rng.gen_range(0..Move::ALL.len())];
                self.stats.fallbacks += 1;
                log::warn!("no legal move from {board:?}; falling back to {direction}");
                Decision { direction, score: result.score, fallback: true }
            }
        }
    }

    /// Compute EV for each direction (no normalization).
    ///
    /// Returns a fixed array in [`Move::ALL`] order and marks illegal moves
    /// as `legal=false`. Move pruning does not apply at this level.
    pub fn branch_evals(&mut self, board: Board) -> [BranchEval; 4] {
        let depth = self.cfg.depth;
        let mut cache = TranspositionCache::new();
        let mut walk = Walk::new(&mut cache, self.deadline());
        let fours = self.root_fours();
        let out = Move::ALL.map(|dir| {
            let (moved, legal) = board.apply_move(dir);
            if legal {
                let ev = self.evaluate_spawns(moved, dir, depth, fours, &mut walk);
                BranchEval { dir, ev, legal }
            } else {
                BranchEval { dir, ev: 0.0, legal }
            }
        });
        self.record(&walk);
        out
    }

    /// EV at root (max node), equivalent to the best branch EV.
    pub fn state_value(&mut self, board: Board) -> f64 {
        let mut cache = TranspositionCache::new();
        let mut walk = Walk::new(&mut cache, self.deadline());
        let result = self.evaluate_moves(board, self.cfg.depth, self.root_fours(), &mut walk);
        self.record(&walk);
        result.score
    }

    /// Evaluate one search position against a caller-owned cache.
    ///
    /// This is the recursive step the other entry points are built on:
    /// a cached position is returned as stored, depth 0 is scored by the
    /// heuristic, anything else takes the best legal move.
    pub fn evaluate(&mut self, board: Board, depth: u32, cache: &mut TranspositionCache) -> SearchResult {
        let mut walk = Walk::new(cache, self.deadline());
        let result = self.evaluate_node(board, depth, self.root_fours(), &mut walk);
        self.record(&walk);
        result
    }

    /// Statistics collected from the last call to [`Self::choose_move`],
    /// [`Self::branch_evals`], [`Self::state_value`] or [`Self::evaluate`].
    #[inline]
    pub fn last_stats(&self) -> SearchStats {
        self.stats
    }

    /// Reset accumulated stats to zero.
    #[inline]
    pub fn reset_stats(&mut self) {
        self.stats = SearchStats::default();
    }

    fn deadline(&self) -> Option<Instant> {
        self.cfg.time_budget_ms.map(|ms| Instant::now() + Duration::from_millis(ms))
    }

    fn root_fours(&self) -> u8 {
        self.cfg.four_tile.max_per_path.unwrap_or(u8::MAX)
    }

    fn record(&mut self, walk: &Walk<'_>) {
        self.stats.nodes = walk.nodes;
        self.stats.cache_hits = walk.cache_hits;
        self.stats.peak_nodes = self.stats.peak_nodes.max(walk.nodes);
    }

    fn evaluate_node(&self, board: Board, depth: u32, fours_left: u8, walk: &mut Walk<'_>) -> SearchResult {
        walk.nodes += 1;
        let key = SearchKey { board, depth, fours_left };
        if self.cfg.cache_enabled {
            if let Some(hit) = walk.cache.get(&key) {
                walk.cache_hits += 1;
                return hit;
            }
        }
        let result = if depth == 0 || walk.out_of_time() {
            SearchResult { score: self.heuristic.evaluate(board), direction: None }
        } else {
            self.evaluate_moves(board, depth, fours_left, walk)
        };
        if self.cfg.cache_enabled && !walk.timed_out {
            walk.cache.insert(key, result);
        }
        result
    }

    /// Max layer. Ties keep the earlier candidate.
    fn evaluate_moves(&self, board: Board, depth: u32, fours_left: u8, walk: &mut Walk<'_>) -> SearchResult {
        let mut best = SearchResult { score: LOSS_SCORE, direction: None };
        for (dir, moved) in self.candidates(board) {
            let score = self.evaluate_spawns(moved, dir, depth, fours_left, walk);
            if best.direction.is_none() || score > best.score {
                best = SearchResult { score, direction: Some(dir) };
            }
        }
        best
    }

    /// Legal moves from `board`, narrowed by [`super::MovePruning`] when enabled.
    fn candidates(&self, board: Board) -> Vec<(Move, Board)> {
        let legal: Vec<(Move, Board)> = Move::ALL
            .iter()
            .filter_map(|&dir| {
                let (moved, changed) = board.apply_move(dir);
                changed.then_some((dir, moved))
            })
            .collect();
        let pruning = &self.cfg.pruning;
        if !pruning.enabled || legal.len() <= 1 {
            return legal;
        }

        let mut ranked: Vec<(Move, Board, f64)> = legal
            .into_iter()
            .map(|(dir, moved)| (dir, moved, self.heuristic.evaluate(moved)))
            .collect();
        ranked.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap_or(Ordering::Equal));
        ranked.truncate(pruning.top_k);
        if let Some(ratio) = pruning.gap_ratio {
            if ranked.len() > 2 {
                let top = ranked[0].2;
                let lead = top - ranked[1].2;
                if lead > 0.0 {
                    ranked.retain(|c| top - c.2 <= ratio * lead);
                }
            }
        }
        ranked.into_iter().map(|(dir, moved, _)| (dir, moved)).collect()
    }

    /// Chance layer below the board produced by playing `dir`.
    fn evaluate_spawns(&self, moved: Board, dir: Move, depth: u32, fours_left: u8, walk: &mut Walk<'_>) -> f64 {
        let cells = if self.cfg.relevant_cells { moved.relevant_cells(dir.axis()) } else { moved.empty_cells() };
        let count = cells.len();
        debug_assert!(count > 0, "a board that just moved always has an empty cell");
        if count == 0 {
            return self.heuristic.evaluate(moved);
        }

        let policy = &self.cfg.four_tile;
        let crowded_out = policy.skip_above_empty.map_or(false, |limit| moved.count_empty() > limit);
        let spawn_four = fours_left > 0 && !crowded_out;
        let fours_after = if policy.max_per_path.is_some() { fours_left.saturating_sub(1) } else { fours_left };

        let mut total = 0.0;
        for (x, y) in cells {
            let two = self.evaluate_node(moved.with_tile(x, y, 1), depth - 1, fours_left, walk).score;
            if spawn_four {
                let four = self.evaluate_node(moved.with_tile(x, y, 2), depth - 1, fours_after, walk).score;
                total += TWO_PROBABILITY * two + FOUR_PROBABILITY * four;
            } else {
                total += two;
            }
        }
        total / count as f64
    }
}

impl Default for Expectimax {
    fn default() -> Self {
        Self::new()
    }
}
