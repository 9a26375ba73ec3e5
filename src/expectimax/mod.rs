//! Expectimax move selection for 2048.
//!
//! [`Expectimax`] alternates max layers (the player picks a direction) with
//! chance layers (a 2 or a 4 spawns in an empty cell) down to a fixed depth
//! and scores the leaves with [`Heuristic`].
//!
//! Notes
//! - The search is deterministic. The only randomness is the fallback
//!   direction drawn when the root has no legal move, and that comes from
//!   the RNG the caller passes in.
//! - Every branch-reduction shortcut ([`MovePruning`], relevant cells,
//!   [`FourTilePolicy`]) is off by default, so the default search is exact.
//!
//! Quick start
//! ```
//! use solver_2048::engine::Board;
//! use solver_2048::expectimax::{Expectimax, SearchConfig};
//! use rand::{rngs::StdRng, SeedableRng};
//!
//! let mut game_rng = StdRng::seed_from_u64(123);
//! let b0 = Board::EMPTY
//!     .with_random_tile(&mut game_rng)
//!     .with_random_tile(&mut game_rng);
//!
//! let cfg = SearchConfig { depth: 2, ..Default::default() };
//! let mut ex = Expectimax::with_config(cfg).unwrap();
//! let mut search_rng = StdRng::seed_from_u64(7);
//! let decision = ex.best_move(b0, &mut search_rng);
//! assert!(!decision.fallback);
//! assert!(b0.apply_move(decision.direction).1);
//! ```

use serde::{Deserialize, Serialize};

use crate::engine::Move;

mod cache;
mod heuristic;
mod search;

pub use cache::{SearchKey, SearchResult, TranspositionCache};
pub use heuristic::{Heuristic, HeuristicConfig, DEFAULT_WEIGHTS, LOSS_SCORE};
pub use search::Expectimax;

/// Probability that a spawned tile is a 2.
pub const TWO_PROBABILITY: f64 = 0.9;
/// Probability that a spawned tile is a 4.
pub const FOUR_PROBABILITY: f64 = 0.1;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("search depth must be at least 1")]
    ZeroDepth,
    #[error("move pruning needs top_k >= 1")]
    ZeroTopK,
    #[error("gap ratio must be a finite number >= 1, got {0}")]
    GapRatio(f64),
    #[error("empty-cell weight must be positive, got {0}")]
    EmptyWeight(f64),
    #[error("smoothness weight must be non-negative, got {0}")]
    SmoothnessWeight(f64),
    #[error("corner bonus must be non-negative, got {0}")]
    CornerBonus(f64),
    #[error("weights must be non-zero and non-increasing away from (0, 0); ({x}, {y}) breaks it")]
    Weights { x: usize, y: usize },
}

/// Configurable knobs for Expectimax. Defaults give an exact depth-4 search.
///
/// - `depth`: number of move + spawn layers searched below the root.
/// - `cache_enabled`: enable/disable transposition table usage.
/// - `pruning`: keep only the most promising moves at each max layer.
/// - `relevant_cells`: spawn only in one cell per run of adjacent empties.
/// - `four_tile`: when to skip the 4-tile spawn branch.
/// - `time_budget_ms`: optional wall-clock budget per decision.
/// - `heuristic`: leaf evaluation weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub depth: u32,
    pub cache_enabled: bool,
    pub pruning: MovePruning,
    /// Spawn only in the first cell of each run of adjacent empty cells,
    /// runs taken along the axis of the move just played.
    pub relevant_cells: bool,
    pub four_tile: FourTilePolicy,
    /// Once spent, remaining nodes are scored by the heuristic directly.
    pub time_budget_ms: Option<u64>,
    pub heuristic: HeuristicConfig,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            depth: 4,
            cache_enabled: true,
            pruning: MovePruning::default(),
            relevant_cells: false,
            four_tile: FourTilePolicy::default(),
            time_budget_ms: None,
            heuristic: HeuristicConfig::default(),
        }
    }
}

impl SearchConfig {
    /// Check every threshold, returning the first violation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.depth == 0 {
            return Err(ConfigError::ZeroDepth);
        }
        self.pruning.validate()?;
        self.heuristic.validate()
    }
}

/// Top-K move pruning, ranked by the immediate heuristic of each moved board.
///
/// After keeping the `top_k` best candidates, a candidate is also dropped
/// when its distance to the best exceeds `gap_ratio` times the distance
/// between the best and the runner-up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MovePruning {
    pub enabled: bool,
    pub top_k: usize,
    pub gap_ratio: Option<f64>,
}

impl Default for MovePruning {
    fn default() -> Self {
        Self { enabled: false, top_k: 3, gap_ratio: Some(4.0) }
    }
}

impl MovePruning {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.top_k == 0 {
            return Err(ConfigError::ZeroTopK);
        }
        if let Some(ratio) = self.gap_ratio {
            if !(ratio.is_finite() && ratio >= 1.0) {
                return Err(ConfigError::GapRatio(ratio));
            }
        }
        Ok(())
    }
}

/// When to skip the 4-tile spawn. A skipped branch hands its weight to the
/// 2-tile spawn in the same cell.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FourTilePolicy {
    /// Skip when the board has more than this many empty cells.
    pub skip_above_empty: Option<usize>,
    /// Explore at most this many 4-tile spawns along one search path.
    pub max_per_path: Option<u8>,
}

/// Per-branch expected value at the root (no normalization).
///
/// - `ev` is the expected value for taking `dir` from the current board.
/// - `legal` is false when the move is a no-op for the current board.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BranchEval {
    pub dir: Move,
    pub ev: f64,
    pub legal: bool,
}

/// The move chosen for a board.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decision {
    pub direction: Move,
    /// Expected heuristic score of playing `direction`.
    pub score: f64,
    /// True when no direction was legal and `direction` was drawn at random.
    pub fallback: bool,
}

/// Basic search stats for a single evaluation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchStats {
    pub nodes: u64,
    pub cache_hits: u64,
    pub peak_nodes: u64,
    /// Decisions that fell back to a random direction since the last reset.
    pub fallbacks: u64,
}
