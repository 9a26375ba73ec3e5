use serde::{Deserialize, Serialize};

use crate::engine::Board;

use super::ConfigError;

/// Score given to a board with no legal move. Every live board scores above it.
pub const LOSS_SCORE: f64 = 0.0;

/// Corner gradient, indexed `[y][x]`, highest at `(0, 0)` and non-increasing
/// along every row and column.
pub const DEFAULT_WEIGHTS: [[u32; 4]; 4] = [
    [40, 29, 27, 25],
    [20, 9, 7, 5],
    [6, 4, 3, 2],
    [3, 2, 1, 1],
];

/// Tunable weights for the static board evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeuristicConfig {
    /// Per-cell multipliers of the tile value, indexed `[y][x]`. Largest at
    /// `(0, 0)` and non-increasing along every row and column.
    pub weights: [[u32; 4]; 4],
    /// Bonus per empty cell. Must be positive.
    pub empty_weight: f64,
    /// Bonus per adjacent pair of equal tiles.
    pub smoothness_weight: f64,
    /// Added in an orientation whose `(0, 0)` cell holds the largest tile.
    pub corner_bonus: Option<f64>,
}

impl Default for HeuristicConfig {
    fn default() -> Self {
        Self {
            weights: DEFAULT_WEIGHTS,
            empty_weight: 8.0,
            smoothness_weight: 8.0,
            corner_bonus: Some(1024.0),
        }
    }
}

impl HeuristicConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.empty_weight.is_finite() && self.empty_weight > 0.0) {
            return Err(ConfigError::EmptyWeight(self.empty_weight));
        }
        if !(self.smoothness_weight.is_finite() && self.smoothness_weight >= 0.0) {
            return Err(ConfigError::SmoothnessWeight(self.smoothness_weight));
        }
        if let Some(bonus) = self.corner_bonus {
            if !(bonus.is_finite() && bonus >= 0.0) {
                return Err(ConfigError::CornerBonus(bonus));
            }
        }
        self.validate_weights()
    }

    /// The gradient must peak at `(0, 0)` and never grow along a row or column.
    fn validate_weights(&self) -> Result<(), ConfigError> {
        let w = &self.weights;
        if w[0][0] == 0 {
            return Err(ConfigError::Weights { x: 0, y: 0 });
        }
        for y in 0..4 {
            for x in 0..4 {
                let grows_right = x < 3 && w[y][x] < w[y][x + 1];
                let grows_down = y < 3 && w[y][x] < w[y + 1][x];
                if grows_right || grows_down {
                    return Err(ConfigError::Weights { x, y });
                }
            }
        }
        Ok(())
    }
}

/// Static evaluation of a leaf board.
///
/// The corner gradient is applied in all 8 orientations and the best one
/// counts, so the score does not depend on which corner the big tiles sit in.
///
/// ```
/// use solver_2048::engine::Board;
/// use solver_2048::expectimax::Heuristic;
/// let h = Heuristic::default();
/// let b = Board::from_rows([[5, 3, 0, 0], [1, 0, 0, 0], [0; 4], [0; 4]]);
/// assert_eq!(h.evaluate(b), h.evaluate(b.rotate()));
/// assert!(h.evaluate(b) > 0.0);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Heuristic {
    cfg: HeuristicConfig,
}

impl Heuristic {
    pub fn new(cfg: HeuristicConfig) -> Self {
        Self { cfg }
    }

    pub fn config(&self) -> &HeuristicConfig {
        &self.cfg
    }

    /// Desirability of `board`; [`LOSS_SCORE`] when no move is left.
    pub fn evaluate(&self, board: Board) -> f64 {
        if !board.moves_available() {
            return LOSS_SCORE;
        }
        let max = board.max_exponent();
        let best = board
            .orientations()
            .iter()
            .map(|&oriented| self.oriented_score(oriented, max))
            .fold(f64::NEG_INFINITY, f64::max);
        let empty = board.count_empty() as f64 * self.cfg.empty_weight;
        let smooth = board.smoothness() as f64 * self.cfg.smoothness_weight;
        best + empty + smooth + board.highest_tile() as f64
    }

    fn oriented_score(&self, board: Board, max: u8) -> f64 {
        let mut sum = 0u64;
        for (y, row) in self.cfg.weights.iter().enumerate() {
            for (x, &weight) in row.iter().enumerate() {
                sum += weight as u64 * board.tile_value(x, y) as u64;
            }
        }
        let corner = match self.cfg.corner_bonus {
            Some(bonus) if max > 0 && board.get(0, 0) == max => bonus,
            _ => 0.0,
        };
        sum as f64 + corner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    #[test]
    fn lost_board_scores_below_every_live_board() {
        let h = Heuristic::default();
        let stuck = Board::from_rows([[1, 2, 1, 2], [2, 1, 2, 1], [1, 2, 1, 2], [2, 1, 2, 1]]);
        assert_eq!(h.evaluate(stuck), LOSS_SCORE);
        let full_but_live = stuck.with_tile(0, 0, 2);
        assert!(h.evaluate(full_but_live) > LOSS_SCORE);
        assert!(h.evaluate(Board::EMPTY) > LOSS_SCORE);
    }

    #[test]
    fn score_is_invariant_under_symmetries() {
        let h = Heuristic::default();
        let mut rng = StdRng::seed_from_u64(17);
        for _ in 0..300 {
            let mut b = Board::EMPTY;
            for i in 0..16 {
                let e = if rng.gen_bool(0.4) { 0 } else { rng.gen_range(1..=11) };
                b.set(i % 4, i / 4, e);
            }
            let score = h.evaluate(b);
            assert_eq!(score, h.evaluate(b.rotate()));
            assert_eq!(score, h.evaluate(b.flip()));
            assert_eq!(score, h.evaluate(b.transpose()));
        }
    }

    #[test]
    fn larger_tiles_nearer_the_corner_score_higher() {
        let h = Heuristic::default();
        let center = Board::from_rows([[1, 0, 0, 0], [0, 6, 0, 0], [0; 4], [0; 4]]);
        let edge = Board::from_rows([[1, 6, 0, 0], [0; 4], [0; 4], [0; 4]]);
        let corner = Board::from_rows([[6, 1, 0, 0], [0; 4], [0; 4], [0; 4]]);
        assert!(h.evaluate(center) < h.evaluate(edge));
        assert!(h.evaluate(edge) < h.evaluate(corner));

        let small = Board::from_rows([[5, 1, 0, 0], [0; 4], [0; 4], [0; 4]]);
        assert!(h.evaluate(small) < h.evaluate(corner));
    }

    #[test]
    fn empty_cells_add_to_the_score() {
        let cfg = HeuristicConfig { corner_bonus: None, smoothness_weight: 0.0, ..Default::default() };
        let h = Heuristic::new(cfg.clone());
        let b = Board::from_rows([[3, 0, 0, 0], [0; 4], [0; 4], [0; 4]]);
        let richer = Heuristic::new(HeuristicConfig { empty_weight: cfg.empty_weight * 2.0, ..cfg });
        assert_eq!(richer.evaluate(b) - h.evaluate(b), 15.0 * 8.0);
    }

    #[test]
    fn validate_rejects_non_positive_empty_weight() {
        let cfg = HeuristicConfig { empty_weight: 0.0, ..Default::default() };
        assert_eq!(cfg.validate(), Err(ConfigError::EmptyWeight(0.0)));
        let cfg = HeuristicConfig { corner_bonus: Some(f64::NAN), ..Default::default() };
        assert!(matches!(cfg.validate(), Err(ConfigError::CornerBonus(_))));
        assert_eq!(HeuristicConfig::default().validate(), Ok(()));
    }

    #[test]
    fn validate_rejects_weights_that_do_not_peak_in_the_corner() {
        let centre_heavy = HeuristicConfig {
            weights: [[1, 1, 1, 1], [1, 50, 50, 1], [1, 50, 50, 1], [1, 1, 1, 1]],
            ..Default::default()
        };
        assert_eq!(centre_heavy.validate(), Err(ConfigError::Weights { x: 1, y: 0 }));

        let zero = HeuristicConfig { weights: [[0; 4]; 4], ..Default::default() };
        assert_eq!(zero.validate(), Err(ConfigError::Weights { x: 0, y: 0 }));

        let mut bump = DEFAULT_WEIGHTS;
        bump[3][2] = 4;
        let bumped = HeuristicConfig { weights: bump, ..Default::default() };
        assert_eq!(bumped.validate(), Err(ConfigError::Weights { x: 2, y: 2 }));

        let flat = HeuristicConfig { weights: [[7; 4]; 4], ..Default::default() };
        assert_eq!(flat.validate(), Ok(()));
        let single = HeuristicConfig { weights: [[1, 0, 0, 0], [0; 4], [0; 4], [0; 4]], ..Default::default() };
        assert_eq!(single.validate(), Ok(()));
    }
}
