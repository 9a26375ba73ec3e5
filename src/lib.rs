//! solver-2048: a packed 2048 board engine + Expectimax move chooser
//!
//! This crate provides:
//! - A compact `Board` type (16 4-bit exponents in a `u64`) with the move,
//!   symmetry and query operations the search needs (`engine` module)
//! - A configurable single-threaded Expectimax search with a per-decision
//!   transposition cache (`expectimax` module)
//! - A seeded game driver that spawns tiles and plays turns (`game` module)
//!
//! The two entry points a game loop needs are re-exported at the root:
//! [`apply_move`] and [`choose_move`].
//!
//! Quick start:
//! ```
//! use solver_2048::engine::{Board, Move};
//! use solver_2048::{apply_move, choose_move};
//! use rand::{rngs::StdRng, SeedableRng};
//!
//! let b0 = Board::from_rows([[1, 0, 0, 1], [0; 4], [0; 4], [0; 4]]);
//! let (b1, moved) = apply_move(b0, Move::Left);
//! assert!(moved);
//! assert_eq!(b1.to_rows()[0], [2, 0, 0, 0]);
//!
//! let mut rng = StdRng::seed_from_u64(42);
//! let decision = choose_move(b0, 2, &mut rng);
//! assert!(apply_move(b0, decision.direction).1);
//! ```
//!
//! Full loop (simplest possible)
//! ```
//! use solver_2048::expectimax::{Expectimax, SearchConfig};
//! use solver_2048::game::Game;
//! use rand::{rngs::StdRng, SeedableRng};
//!
//! let mut policy = Expectimax::with_config(SearchConfig { depth: 1, ..Default::default() }).unwrap();
//! let mut game = Game::new(123);
//! let mut search_rng = StdRng::seed_from_u64(456);
//! let summary = game.play(&mut policy, &mut search_rng, Some(4), |turn| {
//!     println!("{}\n{}", turn.decision.direction, turn.after);
//! });
//! assert!(summary.moves > 0);
//! ```
//!
pub mod engine;
pub mod expectimax;
pub mod game;

use rand::Rng;

use engine::{Board, Move};
use expectimax::{Decision, Expectimax};

/// Slide `board` in `direction`; the flag is true iff anything moved or merged.
#[inline]
pub fn apply_move(board: Board, direction: Move) -> (Board, bool) {
    engine::apply_move(board, direction)
}

/// Pick the move with the best expected score `depth` layers deep, using the
/// default (exact) search configuration.
///
/// Check [`Board::moves_available`] first: on a lost board the returned
/// decision is a random fallback with `fallback == true`.
pub fn choose_move<R: Rng + ?Sized>(board: Board, depth: u32, rng: &mut R) -> Decision {
    Expectimax::new().choose_move(board, depth, rng)
}
