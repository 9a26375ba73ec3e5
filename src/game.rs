//! A live game: the board, its tile-spawning RNG and the turn loop.
//!
//! The game's RNG only spawns tiles. Searches take their own RNG so a game
//! replays identically for a given pair of seeds.

use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::engine::{Board, Move};
use crate::expectimax::{Decision, Expectimax};

/// One accepted turn, reported to the observer passed to [`Game::play`].
#[derive(Debug, Clone, Copy)]
pub struct Turn {
    pub number: u64,
    pub before: Board,
    pub decision: Decision,
    /// Board after the move and the tile spawned behind it.
    pub after: Board,
}

/// Outcome of a finished (or truncated) game.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameSummary {
    pub moves: u64,
    pub score: u64,
    pub highest_tile: u32,
    pub final_board: Board,
    pub fallbacks: u64,
    /// True when the game ended because no move was left.
    pub finished: bool,
}

#[derive(Debug, Clone)]
pub struct Game {
    board: Board,
    rng: StdRng,
    moves: u64,
}

impl Game {
    /// Start from two random tiles drawn from a generator seeded with `seed`.
    ///
    /// ```
    /// use solver_2048::game::Game;
    /// let a = Game::new(42);
    /// assert_eq!(a.board(), Game::new(42).board());
    /// assert_eq!(a.board().count_empty(), 14);
    /// ```
    pub fn new(seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let board = Board::EMPTY.with_random_tile(&mut rng).with_random_tile(&mut rng);
        Self { board, rng, moves: 0 }
    }

    /// Continue from an existing position.
    pub fn from_board(board: Board, seed: u64) -> Self {
        Self { board, rng: StdRng::seed_from_u64(seed), moves: 0 }
    }

    #[inline]
    pub fn board(&self) -> Board {
        self.board
    }

    #[inline]
    pub fn moves(&self) -> u64 {
        self.moves
    }

    #[inline]
    pub fn is_over(&self) -> bool {
        self.board.is_game_over()
    }

    /// Play `dir`. A move that changes nothing is rejected and spawns no tile.
    pub fn step(&mut self, dir: Move) -> bool {
        let (next, moved) = self.board.apply_move(dir);
        if moved {
            self.board = next.with_random_tile(&mut self.rng);
            self.moves += 1;
        }
        moved
    }

    /// Let `policy` play until no move is left or `max_moves` turns were made.
    ///
    /// `search_rng` only feeds the policy's fallback path. A fallback
    /// direction that does not move the board ends the game.
    pub fn play<R, F>(
        &mut self,
        policy: &mut Expectimax,
        search_rng: &mut R,
        max_moves: Option<u64>,
        mut on_turn: F,
    ) -> GameSummary
    where
        R: Rng + ?Sized,
        F: FnMut(&Turn),
    {
        let mut fallbacks = 0;
        while !self.is_over() {
            if max_moves.map_or(false, |limit| self.moves >= limit) {
                break;
            }
            let before = self.board;
            let decision = policy.best_move(before, search_rng);
            if decision.fallback {
                fallbacks += 1;
            }
            if !self.step(decision.direction) {
                break;
            }
            on_turn(&Turn { number: self.moves, before, decision, after: self.board });
        }
        GameSummary {
            moves: self.moves,
            score: self.board.score(),
            highest_tile: self.board.highest_tile(),
            final_board: self.board,
            fallbacks,
            finished: self.is_over(),
        }
    }
}
