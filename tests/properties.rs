use rand::{rngs::StdRng, Rng, SeedableRng};
use solver_2048::engine::{Board, Move};
use solver_2048::expectimax::{
    Expectimax, FourTilePolicy, Heuristic, MovePruning, SearchConfig, TranspositionCache,
};
use solver_2048::{apply_move, choose_move};

/// Boards reached by actually playing, so they look like real positions.
fn corpus(seed: u64, len: usize) -> Vec<Board> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut boards = Vec::with_capacity(len);
    let mut b = Board::EMPTY.with_random_tile(&mut rng).with_random_tile(&mut rng);
    let seq = [Move::Left, Move::Up, Move::Right, Move::Down, Move::Left, Move::Left];
    let mut i = 0;
    while boards.len() < len {
        boards.push(b);
        let dir = seq[i % seq.len()];
        i += 1;
        let nb = b.shift(dir);
        if nb != b {
            b = nb.with_random_tile(&mut rng);
        }
        if b.is_game_over() {
            b = Board::EMPTY.with_random_tile(&mut rng).with_random_tile(&mut rng);
        }
    }
    boards
}

fn random_board(rng: &mut StdRng) -> Board {
    let mut b = Board::EMPTY;
    for i in 0..16 {
        let e = if rng.gen_bool(0.35) { 0 } else { rng.gen_range(1..=12) };
        b.set(i % 4, i / 4, e);
    }
    b
}

#[test]
fn golden_two_tile_opening() {
    let mut b = Board::EMPTY;
    b.set(0, 0, 1);
    b.set(3, 0, 1);

    let (left, moved) = apply_move(b, Move::Left);
    assert!(moved);
    assert_eq!(left.to_rows(), [[2, 0, 0, 0], [0, 0, 0, 0], [0, 0, 0, 0], [0, 0, 0, 0]]);
    assert_eq!(left.raw(), 0x2);

    let (right, moved) = apply_move(b, Move::Right);
    assert!(moved);
    assert_eq!(right.to_rows(), [[0, 0, 0, 2], [0, 0, 0, 0], [0, 0, 0, 0], [0, 0, 0, 0]]);

    let (down, moved) = apply_move(b, Move::Down);
    assert!(moved);
    assert_eq!(down.to_rows(), [[0, 0, 0, 0], [0, 0, 0, 0], [0, 0, 0, 0], [1, 0, 0, 1]]);

    let (up, moved) = apply_move(b, Move::Up);
    assert!(!moved);
    assert_eq!(up, b);
}

#[test]
fn row_examples() {
    let b = Board::from_rows([[1, 1, 0, 0], [0; 4], [0; 4], [0; 4]]);
    let (after, moved) = apply_move(b, Move::Left);
    assert!(moved);
    assert_eq!(after.to_rows()[0], [2, 0, 0, 0]);

    let b = Board::from_rows([[1, 2, 1, 0], [0; 4], [0; 4], [0; 4]]);
    let (after, moved) = apply_move(b, Move::Left);
    assert!(!moved);
    assert_eq!(after.to_rows()[0], [1, 2, 1, 0]);
}

#[test]
fn symmetry_operations_are_involutions() {
    let mut rng = StdRng::seed_from_u64(404);
    for _ in 0..1_000 {
        let b = Board::from_raw(rng.gen());
        assert_eq!(b.rotate().rotate().rotate().rotate().raw(), b.raw());
        assert_eq!(b.transpose().transpose().raw(), b.raw());
        assert_eq!(b.flip().flip().raw(), b.raw());
    }
}

#[test]
fn moved_flag_matches_board_change() {
    let mut rng = StdRng::seed_from_u64(12);
    for _ in 0..1_000 {
        let b = random_board(&mut rng);
        for dir in Move::ALL {
            let (after, moved) = b.apply_move(dir);
            assert_eq!(moved, after != b, "{dir} on {b:?}");
        }
    }
    let locked = Board::from_rows([[1, 2, 3, 4], [2, 3, 4, 5], [0; 4], [0; 4]]);
    let (after, moved) = locked.apply_move(Move::Up);
    assert!(!moved);
    assert_eq!(after, locked);
    assert!(!after.apply_move(Move::Up).1);
}

#[test]
fn lost_boards_have_no_moving_direction() {
    let mut rng = StdRng::seed_from_u64(77);
    let mut lost = 0;
    for _ in 0..20_000 {
        let mut b = Board::EMPTY;
        for i in 0..16 {
            b.set(i % 4, i / 4, rng.gen_range(1..=6));
        }
        if !b.moves_available() {
            lost += 1;
            for dir in Move::ALL {
                assert!(!b.apply_move(dir).1, "{dir} moved {b:?}");
            }
        }
    }
    assert!(lost > 0);
}

#[test]
fn heuristic_is_symmetry_invariant() {
    let h = Heuristic::default();
    for b in corpus(1, 200) {
        let score = h.evaluate(b);
        for o in b.orientations() {
            assert_eq!(score, h.evaluate(o));
        }
    }
}

#[test]
fn chosen_moves_are_always_legal() {
    let configs = [
        SearchConfig { depth: 2, ..Default::default() },
        SearchConfig {
            depth: 2,
            pruning: MovePruning { enabled: true, top_k: 1, gap_ratio: None },
            ..Default::default()
        },
        SearchConfig { depth: 2, relevant_cells: true, ..Default::default() },
        SearchConfig {
            depth: 2,
            four_tile: FourTilePolicy { skip_above_empty: Some(6), max_per_path: Some(1) },
            ..Default::default()
        },
    ];
    let mut rng = StdRng::seed_from_u64(3);
    for cfg in configs {
        let mut ex = Expectimax::with_config(cfg).unwrap();
        for b in corpus(9, 40) {
            let d = ex.best_move(b, &mut rng);
            assert!(!d.fallback, "{b:?}");
            assert!(b.apply_move(d.direction).1, "{} is illegal on {b:?}", d.direction);
        }
        assert_eq!(ex.last_stats().fallbacks, 0);
    }
}

#[test]
fn every_moved_board_has_room_for_a_spawn() {
    let mut rng = StdRng::seed_from_u64(55);
    for _ in 0..5_000 {
        let b = random_board(&mut rng);
        for dir in Move::ALL {
            let (after, moved) = b.apply_move(dir);
            if moved {
                assert!(after.count_empty() > 0, "{dir} on {b:?}");
            }
        }
    }
}

#[test]
fn repeated_evaluation_hits_the_cache() {
    let mut ex = Expectimax::with_config(SearchConfig { depth: 2, ..Default::default() }).unwrap();
    for b in corpus(21, 5) {
        let mut cache = TranspositionCache::new();
        let first = ex.evaluate(b, 2, &mut cache);
        let size = cache.len();
        let second = ex.evaluate(b, 2, &mut cache);
        assert_eq!(first, second);
        assert_eq!(cache.len(), size);
    }
}

#[test]
fn exact_search_is_deterministic() {
    let boards = corpus(8, 10);
    let picks = |seed: u64| -> Vec<(Move, f64)> {
        let mut rng = StdRng::seed_from_u64(seed);
        boards
            .iter()
            .map(|&b| {
                let d = choose_move(b, 2, &mut rng);
                (d.direction, d.score)
            })
            .collect()
    };
    assert_eq!(picks(1), picks(2));
}
