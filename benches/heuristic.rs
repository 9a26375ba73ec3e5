use criterion::{criterion_group, criterion_main, Criterion};
use rand::{rngs::StdRng, SeedableRng};
use solver_2048::engine::{self as GameEngine, Board, Move};
use solver_2048::expectimax::{Heuristic, HeuristicConfig};
use std::hint::black_box;

fn warm() {
    GameEngine::new();
}

fn corpus() -> Vec<Board> {
    let mut rng = StdRng::seed_from_u64(1337);
    let mut boards = Vec::new();
    boards.push(Board::EMPTY);
    let mut b = Board::EMPTY.with_random_tile(&mut rng).with_random_tile(&mut rng);
    boards.push(b);
    let seq = [Move::Left, Move::Up, Move::Right, Move::Down];
    for i in 0..24 {
        let dir = seq[i % seq.len()];
        let nb = b.shift(dir);
        if nb != b {
            b = nb.with_random_tile(&mut rng);
        }
        boards.push(b);
    }
    boards
}

fn bench_heuristic(c: &mut Criterion) {
    warm();
    let boards = corpus();
    let full = Heuristic::default();
    let no_corner = Heuristic::new(HeuristicConfig { corner_bonus: None, ..Default::default() });

    c.bench_function("heuristic/evaluate", |bch| {
        bch.iter(|| {
            let mut acc = 0f64;
            for &bd in &boards {
                acc = acc.mul_add(1.000_000_1, full.evaluate(bd));
            }
            black_box(acc)
        })
    });

    c.bench_function("heuristic/evaluate_no_corner", |bch| {
        bch.iter(|| {
            let mut acc = 0f64;
            for &bd in &boards {
                acc = acc.mul_add(1.000_000_1, no_corner.evaluate(bd));
            }
            black_box(acc)
        })
    });

    c.bench_function("heuristic/orientations", |bch| {
        bch.iter(|| {
            let mut acc = 0u64;
            for &bd in &boards {
                for o in bd.orientations() {
                    acc ^= o.raw();
                }
            }
            black_box(acc)
        })
    });
}

criterion_group!(heuristic, bench_heuristic);
criterion_main!(heuristic);
