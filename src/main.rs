use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use rand::{rngs::StdRng, SeedableRng};
use rayon::prelude::*;
use solver_2048::engine::{self as GameEngine, Board};
use solver_2048::expectimax::{Expectimax, SearchConfig};
use solver_2048::game::{Game, GameSummary};
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::{Duration, Instant};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    GameEngine::new();
    match cli.cmd {
        Cmd::Play { seed, search_seed, steps, quiet, search } => {
            run_play(&mut io::stdout().lock(), seed, search_seed, steps, quiet, search.to_config()?)
        }
        Cmd::Batch { games, seed, threads, steps, quiet, search } => {
            run_batch(games, seed, threads, steps, quiet, search.to_config()?)
        }
        Cmd::Analyze { board, search } => run_analyze(&board, search.to_config()?),
    }
}

#[derive(Debug, Parser)]
#[command(name = "solver-2048", about = "2048 expectimax solver")]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Debug, Subcommand)]
enum Cmd {
    /// Play one game, printing every board and move
    Play {
        /// Seed for tile spawns (random when omitted)
        #[arg(long)]
        seed: Option<u64>,
        /// Seed for the search's fallback generator
        #[arg(long, default_value_t = 0)]
        search_seed: u64,
        /// Stop after this many moves
        #[arg(long)]
        steps: Option<u64>,
        /// Only print the final summary
        #[arg(long)]
        quiet: bool,
        #[command(flatten)]
        search: SearchArgs,
    },
    /// Play many independent games in parallel and summarize them
    Batch {
        /// Number of games
        #[arg(long, default_value_t = 16)]
        games: u64,
        /// Base seed; game i uses seed + i
        #[arg(long, default_value_t = 0)]
        seed: u64,
        /// Worker threads (rayon default when omitted)
        #[arg(long)]
        threads: Option<usize>,
        /// Per-game: stop after this many moves
        #[arg(long)]
        steps: Option<u64>,
        /// Suppress the progress bar
        #[arg(long)]
        quiet: bool,
        #[command(flatten)]
        search: SearchArgs,
    },
    /// Show the expected value of every move from one board
    Analyze {
        /// 16 hex exponents, row-major from the top-left cell, e.g. 1001/0000/0000/0002
        board: String,
        #[command(flatten)]
        search: SearchArgs,
    },
}

#[derive(Debug, Args)]
struct SearchArgs {
    /// JSON search configuration; flags below override it
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Search depth (move + spawn layers)
    #[arg(long)]
    depth: Option<u32>,
    /// Disable the transposition cache
    #[arg(long)]
    no_cache: bool,
    /// Keep only the best-ranked moves at each max layer
    #[arg(long)]
    prune: bool,
    /// Moves kept by --prune
    #[arg(long)]
    top_k: Option<usize>,
    /// Drop moves further behind the best than this multiple of the runner-up gap
    #[arg(long)]
    gap_ratio: Option<f64>,
    /// Spawn only in one cell per run of adjacent empty cells
    #[arg(long)]
    relevant_cells: bool,
    /// Skip 4-tile spawns when more than this many cells are empty
    #[arg(long)]
    skip_four_above: Option<usize>,
    /// Explore at most this many 4-tile spawns along one path
    #[arg(long)]
    max_fours: Option<u8>,
    /// Per-move time budget in milliseconds
    #[arg(long)]
    time_budget_ms: Option<u64>,
}

impl SearchArgs {
    fn to_config(&self) -> anyhow::Result<SearchConfig> {
        let mut cfg: SearchConfig = match &self.config {
            Some(path) => {
                let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
                serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?
            }
            None => SearchConfig::default(),
        };
        if let Some(depth) = self.depth {
            cfg.depth = depth;
        }
        if self.no_cache {
            cfg.cache_enabled = false;
        }
        if self.prune {
            cfg.pruning.enabled = true;
        }
        if let Some(k) = self.top_k {
            cfg.pruning.top_k = k;
        }
        if let Some(ratio) = self.gap_ratio {
            cfg.pruning.gap_ratio = Some(ratio);
        }
        if self.relevant_cells {
            cfg.relevant_cells = true;
        }
        if let Some(limit) = self.skip_four_above {
            cfg.four_tile.skip_above_empty = Some(limit);
        }
        if let Some(limit) = self.max_fours {
            cfg.four_tile.max_per_path = Some(limit);
        }
        if let Some(ms) = self.time_budget_ms {
            cfg.time_budget_ms = Some(ms);
        }
        cfg.validate()?;
        Ok(cfg)
    }
}

fn run_play<W: Write>(
    out: &mut W,
    seed: Option<u64>,
    search_seed: u64,
    steps: Option<u64>,
    quiet: bool,
    cfg: SearchConfig,
) -> anyhow::Result<()> {
    let seed = seed.unwrap_or_else(rand::random);
    let mut policy = Expectimax::with_config(cfg)?;
    let mut search_rng = StdRng::seed_from_u64(search_seed);
    let mut game = Game::new(seed);
    let start = Instant::now();
    if !quiet {
        writeln!(out, "seed {seed}\n{}", game.board())?;
    }
    let mut write_err = None;
    let summary = game.play(&mut policy, &mut search_rng, steps, |turn| {
        if turn.decision.fallback {
            eprintln!("warning: no legal move from {:?}, played {} at random", turn.before, turn.decision.direction);
        }
        if !quiet && write_err.is_none() {
            let line = writeln!(
                out,
                "Move {}: {} (expected {:.1})\n{}",
                turn.number, turn.decision.direction, turn.decision.score, turn.after
            );
            write_err = line.err();
        }
    });
    if let Some(err) = write_err {
        return Err(err.into());
    }
    let elapsed = start.elapsed().as_secs_f64().max(1e-6);
    // Verbose mode already showed the last board after its move.
    if quiet {
        writeln!(out, "{}", game.board())?;
    }
    writeln!(
        out,
        "Moves: {} | moves/sec: {:.1} | score: {} | highest tile: {} | peak states for a move: {}",
        summary.moves,
        summary.moves as f64 / elapsed,
        summary.score,
        summary.highest_tile,
        policy.last_stats().peak_nodes
    )?;
    Ok(())
}

fn run_batch(
    games: u64,
    seed: u64,
    threads: Option<usize>,
    steps: Option<u64>,
    quiet: bool,
    cfg: SearchConfig,
) -> anyhow::Result<()> {
    let mut builder = rayon::ThreadPoolBuilder::new();
    if let Some(n) = threads {
        builder = builder.num_threads(n);
    }
    let pool = builder.build()?;
    let pb = if quiet {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new(games);
        pb.set_style(
            ProgressStyle::with_template("{spinner} {elapsed_precise} [{bar:30}] {pos}/{len} games | {msg}")?
                .tick_chars("⠁⠃⠇⠧⠷⠿⠻⠟⠯⠷⠧⠇⠃"),
        );
        pb.enable_steady_tick(Duration::from_millis(120));
        pb
    };

    let start = Instant::now();
    let summaries: Vec<GameSummary> = pool.install(|| {
        (0..games)
            .into_par_iter()
            .map(|i| -> anyhow::Result<GameSummary> {
                let game_seed = seed.wrapping_add(i);
                let mut policy = Expectimax::with_config(cfg.clone())?;
                let mut search_rng = StdRng::seed_from_u64(game_seed.rotate_left(32));
                let summary = Game::new(game_seed).play(&mut policy, &mut search_rng, steps, |_| {});
                pb.inc(1);
                pb.set_message(format!("last: {} pts, {} tile", summary.score, summary.highest_tile));
                Ok(summary)
            })
            .collect::<anyhow::Result<Vec<_>>>()
    })?;
    pb.finish_and_clear();

    print_batch_summary(&summaries, start.elapsed().as_secs_f64().max(1e-6));
    Ok(())
}

fn print_batch_summary(summaries: &[GameSummary], elapsed: f64) {
    if summaries.is_empty() {
        println!("No games played");
        return;
    }
    let n = summaries.len() as f64;
    let total_moves: u64 = summaries.iter().map(|s| s.moves).sum();
    let mean_score = summaries.iter().map(|s| s.score as f64).sum::<f64>() / n;
    let best = summaries.iter().map(|s| s.score).max().unwrap_or(0);
    let fallbacks: u64 = summaries.iter().map(|s| s.fallbacks).sum();
    let mut tiles: BTreeMap<u32, usize> = BTreeMap::new();
    for s in summaries {
        *tiles.entry(s.highest_tile).or_default() += 1;
    }
    println!(
        "Games: {} | moves: {} | moves/sec: {:.1} | mean score: {:.1} | best score: {} | fallbacks: {}",
        summaries.len(),
        total_moves,
        total_moves as f64 / elapsed,
        mean_score,
        best,
        fallbacks
    );
    for (tile, count) in tiles.iter().rev() {
        println!("{:>6}: {:>5} ({:.1}%)", tile, count, 100.0 * *count as f64 / n);
    }
}

fn run_analyze(text: &str, cfg: SearchConfig) -> anyhow::Result<()> {
    let board: Board = text.parse().with_context(|| format!("invalid board {text:?}"))?;
    println!("{board}");
    if !board.moves_available() {
        println!("No moves available");
        return Ok(());
    }
    let mut policy = Expectimax::with_config(cfg)?;
    for branch in policy.branch_evals(board) {
        if branch.legal {
            println!("{:>5}: {:.2}", branch.dir, branch.ev);
        } else {
            println!("{:>5}: illegal", branch.dir);
        }
    }
    let stats = policy.last_stats();
    let decision = policy.best_move(board, &mut StdRng::seed_from_u64(0));
    println!(
        "Best: {} ({:.2}) | states: {} | cache hits: {}",
        decision.direction, decision.score, stats.nodes, stats.cache_hits
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn play_output(quiet: bool) -> (String, Board) {
        let cfg = SearchConfig { depth: 1, ..Default::default() };
        let mut out = Vec::new();
        run_play(&mut out, Some(11), 0, Some(5), quiet, cfg.clone()).unwrap();
        let mut policy = Expectimax::with_config(cfg).unwrap();
        let summary = Game::new(11).play(&mut policy, &mut StdRng::seed_from_u64(0), Some(5), |_| {});
        (String::from_utf8(out).unwrap(), summary.final_board)
    }

    #[test]
    fn play_prints_the_final_board_once() {
        for quiet in [false, true] {
            let (text, last) = play_output(quiet);
            assert_eq!(text.matches(&last.to_string()).count(), 1, "quiet={quiet}\n{text}");
            assert!(text.contains("Moves: 5 |"), "{text}");
        }
    }

    #[test]
    fn verbose_play_prints_every_turn() {
        let (text, _) = play_output(false);
        assert!(text.starts_with("seed 11\n"));
        assert_eq!(text.matches("Move ").count(), 5);
        let (quiet, _) = play_output(true);
        assert_eq!(quiet.matches("Move ").count(), 0);
    }
}
