//! Yokai-Rust: a 3x4 mini-shogi engine.
//!
//! ## Usage
//!
//! - `yokai-rust` - Show a demo
//! - `yokai-rust play` - Start the text protocol on stdin/stdout
//! - `yokai-rust selfplay` - Let the engine play both sides
//! - `yokai-rust demo` - Run the search demo

use std::io::Write;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use yokai_rust::competitor::Competitor;
use yokai_rust::constants::{DEFAULT_DEPTH, REPETITION_LIMIT};
use yokai_rust::game::{Game, MoveRecord, RepetitionRule};
use yokai_rust::piece::Player;
use yokai_rust::protocol::Session;
use yokai_rust::search::{Budget, CancelToken, search};

/// Yokai-Rust: a 3x4 mini-shogi negamax engine
#[derive(Parser)]
#[command(name = "yokai-rust")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Search depth in plies
    #[arg(long, global = true)]
    depth: Option<u32>,

    /// Search time per move in milliseconds (overrides --depth)
    #[arg(long, global = true)]
    time_ms: Option<u64>,

    /// Starting position encoding
    #[arg(long, global = true)]
    position: Option<String>,

    /// Seed for random choices
    #[arg(long, global = true)]
    seed: Option<u64>,

    /// Back-and-forth moves before a draw is declared
    #[arg(long, global = true, default_value_t = REPETITION_LIMIT)]
    repetition_limit: u32,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the text protocol for use with a front end
    Play {
        /// Side the engine answers for
        #[arg(long, value_enum, default_value_t = EngineSide::Top)]
        ai: EngineSide,
    },
    /// Let the engine play against itself
    Selfplay {
        /// Stop after this many moves
        #[arg(long, default_value_t = 200)]
        max_plies: usize,
    },
    /// Run a simple demo of the engine
    Demo,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum EngineSide {
    Top,
    Bottom,
    None,
}

impl EngineSide {
    fn player(self) -> Option<Player> {
        match self {
            EngineSide::Top => Some(Player::Top),
            EngineSide::Bottom => Some(Player::Bottom),
            EngineSide::None => None,
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.debug);

    if let Err(e) = run(cli) {
        log::error!("Fatal error: {e:#}");
        std::process::exit(1);
    }
}

/// Log to stderr; stdout carries protocol replies.
fn init_logging(debug: bool) {
    let log_level = if debug { "debug" } else { "info" };
    env_logger::Builder::from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, log_level),
    )
    .format(|buf, record| writeln!(buf, "[{}] {}: {}", record.level(), record.target(), record.args()))
    .write_style(env_logger::WriteStyle::Never)
    .target(env_logger::Target::Stderr)
    .init();
}

fn run(cli: Cli) -> Result<()> {
    if let Some(seed) = cli.seed {
        fastrand::seed(seed);
    }
    let budget = match (cli.time_ms, cli.depth) {
        (Some(ms), _) => Budget::Time(Duration::from_millis(ms)),
        (None, depth) => Budget::Depth(depth.unwrap_or(DEFAULT_DEPTH)),
    };

    let mut game = Game::empty();
    game.set_repetition_rule(RepetitionRule {
        limit: cli.repetition_limit,
        initial: 0,
    });
    game.dispatch_pieces(cli.position.as_deref())
        .context("invalid --position")?;

    match cli.command {
        Some(Commands::Play { ai }) => {
            log::info!("protocol session, engine plays {ai:?} with {budget}");
            Session::new(game, budget)
                .with_engine_side(ai.player())
                .with_seed(cli.seed)
                .run_stdio()
        }
        Some(Commands::Selfplay { max_plies }) => run_selfplay(game, budget, cli.seed, max_plies),
        Some(Commands::Demo) | None => {
            run_demo(game, budget);
            Ok(())
        }
    }
}

fn run_selfplay(mut game: Game, budget: Budget, seed: Option<u64>, max_plies: usize) -> Result<()> {
    let mut players = [Player::Bottom, Player::Top].map(|side| {
        let bot = Competitor::new(side, budget);
        match seed {
            Some(seed) => bot.with_seed(seed.wrapping_add(side as u64)),
            None => bot,
        }
    });

    println!("{game}\n");
    for ply in 1..=max_plies {
        if game.outcome().is_some() {
            break;
        }
        let bot = &mut players[game.current_player() as usize];
        let report = bot.play_turn(&mut game)?;
        let notation = game.history().last().map(notation).unwrap_or_default();
        println!("{ply:>3}. {:<14} {notation:<12} {:?}", bot.name(), report.source);
    }

    println!("\n{game}");
    match game.outcome() {
        Some(outcome) => println!("end code {}", outcome.code()),
        None => println!("stopped after {max_plies} plies"),
    }
    Ok(())
}

fn notation(record: &MoveRecord) -> String {
    match record.from {
        Some(from) => format!("{from} -> {}", record.to),
        None => format!("drop {} -> {}", record.kind_before.letter(), record.to),
    }
}

fn run_demo(mut game: Game, budget: Budget) {
    println!("Yokai-Rust: 3x4 mini-shogi engine\n");

    println!("=== Position ===");
    println!("{}", game.encode());
    println!("{game}\n");

    println!("=== Legal moves ===");
    for cell in 0..yokai_rust::constants::CELLS {
        let Some(id) = game.cell(cell) else { continue };
        let Some(piece) = game.piece(id) else { continue };
        if piece.owner == game.current_player() {
            println!("{} on {cell}: {:?}", piece.letter(), game.legal_destinations(id));
        }
    }

    println!("\n=== Search ({budget}) ===");
    let result = search(&mut game, budget, &CancelToken::new());
    match result.best {
        Some(mv) => println!("Best move: {mv}, score {}", result.score),
        None => println!("No move found"),
    }
    println!(
        "Depth {}, {} nodes, {} memo hits, {:?}",
        result.stats.depth, result.stats.nodes, result.stats.memo_hits, result.stats.elapsed
    );
}
