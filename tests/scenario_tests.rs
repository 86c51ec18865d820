//! End-to-end scenarios
//!
//! Whole games and sessions driven through the public API: dispatching the
//! starting position, repetition draws, cancelled searches, computer players
//! and the text protocol.

use std::sync::mpsc::channel;
use std::time::{Duration, Instant};

use yokai_rust::competitor::{Competitor, MoveSource, TurnState};
use yokai_rust::constants::{CELLS, DEFAULT_POSITION};
use yokai_rust::events::{ChannelObserver, GameEvent, Outcome};
use yokai_rust::game::{Game, MoveEffect};
use yokai_rust::piece::{PieceKind, Player};
use yokai_rust::protocol::Session;
use yokai_rust::search::{Budget, CancelToken, StopReason, search};

// =============================================================================
// Helper functions
// =============================================================================

/// Play `from -> to` moves in order, asserting each is accepted.
fn play_cells(game: &mut Game, moves: &[(usize, usize)]) -> MoveEffect {
    let mut effect = MoveEffect::Continue;
    for &(from, to) in moves {
        let piece = game.cell(from).unwrap();
        effect = game.apply_move(piece, to).unwrap();
    }
    effect
}

fn run_session(session: &mut Session, input: &str) -> Vec<String> {
    let mut output = Vec::new();
    session.run(input.as_bytes(), &mut output).unwrap();
    String::from_utf8(output)
        .unwrap()
        .split("\n\n")
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

// =============================================================================
// Starting position
// =============================================================================

#[test]
fn test_default_position_dispatch() {
    let (tx, rx) = channel();
    let mut game = Game::empty();
    game.subscribe(Box::new(ChannelObserver(tx)));
    game.dispatch_pieces(Some(DEFAULT_POSITION)).unwrap();

    assert_eq!(rx.try_recv(), Ok(GameEvent::Init));
    assert_eq!(game.current_player(), Player::Bottom);
    for cell in 0..3 {
        assert_eq!(game.cell_contents(cell).unwrap().owner, Player::Bottom);
    }
    for cell in 9..CELLS {
        assert_eq!(game.cell_contents(cell).unwrap().owner, Player::Top);
    }
    for cell in [3, 5, 6, 8] {
        assert_eq!(game.cell_contents(cell), None);
    }

    // The bottom pawn's only step is onto the top pawn
    let pawn = game.cell(4).unwrap();
    assert_eq!(game.piece(pawn).unwrap().kind, PieceKind::Pawn);
    assert_eq!(game.legal_destinations(pawn).to_vec(), vec![7]);
}

#[test]
fn test_dispatch_without_encoding_uses_default() {
    let mut game = Game::from_encoding("k2/3/3/2K w").unwrap();
    game.dispatch_pieces(None).unwrap();
    assert_eq!(game.encode(), DEFAULT_POSITION);
}

#[test]
fn test_random_turn_marker() {
    let mut seen = [false; 2];
    for _ in 0..64 {
        let game = Game::from_encoding("k2/3/3/2K ?").unwrap();
        seen[game.current_player() as usize] = true;
    }
    assert_eq!(seen, [true, true]);
}

#[test]
fn test_encoding_survives_a_game() {
    let mut game = Game::new();
    play_cells(&mut game, &[(4, 7), (10, 7)]);
    let encoded = game.encode();
    assert_eq!(encoded, "bkr/3/1K1/R1B b pP");

    let copy = Game::from_encoding(&encoded).unwrap();
    for cell in 0..CELLS {
        assert_eq!(copy.cell_contents(cell), game.cell_contents(cell));
    }
    assert_eq!(copy.current_player(), game.current_player());
    assert_eq!(copy.hash(), game.hash());
}

// =============================================================================
// Draw by repetition
// =============================================================================

#[test]
fn test_shuttling_rooks_draw() {
    let (tx, rx) = channel();
    let mut game = Game::new();
    game.subscribe(Box::new(ChannelObserver(tx)));

    let cycle = [(2, 5), (9, 6), (5, 2), (6, 9)];
    let mut effect = MoveEffect::Continue;
    for ply in 0..12 {
        assert_eq!(effect, MoveEffect::Continue, "ended early at ply {ply}");
        effect = play_cells(&mut game, &[cycle[ply % 4]]);
    }
    assert_eq!(effect, MoveEffect::Ended(Outcome::Draw));

    let ends: Vec<u8> = rx
        .try_iter()
        .filter_map(|e| match e {
            GameEvent::End(outcome) => Some(outcome.code()),
            _ => None,
        })
        .collect();
    assert_eq!(ends, vec![0]);
}

#[test]
fn test_other_moves_reset_the_count() {
    let mut game = Game::new();
    play_cells(&mut game, &[(2, 5), (9, 6), (5, 2), (6, 9), (2, 5)]);
    assert_eq!(game.repetitions(), 3);
    // Top king steps aside instead of shuttling
    play_cells(&mut game, &[(10, 8)]);
    assert_eq!(game.repetitions(), 0);
}

// =============================================================================
// Cancelled searches
// =============================================================================

#[test]
fn test_cancelled_one_millisecond_search() {
    let game = Game::new();
    let (mut snapshot, _map) = game.snapshot();
    let before = snapshot.clone();
    let token = CancelToken::new();
    token.request_stop();

    let start = Instant::now();
    let result = search(&mut snapshot, Budget::Time(Duration::from_millis(1)), &token);

    assert!(start.elapsed() < Duration::from_millis(500));
    assert_eq!(result.best, None);
    assert_eq!(result.stats.stop, StopReason::Cancelled);
    assert_eq!(snapshot, before);
    assert_eq!(game.encode(), DEFAULT_POSITION);
}

#[test]
fn test_aborted_competitor_leaves_game_alone() {
    let game = Game::new();
    let before = game.clone();
    let mut bot = Competitor::new(Player::Bottom, Budget::Time(Duration::from_millis(1)));

    bot.start_turn(&game).unwrap();
    bot.abort_turn().unwrap();

    assert_eq!(bot.state(), TurnState::Aborted);
    assert_eq!(game, before);
    assert!(game.history().is_empty());
}

// =============================================================================
// Computer players
// =============================================================================

#[test]
fn test_selfplay_game() {
    let mut game = Game::new();
    let mut bots = [
        Competitor::new(Player::Bottom, Budget::Depth(2)).with_seed(1),
        Competitor::new(Player::Top, Budget::Depth(3)).with_seed(2),
    ];

    for _ in 0..200 {
        if game.outcome().is_some() {
            break;
        }
        let bot = &mut bots[game.current_player() as usize];
        let report = bot.play_turn(&mut game).unwrap();
        assert!(matches!(report.source, MoveSource::Search { .. }));
    }

    // Whatever happened, the history unwinds to the start
    while game.undo_last_move().is_ok() {}
    assert_eq!(game.encode(), DEFAULT_POSITION);
}

#[test]
fn test_competitor_takes_king_on_far_row() {
    // Bottom king reaches the far row next to the top king
    let mut game = Game::from_encoding("3/3/1k1/K2 b").unwrap();
    play_cells(&mut game, &[(7, 10)]);
    assert!(game.pending_win(Player::Bottom));

    let mut top = Competitor::new(Player::Top, Budget::Depth(1));
    let report = top.play_turn(&mut game).unwrap();
    assert_eq!(report.effect, MoveEffect::Ended(Outcome::Win(Player::Top)));
    assert_eq!(report.mv.to, 10);
}

// =============================================================================
// Text protocol
// =============================================================================

#[test]
fn test_protocol_session() {
    let mut session = Session::new(Game::new(), Budget::Depth(2));
    let encoded = format!("=6 {DEFAULT_POSITION}");
    let replies = run_session(
        &mut session,
        "1 moves 4\n2 move 4 7\n3 hand bottom\n4 turn\n5 undo\n6 encode\n7 move 0 4\nquit\n",
    );
    assert_eq!(
        replies,
        vec![
            "=1 7",
            "=2 ",
            "=3 p",
            "=4 top",
            "=5 ",
            encoded.as_str(),
            "?7 cell 4 is occupied",
            "= ",
        ]
    );
}

#[test]
fn test_protocol_engine_opponent() {
    let mut session = Session::new(Game::new(), Budget::Depth(2))
        .with_engine_side(Some(Player::Top))
        .with_seed(Some(11));
    let replies = run_session(&mut session, "move 4 7\nturn\n");
    assert_eq!(replies.len(), 2);
    assert!(replies[0].starts_with("= "));
    assert!(replies[0].len() > 2, "engine reply missing");
    assert_eq!(replies[1], "= bottom");
}
