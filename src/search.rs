//! Fixed-depth negamax search.
//!
//! The search works on a `Game` it is allowed to mutate (normally a
//! snapshot) and brackets every candidate with apply/undo, so the game is
//! back in its starting state when `run` returns, interrupted or not.
//!
//! Scores are from the point of view of the side to move. A finished game
//! scores `WIN_SCORE + d` for the winner, where `d` is the depth still
//! remaining, so a quicker win outranks a slower one.
//!
//! Cancellation is cooperative: the token and the deadline are checked after
//! each candidate has been undone. A root candidate whose subtree was cut
//! short is discarded.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::constants::{
    CELLS, DEFAULT_DEPTH, FINGERPRINT_PIECES, KING_ADVANCE_BONUS, MATERIAL, MAX_TIMED_DEPTH,
    MIN_TIMED_DEPTH, WIN_SCORE,
};
use crate::events::Outcome;
use crate::game::{Game, MoveEffect};
use crate::piece::{PieceKind, Player};
use crate::playout::{Move, generate_moves};

// =============================================================================
// Budget
// =============================================================================

/// How much work a search may do.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Budget {
    /// Search exactly this many plies.
    Depth(u32),
    /// Derive a depth from the time and stop at the deadline.
    Time(Duration),
}

impl Default for Budget {
    fn default() -> Self {
        Budget::Depth(DEFAULT_DEPTH)
    }
}

impl Budget {
    /// Concrete limits for a search starting at `start`.
    pub fn limits(self, start: Instant) -> SearchLimits {
        match self {
            Budget::Depth(depth) => SearchLimits {
                depth: depth.max(1),
                deadline: None,
            },
            Budget::Time(time) => SearchLimits {
                depth: depth_for_time(time),
                deadline: start.checked_add(time),
            },
        }
    }
}

impl fmt::Display for Budget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Budget::Depth(d) => write!(f, "depth {d}"),
            Budget::Time(t) => write!(f, "{} ms", t.as_millis()),
        }
    }
}

/// Depth searched for a time budget: `floor(ln(ms) - 1)`, clamped to
/// `MIN_TIMED_DEPTH..=MAX_TIMED_DEPTH`.
pub fn depth_for_time(time: Duration) -> u32 {
    let ms = time.as_millis().max(1) as f64;
    let depth = (ms.ln() - 1.0).floor();
    if depth <= MIN_TIMED_DEPTH as f64 {
        MIN_TIMED_DEPTH
    } else {
        (depth as u32).min(MAX_TIMED_DEPTH)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SearchLimits {
    pub depth: u32,
    pub deadline: Option<Instant>,
}

// =============================================================================
// Cancellation
// =============================================================================

/// Shared stop flag between a search and whoever started it.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn request_stop(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    #[inline]
    pub fn should_stop(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

// =============================================================================
// Results
// =============================================================================

/// Why a search returned.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StopReason {
    /// Every root candidate was searched.
    Completed,
    /// A forced win was found and the rest was skipped.
    ForcedWin,
    /// The cancel token fired.
    Cancelled,
    /// The time budget ran out.
    Deadline,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SearchStats {
    pub depth: u32,
    pub nodes: u64,
    pub memo_hits: u64,
    pub elapsed: Duration,
    pub stop: StopReason,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SearchResult {
    /// Best fully searched root move, if any.
    pub best: Option<Move>,
    pub score: i32,
    pub stats: SearchStats,
}

// =============================================================================
// Evaluation
// =============================================================================

/// Static evaluation of a position from `side`'s point of view.
///
/// Board pieces count twice their material value; a king gets a bonus for
/// reaching the far half of the board and another for the far row. Hand
/// pieces count their material value once.
pub fn evaluate(game: &Game, side: Player) -> i32 {
    let sign = |owner: Player| if owner == side { 1 } else { -1 };
    let mut score = 0;

    for cell in 0..CELLS {
        let Some(piece) = game.cell_contents(cell) else {
            continue;
        };
        let mut value = MATERIAL[piece.kind as usize] * 2;
        if piece.kind == PieceKind::King {
            if piece.owner.far_half_contains(cell) {
                value += KING_ADVANCE_BONUS[0];
            }
            if piece.owner.last_row_contains(cell) {
                value += KING_ADVANCE_BONUS[1];
            }
        }
        score += sign(piece.owner) * value;
    }

    for player in [Player::Bottom, Player::Top] {
        for &id in game.hand(player) {
            if let Some(piece) = game.piece(id) {
                score += sign(piece.owner) * MATERIAL[piece.kind as usize];
            }
        }
    }

    score
}

fn terminal_score(outcome: Outcome, mover: Player, depth: u32) -> i32 {
    let win = WIN_SCORE + depth as i32;
    match outcome.winner() {
        Some(winner) if winner == mover => win,
        Some(_) => -win,
        None => 0,
    }
}

// =============================================================================
// Searcher
// =============================================================================

/// One search: limits, stop flag, and the per-search leaf memo.
pub struct Searcher {
    budget: Budget,
    token: CancelToken,
    limits: SearchLimits,
    /// Leaf scores keyed by (fingerprint, side to move). Only used while the
    /// fingerprint is exact.
    memo: HashMap<(u64, Player), i32>,
    memo_enabled: bool,
    nodes: u64,
    memo_hits: u64,
    interrupted: bool,
    stop: StopReason,
}

impl Searcher {
    pub fn new(budget: Budget, token: CancelToken) -> Self {
        Self {
            budget,
            token,
            limits: budget.limits(Instant::now()),
            memo: HashMap::new(),
            memo_enabled: false,
            nodes: 0,
            memo_hits: 0,
            interrupted: false,
            stop: StopReason::Completed,
        }
    }

    /// Search `game` for the side to move.
    pub fn run(&mut self, game: &mut Game) -> SearchResult {
        let start = Instant::now();
        self.limits = self.budget.limits(start);
        self.memo.clear();
        self.memo_enabled = game.piece_count() <= FINGERPRINT_PIECES;
        self.nodes = 0;
        self.memo_hits = 0;
        self.interrupted = false;
        self.stop = StopReason::Completed;

        let (best, score) = self.root(game);

        let stats = SearchStats {
            depth: self.limits.depth,
            nodes: self.nodes,
            memo_hits: self.memo_hits,
            elapsed: start.elapsed(),
            stop: self.stop,
        };
        log::debug!(
            "search {}: depth {} nodes {} memo hits {} in {:?}, score {score}, best {:?}, {:?}",
            self.budget,
            stats.depth,
            stats.nodes,
            stats.memo_hits,
            stats.elapsed,
            best,
            stats.stop
        );
        SearchResult { best, score, stats }
    }

    fn root(&mut self, game: &mut Game) -> (Option<Move>, i32) {
        let mover = game.current_player();
        let depth = self.limits.depth;
        let mut best: Option<Move> = None;
        let mut best_score = i32::MIN;

        if self.check_stop() {
            return (None, 0);
        }

        for mv in generate_moves(game) {
            let Some(score) = self.score_move(game, mv, mover, depth) else {
                continue;
            };
            if self.interrupted {
                break;
            }
            if best.is_none() || score > best_score {
                best = Some(mv);
                best_score = score;
            }
            // Nothing beats a win on this very move
            if best_score >= WIN_SCORE + depth as i32 {
                self.stop = StopReason::ForcedWin;
                break;
            }
            if self.check_stop() {
                break;
            }
        }

        if best.is_none() {
            best_score = 0;
        }
        (best, best_score)
    }

    fn negamax(&mut self, game: &mut Game, depth: u32) -> i32 {
        self.nodes += 1;
        if depth == 0 {
            return self.leaf(game);
        }

        let mover = game.current_player();
        let moves = generate_moves(game);
        if moves.is_empty() {
            return self.leaf(game);
        }

        let mut best = i32::MIN + 1;
        for mv in moves {
            let Some(score) = self.score_move(game, mv, mover, depth) else {
                continue;
            };
            best = best.max(score);
            if self.check_stop() {
                self.interrupted = true;
                break;
            }
            if best >= WIN_SCORE + depth as i32 {
                break;
            }
        }
        best
    }

    /// Apply, score, and undo one candidate. `None` if it could not be played.
    fn score_move(&mut self, game: &mut Game, mv: Move, mover: Player, depth: u32) -> Option<i32> {
        let score = match game.apply_move(mv.piece, mv.to) {
            Ok(MoveEffect::Ended(outcome)) => terminal_score(outcome, mover, depth),
            Ok(MoveEffect::Continue) => -self.negamax(game, depth - 1),
            Err(err) => {
                log::warn!("search skipped move {mv}: {err}");
                return None;
            }
        };
        if let Err(err) = game.undo_last_move() {
            log::error!("search could not undo move {mv}: {err}");
            self.interrupted = true;
        }
        Some(score)
    }

    fn leaf(&mut self, game: &Game) -> i32 {
        let side = game.current_player();
        if !self.memo_enabled {
            return evaluate(game, side);
        }
        let key = (game.hash(), side);
        if let Some(&score) = self.memo.get(&key) {
            self.memo_hits += 1;
            return score;
        }
        let score = evaluate(game, side);
        self.memo.insert(key, score);
        score
    }

    /// True once the token fired or the deadline passed. Records why.
    fn check_stop(&mut self) -> bool {
        if self.token.should_stop() {
            self.stop = StopReason::Cancelled;
            return true;
        }
        if self.limits.deadline.is_some_and(|d| Instant::now() >= d) {
            self.stop = StopReason::Deadline;
            return true;
        }
        false
    }
}

/// Run one search on `game` with a fresh `Searcher`.
pub fn search(game: &mut Game, budget: Budget, token: &CancelToken) -> SearchResult {
    Searcher::new(budget, token.clone()).run(game)
}
