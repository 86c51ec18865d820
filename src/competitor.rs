//! Computer player that searches on a background thread.
//!
//! A turn goes through three steps:
//!
//! 1. `start_turn` snapshots the live game and hands the snapshot to a
//!    worker thread running the negamax search.
//! 2. `stop_turn` (optional) asks the worker to wrap up early; the best move
//!    completed so far is kept. `abort_turn` cancels and discards the turn.
//! 3. `finish_turn` joins the worker, maps the chosen move back onto the live
//!    game's pieces and plays it. If the search produced nothing (cancelled
//!    before any candidate finished, or the worker panicked) a uniformly
//!    random legal move is played instead.
//!
//! The live game is never touched while the worker runs.

use std::thread::{self, JoinHandle};

use fastrand::Rng;
use thiserror::Error;

use crate::events::Outcome;
use crate::game::{Game, MoveEffect, MoveError, PieceMap};
use crate::piece::Player;
use crate::playout::{Move, random_move};
use crate::search::{Budget, CancelToken, SearchResult, SearchStats, search};

#[derive(Debug, Error)]
pub enum CompetitorError {
    #[error("a turn is already being computed")]
    Busy,
    #[error("no turn is being computed")]
    Idle,
    #[error("{turn} is to move, but this competitor plays {side}")]
    NotOurTurn { side: Player, turn: Player },
    #[error("game is over: {0}")]
    GameOver(Outcome),
    #[error("{0} has no legal move")]
    NoLegalMove(Player),
    #[error("could not start search thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("chosen move was refused: {0}")]
    Rejected(#[from] MoveError),
}

/// Where the competitor is in its turn cycle.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TurnState {
    Idle,
    Computing,
    Applying,
    Aborted,
    Errored,
}

/// How the played move was chosen.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MoveSource {
    Search { score: i32, depth: u32 },
    Fallback,
}

/// What a finished turn did. `mv` refers to pieces of the live game.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TurnReport {
    pub mv: Move,
    pub source: MoveSource,
    pub effect: MoveEffect,
    pub stats: Option<SearchStats>,
}

/// Search in flight.
struct Turn {
    handle: JoinHandle<SearchResult>,
    token: CancelToken,
    map: PieceMap,
}

pub struct Competitor {
    name: String,
    side: Player,
    budget: Budget,
    state: TurnState,
    turn: Option<Turn>,
    rng: Rng,
}

impl Competitor {
    pub fn new(side: Player, budget: Budget) -> Self {
        Self {
            name: format!("negamax-{side}"),
            side,
            budget,
            state: TurnState::Idle,
            turn: None,
            rng: Rng::new(),
        }
    }

    /// Seed the generator used for fallback moves.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Rng::with_seed(seed);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn side(&self) -> Player {
        self.side
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    /// True when the worker has finished and `finish_turn` will not block.
    pub fn is_ready(&self) -> bool {
        self.turn.as_ref().is_some_and(|t| t.handle.is_finished())
    }

    /// Snapshot `game` and start searching on a worker thread.
    pub fn start_turn(&mut self, game: &Game) -> Result<(), CompetitorError> {
        if self.turn.is_some() {
            return Err(CompetitorError::Busy);
        }
        if let Some(outcome) = game.outcome() {
            return Err(CompetitorError::GameOver(outcome));
        }
        self.check_turn(game)?;

        let (mut snapshot, map) = game.snapshot();
        let token = CancelToken::new();
        let worker_token = token.clone();
        let budget = self.budget;

        let handle = thread::Builder::new()
            .name(format!("search-{}", self.side))
            .spawn(move || search(&mut snapshot, budget, &worker_token))
            .map_err(|err| {
                self.state = TurnState::Errored;
                CompetitorError::Spawn(err)
            })?;

        log::debug!("{}: searching with {}", self.name, budget);
        self.turn = Some(Turn { handle, token, map });
        self.state = TurnState::Computing;
        Ok(())
    }

    /// Ask the worker to stop early. The best completed move is still used.
    pub fn stop_turn(&self) {
        if let Some(turn) = &self.turn {
            turn.token.request_stop();
        }
    }

    /// Cancel the turn and wait for the worker. No move is played.
    pub fn abort_turn(&mut self) -> Result<(), CompetitorError> {
        let turn = self.turn.take().ok_or(CompetitorError::Idle)?;
        turn.token.request_stop();
        if turn.handle.join().is_err() {
            log::error!("{}: search thread panicked during abort", self.name);
        }
        log::info!("{}: turn aborted", self.name);
        self.state = TurnState::Aborted;
        Ok(())
    }

    /// Wait for the worker and play its move on `game`.
    pub fn finish_turn(&mut self, game: &mut Game) -> Result<TurnReport, CompetitorError> {
        let turn = self.turn.take().ok_or(CompetitorError::Idle)?;

        let result = match turn.handle.join() {
            Ok(result) => Some(result),
            Err(_) => {
                log::error!("{}: search thread panicked", self.name);
                None
            }
        };

        if let Err(err) = self.check_turn(game) {
            self.state = TurnState::Errored;
            return Err(err);
        }

        let searched = result.as_ref().and_then(|r| {
            let mv = r.best?;
            let piece = turn.map.original(mv.piece)?;
            Some((
                Move { piece, to: mv.to },
                MoveSource::Search {
                    score: r.score,
                    depth: r.stats.depth,
                },
            ))
        });

        self.state = TurnState::Applying;
        let stats = result.map(|r| r.stats);
        if let Some((mv, source)) = searched {
            match game.apply_move(mv.piece, mv.to) {
                Ok(effect) => return Ok(self.report(mv, source, effect, stats)),
                Err(err) => log::warn!("{}: searched move {mv} refused: {err}", self.name),
            }
        } else {
            log::warn!("{}: no searched move", self.name);
        }

        let Some(mv) = random_move(game, &mut self.rng) else {
            self.state = TurnState::Errored;
            return Err(CompetitorError::NoLegalMove(self.side));
        };
        let effect = match game.apply_move(mv.piece, mv.to) {
            Ok(effect) => effect,
            Err(err) => {
                self.state = TurnState::Errored;
                return Err(err.into());
            }
        };
        Ok(self.report(mv, MoveSource::Fallback, effect, stats))
    }

    fn report(
        &mut self,
        mv: Move,
        source: MoveSource,
        effect: MoveEffect,
        stats: Option<SearchStats>,
    ) -> TurnReport {
        log::info!("{}: played {mv} ({source:?}) -> {effect:?}", self.name);
        self.state = TurnState::Idle;
        TurnReport {
            mv,
            source,
            effect,
            stats,
        }
    }

    /// Start and finish a turn in one call.
    pub fn play_turn(&mut self, game: &mut Game) -> Result<TurnReport, CompetitorError> {
        self.start_turn(game)?;
        self.finish_turn(game)
    }

    fn check_turn(&self, game: &Game) -> Result<(), CompetitorError> {
        let turn = game.current_player();
        if turn != self.side {
            return Err(CompetitorError::NotOurTurn {
                side: self.side,
                turn,
            });
        }
        Ok(())
    }
}

impl Drop for Competitor {
    fn drop(&mut self) {
        if let Some(turn) = self.turn.take() {
            turn.token.request_stop();
            let _ = turn.handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::DEFAULT_DEPTH;

    #[test]
    fn test_plays_winning_capture() {
        let mut game = Game::from_encoding("k2/1R1/1r1/1K1 b").unwrap();
        let rook = game.cell(7).unwrap();
        let mut bot = Competitor::new(Player::Bottom, Budget::Depth(2));

        let report = bot.play_turn(&mut game).unwrap();
        assert_eq!(report.mv, Move { piece: rook, to: 10 });
        assert_eq!(report.effect, MoveEffect::Ended(Outcome::Win(Player::Bottom)));
        assert!(matches!(report.source, MoveSource::Search { .. }));
        assert_eq!(bot.state(), TurnState::Idle);
    }

    #[test]
    fn test_refused_search_move_falls_back() {
        let mut game = Game::from_encoding("k2/1R1/1r1/1K1 b").unwrap();
        let rook = game.cell(7).unwrap();
        let mut bot = Competitor::new(Player::Bottom, Budget::Depth(2)).with_seed(5);
        bot.start_turn(&game).unwrap();

        // The rook leaves 7 behind the worker's back, so rook -> 10 is unreachable
        game.apply_move(rook, 6).unwrap();
        game.set_current_player(Player::Bottom);

        let report = bot.finish_turn(&mut game).unwrap();
        assert_eq!(report.source, MoveSource::Fallback);
        assert_ne!(report.mv, Move { piece: rook, to: 10 });
        assert!(report.stats.is_some());
        assert_eq!(game.history().len(), 2);
        assert_eq!(bot.state(), TurnState::Idle);
    }

    #[test]
    fn test_refuses_wrong_side() {
        let game = Game::new();
        let mut bot = Competitor::new(Player::Top, Budget::Depth(1));
        assert!(matches!(
            bot.start_turn(&game),
            Err(CompetitorError::NotOurTurn { .. })
        ));
        assert_eq!(bot.state(), TurnState::Idle);
    }

    #[test]
    fn test_busy_and_idle() {
        let mut game = Game::new();
        let mut bot = Competitor::new(Player::Bottom, Budget::Depth(1));
        assert!(matches!(bot.finish_turn(&mut game), Err(CompetitorError::Idle)));

        bot.start_turn(&game).unwrap();
        assert_eq!(bot.state(), TurnState::Computing);
        assert!(matches!(bot.start_turn(&game), Err(CompetitorError::Busy)));
        bot.finish_turn(&mut game).unwrap();
        assert_eq!(game.current_player(), Player::Top);
    }

    #[test]
    fn test_abort_plays_nothing() {
        let game = Game::new();
        let before = game.clone();
        let mut bot = Competitor::new(Player::Bottom, Budget::Depth(DEFAULT_DEPTH + 6));

        bot.start_turn(&game).unwrap();
        bot.abort_turn().unwrap();
        assert_eq!(bot.state(), TurnState::Aborted);
        assert_eq!(game, before);
        assert!(matches!(bot.abort_turn(), Err(CompetitorError::Idle)));
    }

    #[test]
    fn test_stop_without_result_falls_back() {
        let mut game = Game::new();
        let mut bot = Competitor::new(Player::Bottom, Budget::Depth(DEFAULT_DEPTH + 6)).with_seed(3);

        bot.start_turn(&game).unwrap();
        bot.stop_turn();
        let report = bot.finish_turn(&mut game).unwrap();

        assert_eq!(report.source, MoveSource::Fallback);
        assert_eq!(game.history().len(), 1);
        assert_eq!(game.current_player(), Player::Top);
    }

    #[test]
    fn test_finished_game_is_refused() {
        let mut game = Game::from_encoding("k2/3/1K1/1r1 b").unwrap();
        let rook = game.cell(10).unwrap();
        game.apply_move(rook, 7).unwrap();
        let mut bot = Competitor::new(Player::Top, Budget::Depth(1));
        assert!(matches!(
            bot.start_turn(&game),
            Err(CompetitorError::GameOver(_))
        ));
    }

    #[test]
    fn test_name_and_side() {
        let bot = Competitor::new(Player::Top, Budget::Depth(2)).with_name("kitsune");
        assert_eq!(bot.name(), "kitsune");
        assert_eq!(bot.side(), Player::Top);
        assert!(!bot.is_ready());
    }
}
