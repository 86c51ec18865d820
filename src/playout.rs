//! Move generation and random playouts.
//!
//! `generate_moves` lists every legal move for the side to move, in a fixed
//! order: board pieces by cell, each with its destinations ascending, then
//! reinsertions from hand. The random helpers drive the fallback move of
//! the competitor and the randomized tests.

use std::fmt;

use fastrand::Rng;

use crate::constants::CELLS;
use crate::events::Outcome;
use crate::game::{Game, MoveEffect, PieceId};
use crate::piece::PieceKind;

/// A piece and the cell it goes to.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Move {
    pub piece: PieceId,
    pub to: usize,
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}", self.piece, self.to)
    }
}

/// All legal moves for the side to move. Empty once the game is over.
///
/// Hand pieces of the same kind are interchangeable, so only the first of
/// each kind produces reinsertions.
pub fn generate_moves(game: &Game) -> Vec<Move> {
    let mut moves = Vec::new();
    if game.outcome().is_some() {
        return moves;
    }
    let player = game.current_player();

    for cell in 0..CELLS {
        let Some(id) = game.cell(cell) else { continue };
        if game.piece(id).is_some_and(|p| p.owner == player) {
            moves.extend(game.legal_destinations(id).iter().map(|to| Move { piece: id, to }));
        }
    }

    let mut seen: Vec<PieceKind> = Vec::with_capacity(PieceKind::ALL.len());
    for &id in game.hand(player) {
        let Some(piece) = game.piece(id) else { continue };
        if seen.contains(&piece.kind) {
            continue;
        }
        seen.push(piece.kind);
        moves.extend(game.legal_destinations(id).iter().map(|to| Move { piece: id, to }));
    }

    moves
}

/// A uniformly random legal move, or `None` if there is none.
pub fn random_move(game: &Game, rng: &mut Rng) -> Option<Move> {
    let moves = generate_moves(game);
    if moves.is_empty() {
        return None;
    }
    Some(moves[rng.usize(..moves.len())])
}

/// Result of a random playout.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Playout {
    /// Recorded moves played; undo this many to get back to the start.
    pub plies: usize,
    pub outcome: Option<Outcome>,
}

/// Play random legal moves (recorded) until the game ends, no move is
/// available, or `max_plies` moves have been played.
pub fn random_playout(game: &mut Game, rng: &mut Rng, max_plies: usize) -> Playout {
    let mut plies = 0;
    while plies < max_plies {
        let Some(mv) = random_move(game, rng) else { break };
        match game.apply_move(mv.piece, mv.to) {
            Ok(effect) => {
                plies += 1;
                if let MoveEffect::Ended(outcome) = effect {
                    return Playout {
                        plies,
                        outcome: Some(outcome),
                    };
                }
            }
            Err(err) => {
                log::warn!("generated move {mv} was refused: {err}");
                break;
            }
        }
    }
    Playout {
        plies,
        outcome: game.outcome(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::Location;
    use crate::piece::Player;

    fn origin(game: &Game, id: PieceId) -> usize {
        match game.location(id) {
            Some(Location::Board(cell)) => cell,
            other => panic!("piece not on board: {other:?}"),
        }
    }

    #[test]
    fn test_opening_moves() {
        let game = Game::new();
        let moves: Vec<(usize, usize)> = generate_moves(&game)
            .iter()
            .map(|m| (origin(&game, m.piece), m.to))
            .collect();
        // King to 3 or 5, pawn takes pawn, rook to 5
        assert_eq!(moves, vec![(1, 3), (1, 5), (2, 5), (4, 7)]);
    }

    #[test]
    fn test_hand_duplicates_are_merged() {
        let game = Game::from_encoding("k2/3/3/2K b pp").unwrap();
        let moves = generate_moves(&game);
        let king_moves = game.legal_destinations(game.cell(0).unwrap()).len();
        assert_eq!(moves.len(), king_moves + 10);
        let first = game.hand(Player::Bottom)[0];
        assert!(moves[king_moves..].iter().all(|m| m.piece == first));
    }

    #[test]
    fn test_no_moves_after_game_end() {
        let mut game = Game::from_encoding("k2/3/1K1/1r1 b").unwrap();
        let rook = game.cell(10).unwrap();
        game.apply_move(rook, 7).unwrap();
        assert!(generate_moves(&game).is_empty());
        assert_eq!(random_move(&game, &mut Rng::with_seed(1)), None);
    }

    #[test]
    fn test_random_move_is_legal() {
        let game = Game::new();
        let mut rng = Rng::with_seed(7);
        let legal = generate_moves(&game);
        for _ in 0..20 {
            let mv = random_move(&game, &mut rng).unwrap();
            assert!(legal.contains(&mv));
        }
    }

    #[test]
    fn test_playout_can_be_undone() {
        let mut game = Game::new();
        let before = game.clone();
        let mut rng = Rng::with_seed(42);

        let playout = random_playout(&mut game, &mut rng, 60);
        assert_eq!(game.history().len(), playout.plies);
        for _ in 0..playout.plies {
            game.undo_last_move().unwrap();
        }
        assert_eq!(game, before);
    }
}
