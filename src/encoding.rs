//! Compact text encoding of a position.
//!
//! ```text
//! bkr/1p1/1P1/RKB b pP
//! \_____________/ | \/
//!      board      |  hands
//!               turn
//! ```
//!
//! - Board: rows separated by `/`, a letter places a piece (lowercase =
//!   BOTTOM, uppercase = TOP), a digit skips that many empty cells.
//!   Cells not described are empty.
//! - Turn: `b` = BOTTOM to move, `w` = TOP to move, `?` = random.
//! - Hands: letters for pieces held off the board, owner by letter case.
//!
//! The turn and hand segments are optional.

use std::fmt;

use thiserror::Error;

use crate::constants::{CELLS, COLS};
use crate::piece::{Piece, Player};

/// Error raised for a malformed position string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("unexpected character {ch:?} at offset {offset} in {section} section")]
    UnexpectedChar {
        ch: char,
        offset: usize,
        section: &'static str,
    },
    #[error("board description runs past cell {} at offset {offset}", CELLS - 1)]
    BoardOverflow { offset: usize },
}

/// Decoder phase. A space moves to the next phase.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Section {
    Board,
    Turn,
    Hand,
}

impl Section {
    fn name(self) -> &'static str {
        match self {
            Section::Board => "board",
            Section::Turn => "turn",
            Section::Hand => "hand",
        }
    }
}

/// A parsed position string, not yet applied to a game.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Layout {
    pub cells: [Option<Piece>; CELLS],
    /// Side to move; `None` means pick one at random when applied.
    pub turn: Option<Player>,
    pub bottom_hand: Vec<Piece>,
    pub top_hand: Vec<Piece>,
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            cells: [None; CELLS],
            turn: Some(Player::Bottom),
            bottom_hand: Vec::new(),
            top_hand: Vec::new(),
        }
    }
}

impl Layout {
    /// Parse a position string.
    pub fn parse(s: &str) -> Result<Layout, DecodeError> {
        let mut layout = Layout::default();
        let mut section = Section::Board;
        let mut cursor = 0usize;

        for (offset, ch) in s.char_indices() {
            let unexpected = move || DecodeError::UnexpectedChar {
                ch,
                offset,
                section: section.name(),
            };

            if ch == ' ' {
                section = match section {
                    Section::Board => Section::Turn,
                    Section::Turn => Section::Hand,
                    Section::Hand => break,
                };
                continue;
            }

            match section {
                Section::Board => match ch {
                    '/' => {}
                    '0'..='9' => {
                        cursor += ch as usize - '0' as usize;
                        if cursor > CELLS {
                            return Err(DecodeError::BoardOverflow { offset });
                        }
                    }
                    _ => {
                        let piece = Piece::from_letter(ch).ok_or_else(unexpected)?;
                        if cursor >= CELLS {
                            return Err(DecodeError::BoardOverflow { offset });
                        }
                        layout.cells[cursor] = Some(piece);
                        cursor += 1;
                    }
                },
                Section::Turn => match ch {
                    'b' => layout.turn = Some(Player::Bottom),
                    'w' => layout.turn = Some(Player::Top),
                    '?' => layout.turn = None,
                    _ => return Err(unexpected()),
                },
                Section::Hand => {
                    let piece = Piece::from_letter(ch).ok_or_else(unexpected)?;
                    match piece.owner {
                        Player::Bottom => layout.bottom_hand.push(piece),
                        Player::Top => layout.top_hand.push(piece),
                    }
                }
            }
        }

        Ok(layout)
    }

    /// Number of pieces described, on the board and in both hands.
    pub fn piece_count(&self) -> usize {
        self.cells.iter().flatten().count() + self.bottom_hand.len() + self.top_hand.len()
    }
}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (row, chunk) in self.cells.chunks(COLS).enumerate() {
            if row > 0 {
                write!(f, "/")?;
            }
            let mut empty = 0;
            for cell in chunk {
                match cell {
                    Some(piece) => {
                        if empty > 0 {
                            write!(f, "{empty}")?;
                            empty = 0;
                        }
                        write!(f, "{}", piece.letter())?;
                    }
                    None => empty += 1,
                }
            }
            if empty > 0 {
                write!(f, "{empty}")?;
            }
        }

        let turn = match self.turn {
            Some(Player::Bottom) => 'b',
            Some(Player::Top) => 'w',
            None => '?',
        };
        write!(f, " {turn}")?;

        if !self.bottom_hand.is_empty() || !self.top_hand.is_empty() {
            write!(f, " ")?;
            for piece in self.bottom_hand.iter().chain(&self.top_hand) {
                write!(f, "{}", piece.letter())?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::DEFAULT_POSITION;
    use crate::piece::PieceKind;

    #[test]
    fn test_parse_default_position() {
        let layout = Layout::parse(DEFAULT_POSITION).unwrap();
        assert_eq!(layout.turn, Some(Player::Bottom));
        assert_eq!(layout.piece_count(), 8);

        for cell in 0..3 {
            assert_eq!(layout.cells[cell].unwrap().owner, Player::Bottom);
        }
        for cell in 9..12 {
            assert_eq!(layout.cells[cell].unwrap().owner, Player::Top);
        }
        assert_eq!(
            layout.cells[4],
            Some(Piece::new(PieceKind::Pawn, Player::Bottom))
        );
        assert_eq!(layout.cells[7], Some(Piece::new(PieceKind::Pawn, Player::Top)));
        assert_eq!(layout.cells[3], None);
    }

    #[test]
    fn test_parse_turn_and_hands() {
        let layout = Layout::parse("k2/3/3/2K w pPg").unwrap();
        assert_eq!(layout.turn, Some(Player::Top));
        assert_eq!(layout.cells[0].unwrap().kind, PieceKind::King);
        assert_eq!(layout.cells[11].unwrap().kind, PieceKind::King);
        assert_eq!(layout.bottom_hand.len(), 2);
        assert_eq!(layout.top_hand.len(), 1);
    }

    #[test]
    fn test_parse_random_turn() {
        let layout = Layout::parse("k11/3/3/1K1 ?").unwrap();
        assert_eq!(layout.turn, None);
    }

    #[test]
    fn test_missing_sections_default() {
        let layout = Layout::parse("bkr").unwrap();
        assert_eq!(layout.turn, Some(Player::Bottom));
        assert!(layout.cells[3..].iter().all(Option::is_none));
    }

    #[test]
    fn test_rejects_malformed() {
        assert!(matches!(
            Layout::parse("bkx/3/3/3 b"),
            Err(DecodeError::UnexpectedChar { ch: 'x', .. })
        ));
        assert!(matches!(
            Layout::parse("3/3/3/3/k b"),
            Err(DecodeError::BoardOverflow { .. })
        ));
        assert!(matches!(
            Layout::parse("9/4 b"),
            Err(DecodeError::BoardOverflow { .. })
        ));
        assert!(matches!(
            Layout::parse("3/3/3/3 z"),
            Err(DecodeError::UnexpectedChar { section: "turn", .. })
        ));
    }

    #[test]
    fn test_format_matches_input() {
        for s in [DEFAULT_POSITION, "k2/3/1g1/2K w pP", "3/1k1/3/K2 b"] {
            let layout = Layout::parse(s).unwrap();
            assert_eq!(layout.to_string(), s);
        }
    }
}
