//! Pieces, players, and movement geometry.
//!
//! Movement is described relative to the owner: BOTTOM looks toward row 3,
//! TOP looks toward row 0. A piece's kind determines which of the eight
//! directions it may step in; reachable cells are computed from the grid
//! alone, without looking at the other pieces.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use crate::constants::{CELLS, COLS, ROWS};

/// One of the two sides.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Player {
    /// Starts on row 0 and moves first in the default position.
    Bottom,
    /// Starts on row 3.
    Top,
}

impl Player {
    #[inline]
    pub fn opponent(self) -> Player {
        match self {
            Player::Bottom => Player::Top,
            Player::Top => Player::Bottom,
        }
    }

    /// Row step of one "forward" move for this player.
    #[inline]
    fn sign(self) -> isize {
        match self {
            Player::Bottom => 1,
            Player::Top => -1,
        }
    }

    /// True if `cell` lies on the row this player is heading for
    /// (promotion row, and the row a king must reach to win).
    #[inline]
    pub fn last_row_contains(self, cell: usize) -> bool {
        match self {
            Player::Bottom => cell >= CELLS - COLS,
            Player::Top => cell < COLS,
        }
    }

    /// True if `cell` lies in the opponent's half of the board.
    #[inline]
    pub fn far_half_contains(self, cell: usize) -> bool {
        match self {
            Player::Bottom => cell >= CELLS / 2,
            Player::Top => cell < CELLS / 2,
        }
    }
}

impl fmt::Display for Player {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Player::Bottom => write!(f, "bottom"),
            Player::Top => write!(f, "top"),
        }
    }
}

// =============================================================================
// Movement capability
// =============================================================================

/// Set of directions a piece may step in, relative to its owner.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Movement(u8);

impl Movement {
    pub const FORWARD: Movement = Movement(1 << 0);
    pub const BACKWARD: Movement = Movement(1 << 1);
    pub const LEFT: Movement = Movement(1 << 2);
    pub const RIGHT: Movement = Movement(1 << 3);
    pub const FORWARD_LEFT: Movement = Movement(1 << 4);
    pub const FORWARD_RIGHT: Movement = Movement(1 << 5);
    pub const BACKWARD_LEFT: Movement = Movement(1 << 6);
    pub const BACKWARD_RIGHT: Movement = Movement(1 << 7);

    pub const ORTHOGONAL: Movement = Movement(0b0000_1111);
    pub const DIAGONAL: Movement = Movement(0b1111_0000);
    pub const ALL: Movement = Movement(0xff);

    #[inline]
    pub const fn union(self, other: Movement) -> Movement {
        Movement(self.0 | other.0)
    }

    #[inline]
    pub const fn contains(self, other: Movement) -> bool {
        self.0 & other.0 == other.0
    }
}

/// Step for each direction as (forward rows, rightward columns).
/// Order matters: it fixes the order in which destinations are produced.
const STEPS: [(Movement, isize, isize); 8] = [
    (Movement::FORWARD, 1, 0),
    (Movement::BACKWARD, -1, 0),
    (Movement::RIGHT, 0, 1),
    (Movement::LEFT, 0, -1),
    (Movement::FORWARD_RIGHT, 1, 1),
    (Movement::FORWARD_LEFT, 1, -1),
    (Movement::BACKWARD_RIGHT, -1, 1),
    (Movement::BACKWARD_LEFT, -1, -1),
];

// =============================================================================
// Piece kinds
// =============================================================================

/// The five piece kinds. Discriminants are part of the position fingerprint.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PieceKind {
    King = 0,
    Bishop = 1,
    Rook = 2,
    Pawn = 3,
    PromotedPawn = 4,
}

impl PieceKind {
    pub const ALL: [PieceKind; 5] = [
        PieceKind::King,
        PieceKind::Bishop,
        PieceKind::Rook,
        PieceKind::Pawn,
        PieceKind::PromotedPawn,
    ];

    /// Movement capability of this kind.
    pub const fn movement(self) -> Movement {
        match self {
            PieceKind::King => Movement::ALL,
            PieceKind::Bishop => Movement::DIAGONAL,
            PieceKind::Rook => Movement::ORTHOGONAL,
            PieceKind::Pawn => Movement::FORWARD,
            PieceKind::PromotedPawn => Movement::ORTHOGONAL
                .union(Movement::FORWARD_LEFT)
                .union(Movement::FORWARD_RIGHT),
        }
    }

    /// Lowercase letter used by the board encoding.
    pub const fn letter(self) -> char {
        match self {
            PieceKind::King => 'k',
            PieceKind::Bishop => 'b',
            PieceKind::Rook => 'r',
            PieceKind::Pawn => 'p',
            PieceKind::PromotedPawn => 'g',
        }
    }

    /// Parse an encoding letter (case-insensitive).
    pub fn from_letter(c: char) -> Option<PieceKind> {
        match c.to_ascii_lowercase() {
            'k' => Some(PieceKind::King),
            'b' => Some(PieceKind::Bishop),
            'r' => Some(PieceKind::Rook),
            'p' => Some(PieceKind::Pawn),
            'g' => Some(PieceKind::PromotedPawn),
            _ => None,
        }
    }
}

// =============================================================================
// Piece
// =============================================================================

/// A piece: its current kind and its current owner.
///
/// Both fields change over a game: pawns promote, and captured pieces change
/// sides (demoting if promoted). Identity is tracked by the owning `Game`
/// through `PieceId` handles, not by this value.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Piece {
    pub kind: PieceKind,
    pub owner: Player,
}

impl Piece {
    pub fn new(kind: PieceKind, owner: Player) -> Self {
        Self { kind, owner }
    }

    /// Encoding letter: lowercase for BOTTOM, uppercase for TOP.
    pub fn letter(&self) -> char {
        match self.owner {
            Player::Bottom => self.kind.letter(),
            Player::Top => self.kind.letter().to_ascii_uppercase(),
        }
    }

    /// Parse an encoding letter into a piece with its owner.
    pub fn from_letter(c: char) -> Option<Piece> {
        let kind = PieceKind::from_letter(c)?;
        let owner = if c.is_ascii_uppercase() {
            Player::Top
        } else {
            Player::Bottom
        };
        Some(Piece::new(kind, owner))
    }

    pub fn promote(&mut self) {
        if self.kind == PieceKind::Pawn {
            self.kind = PieceKind::PromotedPawn;
        }
    }

    pub fn demote(&mut self) {
        if self.kind == PieceKind::PromotedPawn {
            self.kind = PieceKind::Pawn;
        }
    }

    /// Cells this piece could step to from `cell` on an empty board.
    pub fn neighbours(&self, cell: usize) -> CellSet {
        neighbours(cell, self.kind.movement(), self.owner)
    }
}

/// Cells reachable in one step from `cell` for the given capability and owner.
///
/// A diagonal step is only produced when both of its orthogonal components
/// stay on the board.
pub fn neighbours(cell: usize, movement: Movement, owner: Player) -> CellSet {
    let mut out = CellSet::EMPTY;
    if cell >= CELLS {
        return out;
    }
    let row = (cell / COLS) as isize;
    let col = (cell % COLS) as isize;
    let sign = owner.sign();

    for (dir, forward, right) in STEPS {
        if !movement.contains(dir) {
            continue;
        }
        let r = row + forward * sign;
        let c = col + right * sign;
        let row_ok = (0..ROWS as isize).contains(&r);
        let col_ok = (0..COLS as isize).contains(&c);
        if row_ok && col_ok {
            out.insert((r * COLS as isize + c) as usize);
        }
    }
    out
}

// =============================================================================
// Cell sets
// =============================================================================

/// A set of board cells, one bit per cell.
#[derive(Copy, Clone, Default, PartialEq, Eq, Hash)]
pub struct CellSet(u16);

impl CellSet {
    pub const EMPTY: CellSet = CellSet(0);

    #[inline]
    pub fn insert(&mut self, cell: usize) {
        debug_assert!(cell < CELLS);
        self.0 |= 1 << cell;
    }

    #[inline]
    pub fn contains(&self, cell: usize) -> bool {
        cell < CELLS && self.0 & (1 << cell) != 0
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Cells in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        (0..CELLS).filter(|&c| self.contains(c))
    }

    pub fn to_vec(&self) -> Vec<usize> {
        self.iter().collect()
    }
}

impl BitOr for CellSet {
    type Output = CellSet;

    fn bitor(self, rhs: CellSet) -> CellSet {
        CellSet(self.0 | rhs.0)
    }
}

impl BitOrAssign for CellSet {
    fn bitor_assign(&mut self, rhs: CellSet) {
        self.0 |= rhs.0;
    }
}

impl FromIterator<usize> for CellSet {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        let mut set = CellSet::EMPTY;
        for cell in iter {
            set.insert(cell);
        }
        set
    }
}

impl fmt::Debug for CellSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cells(v: &[usize]) -> CellSet {
        v.iter().copied().collect()
    }

    #[test]
    fn test_pawn_moves_forward_per_owner() {
        let bottom = Piece::new(PieceKind::Pawn, Player::Bottom);
        let top = Piece::new(PieceKind::Pawn, Player::Top);
        assert_eq!(bottom.neighbours(4), cells(&[7]));
        assert_eq!(top.neighbours(7), cells(&[4]));

        // No forward step off the board
        assert!(bottom.neighbours(10).is_empty());
        assert!(top.neighbours(1).is_empty());
    }

    #[test]
    fn test_king_in_center_and_corner() {
        let king = Piece::new(PieceKind::King, Player::Bottom);
        assert_eq!(king.neighbours(4), cells(&[0, 1, 2, 3, 5, 6, 7, 8]));
        assert_eq!(king.neighbours(0), cells(&[1, 3, 4]));
        assert_eq!(king.neighbours(11), cells(&[7, 8, 10]));
    }

    #[test]
    fn test_bishop_diagonals_need_both_axes() {
        let bishop = Piece::new(PieceKind::Bishop, Player::Top);
        // Left edge: only the diagonals toward column 1
        assert_eq!(bishop.neighbours(3), cells(&[1, 7]));
        // Corner
        assert_eq!(bishop.neighbours(11), cells(&[7]));
        // No wrap-around from column 2 to column 0 of the next row
        assert!(!bishop.neighbours(5).contains(9));
        assert!(!bishop.neighbours(5).contains(3));
    }

    #[test]
    fn test_promoted_pawn_is_asymmetric() {
        let bottom = Piece::new(PieceKind::PromotedPawn, Player::Bottom);
        // Forward diagonals (7 +/- 1 row) are allowed, backward diagonals are not
        assert_eq!(bottom.neighbours(4), cells(&[1, 3, 5, 6, 7, 8]));

        let top = Piece::new(PieceKind::PromotedPawn, Player::Top);
        assert_eq!(top.neighbours(7), cells(&[3, 4, 5, 6, 8, 10]));
    }

    #[test]
    fn test_rook_orthogonal() {
        let rook = Piece::new(PieceKind::Rook, Player::Bottom);
        assert_eq!(rook.neighbours(2), cells(&[1, 5]));
    }

    #[test]
    fn test_promote_and_demote() {
        let mut p = Piece::new(PieceKind::Pawn, Player::Bottom);
        p.promote();
        assert_eq!(p.kind, PieceKind::PromotedPawn);
        p.demote();
        assert_eq!(p.kind, PieceKind::Pawn);

        let mut k = Piece::new(PieceKind::King, Player::Top);
        k.promote();
        k.demote();
        assert_eq!(k.kind, PieceKind::King);
    }

    #[test]
    fn test_letters() {
        let p = Piece::from_letter('G').unwrap();
        assert_eq!(p, Piece::new(PieceKind::PromotedPawn, Player::Top));
        assert_eq!(p.letter(), 'G');
        assert_eq!(Piece::from_letter('x'), None);
    }

    #[test]
    fn test_rows() {
        assert!(Player::Bottom.last_row_contains(9));
        assert!(!Player::Bottom.last_row_contains(8));
        assert!(Player::Top.last_row_contains(2));
        assert!(Player::Top.far_half_contains(5));
        assert!(!Player::Top.far_half_contains(6));
    }
}
