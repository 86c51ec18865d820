//! Constants for board geometry, piece values, and search parameters.
//!
//! The board is a fixed 3x4 grid stored as a flat array in row-major order.
//! Row 0 (cells 0..=2) is BOTTOM's home row, row 3 (cells 9..=11) is TOP's.
//!
//! ```text
//!  0  1  2    <- BOTTOM starts here, TOP promotes here
//!  3  4  5
//!  6  7  8
//!  9 10 11    <- TOP starts here, BOTTOM promotes here
//! ```

// =============================================================================
// Board Geometry
// =============================================================================

/// Number of columns.
pub const COLS: usize = 3;

/// Number of rows.
pub const ROWS: usize = 4;

/// Total number of cells on the board.
pub const CELLS: usize = COLS * ROWS;

/// Cell used in the position fingerprint for pieces held in a hand.
pub const HAND_CELL: u8 = 15;

// =============================================================================
// Game Setup
// =============================================================================

/// Starting position: each side has bishop, king and rook on its home row
/// and a pawn in front of the king. BOTTOM moves first.
pub const DEFAULT_POSITION: &str = "bkr/1p1/1P1/RKB b";

/// Number of consecutive back-and-forth moves that ends the game in a draw.
pub const REPETITION_LIMIT: u32 = 10;

// =============================================================================
// Evaluation
// =============================================================================

/// Material values, indexed by `PieceKind as usize`.
/// Order: King, Bishop, Rook, Pawn, PromotedPawn.
pub const MATERIAL: [i32; 5] = [0, 15, 25, 5, 30];

/// Bonus for a king entering the far half of the board, then the far row.
pub const KING_ADVANCE_BONUS: [i32; 2] = [25, 25];

/// Base score for a decided game. Wins are reported as `WIN_SCORE + depth`
/// so that quicker wins sort above slower ones.
pub const WIN_SCORE: i32 = 10_000;

// =============================================================================
// Search
// =============================================================================

/// Search depth (plies) used when no budget is given.
pub const DEFAULT_DEPTH: u32 = 5;

/// Lowest depth a time budget may map to.
pub const MIN_TIMED_DEPTH: u32 = 2;

/// Highest depth a time budget may map to.
pub const MAX_TIMED_DEPTH: u32 = DEFAULT_DEPTH + 3;

/// The 8-byte position fingerprint is exact up to this many pieces.
pub const FINGERPRINT_PIECES: usize = 8;
