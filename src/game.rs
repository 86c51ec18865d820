//! Game state: board, hands, turn, and the reversible move log.
//!
//! Pieces live in an arena owned by the game and are referred to by
//! `PieceId`. A piece is reachable from exactly one place: a board cell or
//! one of the two hands. Every recorded move pushes a `MoveRecord` holding
//! just enough to reverse it, so `undo_last_move` restores the previous
//! state exactly (cells, hands, kinds, owners, flags, turn).
//!
//! Special rules handled here:
//! - Capturing the opposing king wins at once.
//! - A king that reaches the far row wins at once if no enemy piece can
//!   reach its cell; otherwise the win is pending, and it is claimed when
//!   the opponent finishes a move without capturing it.
//! - Shuttling the same piece kind back and forth long enough is a draw.

use std::cell::Cell;
use std::fmt;

use thiserror::Error;

use crate::constants::{
    CELLS, COLS, DEFAULT_POSITION, FINGERPRINT_PIECES, HAND_CELL, REPETITION_LIMIT, ROWS,
};
use crate::encoding::{DecodeError, Layout};
use crate::events::{GameEvent, GameObserver, Observers, Outcome};
use crate::piece::{CellSet, Piece, PieceKind, Player};

/// Stable handle of a piece within one `Game`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PieceId(u32);

impl PieceId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for PieceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Where a piece currently is.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Location {
    Board(usize),
    Hand(Player),
}

/// Reasons a move or undo is refused. A refused call changes nothing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoveError {
    #[error("no piece {0} in this game")]
    UnknownPiece(PieceId),
    #[error("piece belongs to {owner}, but {turn} is to move")]
    NotYourTurn { owner: Player, turn: Player },
    #[error("cell {0} is not on the board")]
    OutOfBoard(usize),
    #[error("cell {to} cannot be reached from cell {from}")]
    Unreachable { from: usize, to: usize },
    #[error("cell {0} is occupied")]
    Occupied(usize),
    #[error("piece {0} is not in its owner's hand")]
    NotInHand(PieceId),
    #[error("game is over: {0}")]
    GameOver(Outcome),
    #[error("no move to undo")]
    EmptyHistory,
    #[error("move history does not match the board")]
    CorruptHistory,
}

/// What a successfully applied move led to.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MoveEffect {
    Continue,
    Ended(Outcome),
}

/// Pending-win flags: a king sits on the far row but could still be taken.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct PendingWin {
    pub bottom: bool,
    pub top: bool,
}

impl PendingWin {
    pub fn get(self, player: Player) -> bool {
        match player {
            Player::Bottom => self.bottom,
            Player::Top => self.top,
        }
    }

    fn arm(&mut self, player: Player) {
        match player {
            Player::Bottom => self.bottom = true,
            Player::Top => self.top = true,
        }
    }
}

/// Draw-by-repetition policy.
///
/// A move matches when it moves the same kind of piece as the same side's
/// previous move, back onto the cell that move started from. Each match
/// bumps a counter, anything else resets it; a draw is declared when the
/// counter reaches `limit`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RepetitionRule {
    pub limit: u32,
    /// Counter value after dispatching pieces.
    pub initial: u32,
}

impl Default for RepetitionRule {
    fn default() -> Self {
        Self {
            limit: REPETITION_LIMIT,
            initial: 0,
        }
    }
}

/// Everything needed to reverse one move.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MoveRecord {
    /// Kind of the moving piece before it moved (before any promotion).
    pub kind_before: PieceKind,
    /// Origin cell, `None` for a reinsertion from hand.
    pub from: Option<usize>,
    pub to: usize,
    /// Kind of the captured piece as it stood on the board.
    pub captured: Option<PieceKind>,
    /// Hand index the reinserted piece was taken from.
    pub hand_slot: usize,
    pub pending_before: PendingWin,
    pub repetitions_before: u32,
    pub outcome_before: Option<Outcome>,
}

/// Lazily computed position fingerprint. Takes no part in equality.
#[derive(Clone, Debug, Default)]
struct HashCache(Cell<Option<u64>>);

impl PartialEq for HashCache {
    fn eq(&self, _other: &Self) -> bool {
        true
    }
}

/// Translation between the piece handles of a game and of its snapshot.
#[derive(Clone, Debug, Default)]
pub struct PieceMap {
    /// Indexed by snapshot id.
    originals: Vec<PieceId>,
    /// Indexed by original id.
    copies: Vec<Option<PieceId>>,
}

impl PieceMap {
    /// Original piece behind a snapshot piece.
    pub fn original(&self, copy: PieceId) -> Option<PieceId> {
        self.originals.get(copy.index()).copied()
    }

    /// Snapshot piece standing for an original piece.
    pub fn copy_of(&self, original: PieceId) -> Option<PieceId> {
        self.copies.get(original.index()).copied().flatten()
    }

    fn link(&mut self, copy: PieceId, original: PieceId) {
        debug_assert_eq!(copy.index(), self.originals.len());
        self.originals.push(original);
        if self.copies.len() <= original.index() {
            self.copies.resize(original.index() + 1, None);
        }
        self.copies[original.index()] = Some(copy);
    }
}

/// The board state of one game.
#[derive(Clone, Debug, PartialEq)]
pub struct Game {
    pieces: Vec<Piece>,
    board: [Option<PieceId>; CELLS],
    bottom_hand: Vec<PieceId>,
    top_hand: Vec<PieceId>,
    turn: Player,
    pending: PendingWin,
    history: Vec<MoveRecord>,
    rule: RepetitionRule,
    repetitions: u32,
    outcome: Option<Outcome>,
    hash: HashCache,
    observers: Observers,
}

impl Default for Game {
    fn default() -> Self {
        Self::new()
    }
}

impl Game {
    /// A game set up with the default starting position.
    pub fn new() -> Self {
        let mut game = Self::empty();
        if let Ok(layout) = Layout::parse(DEFAULT_POSITION) {
            game.load(&layout);
        }
        game
    }

    /// A game with an empty board and empty hands, BOTTOM to move.
    pub fn empty() -> Self {
        Self {
            pieces: Vec::new(),
            board: [None; CELLS],
            bottom_hand: Vec::new(),
            top_hand: Vec::new(),
            turn: Player::Bottom,
            pending: PendingWin::default(),
            history: Vec::new(),
            rule: RepetitionRule::default(),
            repetitions: 0,
            outcome: None,
            hash: HashCache::default(),
            observers: Observers::default(),
        }
    }

    /// A game set up from a position string.
    pub fn from_encoding(s: &str) -> Result<Self, DecodeError> {
        let mut game = Self::empty();
        game.decode(s)?;
        Ok(game)
    }

    // -------------------------------------------------------------------------
    // Setup
    // -------------------------------------------------------------------------

    /// Replace the position with the one described by `s`.
    ///
    /// Board, hands, turn, pending wins and history are all reset. The string
    /// is fully parsed before anything changes, so a malformed string leaves
    /// the game untouched.
    pub fn decode(&mut self, s: &str) -> Result<(), DecodeError> {
        let layout = Layout::parse(s)?;
        self.load(&layout);
        Ok(())
    }

    /// Reset to the start of a game and notify observers.
    ///
    /// Uses the default starting position when `encoding` is `None`.
    pub fn dispatch_pieces(&mut self, encoding: Option<&str>) -> Result<(), DecodeError> {
        self.decode(encoding.unwrap_or(DEFAULT_POSITION))?;
        self.observers.emit(GameEvent::Init);
        Ok(())
    }

    fn load(&mut self, layout: &Layout) {
        self.pieces.clear();
        self.board = [None; CELLS];
        self.bottom_hand.clear();
        self.top_hand.clear();

        for (cell, piece) in layout.cells.iter().enumerate() {
            if let Some(piece) = piece {
                self.board[cell] = Some(self.adopt(*piece));
            }
        }
        for piece in &layout.bottom_hand {
            let id = self.adopt(*piece);
            self.bottom_hand.push(id);
        }
        for piece in &layout.top_hand {
            let id = self.adopt(*piece);
            self.top_hand.push(id);
        }

        self.turn = layout.turn.unwrap_or_else(|| {
            if fastrand::bool() {
                Player::Bottom
            } else {
                Player::Top
            }
        });
        self.pending = PendingWin::default();
        self.history.clear();
        self.repetitions = self.rule.initial;
        self.outcome = None;
        self.touch();
    }

    fn adopt(&mut self, piece: Piece) -> PieceId {
        let id = PieceId(self.pieces.len() as u32);
        self.pieces.push(piece);
        id
    }

    /// Register an observer for init, movement and end notifications.
    pub fn subscribe(&mut self, observer: Box<dyn GameObserver>) {
        self.observers.push(observer);
    }

    pub fn set_repetition_rule(&mut self, rule: RepetitionRule) {
        self.rule = rule;
    }

    // -------------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------------

    pub fn current_player(&self) -> Player {
        self.turn
    }

    /// Force the side to move. Intended for setting up positions.
    pub fn set_current_player(&mut self, player: Player) {
        self.turn = player;
    }

    /// Piece handle on a cell, `None` for an empty or out-of-range cell.
    pub fn cell(&self, index: usize) -> Option<PieceId> {
        self.board.get(index).copied().flatten()
    }

    /// Piece value on a cell.
    pub fn cell_contents(&self, index: usize) -> Option<Piece> {
        self.cell(index).map(|id| self.pieces[id.index()])
    }

    pub fn piece(&self, id: PieceId) -> Option<Piece> {
        self.pieces.get(id.index()).copied()
    }

    pub fn hand(&self, player: Player) -> &[PieceId] {
        match player {
            Player::Bottom => &self.bottom_hand,
            Player::Top => &self.top_hand,
        }
    }

    fn hand_mut(&mut self, player: Player) -> &mut Vec<PieceId> {
        match player {
            Player::Bottom => &mut self.bottom_hand,
            Player::Top => &mut self.top_hand,
        }
    }

    /// First piece of the given kind in a player's hand.
    pub fn hand_piece(&self, player: Player, kind: PieceKind) -> Option<PieceId> {
        self.hand(player)
            .iter()
            .copied()
            .find(|&id| self.pieces[id.index()].kind == kind)
    }

    pub fn location(&self, id: PieceId) -> Option<Location> {
        if let Some(cell) = self.board.iter().position(|&c| c == Some(id)) {
            return Some(Location::Board(cell));
        }
        for player in [Player::Bottom, Player::Top] {
            if self.hand(player).contains(&id) {
                return Some(Location::Hand(player));
            }
        }
        None
    }

    pub fn pending_win(&self, player: Player) -> bool {
        self.pending.get(player)
    }

    pub fn history(&self) -> &[MoveRecord] {
        &self.history
    }

    /// Result of the game, once an end notification has fired.
    pub fn outcome(&self) -> Option<Outcome> {
        self.outcome
    }

    /// Current value of the repetition counter.
    pub fn repetitions(&self) -> u32 {
        self.repetitions
    }

    /// Number of pieces in the game, on the board and in hands.
    pub fn piece_count(&self) -> usize {
        self.pieces.len()
    }

    /// Cells a piece may move to.
    ///
    /// A piece in hand may be reinserted on any empty cell. A piece on the
    /// board may step to any reachable cell not held by its own side.
    pub fn legal_destinations(&self, id: PieceId) -> CellSet {
        let Some(piece) = self.piece(id) else {
            return CellSet::EMPTY;
        };
        match self.location(id) {
            Some(Location::Board(from)) => piece
                .neighbours(from)
                .iter()
                .filter(|&to| match self.cell_contents(to) {
                    Some(other) => other.owner != piece.owner,
                    None => true,
                })
                .collect(),
            Some(Location::Hand(_)) => self.empty_cells(),
            None => CellSet::EMPTY,
        }
    }

    pub fn empty_cells(&self) -> CellSet {
        (0..CELLS).filter(|&c| self.board[c].is_none()).collect()
    }

    /// Every cell some board piece of `player` could move to right now.
    pub fn attack_set(&self, player: Player) -> CellSet {
        let mut attacks = CellSet::EMPTY;
        for id in self.board.iter().flatten() {
            if self.pieces[id.index()].owner == player {
                attacks |= self.legal_destinations(*id);
            }
        }
        attacks
    }

    // -------------------------------------------------------------------------
    // Moves
    // -------------------------------------------------------------------------

    /// Move a piece (or reinsert it, if it is in hand) and record the move.
    pub fn apply_move(&mut self, id: PieceId, to: usize) -> Result<MoveEffect, MoveError> {
        self.play(id, to, true)
    }

    /// Like `apply_move`, but without recording; such a move cannot be undone.
    pub fn apply_move_unrecorded(
        &mut self,
        id: PieceId,
        to: usize,
    ) -> Result<MoveEffect, MoveError> {
        self.play(id, to, false)
    }

    fn play(&mut self, id: PieceId, to: usize, record: bool) -> Result<MoveEffect, MoveError> {
        let piece = self.check_mover(id)?;
        let from = match self.location(id) {
            Some(Location::Board(from)) => from,
            Some(Location::Hand(_)) => return self.apply_reinsertion(id, to, record),
            None => return Err(MoveError::UnknownPiece(id)),
        };

        if to >= CELLS {
            return Err(MoveError::OutOfBoard(to));
        }
        if !piece.neighbours(from).contains(to) {
            log::debug!("rejected {} from {from} to {to}: unreachable", piece.letter());
            return Err(MoveError::Unreachable { from, to });
        }
        if self.cell_contents(to).is_some_and(|p| p.owner == piece.owner) {
            return Err(MoveError::Occupied(to));
        }

        let mover = piece.owner;
        let mut entry = MoveRecord {
            kind_before: piece.kind,
            from: Some(from),
            to,
            captured: None,
            hand_slot: 0,
            pending_before: self.pending,
            repetitions_before: self.repetitions,
            outcome_before: self.outcome,
        };

        let taken = self.board[to];
        self.board[from] = None;
        self.board[to] = Some(id);

        if piece.kind == PieceKind::Pawn && mover.last_row_contains(to) {
            self.pieces[id.index()].promote();
        }

        if let Some(taken) = taken {
            let captured = &mut self.pieces[taken.index()];
            entry.captured = Some(captured.kind);
            captured.owner = mover;
            captured.demote();
            self.hand_mut(mover).push(taken);
        }

        let outcome = if entry.captured == Some(PieceKind::King) {
            Some(Outcome::Win(mover))
        } else if self.pending.get(mover.opponent()) {
            Some(Outcome::Win(mover.opponent()))
        } else if piece.kind == PieceKind::King && mover.last_row_contains(to) {
            if self.attack_set(mover.opponent()).contains(to) {
                self.pending.arm(mover);
                None
            } else {
                Some(Outcome::Win(mover))
            }
        } else {
            None
        };

        Ok(self.finish(entry, outcome, record))
    }

    /// Drop a piece from its owner's hand onto an empty cell.
    pub fn apply_reinsertion(
        &mut self,
        id: PieceId,
        to: usize,
        record: bool,
    ) -> Result<MoveEffect, MoveError> {
        let piece = self.check_mover(id)?;
        let Some(slot) = self.hand(piece.owner).iter().position(|&h| h == id) else {
            log::warn!("reinsertion of {id}: not in {} hand", piece.owner);
            return Err(MoveError::NotInHand(id));
        };
        if to >= CELLS {
            return Err(MoveError::OutOfBoard(to));
        }
        if self.board[to].is_some() {
            log::debug!("rejected reinsertion of {} on {to}: occupied", piece.letter());
            return Err(MoveError::Occupied(to));
        }

        let mover = piece.owner;
        let entry = MoveRecord {
            kind_before: piece.kind,
            from: None,
            to,
            captured: None,
            hand_slot: slot,
            pending_before: self.pending,
            repetitions_before: self.repetitions,
            outcome_before: self.outcome,
        };

        self.hand_mut(mover).remove(slot);
        self.board[to] = Some(id);

        let outcome = if self.pending.get(mover.opponent()) {
            Some(Outcome::Win(mover.opponent()))
        } else {
            None
        };

        Ok(self.finish(entry, outcome, record))
    }

    /// Checks shared by moves and reinsertions.
    fn check_mover(&self, id: PieceId) -> Result<Piece, MoveError> {
        if let Some(outcome) = self.outcome {
            return Err(MoveError::GameOver(outcome));
        }
        let piece = self.piece(id).ok_or(MoveError::UnknownPiece(id))?;
        if piece.owner != self.turn {
            log::debug!("rejected move of {}: {} to move", piece.letter(), self.turn);
            return Err(MoveError::NotYourTurn {
                owner: piece.owner,
                turn: self.turn,
            });
        }
        Ok(piece)
    }

    /// Record, check repetition, pass the turn, and notify.
    fn finish(&mut self, entry: MoveRecord, mut outcome: Option<Outcome>, record: bool) -> MoveEffect {
        if record {
            self.history.push(entry);
            if outcome.is_none() && self.bump_repetitions() {
                outcome = Some(Outcome::Draw);
            }
        }

        self.outcome = outcome;
        self.turn = self.turn.opponent();
        self.touch();

        // A game-ending move only announces the end
        match outcome {
            Some(outcome) => {
                log::debug!("game ended: {outcome}");
                self.observers.emit(GameEvent::End(outcome));
                MoveEffect::Ended(outcome)
            }
            None => {
                self.observers.emit(GameEvent::Movement);
                MoveEffect::Continue
            }
        }
    }

    /// Update the repetition counter for the last recorded move.
    /// Returns true when the draw threshold is reached.
    fn bump_repetitions(&mut self) -> bool {
        let n = self.history.len();
        if n < 3 {
            return false;
        }
        let last = self.history[n - 1];
        let before = self.history[n - 3];
        let shuttles = last.from.is_some()
            && before.from == Some(last.to)
            && before.kind_before == last.kind_before;

        self.repetitions = if shuttles { self.repetitions + 1 } else { 0 };
        self.repetitions >= self.rule.limit
    }

    /// Take back the last recorded move.
    pub fn undo_last_move(&mut self) -> Result<(), MoveError> {
        let Some(entry) = self.history.last().copied() else {
            log::warn!("undo requested with empty history");
            return Err(MoveError::EmptyHistory);
        };
        let mover = self.turn.opponent();

        let moved = self.cell(entry.to);
        let consistent = match moved {
            Some(id) => {
                let owner_ok = self.pieces[id.index()].owner == mover;
                let origin_ok = entry.from.is_none_or(|from| self.board[from].is_none());
                let capture_ok = entry.captured.is_none() || !self.hand(mover).is_empty();
                owner_ok && origin_ok && capture_ok
            }
            None => false,
        };
        let Some(id) = moved.filter(|_| consistent) else {
            log::warn!("undo of move to cell {}: history does not match board", entry.to);
            return Err(MoveError::CorruptHistory);
        };
        self.history.pop();

        match entry.from {
            None => {
                self.board[entry.to] = None;
                let hand = self.hand_mut(mover);
                let slot = entry.hand_slot.min(hand.len());
                hand.insert(slot, id);
            }
            Some(from) => {
                self.pieces[id.index()].kind = entry.kind_before;
                self.board[from] = Some(id);
                self.board[entry.to] = None;
                if let Some(kind) = entry.captured {
                    if let Some(taken) = self.hand_mut(mover).pop() {
                        let piece = &mut self.pieces[taken.index()];
                        piece.kind = kind;
                        piece.owner = mover.opponent();
                        self.board[entry.to] = Some(taken);
                    }
                }
            }
        }

        self.pending = entry.pending_before;
        self.repetitions = entry.repetitions_before;
        self.outcome = entry.outcome_before;
        self.turn = mover;
        self.touch();
        self.observers.emit(GameEvent::Movement);
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Fingerprint, snapshot, encoding
    // -------------------------------------------------------------------------

    fn touch(&self) {
        self.hash.0.set(None);
    }

    /// 8-byte fingerprint of the position (board plus hands, not the turn).
    ///
    /// One byte per piece: kind in bits 0-2, cell in bits 3-6 (15 for hand),
    /// owner in bit 7 (set for TOP). Board pieces come in cell order, then
    /// each hand sorted by kind. Exact for up to 8 pieces; beyond that the
    /// extra bytes are folded in.
    pub fn hash(&self) -> u64 {
        if let Some(hash) = self.hash.0.get() {
            return hash;
        }
        let hash = self.compute_hash();
        self.hash.0.set(Some(hash));
        hash
    }

    fn compute_hash(&self) -> u64 {
        let mut bytes: Vec<u8> = Vec::with_capacity(FINGERPRINT_PIECES);
        for (cell, id) in self.board.iter().enumerate() {
            if let Some(id) = id {
                bytes.push(fingerprint(self.pieces[id.index()], cell as u8));
            }
        }
        for player in [Player::Bottom, Player::Top] {
            let mut hand: Vec<Piece> = self
                .hand(player)
                .iter()
                .map(|id| self.pieces[id.index()])
                .collect();
            hand.sort_by_key(|p| p.kind);
            bytes.extend(hand.into_iter().map(|p| fingerprint(p, HAND_CELL)));
        }

        bytes
            .iter()
            .enumerate()
            .fold(0u64, |acc, (i, &b)| acc ^ (u64::from(b) << (8 * (i % 8))))
    }

    /// Independent copy with freshly allocated piece handles.
    ///
    /// Returns the copy and the map between its handles and ours. Observers
    /// are not copied.
    pub fn snapshot(&self) -> (Game, PieceMap) {
        let mut map = PieceMap::default();
        let mut copy = Game::empty();

        for (cell, id) in self.board.iter().enumerate() {
            if let Some(id) = *id {
                let new = copy.adopt(self.pieces[id.index()]);
                map.link(new, id);
                copy.board[cell] = Some(new);
            }
        }
        for player in [Player::Top, Player::Bottom] {
            for &id in self.hand(player) {
                let new = copy.adopt(self.pieces[id.index()]);
                map.link(new, id);
                copy.hand_mut(player).push(new);
            }
        }

        copy.turn = self.turn;
        copy.pending = self.pending;
        copy.history = self.history.clone();
        copy.rule = self.rule;
        copy.repetitions = self.repetitions;
        copy.outcome = self.outcome;
        (copy, map)
    }

    /// Current position as a `Layout`.
    pub fn layout(&self) -> Layout {
        let piece_of = |id: &PieceId| self.pieces[id.index()];
        Layout {
            cells: std::array::from_fn(|c| self.board[c].map(|id| piece_of(&id))),
            turn: Some(self.turn),
            bottom_hand: self.bottom_hand.iter().map(piece_of).collect(),
            top_hand: self.top_hand.iter().map(piece_of).collect(),
        }
    }

    /// Current position as a position string.
    pub fn encode(&self) -> String {
        self.layout().to_string()
    }
}

fn fingerprint(piece: Piece, cell: u8) -> u8 {
    let mut byte = piece.kind as u8;
    byte |= cell << 3;
    if piece.owner == Player::Top {
        byte |= 1 << 7;
    }
    byte
}

impl fmt::Display for Game {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // TOP's home row is printed first
        for row in (0..ROWS).rev() {
            for col in 0..COLS {
                let cell = row * COLS + col;
                let ch = self.cell_contents(cell).map_or('.', |p| p.letter());
                write!(f, "{ch} ")?;
            }
            writeln!(f)?;
        }
        for player in [Player::Top, Player::Bottom] {
            let letters: String = self
                .hand(player)
                .iter()
                .map(|id| self.pieces[id.index()].letter())
                .collect();
            writeln!(f, "{player} hand: {}", if letters.is_empty() { "-" } else { &letters })?;
        }
        match self.outcome {
            Some(outcome) => write!(f, "result: {outcome}"),
            None => write!(f, "to move: {}", self.turn),
        }
    }
}
