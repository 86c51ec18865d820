//! Notifications a `Game` sends to whoever displays or drives it.
//!
//! Observers are registered explicitly on a game. Clones and snapshots of a
//! game never carry observers, so search copies stay silent.

use std::fmt;
use std::sync::mpsc::Sender;

use crate::piece::Player;

/// How a game ended.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Outcome {
    Draw,
    Win(Player),
}

impl Outcome {
    /// Numeric end code: 0 = draw, 1 = BOTTOM wins, 2 = TOP wins.
    pub fn code(self) -> u8 {
        match self {
            Outcome::Draw => 0,
            Outcome::Win(Player::Bottom) => 1,
            Outcome::Win(Player::Top) => 2,
        }
    }

    pub fn winner(self) -> Option<Player> {
        match self {
            Outcome::Draw => None,
            Outcome::Win(p) => Some(p),
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Draw => write!(f, "draw"),
            Outcome::Win(p) => write!(f, "{p} wins"),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum GameEvent {
    /// Pieces were dispatched and the board is ready.
    Init,
    /// A move, reinsertion, or undo was applied and the game goes on.
    Movement,
    /// The game ended. Sent instead of `Movement` for the final move.
    End(Outcome),
}

/// Receiver of game notifications.
pub trait GameObserver: Send {
    fn notify(&mut self, event: &GameEvent);
}

impl<F> GameObserver for F
where
    F: FnMut(&GameEvent) + Send,
{
    fn notify(&mut self, event: &GameEvent) {
        self(event)
    }
}

/// Forwards events into a channel. A closed channel is ignored.
pub struct ChannelObserver(pub Sender<GameEvent>);

impl GameObserver for ChannelObserver {
    fn notify(&mut self, event: &GameEvent) {
        let _ = self.0.send(*event);
    }
}

/// Registered observers of one game.
///
/// Cloning yields an empty list, and the list takes no part in equality.
#[derive(Default)]
pub(crate) struct Observers(Vec<Box<dyn GameObserver>>);

impl Observers {
    pub(crate) fn push(&mut self, observer: Box<dyn GameObserver>) {
        self.0.push(observer);
    }

    pub(crate) fn emit(&mut self, event: GameEvent) {
        for observer in &mut self.0 {
            observer.notify(&event);
        }
    }
}

impl Clone for Observers {
    fn clone(&self) -> Self {
        Observers::default()
    }
}

impl PartialEq for Observers {
    fn eq(&self, _other: &Self) -> bool {
        true
    }
}

impl fmt::Debug for Observers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Observers({})", self.0.len())
    }
}
