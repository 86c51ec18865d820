//! Yokai-Rust: a 3x4 mini-shogi engine.
//!
//! Two players each start with a king, a rook, a bishop and a pawn on a
//! board of 3 columns and 4 rows. Captured pieces change sides and can be
//! dropped back on any empty cell. A game is won by capturing the opposing
//! king, or by bringing one's own king safely to the far row.
//!
//! ## Modules
//!
//! - [`constants`] - Board dimensions and engine parameters
//! - [`piece`] - Players, piece kinds and movement geometry
//! - [`encoding`] - Text encoding of positions
//! - [`game`] - Board state, move application and undo
//! - [`events`] - Notifications sent by a game to its observers
//! - [`playout`] - Move generation and random playouts
//! - [`search`] - Negamax search and static evaluation
//! - [`competitor`] - Computer player searching on a worker thread
//! - [`protocol`] - Line-oriented text protocol
//!
//! ## Example
//!
//! ```
//! use yokai_rust::game::Game;
//! use yokai_rust::search::{Budget, CancelToken, search};
//!
//! // Start a game from the default position
//! let mut game = Game::new();
//!
//! // The bottom pawn on cell 4 can only take the pawn in front of it
//! let pawn = game.cell(4).unwrap();
//! assert_eq!(game.legal_destinations(pawn).to_vec(), vec![7]);
//! game.apply_move(pawn, 7).unwrap();
//!
//! // Search a reply for the top player
//! let result = search(&mut game, Budget::Depth(3), &CancelToken::new());
//! println!("Best reply: {:?}", result.best);
//! ```

pub mod competitor;
pub mod constants;
pub mod encoding;
pub mod events;
pub mod game;
pub mod piece;
pub mod playout;
pub mod protocol;
pub mod search;
