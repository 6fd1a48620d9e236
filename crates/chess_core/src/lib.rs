//! Board model behind the bundled material-count engine: positions, FEN,
//! legal move generation and UCI move notation.

pub mod board;
pub mod movegen;
pub mod types;
pub mod uci;

pub use board::*;
pub use movegen::*;
pub use types::*;
pub use uci::*;

/// Replay a sequence of moves from `start`, returning the final position.
///
/// Moves must be legal in sequence; they are normally produced by
/// [`parse_uci_move`].
pub fn replay(start: &Position, moves: &[Move]) -> Position {
    let mut pos = start.clone();
    for &mv in moves {
        pos.make_move(mv);
    }
    pos
}
