//! Draft ordering and pick legality.

pub mod order;
pub mod pick;

pub use order::{compute_turn, DraftTurn, Participant};
pub use pick::{Pick, PickError};
