//! Tradewatch core: transaction model and the pure page-walk state machine.
mod mark;
mod transaction;
mod walk;

pub use mark::HighWaterMark;
pub use transaction::{Currency, Direction, ItemRef, Party, Sequenced, Transaction, TransactionId};
pub use walk::{fresh_prefix, Page, PageVerdict, SyncWalk, WalkStep};
