//! The transfer journal: an append-only, crash-safe audit log of every
//! finished transfer and its manifest, running in its own isolated
//! execution context so a storage failure there cannot crash the
//! dispatcher.

mod actor;
mod record;
mod store;

pub use actor::Journal;
pub use record::{JournalRecord, JournalStatus};
pub use store::{open, open_in_memory};
