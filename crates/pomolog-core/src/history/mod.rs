//! The ordered strategy log: sequencing, replay, the plaintext codec,
//! compaction and durable stores.

pub mod codec;
pub mod compaction;
mod sequencer;
mod store;

pub use compaction::{compact, replay_from_empty, CompactionReport};
pub use sequencer::Sequencer;
pub use store::{LogStore, MemoryLog};
