//! Storage adapter for session logs.
//!
//! Each `<uuid>.jsonl` file in the watched directory becomes a stream
//! addressed by its session identifier. Readers resume from a byte offset
//! and may long-poll at the tail. The reserved `_history` stream lists
//! every discovered session in discovery order.

mod error;
mod history;
mod ledger;
mod notifier;
mod reader;
mod registry;
mod store;

pub use error::StorageError;
pub use history::{HistoryEntry, MemoryLog};
pub use ledger::{Advance, LedgerEntry, Position, Readiness, StreamStatus};
pub use notifier::{TailNotifier, WaitOutcome};
pub use reader::{read_file_range, stat_file, FileStat};
pub use registry::{StreamHandle, StreamRegistry};
pub use store::{ReadOutcome, Storage};
