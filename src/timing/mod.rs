//! Word timing for narrated segments
//!
//! - `table`: per-segment `(word, start)` lists and the active-word lookup
//! - `word_index`: prefix sums mapping `(segment, local)` to a global word index
//! - `source`: where timing tables come from (HTTP or a local directory)
//! - `store`: lazy, sequential loading with a bounded wait

pub mod config;
pub mod source;
pub mod store;
pub mod table;
pub mod word_index;

pub use config::TimingConfig;
pub use source::{FileTimingSource, HttpTimingSource, TimingSource};
pub use store::{TableStatus, TimingIndex};
pub use table::{TimingTable, WordTiming};
pub use word_index::{WordIndex, WordLocation};
