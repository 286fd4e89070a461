//! Interaction persistence.
//!
//! `InteractionLog` is the only seam the pipeline depends on; `JsonlLog` is
//! the on-disk implementation and `MemoryLog` the in-process one.

pub mod jsonl;
pub mod memory;
pub mod stats;
pub mod traits;

pub use jsonl::JsonlLog;
pub use memory::MemoryLog;
pub use stats::ReplyStats;
pub use traits::{FinalizedInteraction, InteractionLog};
