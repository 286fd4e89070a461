//! Email reply pipeline.
//!
//! Every email flows through three fixed stages:
//! 1. CLASSIFY — category label from the body
//! 2. EXTRACT — intent and entities as a JSON object
//! 3. REPLY — reply text using category, intent and entities as context
//!
//! **The pipeline is total.** Model failures are retried, then replaced by
//! fallback values; `ReplyPipeline::run` has no error path.

pub mod engine;
pub mod prompts;
pub mod state;

pub use engine::{FALLBACK_CATEGORY, FALLBACK_INTENT, ReplyPipeline, fallback_reply};
pub use state::{Entities, Extraction, PipelineOutput, PipelineState, Stage};
