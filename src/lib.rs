//! Reply Assist — classify, extract, and reply to emails with an LLM.

pub mod cli;
pub mod config;
pub mod email;
pub mod error;
pub mod llm;
pub mod pipeline;
pub mod service;
pub mod store;
