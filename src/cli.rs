//! Command-line interface.

use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "reply-assist", version)]
#[command(about = "Classify emails, extract intent and entities, and draft replies", long_about = None)]
pub struct Cli {
    /// Print statistics of the interaction log instead of processing emails
    #[arg(long, conflicts_with = "files")]
    pub stats: bool,

    /// Plain-text email files to process
    #[arg(required_unless_present = "stats")]
    pub files: Vec<PathBuf>,
}
