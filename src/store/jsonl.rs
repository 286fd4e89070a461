//! JSON-lines interaction log — one self-contained record per line.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::LogError;

use super::traits::{FinalizedInteraction, InteractionLog};

/// File-backed append-only log.
///
/// Each append opens the file in append mode and writes one complete line,
/// so concurrent runs can share a log without coordination.
#[derive(Debug, Clone)]
pub struct JsonlLog {
    path: PathBuf,
}

impl JsonlLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> LogError {
        LogError::Io {
            path: self.path.clone(),
            source,
        }
    }

    /// Read every record back. A missing file is an empty log.
    pub async fn load(&self) -> Result<Vec<FinalizedInteraction>, LogError> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(self.io_error(e)),
        };

        let mut records = Vec::new();
        for (index, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let record = serde_json::from_str(line).map_err(|source| LogError::Corrupt {
                path: self.path.clone(),
                line: index + 1,
                source,
            })?;
            records.push(record);
        }

        debug!(path = %self.path.display(), count = records.len(), "Loaded interaction log");
        Ok(records)
    }
}

#[async_trait]
impl InteractionLog for JsonlLog {
    async fn append(&self, record: &FinalizedInteraction) -> Result<(), LogError> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| self.io_error(e))?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| self.io_error(e))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| self.io_error(e))?;
        file.flush().await.map_err(|e| self.io_error(e))?;

        info!(
            id = %record.id,
            category = %record.category,
            path = %self.path.display(),
            "Logged interaction"
        );
        Ok(())
    }
}
