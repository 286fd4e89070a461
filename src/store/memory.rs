//! In-memory interaction log.

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::LogError;

use super::traits::{FinalizedInteraction, InteractionLog};

/// Keeps records in process memory. Useful for embedding and tests.
#[derive(Debug, Default)]
pub struct MemoryLog {
    records: RwLock<Vec<FinalizedInteraction>>,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all appended records.
    pub async fn records(&self) -> Vec<FinalizedInteraction> {
        self.records.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl InteractionLog for MemoryLog {
    async fn append(&self, record: &FinalizedInteraction) -> Result<(), LogError> {
        self.records.write().await.push(record.clone());
        Ok(())
    }
}
