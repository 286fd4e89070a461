//! `InteractionLog` trait and the record it persists.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::email::EmailRecord;
use crate::error::LogError;
use crate::pipeline::{Entities, FALLBACK_CATEGORY, FALLBACK_INTENT, PipelineOutput};

/// One processed email: parsed input plus pipeline output.
///
/// Serializes to a single self-contained JSON document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalizedInteraction {
    pub id: Uuid,
    /// When the interaction was finalized.
    pub timestamp: DateTime<Utc>,
    pub subject: String,
    pub sender: String,
    pub recipient: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    pub date_raw: String,
    #[serde(default)]
    pub date_parsed: Option<DateTime<FixedOffset>>,
    pub email_body: String,
    pub category: String,
    pub intent: String,
    #[serde(default)]
    pub entities: Entities,
    pub reply: String,
}

impl FinalizedInteraction {
    /// Combine a parsed email with the pipeline result for it.
    pub fn new(email: EmailRecord, output: PipelineOutput) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            subject: email.subject,
            sender: email.sender,
            recipient: email.recipient,
            headers: email.headers,
            date_raw: email.date_raw,
            date_parsed: email.date_parsed,
            email_body: output.email_body,
            category: output.category,
            intent: output.intent,
            entities: output.entities,
            reply: output.reply,
        }
    }

    /// Did any stage fall back to its sentinel value?
    pub fn is_degraded(&self) -> bool {
        self.category == FALLBACK_CATEGORY || self.intent == FALLBACK_INTENT
    }
}

/// Append-only sink for finalized interactions.
///
/// Implementations must tolerate concurrent `append` calls; no ordering is
/// guaranteed across runs.
#[async_trait]
pub trait InteractionLog: Send + Sync {
    /// Persist one interaction.
    async fn append(&self, record: &FinalizedInteraction) -> Result<(), LogError>;
}
