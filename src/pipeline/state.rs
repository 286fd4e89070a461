//! Pipeline state — a typestate record that only grows.
//!
//! Each stage consumes the previous `PipelineState<S>` and returns a new one
//! with exactly its own fields added, so stages cannot run out of order or
//! overwrite an earlier stage's output.

use std::marker::PhantomData;

use serde::{Deserialize, Serialize};

/// Entities extracted from an email (free-form JSON object).
pub type Entities = serde_json::Map<String, serde_json::Value>;

/// Stage markers.
pub mod stage {
    /// No stage has run yet.
    #[derive(Debug, Clone, Copy)]
    pub struct Started;
    /// CLASSIFY has set `category`.
    #[derive(Debug, Clone, Copy)]
    pub struct Classified;
    /// EXTRACT has set `intent` and `entities`.
    #[derive(Debug, Clone, Copy)]
    pub struct Extracted;
    /// REPLY has set `reply`. Terminal.
    #[derive(Debug, Clone, Copy)]
    pub struct Replied;
}

use stage::{Classified, Extracted, Replied, Started};

/// Named pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Classify,
    Extract,
    Reply,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Classify => "classify",
            Self::Extract => "extract",
            Self::Reply => "reply",
        };
        write!(f, "{s}")
    }
}

/// Result of the EXTRACT stage.
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub intent: String,
    pub entities: Entities,
}

/// Accumulator threaded through one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineState<S> {
    email_body: String,
    category: Option<String>,
    intent: Option<String>,
    entities: Option<Entities>,
    reply: Option<String>,
    _stage: PhantomData<S>,
}

impl<S> PipelineState<S> {
    pub fn email_body(&self) -> &str {
        &self.email_body
    }

    pub fn category(&self) -> Option<&str> {
        self.category.as_deref()
    }

    pub fn intent(&self) -> Option<&str> {
        self.intent.as_deref()
    }

    pub fn entities(&self) -> Option<&Entities> {
        self.entities.as_ref()
    }

    pub fn reply(&self) -> Option<&str> {
        self.reply.as_deref()
    }

    fn advance<T>(self) -> PipelineState<T> {
        PipelineState {
            email_body: self.email_body,
            category: self.category,
            intent: self.intent,
            entities: self.entities,
            reply: self.reply,
            _stage: PhantomData,
        }
    }
}

impl PipelineState<Started> {
    pub fn new(email_body: impl Into<String>) -> Self {
        Self {
            email_body: email_body.into(),
            category: None,
            intent: None,
            entities: None,
            reply: None,
            _stage: PhantomData,
        }
    }

    pub fn classified(self, category: impl Into<String>) -> PipelineState<Classified> {
        let mut next = self.advance::<Classified>();
        next.category = Some(category.into());
        next
    }
}

impl PipelineState<Classified> {
    pub fn extracted(self, extraction: Extraction) -> PipelineState<Extracted> {
        let mut next = self.advance::<Extracted>();
        next.intent = Some(extraction.intent);
        next.entities = Some(extraction.entities);
        next
    }
}

impl PipelineState<Extracted> {
    pub fn replied(self, reply: impl Into<String>) -> PipelineState<Replied> {
        let mut next = self.advance::<Replied>();
        next.reply = Some(reply.into());
        next
    }
}

impl PipelineState<Replied> {
    /// Unpack the completed run; every field is populated at this point.
    pub fn into_output(self) -> PipelineOutput {
        PipelineOutput {
            email_body: self.email_body,
            category: self.category.unwrap_or_default(),
            intent: self.intent.unwrap_or_default(),
            entities: self.entities.unwrap_or_default(),
            reply: self.reply.unwrap_or_default(),
        }
    }
}

/// Fully populated pipeline result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineOutput {
    pub email_body: String,
    pub category: String,
    pub intent: String,
    pub entities: Entities,
    pub reply: String,
}
