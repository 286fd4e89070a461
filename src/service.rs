//! Reply service — parse, run the pipeline, log the interaction.
//!
//! Input I/O errors stop before the pipeline starts. Log errors are
//! reported next to the finished interaction so the reply is never lost.

use std::path::Path;
use std::sync::Arc;

use tracing::{error, info};

use crate::email::{EmailRecord, parse_email, read_email};
use crate::error::{EmailError, LogError};
use crate::pipeline::ReplyPipeline;
use crate::store::{FinalizedInteraction, InteractionLog};

/// Result of handling one email.
#[derive(Debug)]
pub struct HandledEmail {
    /// The complete interaction, always populated.
    pub interaction: FinalizedInteraction,
    /// Outcome of appending the interaction to the log.
    pub logged: Result<(), LogError>,
}

impl HandledEmail {
    pub fn reply(&self) -> &str {
        &self.interaction.reply
    }
}

/// Orchestrates one email end to end.
pub struct ReplyService {
    pipeline: ReplyPipeline,
    log: Arc<dyn InteractionLog>,
}

impl ReplyService {
    pub fn new(pipeline: ReplyPipeline, log: Arc<dyn InteractionLog>) -> Self {
        Self { pipeline, log }
    }

    /// Read an email file and handle it.
    pub async fn handle_file(&self, path: impl AsRef<Path>) -> Result<HandledEmail, EmailError> {
        let email = read_email(path.as_ref()).await?;
        Ok(self.handle_email(email).await)
    }

    /// Handle raw email text (e.g. an upload buffer).
    pub async fn handle_text(&self, raw: &str) -> HandledEmail {
        self.handle_email(parse_email(raw)).await
    }

    /// Run the pipeline over a parsed email and log the result.
    pub async fn handle_email(&self, email: EmailRecord) -> HandledEmail {
        info!(subject = %email.subject, sender = %email.sender, "Handling email");

        let output = self.pipeline.run(&email.body).await.into_output();
        let interaction = FinalizedInteraction::new(email, output);

        let logged = self.log.append(&interaction).await;
        if let Err(ref e) = logged {
            error!(id = %interaction.id, error = %e, "Failed to log interaction");
        }

        HandledEmail {
            interaction,
            logged,
        }
    }
}
