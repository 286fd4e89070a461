//! Prompt construction for the three pipeline stages.

use super::state::Entities;

/// Categories the classifier is asked to choose from.
pub const CATEGORIES: &[&str] = &["support", "schedule", "billing", "feedback", "other"];

/// System prompt for CLASSIFY.
pub fn classification_system_prompt() -> String {
    format!(
        "Classify this email as one of the following: {}.\n\
         Respond with the category name only.",
        CATEGORIES.join(", ")
    )
}

/// System prompt for EXTRACT.
pub fn extraction_system_prompt() -> String {
    "Extract intent and key named entities (e.g., names, dates, times) from the following email. \
     Return a valid JSON object with 'intent' and 'entities'.\n\n\
     Respond with ONLY a JSON object:\n\
     {\"intent\": \"...\", \"entities\": {\"name\": \"value\"}}"
        .to_string()
}

/// System prompt for REPLY, carrying the earlier stages' results as context.
pub fn reply_system_prompt(category: &str, intent: &str, entities: &Entities) -> String {
    let entities_json =
        serde_json::to_string(entities).unwrap_or_else(|_| "{}".to_string());
    format!(
        "You are a helpful assistant replying to a {category} email with the intent of {intent}. \
         Use this context: {entities_json}"
    )
}
