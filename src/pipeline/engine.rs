//! Reply pipeline — CLASSIFY → EXTRACT → REPLY.
//!
//! Each stage makes exactly one model call through `call_with_retry` and
//! substitutes a fixed fallback when the call or its output is unusable,
//! so `run` always returns a fully populated state.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::error::StageError;
use crate::llm::{ChatMessage, CompletionRequest, FinishReason, LlmProvider, call_with_retry};

use super::prompts;
use super::state::{
    Entities, Extraction, PipelineState, Stage,
    stage::{Classified, Extracted, Replied, Started},
};

/// Category used when classification fails.
pub const FALLBACK_CATEGORY: &str = "other";

/// Intent used when extraction fails.
pub const FALLBACK_INTENT: &str = "unknown";

/// Reply used when generation fails.
pub fn fallback_reply(category: &str) -> String {
    format!(
        "I apologize, but I'm unable to generate a proper reply at the moment. \
         Please contact support for assistance with your {category} inquiry."
    )
}

/// The three-stage reply pipeline. Single-use per `run` call, no shared
/// mutable state between runs.
pub struct ReplyPipeline {
    llm: Arc<dyn LlmProvider>,
    config: PipelineConfig,
}

impl ReplyPipeline {
    pub fn new(llm: Arc<dyn LlmProvider>, config: PipelineConfig) -> Self {
        Self { llm, config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run all stages over one email body.
    pub async fn run(&self, email_body: &str) -> PipelineState<Replied> {
        info!(
            model = self.llm.model_name(),
            body_len = email_body.len(),
            "Starting reply pipeline"
        );

        let state = PipelineState::new(email_body);
        let state = self.classify(state).await;
        let state = self.extract(state).await;
        let state = self.reply(state).await;

        info!(
            category = state.category().unwrap_or_default(),
            intent = state.intent().unwrap_or_default(),
            "Reply pipeline complete"
        );
        state
    }

    async fn classify(&self, state: PipelineState<Started>) -> PipelineState<Classified> {
        let request = self.request(
            prompts::classification_system_prompt(),
            state.email_body(),
        );

        let category = match self.complete(Stage::Classify, request).await {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, fallback = FALLBACK_CATEGORY, "Classification failed, using fallback");
                FALLBACK_CATEGORY.to_string()
            }
        };

        debug!(category = %category, "Classified email");
        state.classified(category)
    }

    async fn extract(&self, state: PipelineState<Classified>) -> PipelineState<Extracted> {
        let request = self.request(prompts::extraction_system_prompt(), state.email_body());

        let extraction = match self.complete(Stage::Extract, request).await.and_then(|raw| {
            parse_extraction(&raw).map_err(|reason| {
                debug!(raw_response = %raw, "Unparseable extraction output");
                StageError::Malformed {
                    stage: Stage::Extract,
                    reason,
                }
            })
        }) {
            Ok(extraction) => extraction,
            Err(e) => {
                warn!(error = %e, fallback = FALLBACK_INTENT, "Extraction failed, using fallback");
                Extraction {
                    intent: FALLBACK_INTENT.to_string(),
                    entities: Entities::new(),
                }
            }
        };

        debug!(
            intent = %extraction.intent,
            entity_count = extraction.entities.len(),
            "Extracted intent and entities"
        );
        state.extracted(extraction)
    }

    async fn reply(&self, state: PipelineState<Extracted>) -> PipelineState<Replied> {
        let category = state.category().unwrap_or(FALLBACK_CATEGORY).to_string();
        let intent = state.intent().unwrap_or(FALLBACK_INTENT);
        let empty = Entities::new();
        let entities = state.entities().unwrap_or(&empty);

        let request = self.request(
            prompts::reply_system_prompt(&category, intent, entities),
            state.email_body(),
        );

        let reply = match self.complete(Stage::Reply, request).await {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, category = %category, "Reply generation failed, using apology");
                fallback_reply(&category)
            }
        };

        debug!(reply_len = reply.len(), "Generated reply");
        state.replied(reply)
    }

    fn request(&self, system_prompt: String, email_body: &str) -> CompletionRequest {
        CompletionRequest::new(vec![
            ChatMessage::system(system_prompt),
            ChatMessage::user(email_body),
        ])
        .with_temperature(self.config.temperature)
        .with_max_tokens(self.config.max_tokens)
    }

    /// One retried model call; returns the trimmed, non-empty completion.
    async fn complete(
        &self,
        stage: Stage,
        request: CompletionRequest,
    ) -> Result<String, StageError> {
        let label = stage.to_string();
        let response = call_with_retry(&self.config.retry, &label, || {
            self.llm.complete(request.clone())
        })
        .await
        .map_err(|source| StageError::Call { stage, source })?;

        debug!(
            stage = %stage,
            input_tokens = response.input_tokens,
            output_tokens = response.output_tokens,
            "Model call complete"
        );
        if response.finish_reason == FinishReason::Length {
            warn!(stage = %stage, max_tokens = self.config.max_tokens, "Output hit the token limit");
        }

        let text = response.content.trim();
        if text.is_empty() {
            return Err(StageError::EmptyOutput { stage });
        }
        Ok(text.to_string())
    }
}

/// Decode EXTRACT output into an `Extraction`.
///
/// The first JSON object in the text is used, so code fences and prose on
/// either side are ignored. Missing or null keys take their fallback values;
/// keys of the wrong type make the whole output malformed.
pub fn parse_extraction(raw: &str) -> Result<Extraction, String> {
    let mut object =
        first_json_object(raw).ok_or_else(|| "no JSON object in extraction output".to_string())?;

    let intent = match object.remove("intent") {
        None | Some(Value::Null) => FALLBACK_INTENT.to_string(),
        Some(Value::String(s)) if s.trim().is_empty() => FALLBACK_INTENT.to_string(),
        Some(Value::String(s)) => s.trim().to_string(),
        Some(other) => return Err(format!("'intent' is not a string: {other}")),
    };

    let entities = match object.remove("entities") {
        None | Some(Value::Null) => Entities::new(),
        Some(Value::Object(map)) => map,
        Some(other) => return Err(format!("'entities' is not an object: {other}")),
    };

    Ok(Extraction { intent, entities })
}

/// Decode the first complete JSON object found in `text`.
///
/// Each `{` is tried as a starting point; the stream deserializer stops at
/// the end of the object, so whatever follows it is never parsed.
fn first_json_object(text: &str) -> Option<Map<String, Value>> {
    text.match_indices('{').find_map(|(start, _)| {
        let mut values = serde_json::Deserializer::from_str(&text[start..]).into_iter::<Value>();
        match values.next() {
            Some(Ok(Value::Object(object))) => Some(object),
            _ => None,
        }
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::error::LlmError;
    use crate::llm::{CompletionResponse, FinishReason, RetryPolicy, Role};

    fn fast_config() -> PipelineConfig {
        PipelineConfig {
            temperature: 0.3,
            max_tokens: 256,
            retry: RetryPolicy {
                max_retries: 3,
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(2),
                backoff_factor: 2.0,
                jitter: false,
            },
        }
    }

    /// Identify which stage a request belongs to from its system prompt.
    fn stage_of(request: &CompletionRequest) -> Stage {
        let system = request.system_prompt().unwrap_or_default();
        if system.starts_with("Classify") {
            Stage::Classify
        } else if system.starts_with("Extract") {
            Stage::Extract
        } else {
            Stage::Reply
        }
    }

    fn ok_response(content: &str) -> CompletionResponse {
        CompletionResponse {
            content: content.to_string(),
            input_tokens: 10,
            output_tokens: 5,
            finish_reason: FinishReason::Stop,
        }
    }

    /// Mock LLM with a scripted answer per stage; `None` means the call fails.
    struct ScriptedLlm {
        answers: HashMap<Stage, Option<String>>,
        calls: Mutex<Vec<(Stage, CompletionRequest)>>,
    }

    impl ScriptedLlm {
        fn new(answers: &[(Stage, Option<&str>)]) -> Self {
            Self {
                answers: answers
                    .iter()
                    .map(|(s, a)| (*s, a.map(str::to_string)))
                    .collect(),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls_for(&self, stage: Stage) -> usize {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|(s, _)| *s == stage)
                .count()
        }

        fn last_request(&self, stage: Stage) -> Option<CompletionRequest> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .rev()
                .find(|(s, _)| *s == stage)
                .map(|(_, r)| r.clone())
        }
    }

    #[async_trait::async_trait]
    impl LlmProvider for ScriptedLlm {
        fn model_name(&self) -> &str {
            "mock-scripted"
        }

        async fn complete(
            &self,
            request: CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            let stage = stage_of(&request);
            self.calls.lock().unwrap().push((stage, request));
            match self.answers.get(&stage).cloned().flatten() {
                Some(answer) => Ok(ok_response(&answer)),
                None => Err(LlmError::RequestFailed {
                    provider: "mock".into(),
                    reason: "scripted failure".into(),
                }),
            }
        }
    }

    /// Mock LLM that fails the first `failures` calls, then echoes `answer`.
    struct FlakyLlm {
        failures: u32,
        calls: AtomicU32,
        answer: String,
    }

    #[async_trait::async_trait]
    impl LlmProvider for FlakyLlm {
        fn model_name(&self) -> &str {
            "mock-flaky"
        }

        async fn complete(
            &self,
            _request: CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err(LlmError::Timeout {
                    provider: "mock".into(),
                    reason: "slow".into(),
                })
            } else {
                Ok(ok_response(&self.answer))
            }
        }
    }

    fn pipeline(llm: Arc<ScriptedLlm>) -> ReplyPipeline {
        ReplyPipeline::new(llm, fast_config())
    }

    // ── End-to-end behaviour ────────────────────────────────────────

    #[tokio::test]
    async fn meeting_scenario_populates_all_fields() {
        let llm = Arc::new(ScriptedLlm::new(&[
            (Stage::Classify, Some("schedule")),
            (
                Stage::Extract,
                Some(r#"{"intent":"schedule_meeting","entities":{"day":"Tuesday"}}"#),
            ),
            (Stage::Reply, Some("Sure, Tuesday works.")),
        ]));

        let output = pipeline(llm.clone())
            .run("Can we meet Tuesday?")
            .await
            .into_output();

        assert_eq!(output.category, "schedule");
        assert_eq!(output.intent, "schedule_meeting");
        assert_eq!(Value::Object(output.entities), json!({"day": "Tuesday"}));
        assert_eq!(output.reply, "Sure, Tuesday works.");
        assert_eq!(output.email_body, "Can we meet Tuesday?");
    }

    #[tokio::test]
    async fn total_outage_uses_every_fallback() {
        let llm = Arc::new(ScriptedLlm::new(&[]));
        let output = pipeline(llm.clone()).run("Hello?").await.into_output();

        assert_eq!(output.category, "other");
        assert_eq!(output.intent, "unknown");
        assert!(output.entities.is_empty());
        assert_eq!(output.reply, fallback_reply("other"));
        assert!(output.reply.contains("other"));

        // 3 stages × (max_retries + 1) attempts
        assert_eq!(llm.calls_for(Stage::Classify), 4);
        assert_eq!(llm.calls_for(Stage::Extract), 4);
        assert_eq!(llm.calls_for(Stage::Reply), 4);
    }

    #[tokio::test]
    async fn distinct_stage_values_all_survive() {
        let llm = Arc::new(ScriptedLlm::new(&[
            (Stage::Classify, Some("billing")),
            (Stage::Extract, Some(r#"{"intent":"refund","entities":{"amount":42}}"#)),
            (Stage::Reply, Some("Refund issued.")),
        ]));

        let state = pipeline(llm).run("Please refund me").await;
        assert_eq!(state.category(), Some("billing"));
        assert_eq!(state.intent(), Some("refund"));
        assert_eq!(state.entities().unwrap()["amount"], 42);
        assert_eq!(state.reply(), Some("Refund issued."));
    }

    #[tokio::test]
    async fn reply_fallback_keeps_real_category() {
        let llm = Arc::new(ScriptedLlm::new(&[
            (Stage::Classify, Some("support")),
            (Stage::Extract, Some(r#"{"intent":"reset_password","entities":{}}"#)),
            (Stage::Reply, None),
        ]));

        let output = pipeline(llm).run("I can't log in").await.into_output();
        assert_eq!(output.category, "support");
        assert_eq!(output.intent, "reset_password");
        assert_eq!(output.reply, fallback_reply("support"));
    }

    // ── Stage details ───────────────────────────────────────────────

    #[tokio::test]
    async fn classification_output_is_trimmed() {
        let llm = Arc::new(ScriptedLlm::new(&[
            (Stage::Classify, Some("  feedback \n")),
            (Stage::Extract, Some(r#"{"intent":"praise","entities":{}}"#)),
            (Stage::Reply, Some("  Thanks!  ")),
        ]));

        let output = pipeline(llm).run("Great product").await.into_output();
        assert_eq!(output.category, "feedback");
        assert_eq!(output.reply, "Thanks!");
    }

    #[tokio::test]
    async fn blank_classification_falls_back() {
        let llm = Arc::new(ScriptedLlm::new(&[
            (Stage::Classify, Some("   ")),
            (Stage::Extract, Some(r#"{"intent":"x","entities":{}}"#)),
            (Stage::Reply, Some("ok")),
        ]));

        let output = pipeline(llm).run("body").await.into_output();
        assert_eq!(output.category, FALLBACK_CATEGORY);
    }

    #[tokio::test]
    async fn malformed_extraction_falls_back_without_retry() {
        let llm = Arc::new(ScriptedLlm::new(&[
            (Stage::Classify, Some("schedule")),
            (Stage::Extract, Some("intent: meeting, entities: none")),
            (Stage::Reply, Some("Sure.")),
        ]));

        let output = pipeline(llm.clone()).run("Meet?").await.into_output();
        assert_eq!(output.category, "schedule");
        assert_eq!(output.intent, FALLBACK_INTENT);
        assert!(output.entities.is_empty());
        assert_eq!(output.reply, "Sure.");
        assert_eq!(llm.calls_for(Stage::Extract), 1);
    }

    #[tokio::test]
    async fn reply_prompt_receives_earlier_results() {
        let llm = Arc::new(ScriptedLlm::new(&[
            (Stage::Classify, Some("schedule")),
            (
                Stage::Extract,
                Some(r#"{"intent":"schedule_meeting","entities":{"day":"Tuesday"}}"#),
            ),
            (Stage::Reply, Some("Sure.")),
        ]));

        pipeline(llm.clone()).run("Can we meet Tuesday?").await;

        let request = llm.last_request(Stage::Reply).unwrap();
        let system = request.system_prompt().unwrap();
        assert!(system.contains("schedule email"));
        assert!(system.contains("schedule_meeting"));
        assert!(system.contains("Tuesday"));

        let user = request
            .messages
            .iter()
            .find(|m| m.role == Role::User)
            .unwrap();
        assert_eq!(user.content, "Can we meet Tuesday?");
    }

    #[tokio::test]
    async fn requests_carry_configured_temperature() {
        let llm = Arc::new(ScriptedLlm::new(&[(Stage::Classify, Some("other"))]));
        let config = PipelineConfig {
            temperature: 0.9,
            max_tokens: 64,
            ..fast_config()
        };
        ReplyPipeline::new(llm.clone(), config).run("x").await;

        let request = llm.last_request(Stage::Classify).unwrap();
        assert_eq!(request.temperature, Some(0.9));
        assert_eq!(request.max_tokens, Some(64));
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let llm = Arc::new(FlakyLlm {
            failures: 2,
            calls: AtomicU32::new(0),
            answer: "support".into(),
        });
        let pipeline = ReplyPipeline::new(llm.clone(), fast_config());

        let output = pipeline.run("help").await.into_output();
        // First stage needed 3 attempts, the other two succeed immediately.
        assert_eq!(llm.calls.load(Ordering::SeqCst), 5);
        assert_eq!(output.category, "support");
        // "support" is not valid extraction JSON.
        assert_eq!(output.intent, FALLBACK_INTENT);
        assert_eq!(output.reply, "support");
    }

    // ── Extraction parsing ──────────────────────────────────────────

    #[test]
    fn parse_extraction_plain_object() {
        let extraction =
            parse_extraction(r#"{"intent": "ask_price", "entities": {"product": "Pro plan"}}"#)
                .unwrap();
        assert_eq!(extraction.intent, "ask_price");
        assert_eq!(extraction.entities["product"], "Pro plan");
    }

    #[test]
    fn parse_extraction_nested_entities() {
        let extraction = parse_extraction(
            r#"{"intent": "book", "entities": {"people": ["Ann", "Bo"], "when": {"day": "Mon"}}}"#,
        )
        .unwrap();
        assert_eq!(extraction.entities["people"][1], "Bo");
        assert_eq!(extraction.entities["when"]["day"], "Mon");
    }

    #[test]
    fn parse_extraction_markdown_wrapped() {
        let raw = "Here you go:\n```json\n{\"intent\": \"cancel\", \"entities\": {}}\n```";
        assert_eq!(parse_extraction(raw).unwrap().intent, "cancel");
    }

    #[test]
    fn parse_extraction_surrounding_text() {
        let raw = "Result: {\"intent\": \"complain\", \"entities\": {\"order\": \"123\"}} done.";
        let extraction = parse_extraction(raw).unwrap();
        assert_eq!(extraction.intent, "complain");
        assert_eq!(extraction.entities["order"], "123");
    }

    #[test]
    fn parse_extraction_missing_keys_default() {
        let extraction = parse_extraction("{}").unwrap();
        assert_eq!(extraction.intent, FALLBACK_INTENT);
        assert!(extraction.entities.is_empty());

        let extraction = parse_extraction(r#"{"intent": null, "entities": null}"#).unwrap();
        assert_eq!(extraction.intent, FALLBACK_INTENT);
        assert!(extraction.entities.is_empty());
    }

    #[test]
    fn parse_extraction_wrong_types_fail() {
        assert!(parse_extraction(r#"{"intent": 5, "entities": {}}"#).is_err());
        assert!(parse_extraction(r#"{"intent": "x", "entities": ["a"]}"#).is_err());
        assert!(parse_extraction(r#"["intent", "entities"]"#).is_err());
    }

    #[test]
    fn parse_extraction_garbage_fails() {
        assert!(parse_extraction("no json here").is_err());
        assert!(parse_extraction("").is_err());
    }

    #[test]
    fn parse_extraction_trailing_prose() {
        let raw = "{\"intent\": \"schedule_meeting\", \"entities\": {\"day\": \"Tuesday\"}}\n\
                   Let me know if you need anything else.";
        let extraction = parse_extraction(raw).unwrap();
        assert_eq!(extraction.intent, "schedule_meeting");
        assert_eq!(extraction.entities["day"], "Tuesday");
    }

    #[test]
    fn parse_extraction_skips_stray_braces_in_prose() {
        let raw = "Use {curly} braces? Sure: {\"intent\": \"ask\", \"entities\": {}} ok";
        assert_eq!(parse_extraction(raw).unwrap().intent, "ask");
    }

    #[test]
    fn first_json_object_from_bare_fence() {
        let object = first_json_object("```\n{\"intent\": \"x\"}\n```").unwrap();
        assert_eq!(object["intent"], "x");
    }

    #[test]
    fn first_json_object_none_without_object() {
        assert!(first_json_object("[1, 2, 3]").is_none());
        assert!(first_json_object("{ unterminated").is_none());
    }

    #[test]
    fn fallback_reply_mentions_category() {
        let reply = fallback_reply("billing");
        assert!(reply.starts_with("I apologize"));
        assert!(reply.contains("your billing inquiry"));
    }
}
