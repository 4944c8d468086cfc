//! # Test Generation
//!
//! Turns a free-text description into a validated [`TestCaseCreate`] using a
//! language model.
//!
//! ```text
//! GenerationRequest
//!      │ description >= 10 chars?
//!      ▼
//!  pick model (complexity) ──► cache hit? ──► cached response
//!      │
//!      ▼
//!  ModelBackend::complete (retried with backoff)
//!      │
//!      ▼
//!  lenient JSON ──► TestCaseCreate ──► normalize + validate ──► response
//! ```
//!
//! A response with `success = false` never carries a test case, and a
//! successful one always passes assembly validation.

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{error, info};

use crate::config::GenerationSettings;
use crate::limits::ExecutionLimits;
use crate::protocol::{ActionKind, ElementLocator, GenerationRequest, GenerationResponse, TestCaseCreate, TestStep};
use crate::retry::{RetryExecutor, RetryPolicy};
use crate::validation::{normalize, validate_test_case};

/// Shortest accepted description, in characters after trimming.
pub const MIN_DESCRIPTION_CHARS: usize = 10;

pub const DEFAULT_TEST_NAME: &str = "Generated Test";
pub const DEFAULT_TAG: &str = "generated";

const SYSTEM_PROMPT: &str = "You are a senior QA automation engineer. \
Convert the user's test description into a JSON object with the fields \
name, description, tags, setup_steps, steps and teardown_steps. \
Each step has step_number, action, description and optionally element, value, timeout and metadata. \
Valid actions: navigate, click, fill, type, select, check, uncheck, hover, wait, \
assert_text, assert_visible, assert_hidden, assert_value, press_key, screenshot. \
Keep steps atomic, give elements descriptive snake_case names, end with assertions \
on the expected outcome, and offer several locator hints per element \
(data_testid, id, aria_label, role, css, text, xpath, placeholder).";

// ============================================================================
// MODEL ROUTING
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskComplexity {
    /// Element identification, single actions.
    Simple,
    /// Test case generation.
    #[default]
    Medium,
    /// Long multi-step flows.
    Complex,
}

impl TaskComplexity {
    pub fn model(self, settings: &GenerationSettings) -> &str {
        match self {
            Self::Simple => &settings.simple_model,
            Self::Medium => &settings.model,
            Self::Complex => &settings.complex_model,
        }
    }
}

// ============================================================================
// BACKEND SEAM
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub system: String,
    pub user: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelCompletion {
    /// Raw model output, expected to be a JSON object.
    pub content: String,
    pub tokens_used: u64,
}

#[async_trait]
pub trait ModelBackend: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> anyhow::Result<ModelCompletion>;
}

/// OpenAI-compatible `chat/completions` backend.
pub struct HttpModelBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatUsage {
    total_tokens: u64,
}

impl HttpModelBackend {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        }
    }

    /// `OPENAI_BASE_URL` (default `https://api.openai.com/v1`) and
    /// `OPENAI_API_KEY`.
    pub fn from_env() -> Self {
        let base_url = std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".to_string());
        Self::new(base_url, std::env::var("OPENAI_API_KEY").ok())
    }
}

#[async_trait]
impl ModelBackend for HttpModelBackend {
    async fn complete(&self, request: &CompletionRequest) -> anyhow::Result<ModelCompletion> {
        let body = json!({
            "model": request.model,
            "messages": [
                { "role": "system", "content": request.system },
                { "role": "user", "content": request.user },
            ],
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
            "response_format": { "type": "json_object" },
        });

        let mut call = self.client.post(format!("{}/chat/completions", self.base_url)).json(&body);
        if let Some(key) = &self.api_key {
            call = call.bearer_auth(key);
        }

        let response = call
            .send()
            .await
            .with_context(|| format!("Model request to {} failed", self.base_url))?
            .error_for_status()
            .context("Model backend returned an error status")?;

        let parsed: ChatResponse = response.json().await.context("Malformed model response")?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .context("Model response has no content")?;

        Ok(ModelCompletion {
            content,
            tokens_used: parsed.usage.map_or(0, |u| u.total_tokens),
        })
    }
}

// ============================================================================
// GENERATOR
// ============================================================================

struct CacheEntry {
    test_case: TestCaseCreate,
    stored_at: Instant,
}

pub struct TestGenerator<B: ModelBackend + ?Sized> {
    backend: Arc<B>,
    settings: GenerationSettings,
    limits: ExecutionLimits,
    retry: RetryExecutor,
    cache: Mutex<HashMap<String, CacheEntry>>,
}

/// SHA-256 over model, description and context, as lowercase hex.
pub fn cache_key(model: &str, description: &str, context: Option<&Map<String, Value>>) -> String {
    let context = context.map(|c| Value::Object(c.clone()).to_string()).unwrap_or_default();
    let digest = Sha256::digest(format!("{}:{}{}", model, description, context).as_bytes());
    format!("{:x}", digest)
}

impl<B: ModelBackend + ?Sized> TestGenerator<B> {
    pub fn new(backend: Arc<B>, settings: GenerationSettings) -> Self {
        Self {
            backend,
            settings,
            limits: ExecutionLimits::default(),
            retry: RetryExecutor::default(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = RetryExecutor::new(policy);
        self
    }

    pub fn with_limits(mut self, limits: ExecutionLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Generates a test case. Failures are reported in the response, never
    /// as an `Err`.
    pub async fn generate(&self, request: &GenerationRequest, complexity: TaskComplexity) -> GenerationResponse {
        let model = complexity.model(&self.settings).to_string();

        let description = request.description.trim();
        if description.chars().count() < MIN_DESCRIPTION_CHARS {
            return GenerationResponse::failure(
                format!("Description must be at least {} characters", MIN_DESCRIPTION_CHARS),
                0,
                model,
            );
        }

        let key = cache_key(&model, description, request.context.as_ref());
        if let Some(test_case) = self.cached(&key).await {
            info!(model = %model, "💾 Generation cache hit");
            return GenerationResponse {
                cached: true,
                ..GenerationResponse::generated(test_case, 0, model)
            };
        }

        let completion_request = CompletionRequest {
            model: model.clone(),
            system: SYSTEM_PROMPT.to_string(),
            user: user_prompt(description, request.context.as_ref()),
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
        };

        let completion = match self
            .retry
            .execute("model completion", || self.backend.complete(&completion_request))
            .await
        {
            Ok(completion) => completion,
            Err(e) => {
                error!(model = %model, error = %e, "Model call failed");
                return GenerationResponse::failure(format!("{:#}", e), 0, model);
            }
        };
        let tokens = completion.tokens_used;

        let raw: Value = match serde_json::from_str(&completion.content) {
            Ok(value) => value,
            Err(e) => {
                error!(model = %model, error = %e, "Model output is not JSON");
                return GenerationResponse::failure(format!("Failed to parse LLM response: {}", e), tokens, model);
            }
        };

        let test_case = match convert(&raw, description) {
            Ok(test_case) => normalize(test_case),
            Err(reason) => {
                return GenerationResponse::failure(format!("Failed to parse generated test: {}", reason), tokens, model)
            }
        };

        if let Err(errors) = validate_test_case(&test_case.name, &test_case, &self.limits) {
            let reasons: Vec<String> = errors.iter().map(ToString::to_string).collect();
            return GenerationResponse::failure(
                format!("Generated test case is invalid: {}", reasons.join("; ")),
                tokens,
                model,
            );
        }

        self.cache.lock().await.insert(
            key,
            CacheEntry {
                test_case: test_case.clone(),
                stored_at: Instant::now(),
            },
        );
        info!(
            model = %model,
            tokens,
            steps = test_case.steps.len(),
            "🤖 Test case generated"
        );

        GenerationResponse::generated(test_case, tokens, model)
    }

    async fn cached(&self, key: &str) -> Option<TestCaseCreate> {
        let mut cache = self.cache.lock().await;
        let fresh = cache.get(key).map(|e| e.stored_at.elapsed() < self.settings.cache_ttl)?;
        if fresh {
            cache.get(key).map(|e| e.test_case.clone())
        } else {
            cache.remove(key);
            None
        }
    }

    /// Drops expired entries; returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let ttl: Duration = self.settings.cache_ttl;
        let mut cache = self.cache.lock().await;
        let before = cache.len();
        cache.retain(|_, e| e.stored_at.elapsed() < ttl);
        before - cache.len()
    }
}

fn user_prompt(description: &str, context: Option<&Map<String, Value>>) -> String {
    let mut prompt = format!("Convert this test description into a structured test case:\n\n---\n{}\n---\n", description);
    if let Some(context) = context {
        let pretty = serde_json::to_string_pretty(context).unwrap_or_default();
        prompt.push_str(&format!("\nAdditional context:\n{}", pretty));
    }
    prompt
}

// ============================================================================
// LENIENT CONVERSION
// ============================================================================

fn text(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key).and_then(Value::as_str).map(str::to_string)
}

fn convert_element(value: &Value) -> Option<ElementLocator> {
    let obj = value.as_object()?;
    Some(ElementLocator {
        name: text(obj, "name").unwrap_or_else(|| "unnamed".to_string()),
        description: text(obj, "description"),
        data_testid: text(obj, "data_testid"),
        id: text(obj, "id"),
        aria_label: text(obj, "aria_label"),
        role: text(obj, "role"),
        css: text(obj, "css"),
        text: text(obj, "text"),
        xpath: text(obj, "xpath"),
        placeholder: text(obj, "placeholder"),
    })
}

fn convert_steps(raw: Option<&Value>, phase: &str) -> Result<Vec<TestStep>, String> {
    let Some(items) = raw.and_then(Value::as_array) else {
        return Ok(Vec::new());
    };

    let mut steps = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let obj = item
            .as_object()
            .ok_or_else(|| format!("{} step {} is not an object", phase, i + 1))?;
        let action_raw = obj
            .get("action")
            .ok_or_else(|| format!("{} step {} has no action", phase, i + 1))?;
        let action: ActionKind = serde_json::from_value(action_raw.clone())
            .map_err(|_| format!("{} step {} has unknown action {}", phase, i + 1, action_raw))?;

        steps.push(TestStep {
            step_number: obj
                .get("step_number")
                .and_then(Value::as_u64)
                .map_or(steps.len() as u32 + 1, |n| u32::try_from(n).unwrap_or(u32::MAX)),
            action,
            description: text(obj, "description").unwrap_or_default(),
            element: obj.get("element").and_then(convert_element),
            value: obj.get("value").and_then(|v| match v {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                Value::Bool(b) => Some(b.to_string()),
                _ => None,
            }),
            timeout: obj.get("timeout").and_then(Value::as_u64),
            metadata: obj.get("metadata").and_then(Value::as_object).cloned().unwrap_or_default(),
        });
    }
    Ok(steps)
}

/// Builds a test case from model output, filling in what the model left out.
pub fn convert(raw: &Value, description: &str) -> Result<TestCaseCreate, String> {
    let obj = raw.as_object().ok_or("model output is not a JSON object")?;

    Ok(TestCaseCreate {
        name: text(obj, "name").unwrap_or_else(|| DEFAULT_TEST_NAME.to_string()),
        description: text(obj, "description").unwrap_or_else(|| description.to_string()),
        tags: match obj.get("tags").and_then(Value::as_array) {
            Some(tags) => tags.iter().filter_map(Value::as_str).map(str::to_string).collect(),
            None => vec![DEFAULT_TAG.to_string()],
        },
        steps: convert_steps(obj.get("steps"), "body")?,
        setup_steps: convert_steps(obj.get("setup_steps"), "setup")?,
        teardown_steps: convert_steps(obj.get("teardown_steps"), "teardown")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Replies from a script; repeats the last reply when it runs out.
    struct ScriptedBackend {
        replies: std::sync::Mutex<VecDeque<Result<ModelCompletion, String>>>,
        calls: AtomicU32,
        last_model: std::sync::Mutex<Option<String>>,
    }

    impl ScriptedBackend {
        fn new(replies: Vec<Result<&str, &str>>) -> Arc<Self> {
            Arc::new(Self {
                replies: std::sync::Mutex::new(
                    replies
                        .into_iter()
                        .map(|r| {
                            r.map(|c| ModelCompletion {
                                content: c.to_string(),
                                tokens_used: 120,
                            })
                            .map_err(str::to_string)
                        })
                        .collect(),
                ),
                calls: AtomicU32::new(0),
                last_model: std::sync::Mutex::new(None),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ModelBackend for ScriptedBackend {
        async fn complete(&self, request: &CompletionRequest) -> anyhow::Result<ModelCompletion> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_model.lock().unwrap() = Some(request.model.clone());
            let mut replies = self.replies.lock().unwrap();
            let reply = if replies.len() > 1 {
                replies.pop_front().unwrap()
            } else {
                replies.front().cloned().unwrap()
            };
            reply.map_err(|e| anyhow::anyhow!(e))
        }
    }

    const LOGIN_JSON: &str = r#"{
        "name": "Login flow",
        "tags": ["auth"],
        "steps": [
            { "step_number": 1, "action": "navigate", "description": "Open", "value": "https://example.com/login" },
            { "step_number": 2, "action": "fill", "description": "Username",
              "element": { "name": "username_field", "id": "username" }, "value": "testuser" },
            { "step_number": 3, "action": "click", "description": "Submit",
              "element": { "data_testid": "login-submit" } },
            { "action": "assert_text", "description": "Welcome", "value": "Welcome" }
        ]
    }"#;

    fn quick_retry() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
            backoff_factor: 2.0,
            jitter: false,
        }
    }

    fn generator(backend: Arc<ScriptedBackend>) -> TestGenerator<ScriptedBackend> {
        TestGenerator::new(backend, GenerationSettings::default()).with_retry(quick_retry())
    }

    fn request() -> GenerationRequest {
        GenerationRequest::new("Log in as testuser and check the welcome banner")
    }

    #[tokio::test]
    async fn test_generates_valid_test_case() {
        let backend = ScriptedBackend::new(vec![Ok(LOGIN_JSON)]);
        let response = generator(backend.clone()).generate(&request(), TaskComplexity::Medium).await;

        assert!(response.success, "{:?}", response.error);
        assert_eq!(response.tokens_used, 120);
        assert_eq!(response.model_used, "gpt-4o-mini");
        assert!(!response.cached);

        let test_case = response.test_case.unwrap();
        assert_eq!(test_case.name, "Login flow");
        assert_eq!(test_case.tags, vec!["auth".to_string()]);
        assert_eq!(test_case.description, request().description);
        let numbers: Vec<u32> = test_case.steps.iter().map(|s| s.step_number).collect();
        assert_eq!(numbers, vec![1, 2, 3, 4]);
        assert_eq!(test_case.steps[2].element.as_ref().unwrap().name, "unnamed");
    }

    #[tokio::test]
    async fn test_short_description_rejected_without_calling_model() {
        let backend = ScriptedBackend::new(vec![Ok(LOGIN_JSON)]);
        let generator = generator(backend.clone());

        for description in ["", "   login   "] {
            let response = generator
                .generate(&GenerationRequest::new(description), TaskComplexity::Medium)
                .await;

            assert!(!response.success, "{:?} accepted", description);
            assert!(response.test_case.is_none());
            assert!(response
                .error
                .as_deref()
                .is_some_and(|e| e.contains("at least 10 characters")));
        }
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test]
    async fn test_second_identical_request_is_cached() {
        let backend = ScriptedBackend::new(vec![Ok(LOGIN_JSON)]);
        let generator = generator(backend.clone());

        let first = generator.generate(&request(), TaskComplexity::Medium).await;
        let second = generator.generate(&request(), TaskComplexity::Medium).await;

        assert!(first.success && second.success);
        assert!(second.cached);
        assert_eq!(second.tokens_used, 0);
        assert_eq!(first.test_case, second.test_case);
        assert_eq!(backend.calls(), 1);

        // A different model is a different cache entry.
        generator.generate(&request(), TaskComplexity::Complex).await;
        assert_eq!(backend.calls(), 2);
        assert_eq!(backend.last_model.lock().unwrap().as_deref(), Some("gpt-4o"));
    }

    #[tokio::test]
    async fn test_zero_ttl_disables_cache() {
        let backend = ScriptedBackend::new(vec![Ok(LOGIN_JSON)]);
        let settings = GenerationSettings {
            cache_ttl: Duration::ZERO,
            ..GenerationSettings::default()
        };
        let generator = TestGenerator::new(backend.clone(), settings).with_retry(quick_retry());

        generator.generate(&request(), TaskComplexity::Medium).await;
        let again = generator.generate(&request(), TaskComplexity::Medium).await;
        assert!(!again.cached);
        assert_eq!(backend.calls(), 2);
        assert_eq!(generator.purge_expired().await, 1);
    }

    #[tokio::test]
    async fn test_backend_retried_then_succeeds() {
        let backend = ScriptedBackend::new(vec![Err("rate limited"), Err("rate limited"), Ok(LOGIN_JSON)]);
        let response = generator(backend.clone()).generate(&request(), TaskComplexity::Medium).await;
        assert!(response.success);
        assert_eq!(backend.calls(), 3);
    }

    #[tokio::test]
    async fn test_backend_exhausted_is_failure() {
        let backend = ScriptedBackend::new(vec![Err("service unavailable")]);
        let response = generator(backend.clone()).generate(&request(), TaskComplexity::Medium).await;
        assert!(!response.success);
        assert_eq!(response.error.as_deref(), Some("service unavailable"));
        assert_eq!(backend.calls(), 3);
    }

    #[tokio::test]
    async fn test_non_json_output_is_failure() {
        let backend = ScriptedBackend::new(vec![Ok("Sure! Here is your test:")]);
        let response = generator(backend).generate(&request(), TaskComplexity::Medium).await;
        assert!(!response.success);
        assert!(response.test_case.is_none());
        assert!(response.error.unwrap().starts_with("Failed to parse LLM response:"));
        assert_eq!(response.tokens_used, 120);
    }

    #[tokio::test]
    async fn test_invalid_generated_case_is_never_returned() {
        let backend = ScriptedBackend::new(vec![Ok(r#"{ "steps": [ { "action": "click", "description": "?" } ] }"#)]);
        let response = generator(backend).generate(&request(), TaskComplexity::Medium).await;
        assert!(!response.success);
        assert!(response.test_case.is_none());
        assert!(response.error.unwrap().contains("Generated test case is invalid"));
    }

    #[test]
    fn test_convert_defaults() {
        let raw = json!({ "steps": [ { "action": "screenshot" } ] });
        let create = convert(&raw, "the request").unwrap();
        assert_eq!(create.name, DEFAULT_TEST_NAME);
        assert_eq!(create.description, "the request");
        assert_eq!(create.tags, vec![DEFAULT_TAG.to_string()]);
        assert_eq!(create.steps[0].step_number, 1);
    }

    #[test]
    fn test_convert_saturates_oversized_step_numbers() {
        let raw = json!({ "steps": [
            { "action": "screenshot", "description": "last", "step_number": 4_294_967_297u64 },
            { "action": "screenshot", "description": "first", "step_number": 2 },
        ] });
        let create = convert(&raw, "x").unwrap();
        assert_eq!(create.steps[0].step_number, u32::MAX);

        let test_case = crate::validation::assemble(create, chrono::Utc::now()).unwrap();
        let order: Vec<&str> = test_case.steps.iter().map(|s| s.description.as_str()).collect();
        assert_eq!(order, vec!["first", "last"]);
    }

    #[test]
    fn test_convert_rejects_unknown_action() {
        let raw = json!({ "steps": [ { "action": "teleport" } ] });
        assert!(convert(&raw, "x").unwrap_err().contains("unknown action"));
        assert!(convert(&json!([]), "x").is_err());
    }

    #[test]
    fn test_cache_key_depends_on_every_input() {
        let mut context = Map::new();
        context.insert("base_url".into(), json!("https://a.test"));
        let base = cache_key("m", "desc", None);
        assert_eq!(base.len(), 64);
        assert_eq!(base, cache_key("m", "desc", None));
        assert_ne!(base, cache_key("n", "desc", None));
        assert_ne!(base, cache_key("m", "desc2", None));
        assert_ne!(base, cache_key("m", "desc", Some(&context)));
    }

    #[test]
    fn test_model_routing() {
        let settings = GenerationSettings {
            model: "custom".into(),
            ..GenerationSettings::default()
        };
        assert_eq!(TaskComplexity::Simple.model(&settings), "gpt-4o-mini");
        assert_eq!(TaskComplexity::Medium.model(&settings), "custom");
        assert_eq!(TaskComplexity::Complex.model(&settings), "gpt-4o");
    }

    #[tokio::test]
    async fn test_http_backend_parses_chat_completion() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer sk-test")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"choices":[{"message":{"content":"{\"name\":\"x\"}"}}],"usage":{"total_tokens":42}}"#)
            .create_async()
            .await;

        let backend = HttpModelBackend::new(server.url(), Some("sk-test".into()));
        let completion = backend
            .complete(&CompletionRequest {
                model: "gpt-4o-mini".into(),
                system: "s".into(),
                user: "u".into(),
                temperature: 0.1,
                max_tokens: 100,
            })
            .await
            .unwrap();

        assert_eq!(completion.content, r#"{"name":"x"}"#);
        assert_eq!(completion.tokens_used, 42);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_http_backend_error_status() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(429)
            .create_async()
            .await;

        let backend = HttpModelBackend::new(server.url(), None);
        let err = backend
            .complete(&CompletionRequest {
                model: "m".into(),
                system: "s".into(),
                user: "u".into(),
                temperature: 0.1,
                max_tokens: 1,
            })
            .await
            .unwrap_err();
        assert!(format!("{:#}", err).contains("error status"));
    }
}
