//! Generation Provider Abstraction
//!
//! Chat-completion clients for the supported LLM backends (OpenAI, Anthropic,
//! Ollama and custom OpenAI-compatible servers) and the [`GenerationProvider`]
//! seam the generation worker calls: rendered prompt and response schema in,
//! parsed JSON out.

use crate::error::ApiError;
use crate::prompt::RenderedPrompt;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub mod profile;

pub use profile::{ProviderConfig, ProviderType};

/// Resolved provider, ready to build a client from
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ModelProvider {
    OpenAI {
        model: String,
        api_key: String,
        base_url: Option<String>,
    },
    Anthropic {
        model: String,
        api_key: String,
        base_url: Option<String>,
    },
    Ollama {
        model: String,
        base_url: Option<String>, // Default: http://localhost:11434/v1
    },
    LocalCustom {
        model: String,
        endpoint: String, // OpenAI-compatible base, e.g. http://localhost:8080/v1
        api_key: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl MessageRole {
    fn as_str(self) -> &'static str {
        match self {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionOptions {
    #[serde(default)]
    pub temperature: Option<f32>, // 0.0-2.0
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub top_p: Option<f32>,
    #[serde(default)]
    pub stop: Option<Vec<String>>,
    /// Ask the backend for a JSON object reply where supported.
    #[serde(default)]
    pub json_mode: bool,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            temperature: Some(0.7),
            max_tokens: None,
            top_p: None,
            stop: None,
            json_mode: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub content: String,
    pub model: String,
    pub usage: TokenUsage,
    pub finish_reason: Option<String>,
}

/// Chat-completion client for one backend
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        options: CompletionOptions,
    ) -> Result<CompletionResponse, ApiError>;

    fn provider_name(&self) -> &str;

    fn model_name(&self) -> &str;
}

/// External content generator used by the generation worker.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Produce a JSON object for `prompt`. `schema` describes the expected shape;
    /// the caller still validates the result.
    async fn generate(&self, prompt: &RenderedPrompt, schema: &Value) -> Result<Value, ApiError>;

    /// The messages `generate` sends for `prompt` and `schema`. The worker
    /// stores this form as the job's source context and digest.
    fn prepare(&self, prompt: &RenderedPrompt, _schema: &Value) -> Result<RenderedPrompt, ApiError> {
        Ok(prompt.clone())
    }

    /// Short `provider/model` label for logs.
    fn describe(&self) -> String;
}

const PROVIDER_HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const PROVIDER_HTTP_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

fn build_provider_http_client(timeout: Option<Duration>) -> Result<Client, ApiError> {
    Client::builder()
        .no_proxy()
        .connect_timeout(PROVIDER_HTTP_CONNECT_TIMEOUT)
        .timeout(timeout.unwrap_or(PROVIDER_HTTP_REQUEST_TIMEOUT))
        .build()
        .map_err(|e| ApiError::ProviderError(format!("Failed to create HTTP client: {}", e)))
}

fn map_http_error(error: reqwest::Error) -> ApiError {
    if error.is_timeout() {
        ApiError::ProviderRequestFailed(format!("Request timeout: {}", error))
    } else if error.is_connect() {
        ApiError::ProviderRequestFailed(format!("Connection error: {}", error))
    } else {
        ApiError::ProviderError(format!("HTTP error: {}", error))
    }
}

fn map_status_error(status: StatusCode, body: String) -> ApiError {
    match status.as_u16() {
        401 | 403 => ApiError::ProviderAuthFailed(format!("Authentication failed: {}", body)),
        429 => ApiError::ProviderRateLimit(format!("Rate limit exceeded: {}", body)),
        404 => ApiError::ProviderModelNotFound(format!("Model not found: {}", body)),
        _ => ApiError::ProviderRequestFailed(format!(
            "Request failed with status {}: {}",
            status, body
        )),
    }
}

async fn error_body(response: reqwest::Response) -> String {
    response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string())
}

// OpenAI-compatible API request/response structures
#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<Value>,
    stream: bool,
}

#[derive(Serialize, Deserialize)]
struct OpenAIMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<Choice>,
    usage: Option<TokenUsage>,
}

#[derive(Deserialize)]
struct Choice {
    message: OpenAIMessage,
    finish_reason: Option<String>,
}

/// Client for any backend speaking the OpenAI chat-completions API
pub struct OpenAICompatibleClient {
    client: Client,
    provider_name: String,
    model: String,
    api_key: Option<String>,
    base_url: String,
}

impl OpenAICompatibleClient {
    pub fn new(
        provider_name: impl Into<String>,
        model: String,
        api_key: Option<String>,
        base_url: String,
        timeout: Option<Duration>,
    ) -> Result<Self, ApiError> {
        Ok(Self {
            client: build_provider_http_client(timeout)?,
            provider_name: provider_name.into(),
            model,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl CompletionClient for OpenAICompatibleClient {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        options: CompletionOptions,
    ) -> Result<CompletionResponse, ApiError> {
        let request = ChatCompletionRequest {
            model: &self.model,
            messages: messages
                .into_iter()
                .map(|msg| OpenAIMessage {
                    role: msg.role.as_str().to_string(),
                    content: Some(msg.content),
                })
                .collect(),
            temperature: options.temperature,
            max_tokens: options.max_tokens,
            top_p: options.top_p,
            stop: options.stop,
            response_format: options
                .json_mode
                .then(|| json!({"type": "json_object"})),
            stream: false,
        };

        let url = format!("{}/chat/completions", self.base_url);
        let mut builder = self.client.post(&url).json(&request);
        if let Some(api_key) = &self.api_key {
            builder = builder.bearer_auth(api_key);
        }
        let response = builder.send().await.map_err(map_http_error)?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(map_status_error(status, error_body(response).await));
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| ApiError::ProviderError(format!("Failed to parse response: {}", e)))?;

        let choice = completion
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ApiError::ProviderError("No choices in response".to_string()))?;

        Ok(CompletionResponse {
            content: choice.message.content.unwrap_or_default(),
            model: completion.model.unwrap_or_else(|| self.model.clone()),
            usage: completion.usage.unwrap_or_default(),
            finish_reason: choice.finish_reason,
        })
    }

    fn provider_name(&self) -> &str {
        &self.provider_name
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const ANTHROPIC_DEFAULT_MAX_TOKENS: u32 = 4096;

/// Anthropic messages API client
pub struct AnthropicClient {
    client: Client,
    model: String,
    api_key: String,
    base_url: String,
}

impl AnthropicClient {
    pub fn new(
        model: String,
        api_key: String,
        base_url: Option<String>,
        timeout: Option<Duration>,
    ) -> Result<Self, ApiError> {
        Ok(Self {
            client: build_provider_http_client(timeout)?,
            model,
            api_key,
            base_url: base_url
                .unwrap_or_else(|| ANTHROPIC_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
        })
    }
}

#[async_trait]
impl CompletionClient for AnthropicClient {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        options: CompletionOptions,
    ) -> Result<CompletionResponse, ApiError> {
        let system: Vec<String> = messages
            .iter()
            .filter(|m| m.role == MessageRole::System)
            .map(|m| m.content.clone())
            .collect();
        let turns: Vec<Value> = messages
            .into_iter()
            .filter(|m| m.role != MessageRole::System)
            .map(|m| json!({"role": m.role.as_str(), "content": m.content}))
            .collect();

        let mut request_body = json!({
            "model": self.model,
            "max_tokens": options.max_tokens.unwrap_or(ANTHROPIC_DEFAULT_MAX_TOKENS),
            "messages": turns,
        });
        if !system.is_empty() {
            request_body["system"] = json!(system.join("\n\n"));
        }
        if let Some(temp) = options.temperature {
            request_body["temperature"] = json!(temp.min(1.0));
        }
        if let Some(top_p) = options.top_p {
            request_body["top_p"] = json!(top_p);
        }
        if let Some(stop) = options.stop {
            request_body["stop_sequences"] = json!(stop);
        }

        let response = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request_body)
            .send()
            .await
            .map_err(map_http_error)?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(map_status_error(status, error_body(response).await));
        }

        #[derive(Deserialize)]
        struct AnthropicResponse {
            content: Vec<AnthropicContent>,
            model: String,
            stop_reason: Option<String>,
            usage: Option<AnthropicUsage>,
        }

        #[derive(Deserialize)]
        struct AnthropicContent {
            #[serde(default)]
            text: Option<String>,
        }

        #[derive(Deserialize)]
        struct AnthropicUsage {
            input_tokens: u32,
            output_tokens: u32,
        }

        let completion: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| ApiError::ProviderError(format!("Failed to parse response: {}", e)))?;

        let content: String = completion
            .content
            .into_iter()
            .filter_map(|c| c.text)
            .collect::<Vec<_>>()
            .join("");
        let usage = completion
            .usage
            .map(|u| TokenUsage {
                prompt_tokens: u.input_tokens,
                completion_tokens: u.output_tokens,
                total_tokens: u.input_tokens + u.output_tokens,
            })
            .unwrap_or_default();

        Ok(CompletionResponse {
            content,
            model: completion.model,
            usage,
            finish_reason: completion.stop_reason,
        })
    }

    fn provider_name(&self) -> &str {
        "anthropic"
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const OLLAMA_BASE_URL: &str = "http://localhost:11434/v1";

/// Provider factory for creating completion clients
pub struct ProviderFactory;

impl ProviderFactory {
    pub fn create_client(
        provider: &ModelProvider,
        timeout: Option<Duration>,
    ) -> Result<Box<dyn CompletionClient>, ApiError> {
        match provider {
            ModelProvider::OpenAI {
                model,
                api_key,
                base_url,
            } => Ok(Box::new(OpenAICompatibleClient::new(
                "openai",
                model.clone(),
                Some(api_key.clone()),
                base_url.clone().unwrap_or_else(|| OPENAI_BASE_URL.to_string()),
                timeout,
            )?)),
            ModelProvider::Anthropic {
                model,
                api_key,
                base_url,
            } => Ok(Box::new(AnthropicClient::new(
                model.clone(),
                api_key.clone(),
                base_url.clone(),
                timeout,
            )?)),
            ModelProvider::Ollama { model, base_url } => Ok(Box::new(OpenAICompatibleClient::new(
                "ollama",
                model.clone(),
                None,
                base_url.clone().unwrap_or_else(|| OLLAMA_BASE_URL.to_string()),
                timeout,
            )?)),
            ModelProvider::LocalCustom {
                model,
                endpoint,
                api_key,
            } => Ok(Box::new(OpenAICompatibleClient::new(
                "local",
                model.clone(),
                api_key.clone(),
                endpoint.clone(),
                timeout,
            )?)),
        }
    }
}

/// Named provider configurations loaded from [`crate::config::AppConfig`]
#[derive(Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, ProviderConfig>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load_from_config(&mut self, config: &crate::config::AppConfig) {
        for (name, provider_config) in &config.providers {
            let mut config_with_name = provider_config.clone();
            if config_with_name.provider_name.is_none() {
                config_with_name.provider_name = Some(name.clone());
            }
            self.providers.insert(name.clone(), config_with_name);
        }
    }

    pub fn insert(&mut self, name: impl Into<String>, config: ProviderConfig) {
        self.providers.insert(name.into(), config);
    }

    pub fn get(&self, provider_name: &str) -> Option<&ProviderConfig> {
        self.providers.get(provider_name)
    }

    pub fn get_or_error(&self, provider_name: &str) -> Result<&ProviderConfig, ApiError> {
        self.get(provider_name).ok_or_else(|| {
            ApiError::ProviderNotConfigured(format!("Provider not found: {}", provider_name))
        })
    }

    /// Registered providers sorted by name.
    pub fn list_all(&self) -> Vec<(&str, &ProviderConfig)> {
        let mut all: Vec<_> = self
            .providers
            .iter()
            .map(|(name, config)| (name.as_str(), config))
            .collect();
        all.sort_by(|a, b| a.0.cmp(b.0));
        all
    }

    pub fn create_client(&self, provider_name: &str) -> Result<Box<dyn CompletionClient>, ApiError> {
        let provider_config = self.get_or_error(provider_name)?;
        let model_provider = provider_config.to_model_provider()?;
        ProviderFactory::create_client(
            &model_provider,
            provider_config.timeout_secs.map(Duration::from_secs),
        )
    }

    /// Build the JSON generation provider for a named configuration.
    pub fn generation_provider(
        &self,
        provider_name: &str,
    ) -> Result<Arc<dyn GenerationProvider>, ApiError> {
        let options = self.get_or_error(provider_name)?.default_options.clone();
        let client = self.create_client(provider_name)?;
        Ok(Arc::new(JsonCompletionProvider::new(client, options)))
    }
}

/// [`GenerationProvider`] over any chat-completion client.
///
/// The schema is appended to the system message, JSON mode is requested, and
/// the JSON object is extracted from the reply text.
pub struct JsonCompletionProvider {
    client: Box<dyn CompletionClient>,
    options: CompletionOptions,
}

impl JsonCompletionProvider {
    pub fn new(client: Box<dyn CompletionClient>, options: CompletionOptions) -> Self {
        Self { client, options }
    }
}

#[async_trait]
impl GenerationProvider for JsonCompletionProvider {
    async fn generate(&self, prompt: &RenderedPrompt, schema: &Value) -> Result<Value, ApiError> {
        let prepared = self.prepare(prompt, schema)?;
        let messages = vec![
            ChatMessage::system(prepared.system),
            ChatMessage::user(prepared.user),
        ];
        let options = CompletionOptions {
            json_mode: true,
            ..self.options.clone()
        };

        let response = self.client.complete(messages, options).await?;
        debug!(
            provider = self.client.provider_name(),
            model = %response.model,
            prompt_tokens = response.usage.prompt_tokens,
            completion_tokens = response.usage.completion_tokens,
            finish_reason = ?response.finish_reason,
            "Provider completion received"
        );
        if response.finish_reason.as_deref() == Some("length") {
            warn!(
                provider = self.client.provider_name(),
                "Provider reply was truncated at the token limit"
            );
        }
        extract_json_object(&response.content)
    }

    fn prepare(&self, prompt: &RenderedPrompt, schema: &Value) -> Result<RenderedPrompt, ApiError> {
        let schema_text = serde_json::to_string_pretty(schema)
            .map_err(|e| ApiError::ProviderError(format!("Failed to encode schema: {}", e)))?;
        Ok(RenderedPrompt {
            system: format!(
                "{}\n\nThe reply must be a JSON object matching this JSON schema:\n{}",
                prompt.system.trim_end(),
                schema_text
            ),
            user: prompt.user.clone(),
        })
    }

    fn describe(&self) -> String {
        format!("{}/{}", self.client.provider_name(), self.client.model_name())
    }
}

/// Parse the JSON object in an LLM reply: bare, inside a ``` fence, or
/// surrounded by prose.
pub fn extract_json_object(content: &str) -> Result<Value, ApiError> {
    let trimmed = content.trim();
    let candidates = [
        Some(trimmed),
        fenced_block(trimmed),
        trimmed
            .find('{')
            .zip(trimmed.rfind('}'))
            .filter(|(start, end)| start < end)
            .map(|(start, end)| &trimmed[start..=end]),
    ];

    let mut last_error = None;
    for candidate in candidates.into_iter().flatten() {
        match serde_json::from_str::<Value>(candidate) {
            Ok(value @ Value::Object(_)) => return Ok(value),
            Ok(_) => {
                last_error = Some("reply is JSON but not an object".to_string());
            }
            Err(e) => last_error = Some(e.to_string()),
        }
    }
    Err(ApiError::ResponseValidation(format!(
        "provider returned malformed JSON: {}",
        last_error.unwrap_or_else(|| "empty reply".to_string())
    )))
}

fn fenced_block(text: &str) -> Option<&str> {
    let start = text.find("```")?;
    let after = &text[start + 3..];
    let body_start = after.find('\n')? + 1;
    let body = &after[body_start..];
    let end = body.find("```")?;
    Some(body[..end].trim())
}


#[cfg(test)]
mod tests {
    use super::mock::MockClient;
    use super::*;

    fn prompt() -> RenderedPrompt {
        RenderedPrompt {
            system: "You are a coach.".to_string(),
            user: "Plan for Ada".to_string(),
        }
    }

    #[test]
    fn test_extract_bare_json() {
        let value = extract_json_object(r#"{"title": "x"}"#).unwrap();
        assert_eq!(value["title"], "x");
    }

    #[test]
    fn test_extract_fenced_json() {
        let reply = "Here you go:\n```json\n{\"title\": \"x\"}\n```\nEnjoy";
        assert_eq!(extract_json_object(reply).unwrap()["title"], "x");
    }

    #[test]
    fn test_extract_json_with_prose() {
        let reply = "Sure! {\"title\": \"x\", \"weeks\": []} Let me know.";
        assert_eq!(extract_json_object(reply).unwrap()["title"], "x");
    }

    #[test]
    fn test_extract_rejects_non_objects_and_garbage() {
        assert!(matches!(
            extract_json_object("[1, 2]"),
            Err(ApiError::ResponseValidation(_))
        ));
        let err = extract_json_object("I cannot help with that").unwrap_err();
        assert!(err.to_string().contains("malformed JSON"));
    }

    #[test]
    fn test_map_status_error() {
        assert!(matches!(
            map_status_error(StatusCode::TOO_MANY_REQUESTS, "slow down".into()),
            ApiError::ProviderRateLimit(_)
        ));
        assert!(matches!(
            map_status_error(StatusCode::UNAUTHORIZED, "".into()),
            ApiError::ProviderAuthFailed(_)
        ));
        assert!(matches!(
            map_status_error(StatusCode::NOT_FOUND, "".into()),
            ApiError::ProviderModelNotFound(_)
        ));
        assert!(matches!(
            map_status_error(StatusCode::BAD_GATEWAY, "".into()),
            ApiError::ProviderRequestFailed(_)
        ));
    }

    #[tokio::test]
    async fn test_json_provider_requests_json_mode_and_embeds_schema() {
        let client = MockClient::new(vec![Ok(r#"{"summary": "ok"}"#.to_string())]);
        let seen = client.seen.clone();
        let provider = JsonCompletionProvider::new(Box::new(client), CompletionOptions::default());
        let schema = json!({"type": "object", "required": ["summary"]});

        let value = provider.generate(&prompt(), &schema).await.unwrap();
        assert_eq!(value["summary"], "ok");
        assert_eq!(provider.describe(), "mock/mock-model");

        let seen = seen.lock();
        let (messages, options) = &seen[0];
        assert!(options.json_mode);
        assert_eq!(messages[0].role, MessageRole::System);
        assert!(messages[0].content.contains("\"required\""));
        assert_eq!(messages[1].content, "Plan for Ada");

        let prepared = provider.prepare(&prompt(), &schema).unwrap();
        assert_eq!(messages[0].content, prepared.system);
        assert_eq!(messages[1].content, prepared.user);
    }

    #[tokio::test]
    async fn test_json_provider_propagates_client_errors() {
        let client = MockClient::new(vec![Err(ApiError::ProviderRateLimit("429".into()))]);
        let provider = JsonCompletionProvider::new(Box::new(client), CompletionOptions::default());
        let err = provider.generate(&prompt(), &json!({})).await.unwrap_err();
        assert!(err.is_provider_error());
    }

    #[test]
    fn test_registry_unknown_provider() {
        let registry = ProviderRegistry::new();
        assert!(matches!(
            registry.create_client("missing"),
            Err(ApiError::ProviderNotConfigured(_))
        ));
    }

    #[test]
    fn test_registry_builds_ollama_client() {
        let mut registry = ProviderRegistry::new();
        registry.insert(
            "local-llama",
            ProviderConfig {
                provider_name: Some("local-llama".to_string()),
                provider_type: ProviderType::Ollama,
                model: "llama3".to_string(),
                api_key: None,
                endpoint: None,
                timeout_secs: Some(30),
                default_options: CompletionOptions::default(),
            },
        );
        let client = registry.create_client("local-llama").unwrap();
        assert_eq!(client.provider_name(), "ollama");
        assert_eq!(client.model_name(), "llama3");
        assert_eq!(registry.list_all().len(), 1);
    }
}
