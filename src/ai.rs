use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Settings;
use crate::error::LlmError;

/// One model call: which model, what it is told, what it is asked.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmRequest {
    pub model: String,
    pub system_prompt: String,
    pub user_content: String,
}

impl LlmRequest {
    pub fn new(
        model: impl Into<String>,
        system_prompt: impl Into<String>,
        user_content: impl Into<String>,
    ) -> Self {
        Self {
            model: model.into(),
            system_prompt: system_prompt.into(),
            user_content: user_content.into(),
        }
    }
}

// --- Provider trait ---

pub trait AIProvider {
    /// Raw text of the model's reply.
    fn complete(&self, request: &LlmRequest) -> Result<String, LlmError>;
    fn provider_name(&self) -> &str;
}

/// Call the model and decode its reply as `T`. Anything that is not the
/// expected JSON shape is a [`LlmError::Format`].
pub fn classify_as<T: DeserializeOwned>(
    provider: &dyn AIProvider,
    request: &LlmRequest,
) -> Result<T, LlmError> {
    let raw = provider.complete(request)?;
    parse_llm_json(&raw)
}

/// Models wrap JSON in code fences or prose often enough that we take the
/// outermost object in the reply.
pub fn parse_llm_json<T: DeserializeOwned>(raw: &str) -> Result<T, LlmError> {
    let trimmed = raw.trim();
    let body = match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start < end => &trimmed[start..=end],
        _ => {
            return Err(LlmError::Format(format!(
                "no JSON object in reply: {}",
                crate::short_reason(trimmed)
            )))
        }
    };
    Ok(serde_json::from_str(body)?)
}

// --- Verdict shapes ---

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HrVerdict {
    pub is_hr_company: bool,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SponsorshipVerdict {
    pub accepts_sponsorship: bool,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ScoreVerdict {
    pub score: f64,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
}

// --- Provider selection ---

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderKind {
    OpenAI,
    Anthropic,
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(ProviderKind::OpenAI),
            "anthropic" | "claude" => Ok(ProviderKind::Anthropic),
            other => Err(format!(
                "Unknown LLM provider '{}'. Available: openai, anthropic",
                other
            )),
        }
    }
}

/// Build the configured provider. A missing key is an error here, at
/// construction, rather than on the first call.
pub fn create_provider(settings: &Settings) -> Result<Arc<dyn AIProvider>, LlmError> {
    let kind = settings.llm_provider.clone();
    match kind {
        ProviderKind::OpenAI => {
            let key = settings
                .api_key_for(&kind)
                .ok_or(LlmError::MissingApiKey("OPENAI_API_KEY"))?;
            Ok(Arc::new(OpenAIProvider::new(key.to_string())?))
        }
        ProviderKind::Anthropic => {
            let key = settings
                .api_key_for(&kind)
                .ok_or(LlmError::MissingApiKey("ANTHROPIC_API_KEY"))?;
            Ok(Arc::new(AnthropicProvider::new(key.to_string())?))
        }
    }
}

const REQUEST_TIMEOUT: Duration = Duration::from_secs(90);
const MAX_OUTPUT_TOKENS: u32 = 512;

fn http_client() -> Result<reqwest::blocking::Client, LlmError> {
    Ok(reqwest::blocking::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()?)
}

// --- Anthropic provider ---

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    system: String,
    messages: Vec<AnthropicMessage>,
}

#[derive(Debug, Deserialize)]
struct AnthropicContentBlock {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContentBlock>,
}

#[derive(Debug)]
pub struct AnthropicProvider {
    api_key: String,
    client: reqwest::blocking::Client,
}

impl AnthropicProvider {
    pub fn new(api_key: String) -> Result<Self, LlmError> {
        Ok(Self {
            api_key,
            client: http_client()?,
        })
    }
}

impl AIProvider for AnthropicProvider {
    fn complete(&self, request: &LlmRequest) -> Result<String, LlmError> {
        let body = AnthropicRequest {
            model: request.model.clone(),
            max_tokens: MAX_OUTPUT_TOKENS,
            system: request.system_prompt.clone(),
            messages: vec![AnthropicMessage {
                role: "user".to_string(),
                content: request.user_content.clone(),
            }],
        };

        let response = self
            .client
            .post(ANTHROPIC_API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&body)
            .send()?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().unwrap_or_default();
            return Err(LlmError::Status { status, body });
        }

        let api_response: AnthropicResponse = response.json()?;
        api_response
            .content
            .into_iter()
            .map(|block| block.text)
            .find(|text| !text.trim().is_empty())
            .ok_or_else(|| LlmError::Format("no content in Anthropic response".to_string()))
    }

    fn provider_name(&self) -> &str {
        "anthropic"
    }
}

// --- OpenAI provider ---

const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";

#[derive(Debug, Serialize)]
struct OpenAIMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    response_format: ResponseFormat,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_completion_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

impl OpenAIRequest {
    fn build(request: &LlmRequest) -> Self {
        // newer model families reject max_tokens and a custom temperature
        let newer = ["gpt-5", "gpt-4.1", "gpt-4-turbo", "o1", "o3", "o4"]
            .iter()
            .any(|prefix| request.model.starts_with(prefix));
        Self {
            model: request.model.clone(),
            messages: vec![
                OpenAIMessage {
                    role: "system".to_string(),
                    content: request.system_prompt.clone(),
                },
                OpenAIMessage {
                    role: "user".to_string(),
                    content: request.user_content.clone(),
                },
            ],
            response_format: ResponseFormat { kind: "json_object" },
            max_tokens: (!newer).then_some(MAX_OUTPUT_TOKENS),
            max_completion_tokens: newer.then_some(MAX_OUTPUT_TOKENS),
            temperature: (!newer).then_some(0.0),
        }
    }
}

#[derive(Debug, Deserialize)]
struct OpenAIResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Debug)]
pub struct OpenAIProvider {
    api_key: String,
    client: reqwest::blocking::Client,
}

impl OpenAIProvider {
    pub fn new(api_key: String) -> Result<Self, LlmError> {
        Ok(Self {
            api_key,
            client: http_client()?,
        })
    }
}

impl AIProvider for OpenAIProvider {
    fn complete(&self, request: &LlmRequest) -> Result<String, LlmError> {
        let response = self
            .client
            .post(OPENAI_API_URL)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&OpenAIRequest::build(request))
            .send()?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().unwrap_or_default();
            return Err(LlmError::Status { status, body });
        }

        let api_response: OpenAIResponse = response.json()?;
        api_response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| LlmError::Format("no choices in OpenAI response".to_string()))
    }

    fn provider_name(&self) -> &str {
        "openai"
    }
}
