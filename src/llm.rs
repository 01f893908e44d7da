use crate::config::{FallbackConfig, GeminiConfig};
use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

const GEMINI_TEMPERATURE: f32 = 0.3;
const GEMINI_TOP_P: f32 = 0.8;
const GEMINI_TOP_K: u32 = 40;
const GEMINI_MAX_OUTPUT_TOKENS: u32 = 1024;
const NO_SUMMARY_TEXT: &str = "No summary generated.";

/// A text-generation backend that turns one prompt into one completion.
#[async_trait]
pub trait SummaryService: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(&self, prompt: &str) -> Result<String>;
}

fn build_http_client(timeout: Duration, service: &str) -> Result<Client> {
    let http = Client::builder()
        .timeout(timeout)
        .build()
        .with_context(|| format!("failed to build HTTP client for {service}"))?;

    debug!(
        service,
        timeout_seconds = timeout.as_secs(),
        "built HTTP client"
    );

    Ok(http)
}

pub struct GeminiClient {
    endpoint: Url,
    api_key: String,
    model: String,
    http: Client,
}

impl GeminiClient {
    pub fn new(api_key: &str, config: &GeminiConfig) -> Result<Self> {
        let api_key = api_key.trim();
        if api_key.is_empty() {
            bail!("gemini api key must not be empty");
        }

        let model = config.model.trim().to_owned();
        let base_url =
            Url::parse(config.base_url.trim()).context("gemini.base_url must be a valid URL string")?;
        let endpoint = base_url
            .join(&format!("v1beta/models/{model}:generateContent"))
            .context("failed to build Gemini generateContent endpoint URL")?;

        Ok(Self {
            endpoint,
            api_key: api_key.to_owned(),
            model,
            http: build_http_client(Duration::from_secs(config.timeout_seconds), "gemini")?,
        })
    }
}

#[async_trait]
impl SummaryService for GeminiClient {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let request = build_gemini_request(prompt);

        debug!(model = %self.model, "sending summary request to gemini");

        let response = self
            .http
            .post(self.endpoint.clone())
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .context("failed to send request to Gemini")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("gemini request failed with status {status}: {body}");
        }

        let parsed: Value = response
            .json()
            .await
            .context("failed to parse Gemini generateContent response JSON")?;

        extract_gemini_text(&parsed).context("gemini response missing text content")
    }
}

fn build_gemini_request(prompt: &str) -> GenerateContentRequest {
    GenerateContentRequest {
        contents: vec![Content {
            parts: vec![Part {
                text: prompt.to_owned(),
            }],
        }],
        generation_config: GenerationConfig {
            temperature: GEMINI_TEMPERATURE,
            top_p: GEMINI_TOP_P,
            top_k: GEMINI_TOP_K,
            max_output_tokens: GEMINI_MAX_OUTPUT_TOKENS,
        },
    }
}

fn extract_gemini_text(json: &Value) -> Option<String> {
    let parts = json
        .get("candidates")?
        .as_array()?
        .first()?
        .get("content")?
        .get("parts")?
        .as_array()?;

    let chunks: Vec<&str> = parts
        .iter()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect();
    if chunks.is_empty() {
        None
    } else {
        Some(chunks.concat())
    }
}

#[derive(Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, PartialEq, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, PartialEq, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: u32,
    max_output_tokens: u32,
}

/// OpenAI-style chat completions endpoint used when Gemini is out of quota.
pub struct FallbackClient {
    endpoint: Url,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
    http: Client,
}

impl FallbackClient {
    pub fn new(api_key: &str, config: &FallbackConfig) -> Result<Self> {
        let api_key = api_key.trim();
        if api_key.is_empty() {
            bail!("fallback api key must not be empty");
        }

        let endpoint =
            Url::parse(config.url.trim()).context("fallback.url must be a valid URL string")?;

        Ok(Self {
            endpoint,
            api_key: api_key.to_owned(),
            model: config.model.trim().to_owned(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            http: build_http_client(Duration::from_secs(config.timeout_seconds), "fallback")?,
        })
    }

    /// Builds the client from config, or `None` when no credential is
    /// available.
    pub fn from_config(config: &FallbackConfig) -> Result<Option<Self>> {
        config
            .resolved_api_key()
            .map(|api_key| Self::new(&api_key, config))
            .transpose()
    }
}

#[async_trait]
impl SummaryService for FallbackClient {
    fn name(&self) -> &str {
        "fallback"
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let request =
            build_completion_request(&self.model, prompt, self.max_tokens, self.temperature);

        debug!(model = %self.model, endpoint = %self.endpoint, "sending summary request to fallback");

        let response = self
            .http
            .post(self.endpoint.clone())
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .context("failed to send request to fallback service")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("fallback request failed with status {status}: {body}");
        }

        let parsed: Value = response
            .json()
            .await
            .context("failed to parse fallback chat completion response JSON")?;

        Ok(extract_completion_text(&parsed))
    }
}

fn build_completion_request(
    model: &str,
    prompt: &str,
    max_tokens: u32,
    temperature: f32,
) -> CompletionRequest {
    CompletionRequest {
        messages: vec![CompletionMessage {
            role: "user".to_owned(),
            content: prompt.to_owned(),
        }],
        model: model.to_owned(),
        max_tokens,
        temperature,
    }
}

/// `choices[0].message.content`, then a top-level `text`, then a fixed
/// placeholder. Blank strings fall through to the next option.
fn extract_completion_text(json: &Value) -> String {
    let from_choice = json
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|choices| choices.first())
        .and_then(|choice| choice.get("message"))
        .and_then(|message| message.get("content"))
        .and_then(Value::as_str);
    let from_text = json.get("text").and_then(Value::as_str);

    from_choice
        .into_iter()
        .chain(from_text)
        .find(|text| !text.is_empty())
        .unwrap_or(NO_SUMMARY_TEXT)
        .to_owned()
}

#[derive(Debug, PartialEq, Serialize)]
struct CompletionRequest {
    messages: Vec<CompletionMessage>,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, PartialEq, Serialize)]
struct CompletionMessage {
    role: String,
    content: String,
}
