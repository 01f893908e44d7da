use crate::config::Config;
use crate::error::SummarizeError;
use crate::history::{KeyValueStore, load_api_key};
use crate::llm::{FallbackClient, GeminiClient, SummaryService};
use crate::message::ChatMessage;
use anyhow::Result;
use std::sync::Arc;
use tracing::{error, info, warn};

const QUOTA_MARKERS: [&str; 4] = ["quota", "429", "resource_exhausted", "rate limit"];

/// Two-tier summarizer: Gemini first, then a single fallback attempt when the
/// primary failure looks like quota exhaustion or rate limiting.
pub struct Summarizer {
    primary: Option<Arc<dyn SummaryService>>,
    fallback: Option<Arc<dyn SummaryService>>,
}

impl Summarizer {
    pub fn new(
        primary: Option<Arc<dyn SummaryService>>,
        fallback: Option<Arc<dyn SummaryService>>,
    ) -> Self {
        Self { primary, fallback }
    }

    /// Reads the stored Gemini key and the fallback credential, returning a
    /// summarizer that is ready for use.
    pub async fn load<S>(store: &S, config: &Config) -> Result<Self>
    where
        S: KeyValueStore + ?Sized,
    {
        let primary = match load_api_key(store).await? {
            Some(api_key) => {
                Some(Arc::new(GeminiClient::new(&api_key, &config.gemini)?) as Arc<dyn SummaryService>)
            }
            None => None,
        };
        let fallback = FallbackClient::from_config(&config.fallback)?
            .map(|client| Arc::new(client) as Arc<dyn SummaryService>);

        info!(
            has_api_key = primary.is_some(),
            has_fallback = fallback.is_some(),
            "summarizer ready"
        );

        Ok(Self::new(primary, fallback))
    }

    pub fn has_api_key(&self) -> bool {
        self.primary.is_some()
    }

    pub fn set_primary(&mut self, primary: Arc<dyn SummaryService>) {
        self.primary = Some(primary);
    }

    pub async fn summarize(&self, messages: &[ChatMessage]) -> Result<String, SummarizeError> {
        let primary = self.primary.as_ref().ok_or(SummarizeError::Configuration)?;
        if messages.is_empty() {
            return Err(SummarizeError::EmptyInput);
        }

        let conversation = render_conversation(messages);
        let prompt = primary_prompt(&conversation);

        info!(
            service = primary.name(),
            message_count = messages.len(),
            "requesting summary"
        );

        match primary.generate(&prompt).await {
            Ok(summary) => {
                info!(service = primary.name(), "summary generated");
                Ok(summary)
            }
            Err(err) => {
                let detail = format!("{err:#}");
                warn!(service = primary.name(), error = %detail, "primary summarization failed");
                if is_quota_failure(&detail) {
                    self.summarize_with_fallback(&conversation).await
                } else {
                    Err(SummarizeError::Summarization(detail))
                }
            }
        }
    }

    async fn summarize_with_fallback(&self, conversation: &str) -> Result<String, SummarizeError> {
        let Some(fallback) = self.fallback.as_ref() else {
            error!("primary service is rate limited and no fallback credential is configured");
            return Err(SummarizeError::AllServicesUnavailable);
        };

        info!(service = fallback.name(), "retrying summary with fallback service");
        match fallback.generate(&fallback_prompt(conversation)).await {
            Ok(summary) => {
                info!(service = fallback.name(), "summary generated with fallback");
                Ok(summary)
            }
            Err(err) => {
                error!(service = fallback.name(), error = %format!("{err:#}"), "fallback summarization failed");
                Err(SummarizeError::AllServicesUnavailable)
            }
        }
    }
}

pub fn is_quota_failure(detail: &str) -> bool {
    let lowered = detail.to_lowercase();
    QUOTA_MARKERS.iter().any(|marker| lowered.contains(marker))
}

pub fn render_conversation(messages: &[ChatMessage]) -> String {
    messages
        .iter()
        .map(ChatMessage::as_prompt_line)
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn primary_prompt(conversation: &str) -> String {
    format!(
        "Please provide a concise summary of this WhatsApp conversation:

1. **Main Topics Discussed**: List 2-4 main topics
2. **Key Decisions Made**: What was agreed upon?
3. **Action Items**: Tasks mentioned with owners if specified
4. **Important Information**: Critical details shared
5. **Open Questions**: Unanswered questions or pending items

Conversation:
{conversation}

Summary (be concise but comprehensive):"
    )
}

pub fn fallback_prompt(conversation: &str) -> String {
    format!(
        "Summarize the following WhatsApp conversation concisely, focusing on:
- Main topics discussed
- Key decisions made
- Action items and tasks
- Important information shared
- Open questions or pending items

Format the summary with clear sections and be concise but comprehensive.

Conversation:
{conversation}"
    )
}
