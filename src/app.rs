use crate::config::Config;
use crate::extract::extract_from_html;
use crate::history::{
    KeyValueStore, SummaryRecord, append_summary_record, load_history, save_api_key,
};
use crate::llm::GeminiClient;
use crate::message::{ChatMessage, SummaryOptions};
use crate::summarizer::Summarizer;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::sync::{Arc, OnceLock};
use tracing::{error, info, warn};
use tracing_log::LogTracer;
use tracing_subscriber::EnvFilter;

static TRACING_INIT: OnceLock<()> = OnceLock::new();

pub fn init_tracing() {
    TRACING_INIT.get_or_init(|| {
        let _ = LogTracer::init();
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .compact()
            .try_init();
    });
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Request {
    ExtractMessages {
        html: String,
        #[serde(default)]
        options: SummaryOptions,
    },
    SummarizeChat {
        messages: Vec<ChatMessage>,
    },
    SetApiKey {
        #[serde(rename = "apiKey")]
        api_key: String,
    },
    CheckApiKey,
    GetHistory,
}

impl Request {
    fn action(&self) -> &'static str {
        match self {
            Request::ExtractMessages { .. } => "EXTRACT_MESSAGES",
            Request::SummarizeChat { .. } => "SUMMARIZE_CHAT",
            Request::SetApiKey { .. } => "SET_API_KEY",
            Request::CheckApiKey => "CHECK_API_KEY",
            Request::GetHistory => "GET_HISTORY",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<ChatMessage>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_key: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history: Option<Vec<SummaryRecord>>,
}

impl Response {
    pub fn ok() -> Self {
        Self {
            success: true,
            ..Self::default()
        }
    }

    pub fn failure(error: impl Display) -> Self {
        Self {
            success: false,
            error: Some(error.to_string()),
            ..Self::default()
        }
    }
}

/// Request/response boundary in front of the pipeline. Every request is
/// answered through the same async entry point; handlers with nothing to
/// await simply return immediately.
pub struct App<S> {
    config: Config,
    store: S,
    summarizer: Summarizer,
}

impl<S: KeyValueStore> App<S> {
    pub async fn load(config: Config, store: S) -> Result<Self> {
        let summarizer = Summarizer::load(&store, &config).await?;
        Ok(Self::with_summarizer(config, store, summarizer))
    }

    pub fn with_summarizer(config: Config, store: S, summarizer: Summarizer) -> Self {
        Self {
            config,
            store,
            summarizer,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub async fn handle(&mut self, request: Request) -> Response {
        info!(action = request.action(), "handling request");
        match request {
            Request::ExtractMessages { html, options } => self.extract_messages(&html, &options),
            Request::SummarizeChat { messages } => self.summarize_chat(&messages).await,
            Request::SetApiKey { api_key } => self.set_api_key(&api_key).await,
            Request::CheckApiKey => Response {
                has_key: Some(self.summarizer.has_api_key()),
                ..Response::ok()
            },
            Request::GetHistory => match load_history(&self.store).await {
                Ok(history) => Response {
                    history: Some(history),
                    ..Response::ok()
                },
                Err(err) => Response::failure(format!("{err:#}")),
            },
        }
    }

    fn extract_messages(&self, html: &str, options: &SummaryOptions) -> Response {
        let extraction = extract_from_html(html, options);
        Response {
            message_count: Some(extraction.messages.len()),
            messages: Some(extraction.messages),
            chat_title: Some(extraction.chat_title),
            ..Response::ok()
        }
    }

    async fn summarize_chat(&self, messages: &[ChatMessage]) -> Response {
        let summary = match self.summarizer.summarize(messages).await {
            Ok(summary) => summary,
            Err(err) => {
                error!(error = %err, "summarization failed");
                return Response::failure(err);
            }
        };

        if let Err(err) =
            append_summary_record(&self.store, SummaryRecord::new(summary.clone(), messages.len()))
                .await
        {
            warn!(error = %format!("{err:#}"), "failed to record summary history");
        }

        Response {
            summary: Some(summary),
            message_count: Some(messages.len()),
            ..Response::ok()
        }
    }

    async fn set_api_key(&mut self, api_key: &str) -> Response {
        let client = match GeminiClient::new(api_key, &self.config.gemini) {
            Ok(client) => client,
            Err(err) => return Response::failure(format!("{err:#}")),
        };
        if let Err(err) = save_api_key(&self.store, api_key).await {
            return Response::failure(format!("{err:#}"));
        }

        self.summarizer.set_primary(Arc::new(client));
        info!("gemini api key updated");
        Response::ok()
    }
}
