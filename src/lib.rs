//! Summarizes a WhatsApp Web chat snapshot: extract message bubbles from the
//! page markup, narrow them by count or recency, and ask Gemini for a summary,
//! falling back to a secondary chat-completions service when Gemini is out of
//! quota.

pub mod app;
pub mod config;
pub mod error;
pub mod extract;
pub mod filter;
pub mod history;
pub mod llm;
pub mod message;
pub mod summarizer;
