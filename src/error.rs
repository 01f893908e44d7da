use thiserror::Error;

/// Failures surfaced by the summarizer. Each variant is terminal: the
/// orchestrator never retries beyond its single fallback attempt.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SummarizeError {
    #[error("Gemini API key not configured. Please add your API key in the settings.")]
    Configuration,
    #[error("No messages to summarize.")]
    EmptyInput,
    #[error("Gemini API failed: {0}")]
    Summarization(String),
    #[error("All summarization services are currently unavailable. Please try again later.")]
    AllServicesUnavailable,
}

#[cfg(test)]
mod tests {
    use super::SummarizeError;

    #[test]
    fn summarization_error_keeps_provider_detail() {
        let err = SummarizeError::Summarization("API key not valid".to_owned());
        assert_eq!(err.to_string(), "Gemini API failed: API key not valid");
    }

    #[test]
    fn unavailable_error_hides_provider_detail() {
        let rendered = SummarizeError::AllServicesUnavailable.to_string();
        assert!(rendered.contains("currently unavailable"));
        assert!(!rendered.contains("status"));
    }
}
