use chrono::{NaiveDateTime, TimeDelta};
use serde::{Deserialize, Serialize};

pub const SELF_SENDER_LABEL: &str = "You";
pub const UNKNOWN_SENDER_LABEL: &str = "Unknown";

/// One chat bubble recovered from the page, in chronological position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
    #[serde(default)]
    pub is_user: bool,
}

impl ChatMessage {
    /// Builds a message from raw parts. Returns `None` when the text is blank,
    /// so an empty bubble is never represented as a message.
    pub fn new(
        text: &str,
        timestamp: Option<String>,
        sender: Option<String>,
        is_user: bool,
    ) -> Option<Self> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }

        Some(Self {
            text: text.to_owned(),
            timestamp: non_blank(timestamp),
            sender: non_blank(sender),
            is_user,
        })
    }

    pub fn sender_label(&self) -> &str {
        if self.is_user {
            SELF_SENDER_LABEL
        } else {
            self.sender.as_deref().unwrap_or(UNKNOWN_SENDER_LABEL)
        }
    }

    pub fn as_prompt_line(&self) -> String {
        format!("[{}]: {}", self.sender_label(), self.text)
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TimeRange {
    LastHour,
    LastDay,
    LastWeek,
}

impl TimeRange {
    pub fn window(self) -> TimeDelta {
        match self {
            TimeRange::LastHour => TimeDelta::hours(1),
            TimeRange::LastDay => TimeDelta::hours(24),
            TimeRange::LastWeek => TimeDelta::days(7),
        }
    }
}

/// Inclusive wall-clock window, interpreted in the same zone as the chat's
/// display timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomRange {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl CustomRange {
    pub fn contains(&self, at: NaiveDateTime) -> bool {
        self.start <= at && at <= self.end
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_n_messages: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_range: Option<TimeRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_range: Option<CustomRange>,
}

impl SummaryOptions {
    /// Only a positive count restricts the selection.
    pub fn message_limit(&self) -> Option<usize> {
        self.last_n_messages.filter(|count| *count > 0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionResult {
    pub messages: Vec<ChatMessage>,
    pub chat_title: String,
}

#[cfg(test)]
mod tests {
    use super::{ChatMessage, CustomRange, SummaryOptions, TimeRange};
    use chrono::{NaiveDate, TimeDelta};

    #[test]
    fn new_trims_text_and_rejects_blank_bubbles() {
        let message = ChatMessage::new("  hello  ", None, None, false).expect("non-blank text");
        assert_eq!(message.text, "hello");
        assert!(ChatMessage::new(" \n\t ", None, None, true).is_none());
    }

    #[test]
    fn new_drops_blank_optional_fields() {
        let message = ChatMessage::new(
            "hi",
            Some("   ".to_owned()),
            Some(" Bob ".to_owned()),
            false,
        )
        .expect("non-blank text");
        assert_eq!(message.timestamp, None);
        assert_eq!(message.sender.as_deref(), Some("Bob"));
    }

    #[test]
    fn sender_label_prefers_self_marker_over_sender_name() {
        let own = ChatMessage::new("hi", None, Some("Alice".to_owned()), true).expect("text");
        let other = ChatMessage::new("yo", None, Some("Bob".to_owned()), false).expect("text");
        let anonymous = ChatMessage::new("??", None, None, false).expect("text");

        assert_eq!(own.as_prompt_line(), "[You]: hi");
        assert_eq!(other.as_prompt_line(), "[Bob]: yo");
        assert_eq!(anonymous.as_prompt_line(), "[Unknown]: ??");
    }

    #[test]
    fn time_range_windows() {
        assert_eq!(TimeRange::LastHour.window(), TimeDelta::hours(1));
        assert_eq!(TimeRange::LastDay.window(), TimeDelta::hours(24));
        assert_eq!(TimeRange::LastWeek.window(), TimeDelta::days(7));
    }

    #[test]
    fn zero_message_count_is_treated_as_unset() {
        let options = SummaryOptions {
            last_n_messages: Some(0),
            ..SummaryOptions::default()
        };
        assert_eq!(options.message_limit(), None);
    }

    #[test]
    fn options_deserialize_from_camel_case() {
        let options: SummaryOptions =
            serde_json::from_str(r#"{"lastNMessages": 50, "timeRange": "lastHour"}"#)
                .expect("options should parse");
        assert_eq!(options.last_n_messages, Some(50));
        assert_eq!(options.time_range, Some(TimeRange::LastHour));
        assert_eq!(options.custom_range, None);
    }

    #[test]
    fn custom_range_is_inclusive() {
        let day = NaiveDate::from_ymd_opt(2026, 10, 16).expect("valid date");
        let range = CustomRange {
            start: day.and_hms_opt(9, 0, 0).expect("valid time"),
            end: day.and_hms_opt(17, 0, 0).expect("valid time"),
        };
        assert!(range.contains(day.and_hms_opt(9, 0, 0).expect("valid time")));
        assert!(range.contains(day.and_hms_opt(17, 0, 0).expect("valid time")));
        assert!(!range.contains(day.and_hms_opt(17, 1, 0).expect("valid time")));
    }
}
