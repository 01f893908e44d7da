use crate::message::{ChatMessage, SummaryOptions};
use chrono::{DateTime, Local, NaiveTime, TimeZone};
use regex::Regex;
use std::sync::LazyLock;

static CLOCK_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d{1,2}):(\d{2})\s*(AM|PM)?").expect("clock pattern must compile")
});

/// Selects the messages to summarize, using the local clock as "now".
pub fn filter_messages(messages: Vec<ChatMessage>, options: &SummaryOptions) -> Vec<ChatMessage> {
    filter_messages_at(messages, options, &Local::now())
}

/// Count filter first, then the time filters on what remains. Input is
/// expected oldest-first; the output is always an order-preserving
/// subsequence of it.
///
/// Messages whose timestamp is absent or cannot be parsed are kept.
pub fn filter_messages_at<Tz: TimeZone>(
    mut messages: Vec<ChatMessage>,
    options: &SummaryOptions,
    now: &DateTime<Tz>,
) -> Vec<ChatMessage> {
    if let Some(limit) = options.message_limit() {
        if messages.len() > limit {
            messages.drain(..messages.len() - limit);
        }
    }

    if let Some(range) = options.time_range {
        let cutoff = now.clone() - range.window();
        messages.retain(|message| {
            parsed_time(message, now).is_none_or(|sent_at| sent_at >= cutoff)
        });
    }

    if let Some(custom) = options.custom_range {
        messages.retain(|message| {
            parsed_time(message, now).is_none_or(|sent_at| custom.contains(sent_at.naive_local()))
        });
    }

    messages
}

fn parsed_time<Tz: TimeZone>(message: &ChatMessage, now: &DateTime<Tz>) -> Option<DateTime<Tz>> {
    message
        .timestamp
        .as_deref()
        .and_then(|raw| parse_clock_time(raw, now))
}

/// Parses a display label such as `"3:45 PM"` or `"15:45"` into a time on
/// `now`'s calendar date.
///
/// Without an AM/PM marker, hours below 12 are read as afternoon. This is an
/// approximation: labels carry no date, so a message from an earlier day lands
/// on today as well.
pub fn parse_clock_time<Tz: TimeZone>(raw: &str, now: &DateTime<Tz>) -> Option<DateTime<Tz>> {
    let captures = CLOCK_PATTERN.captures(raw)?;
    let mut hour: u32 = captures[1].parse().ok()?;
    let minute: u32 = captures[2].parse().ok()?;

    match captures.get(3).map(|marker| marker.as_str()) {
        Some(marker) if marker.eq_ignore_ascii_case("pm") => {
            if hour < 12 {
                hour += 12;
            }
        }
        Some(_) => {
            if hour == 12 {
                hour = 0;
            }
        }
        None => {
            if hour < 12 {
                hour += 12;
            }
        }
    }

    let time = NaiveTime::from_hms_opt(hour, minute, 0)?;
    let local = now.date_naive().and_time(time);
    now.timezone().from_local_datetime(&local).earliest()
}
