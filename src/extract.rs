use crate::filter::filter_messages;
use crate::message::{ChatMessage, ExtractionResult, SELF_SENDER_LABEL, SummaryOptions};
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info, warn};

pub const DEFAULT_CHAT_TITLE: &str = "Unknown Chat";

/// Selector cascades for one generation of the chat page markup. Each list is
/// tried in order; the first selector whose first match carries non-blank
/// text wins.
#[derive(Debug, Clone)]
pub struct MarkupProfile {
    pub container: &'static str,
    pub text: &'static [&'static str],
    pub timestamp: &'static [&'static str],
    pub sender: &'static [&'static str],
    pub outbound_class: &'static str,
    pub outbound_markers: &'static [&'static str],
    pub current_user: &'static [&'static str],
    pub chat_title: &'static [&'static str],
}

impl MarkupProfile {
    pub fn whatsapp_web() -> Self {
        Self {
            container: r#"div[class*="message-"]"#,
            text: &[
                ".selectable-text.copyable-text",
                r#"span[class*="selectable-text"]"#,
                r#"div[class*="copyable-text"]"#,
                r#"[dir="auto"]"#,
            ],
            timestamp: &[
                r#"div[data-testid="msg-meta"]"#,
                r#"span[class*="x1fj9vlw"]"#,
                r#"[aria-label*=":"]"#,
            ],
            sender: &[
                r#"span[dir="auto"]"#,
                r#"div[class*="_ahxj"] span"#,
                r#"div[data-testid*="sender"]"#,
            ],
            outbound_class: "message-out",
            outbound_markers: &[".message-out", r#"div[data-testid*="out"]"#],
            current_user: &[
                r#"header[data-testid="conversation-header"] span[dir="auto"]"#,
                r#"header div[role="heading"] span"#,
                r#"#side header img[alt*="profile"]"#,
            ],
            chat_title: &[
                r#"header[data-testid="conversation-header"] span[dir="auto"]"#,
                r#"header div[role="heading"] span"#,
                r#"#main header div[title]"#,
            ],
        }
    }
}

impl Default for MarkupProfile {
    fn default() -> Self {
        Self::whatsapp_web()
    }
}

struct Probe {
    source: &'static str,
    selector: Selector,
}

impl Probe {
    fn resolve(&self, scope: ElementRef<'_>) -> Option<String> {
        scope.select(&self.selector).next().and_then(trimmed_text)
    }

    fn matches(&self, scope: ElementRef<'_>) -> bool {
        scope.select(&self.selector).next().is_some()
    }
}

struct Cascade {
    probes: Vec<Probe>,
}

impl Cascade {
    fn compile(field: &'static str, sources: &[&'static str]) -> Self {
        let probes = sources
            .iter()
            .copied()
            .filter_map(|source| match Selector::parse(source) {
                Ok(selector) => Some(Probe { source, selector }),
                Err(err) => {
                    warn!(field, selector = source, error = %err, "dropping invalid selector");
                    None
                }
            })
            .collect();
        Self { probes }
    }

    fn resolve(&self, scope: ElementRef<'_>) -> Option<String> {
        self.probes.iter().find_map(|probe| {
            let value = probe.resolve(scope);
            if value.is_some() {
                debug!(selector = probe.source, "selector cascade matched");
            }
            value
        })
    }

    fn any_match(&self, scope: ElementRef<'_>) -> bool {
        self.probes.iter().any(|probe| probe.matches(scope))
    }
}

fn trimmed_text(element: ElementRef<'_>) -> Option<String> {
    let text = element.text().collect::<String>();
    let text = text.trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_owned())
    }
}

/// Best-effort reader for chat page snapshots. Containers that do not yield
/// usable text are skipped; the scan itself never fails.
pub struct Extractor {
    container: Option<Selector>,
    text: Cascade,
    timestamp: Cascade,
    sender: Cascade,
    outbound_class: &'static str,
    outbound_markers: Cascade,
    current_user: Cascade,
    chat_title: Cascade,
}

impl Extractor {
    pub fn new(profile: &MarkupProfile) -> Self {
        let container = match Selector::parse(profile.container) {
            Ok(selector) => Some(selector),
            Err(err) => {
                warn!(
                    selector = profile.container,
                    error = %err,
                    "invalid message container selector; extraction will find nothing"
                );
                None
            }
        };

        Self {
            container,
            text: Cascade::compile("text", profile.text),
            timestamp: Cascade::compile("timestamp", profile.timestamp),
            sender: Cascade::compile("sender", profile.sender),
            outbound_class: profile.outbound_class,
            outbound_markers: Cascade::compile("outbound_marker", profile.outbound_markers),
            current_user: Cascade::compile("current_user", profile.current_user),
            chat_title: Cascade::compile("chat_title", profile.chat_title),
        }
    }

    /// Messages in document order, which is oldest first.
    pub fn scan(&self, document: &Html) -> Vec<ChatMessage> {
        let Some(container) = self.container.as_ref() else {
            return Vec::new();
        };

        let current_user = self.current_user(document);
        let candidates: Vec<ElementRef<'_>> = document.select(container).collect();
        info!(
            candidates = candidates.len(),
            current_user = %current_user,
            "scanning message containers"
        );

        candidates
            .into_iter()
            .enumerate()
            .filter_map(|(index, candidate)| self.read_message(index, candidate, &current_user))
            .collect()
    }

    pub fn current_user(&self, document: &Html) -> String {
        self.current_user
            .resolve(document.root_element())
            .unwrap_or_else(|| SELF_SENDER_LABEL.to_owned())
    }

    pub fn chat_title(&self, document: &Html) -> String {
        self.chat_title
            .resolve(document.root_element())
            .unwrap_or_else(|| DEFAULT_CHAT_TITLE.to_owned())
    }

    pub fn extract(&self, document: &Html, options: &SummaryOptions) -> ExtractionResult {
        let scanned = self.scan(document);
        let scanned_count = scanned.len();
        let messages = filter_messages(scanned, options);
        info!(
            scanned = scanned_count,
            selected = messages.len(),
            "extracted chat messages"
        );

        ExtractionResult {
            messages,
            chat_title: self.chat_title(document),
        }
    }

    fn read_message(
        &self,
        index: usize,
        container: ElementRef<'_>,
        current_user: &str,
    ) -> Option<ChatMessage> {
        let Some(text) = self.text.resolve(container) else {
            debug!(index, "skipping container without text");
            return None;
        };

        let timestamp = self.timestamp.resolve(container);
        // A bubble without a sender element is attributed to the current user.
        let sender = self
            .sender
            .resolve(container)
            .unwrap_or_else(|| current_user.to_owned());
        let is_user = self.is_outbound(container) || sender == current_user;

        ChatMessage::new(&text, timestamp, Some(sender), is_user)
    }

    fn is_outbound(&self, container: ElementRef<'_>) -> bool {
        container
            .value()
            .classes()
            .any(|class| class == self.outbound_class)
            || self.outbound_markers.any_match(container)
    }
}

impl Default for Extractor {
    fn default() -> Self {
        Self::new(&MarkupProfile::default())
    }
}

/// Parses a page snapshot and runs extraction plus filtering on it.
pub fn extract_from_html(html: &str, options: &SummaryOptions) -> ExtractionResult {
    let document = Html::parse_document(html);
    Extractor::default().extract(&document, options)
}
