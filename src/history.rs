use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

pub const API_KEY_KEY: &str = "gemini_api_key";
pub const HISTORY_KEY: &str = "summaryHistory";
pub const MAX_HISTORY_ENTRIES: usize = 50;

/// Persisted settings and history. Writers are never concurrent, so
/// implementations only need last-write-wins semantics.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    async fn set(&self, key: &str, value: Value) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| anyhow::anyhow!("memory store lock poisoned"))?;
        Ok(entries.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| anyhow::anyhow!("memory store lock poisoned"))?;
        entries.insert(key.to_owned(), value);
        Ok(())
    }
}

/// Stores every key in one JSON object on disk. Writes go through a sibling
/// temp file and a rename.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> Result<Map<String, Value>> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(err) => {
                return Err(err).with_context(|| {
                    format!("failed to read store file: {}", self.path.display())
                });
            }
        };

        if raw.trim().is_empty() {
            return Ok(Map::new());
        }

        serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse store file: {}", self.path.display()))
    }

    async fn write_all(&self, entries: &Map<String, Value>) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create store directory: {}", parent.display()))?;
        }

        let rendered =
            serde_json::to_string_pretty(entries).context("failed to serialize store contents")?;
        let tmp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, rendered)
            .await
            .with_context(|| format!("failed to write store file: {}", tmp_path.display()))?;
        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .with_context(|| format!("failed to replace store file: {}", self.path.display()))?;
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for JsonFileStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.read_all().await?.remove(key))
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        let mut entries = self.read_all().await?;
        entries.insert(key.to_owned(), value);
        self.write_all(&entries).await?;
        debug!(key, path = %self.path.display(), "persisted store entry");
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryRecord {
    pub summary: String,
    pub timestamp: String,
    pub message_count: usize,
}

impl SummaryRecord {
    pub fn new(summary: impl Into<String>, message_count: usize) -> Self {
        Self {
            summary: summary.into(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            message_count,
        }
    }
}

/// Newest first; anything past the cap is evicted from the old end.
pub fn push_record(history: &mut Vec<SummaryRecord>, record: SummaryRecord) {
    history.insert(0, record);
    history.truncate(MAX_HISTORY_ENTRIES);
}

pub async fn load_history<S>(store: &S) -> Result<Vec<SummaryRecord>>
where
    S: KeyValueStore + ?Sized,
{
    let Some(value) = store.get(HISTORY_KEY).await? else {
        return Ok(Vec::new());
    };

    match serde_json::from_value(value) {
        Ok(history) => Ok(history),
        Err(err) => {
            warn!(error = %err, "stored summary history is malformed; starting fresh");
            Ok(Vec::new())
        }
    }
}

pub async fn append_summary_record<S>(store: &S, record: SummaryRecord) -> Result<Vec<SummaryRecord>>
where
    S: KeyValueStore + ?Sized,
{
    let mut history = load_history(store).await?;
    push_record(&mut history, record);
    let value = serde_json::to_value(&history).context("failed to serialize summary history")?;
    store.set(HISTORY_KEY, value).await?;
    Ok(history)
}

pub async fn load_api_key<S>(store: &S) -> Result<Option<String>>
where
    S: KeyValueStore + ?Sized,
{
    let key = store
        .get(API_KEY_KEY)
        .await?
        .as_ref()
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .map(str::to_owned);
    Ok(key)
}

pub async fn save_api_key<S>(store: &S, api_key: &str) -> Result<()>
where
    S: KeyValueStore + ?Sized,
{
    store
        .set(API_KEY_KEY, Value::String(api_key.trim().to_owned()))
        .await
}
