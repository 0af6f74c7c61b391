use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use axum::http::{header, HeaderMap};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::fetcher::DEFAULT_CATEGORY;

/// Name of the single client-side entry holding the preferences
pub const STORAGE_KEY: &str = "newsflow-preferences";

/// Browsers cap cookie lifetimes at 400 days
const COOKIE_MAX_AGE_SECS: u64 = 400 * 24 * 60 * 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preferences {
    #[serde(rename = "selectedDomain", default = "default_category")]
    pub selected_category: String,
    #[serde(default)]
    pub selected_topics: BTreeSet<String>,
    #[serde(rename = "isCustomFeed", default)]
    pub custom_feed_enabled: bool,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

fn default_category() -> String {
    DEFAULT_CATEGORY.to_string()
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            selected_category: default_category(),
            selected_topics: BTreeSet::new(),
            custom_feed_enabled: false,
            last_updated: None,
        }
    }
}

impl Preferences {
    /// Topics only count on the general category with the custom feed switched on
    pub fn custom_topics(&self) -> Option<&BTreeSet<String>> {
        let active = self.selected_category == DEFAULT_CATEGORY
            && self.custom_feed_enabled
            && !self.selected_topics.is_empty();
        active.then_some(&self.selected_topics)
    }

    /// Set difference when present, union otherwise
    pub fn toggle_topic(&mut self, topic: &str) {
        if !self.selected_topics.remove(topic) {
            self.selected_topics.insert(topic.to_string());
        }
    }

    pub fn to_json(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parses a stored entry field by field; a missing, null or mistyped field
    /// falls back to its default without discarding the others
    pub fn from_json(raw: &str) -> anyhow::Result<Self> {
        let value: Value = serde_json::from_str(raw)?;
        let object = value
            .as_object()
            .ok_or_else(|| anyhow::anyhow!("stored preferences are not an object"))?;

        let selected_category = object
            .get("selectedDomain")
            .and_then(Value::as_str)
            .filter(|category| !category.is_empty())
            .map_or_else(default_category, str::to_string);

        let selected_topics = object
            .get("selectedTopics")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let custom_feed_enabled = object
            .get("isCustomFeed")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        let last_updated = object
            .get("lastUpdated")
            .and_then(|v| serde_json::from_value(v.clone()).ok());

        Ok(Self {
            selected_category,
            selected_topics,
            custom_feed_enabled,
            last_updated,
        })
    }
}

/// Client-owned key-value slot the feed page reads once and rewrites on every change
pub trait SettingsStore {
    fn load(&self) -> anyhow::Result<Option<Preferences>>;
    fn save(&mut self, preferences: &Preferences) -> anyhow::Result<()>;
}

/// In-process store; clones share the same slot
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    slot: Arc<Mutex<Option<String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the slot with a raw stored entry
    pub fn with_raw(raw: impl Into<String>) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Some(raw.into()))),
        }
    }

    pub fn raw(&self) -> Option<String> {
        self.slot.lock().ok().and_then(|slot| slot.clone())
    }
}

impl SettingsStore for MemoryStore {
    fn load(&self) -> anyhow::Result<Option<Preferences>> {
        match self.raw() {
            Some(raw) => Ok(Some(Preferences::from_json(&raw)?)),
            None => Ok(None),
        }
    }

    fn save(&mut self, preferences: &Preferences) -> anyhow::Result<()> {
        let raw = preferences.to_json()?;
        let mut slot = self
            .slot
            .lock()
            .map_err(|_| anyhow::anyhow!("preferences slot poisoned"))?;
        *slot = Some(raw);
        Ok(())
    }
}

/// The browser's copy of the preferences, carried in a cookie.
///
/// Reads come from the request `Cookie` header; a save produces the
/// `Set-Cookie` value to send back. Nothing is kept on the server.
#[derive(Debug, Clone, Default)]
pub struct CookieStore {
    stored: Option<String>,
    pending: Option<String>,
}

impl CookieStore {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let stored = headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| *name == STORAGE_KEY)
            .and_then(|(_, value)| urlencoding::decode(value).ok())
            .map(|decoded| decoded.into_owned());

        Self {
            stored,
            pending: None,
        }
    }

    /// `Set-Cookie` header value for the last save, if any
    pub fn set_cookie(&self) -> Option<String> {
        self.pending.as_ref().map(|raw| {
            format!(
                "{}={}; Path=/; Max-Age={}; SameSite=Lax",
                STORAGE_KEY,
                urlencoding::encode(raw),
                COOKIE_MAX_AGE_SECS
            )
        })
    }
}

impl SettingsStore for CookieStore {
    fn load(&self) -> anyhow::Result<Option<Preferences>> {
        match &self.stored {
            Some(raw) => Ok(Some(Preferences::from_json(raw)?)),
            None => Ok(None),
        }
    }

    fn save(&mut self, preferences: &Preferences) -> anyhow::Result<()> {
        let raw = preferences.to_json()?;
        self.stored = Some(raw.clone());
        self.pending = Some(raw);
        Ok(())
    }
}
