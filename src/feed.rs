//! Feed page state machine.
//!
//! The page tracks the selected category, search mode, the custom topic set
//! and the status of the latest fetch. Every user action returns the
//! [`FetchRequest`] to run, if any; the outcome comes back through
//! [`FeedPage::resolve`], which drops results from superseded requests.

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use crate::error::NewsError;
use crate::fetcher::{Article, NewsPayload, NewsRequest, NewsSource, DEFAULT_CATEGORY};
use crate::preferences::{Preferences, SettingsStore};

/// Category values and their labels, in display order
pub const CATEGORIES: &[(&str, &str)] = &[
    ("general", "Home Feed"),
    ("technology", "Technology"),
    ("business", "Business"),
    ("health", "Health"),
    ("science", "Science"),
    ("sports", "Sports"),
    ("entertainment", "Entertainment"),
];

pub const AVAILABLE_TOPICS: &[&str] = &[
    "artificial intelligence",
    "climate change",
    "cryptocurrency",
    "space exploration",
    "renewable energy",
    "cybersecurity",
    "electric vehicles",
    "machine learning",
    "biotechnology",
    "quantum computing",
    "social media",
    "gaming",
    "startups",
    "stock market",
    "real estate",
];

pub fn is_known_category(category: &str) -> bool {
    CATEGORIES.iter().any(|(value, _)| *value == category)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedError {
    /// Missing or rejected credential; shown with setup steps and no retry
    Credential { message: String },
    Other { message: String },
}

impl FeedError {
    pub fn message(&self) -> &str {
        match self {
            FeedError::Credential { message } | FeedError::Other { message } => message,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, FeedError::Other { .. })
    }
}

impl From<NewsError> for FeedError {
    fn from(err: NewsError) -> Self {
        match err.remediation() {
            Some(message) => FeedError::Credential {
                message: message.to_string(),
            },
            None => FeedError::Other {
                message: err.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedStatus {
    Idle,
    Loading,
    Loaded(NewsPayload),
    Failed(FeedError),
}

/// A fetch issued by the page, tagged with its sequence token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub token: u64,
    pub request: NewsRequest,
}

pub struct FeedPage<S: SettingsStore> {
    store: S,
    preferences: Preferences,
    search_query: Option<String>,
    latest_token: u64,
    last_request: Option<NewsRequest>,
    status: FeedStatus,
}

impl<S: SettingsStore> FeedPage<S> {
    /// Reads the stored preferences once; anything unreadable means defaults
    pub fn mount(store: S) -> Self {
        let preferences = match store.load() {
            Ok(Some(preferences)) => preferences,
            Ok(None) => Preferences::default(),
            Err(e) => {
                warn!("Error loading user preferences: {}", e);
                Preferences::default()
            }
        };

        Self {
            store,
            preferences,
            search_query: None,
            latest_token: 0,
            last_request: None,
            status: FeedStatus::Idle,
        }
    }

    pub fn preferences(&self) -> &Preferences {
        &self.preferences
    }

    pub fn category(&self) -> &str {
        &self.preferences.selected_category
    }

    pub fn search_query(&self) -> Option<&str> {
        self.search_query.as_deref()
    }

    pub fn is_search_mode(&self) -> bool {
        self.search_query.is_some()
    }

    pub fn status(&self) -> &FeedStatus {
        &self.status
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn articles(&self) -> &[Article] {
        match &self.status {
            FeedStatus::Loaded(payload) => &payload.articles,
            _ => &[],
        }
    }

    /// Fetch for the current view: the search if one is active, else the category rule
    pub fn refresh(&mut self) -> FetchRequest {
        let request = match &self.search_query {
            Some(query) => NewsRequest::search(self.category(), query.as_str()),
            None => self.category_request(),
        };
        self.issue(request)
    }

    pub fn select_category(&mut self, category: &str) -> FetchRequest {
        self.preferences.selected_category = if category.is_empty() {
            DEFAULT_CATEGORY.to_string()
        } else {
            category.to_string()
        };
        self.persist();
        self.search_query = None;
        self.issue(self.category_request())
    }

    /// Blank queries are ignored
    pub fn submit_search(&mut self, query: &str) -> Option<FetchRequest> {
        let query = query.trim();
        if query.is_empty() {
            return None;
        }

        self.search_query = Some(query.to_string());
        Some(self.issue(NewsRequest::search(self.category(), query)))
    }

    pub fn clear_search(&mut self) -> FetchRequest {
        self.search_query = None;
        self.issue(self.category_request())
    }

    pub fn toggle_topic(&mut self, topic: &str) -> Option<FetchRequest> {
        self.preferences.toggle_topic(topic);
        self.persist();
        self.refetch_unless_searching()
    }

    pub fn set_custom_feed(&mut self, enabled: bool) -> Option<FetchRequest> {
        self.preferences.custom_feed_enabled = enabled;
        self.persist();
        self.refetch_unless_searching()
    }

    /// Re-issues the last fetch after a retryable failure
    pub fn retry(&mut self) -> Option<FetchRequest> {
        match &self.status {
            FeedStatus::Failed(err) if err.is_retryable() => {}
            _ => return None,
        }
        let request = self.last_request.clone()?;
        Some(self.issue(request))
    }

    /// Applies an outcome; returns false when a newer request has been issued since
    pub fn resolve(&mut self, token: u64, outcome: Result<NewsPayload, FeedError>) -> bool {
        if token != self.latest_token {
            info!(
                "Discarding stale response {} (latest is {})",
                token, self.latest_token
            );
            return false;
        }

        self.status = match outcome {
            Ok(payload) => FeedStatus::Loaded(payload),
            Err(err) => {
                error!("Failed to load news: {}", err.message());
                FeedStatus::Failed(err)
            }
        };
        true
    }

    /// Runs a fetch against `source` and resolves it
    pub async fn execute<N: NewsSource>(&mut self, source: &N, fetch: FetchRequest) -> bool {
        let outcome = source
            .fetch(&fetch.request)
            .await
            .map_err(FeedError::from);
        self.resolve(fetch.token, outcome)
    }

    /// Message for an empty successful fetch
    pub fn empty_message(&self) -> Option<String> {
        match &self.status {
            FeedStatus::Loaded(payload) if payload.articles.is_empty() => {
                Some(match &self.search_query {
                    Some(query) => format!(
                        "No articles found for \"{}\". Try a different search term.",
                        query
                    ),
                    None => "No articles found for this category.".to_string(),
                })
            }
            _ => None,
        }
    }

    pub fn edition_label(&self) -> String {
        match self.preferences.custom_topics() {
            Some(topics) => {
                let shown: Vec<&str> = topics.iter().take(2).map(String::as_str).collect();
                let more = if topics.len() > 2 { " • More" } else { "" };
                format!("Custom Edition • {}{}", shown.join(" • "), more)
            }
            None => "Daily Edition • Personalized News".to_string(),
        }
    }

    /// Notices shown under the custom-feed switch; each applies independently
    pub fn custom_feed_hints(&self) -> Vec<&'static str> {
        let mut hints = Vec::new();
        if !self.preferences.custom_feed_enabled {
            return hints;
        }
        if self.preferences.selected_category != DEFAULT_CATEGORY {
            hints.push(
                "Custom topics only apply to the Home Feed. \
                 Switch to Home Feed to see your personalized content.",
            );
        }
        if self.preferences.selected_topics.is_empty() {
            hints.push("Select at least one topic to enable custom feed.");
        }
        hints
    }

    fn category_request(&self) -> NewsRequest {
        match self.preferences.custom_topics() {
            Some(topics) => {
                let joined = topics
                    .iter()
                    .map(String::as_str)
                    .collect::<Vec<_>>()
                    .join(" OR ");
                NewsRequest::search(self.category(), joined)
            }
            None => NewsRequest::headlines(self.category()),
        }
    }

    fn refetch_unless_searching(&mut self) -> Option<FetchRequest> {
        if self.is_search_mode() {
            return None;
        }
        Some(self.issue(self.category_request()))
    }

    fn issue(&mut self, request: NewsRequest) -> FetchRequest {
        self.latest_token += 1;
        self.status = FeedStatus::Loading;
        self.last_request = Some(request.clone());
        FetchRequest {
            token: self.latest_token,
            request,
        }
    }

    fn persist(&mut self) {
        self.preferences.last_updated = Some(Utc::now());
        if let Err(e) = self.store.save(&self.preferences) {
            error!("Error saving user preferences: {}", e);
        }
    }
}

/// Formats an upstream timestamp like `Dec 9, 12:00 PM`
pub fn format_published(raw: &str) -> String {
    match DateTime::parse_from_rfc3339(raw) {
        Ok(date) => date.with_timezone(&Utc).format("%b %-d, %I:%M %p").to_string(),
        Err(_) => raw.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preferences::MemoryStore;
    use std::sync::Mutex;

    fn article(title: &str) -> Article {
        Article {
            title: title.to_string(),
            description: "Body".to_string(),
            url: "https://example.com".to_string(),
            image_url: None,
            published_at: None,
            source_name: Some("Source".to_string()),
        }
    }

    fn payload(titles: &[&str]) -> NewsPayload {
        NewsPayload {
            articles: titles.iter().map(|t| article(t)).collect(),
            total_results: titles.len() as u64,
        }
    }

    /// Source answering every request with the same canned outcome
    struct StubSource {
        outcome: fn() -> Result<NewsPayload, NewsError>,
        seen: Mutex<Vec<NewsRequest>>,
    }

    impl StubSource {
        fn new(outcome: fn() -> Result<NewsPayload, NewsError>) -> Self {
            Self {
                outcome,
                seen: Mutex::new(Vec::new()),
            }
        }

        fn seen(&self) -> Vec<NewsRequest> {
            self.seen.lock().unwrap().clone()
        }
    }

    impl NewsSource for StubSource {
        async fn fetch(&self, request: &NewsRequest) -> Result<NewsPayload, NewsError> {
            self.seen.lock().unwrap().push(request.clone());
            (self.outcome)()
        }
    }

    fn stored(raw: &str) -> MemoryStore {
        MemoryStore::with_raw(raw)
    }

    mod mount_tests {
        use super::*;

        #[test]
        fn test_defaults_without_stored_preferences() {
            let page = FeedPage::mount(MemoryStore::new());
            assert_eq!(page.category(), "general");
            assert!(page.preferences().selected_topics.is_empty());
            assert!(!page.preferences().custom_feed_enabled);
            assert_eq!(page.status(), &FeedStatus::Idle);
        }

        #[test]
        fn test_restores_stored_preferences() {
            let page = FeedPage::mount(stored(
                r#"{"selectedDomain":"technology","selectedTopics":["ai"],"isCustomFeed":true}"#,
            ));
            assert_eq!(page.category(), "technology");
            assert_eq!(
                page.preferences().selected_topics.iter().collect::<Vec<_>>(),
                vec!["ai"]
            );
            assert!(page.preferences().custom_feed_enabled);
        }

        #[test]
        fn test_bad_timestamp_keeps_stored_choices() {
            let page = FeedPage::mount(stored(
                r#"{"selectedDomain":"technology","selectedTopics":["ai"],"isCustomFeed":true,"lastUpdated":"Mon Dec 09 2024"}"#,
            ));
            assert_eq!(page.category(), "technology");
            assert!(page.preferences().selected_topics.contains("ai"));
            assert!(page.preferences().custom_feed_enabled);
            assert!(page.preferences().last_updated.is_none());
        }

        #[test]
        fn test_corrupt_entry_means_defaults() {
            let page = FeedPage::mount(stored("{{{"));
            assert_eq!(page.preferences(), &Preferences::default());
        }

        #[test]
        fn test_mount_does_not_write() {
            let store = MemoryStore::new();
            let _page = FeedPage::mount(store.clone());
            assert!(store.raw().is_none());
        }
    }

    mod request_rule_tests {
        use super::*;

        #[test]
        fn test_plain_category_uses_headlines() {
            let mut page = FeedPage::mount(MemoryStore::new());
            let fetch = page.select_category("business");
            assert_eq!(fetch.request, NewsRequest::headlines("business"));
        }

        #[test]
        fn test_custom_topics_on_general() {
            let mut page = FeedPage::mount(stored(
                r#"{"selectedDomain":"general","selectedTopics":["gaming","startups"],"isCustomFeed":true}"#,
            ));
            let fetch = page.refresh();
            assert_eq!(
                fetch.request,
                NewsRequest::search("general", "gaming OR startups")
            );
        }

        #[test]
        fn test_custom_topics_ignored_off_general() {
            let mut page = FeedPage::mount(stored(
                r#"{"selectedDomain":"science","selectedTopics":["gaming"],"isCustomFeed":true}"#,
            ));
            assert_eq!(page.refresh().request, NewsRequest::headlines("science"));
        }

        #[test]
        fn test_custom_topics_ignored_when_disabled() {
            let mut page = FeedPage::mount(stored(
                r#"{"selectedDomain":"general","selectedTopics":["gaming"],"isCustomFeed":false}"#,
            ));
            assert_eq!(page.refresh().request, NewsRequest::headlines("general"));
        }

        #[test]
        fn test_search_beats_custom_topics() {
            let mut page = FeedPage::mount(stored(
                r#"{"selectedDomain":"general","selectedTopics":["gaming"],"isCustomFeed":true}"#,
            ));
            let fetch = page.submit_search("volcano").unwrap();
            assert_eq!(fetch.request, NewsRequest::search("general", "volcano"));
        }

        #[test]
        fn test_search_keeps_category_attached() {
            let mut page = FeedPage::mount(MemoryStore::new());
            page.select_category("health");
            let fetch = page.submit_search("flu").unwrap();
            assert_eq!(fetch.request.category(), "health");
        }
    }

    mod transition_tests {
        use super::*;

        #[test]
        fn test_category_change_persists_and_leaves_search() {
            let store = MemoryStore::new();
            let mut page = FeedPage::mount(store.clone());
            page.submit_search("rust");
            assert!(page.is_search_mode());

            page.select_category("sports");

            assert!(!page.is_search_mode());
            let saved = store.load().unwrap().unwrap();
            assert_eq!(saved.selected_category, "sports");
            assert!(saved.last_updated.is_some());
        }

        #[test]
        fn test_blank_search_is_ignored() {
            let mut page = FeedPage::mount(MemoryStore::new());
            assert!(page.submit_search("   ").is_none());
            assert!(!page.is_search_mode());
            assert_eq!(page.status(), &FeedStatus::Idle);
        }

        #[test]
        fn test_search_enters_loading() {
            let mut page = FeedPage::mount(MemoryStore::new());
            page.submit_search("  eclipse ");
            assert_eq!(page.search_query(), Some("eclipse"));
            assert_eq!(page.status(), &FeedStatus::Loading);
        }

        #[test]
        fn test_clear_search_reverts_to_rule() {
            let mut page = FeedPage::mount(stored(
                r#"{"selectedDomain":"general","selectedTopics":["gaming"],"isCustomFeed":true}"#,
            ));
            page.submit_search("volcano");
            let fetch = page.clear_search();

            assert!(!page.is_search_mode());
            assert_eq!(fetch.request, NewsRequest::search("general", "gaming"));
        }

        #[test]
        fn test_topic_toggle_persists_and_refetches() {
            let store = MemoryStore::new();
            let mut page = FeedPage::mount(store.clone());
            page.set_custom_feed(true);

            let fetch = page.toggle_topic("gaming").unwrap();
            assert_eq!(fetch.request, NewsRequest::search("general", "gaming"));
            assert!(store
                .load()
                .unwrap()
                .unwrap()
                .selected_topics
                .contains("gaming"));

            let fetch = page.toggle_topic("gaming").unwrap();
            assert_eq!(fetch.request, NewsRequest::headlines("general"));
            assert!(store.load().unwrap().unwrap().selected_topics.is_empty());
        }

        #[test]
        fn test_toggles_in_search_mode_persist_without_fetch() {
            let store = MemoryStore::new();
            let mut page = FeedPage::mount(store.clone());
            page.submit_search("rust");

            assert!(page.toggle_topic("gaming").is_none());
            assert!(page.set_custom_feed(true).is_none());

            let saved = store.load().unwrap().unwrap();
            assert!(saved.custom_feed_enabled);
            assert!(saved.selected_topics.contains("gaming"));
        }

        #[test]
        fn test_reload_restores_latest_state() {
            let store = MemoryStore::new();
            {
                let mut page = FeedPage::mount(store.clone());
                page.select_category("technology");
                page.set_custom_feed(true);
                page.toggle_topic("ai");
            }

            let page = FeedPage::mount(store);
            assert_eq!(page.category(), "technology");
            assert!(page.preferences().custom_feed_enabled);
            assert!(page.preferences().selected_topics.contains("ai"));
        }
    }

    mod resolve_tests {
        use super::*;

        #[test]
        fn test_tokens_increase() {
            let mut page = FeedPage::mount(MemoryStore::new());
            let first = page.refresh();
            let second = page.select_category("science");
            assert!(second.token > first.token);
        }

        #[test]
        fn test_stale_response_is_discarded() {
            let mut page = FeedPage::mount(MemoryStore::new());
            let first = page.select_category("business");
            let second = page.select_category("sports");

            assert!(page.resolve(second.token, Ok(payload(&["Sports story"]))));
            assert!(!page.resolve(first.token, Ok(payload(&["Business story"]))));

            assert_eq!(page.articles()[0].title, "Sports story");
        }

        #[test]
        fn test_stale_response_does_not_end_loading() {
            let mut page = FeedPage::mount(MemoryStore::new());
            let first = page.refresh();
            let _second = page.refresh();

            page.resolve(first.token, Ok(payload(&["old"])));
            assert_eq!(page.status(), &FeedStatus::Loading);
        }

        #[test]
        fn test_credential_error_has_no_retry() {
            let mut page = FeedPage::mount(MemoryStore::new());
            let fetch = page.refresh();
            page.resolve(fetch.token, Err(NewsError::MissingApiKey.into()));

            match page.status() {
                FeedStatus::Failed(err) => {
                    assert!(!err.is_retryable());
                    assert!(err.message().contains("NEWS_API_KEY"));
                }
                other => panic!("expected failure, got {:?}", other),
            }
            assert!(page.retry().is_none());
        }

        #[test]
        fn test_other_error_retries_last_fetch() {
            let mut page = FeedPage::mount(MemoryStore::new());
            page.select_category("business");
            let fetch = page.submit_search("merger").unwrap();
            page.resolve(
                fetch.token,
                Err(FeedError::Other {
                    message: "boom".to_string(),
                }),
            );

            let retry = page.retry().unwrap();
            assert_eq!(retry.request, NewsRequest::search("business", "merger"));
            assert!(retry.token > fetch.token);
            assert_eq!(page.status(), &FeedStatus::Loading);
        }

        #[test]
        fn test_retry_without_failure_is_none() {
            let mut page = FeedPage::mount(MemoryStore::new());
            assert!(page.retry().is_none());

            let fetch = page.refresh();
            page.resolve(fetch.token, Ok(payload(&["fine"])));
            assert!(page.retry().is_none());
        }
    }

    mod execute_tests {
        use super::*;

        #[tokio::test]
        async fn test_execute_loads_payload() {
            let source = StubSource::new(|| Ok(payload(&["One", "Two"])));
            let mut page = FeedPage::mount(MemoryStore::new());

            let fetch = page.select_category("business");
            assert!(page.execute(&source, fetch).await);

            assert_eq!(page.articles().len(), 2);
            assert_eq!(source.seen(), vec![NewsRequest::headlines("business")]);
        }

        #[tokio::test]
        async fn test_execute_maps_invalid_key() {
            let source = StubSource::new(|| {
                Err(NewsError::InvalidApiKey {
                    details: serde_json::Value::Null,
                })
            });
            let mut page = FeedPage::mount(MemoryStore::new());

            let fetch = page.refresh();
            page.execute(&source, fetch).await;

            assert!(matches!(
                page.status(),
                FeedStatus::Failed(FeedError::Credential { .. })
            ));
        }

        #[tokio::test]
        async fn test_execute_superseded_fetch_is_ignored() {
            let source = StubSource::new(|| Ok(payload(&["Late"])));
            let mut page = FeedPage::mount(MemoryStore::new());

            let first = page.refresh();
            let _second = page.select_category("health");

            assert!(!page.execute(&source, first).await);
            assert_eq!(page.status(), &FeedStatus::Loading);
        }
    }

    mod presentation_tests {
        use super::*;

        #[test]
        fn test_empty_message_category_mode() {
            let mut page = FeedPage::mount(MemoryStore::new());
            let fetch = page.refresh();
            page.resolve(fetch.token, Ok(payload(&[])));
            assert_eq!(
                page.empty_message().as_deref(),
                Some("No articles found for this category.")
            );
        }

        #[test]
        fn test_empty_message_search_mode() {
            let mut page = FeedPage::mount(MemoryStore::new());
            let fetch = page.submit_search("zebra").unwrap();
            page.resolve(fetch.token, Ok(payload(&[])));
            assert_eq!(
                page.empty_message().as_deref(),
                Some("No articles found for \"zebra\". Try a different search term.")
            );
        }

        #[test]
        fn test_no_empty_message_with_articles() {
            let mut page = FeedPage::mount(MemoryStore::new());
            let fetch = page.refresh();
            page.resolve(fetch.token, Ok(payload(&["story"])));
            assert!(page.empty_message().is_none());
        }

        #[test]
        fn test_edition_label() {
            let page = FeedPage::mount(MemoryStore::new());
            assert_eq!(page.edition_label(), "Daily Edition • Personalized News");

            let page = FeedPage::mount(stored(
                r#"{"selectedTopics":["gaming","startups","biotechnology"],"isCustomFeed":true}"#,
            ));
            assert_eq!(
                page.edition_label(),
                "Custom Edition • biotechnology • gaming • More"
            );
        }

        #[test]
        fn test_custom_feed_hints() {
            let page = FeedPage::mount(stored(r#"{"isCustomFeed":true}"#));
            assert_eq!(
                page.custom_feed_hints(),
                vec!["Select at least one topic to enable custom feed."]
            );

            let page = FeedPage::mount(stored(
                r#"{"selectedDomain":"sports","selectedTopics":["gaming"],"isCustomFeed":true}"#,
            ));
            let hints = page.custom_feed_hints();
            assert_eq!(hints.len(), 1);
            assert!(hints[0].contains("Home Feed"));

            let page = FeedPage::mount(stored(
                r#"{"selectedDomain":"general","selectedTopics":["gaming"],"isCustomFeed":true}"#,
            ));
            assert!(page.custom_feed_hints().is_empty());

            let page = FeedPage::mount(MemoryStore::new());
            assert!(page.custom_feed_hints().is_empty());
        }

        #[test]
        fn test_both_hints_off_home_without_topics() {
            let page = FeedPage::mount(stored(
                r#"{"selectedDomain":"sports","selectedTopics":[],"isCustomFeed":true}"#,
            ));
            let hints = page.custom_feed_hints();
            assert_eq!(hints.len(), 2);
            assert!(hints[0].contains("only apply to the Home Feed"));
            assert_eq!(hints[1], "Select at least one topic to enable custom feed.");
        }

        #[test]
        fn test_format_published() {
            assert_eq!(format_published("2024-12-09T15:04:00Z"), "Dec 9, 03:04 PM");
            assert_eq!(format_published("yesterday"), "yesterday");
        }

        #[test]
        fn test_category_catalog() {
            assert!(is_known_category("general"));
            assert!(is_known_category("entertainment"));
            assert!(!is_known_category("politics"));
            assert_eq!(AVAILABLE_TOPICS.len(), 15);
        }
    }
}
