use std::sync::Arc;

use askama::Template;
use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::{error, warn};

use crate::error::{NewsError, INVALID_KEY_MESSAGE, SETUP_MESSAGE};
use crate::feed::{
    format_published, is_known_category, FeedError, FeedPage, FeedStatus, AVAILABLE_TOPICS,
    CATEGORIES,
};
use crate::fetcher::{Fetcher, NewsPayload, NewsRequest};
use crate::preferences::CookieStore;

pub struct AppState {
    pub fetcher: Fetcher,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/news", get(news))
        .route("/settings", post(update_settings))
        .route("/health", get(health))
        .nest_service("/static", ServeDir::new("static"))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// Template structs
#[derive(Template)]
#[template(path = "index.html")]
pub struct IndexTemplate {
    pub categories: Vec<CategoryOption>,
    pub topics: Vec<TopicOption>,
    pub selected_category: String,
    pub custom_feed: bool,
    pub custom_feed_hints: Vec<String>,
    pub edition: String,
    pub search_query: String,
    pub search_mode: bool,
    pub error: Option<ErrorView>,
    pub articles: Vec<ArticleCard>,
    pub empty_message: Option<String>,
    pub retry_url: String,
}

pub struct CategoryOption {
    pub value: String,
    pub label: String,
    pub selected: bool,
}

pub struct TopicOption {
    pub name: String,
    pub checked: bool,
}

pub struct ErrorView {
    pub message: String,
    pub credential: bool,
}

pub struct ArticleCard {
    pub title: String,
    pub description: String,
    pub url: String,
    pub image_url: Option<String>,
    pub source: String,
    pub published: String,
}

impl IndexTemplate {
    fn from_page(page: &FeedPage<CookieStore>) -> Self {
        let preferences = page.preferences();

        let categories = CATEGORIES
            .iter()
            .map(|(value, label)| CategoryOption {
                value: value.to_string(),
                label: label.to_string(),
                selected: *value == preferences.selected_category,
            })
            .collect();

        let topics = AVAILABLE_TOPICS
            .iter()
            .map(|topic| TopicOption {
                name: topic.to_string(),
                checked: preferences.selected_topics.contains(*topic),
            })
            .collect();

        let error = match page.status() {
            FeedStatus::Failed(err) => Some(ErrorView {
                message: err.message().to_string(),
                credential: matches!(err, FeedError::Credential { .. }),
            }),
            _ => None,
        };

        let articles = page
            .articles()
            .iter()
            .map(|article| ArticleCard {
                title: article.title.clone(),
                description: article.description.clone(),
                url: article.url.clone(),
                image_url: article.image_url.clone().filter(|src| !src.is_empty()),
                source: article.source_name.clone().unwrap_or_default(),
                published: article
                    .published_at
                    .as_deref()
                    .map(format_published)
                    .unwrap_or_default(),
            })
            .collect();

        Self {
            categories,
            topics,
            selected_category: preferences.selected_category.clone(),
            custom_feed: preferences.custom_feed_enabled,
            custom_feed_hints: page
                .custom_feed_hints()
                .into_iter()
                .map(str::to_string)
                .collect(),
            edition: page.edition_label(),
            search_query: page.search_query().unwrap_or_default().to_string(),
            search_mode: page.is_search_mode(),
            error,
            articles,
            empty_message: page.empty_message(),
            // Each request mounts a fresh page, so following this link re-issues
            // the same fetch the way `FeedPage::retry` does within one page
            retry_url: page_url(page.search_query()),
        }
    }
}

// Wrapper for HTML responses
struct HtmlTemplate<T>(T);

impl<T: Template> IntoResponse for HtmlTemplate<T> {
    fn into_response(self) -> Response {
        match self.0.render() {
            Ok(html) => Html(html).into_response(),
            Err(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to render template: {}", err),
            )
                .into_response(),
        }
    }
}

/// JSON error responses of the news endpoint
pub struct ApiError(NewsError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self.0 {
            NewsError::MissingApiKey => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "error": NewsError::MissingApiKey.to_string(),
                    "message": SETUP_MESSAGE,
                })),
            )
                .into_response(),
            NewsError::InvalidApiKey { details } => (
                StatusCode::UNAUTHORIZED,
                Json(json!({
                    "error": "Invalid API key",
                    "message": INVALID_KEY_MESSAGE,
                    "details": details,
                })),
            )
                .into_response(),
            other => {
                error!("Failed to fetch news: {}", other);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({
                        "error": "Failed to fetch news",
                        "details": other.to_string(),
                    })),
                )
                    .into_response()
            }
        }
    }
}

impl From<NewsError> for ApiError {
    fn from(err: NewsError) -> Self {
        ApiError(err)
    }
}

fn page_url(search_query: Option<&str>) -> String {
    match search_query {
        Some(q) => format!("/?q={}", urlencoding::encode(q)),
        None => "/".to_string(),
    }
}

fn with_preferences_cookie(mut response: Response, store: &CookieStore) -> Response {
    if let Some(cookie) = store.set_cookie() {
        match HeaderValue::from_str(&cookie) {
            Ok(value) => {
                response.headers_mut().append(header::SET_COOKIE, value);
            }
            Err(e) => error!("Invalid preferences cookie: {}", e),
        }
    }
    response
}

// Route handlers
pub async fn news(
    State(state): State<Arc<AppState>>,
    Query(request): Query<NewsRequest>,
) -> Result<Json<NewsPayload>, ApiError> {
    let payload = state.fetcher.fetch_news(&request).await?;
    Ok(Json(payload))
}

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub q: Option<String>,
}

pub async fn index(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<PageQuery>,
) -> Response {
    let mut page = FeedPage::mount(CookieStore::from_headers(&headers));

    let mut fetch = None;
    if let Some(category) = query.category.as_deref().filter(|c| !c.is_empty()) {
        if !is_known_category(category) {
            warn!("Ignoring unknown category '{}'", category);
        } else if category != page.category() {
            fetch = Some(page.select_category(category));
        }
    }
    if let Some(search) = query.q.as_deref().and_then(|q| page.submit_search(q)) {
        fetch = Some(search);
    }
    let fetch = match fetch {
        Some(fetch) => fetch,
        None => page.refresh(),
    };

    page.execute(&state.fetcher, fetch).await;

    let response = HtmlTemplate(IndexTemplate::from_page(&page)).into_response();
    with_preferences_cookie(response, page.store())
}

#[derive(Debug, Default, Deserialize)]
pub struct SettingsForm {
    #[serde(default)]
    pub topic: Option<String>,
    /// `on` or `off`
    #[serde(default)]
    pub custom_feed: Option<String>,
    /// Active search, so the redirect stays in search mode
    #[serde(default)]
    pub q: Option<String>,
}

pub async fn update_settings(headers: HeaderMap, Form(form): Form<SettingsForm>) -> Response {
    let mut page = FeedPage::mount(CookieStore::from_headers(&headers));

    // The redirect target renders and fetches, so the returned requests are not run here
    if let Some(topic) = form.topic.as_deref() {
        if AVAILABLE_TOPICS.contains(&topic) {
            let _ = page.toggle_topic(topic);
        } else {
            warn!("Ignoring unknown topic '{}'", topic);
        }
    }
    if let Some(flag) = form.custom_feed.as_deref() {
        let _ = page.set_custom_feed(flag == "on");
    }

    let search = form.q.as_deref().map(str::trim).filter(|q| !q.is_empty());
    let response = Redirect::to(&page_url(search)).into_response();
    with_preferences_cookie(response, page.store())
}

pub async fn health() -> impl IntoResponse {
    Html("OK")
}
