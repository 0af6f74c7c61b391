use std::future::Future;
use std::time::Duration;

use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::config::Config;
use crate::error::NewsError;

pub const DEFAULT_CATEGORY: &str = "general";

/// Placeholder the upstream provider leaves behind for taken-down articles
pub const REMOVED_PLACEHOLDER: &str = "[Removed]";

/// Query accepted by `/api/news` and issued by the feed page
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewsRequest {
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub q: Option<String>,
}

impl NewsRequest {
    pub fn headlines(category: impl Into<String>) -> Self {
        Self {
            category: Some(category.into()),
            q: None,
        }
    }

    pub fn search(category: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            category: Some(category.into()),
            q: Some(query.into()),
        }
    }

    pub fn category(&self) -> &str {
        self.category
            .as_deref()
            .filter(|c| !c.is_empty())
            .unwrap_or(DEFAULT_CATEGORY)
    }

    pub fn query(&self) -> Option<&str> {
        self.q.as_deref().filter(|q| !q.is_empty())
    }

    /// A search query always wins over the category
    pub fn endpoint(&self) -> Endpoint<'_> {
        match self.query() {
            Some(query) => Endpoint::Everything { query },
            None => Endpoint::TopHeadlines {
                category: self.category(),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint<'a> {
    TopHeadlines { category: &'a str },
    Everything { query: &'a str },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    pub title: String,
    pub description: String,
    pub url: String,
    pub image_url: Option<String>,
    pub published_at: Option<String>,
    pub source_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsPayload {
    pub articles: Vec<Article>,
    pub total_results: u64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpstreamResponse {
    total_results: Option<u64>,
    articles: Option<Vec<UpstreamArticle>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpstreamArticle {
    pub title: Option<String>,
    pub description: Option<String>,
    pub url: Option<String>,
    pub url_to_image: Option<String>,
    pub published_at: Option<String>,
    pub source: Option<UpstreamSource>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpstreamSource {
    pub name: Option<String>,
}

fn is_displayable(text: Option<&str>) -> bool {
    matches!(text, Some(t) if !t.is_empty() && t != REMOVED_PLACEHOLDER)
}

impl UpstreamArticle {
    /// Converts to an [`Article`], or `None` when title or description is unusable
    pub fn into_article(self) -> Option<Article> {
        if !is_displayable(self.title.as_deref()) || !is_displayable(self.description.as_deref()) {
            return None;
        }

        Some(Article {
            title: self.title?,
            description: self.description?,
            url: self.url.unwrap_or_default(),
            image_url: self.url_to_image,
            published_at: self.published_at,
            source_name: self.source.and_then(|s| s.name),
        })
    }
}

pub fn filter_articles(articles: Vec<UpstreamArticle>) -> Vec<Article> {
    articles
        .into_iter()
        .filter_map(UpstreamArticle::into_article)
        .collect()
}

/// Anything that can answer a [`NewsRequest`]
pub trait NewsSource {
    fn fetch(
        &self,
        request: &NewsRequest,
    ) -> impl Future<Output = Result<NewsPayload, NewsError>> + Send;
}

pub struct Fetcher {
    client: Client,
    config: Config,
}

impl Fetcher {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let mut builder = Client::builder().user_agent(config.user_agent.clone());
        if let Some(secs) = config.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder.build()?;

        Ok(Self { client, config })
    }

    fn build_request(&self, endpoint: Endpoint<'_>, api_key: &str) -> RequestBuilder {
        let base = self.config.base_url.trim_end_matches('/');
        let page_size = self.config.page_size.to_string();

        match endpoint {
            Endpoint::TopHeadlines { category } => self
                .client
                .get(format!("{}/top-headlines", base))
                .query(&[
                    ("country", self.config.country.as_str()),
                    ("category", category),
                    ("apiKey", api_key),
                    ("pageSize", page_size.as_str()),
                ]),
            Endpoint::Everything { query } => self
                .client
                .get(format!("{}/everything", base))
                .query(&[
                    ("q", query),
                    ("sortBy", "publishedAt"),
                    ("language", self.config.language.as_str()),
                    ("apiKey", api_key),
                    ("pageSize", page_size.as_str()),
                ]),
        }
    }

    pub async fn fetch_news(&self, request: &NewsRequest) -> Result<NewsPayload, NewsError> {
        let api_key = self.config.api_key().ok_or(NewsError::MissingApiKey)?;

        let endpoint = request.endpoint();
        info!("Fetching news: {:?}", endpoint);

        let response = self.build_request(endpoint, api_key).send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;

        if !status.is_success() {
            let body = serde_json::from_slice::<Value>(&bytes)
                .unwrap_or_else(|_| json!({ "message": "Unknown API error" }));

            if status == StatusCode::UNAUTHORIZED {
                warn!("Upstream rejected the API key");
                return Err(NewsError::InvalidApiKey { details: body });
            }

            warn!("Upstream returned {}", status);
            return Err(NewsError::Upstream { status, body });
        }

        let upstream: UpstreamResponse = serde_json::from_slice(&bytes)?;
        let received = upstream.articles.as_ref().map_or(0, Vec::len);
        let articles = filter_articles(upstream.articles.unwrap_or_default());

        info!(
            "Received {} articles, kept {} after filtering",
            received,
            articles.len()
        );

        Ok(NewsPayload {
            articles,
            total_results: upstream.total_results.unwrap_or_default(),
        })
    }
}

impl NewsSource for Fetcher {
    async fn fetch(&self, request: &NewsRequest) -> Result<NewsPayload, NewsError> {
        self.fetch_news(request).await
    }
}
