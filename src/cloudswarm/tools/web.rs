//! Web search and page fetching for research agents.
//!
//! Two tools live here:
//!
//! - [`WebFetcher`] downloads a page and reduces it to its visible text
//!   (scripts and styles dropped, whitespace collapsed, cut at a word
//!   boundary once the character budget is spent).
//! - [`WebSearch`] queries the Google Custom Search JSON API and enriches
//!   every hit with the fetched body text of the linked page.
//!
//! ```ignore
//! use cloudswarm::config::SearchConfig;
//! use cloudswarm::tools::{WebFetcher, WebSearch};
//!
//! let text = WebFetcher::new().fetch("https://www.rust-lang.org").await?;
//!
//! let search = WebSearch::new(SearchConfig::from_env());
//! for hit in search.search("tokio process timeout", None).await? {
//!     println!("{} -> {} chars", hit.link, hit.body.len());
//! }
//! ```

use crate::cloudswarm::clients::http_pool::get_http_client;
use crate::cloudswarm::config::SearchConfig;
use reqwest::Client;
use scraper::Html;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;
use std::time::Duration;

const GOOGLE_SEARCH_ENDPOINT: &str = "https://customsearch.googleapis.com/customsearch/v1";

/// The Custom Search API refuses `num` above this value.
const MAX_RESULTS_PER_QUERY: usize = 10;

/// Pool entry shared by the page fetcher and the search client. Both talk to
/// arbitrary hosts, so they share one entry instead of one per base URL.
pub const WEB_POOL_KEY: &str = "cloudswarm::tools::web";

fn web_client() -> Client {
    get_http_client(WEB_POOL_KEY, Duration::from_secs(60)).unwrap_or_else(|e| {
        log::warn!("cloudswarm::tools::web: falling back to an unpooled client: {}", e);
        Client::new()
    })
}

/// Errors raised by the web tools
#[derive(Debug, Clone, PartialEq)]
pub enum WebError {
    /// The URL is malformed or uses a scheme other than http/https
    InvalidUrl(String),
    /// Transport failure or non-success status while fetching
    Fetch {
        url: String,
        message: String,
        retryable: bool,
    },
    /// Search credentials are not configured
    MissingCredentials,
    /// The search API answered with a non-success status
    Api { status: u16, body: String },
    /// The search API answered with something that is not the expected JSON
    Decode(String),
}

impl WebError {
    pub fn is_retryable(&self) -> bool {
        match self {
            WebError::Fetch { retryable, .. } => *retryable,
            WebError::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

impl fmt::Display for WebError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WebError::InvalidUrl(url) => write!(f, "Invalid URL: {}", url),
            WebError::Fetch { url, message, .. } => {
                write!(f, "Error fetching {}: {}", url, message)
            }
            WebError::MissingCredentials => write!(
                f,
                "API key or Search Engine ID not found in environment variables"
            ),
            WebError::Api { status, body } => {
                write!(f, "Error in API request: {} {}", status, body)
            }
            WebError::Decode(msg) => write!(f, "Unexpected search response: {}", msg),
        }
    }
}

impl Error for WebError {}

fn status_is_retryable(status: reqwest::StatusCode) -> bool {
    status.as_u16() == 429 || status.is_server_error()
}

/// Extract the visible text of an HTML document.
///
/// Text inside `script`, `style`, `noscript` and `template` elements is
/// skipped. Words are joined by single spaces and the output stops before the
/// first word that would push it past `max_chars`.
pub fn extract_text(html: &str, max_chars: usize) -> String {
    let document = Html::parse_document(html);
    let mut content = String::new();

    'nodes: for node in document.root_element().descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|a| {
            a.value().as_element().is_some_and(|e| {
                matches!(e.name(), "script" | "style" | "noscript" | "template")
            })
        });
        if hidden {
            continue;
        }
        for word in text.split_whitespace() {
            if content.chars().count() + word.chars().count() + 1 > max_chars {
                break 'nodes;
            }
            if !content.is_empty() {
                content.push(' ');
            }
            content.push_str(word);
        }
    }

    content
}

/// Downloads pages and reduces them to plain text.
#[derive(Clone, Debug)]
pub struct WebFetcher {
    client: Client,
    timeout: Duration,
    max_chars: usize,
}

impl WebFetcher {
    /// Defaults: 10 second timeout, 50 000 character budget.
    pub fn new() -> Self {
        Self {
            client: web_client(),
            timeout: Duration::from_secs(10),
            max_chars: 50_000,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_chars(mut self, max_chars: usize) -> Self {
        self.max_chars = max_chars;
        self
    }

    pub fn max_chars(&self) -> usize {
        self.max_chars
    }

    /// Fetch `url` and return its visible text.
    pub async fn fetch(&self, url: &str) -> Result<String, WebError> {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(WebError::InvalidUrl(url.to_string()));
        }

        let response = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| WebError::Fetch {
                url: url.to_string(),
                message: e.to_string(),
                retryable: e.is_timeout() || e.is_connect(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(WebError::Fetch {
                url: url.to_string(),
                message: format!("HTTP {}", status.as_u16()),
                retryable: status_is_retryable(status),
            });
        }

        let body = response.text().await.map_err(|e| WebError::Fetch {
            url: url.to_string(),
            message: format!("Failed to read response body: {}", e),
            retryable: true,
        })?;

        Ok(extract_text(&body, self.max_chars))
    }
}

impl Default for WebFetcher {
    fn default() -> Self {
        Self::new()
    }
}

/// One search result enriched with the linked page's text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub link: String,
    pub snippet: String,
    /// Visible text of the linked page; empty if the page could not be fetched
    pub body: String,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Deserialize)]
struct SearchItem {
    #[serde(default)]
    title: String,
    link: String,
    #[serde(default)]
    snippet: String,
}

/// Google Custom Search client.
#[derive(Clone, Debug)]
pub struct WebSearch {
    config: SearchConfig,
    fetcher: WebFetcher,
    endpoint: String,
}

impl WebSearch {
    pub fn new(config: SearchConfig) -> Self {
        let fetcher = WebFetcher::new().with_max_chars(config.max_chars);
        Self {
            config,
            fetcher,
            endpoint: GOOGLE_SEARCH_ENDPOINT.to_string(),
        }
    }

    /// Point the client at a different search endpoint (a proxy or a test server).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Replace the fetcher used to enrich hits.
    pub fn with_fetcher(mut self, fetcher: WebFetcher) -> Self {
        self.fetcher = fetcher;
        self
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    fn build_url(&self, query: &str, num: usize, key: &str, cx: &str) -> String {
        format!(
            "{}?key={}&cx={}&q={}&num={}",
            self.endpoint,
            urlencoding::encode(key),
            urlencoding::encode(cx),
            urlencoding::encode(query),
            num
        )
    }

    /// Run `query` and fetch the body of every hit, pausing `config.delay`
    /// between page fetches.
    ///
    /// Pages that fail to load still appear in the results with an empty body.
    pub async fn search(
        &self,
        query: &str,
        num_results: Option<usize>,
    ) -> Result<Vec<SearchHit>, WebError> {
        let (Some(key), Some(cx)) = (&self.config.api_key, &self.config.engine_id) else {
            return Err(WebError::MissingCredentials);
        };
        let num = num_results
            .unwrap_or(self.config.num_results)
            .clamp(1, MAX_RESULTS_PER_QUERY);

        let url = self.build_url(query, num, key, cx);
        let response = self
            .fetcher
            .client
            .get(&url)
            .timeout(self.config.request_timeout)
            .send()
            .await
            .map_err(|e| WebError::Fetch {
                url: self.endpoint.clone(),
                message: e.to_string(),
                retryable: true,
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            log::error!(
                "cloudswarm::tools::web: search API returned {}: {}",
                status.as_u16(),
                body
            );
            return Err(WebError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| WebError::Decode(e.to_string()))?;

        let mut hits = Vec::with_capacity(parsed.items.len());
        for (i, item) in parsed.items.into_iter().enumerate() {
            if i > 0 && !self.config.delay.is_zero() {
                tokio::time::sleep(self.config.delay).await;
            }
            let body = match self.fetcher.fetch(&item.link).await {
                Ok(text) => text,
                Err(e) => {
                    log::warn!("cloudswarm::tools::web: {}", e);
                    String::new()
                }
            };
            hits.push(SearchHit {
                title: item.title,
                link: item.link,
                snippet: item.snippet,
                body,
            });
        }

        log::debug!(
            "cloudswarm::tools::web: '{}' returned {} hits",
            query,
            hits.len()
        );
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloudswarm::clients::http_pool::is_pooled;

    #[test]
    fn test_fetcher_uses_the_shared_pool() {
        let _fetcher = WebFetcher::new();
        assert!(is_pooled(WEB_POOL_KEY));
    }

    #[test]
    fn test_extract_text_drops_scripts_and_styles() {
        let html = r#"<html><head><title>Plot</title><style>body{color:red}</style></head>
            <body><h1>Sine   wave</h1><script>var x = 1;</script>
            <p>Use <b>matplotlib</b>.</p></body></html>"#;
        assert_eq!(extract_text(html, 1000), "Plot Sine wave Use matplotlib .");
    }

    #[test]
    fn test_extract_text_cuts_at_word_boundary() {
        let html = "<p>alpha beta gamma delta</p>";
        // "alpha beta" is 10 chars; adding "gamma" needs 10 + 5 + 1.
        assert_eq!(extract_text(html, 15), "alpha beta");
        assert_eq!(extract_text(html, 16), "alpha beta gamma");
        assert_eq!(extract_text(html, 3), "");
    }

    #[test]
    fn test_search_url_is_encoded() {
        let search = WebSearch::new(SearchConfig::default()).with_endpoint("http://localhost/cse");
        let url = search.build_url("rust & tokio", 5, "k/1", "c x");
        assert_eq!(
            url,
            "http://localhost/cse?key=k%2F1&cx=c%20x&q=rust%20%26%20tokio&num=5"
        );
    }

    #[tokio::test]
    async fn test_missing_credentials() {
        let search = WebSearch::new(SearchConfig::default());
        let err = search.search("anything", None).await.unwrap_err();
        assert_eq!(err, WebError::MissingCredentials);
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_fetch_rejects_non_http_urls() {
        let err = WebFetcher::new().fetch("file:///etc/passwd").await.unwrap_err();
        assert!(matches!(err, WebError::InvalidUrl(_)));
    }
}
