//! Canvas REST client
//!
//! Plain authenticated GET wrapper. Collection endpoints are paginated by the
//! LMS via `Link` headers; every page is fetched and concatenated in order.

use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use reqwest::Client;
use reqwest::header::{AUTHORIZATION, LINK};
use serde_json::Value;
use tracing::{debug, warn};

use crate::LmsError;

/// Default Canvas API root
pub const DEFAULT_BASE_URL: &str = "https://umd.instructure.com/api/v1";

/// Default page size requested from collection endpoints
pub const DEFAULT_PER_PAGE: u32 = 100;

/// Default upper bound on pages followed for one collection
pub const DEFAULT_MAX_PAGES: usize = 500;

/// Construction parameters for [`LmsClient`]
#[derive(Clone)]
pub struct LmsClientConfig {
    /// API root, e.g. `https://school.instructure.com/api/v1`
    pub base_url: String,
    /// Bearer token
    pub token: String,
    /// Per-request timeout
    pub timeout: Duration,
    /// Page size for collection endpoints
    pub per_page: u32,
    /// Pages followed before a collection is treated as runaway
    pub max_pages: usize,
}

impl LmsClientConfig {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            token: token.into(),
            timeout: Duration::from_secs(30),
            per_page: DEFAULT_PER_PAGE,
            max_pages: DEFAULT_MAX_PAGES,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

impl std::fmt::Debug for LmsClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LmsClientConfig")
            .field("base_url", &self.base_url)
            .field("token", &"<redacted>")
            .field("timeout", &self.timeout)
            .field("per_page", &self.per_page)
            .field("max_pages", &self.max_pages)
            .finish()
    }
}

/// Read-only LMS client scoped to one credential
pub struct LmsClient {
    base_url: String,
    token: String,
    per_page: u32,
    max_pages: usize,
    http: Client,
}

impl LmsClient {
    /// Create a client; the credential is fixed for the client's lifetime
    pub fn new(config: LmsClientConfig) -> Result<Self, LmsError> {
        debug!(?config, "LmsClient::new: called");
        if config.token.trim().is_empty() {
            debug!("LmsClient::new: empty token");
            return Err(LmsError::MissingToken);
        }

        let http = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("courseoutline/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token,
            per_page: config.per_page.max(1),
            max_pages: config.max_pages.max(1),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }

    /// Issue one GET and return the decoded body plus the next-page link, if any
    async fn get_page(&self, url: &str, first: bool) -> Result<(Value, Option<String>), LmsError> {
        debug!(%url, %first, "get_page: called");
        let mut request = self
            .http
            .get(url)
            .header(AUTHORIZATION, format!("Bearer {}", self.token));
        if first {
            request = request.query(&[("per_page", self.per_page)]);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            debug!(status = %status.as_u16(), "get_page: API error");
            return Err(LmsError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let next = response
            .headers()
            .get(LINK)
            .and_then(|v| v.to_str().ok())
            .and_then(next_page_link);

        let body = response.text().await?;
        let value: Value = serde_json::from_str(&body)?;
        Ok((value, next))
    }

    /// GET a single object endpoint
    async fn get_object(&self, endpoint: &str) -> Result<Value, LmsError> {
        debug!(%endpoint, "get_object: called");
        let (value, _) = self.get_page(&self.url(endpoint), true).await?;
        if !value.is_object() {
            return Err(LmsError::UnexpectedShape {
                endpoint: endpoint.to_string(),
                expected: "object",
            });
        }
        Ok(value)
    }

    /// GET a collection endpoint, following pagination until exhausted
    ///
    /// A collection still linking to more pages after `max_pages` is an error;
    /// a truncated collection would silently lose records.
    async fn get_collection(&self, endpoint: &str) -> Result<Vec<Value>, LmsError> {
        debug!(%endpoint, "get_collection: called");
        let mut items = Vec::new();
        let mut next = Some(self.url(endpoint));
        let mut pages = 0;

        while let Some(url) = next.take() {
            let (value, link) = self.get_page(&url, pages == 0).await?;
            match value {
                Value::Array(page) => items.extend(page),
                _ => {
                    return Err(LmsError::UnexpectedShape {
                        endpoint: endpoint.to_string(),
                        expected: "array",
                    });
                }
            }
            pages += 1;
            if link.is_some() && pages >= self.max_pages {
                warn!(%endpoint, pages, "get_collection: page limit reached");
                return Err(LmsError::PageLimit {
                    endpoint: endpoint.to_string(),
                    pages,
                });
            }
            next = link;
        }

        debug!(%endpoint, pages, count = items.len(), "get_collection: done");
        Ok(items)
    }

    /// Courses visible to the token's user
    pub async fn get_courses(&self) -> Result<Vec<Value>, LmsError> {
        self.get_collection("/courses").await
    }

    /// Course metadata (name, course_code, teacher, ...)
    pub async fn get_course(&self, course_id: &str) -> Result<Value, LmsError> {
        self.get_object(&course_path(course_id, "")?).await
    }

    pub async fn get_course_modules(&self, course_id: &str) -> Result<Vec<Value>, LmsError> {
        self.get_collection(&course_path(course_id, "/modules")?).await
    }

    pub async fn get_course_assignments(&self, course_id: &str) -> Result<Vec<Value>, LmsError> {
        self.get_collection(&course_path(course_id, "/assignments")?).await
    }

    /// Quizzes; callers decide how to treat failure (many courses disable the tool)
    pub async fn get_course_quizzes(&self, course_id: &str) -> Result<Vec<Value>, LmsError> {
        self.get_collection(&course_path(course_id, "/quizzes")?).await
    }

    pub async fn get_course_files(&self, course_id: &str) -> Result<Vec<Value>, LmsError> {
        self.get_collection(&course_path(course_id, "/files")?).await
    }
}

impl std::fmt::Debug for LmsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LmsClient")
            .field("base_url", &self.base_url)
            .field("per_page", &self.per_page)
            .finish_non_exhaustive()
    }
}

/// Endpoint path under one course; the id must be a single path segment
fn course_path(course_id: &str, suffix: &str) -> Result<String, LmsError> {
    let id = course_id.trim();
    if id.is_empty() || id == "." || id == ".." || id.contains(['/', '?', '#', '\\']) {
        return Err(LmsError::InvalidCourseId(course_id.to_string()));
    }
    Ok(format!("/courses/{}{}", id, suffix))
}

/// Extract the `rel="next"` target from an RFC 8288 `Link` header
pub fn next_page_link(header: &str) -> Option<String> {
    static NEXT: OnceLock<Regex> = OnceLock::new();
    let re = NEXT.get_or_init(|| Regex::new(r#"<([^>]+)>\s*;[^,]*rel="?next"?"#).expect("valid regex"));
    re.captures(header).map(|c| c[1].to_string())
}
