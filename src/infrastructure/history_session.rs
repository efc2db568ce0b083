//! Authenticated session against the history site
//!
//! Logs in once with the form's authenticity token, then serves history
//! pages and work pages through the shared cookie-carrying client. Status
//! codes are translated into `CrawlError` kinds here; nothing is retried at
//! this layer.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};
use url::Url;

use super::http_client::{HttpClient, HttpResponse};
use super::parsing::history_page_parser::parse_authenticity_token;
use super::parsing::{HistorySelectors, WorkDetailParser};
use crate::domain::{
    CrawlError, CrawlResult, PageFetcher, RawPage, WorkDetailFetcher, WorkDetails, WorkId,
};

/// Login credentials. Never persisted.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Logged-in session implementing the page and work-detail fetchers.
pub struct HistorySession {
    client: Arc<HttpClient>,
    base_url: Url,
    username: String,
    work_parser: WorkDetailParser,
}

impl HistorySession {
    /// Log in and return a ready session.
    pub async fn login(
        client: Arc<HttpClient>,
        base_url: &str,
        credentials: &Credentials,
        selectors: &HistorySelectors,
    ) -> CrawlResult<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| CrawlError::configuration(format!("invalid base url '{base_url}': {e}")))?;
        let login_url = join(&base_url, "users/login")?;

        let form_page = client.get(login_url.as_str()).await?;
        if !form_page.is_success() {
            return Err(classify_status(&form_page, login_url.as_str(), None));
        }
        let token = parse_authenticity_token(&form_page.body, selectors)?;

        let response = client
            .post_form(
                login_url.as_str(),
                &[
                    ("user[login]", credentials.username.as_str()),
                    ("user[password]", credentials.password.as_str()),
                    ("authenticity_token", token.as_str()),
                ],
            )
            .await?;

        // a successful login redirects; a failed one re-renders the form
        if response.status != 302 {
            return Err(CrawlError::authentication_failed(format!(
                "login for {} returned status {}",
                credentials.username, response.status
            )));
        }
        if response
            .location
            .as_deref()
            .is_some_and(|location| location.contains("/users/login"))
        {
            return Err(CrawlError::authentication_failed(
                "login redirected back to the login form",
            ));
        }

        info!("🔐 Logged in as {}", credentials.username);
        Ok(Self {
            client,
            base_url,
            username: credentials.username.clone(),
            work_parser: WorkDetailParser::new(&selectors.work)?,
        })
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn history_url(&self, page_number: u32) -> CrawlResult<Url> {
        let mut url = join(&self.base_url, &format!("users/{}/readings", self.username))?;
        url.query_pairs_mut()
            .append_pair("page", &page_number.to_string());
        Ok(url)
    }

    pub fn work_url(&self, work_id: &WorkId) -> CrawlResult<Url> {
        let mut url = join(&self.base_url, &format!("works/{work_id}"))?;
        url.query_pairs_mut().append_pair("view_adult", "true");
        Ok(url)
    }
}

#[async_trait]
impl PageFetcher for HistorySession {
    async fn fetch_page(&self, page_number: u32) -> CrawlResult<RawPage> {
        let url = self.history_url(page_number)?;
        let response = self.client.get(url.as_str()).await?;
        if !response.is_success() {
            return Err(classify_status(&response, url.as_str(), Some(page_number)));
        }
        debug!("Fetched history page {} ({} bytes)", page_number, response.body.len());
        Ok(RawPage::new(page_number, response.body))
    }
}

#[async_trait]
impl WorkDetailFetcher for HistorySession {
    async fn fetch_details(&self, work_id: &WorkId) -> CrawlResult<WorkDetails> {
        let url = self.work_url(work_id)?;
        let response = self.client.get(url.as_str()).await?;
        if !response.is_success() {
            return Err(match classify_status(&response, url.as_str(), None) {
                error @ (CrawlError::RateLimited { .. } | CrawlError::AuthenticationFailed { .. }) => {
                    error
                }
                other => CrawlError::per_record_fetch(work_id.as_str(), other.to_string()),
            });
        }
        Ok(self.work_parser.parse(&response.body))
    }
}

fn join(base: &Url, path: &str) -> CrawlResult<Url> {
    base.join(path)
        .map_err(|e| CrawlError::configuration(format!("cannot build url for '{path}': {e}")))
}

/// Map a non-2xx response onto the error taxonomy.
pub fn classify_status(response: &HttpResponse, url: &str, page: Option<u32>) -> CrawlError {
    match response.status {
        429 => CrawlError::RateLimited {
            page,
            retry_after: response.retry_after,
        },
        // authenticated pages bounce to the login form when the session dies
        302 | 401 | 403 => CrawlError::authentication_failed(format!(
            "{url} answered {} (session rejected)",
            response.status
        )),
        status => CrawlError::http_status(status, url),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::time::Duration;

    fn response(status: u16) -> HttpResponse {
        HttpResponse {
            status,
            location: None,
            retry_after: Some(Duration::from_secs(30)),
            body: String::new(),
        }
    }

    #[rstest]
    #[case(302)]
    #[case(401)]
    #[case(403)]
    fn test_rejected_session_is_authentication_failure(#[case] status: u16) {
        let error = classify_status(&response(status), "https://x/users/u/readings", Some(1));
        assert!(matches!(error, CrawlError::AuthenticationFailed { .. }));
    }

    #[test]
    fn test_429_is_rate_limited_with_hint() {
        let error = classify_status(&response(429), "https://x", Some(4));
        assert_eq!(
            error,
            CrawlError::RateLimited {
                page: Some(4),
                retry_after: Some(Duration::from_secs(30)),
            }
        );
    }

    #[test]
    fn test_other_statuses_are_transport() {
        let error = classify_status(&response(503), "https://x", None);
        assert!(matches!(error, CrawlError::Transport { status: Some(503), .. }));
        assert!(error.is_retryable());
    }

    #[test]
    fn test_urls() {
        let session = HistorySession {
            client: Arc::new(HttpClient::new(&super::super::config::HttpConfig::default()).unwrap()),
            base_url: Url::parse("https://archive.example/").unwrap(),
            username: "reader".into(),
            work_parser: WorkDetailParser::new(&HistorySelectors::default().work).unwrap(),
        };
        assert_eq!(
            session.history_url(3).unwrap().as_str(),
            "https://archive.example/users/reader/readings?page=3"
        );
        assert_eq!(
            session.work_url(&WorkId::new("99").unwrap()).unwrap().as_str(),
            "https://archive.example/works/99?view_adult=true"
        );
    }

    #[test]
    fn test_credentials_debug_hides_password() {
        let credentials = Credentials {
            username: "reader".into(),
            password: "hunter2".into(),
        };
        assert!(!format!("{credentials:?}").contains("hunter2"));
    }
}
