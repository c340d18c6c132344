//! Page transport capability
//!
//! The transport performs one navigation and reports every HTTP exchange it
//! makes along the way on an event channel, so callers can react to a
//! response (e.g. a redirect) before the navigation settles.

use crate::config::SessionConfig;
use reqwest::header::{HeaderMap, LOCATION};
use reqwest::{redirect::Policy, Client};
use scraper::Html;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use url::Url;

/// One HTTP exchange observed during a navigation
#[derive(Debug, Clone)]
pub struct ResponseEvent {
    pub status: u16,
    pub url: Url,
    pub headers: HeaderMap,
}

impl ResponseEvent {
    /// The `Location` header resolved against the request URL, if present
    pub fn location(&self) -> Option<Url> {
        let raw = self.headers.get(LOCATION)?.to_str().ok()?;
        self.url.join(raw).ok()
    }
}

/// Sending half of the response event stream handed to a navigation
pub type EventSender = mpsc::UnboundedSender<ResponseEvent>;

/// A page whose navigation has settled
#[derive(Debug, Clone)]
pub struct LoadedPage {
    url: Url,
    status: u16,
    body: String,
}

impl LoadedPage {
    pub fn new(url: Url, status: u16, body: impl Into<String>) -> Self {
        Self {
            url,
            status,
            body: body.into(),
        }
    }

    /// The URL the navigation ended on
    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    /// Parses the body into a queryable DOM
    pub fn document(&self) -> Html {
        Html::parse_document(&self.body)
    }
}

/// Errors raised by a transport while navigating
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request to {url} failed: {source}")]
    Request { url: String, source: reqwest::Error },

    #[error("too many redirects from {url} (limit {limit})")]
    RedirectLimit { url: String, limit: u32 },

    #[error("invalid redirect from {url}: {reason}")]
    InvalidRedirect { url: String, reason: String },
}

/// Navigates to pages and streams the responses seen on the way
pub trait PageTransport {
    /// Loads `url`, emitting one [`ResponseEvent`] per HTTP exchange on `events`
    fn navigate(
        &self,
        url: &Url,
        events: EventSender,
    ) -> impl Future<Output = Result<LoadedPage, TransportError>> + Send;
}

/// Builds the HTTP client used for every navigation
///
/// Redirects are not followed by the client; [`HttpTransport`] follows them
/// itself so each hop shows up on the event stream. Cookies persist across
/// navigations, like one browser session.
pub fn build_http_client(config: &SessionConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.user_agent.as_str())
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::none())
        .cookie_store(true)
        .gzip(true)
        .brotli(true)
        .build()
}

/// [`PageTransport`] backed by a `reqwest` client
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    max_redirects: u32,
}

impl HttpTransport {
    pub fn new(config: &SessionConfig) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_http_client(config)?,
            max_redirects: config.max_redirects,
        })
    }

    pub fn with_client(client: Client, max_redirects: u32) -> Self {
        Self {
            client,
            max_redirects,
        }
    }
}

impl PageTransport for HttpTransport {
    async fn navigate(&self, url: &Url, events: EventSender) -> Result<LoadedPage, TransportError> {
        let mut current = url.clone();
        let mut hops = 0;

        loop {
            let response = self
                .client
                .get(current.clone())
                .send()
                .await
                .map_err(|source| TransportError::Request {
                    url: current.to_string(),
                    source,
                })?;

            let status = response.status();
            let event = ResponseEvent {
                status: status.as_u16(),
                url: current.clone(),
                headers: response.headers().clone(),
            };
            let next = event.location();

            // The receiver is gone once the caller has made up its mind
            let _ = events.send(event);

            if status.is_redirection() {
                let next = next.ok_or_else(|| TransportError::InvalidRedirect {
                    url: current.to_string(),
                    reason: format!("HTTP {} without a usable Location header", status),
                })?;

                hops += 1;
                if hops > self.max_redirects {
                    return Err(TransportError::RedirectLimit {
                        url: url.to_string(),
                        limit: self.max_redirects,
                    });
                }

                tracing::debug!("Following redirect {} -> {}", current, next);
                current = next;
                continue;
            }

            let body = response
                .text()
                .await
                .map_err(|source| TransportError::Request {
                    url: current.to_string(),
                    source,
                })?;

            return Ok(LoadedPage::new(current, status.as_u16(), body));
        }
    }
}
