//! Entity fetcher
//!
//! Navigates to one page and classifies the outcome:
//! - `Success` - the page loaded
//! - `FatalRedirect` - the site sent us to its login page
//! - `TransientError` - anything else went wrong; worth retrying later
//!
//! The login gate is detected on two paths. While the navigation runs, the
//! response event stream is watched for a 301/302; the transport may follow
//! the redirect before the navigation returns, so the final URL alone is not
//! enough. Once the navigation settles, the final URL and any
//! `<meta http-equiv="refresh">` target are checked for the login marker.

use crate::config::{SessionConfig, CODE_PLACEHOLDER};
use crate::crawler::record::LinkId;
use crate::crawler::transport::{LoadedPage, PageTransport, ResponseEvent, TransportError};
use scraper::Selector;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use url::Url;

/// Result of a fetch operation
#[derive(Debug)]
pub enum FetchOutcome {
    /// The page loaded and can be extracted
    Success(LoadedPage),

    /// The navigation was routed to the authentication page
    FatalRedirect(String),

    /// The navigation failed for a reason unrelated to authentication
    TransientError(FetchError),
}

/// Why a fetch failed transiently
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("navigation timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("HTTP {status} from {url}")]
    HttpStatus { status: u16, url: String },

    #[error("cannot build detail URL for {link}: {source}")]
    InvalidUrl {
        link: LinkId,
        source: url::ParseError,
    },
}

/// Recognizes the site's authentication page
#[derive(Debug, Clone)]
pub struct LoginGate {
    marker: String,
    strict: bool,
}

impl LoginGate {
    /// `marker` is matched case-insensitively against URLs. With `strict`, any
    /// 301/302 counts as the gate regardless of where it points.
    pub fn new(marker: &str, strict: bool) -> Self {
        Self {
            marker: marker.to_lowercase(),
            strict,
        }
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(&config.login_marker, config.strict_redirects)
    }

    /// Returns true if the URL points at the login page
    pub fn matches_url(&self, url: &str) -> bool {
        url.to_lowercase().contains(&self.marker)
    }

    /// Checks one observed response; returns the redirect target if it is the gate
    pub fn check_event(&self, event: &ResponseEvent) -> Option<String> {
        if !matches!(event.status, 301 | 302) {
            return None;
        }

        let target = event
            .location()
            .map(|url| url.to_string())
            .unwrap_or_else(|| event.url.to_string());

        if self.strict || self.matches_url(&target) {
            Some(target)
        } else {
            None
        }
    }

    /// Checks a settled page: its final URL, then any meta refresh target
    pub fn check_page(&self, page: &LoadedPage) -> Option<String> {
        if self.matches_url(page.url().as_str()) {
            return Some(page.url().to_string());
        }

        meta_refresh_target(page)
            .map(|url| url.to_string())
            .filter(|target| self.matches_url(target))
    }
}

/// Extracts the target of a `<meta http-equiv="refresh" content="0; url=...">`
fn meta_refresh_target(page: &LoadedPage) -> Option<Url> {
    let selector = Selector::parse("meta[http-equiv]").ok()?;
    let document = page.document();

    let target = document
        .select(&selector)
        .filter(|meta| {
            meta.value()
                .attr("http-equiv")
                .is_some_and(|v| v.eq_ignore_ascii_case("refresh"))
        })
        .filter_map(|meta| meta.value().attr("content"))
        .find_map(|content| {
            let start = content.to_ascii_lowercase().find("url=")? + 4;
            let raw = content[start..]
                .trim()
                .trim_matches(|c| c == '\'' || c == '"');
            page.url().join(raw).ok()
        });
    target
}

/// Builds detail page URLs from link identifiers
#[derive(Debug, Clone)]
pub struct DetailUrlTemplate {
    base: Url,
    template: String,
}

impl DetailUrlTemplate {
    /// `template` is resolved against `base` after substituting the code
    pub fn new(base: Url, template: impl Into<String>) -> Self {
        Self {
            base,
            template: template.into(),
        }
    }

    pub fn resolve(&self, link: &LinkId) -> Result<Url, url::ParseError> {
        let code: String = url::form_urlencoded::byte_serialize(link.as_str().as_bytes()).collect();
        self.base.join(&self.template.replace(CODE_PLACEHOLDER, &code))
    }
}

enum Race {
    Redirected(String),
    Settled(Result<LoadedPage, TransportError>),
}

/// Fetches pages through a [`PageTransport`] and classifies the outcome
#[derive(Debug, Clone)]
pub struct EntityFetcher<T> {
    transport: T,
    gate: LoginGate,
    detail_urls: DetailUrlTemplate,
    timeout: Duration,
}

impl<T: PageTransport> EntityFetcher<T> {
    pub fn new(
        transport: T,
        gate: LoginGate,
        detail_urls: DetailUrlTemplate,
        timeout: Duration,
    ) -> Self {
        Self {
            transport,
            gate,
            detail_urls,
            timeout,
        }
    }

    /// Fetches the detail page for one link
    pub async fn fetch(&self, link: &LinkId) -> FetchOutcome {
        match self.detail_urls.resolve(link) {
            Ok(url) => self.fetch_url(&url).await,
            Err(source) => FetchOutcome::TransientError(FetchError::InvalidUrl {
                link: link.clone(),
                source,
            }),
        }
    }

    /// Navigates to `url`, racing the response stream against completion
    pub async fn fetch_url(&self, url: &Url) -> FetchOutcome {
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let navigation = self.transport.navigate(url, events_tx);
        tokio::pin!(navigation);

        let raced = tokio::time::timeout(self.timeout, async {
            loop {
                tokio::select! {
                    biased;
                    Some(event) = events_rx.recv() => {
                        if let Some(target) = self.gate.check_event(&event) {
                            return Race::Redirected(target);
                        }
                    }
                    result = &mut navigation => return Race::Settled(result),
                }
            }
        })
        .await;

        let result = match raced {
            Err(_) => return FetchOutcome::TransientError(FetchError::Timeout(self.timeout)),
            Ok(Race::Redirected(target)) => return FetchOutcome::FatalRedirect(target),
            Ok(Race::Settled(result)) => result,
        };

        // Events sent in the same poll that completed the navigation
        while let Ok(event) = events_rx.try_recv() {
            if let Some(target) = self.gate.check_event(&event) {
                return FetchOutcome::FatalRedirect(target);
            }
        }

        let page = match result {
            Ok(page) => page,
            Err(e) => return FetchOutcome::TransientError(e.into()),
        };

        if let Some(target) = self.gate.check_page(&page) {
            return FetchOutcome::FatalRedirect(target);
        }

        if !(200..300).contains(&page.status()) {
            return FetchOutcome::TransientError(FetchError::HttpStatus {
                status: page.status(),
                url: page.url().to_string(),
            });
        }

        FetchOutcome::Success(page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::transport::EventSender;
    use reqwest::header::{HeaderMap, HeaderValue, LOCATION};

    /// Replays canned events, then settles with a page, an error, or never
    struct ScriptedTransport {
        events: Vec<ResponseEvent>,
        settle: Settle,
    }

    enum Settle {
        Page(LoadedPage),
        RedirectLimit,
        Never,
    }

    impl PageTransport for ScriptedTransport {
        async fn navigate(
            &self,
            url: &Url,
            events: EventSender,
        ) -> Result<LoadedPage, TransportError> {
            for event in &self.events {
                let _ = events.send(event.clone());
                tokio::task::yield_now().await;
            }
            match &self.settle {
                Settle::Page(page) => Ok(page.clone()),
                Settle::RedirectLimit => Err(TransportError::RedirectLimit {
                    url: url.to_string(),
                    limit: 3,
                }),
                Settle::Never => std::future::pending().await,
            }
        }
    }

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn event(status: u16, at: &str, location: Option<&'static str>) -> ResponseEvent {
        let mut headers = HeaderMap::new();
        if let Some(location) = location {
            headers.insert(LOCATION, HeaderValue::from_static(location));
        }
        ResponseEvent {
            status,
            url: url(at),
            headers,
        }
    }

    fn page(at: &str, status: u16, body: &str) -> LoadedPage {
        LoadedPage::new(url(at), status, body)
    }

    fn fetcher(events: Vec<ResponseEvent>, settle: Settle) -> EntityFetcher<ScriptedTransport> {
        EntityFetcher::new(
            ScriptedTransport { events, settle },
            LoginGate::new("login", true),
            DetailUrlTemplate::new(url("https://example.org/clubs"), "/club?id={code}"),
            Duration::from_millis(200),
        )
    }

    #[test]
    fn test_detail_url_template() {
        let template =
            DetailUrlTemplate::new(url("https://example.org/list?page=1"), "/club?id={code}");
        let resolved = template.resolve(&LinkId::new("0042")).unwrap();
        assert_eq!(resolved.as_str(), "https://example.org/club?id=0042");
    }

    #[test]
    fn test_detail_url_template_encodes_code() {
        let template = DetailUrlTemplate::new(url("https://example.org/"), "/club?id={code}");
        let resolved = template.resolve(&LinkId::new("a&b")).unwrap();
        assert_eq!(resolved.as_str(), "https://example.org/club?id=a%26b");
    }

    #[test]
    fn test_gate_matches_url_case_insensitively() {
        let gate = LoginGate::new("Login", true);
        assert!(gate.matches_url("https://example.org/LOGIN.aspx"));
        assert!(!gate.matches_url("https://example.org/club?id=1"));
    }

    #[test]
    fn test_gate_ignores_non_redirects() {
        let gate = LoginGate::new("login", true);
        assert!(gate
            .check_event(&event(200, "https://example.org/", None))
            .is_none());
        assert!(gate
            .check_event(&event(307, "https://example.org/", Some("/login")))
            .is_none());
    }

    #[test]
    fn test_lenient_gate_needs_marker_in_target() {
        let gate = LoginGate::new("login", false);
        assert!(gate
            .check_event(&event(301, "http://example.org/a", Some("https://example.org/a")))
            .is_none());
        assert_eq!(
            gate.check_event(&event(302, "https://example.org/a", Some("/login")))
                .as_deref(),
            Some("https://example.org/login")
        );
    }

    #[test]
    fn test_gate_detects_meta_refresh() {
        let gate = LoginGate::new("login", true);
        let loaded = page(
            "https://example.org/club?id=1",
            200,
            r#"<html><head><meta http-equiv="Refresh" content="0; URL='/Login.aspx'"></head></html>"#,
        );
        assert_eq!(
            gate.check_page(&loaded).as_deref(),
            Some("https://example.org/Login.aspx")
        );
    }

    #[test]
    fn test_gate_ignores_unrelated_meta_refresh() {
        let gate = LoginGate::new("login", true);
        let loaded = page(
            "https://example.org/club?id=1",
            200,
            r#"<html><head><meta http-equiv="refresh" content="30"></head></html>"#,
        );
        assert!(gate.check_page(&loaded).is_none());
    }

    #[tokio::test]
    async fn test_fetch_success() {
        let loaded = page("https://example.org/club?id=1", 200, "<html></html>");
        let fetcher = fetcher(
            vec![event(200, "https://example.org/club?id=1", None)],
            Settle::Page(loaded),
        );

        let outcome = fetcher.fetch(&LinkId::new("1")).await;
        assert!(matches!(outcome, FetchOutcome::Success(_)));
    }

    #[tokio::test]
    async fn test_redirect_event_wins_before_navigation_settles() {
        let fetcher = fetcher(
            vec![event(302, "https://example.org/club?id=1", Some("/login"))],
            Settle::Never,
        );

        match fetcher.fetch(&LinkId::new("1")).await {
            FetchOutcome::FatalRedirect(target) => {
                assert_eq!(target, "https://example.org/login")
            }
            other => panic!("expected fatal redirect, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_followed_redirect_is_still_fatal() {
        let fetcher = fetcher(
            vec![
                event(301, "https://example.org/club?id=1", Some("/login")),
                event(200, "https://example.org/login", None),
            ],
            Settle::Page(page("https://example.org/login", 200, "<form></form>")),
        );

        assert!(matches!(
            fetcher.fetch(&LinkId::new("1")).await,
            FetchOutcome::FatalRedirect(_)
        ));
    }

    #[tokio::test]
    async fn test_final_url_with_marker_is_fatal() {
        let fetcher = fetcher(
            vec![event(200, "https://example.org/login?next=club", None)],
            Settle::Page(page("https://example.org/login?next=club", 200, "")),
        );

        assert!(matches!(
            fetcher.fetch(&LinkId::new("1")).await,
            FetchOutcome::FatalRedirect(_)
        ));
    }

    #[tokio::test]
    async fn test_transport_error_is_transient() {
        let fetcher = fetcher(vec![], Settle::RedirectLimit);

        assert!(matches!(
            fetcher.fetch(&LinkId::new("1")).await,
            FetchOutcome::TransientError(FetchError::Transport(
                TransportError::RedirectLimit { .. }
            ))
        ));
    }

    #[tokio::test]
    async fn test_server_error_is_transient() {
        let fetcher = fetcher(
            vec![event(500, "https://example.org/club?id=1", None)],
            Settle::Page(page("https://example.org/club?id=1", 500, "oops")),
        );

        assert!(matches!(
            fetcher.fetch(&LinkId::new("1")).await,
            FetchOutcome::TransientError(FetchError::HttpStatus { status: 500, .. })
        ));
    }

    #[tokio::test]
    async fn test_timeout_is_transient() {
        let fetcher = fetcher(vec![], Settle::Never);

        assert!(matches!(
            fetcher.fetch(&LinkId::new("1")).await,
            FetchOutcome::TransientError(FetchError::Timeout(_))
        ));
    }
}
