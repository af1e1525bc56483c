use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::Page;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::{debug, warn};
use url::Url;

use crate::config::CaptureConfig;
use crate::error::AppError;
use crate::store::Datastore;
use crate::types::{CaptureRecord, CaptureSummary};

/// Where captured markup lands. Seam so the persistence behavior is testable
/// without a database.
#[async_trait]
pub trait RecordSink: Send + Sync {
    async fn insert_capture(&self, url: &str, html: &str) -> Result<CaptureRecord, AppError>;
}

#[async_trait]
impl RecordSink for Datastore {
    async fn insert_capture(&self, url: &str, html: &str) -> Result<CaptureRecord, AppError> {
        Datastore::insert_capture(self, url, html).await
    }
}

/// Captures one page per call in a dedicated headless Chromium session.
///
/// Sessions are never shared or reused across calls; the semaphore bounds how
/// many run at once, and callers over the bound wait for a slot.
#[derive(Clone)]
pub struct CaptureService {
    cfg: CaptureConfig,
    sessions: Arc<Semaphore>,
}

impl CaptureService {
    pub fn new(cfg: CaptureConfig) -> Self {
        let sessions = Arc::new(Semaphore::new(cfg.max_sessions));
        Self { cfg, sessions }
    }

    /// Fetch the rendered markup of `url_raw` and persist exactly one record.
    ///
    /// Invalid input fails before any browser or datastore work happens.
    pub async fn capture(
        &self,
        sink: &dyn RecordSink,
        url_raw: &str,
    ) -> Result<CaptureSummary, AppError> {
        let target = validate_url(url_raw)?;
        let source = url_raw.trim();

        let _permit = self
            .sessions
            .acquire()
            .await
            .map_err(|_| AppError::Fetch("capture pool closed".into()))?;

        let html = self.fetch_rendered(&target).await?;
        persist(sink, source, &html).await
    }

    /// Launch an isolated browser, navigate, settle, read the document.
    /// The browser is torn down on every exit path; teardown failures are
    /// logged and never escalated.
    async fn fetch_rendered(&self, url: &Url) -> Result<String, AppError> {
        let (mut browser, mut handler) = Browser::launch(browser_config(&self.cfg)?)
            .await
            .map_err(|e| AppError::Fetch(format!("browser launch failed: {e}")))?;

        // Drain CDP messages until the browser goes away.
        let driver = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let result = self.drive_page(&browser, url).await;

        if let Err(e) = browser.close().await {
            warn!(error = %e, "browser close failed");
        }
        if timeout(Duration::from_secs(5), browser.wait()).await.is_err() {
            warn!("browser did not exit after close, killing it");
            let _ = browser.kill().await;
        }
        driver.abort();

        result
    }

    async fn drive_page(&self, browser: &Browser, url: &Url) -> Result<String, AppError> {
        let page = browser.new_page("about:blank").await.map_err(fetch_err)?;
        page.set_user_agent(self.cfg.user_agent.as_str())
            .await
            .map_err(fetch_err)?;

        timeout(self.cfg.nav_timeout, navigate(&page, url))
            .await
            .map_err(|_| {
                AppError::Fetch(format!(
                    "navigation to {url} timed out after {}s",
                    self.cfg.nav_timeout.as_secs()
                ))
            })??;

        // Let deferred scripts finish rendering before serializing.
        tokio::time::sleep(self.cfg.settle).await;

        page.content().await.map_err(fetch_err)
    }
}

async fn navigate(page: &Page, url: &Url) -> Result<(), AppError> {
    page.goto(url.as_str()).await.map_err(fetch_err)?;
    page.wait_for_navigation().await.map_err(fetch_err)?;
    Ok(())
}

/// The requested address must carry an explicit HTTP(S) scheme and parse as
/// an absolute URL.
pub fn validate_url(raw: &str) -> Result<Url, AppError> {
    let trimmed = raw.trim();
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return Err(AppError::Validation(
            "url must start with http:// or https://".into(),
        ));
    }
    Url::parse(trimmed).map_err(|e| AppError::Validation(format!("invalid url: {e}")))
}

/// Exactly one insert; the summary length is taken from the row that was
/// actually stored.
async fn persist(
    sink: &dyn RecordSink,
    url: &str,
    html: &str,
) -> Result<CaptureSummary, AppError> {
    let record = sink.insert_capture(url, html).await?;
    debug!(id = record.id, url, bytes = record.html.len(), "capture stored");
    Ok(CaptureSummary {
        url: record.url,
        html_length: record.html.len(),
    })
}

fn browser_config(cfg: &CaptureConfig) -> Result<BrowserConfig, AppError> {
    BrowserConfig::builder()
        .no_sandbox()
        .window_size(cfg.viewport_width, cfg.viewport_height)
        .args(vec!["--disable-gpu", "--disable-dev-shm-usage"])
        .build()
        .map_err(|e| AppError::Fetch(format!("browser config rejected: {e}")))
}

fn fetch_err(e: impl std::fmt::Display) -> AppError {
    AppError::Fetch(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::Mutex;

    struct FakeSink {
        rows: Mutex<Vec<(String, String)>>,
        fail: bool,
    }

    impl FakeSink {
        fn new() -> Self {
            Self {
                rows: Mutex::new(Vec::new()),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                rows: Mutex::new(Vec::new()),
                fail: true,
            }
        }

        fn row_count(&self) -> usize {
            self.rows.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl RecordSink for FakeSink {
        async fn insert_capture(
            &self,
            url: &str,
            html: &str,
        ) -> Result<CaptureRecord, AppError> {
            if self.fail {
                return Err(AppError::Persistence("insert rejected".into()));
            }
            let mut rows = self.rows.lock().unwrap();
            rows.push((url.to_string(), html.to_string()));
            Ok(CaptureRecord {
                id: rows.len() as i64,
                url: url.to_string(),
                html: html.to_string(),
                created_at: Utc::now(),
            })
        }
    }

    #[test]
    fn urls_without_http_scheme_are_rejected() {
        for bad in ["", "example.com", "ftp://example.com", "httpss://x", "file:///etc/passwd"] {
            assert!(
                matches!(validate_url(bad), Err(AppError::Validation(_))),
                "accepted {bad:?}"
            );
        }
    }

    #[test]
    fn http_and_https_urls_are_accepted() {
        assert!(validate_url("https://example.com").is_ok());
        assert!(validate_url("http://localhost:8000/page?q=1").is_ok());
        assert!(validate_url("  https://example.com  ").is_ok());
    }

    #[test]
    fn scheme_prefix_alone_is_not_enough() {
        assert!(matches!(
            validate_url("https://"),
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn invalid_url_never_reaches_the_sink() {
        let svc = CaptureService::new(CaptureConfig::default());
        let sink = FakeSink::new();

        let err = svc.capture(&sink, "not-a-url").await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(sink.row_count(), 0);
    }

    #[tokio::test]
    async fn summary_length_matches_the_stored_html() {
        let sink = FakeSink::new();
        let html = "<html><body>한국어 내용</body></html>";

        let summary = persist(&sink, "https://example.com", html).await.unwrap();
        assert_eq!(summary.url, "https://example.com");
        assert_eq!(summary.html_length, html.len());

        let rows = sink.rows.lock().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].1.len(), summary.html_length);
    }

    #[tokio::test]
    async fn insert_failures_surface_as_persistence_errors() {
        let sink = FakeSink::failing();
        let err = persist(&sink, "https://example.com", "<html></html>")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Persistence(_)));
    }

    #[test]
    fn session_bound_comes_from_config() {
        let cfg = CaptureConfig {
            max_sessions: 2,
            ..CaptureConfig::default()
        };
        let svc = CaptureService::new(cfg);
        assert_eq!(svc.sessions.available_permits(), 2);
    }
}
