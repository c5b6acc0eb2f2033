//! Async page fetcher with UA-profile fallback and binary detection

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CACHE_CONTROL, USER_AGENT};
use reqwest::Client;
use tracing::{debug, warn};

use longform_types::{ExtractError, FetchedPage, PageFetcher, Result};

const DESKTOP_UA: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";
const FALLBACK_UA: &str = "Mozilla/5.0 (X11; Linux x86_64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

const BINARY_CONTENT_TYPE_MARKERS: &[&str] = &[
    "application/pdf",
    "application/octet-stream",
    "application/zip",
    "application/x-zip",
    "application/x-gzip",
    "application/gzip",
    "image/",
    "audio/",
    "video/",
];

const BLOCKED_MARKERS: &[&str] = &[
    "captcha",
    "verify you are human",
    "access denied",
    "request blocked",
    "cloudflare",
    "robot check",
    "are you a robot",
];

/// Whether a content type describes a payload we never decode as text.
pub fn is_binary_content_type(content_type: &str) -> bool {
    let lowered = content_type.to_lowercase();
    BINARY_CONTENT_TYPE_MARKERS
        .iter()
        .any(|marker| lowered.contains(marker))
}

/// Whether an HTML payload is anti-bot boilerplate rather than content.
pub fn is_probably_blocked_page(payload: &str, content_type: &str) -> bool {
    let lowered = payload.to_lowercase();
    if !content_type.contains("text/html") && !lowered.contains("<html") {
        return false;
    }
    BLOCKED_MARKERS.iter().any(|marker| lowered.contains(marker))
}

fn profile_headers(user_agent: &str, primary: bool) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_str(user_agent).unwrap());
    if primary {
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            ),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    } else {
        headers.insert(ACCEPT, HeaderValue::from_static("text/html,*/*;q=0.8"));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en;q=0.8"));
    }
    headers
}

/// Default `PageFetcher` over reqwest.
///
/// Performs up to two attempts with distinct UA profiles and a small
/// inter-attempt sleep; follows redirects; detects PDF payloads by magic
/// bytes and suppresses text decoding for binary bodies.
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .gzip(true)
            .brotli(true)
            .connect_timeout(Duration::from_secs(3))
            .build()
            .map_err(|e| ExtractError::FetchFailure(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    async fn attempt(&self, url: &str, timeout: Duration, primary: bool) -> Result<FetchedPage> {
        let user_agent = if primary { DESKTOP_UA } else { FALLBACK_UA };
        let response = self
            .client
            .get(url)
            .headers(profile_headers(user_agent, primary))
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| ExtractError::FetchFailure(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ExtractError::FetchFailure(format!(
                "HTTP status {}",
                status.as_u16()
            )));
        }

        let final_url = response.url().to_string();
        let headers: HashMap<String, String> = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_lowercase(),
                    value.to_str().unwrap_or_default().to_string(),
                )
            })
            .collect();
        let mut content_type = headers
            .get("content-type")
            .cloned()
            .unwrap_or_default()
            .to_lowercase();

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ExtractError::FetchFailure(e.to_string()))?;

        let is_pdf_payload = bytes.starts_with(b"%PDF-");
        if is_pdf_payload && !content_type.contains("application/pdf") {
            content_type = "application/pdf".into();
        }

        let payload = if is_pdf_payload || is_binary_content_type(&content_type) {
            String::new()
        } else {
            String::from_utf8_lossy(&bytes).into_owned()
        };

        Ok(FetchedPage {
            requested_url: url.to_string(),
            final_url,
            content_type,
            payload,
            status_code: status.as_u16(),
            headers,
        })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<FetchedPage> {
        let mut errors: Vec<String> = Vec::new();
        for (index, primary) in [true, false].into_iter().enumerate() {
            let attempt = index as u64 + 1;
            match self.attempt(url, timeout, primary).await {
                Ok(page) => {
                    debug!(%url, attempt, status = page.status_code, "fetched page");
                    return Ok(page);
                }
                Err(err) => {
                    warn!(%url, attempt, error = %err, "fetch attempt failed");
                    errors.push(format!("attempt={attempt}: {err}"));
                    tokio::time::sleep(Duration::from_millis(150 * attempt)).await;
                }
            }
        }
        let message = if errors.is_empty() {
            "unknown fetch error".to_string()
        } else {
            errors.join("; ")
        };
        Err(ExtractError::FetchFailure(message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn binary_content_types_are_detected() {
        assert!(is_binary_content_type("application/pdf"));
        assert!(is_binary_content_type("image/png"));
        assert!(!is_binary_content_type("text/html; charset=utf-8"));
    }

    #[test]
    fn blocked_page_detection_requires_html_payloads() {
        assert!(is_probably_blocked_page(
            "<html><body>Verify you are human</body></html>",
            "text/html"
        ));
        assert!(!is_probably_blocked_page("captcha", "application/json"));
    }

    #[tokio::test]
    async fn fetch_returns_text_payload_and_lowercased_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/post"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Content-Type", "text/html; charset=utf-8")
                    .insert_header("X-Custom", "kept")
                    .set_body_string("<html><body>hello</body></html>"),
            )
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new().unwrap();
        let page = fetcher
            .fetch(&format!("{}/post", server.uri()), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(page.status_code, 200);
        assert!(page.payload.contains("hello"));
        assert_eq!(page.headers.get("x-custom").map(String::as_str), Some("kept"));
    }

    #[tokio::test]
    async fn pdf_magic_bytes_override_content_type() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/doc"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Content-Type", "text/html")
                    .set_body_bytes(b"%PDF-1.7 binary".to_vec()),
            )
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new().unwrap();
        let page = fetcher
            .fetch(&format!("{}/doc", server.uri()), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(page.content_type, "application/pdf");
        assert!(page.payload.is_empty());
    }

    #[tokio::test]
    async fn fetch_retries_with_fallback_profile_on_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .and(wiremock::matchers::header("Accept-Language", "en-US,en;q=0.9"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .and(wiremock::matchers::header("Accept-Language", "en;q=0.8"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Content-Type", "text/html")
                    .set_body_string("<html>second profile</html>"),
            )
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new().unwrap();
        let page = fetcher
            .fetch(&format!("{}/flaky", server.uri()), Duration::from_secs(5))
            .await
            .unwrap();
        assert!(page.payload.contains("second profile"));
    }

    #[tokio::test]
    async fn fetch_failure_carries_attempt_trail() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gone"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new().unwrap();
        let err = fetcher
            .fetch(&format!("{}/gone", server.uri()), Duration::from_secs(5))
            .await
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("attempt=1"));
        assert!(message.contains("attempt=2"));
    }
}
