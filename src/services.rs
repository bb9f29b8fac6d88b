//! External collaborators of the pipeline: the extraction service and the
//! result upload service.
//!
//! Both are opaque to the pipeline: extraction is assumed idempotent and
//! side-effect-free for a given payload (this underlies caching
//! correctness), and upload failures are independent of extraction.
//! Trait-based DI keeps the pipeline fully testable with the mock
//! implementations at the bottom of this module.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

// ═══════════════════════════════════════════════════════════
// Extraction result
// ═══════════════════════════════════════════════════════════

/// Structured result of extracting one document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedDocument {
    /// Full concatenated text.
    pub text: String,
    /// Per-page breakdown.
    pub pages: Vec<ExtractedPage>,
    pub num_pages: usize,
    /// Tokens consumed by the extraction call (drives cost accounting and
    /// the per-minute token budget).
    pub tokens_used: u64,
}

/// One extracted page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedPage {
    pub page_number: usize,
    pub text: String,
}

// ═══════════════════════════════════════════════════════════
// Errors
// ═══════════════════════════════════════════════════════════

/// Errors from the external services.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ServiceError {
    #[error("Extraction failed: {0}")]
    Extraction(String),

    #[error("Upload failed: {0}")]
    Upload(String),

    #[error("Cannot reach service at {0}")]
    Connection(String),

    #[error("Service returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Malformed service response: {0}")]
    InvalidResponse(String),
}

// ═══════════════════════════════════════════════════════════
// Traits
// ═══════════════════════════════════════════════════════════

/// Extracts structured text from raw document bytes.
#[async_trait]
pub trait ExtractionService: Send + Sync {
    async fn extract(&self, payload: &[u8]) -> Result<ExtractedDocument, ServiceError>;
}

/// Persists a processed result and returns its location.
#[async_trait]
pub trait UploadService: Send + Sync {
    async fn store(&self, bytes: &[u8], name: &str) -> Result<String, ServiceError>;
}

// ═══════════════════════════════════════════════════════════
// HTTP implementations
// ═══════════════════════════════════════════════════════════

/// HTTP client for a remote extraction endpoint.
pub struct HttpExtractionService {
    base_url: String,
    client: reqwest::Client,
    timeout_secs: u64,
}

impl HttpExtractionService {
    pub fn new(base_url: &str, timeout_secs: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_default();

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            timeout_secs,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl ExtractionService for HttpExtractionService {
    async fn extract(&self, payload: &[u8]) -> Result<ExtractedDocument, ServiceError> {
        let url = format!("{}/extract", self.base_url);

        let response = self
            .client
            .post(&url)
            .header("content-type", "application/pdf")
            .body(payload.to_vec())
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    ServiceError::Connection(self.base_url.clone())
                } else if e.is_timeout() {
                    ServiceError::Extraction(format!(
                        "request timed out after {}s",
                        self.timeout_secs
                    ))
                } else {
                    ServiceError::Extraction(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::Http {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<ExtractedDocument>()
            .await
            .map_err(|e| ServiceError::InvalidResponse(e.to_string()))
    }
}

/// HTTP client for a remote blob store.
pub struct HttpUploadService {
    base_url: String,
    client: reqwest::Client,
}

/// Response body from the store endpoint.
#[derive(Deserialize)]
struct StoreResponse {
    url: String,
}

impl HttpUploadService {
    pub fn new(base_url: &str, timeout_secs: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_default();

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }
}

#[async_trait]
impl UploadService for HttpUploadService {
    async fn store(&self, bytes: &[u8], name: &str) -> Result<String, ServiceError> {
        let url = format!("{}/store", self.base_url);

        let response = self
            .client
            .put(&url)
            .query(&[("name", name)])
            .body(bytes.to_vec())
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    ServiceError::Connection(self.base_url.clone())
                } else {
                    ServiceError::Upload(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: StoreResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::InvalidResponse(e.to_string()))?;
        Ok(parsed.url)
    }
}

// ═══════════════════════════════════════════════════════════
// Mock implementations
// ═══════════════════════════════════════════════════════════

/// Scriptable extraction service for tests and offline development.
///
/// Fails the first `fail_first` calls, then succeeds with a fixed result.
/// An optional per-call delay makes concurrency observable in tests.
pub struct MockExtractionService {
    text: String,
    tokens_used: u64,
    delay_ms: u64,
    fail_first: u32,
    fail_payload_fragments: Vec<Vec<u8>>,
    calls: AtomicU32,
}

impl MockExtractionService {
    pub fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
            tokens_used: 100,
            delay_ms: 0,
            fail_first: 0,
            fail_payload_fragments: Vec::new(),
            calls: AtomicU32::new(0),
        }
    }

    pub fn with_tokens(mut self, tokens_used: u64) -> Self {
        self.tokens_used = tokens_used;
        self
    }

    pub fn with_delay_ms(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }

    /// Fail the first `n` calls with an extraction error.
    pub fn failing_first(mut self, n: u32) -> Self {
        self.fail_first = n;
        self
    }

    /// Fail every call.
    pub fn always_failing(self) -> Self {
        self.failing_first(u32::MAX)
    }

    /// Fail every call whose payload contains `fragment`.
    pub fn failing_payload_containing(mut self, fragment: &str) -> Self {
        self.fail_payload_fragments.push(fragment.as_bytes().to_vec());
        self
    }

    /// How many extraction calls were made.
    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExtractionService for MockExtractionService {
    async fn extract(&self, payload: &[u8]) -> Result<ExtractedDocument, ServiceError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);

        if self.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
        }

        if call < self.fail_first {
            return Err(ServiceError::Extraction(format!(
                "scripted failure on call {call}"
            )));
        }

        let poisoned = self.fail_payload_fragments.iter().any(|fragment| {
            !fragment.is_empty()
                && payload
                    .windows(fragment.len())
                    .any(|window| window == fragment.as_slice())
        });
        if poisoned {
            return Err(ServiceError::Extraction("scripted payload failure".into()));
        }

        Ok(ExtractedDocument {
            text: self.text.clone(),
            pages: vec![ExtractedPage {
                page_number: 1,
                text: self.text.clone(),
            }],
            num_pages: 1,
            tokens_used: self.tokens_used + payload.len() as u64 / 100,
        })
    }
}

/// Scriptable upload service for tests.
pub struct MockUploadService {
    fail_names: Vec<String>,
    calls: AtomicU32,
}

impl MockUploadService {
    pub fn new() -> Self {
        Self {
            fail_names: Vec::new(),
            calls: AtomicU32::new(0),
        }
    }

    /// Fail uploads whose name contains any of the given fragments.
    pub fn failing_names(mut self, names: &[&str]) -> Self {
        self.fail_names = names.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for MockUploadService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UploadService for MockUploadService {
    async fn store(&self, _bytes: &[u8], name: &str) -> Result<String, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self.fail_names.iter().any(|f| name.contains(f.as_str())) {
            return Err(ServiceError::Upload(format!("scripted failure for {name}")));
        }

        Ok(format!("mock://store/{name}"))
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
