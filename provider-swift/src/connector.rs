//! Swift API connector implementation
//!
//! Implements the `ObjectStore` trait for OpenStack-Swift-compatible stores.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use relay_traits::error::{Result, StoreError};
use relay_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
use relay_traits::store::ObjectStore;
use bytes::Bytes;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::error::SwiftError;
use crate::types::ObjectEntry;

/// Maximum results per listing page (Swift API limit)
const MAX_PAGE_LIMIT: usize = 10_000;

/// Attempts per request before giving up on retryable failures
const MAX_RETRIES: u32 = 3;

/// Swift API connector
///
/// Implements `ObjectStore` for OpenStack-Swift-compatible object stores.
///
/// # Features
///
/// - Marker-based paginated listing (a prefix listing is never truncated at
///   the provider page limit)
/// - HEAD-based object stat with `X-Timestamp`/`Last-Modified` parsing
/// - Server-side copy via `X-Copy-From`
/// - Token-header authentication
/// - Exponential backoff for rate limiting and server errors
///
/// # Example
///
/// ```ignore
/// use provider_swift::SwiftConnector;
/// use relay_traits::store::ObjectStore;
///
/// let store = SwiftConnector::new(http_client, storage_url, container, token);
/// let keys = store.list("iconml/request/").await?;
/// ```
pub struct SwiftConnector {
    /// HTTP client for API requests
    http_client: Arc<dyn HttpClient>,

    /// Storage endpoint, including the account path (`…/v1/AUTH_<acct>`)
    storage_url: String,

    /// Container name
    container: String,

    /// Auth token sent as `X-Auth-Token` (empty = unauthenticated store)
    auth_token: String,

    /// Listing page size; lowered in tests to exercise pagination
    page_limit: usize,
}

impl SwiftConnector {
    /// Create a new Swift connector
    pub fn new(
        http_client: Arc<dyn HttpClient>,
        storage_url: impl Into<String>,
        container: impl Into<String>,
        auth_token: impl Into<String>,
    ) -> Self {
        Self {
            http_client,
            storage_url: storage_url.into(),
            container: container.into(),
            auth_token: auth_token.into(),
            page_limit: MAX_PAGE_LIMIT,
        }
    }

    /// Override the listing page size
    pub fn with_page_limit(mut self, page_limit: usize) -> Self {
        self.page_limit = page_limit;
        self
    }

    fn container_url(&self) -> String {
        format!(
            "{}/{}",
            self.storage_url.trim_end_matches('/'),
            self.container
        )
    }

    /// Object URL with each key segment percent-encoded
    fn object_url(&self, key: &str) -> String {
        format!("{}/{}", self.container_url(), Self::encode_key(key))
    }

    fn encode_key(key: &str) -> String {
        key.split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/")
    }

    fn request(&self, method: HttpMethod, url: String) -> HttpRequest {
        let request = HttpRequest::new(method, url).timeout(Duration::from_secs(30));
        if self.auth_token.is_empty() {
            request
        } else {
            request.auth_token(&self.auth_token)
        }
    }

    /// Parse a listing timestamp (`2026-08-05T16:41:49.390270`, UTC implied)
    fn parse_listing_timestamp(value: &str) -> Option<DateTime<Utc>> {
        NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(|naive| naive.and_utc())
    }

    /// Parse object mtime from HEAD response headers.
    ///
    /// Prefers `X-Timestamp` (epoch seconds, sub-second precision) and falls
    /// back to the HTTP `Last-Modified` date.
    fn parse_stat_headers(response: &HttpResponse) -> Option<DateTime<Utc>> {
        if let Some(raw) = response.header("X-Timestamp") {
            if let Ok(epoch) = raw.parse::<f64>() {
                return DateTime::from_timestamp_millis((epoch * 1000.0) as i64);
            }
        }
        response
            .header("Last-Modified")
            .and_then(|raw| DateTime::parse_from_rfc2822(raw).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// Execute an API request with retry logic
    ///
    /// Retries rate limits (429), server errors (5xx) and transport failures
    /// with exponential backoff; any other response is returned to the
    /// caller for status-specific handling (404 is a normal outcome for
    /// HEAD/DELETE).
    #[instrument(skip(self, request), fields(url = %request.url))]
    async fn execute_with_retry(&self, request: HttpRequest) -> Result<HttpResponse> {
        let mut attempt = 0;

        loop {
            match self.http_client.execute(request.clone()).await {
                Ok(response) => {
                    let status = response.status;

                    if status == 429 || response.is_server_error() {
                        attempt += 1;
                        if attempt >= MAX_RETRIES {
                            warn!(
                                "API request failed after {} attempts: status={}",
                                MAX_RETRIES, status
                            );
                            return Err(SwiftError::ApiError {
                                status_code: status,
                                message: format!("Request failed after {} retries", MAX_RETRIES),
                            }
                            .into());
                        }

                        let backoff_ms = 100u64 * 2u64.pow(attempt);
                        warn!(
                            "API request failed (attempt {}/{}): status={}, retrying in {}ms",
                            attempt, MAX_RETRIES, status, backoff_ms
                        );
                        tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    } else {
                        debug!("API request completed: status={}", status);
                        return Ok(response);
                    }
                }
                Err(e) => {
                    attempt += 1;
                    if attempt >= MAX_RETRIES {
                        warn!("API request failed after {} attempts: {}", MAX_RETRIES, e);
                        return Err(e);
                    }

                    let backoff_ms = 100u64 * 2u64.pow(attempt);
                    warn!(
                        "API request failed (attempt {}/{}): {}, retrying in {}ms",
                        attempt, MAX_RETRIES, e, backoff_ms
                    );
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                }
            }
        }
    }
}

#[async_trait]
impl ObjectStore for SwiftConnector {
    #[instrument(skip(self))]
    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys: Vec<String> = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let mut url = format!(
                "{}?format=json&limit={}&prefix={}",
                self.container_url(),
                self.page_limit,
                urlencoding::encode(prefix)
            );
            if let Some(m) = &marker {
                url.push_str(&format!("&marker={}", urlencoding::encode(m)));
            }

            let response = self
                .execute_with_retry(self.request(HttpMethod::Get, url))
                .await?;

            // Empty container listings come back as 204 No Content
            if response.status == 204 {
                break;
            }
            if !response.is_success() {
                return Err(SwiftError::ApiError {
                    status_code: response.status,
                    message: String::from_utf8_lossy(&response.body).to_string(),
                }
                .into());
            }

            let entries: Vec<ObjectEntry> = serde_json::from_slice(&response.body)
                .map_err(|e| {
                    StoreError::from(SwiftError::ParseError(format!(
                        "Failed to parse container listing: {}",
                        e
                    )))
                })?;

            let page_len = entries.len();
            keys.extend(entries.into_iter().map(|entry| entry.name));

            if page_len < self.page_limit {
                break;
            }
            marker = keys.last().cloned();
        }

        debug!("Listed {} objects under prefix {}", keys.len(), prefix);
        Ok(keys)
    }

    #[instrument(skip(self), fields(key = %key))]
    async fn last_modified(&self, key: &str) -> Result<Option<DateTime<Utc>>> {
        let response = self
            .execute_with_retry(self.request(HttpMethod::Head, self.object_url(key)))
            .await?;

        if response.status == 404 {
            return Ok(None);
        }
        if !response.is_success() {
            return Err(SwiftError::ApiError {
                status_code: response.status,
                message: String::from_utf8_lossy(&response.body).to_string(),
            }
            .into());
        }

        Self::parse_stat_headers(&response)
            .map(Some)
            .ok_or_else(|| {
                SwiftError::ParseError(format!("No parsable timestamp headers for {}", key)).into()
            })
    }

    #[instrument(skip(self, local_path), fields(key = %key))]
    async fn download(&self, key: &str, local_path: &Path) -> Result<()> {
        let response = self
            .execute_with_retry(self.request(HttpMethod::Get, self.object_url(key)))
            .await?;

        if response.status == 404 {
            return Err(StoreError::NotFound(key.to_string()));
        }
        if !response.is_success() {
            return Err(SwiftError::ApiError {
                status_code: response.status,
                message: String::from_utf8_lossy(&response.body).to_string(),
            }
            .into());
        }

        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(local_path, &response.body).await?;
        info!(
            "store -> local: {} -> {} ({} bytes)",
            key,
            local_path.display(),
            response.body.len()
        );
        Ok(())
    }

    #[instrument(skip(self, local_path), fields(key = %key))]
    async fn upload(&self, local_path: &Path, key: &str) -> Result<()> {
        let body = tokio::fs::read(local_path).await?;
        let size = body.len();

        let response = self
            .execute_with_retry(
                self.request(HttpMethod::Put, self.object_url(key))
                    .body(Bytes::from(body)),
            )
            .await?;

        if !response.is_success() {
            return Err(SwiftError::ApiError {
                status_code: response.status,
                message: String::from_utf8_lossy(&response.body).to_string(),
            }
            .into());
        }

        info!(
            "local -> store: {} -> {} ({} bytes)",
            local_path.display(),
            key,
            size
        );
        Ok(())
    }

    #[instrument(skip(self), fields(key = %key))]
    async fn delete(&self, key: &str) -> Result<()> {
        let response = self
            .execute_with_retry(self.request(HttpMethod::Delete, self.object_url(key)))
            .await?;

        // Deleting a missing object is a normal outcome
        if response.status == 404 || response.is_success() {
            debug!("Deleted {}", key);
            return Ok(());
        }
        Err(SwiftError::ApiError {
            status_code: response.status,
            message: String::from_utf8_lossy(&response.body).to_string(),
        }
        .into())
    }

    #[instrument(skip(self))]
    async fn copy(&self, src_key: &str, dst_key: &str) -> Result<()> {
        let copy_source = format!("/{}/{}", self.container, Self::encode_key(src_key));
        let response = self
            .execute_with_retry(
                self.request(HttpMethod::Put, self.object_url(dst_key))
                    .header("X-Copy-From", copy_source)
                    .header("Content-Length", "0"),
            )
            .await?;

        if response.status == 404 {
            return Err(StoreError::NotFound(src_key.to_string()));
        }
        if !response.is_success() {
            return Err(SwiftError::ApiError {
                status_code: response.status,
                message: String::from_utf8_lossy(&response.body).to_string(),
            }
            .into());
        }

        debug!("Copied {} -> {}", src_key, dst_key);
        Ok(())
    }
}
