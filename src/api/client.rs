//! HTTP client for the fleet dashboard API.
//!
//! The exporter talks to three endpoints: the device listing, the
//! per-device detail, and the optional bulk module listing. Server
//! versions disagree about response envelopes, so every response is
//! unwrapped leniently here and callers only ever see plain arrays and
//! objects. Timeouts and connection failures retry with a linear
//! backoff before the error is surfaced.

use std::time::Duration;

use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::models::ModuleKind;

/// Keys a listing response may wrap its array under.
const LISTING_KEYS: [&str; 4] = ["devices", "items", "records", "data"];

/// Keys a device detail response may wrap its object under.
const DETAIL_KEYS: [&str; 2] = ["device", "data"];

/// Base delay between retries, multiplied by the attempt number.
const RETRY_BASE_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: StatusCode },

    #[error("unexpected response shape from {url}: {detail}")]
    Shape { url: String, detail: String },
}

impl ApiError {
    /// Timeouts and connection failures are worth retrying. Anything the
    /// server answered deliberately is not.
    pub fn is_transient(&self) -> bool {
        match self {
            ApiError::Request { source, .. } => source.is_timeout() || source.is_connect(),
            _ => false,
        }
    }
}

/// Connection settings for [`FleetClient`].
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub base_url: String,
    pub timeout_seconds: u64,
    pub retries: u32,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            timeout_seconds: 30,
            retries: 2,
        }
    }
}

pub struct FleetClient {
    http: reqwest::Client,
    options: ClientOptions,
}

impl FleetClient {
    pub fn new(options: ClientOptions) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(options.timeout_seconds))
            .build()
            .expect("Failed to create HTTP client");

        Self { http, options }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.options.base_url.trim_end_matches('/'), path)
    }

    /// Fetch every device the dashboard knows about.
    pub async fn list_devices(&self) -> Result<Vec<Value>, ApiError> {
        let url = self.endpoint("devices");
        let body = self.get_json(&url).await?;
        unwrap_listing(body).ok_or_else(|| ApiError::Shape {
            url,
            detail: "expected an array of devices or an object wrapping one".to_string(),
        })
    }

    /// Fetch the full record for one device.
    pub async fn device_detail(&self, device_id: &str) -> Result<Value, ApiError> {
        let url = self.endpoint(&format!("device/{}", device_id));
        let body = self.get_json(&url).await?;
        Ok(unwrap_detail(body))
    }

    /// Fetch the fleet-wide listing for one module, if the server offers
    /// it. Older servers answer 404 or 405 here; that is reported as
    /// `None` so callers can fall back to per-device fetches.
    pub async fn module_listing(&self, module: ModuleKind) -> Result<Option<Vec<Value>>, ApiError> {
        let url = self.endpoint(&format!("modules/{}", module));
        match self.get_json(&url).await {
            Ok(body) => match unwrap_listing(body) {
                Some(rows) => Ok(Some(rows)),
                None => Err(ApiError::Shape {
                    url,
                    detail: "expected an array of module records or an object wrapping one"
                        .to_string(),
                }),
            },
            Err(ApiError::Status { status, .. })
                if status == StatusCode::NOT_FOUND || status == StatusCode::METHOD_NOT_ALLOWED =>
            {
                debug!("Server has no bulk listing for {} ({})", module, status);
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    async fn get_json(&self, url: &str) -> Result<Value, ApiError> {
        let mut attempt = 0u32;
        loop {
            match self.fetch(url).await {
                Ok(body) => return Ok(body),
                Err(err) if err.is_transient() && attempt < self.options.retries => {
                    attempt += 1;
                    let delay = RETRY_BASE_DELAY * attempt;
                    warn!(
                        "Transient failure fetching {} (attempt {}): {}. Retrying in {:?}",
                        url, attempt, err, delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn fetch(&self, url: &str) -> Result<Value, ApiError> {
        debug!("GET {}", url);

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|source| ApiError::Request {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status {
                url: url.to_string(),
                status,
            });
        }

        response
            .json::<Value>()
            .await
            .map_err(|source| ApiError::Shape {
                url: url.to_string(),
                detail: format!("body is not valid JSON: {}", source),
            })
    }
}

/// Accept a bare array or an object wrapping one under a known key.
fn unwrap_listing(body: Value) -> Option<Vec<Value>> {
    match body {
        Value::Array(items) => Some(items),
        Value::Object(mut map) => LISTING_KEYS
            .iter()
            .find(|key| matches!(map.get(**key), Some(Value::Array(_))))
            .and_then(|key| match map.remove(*key) {
                Some(Value::Array(items)) => Some(items),
                _ => None,
            }),
        _ => None,
    }
}

/// Strip a single-object wrapper from a device detail response. Anything
/// that is not wrapped passes through untouched.
fn unwrap_detail(body: Value) -> Value {
    match body {
        Value::Object(mut map) => {
            for key in DETAIL_KEYS {
                if matches!(map.get(key), Some(Value::Object(_))) {
                    if let Some(inner) = map.remove(key) {
                        return inner;
                    }
                }
            }
            Value::Object(map)
        }
        other => other,
    }
}
