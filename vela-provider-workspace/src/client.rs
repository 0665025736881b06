//! Signed JSON client for the Workspace and APP REST APIs

use std::time::Duration;

use chrono::Utc;
use log::{debug, error, warn};
use reqwest::{Client, Method};
use serde_json::Value as JsonValue;
use url::Url;
use vela_core::provider::{ErrorKind, ProviderError, ProviderResult};
use vela_core::resource::{ResourceId, State};

use crate::signer::{self, Credentials};

/// Maximum length of response body to log
const MAX_LOG_BODY_LENGTH: usize = 200;
/// Upper bound for a single throttling backoff, in base units
const MAX_BACKOFF_UNITS: u32 = 30;

/// Truncate a response body and strip control characters before logging
fn sanitize_for_log(body: &str) -> String {
    let truncated = if body.len() > MAX_LOG_BODY_LENGTH {
        let mut cut = MAX_LOG_BODY_LENGTH;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}... [truncated, {} bytes total]", &body[..cut], body.len())
    } else {
        body.to_string()
    };
    truncated.replace(|c: char| c.is_control(), "")
}

/// Error returned by [`ServiceClient`]
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("invalid request URL {url}: {source}")]
    Url {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{method} {url} returned {status}: [{error_code}] {error_msg}")]
    Status {
        method: String,
        url: String,
        status: u16,
        error_code: String,
        error_msg: String,
        body: JsonValue,
    },

    #[error("failed to sign request to {url}: {source}")]
    Sign {
        url: String,
        #[source]
        source: signer::SignError,
    },

    #[error("failed to decode response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

impl ClientError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn error_code(&self) -> Option<&str> {
        match self {
            ClientError::Status { error_code, .. } => Some(error_code),
            _ => None,
        }
    }

    pub fn body(&self) -> Option<&JsonValue> {
        match self {
            ClientError::Status { body, .. } => Some(body),
            _ => None,
        }
    }

    fn kind(&self) -> ErrorKind {
        match self.status() {
            Some(404) => ErrorKind::NotFound,
            Some(409) => ErrorKind::Conflict,
            _ => ErrorKind::Api,
        }
    }
}

impl From<ClientError> for ProviderError {
    fn from(err: ClientError) -> Self {
        let kind = err.kind();
        ProviderError::new(err.to_string())
            .with_kind(kind)
            .with_cause(err)
    }
}

/// Wrap a client error with a one-line context, keeping its kind
pub fn api_error(context: impl std::fmt::Display, err: ClientError) -> ProviderError {
    let kind = err.kind();
    ProviderError::new(format!("{}: {}", context, err))
        .with_kind(kind)
        .with_cause(err)
}

/// Service error code carried by a provider error built from a [`ClientError`]
pub fn error_code_of(err: &ProviderError) -> Option<&str> {
    err.cause
        .as_ref()?
        .downcast_ref::<ClientError>()?
        .error_code()
        .filter(|code| !code.is_empty())
}

/// Treat an expected status with one of `codes` under `code_key` as not found.
///
/// Some endpoints report a missing object as 400, 403 or 500 with a
/// service error code instead of 404.
pub fn convert_expected_error(
    err: ClientError,
    status: u16,
    code_key: &str,
    codes: &[&str],
) -> ProviderError {
    if err.status() == Some(status)
        && let Some(body) = err.body()
        && let Some(code) = crate::utils::path_search(code_key, body).and_then(|v| v.as_str())
        && codes.contains(&code)
    {
        return ProviderError::not_found(err.to_string()).with_cause(err);
    }
    err.into()
}

/// Turn a not-found error into an empty state so the host drops the resource
pub fn check_deleted(id: &ResourceId, err: ProviderError) -> ProviderResult<State> {
    if err.is_not_found() {
        warn!(
            "{}.{} no longer exists, removing it from state",
            id.resource_type, id.name
        );
        Ok(State::not_found(id.clone()))
    } else {
        Err(err.for_resource(id.clone()))
    }
}

/// HTTP client bound to one service endpoint and project
#[derive(Debug, Clone)]
pub struct ServiceClient {
    http: Client,
    endpoint: String,
    project_id: String,
    credentials: Credentials,
    max_retries: u32,
    backoff_base: Duration,
}

impl ServiceClient {
    pub fn new(
        http: Client,
        endpoint: impl Into<String>,
        project_id: impl Into<String>,
        credentials: Credentials,
        max_retries: u32,
    ) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
            project_id: project_id.into(),
            credentials,
            max_retries,
            backoff_base: Duration::from_secs(1),
        }
    }

    /// Use a different unit for throttling backoff (tests shrink it)
    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// Full URL for a path relative to the endpoint, with `{project_id}` expanded
    pub fn url(&self, path: &str) -> String {
        format!(
            "{}{}",
            self.endpoint,
            path.trim_start_matches('/')
                .replace("{project_id}", &self.project_id)
        )
    }

    pub async fn get(&self, path: &str) -> Result<JsonValue, ClientError> {
        self.request(Method::GET, path, None).await
    }

    pub async fn post(&self, path: &str, body: &JsonValue) -> Result<JsonValue, ClientError> {
        self.request(Method::POST, path, Some(body)).await
    }

    pub async fn put(&self, path: &str, body: &JsonValue) -> Result<JsonValue, ClientError> {
        self.request(Method::PUT, path, Some(body)).await
    }

    pub async fn patch(&self, path: &str, body: &JsonValue) -> Result<JsonValue, ClientError> {
        self.request(Method::PATCH, path, Some(body)).await
    }

    pub async fn delete(&self, path: &str) -> Result<JsonValue, ClientError> {
        self.request(Method::DELETE, path, None).await
    }

    /// Send a signed request. HTTP 429 is retried with exponential backoff.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&JsonValue>,
    ) -> Result<JsonValue, ClientError> {
        let url_str = self.url(path);
        let url = Url::parse(&url_str).map_err(|source| ClientError::Url {
            url: url_str.clone(),
            source,
        })?;
        let payload = body.map(|b| b.to_string()).unwrap_or_default();

        let mut attempt = 0u32;
        loop {
            debug!("{} {}", method, url);
            let response = self.send_once(&method, &url, &payload).await?;
            let status = response.status();
            let text = response.text().await.map_err(|source| ClientError::Transport {
                url: url_str.clone(),
                source,
            })?;

            if status.as_u16() == 429 && attempt < self.max_retries {
                let delay = self.backoff(attempt);
                warn!(
                    "{} {} throttled, retrying in {:?} (attempt {}/{})",
                    method,
                    url,
                    delay,
                    attempt + 1,
                    self.max_retries
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
                continue;
            }

            if !status.is_success() {
                error!("API error: {} - {}", status, sanitize_for_log(&text));
                let body: JsonValue = serde_json::from_str(&text).unwrap_or(JsonValue::Null);
                let (error_code, error_msg) = extract_error(&body, &text);
                return Err(ClientError::Status {
                    method: method.to_string(),
                    url: url_str,
                    status: status.as_u16(),
                    error_code,
                    error_msg,
                    body,
                });
            }

            if text.trim().is_empty() {
                return Ok(JsonValue::Null);
            }
            return serde_json::from_str(&text).map_err(|source| ClientError::Decode {
                url: url_str,
                source,
            });
        }
    }

    async fn send_once(
        &self,
        method: &Method,
        url: &Url,
        payload: &str,
    ) -> Result<reqwest::Response, ClientError> {
        let mut headers = vec![(
            "Content-Type".to_string(),
            "application/json;charset=UTF-8".to_string(),
        )];
        if !self.project_id.is_empty() {
            headers.push(("X-Project-Id".to_string(), self.project_id.clone()));
        }

        let signed = signer::sign(
            &self.credentials,
            method.as_str(),
            url,
            &headers,
            payload.as_bytes(),
            Utc::now(),
        )
        .map_err(|source| ClientError::Sign {
            url: url.to_string(),
            source,
        })?;

        let mut request = self.http.request(method.clone(), url.clone());
        for (name, value) in headers.iter().chain(signed.headers.iter()) {
            request = request.header(name.as_str(), value.as_str());
        }
        if !payload.is_empty() {
            request = request.body(payload.to_string());
        }

        request.send().await.map_err(|source| ClientError::Transport {
            url: url.to_string(),
            source,
        })
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let units = 2u32.saturating_pow(attempt).min(MAX_BACKOFF_UNITS);
        self.backoff_base * units
    }
}

/// Read the service error code and message from an error body
fn extract_error(body: &JsonValue, raw: &str) -> (String, String) {
    let code = body
        .get("error_code")
        .or_else(|| body.pointer("/error/code"))
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    let msg = body
        .get("error_msg")
        .or_else(|| body.pointer("/error/message"))
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .unwrap_or_else(|| sanitize_for_log(raw));
    (code, msg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn status_error(status: u16, body: JsonValue) -> ClientError {
        let (error_code, error_msg) = extract_error(&body, "");
        ClientError::Status {
            method: "GET".to_string(),
            url: "https://example/v2/p/desktop-pools/x".to_string(),
            status,
            error_code,
            error_msg,
            body,
        }
    }

    #[test]
    fn extract_error_reads_both_layouts() {
        let (code, msg) = extract_error(&json!({"error_code": "WKS.0001", "error_msg": "gone"}), "");
        assert_eq!((code.as_str(), msg.as_str()), ("WKS.0001", "gone"));

        let (code, msg) = extract_error(
            &json!({"error": {"code": "APIGW.0101", "message": "no api"}}),
            "",
        );
        assert_eq!((code.as_str(), msg.as_str()), ("APIGW.0101", "no api"));
    }

    #[test]
    fn status_maps_to_error_kind() {
        let not_found: ProviderError = status_error(404, json!({})).into();
        assert!(not_found.is_not_found());

        let busy: ProviderError =
            status_error(409, json!({"error_code": "WKS.00010032"})).into();
        assert!(busy.is_conflict());
        assert_eq!(error_code_of(&busy), Some("WKS.00010032"));

        let other = api_error("error creating desktop", status_error(500, json!({})));
        assert_eq!(other.kind, ErrorKind::Api);
        assert!(other.message.starts_with("error creating desktop: "));
    }

    #[test]
    fn expected_error_code_becomes_not_found() {
        let err = convert_expected_error(
            status_error(400, json!({"error_code": "WKS.0001"})),
            400,
            "error_code",
            &["WKS.0001"],
        );
        assert!(err.is_not_found());

        let err = convert_expected_error(
            status_error(400, json!({"error_code": "WKS.0002"})),
            400,
            "error_code",
            &["WKS.0001"],
        );
        assert!(!err.is_not_found());
    }

    #[test]
    fn check_deleted_only_swallows_not_found() {
        let id = ResourceId::new("workspace_desktop", "dev");
        let state = check_deleted(&id, ProviderError::not_found("gone")).unwrap();
        assert!(!state.exists);

        let err = check_deleted(&id, ProviderError::new("boom")).unwrap_err();
        assert_eq!(err.resource_id, Some(id));
    }

    #[test]
    fn backoff_is_capped() {
        let client = ServiceClient::new(
            Client::new(),
            "http://localhost/",
            "p",
            Credentials {
                access_key: "a".into(),
                secret_key: "s".into(),
                security_token: None,
            },
            10,
        );
        assert_eq!(client.backoff(0), Duration::from_secs(1));
        assert_eq!(client.backoff(3), Duration::from_secs(8));
        assert_eq!(client.backoff(9), Duration::from_secs(30));
    }

    #[test]
    fn sanitize_truncates_long_bodies() {
        let long = "x".repeat(500);
        let out = sanitize_for_log(&long);
        assert!(out.contains("[truncated, 500 bytes total]"));
        assert_eq!(sanitize_for_log("a\nb"), "ab");
    }

    #[test]
    fn url_expands_project_id() {
        let client = ServiceClient::new(
            Client::new(),
            "https://workspace.cn-north-4.myhuaweicloud.com/",
            "p1",
            Credentials {
                access_key: "a".into(),
                secret_key: "s".into(),
                security_token: None,
            },
            0,
        );
        assert_eq!(
            client.url("v2/{project_id}/desktops"),
            "https://workspace.cn-north-4.myhuaweicloud.com/v2/p1/desktops"
        );
    }
}
