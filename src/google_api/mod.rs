//! Native Google Sheets API client
//!
//! Direct HTTP via reqwest. Access tokens come from a credential bundle
//! supplied through the environment or a credentials file: a service-account
//! key (JWT bearer grant), an authorized-user token (refresh grant), or a
//! pre-minted access token. The token format is compatible with the JSON
//! written by Python's google-auth.
//!
//! Modules:
//! - credentials: credential bundle parsing and access-token providers
//! - sheets: Google Sheets API v4 worksheet reads

pub mod credentials;
pub mod sheets;
#[cfg(test)]
mod test_server;

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, UnavailableCause};

/// Read-only scopes the credential must carry.
pub const SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/spreadsheets.readonly",
    "https://www.googleapis.com/auth/drive.readonly",
];

// ============================================================================
// Token types (compatible with Python's google-auth token format)
// ============================================================================

/// Authorized-user OAuth2 token.
///
/// Field names match what Python's `google.oauth2.credentials.Credentials.to_json()`
/// produces and what `gcloud auth application-default login` writes (which
/// carries no access token yet). Both `token` and `access_token` are accepted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleToken {
    /// The access token (Python writes this as "token")
    #[serde(default, alias = "access_token")]
    pub token: String,
    /// The refresh token (long-lived, used to get new access tokens)
    pub refresh_token: Option<String>,
    /// Token endpoint URL
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    /// OAuth2 client ID
    pub client_id: String,
    #[serde(default)]
    pub client_secret: Option<String>,
    /// Authorized scopes
    #[serde(default)]
    pub scopes: Vec<String>,
    /// Token expiry time (ISO 8601)
    #[serde(default)]
    pub expiry: Option<String>,
    /// Authenticated user email (Python stores in "account" field)
    #[serde(default, alias = "email")]
    pub account: Option<String>,
}

pub(crate) fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

// ============================================================================
// Error type
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum GoogleApiError {
    #[error("HTTP: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Token expired or revoked")]
    AuthExpired,
    #[error("Credentials not found at {0}")]
    CredentialsNotFound(PathBuf),
    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),
    #[error("API error {status}: {message}")]
    ApiError { status: u16, message: String },
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid credentials format: {0}")]
    InvalidCredentials(String),
    #[error("Invalid API endpoint: {0}")]
    InvalidEndpoint(String),
    #[error("JWT signing failed: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
}

impl From<GoogleApiError> for PipelineError {
    fn from(err: GoogleApiError) -> Self {
        match err {
            GoogleApiError::ApiError {
                status: 404,
                message,
            } => PipelineError::SourceNotFound(message),
            GoogleApiError::ApiError {
                status: 401 | 403,
                message,
            } => PipelineError::credentials(format!("access denied: {}", message)),
            GoogleApiError::Http(e) if e.is_timeout() => PipelineError::SourceUnavailable {
                cause: UnavailableCause::Timeout,
                detail: e.to_string(),
            },
            e @ (GoogleApiError::AuthExpired
            | GoogleApiError::CredentialsNotFound(_)
            | GoogleApiError::RefreshFailed(_)
            | GoogleApiError::InvalidCredentials(_)
            | GoogleApiError::Jwt(_)) => PipelineError::credentials(e.to_string()),
            other => PipelineError::network(other.to_string()),
        }
    }
}

/// HTTP client with a whole-request timeout.
pub fn http_client(timeout: Duration) -> Result<reqwest::Client, GoogleApiError> {
    Ok(reqwest::Client::builder().timeout(timeout).build()?)
}

/// Pull `error.message` out of a Google API error body, falling back to the raw body.
pub(crate) fn api_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

// ============================================================================
// Token refresh
// ============================================================================

/// Check if a token is expired based on its expiry field.
pub fn is_token_expired(token: &GoogleToken) -> bool {
    if token.token.is_empty() {
        return true;
    }
    match &token.expiry {
        None => true, // No expiry = assume expired, try refresh
        Some(expiry_str) => {
            // Python stores expiry as "2026-02-08T12:00:00.000000Z" or similar
            match chrono::DateTime::parse_from_rfc3339(&expiry_str.replace('Z', "+00:00"))
                .or_else(|_| chrono::DateTime::parse_from_rfc3339(expiry_str))
            {
                Ok(expiry) => {
                    // Consider expired if within 60 seconds of expiry
                    let now = chrono::Utc::now();
                    expiry <= now + chrono::Duration::seconds(60)
                }
                Err(_) => true, // Can't parse = assume expired
            }
        }
    }
}

/// Refresh an access token using the refresh token.
///
/// Returns an updated GoogleToken with new access token and expiry. Callers
/// serialize refreshes; nothing is written to disk.
pub async fn refresh_access_token(
    client: &reqwest::Client,
    token: &GoogleToken,
) -> Result<GoogleToken, GoogleApiError> {
    let refresh_token = token
        .refresh_token
        .as_ref()
        .ok_or(GoogleApiError::AuthExpired)?;

    let (status, body_text) =
        refresh_access_token_request(client, token, refresh_token, false).await?;
    let body: serde_json::Value = if status.is_success() {
        serde_json::from_str(&body_text)?
    } else if status.as_u16() == 400
        && body_text.contains("invalid_client")
        && token.client_secret.is_some()
    {
        let (retry_status, retry_body_text) =
            refresh_access_token_request(client, token, refresh_token, true).await?;
        if !retry_status.is_success() {
            return Err(map_refresh_error(retry_status.as_u16(), &retry_body_text));
        }
        serde_json::from_str(&retry_body_text)?
    } else {
        return Err(map_refresh_error(status.as_u16(), &body_text));
    };

    apply_refresh_response(token, &body)
}

pub(crate) fn apply_refresh_response(
    token: &GoogleToken,
    body: &serde_json::Value,
) -> Result<GoogleToken, GoogleApiError> {
    let access_token = body["access_token"]
        .as_str()
        .ok_or_else(|| GoogleApiError::RefreshFailed("No access_token in response".into()))?;

    let expires_in = body["expires_in"].as_u64().unwrap_or(3600);
    let expiry = chrono::Utc::now() + chrono::Duration::seconds(expires_in as i64);

    let mut new_token = token.clone();
    new_token.token = access_token.to_string();
    new_token.expiry = Some(expiry.to_rfc3339());
    Ok(new_token)
}

async fn refresh_access_token_request(
    client: &reqwest::Client,
    token: &GoogleToken,
    refresh_token: &str,
    include_client_secret: bool,
) -> Result<(reqwest::StatusCode, String), GoogleApiError> {
    let mut form = vec![
        ("client_id", token.client_id.as_str()),
        ("refresh_token", refresh_token),
        ("grant_type", "refresh_token"),
    ];
    if include_client_secret {
        if let Some(secret) = token.client_secret.as_deref() {
            form.push(("client_secret", secret));
        }
    }
    let resp = client.post(&token.token_uri).form(&form).send().await?;
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    Ok((status, body))
}

pub(crate) fn map_refresh_error(status: u16, body: &str) -> GoogleApiError {
    let lowered = body.to_lowercase();
    if (status == 400 || status == 401)
        && (lowered.contains("invalid_grant") || lowered.contains("token has been expired"))
    {
        return GoogleApiError::AuthExpired;
    }
    GoogleApiError::RefreshFailed(format!("HTTP {}: {}", status, body))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn token_with_expiry(expiry: Option<String>) -> GoogleToken {
        GoogleToken {
            token: "test".to_string(),
            refresh_token: None,
            token_uri: default_token_uri(),
            client_id: "c".to_string(),
            client_secret: Some("s".to_string()),
            scopes: vec![],
            expiry,
            account: None,
        }
    }

    #[test]
    fn test_google_token_python_compat() {
        // Simulates the JSON format Python's google-auth writes
        let python_json = r#"{
            "token": "ya29.python-token",
            "refresh_token": "1//python-refresh",
            "token_uri": "https://oauth2.googleapis.com/token",
            "client_id": "client.apps.googleusercontent.com",
            "client_secret": "secret",
            "scopes": ["https://www.googleapis.com/auth/spreadsheets.readonly"],
            "expiry": "2026-02-08T12:00:00.000000Z",
            "account": "user@company.com",
            "universe_domain": "googleapis.com"
        }"#;

        let token: GoogleToken = serde_json::from_str(python_json).unwrap();
        assert_eq!(token.token, "ya29.python-token");
        assert_eq!(token.account.as_deref(), Some("user@company.com"));
        assert_eq!(token.scopes.len(), 1);
    }

    #[test]
    fn test_google_token_gcloud_authorized_user() {
        // gcloud application-default credentials carry no access token
        let json = r#"{
            "client_id": "client.apps.googleusercontent.com",
            "client_secret": "secret",
            "refresh_token": "1//refresh",
            "type": "authorized_user"
        }"#;

        let token: GoogleToken = serde_json::from_str(json).unwrap();
        assert!(token.token.is_empty());
        assert_eq!(token.token_uri, default_token_uri());
        assert!(is_token_expired(&token));
    }

    #[test]
    fn test_google_token_access_token_alias() {
        let json = r#"{
            "access_token": "ya29.alias-token",
            "refresh_token": "1//refresh",
            "client_id": "client"
        }"#;

        let token: GoogleToken = serde_json::from_str(json).unwrap();
        assert_eq!(token.token, "ya29.alias-token");
    }

    #[test]
    fn test_is_token_expired_no_expiry() {
        assert!(is_token_expired(&token_with_expiry(None)));
    }

    #[test]
    fn test_is_token_expired_future() {
        let future = chrono::Utc::now() + chrono::Duration::hours(1);
        assert!(!is_token_expired(&token_with_expiry(Some(future.to_rfc3339()))));
    }

    #[test]
    fn test_is_token_expired_past() {
        let past = chrono::Utc::now() - chrono::Duration::hours(1);
        assert!(is_token_expired(&token_with_expiry(Some(past.to_rfc3339()))));
    }

    #[test]
    fn test_apply_refresh_response() {
        let token = token_with_expiry(None);
        let body = serde_json::json!({ "access_token": "ya29.new", "expires_in": 1800 });
        let refreshed = apply_refresh_response(&token, &body).unwrap();
        assert_eq!(refreshed.token, "ya29.new");
        assert!(!is_token_expired(&refreshed));

        let missing = apply_refresh_response(&token, &serde_json::json!({}));
        assert!(matches!(missing, Err(GoogleApiError::RefreshFailed(_))));
    }

    #[test]
    fn test_map_refresh_error() {
        assert!(matches!(
            map_refresh_error(400, r#"{"error":"invalid_grant"}"#),
            GoogleApiError::AuthExpired
        ));
        assert!(matches!(
            map_refresh_error(500, "boom"),
            GoogleApiError::RefreshFailed(_)
        ));
    }

    #[test]
    fn test_api_error_message() {
        let body = r#"{"error":{"code":404,"message":"Requested entity was not found.","status":"NOT_FOUND"}}"#;
        assert_eq!(api_error_message(body), "Requested entity was not found.");
        assert_eq!(api_error_message(" plain text "), "plain text");
    }

    #[test]
    fn test_pipeline_error_mapping() {
        let not_found: PipelineError = GoogleApiError::ApiError {
            status: 404,
            message: "gone".into(),
        }
        .into();
        assert!(matches!(not_found, PipelineError::SourceNotFound(_)));

        let denied: PipelineError = GoogleApiError::ApiError {
            status: 403,
            message: "caller does not have permission".into(),
        }
        .into();
        assert!(matches!(
            denied,
            PipelineError::SourceUnavailable {
                cause: UnavailableCause::Credentials,
                ..
            }
        ));

        let server: PipelineError = GoogleApiError::ApiError {
            status: 503,
            message: "backend".into(),
        }
        .into();
        assert!(matches!(
            server,
            PipelineError::SourceUnavailable {
                cause: UnavailableCause::Network,
                ..
            }
        ));

        let missing: PipelineError =
            GoogleApiError::CredentialsNotFound(PathBuf::from("credentials.json")).into();
        assert!(missing.requires_user_action());
    }
}
