//! Credential bundles and access-token providers.
//!
//! Resolution order:
//! 1. `GOOGLE_CREDENTIALS` (inline JSON; tolerates surrounding quotes and
//!    escaped quotes from deployment dashboards)
//! 2. the credentials file (`credentials.json` in the working directory
//!    unless configured)
//!
//! Supported bundles are service-account keys (a signed JWT exchanged for
//! an access token), authorized-user tokens (refreshed on demand) and
//! pre-minted access tokens.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;

use super::{
    apply_refresh_response, default_token_uri, is_token_expired, map_refresh_error,
    refresh_access_token, GoogleApiError, GoogleToken, SCOPES,
};
use crate::types::Config;

/// Supplies bearer tokens for Google API calls.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn access_token(&self) -> Result<String, GoogleApiError>;
}

/// A token minted elsewhere, used as-is until it stops working.
pub struct StaticToken {
    token: String,
}

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl CredentialProvider for StaticToken {
    async fn access_token(&self) -> Result<String, GoogleApiError> {
        Ok(self.token.clone())
    }
}

/// Authorized-user credentials, refreshed in memory when expired.
pub struct AuthorizedUser {
    client: reqwest::Client,
    // Held across the refresh so concurrent callers share one refresh.
    token: Mutex<GoogleToken>,
}

impl AuthorizedUser {
    pub fn new(client: reqwest::Client, token: GoogleToken) -> Self {
        Self {
            client,
            token: Mutex::new(token),
        }
    }
}

#[async_trait]
impl CredentialProvider for AuthorizedUser {
    async fn access_token(&self) -> Result<String, GoogleApiError> {
        let mut token = self.token.lock().await;
        if is_token_expired(&token) {
            let refreshed = refresh_access_token(&self.client, &token).await?;
            log::info!(
                "google_api: refreshed access token for {}",
                token.account.as_deref().unwrap_or("authorized user")
            );
            *token = refreshed;
        }
        Ok(token.token.clone())
    }
}

/// Fields of a service-account key file used to mint tokens.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Google rejects assertions valid for more than an hour.
const ASSERTION_LIFETIME_SECS: i64 = 3600;

#[derive(Debug, Serialize, Deserialize)]
struct AssertionClaims {
    iss: String,
    scope: String,
    aud: String,
    iat: i64,
    exp: i64,
}

/// Service-account credentials. Tokens are minted with the JWT bearer grant
/// and re-minted when the cached one nears expiry.
pub struct ServiceAccount {
    client: reqwest::Client,
    key: ServiceAccountKey,
    signing_key: EncodingKey,
    // Held across the exchange so concurrent callers share one token.
    token: Mutex<GoogleToken>,
}

impl ServiceAccount {
    pub fn new(client: reqwest::Client, key: ServiceAccountKey) -> Result<Self, GoogleApiError> {
        let signing_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes()).map_err(|e| {
            GoogleApiError::InvalidCredentials(format!("service account private key: {}", e))
        })?;
        let token = GoogleToken {
            token: String::new(),
            refresh_token: None,
            token_uri: key.token_uri.clone(),
            client_id: key.client_id.clone().unwrap_or_default(),
            client_secret: None,
            scopes: SCOPES.iter().map(|s| s.to_string()).collect(),
            expiry: None,
            account: Some(key.client_email.clone()),
        };
        Ok(Self {
            client,
            key,
            signing_key,
            token: Mutex::new(token),
        })
    }

    fn assertion(&self) -> Result<String, GoogleApiError> {
        let iat = chrono::Utc::now().timestamp();
        let claims = AssertionClaims {
            iss: self.key.client_email.clone(),
            scope: SCOPES.join(" "),
            aud: self.key.token_uri.clone(),
            iat,
            exp: iat + ASSERTION_LIFETIME_SECS,
        };
        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.key.private_key_id.clone();
        Ok(jsonwebtoken::encode(&header, &claims, &self.signing_key)?)
    }

    async fn exchange(&self, current: &GoogleToken) -> Result<GoogleToken, GoogleApiError> {
        let assertion = self.assertion()?;
        let resp = self
            .client
            .post(&self.key.token_uri)
            .form(&[
                ("grant_type", JWT_BEARER_GRANT),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(map_refresh_error(status.as_u16(), &body));
        }
        apply_refresh_response(current, &serde_json::from_str::<Value>(&body)?)
    }
}

#[async_trait]
impl CredentialProvider for ServiceAccount {
    async fn access_token(&self) -> Result<String, GoogleApiError> {
        let mut token = self.token.lock().await;
        if is_token_expired(&token) {
            *token = self.exchange(&token).await?;
            log::info!(
                "google_api: minted access token for service account {}",
                self.key.client_email
            );
        }
        Ok(token.token.clone())
    }
}

/// A parsed credential bundle.
#[derive(Debug, Clone)]
pub enum CredentialBundle {
    AuthorizedUser(GoogleToken),
    AccessToken(String),
    ServiceAccount(ServiceAccountKey),
}

/// Parse a credential bundle, tolerating common environment-variable mangling.
pub fn parse_credentials(raw: &str) -> Result<CredentialBundle, GoogleApiError> {
    classify_bundle(parse_lenient_json(raw)?)
}

fn parse_lenient_json(raw: &str) -> Result<Value, GoogleApiError> {
    let trimmed = raw.trim();
    let first_err = match serde_json::from_str::<Value>(trimmed) {
        Ok(value) => return Ok(value),
        Err(e) => e,
    };

    // Remove surrounding quotes and unescape inner quotes.
    let unquoted = strip_matching_quotes(trimmed).replace("\\\"", "\"");
    if let Ok(value) = serde_json::from_str::<Value>(&unquoted) {
        return Ok(value);
    }

    // Last resort: the outermost {...} block.
    if let (Some(start), Some(end)) = (unquoted.find('{'), unquoted.rfind('}')) {
        if start < end {
            if let Ok(value) = serde_json::from_str::<Value>(&unquoted[start..=end]) {
                return Ok(value);
            }
        }
    }

    Err(GoogleApiError::InvalidCredentials(format!(
        "could not parse credentials: {}",
        first_err
    )))
}

fn strip_matching_quotes(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

fn classify_bundle(value: Value) -> Result<CredentialBundle, GoogleApiError> {
    if !value.is_object() {
        return Err(GoogleApiError::InvalidCredentials(
            "expected a JSON object".to_string(),
        ));
    }

    if value.get("type").and_then(Value::as_str) == Some("service_account") {
        let mut key: ServiceAccountKey = serde_json::from_value(value).map_err(|e| {
            GoogleApiError::InvalidCredentials(format!("service account key: {}", e))
        })?;
        if key.client_email.trim().is_empty() || key.private_key.trim().is_empty() {
            return Err(GoogleApiError::InvalidCredentials(
                "missing client_email or private_key".to_string(),
            ));
        }
        // Keys pasted into env vars often carry literal "\n" sequences.
        key.private_key = key.private_key.replace("\\n", "\n");
        return Ok(CredentialBundle::ServiceAccount(key));
    }

    if value.get("refresh_token").is_some() {
        let token: GoogleToken = serde_json::from_value(value).map_err(|e| {
            GoogleApiError::InvalidCredentials(format!("authorized user token: {}", e))
        })?;
        return Ok(CredentialBundle::AuthorizedUser(token));
    }

    let access_token = value
        .get("access_token")
        .or_else(|| value.get("token"))
        .and_then(Value::as_str)
        .filter(|t| !t.trim().is_empty());
    if let Some(token) = access_token {
        return Ok(CredentialBundle::AccessToken(token.to_string()));
    }

    Err(GoogleApiError::InvalidCredentials(
        "expected an authorized_user token, an access_token, or a service_account key"
            .to_string(),
    ))
}

/// Read the raw bundle from the configured sources.
fn read_bundle(config: &Config) -> Result<String, GoogleApiError> {
    if let Some(inline) = config
        .credentials_json
        .as_deref()
        .filter(|s| !s.trim().is_empty())
    {
        return Ok(inline.to_string());
    }
    let path = config.credentials_file();
    read_bundle_file(&path)
}

fn read_bundle_file(path: &Path) -> Result<String, GoogleApiError> {
    if !path.exists() {
        return Err(GoogleApiError::CredentialsNotFound(path.to_path_buf()));
    }
    Ok(std::fs::read_to_string(path)?)
}

/// Build the credential provider described by `config`.
pub fn load_provider(
    config: &Config,
    client: reqwest::Client,
) -> Result<Arc<dyn CredentialProvider>, GoogleApiError> {
    match parse_credentials(&read_bundle(config)?)? {
        CredentialBundle::AuthorizedUser(token) => {
            log::info!(
                "google_api: using authorized user credentials ({})",
                token.account.as_deref().unwrap_or("unknown account")
            );
            if !token.scopes.is_empty() && !token.scopes.iter().any(|s| SCOPES.contains(&s.as_str()))
            {
                log::warn!(
                    "google_api: credentials carry none of {:?}; sheet reads may be denied",
                    SCOPES
                );
            }
            Ok(Arc::new(AuthorizedUser::new(client, token)))
        }
        CredentialBundle::AccessToken(token) => {
            log::info!("google_api: using pre-minted access token");
            Ok(Arc::new(StaticToken::new(token)))
        }
        CredentialBundle::ServiceAccount(key) => {
            log::info!(
                "google_api: using service account {} ({})",
                key.client_email,
                key.project_id.as_deref().unwrap_or("unknown project")
            );
            Ok(Arc::new(ServiceAccount::new(client, key)?))
        }
    }
}
