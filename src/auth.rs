//! OAuth2 client-credentials authentication for Sophos Central.
//!
//! Acquires bearer tokens from the Sophos ID token endpoint using the
//! client_credentials grant, caches them in `TokenProvider`, and resolves the
//! caller's identity and regional API host through the `whoami` endpoint.
//!
//! The provider is owned by `SophosClient` behind a `tokio::sync::Mutex`.
//! Methods that may hit the network take `&mut self`; the lock is held only
//! for the token check or refresh, never across an API round-trip.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::Client;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::config::{CredentialSource, Credentials};
use crate::error::{Result, SophosError};

/// Sophos ID OAuth2 token endpoint.
pub const TOKEN_URL: &str = "https://id.sophos.com/api/v2/oauth2/token";

/// Global whoami endpoint used to discover the caller's API host.
pub const WHOAMI_URL: &str = "https://api.central.sophos.com/whoami/v1";

/// A token is re-acquired once it is this close to expiry.
pub const EXPIRES_SOON: Duration = Duration::from_secs(300);

/// Timeout for token and whoami calls. Both are small, fast requests.
const AUTH_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Form body sent to the token endpoint.
#[derive(Serialize)]
pub struct TokenRequest<'a> {
    grant_type: &'a str,
    client_id: &'a str,
    client_secret: &'a str,
    scope: &'a str,
}

/// Token endpoint response. Extra fields are ignored.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    /// The bearer token.
    pub access_token: String,
    /// Usually `"bearer"`.
    pub token_type: String,
    /// Lifetime in seconds from issue.
    pub expires_in: u64,
    /// Refresh token, when the server issues one.
    #[serde(default)]
    pub refresh_token: Option<String>,
}

// ── Token ──────────────────────────────────────────────────────────────

/// A bearer token with an absolute expiry instant.
#[derive(Clone)]
pub struct Token {
    access_token: String,
    token_type: String,
    expires_at: DateTime<Utc>,
    refresh_token: Option<String>,
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("token_type", &self.token_type)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

impl Token {
    /// Creates a token that expires `expires_in` from now.
    pub fn new(access_token: impl Into<String>, token_type: impl Into<String>, expires_in: Duration) -> Self {
        let lifetime = chrono::Duration::from_std(expires_in).unwrap_or(chrono::Duration::MAX);
        Token {
            access_token: access_token.into(),
            token_type: token_type.into(),
            expires_at: Utc::now()
                .checked_add_signed(lifetime)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
            refresh_token: None,
        }
    }

    /// Converts a token endpoint response, anchoring expiry at now.
    pub fn from_response(resp: TokenResponse) -> Self {
        let mut token = Token::new(
            resp.access_token,
            resp.token_type,
            Duration::from_secs(resp.expires_in),
        );
        token.refresh_token = resp.refresh_token;
        token
    }

    /// The raw bearer string.
    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    /// Token kind as reported by the server.
    pub fn token_type(&self) -> &str {
        &self.token_type
    }

    /// Absolute expiry instant.
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Refresh token, if one was issued.
    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref()
    }

    /// True once the expiry instant has passed.
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }

    /// True when the token expires within `threshold` from now.
    pub fn expires_soon(&self, threshold: Duration) -> bool {
        let threshold = chrono::Duration::from_std(threshold).unwrap_or(chrono::Duration::MAX);
        match self.expires_at.checked_sub_signed(threshold) {
            Some(deadline) => Utc::now() >= deadline,
            None => true,
        }
    }

    /// Usable for a new request: not within [`EXPIRES_SOON`] of expiry.
    pub fn is_valid(&self) -> bool {
        !self.expires_soon(EXPIRES_SOON)
    }

    /// `Authorization` header value. Always `Bearer`, whatever case the
    /// server used for `token_type`.
    pub fn authorization_value(&self) -> String {
        format!("Bearer {}", self.access_token)
    }
}

// ── WhoAmI ─────────────────────────────────────────────────────────────

/// Kind of principal the credentials belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdType {
    /// A single Sophos Central tenant.
    Tenant,
    /// A partner managing many tenants.
    Partner,
    /// An enterprise organization managing many tenants.
    Organization,
    /// Catch-all for id types this crate does not know yet.
    #[serde(other)]
    Unknown,
}

/// Result of the `whoami` call: who the caller is and which host serves it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WhoAmI {
    /// Tenant, partner, or organization id.
    pub id: String,
    /// What kind of principal `id` identifies.
    pub id_type: IdType,
    /// Logical host name (`global`, `dataRegion`) to base URL.
    #[serde(default)]
    pub api_hosts: BTreeMap<String, String>,
}

impl WhoAmI {
    /// Global API host (partner/organization-level APIs).
    pub fn global_url(&self) -> Option<&str> {
        self.api_hosts.get("global").map(String::as_str)
    }

    /// Data-region API host (tenant-level APIs). Only present for tenants.
    pub fn data_region_url(&self) -> Option<&str> {
        self.api_hosts.get("dataRegion").map(String::as_str)
    }

    /// The host tenant-scoped resource calls should go to.
    pub fn api_url(&self) -> Option<&str> {
        match self.id_type {
            IdType::Partner => self.global_url(),
            _ => self.data_region_url().or_else(|| self.global_url()),
        }
    }

    /// The scope header Sophos expects for this principal.
    pub fn scope_header(&self) -> Option<(&'static str, &str)> {
        match self.id_type {
            IdType::Tenant => Some(("X-Tenant-ID", self.id.as_str())),
            IdType::Partner => Some(("X-Partner-ID", self.id.as_str())),
            IdType::Organization => Some(("X-Organization-ID", self.id.as_str())),
            IdType::Unknown => None,
        }
    }
}

// ── Provider ───────────────────────────────────────────────────────────

/// Acquires and caches OAuth2 tokens and the caller's whoami result.
///
/// Invariants:
/// - `token` is `None` until the first successful acquisition.
/// - A cached token is handed out only while `Token::is_valid()` holds;
///   otherwise the next `get_token()` re-acquires it.
/// - `whoami` is fetched at most once per provider until `clear_cache()`.
pub struct TokenProvider {
    client: Client,
    token_url: String,
    whoami_url: String,
    credentials: Credentials,
    token: Option<Token>,
    whoami: Option<WhoAmI>,
}

impl TokenProvider {
    /// Creates a provider for the given credentials against the real
    /// Sophos endpoints.
    pub fn new(credentials: Credentials) -> Self {
        TokenProvider {
            client: Client::builder()
                .timeout(AUTH_REQUEST_TIMEOUT)
                .build()
                .unwrap_or_default(),
            token_url: TOKEN_URL.to_string(),
            whoami_url: WHOAMI_URL.to_string(),
            credentials,
            token: None,
            whoami: None,
        }
    }

    /// Creates a provider with a pre-set token, bypassing the token endpoint.
    /// Used by tests; the token is valid for an hour.
    pub fn with_token(token: &str) -> Self {
        TokenProvider::new(Credentials::new("", ""))
            .with_cached_token(Token::new(token, "bearer", Duration::from_secs(3600)))
    }

    /// Seeds the token cache.
    pub fn with_cached_token(mut self, token: Token) -> Self {
        self.token = Some(token);
        self
    }

    /// Overrides the token and whoami endpoints (mock servers, staging).
    pub fn with_endpoints(mut self, token_url: &str, whoami_url: &str) -> Self {
        self.token_url = token_url.to_string();
        self.whoami_url = whoami_url.to_string();
        self
    }

    /// Where this provider's credentials came from.
    pub fn credential_source(&self) -> &CredentialSource {
        self.credentials.source()
    }

    /// Returns the cached token if it is not expiring soon.
    pub fn token(&self) -> Option<&Token> {
        self.token.as_ref().filter(|t| t.is_valid())
    }

    /// Returns a valid token, acquiring a new one only when the cache is
    /// empty or expiring soon.
    pub async fn get_token(&mut self) -> Result<Token> {
        if let Some(token) = self.token() {
            return Ok(token.clone());
        }
        self.refresh_token().await
    }

    /// Forces re-acquisition regardless of cache state.
    ///
    /// The response body is read before checking the status so that the
    /// Sophos error description survives into the error message.
    #[instrument(skip(self), fields(source = %self.credentials.source()))]
    pub async fn refresh_token(&mut self) -> Result<Token> {
        info!("Acquiring access token");
        let form = TokenRequest {
            grant_type: "client_credentials",
            client_id: &self.credentials.client_id,
            client_secret: &self.credentials.client_secret,
            scope: "token",
        };

        let response = self
            .client
            .post(&self.token_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| self.auth_error("token request could not be sent", Some(Box::new(e))))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| self.auth_error("token response could not be read", Some(Box::new(e))))?;

        if !status.is_success() {
            return Err(self.auth_error(&format!("token request failed ({status}): {body}"), None));
        }

        let parsed: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| self.auth_error("token response is malformed", Some(Box::new(e))))?;
        let token = Token::from_response(parsed);
        debug!(expires_at = %token.expires_at(), "Access token acquired");
        self.token = Some(token.clone());
        Ok(token)
    }

    /// `{"Authorization": "Bearer <token>"}` for the current valid token.
    pub async fn authorization_header(&mut self) -> Result<HeaderMap> {
        let token = self.get_token().await?;
        let value = HeaderValue::from_str(&token.authorization_value())
            .map_err(|e| self.auth_error("token is not a valid header value", Some(Box::new(e))))?;
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, value);
        Ok(headers)
    }

    /// Fetches (once) and returns the caller's whoami result.
    #[instrument(skip(self))]
    pub async fn whoami(&mut self) -> Result<WhoAmI> {
        if let Some(cached) = &self.whoami {
            return Ok(cached.clone());
        }

        let token = self.get_token().await?;
        let response = self
            .client
            .get(&self.whoami_url)
            .bearer_auth(token.access_token())
            .send()
            .await
            .map_err(|e| self.auth_error("whoami request could not be sent", Some(Box::new(e))))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| self.auth_error("whoami response could not be read", Some(Box::new(e))))?;
        if !status.is_success() {
            return Err(self.auth_error(&format!("whoami request failed ({status}): {body}"), None));
        }

        let whoami: WhoAmI = serde_json::from_str(&body)?;
        debug!(id = %whoami.id, id_type = ?whoami.id_type, "Resolved caller identity");
        self.whoami = Some(whoami.clone());
        Ok(whoami)
    }

    /// Drops the cached token so the next call re-acquires it.
    pub fn invalidate(&mut self) {
        self.token = None;
    }

    /// Drops both the cached token and the cached whoami result.
    pub fn clear_cache(&mut self) {
        self.token = None;
        self.whoami = None;
    }

    fn auth_error(
        &self,
        message: &str,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    ) -> SophosError {
        SophosError::Authentication {
            message: message.to_string(),
            credential_source: self.credentials.source().clone(),
            source,
        }
    }
}
