//! Authenticated HTTP transport for the Sophos Central REST APIs.
//!
//! `SophosClient` wraps a `reqwest::Client` and a `TokenProvider` behind a
//! `Mutex`, and is the single place where raw HTTP responses are turned into
//! `SophosError` variants. Resource modules (`endpoints`, `alerts`,
//! `tenants`) only ever call `request` or one of the verb helpers.
//!
//! Request lifecycle:
//! - Scope resolution: unless a base URL was configured, the first request
//!   calls `whoami` once and caches the regional API host and the tenant,
//!   organization, or partner header for the lifetime of the client.
//! - Lazy token acquisition: every attempt asks the provider for a valid
//!   token; the provider only hits the network when its cache is cold or
//!   the token expires within five minutes.
//! - One-shot 401 refresh: a `401 Unauthorized` invalidates the cached token,
//!   refreshes once, and repeats the request. The refresh does not consume a
//!   retry. A second 401 is an `Authentication` error.
//! - Bounded retry: GET, PUT, PATCH and DELETE are retried on 429, 500, 502,
//!   503 and 504, and on connect or timeout failures, with exponential
//!   backoff. POST is never retried. On 429 a `Retry-After` header wins over
//!   the computed delay, as long as it fits within `max_delay`. A longer
//!   server wait is not slept through: the call fails with `RateLimited`
//!   carrying the server's value so the caller can decide when to retry.
//!
//! Token refreshes from concurrent calls are serialized by the mutex, but two
//! calls that both observe a 401 will each refresh once. That redundant
//! refresh is accepted; there is no single-flight coordination.

use std::time::Duration;

use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, Method, Response, StatusCode};
use serde::{Serialize, de::DeserializeOwned};
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info, instrument, warn};

use crate::auth::{IdType, Token, TokenProvider, WhoAmI};
use crate::config::{ApiConfig, CredentialSource};
use crate::error::{ApiErrorDetails, Result, SophosError};
use crate::pagination::{Page, PageFuture, Paginator};
use crate::query::{CURSOR_PARAM, Query, QueryParams};

/// Connect timeout for API calls. Covers TCP + TLS handshake only.
const API_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default overall request timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Statuses retried for idempotent methods.
const TRANSIENT_STATUSES: [StatusCode; 5] = [
    StatusCode::TOO_MANY_REQUESTS,
    StatusCode::INTERNAL_SERVER_ERROR,
    StatusCode::BAD_GATEWAY,
    StatusCode::SERVICE_UNAVAILABLE,
    StatusCode::GATEWAY_TIMEOUT,
];

// ── Retry policy ───────────────────────────────────────────────────────

/// Exponential backoff settings for transient failures.
///
/// The delay before retry `n` (0-based) is
/// `initial_delay * backoff_factor^n`, capped at `max_delay`. With the
/// defaults that is 1s, 2s, 4s.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt. Total attempts = `max_retries + 1`.
    pub max_retries: u32,
    /// Multiplier applied per retry.
    pub backoff_factor: f64,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound for any computed delay.
    pub max_delay: Duration,
    /// Whether HTTP 429 is retried at all.
    pub rate_limit_retry: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_retries: 3,
            backoff_factor: 2.0,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            rate_limit_retry: true,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        RetryPolicy {
            max_retries: 0,
            ..RetryPolicy::default()
        }
    }

    /// Policy derived from the `[api]` config section.
    pub fn from_config(api: &ApiConfig) -> Self {
        RetryPolicy {
            max_retries: api.max_retries,
            backoff_factor: api.backoff_factor,
            rate_limit_retry: api.rate_limit_retry,
            ..RetryPolicy::default()
        }
    }

    /// Computed delay before retry number `retry` (0-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
        let secs = self.initial_delay.as_secs_f64() * self.backoff_factor.powi(exponent);
        let capped = secs.min(self.max_delay.as_secs_f64());
        Duration::try_from_secs_f64(capped).unwrap_or(self.max_delay)
    }

    /// Whether a response with `status` may be retried under this policy.
    pub fn retries_status(&self, status: StatusCode) -> bool {
        if status == StatusCode::TOO_MANY_REQUESTS {
            return self.rate_limit_retry;
        }
        TRANSIENT_STATUSES.contains(&status)
    }

    fn validate(&self) -> Result<()> {
        if self.max_retries > 10 {
            return Err(SophosError::Config(format!(
                "max_retries must be between 0 and 10, got {}",
                self.max_retries
            )));
        }
        if !self.backoff_factor.is_finite() || self.backoff_factor < 1.0 {
            return Err(SophosError::Config(format!(
                "backoff_factor must be at least 1.0, got {}",
                self.backoff_factor
            )));
        }
        Ok(())
    }
}

/// Methods that are safe to repeat without duplicating side effects.
fn is_idempotent(method: &Method) -> bool {
    matches!(
        *method,
        Method::GET | Method::PUT | Method::PATCH | Method::DELETE
    )
}

/// Parses an integer-seconds `Retry-After` header.
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Maps a non-success response to its error kind.
fn classify(details: ApiErrorDetails, retry_after: Option<Duration>, attempts: u32) -> SophosError {
    match details.status {
        StatusCode::BAD_REQUEST => SophosError::Validation {
            message: "request rejected by server".to_string(),
            details: Some(details),
        },
        StatusCode::FORBIDDEN => SophosError::Permission(details),
        StatusCode::NOT_FOUND => SophosError::NotFound(details),
        StatusCode::TOO_MANY_REQUESTS => SophosError::RateLimited {
            details,
            retry_after,
        },
        s if s.is_server_error() => SophosError::Server { details, attempts },
        _ => SophosError::Api(details),
    }
}

// ── Scope ──────────────────────────────────────────────────────────────

/// Resolved base URL plus the scope header sent with every request.
#[derive(Debug, Clone)]
struct ApiScope {
    base_url: String,
    headers: Vec<(&'static str, String)>,
}

impl ApiScope {
    fn fixed(base_url: &str, tenant_id: Option<&str>) -> Self {
        ApiScope {
            base_url: base_url.trim_end_matches('/').to_string(),
            headers: tenant_id
                .map(|t| vec![("X-Tenant-ID", t.to_string())])
                .unwrap_or_default(),
        }
    }

    fn from_whoami(who: &WhoAmI, tenant_id: Option<&str>) -> Result<Self> {
        let host = who.api_url().ok_or_else(|| {
            SophosError::Config(format!(
                "whoami returned no API host for {:?} {}",
                who.id_type, who.id
            ))
        })?;
        let mut scope = ApiScope::fixed(host, tenant_id);
        if tenant_id.is_none() {
            if let Some((name, value)) = who.scope_header() {
                scope.headers.push((name, value.to_string()));
            }
        } else if who.id_type == IdType::Organization {
            scope.headers.push(("X-Organization-ID", who.id.clone()));
        }
        Ok(scope)
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

// ── Builder ────────────────────────────────────────────────────────────

/// Builder for [`SophosClient`]. Obtain one with [`SophosClient::builder`].
pub struct ClientBuilder {
    provider: TokenProvider,
    base_url: Option<String>,
    tenant_id: Option<String>,
    timeout: Duration,
    retry: RetryPolicy,
}

impl ClientBuilder {
    /// Sends every request to `url` and skips whoami host resolution.
    pub fn base_url(mut self, url: &str) -> Self {
        self.base_url = Some(url.to_string());
        self
    }

    /// Tenant id sent as `X-Tenant-ID`.
    pub fn tenant_id(mut self, tenant_id: &str) -> Self {
        self.tenant_id = Some(tenant_id.to_string());
        self
    }

    /// Overall per-request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Replaces the retry policy.
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// Applies every setting from an `[api]` config section.
    pub fn api_config(mut self, api: &ApiConfig) -> Self {
        self.timeout = api.timeout();
        self.retry = RetryPolicy::from_config(api);
        if let Some(url) = &api.base_url {
            self.base_url = Some(url.clone());
        }
        if let Some(tenant) = &api.tenant_id {
            self.tenant_id = Some(tenant.clone());
        }
        self
    }

    /// Validates the settings and builds the client.
    pub fn build(self) -> Result<SophosClient> {
        self.retry.validate()?;
        if self.timeout.is_zero() {
            return Err(SophosError::Config("timeout must be greater than zero".into()));
        }
        if let Some(url) = &self.base_url {
            if !(url.starts_with("https://") || url.starts_with("http://")) {
                return Err(SophosError::Config(format!(
                    "base_url must be an http(s) URL, got '{url}'"
                )));
            }
        }
        if let Some(tenant) = &self.tenant_id {
            if tenant.trim().is_empty() {
                return Err(SophosError::Config("tenant_id must not be blank".into()));
            }
        }

        let http = Client::builder()
            .connect_timeout(API_CONNECT_TIMEOUT.min(self.timeout))
            .timeout(self.timeout)
            .build()
            .map_err(|e| SophosError::Config(format!("failed to build HTTP client: {e}")))?;

        let scope = OnceCell::new();
        if let Some(url) = &self.base_url {
            // Infallible on a fresh cell.
            let _ = scope.set(ApiScope::fixed(url, self.tenant_id.as_deref()));
        }

        Ok(SophosClient {
            http,
            credential_source: self.provider.credential_source().clone(),
            auth: Mutex::new(self.provider),
            tenant_id: self.tenant_id,
            retry: self.retry,
            scope,
        })
    }
}

// ── Client ─────────────────────────────────────────────────────────────

/// Authenticated HTTP client for the Sophos Central REST APIs.
///
/// - `auth` is behind a `Mutex` because token refresh requires `&mut self`
///   on the provider while API methods only need `&self`. The lock is held
///   only for the token check or refresh, never across an API round-trip.
/// - Settings are copied in at build time and cannot be changed afterwards.
///   Build a new client to change them.
pub struct SophosClient {
    http: Client,
    auth: Mutex<TokenProvider>,
    credential_source: CredentialSource,
    tenant_id: Option<String>,
    retry: RetryPolicy,
    scope: OnceCell<ApiScope>,
}

impl SophosClient {
    /// Starts a builder around an auth provider.
    pub fn builder(provider: TokenProvider) -> ClientBuilder {
        ClientBuilder {
            provider,
            base_url: None,
            tenant_id: None,
            timeout: DEFAULT_TIMEOUT,
            retry: RetryPolicy::default(),
        }
    }

    /// The retry policy in force.
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Where the credentials in use came from.
    pub fn credential_source(&self) -> &CredentialSource {
        &self.credential_source
    }

    /// The resolved API base URL, calling whoami on first use.
    pub async fn base_url(&self) -> Result<String> {
        Ok(self.scope().await?.base_url.clone())
    }

    async fn scope(&self) -> Result<&ApiScope> {
        self.scope
            .get_or_try_init(|| async {
                let who = self.auth.lock().await.whoami().await?;
                let scope = ApiScope::from_whoami(&who, self.tenant_id.as_deref())?;
                info!(base_url = %scope.base_url, id_type = ?who.id_type, "Resolved API host");
                Ok::<_, SophosError>(scope)
            })
            .await
    }

    // ── Auth passthroughs ──

    /// Returns a valid token, acquiring one only if needed.
    pub async fn token(&self) -> Result<Token> {
        self.auth.lock().await.get_token().await
    }

    /// Forces token re-acquisition.
    pub async fn refresh_token(&self) -> Result<Token> {
        self.auth.lock().await.refresh_token().await
    }

    /// The caller's identity, cached by the provider.
    pub async fn whoami(&self) -> Result<WhoAmI> {
        self.auth.lock().await.whoami().await
    }

    /// Drops the cached token and whoami result. The resolved API host is
    /// kept for the life of the client.
    pub async fn clear_auth_cache(&self) {
        self.auth.lock().await.clear_cache();
    }

    /// Invalidates the cached token and acquires a fresh one.
    async fn force_refresh(&self) -> Result<Token> {
        let mut auth = self.auth.lock().await;
        auth.invalidate();
        auth.refresh_token().await
    }

    // ── Requests ──

    /// Core HTTP method: sends one authenticated request under the retry
    /// policy and decodes the JSON response. All verb helpers delegate here.
    ///
    /// `path` is relative to the resolved base URL (leading slash optional).
    /// An empty body or `204 No Content` decodes as JSON `null`, so callers
    /// that expect nothing can use `T = ()` or `serde_json::Value`.
    #[instrument(skip(self, method, query, body, headers), fields(method = %method))]
    pub async fn request<T, B>(
        &self,
        method: Method,
        path: &str,
        query: Option<&QueryParams>,
        body: Option<&B>,
        headers: Option<&HeaderMap>,
    ) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let scope = self.scope().await?;
        let url = scope.url(path);
        let retryable = is_idempotent(&method);
        let mut retries: u32 = 0;
        let mut refreshed = false;

        loop {
            let token = self.token().await?;
            let mut req = self
                .http
                .request(method.clone(), &url)
                .bearer_auth(token.access_token());
            for (name, value) in &scope.headers {
                req = req.header(*name, value);
            }
            if let Some(q) = query {
                req = req.query(q);
            }
            if let Some(h) = headers {
                req = req.headers(h.clone());
            }
            if let Some(payload) = body {
                req = req.json(payload);
            }

            debug!(attempt = retries + 1, %url, "Sending request");
            let resp = match req.send().await {
                Ok(resp) => resp,
                Err(e) => {
                    let transient = e.is_connect() || e.is_timeout();
                    if retryable && transient && retries < self.retry.max_retries {
                        let delay = self.retry.delay_for(retries);
                        warn!(attempt = retries + 1, ?delay, error = %e, "Connection failed, retrying");
                        tokio::time::sleep(delay).await;
                        retries += 1;
                        continue;
                    }
                    return Err(SophosError::Connectivity {
                        message: format!("{method} {url} failed after {} attempt(s)", retries + 1),
                        source: e,
                    });
                }
            };

            let status = resp.status();
            if status == StatusCode::UNAUTHORIZED {
                if !refreshed {
                    debug!("Received 401, refreshing token once");
                    refreshed = true;
                    self.force_refresh().await?;
                    continue;
                }
                let text = read_body(resp, &method, &url).await?;
                let details = ApiErrorDetails::from_body(status, &text);
                return Err(SophosError::Authentication {
                    message: format!("request rejected after token refresh: {details}"),
                    credential_source: self.credential_source.clone(),
                    source: None,
                });
            }

            if status.is_success() {
                return decode(resp, &method, &url).await;
            }

            let retry_after = parse_retry_after(resp.headers());
            let text = read_body(resp, &method, &url).await?;
            let details = ApiErrorDetails::from_body(status, &text);

            if retryable && self.retry.retries_status(status) && retries < self.retry.max_retries {
                let delay = match (status, retry_after) {
                    (StatusCode::TOO_MANY_REQUESTS, Some(server)) if server > self.retry.max_delay => {
                        debug!(?server, max = ?self.retry.max_delay, "Retry-After exceeds max delay, giving up");
                        return Err(classify(details, retry_after, retries + 1));
                    }
                    (StatusCode::TOO_MANY_REQUESTS, Some(server)) => server,
                    _ => self.retry.delay_for(retries),
                };
                warn!(attempt = retries + 1, status = status.as_u16(), ?delay, "Transient failure, retrying");
                tokio::time::sleep(delay).await;
                retries += 1;
                continue;
            }

            return Err(classify(details, retry_after, retries + 1));
        }
    }

    /// Sends an authenticated GET with optional query parameters.
    pub async fn get<T: DeserializeOwned>(&self, path: &str, query: Option<&QueryParams>) -> Result<T> {
        self.request::<T, ()>(Method::GET, path, query, None, None).await
    }

    /// Sends an authenticated POST with a JSON body. Never retried.
    pub async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        self.request(Method::POST, path, None, Some(body), None).await
    }

    /// Sends an authenticated PUT with a JSON body.
    pub async fn put<B: Serialize + ?Sized, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        self.request(Method::PUT, path, None, Some(body), None).await
    }

    /// Sends an authenticated PATCH with a JSON body.
    pub async fn patch<B: Serialize + ?Sized, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        self.request(Method::PATCH, path, None, Some(body), None).await
    }

    /// Sends an authenticated DELETE.
    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.request::<T, ()>(Method::DELETE, path, None, None, None).await
    }

    /// Builds a paginator over a cursor listing at `path`.
    ///
    /// `query` is validated and serialized once, up front. Each page fetch
    /// sends those parameters with `pageFromKey` replaced by the cursor from
    /// the previous page. A cursor already set on `query` is where the
    /// first page starts. `query.limit(n)` becomes the paginator's item cap.
    pub fn paginate<'a, T>(
        &'a self,
        path: &str,
        query: &Query,
        max_pages: Option<usize>,
    ) -> Result<Paginator<'a, T>>
    where
        T: DeserializeOwned + Send + 'a,
    {
        let base = query.build()?;
        let path = path.to_string();
        let fetch = move |cursor: Option<String>| -> PageFuture<'a, T> {
            let mut params = base.clone();
            if let Some(cursor) = cursor {
                params.insert(CURSOR_PARAM.to_string(), cursor);
            }
            let path = path.clone();
            Box::pin(async move { self.get::<Page<T>>(&path, Some(&params)).await })
        };
        Ok(Paginator::new(fetch, query.requested_page_size(), max_pages)?.with_max_items(query.result_limit()))
    }
}

/// Reads the whole response body. A dropped connection mid-body is a
/// connectivity failure, not an empty message.
async fn read_body(resp: Response, method: &Method, url: &str) -> Result<String> {
    resp.text().await.map_err(|e| SophosError::Connectivity {
        message: format!("{method} {url}: failed to read response body"),
        source: e,
    })
}

/// Decodes a success body, treating empty bodies as JSON `null`.
async fn decode<T: DeserializeOwned>(resp: Response, method: &Method, url: &str) -> Result<T> {
    let status = resp.status();
    let text = read_body(resp, method, url).await?;
    if status == StatusCode::NO_CONTENT || text.trim().is_empty() {
        return Ok(serde_json::from_str("null")?);
    }
    Ok(serde_json::from_str(&text)?)
}
