//! Async Rust client library for the Sophos Central REST APIs.
//!
//! Provides OAuth2 client-credentials authentication with whoami-based host
//! resolution, an HTTP transport with retry and backoff, a cursor
//! paginator, a typed filter/query builder, and a blocking facade for
//! synchronous callers.
//!
//! # Modules
//!
//! - [`admins`]: Common API administrators.
//! - [`alerts`]: Common API alerts and alert actions.
//! - [`auth`]: Token provider with expiry tracking and cached whoami.
//! - [`blocking`]: Blocking wrappers over the async client and paginator.
//! - [`client`]: Authenticated transport with retry and error classification.
//! - [`config`]: Credentials and settings from TOML, environment, or code.
//! - [`endpoints`]: Endpoint API (list, get, scan, isolation, tamper protection).
//! - [`error`]: Typed error hierarchy (`SophosError`) for all operations.
//! - [`export`]: JSON, CSV and table rendering of records.
//! - [`lifecycle`]: Async open/close pairs and scoped use.
//! - [`pagination`]: Cursor paginator over `pageFromKey` / `nextKey`.
//! - [`query`]: Filter and query builder producing wire parameters.
//! - [`roles`]: Common API roles and their permissions.
//! - [`tenants`]: Partner API tenants.
//!
//! # Quick Start
//!
//! ```ignore
//! use sophos_central::auth::TokenProvider;
//! use sophos_central::client::SophosClient;
//! use sophos_central::config::Credentials;
//! use sophos_central::endpoints::paginate_endpoints;
//! use sophos_central::query::Query;
//!
//! let provider = TokenProvider::new(Credentials::new("client-id", "client-secret"));
//! let client = SophosClient::builder(provider).build()?;
//! let query = Query::new().filter(|f| f.equals("healthStatus", "bad"));
//! let endpoints = paginate_endpoints(&client, &query, None)?.collect_all(None).await?;
//! ```

#![warn(missing_docs)]

pub mod admins;
pub mod alerts;
pub mod auth;
pub mod blocking;
pub mod client;
pub mod config;
pub mod endpoints;
pub mod error;
pub mod export;
pub mod lifecycle;
pub mod pagination;
pub mod query;
pub mod roles;
pub mod tenants;
