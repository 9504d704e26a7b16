//! Endpoint API (`endpoint/v1`): managed computers and servers.
//!
//! - [`list_endpoints`] / [`paginate_endpoints`]: filtered, cursor-paged listing.
//! - [`get_endpoint`], [`update_endpoint`], [`delete_endpoint`]: single-endpoint CRUD.
//! - [`scan_endpoint`], [`isolate_endpoint`], [`unisolate_endpoint`]: response actions.
//! - [`get_tamper_protection`], [`update_tamper_protection`],
//!   [`get_tamper_protection_password`]: tamper protection settings.
//!
//! Common listing filters (all plain `equals` filters on [`Query`]):
//! `healthStatus`, `type`, `tamperProtectionEnabled`, `lockdownStatus`,
//! `lastSeenBefore`, `lastSeenAfter`, `ids`, `hostnameContains`,
//! `ipAddresses`, `macAddresses`, and `view` (`basic`, `summary`, `full`).

use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::client::SophosClient;
use crate::error::Result;
use crate::pagination::{Page, Paginator};
use crate::query::Query;

const API_BASE: &str = "endpoint/v1";

// ── Response types ─────────────────────────────────────────────────────

/// Health rating used for overall, threat, and service health.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HealthStatus {
    /// No problems.
    Good,
    /// Something needs a look.
    Suspicious,
    /// Action required.
    Bad,
    /// Not reported, or a value this crate does not know.
    #[serde(other)]
    Unknown,
}

/// Kind of managed endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EndpointType {
    /// Workstation or laptop.
    Computer,
    /// Server.
    Server,
    /// Sophos security virtual machine.
    SecurityVm,
    /// Catch-all for types this crate does not know.
    #[serde(other)]
    Unknown,
}

/// Server Lockdown state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub enum LockdownStatus {
    CreatingWhitelist,
    Installing,
    Locked,
    NotInstalled,
    Registering,
    Starting,
    Stopping,
    Unavailable,
    Uninstalled,
    Unlocked,
    #[serde(other)]
    Unknown,
}

/// Tenant reference embedded in endpoint records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantRef {
    /// Tenant id.
    pub id: String,
}

/// Threat health.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreatHealth {
    /// Threat status.
    pub status: HealthStatus,
}

/// One protection service and its state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceDetail {
    /// Service name.
    pub name: String,
    /// Free-form status (`running`, `stopped`, ...).
    pub status: String,
}

/// Protection services health.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServicesHealth {
    /// Aggregate service status.
    pub status: HealthStatus,
    /// Per-service breakdown.
    #[serde(default)]
    pub service_details: Vec<ServiceDetail>,
}

/// Endpoint health summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Health {
    /// Overall rating.
    pub overall: HealthStatus,
    /// Threat rating.
    #[serde(default)]
    pub threats: Option<ThreatHealth>,
    /// Services rating.
    #[serde(default)]
    pub services: Option<ServicesHealth>,
}

/// Operating system details.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OsInfo {
    /// True for server operating systems.
    #[serde(default)]
    pub is_server: bool,
    /// `windows`, `macOS`, or `linux`.
    #[serde(default)]
    pub platform: Option<String>,
    /// Full OS name.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    #[allow(missing_docs)]
    pub major_version: Option<u32>,
    #[serde(default)]
    #[allow(missing_docs)]
    pub minor_version: Option<u32>,
    #[serde(default)]
    #[allow(missing_docs)]
    pub build: Option<u32>,
}

/// User associated with the endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssociatedPerson {
    #[serde(default)]
    #[allow(missing_docs)]
    pub id: Option<String>,
    #[serde(default)]
    #[allow(missing_docs)]
    pub name: Option<String>,
    /// Login the association was made through.
    #[serde(default)]
    pub via_login: Option<String>,
}

/// A Sophos product installed on the endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignedProduct {
    /// Product code (`endpointProtection`, `interceptX`, ...).
    pub code: String,
    #[serde(default)]
    #[allow(missing_docs)]
    pub version: Option<String>,
    /// Installation status.
    #[serde(default)]
    pub status: Option<String>,
}

/// A managed endpoint.
///
/// Only `id` is required; everything else depends on the `view` requested
/// and on what the agent has reported.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    /// Endpoint id.
    pub id: String,
    /// Endpoint kind.
    #[serde(rename = "type", default)]
    pub endpoint_type: Option<EndpointType>,
    /// Owning tenant.
    #[serde(default)]
    pub tenant: Option<TenantRef>,
    /// Host name reported by the agent.
    #[serde(default)]
    pub hostname: Option<String>,
    /// Health summary.
    #[serde(default)]
    pub health: Option<Health>,
    /// Operating system.
    #[serde(default)]
    pub os: Option<OsInfo>,
    #[serde(default)]
    #[allow(missing_docs)]
    pub ipv4_addresses: Vec<String>,
    #[serde(default)]
    #[allow(missing_docs)]
    pub ipv6_addresses: Vec<String>,
    #[serde(default)]
    #[allow(missing_docs)]
    pub mac_addresses: Vec<String>,
    /// Primary user.
    #[serde(default)]
    pub associated_person: Option<AssociatedPerson>,
    /// Whether tamper protection is on.
    #[serde(default)]
    pub tamper_protection_enabled: Option<bool>,
    /// Installed products.
    #[serde(default)]
    pub assigned_products: Vec<AssignedProduct>,
    /// Last time the agent checked in.
    #[serde(default)]
    pub last_seen_at: Option<DateTime<Utc>>,
    /// Server Lockdown state.
    #[serde(default)]
    pub lockdown_status: Option<LockdownStatus>,
    /// Endpoint group, passed through as-is.
    #[serde(default)]
    pub group: Option<Value>,
    /// Disk encryption state, passed through as-is.
    #[serde(default)]
    pub encryption: Option<Value>,
}

/// Result of starting a scan or changing isolation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResponse {
    /// Job id.
    pub id: String,
    /// Job status.
    pub status: String,
}

/// Body for isolation changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsolationRequest {
    /// `true` isolates, `false` releases.
    pub enabled: bool,
    /// Optional audit comment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// Tamper protection state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TamperProtectionStatus {
    /// Enabled on this endpoint.
    pub enabled: bool,
    /// Enabled tenant-wide.
    #[serde(default)]
    pub globally_enabled: Option<bool>,
    /// Was enabled before the last change.
    #[serde(default)]
    pub previously_enabled: Option<bool>,
}

/// Body for tamper protection changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TamperProtectionUpdate {
    /// Desired state.
    pub enabled: bool,
    /// Issue a new tamper protection password.
    #[serde(default)]
    pub regenerate_password: bool,
}

/// Current tamper protection password.
#[derive(Clone, Serialize, Deserialize)]
pub struct TamperProtectionPassword {
    /// The password.
    pub password: String,
}

impl std::fmt::Debug for TamperProtectionPassword {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("TamperProtectionPassword { .. }")
    }
}

// ── API functions ──────────────────────────────────────────────────────

/// Lists one page of endpoints.
pub async fn list_endpoints(client: &SophosClient, query: &Query) -> Result<Page<Endpoint>> {
    let params = query.build()?;
    client
        .get(&format!("{API_BASE}/endpoints"), Some(&params))
        .await
}

/// Paginates over all endpoints matching `query`.
pub fn paginate_endpoints<'a>(
    client: &'a SophosClient,
    query: &Query,
    max_pages: Option<usize>,
) -> Result<Paginator<'a, Endpoint>> {
    client.paginate(&format!("{API_BASE}/endpoints"), query, max_pages)
}

/// Retrieves one endpoint. A 404 surfaces as `SophosError::NotFound`.
pub async fn get_endpoint(client: &SophosClient, endpoint_id: &str) -> Result<Endpoint> {
    client
        .get(&format!("{API_BASE}/endpoints/{endpoint_id}"), None)
        .await
}

/// Updates mutable endpoint properties with a partial JSON document.
pub async fn update_endpoint(client: &SophosClient, endpoint_id: &str, update: &Value) -> Result<Endpoint> {
    client
        .patch(&format!("{API_BASE}/endpoints/{endpoint_id}"), update)
        .await
}

/// Deletes (unregisters) an endpoint.
pub async fn delete_endpoint(client: &SophosClient, endpoint_id: &str) -> Result<Value> {
    client
        .delete(&format!("{API_BASE}/endpoints/{endpoint_id}"))
        .await
}

/// Starts an on-demand scan. POST, so never retried.
pub async fn scan_endpoint(client: &SophosClient, endpoint_id: &str) -> Result<ActionResponse> {
    client
        .post(
            &format!("{API_BASE}/endpoints/{endpoint_id}/scans"),
            &serde_json::json!({}),
        )
        .await
}

/// Isolates an endpoint from the network.
pub async fn isolate_endpoint(
    client: &SophosClient,
    endpoint_id: &str,
    comment: Option<&str>,
) -> Result<ActionResponse> {
    let body = IsolationRequest {
        enabled: true,
        comment: comment.map(str::to_string),
    };
    client
        .post(&format!("{API_BASE}/endpoints/{endpoint_id}/isolation"), &body)
        .await
}

/// Releases an endpoint from isolation. The comment, if any, travels in
/// the DELETE body.
pub async fn unisolate_endpoint(
    client: &SophosClient,
    endpoint_id: &str,
    comment: Option<&str>,
) -> Result<Value> {
    let path = format!("{API_BASE}/endpoints/{endpoint_id}/isolation");
    let body = comment.map(|c| serde_json::json!({ "comment": c }));
    client
        .request(Method::DELETE, &path, None, body.as_ref(), None)
        .await
}

/// Reads tamper protection state.
pub async fn get_tamper_protection(client: &SophosClient, endpoint_id: &str) -> Result<TamperProtectionStatus> {
    client
        .get(&format!("{API_BASE}/endpoints/{endpoint_id}/tamper-protection"), None)
        .await
}

/// Turns tamper protection on or off.
pub async fn update_tamper_protection(
    client: &SophosClient,
    endpoint_id: &str,
    update: &TamperProtectionUpdate,
) -> Result<TamperProtectionStatus> {
    client
        .post(&format!("{API_BASE}/endpoints/{endpoint_id}/tamper-protection"), update)
        .await
}

/// Reads the tamper protection password.
pub async fn get_tamper_protection_password(
    client: &SophosClient,
    endpoint_id: &str,
) -> Result<TamperProtectionPassword> {
    client
        .get(
            &format!("{API_BASE}/endpoints/{endpoint_id}/tamper-protection/password"),
            None,
        )
        .await
}
