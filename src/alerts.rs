//! Common API alerts (`common/v1/alerts`).
//!
//! Listing accepts comma-joined `product`, `category`, `severity` and `ids`
//! filters plus `groupKey`, `from` and `to`; build them with
//! [`FilterBuilder::in_list`](crate::query::FilterBuilder::in_list) and
//! `equals`. Actions are POSTed and therefore never retried.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::client::SophosClient;
use crate::error::{Result, SophosError};
use crate::pagination::{Page, Paginator};
use crate::query::Query;

const API_BASE: &str = "common/v1";

/// Alert severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[allow(missing_docs)]
pub enum AlertSeverity {
    Low,
    Medium,
    High,
    Critical,
    #[serde(other)]
    Unknown,
}

/// Alert category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub enum AlertCategory {
    Malware,
    Pua,
    Ransomware,
    Exploit,
    RuntimeDetection,
    PolicyViolation,
    SuspiciousBehavior,
    ThreatCase,
    #[serde(other)]
    Unknown,
}

/// Product that raised the alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[allow(missing_docs)]
pub enum AlertProduct {
    Endpoint,
    Server,
    Mobile,
    Email,
    Wireless,
    Firewall,
    Other,
    #[serde(other)]
    Unknown,
}

/// Agent the alert concerns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagedAgent {
    /// Endpoint id.
    pub id: String,
    /// Agent kind.
    #[serde(rename = "type", default)]
    pub agent_type: Option<String>,
}

/// Id plus optional display name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamedRef {
    #[allow(missing_docs)]
    pub id: String,
    #[serde(default)]
    #[allow(missing_docs)]
    pub name: Option<String>,
}

/// A Sophos Central alert.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    /// Alert id.
    pub id: String,
    /// Actions the API will accept for this alert.
    #[serde(default)]
    pub allowed_actions: Vec<String>,
    #[serde(default)]
    #[allow(missing_docs)]
    pub category: Option<AlertCategory>,
    /// Human-readable summary.
    #[serde(default)]
    pub description: Option<String>,
    /// Key grouping related alerts.
    #[serde(default)]
    pub group_key: Option<String>,
    #[serde(default)]
    #[allow(missing_docs)]
    pub managed_agent: Option<ManagedAgent>,
    #[serde(default)]
    #[allow(missing_docs)]
    pub person: Option<NamedRef>,
    #[serde(default)]
    #[allow(missing_docs)]
    pub product: Option<AlertProduct>,
    /// When the alert was raised.
    #[serde(default)]
    pub raised_at: Option<DateTime<Utc>>,
    #[serde(default)]
    #[allow(missing_docs)]
    pub severity: Option<AlertSeverity>,
    #[serde(default)]
    #[allow(missing_docs)]
    pub tenant: Option<NamedRef>,
    /// Event type, e.g. `Event::Endpoint::Threat::CleanedUp`.
    #[serde(rename = "type", default)]
    pub alert_type: Option<String>,
    /// Extra event data, passed through as-is.
    #[serde(default)]
    pub data: Option<Value>,
}

/// Actions that can be taken on an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub enum AlertAction {
    Acknowledge,
    CleanPua,
    CleanVirus,
    AuthPua,
    ClearThreat,
    ClearHmpa,
    SendMsgPua,
    SendMsgThreat,
}

impl AlertAction {
    /// Every action, in wire-name order.
    pub const ALL: [AlertAction; 8] = [
        AlertAction::Acknowledge,
        AlertAction::CleanPua,
        AlertAction::CleanVirus,
        AlertAction::AuthPua,
        AlertAction::ClearThreat,
        AlertAction::ClearHmpa,
        AlertAction::SendMsgPua,
        AlertAction::SendMsgThreat,
    ];

    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            AlertAction::Acknowledge => "acknowledge",
            AlertAction::CleanPua => "cleanPua",
            AlertAction::CleanVirus => "cleanVirus",
            AlertAction::AuthPua => "authPua",
            AlertAction::ClearThreat => "clearThreat",
            AlertAction::ClearHmpa => "clearHmpa",
            AlertAction::SendMsgPua => "sendMsgPua",
            AlertAction::SendMsgThreat => "sendMsgThreat",
        }
    }
}

impl fmt::Display for AlertAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertAction {
    type Err = SophosError;

    fn from_str(s: &str) -> Result<Self> {
        AlertAction::ALL
            .into_iter()
            .find(|a| a.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                let names: Vec<&str> = AlertAction::ALL.iter().map(|a| a.as_str()).collect();
                SophosError::validation(format!(
                    "unknown alert action '{s}', expected one of {}",
                    names.join(", ")
                ))
            })
    }
}

#[derive(Serialize)]
struct ActionRequest<'a> {
    action: AlertAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'a str>,
}

/// Lists one page of alerts.
pub async fn list_alerts(client: &SophosClient, query: &Query) -> Result<Page<Alert>> {
    let params = query.build()?;
    client.get(&format!("{API_BASE}/alerts"), Some(&params)).await
}

/// Paginates over all alerts matching `query`.
pub fn paginate_alerts<'a>(
    client: &'a SophosClient,
    query: &Query,
    max_pages: Option<usize>,
) -> Result<Paginator<'a, Alert>> {
    client.paginate(&format!("{API_BASE}/alerts"), query, max_pages)
}

/// Retrieves one alert.
pub async fn get_alert(client: &SophosClient, alert_id: &str) -> Result<Alert> {
    client
        .get(&format!("{API_BASE}/alerts/{alert_id}"), None)
        .await
}

/// Performs an action on an alert. Returns the server's action record.
pub async fn perform_alert_action(
    client: &SophosClient,
    alert_id: &str,
    action: AlertAction,
    message: Option<&str>,
) -> Result<Value> {
    let body = ActionRequest { action, message };
    client
        .post(&format!("{API_BASE}/alerts/{alert_id}/actions"), &body)
        .await
}
