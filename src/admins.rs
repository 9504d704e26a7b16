//! Common API administrators (`common/v1/admins`).
//!
//! Creating and updating admins are POST and PATCH respectively. Creation is
//! never retried; an update is, since repeating the same PATCH is harmless.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::client::SophosClient;
use crate::error::{Result, SophosError};
use crate::pagination::{Page, Paginator};
use crate::query::Query;

const API_BASE: &str = "common/v1";

/// Role assigned to an admin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleRef {
    /// Role id.
    pub id: String,
    /// Role name.
    #[serde(default)]
    pub name: Option<String>,
}

/// Tenant an admin may act on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantRef {
    /// Tenant id.
    pub id: String,
    /// Tenant name.
    #[serde(default)]
    pub name: Option<String>,
}

/// A Sophos Central administrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Admin {
    /// Admin id.
    pub id: String,
    #[serde(default)]
    #[allow(missing_docs)]
    pub first_name: Option<String>,
    #[serde(default)]
    #[allow(missing_docs)]
    pub last_name: Option<String>,
    /// Login email address.
    #[serde(default)]
    pub email: Option<String>,
    /// Assigned role.
    #[serde(default)]
    pub role: Option<RoleRef>,
    /// Tenants this admin can access (partner and organization admins).
    #[serde(default)]
    pub tenants: Vec<TenantRef>,
    #[serde(default)]
    #[allow(missing_docs)]
    pub status: Option<String>,
}

/// Body for creating an admin.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminCreate {
    #[allow(missing_docs)]
    pub first_name: String,
    #[allow(missing_docs)]
    pub last_name: String,
    #[allow(missing_docs)]
    pub email: String,
    /// Role to assign.
    pub role_id: String,
    /// Tenants the admin may access. Empty for tenant-level admins.
    #[serde(default)]
    pub tenant_ids: Vec<String>,
}

/// Partial update for an admin. Unset fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[allow(missing_docs)]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[allow(missing_docs)]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[allow(missing_docs)]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[allow(missing_docs)]
    pub role_id: Option<String>,
    /// Replaces the tenant list when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_ids: Option<Vec<String>>,
}

impl AdminUpdate {
    /// True when the update would change nothing.
    pub fn is_empty(&self) -> bool {
        self.first_name.is_none()
            && self.last_name.is_none()
            && self.email.is_none()
            && self.role_id.is_none()
            && self.tenant_ids.is_none()
    }
}

/// Lists one page of admins.
pub async fn list_admins(client: &SophosClient, query: &Query) -> Result<Page<Admin>> {
    let params = query.build()?;
    client.get(&format!("{API_BASE}/admins"), Some(&params)).await
}

/// Paginates over all admins matching `query`.
pub fn paginate_admins<'a>(
    client: &'a SophosClient,
    query: &Query,
    max_pages: Option<usize>,
) -> Result<Paginator<'a, Admin>> {
    client.paginate(&format!("{API_BASE}/admins"), query, max_pages)
}

/// Retrieves one admin.
pub async fn get_admin(client: &SophosClient, admin_id: &str) -> Result<Admin> {
    client.get(&format!("{API_BASE}/admins/{admin_id}"), None).await
}

/// Creates an admin. POST, so never retried.
pub async fn create_admin(client: &SophosClient, admin: &AdminCreate) -> Result<Admin> {
    if admin.email.trim().is_empty() || admin.role_id.trim().is_empty() {
        return Err(SophosError::validation("an admin needs an email and a role id"));
    }
    client.post(&format!("{API_BASE}/admins"), admin).await
}

/// Applies a partial update. An empty update is rejected before any call.
pub async fn update_admin(client: &SophosClient, admin_id: &str, update: &AdminUpdate) -> Result<Admin> {
    if update.is_empty() {
        return Err(SophosError::validation("admin update sets no fields"));
    }
    client
        .patch(&format!("{API_BASE}/admins/{admin_id}"), update)
        .await
}

/// Deletes an admin.
pub async fn delete_admin(client: &SophosClient, admin_id: &str) -> Result<Value> {
    client.delete(&format!("{API_BASE}/admins/{admin_id}")).await
}
