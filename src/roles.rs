//! Common API roles (`common/v1/roles`).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::client::SophosClient;
use crate::error::{Result, SophosError};
use crate::pagination::{Page, Paginator};
use crate::query::Query;

const API_BASE: &str = "common/v1";

/// One grant inside a role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Permission {
    /// What the grant applies to (`tenant`, `endpoint`, ...).
    pub scope: String,
    /// Allowed actions within the scope.
    #[serde(default)]
    pub actions: Vec<String>,
}

/// A role that can be assigned to admins.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Role {
    /// Role id.
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    #[allow(missing_docs)]
    pub description: Option<String>,
    #[serde(default)]
    #[allow(missing_docs)]
    pub permissions: Vec<Permission>,
    /// Built-in roles cannot be edited or deleted.
    #[serde(default)]
    pub builtin: Option<bool>,
}

/// Body for creating a role.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleCreate {
    #[allow(missing_docs)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[allow(missing_docs)]
    pub description: Option<String>,
    #[serde(default)]
    #[allow(missing_docs)]
    pub permissions: Vec<Permission>,
}

/// Partial update for a role. Unset fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoleUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[allow(missing_docs)]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[allow(missing_docs)]
    pub description: Option<String>,
    /// Replaces every permission when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permissions: Option<Vec<Permission>>,
}

/// Lists one page of roles.
pub async fn list_roles(client: &SophosClient, query: &Query) -> Result<Page<Role>> {
    let params = query.build()?;
    client.get(&format!("{API_BASE}/roles"), Some(&params)).await
}

/// Paginates over all roles matching `query`.
pub fn paginate_roles<'a>(
    client: &'a SophosClient,
    query: &Query,
    max_pages: Option<usize>,
) -> Result<Paginator<'a, Role>> {
    client.paginate(&format!("{API_BASE}/roles"), query, max_pages)
}

/// Retrieves one role.
pub async fn get_role(client: &SophosClient, role_id: &str) -> Result<Role> {
    client.get(&format!("{API_BASE}/roles/{role_id}"), None).await
}

/// Creates a role. POST, so never retried.
pub async fn create_role(client: &SophosClient, role: &RoleCreate) -> Result<Role> {
    if role.name.trim().is_empty() {
        return Err(SophosError::validation("a role needs a name"));
    }
    client.post(&format!("{API_BASE}/roles"), role).await
}

/// Applies a partial update.
pub async fn update_role(client: &SophosClient, role_id: &str, update: &RoleUpdate) -> Result<Role> {
    client
        .patch(&format!("{API_BASE}/roles/{role_id}"), update)
        .await
}

/// Deletes a custom role.
pub async fn delete_role(client: &SophosClient, role_id: &str) -> Result<Value> {
    client.delete(&format!("{API_BASE}/roles/{role_id}")).await
}
