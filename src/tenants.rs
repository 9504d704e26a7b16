//! Partner API tenants (`partner/v1/tenants`).
//!
//! Requires partner credentials: the client sends `X-Partner-ID` from the
//! whoami result and talks to the global API host.

use serde::{Deserialize, Serialize};

use crate::client::SophosClient;
use crate::error::Result;
use crate::pagination::{Page, Paginator};
use crate::query::Query;

const API_BASE: &str = "partner/v1";

/// Partner reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartnerRef {
    /// Partner id.
    pub id: String,
}

/// A tenant managed by the calling partner.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tenant {
    /// Tenant id, used as `X-Tenant-ID` for tenant-scoped calls.
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Data region code (`us`, `eu`, ...).
    #[serde(default)]
    pub data_region: Option<String>,
    #[serde(default)]
    #[allow(missing_docs)]
    pub data_geography: Option<String>,
    /// `trial`, `usage`, or `user`.
    #[serde(default)]
    pub billing_type: Option<String>,
    #[serde(default)]
    #[allow(missing_docs)]
    pub partner: Option<PartnerRef>,
    /// Regional API host serving this tenant.
    #[serde(default)]
    pub api_host: Option<String>,
    #[serde(default)]
    #[allow(missing_docs)]
    pub status: Option<String>,
}

/// Lists one page of tenants.
pub async fn list_tenants(client: &SophosClient, query: &Query) -> Result<Page<Tenant>> {
    let params = query.build()?;
    client.get(&format!("{API_BASE}/tenants"), Some(&params)).await
}

/// Paginates over all tenants matching `query`.
pub fn paginate_tenants<'a>(
    client: &'a SophosClient,
    query: &Query,
    max_pages: Option<usize>,
) -> Result<Paginator<'a, Tenant>> {
    client.paginate(&format!("{API_BASE}/tenants"), query, max_pages)
}

/// Retrieves one tenant.
pub async fn get_tenant(client: &SophosClient, tenant_id: &str) -> Result<Tenant> {
    client
        .get(&format!("{API_BASE}/tenants/{tenant_id}"), None)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tenant_deserializes() {
        let json = r#"{
            "id": "t-1",
            "name": "Acme Corp",
            "dataRegion": "eu",
            "dataGeography": "EU",
            "billingType": "usage",
            "partner": {"id": "p-1"},
            "apiHost": "https://api-eu01.central.sophos.com",
            "status": "active",
            "products": [{"code": "endpoint"}]
        }"#;
        let t: Tenant = serde_json::from_str(json).unwrap();
        assert_eq!(t.data_region.as_deref(), Some("eu"));
        assert_eq!(t.api_host.as_deref(), Some("https://api-eu01.central.sophos.com"));
        assert_eq!(t.partner.unwrap().id, "p-1");
    }
}
