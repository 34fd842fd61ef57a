//! Legacy AAD Graph client for directory-object lookups.

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::credentials::TokenCredential;
use crate::error::{Error, Result};

const DEFAULT_BASE_URL: &str = "https://graph.windows.net";
const GRAPH_API_VERSION: &str = "1.6";

/// A directory object (user, group, or service principal). `mail` is absent
/// for principal types that carry no mail attribute.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryObject {
    pub display_name: String,
    #[serde(default)]
    pub mail: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ObjectList {
    value: Vec<DirectoryObject>,
}

/// Client for the legacy directory graph (`graph.windows.net`).
pub struct GraphClient {
    http: reqwest::Client,
    credential: Box<dyn TokenCredential>,
    tenant_id: String,
    base_url: String,
}

impl GraphClient {
    pub fn new(http: reqwest::Client, credential: Box<dyn TokenCredential>, tenant_id: &str) -> Self {
        Self {
            http,
            credential,
            tenant_id: tenant_id.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Point the client at a different graph endpoint (sovereign clouds,
    /// tests).
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Look up directory objects by object ID, asking the directory to
    /// search object references as well.
    pub async fn get_objects_by_ids(&self, object_ids: &[&str]) -> Result<Vec<DirectoryObject>> {
        let operation = "get objects by ids";
        let url = format!(
            "{}/{}/getObjectsByObjectIds?api-version={}",
            self.base_url, self.tenant_id, GRAPH_API_VERSION
        );
        let body = json!({
            "objectIds": object_ids,
            "includeDirectoryObjectReferences": true,
        });

        let token = self.credential.token().await?;
        debug!(url, ?object_ids, "graph POST");
        let resp = self
            .http
            .post(&url)
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::transport(operation, e))?;

        let status = resp.status();
        if !status.is_success() {
            let body: Value = resp.json().await.unwrap_or(Value::Null);
            let (code, message) = parse_graph_error(&body);
            return Err(Error::api(operation, status.as_u16(), code, message));
        }

        let list: ObjectList = resp.json().await.map_err(|e| Error::transport(operation, e))?;
        Ok(list.value)
    }
}

/// Pull `code` and `message` out of a legacy graph error body. The graph
/// wraps errors in `odata.error` and nests the message under `value`.
fn parse_graph_error(body: &Value) -> (String, String) {
    let err = body
        .get("odata.error")
        .or_else(|| body.get("error"))
        .unwrap_or(body);
    let code = err["code"].as_str().unwrap_or("Unknown").to_string();
    let message = err["message"]["value"]
        .as_str()
        .or_else(|| err["message"].as_str())
        .unwrap_or("unknown error")
        .to_string();
    (code, message)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
