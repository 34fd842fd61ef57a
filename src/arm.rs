//! Azure Resource Manager client: subscription lookup and the
//! Microsoft.Authorization list operations.

use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::credentials::TokenCredential;
use crate::error::{Error, Result};

const DEFAULT_BASE_URL: &str = "https://management.azure.com";
const SUBSCRIPTIONS_API_VERSION: &str = "2020-01-01";
const AUTHORIZATION_API_VERSION: &str = "2022-04-01";

// ── Wire types ────────────────────────────────────────────────────────────────

/// One page of an ARM list response.
#[derive(Debug, Deserialize)]
struct ListPage<T> {
    value: Vec<T>,
    #[serde(rename = "nextLink")]
    next_link: Option<String>,
}

/// A subscription visible to the credential.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub subscription_id: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RoleAssignmentResource {
    properties: RoleAssignmentProperties,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RoleAssignmentProperties {
    principal_id: String,
    role_definition_id: String,
}

/// A role assignment, flattened from the ARM resource envelope.
///
/// `role_definition_id` is the full ARM resource ID of the definition it
/// references.
#[derive(Debug, Clone)]
pub struct RoleAssignment {
    pub principal_id: String,
    pub role_definition_id: String,
}

#[derive(Debug, Deserialize)]
struct RoleDefinitionResource {
    id: String,
    properties: RoleDefinitionProperties,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RoleDefinitionProperties {
    role_name: String,
}

// ── Client ────────────────────────────────────────────────────────────────────

/// Client for the Azure management plane.
pub struct ArmClient {
    http: reqwest::Client,
    credential: Box<dyn TokenCredential>,
    base_url: String,
}

impl ArmClient {
    pub fn new(http: reqwest::Client, credential: Box<dyn TokenCredential>) -> Self {
        Self {
            http,
            credential,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Point the client at a different management endpoint (sovereign clouds,
    /// tests).
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Find `subscription_id` among the subscriptions visible to the
    /// credential.
    ///
    /// Pages are fetched lazily and the walk stops at the first match, so
    /// subscriptions past the match are never requested. Exhausting the list
    /// without a match is an error.
    pub async fn find_subscription(&self, subscription_id: &str) -> Result<Subscription> {
        let mut url = format!(
            "{}/subscriptions?api-version={}",
            self.base_url, SUBSCRIPTIONS_API_VERSION
        );
        loop {
            let page: ListPage<Subscription> = self.get_page(&url, "list subscriptions").await?;
            if let Some(subscription) = page
                .value
                .into_iter()
                .find(|s| s.subscription_id == subscription_id)
            {
                return Ok(subscription);
            }
            match page.next_link {
                Some(next) => url = next,
                None => {
                    return Err(Error::SubscriptionNotFound {
                        subscription_id: subscription_id.to_string(),
                    })
                }
            }
        }
    }

    /// Load every role definition under `scope`, keyed by its full
    /// definition ID.
    pub async fn role_definitions(&self, scope: &str) -> Result<HashMap<String, String>> {
        let mut url = format!(
            "{}{}/providers/Microsoft.Authorization/roleDefinitions?api-version={}",
            self.base_url, scope, AUTHORIZATION_API_VERSION
        );
        let mut names = HashMap::new();
        loop {
            let page: ListPage<RoleDefinitionResource> =
                self.get_page(&url, "list role definitions").await?;
            for definition in page.value {
                names.insert(definition.id, definition.properties.role_name);
            }
            match page.next_link {
                Some(next) => url = next,
                None => return Ok(names),
            }
        }
    }

    /// List every role assignment in the subscription's authorization scope,
    /// in the order the service returns them.
    pub async fn role_assignments(&self, subscription_id: &str) -> Result<Vec<RoleAssignment>> {
        let mut url = format!(
            "{}/subscriptions/{}/providers/Microsoft.Authorization/roleAssignments?api-version={}",
            self.base_url, subscription_id, AUTHORIZATION_API_VERSION
        );
        let mut assignments = Vec::new();
        loop {
            let page: ListPage<RoleAssignmentResource> =
                self.get_page(&url, "list role assignments").await?;
            assignments.extend(page.value.into_iter().map(|resource| RoleAssignment {
                principal_id: resource.properties.principal_id,
                role_definition_id: resource.properties.role_definition_id,
            }));
            match page.next_link {
                Some(next) => url = next,
                None => return Ok(assignments),
            }
        }
    }

    async fn get_page<T: DeserializeOwned>(
        &self,
        url: &str,
        operation: &'static str,
    ) -> Result<ListPage<T>> {
        let token = self.credential.token().await?;
        debug!(url, "ARM GET");
        let resp = self
            .http
            .get(url)
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| Error::transport(operation, e))?;

        let status = resp.status();
        if !status.is_success() {
            let body: Value = resp.json().await.unwrap_or(Value::Null);
            let (code, message) = parse_arm_error(&body);
            return Err(Error::api(operation, status.as_u16(), code, message));
        }

        resp.json().await.map_err(|e| Error::transport(operation, e))
    }
}

// ── ARM error parsing ─────────────────────────────────────────────────────────

/// Pull `code` and `message` out of an ARM error body, tolerating the shapes
/// Azure actually returns (`error` or `Error` wrapper, or a bare object).
fn parse_arm_error(body: &Value) -> (String, String) {
    let err = body
        .get("error")
        .or_else(|| body.get("Error"))
        .unwrap_or(body);
    let code = err["code"].as_str().unwrap_or("Unknown").to_string();
    let message = err["message"].as_str().unwrap_or("unknown error").to_string();
    (code, message)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
