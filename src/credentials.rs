//! Azure credential acquisition.
//!
//! Mirrors the `DefaultAzureCredential` selection order: service principal
//! from the environment, then IMDS managed identity, then the Azure CLI.
//! Every credential is bound to a single resource at construction time and
//! caches its token until shortly before expiry.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{Error, Result};

/// Resource URI for the Azure management plane.
pub const MANAGEMENT_RESOURCE: &str = "https://management.azure.com";

/// Resource URI for the legacy directory graph.
pub const GRAPH_RESOURCE: &str = "https://graph.windows.net";

const DEFAULT_LOGIN_BASE: &str = "https://login.microsoftonline.com";
const IMDS_TOKEN_ENDPOINT: &str = "http://169.254.169.254/metadata/identity/oauth2/token";

/// Refresh tokens this long before they would expire.
const EXPIRY_MARGIN_SECS: u64 = 60;

/// Abstraction over Azure token acquisition.
#[async_trait]
pub trait TokenCredential: Send + Sync {
    /// Acquire a bearer token for the credential's configured resource.
    async fn token(&self) -> Result<String>;
}

/// Select a credential for `resource` the way `DefaultAzureCredential` does:
/// 1. `AZURE_CLIENT_ID` + `AZURE_CLIENT_SECRET` env vars → service principal
/// 2. `IDENTITY_ENDPOINT` env var → managed identity (IMDS)
/// 3. Otherwise → Azure CLI (`az account get-access-token`)
pub fn default_credential(
    tenant_id: &str,
    resource: &str,
    http: reqwest::Client,
) -> Box<dyn TokenCredential> {
    if let (Ok(client_id), Ok(client_secret)) = (
        std::env::var("AZURE_CLIENT_ID"),
        std::env::var("AZURE_CLIENT_SECRET"),
    ) {
        debug!(resource, "using service principal credential");
        Box::new(ClientSecretCredential::new(
            tenant_id,
            &client_id,
            &client_secret,
            resource,
            http,
        ))
    } else if std::env::var("IDENTITY_ENDPOINT").is_ok() {
        debug!(resource, "using managed identity credential");
        Box::new(ManagedIdentityCredential::new(resource, http))
    } else {
        debug!(resource, "using Azure CLI credential");
        Box::new(AzureCliCredential::new(tenant_id, resource))
    }
}

// ── Service principal ─────────────────────────────────────────────────────────

/// OAuth2 client-credentials grant against the v2.0 token endpoint.
pub struct ClientSecretCredential {
    tenant_id: String,
    client_id: String,
    client_secret: String,
    resource: String,
    login_base: String,
    http: reqwest::Client,
    cache: Mutex<Option<(String, Instant)>>,
}

impl ClientSecretCredential {
    pub fn new(
        tenant_id: &str,
        client_id: &str,
        client_secret: &str,
        resource: &str,
        http: reqwest::Client,
    ) -> Self {
        Self {
            tenant_id: tenant_id.to_string(),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            resource: resource.to_string(),
            login_base: DEFAULT_LOGIN_BASE.to_string(),
            http,
            cache: Mutex::new(None),
        }
    }

    /// Point the credential at a different login endpoint (sovereign clouds,
    /// tests).
    pub fn with_login_base(mut self, login_base: &str) -> Self {
        self.login_base = login_base.trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl TokenCredential for ClientSecretCredential {
    async fn token(&self) -> Result<String> {
        {
            let guard = self.cache.lock().await;
            if let Some((token, expiry)) = guard.as_ref() {
                if Instant::now() < *expiry {
                    return Ok(token.clone());
                }
            }
        }

        let url = format!("{}/{}/oauth2/v2.0/token", self.login_base, self.tenant_id);
        let scope = format!("{}/.default", self.resource);
        let params = [
            ("grant_type", "client_credentials"),
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
            ("scope", &scope),
        ];
        let resp = self
            .http
            .post(&url)
            .form(&params)
            .send()
            .await
            .map_err(|e| Error::token(&self.resource, format!("token request: {}", e)))?;

        let status = resp.status();
        if !status.is_success() {
            let body: Value = resp.json().await.unwrap_or(Value::Null);
            let description = body["error_description"]
                .as_str()
                .or_else(|| body["error"].as_str())
                .unwrap_or("no error description");
            return Err(Error::token(
                &self.resource,
                format!("token endpoint returned {}: {}", status, description),
            ));
        }

        let body: Value = resp
            .json()
            .await
            .map_err(|e| Error::token(&self.resource, format!("token decode: {}", e)))?;

        let token = body["access_token"]
            .as_str()
            .ok_or_else(|| {
                Error::token(&self.resource, format!("no access_token in response: {}", body))
            })?
            .to_string();
        let expires_in = body["expires_in"].as_u64().unwrap_or(3600);
        let expiry =
            Instant::now() + Duration::from_secs(expires_in.saturating_sub(EXPIRY_MARGIN_SECS));

        *self.cache.lock().await = Some((token.clone(), expiry));
        Ok(token)
    }
}

// ── Managed identity (IMDS) ───────────────────────────────────────────────────

/// Token acquisition through the instance metadata service.
pub struct ManagedIdentityCredential {
    resource: String,
    endpoint: String,
    http: reqwest::Client,
    cache: Mutex<Option<(String, Instant)>>,
}

impl ManagedIdentityCredential {
    pub fn new(resource: &str, http: reqwest::Client) -> Self {
        Self {
            resource: resource.to_string(),
            endpoint: IMDS_TOKEN_ENDPOINT.to_string(),
            http,
            cache: Mutex::new(None),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.to_string();
        self
    }
}

#[async_trait]
impl TokenCredential for ManagedIdentityCredential {
    async fn token(&self) -> Result<String> {
        {
            let guard = self.cache.lock().await;
            if let Some((token, expiry)) = guard.as_ref() {
                if Instant::now() < *expiry {
                    return Ok(token.clone());
                }
            }
        }

        let resp: Value = self
            .http
            .get(&self.endpoint)
            .header("Metadata", "true")
            .query(&[
                ("api-version", "2018-02-01"),
                ("resource", self.resource.as_str()),
            ])
            .send()
            .await
            .map_err(|e| Error::token(&self.resource, format!("IMDS request: {}", e)))?
            .json()
            .await
            .map_err(|e| Error::token(&self.resource, format!("IMDS decode: {}", e)))?;

        let token = resp["access_token"]
            .as_str()
            .ok_or_else(|| {
                Error::token(&self.resource, format!("no access_token in IMDS response: {}", resp))
            })?
            .to_string();
        // IMDS reports expires_in as a string.
        let expires_in = resp["expires_in"]
            .as_str()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(3600);
        let expiry =
            Instant::now() + Duration::from_secs(expires_in.saturating_sub(EXPIRY_MARGIN_SECS));

        *self.cache.lock().await = Some((token.clone(), expiry));
        Ok(token)
    }
}

// ── Azure CLI ─────────────────────────────────────────────────────────────────

/// Token acquisition through `az account get-access-token`. The CLI keeps
/// its own token cache, so none is layered here.
pub struct AzureCliCredential {
    tenant_id: String,
    resource: String,
    program: String,
}

impl AzureCliCredential {
    pub fn new(tenant_id: &str, resource: &str) -> Self {
        Self {
            tenant_id: tenant_id.to_string(),
            resource: resource.to_string(),
            program: "az".to_string(),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_program(mut self, program: &str) -> Self {
        self.program = program.to_string();
        self
    }
}

#[async_trait]
impl TokenCredential for AzureCliCredential {
    async fn token(&self) -> Result<String> {
        let output = Command::new(&self.program)
            .args([
                "account",
                "get-access-token",
                "--resource",
                &self.resource,
                "--tenant",
                &self.tenant_id,
                "--output",
                "json",
            ])
            .output()
            .await
            .map_err(|e| {
                Error::token(
                    &self.resource,
                    format!(
                        "az CLI not found: {}. Install Azure CLI or configure service principal credentials.",
                        e
                    ),
                )
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::token(
                &self.resource,
                format!(
                    "az account get-access-token failed: {}. Run 'az login' first.",
                    stderr.trim()
                ),
            ));
        }

        let resp: Value = serde_json::from_slice(&output.stdout)
            .map_err(|e| Error::token(&self.resource, format!("az CLI output parse: {}", e)))?;
        let token = resp["accessToken"]
            .as_str()
            .ok_or_else(|| Error::token(&self.resource, "no accessToken in az CLI output"))?
            .to_string();
        Ok(token)
    }
}

// ── Static ────────────────────────────────────────────────────────────────────

/// Fixed-token credential for tests and pre-acquired tokens.
pub struct StaticTokenCredential(pub String);

#[async_trait]
impl TokenCredential for StaticTokenCredential {
    async fn token(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
