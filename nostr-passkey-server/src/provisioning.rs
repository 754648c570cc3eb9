//! Optional pod provisioning at registration
//!
//! When a pod server is configured, every newly registered identity gets a
//! Solid pod on a Community Solid Server (CSS 7.x account API):
//!
//! 1. `GET  {base}/.account/` discovers `controls.account.create`
//! 2. `POST controls.account.create {}` returns an account token and controls
//! 3. `POST controls.password.create {email, password}` adds a password login
//! 4. `POST controls.account.pod {name}` creates the pod
//!
//! Provisioning never blocks registration: callers treat every error as
//! "no pod" and keep going.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use nostr_passkey_core::Identity;
use reqwest::Client;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, instrument};
use url::Url;

/// Timeout for each account API call
const STEP_TIMEOUT: Duration = Duration::from_secs(10);

/// Pod creation copies a template and is slower than the other steps
const POD_CREATE_TIMEOUT: Duration = Duration::from_secs(15);

const ACCOUNT_TOKEN_SCHEME: &str = "CSS-Account-Token";

const EMAIL_DOMAIN: &str = "pod.dreamlab-ai.com";

/// Provisioning errors
#[derive(Debug, thiserror::Error)]
pub enum ProvisioningError {
    #[error("Pod server request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Pod server returned status {status} for {step}")]
    Status { step: &'static str, status: u16 },

    #[error("Pod server response missing {0}")]
    MissingControl(&'static str),

    #[error("Pod server returned an unacceptable URL for {label}: {reason}")]
    InvalidUrl { label: &'static str, reason: String },

    #[error("Invalid pod server base URL: {0}")]
    InvalidBaseUrl(String),

    #[error("Randomness unavailable: {0}")]
    Randomness(String),

    #[error("Provisioning timed out after {0:?}")]
    Timeout(Duration),
}

/// Where an identity's pod lives
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PodInfo {
    pub web_id: String,
    pub pod_url: String,
}

/// Creates an external storage account for a freshly registered identity
#[async_trait]
pub trait PodProvisioner: Send + Sync {
    async fn provision(&self, identity: &Identity) -> Result<PodInfo, ProvisioningError>;
}

/// Community Solid Server account API client
#[derive(Debug, Clone)]
pub struct CssPodClient {
    client: Client,
    base: String,
    expected_host: String,
}

impl CssPodClient {
    /// Create a client for a pod server base URL
    pub fn new(base_url: &str) -> Result<Self, ProvisioningError> {
        let parsed =
            Url::parse(base_url).map_err(|e| ProvisioningError::InvalidBaseUrl(e.to_string()))?;
        let expected_host = host_with_port(&parsed)
            .ok_or_else(|| ProvisioningError::InvalidBaseUrl(format!("{base_url} has no host")))?;

        let client = Client::builder().build()?;

        Ok(Self {
            client,
            base: base_url.trim_end_matches('/').to_string(),
            expected_host,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base
    }

    async fn get_controls(
        &self,
        step: &'static str,
        token: Option<&str>,
    ) -> Result<Value, ProvisioningError> {
        let mut request = self
            .client
            .get(format!("{}/.account/", self.base))
            .timeout(STEP_TIMEOUT);
        if let Some(token) = token {
            request = request.header(
                reqwest::header::AUTHORIZATION,
                format!("{ACCOUNT_TOKEN_SCHEME} {token}"),
            );
        }
        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(ProvisioningError::Status {
                step,
                status: response.status().as_u16(),
            });
        }
        Ok(response.json().await?)
    }

    async fn post_json(
        &self,
        step: &'static str,
        url: &str,
        token: Option<&str>,
        body: &Value,
        timeout: Duration,
    ) -> Result<Value, ProvisioningError> {
        let mut request = self.client.post(url).json(body).timeout(timeout);
        if let Some(token) = token {
            request = request.header(
                reqwest::header::AUTHORIZATION,
                format!("{ACCOUNT_TOKEN_SCHEME} {token}"),
            );
        }
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ProvisioningError::Status {
                step,
                status: status.as_u16(),
            });
        }
        // Some steps answer with an empty body.
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    /// Check that a URL returned by the pod server is http(s) on the configured host
    fn validate_url(&self, raw: &str, label: &'static str) -> Result<String, ProvisioningError> {
        let parsed = Url::parse(raw).map_err(|e| ProvisioningError::InvalidUrl {
            label,
            reason: e.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ProvisioningError::InvalidUrl {
                label,
                reason: format!("scheme {}", parsed.scheme()),
            });
        }
        match host_with_port(&parsed) {
            Some(host) if host == self.expected_host => Ok(parsed.to_string()),
            host => Err(ProvisioningError::InvalidUrl {
                label,
                reason: format!(
                    "host {} (expected {})",
                    host.unwrap_or_default(),
                    self.expected_host
                ),
            }),
        }
    }
}

#[async_trait]
impl PodProvisioner for CssPodClient {
    #[instrument(level = "debug", skip_all, fields(identity = %identity))]
    async fn provision(&self, identity: &Identity) -> Result<PodInfo, ProvisioningError> {
        let discovery = self.get_controls("account discovery", None).await?;
        let create_account = control(&discovery, "/controls/account/create")
            .ok_or(ProvisioningError::MissingControl("controls.account.create"))?;
        let create_account = self.validate_url(&create_account, "controls.account.create")?;

        let account = self
            .post_json("account creation", &create_account, None, &json!({}), STEP_TIMEOUT)
            .await?;
        let token = account
            .get("authorization")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .ok_or(ProvisioningError::MissingControl("authorization"))?;

        let mut password_create = control(&account, "/controls/password/create");
        let mut pod_create = control(&account, "/controls/account/pod");
        if password_create.is_none() || pod_create.is_none() {
            debug!("Fetching per-account controls");
            let controls = self.get_controls("account controls", Some(&token)).await?;
            password_create =
                password_create.or_else(|| control(&controls, "/controls/password/create"));
            pod_create = pod_create.or_else(|| control(&controls, "/controls/account/pod"));
        }
        let password_create =
            password_create.ok_or(ProvisioningError::MissingControl("controls.password.create"))?;
        let pod_create =
            pod_create.ok_or(ProvisioningError::MissingControl("controls.account.pod"))?;

        // The account token only goes to the configured pod server.
        let password_create = self.validate_url(&password_create, "controls.password.create")?;
        let pod_create = self.validate_url(&pod_create, "controls.account.pod")?;

        let login = json!({
            "email": format!("nostr-{identity}@{EMAIL_DOMAIN}"),
            "password": random_password()?,
        });
        self.post_json("password registration", &password_create, Some(&token), &login, STEP_TIMEOUT)
            .await?;

        let pod_request = json!({
            "name": identity.as_str(),
            "settings": { "template": "filesystem.json" },
        });
        let pod = self
            .post_json("pod creation", &pod_create, Some(&token), &pod_request, POD_CREATE_TIMEOUT)
            .await?;

        let raw_pod_url = first_string(&pod, &["pod", "podBaseUrl", "podUrl"])
            .unwrap_or_else(|| format!("{}/{}/", self.base, identity));
        let raw_web_id = first_string(&pod, &["webId", "webid"])
            .unwrap_or_else(|| format!("{}/{}/profile/card#me", self.base, identity));

        Ok(PodInfo {
            web_id: self.validate_url(&raw_web_id, "webId")?,
            pod_url: self.validate_url(&raw_pod_url, "podUrl")?,
        })
    }
}

/// Run a provisioner under an overall deadline
pub async fn provision_with_timeout(
    provisioner: &dyn PodProvisioner,
    identity: &Identity,
    limit: Duration,
) -> Result<PodInfo, ProvisioningError> {
    tokio::time::timeout(limit, provisioner.provision(identity))
        .await
        .map_err(|_| ProvisioningError::Timeout(limit))?
}

fn host_with_port(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    Some(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

fn control(value: &Value, pointer: &str) -> Option<String> {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn first_string(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| {
        value
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    })
}

fn random_password() -> Result<String, ProvisioningError> {
    let mut bytes = [0u8; 24];
    getrandom::fill(&mut bytes).map_err(|e| ProvisioningError::Randomness(e.to_string()))?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}
