//! `FlashArray` REST client.
//!
//! Unique responsibility: talk to the `FlashArray` REST 2.x control plane.
//!
//! API endpoints:
//! - POST <https://{host}/api/{version}/login>
//! - Header: api-token: <token> (exchanged for an `x-auth-token` session header)
//!
//! This module encapsulates:
//! - Session setup and a connectivity probe
//! - Paginated collection reads (`continuation_token`)
//! - The pod, NFS policy, client rule, directory export and file system calls
//!   a pod clone needs
//!
//! Orchestration code talks to the array through the [`ArrayApi`] trait so it
//! can run against an in-memory array in tests.

use async_trait::async_trait;
use reqwest::{Method, StatusCode, Url};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::debug;

/// Default REST API version segment.
pub const DEFAULT_API_VERSION: &str = "2.21";

const AUTH_TOKEN_HEADER: &str = "x-auth-token";
const API_TOKEN_HEADER: &str = "api-token";

/// Connection settings for a `FlashArray`.
#[derive(Clone, Debug)]
pub struct FlashArrayClientConfig {
    /// Array management address, with or without an `https://` scheme.
    pub host: String,

    /// API token used to open a REST session.
    pub api_token: String,

    /// REST API version segment (e.g. "2.21").
    pub api_version: String,

    /// Verify the array's TLS certificate.
    /// Arrays ship with self-signed certificates, so this is off by default.
    pub verify_tls: bool,

    /// User agent for HTTP requests.
    pub user_agent: String,
}

impl FlashArrayClientConfig {
    /// Settings with the default API version, TLS verification off and the
    /// crate user agent.
    #[must_use]
    pub fn new(host: impl Into<String>, api_token: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            api_token: api_token.into(),
            api_version: DEFAULT_API_VERSION.to_string(),
            verify_tls: false,
            user_agent: concat!("fa_pod_clone/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }

    /// Base URL of the array, `https://` prepended when no scheme was given.
    #[must_use]
    pub fn base_url(&self) -> String {
        let host = self.host.trim().trim_end_matches('/');
        if host.starts_with("http://") || host.starts_with("https://") {
            host.to_string()
        } else {
            format!("https://{host}")
        }
    }

    /// URL of a versioned endpoint.
    #[must_use]
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/api/{}/{}",
            self.base_url(),
            self.api_version,
            path.trim_start_matches('/')
        )
    }
}

// ============================================================================
// Resource types
// ============================================================================

/// Reference to another named array object (`{"name": "..."}`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    /// Referenced object name.
    pub name: String,
}

impl Reference {
    /// Create a reference to `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Name of an optional reference, empty when absent.
fn reference_name(reference: Option<&Reference>) -> &str {
    reference.map_or("", |r| r.name.as_str())
}

/// Volume (only used to probe connectivity).
#[derive(Debug, Clone, Deserialize)]
pub struct Volume {
    /// Volume name.
    pub name: String,
}

/// Pod.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Pod {
    /// Pod name.
    pub name: String,
}

/// NFS export policy.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NfsPolicy {
    /// Policy name.
    pub name: String,
    /// Owning pod, if any.
    #[serde(default)]
    pub pod: Option<Reference>,
}

impl NfsPolicy {
    /// Owning pod name, empty when the policy is not in a pod.
    #[must_use]
    pub fn pod_name(&self) -> &str {
        reference_name(self.pod.as_ref())
    }
}

/// NFS client access rule.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NfsClientRule {
    /// Rule name, unique within its policy.
    pub name: String,
    /// Policy the rule belongs to.
    pub policy: Reference,
    /// Client match (host, netgroup, CIDR or `*`).
    #[serde(default)]
    pub client: Option<String>,
}

/// Directory export.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DirectoryExport {
    /// Export name, unique on the array.
    pub export_name: String,
    /// Policy governing the export.
    pub policy: Reference,
    /// Managed directory being exported.
    pub directory: Reference,
}

/// File system.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FileSystem {
    /// File system name.
    pub name: String,
    /// Owning pod, if any.
    #[serde(default)]
    pub pod: Option<Reference>,
    /// Destroyed and pending eradication.
    #[serde(default)]
    pub destroyed: bool,
}

impl FileSystem {
    /// Owning pod name, `None` when the file system is not in a pod.
    #[must_use]
    pub fn pod_name(&self) -> Option<&str> {
        self.pod.as_ref().map(|p| p.name.as_str())
    }
}

/// Body of a clone-from-source pod creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PodClonePost {
    /// Quota limit of the new pod, 0 for none.
    pub quota_limit: u64,
    /// Promotion state the new pod is requested in.
    pub requested_promotion_state: String,
    /// Pod to clone from.
    pub source: Reference,
}

impl PodClonePost {
    /// Promoted, unlimited clone of `source_pod`.
    #[must_use]
    pub fn promoted_clone_of(source_pod: &str) -> Self {
        Self {
            quota_limit: 0,
            requested_promotion_state: "promoted".to_string(),
            source: Reference::new(source_pod),
        }
    }
}

/// Body of a directory export creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirectoryExportPost {
    /// Name of the new export.
    pub export_name: String,
    /// Exported path within the directory.
    pub path: String,
}

// ============================================================================
// Trait seam
// ============================================================================

/// Calls the pod clone workflow makes against an array.
///
/// Every method is a single remote call (collections are read to the end);
/// none of them retries.
#[async_trait]
pub trait ArrayApi: Send + Sync {
    /// List volumes (connectivity probe).
    async fn list_volumes(&self) -> Result<Vec<Volume>, ArrayError>;

    /// List every pod on the array.
    async fn list_pods(&self) -> Result<Vec<Pod>, ArrayError>;

    /// Create `target_pod` as a promoted clone of its source.
    async fn create_pod(&self, target_pod: &str, pod: &PodClonePost) -> Result<(), ArrayError>;

    /// List every NFS export policy on the array.
    async fn list_nfs_policies(&self) -> Result<Vec<NfsPolicy>, ArrayError>;

    /// Create `target` as a copy of the NFS policy `source`.
    async fn clone_nfs_policy(&self, source: &str, target: &str) -> Result<(), ArrayError>;

    /// List client rules of the given policies.
    async fn list_nfs_client_rules(
        &self,
        policy_names: &[String],
    ) -> Result<Vec<NfsClientRule>, ArrayError>;

    /// Delete one client rule of a policy.
    async fn delete_nfs_client_rule(
        &self,
        rule_name: &str,
        policy_name: &str,
    ) -> Result<(), ArrayError>;

    /// Add a rule set to a policy.
    async fn create_nfs_client_rules(
        &self,
        policy_name: &str,
        rules: &serde_json::Value,
    ) -> Result<(), ArrayError>;

    /// List directory exports governed by the given policies.
    async fn list_directory_exports(
        &self,
        policy_names: &[String],
    ) -> Result<Vec<DirectoryExport>, ArrayError>;

    /// Look up exports by export name, anywhere on the array.
    ///
    /// The array answers with an error status when no export has that name.
    async fn find_directory_exports(
        &self,
        export_name: &str,
    ) -> Result<Vec<DirectoryExport>, ArrayError>;

    /// Export `directory_name` under `policy_name`.
    async fn create_directory_export(
        &self,
        directory_name: &str,
        policy_name: &str,
        export: &DirectoryExportPost,
    ) -> Result<(), ArrayError>;

    /// List every file system on the array.
    async fn list_file_systems(&self) -> Result<Vec<FileSystem>, ArrayError>;
}

// ============================================================================
// HTTP implementation
// ============================================================================

/// REST session to one `FlashArray`.
pub struct FlashArrayClient {
    cfg: FlashArrayClientConfig,
    http: reqwest::Client,
    session_token: String,
}

impl FlashArrayClient {
    /// Open a session and probe it with a volume listing.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built, the login is
    /// refused or the probe read fails.
    pub async fn connect(cfg: FlashArrayClientConfig) -> Result<Self, ArrayError> {
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(!cfg.verify_tls)
            .user_agent(cfg.user_agent.clone())
            .build()
            .map_err(ArrayError::Http)?;

        let session_token = login(&http, &cfg).await?;
        let client = Self {
            cfg,
            http,
            session_token,
        };

        let probe = client.list_volumes().await?;
        debug!(volumes = probe.len(), "connectivity probe answered");

        Ok(client)
    }

    fn url(&self, path: &str, params: &[(&str, String)]) -> Result<Url, ArrayError> {
        let raw = self.cfg.endpoint(path);
        let parsed = if params.is_empty() {
            Url::parse(&raw)
        } else {
            Url::parse_with_params(&raw, params)
        };
        parsed.map_err(|e| ArrayError::InvalidUrl {
            url: raw,
            reason: e.to_string(),
        })
    }

    async fn send(
        &self,
        method: Method,
        url: Url,
        body: Option<&serde_json::Value>,
    ) -> Result<String, ArrayError> {
        debug!(%method, %url, "array request");

        let mut req = self
            .http
            .request(method, url)
            .header(AUTH_TOKEN_HEADER, &self.session_token);
        if let Some(body) = body {
            req = req.json(body);
        }

        let resp = req.send().await.map_err(ArrayError::Http)?;
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();

        if !status.is_success() {
            return Err(ArrayError::api(status, &text));
        }
        Ok(text)
    }

    async fn mutate(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, String)],
        body: Option<serde_json::Value>,
    ) -> Result<(), ArrayError> {
        let url = self.url(path, params)?;
        self.send(method, url, body.as_ref()).await.map(|_| ())
    }

    /// Read a collection to the end, following continuation tokens.
    async fn list_all<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<Vec<T>, ArrayError> {
        let mut items = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let mut page_params = params.to_vec();
            if let Some(token) = continuation.take() {
                page_params.push(("continuation_token", token));
            }

            let url = self.url(path, &page_params)?;
            let body = self.send(Method::GET, url, None).await?;
            let page: ListResponse<T> = parse_json(&body)?;
            items.extend(page.items);

            match page.continuation_token {
                Some(token) if !token.is_empty() => continuation = Some(token),
                _ => return Ok(items),
            }
        }
    }
}

#[async_trait]
impl ArrayApi for FlashArrayClient {
    async fn list_volumes(&self) -> Result<Vec<Volume>, ArrayError> {
        let url = self.url("volumes", &[("limit", "1".to_string())])?;
        let body = self.send(Method::GET, url, None).await?;
        let page: ListResponse<Volume> = parse_json(&body)?;
        Ok(page.items)
    }

    async fn list_pods(&self) -> Result<Vec<Pod>, ArrayError> {
        self.list_all("pods", &[]).await
    }

    async fn create_pod(&self, target_pod: &str, pod: &PodClonePost) -> Result<(), ArrayError> {
        let body = serde_json::to_value(pod).map_err(ArrayError::encode)?;
        self.mutate(
            Method::POST,
            "pods",
            &[("names", target_pod.to_string())],
            Some(body),
        )
        .await
    }

    async fn list_nfs_policies(&self) -> Result<Vec<NfsPolicy>, ArrayError> {
        self.list_all("policies/nfs", &[]).await
    }

    async fn clone_nfs_policy(&self, source: &str, target: &str) -> Result<(), ArrayError> {
        self.mutate(
            Method::POST,
            "policies/nfs",
            &[
                ("names", target.to_string()),
                ("source_names", source.to_string()),
            ],
            Some(serde_json::json!({})),
        )
        .await
    }

    async fn list_nfs_client_rules(
        &self,
        policy_names: &[String],
    ) -> Result<Vec<NfsClientRule>, ArrayError> {
        self.list_all(
            "policies/nfs/client-rules",
            &[("policy_names", join_names(policy_names))],
        )
        .await
    }

    async fn delete_nfs_client_rule(
        &self,
        rule_name: &str,
        policy_name: &str,
    ) -> Result<(), ArrayError> {
        self.mutate(
            Method::DELETE,
            "policies/nfs/client-rules",
            &[
                ("names", rule_name.to_string()),
                ("policy_names", policy_name.to_string()),
            ],
            None,
        )
        .await
    }

    async fn create_nfs_client_rules(
        &self,
        policy_name: &str,
        rules: &serde_json::Value,
    ) -> Result<(), ArrayError> {
        self.mutate(
            Method::POST,
            "policies/nfs/client-rules",
            &[("policy_names", policy_name.to_string())],
            Some(serde_json::json!({ "rules": rules })),
        )
        .await
    }

    async fn list_directory_exports(
        &self,
        policy_names: &[String],
    ) -> Result<Vec<DirectoryExport>, ArrayError> {
        self.list_all(
            "directory-exports",
            &[("policy_names", join_names(policy_names))],
        )
        .await
    }

    async fn find_directory_exports(
        &self,
        export_name: &str,
    ) -> Result<Vec<DirectoryExport>, ArrayError> {
        self.list_all(
            "directory-exports",
            &[("export_names", export_name.to_string())],
        )
        .await
    }

    async fn create_directory_export(
        &self,
        directory_name: &str,
        policy_name: &str,
        export: &DirectoryExportPost,
    ) -> Result<(), ArrayError> {
        let body = serde_json::to_value(export).map_err(ArrayError::encode)?;
        self.mutate(
            Method::POST,
            "directory-exports",
            &[
                ("directory_names", directory_name.to_string()),
                ("policy_names", policy_name.to_string()),
            ],
            Some(body),
        )
        .await
    }

    async fn list_file_systems(&self) -> Result<Vec<FileSystem>, ArrayError> {
        self.list_all("file-systems", &[]).await
    }
}

/// Exchange the API token for a session token.
async fn login(http: &reqwest::Client, cfg: &FlashArrayClientConfig) -> Result<String, ArrayError> {
    let url = cfg.endpoint("login");
    debug!(%url, "opening array session");

    let resp = http
        .post(&url)
        .header(API_TOKEN_HEADER, &cfg.api_token)
        .send()
        .await
        .map_err(ArrayError::Http)?;

    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(ArrayError::api(status, &body));
    }

    resp.headers()
        .get(AUTH_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or(ArrayError::MissingSessionToken)
}

// ============================================================================
// Wire types (internal)
// ============================================================================

#[derive(Debug, Deserialize)]
struct ListResponse<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
    #[serde(default)]
    continuation_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    errors: Vec<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    context: Option<String>,
}

fn parse_json<T: DeserializeOwned>(body: &str) -> Result<T, ArrayError> {
    serde_json::from_str(body).map_err(|source| ArrayError::Json {
        source,
        body: body.to_string(),
    })
}

fn join_names(names: &[String]) -> String {
    names.join(",")
}

/// Human readable message from an error response body.
///
/// Falls back to the raw body when it is not the array's error envelope.
fn error_message(body: &str) -> String {
    let Ok(parsed) = serde_json::from_str::<ErrorResponse>(body) else {
        return body.trim().to_string();
    };

    let messages: Vec<String> = parsed
        .errors
        .into_iter()
        .filter_map(|e| match (e.context, e.message) {
            (Some(ctx), Some(msg)) if !ctx.is_empty() => Some(format!("{ctx}: {msg}")),
            (_, Some(msg)) => Some(msg),
            (_, None) => None,
        })
        .collect();

    if messages.is_empty() {
        body.trim().to_string()
    } else {
        messages.join("; ")
    }
}

// ============================================================================
// Error type
// ============================================================================

/// Error type for `FlashArray` calls.
#[derive(Debug, thiserror::Error)]
pub enum ArrayError {
    /// Transport failure (DNS, TLS, connection, ...).
    #[error("http error: {0}")]
    Http(#[source] reqwest::Error),

    /// The array answered with a non-success status.
    #[error("api error: status={status}, message={message}")]
    Api {
        /// HTTP status code.
        status: StatusCode,
        /// Error messages returned by the array.
        message: String,
    },

    /// A response body could not be decoded.
    #[error("json error: {source}")]
    Json {
        /// The JSON parsing error.
        #[source]
        source: serde_json::Error,
        /// The response body.
        body: String,
    },

    /// A request body could not be encoded.
    #[error("request encoding error: {0}")]
    Encode(String),

    /// The login response did not carry a session token.
    #[error("login response carried no x-auth-token header")]
    MissingSessionToken,

    /// An endpoint URL could not be built.
    #[error("invalid url {url}: {reason}")]
    InvalidUrl {
        /// The offending URL.
        url: String,
        /// Parser message.
        reason: String,
    },
}

impl ArrayError {
    fn api(status: StatusCode, body: &str) -> Self {
        Self::Api {
            status,
            message: error_message(body),
        }
    }

    #[allow(clippy::needless_pass_by_value)]
    fn encode(e: serde_json::Error) -> Self {
        Self::Encode(e.to_string())
    }

    /// HTTP status attached to the error, if the array answered at all.
    #[must_use]
    pub const fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether the array answered with an error status (as opposed to a
    /// transport or decoding failure).
    #[must_use]
    pub const fn is_api(&self) -> bool {
        matches!(self, Self::Api { .. })
    }
}
