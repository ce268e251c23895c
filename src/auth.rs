//! OAuth2 authentication management for Gmail API

use async_trait::async_trait;
use google_gmail1::{hyper_rustls, hyper_util, yup_oauth2, Gmail};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::client::{GmailClient, ProductionGmailClient};
use crate::error::{GmailError, Result};

/// Read/write access without permanent deletion; covers labels and sending
pub const MODIFY_SCOPE: &str = "https://www.googleapis.com/auth/gmail.modify";

/// Read-only access to messages and threads
pub const READONLY_SCOPE: &str = "https://www.googleapis.com/auth/gmail.readonly";

/// Scopes requested by the interactive flow
pub const REQUIRED_SCOPES: &[&str] = &[READONLY_SCOPE, MODIFY_SCOPE];

/// Type alias for Gmail Hub to simplify type signatures
pub type GmailHub = Gmail<hyper_rustls::HttpsConnector<hyper_util::client::legacy::connect::HttpConnector>>;

/// Source of an authorized mailbox client
///
/// The scheduler asks for a fresh client at the start of every cycle.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn obtain_authorized_client(&self) -> Result<Box<dyn GmailClient>>;
}

/// Installed-app OAuth2 flow with an on-disk token cache
#[derive(Debug, Clone)]
pub struct InstalledAppAuthenticator {
    credentials_path: PathBuf,
    token_cache_path: PathBuf,
    call_timeout: Option<Duration>,
}

impl InstalledAppAuthenticator {
    pub fn new(credentials_path: impl Into<PathBuf>, token_cache_path: impl Into<PathBuf>) -> Self {
        Self {
            credentials_path: credentials_path.into(),
            token_cache_path: token_cache_path.into(),
            call_timeout: None,
        }
    }

    /// Per-call timeout for the clients this authenticator hands out
    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = Some(call_timeout);
        self
    }

    /// Client over a freshly authorized hub
    pub async fn client(&self) -> Result<ProductionGmailClient> {
        let client = ProductionGmailClient::new(self.hub().await?);
        Ok(match self.call_timeout {
            Some(timeout) => client.with_call_timeout(timeout),
            None => client,
        })
    }

    /// Build the hub, running the browser flow only when no usable token is cached
    pub async fn hub(&self) -> Result<GmailHub> {
        load_credentials(&self.credentials_path).await?;

        if let Some(parent) = self.token_cache_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    GmailError::AuthError(format!("Failed to create token cache directory: {}", e))
                })?;
            }
        }

        let hub = initialize_gmail_hub(&self.credentials_path, &self.token_cache_path).await?;

        if self.token_cache_path.exists() {
            secure_token_file(&self.token_cache_path).await?;
        }

        Ok(hub)
    }
}

#[async_trait]
impl CredentialProvider for InstalledAppAuthenticator {
    async fn obtain_authorized_client(&self) -> Result<Box<dyn GmailClient>> {
        debug!("Authorizing with token cache {:?}", self.token_cache_path);
        Ok(Box::new(self.client().await?))
    }
}

/// Initialize Gmail API hub with OAuth2 authentication
///
/// This function sets up the complete Gmail API client with:
/// - OAuth2 authentication using InstalledFlow (desktop app flow)
/// - Token persistence to disk so later cycles reuse the refresh token
/// - HTTP/1 client with TLS support
///
/// # Arguments
/// * `credentials_path` - Path to the OAuth2 credentials JSON file
/// * `token_cache_path` - Path where access tokens will be cached
pub async fn initialize_gmail_hub(
    credentials_path: &Path,
    token_cache_path: &Path,
) -> Result<GmailHub> {
    let secret = yup_oauth2::read_application_secret(credentials_path)
        .await
        .map_err(|e| GmailError::AuthError(format!("Failed to read credentials: {}", e)))?;

    // HTTPRedirect opens a browser for user authorization
    let auth = yup_oauth2::InstalledFlowAuthenticator::builder(
        secret,
        yup_oauth2::InstalledFlowReturnMethod::HTTPRedirect,
    )
    .persist_tokens_to_disk(token_cache_path)
    .build()
    .await
    .map_err(|e| GmailError::AuthError(format!("Failed to build authenticator: {}", e)))?;

    // Obtain the token up front so every call below finds it cached with the right scopes
    let _token = auth
        .token(REQUIRED_SCOPES)
        .await
        .map_err(|e| GmailError::AuthError(format!("Failed to obtain token: {}", e)))?;

    let client = hyper_util::client::legacy::Client::builder(hyper_util::rt::TokioExecutor::new())
        .build(
            hyper_rustls::HttpsConnectorBuilder::new()
                .with_native_roots()
                .map_err(|e| GmailError::AuthError(format!("Failed to load TLS roots: {}", e)))?
                .https_or_http()
                .enable_http1()
                .build(),
        );

    info!("Gmail API client authorized");
    Ok(Gmail::new(client, auth))
}

/// Credential structure matching Google's OAuth2 credentials JSON format
///
/// Google issues either an `installed` (desktop) or a `web` client.
#[derive(Debug, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub installed: Option<ClientKeys>,
    #[serde(default)]
    pub web: Option<ClientKeys>,
}

impl Credentials {
    pub fn keys(&self) -> Option<&ClientKeys> {
        self.installed.as_ref().or(self.web.as_ref())
    }
}

/// OAuth client id and secret
#[derive(Debug, Serialize, Deserialize)]
pub struct ClientKeys {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub redirect_uris: Vec<String>,
}

/// Load OAuth2 credentials from a JSON file
///
/// Used to check the application-credentials file before a browser flow is
/// started, so a missing or malformed file is reported as an auth failure.
pub async fn load_credentials(path: &Path) -> Result<Credentials> {
    let content = tokio::fs::read_to_string(path).await.map_err(|e| {
        GmailError::AuthError(format!("Failed to read credentials file {:?}: {}", path, e))
    })?;
    let creds: Credentials = serde_json::from_str(&content).map_err(|e| {
        GmailError::AuthError(format!("Failed to parse credentials file {:?}: {}", path, e))
    })?;

    if creds.keys().is_none() {
        return Err(GmailError::AuthError(format!(
            "Credentials file {:?} has neither an 'installed' nor a 'web' client",
            path
        )));
    }

    Ok(creds)
}

/// Secure token file permissions on Unix systems
///
/// Sets file permissions to 0600 (read/write for owner only).
/// A token cache that cannot be secured is an auth failure.
#[cfg(unix)]
pub async fn secure_token_file(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let secure = async {
        let mut perms = tokio::fs::metadata(path).await?.permissions();
        perms.set_mode(0o600);
        tokio::fs::set_permissions(path, perms).await
    };
    secure.await.map_err(|e| {
        GmailError::AuthError(format!("Failed to secure token cache {:?}: {}", path, e))
    })
}

/// Windows uses ACLs instead of Unix permissions
#[cfg(windows)]
pub async fn secure_token_file(_path: &Path) -> Result<()> {
    Ok(())
}
