use std::fmt;
use std::future::Future;

use anyhow::Context;
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use yup_oauth2::{self as oauth2, authenticator::Authenticator};

use crate::config::{self, DeleteMode};
use crate::error::{PurgeError, Result};

/// Scope sufficient for listing, reading metadata and trashing messages
pub const GMAIL_MODIFY_SCOPE: &str = "https://www.googleapis.com/auth/gmail.modify";

/// Full mailbox scope, required by Gmail for permanent deletion
pub const GMAIL_FULL_SCOPE: &str = "https://mail.google.com/";

/// An access token handed to every mailbox provider call
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    access_token: String,
}

impl Credential {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
        }
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"<redacted>")
            .finish()
    }
}

/// Source of credentials - owns the token lifecycle so the engine never does
#[cfg_attr(test, mockall::automock)]
pub trait CredentialStore: Send + Sync {
    /// Returns a currently valid credential, refreshing it if needed
    fn credential(&self) -> impl Future<Output = Result<Credential>> + Send;
}

/// Returns the OAuth scopes needed for the given delete mode
pub fn scopes_for(mode: DeleteMode) -> &'static [&'static str] {
    match mode {
        DeleteMode::Trash => &[GMAIL_MODIFY_SCOPE],
        DeleteMode::Permanent => &[GMAIL_FULL_SCOPE],
    }
}

/// Credential store backed by the yup-oauth2 installed-app flow
pub struct OAuthCredentialStore {
    auth: Authenticator<HttpsConnector<HttpConnector>>,
    scopes: &'static [&'static str],
}

impl OAuthCredentialStore {
    /// Creates an authenticator that persists its tokens in the config directory
    pub async fn new(mode: DeleteMode) -> anyhow::Result<Self> {
        let secret_path = config::client_secret_path()?;

        if !secret_path.exists() {
            anyhow::bail!(
                "Client secret file not found at {:?}. \
                 Please download OAuth2 credentials from Google Cloud Console \
                 and save them as client_secret.json in {:?}",
                secret_path,
                config::config_dir()?
            );
        }

        let secret = oauth2::read_application_secret(&secret_path)
            .await
            .context("Failed to read client secret")?;

        config::ensure_config_dir()?;
        let token_path = config::token_cache_path()?;

        let auth = oauth2::InstalledFlowAuthenticator::builder(
            secret,
            oauth2::InstalledFlowReturnMethod::HTTPRedirect,
        )
        .persist_tokens_to_disk(&token_path)
        .build()
        .await
        .context("Failed to build authenticator")?;

        Ok(Self {
            auth,
            scopes: scopes_for(mode),
        })
    }
}

impl CredentialStore for OAuthCredentialStore {
    async fn credential(&self) -> Result<Credential> {
        let token = self
            .auth
            .token(self.scopes)
            .await
            .map_err(|e| PurgeError::Auth(format!("Failed to obtain access token: {e}")))?;

        token
            .token()
            .map(Credential::new)
            .ok_or_else(|| PurgeError::Auth("Authenticator returned no access token".to_string()))
    }
}

/// Credential store holding a fixed token (demo mode and tests)
#[derive(Debug, Clone, Default)]
pub struct StaticCredentialStore {
    credential: Option<Credential>,
}

impl StaticCredentialStore {
    pub fn new(credential: Credential) -> Self {
        Self {
            credential: Some(credential),
        }
    }

    /// A store with no credential; every request fails with an auth error
    #[cfg(test)]
    pub fn empty() -> Self {
        Self::default()
    }
}

impl CredentialStore for StaticCredentialStore {
    async fn credential(&self) -> Result<Credential> {
        self.credential
            .clone()
            .ok_or_else(|| PurgeError::Auth("No credentials available".to_string()))
    }
}
