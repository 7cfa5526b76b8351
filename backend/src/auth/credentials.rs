use chrono::Utc;
use reqwest::Client as HttpClient;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

use super::assertion::sign_assertion;
use super::models::{
    AccessToken, AuthorizedUserKey, CLOUD_PLATFORM_SCOPE, CredentialsFile, JWT_BEARER_GRANT,
    REFRESH_TOKEN_GRANT, ServiceAccountKey, TokenResponse,
};
use crate::config::{CredentialStrategy, CredentialsConfig};

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Token request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Failed to read credentials file {path}: {source}")]
    KeyFile {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Credential strategy 'file' requires SERVICE_ACCOUNT_FILE")]
    MissingKeyFile,
    #[error("Invalid credentials file: {0}")]
    InvalidKey(String),
    #[error("Failed to sign token assertion: {0}")]
    Signing(jsonwebtoken::errors::Error),
    #[error("Token endpoint rejected the request ({status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("Token endpoint returned an empty access token")]
    EmptyToken,
}

#[derive(Debug, Clone)]
enum TokenSource {
    /// Compute metadata server of the environment the app runs in.
    Metadata { token_url: String },
    /// Service account or authorized user JSON file, re-read on every refresh.
    KeyFile { key_path: PathBuf },
}

/// Issues bearer tokens for the inference endpoint, caching each token until
/// shortly before it expires.
#[derive(Clone)]
pub struct CredentialProvider {
    http_client: HttpClient,
    source: TokenSource,
    cache: Arc<Mutex<Option<AccessToken>>>,
}

impl CredentialProvider {
    pub fn from_config(
        config: &CredentialsConfig,
        http_client: HttpClient,
    ) -> Result<Self, AuthError> {
        match config.strategy {
            CredentialStrategy::File => config
                .service_account_file
                .as_deref()
                .map(|path| Self::key_file(path, http_client))
                .ok_or(AuthError::MissingKeyFile),
            CredentialStrategy::Ambient => Ok(Self::ambient(config, http_client)),
        }
    }

    /// Application default credentials file when one was discovered, the
    /// metadata server otherwise.
    fn ambient(config: &CredentialsConfig, http_client: HttpClient) -> Self {
        match &config.application_default_file {
            Some(path) => {
                log::info!("Using application default credentials from {}", path.display());
                Self::key_file(path, http_client)
            }
            None => Self::metadata(&config.metadata_host, http_client),
        }
    }

    pub fn metadata(host: &str, http_client: HttpClient) -> Self {
        let token_url = format!(
            "http://{}/computeMetadata/v1/instance/service-accounts/default/token",
            host.trim_end_matches('/')
        );
        Self::with_source(TokenSource::Metadata { token_url }, http_client)
    }

    pub fn key_file(key_path: &Path, http_client: HttpClient) -> Self {
        Self::with_source(
            TokenSource::KeyFile {
                key_path: key_path.to_path_buf(),
            },
            http_client,
        )
    }

    fn with_source(source: TokenSource, http_client: HttpClient) -> Self {
        Self {
            http_client,
            source,
            cache: Arc::new(Mutex::new(None)),
        }
    }

    pub fn describe(&self) -> String {
        match &self.source {
            TokenSource::Metadata { token_url } => format!("metadata server ({})", token_url),
            TokenSource::KeyFile { key_path } => {
                format!("credentials file ({})", key_path.display())
            }
        }
    }

    /// Returns a token valid for at least the refresh margin, refreshing it
    /// first when the cached one is missing or about to expire.
    pub async fn token(&self) -> Result<String, AuthError> {
        let mut cached = self.cache.lock().await;

        if let Some(token) = cached.as_ref() {
            if token.is_fresh(Utc::now()) {
                return Ok(token.token.clone());
            }
            log::debug!("Cached access token expires at {}, refreshing", token.expires_at);
        }

        let issued_at = Utc::now();
        let response = match &self.source {
            TokenSource::Metadata { token_url } => self.fetch_from_metadata(token_url).await?,
            TokenSource::KeyFile { key_path } => self.fetch_with_key_file(key_path).await?,
        };

        if response.access_token.is_empty() {
            return Err(AuthError::EmptyToken);
        }

        let token = AccessToken::from_response(response, issued_at);
        log::debug!("Obtained access token valid until {}", token.expires_at);
        let value = token.token.clone();
        *cached = Some(token);
        Ok(value)
    }

    async fn fetch_from_metadata(&self, token_url: &str) -> Result<TokenResponse, AuthError> {
        let response = self
            .http_client
            .get(token_url)
            .header("Metadata-Flavor", "Google")
            .query(&[("scopes", CLOUD_PLATFORM_SCOPE)])
            .send()
            .await?;

        Self::parse_token_response(response).await
    }

    async fn fetch_with_key_file(&self, key_path: &Path) -> Result<TokenResponse, AuthError> {
        let raw = tokio::fs::read_to_string(key_path)
            .await
            .map_err(|source| AuthError::KeyFile {
                path: key_path.to_path_buf(),
                source,
            })?;
        let credentials: CredentialsFile =
            serde_json::from_str(&raw).map_err(|e| AuthError::InvalidKey(e.to_string()))?;

        match credentials {
            CredentialsFile::ServiceAccount(key) => self.exchange_assertion(&key).await,
            CredentialsFile::AuthorizedUser(key) => self.refresh_user_token(&key).await,
        }
    }

    async fn exchange_assertion(&self, key: &ServiceAccountKey) -> Result<TokenResponse, AuthError> {
        let assertion = sign_assertion(key)?;
        let params = [("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())];

        let response = self
            .http_client
            .post(&key.token_uri)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .form(&params)
            .send()
            .await?;

        Self::parse_token_response(response).await
    }

    async fn refresh_user_token(&self, key: &AuthorizedUserKey) -> Result<TokenResponse, AuthError> {
        let params = [
            ("grant_type", REFRESH_TOKEN_GRANT),
            ("client_id", key.client_id.as_str()),
            ("client_secret", key.client_secret.as_str()),
            ("refresh_token", key.refresh_token.as_str()),
        ];

        let response = self
            .http_client
            .post(&key.token_uri)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .form(&params)
            .send()
            .await?;

        Self::parse_token_response(response).await
    }

    async fn parse_token_response(response: reqwest::Response) -> Result<TokenResponse, AuthError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await?;
            return Err(AuthError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let token_response: TokenResponse = response.json().await?;
        Ok(token_response)
    }
}
