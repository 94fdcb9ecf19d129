//! Service account authentication for Google APIs.
//!
//! Signs an RS256 JWT assertion with the service account's private key and
//! exchanges it at the account's token endpoint for a short-lived access token.
//! The token is cached and refreshed a minute before it expires.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::constants::VISION_SCOPE;

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
const REFRESH_MARGIN_SECS: i64 = 60;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("could not read credentials file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid credentials JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("could not sign assertion: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
    #[error("token request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("token endpoint returned {status}: {body}")]
    Token {
        status: reqwest::StatusCode,
        body: String,
    },
}

/// Fields used from the service account JSON key file
#[derive(Debug, Clone, Deserialize)]
struct ServiceAccountCredentials {
    client_email: String,
    private_key: String,
    #[serde(default = "default_token_uri")]
    token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

#[derive(Debug, Serialize)]
struct JwtClaims {
    iss: String,
    scope: String,
    aud: String,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    ASSERTION_LIFETIME_SECS
}

struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now + Duration::seconds(REFRESH_MARGIN_SECS)
    }
}

pub struct ServiceAccountAuth {
    credentials: ServiceAccountCredentials,
    http: Client,
    cached_token: RwLock<Option<CachedToken>>,
}

impl ServiceAccountAuth {
    pub async fn from_file(path: &Path, http: Client) -> Result<Self, AuthError> {
        let content = tokio::fs::read_to_string(path).await?;
        Self::from_json(&content, http)
    }

    pub fn from_json(json: &str, http: Client) -> Result<Self, AuthError> {
        let credentials: ServiceAccountCredentials = serde_json::from_str(json)?;
        Ok(Self {
            credentials,
            http,
            cached_token: RwLock::new(None),
        })
    }

    /// Get a valid access token, refreshing if necessary
    pub async fn access_token(&self) -> Result<String, AuthError> {
        {
            let cached = self.cached_token.read().await;
            if let Some(token) = cached.as_ref().filter(|t| t.is_fresh(Utc::now())) {
                return Ok(token.token.clone());
            }
        }

        let mut cached = self.cached_token.write().await;
        // Another request may have refreshed while we waited for the lock
        if let Some(token) = cached.as_ref().filter(|t| t.is_fresh(Utc::now())) {
            return Ok(token.token.clone());
        }

        let response = self.fetch_new_token().await?;
        let token = response.access_token.clone();
        *cached = Some(CachedToken {
            token: response.access_token,
            expires_at: Utc::now() + Duration::seconds(response.expires_in),
        });

        Ok(token)
    }

    fn signed_assertion(&self, now: DateTime<Utc>) -> Result<String, AuthError> {
        let claims = JwtClaims {
            iss: self.credentials.client_email.clone(),
            scope: VISION_SCOPE.to_string(),
            aud: self.credentials.token_uri.clone(),
            iat: now.timestamp(),
            exp: now.timestamp() + ASSERTION_LIFETIME_SECS,
        };
        let key = EncodingKey::from_rsa_pem(self.credentials.private_key.as_bytes())?;
        Ok(encode(&Header::new(Algorithm::RS256), &claims, &key)?)
    }

    async fn fetch_new_token(&self) -> Result<TokenResponse, AuthError> {
        let assertion = self.signed_assertion(Utc::now())?;
        let params = [("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())];

        let resp = self
            .http
            .post(&self.credentials.token_uri)
            .form(&params)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AuthError::Token { status, body });
        }

        let token: TokenResponse = resp.json().await?;
        tracing::info!(
            client_email = %self.credentials.client_email,
            expires_in = token.expires_in,
            "obtained Vision access token"
        );
        Ok(token)
    }
}
