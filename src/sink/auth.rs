//! OAuth2 service-account flow: sign a JWT assertion with the key file's
//! private key and trade it for a short-lived bearer token.

use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{SHEETS_SCOPES, TOKEN_REFRESH_MARGIN_SECS};
use crate::error::{AppError, Result};

const GOOGLE_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: u64 = 3600;

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    GOOGLE_TOKEN_URI.to_string()
}

impl ServiceAccountKey {
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}

#[derive(Debug, Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: u64,
    exp: u64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<u64>,
    error: Option<String>,
    error_description: Option<String>,
}

/// Build the signed RS256 assertion for the token endpoint.
pub fn build_assertion(key: &ServiceAccountKey, now_secs: u64) -> Result<String> {
    let claims = Claims {
        iss: &key.client_email,
        scope: SHEETS_SCOPES,
        aud: &key.token_uri,
        iat: now_secs,
        exp: now_secs + ASSERTION_LIFETIME_SECS,
    };
    let signing_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())?;
    Ok(encode(&Header::new(Algorithm::RS256), &claims, &signing_key)?)
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at_secs: u64,
}

impl CachedToken {
    fn is_fresh(&self, now_secs: u64) -> bool {
        now_secs + TOKEN_REFRESH_MARGIN_SECS < self.expires_at_secs
    }
}

/// Lazily loads the key file and caches the bearer token until shortly
/// before it expires. Nothing touches the network until the first publish.
pub struct TokenProvider {
    client: reqwest::Client,
    key_path: PathBuf,
    key: Option<ServiceAccountKey>,
    cached: Option<CachedToken>,
}

impl TokenProvider {
    pub fn new(client: reqwest::Client, key_path: PathBuf) -> Self {
        Self { client, key_path, key: None, cached: None }
    }

    pub async fn access_token(&mut self) -> Result<String> {
        let now = now_secs();
        if let Some(token) = self.cached.as_ref().filter(|t| t.is_fresh(now)) {
            return Ok(token.value.clone());
        }

        if self.key.is_none() {
            let key = ServiceAccountKey::from_file(&self.key_path).map_err(|e| {
                AppError::Publish(format!(
                    "cannot load service credential {}: {e}",
                    self.key_path.display()
                ))
            })?;
            info!(account = %key.client_email, "Loaded service credential");
            self.key = Some(key);
        }
        let Some(key) = self.key.as_ref() else {
            return Err(AppError::Publish("service credential unavailable".to_string()));
        };

        let assertion = build_assertion(key, now)?;
        let resp = self
            .client
            .post(&key.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await?;
        let status = resp.status();
        let body: TokenResponse = resp.json().await?;

        match (status.is_success(), body.access_token) {
            (true, Some(value)) => {
                let lifetime = body.expires_in.unwrap_or(ASSERTION_LIFETIME_SECS);
                debug!("Access token refreshed, valid for {lifetime}s");
                self.cached = Some(CachedToken {
                    value: value.clone(),
                    expires_at_secs: now + lifetime,
                });
                Ok(value)
            }
            _ => Err(AppError::Publish(format!(
                "authentication rejected ({status}): {} {}",
                body.error.unwrap_or_default(),
                body.error_description.unwrap_or_default(),
            ))),
        }
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs()
}
