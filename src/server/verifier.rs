//! Firebase ID token verification against Google's published key set.

use std::time::{Duration, Instant};

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header};
use parking_lot::RwLock;
use reqwest::header::CACHE_CONTROL;
use serde::Deserialize;
use url::Url;

use super::error::ExchangeError;
use super::traits::IdTokenVerifier;
use super::types::VerifiedIdentity;
use crate::token::{self, ID_TOKEN_ISSUER_PREFIX, TokenKind};

const FIREBASE_JWKS_URL: &str =
    "https://www.googleapis.com/service_accounts/v1/jwk/securetoken@system.gserviceaccount.com";

const DEFAULT_KEY_TTL: Duration = Duration::from_secs(60 * 60);
const MAX_KEY_TTL: Duration = Duration::from_secs(24 * 60 * 60);
/// Minimum interval between fetches triggered by an unknown `kid`.
const REFRESH_COOLDOWN: Duration = Duration::from_secs(60);

struct CachedKeys {
    set: JwkSet,
    fetched_at: Instant,
    expires_at: Instant,
}

impl CachedKeys {
    fn new(set: JwkSet, ttl: Duration) -> Self {
        let fetched_at = Instant::now();
        Self {
            set,
            fetched_at,
            expires_at: fetched_at + ttl.min(MAX_KEY_TTL),
        }
    }

    fn is_fresh(&self) -> bool {
        self.expires_at > Instant::now()
    }
}

#[derive(Debug, Deserialize)]
struct FirebaseClaims {
    sub: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    phone_number: Option<String>,
    #[serde(default)]
    email_verified: bool,
    #[serde(default)]
    auth_time: Option<i64>,
}

/// [`IdTokenVerifier`] for Firebase ID tokens (RS256, `kid`-selected key).
///
/// Keys are cached for the `max-age` the key endpoint advertises (at most a
/// day) and refetched on expiry. An unknown `kid` triggers a refetch at most
/// once per minute; concurrent misses share one fetch.
pub struct FirebaseVerifier {
    project_id: String,
    jwks_url: Url,
    http: reqwest::Client,
    keys: RwLock<Option<CachedKeys>>,
    refresh: tokio::sync::Mutex<()>,
}

impl FirebaseVerifier {
    #[must_use]
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            jwks_url: FIREBASE_JWKS_URL.parse().expect("valid default URL"),
            http: reqwest::Client::new(),
            keys: RwLock::new(None),
            refresh: tokio::sync::Mutex::new(()),
        }
    }

    /// Create a verifier from `FIREBASE_PROJECT_ID`.
    ///
    /// # Errors
    ///
    /// Returns [`ExchangeError::Config`] if the variable is missing.
    pub fn from_env() -> Result<Self, ExchangeError> {
        let project_id = std::env::var("FIREBASE_PROJECT_ID")
            .map_err(|_| ExchangeError::Config("FIREBASE_PROJECT_ID is required".into()))?;
        Ok(Self::new(project_id))
    }

    #[must_use]
    pub fn with_jwks_url(mut self, url: Url) -> Self {
        self.jwks_url = url;
        self
    }

    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    /// Seed the key cache, bypassing the first fetch.
    #[must_use]
    pub fn with_keys(self, set: JwkSet, ttl: Duration) -> Self {
        *self.keys.write() = Some(CachedKeys::new(set, ttl));
        self
    }

    fn cached_key(&self, kid: &str) -> Option<Result<DecodingKey, ExchangeError>> {
        let keys = self.keys.read();
        let cached = keys.as_ref().filter(|c| c.is_fresh())?;
        let jwk = cached.set.find(kid)?;
        Some(
            DecodingKey::from_jwk(jwk)
                .map_err(|e| ExchangeError::InvalidToken(format!("unusable signing key: {e}"))),
        )
    }

    async fn refresh_keys(&self) -> Result<(), ExchangeError> {
        let response = self
            .http
            .get(self.jwks_url.clone())
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| ExchangeError::Provider(format!("key set fetch failed: {e}")))?;

        let ttl = response
            .headers()
            .get(CACHE_CONTROL)
            .and_then(|v| v.to_str().ok())
            .and_then(max_age)
            .unwrap_or(DEFAULT_KEY_TTL);

        let set: JwkSet = response
            .json()
            .await
            .map_err(|e| ExchangeError::Provider(format!("key set unreadable: {e}")))?;

        tracing::debug!(keys = set.keys.len(), ttl_secs = ttl.as_secs(), "Signing keys refreshed");
        *self.keys.write() = Some(CachedKeys::new(set, ttl));
        Ok(())
    }

    /// Whether a fresh key set was fetched within the cooldown.
    fn recently_refreshed(&self) -> bool {
        self.keys
            .read()
            .as_ref()
            .is_some_and(|c| c.is_fresh() && c.fetched_at.elapsed() < REFRESH_COOLDOWN)
    }

    async fn decoding_key(&self, kid: &str) -> Result<DecodingKey, ExchangeError> {
        let unknown = || -> Result<DecodingKey, ExchangeError> {
            Err(ExchangeError::InvalidToken("unknown signing key".into()))
        };
        if let Some(key) = self.cached_key(kid) {
            return key;
        }

        let _refresh = self.refresh.lock().await;
        if let Some(key) = self.cached_key(kid) {
            return key;
        }
        if self.recently_refreshed() {
            tracing::debug!(kid, "Unknown signing key, refetch suppressed");
            return unknown();
        }
        self.refresh_keys().await?;
        self.cached_key(kid).unwrap_or_else(unknown)
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[&self.project_id]);
        validation.set_issuer(&[format!("{ID_TOKEN_ISSUER_PREFIX}{}", self.project_id)]);
        validation.set_required_spec_claims(&["exp", "iat", "aud", "iss", "sub"]);
        validation
    }
}

impl IdTokenVerifier for FirebaseVerifier {
    async fn verify(&self, id_token: &str) -> Result<VerifiedIdentity, ExchangeError> {
        if token::classify(id_token) == TokenKind::Custom {
            return Err(ExchangeError::TokenType);
        }

        let header = decode_header(id_token)
            .map_err(|e| ExchangeError::InvalidToken(format!("malformed token: {e}")))?;
        if header.alg != Algorithm::RS256 {
            return Err(ExchangeError::InvalidToken(format!(
                "unexpected signing algorithm {:?}",
                header.alg
            )));
        }
        let kid = header
            .kid
            .ok_or_else(|| ExchangeError::InvalidToken("token header has no kid".into()))?;

        let key = self.decoding_key(&kid).await?;
        let claims = decode::<FirebaseClaims>(id_token, &key, &self.validation())
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => ExchangeError::TokenExpired,
                ErrorKind::InvalidAudience => {
                    ExchangeError::InvalidToken("token has incorrect audience".into())
                }
                ErrorKind::InvalidIssuer => {
                    ExchangeError::InvalidToken("token has incorrect issuer".into())
                }
                _ => ExchangeError::InvalidToken(e.to_string()),
            })?
            .claims;

        if claims.sub.is_empty() {
            return Err(ExchangeError::InvalidToken("token has empty subject".into()));
        }
        let now = time::OffsetDateTime::now_utc().unix_timestamp();
        if claims.auth_time.is_some_and(|t| t > now + 60) {
            return Err(ExchangeError::InvalidToken("auth_time is in the future".into()));
        }

        Ok(VerifiedIdentity {
            uid: claims.sub.into(),
            email: claims.email,
            name: claims.name,
            phone: claims.phone_number,
            email_verified: claims.email_verified,
        })
    }
}

/// `max-age` of a `Cache-Control` header value.
fn max_age(cache_control: &str) -> Option<Duration> {
    cache_control
        .split(',')
        .filter_map(|directive| directive.trim().strip_prefix("max-age="))
        .find_map(|secs| secs.trim().parse().ok())
        .map(|secs| Duration::from_secs(secs).min(MAX_KEY_TTL))
}
