//! First-party session tokens and bearer-token classification.
//!
//! Session tokens are PASETO `v4.public` tokens signed with the backend's
//! Ed25519 key. They carry the account id as `sub` and the identity provider
//! uid as the additional `uid` claim.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use pasetors::claims::{Claims, ClaimsValidationRules};
use pasetors::keys::{AsymmetricKeyPair, AsymmetricPublicKey, AsymmetricSecretKey, Generate};
use pasetors::token::UntrustedToken;
use pasetors::version4::V4;
use pasetors::{Public, public};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use ulid::Ulid;

use crate::error::Error;
use crate::types::{AccountId, Uid};

const SESSION_PREFIX: &str = "v4.public.";

/// `aud` of a server-minted custom token.
pub const CUSTOM_TOKEN_AUDIENCE: &str =
    "https://identitytoolkit.googleapis.com/google.identity.identitytoolkit.v1.IdentityToolkit";

/// `iss` prefix of an identity provider ID token.
pub const ID_TOKEN_ISSUER_PREFIX: &str = "https://securetoken.google.com/";

/// What a bearer string looks like, judged without verifying it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// First-party session token.
    Session,
    /// Identity provider ID token, valid as a backend credential.
    Id,
    /// Server-minted custom token, only valid for provider sign-in.
    Custom,
    Unknown,
}

/// Classify a bearer string by its shape and unverified claims.
#[must_use]
pub fn classify(token: &str) -> TokenKind {
    if token.starts_with(SESSION_PREFIX) {
        return TokenKind::Session;
    }
    let Some(payload) = unverified_jwt_payload(token) else {
        return TokenKind::Unknown;
    };

    let aud = payload.get("aud").and_then(JsonValue::as_str);
    let iss = payload.get("iss").and_then(JsonValue::as_str);
    if aud == Some(CUSTOM_TOKEN_AUDIENCE) {
        TokenKind::Custom
    } else if iss.is_some_and(|iss| iss.starts_with(ID_TOKEN_ISSUER_PREFIX)) {
        TokenKind::Id
    } else {
        TokenKind::Unknown
    }
}

fn unverified_jwt_payload(token: &str) -> Option<JsonValue> {
    let mut parts = token.split('.');
    let (_header, payload, _sig) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }
    let bytes = URL_SAFE_NO_PAD.decode(payload).ok()?;
    serde_json::from_slice(&bytes).ok()
}

/// Ed25519 key pair used to sign and verify session tokens.
#[derive(Clone)]
pub struct SessionKeys {
    secret: AsymmetricSecretKey<V4>,
    public: AsymmetricPublicKey<V4>,
}

impl SessionKeys {
    /// Generate an ephemeral key pair. Tokens do not survive a restart.
    ///
    /// # Errors
    ///
    /// Returns `Error::Token` if the system RNG fails.
    pub fn generate() -> Result<Self, Error> {
        let pair = AsymmetricKeyPair::<V4>::generate().map_err(|e| Error::Token(e.to_string()))?;
        Ok(Self {
            secret: pair.secret,
            public: pair.public,
        })
    }

    /// Parse a hex-encoded 64-byte Ed25519 secret key (seed followed by public key).
    ///
    /// # Errors
    ///
    /// Returns `Error::Token` if the hex is invalid or the key length is not 64 bytes.
    pub fn from_secret_hex(secret_hex: &str) -> Result<Self, Error> {
        let bytes =
            hex::decode(secret_hex.trim()).map_err(|e| Error::Token(format!("invalid hex: {e}")))?;
        if bytes.len() != 64 {
            return Err(Error::Token(format!(
                "invalid key length: expected 64, got {}",
                bytes.len()
            )));
        }
        let secret =
            AsymmetricSecretKey::<V4>::from(&bytes[..]).map_err(|e| Error::Token(e.to_string()))?;
        let public =
            AsymmetricPublicKey::<V4>::try_from(&secret).map_err(|e| Error::Token(e.to_string()))?;
        Ok(Self { secret, public })
    }
}

/// A freshly minted session token.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_in: Duration,
}

/// Claims recovered from a verified session token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionClaims {
    pub account_id: AccountId,
    pub uid: Uid,
    pub token_id: String,
}

#[derive(Deserialize)]
struct RawClaims {
    sub: String,
    uid: String,
    #[serde(default)]
    jti: String,
}

/// Mints and verifies session tokens for one issuer/audience pair.
#[derive(Clone)]
pub struct SessionTokenIssuer {
    keys: SessionKeys,
    issuer: String,
    audience: String,
    ttl: Duration,
}

impl SessionTokenIssuer {
    #[must_use]
    pub fn new(
        keys: SessionKeys,
        issuer: impl Into<String>,
        audience: impl Into<String>,
        ttl: Duration,
    ) -> Self {
        Self {
            keys,
            issuer: issuer.into(),
            audience: audience.into(),
            ttl,
        }
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Sign a session token for `account_id`, bound to the provider `uid`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Token` if claim construction or signing fails.
    pub fn issue(&self, account_id: AccountId, uid: &Uid) -> Result<IssuedToken, Error> {
        let token_err = |e: pasetors::errors::Error| Error::Token(e.to_string());

        let mut claims = Claims::new_expires_in(&self.ttl).map_err(token_err)?;
        claims.issuer(&self.issuer).map_err(token_err)?;
        claims.audience(&self.audience).map_err(token_err)?;
        claims.subject(&account_id.to_string()).map_err(token_err)?;
        claims
            .token_identifier(&Ulid::new().to_string())
            .map_err(token_err)?;
        claims
            .add_additional("uid", uid.as_str())
            .map_err(token_err)?;

        let token = public::sign(&self.keys.secret, &claims, None, None).map_err(token_err)?;
        Ok(IssuedToken {
            token,
            expires_in: self.ttl,
        })
    }

    /// Verify signature, `exp`/`nbf`/`iat`, issuer and audience of a session token.
    ///
    /// # Errors
    ///
    /// Returns `Error::Token` if the token is malformed, forged, expired, or
    /// was minted for another issuer or audience.
    pub fn verify(&self, token: &str) -> Result<SessionClaims, Error> {
        if !token.starts_with(SESSION_PREFIX) {
            return Err(Error::Token("invalid token format".into()));
        }

        let mut rules = ClaimsValidationRules::new();
        rules.validate_issuer_with(&self.issuer);
        rules.validate_audience_with(&self.audience);

        let untrusted = UntrustedToken::<Public, V4>::try_from(token)
            .map_err(|e| Error::Token(e.to_string()))?;
        let trusted = public::verify(&self.keys.public, &untrusted, &rules, None, None)
            .map_err(|e| Error::Token(e.to_string()))?;

        let payload = trusted
            .payload_claims()
            .ok_or_else(|| Error::Token("missing payload".into()))?
            .to_string()
            .map_err(|e| Error::Token(e.to_string()))?;
        let raw: RawClaims =
            serde_json::from_str(&payload).map_err(|e| Error::Token(e.to_string()))?;

        let account_id = raw
            .sub
            .parse::<AccountId>()
            .map_err(|_| Error::Token("sub is not an account id".into()))?;

        Ok(SessionClaims {
            account_id,
            uid: Uid(raw.uid),
            token_id: raw.jti,
        })
    }
}
