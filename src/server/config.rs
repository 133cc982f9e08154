use std::time::Duration;

use super::error::ExchangeError;
use crate::token::{SessionKeys, SessionTokenIssuer};

/// Settings shared by the config builder and the runtime state.
#[derive(Clone)]
pub(crate) struct ExchangeSettings {
    pub(crate) api_prefix: String,
    pub(crate) auto_provision: bool,
    pub(crate) dev_login_enabled: bool,
}

impl ExchangeSettings {
    fn defaults() -> Self {
        Self {
            api_prefix: "/api/v1/auth".into(),
            auto_provision: false,
            dev_login_enabled: false,
        }
    }
}

/// Backend token exchange configuration.
///
/// The signing keys are a constructor parameter; everything else has a
/// default. Use [`from_env()`](ExchangeConfig::from_env) for convention-based
/// setup, or [`new()`](ExchangeConfig::new) with `with_*` methods.
pub struct ExchangeConfig {
    pub(super) keys: SessionKeys,
    pub(super) issuer: String,
    pub(super) audience: String,
    pub(super) token_ttl: Duration,
    pub(super) settings: ExchangeSettings,
}

impl ExchangeConfig {
    #[must_use]
    pub fn new(keys: SessionKeys) -> Self {
        Self {
            keys,
            issuer: "dreambig".into(),
            audience: "dreambig-api".into(),
            token_ttl: Duration::from_secs(30 * 60),
            settings: ExchangeSettings::defaults(),
        }
    }

    /// Create config from environment variables.
    ///
    /// # Optional env vars
    /// - `SESSION_SIGNING_KEY`: hex-encoded 64-byte Ed25519 secret key. An
    ///   ephemeral key is generated when unset; sessions then die with the process.
    /// - `SESSION_TOKEN_TTL_MINUTES`: session token lifetime (default 30)
    /// - `SESSION_ISSUER`, `SESSION_AUDIENCE`: token `iss` / `aud`
    /// - `AUTO_PROVISION_ON_LOGIN`: `"1"` or `"true"` creates tenant accounts for
    ///   verified identities without one
    /// - `DEV_AUTH`: `"1"` or `"true"` enables the dev-login route
    ///
    /// # Errors
    ///
    /// Returns [`ExchangeError::Config`] if a variable is set but invalid.
    pub fn from_env() -> Result<Self, ExchangeError> {
        let keys = match std::env::var("SESSION_SIGNING_KEY") {
            Ok(hex) => SessionKeys::from_secret_hex(hex.trim())
                .map_err(|e| ExchangeError::Config(format!("SESSION_SIGNING_KEY: {e}")))?,
            Err(_) => {
                tracing::warn!("SESSION_SIGNING_KEY not set, using an ephemeral signing key");
                SessionKeys::generate()?
            }
        };

        let mut config = Self::new(keys)
            .with_auto_provision(env_flag("AUTO_PROVISION_ON_LOGIN"))
            .with_dev_login_enabled(env_flag("DEV_AUTH"));

        if let Ok(minutes) = std::env::var("SESSION_TOKEN_TTL_MINUTES") {
            let minutes: u64 = minutes.trim().parse().map_err(|_| {
                ExchangeError::Config("SESSION_TOKEN_TTL_MINUTES must be a whole number".into())
            })?;
            config = config.with_token_ttl(Duration::from_secs(minutes * 60));
        }
        if let Ok(issuer) = std::env::var("SESSION_ISSUER") {
            config = config.with_issuer(issuer);
        }
        if let Ok(audience) = std::env::var("SESSION_AUDIENCE") {
            config = config.with_audience(audience);
        }

        Ok(config)
    }

    #[must_use]
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = issuer.into();
        self
    }

    #[must_use]
    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = audience.into();
        self
    }

    #[must_use]
    pub fn with_token_ttl(mut self, ttl: Duration) -> Self {
        self.token_ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_api_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.settings.api_prefix = prefix.into();
        self
    }

    #[must_use]
    pub fn with_auto_provision(mut self, enabled: bool) -> Self {
        self.settings.auto_provision = enabled;
        self
    }

    #[must_use]
    pub fn with_dev_login_enabled(mut self, enabled: bool) -> Self {
        self.settings.dev_login_enabled = enabled;
        self
    }

    pub(super) fn token_issuer(&self) -> SessionTokenIssuer {
        SessionTokenIssuer::new(
            self.keys.clone(),
            self.issuer.clone(),
            self.audience.clone(),
            self.token_ttl,
        )
    }
}

fn env_flag(name: &str) -> bool {
    matches!(std::env::var(name).as_deref(), Ok("1") | Ok("true"))
}
