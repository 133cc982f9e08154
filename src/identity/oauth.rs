//! OAuth popup sign-in (authorization code + PKCE).
//!
//! The popup itself belongs to the host: it receives the authorization URL
//! through [`OAuthPopup::open`] and reports back the redirect parameters, or
//! that the user closed it.

use std::future::Future;

use serde::Deserialize;
use url::Url;

use crate::error::Error;
use crate::pkce::PkceChallenge;

/// OAuth2 configuration for the popup provider (Google by default).
///
/// ```rust,ignore
/// use dreambig::identity::oauth::OAuthConfig;
///
/// let config = OAuthConfig::new("client-id.apps.googleusercontent.com", "http://localhost:8000/auth/callback".parse()?)
///     .with_scopes(vec!["openid".into(), "email".into()]);
/// ```
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct OAuthConfig {
    pub(crate) client_id: String,
    pub(crate) client_secret: Option<String>,
    pub(crate) auth_url: Url,
    pub(crate) token_url: Url,
    pub(crate) redirect_uri: Url,
    pub(crate) scopes: Vec<String>,
    pub(crate) provider_id: String,
}

impl OAuthConfig {
    #[must_use]
    pub fn new(client_id: impl Into<String>, redirect_uri: Url) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: None,
            redirect_uri,
            auth_url: "https://accounts.google.com/o/oauth2/v2/auth"
                .parse()
                .expect("valid default URL"),
            token_url: "https://oauth2.googleapis.com/token"
                .parse()
                .expect("valid default URL"),
            scopes: vec!["openid".into(), "email".into(), "profile".into()],
            provider_id: "google.com".into(),
        }
    }

    /// Client secret, for OAuth clients registered as confidential.
    #[must_use]
    pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = Some(secret.into());
        self
    }

    #[must_use]
    pub fn with_auth_url(mut self, url: Url) -> Self {
        self.auth_url = url;
        self
    }

    #[must_use]
    pub fn with_token_url(mut self, url: Url) -> Self {
        self.token_url = url;
        self
    }

    #[must_use]
    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    /// Identity provider id the resulting credential is presented as.
    #[must_use]
    pub fn with_provider_id(mut self, provider_id: impl Into<String>) -> Self {
        self.provider_id = provider_id.into();
        self
    }

    #[must_use]
    pub fn redirect_uri(&self) -> &Url {
        &self.redirect_uri
    }

    #[must_use]
    pub fn provider_id(&self) -> &str {
        &self.provider_id
    }
}

/// What the popup reports back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PopupOutcome {
    Authorized { code: String, state: String },
    /// The user closed the popup before finishing.
    Closed,
    /// The authorization server redirected with an `error` parameter.
    Failed(String),
}

/// Host-provided popup window.
pub trait OAuthPopup: Send + Sync {
    fn open(&self, authorization_url: &str) -> impl Future<Output = PopupOutcome> + Send;
}

/// Authorization URL plus the PKCE material needed to redeem its code.
pub struct AuthorizationRequest {
    pub url: String,
    pub pkce: PkceChallenge,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OAuthTokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub id_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

/// OAuth2 client for the popup provider.
pub struct OAuthClient {
    config: OAuthConfig,
    http: reqwest::Client,
}

impl OAuthClient {
    #[must_use]
    pub fn new(config: OAuthConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    #[must_use]
    pub fn config(&self) -> &OAuthConfig {
        &self.config
    }

    #[must_use]
    pub fn authorization_request(&self) -> AuthorizationRequest {
        let pkce = PkceChallenge::generate();
        let scope = self.config.scopes.join(" ");

        let mut url = self.config.auth_url.clone();
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", self.config.redirect_uri.as_str())
            .append_pair("state", &pkce.state)
            .append_pair("code_challenge", &pkce.challenge)
            .append_pair("code_challenge_method", "S256")
            .append_pair("scope", &scope)
            .append_pair("prompt", "select_account");

        AuthorizationRequest {
            url: url.into(),
            pkce,
        }
    }

    /// Redeem an authorization code.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] on network failure, or [`Error::OAuth`] if the
    /// token endpoint rejects the code.
    pub async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
    ) -> Result<OAuthTokenResponse, Error> {
        let mut params = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("client_id", self.config.client_id.as_str()),
            ("code_verifier", code_verifier),
        ];
        if let Some(secret) = self.config.client_secret.as_deref() {
            params.push(("client_secret", secret));
        }

        let response = self
            .http
            .post(self.config.token_url.clone())
            .form(&params)
            .send()
            .await?;

        let response = ensure_success(response, "oauth code exchange").await?;
        response.json::<OAuthTokenResponse>().await.map_err(Into::into)
    }
}

/// Return the response on 2xx, otherwise an [`Error::OAuth`] carrying the body.
pub(crate) async fn ensure_success(
    response: reqwest::Response,
    operation: &'static str,
) -> Result<reqwest::Response, Error> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    Err(Error::OAuth {
        operation,
        status: Some(status),
        detail: body,
    })
}
