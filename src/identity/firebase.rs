use std::time::{Duration, Instant};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{Value as JsonValue, json};
use tokio::sync::watch;
use url::Url;

use super::oauth::{OAuthClient, OAuthPopup, PopupOutcome};
use super::{AuthStateEvent, AuthStateObserver, IdentityError, IdentityProvider, ProviderUser};
use crate::types::Uid;

/// ID tokens are refreshed once they are this close to expiry.
const REFRESH_MARGIN: Duration = Duration::from_secs(300);
const DEFAULT_TOKEN_LIFETIME_SECS: u64 = 3600;
/// Upper bound on a server-advertised token lifetime.
const MAX_TOKEN_LIFETIME_SECS: u64 = 24 * 3600;

/// Firebase Authentication REST configuration.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct FirebaseConfig {
    pub(crate) api_key: String,
    pub(crate) identity_toolkit_url: Url,
    pub(crate) secure_token_url: Url,
    pub(crate) request_timeout: Duration,
}

impl FirebaseConfig {
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            identity_toolkit_url: "https://identitytoolkit.googleapis.com/v1/"
                .parse()
                .expect("valid default URL"),
            secure_token_url: "https://securetoken.googleapis.com/v1/token"
                .parse()
                .expect("valid default URL"),
            request_timeout: Duration::from_secs(30),
        }
    }

    /// Create config from environment variables.
    ///
    /// # Required env vars
    /// - `FIREBASE_API_KEY`: Web API key of the Firebase project
    ///
    /// # Optional env vars
    /// - `FIREBASE_AUTH_EMULATOR_HOST`: `host:port` of a local Auth emulator
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::Provider`] if the API key is missing or the
    /// emulator host does not form a valid URL.
    pub fn from_env() -> Result<Self, IdentityError> {
        let api_key = std::env::var("FIREBASE_API_KEY")
            .map_err(|_| IdentityError::provider("config", "FIREBASE_API_KEY is required"))?;
        let mut config = Self::new(api_key);

        if let Ok(host) = std::env::var("FIREBASE_AUTH_EMULATOR_HOST") {
            let bad_host = |e: url::ParseError| {
                IdentityError::provider("config", format!("FIREBASE_AUTH_EMULATOR_HOST: {e}"))
            };
            config = config
                .with_identity_toolkit_url(
                    format!("http://{host}/identitytoolkit.googleapis.com/v1/")
                        .parse()
                        .map_err(bad_host)?,
                )
                .with_secure_token_url(
                    format!("http://{host}/securetoken.googleapis.com/v1/token")
                        .parse()
                        .map_err(bad_host)?,
                );
        }
        Ok(config)
    }

    #[must_use]
    pub fn with_identity_toolkit_url(mut self, url: Url) -> Self {
        self.identity_toolkit_url = url;
        self
    }

    #[must_use]
    pub fn with_secure_token_url(mut self, url: Url) -> Self {
        self.secure_token_url = url;
        self
    }

    /// Upper bound for every provider call.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// Tokens granted by the provider for one signed-in identity.
#[derive(Debug, Clone)]
pub struct TokenGrant {
    pub user: ProviderUser,
    pub id_token: String,
    pub refresh_token: String,
    pub expires_at: Instant,
}

impl TokenGrant {
    #[must_use]
    pub fn needs_refresh(&self) -> bool {
        self.expires_at.saturating_duration_since(Instant::now()) <= REFRESH_MARGIN
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ToolkitGrant {
    #[serde(default)]
    local_id: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
    id_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<String>,
}

#[derive(Deserialize)]
struct SecureTokenGrant {
    id_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<String>,
    user_id: String,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

/// Map an Identity Toolkit error response onto [`IdentityError`].
pub(crate) fn map_provider_error(status: u16, body: &str) -> IdentityError {
    let message = serde_json::from_str::<ErrorEnvelope>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| body.to_owned());
    // Messages look like "WEAK_PASSWORD : Password should be at least 6 characters"
    let code = message
        .split([' ', ':'])
        .next()
        .unwrap_or_default()
        .to_owned();

    match code.as_str() {
        "EMAIL_NOT_FOUND" | "INVALID_PASSWORD" | "INVALID_LOGIN_CREDENTIALS" | "INVALID_EMAIL"
        | "USER_DISABLED" => IdentityError::InvalidCredentials,
        "EMAIL_EXISTS" => IdentityError::EmailExists,
        "" => IdentityError::provider(status.to_string(), "empty error response"),
        _ => IdentityError::provider(code, message),
    }
}

/// Recover the user handle from an ID token's (unverified) payload.
fn user_from_id_token(id_token: &str) -> Option<ProviderUser> {
    let payload = id_token.split('.').nth(1)?;
    let claims: JsonValue = serde_json::from_slice(&URL_SAFE_NO_PAD.decode(payload).ok()?).ok()?;
    let uid = claims
        .get("user_id")
        .or_else(|| claims.get("sub"))
        .and_then(JsonValue::as_str)?;
    let str_claim = |key: &str| claims.get(key).and_then(JsonValue::as_str).map(str::to_owned);

    Some(ProviderUser {
        uid: Uid::from(uid),
        email: str_claim("email"),
        display_name: str_claim("name"),
        email_verified: claims
            .get("email_verified")
            .and_then(JsonValue::as_bool)
            .unwrap_or(false),
    })
}

fn expires_at(expires_in: Option<&str>) -> Instant {
    let secs = expires_in
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS)
        .min(MAX_TOKEN_LIFETIME_SECS);
    Instant::now() + Duration::from_secs(secs)
}

impl ToolkitGrant {
    fn into_grant(self) -> Result<TokenGrant, IdentityError> {
        let claims_user = user_from_id_token(&self.id_token);
        let uid = self
            .local_id
            .map(Uid)
            .or_else(|| claims_user.as_ref().map(|u| u.uid.clone()))
            .ok_or_else(|| IdentityError::provider("grant", "response carries no user id"))?;

        let user = ProviderUser {
            uid,
            email: self
                .email
                .or_else(|| claims_user.as_ref().and_then(|u| u.email.clone())),
            display_name: self
                .display_name
                .filter(|n| !n.is_empty())
                .or_else(|| claims_user.as_ref().and_then(|u| u.display_name.clone())),
            email_verified: claims_user.is_some_and(|u| u.email_verified),
        };

        Ok(TokenGrant {
            user,
            expires_at: expires_at(self.expires_in.as_deref()),
            id_token: self.id_token,
            refresh_token: self.refresh_token,
        })
    }
}

/// Thin client over the Identity Toolkit and Secure Token REST endpoints.
#[derive(Clone)]
pub struct FirebaseClient {
    config: FirebaseConfig,
    http: reqwest::Client,
}

impl FirebaseClient {
    #[must_use]
    pub fn new(config: FirebaseConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .unwrap_or_default();
        Self { config, http }
    }

    /// Use a custom HTTP client (for connection pool reuse or testing).
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    pub(crate) fn accounts_url(&self, method: &str) -> Url {
        let base = &self.config.identity_toolkit_url;
        let mut url = base.clone();
        url.set_path(&format!("{}accounts:{method}", base.path()));
        url.query_pairs_mut().append_pair("key", &self.config.api_key);
        url
    }

    async fn call_accounts(
        &self,
        method: &'static str,
        body: JsonValue,
    ) -> Result<reqwest::Response, IdentityError> {
        let response = self
            .http
            .post(self.accounts_url(method))
            .json(&body)
            .send()
            .await?;

        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let text = response.text().await.unwrap_or_default();
        let err = map_provider_error(status, &text);
        tracing::warn!(method, status, error = %err, "identity provider rejected request");
        Err(err)
    }

    async fn grant(
        &self,
        method: &'static str,
        body: JsonValue,
    ) -> Result<TokenGrant, IdentityError> {
        let response = self.call_accounts(method, body).await?;
        response.json::<ToolkitGrant>().await?.into_grant()
    }

    /// # Errors
    ///
    /// [`IdentityError::InvalidCredentials`] for unknown emails or wrong passwords.
    pub async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<TokenGrant, IdentityError> {
        self.grant(
            "signInWithPassword",
            json!({ "email": email, "password": password, "returnSecureToken": true }),
        )
        .await
    }

    /// # Errors
    ///
    /// [`IdentityError::EmailExists`] if the email is taken.
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: Option<&str>,
    ) -> Result<TokenGrant, IdentityError> {
        let mut body = json!({ "email": email, "password": password, "returnSecureToken": true });
        if let Some(name) = display_name {
            body["displayName"] = JsonValue::from(name);
        }
        let mut grant = self.grant("signUp", body).await?;
        if grant.user.display_name.is_none() {
            grant.user.display_name = display_name.map(str::to_owned);
        }
        Ok(grant)
    }

    /// # Errors
    ///
    /// Fails if the custom token is invalid or expired.
    pub async fn sign_in_with_custom_token(
        &self,
        custom_token: &str,
    ) -> Result<TokenGrant, IdentityError> {
        self.grant(
            "signInWithCustomToken",
            json!({ "token": custom_token, "returnSecureToken": true }),
        )
        .await
    }

    /// Sign in with a credential obtained from a federated provider.
    ///
    /// # Errors
    ///
    /// Fails if the provider credential is rejected.
    pub async fn sign_in_with_idp(
        &self,
        provider_id_token: &str,
        provider_id: &str,
        request_uri: &str,
    ) -> Result<TokenGrant, IdentityError> {
        let post_body = format!("id_token={provider_id_token}&providerId={provider_id}");
        self.grant(
            "signInWithIdp",
            json!({
                "postBody": post_body,
                "requestUri": request_uri,
                "returnSecureToken": true,
                "returnIdpCredential": true,
            }),
        )
        .await
    }

    /// Exchange a refresh token for a fresh ID token.
    ///
    /// # Errors
    ///
    /// Fails if the refresh token was revoked or the account disabled.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, IdentityError> {
        let mut url = self.config.secure_token_url.clone();
        url.query_pairs_mut().append_pair("key", &self.config.api_key);

        let response = self
            .http
            .post(url)
            .form(&[("grant_type", "refresh_token"), ("refresh_token", refresh_token)])
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            return Err(map_provider_error(status, &text));
        }

        let body: SecureTokenGrant = response.json().await?;
        let user = user_from_id_token(&body.id_token)
            .unwrap_or_else(|| ProviderUser::new(body.user_id.as_str()));
        Ok(TokenGrant {
            user,
            expires_at: expires_at(body.expires_in.as_deref()),
            id_token: body.id_token,
            refresh_token: body.refresh_token,
        })
    }

    /// Delete the account the ID token belongs to.
    ///
    /// # Errors
    ///
    /// Fails if the token is no longer valid or the provider is unreachable.
    pub async fn delete_account(&self, id_token: &str) -> Result<(), IdentityError> {
        self.call_accounts("delete", json!({ "idToken": id_token }))
            .await
            .map(|_| ())
    }
}

/// [`IdentityProvider`] backed by Firebase Authentication.
///
/// Starts in [`AuthStateEvent::Pending`] until [`restore`](Self::restore) has
/// run, mirroring the browser SDK's asynchronous rehydration.
pub struct FirebaseIdentity {
    client: FirebaseClient,
    oauth: Option<OAuthClient>,
    grant: Mutex<Option<TokenGrant>>,
    observer: AuthStateObserver,
}

impl FirebaseIdentity {
    #[must_use]
    pub fn new(client: FirebaseClient) -> Self {
        Self {
            client,
            oauth: None,
            grant: Mutex::new(None),
            observer: AuthStateObserver::new(),
        }
    }

    /// Enable the OAuth popup flow.
    #[must_use]
    pub fn with_oauth(mut self, oauth: OAuthClient) -> Self {
        self.oauth = Some(oauth);
        self
    }

    /// Rehydrate a previously persisted provider session and leave `Pending`.
    pub async fn restore(&self, refresh_token: Option<&str>) {
        let Some(refresh_token) = refresh_token else {
            self.observer.publish(AuthStateEvent::SignedOut);
            return;
        };
        match self.client.refresh(refresh_token).await {
            Ok(grant) => self.install(grant),
            Err(e) => {
                tracing::warn!(error = %e, "provider session could not be restored");
                self.observer.publish(AuthStateEvent::SignedOut);
            }
        }
    }

    /// Refresh token of the active identity, for the host to persist.
    #[must_use]
    pub fn refresh_token(&self) -> Option<String> {
        self.grant.lock().as_ref().map(|g| g.refresh_token.clone())
    }

    fn install(&self, grant: TokenGrant) {
        let user = grant.user.clone();
        *self.grant.lock() = Some(grant);
        tracing::info!(uid = %user.uid, "provider identity signed in");
        self.observer.publish(AuthStateEvent::SignedIn(user));
    }

    async fn popup_grant<P: OAuthPopup>(&self, popup: &P) -> Result<TokenGrant, IdentityError> {
        let oauth = self
            .oauth
            .as_ref()
            .ok_or_else(|| IdentityError::provider("config", "OAuth sign-in is not configured"))?;

        let request = oauth.authorization_request();
        let (code, state) = match popup.open(&request.url).await {
            PopupOutcome::Authorized { code, state } => (code, state),
            PopupOutcome::Closed => return Err(IdentityError::UserCancelled),
            PopupOutcome::Failed(reason) => return Err(IdentityError::provider("oauth", reason)),
        };
        if !request.pkce.state_matches(&state) {
            tracing::warn!("OAuth state mismatch");
            return Err(IdentityError::provider("oauth", "state_mismatch"));
        }

        let tokens = oauth.exchange_code(&code, &request.pkce.verifier).await?;
        let federated_id_token = tokens
            .id_token
            .ok_or_else(|| IdentityError::provider("oauth", "no id_token in token response"))?;

        self.client
            .sign_in_with_idp(
                &federated_id_token,
                oauth.config().provider_id(),
                oauth.config().redirect_uri().as_str(),
            )
            .await
    }
}

impl IdentityProvider for FirebaseIdentity {
    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<(), IdentityError> {
        let grant = self.client.sign_in_with_password(email, password).await?;
        self.install(grant);
        Ok(())
    }

    async fn sign_in_with_custom_token(&self, custom_token: &str) -> Result<(), IdentityError> {
        let grant = self.client.sign_in_with_custom_token(custom_token).await?;
        self.install(grant);
        Ok(())
    }

    async fn sign_in_with_oauth_popup<P: OAuthPopup>(&self, popup: &P) -> Result<(), IdentityError> {
        let grant = self.popup_grant(popup).await?;
        self.install(grant);
        Ok(())
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: Option<&str>,
    ) -> Result<(), IdentityError> {
        let grant = self.client.sign_up(email, password, display_name).await?;
        self.install(grant);
        Ok(())
    }

    async fn sign_out(&self) -> Result<(), IdentityError> {
        let previous = self.grant.lock().take();
        if let Some(grant) = previous {
            tracing::info!(uid = %grant.user.uid, "provider identity signed out");
        }
        self.observer.publish(AuthStateEvent::SignedOut);
        Ok(())
    }

    async fn get_id_token(&self) -> Result<Option<String>, IdentityError> {
        let current = self.grant.lock().clone();
        let Some(grant) = current else {
            return Ok(None);
        };
        if !grant.needs_refresh() {
            return Ok(Some(grant.id_token));
        }

        let mut refreshed = self.client.refresh(&grant.refresh_token).await?;
        if refreshed.user.email.is_none() {
            refreshed.user.email = grant.user.email.clone();
        }
        if refreshed.user.display_name.is_none() {
            refreshed.user.display_name = grant.user.display_name.clone();
        }
        let token = refreshed.id_token.clone();

        let mut slot = self.grant.lock();
        match slot.as_ref() {
            // Signed out or switched identity while the refresh was in flight.
            Some(active) if active.user.uid == refreshed.user.uid => {
                *slot = Some(refreshed);
                Ok(Some(token))
            }
            _ => Ok(None),
        }
    }

    fn current_user(&self) -> Option<ProviderUser> {
        self.grant.lock().as_ref().map(|g| g.user.clone())
    }

    fn subscribe(&self) -> watch::Receiver<AuthStateEvent> {
        self.observer.subscribe()
    }
}
