//! Shared fakes for unit tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use parking_lot::Mutex;
use serde_json::{Value as JsonValue, json};
use time::OffsetDateTime;
use tokio::sync::watch;
use url::Url;

use crate::identity::{
    AuthStateEvent, AuthStateObserver, IdentityError, IdentityProvider, OAuthPopup, PopupOutcome,
    ProviderUser,
};
use crate::protocol::{Account, LoginResponse, RegisterRequest, RegisterResponse, TOKEN_TYPE};
use crate::session::{SessionBackend, SessionError};
use crate::token::{CUSTOM_TOKEN_AUDIENCE, ID_TOKEN_ISSUER_PREFIX};
use crate::types::{AccountId, Role, Uid};
use crate::worker::{CachedResponse, FetchError, FetchRequest, Fetcher};

/// Unsigned JWT with the given header and payload.
pub fn unsigned_jwt(header: &JsonValue, payload: &JsonValue) -> String {
    format!(
        "{}.{}.c2lnbmF0dXJl",
        URL_SAFE_NO_PAD.encode(header.to_string()),
        URL_SAFE_NO_PAD.encode(payload.to_string())
    )
}

/// Shape of a server-minted custom token.
pub fn custom_token(uid: &str) -> String {
    unsigned_jwt(
        &json!({"alg": "RS256", "typ": "JWT"}),
        &json!({
            "aud": CUSTOM_TOKEN_AUDIENCE,
            "iss": "firebase-adminsdk@dreambig-test.iam.gserviceaccount.com",
            "uid": uid,
        }),
    )
}

/// Shape of an identity provider ID token.
pub fn id_token(uid: &str) -> String {
    unsigned_jwt(
        &json!({"alg": "RS256", "kid": "k1", "typ": "JWT"}),
        &json!({
            "iss": format!("{ID_TOKEN_ISSUER_PREFIX}dreambig-test"),
            "aud": "dreambig-test",
            "sub": uid,
            "user_id": uid,
        }),
    )
}

pub fn register_request(email: &str) -> RegisterRequest {
    RegisterRequest {
        email: email.into(),
        name: "Asha Rao".into(),
        phone: Some("9876543210".into()),
        password: "hunter22".into(),
        role: Role::Tenant,
        preferences: None,
        location: None,
    }
}

fn account(uid: &str, email: &str) -> Account {
    Account {
        id: AccountId::generate(),
        uid: Uid::from(uid),
        email: email.into(),
        name: "Asha Rao".into(),
        phone: None,
        role: Role::Tenant,
        is_active: true,
        kyc_verified: false,
        created_at: OffsetDateTime::now_utc(),
        updated_at: None,
    }
}

/// Popup the user closes.
pub struct ClosedPopup;

impl OAuthPopup for ClosedPopup {
    async fn open(&self, _authorization_url: &str) -> PopupOutcome {
        PopupOutcome::Closed
    }
}

/// In-process identity provider. Publishes like the real one: every
/// successful call replaces the observed auth state.
#[derive(Default)]
pub struct FakeIdentity {
    users: Mutex<Vec<(String, String, String)>>,
    custom_tokens: Mutex<HashMap<String, String>>,
    current: Mutex<Option<ProviderUser>>,
    observer: AuthStateObserver,
    fail_sign_out: AtomicBool,
}

impl FakeIdentity {
    pub fn with_user(self, email: &str, password: &str, uid: &str) -> Self {
        self.users
            .lock()
            .push((email.into(), password.into(), uid.into()));
        self
    }

    pub fn with_custom_token(self, token: &str, uid: &str) -> Self {
        self.custom_tokens.lock().insert(token.into(), uid.into());
        self
    }

    /// Publish an event without changing the signed-in identity.
    pub fn publish(&self, event: AuthStateEvent) {
        self.observer.publish(event);
    }

    pub fn force_sign_in(&self, uid: &str) {
        self.install(ProviderUser::new(uid));
    }

    pub fn fail_sign_out(&self) {
        self.fail_sign_out.store(true, Ordering::SeqCst);
    }

    fn install(&self, user: ProviderUser) {
        *self.current.lock() = Some(user.clone());
        self.observer.publish(AuthStateEvent::SignedIn(user));
    }
}

impl IdentityProvider for FakeIdentity {
    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<(), IdentityError> {
        let user = self
            .users
            .lock()
            .iter()
            .find(|(e, p, _)| e == email && p == password)
            .map(|(e, _, uid)| ProviderUser::new(uid.as_str()).with_email(e.as_str()))
            .ok_or(IdentityError::InvalidCredentials)?;
        self.install(user);
        Ok(())
    }

    async fn sign_in_with_custom_token(&self, custom_token: &str) -> Result<(), IdentityError> {
        let uid = self
            .custom_tokens
            .lock()
            .get(custom_token)
            .cloned()
            .ok_or_else(|| IdentityError::provider("INVALID_CUSTOM_TOKEN", "unknown token"))?;
        self.install(ProviderUser::new(uid));
        Ok(())
    }

    async fn sign_in_with_oauth_popup<P: OAuthPopup>(&self, popup: &P) -> Result<(), IdentityError> {
        match popup.open("https://accounts.example/o/oauth2/auth").await {
            PopupOutcome::Authorized { code, .. } => {
                self.install(ProviderUser::new(format!("oauth-{code}")));
                Ok(())
            }
            PopupOutcome::Closed => Err(IdentityError::UserCancelled),
            PopupOutcome::Failed(e) => Err(IdentityError::provider("oauth", e)),
        }
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: Option<&str>,
    ) -> Result<(), IdentityError> {
        if self.users.lock().iter().any(|(e, _, _)| e == email) {
            return Err(IdentityError::EmailExists);
        }
        let uid = format!("uid-{email}");
        self.users
            .lock()
            .push((email.into(), password.into(), uid.clone()));
        let mut user = ProviderUser::new(uid).with_email(email);
        user.display_name = display_name.map(str::to_owned);
        self.install(user);
        Ok(())
    }

    async fn sign_out(&self) -> Result<(), IdentityError> {
        if self.fail_sign_out.load(Ordering::SeqCst) {
            return Err(IdentityError::Network("offline".into()));
        }
        *self.current.lock() = None;
        self.observer.publish(AuthStateEvent::SignedOut);
        Ok(())
    }

    async fn get_id_token(&self) -> Result<Option<String>, IdentityError> {
        Ok(self
            .current
            .lock()
            .as_ref()
            .map(|u| format!("idtoken-{}", u.uid)))
    }

    fn current_user(&self) -> Option<ProviderUser> {
        self.current.lock().clone()
    }

    fn subscribe(&self) -> watch::Receiver<AuthStateEvent> {
        self.observer.subscribe()
    }
}

/// In-process backend. Knows the accounts it was seeded with or registered,
/// and accepts `idtoken-{uid}` as a valid ID token.
#[derive(Default)]
pub struct FakeBackend {
    accounts: Mutex<Vec<Account>>,
    logins: Mutex<Vec<String>>,
    registrations: Mutex<Vec<String>>,
    rejection: Option<(u16, String)>,
    offline: bool,
}

impl FakeBackend {
    pub fn with_account(self, uid: &str, email: &str) -> Self {
        self.accounts.lock().push(account(uid, email));
        self
    }

    /// Answer every call with this status and detail.
    pub fn rejecting_with(mut self, status: u16, detail: &str) -> Self {
        self.rejection = Some((status, detail.into()));
        self
    }

    pub fn offline(mut self) -> Self {
        self.offline = true;
        self
    }

    pub fn logins(&self) -> Vec<String> {
        self.logins.lock().clone()
    }

    pub fn registrations(&self) -> Vec<String> {
        self.registrations.lock().clone()
    }

    fn check(&self) -> Result<(), SessionError> {
        if self.offline {
            return Err(SessionError::Network("connection refused".into()));
        }
        match &self.rejection {
            Some((status, detail)) => Err(SessionError::Exchange {
                status: *status,
                detail: detail.clone(),
            }),
            None => Ok(()),
        }
    }
}

impl SessionBackend for FakeBackend {
    async fn login(&self, id_token: &str) -> Result<LoginResponse, SessionError> {
        self.logins.lock().push(id_token.into());
        self.check()?;

        let uid = id_token.strip_prefix("idtoken-").unwrap_or_default();
        let user = self
            .accounts
            .lock()
            .iter()
            .find(|a| a.uid.as_str() == uid)
            .cloned()
            .ok_or_else(|| SessionError::Exchange {
                status: 404,
                detail: "User not found".into(),
            })?;
        Ok(LoginResponse {
            access_token: format!("session-{uid}"),
            token_type: TOKEN_TYPE.into(),
            expires_in: Some(1800),
            user,
        })
    }

    async fn register(&self, request: &RegisterRequest) -> Result<RegisterResponse, SessionError> {
        self.registrations.lock().push(request.email.clone());
        self.check()?;

        let local = request.email.split('@').next().unwrap_or_default();
        let user = account(&format!("uid-{local}"), &request.email);
        self.accounts.lock().push(user.clone());
        Ok(RegisterResponse {
            access_token: format!("session-{}", user.uid),
            token_type: TOKEN_TYPE.into(),
            expires_in: Some(1800),
            fraud_score: None,
            recommendations: Vec::new(),
            user,
        })
    }
}

#[derive(Default)]
struct Script {
    responses: Mutex<HashMap<String, CachedResponse>>,
    requests: Mutex<Vec<Url>>,
    offline: AtomicBool,
}

/// [`Fetcher`] answering from a fixed table. Unscripted URLs fail like an
/// unreachable network.
#[derive(Clone, Default)]
pub struct ScriptedFetcher {
    script: Arc<Script>,
}

impl ScriptedFetcher {
    pub fn respond(self, url: Url, response: CachedResponse) -> Self {
        self.script
            .responses
            .lock()
            .insert(url.to_string(), response);
        self
    }

    pub fn set_offline(&self, offline: bool) {
        self.script.offline.store(offline, Ordering::SeqCst);
    }

    pub fn requests(&self) -> Vec<Url> {
        self.script.requests.lock().clone()
    }
}

impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<CachedResponse, FetchError> {
        self.script.requests.lock().push(request.url.clone());
        if self.script.offline.load(Ordering::SeqCst) {
            return Err(FetchError("offline".into()));
        }
        self.script
            .responses
            .lock()
            .get(request.url.as_str())
            .cloned()
            .ok_or_else(|| FetchError(format!("no route to {}", request.url)))
    }
}

#[cfg(feature = "server")]
pub use server_fakes::*;

#[cfg(feature = "server")]
mod server_fakes {
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;

    use parking_lot::Mutex;

    use crate::identity::IdentityError;
    use crate::server::{
        CreatedIdentity, ExchangeError, IdTokenVerifier, IdentityAdmin, VerifiedIdentity,
    };
    use crate::token::{SessionKeys, SessionTokenIssuer};
    use crate::types::Uid;

    pub fn session_issuer() -> SessionTokenIssuer {
        SessionTokenIssuer::new(
            SessionKeys::generate().unwrap(),
            "dreambig",
            "dreambig-api",
            Duration::from_secs(30 * 60),
        )
    }

    enum Outcome {
        Identity(VerifiedIdentity),
        Error(fn() -> ExchangeError),
    }

    /// Verifier with a fixed token table. Unknown tokens are invalid.
    #[derive(Default)]
    pub struct FixedVerifier {
        tokens: HashMap<String, Outcome>,
    }

    impl FixedVerifier {
        pub fn with_identity(mut self, token: impl Into<String>, identity: VerifiedIdentity) -> Self {
            self.tokens.insert(token.into(), Outcome::Identity(identity));
            self
        }

        pub fn with_error(mut self, token: &str, error: fn() -> ExchangeError) -> Self {
            self.tokens.insert(token.into(), Outcome::Error(error));
            self
        }
    }

    impl IdTokenVerifier for FixedVerifier {
        async fn verify(&self, id_token: &str) -> Result<VerifiedIdentity, ExchangeError> {
            match self.tokens.get(id_token) {
                Some(Outcome::Identity(identity)) => Ok(identity.clone()),
                Some(Outcome::Error(error)) => Err(error()),
                None => Err(ExchangeError::InvalidToken("unknown test token".into())),
            }
        }
    }

    #[derive(Default)]
    struct Ledger {
        created: Vec<String>,
        deleted: Vec<String>,
        failure: Option<IdentityError>,
    }

    /// Identity admin that records what it created and deleted, by email.
    #[derive(Clone, Default)]
    pub struct RecordingAdmin {
        ledger: Arc<Mutex<Ledger>>,
    }

    impl RecordingAdmin {
        pub fn failing_with(self, error: IdentityError) -> Self {
            self.ledger.lock().failure = Some(error);
            self
        }

        pub fn created(&self) -> Vec<String> {
            self.ledger.lock().created.clone()
        }

        pub fn deleted(&self) -> Vec<String> {
            self.ledger.lock().deleted.clone()
        }
    }

    impl IdentityAdmin for RecordingAdmin {
        async fn create_identity(
            &self,
            email: &str,
            _password: &str,
            _display_name: &str,
        ) -> Result<CreatedIdentity, IdentityError> {
            let mut ledger = self.ledger.lock();
            if let Some(error) = &ledger.failure {
                return Err(error.clone());
            }
            ledger.created.push(email.into());
            Ok(CreatedIdentity {
                uid: Uid::from(format!("uid-{email}")),
                email: email.into(),
                id_token: format!("idtoken-{email}"),
            })
        }

        async fn delete_identity(&self, identity: &CreatedIdentity) -> Result<(), IdentityError> {
            self.ledger.lock().deleted.push(identity.email.clone());
            Ok(())
        }
    }
}
