//! Client session store.
//!
//! [`SessionManager`] is the single client-side authority for "is a user
//! signed in" and for the bearer token of API calls. It drives the
//! `SignedOut → Authenticating → SignedIn` state machine, persists the
//! session token and user snapshot through a [`KeyValueStore`], and
//! reconciles persisted state with the identity provider's auth-state
//! publications.
//!
//! Persisted state is cleared on a provider sign-out only when the user
//! explicitly logged out or the current route is public. Providers publish
//! signed-out transiently while they rehydrate after a reload, and a
//! protected page must survive that.
//!
//! ```rust,ignore
//! let manager = Arc::new(SessionManager::new(
//!     FirebaseIdentity::new(FirebaseClient::new(FirebaseConfig::from_env()?)),
//!     HttpBackend::new(config.api_base_url().clone()),
//!     FileStore::new("session.json"),
//!     config,
//! ));
//! tokio::spawn({
//!     let manager = manager.clone();
//!     async move { manager.run().await }
//! });
//! manager.sign_in_with_password("a@b.com", "secret").await?;
//! ```

mod api;
mod backend;
mod config;
mod storage;

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use tokio::sync::watch;

pub use api::{ApiClient, KeyedLocks};
pub use backend::{HttpBackend, SessionBackend};
pub use config::ClientConfig;
pub use storage::{FileStore, KeyValueStore, MemoryStore, SessionStorage, TOKEN_KEY, USER_KEY};

use crate::identity::{AuthStateEvent, IdentityError, IdentityProvider, OAuthPopup, ProviderUser};
use crate::protocol::RegisterRequest;
use crate::types::UserRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    SignedOut,
    Authenticating,
    SignedIn,
}

/// Result of a sign-in call that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignInOutcome {
    SignedIn(UserRecord),
    /// The user closed the OAuth popup. Nothing changed.
    Cancelled,
}

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum SessionError {
    #[error(transparent)]
    Identity(#[from] IdentityError),

    /// The backend answered with a non-2xx status.
    #[error("Backend rejected the request ({status}): {detail}")]
    Exchange { status: u16, detail: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    /// The provider has no identity (yet). Callers may retry shortly.
    #[error("Authentication is not ready")]
    NotReady,
}

impl SessionError {
    /// Text for the transient, auto-dismissing error banner.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Identity(IdentityError::InvalidCredentials) => "Invalid email or password.".into(),
            Self::Identity(IdentityError::EmailExists) => {
                "An account with this email already exists.".into()
            }
            Self::Identity(IdentityError::Network(_)) | Self::Network(_) => {
                "Network error. Please check your connection and try again.".into()
            }
            Self::Identity(IdentityError::UserCancelled) => "Sign-in cancelled.".into(),
            // 4xx details are written for users, and a token-type mismatch must reach the developer verbatim.
            Self::Exchange { status, detail } if *status < 500 => detail.clone(),
            Self::NotReady => "Still signing you in. Please try again in a moment.".into(),
            _ => "Something went wrong. Please try again.".into(),
        }
    }
}

impl From<reqwest::Error> for SessionError {
    fn from(e: reqwest::Error) -> Self {
        Self::Network(e.to_string())
    }
}

/// Client-side session context, owned by the host application.
pub struct SessionManager<P, B, S> {
    provider: P,
    backend: B,
    storage: SessionStorage<S>,
    config: ClientConfig,
    state: watch::Sender<SessionState>,
    route: RwLock<String>,
    logout_requested: AtomicBool,
}

impl<P, B, S> SessionManager<P, B, S>
where
    P: IdentityProvider,
    B: SessionBackend,
    S: KeyValueStore,
{
    /// Create a manager. The initial state comes from persisted storage
    /// alone; the provider may still be rehydrating.
    pub fn new(provider: P, backend: B, store: S, config: ClientConfig) -> Self {
        let storage = SessionStorage::new(store);
        let initial = if storage.has_session() {
            SessionState::SignedIn
        } else {
            SessionState::SignedOut
        };
        tracing::debug!(state = ?initial, "Session manager initialized");

        let (state, _) = watch::channel(initial);
        Self {
            provider,
            backend,
            storage,
            config,
            state,
            route: RwLock::new("/".to_owned()),
            logout_requested: AtomicBool::new(false),
        }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Record the route the host is currently showing.
    pub fn set_route(&self, route: impl Into<String>) {
        *self.route.write() = route.into();
    }

    pub fn route(&self) -> String {
        self.route.read().clone()
    }

    /// True iff a session token and a readable user record are persisted.
    ///
    /// Independent of the live provider identity, which may not be populated
    /// yet right after a page load.
    pub fn is_authenticated(&self) -> bool {
        self.storage.has_session()
    }

    pub fn current_user(&self) -> Option<UserRecord> {
        self.storage.user()
    }

    /// Persisted first-party session token.
    pub fn session_token(&self) -> Option<String> {
        self.storage.token()
    }

    /// ID token of the live provider identity, `None` when there is none (yet).
    ///
    /// # Errors
    ///
    /// Fails if the provider could not refresh an expired token.
    pub async fn current_token(&self) -> Result<Option<String>, SessionError> {
        Ok(self.provider.get_id_token().await?)
    }

    /// [`current_token`](Self::current_token), retried while the provider is
    /// still initializing.
    ///
    /// # Errors
    ///
    /// Fails if the provider could not refresh an expired token.
    pub async fn current_token_with_retry(&self) -> Result<Option<String>, SessionError> {
        for attempt in 0..=self.config.token_retry_attempts {
            if let Some(token) = self.current_token().await? {
                return Ok(Some(token));
            }
            if attempt < self.config.token_retry_attempts {
                tracing::debug!(attempt, "ID token not ready, retrying");
                tokio::time::sleep(self.config.token_retry_delay).await;
            }
        }
        Ok(None)
    }

    /// # Errors
    ///
    /// Provider, backend and storage failures; the state is back to what
    /// persisted storage says and nothing new is persisted.
    pub async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<SignInOutcome, SessionError> {
        self.authenticate(self.provider.sign_in_with_password(email, password))
            .await
    }

    /// Sign in with a server-minted custom token.
    ///
    /// # Errors
    ///
    /// As [`sign_in_with_password`](Self::sign_in_with_password).
    pub async fn sign_in_with_custom_token(
        &self,
        custom_token: &str,
    ) -> Result<SignInOutcome, SessionError> {
        self.authenticate(self.provider.sign_in_with_custom_token(custom_token))
            .await
    }

    /// Run the OAuth popup flow. A closed popup yields [`SignInOutcome::Cancelled`].
    ///
    /// # Errors
    ///
    /// As [`sign_in_with_password`](Self::sign_in_with_password).
    pub async fn sign_in_with_oauth_popup<O: OAuthPopup>(
        &self,
        popup: &O,
    ) -> Result<SignInOutcome, SessionError> {
        self.authenticate(self.provider.sign_in_with_oauth_popup(popup))
            .await
    }

    /// Register through the backend, then sign in to the provider with the
    /// new credentials. The backend owns identity creation and its
    /// compensation.
    ///
    /// # Errors
    ///
    /// As [`sign_in_with_password`](Self::sign_in_with_password).
    pub async fn sign_up(&self, request: RegisterRequest) -> Result<SignInOutcome, SessionError> {
        let mut events = self.begin_attempt();

        let registered = match self.backend.register(&request).await {
            Ok(registered) => registered,
            Err(e) => return self.abandon(e, false).await,
        };
        tracing::info!(uid = %registered.user.uid, "Account registered");
        if let Some(score) = registered.fraud_score.as_ref().filter(|s| s.is_fraud) {
            tracing::warn!(confidence = score.confidence, "Registration flagged by fraud heuristics");
        }

        if let Err(e) = self
            .provider
            .sign_in_with_password(&request.email, &request.password)
            .await
        {
            return self.abandon(e.into(), false).await;
        }
        if let Err(e) = self.await_identity(&mut events).await {
            return self.abandon(e, true).await;
        }

        self.establish(&registered.access_token, registered.user.to_record())
            .await
    }

    /// Explicit logout. Local state is cleared whatever the provider says.
    ///
    /// # Errors
    ///
    /// Fails only if persisted storage could not be cleared.
    pub async fn logout(&self) -> Result<(), SessionError> {
        self.logout_requested.store(true, Ordering::SeqCst);
        if let Err(e) = self.provider.sign_out().await {
            tracing::warn!(error = %e, "Provider sign-out failed, clearing local session anyway");
        }
        let cleared = self.storage.clear();
        self.set_state(SessionState::SignedOut);
        tracing::info!("Logged out");
        cleared
    }

    /// Reconcile persisted state with one provider publication.
    pub fn handle_auth_state(&self, event: &AuthStateEvent) {
        match event {
            AuthStateEvent::Pending => {
                tracing::trace!("Provider still rehydrating");
            }
            AuthStateEvent::SignedIn(user) => self.on_provider_signed_in(user),
            AuthStateEvent::SignedOut => self.on_provider_signed_out(),
        }
    }

    /// Follow the provider's publications until it goes away.
    pub async fn run(&self) {
        let mut events = self.provider.subscribe();
        loop {
            let event = events.borrow_and_update().clone();
            self.handle_auth_state(&event);
            if events.changed().await.is_err() {
                tracing::debug!("Identity provider closed its auth-state channel");
                break;
            }
        }
    }

    fn on_provider_signed_in(&self, user: &ProviderUser) {
        // A sign-in in progress persists its own result.
        if self.state() == SessionState::Authenticating {
            return;
        }
        if self.storage.token().is_none() {
            tracing::debug!(uid = %user.uid, "Provider identity without backend session");
            return;
        }

        let record = match self.storage.user() {
            Some(stored) if stored.uid != user.uid => {
                tracing::warn!(
                    stored = %stored.uid,
                    provider = %user.uid,
                    "Provider identity differs from stored session"
                );
                return;
            }
            Some(mut stored) => {
                if user.email.is_some() {
                    stored.email.clone_from(&user.email);
                }
                if user.display_name.is_some() {
                    stored.display_name.clone_from(&user.display_name);
                }
                stored
            }
            None => UserRecord {
                uid: user.uid.clone(),
                email: user.email.clone(),
                display_name: user.display_name.clone(),
                kyc_verified: false,
            },
        };

        match self.storage.save_user(&record) {
            Ok(()) => self.set_state(SessionState::SignedIn),
            Err(e) => tracing::warn!(error = %e, "Failed to refresh stored user record"),
        }
    }

    fn on_provider_signed_out(&self) {
        let explicit = self.logout_requested.load(Ordering::SeqCst);
        let route = self.route();

        if !explicit && !self.config.is_public_route(&route) {
            tracing::debug!(route = %route, "Keeping session on protected route");
            return;
        }

        if let Err(e) = self.storage.clear() {
            tracing::warn!(error = %e, "Failed to clear session");
        }
        if self.state() != SessionState::Authenticating {
            self.set_state(SessionState::SignedOut);
        }
        self.logout_requested.store(false, Ordering::SeqCst);
        tracing::info!(explicit, route = %route, "Session cleared after provider sign-out");
    }

    fn begin_attempt(&self) -> watch::Receiver<AuthStateEvent> {
        self.logout_requested.store(false, Ordering::SeqCst);
        self.set_state(SessionState::Authenticating);
        let mut events = self.provider.subscribe();
        events.borrow_and_update();
        events
    }

    async fn authenticate<F>(&self, attempt: F) -> Result<SignInOutcome, SessionError>
    where
        F: Future<Output = Result<(), IdentityError>> + Send,
    {
        let mut events = self.begin_attempt();
        if let Err(e) = attempt.await {
            return self.abandon(e.into(), false).await;
        }

        let exchanged = async {
            let user = self.await_identity(&mut events).await?;
            let id_token = self
                .provider
                .get_id_token()
                .await?
                .ok_or(SessionError::NotReady)?;
            let response = self.backend.login(&id_token).await?;
            tracing::debug!(uid = %user.uid, account_id = %response.user.id, "Token exchanged");
            Ok::<_, SessionError>(response)
        }
        .await;

        match exchanged {
            Ok(response) => {
                self.establish(&response.access_token, response.user.to_record())
                    .await
            }
            Err(e) => self.abandon(e, true).await,
        }
    }

    /// Wait for the provider to publish a signed-in identity after the
    /// attempt started.
    async fn await_identity(
        &self,
        events: &mut watch::Receiver<AuthStateEvent>,
    ) -> Result<ProviderUser, SessionError> {
        let wait = async {
            loop {
                if events.changed().await.is_err() {
                    return Err(SessionError::NotReady);
                }
                let user = events.borrow_and_update().user().cloned();
                if let Some(user) = user {
                    return Ok(user);
                }
            }
        };
        tokio::time::timeout(self.config.identity_timeout, wait)
            .await
            .map_err(|_| SessionError::NotReady)?
    }

    async fn establish(
        &self,
        token: &str,
        record: UserRecord,
    ) -> Result<SignInOutcome, SessionError> {
        if let Err(e) = self.storage.save(token, &record) {
            return self.abandon(e, true).await;
        }
        self.set_state(SessionState::SignedIn);
        tracing::info!(uid = %record.uid, "Signed in");
        Ok(SignInOutcome::SignedIn(record))
    }

    async fn abandon(
        &self,
        error: SessionError,
        provider_signed_in: bool,
    ) -> Result<SignInOutcome, SessionError> {
        if provider_signed_in {
            if let Err(e) = self.provider.sign_out().await {
                tracing::warn!(error = %e, "Provider sign-out after failed exchange failed");
            }
        }
        self.set_state(if self.storage.has_session() {
            SessionState::SignedIn
        } else {
            SessionState::SignedOut
        });

        if matches!(&error, SessionError::Identity(e) if e.is_benign()) {
            tracing::info!("Sign-in cancelled by user");
            return Ok(SignInOutcome::Cancelled);
        }
        tracing::warn!(error = %error, "Sign-in failed");
        Err(error)
    }

    fn set_state(&self, next: SessionState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            tracing::debug!(from = ?previous, to = ?next, "Session state changed");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::testutil::{ClosedPopup, FakeBackend, FakeIdentity, register_request};

    type Manager = SessionManager<FakeIdentity, FakeBackend, MemoryStore>;

    fn config() -> ClientConfig {
        ClientConfig::new("http://localhost:8000".parse().unwrap())
            .with_token_retry(2, Duration::from_millis(10))
            .with_identity_timeout(Duration::from_millis(200))
    }

    fn manager(identity: FakeIdentity, backend: FakeBackend) -> Manager {
        SessionManager::new(identity, backend, MemoryStore::default(), config())
    }

    fn signed_in_manager() -> Manager {
        let identity = FakeIdentity::default().with_user("a@b.com", "secret1", "uid-a");
        let backend = FakeBackend::default().with_account("uid-a", "a@b.com");
        manager(identity, backend)
    }

    #[tokio::test]
    async fn successful_sign_in_persists_session() {
        let manager = signed_in_manager();
        let outcome = manager.sign_in_with_password("a@b.com", "secret1").await.unwrap();

        let SignInOutcome::SignedIn(record) = outcome else {
            panic!("expected sign-in");
        };
        assert_eq!(record.uid.as_str(), "uid-a");
        assert_eq!(manager.state(), SessionState::SignedIn);
        assert!(manager.is_authenticated());
        assert!(manager.session_token().is_some());
        assert_eq!(manager.backend.logins(), ["idtoken-uid-a"]);
    }

    #[tokio::test]
    async fn invalid_credentials_persist_nothing() {
        let manager = signed_in_manager();
        let err = manager.sign_in_with_password("a@b.com", "wrong").await.unwrap_err();

        assert!(matches!(err, SessionError::Identity(IdentityError::InvalidCredentials)));
        assert_eq!(err.user_message(), "Invalid email or password.");
        assert_eq!(manager.state(), SessionState::SignedOut);
        assert!(!manager.is_authenticated());
        assert!(manager.session_token().is_none());
        assert!(manager.backend.logins().is_empty());
    }

    #[tokio::test]
    async fn failed_exchange_persists_nothing_and_signs_provider_out() {
        let identity = FakeIdentity::default().with_user("a@b.com", "secret1", "uid-a");
        // Backend has no account for uid-a.
        let manager = manager(identity, FakeBackend::default());

        let err = manager.sign_in_with_password("a@b.com", "secret1").await.unwrap_err();
        assert!(matches!(err, SessionError::Exchange { status: 404, .. }));
        assert_eq!(manager.state(), SessionState::SignedOut);
        assert!(!manager.is_authenticated());
        assert!(manager.provider().current_user().is_none());
    }

    #[tokio::test]
    async fn exchange_network_failure_is_transient() {
        let identity = FakeIdentity::default().with_user("a@b.com", "secret1", "uid-a");
        let backend = FakeBackend::default()
            .with_account("uid-a", "a@b.com")
            .offline();
        let manager = manager(identity, backend);

        let err = manager.sign_in_with_password("a@b.com", "secret1").await.unwrap_err();
        assert!(err.user_message().starts_with("Network error"));
        assert_eq!(manager.state(), SessionState::SignedOut);
        assert!(!manager.is_authenticated());
    }

    #[tokio::test]
    async fn custom_token_rejection_is_passed_through() {
        let identity = FakeIdentity::default().with_user("a@b.com", "secret1", "uid-a");
        let detail = "verify_id_token() expects an ID token, but was given a custom token.";
        let backend = FakeBackend::default().rejecting_with(401, detail);
        let manager = manager(identity, backend);

        let err = manager.sign_in_with_password("a@b.com", "secret1").await.unwrap_err();
        assert_eq!(err.user_message(), detail);
    }

    #[tokio::test]
    async fn closed_popup_is_not_an_error() {
        let manager = signed_in_manager();
        let outcome = manager.sign_in_with_oauth_popup(&ClosedPopup).await.unwrap();
        assert_eq!(outcome, SignInOutcome::Cancelled);
        assert_eq!(manager.state(), SessionState::SignedOut);
    }

    #[tokio::test]
    async fn custom_token_sign_in() {
        let identity = FakeIdentity::default().with_custom_token("ct-1", "uid-c");
        let backend = FakeBackend::default().with_account("uid-c", "c@b.com");
        let manager = manager(identity, backend);

        let outcome = manager.sign_in_with_custom_token("ct-1").await.unwrap();
        assert!(matches!(outcome, SignInOutcome::SignedIn(_)));
        assert!(manager.is_authenticated());
    }

    #[tokio::test]
    async fn null_callback_on_protected_route_keeps_session() {
        let manager = signed_in_manager();
        manager.sign_in_with_password("a@b.com", "secret1").await.unwrap();
        let token = manager.session_token();
        let user = manager.current_user();

        manager.set_route("/dashboard");
        manager.handle_auth_state(&AuthStateEvent::SignedOut);

        assert_eq!(manager.session_token(), token);
        assert_eq!(manager.current_user(), user);
        assert!(manager.is_authenticated());
        assert_eq!(manager.state(), SessionState::SignedIn);
    }

    #[tokio::test]
    async fn null_callback_on_public_route_clears_session() {
        for route in ["/", "/login", "/register", "/about"] {
            let manager = signed_in_manager();
            manager.sign_in_with_password("a@b.com", "secret1").await.unwrap();

            manager.set_route(route);
            manager.handle_auth_state(&AuthStateEvent::SignedOut);

            assert!(manager.session_token().is_none(), "{route}");
            assert!(manager.current_user().is_none(), "{route}");
            assert_eq!(manager.state(), SessionState::SignedOut);
        }
    }

    #[tokio::test]
    async fn pending_never_touches_session() {
        let manager = signed_in_manager();
        manager.sign_in_with_password("a@b.com", "secret1").await.unwrap();
        manager.set_route("/");

        manager.handle_auth_state(&AuthStateEvent::Pending);
        assert!(manager.is_authenticated());
    }

    #[tokio::test]
    async fn explicit_logout_clears_on_protected_route() {
        let manager = signed_in_manager();
        manager.sign_in_with_password("a@b.com", "secret1").await.unwrap();
        manager.set_route("/dashboard");

        manager.logout().await.unwrap();
        assert!(!manager.is_authenticated());
        assert_eq!(manager.state(), SessionState::SignedOut);
        assert!(manager.provider().current_user().is_none());
    }

    #[tokio::test]
    async fn logout_clears_even_when_provider_fails() {
        let manager = signed_in_manager();
        manager.sign_in_with_password("a@b.com", "secret1").await.unwrap();
        manager.provider().fail_sign_out();

        manager.logout().await.unwrap();
        assert!(!manager.is_authenticated());
    }

    #[test]
    fn is_authenticated_round_trip_without_network() {
        let store = MemoryStore::default();
        let record = UserRecord {
            uid: "uid-a".into(),
            email: Some("a@b.com".into()),
            display_name: None,
            kyc_verified: true,
        };
        store.set(TOKEN_KEY, "persisted-token").unwrap();
        store
            .set(USER_KEY, &serde_json::to_string(&record).unwrap())
            .unwrap();

        // Provider has no identity yet; persisted state alone decides.
        let manager = SessionManager::new(
            FakeIdentity::default(),
            FakeBackend::default(),
            store,
            config(),
        );
        assert!(manager.is_authenticated());
        assert_eq!(manager.state(), SessionState::SignedIn);
        assert_eq!(manager.current_user(), Some(record));
        assert!(manager.backend.logins().is_empty());
    }

    #[test]
    fn is_authenticated_needs_both_keys() {
        let record = serde_json::to_string(&UserRecord {
            uid: "uid-a".into(),
            email: Some("a@b.com".into()),
            display_name: None,
            kyc_verified: false,
        })
        .unwrap();
        let entries = [
            (TOKEN_KEY, "persisted-token"),
            (USER_KEY, record.as_str()),
        ];

        for (key, value) in entries {
            let store = MemoryStore::default();
            store.set(key, value).unwrap();
            let manager = SessionManager::new(
                FakeIdentity::default(),
                FakeBackend::default(),
                store,
                config(),
            );
            assert!(!manager.is_authenticated(), "only {key} persisted");
            assert_eq!(manager.state(), SessionState::SignedOut);
        }

        let store = MemoryStore::default();
        for (key, value) in entries {
            store.set(key, value).unwrap();
        }
        let manager = SessionManager::new(
            FakeIdentity::default(),
            FakeBackend::default(),
            store,
            config(),
        );
        assert!(manager.is_authenticated());
    }

    #[tokio::test]
    async fn listener_applies_route_rule() {
        let manager = Arc::new(signed_in_manager());
        manager.sign_in_with_password("a@b.com", "secret1").await.unwrap();
        manager.set_route("/dashboard");

        let listener = tokio::spawn({
            let manager = manager.clone();
            async move { manager.run().await }
        });

        // Transient sign-out while rehydrating on a protected page.
        manager.provider().publish(AuthStateEvent::SignedOut);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(manager.is_authenticated());

        manager.set_route("/login");
        manager.provider().publish(AuthStateEvent::SignedOut);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!manager.is_authenticated());

        listener.abort();
    }

    #[tokio::test]
    async fn provider_refresh_updates_user_record() {
        let manager = signed_in_manager();
        manager.sign_in_with_password("a@b.com", "secret1").await.unwrap();

        let user = ProviderUser::new("uid-a").with_display_name("Asha R.");
        manager.handle_auth_state(&AuthStateEvent::SignedIn(user));
        assert_eq!(
            manager.current_user().unwrap().display_name.as_deref(),
            Some("Asha R.")
        );

        // A different identity never overwrites the stored snapshot.
        manager.handle_auth_state(&AuthStateEvent::SignedIn(ProviderUser::new("uid-z")));
        assert_eq!(manager.current_user().unwrap().uid.as_str(), "uid-a");
    }

    #[tokio::test]
    async fn sign_up_registers_then_signs_in() {
        let identity = FakeIdentity::default().with_user("a@b.com", "hunter22", "uid-a");
        let backend = FakeBackend::default();
        let manager = manager(identity, backend);

        let outcome = manager.sign_up(register_request("a@b.com")).await.unwrap();
        assert!(matches!(outcome, SignInOutcome::SignedIn(_)));
        assert!(manager.is_authenticated());
        assert_eq!(manager.backend.registrations(), ["a@b.com"]);
    }

    #[tokio::test]
    async fn rejected_sign_up_persists_nothing() {
        let identity = FakeIdentity::default();
        let backend = FakeBackend::default().rejecting_with(400, "User with this email already exists");
        let manager = manager(identity, backend);

        let err = manager.sign_up(register_request("a@b.com")).await.unwrap_err();
        assert_eq!(err.user_message(), "User with this email already exists");
        assert!(!manager.is_authenticated());
        assert_eq!(manager.state(), SessionState::SignedOut);
    }

    #[tokio::test]
    async fn token_retry_gives_up_with_none() {
        let manager = signed_in_manager();
        assert_eq!(manager.current_token_with_retry().await.unwrap(), None);

        manager.sign_in_with_password("a@b.com", "secret1").await.unwrap();
        assert_eq!(
            manager.current_token_with_retry().await.unwrap().as_deref(),
            Some("idtoken-uid-a")
        );
    }
}
