//! Client side of the identity provider.
//!
//! [`IdentityProvider`] is the seam the session layer talks to. It wraps
//! sign-in, sign-up, sign-out and ID-token retrieval, and publishes every
//! change of the signed-in identity through an [`AuthStateObserver`]. The
//! publication is decoupled from the call that caused it: a sign-in future
//! resolves independently of subscribers observing the new state.
//!
//! [`FirebaseIdentity`] implements the trait against the Firebase Identity
//! Toolkit REST API.

mod firebase;
pub mod oauth;
mod observer;

use std::future::Future;

use tokio::sync::watch;

pub use firebase::{FirebaseClient, FirebaseConfig, FirebaseIdentity, TokenGrant};
pub use oauth::{OAuthPopup, PopupOutcome};
pub use observer::{AuthStateEvent, AuthStateObserver};

use crate::types::Uid;

/// Handle to the identity currently signed in at the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderUser {
    pub uid: Uid,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub email_verified: bool,
}

impl ProviderUser {
    #[must_use]
    pub fn new(uid: impl Into<Uid>) -> Self {
        Self {
            uid: uid.into(),
            email: None,
            display_name: None,
            email_verified: false,
        }
    }

    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    #[must_use]
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }
}

/// Failures reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum IdentityError {
    /// Unknown email, wrong password, or a disabled account.
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("An account with this email already exists")]
    EmailExists,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Identity provider error ({code}): {message}")]
    Provider { code: String, message: String },

    /// The user closed the OAuth popup. Not an error from the user's point of view.
    #[error("Sign-in cancelled")]
    UserCancelled,

    #[error("No identity is signed in")]
    NotSignedIn,
}

impl IdentityError {
    pub(crate) fn provider(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Conditions that must not surface to the user as an error.
    #[must_use]
    pub fn is_benign(&self) -> bool {
        matches!(self, Self::UserCancelled)
    }
}

impl From<crate::error::Error> for IdentityError {
    fn from(e: crate::error::Error) -> Self {
        match e {
            crate::error::Error::Http(e) => Self::Network(e.to_string()),
            crate::error::Error::OAuth {
                operation, detail, ..
            } => Self::provider(operation, detail),
            crate::error::Error::Token(msg) => Self::provider("token", msg),
        }
    }
}

impl From<reqwest::Error> for IdentityError {
    fn from(e: reqwest::Error) -> Self {
        Self::Network(e.to_string())
    }
}

/// Operations the session layer needs from an identity provider.
///
/// Successful sign-in, sign-up and sign-out calls publish the resulting
/// [`AuthStateEvent`] to subscribers; callers must not assume a subscriber
/// has observed it when the call resolves.
pub trait IdentityProvider: Send + Sync + 'static {
    fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> impl Future<Output = Result<(), IdentityError>> + Send;

    /// Sign in with a server-minted custom token.
    fn sign_in_with_custom_token(
        &self,
        custom_token: &str,
    ) -> impl Future<Output = Result<(), IdentityError>> + Send;

    /// Run the OAuth popup flow. A closed popup yields [`IdentityError::UserCancelled`].
    fn sign_in_with_oauth_popup<P: OAuthPopup>(
        &self,
        popup: &P,
    ) -> impl Future<Output = Result<(), IdentityError>> + Send;

    /// Create a provider account and sign in as it.
    fn sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: Option<&str>,
    ) -> impl Future<Output = Result<(), IdentityError>> + Send;

    /// Drop the provider-side session.
    fn sign_out(&self) -> impl Future<Output = Result<(), IdentityError>> + Send;

    /// Current ID token of the active identity, or `None` when nobody is signed in.
    fn get_id_token(&self) -> impl Future<Output = Result<Option<String>, IdentityError>> + Send;

    fn current_user(&self) -> Option<ProviderUser>;

    fn subscribe(&self) -> watch::Receiver<AuthStateEvent>;
}
