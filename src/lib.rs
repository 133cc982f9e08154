#![doc = include_str!("../README.md")]

pub mod error;
pub mod fraud;
pub mod identity;
pub mod pkce;
pub mod protocol;
#[cfg(feature = "server")]
pub mod server;
pub mod session;
pub mod token;
pub mod types;
pub mod worker;

#[cfg(test)]
mod testutil;

// Re-exports for convenient access
pub use error::Error;
pub use identity::{
    AuthStateEvent, FirebaseClient, FirebaseConfig, FirebaseIdentity, IdentityError,
    IdentityProvider, ProviderUser,
};
pub use protocol::{Account, LoginResponse, RegisterRequest, RegisterResponse};
pub use session::{ClientConfig, SessionError, SessionManager, SessionState, SignInOutcome};
pub use token::{SessionKeys, SessionTokenIssuer, TokenKind};
pub use types::{AccountId, Role, Uid, UserRecord};
pub use worker::{CacheWorker, WorkerConfig};
