//! Backend token exchange for Axum.
//!
//! Verifies identity provider ID tokens, mints first-party session tokens,
//! and registers accounts with compensation of orphaned identities.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use dreambig::server::{ExchangeConfig, FirebaseVerifier, InMemoryAccountStore, auth_routes};
//! use dreambig::identity::{FirebaseClient, FirebaseConfig};
//!
//! let config = ExchangeConfig::from_env()?;
//! let verifier = FirebaseVerifier::from_env()?;
//! let admin = FirebaseClient::new(FirebaseConfig::from_env()?);
//!
//! let app = axum::Router::new()
//!     .merge(auth_routes(config, verifier, admin, InMemoryAccountStore::default()));
//! ```

mod admin;
mod config;
mod error;
mod exchange;
mod extractor;
mod memory;
mod routes;
mod state;
mod traits;
mod types;
mod verifier;

pub use config::ExchangeConfig;
pub use error::{CUSTOM_TOKEN_MESSAGE, ExchangeError};
pub use exchange::TokenExchange;
pub use extractor::AuthAccount;
pub use memory::InMemoryAccountStore;
pub use routes::auth_routes;
pub use traits::{AccountStore, CreatedIdentity, IdTokenVerifier, IdentityAdmin, StoreError};
pub use types::{NewAccount, VerifiedIdentity};
pub use verifier::FirebaseVerifier;
