use std::future::Future;

use serde_json::Value as JsonValue;

use super::error::ExchangeError;
use super::types::{NewAccount, VerifiedIdentity};
use crate::identity::IdentityError;
use crate::protocol::Account;
use crate::types::{AccountId, Uid};

/// Verifies identity provider ID tokens.
///
/// Signature, expiry, issuer and audience checks happen here; the exchange
/// never looks inside an ID token it has not had verified.
pub trait IdTokenVerifier: Send + Sync + 'static {
    fn verify(
        &self,
        id_token: &str,
    ) -> impl Future<Output = Result<VerifiedIdentity, ExchangeError>> + Send;
}

/// Identity account created at the provider during registration.
#[derive(Debug, Clone)]
pub struct CreatedIdentity {
    pub uid: Uid,
    pub email: String,
    /// Credential of the new identity, needed to delete it again.
    pub id_token: String,
}

/// Administrative access to the identity provider.
pub trait IdentityAdmin: Send + Sync + 'static {
    fn create_identity(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> impl Future<Output = Result<CreatedIdentity, IdentityError>> + Send;

    /// Delete an identity created by [`create_identity`](Self::create_identity).
    fn delete_identity(
        &self,
        identity: &CreatedIdentity,
    ) -> impl Future<Output = Result<(), IdentityError>> + Send;
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Another account already uses this field (`email`, `phone number`, `identity`).
    #[error("{0} already in use")]
    Duplicate(&'static str),

    #[error("account not found")]
    NotFound,

    #[error(transparent)]
    Backend(Box<dyn std::error::Error + Send + Sync>),
}

/// Consumer-provided account persistence.
///
/// # Example
///
/// ```rust,ignore
/// impl AccountStore for PgAccounts {
///     async fn find_by_uid(&self, uid: &Uid) -> Result<Option<Account>, StoreError> {
///         sqlx::query_as("SELECT * FROM users WHERE firebase_uid = $1")
///             .bind(uid.as_str())
///             .fetch_optional(&self.pool)
///             .await
///             .map_err(|e| StoreError::Backend(e.into()))
///     }
///     // ...
/// }
/// ```
pub trait AccountStore: Send + Sync + 'static {
    fn find(
        &self,
        id: AccountId,
    ) -> impl Future<Output = Result<Option<Account>, StoreError>> + Send;

    fn find_by_uid(
        &self,
        uid: &Uid,
    ) -> impl Future<Output = Result<Option<Account>, StoreError>> + Send;

    fn find_by_email(
        &self,
        email: &str,
    ) -> impl Future<Output = Result<Option<Account>, StoreError>> + Send;

    fn find_by_phone(
        &self,
        phone: &str,
    ) -> impl Future<Output = Result<Option<Account>, StoreError>> + Send;

    /// Insert a new account. At most one account may exist per uid, email and phone;
    /// a collision yields [`StoreError::Duplicate`].
    fn create(
        &self,
        account: NewAccount,
    ) -> impl Future<Output = Result<Account, StoreError>> + Send;

    /// Store KYC details and mark the account verified.
    fn complete_kyc(
        &self,
        id: AccountId,
        details: JsonValue,
    ) -> impl Future<Output = Result<Account, StoreError>> + Send;

    /// Number of property listings the account has posted.
    fn listings_posted(
        &self,
        _id: AccountId,
    ) -> impl Future<Output = Result<u32, StoreError>> + Send {
        async { Ok(0) }
    }
}
