use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum_extra::TypedHeader;
use axum_extra::headers::Authorization;
use axum_extra::headers::authorization::Bearer;

use super::error::ExchangeError;
use super::state::ExchangeState;
use super::traits::{AccountStore, IdTokenVerifier, IdentityAdmin};
use crate::protocol::Account;

/// Account behind the request's bearer credential.
///
/// Accepts a session token, or as fallback a verified ID token. Rejects with
/// `401` when the header is missing or the credential is invalid.
///
/// ```rust,ignore
/// async fn profile(AuthAccount(account): AuthAccount) -> Json<Account> {
///     Json(account)
/// }
/// ```
#[derive(Debug, Clone)]
pub struct AuthAccount(pub Account);

impl<V, A, S> FromRequestParts<ExchangeState<V, A, S>> for AuthAccount
where
    V: IdTokenVerifier,
    A: IdentityAdmin,
    S: AccountStore,
{
    type Rejection = ExchangeError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &ExchangeState<V, A, S>,
    ) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| ExchangeError::Unauthenticated)?;

        state
            .exchange
            .authenticate(bearer.token())
            .await
            .map(AuthAccount)
    }
}
