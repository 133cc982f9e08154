use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::Value as JsonValue;

use super::config::ExchangeConfig;
use super::error::ExchangeError;
use super::exchange::TokenExchange;
use super::extractor::AuthAccount;
use super::state::ExchangeState;
use super::traits::{AccountStore, IdTokenVerifier, IdentityAdmin};
use super::types::DevLoginParams;
use crate::protocol::{
    KycResponse, LoginRequest, LoginResponse, MeResponse, RegisterRequest, RegisterResponse,
};
use crate::types::Uid;

/// Create the token exchange router.
///
/// Mounts `login`, `register`, `me` and `kyc` under the configured prefix
/// (`/api/v1/auth` by default), plus `dev-login` when enabled.
pub fn auth_routes<V, A, S>(config: ExchangeConfig, verifier: V, admin: A, accounts: S) -> Router
where
    V: IdTokenVerifier,
    A: IdentityAdmin,
    S: AccountStore,
{
    let issuer = config.token_issuer();
    let prefix = config.settings.api_prefix.clone();

    let state = ExchangeState {
        exchange: Arc::new(TokenExchange::new(
            verifier,
            admin,
            accounts,
            issuer,
            config.settings,
        )),
    };

    let mut router = Router::new()
        .route(&format!("{prefix}/login"), post(login::<V, A, S>))
        .route(&format!("{prefix}/register"), post(register::<V, A, S>))
        .route(&format!("{prefix}/me"), get(me))
        .route(&format!("{prefix}/kyc"), post(kyc::<V, A, S>));

    if state.exchange.settings().dev_login_enabled {
        tracing::warn!("Dev login enabled");
        router = router.route(&format!("{prefix}/dev-login"), post(dev_login::<V, A, S>));
    }

    router.with_state(state)
}

async fn login<V: IdTokenVerifier, A: IdentityAdmin, S: AccountStore>(
    State(state): State<ExchangeState<V, A, S>>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ExchangeError> {
    state.exchange.login(&req.id_token).await.map(Json)
}

async fn register<V: IdTokenVerifier, A: IdentityAdmin, S: AccountStore>(
    State(state): State<ExchangeState<V, A, S>>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), ExchangeError> {
    let response = state.exchange.register(req).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

async fn me(AuthAccount(account): AuthAccount) -> Json<MeResponse> {
    Json(MeResponse {
        uid: account.uid.clone(),
        user: account,
        token_valid: true,
    })
}

async fn kyc<V: IdTokenVerifier, A: IdentityAdmin, S: AccountStore>(
    State(state): State<ExchangeState<V, A, S>>,
    AuthAccount(account): AuthAccount,
    Json(details): Json<JsonValue>,
) -> Result<Json<KycResponse>, ExchangeError> {
    state.exchange.submit_kyc(&account, details).await.map(Json)
}

// Only registered when dev login is enabled.
async fn dev_login<V: IdTokenVerifier, A: IdentityAdmin, S: AccountStore>(
    State(state): State<ExchangeState<V, A, S>>,
    Query(params): Query<DevLoginParams>,
) -> Result<Json<LoginResponse>, ExchangeError> {
    let uid = params
        .uid
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| ExchangeError::Validation("uid query parameter is required".into()))?;
    state.exchange.dev_login(&Uid(uid)).await.map(Json)
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, header};
    use serde::de::DeserializeOwned;
    use serde_json::json;
    use tower::ServiceExt;

    use super::*;
    use crate::protocol::ErrorDetail;
    use crate::server::memory::InMemoryAccountStore;
    use crate::server::types::{NewAccount, VerifiedIdentity};
    use crate::testutil::{FixedVerifier, RecordingAdmin, custom_token, register_request};
    use crate::token::SessionKeys;
    use crate::types::Role;

    async fn app_with(verifier: FixedVerifier, admin: RecordingAdmin, dev: bool) -> Router {
        let accounts = InMemoryAccountStore::default();
        accounts
            .create(NewAccount {
                uid: Uid::from("uid-known"),
                email: "known@b.com".into(),
                name: "Known".into(),
                phone: None,
                role: Role::Owner,
            })
            .await
            .unwrap();
        let config = ExchangeConfig::new(SessionKeys::generate().unwrap())
            .with_dev_login_enabled(dev);
        auth_routes(config, verifier, admin, accounts)
    }

    fn verifier() -> FixedVerifier {
        FixedVerifier::default()
            .with_identity("good-token", VerifiedIdentity::new("uid-known"))
            .with_identity("stranger-token", VerifiedIdentity::new("uid-stranger"))
            .with_error("expired-token", || ExchangeError::TokenExpired)
    }

    fn post_json(uri: &str, body: &JsonValue) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn read<T: DeserializeOwned>(response: axum::response::Response) -> T {
        let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn login(app: &Router, id_token: &str) -> axum::response::Response {
        app.clone()
            .oneshot(post_json("/api/v1/auth/login", &json!({ "id_token": id_token })))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn login_returns_bearer_session() {
        let app = app_with(verifier(), RecordingAdmin::default(), false).await;
        let response = login(&app, "good-token").await;
        assert_eq!(response.status(), StatusCode::OK);

        let body: LoginResponse = read(response).await;
        assert_eq!(body.token_type, "bearer");
        assert!(body.access_token.starts_with("v4.public."));
        assert_eq!(body.user.email, "known@b.com");
    }

    #[tokio::test]
    async fn custom_token_gets_verbatim_type_error() {
        let app = app_with(verifier(), RecordingAdmin::default(), false).await;
        let response = login(&app, &custom_token("uid-known")).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let body: ErrorDetail = read(response).await;
        assert_eq!(body.detail, crate::server::error::CUSTOM_TOKEN_MESSAGE);
    }

    #[tokio::test]
    async fn expired_token_is_401() {
        let app = app_with(verifier(), RecordingAdmin::default(), false).await;
        let response = login(&app, "expired-token").await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body: ErrorDetail = read(response).await;
        assert_eq!(body.detail, "Token has expired");
    }

    #[tokio::test]
    async fn unknown_identity_is_404() {
        let app = app_with(verifier(), RecordingAdmin::default(), false).await;
        let response = login(&app, "stranger-token").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn register_then_me() {
        let app = app_with(verifier(), RecordingAdmin::default(), false).await;
        let body = serde_json::to_value(register_request("new@b.com")).unwrap();
        let response = app
            .clone()
            .oneshot(post_json("/api/v1/auth/register", &body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let registered: RegisterResponse = read(response).await;
        assert!(registered.fraud_score.is_some());

        let response = app
            .oneshot(
                Request::get("/api/v1/auth/me")
                    .header(
                        header::AUTHORIZATION,
                        format!("Bearer {}", registered.access_token),
                    )
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let me: MeResponse = read(response).await;
        assert!(me.token_valid);
        assert_eq!(me.user.email, "new@b.com");
        assert_eq!(me.uid, registered.user.uid);
    }

    #[tokio::test]
    async fn duplicate_email_is_400_without_identity() {
        let admin = RecordingAdmin::default();
        let app = app_with(verifier(), admin.clone(), false).await;
        let mut req = register_request("known@b.com");
        req.phone = None;

        let response = app
            .oneshot(post_json(
                "/api/v1/auth/register",
                &serde_json::to_value(req).unwrap(),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: ErrorDetail = read(response).await;
        assert_eq!(body.detail, "User with this email already exists");
        assert!(admin.created().is_empty());
        assert!(admin.deleted().is_empty());
    }

    #[tokio::test]
    async fn invalid_registration_is_422() {
        let admin = RecordingAdmin::default();
        let app = app_with(verifier(), admin.clone(), false).await;
        let mut req = register_request("new@b.com");
        req.email = "invalid-email".into();

        let response = app
            .oneshot(post_json(
                "/api/v1/auth/register",
                &serde_json::to_value(req).unwrap(),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(admin.created().is_empty());
    }

    #[tokio::test]
    async fn me_requires_bearer() {
        let app = app_with(verifier(), RecordingAdmin::default(), false).await;
        let response = app
            .oneshot(Request::get("/api/v1/auth/me").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn me_accepts_id_token_fallback() {
        let app = app_with(verifier(), RecordingAdmin::default(), false).await;
        let response = app
            .oneshot(
                Request::get("/api/v1/auth/me")
                    .header(header::AUTHORIZATION, "Bearer good-token")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let me: MeResponse = read(response).await;
        assert_eq!(me.uid.as_str(), "uid-known");
    }

    #[tokio::test]
    async fn kyc_verifies_account() {
        let app = app_with(verifier(), RecordingAdmin::default(), false).await;
        let request = Request::post("/api/v1/auth/kyc")
            .header(header::AUTHORIZATION, "Bearer good-token")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                json!({"document_type": "passport", "document_number": "X1"}).to_string(),
            ))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: KycResponse = read(response).await;
        assert!(body.user.kyc_verified);
    }

    #[tokio::test]
    async fn dev_login_only_when_enabled() {
        let app = app_with(verifier(), RecordingAdmin::default(), false).await;
        let response = app
            .oneshot(
                Request::post("/api/v1/auth/dev-login?uid=uid-known")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let app = app_with(verifier(), RecordingAdmin::default(), true).await;
        let response = app
            .oneshot(
                Request::post("/api/v1/auth/dev-login?uid=uid-known")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: LoginResponse = read(response).await;
        assert_eq!(body.user.uid.as_str(), "uid-known");
    }
}
