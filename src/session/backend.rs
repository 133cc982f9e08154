use std::future::Future;

use url::Url;

use super::SessionError;
use crate::protocol::{ErrorDetail, LoginRequest, LoginResponse, RegisterRequest, RegisterResponse};

/// Client side of the backend token exchange.
pub trait SessionBackend: Send + Sync + 'static {
    /// Exchange an identity provider ID token for a session token.
    fn login(&self, id_token: &str)
    -> impl Future<Output = Result<LoginResponse, SessionError>> + Send;

    /// Register an account. The backend creates the provider identity itself.
    fn register(
        &self,
        request: &RegisterRequest,
    ) -> impl Future<Output = Result<RegisterResponse, SessionError>> + Send;
}

/// [`SessionBackend`] over the `/api/v1/auth` HTTP endpoints.
#[derive(Clone)]
pub struct HttpBackend {
    base_url: Url,
    http: reqwest::Client,
}

impl HttpBackend {
    #[must_use]
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            http: reqwest::Client::new(),
        }
    }

    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    fn endpoint(&self, path: &str) -> Result<Url, SessionError> {
        self.base_url
            .join(path)
            .map_err(|e| SessionError::Network(format!("invalid backend URL: {e}")))
    }

    async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, SessionError>
    where
        B: serde::Serialize + Sync + ?Sized,
        T: serde::de::DeserializeOwned,
    {
        let response = self.http.post(self.endpoint(path)?).json(body).send().await?;
        let response = ensure_success(response).await?;
        response.json::<T>().await.map_err(Into::into)
    }
}

impl SessionBackend for HttpBackend {
    async fn login(&self, id_token: &str) -> Result<LoginResponse, SessionError> {
        self.post(
            "/api/v1/auth/login",
            &LoginRequest {
                id_token: id_token.to_owned(),
            },
        )
        .await
    }

    async fn register(&self, request: &RegisterRequest) -> Result<RegisterResponse, SessionError> {
        self.post("/api/v1/auth/register", request).await
    }
}

/// Return the response on 2xx, otherwise [`SessionError::Exchange`] with the
/// backend's `detail` message.
pub(crate) async fn ensure_success(
    response: reqwest::Response,
) -> Result<reqwest::Response, SessionError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<ErrorDetail>(&body)
        .map(|e| e.detail)
        .unwrap_or_else(|_| status.canonical_reason().unwrap_or("Request failed").to_owned());
    Err(SessionError::Exchange {
        status: status.as_u16(),
        detail,
    })
}
