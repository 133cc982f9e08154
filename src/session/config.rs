use std::time::Duration;

use url::Url;

use super::SessionError;

/// Client-side session configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub(crate) api_base_url: Url,
    pub(crate) public_routes: Vec<String>,
    pub(crate) token_retry_attempts: u32,
    pub(crate) token_retry_delay: Duration,
    pub(crate) identity_timeout: Duration,
}

impl ClientConfig {
    #[must_use]
    pub fn new(api_base_url: Url) -> Self {
        Self {
            api_base_url,
            public_routes: ["/", "/login", "/register", "/about"]
                .into_iter()
                .map(String::from)
                .collect(),
            token_retry_attempts: 3,
            token_retry_delay: Duration::from_millis(500),
            identity_timeout: Duration::from_secs(10),
        }
    }

    /// Create config from `DREAMBIG_API_URL` (default `http://localhost:8000`).
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Config`] if the URL is invalid.
    pub fn from_env() -> Result<Self, SessionError> {
        let raw = std::env::var("DREAMBIG_API_URL")
            .unwrap_or_else(|_| "http://localhost:8000".to_owned());
        let url = raw
            .parse()
            .map_err(|e| SessionError::Config(format!("DREAMBIG_API_URL: {e}")))?;
        Ok(Self::new(url))
    }

    /// Routes on which a signed-out provider state clears the local session.
    #[must_use]
    pub fn with_public_routes(mut self, routes: Vec<String>) -> Self {
        self.public_routes = routes;
        self
    }

    #[must_use]
    pub fn with_token_retry(mut self, attempts: u32, delay: Duration) -> Self {
        self.token_retry_attempts = attempts;
        self.token_retry_delay = delay;
        self
    }

    /// How long a sign-in waits for the provider to publish the new identity.
    #[must_use]
    pub fn with_identity_timeout(mut self, timeout: Duration) -> Self {
        self.identity_timeout = timeout;
        self
    }

    #[must_use]
    pub fn api_base_url(&self) -> &Url {
        &self.api_base_url
    }

    /// Whether `route` (path, optionally with query or fragment) is public.
    #[must_use]
    pub fn is_public_route(&self, route: &str) -> bool {
        let path = normalize_route(route);
        self.public_routes.iter().any(|r| normalize_route(r) == path)
    }
}

fn normalize_route(route: &str) -> &str {
    let path = route.split(['?', '#']).next().unwrap_or_default();
    match path.trim_end_matches('/') {
        "" => "/",
        trimmed => trimmed,
    }
}
