//! Authenticated calls to the DreamBig API.

use std::collections::HashMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use tokio::sync::OwnedMutexGuard;
use url::Url;

use super::backend::ensure_success;
use super::{KeyValueStore, SessionBackend, SessionError, SessionManager};
use crate::identity::IdentityProvider;

/// Per-key async locks. Holders of the same key run one at a time, in the
/// order they asked; distinct keys never wait on each other.
#[derive(Debug, Default)]
pub struct KeyedLocks {
    locks: parking_lot::Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl KeyedLocks {
    pub async fn lock(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock();
            // Entries only the map still references are idle.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks.entry(key.to_owned()).or_default().clone()
        };
        lock.lock_owned().await
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.lock().len()
    }
}

/// HTTP client that attaches the current bearer token to API calls.
pub struct ApiClient<P, B, S> {
    session: Arc<SessionManager<P, B, S>>,
    base_url: Url,
    http: reqwest::Client,
    favorites: KeyedLocks,
}

impl<P, B, S> ApiClient<P, B, S>
where
    P: IdentityProvider,
    B: SessionBackend,
    S: KeyValueStore,
{
    pub fn new(session: Arc<SessionManager<P, B, S>>) -> Self {
        let base_url = session.config().api_base_url().clone();
        Self {
            session,
            base_url,
            http: reqwest::Client::new(),
            favorites: KeyedLocks::default(),
        }
    }

    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    /// Live ID token, falling back to the persisted session token.
    async fn bearer(&self) -> Result<String, SessionError> {
        if let Some(token) = self.session.current_token_with_retry().await? {
            return Ok(token);
        }
        self.session.session_token().ok_or(SessionError::NotReady)
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, SessionError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| SessionError::Config(format!("{} cannot be a base URL", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// GET a JSON resource below `/api/v1`.
    ///
    /// # Errors
    ///
    /// [`SessionError::NotReady`] without any token, otherwise network and
    /// non-2xx failures.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, SessionError> {
        let mut segments = vec!["api", "v1"];
        segments.extend(path.split('/').filter(|s| !s.is_empty()));
        let url = self.endpoint(&segments)?;

        let response = self
            .http
            .get(url)
            .bearer_auth(self.bearer().await?)
            .send()
            .await?;
        let response = ensure_success(response).await?;
        Ok(response.json().await?)
    }

    /// Add or remove a favorite property.
    ///
    /// Calls for the same property are serialized, so the last toggle the
    /// user made is the last request the server sees.
    ///
    /// # Errors
    ///
    /// As [`get_json`](Self::get_json).
    pub async fn set_favorite(&self, property_id: &str, favorite: bool) -> Result<(), SessionError> {
        let _guard = self.favorites.lock(property_id).await;

        let url = self.endpoint(&["api", "v1", "users", "favorites", property_id])?;
        let request = if favorite {
            self.http.post(url)
        } else {
            self.http.delete(url)
        };
        let response = request.bearer_auth(self.bearer().await?).send().await?;
        ensure_success(response).await?;

        tracing::debug!(property_id, favorite, "Favorite updated");
        Ok(())
    }
}
