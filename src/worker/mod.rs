//! Offline request cache.
//!
//! [`CacheWorker`] is the platform-independent core of the site's
//! installable offline shell. The host forwards lifecycle events (install,
//! activate), intercepted fetches, push and notification-click events, and
//! page messages; the worker answers from the network or from a versioned
//! [`CacheStorage`] according to the request's [`Strategy`].
//!
//! Network failures never escape [`CacheWorker::handle_fetch`]: every policy
//! ends in a synthesized offline response.

mod cache;
mod fetch;
mod notify;
mod offline;
mod policy;

use std::sync::Arc;

use parking_lot::RwLock;
use url::Url;

pub use cache::CacheStorage;
pub use fetch::{CachedResponse, FetchError, FetchRequest, Fetcher, ReqwestFetcher};
pub use notify::{
    ClickOutcome, Notification, NotificationAction, SYNC_TAG, WorkerMessage, WorkerReply,
    route_click,
};
pub use offline::{OFFLINE_HTML, OFFLINE_MESSAGE};
pub use policy::{Strategy, classify};

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    origin: Url,
    version: String,
    cache_prefix: String,
    precache: Vec<String>,
    offline_page: String,
    notification_icon: String,
    notification_destination: String,
}

impl WorkerConfig {
    /// `origin` is the scope root; `version` the deployed version tag.
    #[must_use]
    pub fn new(origin: Url, version: impl Into<String>) -> Self {
        Self {
            origin,
            version: version.into(),
            cache_prefix: "dreambig".to_owned(),
            precache: [
                "/",
                "/static/css/style.css",
                "/static/js/app.js",
                "/static/js/auth.js",
                "/static/manifest.json",
                "/static/icons/icon-192x192.png",
                "/static/icons/icon-512x512.png",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            offline_page: "/offline.html".to_owned(),
            notification_icon: "/static/icons/icon-192x192.png".to_owned(),
            notification_destination: "/".to_owned(),
        }
    }

    #[must_use]
    pub fn with_cache_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.cache_prefix = prefix.into();
        self
    }

    /// Paths fetched and cached on install, besides the offline page.
    #[must_use]
    pub fn with_precache(mut self, paths: Vec<String>) -> Self {
        self.precache = paths;
        self
    }

    #[must_use]
    pub fn with_offline_page(mut self, path: impl Into<String>) -> Self {
        self.offline_page = path.into();
        self
    }

    #[must_use]
    pub fn with_notification_icon(mut self, path: impl Into<String>) -> Self {
        self.notification_icon = path.into();
        self
    }

    /// Where a notification click navigates.
    #[must_use]
    pub fn with_notification_destination(mut self, path: impl Into<String>) -> Self {
        self.notification_destination = path.into();
        self
    }

    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Name of the cache store for the current version.
    #[must_use]
    pub fn cache_name(&self) -> String {
        format!("{}-{}", self.cache_prefix, self.version)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Parsed,
    /// Installed, waiting for activation.
    Installed,
    Activated,
}

pub struct CacheWorker<F> {
    config: WorkerConfig,
    fetcher: F,
    caches: Arc<CacheStorage>,
    lifecycle: RwLock<Lifecycle>,
}

impl<F: Fetcher> CacheWorker<F> {
    pub fn new(config: WorkerConfig, fetcher: F) -> Self {
        Self {
            config,
            fetcher,
            caches: Arc::default(),
            lifecycle: RwLock::new(Lifecycle::Parsed),
        }
    }

    /// Share a cache storage with earlier worker versions.
    #[must_use]
    pub fn with_caches(mut self, caches: Arc<CacheStorage>) -> Self {
        self.caches = caches;
        self
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn caches(&self) -> &Arc<CacheStorage> {
        &self.caches
    }

    pub fn lifecycle(&self) -> Lifecycle {
        *self.lifecycle.read()
    }

    /// Precache the configured assets and the offline page. Assets that
    /// fail to load are skipped. Returns how many were cached.
    pub async fn install(&self) -> usize {
        let cache = self.config.cache_name();
        self.caches.open(&cache);

        let mut paths = self.config.precache.clone();
        if !paths.contains(&self.config.offline_page) {
            paths.push(self.config.offline_page.clone());
        }

        let mut cached = 0;
        for path in &paths {
            let Some(url) = self.resolve(path) else {
                tracing::warn!(path = %path, "Skipping unresolvable precache path");
                continue;
            };
            match self.fetcher.fetch(&FetchRequest::get(url.clone())).await {
                Ok(response) if response.is_success() => {
                    self.caches.put(&cache, &url, response);
                    cached += 1;
                }
                Ok(response) => {
                    tracing::warn!(path = %path, status = %response.status, "Precache skipped");
                }
                Err(e) => tracing::warn!(path = %path, error = %e, "Precache skipped"),
            }
        }

        *self.lifecycle.write() = Lifecycle::Installed;
        tracing::info!(cache = %cache, cached, total = paths.len(), "Worker installed");
        cached
    }

    /// Delete every cache store except the current version's. Returns the
    /// deleted store names.
    pub fn activate(&self) -> Vec<String> {
        let current = self.config.cache_name();
        let deleted = self.caches.retain_only(&current);
        for name in &deleted {
            tracing::info!(cache = %name, "Deleted stale cache");
        }
        *self.lifecycle.write() = Lifecycle::Activated;
        tracing::info!(cache = %current, "Worker activated");
        deleted
    }

    /// Answer an intercepted request. `None` means "not intercepted": the
    /// host lets the request through untouched.
    pub async fn handle_fetch(&self, request: &FetchRequest) -> Option<CachedResponse> {
        let strategy = classify(request, &self.config.origin.origin())?;
        let response = match strategy {
            Strategy::ApiNetworkFirst => self.api_network_first(request).await,
            Strategy::StaticCacheFirst => self.static_cache_first(request).await,
            Strategy::PageNetworkFirst => self.page_network_first(request).await,
        };
        Some(response)
    }

    async fn api_network_first(&self, request: &FetchRequest) -> CachedResponse {
        match self.fetch_and_store(request).await {
            Ok(response) => response,
            Err(e) => {
                if let Some(cached) = self.cached(&request.url) {
                    tracing::debug!(url = %request.url, "Network failed, serving cached API response");
                    return cached;
                }
                tracing::debug!(url = %request.url, error = %e, "Network failed, API offline");
                offline::api_unavailable()
            }
        }
    }

    async fn static_cache_first(&self, request: &FetchRequest) -> CachedResponse {
        if let Some(cached) = self.cached(&request.url) {
            return cached;
        }
        match self.fetch_and_store(request).await {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!(url = %request.url, error = %e, "Asset unavailable offline");
                offline::asset_unavailable()
            }
        }
    }

    async fn page_network_first(&self, request: &FetchRequest) -> CachedResponse {
        let error = match self.fetch_and_store(request).await {
            Ok(response) => return response,
            Err(e) => e,
        };
        if let Some(cached) = self.cached(&request.url) {
            tracing::debug!(url = %request.url, "Network failed, serving cached page");
            return cached;
        }
        let offline_page = self
            .resolve(&self.config.offline_page)
            .and_then(|url| self.cached(&url));
        if let Some(page) = offline_page {
            tracing::debug!(url = %request.url, error = %error, "Serving offline page");
            return page;
        }
        tracing::debug!(url = %request.url, error = %error, "Serving built-in offline page");
        offline::offline_page()
    }

    async fn fetch_and_store(&self, request: &FetchRequest) -> Result<CachedResponse, FetchError> {
        let response = self.fetcher.fetch(request).await?;
        if response.is_success() {
            self.caches
                .put(&self.config.cache_name(), &request.url, response.clone());
        }
        Ok(response)
    }

    fn cached(&self, url: &Url) -> Option<CachedResponse> {
        self.caches.get(&self.config.cache_name(), url)
    }

    fn resolve(&self, path: &str) -> Option<Url> {
        self.config.origin.join(path).ok()
    }

    /// Handle a page message. Returns the reply to post back, if any.
    pub fn handle_message(&self, message: &WorkerMessage) -> Option<WorkerReply> {
        match message {
            WorkerMessage::SkipWaiting => {
                if self.lifecycle() == Lifecycle::Installed {
                    tracing::info!("Skip waiting requested");
                    self.activate();
                }
                None
            }
            WorkerMessage::GetVersion => Some(WorkerReply::Version {
                version: self.config.version.clone(),
            }),
            WorkerMessage::ClearCache => {
                let dropped = self.caches.clear();
                tracing::info!(dropped, "All caches cleared");
                Some(WorkerReply::Cleared { success: true })
            }
        }
    }

    pub fn handle_push(&self, payload: Option<&[u8]>) -> Notification {
        let notification = Notification::from_push(payload, &self.config.notification_icon);
        tracing::debug!(title = %notification.title, "Push received");
        notification
    }

    pub fn handle_notification_click(&self, action: Option<&str>) -> ClickOutcome {
        route_click(action, &self.config.notification_destination)
    }

    /// Background sync. Returns whether the tag was handled.
    pub fn handle_sync(&self, tag: &str) -> bool {
        if tag == SYNC_TAG {
            tracing::info!(tag, "Background sync");
            true
        } else {
            tracing::debug!(tag, "Ignoring unknown sync tag");
            false
        }
    }
}
