use http::Method;
use url::{Origin, Url};

use super::fetch::FetchRequest;

/// Caching policy applied to an intercepted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// `/api/`: network, then cache, then a 503 JSON body.
    ApiNetworkFirst,
    /// `/static/`: cache, then network, then a 503 text body.
    StaticCacheFirst,
    /// Everything else: network, cache, offline page, built-in offline HTML.
    PageNetworkFirst,
}

/// Pick the policy for `request`, or `None` when the worker must not
/// intercept it (non-GET, non-HTTP, or cross-origin).
#[must_use]
pub fn classify(request: &FetchRequest, origin: &Origin) -> Option<Strategy> {
    if request.method != Method::GET {
        return None;
    }
    if !matches!(request.url.scheme(), "http" | "https") {
        return None;
    }
    if request.url.origin() != *origin {
        return None;
    }
    Some(strategy_for_path(&request.url))
}

fn strategy_for_path(url: &Url) -> Strategy {
    let path = url.path();
    if path.starts_with("/api/") {
        Strategy::ApiNetworkFirst
    } else if path.starts_with("/static/") {
        Strategy::StaticCacheFirst
    } else {
        Strategy::PageNetworkFirst
    }
}
