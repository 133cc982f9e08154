//! Responses synthesized when neither the network nor the cache can answer.

use http::StatusCode;

use super::fetch::CachedResponse;

pub const OFFLINE_MESSAGE: &str =
    "You are currently offline. Please check your internet connection.";

/// Last-resort page when even the bundled offline page is not cached.
pub const OFFLINE_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>Offline - DreamBig</title>
<style>
body { font-family: system-ui, sans-serif; display: flex; align-items: center; justify-content: center; min-height: 100vh; margin: 0; background: #f8f9fa; color: #333; text-align: center; }
button { margin-top: 1rem; padding: .6rem 1.4rem; border: 0; border-radius: 4px; background: #0d6efd; color: #fff; cursor: pointer; }
</style>
</head>
<body>
<main>
<h1>You're offline</h1>
<p>Please check your internet connection and try again.</p>
<button onclick="location.reload()">Retry</button>
</main>
</body>
</html>
"#;

#[must_use]
pub fn api_unavailable() -> CachedResponse {
    let body = serde_json::json!({
        "error": "Offline",
        "message": OFFLINE_MESSAGE,
    });
    CachedResponse::new(StatusCode::SERVICE_UNAVAILABLE, body.to_string())
        .with_content_type("application/json")
}

#[must_use]
pub fn asset_unavailable() -> CachedResponse {
    CachedResponse::new(
        StatusCode::SERVICE_UNAVAILABLE,
        "Offline - Resource not available",
    )
    .with_content_type("text/plain")
}

#[must_use]
pub fn offline_page() -> CachedResponse {
    CachedResponse::new(StatusCode::OK, OFFLINE_HTML).with_content_type("text/html; charset=utf-8")
}
