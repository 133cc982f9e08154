//! Push notifications and page ⇄ worker messages.

use serde::{Deserialize, Serialize};

pub const DEFAULT_TITLE: &str = "DreamBig";
pub const DEFAULT_BODY: &str = "You have a new notification";
pub const SYNC_TAG: &str = "background-sync";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationAction {
    pub action: String,
    pub title: String,
}

/// Notification to display for a push event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
    pub vibrate: Vec<u32>,
    pub actions: Vec<NotificationAction>,
}

#[derive(Debug, Default, Deserialize)]
struct PushPayload {
    title: Option<String>,
    body: Option<String>,
}

impl Notification {
    /// Build the notification for a push payload: JSON `{title, body}`,
    /// plain text used as the body, or nothing at all.
    #[must_use]
    pub fn from_push(payload: Option<&[u8]>, icon: &str) -> Self {
        let parsed = match payload {
            None => PushPayload::default(),
            Some(bytes) => serde_json::from_slice::<PushPayload>(bytes).unwrap_or_else(|_| {
                let text = String::from_utf8_lossy(bytes).trim().to_owned();
                PushPayload {
                    title: None,
                    body: (!text.is_empty()).then_some(text),
                }
            }),
        };

        Self {
            title: parsed.title.unwrap_or_else(|| DEFAULT_TITLE.to_owned()),
            body: parsed.body.unwrap_or_else(|| DEFAULT_BODY.to_owned()),
            icon: icon.to_owned(),
            badge: icon.to_owned(),
            vibrate: vec![100, 50, 100],
            actions: vec![
                NotificationAction {
                    action: "view".into(),
                    title: "View".into(),
                },
                NotificationAction {
                    action: "close".into(),
                    title: "Close".into(),
                },
            ],
        }
    }
}

/// What to do after the user clicked a notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickOutcome {
    Dismiss,
    Navigate(String),
}

/// `close` dismisses; every other action, and a click on the body, opens
/// `destination`.
#[must_use]
pub fn route_click(action: Option<&str>, destination: &str) -> ClickOutcome {
    match action {
        Some("close") => ClickOutcome::Dismiss,
        _ => ClickOutcome::Navigate(destination.to_owned()),
    }
}

/// Control messages posted by a page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerMessage {
    /// Activate a freshly installed worker without waiting for tabs to close.
    SkipWaiting,
    GetVersion,
    ClearCache,
}

/// Reply posted back over the message channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WorkerReply {
    Version { version: String },
    Cleared { success: bool },
}
