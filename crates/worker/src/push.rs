//! Push notification parsing and click routing.
//!
//! The coordinator does not interpret push payloads; it only shapes
//! them into a displayable notification and routes the eventual click.
//! Every payload field is optional and falls back to a fixed default,
//! so a malformed or empty payload still produces something showable.

use serde::{Deserialize, Serialize};

use crate::bridge::ClientWindow;

const DEFAULT_TITLE: &str = "Wedding Planner";
const DEFAULT_BODY: &str = "You have new updates in your planner";
const DEFAULT_ICON: &str = "/icons/icon-192.png";
const DEFAULT_BADGE: &str = "/icons/icon-72.png";
const DEFAULT_TAG: &str = "wedding-planner";
const DEFAULT_TARGET_URL: &str = "/dashboard";

/// The push payload contract: a JSON object where everything is
/// optional and `body`/`message` are interchangeable.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PushPayload {
    pub title: Option<String>,
    #[serde(alias = "message")]
    pub body: Option<String>,
    pub icon: Option<String>,
    pub badge: Option<String>,
    pub tag: Option<String>,
    pub url: Option<String>,
    #[serde(default, rename = "requireInteraction")]
    pub require_interaction: bool,
    #[serde(default)]
    pub actions: Vec<NotificationAction>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationAction {
    pub action: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

impl PushPayload {
    /// Parse a raw push payload. Anything unparseable is treated as an
    /// empty payload and picks up every default.
    pub fn parse(raw: &[u8]) -> Self {
        serde_json::from_slice(raw).unwrap_or_default()
    }
}

/// A fully-defaulted notification, ready for the host to display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
    pub tag: String,
    pub url: String,
    pub require_interaction: bool,
    pub actions: Vec<NotificationAction>,
}

impl From<PushPayload> for Notification {
    fn from(payload: PushPayload) -> Self {
        Self {
            title: payload.title.unwrap_or_else(|| DEFAULT_TITLE.to_string()),
            body: payload.body.unwrap_or_else(|| DEFAULT_BODY.to_string()),
            icon: payload.icon.unwrap_or_else(|| DEFAULT_ICON.to_string()),
            badge: payload.badge.unwrap_or_else(|| DEFAULT_BADGE.to_string()),
            tag: payload.tag.unwrap_or_else(|| DEFAULT_TAG.to_string()),
            url: payload.url.unwrap_or_else(|| DEFAULT_TARGET_URL.to_string()),
            require_interaction: payload.require_interaction,
            actions: payload.actions,
        }
    }
}

/// What a notification click resolves to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum ClickAction {
    /// Dismiss without navigating.
    Dismiss,
    /// Bring an already-open window to the front.
    Focus { window_id: String },
    /// Open a new window at the target URL.
    Open { url: String },
}

/// Route a notification click.
///
/// The `close` action dismisses. Otherwise, if a window is already open
/// at the target URL it is focused; failing that a new one is opened.
pub fn route_click(action: Option<&str>, target_url: &str, windows: &[ClientWindow]) -> ClickAction {
    if action == Some("close") {
        return ClickAction::Dismiss;
    }

    if let Some(window) = windows.iter().find(|w| window_matches(w, target_url)) {
        return ClickAction::Focus { window_id: window.id.clone() };
    }

    ClickAction::Open { url: target_url.to_string() }
}

fn window_matches(window: &ClientWindow, target_url: &str) -> bool {
    if window.url == target_url {
        return true;
    }
    // Windows register absolute URLs while notification targets are
    // usually origin-relative paths.
    url::Url::parse(&window.url).is_ok_and(|parsed| parsed.path() == target_url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_payload_gets_all_defaults() {
        let notification: Notification = PushPayload::parse(b"").into();
        assert_eq!(notification.title, "Wedding Planner");
        assert_eq!(notification.url, "/dashboard");
        assert_eq!(notification.icon, "/icons/icon-192.png");
        assert!(!notification.require_interaction);
        assert!(notification.actions.is_empty());
    }

    #[test]
    fn test_garbage_payload_gets_all_defaults() {
        let notification: Notification = PushPayload::parse(b"not json {{").into();
        assert_eq!(notification.title, "Wedding Planner");
    }

    #[test]
    fn test_payload_fields_override_defaults() {
        let raw = br#"{
            "title": "RSVP received",
            "message": "Ava accepted",
            "tag": "rsvp",
            "url": "/guests",
            "requireInteraction": true,
            "actions": [{"action": "view", "title": "View guest"}, {"action": "close", "title": "Dismiss"}]
        }"#;
        let notification: Notification = PushPayload::parse(raw).into();
        assert_eq!(notification.title, "RSVP received");
        assert_eq!(notification.body, "Ava accepted");
        assert_eq!(notification.tag, "rsvp");
        assert_eq!(notification.url, "/guests");
        assert!(notification.require_interaction);
        assert_eq!(notification.actions.len(), 2);
        // Unset fields still fall back.
        assert_eq!(notification.badge, "/icons/icon-72.png");
    }

    #[test]
    fn test_body_field_also_accepted() {
        let notification: Notification = PushPayload::parse(br#"{"body": "Cake tasting at 3pm"}"#).into();
        assert_eq!(notification.body, "Cake tasting at 3pm");
    }

    #[test]
    fn test_click_close_dismisses() {
        let windows = vec![ClientWindow { id: "w1".into(), url: "https://planner.test/dashboard".into() }];
        assert_eq!(route_click(Some("close"), "/dashboard", &windows), ClickAction::Dismiss);
    }

    #[test]
    fn test_click_focuses_open_window() {
        let windows = vec![
            ClientWindow { id: "w1".into(), url: "https://planner.test/budget".into() },
            ClientWindow { id: "w2".into(), url: "https://planner.test/guests".into() },
        ];
        let action = route_click(None, "/guests", &windows);
        assert_eq!(action, ClickAction::Focus { window_id: "w2".into() });
    }

    #[test]
    fn test_click_opens_when_no_window_matches() {
        let windows = vec![ClientWindow { id: "w1".into(), url: "https://planner.test/budget".into() }];
        let action = route_click(Some("view"), "/guests", &windows);
        assert_eq!(action, ClickAction::Open { url: "/guests".into() });
    }

    #[test]
    fn test_click_with_no_windows_opens() {
        assert_eq!(route_click(None, "/dashboard", &[]), ClickAction::Open { url: "/dashboard".into() });
    }
}
