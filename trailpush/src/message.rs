//! Notification payloads.
//!
//! A [`PushMessage`] serializes to the JSON object the site's service worker
//! reads (`title`, `body`, `icon`, `badge`, `tag`, `url`,
//! `requireInteraction`, `data`). Absent optional fields are omitted.

use std::collections::BTreeMap;

use serde::Serialize;
use trailpush_common::util::sec_since_epoch;

use crate::error::PushResult;
use crate::settings::Settings;
use crate::trail::{Trail, TrailStatus};

/// Default `TTL`, one day.
pub const DEFAULT_TTL: u32 = 86400;

pub const TRAIL_STATUS_TITLE: &str = "Trail Status Update";
pub const TEST_TITLE: &str = "Test Notification";
pub const TEST_BODY: &str =
    "Your push notifications are working! Trail status updates will appear here.";

/// Structured data handed to the service worker along with the notification.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct MessageData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trail_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trail_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TrailStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_status: Option<TrailStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test: Option<bool>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, String>,
}

impl MessageData {
    pub fn is_empty(&self) -> bool {
        *self == MessageData::default()
    }
}

/// An immutable notification. Build one with [`PushMessage::builder`].
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct PushMessage {
    title: String,
    body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    icon: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    badge: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<String>,
    #[serde(rename = "requireInteraction")]
    urgent: bool,
    #[serde(skip_serializing_if = "MessageData::is_empty")]
    data: MessageData,
    #[serde(skip)]
    ttl: u32,
}

impl PushMessage {
    pub fn builder(title: impl Into<String>, body: impl Into<String>) -> PushMessageBuilder {
        PushMessageBuilder {
            message: PushMessage {
                title: title.into(),
                body: body.into(),
                icon: None,
                badge: None,
                tag: None,
                url: None,
                urgent: false,
                data: MessageData::default(),
                ttl: DEFAULT_TTL,
            },
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub fn data(&self) -> &MessageData {
        &self.data
    }

    /// Whether the push service should deliver this with high urgency.
    pub fn urgent(&self) -> bool {
        self.urgent
    }

    /// Seconds the push service may hold the message (`TTL` header).
    pub fn ttl(&self) -> u32 {
        self.ttl
    }

    /// The JSON request body.
    pub fn to_json(&self) -> PushResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

pub struct PushMessageBuilder {
    message: PushMessage,
}

impl PushMessageBuilder {
    pub fn icon(mut self, icon: Option<String>) -> Self {
        self.message.icon = icon;
        self
    }

    pub fn badge(mut self, badge: Option<String>) -> Self {
        self.message.badge = badge;
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.message.tag = Some(tag.into());
        self
    }

    pub fn url(mut self, url: Option<String>) -> Self {
        self.message.url = url;
        self
    }

    pub fn urgent(mut self, urgent: bool) -> Self {
        self.message.urgent = urgent;
        self
    }

    pub fn data(mut self, data: MessageData) -> Self {
        self.message.data = data;
        self
    }

    pub fn ttl(mut self, ttl: u32) -> Self {
        self.message.ttl = ttl;
        self
    }

    pub fn build(self) -> PushMessage {
        self.message
    }
}

/// Message presentation defaults taken from [`Settings`].
#[derive(Clone, Debug, Default)]
pub struct MessageDefaults {
    pub icon: Option<String>,
    pub badge: Option<String>,
    pub click_url: Option<String>,
    pub ttl: u32,
}

impl From<&Settings> for MessageDefaults {
    fn from(settings: &Settings) -> Self {
        Self {
            icon: settings.icon.clone(),
            badge: settings.badge.clone(),
            click_url: settings.click_url.clone(),
            ttl: settings.ttl,
        }
    }
}

/// The notification sent when a trail changes status.
///
/// Closed trails are sent as urgent. Messages for one trail share a tag so a
/// newer update replaces an older one on the device.
pub fn trail_status_message(
    trail: &Trail,
    old_status: Option<TrailStatus>,
    defaults: &MessageDefaults,
) -> PushMessage {
    let mut body = format!(
        "{} {} is now {}",
        trail.status.emoji(),
        trail.name,
        trail.status.label()
    );
    if let Some(notes) = trail.notes.as_deref().filter(|n| !n.trim().is_empty()) {
        body.push_str(" - ");
        body.push_str(notes);
    }

    let data = MessageData {
        trail_id: Some(trail.id),
        trail_name: Some(trail.name.clone()),
        status: Some(trail.status),
        old_status,
        updated_by: trail.updated_by.clone(),
        timestamp: Some(sec_since_epoch()),
        url: defaults.click_url.clone(),
        ..Default::default()
    };

    PushMessage::builder(TRAIL_STATUS_TITLE, body)
        .icon(defaults.icon.clone())
        .badge(defaults.badge.clone())
        .tag(format!("trail-status-{}", trail.id))
        .url(defaults.click_url.clone())
        .urgent(trail.status == TrailStatus::Closed)
        .data(data)
        .ttl(defaults.ttl)
        .build()
}

pub fn test_message(defaults: &MessageDefaults) -> PushMessage {
    let data = MessageData {
        test: Some(true),
        timestamp: Some(sec_since_epoch()),
        url: defaults.click_url.clone(),
        ..Default::default()
    };
    PushMessage::builder(TEST_TITLE, TEST_BODY)
        .icon(defaults.icon.clone())
        .badge(defaults.badge.clone())
        .url(defaults.click_url.clone())
        .data(data)
        .ttl(defaults.ttl)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn trail(status: TrailStatus, notes: Option<&str>) -> Trail {
        Trail {
            id: 5,
            name: "Harbison".to_owned(),
            status,
            notes: notes.map(str::to_owned),
            updated_by: Some("ranger".to_owned()),
        }
    }

    fn defaults() -> MessageDefaults {
        MessageDefaults {
            icon: Some("/images/logo.jpg".to_owned()),
            badge: None,
            click_url: Some("https://trails.example.org/".to_owned()),
            ttl: 3600,
        }
    }

    #[test]
    fn trail_status_body() {
        let msg = trail_status_message(&trail(TrailStatus::Open, None), None, &defaults());
        assert_eq!(msg.title(), "Trail Status Update");
        assert_eq!(msg.body(), "🟢 Harbison is now Open");
        assert!(!msg.urgent());
        assert_eq!(msg.tag(), Some("trail-status-5"));
        assert_eq!(msg.ttl(), 3600);

        let msg = trail_status_message(
            &trail(TrailStatus::Closed, Some("Storm damage")),
            Some(TrailStatus::Open),
            &defaults(),
        );
        assert_eq!(msg.body(), "🔴 Harbison is now Closed - Storm damage");
        assert!(msg.urgent());
        assert_eq!(msg.data().old_status, Some(TrailStatus::Open));

        let msg = trail_status_message(&trail(TrailStatus::Caution, Some("  ")), None, &defaults());
        assert_eq!(msg.body(), "🟡 Harbison is now Caution");
    }

    #[test]
    fn json_shape() {
        let msg = trail_status_message(
            &trail(TrailStatus::Closed, None),
            Some(TrailStatus::Caution),
            &defaults(),
        );
        let json: Value = serde_json::from_slice(&msg.to_json().unwrap()).unwrap();
        assert_eq!(json["title"], "Trail Status Update");
        assert_eq!(json["icon"], "/images/logo.jpg");
        assert_eq!(json["requireInteraction"], true);
        assert_eq!(json["url"], "https://trails.example.org/");
        assert_eq!(json["data"]["trail_id"], 5);
        assert_eq!(json["data"]["status"], "closed");
        assert_eq!(json["data"]["old_status"], "caution");
        assert_eq!(json["data"]["updated_by"], "ranger");
        assert!(json["data"]["timestamp"].as_u64().unwrap() > 0);
        // Omitted rather than null.
        let obj = json.as_object().unwrap();
        assert!(!obj.contains_key("badge"));
        assert!(!obj.contains_key("ttl"));
        assert!(!obj.contains_key("urgent"));
        assert!(!json["data"].as_object().unwrap().contains_key("test"));
    }

    #[test]
    fn extra_data_is_flattened() {
        let mut extra = BTreeMap::new();
        extra.insert("source".to_owned(), "admin".to_owned());
        let msg = PushMessage::builder("t", "b")
            .data(MessageData {
                extra,
                ..Default::default()
            })
            .build();
        let json: Value = serde_json::from_slice(&msg.to_json().unwrap()).unwrap();
        assert_eq!(json["data"], serde_json::json!({"source": "admin"}));

        let bare = PushMessage::builder("t", "b").build();
        let json: Value = serde_json::from_slice(&bare.to_json().unwrap()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"title": "t", "body": "b", "requireInteraction": false})
        );
        assert_eq!(bare.ttl(), 86400);
    }

    #[test]
    fn test_message_shape() {
        let msg = test_message(&defaults());
        assert_eq!(msg.title(), "Test Notification");
        assert_eq!(msg.data().test, Some(true));
        assert!(!msg.urgent());
        assert!(msg.tag().is_none());
    }
}
