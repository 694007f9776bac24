//! Fan a notification out to the subscribers that asked for it.

use std::fmt;

use serde::Serialize;

use crate::error::{PushErrorKind, PushResult};
use crate::message::{test_message, trail_status_message, MessageDefaults, PushMessage};
use crate::routers::{DeliveryFailure, DeliveryResult, Router};
use crate::settings::Settings;
use crate::subscriber::Subscriber;
use crate::trail::{Trail, TrailStatus};
use crate::vapid::KeyPair;

/// A subscriber that did not receive the notification.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SubscriberFailure {
    pub endpoint: String,
    pub reason: DeliveryFailure,
}

/// The aggregate result of one fan-out.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct NotifyReport {
    pub sent: usize,
    pub failed: usize,
    /// Inactive subscribers and those not following the trail.
    pub skipped: usize,
    pub errors: Vec<SubscriberFailure>,
}

impl NotifyReport {
    /// Endpoints the push service reported as gone. The subscriber store
    /// should deactivate these.
    pub fn gone_endpoints(&self) -> Vec<String> {
        self.errors
            .iter()
            .filter(|failure| failure.reason.is_gone())
            .map(|failure| failure.endpoint.clone())
            .collect()
    }
}

impl fmt::Display for NotifyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "sent: {}, failed: {}, skipped: {}",
            self.sent, self.failed, self.skipped
        )?;
        for failure in &self.errors {
            write!(f, "\n  {}: {}", failure.endpoint, failure.reason)?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct NotificationStats {
    pub total_subscribers: usize,
    pub active_subscribers: usize,
    pub push_enabled: bool,
    pub vapid_configured: bool,
}

pub struct NotificationService {
    router: Box<dyn Router>,
    key_pair: Option<KeyPair>,
    defaults: MessageDefaults,
    push_enabled: bool,
}

impl NotificationService {
    /// `key_pair` is usually [`Settings::key_pair`]. A missing pair is only
    /// an error once something is sent.
    pub fn new(settings: &Settings, router: Box<dyn Router>, key_pair: Option<KeyPair>) -> Self {
        Self {
            router,
            key_pair,
            defaults: MessageDefaults::from(settings),
            push_enabled: settings.push_enabled,
        }
    }

    /// Send `message` to every active subscriber following `trail_id`.
    pub fn notify(
        &self,
        trail_id: u64,
        message: &PushMessage,
        subscribers: &[Subscriber],
    ) -> PushResult<NotifyReport> {
        if !self.push_enabled {
            info!("📣 Push notifications are disabled, nothing sent"; "trail_id" => trail_id);
            return Ok(NotifyReport::default());
        }
        let key_pair = self.require_key_pair()?;

        let report = self.fan_out(message, subscribers, key_pair, |s| s.wants(trail_id))?;
        info!("📣 Trail notification sent";
              "trail_id" => trail_id, "sent" => report.sent,
              "failed" => report.failed, "skipped" => report.skipped);
        Ok(report)
    }

    /// Build the status change message for `trail` and send it.
    pub fn notify_status_change(
        &self,
        trail: &Trail,
        old_status: Option<TrailStatus>,
        subscribers: &[Subscriber],
    ) -> PushResult<NotifyReport> {
        let message = trail_status_message(trail, old_status, &self.defaults);
        self.notify(trail.id, &message, subscribers)
    }

    /// Send a test notification to every active subscriber, whatever trails
    /// they follow.
    pub fn send_test(&self, subscribers: &[Subscriber]) -> PushResult<NotifyReport> {
        if !self.push_enabled {
            info!("📣 Push notifications are disabled, no test sent");
            return Ok(NotifyReport::default());
        }
        let key_pair = self.require_key_pair()?;

        let message = test_message(&self.defaults);
        let report = self.fan_out(&message, subscribers, key_pair, |s| s.active)?;
        info!("📣 Test notification sent"; "sent" => report.sent, "failed" => report.failed);
        Ok(report)
    }

    pub fn stats(&self, subscribers: &[Subscriber]) -> NotificationStats {
        NotificationStats {
            total_subscribers: subscribers.len(),
            active_subscribers: subscribers.iter().filter(|s| s.active).count(),
            push_enabled: self.push_enabled,
            vapid_configured: self.key_pair.is_some(),
        }
    }

    fn require_key_pair(&self) -> PushResult<&KeyPair> {
        self.key_pair.as_ref().ok_or_else(|| {
            PushErrorKind::Configuration(
                "VAPID keys are not configured, run `trailpush genkeys`".to_owned(),
            )
            .into()
        })
    }

    fn fan_out<F>(
        &self,
        message: &PushMessage,
        subscribers: &[Subscriber],
        key_pair: &KeyPair,
        wanted: F,
    ) -> PushResult<NotifyReport>
    where
        F: Fn(&Subscriber) -> bool,
    {
        let mut report = NotifyReport::default();
        for subscriber in subscribers {
            if !wanted(subscriber) {
                report.skipped += 1;
                continue;
            }
            match self.router.send(subscriber, message, key_pair)? {
                DeliveryResult::Delivered(_) => report.sent += 1,
                other => {
                    report.failed += 1;
                    if let Some(reason) = other.failure() {
                        report.errors.push(SubscriberFailure {
                            endpoint: subscriber.endpoint.clone(),
                            reason,
                        });
                    }
                }
            }
        }
        Ok(report)
    }
}
