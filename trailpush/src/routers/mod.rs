//! Routers deliver notifications to push services

use thiserror::Error;

use crate::error::PushResult;
use crate::message::PushMessage;
use crate::subscriber::Subscriber;
use crate::vapid::KeyPair;

pub mod webpush;

#[cfg_attr(test, mockall::automock)]
pub trait Router {
    /// Deliver `message` to one subscriber.
    ///
    /// `Err` means the sender itself is broken (keys, signing) and no further
    /// subscriber can succeed. Anything the push service or the network does
    /// wrong is reported through [`DeliveryResult`].
    fn send(
        &self,
        subscriber: &Subscriber,
        message: &PushMessage,
        key_pair: &KeyPair,
    ) -> PushResult<DeliveryResult>;
}

/// The outcome of a single delivery attempt
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DeliveryResult {
    /// Accepted by the push service, with its (2xx) status
    Delivered(u16),
    /// The subscription no longer exists (404 or 410)
    SubscriberGone(u16),
    DeliveryFailed(DeliveryFailure),
}

impl DeliveryResult {
    /// The failure reason, if the message was not delivered.
    pub fn failure(&self) -> Option<DeliveryFailure> {
        match self {
            Self::Delivered(_) => None,
            Self::SubscriberGone(status) => Some(DeliveryFailure::SubscriberGone(*status)),
            Self::DeliveryFailed(reason) => Some(reason.clone()),
        }
    }
}

/// Why a notification did not reach a subscriber
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum DeliveryFailure {
    #[error("Push service did not respond in time")]
    Timeout,

    #[error("Error while connecting to the push service: {0}")]
    Transport(String),

    #[error("Push service responded with {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Subscription is gone ({0})")]
    SubscriberGone(u16),

    #[error("Payload is {size} bytes, the limit is {max}")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("{0}")]
    InvalidEndpoint(String),
}

impl DeliveryFailure {
    pub fn as_metric(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Transport(_) => "transport",
            Self::Status { .. } => "status",
            Self::SubscriberGone(_) => "gone",
            Self::PayloadTooLarge { .. } => "payload_too_large",
            Self::InvalidEndpoint(_) => "invalid_endpoint",
        }
    }

    pub fn is_gone(&self) -> bool {
        matches!(self, Self::SubscriberGone(_))
    }
}
