use std::time::Duration;

use cadence::StatsdClient;
use reqwest::blocking::{Client, Response};
use reqwest::StatusCode;

use crate::error::PushResult;
use crate::message::PushMessage;
use crate::metrics::{incr_delivery, DeliveryMetric};
use crate::routers::{DeliveryFailure, DeliveryResult, Router};
use crate::settings::Settings;
use crate::subscriber::Subscriber;
use crate::vapid::{Audience, AudienceTable, KeyPair, Provider, VapidHeader, VapidSigner};

/// Error bodies from push services are kept only up to this many characters.
const MAX_ERROR_BODY: usize = 512;

/// The router for Web Push endpoints.
///
/// Each notification is a single signed `POST` to the subscriber's endpoint.
/// There is no retry; the caller decides what to do with failures.
pub struct WebPushRouter {
    http: Client,
    metrics: StatsdClient,
    audiences: AudienceTable,
    signer: VapidSigner,
    timeout: Duration,
    max_data: usize,
    user_agent: String,
}

impl WebPushRouter {
    pub fn new(settings: &Settings, http: Client, metrics: StatsdClient) -> Self {
        Self {
            http,
            metrics,
            audiences: settings.audience_table(),
            signer: VapidSigner::new(&settings.vapid_subject),
            timeout: settings.request_timeout(),
            max_data: settings.max_data_bytes,
            user_agent: settings.user_agent.clone(),
        }
    }

    /// Sign a fresh token for `audience` and build the `Authorization` header.
    pub fn authorization(&self, audience: &Audience, key_pair: &KeyPair) -> PushResult<VapidHeader> {
        let token = self.signer.sign(&audience.uri, key_pair)?;
        Ok(VapidHeader::new(&token, &key_pair.public_key_b64()))
    }

    fn post(
        &self,
        endpoint: &str,
        authorization: &VapidHeader,
        message: &PushMessage,
        payload: Vec<u8>,
    ) -> DeliveryResult {
        let mut request = self
            .http
            .post(endpoint)
            .header("Authorization", authorization.to_string())
            .header("Content-Type", "application/json")
            .header("TTL", message.ttl().to_string())
            .header("User-Agent", self.user_agent.as_str())
            .timeout(self.timeout)
            .body(payload);
        if message.urgent() {
            request = request.header("Urgency", "high");
        }

        match request.send() {
            Ok(response) => classify(response),
            Err(e) if e.is_timeout() => DeliveryResult::DeliveryFailed(DeliveryFailure::Timeout),
            Err(e) => {
                DeliveryResult::DeliveryFailed(DeliveryFailure::Transport(e.without_url().to_string()))
            }
        }
    }

    fn record(&self, result: &DeliveryResult, audience: Option<&Audience>) {
        let provider = audience.map_or(Provider::Other, |a| a.provider);
        let metric = match result {
            DeliveryResult::Delivered(_) => DeliveryMetric::Delivered,
            DeliveryResult::SubscriberGone(_) => DeliveryMetric::Gone,
            DeliveryResult::DeliveryFailed(_) => DeliveryMetric::Failed,
        };
        incr_delivery(&self.metrics, metric, provider);
    }
}

impl Router for WebPushRouter {
    fn send(
        &self,
        subscriber: &Subscriber,
        message: &PushMessage,
        key_pair: &KeyPair,
    ) -> PushResult<DeliveryResult> {
        let audience = match self.audiences.resolve(&subscriber.endpoint) {
            Ok(audience) => audience,
            Err(e) => {
                warn!("✉ Skipping subscriber with unusable endpoint"; "error" => e.kind.to_string());
                let result =
                    DeliveryResult::DeliveryFailed(DeliveryFailure::InvalidEndpoint(e.kind.to_string()));
                self.record(&result, None);
                return Ok(result);
            }
        };

        let payload = message.to_json()?;
        if payload.len() > self.max_data {
            debug!("✉ Payload too large"; "size" => payload.len(), "max" => self.max_data);
            let result = DeliveryResult::DeliveryFailed(DeliveryFailure::PayloadTooLarge {
                size: payload.len(),
                max: self.max_data,
            });
            self.record(&result, Some(&audience));
            return Ok(result);
        }

        // Signing problems are the sender's, not the subscriber's: propagate.
        let authorization = self.authorization(&audience, key_pair)?;
        trace!("✉ Sending notification"; "provider" => audience.provider.as_str(), "aud" => &audience.uri);
        let result = self.post(&subscriber.endpoint, &authorization, message, payload);

        match &result {
            DeliveryResult::Delivered(status) => {
                debug!("✉ Delivered"; "provider" => audience.provider.as_str(), "status" => status)
            }
            DeliveryResult::SubscriberGone(status) => {
                info!("✉ Subscription gone"; "provider" => audience.provider.as_str(), "status" => status)
            }
            DeliveryResult::DeliveryFailed(reason) => {
                warn!("✉ Delivery failed"; "provider" => audience.provider.as_str(),
                      "reason" => reason.as_metric(), "error" => reason.to_string())
            }
        }
        self.record(&result, Some(&audience));
        Ok(result)
    }
}

/// Map a push service response onto a delivery outcome.
fn classify(response: Response) -> DeliveryResult {
    let status = response.status();
    if status.is_success() {
        return DeliveryResult::Delivered(status.as_u16());
    }
    if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
        return DeliveryResult::SubscriberGone(status.as_u16());
    }
    let body: String = response
        .text()
        .unwrap_or_default()
        .chars()
        .take(MAX_ERROR_BODY)
        .collect();
    DeliveryResult::DeliveryFailed(DeliveryFailure::Status {
        status: status.as_u16(),
        body,
    })
}
