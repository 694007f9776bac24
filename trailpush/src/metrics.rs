use std::net::UdpSocket;

use cadence::{
    BufferedUdpMetricSink, Counted, MetricError, NopMetricSink, QueuingMetricSink, StatsdClient,
    StatsdClientBuilder,
};

use crate::settings::Settings;
use crate::vapid::Provider;

/// Outcome counters, tagged with the push provider.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DeliveryMetric {
    Delivered,
    Gone,
    Failed,
}

impl DeliveryMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Delivered => "notification.delivered",
            Self::Gone => "notification.gone",
            Self::Failed => "notification.failed",
        }
    }
}

/// Create a cadence StatsdClientBuilder from the given options
pub fn builder(
    prefix: &str,
    host: &Option<String>,
    port: u16,
) -> Result<StatsdClientBuilder, MetricError> {
    let builder = if let Some(host) = host {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        socket.set_nonblocking(true)?;

        let addr = (host.as_str(), port);
        let udp_sink = BufferedUdpMetricSink::from(addr, socket)?;
        let sink = QueuingMetricSink::from(udp_sink);
        StatsdClient::builder(prefix, sink)
    } else {
        StatsdClient::builder(prefix, NopMetricSink)
    };
    Ok(builder.with_error_handler(|err| warn!("⚠️ Metric send error: {:?}", err)))
}

/// Create a StatsdClient from the settings
pub fn metrics_from_settings(settings: &Settings) -> Result<StatsdClient, MetricError> {
    Ok(builder(
        &settings.statsd_label,
        &settings.statsd_host,
        settings.statsd_port,
    )?
    .build())
}

/// A client that drops everything, for tests and for runs without statsd.
pub fn noop() -> StatsdClient {
    StatsdClient::builder("", NopMetricSink).build()
}

/// Count one delivery outcome. Send failures are logged and dropped.
pub fn incr_delivery(client: &StatsdClient, metric: DeliveryMetric, provider: Provider) {
    if let Err(e) = client
        .count_with_tags(metric.as_str(), 1)
        .with_tag("provider", provider.as_str())
        .try_send()
    {
        warn!("⚠️ Metric {} error: {:?}", metric.as_str(), e);
    }
}
