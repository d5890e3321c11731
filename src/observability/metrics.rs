//! Relay metrics counters.
//!
//! # Metrics
//! - `relay_sessions_accepted_total`: registrations stored
//! - `relay_sessions_closed_total`: records evicted
//! - `relay_streams_spawned_total`: streams opened for proxied requests
//! - `relay_streams_closed_total`: proxied streams fully drained
//! - `relay_registrations_total`: successful control negotiations
//! - `relay_requests_total{kind}`: dispatched requests by routing kind

use std::net::SocketAddr;

use metrics::counter;
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter on its own listener.
pub fn init_metrics(addr: SocketAddr) {
    if let Err(err) = PrometheusBuilder::new().with_http_listener(addr).install() {
        tracing::error!(error = %err, "failed to install metrics exporter");
        return;
    }
    tracing::info!(address = %addr, "metrics exporter listening");
}

pub fn session_accepted() {
    counter!("relay_sessions_accepted_total").increment(1);
}

pub fn session_closed() {
    counter!("relay_sessions_closed_total").increment(1);
}

pub fn stream_spawned() {
    counter!("relay_streams_spawned_total").increment(1);
}

pub fn stream_closed() {
    counter!("relay_streams_closed_total").increment(1);
}

pub fn request_registered() {
    counter!("relay_registrations_total").increment(1);
}

pub fn request_dispatched(kind: &'static str) {
    counter!("relay_requests_total", "kind" => kind).increment(1);
}
