//! Per-request reverse proxying over a fresh tunnel stream.
//!
//! Each proxied request consumes exactly one stream for its lifetime:
//! open a stream on the session, speak HTTP/1.1 over it, relay the
//! response. The tunnel carries plaintext HTTP regardless of the edge
//! protocol, so the outgoing scheme is always `http`.

use std::io;
use std::net::IpAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::http::uri::PathAndQuery;
use axum::http::{header, HeaderValue, Request, StatusCode, Uri, Version};
use axum::response::{IntoResponse, Response};
use hyper::client::conn::http1;
use hyper_util::rt::TokioIo;
use thiserror::Error;

use crate::observability::metrics;
use crate::tunnel::Session;

#[derive(Debug, Error)]
pub enum ProxyError {
    /// The session refused a new stream. The session itself is not
    /// evicted for this; only the liveness supervisor evicts.
    #[error("failed to open stream: {0}")]
    Dial(#[from] io::Error),
    #[error("tunnel handshake failed: {0}")]
    Handshake(#[source] hyper::Error),
    #[error("upstream request failed: {0}")]
    Upstream(#[source] hyper::Error),
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        tracing::warn!(error = %self, "proxy failed");
        (StatusCode::BAD_GATEWAY, "upstream request failed").into_response()
    }
}

/// Relay one request over a newly opened stream on `session`.
pub async fn proxy_to_session(
    session: Arc<dyn Session>,
    mut req: Request<Body>,
    client_ip: IpAddr,
) -> Result<Response, ProxyError> {
    let stream = session.open_stream().await?;
    metrics::stream_spawned();

    let (mut sender, conn) = http1::handshake(TokioIo::new(stream))
        .await
        .map_err(ProxyError::Handshake)?;
    tokio::spawn(async move {
        if let Err(err) = conn.await {
            tracing::debug!(error = %err, "tunnel stream ended with error");
        }
        metrics::stream_closed();
    });

    rewrite(&mut req, client_ip);

    let resp = sender
        .send_request(req)
        .await
        .map_err(ProxyError::Upstream)?;
    let (parts, body) = resp.into_parts();
    Ok(Response::from_parts(parts, Body::new(body)))
}

/// Rewrite an inbound request for the HTTP/1.1 leg inside the tunnel:
/// origin-form URI, preserved Host, standard forwarding headers.
fn rewrite(req: &mut Request<Body>, client_ip: IpAddr) {
    let host = req
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
        .or_else(|| req.uri().authority().map(|a| a.to_string()))
        .unwrap_or_default();

    *req.version_mut() = Version::HTTP_11;
    let pq = req
        .uri()
        .path_and_query()
        .cloned()
        .unwrap_or_else(|| PathAndQuery::from_static("/"));
    *req.uri_mut() = Uri::from(pq);

    let headers = req.headers_mut();
    headers.remove(header::CONNECTION);
    headers.remove("proxy-connection");
    headers.remove("keep-alive");

    if !host.is_empty() {
        if let Ok(v) = HeaderValue::from_str(&host) {
            headers.entry(header::HOST).or_insert(v.clone());
            headers.insert("x-forwarded-host", v);
        }
    }

    let forwarded_for = match headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
    {
        Some(prev) => format!("{prev}, {client_ip}"),
        None => client_ip.to_string(),
    };
    if let Ok(v) = HeaderValue::from_str(&forwarded_for) {
        headers.insert("x-forwarded-for", v);
    }
    headers.insert("x-forwarded-proto", HeaderValue::from_static("http"));
}
