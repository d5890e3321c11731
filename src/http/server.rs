//! HTTP server setup and request dispatch.
//!
//! # Responsibilities
//! - Create the Axum router and wire up middleware
//! - Canonicalize the target hostname of every inbound request
//! - Route to the matching tunnel (subdomain-style or path-style)
//! - Serve the records and alias introspection endpoints
//! - Fall back to the configured index upstream, or host-not-found

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::uri::PathAndQuery;
use axum::http::{header, HeaderValue, Method, Request, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::config::RelayConfig;
use crate::http::proxy::proxy_to_session;
use crate::observability::metrics;
use crate::registry::{canonical, Record, Store, Tags};

/// Application state injected into the dispatch handler.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub root: String,
    pub records_path: Option<String>,
    pub alias_path: Option<String>,
    pub index: Option<Uri>,
    pub client: Client<HttpConnector, Body>,
}

/// Public-facing HTTP server of the relay.
pub struct RelayServer {
    router: Router,
}

impl RelayServer {
    pub fn new(config: &RelayConfig, store: Arc<Store>) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        // Validated at config load; an unparsable URL just disables the fallback.
        let index = config
            .http
            .index
            .as_deref()
            .and_then(|u| u.parse::<Uri>().ok());

        let state = AppState {
            store,
            root: canonical(&config.relay.root),
            records_path: config.http.records_path.clone(),
            alias_path: config.http.alias_path.clone(),
            index,
            client,
        };

        let router = Router::new()
            .fallback(dispatch)
            .with_state(state)
            .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()));

        Self { router }
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(self, listener: TcpListener) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "relay HTTP server starting");

        let app = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("relay HTTP server stopped");
        Ok(())
    }
}

/// Dispatch handler: every inbound request lands here.
async fn dispatch(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    req: Request<Body>,
) -> Response {
    let host = match host_of(&req) {
        Some(h) => canonical(&h),
        None => return host_not_found(""),
    };

    if host == state.root {
        return dispatch_root(state, addr, req).await;
    }

    match state.store.get_session(&host) {
        Some(session) => {
            state.store.visited(&host);
            metrics::request_dispatched("host");
            match proxy_to_session(session, req, addr.ip()).await {
                Ok(resp) => resp,
                Err(err) => err.into_response(),
            }
        }
        None => host_not_found(&host),
    }
}

/// Requests addressed to the relay's own root domain: introspection
/// endpoints, then path-style routing, then the index fallback.
async fn dispatch_root(state: AppState, addr: SocketAddr, req: Request<Body>) -> Response {
    let path = req.uri().path().to_string();

    if state.records_path.as_deref() == Some(path.as_str()) {
        return records(&state, &req);
    }
    if state.alias_path.as_deref() == Some(path.as_str()) {
        return aliases(state, req).await;
    }

    let component = leading_component(&path);
    if !component.is_empty() {
        let key = format!("{component}.{}", state.root);
        if let Some(session) = state.store.get_session(&key) {
            state.store.visited(&key);
            metrics::request_dispatched("path");
            let mut req = req;
            strip_path_prefix(&mut req, &format!("/{component}"));
            return match proxy_to_session(session, req, addr.ip()).await {
                Ok(resp) => resp,
                Err(err) => err.into_response(),
            };
        }
    }

    index_fallback(state, addr, req).await
}

/// JSON snapshot of all records, filterable by tag subset.
fn records(state: &AppState, req: &Request<Body>) -> Response {
    let wanted = Tags::from_query(req.uri().query().unwrap_or(""));
    let filtered: Vec<Record> = state
        .store
        .records()
        .into_iter()
        .filter(|rec| rec.matches(&wanted))
        .collect();
    match serde_json::to_string_pretty(&filtered) {
        Ok(body) => (
            [(header::CONTENT_TYPE, "application/json; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(err) => {
            tracing::warn!(error = %err, "json marshal failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Alias CRUD: GET lists, POST/PUT takes an `<alias> <target>` body,
/// DELETE takes an `<alias>` body.
async fn aliases(state: AppState, req: Request<Body>) -> Response {
    const BODY_LIMIT: usize = 64 * 1024;
    let method = req.method().clone();
    match method {
        Method::GET => match serde_json::to_string_pretty(&state.store.aliases()) {
            Ok(body) => (
                [(header::CONTENT_TYPE, "application/json; charset=utf-8")],
                body,
            )
                .into_response(),
            Err(err) => {
                tracing::warn!(error = %err, "json marshal failed");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        },
        Method::POST | Method::PUT => {
            let Ok(bytes) = axum::body::to_bytes(req.into_body(), BODY_LIMIT).await else {
                return StatusCode::BAD_REQUEST.into_response();
            };
            let line = String::from_utf8_lossy(&bytes);
            let mut parts = line.trim().split_whitespace();
            match (parts.next(), parts.next()) {
                (Some(alias), Some(target)) => {
                    state.store.alias(alias, target);
                    StatusCode::OK.into_response()
                }
                _ => StatusCode::BAD_REQUEST.into_response(),
            }
        }
        Method::DELETE => {
            let Ok(bytes) = axum::body::to_bytes(req.into_body(), BODY_LIMIT).await else {
                return StatusCode::BAD_REQUEST.into_response();
            };
            let alias = String::from_utf8_lossy(&bytes);
            state.store.unalias(alias.trim());
            StatusCode::OK.into_response()
        }
        _ => StatusCode::METHOD_NOT_ALLOWED.into_response(),
    }
}

/// Root-domain requests with no match: reverse-proxy to the configured
/// index upstream, or a plain host-not-found.
async fn index_fallback(state: AppState, addr: SocketAddr, mut req: Request<Body>) -> Response {
    let Some(index) = state.index else {
        return host_not_found(&state.root);
    };

    let mut parts = index.into_parts();
    parts.path_and_query = req
        .uri()
        .path_and_query()
        .cloned()
        .or_else(|| Some(PathAndQuery::from_static("/")));
    let uri = match Uri::from_parts(parts) {
        Ok(uri) => uri,
        Err(err) => {
            tracing::warn!(error = %err, "bad index upstream uri");
            return host_not_found(&state.root);
        }
    };
    let host = host_of(&req).unwrap_or_default();
    *req.uri_mut() = uri;
    let headers = req.headers_mut();
    headers.remove(header::HOST);
    if !host.is_empty() {
        if let Ok(v) = HeaderValue::from_str(&host) {
            headers.insert("x-forwarded-host", v);
        }
    }
    let forwarded_for = match headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
    {
        Some(prev) => format!("{prev}, {}", addr.ip()),
        None => addr.ip().to_string(),
    };
    if let Ok(v) = HeaderValue::from_str(&forwarded_for) {
        headers.insert("x-forwarded-for", v);
    }
    headers.insert("x-forwarded-proto", HeaderValue::from_static("http"));

    match state.client.request(req).await {
        Ok(resp) => {
            let (parts, body) = resp.into_parts();
            Response::from_parts(parts, Body::new(body))
        }
        Err(err) => {
            tracing::warn!(error = %err, "index upstream failed");
            (StatusCode::BAD_GATEWAY, "index upstream failed").into_response()
        }
    }
}

fn host_not_found(host: &str) -> Response {
    tracing::debug!(host = %host, "host not found");
    (StatusCode::NOT_FOUND, "host not found").into_response()
}

/// Target hostname of a request: the `Host` header for HTTP/1.x, the URI
/// authority for HTTP/2.
fn host_of(req: &Request<Body>) -> Option<String> {
    if let Some(h) = req
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
    {
        return Some(h.to_string());
    }
    req.uri().authority().map(|a| a.to_string())
}

fn leading_component(path: &str) -> &str {
    path.trim_start_matches('/')
        .split('/')
        .next()
        .unwrap_or_default()
}

/// Drop `prefix` from the request path, keeping the query string.
fn strip_path_prefix(req: &mut Request<Body>, prefix: &str) {
    let (path, query) = match req.uri().path_and_query() {
        Some(pq) => (pq.path(), pq.query()),
        None => return,
    };
    let stripped = path.strip_prefix(prefix).unwrap_or(path);
    let stripped = if stripped.is_empty() { "/" } else { stripped };
    let rebuilt = match query {
        Some(q) => format!("{stripped}?{q}"),
        None => stripped.to_string(),
    };
    if let Ok(pq) = rebuilt.parse::<PathAndQuery>() {
        *req.uri_mut() = Uri::from(pq);
    }
}

/// Wait for shutdown signal (Ctrl+C).
async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to install Ctrl+C handler");
        return;
    }
    tracing::info!("shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_of_prefers_header() {
        let req = Request::builder()
            .uri("http://uri-host.example.com/x")
            .header("Host", "header-host.example.com")
            .body(Body::empty())
            .unwrap();
        assert_eq!(host_of(&req).as_deref(), Some("header-host.example.com"));
    }

    #[test]
    fn test_host_of_falls_back_to_authority() {
        let req = Request::builder()
            .uri("http://uri-host.example.com/x")
            .body(Body::empty())
            .unwrap();
        assert_eq!(host_of(&req).as_deref(), Some("uri-host.example.com"));
    }

    #[test]
    fn test_leading_component() {
        assert_eq!(leading_component("/alpha/rest"), "alpha");
        assert_eq!(leading_component("/alpha"), "alpha");
        assert_eq!(leading_component("/"), "");
    }

    #[test]
    fn test_strip_path_prefix() {
        let mut req = Request::builder()
            .uri("/alpha/sub/page?q=1")
            .body(Body::empty())
            .unwrap();
        strip_path_prefix(&mut req, "/alpha");
        assert_eq!(req.uri().to_string(), "/sub/page?q=1");

        let mut bare = Request::builder()
            .uri("/alpha")
            .body(Body::empty())
            .unwrap();
        strip_path_prefix(&mut bare, "/alpha");
        assert_eq!(bare.uri().to_string(), "/");
    }
}
