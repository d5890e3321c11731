//! Shared utilities for integration testing: in-memory tunnel
//! transports and a relay harness bound to an ephemeral port.

use std::convert::Infallible;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::HeaderMap;
use burrow::registry::Tags;
use burrow::{
    RegistrationRequest, RelayConfig, RelayServer, Session, Store, TunnelStream, UpgradeError,
    Upgrader,
};
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::io::DuplexStream;
use tokio::sync::{mpsc, Mutex};

/// In-memory session: every opened stream is served by a tiny HTTP/1.1
/// upstream that echoes the request path.
pub struct EchoSession;

#[async_trait]
impl Session for EchoSession {
    async fn open_stream(&self) -> io::Result<Box<dyn TunnelStream>> {
        let (near, far) = tokio::io::duplex(64 * 1024);
        tokio::spawn(async move {
            let svc = service_fn(|req: hyper::Request<hyper::body::Incoming>| async move {
                let body = format!("echo {}", req.uri().path());
                Ok::<_, Infallible>(hyper::Response::new(Full::new(Bytes::from(body))))
            });
            let _ = hyper::server::conn::http1::Builder::new()
                .serve_connection(TokioIo::new(far), svc)
                .await;
        });
        Ok(Box::new(near))
    }
}

/// Session whose transport refuses every new stream.
pub struct BrokenSession;

#[async_trait]
impl Session for BrokenSession {
    async fn open_stream(&self) -> io::Result<Box<dyn TunnelStream>> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "transport gone"))
    }
}

/// Feeds pre-built registration requests to `burrow::subscribe`, then
/// reports the listener as exhausted.
pub struct ChannelUpgrader {
    root: String,
    rx: Mutex<mpsc::UnboundedReceiver<RegistrationRequest>>,
}

impl ChannelUpgrader {
    pub fn new(root: &str) -> (Self, mpsc::UnboundedSender<RegistrationRequest>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                root: root.to_string(),
                rx: Mutex::new(rx),
            },
            tx,
        )
    }
}

#[async_trait]
impl Upgrader for ChannelUpgrader {
    fn root(&self) -> &str {
        &self.root
    }

    async fn upgrade(&self) -> Result<RegistrationRequest, UpgradeError> {
        self.rx
            .lock()
            .await
            .recv()
            .await
            .ok_or(UpgradeError::Exhausted)
    }
}

/// Build a registration request around `session`; returns the client
/// half of the control stream (drop it to simulate a client hangup).
pub fn registration(
    session: Arc<dyn Session>,
    path: &str,
    query: &str,
    ip: &str,
) -> (RegistrationRequest, DuplexStream) {
    let (client, server) = tokio::io::duplex(4096);
    let req = RegistrationRequest {
        session,
        stream: Box::new(server),
        path: path.to_string(),
        values: Tags::from_query(query),
        header: HeaderMap::new(),
        real_ip: ip.to_string(),
    };
    (req, client)
}

/// Start a relay with the given root on an ephemeral port.
pub async fn start_relay(root: &str, store: Arc<Store>) -> SocketAddr {
    let mut config = RelayConfig::default();
    config.relay.root = root.to_string();
    serve(config, store).await
}

/// Start a relay whose unmatched root-domain requests are forwarded to
/// the `index` upstream.
pub async fn start_relay_with_index(root: &str, store: Arc<Store>, index: &str) -> SocketAddr {
    let mut config = RelayConfig::default();
    config.relay.root = root.to_string();
    config.http.index = Some(index.to_string());
    serve(config, store).await
}

async fn serve(config: RelayConfig, store: Arc<Store>) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = RelayServer::new(&config, store);
    tokio::spawn(async move {
        let _ = server.run(listener).await;
    });
    addr
}

/// HTTP client that resolves `domain` to the relay's address.
pub fn client_for(domain: &str, addr: SocketAddr) -> reqwest::Client {
    reqwest::Client::builder()
        .resolve(domain, addr)
        .no_proxy()
        .build()
        .unwrap()
}
