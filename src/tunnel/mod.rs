//! Transport abstraction consumed by the relay core.
//!
//! # Data Flow
//! ```text
//! raw connection (TCP/WebSocket/QUIC/...)
//!     → transport-specific Upgrader (external collaborator)
//!     → RegistrationRequest { Session, control stream, path, query, headers, ip }
//!     → control::subscribe → registry::Store
//! ```
//!
//! # Design Decisions
//! - The core never branches on transport type: every wire protocol is
//!   reduced to a [`Session`] that can open bidirectional streams.
//! - Sessions are held as `Arc<dyn Session>` and compared by pointer
//!   identity; one live Session backs at most one registry Record.
//! - The first stream opened by a client is the control stream and is
//!   carried inside the [`RegistrationRequest`]; it never reaches the
//!   registry itself.

use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::HeaderMap;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::registry::Tags;

/// One bidirectional byte channel within a [`Session`].
///
/// Blanket-implemented for anything duplex, so transports hand the core
/// plain `tokio` I/O types.
pub trait TunnelStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> TunnelStream for T {}

/// A live multiplexed transport connection.
///
/// The relay opens one fresh stream per proxied HTTP request; streams are
/// never pooled across requests.
#[async_trait]
pub trait Session: Send + Sync {
    /// Open a new bidirectional stream on this session.
    async fn open_stream(&self) -> io::Result<Box<dyn TunnelStream>>;
}

/// Identity comparison for sessions (clones of the same `Arc` are equal).
pub fn same_session(a: &Arc<dyn Session>, b: &Arc<dyn Session>) -> bool {
    Arc::ptr_eq(a, b)
}

/// Everything the core needs to know about one accepted tunnel connection.
///
/// Produced exactly once per connection by an [`Upgrader`]; immutable.
pub struct RegistrationRequest {
    /// The multiplexed connection backing this registration.
    pub session: Arc<dyn Session>,
    /// The first stream the client opened, carrying the control protocol.
    pub stream: Box<dyn TunnelStream>,
    /// Request path at upgrade time; its segments are name candidates.
    pub path: String,
    /// Query parameters at upgrade time (carries e.g. the clobber token).
    pub values: Tags,
    /// Headers presented during the upgrade handshake.
    pub header: HeaderMap,
    /// Client address as seen by the edge.
    pub real_ip: String,
}

/// Errors surfaced by an [`Upgrader`].
#[derive(Debug, Error)]
pub enum UpgradeError {
    /// The underlying listener is exhausted; the subscribe loop ends.
    #[error("listener exhausted")]
    Exhausted,
    /// One handshake failed; the subscribe loop moves on.
    #[error("handshake failed: {0}")]
    Handshake(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// A transport-specific collaborator producing registration requests.
#[async_trait]
pub trait Upgrader: Send + Sync {
    /// The relay's base domain; allocated names are subdomains of it.
    fn root(&self) -> &str;

    /// Block until the next connection completes its handshake and has
    /// opened its control stream.
    async fn upgrade(&self) -> Result<RegistrationRequest, UpgradeError>;
}
