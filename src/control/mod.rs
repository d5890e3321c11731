//! Control-stream wire protocol and the registration loop.
//!
//! The protocol is newline-delimited ASCII over the first stream of each
//! session:
//!
//! ```text
//! → HOST <hostname|hostpath>\n   registration succeeded
//! → ERR <message>\n              registration failed
//! → PING\n                       heartbeat, server-initiated
//! ← PONG\n                       heartbeat ack (optional)
//! ← CLOSE\n                      graceful client disconnect
//! ```
//!
//! EOF or a read error on the control stream is treated exactly like
//! `CLOSE`. Anything else from the client is logged and ignored.

use std::io;
use std::sync::Arc;

use thiserror::Error;
use tokio::io::AsyncWriteExt;

use crate::observability::metrics;
use crate::registry::{allocate, AllocateError, Store};
use crate::tunnel::{RegistrationRequest, UpgradeError, Upgrader};

/// A line received from the client on the control stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Heartbeat ack; a no-op.
    Pong,
    /// Graceful disconnect request; evicts the session immediately.
    Close,
    /// Anything else; logged and otherwise ignored.
    Unknown(String),
}

impl Command {
    pub fn parse(line: &str) -> Self {
        match line {
            "PONG" => Command::Pong,
            "CLOSE" => Command::Close,
            other => Command::Unknown(other.to_string()),
        }
    }
}

#[derive(Debug, Error)]
pub enum NegotiateError {
    #[error(transparent)]
    Allocate(#[from] AllocateError),
    /// The reply could not be written; the client is already gone.
    #[error("control stream write failed: {0}")]
    Io(#[from] io::Error),
}

/// Allocate a key for the registration and tell the client.
///
/// Writes `HOST <display>\n` and returns the storage key on success, or
/// `ERR <message>\n` on an allocation conflict. Either way the failure
/// is local to this one registration attempt.
pub async fn negotiate(
    store: &Store,
    req: &mut RegistrationRequest,
    root: &str,
) -> Result<String, NegotiateError> {
    match allocate(store, &req.path, &req.values, &req.real_ip, root) {
        Ok(lease) => {
            let reply = format!("HOST {}\n", lease.display);
            req.stream.write_all(reply.as_bytes()).await?;
            Ok(lease.key)
        }
        Err(err) => {
            let reply = format!("ERR {err}\n");
            req.stream.write_all(reply.as_bytes()).await?;
            Err(err.into())
        }
    }
}

/// Accept registrations from an upgrader until its listener is exhausted.
///
/// Per-connection failures (handshake, negotiation) are logged and the
/// loop moves on; they never affect other sessions.
pub async fn subscribe<U: Upgrader>(store: Arc<Store>, upgrader: U) {
    loop {
        let mut req = match upgrader.upgrade().await {
            Ok(req) => req,
            Err(UpgradeError::Exhausted) => {
                tracing::warn!("upgrade: listener exhausted");
                break;
            }
            Err(err) => {
                tracing::warn!(error = %err, "upgrade session failed");
                continue;
            }
        };

        let key = match negotiate(&store, &mut req, upgrader.root()).await {
            Ok(key) => key,
            Err(err) => {
                tracing::warn!(error = %err, "negotiate session failed");
                continue;
            }
        };

        store.upsert(&key, req);
        metrics::request_registered();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::io::AsyncReadExt;

    use crate::registry::testutil::{null_session, request};

    use super::*;

    async fn read_reply(ctrl: &mut tokio::io::DuplexStream) -> String {
        let mut buf = vec![0u8; 256];
        let n = ctrl.read(&mut buf).await.unwrap();
        String::from_utf8(buf[..n].to_vec()).unwrap()
    }

    #[test]
    fn test_command_parse() {
        assert_eq!(Command::parse("PONG"), Command::Pong);
        assert_eq!(Command::parse("CLOSE"), Command::Close);
        assert_eq!(
            Command::parse("HELLO"),
            Command::Unknown("HELLO".to_string())
        );
    }

    #[tokio::test]
    async fn test_negotiate_replies_host() {
        let store = Arc::new(Store::new(Duration::from_secs(5)));
        let (mut req, mut ctrl) = request(null_session(), "/alpha", "", "1.2.3.4");

        let key = negotiate(&store, &mut req, "example.com").await.unwrap();
        assert_eq!(key, "alpha.example.com");
        assert_eq!(read_reply(&mut ctrl).await, "HOST alpha.example.com\n");
    }

    #[tokio::test]
    async fn test_negotiate_replies_path_style_display() {
        let store = Arc::new(Store::new(Duration::from_secs(5)));
        let (mut req, mut ctrl) = request(null_session(), "/alpha/", "", "1.2.3.4");

        let key = negotiate(&store, &mut req, "example.com").await.unwrap();
        assert_eq!(key, "alpha.example.com");
        assert_eq!(read_reply(&mut ctrl).await, "HOST example.com/alpha/\n");
    }

    #[tokio::test]
    async fn test_negotiate_replies_err_on_conflict() {
        let store = Arc::new(Store::new(Duration::from_secs(5)));
        let (taken, _c1) = request(null_session(), "/alpha", "", "9.9.9.9");
        store.upsert("alpha.example.com", taken);

        let (mut req, mut ctrl) = request(null_session(), "/alpha", "", "1.2.3.4");
        let err = negotiate(&store, &mut req, "example.com").await.unwrap_err();
        assert!(matches!(err, NegotiateError::Allocate(_)));

        let reply = read_reply(&mut ctrl).await;
        assert!(reply.starts_with("ERR "), "got: {reply}");
        assert!(reply.ends_with('\n'));
        // No record was created for the failed attempt's session.
        assert_eq!(store.records().len(), 1);
    }
}
