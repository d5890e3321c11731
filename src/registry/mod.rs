//! Session registry subsystem.
//!
//! # Data Flow
//! ```text
//! control::subscribe
//!     → allocator.rs (pick a unique public key for the registration)
//!     → store.rs (Record inserted, supervisor tasks spawned)
//!
//! http dispatch
//!     → key.rs (canonicalize the Host header)
//!     → store.rs (read-locked lookup, visit accounting)
//! ```
//!
//! # Design Decisions
//! - One `RwLock` guards the record and alias maps; it is never held
//!   across an await point or any stream I/O.
//! - Records are replaced, not mutated, on re-registration; snapshots
//!   returned by `records()` are safe to read without the lock.
//! - Eviction scans by session identity, O(n) in session count. It runs
//!   once per session lifetime, never on the request path.

pub mod allocator;
pub mod key;
pub mod record;
pub mod store;
pub mod tags;

pub use allocator::{allocate, AllocateError, Lease};
pub use key::canonical;
pub use record::Record;
pub use store::Store;
pub use tags::Tags;

#[cfg(test)]
pub(crate) mod testutil {
    use std::io;
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::http::HeaderMap;
    use tokio::io::DuplexStream;

    use crate::tunnel::{RegistrationRequest, Session, TunnelStream};

    use super::Tags;

    /// Session whose streams go nowhere; enough for registry-level tests.
    pub struct NullSession;

    #[async_trait]
    impl Session for NullSession {
        async fn open_stream(&self) -> io::Result<Box<dyn TunnelStream>> {
            Err(io::Error::new(io::ErrorKind::Unsupported, "null session"))
        }
    }

    pub fn null_session() -> Arc<dyn Session> {
        Arc::new(NullSession)
    }

    /// Build a registration request; returns the client half of the
    /// control stream so tests can read protocol lines or hang up.
    pub fn request(
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
}
