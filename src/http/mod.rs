//! HTTP dispatch subsystem.
//!
//! # Data Flow
//! ```text
//! inbound request on the public listener
//!     → server.rs (canonicalize Host, decide routing kind)
//!         Host == registered key  → proxy.rs (fresh stream on the session)
//!         Host == root domain     → introspection endpoints,
//!                                   path-style routing, index fallback
//!         otherwise               → host-not-found
//! ```

pub mod proxy;
pub mod server;

pub use proxy::ProxyError;
pub use server::RelayServer;
