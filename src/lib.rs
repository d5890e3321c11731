//! Burrow — reverse-tunnel relay library

pub mod config;
pub mod control;
pub mod http;
pub mod observability;
pub mod registry;
pub mod supervisor;
pub mod tunnel;

pub use config::RelayConfig;
pub use control::subscribe;
pub use http::RelayServer;
pub use registry::{Record, Store, Tags};
pub use tunnel::{RegistrationRequest, Session, TunnelStream, UpgradeError, Upgrader};
