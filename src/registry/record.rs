//! Registry entry binding a public key to a live session.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Serialize, Serializer};

use crate::supervisor::Halt;
use crate::tunnel::Session;

use super::Tags;

/// One registered tunnel.
///
/// Owned exclusively by the [`Store`](super::Store); everything handed
/// out by `records()` is a clone the caller can read freely. The session
/// itself and the halt handle never leave the process, so neither is
/// serialized.
#[derive(Clone, Serialize)]
pub struct Record {
    /// Canonical public hostname the tunnel is reachable under.
    pub key: String,
    #[serde(skip)]
    pub session: Arc<dyn Session>,
    /// Headers presented at upgrade time.
    pub header: Tags,
    /// Query parameters presented at upgrade time (carries `clobber`).
    pub tags: Tags,
    /// Registration time, serialized as unix milliseconds.
    #[serde(serialize_with = "unix_millis")]
    pub since: SystemTime,
    /// Number of requests dispatched to this tunnel.
    pub visited: u64,
    /// Client address the registration arrived from.
    pub ip: String,
    /// Raw upgrade path, kept for introspection.
    pub path: String,
    /// Stops this record's supervisor tasks when it is superseded.
    #[serde(skip)]
    pub(crate) halt: Halt,
}

impl Record {
    /// Whether this record's tags satisfy a query-subset filter.
    pub fn matches(&self, wanted: &Tags) -> bool {
        self.tags.matches(wanted)
    }
}

fn unix_millis<S: Serializer>(t: &SystemTime, s: S) -> Result<S::Ok, S::Error> {
    let ms = t
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64;
    s.serialize_u64(ms)
}
