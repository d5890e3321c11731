//! Concurrent keyed registry of active tunnel sessions.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, SystemTime};

use crate::observability::metrics;
use crate::supervisor::{self, Halt};
use crate::tunnel::{same_session, RegistrationRequest, Session};

use super::{canonical, Record, Tags};

#[derive(Default)]
struct Inner {
    records: HashMap<String, Record>,
    aliases: HashMap<String, String>,
}

/// In-memory registry of active tunnels.
///
/// All configuration is constructor-injected; callers share the store as
/// an `Arc<Store>`, which keeps independent registries possible in tests.
pub struct Store {
    inner: RwLock<Inner>,
    ping_interval: Duration,
    verbose: bool,
}

impl Store {
    pub fn new(ping_interval: Duration) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            ping_interval,
            verbose: false,
        }
    }

    /// Log insert/update/remove events at info level.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn ping_interval(&self) -> Duration {
        self.ping_interval
    }

    /// Register a session under `key`, replacing any prior record there.
    ///
    /// The superseded record's supervisor tasks are told to stop; its
    /// transport is left to the owning collaborator to close. Spawns the
    /// Ping and Scan supervisor tasks for the new session.
    pub fn upsert(self: &Arc<Self>, key: &str, req: RegistrationRequest) {
        let key = canonical(key);
        let RegistrationRequest {
            session,
            stream,
            path,
            values,
            header,
            real_ip,
        } = req;

        let halt = Halt::new();
        // Subscribe before the record becomes visible: a replacement can
        // trigger this halt the instant the insert is published, and a
        // receiver subscribed later would never see that signal.
        let ping_halted = halt.subscribe();
        let scan_halted = halt.subscribe();
        let record = Record {
            key: key.clone(),
            session: session.clone(),
            header: Tags::from_header_map(&header),
            tags: values,
            since: SystemTime::now(),
            visited: 0,
            ip: real_ip.clone(),
            path,
            halt: halt.clone(),
        };

        let replaced = {
            let mut inner = self.inner.write().expect("registry lock poisoned");
            inner.records.insert(key.clone(), record)
        };

        if let Some(old) = replaced {
            old.halt.trigger();
            if self.verbose {
                tracing::info!(key = %key, ip = %real_ip, "update");
            }
        } else if self.verbose {
            tracing::info!(key = %key, ip = %real_ip, "insert");
        }

        supervisor::spawn(self.clone(), session, stream, ping_halted, scan_halted);
        metrics::session_accepted();
    }

    /// Look up the session behind a (possibly aliased) public key.
    pub fn get_session(&self, key: &str) -> Option<Arc<dyn Session>> {
        self.get_record(key).map(|rec| rec.session)
    }

    /// Snapshot of the record behind a (possibly aliased) public key.
    pub fn get_record(&self, key: &str) -> Option<Record> {
        let key = canonical(key);
        let inner = self.inner.read().expect("registry lock poisoned");
        if let Some(rec) = inner.records.get(&key) {
            return Some(rec.clone());
        }
        let target = inner.aliases.get(&key)?;
        inner.records.get(target).cloned()
    }

    /// Count one dispatched request. No-op when the key is already gone.
    pub fn visited(&self, key: &str) {
        let key = canonical(key);
        let mut inner = self.inner.write().expect("registry lock poisoned");
        if let Some(rec) = inner.records.get_mut(&key) {
            rec.visited += 1;
        }
    }

    /// Evict the record backed by `session`, if any. Idempotent.
    ///
    /// Scans by identity rather than by key: a newer registration may
    /// have taken the key over, and must not be removed by the old
    /// session's supervisor.
    pub fn remove_session(&self, session: &Arc<dyn Session>) {
        let removed = {
            let mut inner = self.inner.write().expect("registry lock poisoned");
            let key = inner
                .records
                .iter()
                .find(|(_, rec)| same_session(&rec.session, session))
                .map(|(k, _)| k.clone());
            key.and_then(|k| inner.records.remove(&k))
        };
        if let Some(rec) = removed {
            rec.halt.trigger();
            if self.verbose {
                tracing::info!(key = %rec.key, "remove");
            }
            metrics::session_closed();
        }
    }

    /// Snapshot of all records, newest first.
    pub fn records(&self) -> Vec<Record> {
        let mut all: Vec<Record> = {
            let inner = self.inner.read().expect("registry lock poisoned");
            inner.records.values().cloned().collect()
        };
        all.sort_by(|a, b| b.since.cmp(&a.since));
        all
    }

    /// Point `alias` at an existing key. Lookups fall through aliases.
    pub fn alias(&self, alias: &str, key: &str) {
        let alias = canonical(alias);
        let key = canonical(key);
        let mut inner = self.inner.write().expect("registry lock poisoned");
        inner.aliases.insert(alias, key);
    }

    pub fn unalias(&self, alias: &str) {
        let alias = canonical(alias);
        let mut inner = self.inner.write().expect("registry lock poisoned");
        inner.aliases.remove(&alias);
    }

    pub fn aliases(&self) -> HashMap<String, String> {
        let inner = self.inner.read().expect("registry lock poisoned");
        inner.aliases.clone()
    }
}
