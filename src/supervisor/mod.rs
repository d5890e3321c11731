//! Per-session liveness supervision.
//!
//! Every registered session gets two independent tasks:
//! - the **ping task** writes `PING\n` to the control stream on a fixed
//!   interval and evicts the session when a write fails;
//! - the **scan task** reads control lines until EOF, a read error, or an
//!   explicit `CLOSE`, then evicts the session.
//!
//! Eviction is idempotent, so the two tasks need no coordination beyond
//! a shared [`Halt`] signal that stops both when the record they belong
//! to is superseded by a newer registration for the same key.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, ReadHalf, WriteHalf};
use tokio::sync::broadcast;

use crate::control::Command;
use crate::registry::Store;
use crate::tunnel::{Session, TunnelStream};

/// Stop signal shared by one record and its supervisor tasks.
#[derive(Clone)]
pub struct Halt {
    tx: broadcast::Sender<()>,
}

impl Halt {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }
}

impl Default for Halt {
    fn default() -> Self {
        Self::new()
    }
}

/// Start the Ping and Scan tasks for a freshly registered session.
///
/// The halt receivers must be subscribed by the caller before the record
/// is published; a receiver first subscribed inside a spawned task could
/// miss a trigger fired before the task is polled.
pub(crate) fn spawn(
    store: Arc<Store>,
    session: Arc<dyn Session>,
    stream: Box<dyn TunnelStream>,
    ping_halted: broadcast::Receiver<()>,
    scan_halted: broadcast::Receiver<()>,
) {
    let (reader, writer) = tokio::io::split(stream);
    tokio::spawn(ping(store.clone(), session.clone(), writer, ping_halted));
    tokio::spawn(scan(store, session, reader, scan_halted));
}

/// Heartbeat loop. Mostly redundant with `scan` (the transport usually
/// reports the break first) but catches clients that vanished without
/// half-closing the stream.
async fn ping(
    store: Arc<Store>,
    session: Arc<dyn Session>,
    mut writer: WriteHalf<Box<dyn TunnelStream>>,
    mut halted: broadcast::Receiver<()>,
) {
    let interval = store.ping_interval();
    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {
                if writer.write_all(b"PING\n").await.is_err() {
                    break;
                }
            }
            // Superseded by a newer registration: the record is already
            // gone from the map, just stop.
            _ = halted.recv() => return,
        }
    }
    store.remove_session(&session);
}

/// Read control lines until the client closes or the stream breaks.
async fn scan(
    store: Arc<Store>,
    session: Arc<dyn Session>,
    reader: ReadHalf<Box<dyn TunnelStream>>,
    mut halted: broadcast::Receiver<()>,
) {
    let mut lines = BufReader::new(reader).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if line.is_empty() {
                        continue;
                    }
                    match Command::parse(&line) {
                        Command::Pong => continue,
                        Command::Close => break,
                        Command::Unknown(cmd) => {
                            tracing::warn!(command = %cmd, "stm0: unknown command");
                        }
                    }
                }
                // EOF or read error: same as CLOSE.
                Ok(None) | Err(_) => break,
            },
            _ = halted.recv() => return,
        }
    }
    store.remove_session(&session);
}
