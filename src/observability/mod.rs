//! Observability subsystem.
//!
//! # Design Decisions
//! - Structured logging through `tracing`; the subscriber is installed by
//!   the binary, never by the library.
//! - Counters are cheap atomic increments behind the `metrics` facade;
//!   the Prometheus exporter is optional and wired up in `main`.

pub mod metrics;
