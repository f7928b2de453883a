//! `autonomy-core` — the failover brain of the `autonomy` daemon.
//!
//! This crate holds every component of §4 of the specification that does
//! not itself speak to the host OS: the data model, the Telemetry Store,
//! the per-class Collectors, Discovery, the Hybrid Weight Manager, the
//! Decision Engine, and the Adaptive Sampler. It depends on three narrow
//! traits (see [`host`]) for the only I/O it needs — a config store, a
//! routing control surface, and an IPC bus — and the daemon crate supplies
//! the concrete implementations. Nothing in this crate reads a file,
//! opens a socket, or owns a `tokio::Runtime`.

pub mod collectors;
pub mod config;
pub mod controller;
pub mod decision;
pub mod discovery;
pub mod error;
pub mod host;
pub mod model;
pub mod sampler;
pub mod store;
pub mod trend;
pub mod weights;
