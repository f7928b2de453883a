//! Error taxonomy for the failover core.
//!
//! Every fallible operation in this crate returns one of these kinds.
//! None of them panic the process; only the daemon's supervisor decides
//! whether an error is fatal (config, host-adapter-at-startup) or merely
//! logged and tolerated (collector, decision, controller).

use thiserror::Error;

/// Configuration errors: missing/malformed keys, invalid member class,
/// invalid thresholds. Surfaced at startup; at runtime (`reload`) the
/// previous configuration stays in force.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required key `{section}.{key}`")]
    MissingKey { section: String, key: String },
    #[error("invalid value for `{section}.{key}`: {reason}")]
    InvalidValue {
        section: String,
        key: String,
        reason: String,
    },
    #[error("unknown member class `{0}`")]
    UnknownClass(String),
    #[error("threshold `{name}` out of range: {reason}")]
    InvalidThreshold { name: String, reason: String },
    #[error("malformed config source: {0}")]
    Malformed(String),
}

/// A host capability (config store, routing control, IPC bus) is
/// unreachable. Fatal on start, retryable at runtime.
#[derive(Debug, Error)]
pub enum HostAdapterError {
    #[error("host adapter `{capability}` unavailable: {reason}")]
    Unavailable { capability: String, reason: String },
    #[error("host adapter `{capability}` rejected the request: {reason}")]
    Rejected { capability: String, reason: String },
}

/// A collector failed to produce a usable measurement. Never fatal;
/// callers degrade the affected member rather than abort.
#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("member `{member}` unreachable: {reason}")]
    Unreachable { member: String, reason: String },
    #[error("member `{member}` timed out after {deadline_ms} ms")]
    Timeout { member: String, deadline_ms: u64 },
    #[error("member `{member}` returned malformed telemetry: {reason}")]
    Malformed { member: String, reason: String },
}

/// The decision engine could not reach a conclusion this tick.
#[derive(Debug, Error)]
pub enum DecisionError {
    #[error("insufficient samples for member `{member}`: have {have}, need {need}")]
    InsufficientData {
        member: String,
        have: usize,
        need: usize,
    },
    #[error("no eligible member available")]
    NoEligibleMember,
}

/// The controller failed to apply a decision at the host layer.
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("switch from `{from}` to `{to}` rejected: still in cooldown ({remaining_s}s left)")]
    Cooldown {
        from: String,
        to: String,
        remaining_s: u64,
    },
    #[error("switch to `{to}` rejected: below minimum uptime")]
    MinUptimeNotMet { to: String },
    #[error("host adapter failed to apply switch from `{from}` to `{to}`: {source}")]
    HostRejected {
        from: String,
        to: String,
        #[source]
        source: HostAdapterError,
    },
}

/// A condition the implementation asserts can never happen but the host
/// handed us anyway (e.g. an unknown member with no class). Logged, the
/// offending entity is dropped from the working set, the daemon keeps
/// running.
#[derive(Debug, Error)]
pub enum InvariantViolation {
    #[error("member `{0}` has no resolvable class")]
    UnclassifiedMember(String),
    #[error("duplicate member name `{0}`")]
    DuplicateMember(String),
    #[error("store invariant broken: {0}")]
    StoreOrder(String),
}
