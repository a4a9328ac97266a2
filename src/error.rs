//! Error types.
//!
//! Only attach-time failures ([`AttachError`]) and caller-facing request failures
//! ([`RequestError`]) ever reach a caller. Malformed, oversized or misrouted reports
//! are logged and dropped where they are found; [`ProtocolError`] exists so handlers
//! can describe *why* they dropped something.

use crate::protocol::MatchKey;
use std::path::PathBuf;
use thiserror::Error;

/// A report was too short for what its header claims.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("report too short: need {needed} bytes, got {got}")]
    TooShort { needed: usize, got: usize },
}

/// Failures of the physical transport.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("hid error: {0}")]
    Hid(#[from] hidapi::HidError),

    #[error("transport `{0}` is not started")]
    NotStarted(String),

    #[error("transport `{0}` is already started")]
    AlreadyStarted(String),

    #[error("transport `{0}` is disconnected")]
    Disconnected(String),

    #[error("failed to spawn reader thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Driver lifecycle failures.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("driver `{0}` cannot run behind a receiver")]
    NoReceiverSupport(&'static str),

    #[error("device state does not belong to driver `{0}`")]
    StateMismatch(&'static str),
}

/// Registry mutations.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("a driver for {key} is already registered (`{existing}`)")]
    DuplicateMatchKey { key: MatchKey, existing: &'static str },

    #[error("no driver registered for {0}")]
    NotRegistered(MatchKey),
}

/// Why a transport could not be turned into a device.
#[derive(Debug, Error)]
pub enum AttachError {
    #[error("no matching driver for {0}")]
    NoMatchingDriver(MatchKey),

    #[error("allocation failure while attaching `{0}`")]
    Allocation(String),

    #[error("transport start failure: {0}")]
    TransportStart(#[source] TransportError),

    #[error("driver `{driver}` init failure: {source}")]
    DriverInit {
        driver: &'static str,
        #[source]
        source: DriverError,
    },

    #[error("transport `{0}` is already attached")]
    AlreadyAttached(String),
}

/// Outcome of a blocking request/response getter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    /// The device went away (logoff, detach) while the caller was waiting.
    #[error("request interrupted: device `{0}` was torn down")]
    Interrupted(String),

    #[error("request to `{device}` timed out after {timeout_ms} ms")]
    TimedOut { device: String, timeout_ms: u64 },

    #[error("device `{0}` does not support this request")]
    Unsupported(String),

    #[error(transparent)]
    ScrollMode(#[from] ScrollModeError),
}

/// Invalid scroll mode settings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScrollModeError {
    #[error("unknown scroll mode {0} (valid: 1-5, 7, 8)")]
    UnknownMode(u8),

    #[error("button {0} out of range (0-15)")]
    ButtonOutOfRange(u8),

    #[error("scroll mode {mode} needs {needed} parameter(s)")]
    MissingParameter { mode: u8, needed: usize },
}

/// Configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration value `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}
