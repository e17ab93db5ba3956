//! Error types shared across the harness.

use std::fmt::{Display, Formatter};

/// Shared harness result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Harness error enumeration covering every way a conformance run can fail.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// The server's build command exited nonzero; carries captured stderr.
    Build(String),
    /// The server executable could not be started.
    Spawn(String),
    /// The server never announced a usable listening address.
    AddressDiscovery(String),
    /// Connection refused, reset, or a failed write.
    Connection(String),
    /// A bounded socket read expired before the expected bytes arrived.
    Timeout(String),
    /// The comparator rejected the actual response.
    Mismatch(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Build(msg) => write!(f, "build: {msg}"),
            Self::Spawn(msg) => write!(f, "spawn: {msg}"),
            Self::AddressDiscovery(msg) => write!(f, "address discovery: {msg}"),
            Self::Connection(msg) => write!(f, "connection: {msg}"),
            Self::Timeout(msg) => write!(f, "timeout: {msg}"),
            Self::Mismatch(msg) => write!(f, "mismatch: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
