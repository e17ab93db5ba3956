//! Language target model and server address parsing.

use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::{AppError, Result};

/// Host the client dials regardless of the address a server announces.
///
/// Servers usually report their wildcard bind address (`[::]:4000`,
/// `0.0.0.0:4000`), so only the port is taken from the announcement.
pub const DIAL_HOST: &str = "localhost";

/// How the harness learns where a spawned server is listening.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryMode {
    /// Server is started on a fixed port; readiness is assumed after a delay.
    Fixed {
        /// Port passed to the server and dialled by the client.
        port: u16,
        /// Time to wait before the first connection attempt.
        startup_delay: Duration,
    },
    /// Server is started with port `0` and prints `host:port` as its first
    /// stdout line.
    Dynamic {
        /// Upper bound on the wait for the address line.
        startup_timeout: Duration,
    },
}

impl DiscoveryMode {
    /// Port argument handed to the server executable (`0` for dynamic).
    #[must_use]
    pub fn requested_port(&self) -> u16 {
        match self {
            Self::Fixed { port, .. } => *port,
            Self::Dynamic { .. } => 0,
        }
    }
}

/// One implementation under test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageTarget {
    /// Display name, also used by the `--lang` filter.
    pub name: String,
    /// Directory the build and the server run in.
    pub working_directory: PathBuf,
    /// Address-discovery policy.
    pub discovery: DiscoveryMode,
    /// Build program followed by its arguments.
    pub build_command: Vec<String>,
    /// Server executable, relative to `working_directory` unless absolute.
    pub server_binary: PathBuf,
}

impl LanguageTarget {
    /// Absolute-or-joined path of the server executable.
    #[must_use]
    pub fn server_path(&self) -> PathBuf {
        self.working_directory.join(&self.server_binary)
    }
}

/// Lifecycle of a server-under-test within one language run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Build has not run (or failed).
    NotBuilt,
    /// Build succeeded; no process running.
    Built,
    /// Process is running and its address is known.
    Spawned,
    /// Process has been signalled and reaped.
    Terminated,
}

/// Listening address announced by a server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerAddress {
    /// Host portion exactly as announced (may be a wildcard).
    pub host: String,
    /// Listening port.
    pub port: u16,
}

impl ServerAddress {
    /// Address for a fixed-port server.
    #[must_use]
    pub fn local(port: u16) -> Self {
        Self {
            host: DIAL_HOST.to_owned(),
            port,
        }
    }

    /// `host:port` pair the client actually connects to.
    #[must_use]
    pub fn dial_target(&self) -> (&'static str, u16) {
        (DIAL_HOST, self.port)
    }
}

impl FromStr for ServerAddress {
    type Err = AppError;

    /// Parse `host:port`, splitting on the last `:` so IPv6 hosts survive.
    fn from_str(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let (host, port) = trimmed.rsplit_once(':').ok_or_else(|| {
            AppError::AddressDiscovery(format!("expected host:port, got {trimmed:?}"))
        })?;
        let port: u16 = port.parse().map_err(|err| {
            AppError::AddressDiscovery(format!("invalid port in {trimmed:?}: {err}"))
        })?;
        if port == 0 {
            return Err(AppError::AddressDiscovery(format!(
                "server announced port 0 in {trimmed:?}"
            )));
        }
        Ok(Self {
            host: host.to_owned(),
            port,
        })
    }
}

impl Display for ServerAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}
