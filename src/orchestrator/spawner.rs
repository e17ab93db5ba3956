//! Server process spawner and address discovery.
//!
//! Spawns the server-under-test with:
//! - `kill_on_drop(true)` so a dropped [`ServerProcess`] never outlives
//!   the test case that started it.
//! - stdout framed by [`stdout_lines`]; a dynamic server's first line is
//!   its listening address and everything after it is drained to `DEBUG`
//!   logs so the server never blocks on a full pipe. Output that stops
//!   decoding as lines is still read and discarded until EOF.
//! - a bounded wait for the address line. On timeout, early EOF, or an
//!   unparseable line the process is stopped before the error returns.

use std::process::Stdio;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::io::AsyncRead;
use tokio::process::{Child, ChildStdout, Command};
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};
use tracing::{debug, info, instrument, warn};

use crate::models::{DiscoveryMode, LanguageTarget, LifecycleState, ServerAddress};
use crate::{AppError, Result};

/// How long a server gets to exit after SIGTERM before it is killed.
pub const TERMINATE_GRACE: Duration = Duration::from_secs(2);

/// Maximum accepted stdout line length: 64 KiB.
pub const MAX_LINE_BYTES: usize = 65_536;

/// Frame `reader` as newline-delimited UTF-8 lines of at most
/// [`MAX_LINE_BYTES`].
#[must_use]
pub fn stdout_lines<R: AsyncRead>(reader: R) -> FramedRead<R, LinesCodec> {
    FramedRead::new(reader, LinesCodec::new_with_max_length(MAX_LINE_BYTES))
}

/// A running server-under-test.
///
/// Owned exclusively by the test case that spawned it. Call
/// [`ServerProcess::terminate`] for a graceful stop; dropping an
/// unterminated process kills it.
#[derive(Debug)]
pub struct ServerProcess {
    language: String,
    child: Child,
    address: ServerAddress,
    state: LifecycleState,
}

impl ServerProcess {
    /// Address the server is listening on.
    #[must_use]
    pub fn address(&self) -> &ServerAddress {
        &self.address
    }

    /// Current lifecycle state (`Spawned` or `Terminated`).
    #[must_use]
    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// OS process id, if the process has not been reaped yet.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    /// Stop the server: SIGTERM, a grace period, then a hard kill.
    ///
    /// Idempotent; terminating an already-terminated process is a no-op.
    pub async fn terminate(&mut self) {
        if self.state == LifecycleState::Terminated {
            return;
        }
        self.state = LifecycleState::Terminated;
        stop_child(&mut self.child, &self.language).await;
    }
}

impl Drop for ServerProcess {
    fn drop(&mut self) {
        if self.state != LifecycleState::Terminated {
            warn!(
                language = self.language,
                "server process dropped while running; killing"
            );
            if let Err(err) = self.child.start_kill() {
                debug!(language = self.language, %err, "kill on drop failed");
            }
        }
    }
}

/// Spawn the target's server and discover its listening address.
///
/// The executable receives a single argument: the fixed port, or `0` for
/// dynamic discovery.
///
/// # Errors
///
/// - `AppError::Spawn`: the executable could not be started, or a
///   fixed-port server exited during its startup delay.
/// - `AppError::AddressDiscovery`: stdout closed before an address line,
///   the line was not `host:port`, or no line arrived within the startup
///   timeout.
#[instrument(skip_all, fields(language = %target.name))]
pub async fn spawn_server(target: &LanguageTarget) -> Result<ServerProcess> {
    let port = target.discovery.requested_port();
    let program = target.server_path();

    let mut child = Command::new(&program)
        .arg(port.to_string())
        .current_dir(&target.working_directory)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .kill_on_drop(true)
        .spawn()
        .map_err(|err| {
            AppError::Spawn(format!("failed to start {}: {err}", program.display()))
        })?;

    info!(pid = child.id().unwrap_or(0), port, "server process spawned");

    let Some(stdout) = child.stdout.take() else {
        stop_child(&mut child, &target.name).await;
        return Err(AppError::Spawn("failed to capture server stdout".into()));
    };
    let mut lines = stdout_lines(stdout);

    let discovered = match target.discovery {
        DiscoveryMode::Fixed {
            port,
            startup_delay,
        } => wait_fixed(&mut child, port, startup_delay).await,
        DiscoveryMode::Dynamic { startup_timeout } => {
            discover_address(&mut lines, startup_timeout).await
        }
    };

    let address = match discovered {
        Ok(address) => address,
        Err(err) => {
            stop_child(&mut child, &target.name).await;
            return Err(err);
        }
    };

    info!(%address, "server ready");
    drain_stdout(target.name.clone(), lines);

    Ok(ServerProcess {
        language: target.name.clone(),
        child,
        address,
        state: LifecycleState::Spawned,
    })
}

/// Read exactly one line from `lines` and parse it as `host:port`.
///
/// # Errors
///
/// Returns `AppError::AddressDiscovery` on EOF, timeout, an oversized or
/// malformed line; `AppError::Io` if the stream fails or is not UTF-8.
pub async fn discover_address<R>(
    lines: &mut FramedRead<R, LinesCodec>,
    startup_timeout: Duration,
) -> Result<ServerAddress>
where
    R: AsyncRead + Unpin,
{
    match tokio::time::timeout(startup_timeout, lines.next()).await {
        Ok(Some(Ok(line))) => {
            debug!(line, "address line received");
            line.parse()
        }
        Ok(Some(Err(LinesCodecError::MaxLineLengthExceeded))) => Err(
            AppError::AddressDiscovery(format!("line too long: exceeded {MAX_LINE_BYTES} bytes")),
        ),
        Ok(Some(Err(LinesCodecError::Io(err)))) => Err(err.into()),
        Ok(None) => Err(AppError::AddressDiscovery(
            "failed to read server address from standard out".into(),
        )),
        Err(_elapsed) => Err(AppError::AddressDiscovery(format!(
            "server did not announce an address within {startup_timeout:?}"
        ))),
    }
}

async fn wait_fixed(
    child: &mut Child,
    port: u16,
    startup_delay: Duration,
) -> Result<ServerAddress> {
    tokio::time::sleep(startup_delay).await;

    match child.try_wait() {
        Ok(Some(status)) => Err(AppError::Spawn(format!(
            "server exited during startup: {status}"
        ))),
        Ok(None) => Ok(ServerAddress::local(port)),
        Err(err) => Err(AppError::Spawn(format!(
            "failed to poll server process: {err}"
        ))),
    }
}

/// Forward the remainder of the server's stdout to `DEBUG` logs.
fn drain_stdout(language: String, mut lines: FramedRead<ChildStdout, LinesCodec>) {
    tokio::spawn(async move {
        loop {
            match lines.next().await {
                Some(Ok(line)) => debug!(language, line, "server stdout"),
                Some(Err(err)) => {
                    debug!(language, %err, "server stdout is not line text; discarding the rest");
                    break;
                }
                None => return,
            }
        }

        // FramedRead yields nothing after an error; read raw bytes until EOF.
        let mut stdout = lines.into_inner();
        if let Err(err) = tokio::io::copy(&mut stdout, &mut tokio::io::sink()).await {
            debug!(language, %err, "server stdout drain stopped");
        }
    });
}

/// Ask `child` to exit, wait up to [`TERMINATE_GRACE`], then kill it.
async fn stop_child(child: &mut Child, language: &str) {
    match child.try_wait() {
        Ok(Some(status)) => {
            debug!(language, %status, "server already exited");
            return;
        }
        Ok(None) => {}
        Err(err) => warn!(language, %err, "failed to poll server process"),
    }

    if !request_shutdown(child) {
        if let Err(err) = child.start_kill() {
            warn!(language, %err, "failed to kill server process");
        }
    }

    match tokio::time::timeout(TERMINATE_GRACE, child.wait()).await {
        Ok(Ok(status)) => info!(language, %status, "server terminated"),
        Ok(Err(err)) => warn!(language, %err, "error waiting for server exit"),
        Err(_elapsed) => {
            warn!(language, "server ignored SIGTERM; killing");
            if let Err(err) = child.kill().await {
                warn!(language, %err, "failed to kill server process");
            }
        }
    }
}

/// Send SIGTERM. Returns `false` when the signal could not be delivered.
#[cfg(unix)]
fn request_shutdown(child: &Child) -> bool {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Some(pid) = child.id().and_then(|pid| i32::try_from(pid).ok()) else {
        return false;
    };
    kill(Pid::from_raw(pid), Signal::SIGTERM).is_ok()
}

#[cfg(not(unix))]
fn request_shutdown(_child: &Child) -> bool {
    false
}
