//! Server build step.

use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, info, instrument};

use crate::models::LanguageTarget;
use crate::{AppError, Result};

/// Run the target's build command in its working directory.
///
/// Stdout and stderr are captured. A nonzero exit turns the captured
/// stderr into the error message so the report can show it verbatim.
///
/// # Errors
///
/// Returns `AppError::Build` if the build tool cannot be launched or
/// exits unsuccessfully.
#[instrument(skip_all, fields(language = %target.name))]
pub async fn build_server(target: &LanguageTarget) -> Result<()> {
    let (program, args) = target
        .build_command
        .split_first()
        .ok_or_else(|| AppError::Build("build command is empty".into()))?;

    debug!(program, ?args, dir = %target.working_directory.display(), "running build");

    let output = Command::new(program)
        .args(args)
        .current_dir(&target.working_directory)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|err| AppError::Build(format!("failed to run {program}: {err}")))?;

    if output.status.success() {
        info!("build succeeded");
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr).trim_end().to_owned();
    let status = output.status.code().map_or_else(
        || "terminated by signal".to_owned(),
        |code| format!("exited with code {code}"),
    );
    info!(%status, "build failed");

    if stderr.is_empty() {
        Err(AppError::Build(format!("{program} {status}")))
    } else {
        Err(AppError::Build(stderr))
    }
}
