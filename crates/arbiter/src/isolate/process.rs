//! Running one step inside an isolate box
//!
//! Output goes to files in the box and is read back afterwards; the meta
//! file lives next to the box directory where the program cannot reach it.

use std::path::Path;
use std::process::Stdio;

use tokio::fs::OpenOptions;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{debug, instrument, warn};

use crate::isolate::box_manager::IsolateBox;
use crate::isolate::command::{IsolateAction, IsolateCommand};
use crate::isolate::meta::{MetaFile, MetaStatus};
use crate::isolate::{resolve_command, validate_mounts};
use crate::sandbox::{Sandbox, SandboxError, Step, StepOutcome};

/// File names of a step's captured stdout and stderr
pub(crate) fn output_names(label: &str) -> (String, String) {
    (format!("{label}.stdout"), format!("{label}.stderr"))
}

/// Read at most `limit` bytes of a regular file.
///
/// A missing file reads as empty. So does anything that is not a regular
/// file, since the program may have replaced its output with a symlink or a
/// FIFO. The open itself refuses symlinks, so a swap between check and read
/// cannot redirect it.
pub(crate) async fn read_capped(path: &Path, limit: usize) -> std::io::Result<Vec<u8>> {
    let opened = OpenOptions::new()
        .read(true)
        .custom_flags(libc::O_NOFOLLOW | libc::O_NONBLOCK | libc::O_CLOEXEC)
        .open(path)
        .await;

    let file = match opened {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) if e.raw_os_error() == Some(libc::ELOOP) => {
            warn!(?path, "captured output is a symlink");
            return Ok(Vec::new());
        }
        Err(e) => return Err(e),
    };

    if !file.metadata().await?.is_file() {
        warn!(?path, "captured output is not a regular file");
        return Ok(Vec::new());
    }

    let mut buf = Vec::new();
    file.take(limit as u64).read_to_end(&mut buf).await?;
    Ok(buf)
}

#[instrument(skip_all, fields(box_id = sandbox.id(), step = step.label))]
pub(crate) async fn run_step(
    sandbox: &IsolateBox,
    step: Step<'_>,
) -> Result<StepOutcome, SandboxError> {
    let (stdout_name, stderr_name) = output_names(step.label);
    let stdin_name = format!("{}.stdin", step.label);
    let meta_path = sandbox.private_path(&format!("{}.meta", step.label))?;

    // Isolate needs a stdin file even when there is no input
    sandbox
        .write_file(&stdin_name, step.stdin.unwrap_or_default())
        .await?;

    match tokio::fs::remove_file(&meta_path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }

    validate_mounts(step.mounts)?;

    // Isolate uses execve, which does not search PATH
    let mut argv = step.argv;
    resolve_command(&mut argv)?;

    let args = IsolateCommand::new(sandbox.isolate_path(), sandbox.id())
        .action(IsolateAction::Run)
        .cgroup(sandbox.cgroup())
        .limits(step.limits.clone())
        .mounts(step.mounts.iter().cloned())
        .envs(step.env)
        .share_net(step.network)
        .meta_file(&meta_path)
        .stdin(sandbox.sandbox_path(&stdin_name)?)
        .stdout(sandbox.sandbox_path(&stdout_name)?)
        .stderr(sandbox.sandbox_path(&stderr_name)?)
        .working_dir("/box")
        .command(argv)
        .build();

    debug!(?args, "running isolate step");

    let output = Command::new(&args[0])
        .args(&args[1..])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(SandboxError::SpawnFailed)?;

    if !tokio::fs::try_exists(&meta_path).await.unwrap_or(false) {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(SandboxError::CommandFailed(stderr.trim().to_string()));
    }

    let meta = MetaFile::load(&meta_path).await?;
    let status = meta.status();

    if status == MetaStatus::InternalError {
        return Err(SandboxError::Internal(
            meta.message()
                .unwrap_or("isolate reported an internal error")
                .to_string(),
        ));
    }

    let stdout = read_capped(&sandbox.file_path(&stdout_name)?, step.output_limit).await?;
    let stderr = read_capped(&sandbox.file_path(&stderr_name)?, step.output_limit).await?;

    debug!(
        ?status,
        time = meta.time(),
        wall_time = meta.wall_time(),
        memory = meta.memory(),
        exit_code = ?meta.exit_code(),
        signal = ?meta.signal(),
        "step finished"
    );

    Ok(StepOutcome {
        stdout,
        stderr,
        exit_code: meta.exit_code(),
        signal: meta.signal(),
        timed_out: status == MetaStatus::TimedOut,
        limit_exceeded: meta.limit_exceeded(),
        message: meta.message().map(str::to_owned),
    })
}
