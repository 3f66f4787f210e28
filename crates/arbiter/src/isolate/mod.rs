//! IOI Isolate backend
//!
//! Command building, box lifecycle, meta-file parsing and step execution.
//!
//! References for Isolate's CLI arguments and meta-files:
//! - https://www.ucw.cz/isolate/isolate.1.html
//! - https://github.com/ioi/isolate

use std::fs;
use std::path::Path;

pub use crate::isolate::box_manager::{BoxPool, IsolateBox};
pub use crate::isolate::command::{IsolateAction, IsolateCommand};
pub use crate::isolate::meta::{MetaFile, MetaParseError, MetaStatus};
pub(crate) use crate::isolate::box_manager::run_action;
use crate::sandbox::SandboxError;
use crate::types::MountConfig;

mod box_manager;
mod command;
mod meta;
mod process;

/// Attempt to set up the cgroup v2 hierarchy for isolate.
///
/// Outside systemd there is no `isolate-cg-keeper` to do this, so it is
/// replicated here: create `cg_root` and enable the memory and pids
/// controllers so that per-box child cgroups work.
///
/// Returns `Ok(false)` when cgroups are unavailable and the caller should
/// fall back to RLIMIT_AS.
pub fn prepare_cgroup(cg_root: &Path) -> std::io::Result<bool> {
    let cg_base = Path::new("/sys/fs/cgroup");

    let controllers_path = cg_base.join("cgroup.controllers");
    if !controllers_path.exists() {
        return Ok(false);
    }

    let controllers = fs::read_to_string(&controllers_path)?;
    if !controllers.split_whitespace().any(|c| c == "memory") {
        return Ok(false);
    }

    if cg_root.exists() {
        let subtree = cg_root.join("cgroup.subtree_control");
        if let Ok(content) = fs::read_to_string(&subtree)
            && content.split_whitespace().any(|c| c == "memory")
        {
            return Ok(true);
        }
    }

    // cgroup v2 forbids enabling controllers on a cgroup with member
    // processes, so move ourselves into a leaf first
    let init_cg = cg_base.join("init");
    if !init_cg.exists() {
        fs::create_dir(&init_cg)?;
    }
    fs::write(init_cg.join("cgroup.procs"), std::process::id().to_string())?;

    fs::write(cg_base.join("cgroup.subtree_control"), "+memory +pids")?;

    if !cg_root.exists() {
        fs::create_dir(cg_root)?;
    }

    fs::write(cg_root.join("cgroup.subtree_control"), "+memory +pids")?;

    Ok(true)
}

/// Fail if a required mount source is missing on the host
pub fn validate_mounts(mounts: &[MountConfig]) -> Result<(), SandboxError> {
    for mount in mounts {
        if mount.optional {
            continue;
        }
        if !Path::new(&mount.source).exists() {
            return Err(SandboxError::MountSourceNotFound(mount.source.clone()));
        }
    }
    Ok(())
}

/// Resolve a bare program name (like `g++`) against the host's PATH.
///
/// Anything containing a `/` (like `./program`) is left as is. Symlinks are
/// canonicalized so the target is reachable across bind mounts.
pub fn resolve_command(command: &mut [String]) -> Result<(), SandboxError> {
    let Some(first) = command.first_mut() else {
        return Ok(());
    };

    if first.contains('/') {
        return Ok(());
    }

    let path_var = std::env::var("PATH").unwrap_or_default();
    for dir in path_var.split(':').filter(|dir| !dir.is_empty()) {
        let candidate = Path::new(dir).join(&*first);
        if candidate.is_file() {
            *first = fs::canonicalize(&candidate)
                .unwrap_or(candidate)
                .to_string_lossy()
                .into_owned();
            return Ok(());
        }
    }

    Err(SandboxError::CommandFailed(format!(
        "command '{first}' not found in PATH",
    )))
}
