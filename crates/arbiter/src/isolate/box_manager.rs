//! Box lifecycle management for isolate
//!
//! A [`BoxPool`] hands out box ids from a free list behind a semaphore. Each
//! [`IsolateBox`] holds a lease on its id and returns it only after teardown.

use std::collections::VecDeque;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::process::Output;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::process::Command;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, instrument, warn};

use crate::config::Config;
use crate::isolate::command::{IsolateAction, IsolateCommand};
use crate::isolate::process;
use crate::reaper::TeardownLedger;
use crate::registry::RunnerSpec;
use crate::sandbox::{ProvisionError, Provisioner, Sandbox, SandboxError, Step, StepOutcome};

/// Run `isolate --init` or `--cleanup` for one box id
pub(crate) async fn run_action(
    isolate_path: &Path,
    id: u32,
    cgroup: bool,
    action: IsolateAction,
) -> std::io::Result<Output> {
    let args = IsolateCommand::new(isolate_path, id)
        .action(action)
        .cgroup(cgroup)
        .build();
    debug!(?args, "running isolate");

    Command::new(&args[0])
        .args(&args[1..])
        .kill_on_drop(true)
        .output()
        .await
}

/// Blocking `isolate --cleanup`, for contexts without a runtime
fn cleanup_blocking(isolate_path: &Path, id: u32, cgroup: bool) {
    let args = IsolateCommand::new(isolate_path, id)
        .action(IsolateAction::Cleanup)
        .cgroup(cgroup)
        .build();

    match std::process::Command::new(&args[0]).args(&args[1..]).output() {
        Ok(output) if output.status.success() => {
            debug!(box_id = id, "best-effort cleanup succeeded");
        }
        Ok(output) => {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(box_id = id, stderr = %stderr, "best-effort cleanup failed");
        }
        Err(e) => {
            warn!(box_id = id, error = %e, "best-effort cleanup spawn failed");
        }
    }
}

/// Exclusive claim on one box id; dropping it returns the id to the pool
#[derive(Debug)]
struct BoxLease {
    id: u32,
    free: Arc<Mutex<VecDeque<u32>>>,
    _permit: OwnedSemaphorePermit,
}

impl Drop for BoxLease {
    fn drop(&mut self) {
        // The permit field drops after this body, so the id is back first
        self.free
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(self.id);
    }
}

/// An initialized isolate box
///
/// Release it through [`BoxPool`]'s [`Provisioner::release`]. Dropping a
/// live box falls back to a blocking cleanup on a background thread.
#[derive(Debug)]
pub struct IsolateBox {
    id: u32,

    /// Directory printed by `isolate --init`; files live in its `box/` child
    box_path: PathBuf,

    /// `box_path/box`, mounted at `/box` inside the sandbox
    workdir: PathBuf,

    isolate_path: PathBuf,

    cgroup: bool,

    alive: bool,

    lease: Option<BoxLease>,

    ledger: Arc<TeardownLedger>,
}

impl IsolateBox {
    /// Host path to a file inside the box
    pub fn file_path(&self, name: &str) -> Result<PathBuf, SandboxError> {
        check_name(name)?;
        Ok(self.workdir.join(name))
    }

    /// The same file as seen from inside the sandbox, for isolate's
    /// `--stdin`, `--stdout` and `--stderr`
    pub fn sandbox_path(&self, name: &str) -> Result<PathBuf, SandboxError> {
        check_name(name)?;
        Ok(PathBuf::from("/box").join(name))
    }

    /// Host path outside the sandboxed directory, unreachable from user code
    pub fn private_path(&self, name: &str) -> Result<PathBuf, SandboxError> {
        check_name(name)?;
        Ok(self.box_path.join(name))
    }

    pub fn box_path(&self) -> &Path {
        &self.box_path
    }

    pub fn isolate_path(&self) -> &Path {
        &self.isolate_path
    }

    pub fn cgroup(&self) -> bool {
        self.cgroup
    }

    /// Kill every process in the box and remove it.
    ///
    /// Idempotent; failures are logged. The box id goes back to the pool only
    /// after this finishes.
    #[instrument(skip(self), fields(box_id = self.id))]
    pub async fn cleanup(&mut self) {
        if !self.alive {
            return;
        }

        match run_action(&self.isolate_path, self.id, self.cgroup, IsolateAction::Cleanup).await {
            Ok(output) if output.status.success() => {}
            Ok(output) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                warn!(stderr = %stderr.trim(), "isolate cleanup failed");
            }
            Err(e) => warn!(error = %e, "failed to spawn isolate cleanup"),
        }

        match tokio::fs::remove_dir_all(&self.box_path).await {
            Ok(()) => debug!("removed leftover box directory"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(error = %e, path = %self.box_path.display(), "failed to remove box directory"),
        }

        self.mark_released();
        debug!("box released");
    }

    /// Output left behind by a killed step; errors yield nothing
    async fn read_partial(&self, name: &str, limit: usize) -> Vec<u8> {
        let Ok(path) = self.file_path(name) else {
            return Vec::new();
        };
        process::read_capped(&path, limit).await.unwrap_or_else(|e| {
            warn!(error = %e, ?path, "failed to read partial output");
            Vec::new()
        })
    }

    fn mark_released(&mut self) {
        self.alive = false;
        self.ledger.record_release();
        self.lease = None;
    }
}

fn check_name(name: &str) -> Result<(), SandboxError> {
    if name.is_empty() || name.contains("..") || name.starts_with('/') {
        return Err(SandboxError::InvalidPath(format!(
            "path traversal not allowed: {name}"
        )));
    }
    Ok(())
}

impl Sandbox for IsolateBox {
    fn id(&self) -> u32 {
        self.id
    }

    fn workdir(&self) -> &Path {
        &self.workdir
    }

    fn is_alive(&self) -> bool {
        self.alive
    }

    #[instrument(skip(self, content), fields(box_id = self.id))]
    async fn write_file(&self, name: &str, content: &[u8]) -> Result<(), SandboxError> {
        if !self.alive {
            return Err(SandboxError::Released);
        }
        let path = self.file_path(name)?;
        tokio::fs::write(&path, content).await?;
        debug!(?path, len = content.len(), "wrote file to box");
        Ok(())
    }

    async fn run(&self, step: Step<'_>) -> Result<StepOutcome, SandboxError> {
        if !self.alive {
            return Err(SandboxError::Released);
        }
        process::run_step(self, step).await
    }

    async fn captured_output(&self, label: &str, limit: usize) -> (Vec<u8>, Vec<u8>) {
        let (stdout, stderr) = process::output_names(label);
        (
            self.read_partial(&stdout, limit).await,
            self.read_partial(&stderr, limit).await,
        )
    }
}

impl Drop for IsolateBox {
    fn drop(&mut self) {
        if !self.alive {
            return;
        }

        warn!(
            box_id = self.id,
            box_path = %self.box_path.display(),
            "IsolateBox dropped while live, cleaning up on a background thread"
        );

        // The lease moves into the thread so the id stays claimed until
        // cleanup has actually run
        let isolate_path = self.isolate_path.clone();
        let box_path = self.box_path.clone();
        let id = self.id;
        let cgroup = self.cgroup;
        let lease = self.lease.take();
        self.alive = false;
        self.ledger.record_release();

        std::thread::spawn(move || {
            cleanup_blocking(&isolate_path, id, cgroup);
            if let Err(e) = std::fs::remove_dir_all(&box_path)
                && e.kind() != std::io::ErrorKind::NotFound
            {
                warn!(box_id = id, error = %e, "failed to remove box directory");
            }
            drop(lease);
        });
    }
}

/// Fixed range of isolate boxes shared by concurrent requests
#[derive(Debug)]
pub struct BoxPool {
    start_id: u32,

    count: u32,

    isolate_path: PathBuf,

    cgroup: bool,

    /// One permit per box; waiting on it is the backpressure
    semaphore: Arc<Semaphore>,

    /// Ids not currently leased
    free: Arc<Mutex<VecDeque<u32>>>,

    ledger: Arc<TeardownLedger>,
}

impl BoxPool {
    pub fn new(start_id: u32, count: u32, isolate_path: impl Into<PathBuf>, cgroup: bool) -> Self {
        Self {
            start_id,
            count,
            isolate_path: isolate_path.into(),
            cgroup,
            semaphore: Arc::new(Semaphore::new(count as usize)),
            free: Arc::new(Mutex::new((start_id..start_id + count).collect())),
            ledger: Arc::new(TeardownLedger::default()),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.pool.first_box_id,
            config.pool.max_sandboxes,
            config.isolate_binary(),
            config.cgroup,
        )
    }

    /// Wait for a free box id, wipe any stale state, and initialize it
    #[instrument(skip(self))]
    pub async fn acquire_box(&self) -> Result<IsolateBox, ProvisionError> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ProvisionError::PoolClosed)?;

        let id = self
            .free
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .ok_or(ProvisionError::PoolExhausted)?;
        let lease = BoxLease {
            id,
            free: Arc::clone(&self.free),
            _permit: permit,
        };

        debug!(id, "leased box id");

        // A crashed process may have left this id initialized
        let stale = run_action(&self.isolate_path, id, self.cgroup, IsolateAction::Cleanup)
            .await
            .map_err(ProvisionError::Spawn)?;
        if !stale.status.success() {
            debug!(id, "stale cleanup reported failure");
        }

        let output = run_action(&self.isolate_path, id, self.cgroup, IsolateAction::Init)
            .await
            .map_err(ProvisionError::Spawn)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ProvisionError::InitFailed {
                id,
                message: stderr.trim().to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let box_path = PathBuf::from(stdout.trim());
        let workdir = box_path.join("box");

        if !workdir.is_dir() {
            // Nothing owns this box yet, so clean up here before the lease drops
            if let Err(e) =
                run_action(&self.isolate_path, id, self.cgroup, IsolateAction::Cleanup).await
            {
                warn!(id, error = %e, "cleanup after failed init could not spawn");
            }
            return Err(ProvisionError::InitFailed {
                id,
                message: format!("box directory does not exist: {}", workdir.display()),
            });
        }

        self.ledger.record_acquire();
        debug!(?box_path, "box initialized");

        Ok(IsolateBox {
            id,
            box_path,
            workdir,
            isolate_path: self.isolate_path.clone(),
            cgroup: self.cgroup,
            alive: true,
            lease: Some(lease),
            ledger: Arc::clone(&self.ledger),
        })
    }

    /// Refuse new acquisitions; live boxes are unaffected
    pub fn close(&self) {
        self.semaphore.close();
    }

    /// Number of boxes that can be acquired without waiting
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub fn capacity(&self) -> u32 {
        self.count
    }

    pub fn box_ids(&self) -> Range<u32> {
        self.start_id..self.start_id + self.count
    }

    pub fn isolate_path(&self) -> &Path {
        &self.isolate_path
    }

    pub fn cgroup(&self) -> bool {
        self.cgroup
    }

    pub fn ledger(&self) -> &TeardownLedger {
        &self.ledger
    }
}

impl Provisioner for BoxPool {
    type Sandbox = IsolateBox;

    async fn acquire(&self, spec: &RunnerSpec) -> Result<IsolateBox, ProvisionError> {
        debug!(language = %spec.language_id, "acquiring sandbox");
        self.acquire_box().await
    }

    async fn release(&self, sandbox: &mut IsolateBox) {
        sandbox.cleanup().await;
    }
}
