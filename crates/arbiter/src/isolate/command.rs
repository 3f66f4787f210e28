//! Command builder for the Isolate CLI

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::types::{MountConfig, ResourceLimits};

/// Builder for Isolate command-line arguments
#[derive(Debug)]
pub struct IsolateCommand {
    isolate_path: PathBuf,
    /// One of --init, --run, --cleanup
    action: IsolateAction,
    /// -b, --box-id
    box_id: u32,
    limits: ResourceLimits,
    mounts: Vec<MountConfig>,
    /// -E, --env; sorted so the argv is deterministic
    env: BTreeMap<String, String>,
    /// --share-net
    share_net: bool,
    /// -M, --meta (host path)
    meta_file: Option<PathBuf>,
    /// -i, --stdin (opened inside the sandbox)
    stdin: Option<PathBuf>,
    /// -o, --stdout
    stdout: Option<PathBuf>,
    /// -r, --stderr
    stderr: Option<PathBuf>,
    working_dir: Option<String>,
    command: Vec<String>,
    cgroup: bool,
}

impl IsolateCommand {
    pub fn new(isolate_path: impl Into<PathBuf>, box_id: u32) -> Self {
        Self {
            isolate_path: isolate_path.into(),
            action: IsolateAction::Run,
            box_id,
            limits: ResourceLimits::unbounded(),
            mounts: Vec::new(),
            env: BTreeMap::new(),
            share_net: false,
            meta_file: None,
            stdin: None,
            stdout: None,
            stderr: None,
            working_dir: None,
            command: Vec::new(),
            cgroup: false,
        }
    }

    pub fn action(mut self, action: IsolateAction) -> Self {
        self.action = action;
        self
    }

    pub fn limits(mut self, limits: ResourceLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn mounts(mut self, mounts: impl IntoIterator<Item = MountConfig>) -> Self {
        self.mounts.extend(mounts);
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn envs<'a>(mut self, vars: impl IntoIterator<Item = (&'a String, &'a String)>) -> Self {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    /// Keep the host network namespace. Off unless a language asks for it.
    pub fn share_net(mut self, enable: bool) -> Self {
        self.share_net = enable;
        self
    }

    pub fn meta_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.meta_file = Some(path.into());
        self
    }

    pub fn stdin(mut self, path: impl Into<PathBuf>) -> Self {
        self.stdin = Some(path.into());
        self
    }

    pub fn stdout(mut self, path: impl Into<PathBuf>) -> Self {
        self.stdout = Some(path.into());
        self
    }

    pub fn stderr(mut self, path: impl Into<PathBuf>) -> Self {
        self.stderr = Some(path.into());
        self
    }

    /// Working directory inside the sandbox
    pub fn working_dir(mut self, dir: impl Into<String>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn command(mut self, cmd: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.command = cmd.into_iter().map(Into::into).collect();
        self
    }

    /// Use cgroups for memory accounting (`--cg`, `--cg-mem`)
    pub fn cgroup(mut self, enable: bool) -> Self {
        self.cgroup = enable;
        self
    }

    /// Build the argv, isolate binary first
    pub fn build(self) -> Vec<String> {
        let mut args = vec![self.isolate_path.to_string_lossy().into_owned()];

        args.push(format!("--box-id={}", self.box_id));

        if self.cgroup {
            args.push("--cg".to_string());
        }

        match self.action {
            IsolateAction::Init => {
                args.push("--init".to_string());
            }
            IsolateAction::Cleanup => {
                args.push("--cleanup".to_string());
            }
            IsolateAction::Run => {
                args.push("--run".to_string());

                if let Some(time) = self.limits.cpu_time {
                    args.push(format!("--time={time}"));
                }
                if let Some(wall_time) = self.limits.wall_time {
                    args.push(format!("--wall-time={wall_time}"));
                }
                if let Some(extra_time) = self.limits.extra_time {
                    args.push(format!("--extra-time={extra_time}"));
                }
                if let Some(memory) = self.limits.memory {
                    if self.cgroup {
                        args.push(format!("--cg-mem={memory}"));
                    } else {
                        args.push(format!("--mem={memory}"));
                    }
                }
                if let Some(stack) = self.limits.stack {
                    args.push(format!("--stack={stack}"));
                }
                if let Some(procs) = self.limits.processes {
                    args.push(format!("--processes={procs}"));
                }
                if let Some(fsize) = self.limits.file_size {
                    args.push(format!("--fsize={fsize}"));
                }
                if let Some(open_files) = self.limits.open_files {
                    args.push(format!("--open-files={open_files}"));
                }

                for mount in &self.mounts {
                    if mount.optional && !Path::new(&mount.source).exists() {
                        continue;
                    }
                    let mut opts = String::new();
                    if mount.writable {
                        opts.push_str(":rw");
                    }
                    if mount.optional {
                        opts.push_str(":maybe");
                    }
                    args.push(format!("--dir={}={}{}", mount.target, mount.source, opts));
                }

                if self.share_net {
                    args.push("--share-net".to_string());
                }

                for (key, value) in &self.env {
                    args.push(format!("--env={key}={value}"));
                }

                if let Some(ref meta) = self.meta_file {
                    args.push(format!("--meta={}", meta.display()));
                }

                if let Some(ref stdin) = self.stdin {
                    args.push(format!("--stdin={}", stdin.display()));
                }
                if let Some(ref stdout) = self.stdout {
                    args.push(format!("--stdout={}", stdout.display()));
                }
                if let Some(ref stderr) = self.stderr {
                    args.push(format!("--stderr={}", stderr.display()));
                }

                if let Some(ref dir) = self.working_dir {
                    args.push(format!("--chdir={dir}"));
                }

                args.push("--".to_string());
                args.extend(self.command);
            }
        }

        args
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolateAction {
    Init,
    Run,
    Cleanup,
}
