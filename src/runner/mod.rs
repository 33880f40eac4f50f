//! Process Runner (spec §4.B): the contract the supervisor consumes to
//! create, locate, wait on, terminate, and clean up a server process,
//! independent of whether it runs natively or inside a container.

mod container;
mod error;
mod native;

pub use container::ContainerProcessRunner;
pub use error::RunnerError;
pub use native::NativeProcessRunner;

use std::path::{Path, PathBuf};

use crate::cluster::ServerType;
use crate::context::Context;

/// A host-path/container-path pair a runner must bind-mount for a server
/// (spec §3 Process handle / §4.C.5 "gather its declared volume
/// requirements").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Volume {
    pub host_path: PathBuf,
    pub container_path: PathBuf,
}

/// Everything `startServer` (spec §4.C) gathers before asking the Runner to
/// actually create a process (spec §4.B `Start`).
pub struct StartRequest {
    pub server_type: ServerType,
    pub executable: PathBuf,
    pub args: Vec<String>,
    pub volumes: Vec<Volume>,
    pub ports: Vec<u16>,
    pub container_name: String,
    pub host_dir: PathBuf,
    /// Path the runner should tee the process's combined stdout+stderr
    /// into; log rotation (spec §4.C.iv) operates on this file.
    pub log_file: PathBuf,
}

/// Opaque handle to a running server (spec §3 "Process handle").
pub trait ProcessHandle: Send {
    fn process_id(&self) -> u32;
    /// Empty for natively run servers.
    fn container_id(&self) -> Option<String>;
    /// Empty for natively run servers.
    fn container_ip(&self) -> Option<String>;
    fn host_port(&self, internal_port: u16) -> u16;
    /// Blocks until the process exits, returning its exit code if known.
    fn wait(&mut self) -> Result<Option<i32>, RunnerError>;
    /// Graceful terminate (TERM, then escalate).
    fn terminate(&mut self) -> Result<(), RunnerError>;
    /// Force kill.
    fn kill(&mut self) -> Result<(), RunnerError>;
    /// Reopen log files (HUP), used after log rotation.
    fn hup(&self) -> Result<(), RunnerError>;
    fn cleanup(&mut self) -> Result<(), RunnerError>;
}

/// Creates, locates, and tears down server processes (spec §4.B). The
/// Supervisor is agnostic to whether an implementation runs servers
/// natively or inside containers.
#[cfg_attr(test, mockall::automock)]
pub trait ProcessRunner: Send + Sync {
    /// Starts a server process; the `bool` reports whether the failure to
    /// start (if any) was specifically a port-in-use condition, the only
    /// retryable error class from the caller's standpoint (spec §4.C).
    fn start(
        &self,
        ctx: &Context<bool>,
        request: StartRequest,
    ) -> Result<Box<dyn ProcessHandle>, RunnerError>;

    /// Recovers a previously started instance under `host_dir`, for
    /// crash-resilient supervisors (spec §4.B `GetRunningServer`).
    fn get_running_server(&self, host_dir: &Path) -> Option<Box<dyn ProcessHandle>>;

    /// Releases runner-wide resources (spec §4.B `Cleanup`).
    fn cleanup(&self) -> Result<(), RunnerError>;
}
