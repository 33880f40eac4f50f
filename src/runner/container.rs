use std::path::Path;

use crate::context::Context;
use crate::runner::error::RunnerError;
use crate::runner::{ProcessHandle, ProcessRunner, StartRequest};

/// Container-backed runner backend. Out of scope: the container/native
/// process runner abstraction is only specified by the narrow contract the
/// Supervisor consumes, so this exists to keep that boundary real without
/// implementing a container engine integration.
pub struct ContainerProcessRunner;

impl ContainerProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ContainerProcessRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessRunner for ContainerProcessRunner {
    fn start(
        &self,
        _ctx: &Context<bool>,
        _request: StartRequest,
    ) -> Result<Box<dyn ProcessHandle>, RunnerError> {
        Err(RunnerError::NotImplemented("container runner start"))
    }

    fn get_running_server(&self, _host_dir: &Path) -> Option<Box<dyn ProcessHandle>> {
        None
    }

    fn cleanup(&self) -> Result<(), RunnerError> {
        Err(RunnerError::NotImplemented("container runner cleanup"))
    }
}
