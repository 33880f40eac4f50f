use std::fs::File;
use std::net::TcpListener;
use std::path::Path;
use std::time::{Duration, Instant};

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;

use crate::context::Context;
use crate::harness::Harness;
use crate::runner::error::RunnerError;
use crate::runner::{ProcessHandle, ProcessRunner, StartRequest};

/// Runs servers as plain child processes of this supervisor, using the
/// subprocess harness (spec §4.A) for spawn/stream/signal plumbing.
pub struct NativeProcessRunner;

impl NativeProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

impl Default for NativeProcessRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessRunner for NativeProcessRunner {
    fn start(
        &self,
        _ctx: &Context<bool>,
        request: StartRequest,
    ) -> Result<Box<dyn ProcessHandle>, RunnerError> {
        std::fs::create_dir_all(request.host_dir.join("data")).map_err(|source| {
            RunnerError::HostDir {
                path: request.host_dir.join("data"),
                source,
            }
        })?;
        std::fs::create_dir_all(request.host_dir.join("apps")).map_err(|source| {
            RunnerError::HostDir {
                path: request.host_dir.join("apps"),
                source,
            }
        })?;

        for &port in &request.ports {
            wait_until_port_free(port, Duration::from_secs(3))?;
        }

        let log_file = File::create(&request.log_file).map_err(|source| RunnerError::HostDir {
            path: request.log_file.clone(),
            source,
        })?;

        let pid_file = request.host_dir.join("PID");
        let harness = Harness::new(&request.executable, &request.args, request.container_name)
            .start_with_sink(Some(Box::new(log_file)))?;
        std::fs::write(&pid_file, harness.pid().to_string()).ok();

        Ok(Box::new(NativeProcessHandle {
            harness: Some(harness),
            ports: request.ports,
        }))
    }

    fn get_running_server(&self, host_dir: &Path) -> Option<Box<dyn ProcessHandle>> {
        let pid_file = host_dir.join("PID");
        let pid: i32 = std::fs::read_to_string(pid_file).ok()?.trim().parse().ok()?;
        if signal::kill(Pid::from_raw(pid), None).is_ok() {
            Some(Box::new(RecoveredProcessHandle { pid: pid as u32 }))
        } else {
            None
        }
    }

    fn cleanup(&self) -> Result<(), RunnerError> {
        Ok(())
    }
}

fn wait_until_port_free(port: u16, deadline: Duration) -> Result<(), RunnerError> {
    let start = Instant::now();
    loop {
        if TcpListener::bind(("0.0.0.0", port)).is_ok() {
            return Ok(());
        }
        if start.elapsed() >= deadline {
            return Err(RunnerError::PortInUse { port });
        }
        std::thread::sleep(Duration::from_millis(100));
    }
}

struct NativeProcessHandle {
    harness: Option<Harness<crate::harness::Started>>,
    ports: Vec<u16>,
}

impl ProcessHandle for NativeProcessHandle {
    fn process_id(&self) -> u32 {
        self.harness.as_ref().expect("handle not yet cleaned up").pid()
    }

    fn container_id(&self) -> Option<String> {
        None
    }

    fn container_ip(&self) -> Option<String> {
        None
    }

    fn host_port(&self, internal_port: u16) -> u16 {
        // Native mode: no port remapping, the internal port is the host
        // port whenever it's one this server was actually started on.
        self.ports
            .iter()
            .copied()
            .find(|p| *p == internal_port)
            .unwrap_or(internal_port)
    }

    fn wait(&mut self) -> Result<Option<i32>, RunnerError> {
        let harness = self.harness.take().ok_or(RunnerError::NotImplemented("wait after cleanup"))?;
        Ok(harness.wait()?)
    }

    fn terminate(&mut self) -> Result<(), RunnerError> {
        if let Some(harness) = self.harness.take() {
            harness.close()?;
        }
        Ok(())
    }

    fn kill(&mut self) -> Result<(), RunnerError> {
        if let Some(harness) = self.harness.take() {
            harness.kill()?;
        }
        Ok(())
    }

    fn hup(&self) -> Result<(), RunnerError> {
        if let Some(harness) = &self.harness {
            harness.hup()?;
        }
        Ok(())
    }

    fn cleanup(&mut self) -> Result<(), RunnerError> {
        self.harness = None;
        Ok(())
    }
}

/// A handle to a process adopted via `GetRunningServer`, constructed only
/// from its pid (no owned `Child`, since this process did not spawn it).
struct RecoveredProcessHandle {
    pid: u32,
}

impl ProcessHandle for RecoveredProcessHandle {
    fn process_id(&self) -> u32 {
        self.pid
    }

    fn container_id(&self) -> Option<String> {
        None
    }

    fn container_ip(&self) -> Option<String> {
        None
    }

    fn host_port(&self, internal_port: u16) -> u16 {
        internal_port
    }

    fn wait(&mut self) -> Result<Option<i32>, RunnerError> {
        while signal::kill(Pid::from_raw(self.pid as i32), None).is_ok() {
            std::thread::sleep(Duration::from_millis(200));
        }
        Ok(None)
    }

    fn terminate(&mut self) -> Result<(), RunnerError> {
        let _ = signal::kill(Pid::from_raw(self.pid as i32), Signal::SIGTERM);
        Ok(())
    }

    fn kill(&mut self) -> Result<(), RunnerError> {
        let _ = signal::kill(Pid::from_raw(self.pid as i32), Signal::SIGKILL);
        Ok(())
    }

    fn hup(&self) -> Result<(), RunnerError> {
        let _ = signal::kill(Pid::from_raw(self.pid as i32), Signal::SIGHUP);
        Ok(())
    }

    fn cleanup(&mut self) -> Result<(), RunnerError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::ServerType;

    #[test]
    fn start_creates_data_and_apps_dirs_and_streams_log() {
        let dir = tempfile::tempdir().unwrap();
        let runner = NativeProcessRunner::new();
        let ctx = Context::new();

        let request = StartRequest {
            server_type: ServerType::Single,
            executable: "sh".into(),
            args: vec!["-c".to_string(), "echo hello; sleep 1".to_string()],
            volumes: vec![],
            ports: vec![],
            container_name: "test-container".to_string(),
            host_dir: dir.path().to_path_buf(),
            log_file: dir.path().join("log"),
        };

        let mut handle = runner.start(&ctx, request).unwrap();
        assert!(dir.path().join("data").is_dir());
        assert!(dir.path().join("apps").is_dir());

        handle.kill().unwrap();
        std::thread::sleep(Duration::from_millis(100));
        let logged = std::fs::read_to_string(dir.path().join("log")).unwrap();
        assert!(logged.contains("hello"));
    }

    #[test]
    fn port_in_use_is_reported() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let err = wait_until_port_free(port, Duration::from_millis(200)).unwrap_err();
        assert!(matches!(err, RunnerError::PortInUse { .. }));
    }
}
