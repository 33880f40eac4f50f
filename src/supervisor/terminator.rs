use std::thread;
use std::time::{Duration, Instant};

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;

/// Sends TERM to `pid`, polls for its death up to `deadline`, then escalates
/// to KILL (spec §4.C `RestartServer`/shutdown: "graceful terminate with
/// 1-minute deadline"). Operates on the raw pid rather than a `ProcessHandle`
/// so it can run from a thread other than the one that owns the handle and
/// is blocked in `handle.wait()` — the owning thread's wait unblocks once
/// the signal takes effect.
pub fn graceful_terminate(pid: u32, deadline: Duration) {
    let target = Pid::from_raw(pid as i32);
    if signal::kill(target, Signal::SIGTERM).is_err() {
        return;
    }

    let start = Instant::now();
    while start.elapsed() < deadline {
        if signal::kill(target, None).is_err() {
            return;
        }
        thread::sleep(Duration::from_millis(100));
    }

    let _ = signal::kill(target, Signal::SIGKILL);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;

    #[test]
    fn terminate_stops_a_running_child() {
        let mut child = Command::new("sh")
            .args(["-c", "sleep 5"])
            .spawn()
            .unwrap();
        let pid = child.id();

        graceful_terminate(pid, Duration::from_secs(2));

        let status = child.wait().unwrap();
        assert!(!status.success());
    }
}
