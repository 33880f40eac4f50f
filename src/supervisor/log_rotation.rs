use std::fs;
use std::path::{Path, PathBuf};

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;

use crate::supervisor::error::SupervisorError;

/// Rotates `log_path`'s numbered backups (spec §4.C.iv `rotateLogFile`):
/// for `i` from `files_to_keep` down to `0`, delete the oldest and shift
/// everything else up by one, then HUP `pid` so it reopens the base file.
/// Takes a raw pid rather than a `ProcessHandle` since rotation is
/// triggered from outside the thread that owns the role's handle.
pub fn rotate_log_file(log_path: &Path, files_to_keep: u32, pid: u32) -> Result<(), SupervisorError> {
    for i in (0..=files_to_keep).rev() {
        let current = numbered_path(log_path, i);
        if i == files_to_keep {
            if current.exists() {
                fs::remove_file(&current)?;
            }
        } else {
            let next = numbered_path(log_path, i + 1);
            if current.exists() {
                fs::rename(&current, &next)?;
            }
        }
    }

    let _ = signal::kill(Pid::from_raw(pid as i32), Signal::SIGHUP);
    Ok(())
}

fn numbered_path(log_path: &Path, i: u32) -> PathBuf {
    if i == 0 {
        log_path.to_path_buf()
    } else {
        let mut name = log_path.as_os_str().to_os_string();
        name.push(format!(".{i}"));
        PathBuf::from(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A real child process so the HUP send has a live pid to target;
    /// rotation must not error even though nothing observes the signal.
    fn running_child() -> std::process::Child {
        std::process::Command::new("sh")
            .args(["-c", "sleep 2"])
            .spawn()
            .unwrap()
    }

    #[test]
    fn rotation_shifts_files_and_deletes_oldest() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("log");
        fs::write(&log, "current").unwrap();
        fs::write(numbered_path(&log, 1), "one").unwrap();
        fs::write(numbered_path(&log, 2), "two").unwrap();

        let mut child = running_child();
        rotate_log_file(&log, 2, child.id()).unwrap();

        assert!(!log.exists());
        assert_eq!(fs::read_to_string(numbered_path(&log, 1)).unwrap(), "current");
        assert_eq!(fs::read_to_string(numbered_path(&log, 2)).unwrap(), "one");
        let _ = child.kill();
    }

    #[test]
    fn missing_backups_are_skipped_without_error() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("log");
        fs::write(&log, "current").unwrap();

        let mut child = running_child();
        rotate_log_file(&log, 2, child.id()).unwrap();

        assert!(!log.exists());
        assert_eq!(fs::read_to_string(numbered_path(&log, 1)).unwrap(), "current");
        let _ = child.kill();
    }
}
