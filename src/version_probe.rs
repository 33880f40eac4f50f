//! One-shot `--version` child invocation (spec §4.G): start the process,
//! wait for exit, and parse the first `key : value` line whose key is
//! `server-version`.

use std::path::Path;
use std::process::Command;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VersionProbeError {
    #[error("could not spawn `{0} --version`: `{1}`")]
    Spawn(String, std::io::Error),
    #[error("no `server-version` line found in `--version` output")]
    VersionNotFound,
}

/// Runs `executable --version`, waits for it to exit, and returns the
/// trimmed value of the first line shaped `server-version : <value>`.
pub fn probe_version(executable: &Path) -> Result<String, VersionProbeError> {
    let output = Command::new(executable)
        .arg("--version")
        .output()
        .map_err(|e| VersionProbeError::Spawn(executable.display().to_string(), e))?;

    let combined = format!(
        "{}\n{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    parse_server_version(&combined).ok_or(VersionProbeError::VersionNotFound)
}

fn parse_server_version(output: &str) -> Option<String> {
    for line in output.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        if key.trim() == "server-version" {
            return Some(value.trim().to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_server_version_line() {
        let output = "some-other-key : 1\nserver-version : 3.11.2\nlicense : community\n";
        assert_eq!(
            parse_server_version(output),
            Some("3.11.2".to_string())
        );
    }

    #[test]
    fn missing_line_yields_none() {
        let output = "license : community\n";
        assert_eq!(parse_server_version(output), None);
    }

    #[test]
    fn probe_version_reports_not_found_for_silent_binary() {
        let result = probe_version(Path::new("/bin/true"));
        assert!(matches!(result, Err(VersionProbeError::VersionNotFound)));
    }

    #[test]
    fn probe_version_parses_fake_binary_output() {
        let script = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(
            script.path(),
            "#!/bin/sh\necho 'server-version : 9.9.9'\n",
        )
        .unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = std::fs::metadata(script.path()).unwrap().permissions();
            perms.set_mode(0o755);
            std::fs::set_permissions(script.path(), perms).unwrap();
        }

        let version = probe_version(script.path()).unwrap();
        assert_eq!(version, "9.9.9");
    }
}
