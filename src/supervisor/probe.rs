use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::Arc;
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

use crate::cluster::{ClusterContext, ProbeOutcome, ProbeStatus, ServerType};
use crate::context::Context;

/// Serializes the two-line browser/shell banners printed for user-facing
/// roles (spec §4.C "Mutex-serialize these multi-line banners").
static BANNER_LOCK: Mutex<()> = Mutex::new(());

const INITIAL_SHOW_LOG_DURATION: Duration = Duration::from_secs(60);
const SHOW_LOG_DURATION_STEP: Duration = Duration::from_secs(30);

/// Deadline for the readiness probe run against a freshly started instance
/// (spec §5 Timeouts).
pub const READINESS_PROBE_DEADLINE: Duration = Duration::from_secs(5 * 60);

/// Deadline for the short validation probe run against an adopted,
/// already-running instance (spec §4.C `startServer` recovery path).
pub const ADOPTION_PROBE_DEADLINE: Duration = Duration::from_secs(10);

/// Whether `server_type` gets the two-line browser/shell banner once it is
/// confirmed up and in the correct role (spec §4.C: "coordinator that is
/// not a local slave, single, resilient-single leader"; local-slave and
/// leader distinctions require agency/master-election state this crate
/// does not model, so every coordinator/single/resilient-single is treated
/// as user-facing here).
fn is_user_facing(server_type: ServerType) -> bool {
    matches!(
        server_type,
        ServerType::Coordinator | ServerType::Single | ServerType::ResilientSingle
    )
}

fn print_banner(server_type: ServerType, address: &str, port: u16, is_secure: bool) {
    let scheme = if is_secure { "https" } else { "http" };
    let _guard = BANNER_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    println!("{server_type} up and running, available via:");
    println!("  browser: {scheme}://{address}:{port}");
    println!("  shell:   arangosh --server.endpoint {scheme}://{address}:{port}");
}

fn print_sync_master_banner(address: &str, port: u16, is_secure: bool) {
    let scheme = if is_secure { "https" } else { "http" };
    let _guard = BANNER_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    println!("syncMaster up and running, available via: {scheme}://{address}:{port}");
}

/// Reads the role's host log and renders the last 20 lines wrapped between
/// start/end markers, each indented by one tab; a missing file renders as an
/// empty body rather than erroring.
pub fn recent_log_lines(log_path: &std::path::Path, server_type: ServerType) -> String {
    let body = std::fs::read_to_string(log_path)
        .map(|content| {
            content
                .lines()
                .rev()
                .take(20)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .map(|line| format!("\t{line}"))
                .collect::<Vec<_>>()
                .join("\n")
        })
        .unwrap_or_default();
    format!("## Start of {server_type} log\n{body}\n## End of {server_type} log")
}

fn dump_log_tail(log_path: &std::path::Path, server_type: ServerType) {
    tracing::warn!("{}", recent_log_lines(log_path, server_type));
}

fn log_transition(server_type: ServerType, status: &ProbeStatus, debug_cluster: bool) {
    if debug_cluster {
        tracing::info!(role = %server_type, up = status.up, correct_role = status.correct_role, "{}", status.message);
    } else {
        tracing::debug!(role = %server_type, up = status.up, correct_role = status.correct_role, "{}", status.message);
    }
}

/// Runs the probe goroutine for one live instance (spec §4.C "Probe
/// goroutine"): polls `Context.TestInstance`, logs every status
/// transition, escalates to a log dump if status stalls, and on success
/// prints the user-facing banner and clears the recovery file.
pub fn run_probe(
    ctx: &Arc<dyn ClusterContext>,
    cancel: &Context<bool>,
    server_type: ServerType,
    address: String,
    port: u16,
    is_secure: bool,
    debug_cluster: bool,
    log_path: PathBuf,
    deadline: Duration,
) -> ProbeOutcome {
    let (tx, rx) = mpsc::channel();
    let probe_ctx = Arc::clone(ctx);
    let probe_cancel = cancel.clone();
    let probe_address = address.clone();

    let handle = thread::spawn(move || {
        probe_ctx.test_instance(&probe_cancel, server_type, &probe_address, port, deadline, tx)
    });

    let start = Instant::now();
    let mut show_log_duration = INITIAL_SHOW_LOG_DURATION;
    let mut prev_status: Option<ProbeStatus> = None;
    let mut trail: Vec<ProbeStatus> = Vec::new();

    for status in rx {
        if prev_status.as_ref() != Some(&status) {
            log_transition(server_type, &status, debug_cluster);
        }
        trail.push(status.clone());
        prev_status = Some(status);

        if start.elapsed() > show_log_duration {
            dump_log_tail(&log_path, server_type);
            show_log_duration += SHOW_LOG_DURATION_STEP;
        }
    }

    let outcome = handle.join().unwrap_or(ProbeOutcome::Cancelled);
    match outcome {
        ProbeOutcome::UpAndCorrectRole => {
            tracing::info!(role = %server_type, "ready");
            if is_user_facing(server_type) {
                print_banner(server_type, &address, port, is_secure);
            } else if server_type == ServerType::SyncMaster {
                print_sync_master_banner(&address, port, is_secure);
            }
            ctx.remove_recovery_file();
        }
        ProbeOutcome::UpWrongRole | ProbeOutcome::TimedOut => {
            tracing::warn!(role = %server_type, trail = ?trail, "{outcome:?}");
        }
        ProbeOutcome::Cancelled => {}
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_facing_roles_match_spec() {
        assert!(is_user_facing(ServerType::Coordinator));
        assert!(is_user_facing(ServerType::Single));
        assert!(is_user_facing(ServerType::ResilientSingle));
        assert!(!is_user_facing(ServerType::Agent));
        assert!(!is_user_facing(ServerType::SyncMaster));
    }

    #[test]
    fn recent_log_lines_wraps_with_markers_and_tolerates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("log");
        let rendered = recent_log_lines(&missing, ServerType::Agent);
        assert!(rendered.starts_with("## Start of agent log\n"));
        assert!(rendered.ends_with("## End of agent log"));

        std::fs::write(&missing, "a\nb\nc\n").unwrap();
        let rendered = recent_log_lines(&missing, ServerType::Agent);
        assert!(rendered.contains("\ta\n\tb\n\tc"));
    }
}
