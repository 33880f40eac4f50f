use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::cluster::{ClusterContext, ServerFamily, ServerType, ServiceMode};
use crate::context::Context;
use crate::runner::{ProcessRunner, StartRequest, Volume};
use crate::supervisor::error::SupervisorError;
use crate::supervisor::failure::{FailureCounter, FailureOutcome};
use crate::supervisor::log_rotation::rotate_log_file;
use crate::supervisor::probe::{run_probe, ADOPTION_PROBE_DEADLINE, READINESS_PROBE_DEADLINE};
use crate::supervisor::slot::{Slot, SlotInfo};
use crate::supervisor::terminator::graceful_terminate;
use crate::supervisor::upgrade::UpgradeManager;

const GRACEFUL_SHUTDOWN_DEADLINE: Duration = Duration::from_secs(60);
const PRE_AGENT_SHUTDOWN_PAUSE: Duration = Duration::from_secs(3);
const SIBLING_STARTUP_PAUSE: Duration = Duration::from_secs(1);
const PORT_RETRY_PAUSE: Duration = Duration::from_secs(1);
const PORT_FREE_POLL_DEADLINE: Duration = Duration::from_secs(3);

/// The roles torn down before the agency, in the fixed order spec §4.C's
/// top-level `Run` requires; agent and resilient-single are handled
/// separately since only one of them applies to a given mode.
const PRE_AGENT_SHUTDOWN_ORDER: [ServerType; 4] = [
    ServerType::SyncWorker,
    ServerType::SyncMaster,
    ServerType::Single,
    ServerType::Coordinator,
];

/// Owns one role's supervised run-loop plus the process-wide roster of
/// slots, and drives the top-level `Run`/`RestartServer` lifecycle (spec
/// §4.C).
pub struct Supervisor {
    cluster_ctx: Arc<dyn ClusterContext>,
    runner: Arc<dyn ProcessRunner>,
    upgrade_mgr: Arc<dyn UpgradeManager>,
    slots: std::collections::HashMap<ServerType, Arc<Slot>>,
    stop_ctx: Context<bool>,
    debug_cluster: bool,
    database_executable: PathBuf,
    sync_executable: PathBuf,
    log_rotate_files_to_keep: u32,
    is_secure: bool,
}

impl Supervisor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        cluster_ctx: Arc<dyn ClusterContext>,
        runner: Arc<dyn ProcessRunner>,
        upgrade_mgr: Arc<dyn UpgradeManager>,
        stop_ctx: Context<bool>,
        debug_cluster: bool,
        database_executable: PathBuf,
        sync_executable: PathBuf,
        log_rotate_files_to_keep: u32,
        is_secure: bool,
    ) -> Self {
        let slots = [
            ServerType::Agent,
            ServerType::DbServer,
            ServerType::Coordinator,
            ServerType::Single,
            ServerType::ResilientSingle,
            ServerType::SyncMaster,
            ServerType::SyncWorker,
        ]
        .into_iter()
        .map(|role| (role, Arc::new(Slot::new())))
        .collect();

        Self {
            cluster_ctx,
            runner,
            upgrade_mgr,
            slots,
            stop_ctx,
            debug_cluster,
            database_executable,
            sync_executable,
            log_rotate_files_to_keep,
            is_secure,
        }
    }

    pub fn slot(&self, role: ServerType) -> Option<&Arc<Slot>> {
        self.slots.get(&role)
    }

    /// The roles this peer is currently configured to host, i.e. the
    /// expected-count denominator for `/process`'s `ServersStarted` (spec
    /// §4.E).
    pub fn hosted_roles(&self) -> Vec<ServerType> {
        self.roles_to_start()
    }

    /// Rotates `role`'s log file and sends it HUP to reopen (spec §4.C.iv
    /// `rotateLogFile`). A no-op if the role has no live process.
    pub fn rotate_log(&self, role: ServerType) -> Result<(), SupervisorError> {
        let Some(pid) = self.slots.get(&role).and_then(|s| s.process_id()) else {
            return Ok(());
        };
        let log_path = self.cluster_ctx.server_host_log_file(role);
        rotate_log_file(&log_path, self.log_rotate_files_to_keep, pid)
    }

    fn executable_for(&self, server_type: ServerType) -> PathBuf {
        match server_type.family() {
            ServerFamily::Database => self.database_executable.clone(),
            ServerFamily::Sync => self.sync_executable.clone(),
        }
    }

    /// Which roles this peer hosts under the configured mode (spec §4.C
    /// top-level `Run`: "cluster mode starts agent (if hosted), dbserver
    /// (unless explicitly disabled), coordinator, sync master and sync
    /// worker...; active-failover...agent (if hosted) and resilient
    /// single; single mode starts single").
    fn roles_to_start(&self) -> Vec<ServerType> {
        let (_, own_peer, mode) = self.cluster_ctx.cluster_config();
        let Some(peer) = own_peer else {
            return Vec::new();
        };

        match mode {
            ServiceMode::Cluster => {
                let mut roles = Vec::new();
                if peer.has_agent {
                    roles.push(ServerType::Agent);
                }
                if peer.has_dbserver {
                    roles.push(ServerType::DbServer);
                }
                if peer.has_coordinator {
                    roles.push(ServerType::Coordinator);
                }
                roles.push(ServerType::SyncMaster);
                roles.push(ServerType::SyncWorker);
                roles
            }
            ServiceMode::ActiveFailover => {
                let mut roles = Vec::new();
                if peer.has_agent {
                    roles.push(ServerType::Agent);
                }
                roles.push(ServerType::ResilientSingle);
                roles
            }
            ServiceMode::Single => vec![ServerType::Single],
        }
    }

    /// Builds the argv for one invocation of `server_type`. Full
    /// `bootstrapConfig`/`databaseFeatures` templating is out of scope
    /// (SPEC_FULL §1); this emits what the core must pass for the server
    /// to bind the right endpoint and find its data directory, plus the
    /// latched auto-upgrade flag for exactly this one start (spec §4.C
    /// `startServer` step 6).
    fn build_args(
        &self,
        server_type: ServerType,
        address: &str,
        port: u16,
        container_dir: &std::path::Path,
        auto_upgrade: bool,
    ) -> Vec<String> {
        let scheme = if self.is_secure { "ssl" } else { "tcp" };
        let mut args = vec![
            format!("--server.endpoint={scheme}://{address}:{port}"),
            format!("--database.directory={}", container_dir.join("data").display()),
            format!("--javascript.app-path={}", container_dir.join("apps").display()),
            format!("--cluster.my-role={server_type}"),
        ];
        if auto_upgrade {
            args.push("--database.auto-upgrade=true".to_string());
        }
        args
    }

    /// Start-one (spec §4.C `startServer`): resolves this role's port and
    /// directories, tries to adopt an already-running instance, otherwise
    /// confirms the port is free and asks the Runner to start a fresh one.
    /// Returns `(handle, restart)` on success.
    fn start_server(&self, role: ServerType, restart: u32) -> Result<(Box<dyn crate::runner::ProcessHandle>, u32), SupervisorError> {
        let port = self.cluster_ctx.server_port(role);
        let host_dir = self.cluster_ctx.server_host_dir(role);
        let container_dir = self.cluster_ctx.server_container_dir(role);
        let host_log_file = self.cluster_ctx.server_host_log_file(role);

        std::fs::create_dir_all(host_dir.join("data"))?;
        std::fs::create_dir_all(host_dir.join("apps"))?;

        if let Some(mut handle) = self.runner.get_running_server(&host_dir) {
            let address = self
                .cluster_ctx
                .cluster_config()
                .1
                .map(|p| p.address)
                .unwrap_or_else(|| "127.0.0.1".to_string());
            // The receiver is dropped immediately; `test_instance` ignores
            // send failures, and an unbounded mpsc channel never blocks the
            // sender regardless.
            let (tx, _rx) = std::sync::mpsc::channel();
            let outcome = self.cluster_ctx.test_instance(
                &self.stop_ctx,
                role,
                &address,
                port,
                ADOPTION_PROBE_DEADLINE,
                tx,
            );
            if outcome == crate::cluster::ProbeOutcome::UpAndCorrectRole {
                return Ok((handle, restart));
            }
            let _ = handle.terminate();
        }

        let deadline = Instant::now() + PORT_FREE_POLL_DEADLINE;
        loop {
            if std::net::TcpListener::bind(("0.0.0.0", port)).is_ok() {
                break;
            }
            if Instant::now() >= deadline {
                return Err(SupervisorError::PortInUse(role));
            }
            thread::sleep(Duration::from_millis(100));
        }

        let auto_upgrade = self.upgrade_mgr.take_auto_upgrade(role);
        let executable = self.executable_for(role);
        let args = self.build_args(role, "0.0.0.0", port, &container_dir, auto_upgrade);
        let own_peer = self.cluster_ctx.cluster_config().1;
        let (peer_id, own_address) = own_peer
            .map(|p| (p.id, p.address))
            .unwrap_or_else(|| ("unknown".to_string(), "0.0.0.0".to_string()));
        // spec §4.C container naming: `<serverType>-<peerID>-<restart>-<address>-<port>`.
        let container_name = format!("{role}-{peer_id}-{restart}-{own_address}-{port}");

        let request = StartRequest {
            server_type: role,
            executable,
            args,
            volumes: vec![Volume {
                host_path: host_dir.clone(),
                container_path: container_dir,
            }],
            ports: vec![port],
            container_name,
            host_dir,
            log_file: host_log_file,
        };

        let handle = self
            .runner
            .start(&self.stop_ctx, request)
            .map_err(|source| SupervisorError::Runner { role, source })?;
        if auto_upgrade {
            self.upgrade_mgr.notify_upgrade_consumed(role);
        }
        Ok((handle, restart))
    }

    /// Run-loop (spec §4.C `runServer`): restarts `role` forever, tracking
    /// failure history, until the global stop flag is set or the failure
    /// count escalates to give-up. An exit the Upgrade Manager reports as
    /// an in-progress upgrade is excused from failure accounting entirely.
    fn run_server(&self, role: ServerType) {
        let slot = self.slots[&role].clone();
        let mut failures = FailureCounter::new();
        let mut restart: u32 = 0;

        loop {
            if self.stop_ctx.is_cancelled() {
                break;
            }

            let (mut handle, used_restart) = match self.start_server(role, restart) {
                Ok(pair) => pair,
                Err(SupervisorError::PortInUse(_)) => {
                    thread::sleep(PORT_RETRY_PAUSE);
                    continue;
                }
                Err(err) => {
                    tracing::error!(role = %role, error = %err, "giving up on role");
                    break;
                }
            };

            slot.set(SlotInfo::from_handle(handle.as_ref()));

            let address = self
                .cluster_ctx
                .cluster_config()
                .1
                .map(|p| p.address)
                .unwrap_or_else(|| "127.0.0.1".to_string());
            let port = self.cluster_ctx.server_port(role);
            let log_path = self.cluster_ctx.server_host_log_file(role);
            let probe_ctx = Arc::clone(&self.cluster_ctx);
            let probe_cancel = self.stop_ctx.clone();
            let debug_cluster = self.debug_cluster;
            let is_secure = self.is_secure;
            thread::spawn(move || {
                run_probe(
                    &probe_ctx,
                    &probe_cancel,
                    role,
                    address,
                    port,
                    is_secure,
                    debug_cluster,
                    log_path,
                    READINESS_PROBE_DEADLINE,
                )
            });

            let started = Instant::now();
            let _ = handle.wait();
            slot.clear();
            let uptime = started.elapsed();

            if self.stop_ctx.is_cancelled() {
                break;
            }

            if self.upgrade_mgr.upgrade_in_progress(role) {
                tracing::info!(role = %role, uptime_secs = uptime.as_secs(), "exit was an expected auto-upgrade restart");
                restart = used_restart + 1;
                continue;
            }

            match failures.record_exit(uptime) {
                FailureOutcome::Reset | FailureOutcome::Counted { .. } => {}
                FailureOutcome::ShouldDumpLog { recent_failures } => {
                    tracing::warn!(
                        role = %role,
                        recent_failures,
                        "{}",
                        crate::supervisor::probe::recent_log_lines(&self.cluster_ctx.server_host_log_file(role), role)
                    );
                }
                FailureOutcome::ShouldGiveUp { recent_failures } => {
                    tracing::error!(role = %role, recent_failures, "too many fast failures, giving up");
                    self.cluster_ctx.stop();
                    break;
                }
            }

            restart = used_restart + 1;
        }
    }

    /// `RestartServer(role)` (spec §4.C): graceful terminate with a
    /// 1-minute deadline on the named slot; the run-loop naturally
    /// restarts it.
    pub fn restart_server(&self, role: ServerType) {
        if let Some(pid) = self.slots.get(&role).and_then(|s| s.process_id()) {
            graceful_terminate(pid, GRACEFUL_SHUTDOWN_DEADLINE);
        }
    }

    fn wait_for_slot_to_clear(&self, role: ServerType, deadline: Duration) {
        let Some(slot) = self.slots.get(&role) else { return };
        let end = Instant::now() + deadline;
        while slot.is_live() && Instant::now() < end {
            thread::sleep(Duration::from_millis(100));
        }
    }

    fn shutdown(&self) {
        for &role in &PRE_AGENT_SHUTDOWN_ORDER {
            self.restart_server(role);
            self.wait_for_slot_to_clear(role, GRACEFUL_SHUTDOWN_DEADLINE);
        }
        thread::sleep(PRE_AGENT_SHUTDOWN_PAUSE);
        for role in [ServerType::DbServer, ServerType::Agent, ServerType::ResilientSingle] {
            self.restart_server(role);
            self.wait_for_slot_to_clear(role, GRACEFUL_SHUTDOWN_DEADLINE);
        }
        let _ = self.runner.cleanup();
    }

    /// Top-level `Run` (spec §4.C): starts every role this peer hosts on
    /// its own thread, blocks until cancellation, then tears down in the
    /// fixed order.
    pub fn run(self: &Arc<Self>) {
        let roles = self.roles_to_start();
        let mut handles = Vec::new();
        for role in roles {
            let supervisor = Arc::clone(self);
            handles.push(thread::spawn(move || supervisor.run_server(role)));
            if matches!(role, ServerType::Agent | ServerType::DbServer) {
                thread::sleep(SIBLING_STARTUP_PAUSE);
            }
        }

        self.stop_ctx.block_until_cancelled();
        self.shutdown();

        for handle in handles {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{MockClusterContext, Peer};
    use crate::runner::MockProcessRunner;

    fn peer() -> Peer {
        Peer {
            id: "peer-a".to_string(),
            address: "10.0.0.1".to_string(),
            port_offset: 0,
            has_agent: false,
            has_dbserver: true,
            has_coordinator: true,
            has_resilient_single: false,
            is_secure: false,
        }
    }

    #[test]
    fn roles_to_start_reflects_mode_and_peer_flags() {
        let mut cluster_ctx = MockClusterContext::new();
        cluster_ctx
            .expect_cluster_config()
            .returning(|| (crate::cluster::ClusterConfig::new(8528), Some(peer()), ServiceMode::Cluster));

        let supervisor = Supervisor::new(
            Arc::new(cluster_ctx),
            Arc::new(MockProcessRunner::new()),
            Arc::new(crate::supervisor::LatchingUpgradeManager::new()),
            Context::new(),
            false,
            PathBuf::from("/usr/sbin/arangod"),
            PathBuf::from("/usr/sbin/arangosync"),
            5,
            false,
        );

        let roles = supervisor.roles_to_start();
        assert!(roles.contains(&ServerType::DbServer));
        assert!(roles.contains(&ServerType::Coordinator));
        assert!(!roles.contains(&ServerType::Agent));
    }

    #[test]
    fn roles_to_start_is_empty_without_an_own_peer() {
        let mut cluster_ctx = MockClusterContext::new();
        cluster_ctx
            .expect_cluster_config()
            .returning(|| (crate::cluster::ClusterConfig::new(8528), None, ServiceMode::Single));

        let supervisor = Supervisor::new(
            Arc::new(cluster_ctx),
            Arc::new(MockProcessRunner::new()),
            Arc::new(crate::supervisor::LatchingUpgradeManager::new()),
            Context::new(),
            false,
            PathBuf::from("/usr/sbin/arangod"),
            PathBuf::from("/usr/sbin/arangosync"),
            5,
            false,
        );

        assert!(supervisor.roles_to_start().is_empty());
    }

    fn supervisor_with(
        cluster_ctx: MockClusterContext,
        runner: MockProcessRunner,
        upgrade_mgr: Arc<dyn UpgradeManager>,
    ) -> Supervisor {
        Supervisor::new(
            Arc::new(cluster_ctx),
            Arc::new(runner),
            upgrade_mgr,
            Context::new(),
            false,
            PathBuf::from("/usr/sbin/arangod"),
            PathBuf::from("/usr/sbin/arangosync"),
            5,
            false,
        )
    }

    #[test]
    fn build_args_appends_auto_upgrade_flag_only_when_latched() {
        let supervisor = supervisor_with(
            MockClusterContext::new(),
            MockProcessRunner::new(),
            Arc::new(crate::supervisor::LatchingUpgradeManager::new()),
        );

        let plain = supervisor.build_args(ServerType::DbServer, "0.0.0.0", 8629, std::path::Path::new("/data"), false);
        assert!(!plain.iter().any(|a| a.contains("auto-upgrade")));

        let upgrading = supervisor.build_args(ServerType::DbServer, "0.0.0.0", 8629, std::path::Path::new("/data"), true);
        assert!(upgrading.iter().any(|a| a == "--database.auto-upgrade=true"));
    }

    #[test]
    fn latched_upgrade_marks_the_exit_as_in_progress_once() {
        let upgrade_mgr = Arc::new(crate::supervisor::LatchingUpgradeManager::new());
        upgrade_mgr.latch(ServerType::DbServer);

        assert!(upgrade_mgr.take_auto_upgrade(ServerType::DbServer));
        assert!(upgrade_mgr.upgrade_in_progress(ServerType::DbServer));
        assert!(!upgrade_mgr.upgrade_in_progress(ServerType::DbServer));
        assert!(!upgrade_mgr.take_auto_upgrade(ServerType::DbServer));
    }
}
