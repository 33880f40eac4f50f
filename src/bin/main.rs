//! Entry point: parses CLI flags and the YAML config, wires up the cluster
//! context, process runner and supervisor, starts the peer HTTP server, and
//! blocks until a stop signal (Ctrl-C, SIGTERM, or `/shutdown`) arrives.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use clustermind::cluster::{LocalClusterContext, Peer};
use clustermind::cli::Cli;
use clustermind::config::{ConfigError, StarterConfig};
use clustermind::context::Context;
use clustermind::http;
use clustermind::logging::Logging;
use clustermind::runner::NativeProcessRunner;
use clustermind::supervisor::{LatchingUpgradeManager, Supervisor};

fn main() -> ExitCode {
    let cli = Cli::parse_args();

    if let Err(err) = Logging::try_init(cli.debug_cluster) {
        eprintln!("failed to initialize logging: {err}");
        return ExitCode::FAILURE;
    }

    let config = match StarterConfig::load(&cli) {
        Ok(config) => config,
        Err(err) => {
            report_config_error(&err);
            return ExitCode::FAILURE;
        }
    };

    if cli.print_debug_info {
        println!("{config:#?}");
        return ExitCode::SUCCESS;
    }

    run(config)
}

fn report_config_error(err: &ConfigError) {
    tracing::error!(error = %err, "could not resolve configuration");
}

fn run(config: StarterConfig) -> ExitCode {
    let stop_ctx: Context<bool> = Context::new();

    let own_peer = Peer {
        id: config.id.clone().unwrap_or_else(generate_peer_id),
        address: config.address.clone().expect("StarterConfig::load guarantees an address"),
        port_offset: 0,
        has_agent: config.has_agent,
        has_dbserver: config.has_dbserver,
        has_coordinator: config.has_coordinator,
        has_resilient_single: config.has_resilient_single,
        is_secure: config.secure,
    };

    if let Err(err) = std::fs::create_dir_all(&config.data_dir) {
        tracing::error!(error = %err, dir = %config.data_dir.display(), "could not create data directory");
        return ExitCode::FAILURE;
    }

    let cluster_ctx: Arc<dyn clustermind::cluster::ClusterContext> = Arc::new(LocalClusterContext::new(
        own_peer,
        config.mode,
        config.port,
        config.data_dir.clone(),
        stop_ctx.clone(),
    ));

    let runner = Arc::new(NativeProcessRunner::new());
    let upgrade_mgr = Arc::new(LatchingUpgradeManager::new());

    let supervisor = Arc::new(Supervisor::new(
        Arc::clone(&cluster_ctx),
        runner,
        upgrade_mgr,
        stop_ctx.clone(),
        config.debug_cluster,
        config.database_executable.clone(),
        config.sync_executable.clone(),
        config.log_rotate_files_to_keep,
        config.secure,
    ));

    if let Err(err) = install_signal_handlers(stop_ctx.clone()) {
        tracing::error!(error = %err, "could not install OS signal handlers");
        return ExitCode::FAILURE;
    }

    let bind_ip = config.address_as_ip().unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
    let bind_addr = SocketAddr::new(bind_ip, config.port);

    let http_server = match http::spawn(bind_addr, Arc::clone(&cluster_ctx), Arc::clone(&supervisor)) {
        Ok(server) => server,
        Err(err) => {
            tracing::error!(error = %err, addr = %bind_addr, "could not start peer HTTP server");
            return ExitCode::FAILURE;
        }
    };
    tracing::info!(addr = %bind_addr, "peer HTTP server listening");

    for join in &config.join {
        if let Err(err) = announce_to_peer(join, &bind_addr) {
            tracing::warn!(peer = %join, error = %err, "could not say hello to sibling peer");
        }
    }

    supervisor.run();

    http_server.stop();
    ExitCode::SUCCESS
}

/// Best-effort join announcement: failures are logged, not fatal, since a
/// sibling that is briefly unreachable will converge once it next calls
/// `/hello` itself (spec.md §1 Out of scope: the join client is not part of
/// the core's contract, just its caller-supplied address list).
fn announce_to_peer(address: &str, _own_addr: &SocketAddr) -> Result<(), reqwest::Error> {
    let scheme = if address.contains("://") { "" } else { "http://" };
    let url = format!("{scheme}{address}/hello");
    reqwest::blocking::get(url)?.error_for_status()?;
    Ok(())
}

fn install_signal_handlers(stop_ctx: Context<bool>) -> Result<(), ctrlc::Error> {
    ctrlc::set_handler(move || {
        tracing::info!("received termination signal, shutting down");
        let _ = stop_ctx.cancel_all(true);
    })
}

fn generate_peer_id() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let host = nix::unistd::gethostname()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "peer".to_string());
    format!("{host}-{}-{nanos:x}", std::process::id())
}
