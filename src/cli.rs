use std::path::PathBuf;

use clap::Parser;

/// Command line interface for the `clustermind` peer supervisor.
///
/// Values here override whatever is present in the config file loaded from
/// `--config`; see [`crate::config::StarterConfig`].
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the YAML deployment config file.
    #[arg(long, default_value_t = String::from("/etc/clustermind/config.yaml"))]
    pub config: String,

    /// Root directory under which per-role `hostDir`s are created.
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// This peer's own id. Generated if omitted.
    #[arg(long)]
    pub id: Option<String>,

    /// Address other peers should use to reach this one.
    #[arg(long)]
    pub address: Option<String>,

    /// Base port; per-role ports are derived as `master_port + port_offset`.
    #[arg(long)]
    pub port: Option<u16>,

    /// Deployment mode: single, active-failover, or cluster.
    #[arg(long, value_enum)]
    pub mode: Option<ServiceModeArg>,

    /// Addresses of sibling peers to say hello to at startup.
    #[arg(long = "join")]
    pub join: Vec<String>,

    /// Enable TLS on the peer HTTP server and advertised endpoints.
    #[arg(long)]
    pub secure: bool,

    /// Raise in-process status-change logging from debug to info.
    #[arg(long)]
    pub debug_cluster: bool,

    /// Print the parsed configuration and exit without starting anything.
    #[arg(long)]
    pub print_debug_info: bool,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, clap::ValueEnum)]
pub enum ServiceModeArg {
    Single,
    ActiveFailover,
    Cluster,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    pub fn config_path(&self) -> PathBuf {
        PathBuf::from(&self.config)
    }
}
