use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cli::{Cli, ServiceModeArg};
use crate::cluster::ServiceMode;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: `{source}`")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not parse config file `{path}`: `{source}`")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("own address is required (pass --address or set `address` in the config file)")]
    MissingAddress,
}

/// TLS material for the peer HTTP server. Loading real certificates from
/// disk is in scope; *generating* them is out of scope (§1 Out of scope).
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
pub struct TlsConfig {
    pub cert_file: PathBuf,
    pub key_file: PathBuf,
}

/// Deployment-wide configuration for a single peer, loaded from YAML and
/// overlaid with CLI flags, mirroring `SuperAgentConfigStoreFile::load`'s
/// file-then-CLI precedence in the teacher.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct StarterConfig {
    pub id: Option<String>,
    pub address: Option<String>,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub mode: ServiceMode,
    #[serde(default)]
    pub data_dir: PathBuf,
    #[serde(default)]
    pub join: Vec<String>,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub tls: Option<TlsConfig>,
    #[serde(default)]
    pub debug_cluster: bool,
    #[serde(default = "default_true")]
    pub has_dbserver: bool,
    #[serde(default = "default_true")]
    pub has_coordinator: bool,
    #[serde(default)]
    pub has_agent: bool,
    #[serde(default)]
    pub has_resilient_single: bool,
    #[serde(default = "default_database_executable")]
    pub database_executable: PathBuf,
    #[serde(default = "default_sync_executable")]
    pub sync_executable: PathBuf,
    /// Not numerically specified in spec.md; decided and documented in
    /// DESIGN.md.
    #[serde(default = "default_log_rotate_files_to_keep")]
    pub log_rotate_files_to_keep: u32,
}

fn default_database_executable() -> PathBuf {
    PathBuf::from("/usr/sbin/arangod")
}

fn default_sync_executable() -> PathBuf {
    PathBuf::from("/usr/sbin/arangosync")
}

fn default_log_rotate_files_to_keep() -> u32 {
    5
}

fn default_port() -> u16 {
    crate::cluster::DEFAULT_MASTER_PORT
}

fn default_true() -> bool {
    true
}

impl Default for StarterConfig {
    fn default() -> Self {
        Self {
            id: None,
            address: None,
            port: default_port(),
            mode: ServiceMode::default(),
            data_dir: PathBuf::from("."),
            join: Vec::new(),
            secure: false,
            tls: None,
            debug_cluster: false,
            has_dbserver: true,
            has_coordinator: true,
            has_agent: false,
            has_resilient_single: false,
            database_executable: default_database_executable(),
            sync_executable: default_sync_executable(),
            log_rotate_files_to_keep: default_log_rotate_files_to_keep(),
        }
    }
}

impl StarterConfig {
    /// Loads a config file if present (a missing file is not an error — an
    /// all-CLI invocation is valid), then overlays CLI flags on top.
    pub fn load(cli: &Cli) -> Result<Self, ConfigError> {
        let path = cli.config_path();
        let mut config = Self::from_file_if_present(&path)?;
        config.overlay_cli(cli);

        if config.address.is_none() {
            return Err(ConfigError::MissingAddress);
        }
        Ok(config)
    }

    fn from_file_if_present(path: &Path) -> Result<Self, ConfigError> {
        match fs::read_to_string(path) {
            Ok(contents) => {
                serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse {
                    path: path.to_path_buf(),
                    source,
                })
            }
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    fn overlay_cli(&mut self, cli: &Cli) {
        if let Some(id) = &cli.id {
            self.id = Some(id.clone());
        }
        if let Some(address) = &cli.address {
            self.address = Some(address.clone());
        }
        if let Some(port) = cli.port {
            self.port = port;
        }
        if let Some(data_dir) = &cli.data_dir {
            self.data_dir = data_dir.clone();
        }
        if let Some(mode) = cli.mode {
            self.mode = mode.into();
        }
        if !cli.join.is_empty() {
            self.join = cli.join.clone();
        }
        self.secure |= cli.secure;
        self.debug_cluster |= cli.debug_cluster;
    }

    /// Resolves `address` to an [`IpAddr`] when it already is one; starter
    /// addresses are frequently hostnames, in which case `None` is returned
    /// and the caller should bind against "0.0.0.0" instead.
    pub fn address_as_ip(&self) -> Option<IpAddr> {
        self.address.as_ref().and_then(|a| a.parse().ok())
    }
}

impl From<ServiceModeArg> for ServiceMode {
    fn from(value: ServiceModeArg) -> Self {
        match value {
            ServiceModeArg::Single => ServiceMode::Single,
            ServiceModeArg::ActiveFailover => ServiceMode::ActiveFailover,
            ServiceModeArg::Cluster => ServiceMode::Cluster,
        }
    }
}
