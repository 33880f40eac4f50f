use thiserror::Error;
use tracing::Level;
use tracing::metadata::LevelFilter;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::PrettyFields;

#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("init logging error: `{0}`")]
    TryInitError(String),
}

pub struct Logging;

impl Logging {
    /// Installs the global `tracing` subscriber. `debug_cluster` lowers the
    /// default directive from `info` to `debug` for in-process status-change
    /// chatter (see `supervisor::probe`), matching the starter's
    /// `--debugCluster` verbosity toggle.
    pub fn try_init(debug_cluster: bool) -> Result<(), LoggingError> {
        let default_level = if debug_cluster {
            Level::DEBUG
        } else {
            Level::INFO
        };

        tracing_subscriber::fmt()
            .with_max_level(default_level)
            .with_env_filter(
                EnvFilter::builder()
                    .with_default_directive(LevelFilter::from_level(default_level).into())
                    .from_env_lossy(),
            )
            .fmt_fields(PrettyFields::new())
            .try_init()
            .map_err(|_| {
                LoggingError::TryInitError("unable to set global logging subscriber".to_string())
            })
    }
}
