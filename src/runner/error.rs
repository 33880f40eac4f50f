use std::path::PathBuf;
use thiserror::Error;

use crate::harness::HarnessError;

#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("port {port} still in use after the poll deadline")]
    PortInUse { port: u16 },
    #[error("could not create host directory `{path}`: `{source}`")]
    HostDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("harness error: `{0}`")]
    Harness(#[from] HarnessError),
    #[error("this runner backend does not implement `{0}` yet")]
    NotImplemented(&'static str),
}
