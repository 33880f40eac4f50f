use thiserror::Error;

use crate::cluster::{ClusterContextError, ServerType};
use crate::runner::RunnerError;

#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("{0} port still in use after the poll deadline")]
    PortInUse(ServerType),
    #[error("runner error starting {role}: `{source}`")]
    Runner {
        role: ServerType,
        #[source]
        source: RunnerError,
    },
    #[error("cluster context error: `{0}`")]
    ClusterContext(#[from] ClusterContextError),
    #[error("io error: `{0}`")]
    Io(#[from] std::io::Error),
}
