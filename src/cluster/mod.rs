//! Cluster data model (spec §3): peers, the shared cluster configuration,
//! service mode, and server-type metadata, plus the `ClusterContext`
//! collaborator (spec §4.D) that exposes all of it to the supervisor and
//! HTTP layer.

mod context;
mod peer;
mod server_type;

pub use context::{
    ClusterContext, ClusterContextError, HelloRequestFields, LocalClusterContext, MasterStatus,
    ProbeOutcome, ProbeStatus,
};
#[cfg(test)]
pub use context::MockClusterContext;
pub use peer::{ClusterConfig, Peer};
pub use server_type::{ServerFamily, ServerType, ServiceMode};

/// Default base port a peer's roles are offset from, absent any
/// configuration. Not specified numerically in the source system; chosen to
/// match the well-known default of the product this design is modeled on.
pub const DEFAULT_MASTER_PORT: u16 = 8528;
