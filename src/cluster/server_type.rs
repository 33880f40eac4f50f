use serde::{Deserialize, Serialize};

/// Which process family a [`ServerType`] belongs to — used to decide
/// shutdown ordering and which executable/arg-building path applies.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ServerFamily {
    Database,
    Sync,
}

/// One of the roles a peer can host (spec §3 `ServerType`).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ServerType {
    Agent,
    DbServer,
    Coordinator,
    Single,
    ResilientSingle,
    SyncMaster,
    SyncWorker,
}

impl ServerType {
    pub fn family(self) -> ServerFamily {
        match self {
            ServerType::SyncMaster | ServerType::SyncWorker => ServerFamily::Sync,
            _ => ServerFamily::Database,
        }
    }

    /// Fixed port offset relative to a peer's base port. Not numerically
    /// specified in spec.md; the values here keep every role's port on a
    /// distinct, densely packed offset, matching how port-offset tables are
    /// laid out in the systems this design is modeled on (decided open
    /// question, see DESIGN.md).
    pub fn port_offset(self) -> u16 {
        match self {
            ServerType::Agent => 1,
            ServerType::DbServer => 2,
            ServerType::Coordinator => 3,
            ServerType::Single => 4,
            ServerType::ResilientSingle => 5,
            ServerType::SyncMaster => 6,
            ServerType::SyncWorker => 7,
        }
    }

    /// The roles expected to run under each [`ServiceMode`], used both to
    /// decide what `Run` starts and what the version/role probe treats as
    /// "correct role" for this server type.
    pub fn expected_for_mode(mode: ServiceMode) -> &'static [ServerType] {
        match mode {
            ServiceMode::Single => &[ServerType::Single],
            ServiceMode::ActiveFailover => &[ServerType::Agent, ServerType::ResilientSingle],
            ServiceMode::Cluster => &[
                ServerType::Agent,
                ServerType::DbServer,
                ServerType::Coordinator,
                ServerType::SyncMaster,
                ServerType::SyncWorker,
            ],
        }
    }

    /// Lowercase wire/log name, e.g. for `/logs/{role}` and container names.
    pub fn as_str(self) -> &'static str {
        match self {
            ServerType::Agent => "agent",
            ServerType::DbServer => "dbserver",
            ServerType::Coordinator => "coordinator",
            ServerType::Single => "single",
            ServerType::ResilientSingle => "resilientSingle",
            ServerType::SyncMaster => "syncMaster",
            ServerType::SyncWorker => "syncWorker",
        }
    }
}

impl std::fmt::Display for ServerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deployment mode (spec §3 `ServiceMode`): determines which roles a peer
/// runs and how many servers count as "all started".
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ServiceMode {
    #[default]
    Single,
    ActiveFailover,
    Cluster,
}

impl ServiceMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ServiceMode::Single => "single",
            ServiceMode::ActiveFailover => "activeFailover",
            ServiceMode::Cluster => "cluster",
        }
    }
}

impl std::fmt::Display for ServiceMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_offsets_are_distinct() {
        let all = [
            ServerType::Agent,
            ServerType::DbServer,
            ServerType::Coordinator,
            ServerType::Single,
            ServerType::ResilientSingle,
            ServerType::SyncMaster,
            ServerType::SyncWorker,
        ];
        let mut offsets: Vec<u16> = all.iter().map(|s| s.port_offset()).collect();
        offsets.sort_unstable();
        offsets.dedup();
        assert_eq!(offsets.len(), all.len());
    }

    #[test]
    fn sync_roles_are_sync_family() {
        assert_eq!(ServerType::SyncMaster.family(), ServerFamily::Sync);
        assert_eq!(ServerType::SyncWorker.family(), ServerFamily::Sync);
        assert_eq!(ServerType::Agent.family(), ServerFamily::Database);
    }

    #[test]
    fn single_mode_expects_only_single() {
        assert_eq!(
            ServerType::expected_for_mode(ServiceMode::Single),
            &[ServerType::Single]
        );
    }
}
