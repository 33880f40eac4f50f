use serde::{Deserialize, Serialize};

use crate::cluster::server_type::ServerType;

/// A single member of a deployment (spec §3 `Peer`). Immutable once
/// installed in a [`ClusterConfig`] except via hello/goodbye.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct Peer {
    pub id: String,
    pub address: String,
    /// Added to the deployment's base `MasterPort`, and to a role's own
    /// fixed offset, to derive that role's listening port on this peer.
    pub port_offset: u16,
    pub has_agent: bool,
    pub has_dbserver: bool,
    pub has_coordinator: bool,
    pub has_resilient_single: bool,
    pub is_secure: bool,
}

impl Peer {
    /// The absolute port a given role listens on for this peer.
    pub fn port_for(&self, master_port: u16, server_type: ServerType) -> u16 {
        master_port + self.port_offset + server_type.port_offset()
    }

    pub fn scheme(&self) -> &'static str {
        if self.is_secure { "https" } else { "http" }
    }

    fn endpoint_for(&self, master_port: u16, server_type: ServerType) -> String {
        format!(
            "{}://{}:{}",
            self.scheme(),
            self.address,
            self.port_for(master_port, server_type)
        )
    }

    /// Whether this peer is configured to host `server_type` at all.
    pub fn hosts(&self, server_type: ServerType) -> bool {
        match server_type {
            ServerType::Agent => self.has_agent,
            ServerType::DbServer => self.has_dbserver,
            ServerType::Coordinator => self.has_coordinator,
            ServerType::ResilientSingle => self.has_resilient_single,
            ServerType::Single => true,
            ServerType::SyncMaster | ServerType::SyncWorker => false,
        }
    }
}

/// The shared membership view every peer converges on (spec §3
/// `ClusterConfig`). At most one peer per ID; endpoint views reflect the
/// current peer set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusterConfig {
    peers: Vec<Peer>,
    pub master_port: u16,
}

impl ClusterConfig {
    pub fn new(master_port: u16) -> Self {
        Self {
            peers: Vec::new(),
            master_port,
        }
    }

    pub fn peers(&self) -> &[Peer] {
        &self.peers
    }

    pub fn find(&self, id: &str) -> Option<&Peer> {
        self.peers.iter().find(|p| p.id == id)
    }

    /// Inserts a new peer or replaces the existing entry with the same ID,
    /// preserving the invariant of at most one peer per ID.
    pub fn upsert(&mut self, peer: Peer) {
        if let Some(existing) = self.peers.iter_mut().find(|p| p.id == peer.id) {
            *existing = peer;
        } else {
            self.peers.push(peer);
        }
    }

    /// Removes the peer with the given ID; returns whether one was removed.
    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.peers.len();
        self.peers.retain(|p| p.id != id);
        self.peers.len() != before
    }

    pub fn peer_endpoints(&self) -> Vec<String> {
        self.peers
            .iter()
            .map(|p| format!("{}://{}:{}", p.scheme(), p.address, self.master_port + p.port_offset))
            .collect()
    }

    pub fn agent_endpoints(&self) -> Vec<String> {
        self.peers
            .iter()
            .filter(|p| p.has_agent)
            .map(|p| p.endpoint_for(self.master_port, ServerType::Agent))
            .collect()
    }

    pub fn coordinator_endpoints(&self) -> Vec<String> {
        self.peers
            .iter()
            .filter(|p| p.has_coordinator)
            .map(|p| p.endpoint_for(self.master_port, ServerType::Coordinator))
            .collect()
    }

    /// True iff every peer in the set is configured secure. An empty set is
    /// vacuously secure.
    pub fn is_secure(&self) -> bool {
        self.peers.iter().all(|p| p.is_secure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(id: &str, port_offset: u16) -> Peer {
        Peer {
            id: id.to_string(),
            address: "10.0.0.1".to_string(),
            port_offset,
            has_agent: true,
            has_dbserver: true,
            has_coordinator: true,
            has_resilient_single: false,
            is_secure: false,
        }
    }

    #[test]
    fn upsert_respects_unique_id() {
        let mut config = ClusterConfig::new(8528);
        config.upsert(peer("a", 0));
        config.upsert(peer("a", 5));
        assert_eq!(config.peers().len(), 1);
        assert_eq!(config.peers()[0].port_offset, 5);
    }

    #[test]
    fn remove_reports_whether_present() {
        let mut config = ClusterConfig::new(8528);
        config.upsert(peer("a", 0));
        assert!(config.remove("a"));
        assert!(!config.remove("a"));
    }

    #[test]
    fn agent_endpoints_only_list_agent_hosts() {
        let mut config = ClusterConfig::new(8528);
        config.upsert(peer("a", 0));
        let mut non_agent = peer("b", 1);
        non_agent.has_agent = false;
        config.upsert(non_agent);

        assert_eq!(config.agent_endpoints().len(), 1);
    }

    #[test]
    fn port_for_combines_master_peer_and_role_offsets() {
        let p = peer("a", 10);
        assert_eq!(p.port_for(8528, ServerType::DbServer), 8528 + 10 + 2);
    }
}
