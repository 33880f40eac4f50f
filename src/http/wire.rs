//! JSON wire formats for the peer HTTP server (spec §6).

use serde::{Deserialize, Serialize};

/// Body of `POST /hello`. Tri-state `agent`/`dbserver`/`coordinator` flags
/// are omitted from the wire form when unset, so "absent" and "explicit
/// false" are distinguishable.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Default)]
#[serde(rename_all = "PascalCase")]
pub struct HelloRequest {
    #[serde(rename = "SlaveID")]
    pub slave_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slave_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slave_port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,
    #[serde(default)]
    pub is_secure: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<bool>,
    #[serde(rename = "DBServer", default, skip_serializing_if = "Option::is_none")]
    pub dbserver: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinator: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct GoodbyeRequest {
    #[serde(rename = "SlaveID")]
    pub slave_id: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct IdInfo {
    #[serde(rename = "ID")]
    pub id: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct VersionInfo {
    pub version: String,
    pub build: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct ServerProcess {
    #[serde(rename = "Type")]
    pub server_type: String,
    pub ip: String,
    pub port: u16,
    pub process_id: u32,
    pub container_id: String,
    pub container_ip: String,
    pub is_secure: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct ProcessList {
    pub servers: Vec<ServerProcess>,
    pub servers_started: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq, Default)]
#[serde(rename_all = "PascalCase")]
pub struct EndpointList {
    pub starters: Vec<String>,
    pub agents: Vec<String>,
    pub coordinators: Vec<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ErrorResponse {
    #[serde(rename = "Error")]
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hello_request_omits_unset_tristate_flags() {
        let req = HelloRequest {
            slave_id: "p2".to_string(),
            agent: Some(true),
            ..Default::default()
        };
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("\"Agent\":true"));
        assert!(!json.contains("DBServer"));
        assert!(!json.contains("Coordinator"));
    }

    #[test]
    fn error_response_uses_capitalized_field() {
        let body = ErrorResponse {
            error: "boom".to_string(),
        };
        assert_eq!(serde_json::to_string(&body).unwrap(), r#"{"Error":"boom"}"#);
    }
}
