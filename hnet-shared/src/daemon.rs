use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::address::same_address;

/// Envelope returned by every daemon control endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DaemonResponse<T> {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub result: Option<T>,
}

impl<T> DaemonResponse<T> {
    pub fn is_ok(&self) -> bool {
        self.status == "success" || self.status == "ok"
    }
}

/// Result type for endpoints whose payload is ignored (plain `"ok"` strings,
/// `null`, or objects alike).
pub type EmptyResult = serde::de::IgnoredAny;

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct StandardResult {
    #[serde(default)]
    pub notifications: Vec<String>,
    #[serde(default)]
    pub notifications_enabled: bool,
    #[serde(default)]
    pub notifications_to_display: bool,
    #[serde(default)]
    pub is_dirty: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct BaseConnectionStatus {
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub port: u16,
    #[serde(default, rename = "type")]
    pub kind: String,
}

impl BaseConnectionStatus {
    pub fn is_udp(&self) -> bool {
        self.kind.eq_ignore_ascii_case("udp")
    }

    pub fn is_tcp(&self) -> bool {
        self.kind.eq_ignore_ascii_case("tcp")
    }

    pub fn is_connected(&self) -> bool {
        self.is_udp() || self.is_tcp()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct PeerStatus {
    #[serde(default)]
    pub husarnet_address: String,
    #[serde(default)]
    pub link_local_address: String,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub is_reestablishing: bool,
    #[serde(default)]
    pub is_secure: bool,
    #[serde(default)]
    pub is_tunelled: bool,
    #[serde(default)]
    pub source_addresses: Vec<String>,
    #[serde(default)]
    pub target_addresses: Vec<String>,
    #[serde(default)]
    pub used_target_address: String,
}

/// Snapshot of the daemon state served by `GET /api/status`.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct DaemonStatus {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub dashboard_fqdn: String,
    #[serde(default)]
    pub standard_result: StandardResult,
    #[serde(default)]
    pub hooks_enabled: bool,

    #[serde(default)]
    pub websetup_address: String,
    #[serde(default)]
    pub base_connection: BaseConnectionStatus,

    #[serde(default)]
    pub local_ip: String,
    #[serde(default)]
    pub local_hostname: String,

    #[serde(default)]
    pub is_joined: bool,
    #[serde(default)]
    pub is_ready: bool,
    #[serde(default)]
    pub is_ready_to_join: bool,
    #[serde(default)]
    pub connection_status: HashMap<String, bool>,

    #[serde(default)]
    pub whitelist: Vec<String>,
    #[serde(default)]
    pub user_settings: HashMap<String, String>,
    #[serde(default)]
    pub host_table: HashMap<String, String>,
    #[serde(default)]
    pub peers: Vec<PeerStatus>,
}

impl DaemonStatus {
    pub fn peer_by_addr(&self, addr: &str) -> Option<&PeerStatus> {
        self.peers
            .iter()
            .find(|peer| same_address(&peer.husarnet_address, addr))
    }

    pub fn is_connected_to(&self, element: &str) -> bool {
        self.connection_status.get(element).copied().unwrap_or(false)
    }

    /// Hostnames from the host table that resolve to `addr`, sorted.
    pub fn hostnames_for(&self, addr: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .host_table
            .iter()
            .filter(|(_, a)| same_address(a, addr))
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ok_variants() {
        for status in ["ok", "success"] {
            let resp: DaemonResponse<EmptyResult> = DaemonResponse {
                status: status.to_string(),
                ..Default::default()
            };
            assert!(resp.is_ok());
        }
    }

    #[test]
    fn test_rejected_envelope_decodes() {
        let resp: DaemonResponse<EmptyResult> = serde_json::from_str(
            r#"{"status":"invalid","error":"missing param code"}"#,
        )
        .unwrap();
        assert!(!resp.is_ok());
        assert!(resp.result.is_none());
        assert_eq!(resp.status, "invalid");
        assert_eq!(resp.error, "missing param code");
    }

    #[test]
    fn test_empty_result_accepts_plain_string() {
        let resp: DaemonResponse<EmptyResult> =
            serde_json::from_str(r#"{"status":"success","result":"ok"}"#).unwrap();
        assert!(resp.is_ok());
    }

    #[test]
    fn test_status_deserialization() {
        let json = r#"{
            "status": "success",
            "result": {
                "version": "2.0.300",
                "local_ip": "fc94::1",
                "is_joined": true,
                "base_connection": {"type": "UDP", "address": "1.2.3.4", "port": 443},
                "connection_status": {"websetup": true},
                "host_table": {"alpha": "fc94::2"},
                "peers": [{"husarnet_address": "fc94:0:0:0:0:0:0:2", "is_active": true}]
            }
        }"#;

        let resp: DaemonResponse<DaemonStatus> = serde_json::from_str(json).unwrap();
        assert!(resp.is_ok());
        let status = resp.result.unwrap();
        assert!(status.base_connection.is_udp());
        assert!(status.is_connected_to("websetup"));
        assert!(!status.is_connected_to("base"));
        assert!(status.peer_by_addr("fc94::2").unwrap().is_active);
        assert_eq!(status.hostnames_for("fc94::2"), vec!["alpha".to_string()]);
    }
}
