use hnet_shared::address::same_address;
use hnet_shared::daemon::{BaseConnectionStatus, DaemonStatus, PeerStatus, StandardResult};
use std::collections::HashMap;

/// Structural equality over status snapshots. Address fields compare by
/// parsed value, lists by position and maps by key.
pub fn same_status(a: &DaemonStatus, b: &DaemonStatus) -> bool {
    a.version == b.version
        && a.dashboard_fqdn == b.dashboard_fqdn
        && same_standard_result(&a.standard_result, &b.standard_result)
        && a.hooks_enabled == b.hooks_enabled
        && same_address(&a.websetup_address, &b.websetup_address)
        && same_base_connection(&a.base_connection, &b.base_connection)
        && same_address(&a.local_ip, &b.local_ip)
        && a.local_hostname == b.local_hostname
        && a.is_joined == b.is_joined
        && a.is_ready == b.is_ready
        && a.is_ready_to_join == b.is_ready_to_join
        && same_map(&a.connection_status, &b.connection_status, |x, y| x == y)
        && same_list(&a.whitelist, &b.whitelist, |x, y| same_address(x, y))
        && same_map(&a.user_settings, &b.user_settings, |x, y| x == y)
        && same_map(&a.host_table, &b.host_table, |x, y| same_address(x, y))
        && same_list(&a.peers, &b.peers, same_peer)
}

fn same_standard_result(a: &StandardResult, b: &StandardResult) -> bool {
    a.is_dirty == b.is_dirty
        && a.notifications_enabled == b.notifications_enabled
        && a.notifications_to_display == b.notifications_to_display
        && same_list(&a.notifications, &b.notifications, |x, y| x == y)
}

fn same_base_connection(a: &BaseConnectionStatus, b: &BaseConnectionStatus) -> bool {
    a.port == b.port && a.kind == b.kind && same_address(&a.address, &b.address)
}

fn same_peer(a: &PeerStatus, b: &PeerStatus) -> bool {
    same_address(&a.husarnet_address, &b.husarnet_address)
        && same_address(&a.link_local_address, &b.link_local_address)
        && a.is_active == b.is_active
        && a.is_reestablishing == b.is_reestablishing
        && a.is_secure == b.is_secure
        && a.is_tunelled == b.is_tunelled
        && same_list(&a.source_addresses, &b.source_addresses, |x, y| {
            same_address(x, y)
        })
        && same_list(&a.target_addresses, &b.target_addresses, |x, y| {
            same_address(x, y)
        })
        && same_address(&a.used_target_address, &b.used_target_address)
}

fn same_list<T>(a: &[T], b: &[T], eq: impl Fn(&T, &T) -> bool) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| eq(x, y))
}

fn same_map<V>(a: &HashMap<String, V>, b: &HashMap<String, V>, eq: impl Fn(&V, &V) -> bool) -> bool {
    a.len() == b.len()
        && a
            .iter()
            .all(|(key, x)| b.get(key).is_some_and(|y| eq(x, y)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> DaemonStatus {
        DaemonStatus {
            version: "2.0.300".into(),
            local_ip: "fc94::1".into(),
            whitelist: vec!["fc94::2".into(), "fc94::3".into()],
            host_table: HashMap::from([
                ("alpha".to_string(), "fc94::2".to_string()),
                ("beta".to_string(), "fc94::3".to_string()),
            ]),
            connection_status: HashMap::from([
                ("base".to_string(), true),
                ("websetup".to_string(), false),
            ]),
            user_settings: HashMap::from([
                ("dashboardFqdn".to_string(), "app.husarnet.com".to_string()),
                ("enableHooks".to_string(), "false".to_string()),
            ]),
            peers: vec![PeerStatus {
                husarnet_address: "fc94::2".into(),
                is_active: true,
                source_addresses: vec!["[2001:db8::1]:5582".into()],
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_reflexive() {
        let s = snapshot();
        assert!(same_status(&s, &s));
        assert!(same_status(&DaemonStatus::default(), &DaemonStatus::default()));
    }

    #[test]
    fn test_list_reorder_is_a_change() {
        let a = snapshot();
        let mut b = snapshot();
        b.whitelist.reverse();
        assert!(!same_status(&a, &b));
    }

    #[test]
    fn test_map_reorder_is_not_a_change() {
        let a = snapshot();
        let mut b = snapshot();
        let mut host_table = HashMap::with_capacity(64);
        host_table.insert("beta".to_string(), "fc94::3".to_string());
        host_table.insert("alpha".to_string(), "fc94::2".to_string());
        b.host_table = host_table;
        let mut user_settings = HashMap::with_capacity(32);
        user_settings.insert("enableHooks".to_string(), "false".to_string());
        user_settings.insert("dashboardFqdn".to_string(), "app.husarnet.com".to_string());
        b.user_settings = user_settings;
        let mut connection_status = HashMap::with_capacity(16);
        connection_status.insert("websetup".to_string(), false);
        connection_status.insert("base".to_string(), true);
        b.connection_status = connection_status;
        assert!(same_status(&a, &b));
    }

    #[test]
    fn test_addresses_compare_by_value() {
        let a = snapshot();
        let mut b = snapshot();
        b.local_ip = "fc94:0000:0000:0000:0000:0000:0000:0001".into();
        b.peers[0].source_addresses = vec!["[2001:db8:0:0:0:0:0:1]:5582".into()];
        assert!(same_status(&a, &b));
    }

    #[test]
    fn test_nested_peer_flag_detected() {
        let a = snapshot();
        let mut b = snapshot();
        b.peers[0].is_secure = true;
        assert!(!same_status(&a, &b));
    }

    #[test]
    fn test_missing_map_key_detected() {
        let a = snapshot();
        let mut b = snapshot();
        b.host_table.remove("beta");
        b.host_table.insert("gamma".into(), "fc94::3".into());
        assert!(!same_status(&a, &b));
    }
}
