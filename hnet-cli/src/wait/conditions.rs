use hnet_shared::address::is_unspecified;
use hnet_shared::daemon::DaemonStatus;
use std::net::IpAddr;

use super::WaitCondition;

fn done() -> (bool, String) {
    (true, String::new())
}

fn pending(hint: impl Into<String>) -> (bool, String) {
    (false, hint.into())
}

pub fn daemon_reachable() -> WaitCondition {
    WaitCondition::new("Waiting until we can communicate with the daemon…", |_| {
        done()
    })
}

pub fn base_any() -> WaitCondition {
    WaitCondition::new("Waiting for Base server connection (any protocol)…", |s| {
        (s.base_connection.is_connected(), String::new())
    })
}

pub fn base_udp() -> WaitCondition {
    WaitCondition::new("Waiting for Base server connection (UDP)…", |s| {
        (s.base_connection.is_udp(), String::new())
    })
}

pub fn websetup() -> WaitCondition {
    WaitCondition::new("Waiting for websetup connection…", |s| {
        (s.is_connected_to("websetup"), String::new())
    })
}

pub fn joined() -> WaitCondition {
    WaitCondition::new("Waiting until the device is joined…", |s| {
        (s.is_joined, String::new())
    })
}

/// Wait for an active, secure connection to a peer given by hostname or address.
pub fn host(target: &str) -> WaitCondition {
    let target = target.trim().to_string();
    let description = format!("Waiting until there's a connection to {}…", target);
    WaitCondition::new(description, move |s| host_check(s, &target))
}

fn host_check(status: &DaemonStatus, target: &str) -> (bool, String) {
    // only websetup (or nothing) known so far
    if status.host_table.len() < 2 {
        return pending("not enough hosts in the host table yet");
    }

    let address = match status.host_table.get(target) {
        Some(addr) => Some(addr.as_str()),
        None if target.parse::<IpAddr>().is_ok() => Some(target),
        None => None,
    };

    let Some(address) = address.filter(|a| !is_unspecified(a)) else {
        return pending("peer addr is not known yet");
    };

    let Some(peer) = status.peer_by_addr(address) else {
        return pending("unable to find peer in the peer list");
    };

    if !peer.is_active {
        return pending("peer is not active yet");
    }

    if !peer.is_secure {
        return pending("secure connection has not yet been established");
    }

    done()
}

pub fn hostnames(names: &[String]) -> WaitCondition {
    let names = names.to_vec();
    let description = format!(
        "Waiting until the following hostnames are known: {}…",
        names.join(", ")
    );
    WaitCondition::new(description, move |s| {
        match names.iter().find(|n| !s.host_table.contains_key(n.as_str())) {
            Some(missing) => pending(format!("{} is unavailable", missing)),
            None => done(),
        }
    })
}

/// Enough connectivity to join a network or be claimed.
pub fn joinable() -> Vec<WaitCondition> {
    vec![base_any(), websetup()]
}

/// Everything the daemon can reasonably reach (used by a bare `wait`).
pub fn best_effort() -> Vec<WaitCondition> {
    vec![base_any(), base_udp(), websetup()]
}

pub fn join() -> Vec<WaitCondition> {
    vec![base_any(), websetup(), joined()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use hnet_shared::daemon::{BaseConnectionStatus, PeerStatus};
    use std::collections::HashMap;

    fn status_with_peer(active: bool, secure: bool) -> DaemonStatus {
        DaemonStatus {
            host_table: HashMap::from([
                ("websetup".to_string(), "fc94::1".to_string()),
                ("alpha".to_string(), "fc94::2".to_string()),
            ]),
            peers: vec![PeerStatus {
                husarnet_address: "fc94:0000:0000:0000:0000:0000:0000:0002".to_string(),
                is_active: active,
                is_secure: secure,
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_base_conditions() {
        let mut status = DaemonStatus::default();
        assert!(!base_any().check(&status).0);

        status.base_connection = BaseConnectionStatus {
            kind: "TCP".into(),
            ..Default::default()
        };
        assert!(base_any().check(&status).0);
        assert!(!base_udp().check(&status).0);

        status.base_connection.kind = "UDP".into();
        assert!(base_udp().check(&status).0);
    }

    #[test]
    fn test_host_hints_in_order() {
        let empty = DaemonStatus::default();
        assert_eq!(
            host("alpha").check(&empty).1,
            "not enough hosts in the host table yet"
        );

        let status = status_with_peer(false, false);
        assert_eq!(host("beta").check(&status).1, "peer addr is not known yet");
        assert_eq!(
            host("fc94::3").check(&status).1,
            "unable to find peer in the peer list"
        );
        assert_eq!(host("alpha").check(&status).1, "peer is not active yet");

        let status = status_with_peer(true, false);
        assert_eq!(
            host("alpha").check(&status).1,
            "secure connection has not yet been established"
        );

        let status = status_with_peer(true, true);
        assert!(host("alpha").check(&status).0);
        assert!(host("fc94::2").check(&status).0);
    }

    #[test]
    fn test_hostnames_reports_first_missing() {
        let status = status_with_peer(true, true);
        let names = vec!["alpha".to_string(), "gamma".to_string()];
        assert_eq!(hostnames(&names).check(&status), (false, "gamma is unavailable".to_string()));
        assert!(hostnames(&names[..1]).check(&status).0);
    }

    #[test]
    fn test_composites() {
        assert_eq!(joinable().len(), 2);
        let join: Vec<String> = join().into_iter().map(|c| c.description).collect();
        assert!(join[2].contains("joined"));
        assert!(best_effort()[1].description.contains("UDP"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_join_waits_for_joined_after_connectivity() {
        use crate::wait::testing::{RecordingProgress, ScriptedSource};
        use crate::wait::{ConditionWaiter, WaitPolicy};
        use std::time::Duration;

        let connected = DaemonStatus {
            base_connection: BaseConnectionStatus {
                kind: "UDP".into(),
                ..Default::default()
            },
            connection_status: HashMap::from([("websetup".to_string(), true)]),
            ..Default::default()
        };
        let source = ScriptedSource::new(DaemonStatus {
            is_joined: true,
            ..connected.clone()
        });
        for _ in 0..3 {
            source.push(Ok(connected.clone()));
        }
        let waiter = ConditionWaiter::new(
            &source,
            WaitPolicy {
                interval: Duration::from_secs(1),
                max_attempts: 5,
            },
        );
        let mut progress = RecordingProgress::default();

        waiter.wait_all(&join(), &mut progress).await.unwrap();

        // base and websetup pass at once, joined needs one more poll
        assert_eq!(source.polls(), 4);
        assert_eq!(progress.successes(), 3);
    }
}
