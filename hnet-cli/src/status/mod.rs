//! `hnet status`: one-shot rendering and follow mode.

use hnet_shared::address::{expanded, is_unspecified, same_address};
use hnet_shared::daemon::{DaemonStatus, PeerStatus};
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use crate::daemon::{DaemonClient, DaemonError, Retry};
use crate::util::command::safe_run_command;
use crate::util::format::{Dot, bold, bool_status, status_help, status_line, underline};

pub mod compare;

pub use compare::same_status;

pub const DEFAULT_DASHBOARD_FQDN: &str = "app.husarnet.com";

/// What the CLI side knows when rendering a daemon snapshot.
#[derive(Debug, Clone)]
pub struct RenderContext {
    pub cli_version: String,
    pub cli_dashboard_fqdn: String,
    pub daemon_binary_version: Option<String>,
    pub verbose: bool,
}

/// Ask the daemon binary on disk for its version.
pub async fn daemon_binary_version(binary: &str) -> Option<String> {
    let mut cmd = Command::new(binary);
    cmd.arg("--version");
    match safe_run_command(cmd, Duration::from_secs(5)).await {
        Ok(output) if output.status.success() => {
            let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
            (!text.is_empty()).then_some(text)
        }
        Ok(output) => {
            debug!("{} --version exited with {}", binary, output.status);
            None
        }
        Err(e) => {
            debug!("unable to run {} --version: {}", binary, e);
            None
        }
    }
}

fn header(out: &mut Vec<String>, text: &str) {
    out.push(underline(text));
}

fn render_version(out: &mut Vec<String>, status: &DaemonStatus, ctx: &RenderContext) {
    let binary = ctx.daemon_binary_version.as_deref().unwrap_or("unknown");
    let (dot, help) = if status.version != ctx.cli_version {
        (
            Dot::Red,
            Some("CLI and Husarnet Daemon versions differ - you may get unexpected results!"),
        )
    } else if status.version != binary {
        (
            Dot::Yellow,
            Some("Husarnet Daemon you're running and the one saved on a disk differ!"),
        )
    } else {
        (Dot::Green, None)
    };

    out.push(status_line(dot, "CLI", &ctx.cli_version));
    out.push(status_line(dot, "Daemon (running)", &status.version));
    out.push(status_line(dot, "Daemon (binary)", binary));
    if let Some(help) = help {
        out.push(status_help(dot, help));
    }
}

fn render_dashboard(out: &mut Vec<String>, status: &DaemonStatus, ctx: &RenderContext) {
    let cli = ctx.cli_dashboard_fqdn.as_str();
    let (dot, help) = if status.dashboard_fqdn != cli {
        (
            Dot::Red,
            Some("Dashboards used by the CLI and Husarnet Daemon differ - you may get unexpected results!"),
        )
    } else if cli != DEFAULT_DASHBOARD_FQDN && cli.ends_with(".husarnet.com") {
        (Dot::Yellow, Some("You're using development environment"))
    } else if cli != DEFAULT_DASHBOARD_FQDN {
        (Dot::Yellow, Some("You're using self-hosted environment"))
    } else {
        (Dot::Green, None)
    };

    out.push(status_line(dot, "CLI", cli));
    out.push(status_line(dot, "Daemon", &status.dashboard_fqdn));
    if let Some(help) = help {
        out.push(status_help(dot, help));
    }
    if status.standard_result.is_dirty {
        out.push(status_help(
            Dot::Red,
            "Daemon's dirty flag is set. You need to restart husarnet-daemon in order to reflect the current settings (like the Dashboard URL)",
        ));
    }
}

fn render_connection(out: &mut Vec<String>, status: &DaemonStatus, verbose: bool) {
    let base = &status.base_connection;
    let (dot, help) = if base.is_udp() {
        (Dot::Green, None)
    } else if base.is_tcp() {
        (
            Dot::Yellow,
            Some("TCP is a fallback connection method. You'll get better results on UDP"),
        )
    } else {
        (
            Dot::Red,
            Some("There's no Base Server connection - Husarnet will not be fully functional"),
        )
    };

    out.push(status_line(
        dot,
        "Base Server",
        &format!("{}:{} ({})", base.address, base.port, base.kind),
    ));
    if let Some(help) = help {
        out.push(status_help(dot, help));
    }

    if verbose {
        let mut elements: Vec<_> = status
            .connection_status
            .iter()
            .filter(|(name, _)| name.as_str() != "base")
            .collect();
        elements.sort();
        for (name, connected) in elements {
            out.push(bool_status(*connected, &title_case(name), "connected", "not connected"));
        }
    }
}

fn render_readiness(out: &mut Vec<String>, status: &DaemonStatus) {
    out.push(bool_status(status.is_ready, "Is ready to handle data?", "ready", "not ready"));
    out.push(bool_status(status.is_ready_to_join, "Is ready to join?", "ready", "not ready"));
    out.push(bool_status(status.is_joined, "Is joined?", "ready", "not ready"));
}

fn render_user_settings(out: &mut Vec<String>, status: &DaemonStatus) {
    let mut keys: Vec<&String> = status.user_settings.keys().collect();
    keys.sort();
    for key in keys {
        out.push(status_line(Dot::Neutral, &env_name(key), &status.user_settings[key]));
    }
    out.push(String::new());
    out.push(format!(
        "If you want to override any of those variables, prefix them with {} and provide as an environment variable to {}",
        bold("HUSARNET_"),
        bold("husarnet-daemon")
    ));
}

fn display_address(addr: &str) -> String {
    expanded(addr).unwrap_or_else(|| addr.to_string())
}

fn render_whitelist(out: &mut Vec<String>, status: &DaemonStatus, verbose: bool) {
    let mut whitelist: Vec<&String> = status.whitelist.iter().collect();
    whitelist.sort_by_key(|a| display_address(a));

    for address in whitelist {
        let mut names = status.hostnames_for(address);
        if same_address(address, &status.websetup_address) {
            names.insert(0, "(websetup)".to_string());
        }
        if same_address(address, &status.local_ip) {
            names.insert(0, "(localhost)".to_string());
        }
        out.push(format!("{} {}", display_address(address), names.join(" ")).trim_end().to_string());

        let default_peer = PeerStatus::default();
        let peer = status.peer_by_addr(address).unwrap_or(&default_peer);
        out.push(peer_flags(peer));

        if verbose {
            if !peer.target_addresses.is_empty() {
                let mut targets = peer.target_addresses.clone();
                targets.sort();
                targets.dedup();
                out.push(format!("Addresses from Base Server: {}", targets.join(" ")));
            }
            let used = &peer.used_target_address;
            if !is_unspecified(used) && !used_is_base(used, &status.base_connection.address) {
                out.push(format!("Used destination address:   {}", used));
            }
        }
        out.push(String::new());
    }
}

fn used_is_base(used: &str, base: &str) -> bool {
    let host = used
        .parse::<std::net::SocketAddr>()
        .map(|s| s.ip().to_string())
        .unwrap_or_else(|_| used.to_string());
    same_address(&host, base)
}

fn peer_flags(peer: &PeerStatus) -> String {
    let active = if peer.is_active {
        format!("{} active   ", Dot::Green.render())
    } else {
        format!("{} inactive ", Dot::Neutral.render())
    };
    let secure = if peer.is_secure {
        format!("{} secure       ", Dot::Green.render())
    } else {
        format!("{} no data flow ", Dot::Neutral.render())
    };
    let route = if peer.is_tunelled {
        format!("{} tunelled     ", Dot::Yellow.render())
    } else {
        format!("{} peer to peer ", Dot::Green.render())
    };
    format!("{}  {}  {}", active, secure, route).trim_end().to_string()
}

fn title_case(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// `enableHooks` -> `ENABLE_HOOKS`
fn env_name(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    let mut prev_lower = false;
    for ch in key.chars() {
        if ch == '-' || ch == ' ' || ch == '_' {
            out.push('_');
            prev_lower = false;
            continue;
        }
        if ch.is_uppercase() && prev_lower {
            out.push('_');
        }
        prev_lower = ch.is_lowercase() || ch.is_ascii_digit();
        out.extend(ch.to_uppercase());
    }
    out
}

pub fn render(status: &DaemonStatus, ctx: &RenderContext) -> String {
    let mut out = Vec::new();

    header(&mut out, "Version");
    render_version(&mut out, status, ctx);
    out.push(String::new());

    header(&mut out, "Dashboard URL");
    render_dashboard(&mut out, status, ctx);
    out.push(String::new());

    header(&mut out, "Connection status");
    render_connection(&mut out, status, ctx.verbose);
    out.push(String::new());

    header(&mut out, "Readiness");
    render_readiness(&mut out, status);
    out.push(String::new());

    if ctx.verbose {
        header(&mut out, "User settings");
        render_user_settings(&mut out, status);
        out.push(String::new());
    }

    header(&mut out, "Local");
    out.push(format!(
        "{} Husarnet IP:\n{}",
        Dot::Neutral.render(),
        bold(&display_address(&status.local_ip))
    ));
    out.push(String::new());

    header(&mut out, "Whitelist");
    render_whitelist(&mut out, status, ctx.verbose);

    out.join("\n")
}

/// Remembers the last printed snapshot so follow mode only redraws on change.
#[derive(Default)]
pub struct StatusFollower {
    last: Option<DaemonStatus>,
}

impl StatusFollower {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when `status` differs from the previously observed one.
    pub fn observe(&mut self, status: DaemonStatus) -> bool {
        if let Some(last) = &self.last {
            if same_status(last, &status) {
                return false;
            }
        }
        self.last = Some(status);
        true
    }
}

/// Poll the daemon and redraw whenever its status changes, until Ctrl-C.
pub async fn follow(
    client: &DaemonClient,
    interval: Duration,
    ctx: &RenderContext,
) -> Result<(), DaemonError> {
    let mut follower = StatusFollower::new();
    // the first poll may restart the daemon, later ones just skip a beat
    let first = client.status(Retry::Yes).await?;
    print_snapshot(&mut follower, first, ctx);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => return Ok(()),
            _ = tokio::time::sleep(interval) => {}
        }
        match client.status(Retry::No).await {
            Ok(status) => print_snapshot(&mut follower, status, ctx),
            Err(e) => debug!("status poll failed: {}", e),
        }
    }
}

fn print_snapshot(follower: &mut StatusFollower, status: DaemonStatus, ctx: &RenderContext) {
    let rendered = render(&status, ctx);
    if follower.observe(status) {
        print!("\x1b[2J\x1b[H");
        println!("{}", rendered);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::format::visible_width;
    use hnet_shared::daemon::BaseConnectionStatus;
    use std::collections::HashMap;

    fn ctx(verbose: bool) -> RenderContext {
        RenderContext {
            cli_version: "2.0.300".into(),
            cli_dashboard_fqdn: DEFAULT_DASHBOARD_FQDN.into(),
            daemon_binary_version: Some("2.0.300".into()),
            verbose,
        }
    }

    fn status() -> DaemonStatus {
        DaemonStatus {
            version: "2.0.300".into(),
            dashboard_fqdn: DEFAULT_DASHBOARD_FQDN.into(),
            local_ip: "fc94::1".into(),
            websetup_address: "fc94::ff".into(),
            base_connection: BaseConnectionStatus {
                address: "1.2.3.4".into(),
                port: 443,
                kind: "UDP".into(),
            },
            whitelist: vec!["fc94::ff".into(), "fc94::2".into()],
            host_table: HashMap::from([("alpha".to_string(), "fc94::2".to_string())]),
            user_settings: HashMap::from([("enableHooks".to_string(), "true".to_string())]),
            peers: vec![PeerStatus {
                husarnet_address: "fc94::2".into(),
                is_active: true,
                is_secure: true,
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    fn plain(s: &str) -> String {
        let mut out = String::new();
        let mut chars = s.chars();
        while let Some(c) = chars.next() {
            if c == '\x1b' {
                for c in chars.by_ref() {
                    if c.is_ascii_alphabetic() {
                        break;
                    }
                }
            } else {
                out.push(c);
            }
        }
        out
    }

    #[test]
    fn test_render_sections_in_order() {
        let out = plain(&render(&status(), &ctx(false)));
        let order = ["Version", "Dashboard URL", "Connection status", "Readiness", "Local", "Whitelist"];
        let mut pos = 0;
        for section in order {
            let found = out[pos..].find(section).unwrap_or_else(|| panic!("missing {}", section));
            pos += found + section.len();
        }
        assert!(!out.contains("User settings"));
    }

    #[test]
    fn test_whitelist_markers_and_hostnames() {
        let out = plain(&render(&status(), &ctx(false)));
        assert!(out.contains("fc94:0000:0000:0000:0000:0000:0000:0002 alpha"));
        assert!(out.contains("fc94:0000:0000:0000:0000:0000:0000:00ff (websetup)"));
        assert!(out.contains("active"));
        assert!(out.contains("secure"));
    }

    #[test]
    fn test_verbose_shows_user_settings() {
        let out = plain(&render(&status(), &ctx(true)));
        assert!(out.contains("User settings"));
        assert!(out.contains("ENABLE_HOOKS:"));
    }

    #[test]
    fn test_version_mismatch_warns() {
        let mut s = status();
        s.version = "2.0.1".into();
        let out = plain(&render(&s, &ctx(false)));
        assert!(out.contains("CLI and Husarnet Daemon versions differ"));
    }

    #[test]
    fn test_status_lines_align() {
        let line = plain(&status_line(Dot::Green, "CLI", "x"));
        let other = plain(&status_line(Dot::Red, "Daemon (running)", "x"));
        assert_eq!(visible_width(&line), 30);
        assert_eq!(visible_width(&other), visible_width(&line));
    }

    #[test]
    fn test_env_name() {
        assert_eq!(env_name("enableHooks"), "ENABLE_HOOKS");
        assert_eq!(env_name("daemon_api_port"), "DAEMON_API_PORT");
        assert_eq!(env_name("logVerbosity2"), "LOG_VERBOSITY2");
    }

    #[test]
    fn test_follower_reports_changes_only() {
        let mut follower = StatusFollower::new();
        assert!(follower.observe(status()));
        assert!(!follower.observe(status()));

        let mut changed = status();
        changed.is_joined = true;
        assert!(follower.observe(changed.clone()));
        assert!(!follower.observe(changed));
    }
}
