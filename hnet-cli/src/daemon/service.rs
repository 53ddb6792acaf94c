use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use tokio::process::Command;
use tracing::{info, warn};

use super::{DaemonClient, DaemonError, DaemonRecovery};
use crate::config::{Config, RecoveryPolicy};
use crate::util::command::find_binary;
use crate::util::format::{print_info, print_warning};
use crate::util::prompt::ask_for_confirmation;
use crate::util::spinner::Spinner;
use crate::wait::{ConditionWaiter, WaitPolicy, conditions};

/// Map a failed systemctl exit status to an error with a privilege hint.
fn check_permission_error(status: ExitStatus, action: &str) -> Result<()> {
    // 1: generic failure (usually EPERM), 4: insufficient privileges
    if let Some(code) = status.code() {
        if code == 1 || code == 4 {
            bail!(
                "Permission denied. Unable to {} the daemon service without root privileges.\n\
                Please run with: sudo hnet daemon {}",
                action,
                action
            );
        }
    }
    bail!("systemctl {} failed with exit code: {:?}", action, status.code());
}

/// The daemon's OS service (systemd).
#[derive(Debug, Clone)]
pub struct ServiceManager {
    name: String,
    unit_path: PathBuf,
    daemon_binary: String,
}

impl ServiceManager {
    pub fn new(name: impl Into<String>, daemon_binary: impl Into<String>) -> Self {
        let name = name.into();
        let unit_path = PathBuf::from(format!("/etc/systemd/system/{}.service", name));
        Self {
            name,
            unit_path,
            daemon_binary: daemon_binary.into(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.service_name, &config.daemon_binary)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_installed(&self) -> bool {
        self.unit_path.exists()
    }

    pub fn unit_file(&self, exec_path: &str) -> String {
        format!(
            "[Unit]
Description=Husarnet daemon ({name})
After=network-online.target
Wants=network-online.target

[Service]
Type=simple
ExecStart={exec}
Restart=on-failure
RestartSec=3
StandardOutput=journal
StandardError=journal
TimeoutStopSec=30

[Install]
WantedBy=multi-user.target
",
            name = self.name,
            exec = exec_path
        )
    }

    /// Write the unit file and reload systemd.
    pub async fn install(&self) -> Result<()> {
        #[cfg(unix)]
        {
            if !nix::unistd::Uid::effective().is_root() {
                bail!(
                    "Installing the {} service requires root privileges.\n\
                    Please run with: sudo hnet daemon install",
                    self.name
                );
            }
        }

        let exec = find_binary(&self.daemon_binary)
            .ok_or_else(|| anyhow!("Daemon binary '{}' not found in PATH", self.daemon_binary))?;

        tokio::fs::write(&self.unit_path, self.unit_file(&exec.display().to_string()))
            .await
            .context("Failed to write systemd service file")?;

        self.systemctl(&["daemon-reload"], "reload").await?;
        self.systemctl(&["enable", &self.name], "enable").await?;

        info!("Installed systemd service at {}", self.unit_path.display());
        Ok(())
    }

    async fn systemctl(&self, args: &[&str], action: &str) -> Result<()> {
        let status = Command::new("systemctl")
            .args(args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await
            .with_context(|| format!("Failed to run systemctl {}", action))?;

        if !status.success() {
            check_permission_error(status, action)?;
        }
        Ok(())
    }

    pub async fn start(&self) -> Result<()> {
        self.systemctl(&["start", &self.name], "start").await?;
        info!("Started {} service", self.name);
        Ok(())
    }

    pub async fn stop(&self) -> Result<()> {
        self.systemctl(&["stop", &self.name], "stop").await?;
        info!("Stopped {} service", self.name);
        Ok(())
    }

    pub async fn restart(&self) -> Result<()> {
        self.systemctl(&["restart", &self.name], "restart").await?;
        info!("Restarted {} service", self.name);
        Ok(())
    }
}

/// Recovery path for a daemon that refuses connections: ask, optionally
/// install the service, restart it and wait until the API answers.
pub struct ServiceRecovery {
    service: ServiceManager,
    policy: RecoveryPolicy,
    non_interactive: bool,
    wait: WaitPolicy,
}

impl ServiceRecovery {
    pub fn new(
        service: ServiceManager,
        policy: RecoveryPolicy,
        non_interactive: bool,
        wait: WaitPolicy,
    ) -> Self {
        Self {
            service,
            policy,
            non_interactive,
            wait,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            ServiceManager::from_config(config),
            config.recovery,
            config.non_interactive,
            config.wait_policy(),
        )
    }
}

#[async_trait]
impl DaemonRecovery for ServiceRecovery {
    async fn recover(&self, client: &DaemonClient) -> Result<(), DaemonError> {
        print_info("Daemon does not seem to be running");

        if self.policy == RecoveryPolicy::Never {
            return Err(DaemonError::RecoveryDeclined);
        }

        let confirmed = ask_for_confirmation(
            "Do you want to restart the daemon now?",
            self.non_interactive,
        )
        .map_err(DaemonError::Recovery)?;
        if !confirmed {
            return Err(DaemonError::RecoveryDeclined);
        }

        if self.policy == RecoveryPolicy::InstallAndRestart && !self.service.is_installed() {
            self.service
                .install()
                .await
                .map_err(DaemonError::Recovery)?;
        }

        if let Err(e) = self.service.restart().await {
            warn!("Restarting {} failed: {:#}", self.service.name(), e);
            print_warning("Wasn't able to restart the daemon. Try restarting the service manually.");
        }

        let mut spinner = Spinner::new();
        ConditionWaiter::new(client, self.wait)
            .wait(&conditions::daemon_reachable(), &mut spinner)
            .await
            .map_err(|e| DaemonError::Recovery(e.into()))
    }
}
