use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use hnet_shared::address::expanded;
use hnet_shared::daemon::EmptyResult;
use hnet_shared::dashboard::{AttachDetachInput, ClaimParams, GroupCrudInput};
use std::sync::Arc;
use std::time::Duration;

use crate::account::{self, AccountOp};
use crate::auth::{AuthSession, FileTokenStore, GraphqlClient, TerminalPrompt, TokenStore};
use crate::config::Config;
use crate::daemon::service::{ServiceManager, ServiceRecovery};
use crate::daemon::{DaemonClient, Retry};
use crate::dashboard::ops::{
    DeviceChanges, GroupChanges, resolve_device_id, resolve_device_ip, resolve_group_id,
    update_device, update_group,
};
use crate::dashboard::{DashboardClient, DashboardOp};
use crate::identity::{self, DaemonBinaryGenerator, SearchOptions};
use crate::status::{self, RenderContext};
use crate::util::format::{bold, print_info, print_success, print_warning};
use crate::util::logging::init_logging;
use crate::util::prompt::ask_for_confirmation;
use crate::util::spinner::Spinner;
use crate::wait::{ConditionWaiter, WaitCondition, conditions};

type Session = AuthSession<FileTokenStore, GraphqlClient, TerminalPrompt>;

#[derive(Parser)]
#[command(name = "hnet")]
#[command(version, about = "hnet CLI - control the local network daemon and its dashboard", long_about = None)]
struct Cli {
    /// Verbose output and debug logs
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Never prompt; questions are answered with "no"
    #[arg(long, global = true)]
    non_interactive: bool,

    /// Address of the daemon's control API
    #[arg(long, global = true)]
    daemon_api_address: Option<String>,

    /// Port of the daemon's control API
    #[arg(long, global = true)]
    daemon_api_port: Option<u16>,

    /// Use this API secret instead of reading the secret file
    #[arg(long, global = true)]
    daemon_api_secret: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the daemon status
    Status {
        /// Keep polling and redraw whenever the status changes
        #[arg(short, long)]
        follow: bool,
    },

    /// Show CLI and daemon version information
    Version,

    /// Print this device's address, or the address of a known hostname
    Ip { hostname: Option<String> },

    /// Join a network using a join code
    Join {
        code: String,
        /// Hostname to use on the network
        hostname: Option<String>,
        /// Return right after the request is accepted
        #[arg(long)]
        no_wait: bool,
    },

    /// Point the daemon at a different dashboard server
    SetupServer { domain: String },

    /// Manage the daemon's whitelist
    #[command(subcommand)]
    Whitelist(WhitelistCommands),

    /// Wait for the daemon to reach a state (base connection and websetup by default)
    Wait {
        #[command(subcommand)]
        target: Option<WaitCommands>,
    },

    /// Control the daemon service (requires root privileges - use sudo)
    #[command(subcommand)]
    Daemon(DaemonCommands),

    /// Claim this device with a claim token
    Claim {
        code: String,
        #[arg(long)]
        hostname: Option<String>,
        /// Additional hostname; repeat for more
        #[arg(long = "alias")]
        aliases: Vec<String>,
        #[arg(long)]
        comment: Option<String>,
        #[arg(long)]
        emoji: Option<String>,
        /// Don't wait for connectivity before claiming
        #[arg(long)]
        no_wait: bool,
    },

    /// Remove this device from its dashboard account
    Unclaim,

    /// Dashboard operations forwarded through the daemon
    #[command(subcommand)]
    Dashboard(DashboardCommands),

    /// Authenticated account operations (login required)
    #[command(subcommand)]
    Account(AccountCommands),

    /// Generate identities until one's expanded address starts with a prefix
    Genid {
        prefix: String,
        /// Parallel generators (defaults to available parallelism)
        #[arg(long)]
        workers: Option<usize>,
        /// Give up after this many identities
        #[arg(long, default_value_t = 1_000_000)]
        max_attempts: u64,
    },

    /// Inspect or create the CLI config file
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
enum WhitelistCommands {
    /// Only accept traffic from whitelisted peers
    Enable,
    /// Accept traffic from any peer
    Disable,
    /// List whitelisted addresses
    Ls,
    /// Add an address to the whitelist
    Add { address: String },
    /// Remove an address from the whitelist
    Rm { address: String },
}

#[derive(Subcommand)]
enum WaitCommands {
    /// Base server connection
    Base {
        /// Require a UDP connection
        #[arg(long)]
        udp: bool,
    },
    /// Websetup connection
    Websetup,
    /// Enough connectivity to join or be claimed
    Joinable,
    /// Device joined to a network
    Joined,
    /// Active, secure connection to a peer
    Host { name: String },
    /// Hostnames present in the host table
    Hostnames {
        #[arg(required = true)]
        names: Vec<String>,
    },
}

#[derive(Subcommand)]
enum DaemonCommands {
    /// Start the daemon service
    Start {
        /// Wait until the daemon answers
        #[arg(long)]
        wait: bool,
    },
    /// Stop the daemon service
    Stop,
    /// Restart the daemon service
    Restart {
        /// Wait until the daemon answers
        #[arg(long)]
        wait: bool,
    },
    /// Install and enable the daemon service unit
    Install,
}

#[derive(Subcommand)]
enum DashboardCommands {
    /// Log in to the dashboard and cache the session
    Login,
    /// Forget the cached dashboard session
    Logout,
    /// List groups
    Groups,
    /// Show a group by id or name
    Group { group: String },
    /// Create a group
    GroupCreate {
        name: String,
        #[arg(long, default_value = "")]
        emoji: String,
        #[arg(long, default_value = "")]
        comment: String,
    },
    /// Change a group's name, emoji or comment
    GroupUpdate {
        /// Group id or name
        group: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        emoji: Option<String>,
        #[arg(long)]
        comment: Option<String>,
    },
    /// Remove a group by id or name
    GroupRemove { group: String },
    /// Show the claim token
    Token,
    /// Generate a new claim token
    TokenRotate,
    /// List devices
    Devices,
    /// Show a device by id
    Device { id: String },
    /// Change a device's hostname, emoji, comment or aliases
    DeviceUpdate {
        /// Device id, address or hostname
        device: String,
        #[arg(long)]
        hostname: Option<String>,
        #[arg(long)]
        emoji: Option<String>,
        #[arg(long)]
        comment: Option<String>,
        /// Replaces all aliases; repeat for more than one
        #[arg(long = "alias")]
        aliases: Option<Vec<String>>,
    },
    /// Remove a device from your account
    DeviceUnclaim {
        /// Device id, address or hostname
        device: String,
    },
    /// Attach a device (address or hostname) to a group
    Attach { group: String, device: String },
    /// Detach a device (address or hostname) from a group
    Detach { group: String, device: String },
}

#[derive(Subcommand)]
enum AccountCommands {
    /// List groups on the account
    Groups,
    /// Show members of a group
    Group { id: String },
    /// Remove a group
    GroupRemove { id: String },
    /// Remove a device from a group
    Kick { group_id: String, device_id: String },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the effective configuration
    Show,
    /// Write a default config file
    Init,
}

pub async fn cli() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load()?;
    apply_flags(&mut config, &cli);
    init_logging(cli.verbose, &config.log_level);

    match cli.command {
        Commands::Status { follow } => {
            let client = daemon_client(&config)?;
            let ctx = RenderContext {
                cli_version: env!("CARGO_PKG_VERSION").to_string(),
                cli_dashboard_fqdn: config.dashboard_fqdn(),
                daemon_binary_version: status::daemon_binary_version(&config.daemon_binary).await,
                verbose: cli.verbose,
            };
            if follow {
                status::follow(&client, config.wait_policy().interval, &ctx).await?;
            } else {
                let snapshot = client.status(Retry::Yes).await?;
                println!("{}", status::render(&snapshot, &ctx));
            }
        }

        Commands::Version => {
            println!("Version: {}", env!("CARGO_PKG_VERSION"));
            println!("Build: {}", env!("HNET_GIT_COMMIT"));
            println!("Rust: {}", env!("HNET_RUSTC_VERSION"));
            println!(
                "Platform: {}/{}",
                std::env::consts::OS,
                std::env::consts::ARCH
            );
            let client = DaemonClient::from_config(&config)?;
            match client.status(Retry::No).await {
                Ok(snapshot) => println!("Daemon: {}", snapshot.version),
                Err(_) => println!("Daemon: not running"),
            }
        }

        Commands::Ip { hostname } => {
            let client = daemon_client(&config)?;
            let snapshot = client.status(Retry::Yes).await?;
            let address = match hostname {
                None => snapshot.local_ip.clone(),
                Some(name) => match snapshot.host_table.get(&name) {
                    Some(addr) => addr.clone(),
                    None => bail!("{} is not in the host table", name),
                },
            };
            println!("{}", expanded(&address).unwrap_or(address));
        }

        Commands::Join {
            code,
            hostname,
            no_wait,
        } => {
            let client = daemon_client(&config)?;
            let hostname = hostname.unwrap_or_default();
            client
                .post_daemon::<EmptyResult>(
                    "/api/join",
                    &[("code", code.as_str()), ("hostname", hostname.as_str())],
                    Retry::Yes,
                )
                .await
                .context("join request failed")?;
            if !no_wait {
                wait_for(&client, &config, &conditions::join()).await?;
            }
            print_success("Successfully joined the network");
        }

        Commands::SetupServer { domain } => {
            let client = daemon_client(&config)?;
            client
                .post_daemon::<EmptyResult>("/api/change-server", &[("domain", domain.as_str())], Retry::Yes)
                .await
                .context("changing the dashboard server failed")?;
            print_success(&format!("Dashboard server set to {}", domain));
            restart_and_wait(&config, &client).await?;
        }

        Commands::Whitelist(cmd) => {
            let client = daemon_client(&config)?;
            run_whitelist(&client, cmd).await?;
        }

        Commands::Wait { target } => {
            let client = daemon_client(&config)?;
            let conditions: Vec<WaitCondition> = match target {
                None => conditions::best_effort(),
                Some(WaitCommands::Base { udp: false }) => vec![conditions::base_any()],
                Some(WaitCommands::Base { udp: true }) => vec![conditions::base_udp()],
                Some(WaitCommands::Websetup) => vec![conditions::websetup()],
                Some(WaitCommands::Joinable) => conditions::joinable(),
                Some(WaitCommands::Joined) => vec![conditions::joined()],
                Some(WaitCommands::Host { name }) => vec![conditions::host(&name)],
                Some(WaitCommands::Hostnames { names }) => vec![conditions::hostnames(&names)],
            };
            // make sure the daemon is up before polling silently
            client.status(Retry::Yes).await?;
            wait_for(&client, &config, &conditions).await?;
        }

        Commands::Daemon(cmd) => {
            let service = ServiceManager::from_config(&config);
            match cmd {
                DaemonCommands::Start { wait } => {
                    service.start().await?;
                    if wait {
                        let client = DaemonClient::from_config(&config)?;
                        wait_for(&client, &config, &[conditions::daemon_reachable()]).await?;
                    }
                }
                DaemonCommands::Stop => service.stop().await?,
                DaemonCommands::Restart { wait } => {
                    service.restart().await?;
                    if wait {
                        let client = DaemonClient::from_config(&config)?;
                        wait_for(&client, &config, &[conditions::daemon_reachable()]).await?;
                    }
                }
                DaemonCommands::Install => service.install().await?,
            }
        }

        Commands::Claim {
            code,
            hostname,
            aliases,
            comment,
            emoji,
            no_wait,
        } => {
            let client = daemon_client(&config)?;
            if !no_wait {
                wait_for(&client, &config, &conditions::joinable()).await?;
            }
            let op = DashboardOp::Claim(ClaimParams {
                code,
                hostname: hostname.unwrap_or_default(),
                aliases,
                comment: comment.unwrap_or_default(),
                emoji: emoji.unwrap_or_default(),
            });
            print_success(&op.run(&DashboardClient::new(client)).await?);
        }

        Commands::Unclaim => {
            if !ask_for_confirmation(
                "Are you sure you want to unclaim this device?",
                config.non_interactive,
            )? {
                bail!("Aborted");
            }
            let dashboard = DashboardClient::new(daemon_client(&config)?);
            print_success(&DashboardOp::UnclaimSelf.run(&dashboard).await?);
        }

        Commands::Dashboard(cmd) => run_dashboard(&config, cmd).await?,

        Commands::Account(cmd) => {
            let op = match cmd {
                AccountCommands::Groups => AccountOp::ListGroups,
                AccountCommands::Group { id } => AccountOp::ShowGroup { id },
                AccountCommands::GroupRemove { id } => AccountOp::RemoveGroup { id },
                AccountCommands::Kick {
                    group_id,
                    device_id,
                } => AccountOp::KickDevice {
                    group_id,
                    device_id,
                },
            };
            let session = auth_session(&config)?;
            println!("{}", account::run(&session, &op).await?);
        }

        Commands::Genid {
            prefix,
            workers,
            max_attempts,
        } => {
            let mut options = SearchOptions {
                max_attempts,
                ..Default::default()
            };
            if let Some(workers) = workers {
                options.workers = workers;
            }
            let generator = Arc::new(DaemonBinaryGenerator::new(config.daemon_binary.clone()));
            print_info(&format!("Searching for an address starting with {}", prefix));
            match identity::search(generator, &prefix, options).await? {
                Some(found) => println!("{}", found.raw),
                None => bail!("no identity matched {} within {} attempts", prefix, max_attempts),
            }
        }

        Commands::Config(cmd) => match cmd {
            ConfigCommands::Show => {
                let mut shown = config.clone();
                if shown.daemon_api_secret.is_some() {
                    shown.daemon_api_secret = Some("<redacted>".into());
                }
                println!("{}", serde_json::to_string_pretty(&shown)?);
                println!("# {}", Config::config_file_path()?.display());
            }
            ConfigCommands::Init => {
                let path = Config::init()?;
                print_success(&format!("Config written to {}", path.display()));
            }
        },
    }

    Ok(())
}

/// Global flags take precedence over the config file and environment.
fn apply_flags(config: &mut Config, cli: &Cli) {
    if cli.non_interactive {
        config.non_interactive = true;
    }
    if let Some(address) = &cli.daemon_api_address {
        config.daemon_api_address = address.clone();
    }
    if let Some(port) = cli.daemon_api_port {
        config.daemon_api_port = port;
    }
    if let Some(secret) = &cli.daemon_api_secret {
        config.daemon_api_secret = Some(secret.clone());
    }
}

/// Daemon client that offers to restart a stopped daemon.
fn daemon_client(config: &Config) -> anyhow::Result<DaemonClient> {
    let recovery = Arc::new(ServiceRecovery::from_config(config));
    Ok(DaemonClient::from_config(config)?.with_recovery(recovery))
}

fn auth_session(config: &Config) -> anyhow::Result<Session> {
    Ok(AuthSession::new(
        FileTokenStore::new(FileTokenStore::default_path()),
        GraphqlClient::new(config.graphql_url())?,
        TerminalPrompt::new(config.non_interactive),
    ))
}

async fn wait_for(
    client: &DaemonClient,
    config: &Config,
    conditions: &[WaitCondition],
) -> anyhow::Result<()> {
    let mut spinner = Spinner::new();
    ConditionWaiter::new(client, config.wait_policy())
        .wait_all(conditions, &mut spinner)
        .await?;
    Ok(())
}

async fn restart_and_wait(config: &Config, client: &DaemonClient) -> anyhow::Result<()> {
    let service = ServiceManager::from_config(config);
    if let Err(e) = service.restart().await {
        print_warning(&format!(
            "Wasn't able to restart the daemon ({:#}). Try restarting the service manually.",
            e
        ));
        return Ok(());
    }
    // give the old process a moment to release the port
    tokio::time::sleep(Duration::from_millis(500)).await;
    wait_for(client, config, &[conditions::daemon_reachable()]).await
}

async fn run_whitelist(client: &DaemonClient, cmd: WhitelistCommands) -> anyhow::Result<()> {
    match cmd {
        WhitelistCommands::Enable => {
            client
                .post_daemon::<EmptyResult>("/api/whitelist/enable", &[], Retry::Yes)
                .await?;
            print_success("Whitelist enabled");
        }
        WhitelistCommands::Disable => {
            client
                .post_daemon::<EmptyResult>("/api/whitelist/disable", &[], Retry::Yes)
                .await?;
            print_success("Whitelist disabled");
        }
        WhitelistCommands::Ls => {
            let snapshot = client.status(Retry::Yes).await?;
            let mut entries: Vec<String> = snapshot
                .whitelist
                .iter()
                .map(|a| expanded(a).unwrap_or_else(|| a.clone()))
                .collect();
            entries.sort();
            for entry in entries {
                println!("{}", entry);
            }
        }
        WhitelistCommands::Add { address } => {
            let address = canonical_address(&address)?;
            client
                .post_daemon::<EmptyResult>("/api/whitelist/add", &[("address", address.as_str())], Retry::Yes)
                .await?;
            print_success(&format!("Added {} to whitelist", bold(&address)));
        }
        WhitelistCommands::Rm { address } => {
            let address = canonical_address(&address)?;
            client
                .post_daemon::<EmptyResult>("/api/whitelist/rm", &[("address", address.as_str())], Retry::Yes)
                .await?;
            print_success(&format!("Removed {} from whitelist", bold(&address)));
        }
    }
    Ok(())
}

fn canonical_address(input: &str) -> anyhow::Result<String> {
    let ip: std::net::IpAddr = input
        .trim()
        .parse()
        .with_context(|| format!("{} is not a valid address", input))?;
    Ok(ip.to_string())
}

async fn run_dashboard(config: &Config, cmd: DashboardCommands) -> anyhow::Result<()> {
    let dashboard = DashboardClient::new(daemon_client(config)?);
    let op = match cmd {
        DashboardCommands::Login => {
            auth_session(config)?.interactive_login().await?;
            print_success("Logged in to the dashboard");
            return Ok(());
        }
        DashboardCommands::Logout => {
            FileTokenStore::new(FileTokenStore::default_path()).clear()?;
            print_success("Logged out");
            return Ok(());
        }
        DashboardCommands::Groups => DashboardOp::ListGroups,
        DashboardCommands::Group { group } => DashboardOp::ShowGroup {
            id: resolve_group_id(&dashboard, &group).await?,
        },
        DashboardCommands::GroupCreate {
            name,
            emoji,
            comment,
        } => DashboardOp::CreateGroup(GroupCrudInput {
            name,
            emoji,
            comment,
        }),
        DashboardCommands::GroupUpdate {
            group,
            name,
            emoji,
            comment,
        } => {
            let changes = GroupChanges {
                name,
                emoji,
                comment,
            };
            update_group(&dashboard, &group, changes).await?
        }
        DashboardCommands::GroupRemove { group } => DashboardOp::RemoveGroup {
            id: resolve_group_id(&dashboard, &group).await?,
        },
        DashboardCommands::Token => DashboardOp::ClaimToken,
        DashboardCommands::TokenRotate => DashboardOp::RotateClaimToken,
        DashboardCommands::Devices => DashboardOp::ListDevices,
        DashboardCommands::Device { id } => DashboardOp::ShowDevice { id },
        DashboardCommands::DeviceUpdate {
            device,
            hostname,
            emoji,
            comment,
            aliases,
        } => {
            let changes = DeviceChanges {
                hostname,
                emoji,
                comment,
                aliases,
            };
            update_device(&dashboard, &device, changes).await?
        }
        DashboardCommands::DeviceUnclaim { device } => {
            let id = resolve_device_id(&dashboard, &device).await?;
            if !ask_for_confirmation(
                &format!("Are you sure you want to unclaim {}?", device),
                config.non_interactive,
            )? {
                bail!("Aborted");
            }
            DashboardOp::UnclaimDevice { id }
        }
        DashboardCommands::Attach { group, device } => DashboardOp::AttachDevice(AttachDetachInput {
            group_id: resolve_group_id(&dashboard, &group).await?,
            device_ip: resolve_device_ip(&dashboard, &device).await?,
        }),
        DashboardCommands::Detach { group, device } => DashboardOp::DetachDevice(AttachDetachInput {
            group_id: resolve_group_id(&dashboard, &group).await?,
            device_ip: resolve_device_ip(&dashboard, &device).await?,
        }),
    };

    println!("{}", op.run(&dashboard).await?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags_override_config() {
        let cli = Cli::try_parse_from([
            "hnet",
            "status",
            "--daemon-api-port",
            "9000",
            "--non-interactive",
        ])
        .unwrap();
        let mut config = Config::default();
        apply_flags(&mut config, &cli);
        assert_eq!(config.daemon_api_port, 9000);
        assert!(config.non_interactive);
        assert_eq!(config.daemon_api_address, "127.0.0.1");
    }

    #[test]
    fn test_bare_wait_parses() {
        let cli = Cli::try_parse_from(["hnet", "wait"]).unwrap();
        assert!(matches!(cli.command, Commands::Wait { target: None }));

        let cli = Cli::try_parse_from(["hnet", "wait", "hostnames", "alpha", "beta"]).unwrap();
        let Commands::Wait {
            target: Some(WaitCommands::Hostnames { names }),
        } = cli.command
        else {
            panic!("unexpected command");
        };
        assert_eq!(names, vec!["alpha", "beta"]);
    }

    #[test]
    fn test_claim_collects_aliases() {
        let cli = Cli::try_parse_from([
            "hnet", "claim", "TOKEN", "--alias", "a", "--alias", "b",
        ])
        .unwrap();
        let Commands::Claim { aliases, .. } = cli.command else {
            panic!("unexpected command");
        };
        assert_eq!(aliases, vec!["a", "b"]);
    }

    #[test]
    fn test_device_update_leaves_unset_fields_out() {
        let cli = Cli::try_parse_from([
            "hnet", "dashboard", "device-update", "alpha", "--alias", "a", "--alias", "b",
        ])
        .unwrap();
        let Commands::Dashboard(DashboardCommands::DeviceUpdate {
            device,
            hostname,
            aliases,
            ..
        }) = cli.command
        else {
            panic!("unexpected command");
        };
        assert_eq!(device, "alpha");
        assert_eq!(hostname, None);
        assert_eq!(aliases, Some(vec!["a".to_string(), "b".to_string()]));

        let cli = Cli::try_parse_from(["hnet", "dashboard", "device-update", "alpha"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Dashboard(DashboardCommands::DeviceUpdate { aliases: None, .. })
        ));
    }

    #[test]
    fn test_canonical_address() {
        assert_eq!(
            canonical_address("fc94:0000:0000:0000:0000:0000:0000:0001").unwrap(),
            "fc94::1"
        );
        assert!(canonical_address("not-an-ip").is_err());
    }
}
