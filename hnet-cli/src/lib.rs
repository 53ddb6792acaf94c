pub mod account;
pub mod auth;
pub mod config;
pub mod daemon;
pub mod dashboard;
pub mod identity;
pub mod status;
pub mod util;
pub mod wait;

// === CLI entrypoint ===
pub mod cli;

/// Entrypoint used by `main.rs` and tests to run the full CLI.
pub async fn run_cli() -> anyhow::Result<()> {
    cli::cli().await
}
