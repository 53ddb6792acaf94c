//! Vanity identity search: generate identities in parallel until one's
//! address starts with the requested prefix.

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use hnet_shared::address::expanded;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info};

use crate::util::command::safe_run_command;

/// One generated identity. `raw` is the generator's full output and holds
/// key material, so it is printed for the user but never logged.
#[derive(Clone, PartialEq, Eq)]
pub struct Identity {
    pub address: String,
    pub raw: String,
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity")
            .field("address", &self.address)
            .field("raw", &"<redacted>")
            .finish()
    }
}

impl Identity {
    /// Parse generator output; the address is its first token.
    pub fn parse(output: &str) -> Option<Self> {
        let address = output.split_whitespace().next()?;
        address.parse::<std::net::Ipv6Addr>().ok()?;
        Some(Self {
            address: address.to_string(),
            raw: output.trim().to_string(),
        })
    }

    /// Prefixes are compared against the fully expanded address
    /// (`fc94:000a:...`), so every group counts four digits.
    pub fn matches_prefix(&self, prefix: &str) -> bool {
        let prefix = prefix.trim().to_ascii_lowercase();
        expanded(&self.address).is_some_and(|full| full.starts_with(&prefix))
    }
}

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("unable to generate an identity: {0}")]
    Generator(String),

    #[error("invalid prefix {0:?}: only hexadecimal digits and ':' are allowed")]
    InvalidPrefix(String),

    #[error("search was interrupted")]
    Interrupted,
}

#[async_trait]
pub trait IdentityGenerator: Send + Sync {
    async fn generate(&self) -> anyhow::Result<Identity>;
}

/// Runs `<daemon binary> --genid` once per identity.
pub struct DaemonBinaryGenerator {
    binary: String,
    timeout: Duration,
}

impl DaemonBinaryGenerator {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            timeout: Duration::from_secs(10),
        }
    }
}

#[async_trait]
impl IdentityGenerator for DaemonBinaryGenerator {
    async fn generate(&self) -> anyhow::Result<Identity> {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("--genid");
        let output = safe_run_command(cmd, self.timeout)
            .await
            .with_context(|| format!("failed to run {} --genid", self.binary))?;
        if !output.status.success() {
            return Err(anyhow!(
                "{} --genid exited with {}: {}",
                self.binary,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }
        let text = String::from_utf8_lossy(&output.stdout);
        Identity::parse(&text).ok_or_else(|| anyhow!("unexpected output from {} --genid", self.binary))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SearchOptions {
    pub workers: usize,
    pub max_attempts: u64,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            max_attempts: 1_000_000,
        }
    }
}

pub fn validate_prefix(prefix: &str) -> Result<(), IdentityError> {
    let ok = !prefix.is_empty() && prefix.chars().all(|c| c.is_ascii_hexdigit() || c == ':');
    if ok {
        Ok(())
    } else {
        Err(IdentityError::InvalidPrefix(prefix.to_string()))
    }
}

struct SearchState {
    found: Mutex<Option<Identity>>,
    failure: Mutex<Option<String>>,
    attempts: AtomicU64,
}

impl SearchState {
    fn done(&self) -> bool {
        let found = self.found.lock().map(|g| g.is_some()).unwrap_or(true);
        let failed = self.failure.lock().map(|g| g.is_some()).unwrap_or(true);
        found || failed
    }
}

/// Search until an identity matches `prefix` or the attempt budget runs out.
/// Returns `Ok(None)` when the budget is exhausted.
pub async fn search<G>(
    generator: Arc<G>,
    prefix: &str,
    options: SearchOptions,
) -> Result<Option<Identity>, IdentityError>
where
    G: IdentityGenerator + ?Sized + 'static,
{
    validate_prefix(prefix)?;
    let workers = options.workers.max(1);
    info!("Searching for an identity starting with {} using {} workers", prefix, workers);

    let semaphore = Arc::new(Semaphore::new(workers));
    let state = Arc::new(SearchState {
        found: Mutex::new(None),
        failure: Mutex::new(None),
        attempts: AtomicU64::new(0),
    });
    let prefix: Arc<str> = Arc::from(prefix);
    let mut tasks = JoinSet::new();

    for _ in 0..options.max_attempts {
        if state.done() {
            break;
        }
        let permit = semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| IdentityError::Interrupted)?;
        if state.done() {
            break;
        }

        let generator = generator.clone();
        let state = state.clone();
        let prefix = prefix.clone();
        tasks.spawn(async move {
            let _permit = permit;
            let attempt = state.attempts.fetch_add(1, Ordering::Relaxed) + 1;
            let identity = match generator.generate().await {
                Ok(identity) => identity,
                Err(e) => {
                    if let Ok(mut failure) = state.failure.lock() {
                        failure.get_or_insert_with(|| format!("{:#}", e));
                    }
                    return;
                }
            };
            if !identity.matches_prefix(&prefix) {
                return;
            }
            if let Ok(mut found) = state.found.lock() {
                if found.is_none() {
                    debug!("Match on attempt {}: {}", attempt, identity.address);
                    *found = Some(identity);
                }
            }
        });

        while tasks.try_join_next().is_some() {}
    }

    while tasks.join_next().await.is_some() {}

    let attempts = state.attempts.load(Ordering::Relaxed);
    if let Some(identity) = state.found.lock().ok().and_then(|mut g| g.take()) {
        info!("Found a matching identity after {} attempts", attempts);
        return Ok(Some(identity));
    }
    if let Some(message) = state.failure.lock().ok().and_then(|mut g| g.take()) {
        return Err(IdentityError::Generator(message));
    }
    info!("No match after {} attempts", attempts);
    Ok(None)
}
