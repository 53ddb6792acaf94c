//! Polling the daemon until a condition on its status holds.
//!
//! A [`WaitCondition`] is a pure predicate over a [`DaemonStatus`] snapshot
//! that also returns a short hint explaining what is still missing. The
//! [`ConditionWaiter`] polls the daemon once per interval, reports hint
//! changes through a [`Progress`] sink and gives up after a fixed number of
//! attempts. Poll failures are expected while the daemon starts up and only
//! cost an attempt.

use async_trait::async_trait;
use hnet_shared::daemon::DaemonStatus;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::daemon::DaemonError;

pub mod conditions;
pub mod observer;

use observer::ChangeObserver;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_attempts: 120,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WaitError {
    #[error("timeout while waiting: {description} (gave up after {attempts} attempts)")]
    Timeout { description: String, attempts: u32 },
}

/// Where status snapshots come from. Implementations must not try to
/// recover a stopped daemon; the waiter handles failures by polling again.
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn fetch_status(&self) -> Result<DaemonStatus, DaemonError>;
}

/// Live feedback for a running wait.
pub trait Progress: Send {
    fn start(&mut self, text: &str);
    fn update(&mut self, text: &str);
    fn success(&mut self, text: &str);
    fn fail(&mut self, text: &str);
}

type Predicate = dyn Fn(&DaemonStatus) -> (bool, String) + Send + Sync;

pub struct WaitCondition {
    pub description: String,
    predicate: Box<Predicate>,
}

impl WaitCondition {
    pub fn new<F>(description: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&DaemonStatus) -> (bool, String) + Send + Sync + 'static,
    {
        Self {
            description: description.into(),
            predicate: Box::new(predicate),
        }
    }

    pub fn check(&self, status: &DaemonStatus) -> (bool, String) {
        (self.predicate)(status)
    }
}

impl std::fmt::Debug for WaitCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WaitCondition")
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

pub struct ConditionWaiter<'a, S: ?Sized> {
    source: &'a S,
    policy: WaitPolicy,
}

impl<'a, S: StatusSource + ?Sized> ConditionWaiter<'a, S> {
    pub fn new(source: &'a S, policy: WaitPolicy) -> Self {
        Self { source, policy }
    }

    pub async fn wait(
        &self,
        condition: &WaitCondition,
        progress: &mut dyn Progress,
    ) -> Result<(), WaitError> {
        let description = condition.description.as_str();
        let mut observer = ChangeObserver::new();
        progress.start(description);

        for attempt in 1..=self.policy.max_attempts {
            match self.source.fetch_status().await {
                Ok(status) => {
                    let (done, hint) = condition.check(&status);
                    if done {
                        progress.success(description);
                        return Ok(());
                    }
                    let text = if hint.is_empty() {
                        description.to_string()
                    } else {
                        format!("{} {}", description, hint)
                    };
                    if observer.update(text.clone()) {
                        progress.update(&text);
                    }
                }
                Err(e) => {
                    debug!("status poll {} failed: {}", attempt, e);
                }
            }

            if attempt < self.policy.max_attempts {
                tokio::time::sleep(self.policy.interval).await;
            }
        }

        progress.fail(description);
        Err(WaitError::Timeout {
            description: description.to_string(),
            attempts: self.policy.max_attempts,
        })
    }

    /// Run conditions one after another, stopping at the first failure.
    pub async fn wait_all(
        &self,
        conditions: &[WaitCondition],
        progress: &mut dyn Progress,
    ) -> Result<(), WaitError> {
        for condition in conditions {
            self.wait(condition, progress).await?;
        }
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy(max_attempts: u32) -> WaitPolicy {
        WaitPolicy {
            interval: Duration::from_secs(1),
            max_attempts,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_true_succeeds_on_first_poll() {
        let source = ScriptedSource::new(DaemonStatus::default());
        let waiter = ConditionWaiter::new(&source, policy(5));
        let mut progress = RecordingProgress::default();

        let condition = WaitCondition::new("ready", |_| (true, String::new()));
        waiter.wait(&condition, &mut progress).await.unwrap();

        assert_eq!(source.polls(), 1);
        assert_eq!(
            progress.events,
            vec![Event::Start("ready".into()), Event::Success("ready".into())]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_false_times_out_after_ceiling() {
        let source = ScriptedSource::new(DaemonStatus::default());
        let waiter = ConditionWaiter::new(&source, policy(7));
        let mut progress = RecordingProgress::default();

        let condition = WaitCondition::new("never", |_| (false, "nope".to_string()));
        let err = waiter.wait(&condition, &mut progress).await.unwrap_err();

        assert_eq!(
            err,
            WaitError::Timeout {
                description: "never".into(),
                attempts: 7
            }
        );
        assert_eq!(source.polls(), 7);
        assert_eq!(progress.events.last(), Some(&Event::Fail("never".into())));
    }

    #[tokio::test(start_paused = true)]
    async fn test_constant_hint_is_reported_once() {
        let source = ScriptedSource::new(DaemonStatus::default());
        let waiter = ConditionWaiter::new(&source, policy(10));
        let mut progress = RecordingProgress::default();

        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let condition = WaitCondition::new("peer", move |_| {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            (n >= 2, "is warming up".to_string())
        });
        waiter.wait(&condition, &mut progress).await.unwrap();

        assert_eq!(source.polls(), 3);
        assert_eq!(progress.updates(), 1);
        assert_eq!(progress.successes(), 1);
        assert!(progress.events.contains(&Event::Update("peer is warming up".into())));
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_errors_are_retried_silently() {
        let source = ScriptedSource::new(DaemonStatus::default());
        source.push(Err(DaemonError::ConnectionRefused {
            url: "http://127.0.0.1:16216/api/status".into(),
        }));
        source.push(Err(DaemonError::ConnectionRefused {
            url: "http://127.0.0.1:16216/api/status".into(),
        }));
        let waiter = ConditionWaiter::new(&source, policy(5));
        let mut progress = RecordingProgress::default();

        let condition = WaitCondition::new("daemon", |_| (true, String::new()));
        waiter.wait(&condition, &mut progress).await.unwrap();

        assert_eq!(source.polls(), 3);
        assert_eq!(progress.updates(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_all_short_circuits() {
        let source = ScriptedSource::new(DaemonStatus::default());
        let waiter = ConditionWaiter::new(&source, policy(2));
        let mut progress = RecordingProgress::default();

        let conditions = vec![
            WaitCondition::new("first", |_| (false, String::new())),
            WaitCondition::new("second", |_| (true, String::new())),
        ];
        let err = waiter.wait_all(&conditions, &mut progress).await.unwrap_err();

        assert!(matches!(err, WaitError::Timeout { ref description, .. } if description == "first"));
        assert!(!progress.events.contains(&Event::Start("second".into())));
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_is_respected() {
        let source = ScriptedSource::new(DaemonStatus::default());
        let waiter = ConditionWaiter::new(&source, policy(4));
        let mut progress = RecordingProgress::default();

        let started = tokio::time::Instant::now();
        let condition = WaitCondition::new("never", |_| (false, String::new()));
        let _ = waiter.wait(&condition, &mut progress).await;

        // no sleep after the last attempt
        assert_eq!(started.elapsed(), Duration::from_secs(3));
    }
}
