use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartPolicy {
    pub max_restarts: usize,
    pub backoff: Duration,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            max_restarts: 32,
            backoff: Duration::from_millis(50),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitReason {
    Completed,
    Cancelled,
    Panicked,
    JoinFailed(String),
}

/// Runs the future produced by `factory` as a tokio task and starts a fresh
/// one whenever it panics, up to `policy.max_restarts` times. State that must
/// survive a restart has to live outside the future (behind an `Arc`).
pub fn spawn_supervised<F, Fut>(
    name: impl Into<String>,
    cancel: CancellationToken,
    policy: RestartPolicy,
    factory: F,
) -> JoinHandle<ExitReason>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let name = name.into();
    tokio::spawn(async move {
        let mut restarts = 0usize;
        loop {
            if cancel.is_cancelled() {
                return ExitReason::Cancelled;
            }
            let child = tokio::spawn(factory());
            let reason = match child.await {
                Ok(()) if cancel.is_cancelled() => ExitReason::Cancelled,
                Ok(()) => ExitReason::Completed,
                Err(error) if error.is_panic() => ExitReason::Panicked,
                Err(error) if error.is_cancelled() => ExitReason::Cancelled,
                Err(error) => ExitReason::JoinFailed(error.to_string()),
            };
            if reason != ExitReason::Panicked {
                tracing::debug!(actor = %name, reason = ?reason, "actor exited");
                return reason;
            }
            if restarts >= policy.max_restarts {
                tracing::error!(actor = %name, restarts, "actor keeps panicking, giving up");
                return reason;
            }
            restarts += 1;
            tracing::warn!(actor = %name, restarts, "actor panicked, restarting");
            tokio::select! {
                _ = cancel.cancelled() => return ExitReason::Cancelled,
                _ = tokio::time::sleep(policy.backoff) => {}
            }
        }
    })
}
