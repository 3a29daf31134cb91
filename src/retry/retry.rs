// SPDX-License-Identifier: GPL-2.0-or-later

//! Generic "do X, if not-yet wait with growing delay up to a cap, retry"
//! primitive, used by the pipeline supervisor's restart policy and by the
//! calendar scheduler's feed-fetch retry.

use common::time::Duration;
use std::future::Future;
use tokio_util::sync::CancellationToken;

/// Handle returned by `spawn`. Cancelling a handle whose retry loop has
/// already stopped (block returned `true`, or it was already cancelled) is a
/// no-op.
#[derive(Clone)]
pub struct RetryHandle {
    token: CancellationToken,
}

impl RetryHandle {
    pub fn cancel(&self) {
        self.token.cancel();
    }
}

/// Spawns a task that runs `block` after `initial_delay`; if it returns
/// `true` the loop stops, otherwise the delay grows by `increment` (capped at
/// `cap`) and `block` runs again. `parent` ties the retry loop's lifetime to
/// the owning supervisor's cancellation tree.
pub fn spawn<F, Fut>(
    block: F,
    initial_delay: Duration,
    increment: Duration,
    cap: Duration,
    parent: &CancellationToken,
) -> RetryHandle
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = bool> + Send,
{
    let token = parent.child_token();
    let loop_token = token.clone();
    tokio::spawn(run(block, initial_delay, increment, cap, loop_token));
    RetryHandle { token }
}

async fn run<F, Fut>(
    mut block: F,
    initial_delay: Duration,
    increment: Duration,
    cap: Duration,
    token: CancellationToken,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let mut delay = initial_delay;
    loop {
        let sleep = delay.as_std().unwrap_or_default();
        tokio::select! {
            () = token.cancelled() => return,
            () = tokio::time::sleep(sleep) => {}
        }

        if block().await {
            return;
        }

        delay = delay.checked_add(increment).unwrap_or(cap).min(cap);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    #[tokio::test(start_paused = true)]
    async fn retries_until_block_succeeds() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let attempts_clone = attempts.clone();
        let token = CancellationToken::new();

        let _handle = spawn(
            move || {
                let attempts = attempts_clone.clone();
                async move { attempts.fetch_add(1, Ordering::SeqCst) >= 2 }
            },
            Duration::from_secs(1),
            Duration::from_secs(1),
            Duration::from_secs(10),
            &token,
        );

        tokio::time::sleep(std::time::Duration::from_secs(4)).await;
        assert!(attempts.load(Ordering::SeqCst) >= 3);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_future_invocations() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let attempts_clone = attempts.clone();
        let token = CancellationToken::new();

        let handle = spawn(
            move || {
                let attempts = attempts_clone.clone();
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    false
                }
            },
            Duration::from_secs(1),
            Duration::from_secs(1),
            Duration::from_secs(10),
            &token,
        );

        tokio::time::sleep(std::time::Duration::from_millis(1500)).await;
        handle.cancel();
        let observed = attempts.load(Ordering::SeqCst);

        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
        assert_eq!(observed, attempts.load(Ordering::SeqCst));

        // Cancelling again is a no-op.
        handle.cancel();
    }
}
