//! Optional cooldown timer that triggers a sweep once table creation goes quiet.

use std::future::Future;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Single re-armable timer. Arming cancels the previous countdown; once a
/// countdown elapses its task runs to completion and is not interrupted.
pub struct QuiescenceTimer {
    cooldown: Option<Duration>,
    armed: Mutex<Option<CancellationToken>>,
}

impl QuiescenceTimer {
    pub fn new(cooldown: Option<Duration>) -> Self {
        Self {
            cooldown,
            armed: Mutex::new(None),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.cooldown.is_some()
    }

    /// Restart the countdown with `task` as the action to run when it elapses.
    /// No-op when no cooldown is configured.
    pub async fn arm<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let Some(cooldown) = self.cooldown else {
            return;
        };

        let token = CancellationToken::new();
        let previous = self.armed.lock().await.replace(token.clone());
        if let Some(previous) = previous {
            previous.cancel();
        }

        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!("Quiescence countdown reset");
                }
                _ = tokio::time::sleep(cooldown) => {
                    debug!("Quiescence reached after {:?}", cooldown);
                    task.await;
                }
            }
        });
    }

    /// Cancel a pending countdown, if any.
    pub async fn cancel(&self) {
        if let Some(token) = self.armed.lock().await.take() {
            token.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_runs_only_last_task() {
        let timer = QuiescenceTimer::new(Some(Duration::from_millis(50)));
        let fired = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let fired = fired.clone();
            timer
                .arm(async move {
                    fired.fetch_add(1, Ordering::SeqCst);
                })
                .await;
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(100)).await;
        settle().await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_fire() {
        let timer = QuiescenceTimer::new(Some(Duration::from_millis(50)));
        let fired = Arc::new(AtomicUsize::new(0));
        let f = fired.clone();
        timer
            .arm(async move {
                f.fetch_add(1, Ordering::SeqCst);
            })
            .await;
        timer.cancel().await;

        tokio::time::sleep(Duration::from_millis(100)).await;
        settle().await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_disabled_timer_never_spawns() {
        let timer = QuiescenceTimer::new(None);
        assert!(!timer.is_enabled());
        let fired = Arc::new(AtomicUsize::new(0));
        let f = fired.clone();
        timer
            .arm(async move {
                f.fetch_add(1, Ordering::SeqCst);
            })
            .await;
        settle().await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
