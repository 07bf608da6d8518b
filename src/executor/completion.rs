// src/executor/completion.rs

//! One-shot, broadcast-once termination signal.
//!
//! The backend watcher owns the only [`CompletionSignal`] and consumes it
//! when firing, so a task can be marked terminated at most once. Any number
//! of [`Completion`] clones can observe the signal without consuming it.

use std::time::Duration;

use anyhow::anyhow;
use tokio::sync::watch;

use crate::errors::Result;

/// Create a linked signal / observer pair.
pub fn completion() -> (CompletionSignal, Completion) {
    let (tx, rx) = watch::channel(None);
    (CompletionSignal { tx }, Completion { rx })
}

/// Firing side. Carries the exit code to observers.
#[derive(Debug)]
pub struct CompletionSignal {
    tx: watch::Sender<Option<i32>>,
}

impl CompletionSignal {
    pub fn fire(self, exit_code: i32) {
        self.tx.send_replace(Some(exit_code));
    }
}

/// Observing side.
#[derive(Debug, Clone)]
pub struct Completion {
    rx: watch::Receiver<Option<i32>>,
}

impl Completion {
    pub fn is_fired(&self) -> bool {
        self.rx.borrow().is_some()
    }

    pub fn exit_code(&self) -> Option<i32> {
        *self.rx.borrow()
    }

    /// Wait until fired or until `timeout` elapses.
    ///
    /// `None` waits forever; `Some(Duration::ZERO)` never suspends.
    pub async fn wait(&self, timeout: Option<Duration>) -> Result<bool> {
        if self.is_fired() {
            return Ok(true);
        }

        let mut rx = self.rx.clone();
        let fired = async move { rx.wait_for(Option::is_some).await.map(|_| ()) };

        let outcome = match timeout {
            None => fired.await,
            Some(t) if t.is_zero() => return Ok(false),
            Some(t) => match tokio::time::timeout(t, fired).await {
                Ok(outcome) => outcome,
                Err(_) => return Ok(false),
            },
        };

        outcome
            .map(|()| true)
            .map_err(|_| anyhow!("task watcher exited without reporting termination").into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unfired_signal_times_out_without_error() {
        let (_signal, completion) = completion();
        assert!(!completion.wait(Some(Duration::ZERO)).await.unwrap());
        assert!(!completion.wait(Some(Duration::from_millis(20))).await.unwrap());
        assert_eq!(completion.exit_code(), None);
    }

    #[tokio::test]
    async fn all_waiters_observe_a_single_fire() {
        let (signal, completion) = completion();

        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let c = completion.clone();
                tokio::spawn(async move { c.wait(None).await.unwrap() })
            })
            .collect();

        tokio::time::sleep(Duration::from_millis(10)).await;
        signal.fire(7);

        for waiter in waiters {
            assert!(waiter.await.unwrap());
        }
        assert!(completion.is_fired());
        assert_eq!(completion.exit_code(), Some(7));
        // Observing does not consume the signal.
        assert!(completion.wait(Some(Duration::ZERO)).await.unwrap());
    }

    #[tokio::test]
    async fn dropped_signal_is_an_error_for_waiters() {
        let (signal, completion) = completion();
        drop(signal);
        assert!(completion.wait(None).await.is_err());
    }
}
