//! One-shot readiness signal

use std::sync::Arc;
use tokio::sync::watch;

/// Single-fire gate opened when the transport first becomes usable
///
/// Starts closed, opens at most once and never closes again. Any number of
/// tasks may wait on it; waiting on an open gate returns immediately.
#[derive(Debug, Clone)]
pub struct ReadinessGate {
    tx: Arc<watch::Sender<bool>>,
}

impl ReadinessGate {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Open the gate
    ///
    /// Returns `true` only for the call that actually opened it.
    pub fn fire(&self) -> bool {
        self.tx.send_if_modified(|ready| {
            if *ready {
                false
            } else {
                *ready = true;
                true
            }
        })
    }

    pub fn is_fired(&self) -> bool {
        *self.tx.borrow()
    }

    /// Wait until the gate is open
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so this cannot observe a closed channel
        let _ = rx.wait_for(|ready| *ready).await;
    }
}

impl Default for ReadinessGate {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_fires_once() {
        let gate = ReadinessGate::new();
        assert!(!gate.is_fired());
        assert!(gate.fire());
        assert!(gate.is_fired());
        assert!(!gate.fire());
        assert!(gate.is_fired());
    }

    #[tokio::test]
    async fn test_wait_after_fire_returns_immediately() {
        let gate = ReadinessGate::new();
        gate.fire();
        tokio::time::timeout(Duration::from_millis(10), gate.wait())
            .await
            .expect("open gate should not block");
    }

    #[tokio::test]
    async fn test_many_waiters() {
        let gate = ReadinessGate::new();
        let waiters: Vec<_> = (0..8)
            .map(|_| {
                let gate = gate.clone();
                tokio::spawn(async move { gate.wait().await })
            })
            .collect();

        tokio::task::yield_now().await;
        assert!(gate.fire());

        for waiter in waiters {
            tokio::time::timeout(Duration::from_secs(1), waiter)
                .await
                .expect("waiter should be released")
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_concurrent_fire_has_single_winner() {
        let gate = ReadinessGate::new();
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let gate = gate.clone();
                tokio::spawn(async move { gate.fire() })
            })
            .collect();

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }
}
