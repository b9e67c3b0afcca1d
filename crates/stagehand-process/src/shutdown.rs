//! Host shutdown signalling.

use tokio_util::sync::CancellationToken;

/// Answers whether the host is shutting down.
///
/// Supervisors consult this before every restart so that children killed
/// by host teardown are not relaunched.
pub trait ShutdownCoordinator: Send + Sync {
    fn is_shutting_down(&self) -> bool;
}

/// One-way shutdown flag that tasks can also await.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    token: CancellationToken,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.token.cancel();
    }

    /// Completes once [`trigger`](Self::trigger) has been called.
    pub async fn triggered(&self) {
        self.token.cancelled().await
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}

impl ShutdownCoordinator for ShutdownSignal {
    fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_trigger_is_observed_by_clones() {
        let signal = ShutdownSignal::new();
        let observer = signal.clone();
        assert!(!observer.is_shutting_down());

        let waiter = tokio::spawn(async move { observer.triggered().await });
        signal.trigger();

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(signal.is_shutting_down());
    }
}
