//! Cooperative shutdown coordination.
//!
//! A [`ShutdownCoordinator`] is owned by the process bootstrap and handed by
//! reference to components that need to register cleanup hooks or observe
//! cancellation. The consumer loop checks the token once per iteration;
//! in-flight poll/decode/dispatch/commit sequences are never interrupted.

use std::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::info;

type Hook = Box<dyn FnOnce() + Send>;

/// Explicit registry of shutdown hooks plus a cloneable cancellation token.
pub struct ShutdownCoordinator {
    token: CancellationToken,
    hooks: Mutex<Vec<Hook>>,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            hooks: Mutex::new(Vec::new()),
        }
    }

    /// Registers a cleanup hook to run when shutdown is broadcast.
    ///
    /// Hooks run in registration order, on the task that calls
    /// [`broadcast`](Self::broadcast).
    pub fn register<F>(&self, hook: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.hooks
            .lock()
            .expect("shutdown hook lock poisoned")
            .push(Box::new(hook));
    }

    /// Cancels the token and runs all registered hooks.
    pub fn broadcast(&self) {
        info!("Broadcasting shutdown");
        self.token.cancel();
        let hooks = std::mem::take(
            &mut *self.hooks.lock().expect("shutdown hook lock poisoned"),
        );
        for hook in hooks {
            hook();
        }
    }

    /// A cloneable token observed cooperatively by background loops.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn broadcast_cancels_token_and_runs_hooks() {
        let coordinator = ShutdownCoordinator::new();
        let counter = Arc::new(AtomicU32::new(0));

        for _ in 0..3 {
            let counter = Arc::clone(&counter);
            coordinator.register(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }

        let token = coordinator.token();
        assert!(!token.is_cancelled());

        coordinator.broadcast();

        assert!(token.is_cancelled());
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn hooks_run_once() {
        let coordinator = ShutdownCoordinator::new();
        let counter = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&counter);
        coordinator.register(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });

        coordinator.broadcast();
        coordinator.broadcast();

        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
