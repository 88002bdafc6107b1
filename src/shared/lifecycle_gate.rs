use crate::errors::OrchestratorError;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Keeps session creation and shutdown from interleaving.
///
/// Creates hold a read guard for their whole duration; shutdown flips the
/// closing flag, then waits for the write guard, so every in-flight create
/// finishes first and no new one starts.
#[derive(Debug, Default)]
pub struct LifecycleGate {
    closing: AtomicBool,
    lock: RwLock<()>,
}

impl LifecycleGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn enter(&self) -> Result<RwLockReadGuard<'_, ()>, OrchestratorError> {
        if self.is_closing() {
            return Err(OrchestratorError::ShuttingDown);
        }
        let guard = self.lock.read().await;
        // Shutdown may have started while we were queued.
        if self.is_closing() {
            return Err(OrchestratorError::ShuttingDown);
        }
        Ok(guard)
    }

    pub async fn close(&self) -> RwLockWriteGuard<'_, ()> {
        self.closing.store(true, Ordering::SeqCst);
        self.lock.write().await
    }

    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::SeqCst)
    }
}
