//! # Adaptive Engine Slot
//!
//! Owns the lazily created adaptive streaming engine.
//!
//! - The first [`acquire`](AdaptiveEngineSlot::acquire) creates the engine;
//!   concurrent callers wait for that single initialisation.
//! - [`release`](AdaptiveEngineSlot::release) destroys it, and the next
//!   acquire creates a new one.
//! - Dropping the slot destroys any live engine.

use crate::error::Result;
use crate::traits::{AdaptiveEngine, AdaptiveEngineFactory};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

type EngineCell = OnceCell<Arc<dyn AdaptiveEngine>>;

pub struct AdaptiveEngineSlot {
    factory: Arc<dyn AdaptiveEngineFactory>,
    cell: Mutex<Arc<EngineCell>>,
}

impl AdaptiveEngineSlot {
    pub fn new(factory: Arc<dyn AdaptiveEngineFactory>) -> Self {
        Self {
            factory,
            cell: Mutex::new(Arc::new(OnceCell::new())),
        }
    }

    /// Return the engine, creating it on first use.
    ///
    /// # Errors
    ///
    /// Propagates the factory error. A failed initialisation leaves the slot
    /// empty, so a later call tries again.
    pub async fn acquire(&self) -> Result<Arc<dyn AdaptiveEngine>> {
        let cell = Arc::clone(&self.cell.lock());
        let engine = cell
            .get_or_try_init(|| async {
                debug!("Creating adaptive engine");
                self.factory.create().await
            })
            .await?;
        Ok(Arc::clone(engine))
    }

    /// The engine if it has been created.
    pub fn current(&self) -> Option<Arc<dyn AdaptiveEngine>> {
        self.cell.lock().get().cloned()
    }

    pub fn is_active(&self) -> bool {
        self.cell.lock().initialized()
    }

    /// Detach the live engine from the device without destroying it.
    pub fn detach(&self) {
        if let Some(engine) = self.current() {
            if let Err(e) = engine.detach() {
                warn!(error = %e, "Adaptive engine detach failed");
            }
        }
    }

    /// Destroy the live engine, if any.
    pub fn release(&self) {
        let previous = std::mem::replace(&mut *self.cell.lock(), Arc::new(OnceCell::new()));
        if let Some(engine) = previous.get() {
            debug!("Destroying adaptive engine");
            engine.destroy();
        }
    }
}

impl Drop for AdaptiveEngineSlot {
    fn drop(&mut self) {
        if let Some(engine) = self.cell.get_mut().get() {
            engine.destroy();
        }
    }
}

impl std::fmt::Debug for AdaptiveEngineSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdaptiveEngineSlot")
            .field("active", &self.is_active())
            .finish()
    }
}
