//! Single-flight loader for the shared transcription engine
//!
//! The first caller to find the slot `Unloaded` builds the engine; callers
//! arriving while it is `Loading` wait on a readiness channel for at most the
//! configured window. A failed build puts the slot back to `Unloaded` so a
//! later job can retry.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::error::{Error, Result};
use crate::providers::{EngineFactory, TranscriptionEngine};

/// Lifecycle of the shared engine slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Unloaded,
    Loading,
    Ready,
}

enum Slot {
    Unloaded,
    Loading,
    Ready(Arc<dyn TranscriptionEngine>),
}

/// Lazily builds and shares one engine instance
pub struct EngineLoader {
    factory: Arc<dyn EngineFactory>,
    slot: Mutex<Slot>,
    ready_tx: watch::Sender<Option<Arc<dyn TranscriptionEngine>>>,
    wait_timeout: Duration,
}

/// Puts the slot back to `Unloaded` if the loading future is dropped mid-build
struct LoadGuard<'a> {
    loader: &'a EngineLoader,
    armed: bool,
}

impl Drop for LoadGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            *self.loader.slot.lock() = Slot::Unloaded;
        }
    }
}

impl EngineLoader {
    pub fn new(factory: Arc<dyn EngineFactory>, wait_timeout: Duration) -> Self {
        let (ready_tx, _) = watch::channel(None);
        Self {
            factory,
            slot: Mutex::new(Slot::Unloaded),
            ready_tx,
            wait_timeout,
        }
    }

    pub fn state(&self) -> EngineState {
        match &*self.slot.lock() {
            Slot::Unloaded => EngineState::Unloaded,
            Slot::Loading => EngineState::Loading,
            Slot::Ready(_) => EngineState::Ready,
        }
    }

    /// Whether the engine is built, without triggering a load
    pub fn is_ready(&self) -> bool {
        self.state() == EngineState::Ready
    }

    /// Return the shared engine, building it if nobody has yet
    pub async fn acquire(&self) -> Result<Arc<dyn TranscriptionEngine>> {
        let waiter = {
            let mut slot = self.slot.lock();
            match &*slot {
                Slot::Ready(engine) => return Ok(Arc::clone(engine)),
                Slot::Loading => Some(self.ready_tx.subscribe()),
                Slot::Unloaded => {
                    *slot = Slot::Loading;
                    None
                }
            }
        };

        match waiter {
            Some(rx) => self.wait_for_ready(rx).await,
            None => self.build().await,
        }
    }

    async fn build(&self) -> Result<Arc<dyn TranscriptionEngine>> {
        let mut guard = LoadGuard {
            loader: self,
            armed: true,
        };
        let started = std::time::Instant::now();

        let loaded = self.factory.load().await;
        guard.armed = false;

        match loaded {
            Ok(engine) => {
                *self.slot.lock() = Slot::Ready(Arc::clone(&engine));
                self.ready_tx.send_replace(Some(Arc::clone(&engine)));
                tracing::info!(
                    "Engine '{}' ready after {:.1}s",
                    engine.name(),
                    started.elapsed().as_secs_f64()
                );
                Ok(engine)
            }
            Err(e) => {
                *self.slot.lock() = Slot::Unloaded;
                tracing::error!("Engine load failed: {}", e);
                Err(match e {
                    Error::EngineLoad(_) => e,
                    other => Error::engine_load(other.to_string()),
                })
            }
        }
    }

    async fn wait_for_ready(
        &self,
        mut rx: watch::Receiver<Option<Arc<dyn TranscriptionEngine>>>,
    ) -> Result<Arc<dyn TranscriptionEngine>> {
        tracing::debug!("Engine is loading, waiting up to {}s", self.wait_timeout.as_secs());

        match tokio::time::timeout(self.wait_timeout, rx.wait_for(Option::is_some)).await {
            Ok(Ok(engine)) => engine
                .as_ref()
                .map(Arc::clone)
                .ok_or_else(|| Error::internal("engine slot published without an engine")),
            Ok(Err(_)) => Err(Error::engine_load("engine loader shut down")),
            Err(_) => {
                tracing::warn!(
                    "Gave up waiting for engine after {}s",
                    self.wait_timeout.as_secs()
                );
                Err(Error::EngineLoadTimeout(self.wait_timeout.as_secs()))
            }
        }
    }
}
