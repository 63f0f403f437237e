// src/observer.rs

//! Snapshot publishing toward the host's visualizer.
//!
//! The driver pushes one snapshot per tick through a trait object supplied
//! by the host. The observer is expected to throttle itself; the driver
//! never waits on it, and a panicking observer is caught and logged so host
//! bugs cannot stall or kill the audio pipeline.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, RwLock};

use tracing::warn;

use crate::evaluate::AudioParams;
use crate::mapping::Mapping;
use crate::record::Record;

/// Everything the visualizer needs to draw one tick.
#[derive(Debug, Clone)]
pub struct TickSnapshot {
    pub record: Record,
    pub params: AudioParams,
    pub mappings: Vec<Mapping>,
    /// 1-based position within the record list.
    pub index: usize,
    pub total: usize,
    pub is_playing: bool,
}

/// One-shot, typed notices surfaced to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// Sampler mode is active but no sample is loaded; notes are silent.
    NoSample,
    /// A sample byte buffer failed to decode; the prior sample is intact.
    DecodeFailed(String),
}

/// Host-supplied observer interface.
pub trait TickObserver: Send + Sync {
    fn on_tick(&self, snapshot: &TickSnapshot);
    /// Playback stopped or ended; visualization state should clear.
    fn on_cleared(&self);
    fn on_notice(&self, _notice: &Notice) {}
}

/// Shared slot holding the currently registered observer.
#[derive(Clone, Default)]
pub(crate) struct ObserverSlot {
    inner: Arc<RwLock<Option<Arc<dyn TickObserver>>>>,
}

impl ObserverSlot {
    pub fn new() -> ObserverSlot {
        ObserverSlot::default()
    }

    pub fn register(&self, observer: Arc<dyn TickObserver>) {
        if let Ok(mut slot) = self.inner.write() {
            *slot = Some(observer);
        }
    }

    fn current(&self) -> Option<Arc<dyn TickObserver>> {
        self.inner.read().ok().and_then(|slot| slot.clone())
    }

    pub fn publish_tick(&self, snapshot: &TickSnapshot) {
        if let Some(observer) = self.current() {
            if catch_unwind(AssertUnwindSafe(|| observer.on_tick(snapshot))).is_err() {
                warn!("observer panicked in on_tick");
            }
        }
    }

    pub fn publish_cleared(&self) {
        if let Some(observer) = self.current() {
            if catch_unwind(AssertUnwindSafe(|| observer.on_cleared())).is_err() {
                warn!("observer panicked in on_cleared");
            }
        }
    }

    pub fn publish_notice(&self, notice: &Notice) {
        if let Some(observer) = self.current() {
            if catch_unwind(AssertUnwindSafe(|| observer.on_notice(notice))).is_err() {
                warn!("observer panicked in on_notice");
            }
        }
    }
}
