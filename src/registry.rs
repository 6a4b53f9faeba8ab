//! Process-wide bookkeeping of live monitors.
//!
//! The registry exists so a device change can reset every monitor at once.
//! It holds weak handles only: a registered monitor is owned by whoever
//! created it, never by the registry.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::error::MonitorError;
use crate::monitor::MonitorInner;

static NEXT_MONITOR_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier of a monitor within the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MonitorId(u64);

impl MonitorId {
    pub(crate) fn next() -> Self {
        Self(NEXT_MONITOR_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw id.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for MonitorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "monitor-{}", self.0)
    }
}

/// A non-owning handle to a registered monitor.
#[derive(Clone)]
pub struct MonitorHandle {
    inner: Weak<MonitorInner>,
}

impl MonitorHandle {
    pub(crate) fn new(inner: &Arc<MonitorInner>) -> Self {
        Self {
            inner: Arc::downgrade(inner),
        }
    }

    /// Returns `true` while the monitor has not been destroyed.
    pub fn is_alive(&self) -> bool {
        self.inner
            .upgrade()
            .is_some_and(|inner| !inner.is_torn_down())
    }

    /// Rebuilds the monitor's playback session against the current device.
    ///
    /// A monitor that is already gone has nothing to reset and returns `Ok`.
    ///
    /// # Errors
    ///
    /// Returns the reason the replacement session could not be opened.
    pub fn reset(&self) -> Result<(), MonitorError> {
        match self.inner.upgrade() {
            Some(inner) => inner.reset(),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for MonitorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MonitorHandle")
            .field("alive", &self.is_alive())
            .finish()
    }
}

/// Collection of live monitors.
///
/// Monitors register themselves after their first session opens and
/// unregister during teardown.
pub trait MonitorRegistry: Send + Sync {
    /// Adds a monitor.
    fn register(&self, id: MonitorId, handle: MonitorHandle);

    /// Removes a monitor. Unknown ids are ignored.
    fn unregister(&self, id: MonitorId);
}

/// The default [`MonitorRegistry`], usually one per process.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use audio_monitor::backend::MockBackend;
/// use audio_monitor::source::{CaptureSource, MonitoredSource};
/// use audio_monitor::{AudioMonitor, MonitorContext, ProcessRegistry};
///
/// let ctx = Arc::new(MonitorContext::new(MockBackend::new()));
/// let registry = Arc::new(ProcessRegistry::new());
/// let source: Arc<dyn MonitoredSource> = Arc::new(CaptureSource::new("mic"));
///
/// let monitor = AudioMonitor::create(ctx, registry.clone(), &source).unwrap();
/// assert_eq!(registry.ids(), vec![monitor.id()]);
///
/// assert_eq!(registry.reset_all(), 1);
/// monitor.destroy();
/// assert!(registry.is_empty());
/// ```
#[derive(Default)]
pub struct ProcessRegistry {
    monitors: Mutex<Vec<(MonitorId, MonitorHandle)>>,
}

impl ProcessRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered monitors.
    pub fn len(&self) -> usize {
        self.monitors.lock().len()
    }

    /// Returns `true` if no monitor is registered.
    pub fn is_empty(&self) -> bool {
        self.monitors.lock().is_empty()
    }

    /// Ids of registered monitors in registration order.
    pub fn ids(&self) -> Vec<MonitorId> {
        self.monitors.lock().iter().map(|(id, _)| *id).collect()
    }

    /// Returns `true` if `id` is registered.
    pub fn contains(&self, id: MonitorId) -> bool {
        self.monitors.lock().iter().any(|(other, _)| *other == id)
    }

    /// Resets every registered monitor and returns how many succeeded.
    ///
    /// Call after changing the monitoring device. A monitor whose reset fails
    /// keeps its previous session.
    pub fn reset_all(&self) -> usize {
        let monitors = self.monitors.lock().clone();

        let mut reset = 0;
        for (id, handle) in monitors {
            match handle.reset() {
                Ok(()) => reset += 1,
                Err(e) => tracing::warn!(monitor = %id, error = %e, "monitor reset failed"),
            }
        }

        tracing::info!(reset, "monitors reset");
        reset
    }
}

impl MonitorRegistry for ProcessRegistry {
    fn register(&self, id: MonitorId, handle: MonitorHandle) {
        let mut monitors = self.monitors.lock();
        monitors.push((id, handle));
        tracing::debug!(monitor = %id, live = monitors.len(), "monitor registered");
    }

    fn unregister(&self, id: MonitorId) {
        let mut monitors = self.monitors.lock();
        monitors.retain(|(other, _)| *other != id);
        tracing::debug!(monitor = %id, live = monitors.len(), "monitor unregistered");
    }
}
