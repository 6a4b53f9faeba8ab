//! The monitor lifecycle controller.
//!
//! An [`AudioMonitor`] plays one source's audio to the monitoring device.
//! Two threads touch it:
//!
//! - the source's audio thread, which delivers buffers and must never wait
//! - a control thread, which creates, resets and destroys the monitor
//!
//! The session sits behind a guard lock. The audio thread only ever
//! `try_lock`s it and drops the buffer when a control operation holds it.
//! Control operations hold it just long enough to swap or take the session;
//! opening and closing sessions happens outside it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::context::MonitorContext;
use crate::error::MonitorError;
use crate::registry::{MonitorHandle, MonitorId, MonitorRegistry};
use crate::session::{Delivery, DropReason, PlaybackSession};
use crate::source::{AudioCapture, AudioData, MonitoredSource};
use crate::stats::{MonitorStats, StatsCounters};

/// State shared between the owner, the source subscription and the registry.
pub(crate) struct MonitorInner {
    id: MonitorId,
    ctx: Arc<MonitorContext>,
    registry: Arc<dyn MonitorRegistry>,
    source: Weak<dyn MonitoredSource>,
    source_name: String,
    session: Mutex<Option<PlaybackSession>>,
    // Serializes reset and teardown with each other.
    control: Mutex<()>,
    torn_down: AtomicBool,
    stats: StatsCounters,
}

impl MonitorInner {
    pub(crate) fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::Acquire)
    }

    fn callback(self: &Arc<Self>) -> Arc<dyn AudioCapture> {
        Arc::clone(self) as Arc<dyn AudioCapture>
    }

    fn deliver(&self, audio: &AudioData<'_>, muted: bool) -> Delivery {
        let Some(mut guard) = self.session.try_lock() else {
            return Delivery::Dropped(DropReason::LockBusy);
        };
        let Some(session) = guard.as_mut() else {
            return Delivery::Dropped(DropReason::NoSession);
        };
        let Some(source) = self.source.upgrade() else {
            return Delivery::Dropped(DropReason::Inactive);
        };
        if !source.is_active() {
            return Delivery::Dropped(DropReason::Inactive);
        }

        session.deliver(audio, source.user_volume(), muted)
    }

    pub(crate) fn reset(self: &Arc<Self>) -> Result<(), MonitorError> {
        let _control = self.control.lock();
        if self.is_torn_down() {
            return Ok(());
        }

        let candidate = match PlaybackSession::open(&self.ctx) {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!(
                    monitor = %self.id,
                    source = %self.source_name,
                    error = %e,
                    "monitor reset failed, keeping previous session"
                );
                return Err(e);
            }
        };
        let device = candidate.device_name();

        let callback = self.callback();
        let source = self.source.upgrade();
        if let Some(source) = &source {
            source.remove_audio_capture_callback(&callback);
        }

        let previous = self.session.lock().replace(candidate);
        drop(previous);

        if let Some(source) = &source {
            source.add_audio_capture_callback(callback);
        }

        tracing::info!(
            monitor = %self.id,
            source = %self.source_name,
            %device,
            "monitor reset"
        );
        Ok(())
    }

    /// Unsubscribes, closes the session and unregisters. Runs at most once.
    fn teardown(self: &Arc<Self>) {
        let _control = self.control.lock();
        if self.torn_down.swap(true, Ordering::AcqRel) {
            return;
        }

        if let Some(source) = self.source.upgrade() {
            source.remove_audio_capture_callback(&self.callback());
        }

        let session = self.session.lock().take();
        drop(session);

        self.registry.unregister(self.id);
        tracing::info!(monitor = %self.id, source = %self.source_name, "monitor destroyed");
    }
}

impl AudioCapture for MonitorInner {
    fn on_audio(&self, audio: &AudioData<'_>, muted: bool) {
        let delivery = self.deliver(audio, muted);
        self.stats.record(delivery);
    }
}

/// Plays a source's audio on the monitoring device.
///
/// Created with [`AudioMonitor::create`], which opens a playback session,
/// registers the monitor and subscribes it to the source. Dropping the
/// monitor tears it down the same way [`AudioMonitor::destroy`] does.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use audio_monitor::backend::MockBackend;
/// use audio_monitor::source::{CaptureSource, MonitoredSource};
/// use audio_monitor::{AudioMonitor, MonitorContext, ProcessRegistry};
///
/// let backend = MockBackend::new();
/// let ctx = Arc::new(MonitorContext::new(backend.clone()));
/// let registry = Arc::new(ProcessRegistry::new());
/// let source = Arc::new(CaptureSource::new("mic"));
/// let dyn_source: Arc<dyn MonitoredSource> = source.clone();
///
/// let monitor = AudioMonitor::create(ctx, registry, &dyn_source).unwrap();
///
/// source.activate();
/// let left = [0.25f32; 480];
/// let right = [0.25f32; 480];
/// source.push_audio(&[&left, &right], 480, 0);
///
/// assert_eq!(monitor.stats().buffers_written, 1);
/// assert_eq!(backend.written().len(), 960);
/// monitor.destroy();
/// ```
pub struct AudioMonitor {
    inner: Arc<MonitorInner>,
}

impl AudioMonitor {
    /// Opens a session on the configured device, registers the monitor and
    /// subscribes it to `source`.
    ///
    /// # Errors
    ///
    /// Returns why the session could not be opened. On error nothing is
    /// registered or subscribed.
    pub fn create(
        ctx: Arc<MonitorContext>,
        registry: Arc<dyn MonitorRegistry>,
        source: &Arc<dyn MonitoredSource>,
    ) -> Result<Self, MonitorError> {
        let session = match PlaybackSession::open(&ctx) {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!(source = %source.name(), error = %e, "monitor creation failed");
                return Err(e);
            }
        };
        let device = session.device_name();

        let inner = Arc::new(MonitorInner {
            id: MonitorId::next(),
            ctx,
            registry,
            source: Arc::downgrade(source),
            source_name: source.name().to_owned(),
            session: Mutex::new(Some(session)),
            control: Mutex::new(()),
            torn_down: AtomicBool::new(false),
            stats: StatsCounters::default(),
        });

        inner.registry.register(inner.id, MonitorHandle::new(&inner));
        source.add_audio_capture_callback(inner.callback());

        tracing::info!(
            monitor = %inner.id,
            source = %inner.source_name,
            %device,
            "monitor created"
        );
        Ok(Self { inner })
    }

    /// This monitor's id.
    pub fn id(&self) -> MonitorId {
        self.inner.id
    }

    /// A weak handle to this monitor.
    pub fn handle(&self) -> MonitorHandle {
        MonitorHandle::new(&self.inner)
    }

    /// Replaces the playback session with one on the currently configured device.
    ///
    /// On failure the previous session stays in place and keeps playing.
    ///
    /// # Errors
    ///
    /// Returns why the replacement session could not be opened.
    pub fn reset(&self) -> Result<(), MonitorError> {
        self.inner.reset()
    }

    /// Unsubscribes from the source, closes the session and unregisters.
    pub fn destroy(self) {
        self.inner.teardown();
    }

    /// Delivery counters since creation.
    pub fn stats(&self) -> MonitorStats {
        self.inner.stats.snapshot()
    }

    /// Returns `true` while a playback session is open.
    pub fn has_session(&self) -> bool {
        self.inner.session.lock().is_some()
    }

    /// Name of the device the current session plays to.
    pub fn device_name(&self) -> Option<String> {
        self.inner
            .session
            .lock()
            .as_ref()
            .map(PlaybackSession::device_name)
    }

    /// The current session's largest converted frame count.
    pub fn frame_watermark(&self) -> Option<u32> {
        self.inner
            .session
            .lock()
            .as_ref()
            .map(PlaybackSession::frame_watermark)
    }

    /// The current session's backpressure threshold in frames.
    pub fn backpressure_threshold(&self) -> Option<u32> {
        self.inner
            .session
            .lock()
            .as_ref()
            .map(PlaybackSession::backpressure_threshold)
    }
}

impl Drop for AudioMonitor {
    fn drop(&mut self) {
        self.inner.teardown();
    }
}

impl std::fmt::Debug for AudioMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioMonitor")
            .field("id", &self.inner.id)
            .field("source", &self.inner.source_name)
            .finish_non_exhaustive()
    }
}
