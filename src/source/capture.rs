//! A concrete monitored source.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::source::{same_callback, AudioCapture, AudioData, MonitoredSource};

/// A source that fans its audio out to subscribed callbacks.
///
/// Volume, mute and activation state are atomics so the producer thread
/// reads them without locking. The subscriber list sits behind a read-write
/// lock: dispatch takes the read side, subscription changes the write side.
///
/// # Example
///
/// ```
/// use audio_monitor::source::{CaptureSource, MonitoredSource};
///
/// let source = CaptureSource::new("mic");
/// source.activate();
/// source.set_volume(0.5);
///
/// assert!(source.is_active());
/// assert_eq!(source.user_volume(), 0.5);
///
/// let left = [0.0f32; 480];
/// let right = [0.0f32; 480];
/// source.push_audio(&[&left, &right], 480, 0);
/// ```
pub struct CaptureSource {
    name: String,
    volume: AtomicU32,
    muted: AtomicBool,
    activate_refs: AtomicUsize,
    callbacks: RwLock<Vec<Arc<dyn AudioCapture>>>,
    added: AtomicUsize,
    removed: AtomicUsize,
}

impl CaptureSource {
    /// Creates an inactive source at unity volume.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            volume: AtomicU32::new(1.0f32.to_bits()),
            muted: AtomicBool::new(false),
            activate_refs: AtomicUsize::new(0),
            callbacks: RwLock::new(Vec::new()),
            added: AtomicUsize::new(0),
            removed: AtomicUsize::new(0),
        }
    }

    /// Sets the user volume (linear gain).
    pub fn set_volume(&self, volume: f32) {
        self.volume.store(volume.to_bits(), Ordering::Relaxed);
    }

    /// Sets the mute state.
    pub fn set_muted(&self, muted: bool) {
        self.muted.store(muted, Ordering::Relaxed);
    }

    /// Returns the mute state.
    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::Relaxed)
    }

    /// Adds an activation reference.
    pub fn activate(&self) {
        self.activate_refs.fetch_add(1, Ordering::AcqRel);
    }

    /// Drops an activation reference. Extra calls are ignored.
    pub fn deactivate(&self) {
        let _ = self
            .activate_refs
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |refs| {
                refs.checked_sub(1)
            });
    }

    /// Number of subscribed callbacks.
    pub fn callback_count(&self) -> usize {
        self.callbacks.read().len()
    }

    /// Total `add_audio_capture_callback` calls so far.
    pub fn callbacks_added(&self) -> usize {
        self.added.load(Ordering::Relaxed)
    }

    /// Total `remove_audio_capture_callback` calls so far, including ones
    /// for callbacks that were not subscribed.
    pub fn callbacks_removed(&self) -> usize {
        self.removed.load(Ordering::Relaxed)
    }

    /// Delivers one planar buffer to every subscriber.
    pub fn push_audio(&self, planes: &[&[f32]], frames: u32, timestamp: u64) {
        let audio = AudioData {
            planes,
            frames,
            timestamp,
        };
        let muted = self.is_muted();
        for callback in self.callbacks.read().iter() {
            callback.on_audio(&audio, muted);
        }
    }
}

impl MonitoredSource for CaptureSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_active(&self) -> bool {
        self.activate_refs.load(Ordering::Acquire) > 0
    }

    fn user_volume(&self) -> f32 {
        f32::from_bits(self.volume.load(Ordering::Relaxed))
    }

    fn add_audio_capture_callback(&self, callback: Arc<dyn AudioCapture>) {
        self.callbacks.write().push(callback);
        self.added.fetch_add(1, Ordering::Relaxed);
    }

    fn remove_audio_capture_callback(&self, callback: &Arc<dyn AudioCapture>) {
        self.removed.fetch_add(1, Ordering::Relaxed);
        let mut callbacks = self.callbacks.write();
        if let Some(pos) = callbacks.iter().position(|c| same_callback(c, callback)) {
            callbacks.remove(pos);
        }
    }
}
