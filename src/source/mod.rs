//! Monitored source abstraction.
//!
//! A monitor never owns the source it plays. It subscribes an
//! [`AudioCapture`] callback and reads the source's live volume and
//! activation state through [`MonitoredSource`].

mod capture;
mod tone;

pub use capture::CaptureSource;
pub use tone::ToneGenerator;

use std::sync::Arc;

/// One buffer of post-processed source audio.
///
/// Planar `f32` in the pipeline format: one plane per channel, each at least
/// `frames` samples long.
#[derive(Debug, Clone, Copy)]
pub struct AudioData<'a> {
    /// One slice per channel.
    pub planes: &'a [&'a [f32]],
    /// Frames per plane.
    pub frames: u32,
    /// Pipeline timestamp in nanoseconds.
    pub timestamp: u64,
}

/// Receives every audio buffer a source produces.
///
/// Called on the source's audio thread, which must never be made to wait.
pub trait AudioCapture: Send + Sync {
    /// Handles one buffer. `muted` is the source's mute state for this buffer.
    fn on_audio(&self, audio: &AudioData<'_>, muted: bool);
}

/// An audio-producing source that monitors can subscribe to.
pub trait MonitoredSource: Send + Sync {
    /// Name for logging.
    fn name(&self) -> &str;

    /// Returns `true` while the source is active (its activation count is non-zero).
    fn is_active(&self) -> bool;

    /// Current user volume, linear gain.
    fn user_volume(&self) -> f32;

    /// Subscribes `callback` to this source's audio.
    fn add_audio_capture_callback(&self, callback: Arc<dyn AudioCapture>);

    /// Unsubscribes `callback`, matched by pointer identity.
    fn remove_audio_capture_callback(&self, callback: &Arc<dyn AudioCapture>);
}

/// Returns `true` if both handles point at the same callback object.
///
/// Compares data pointers only, so the same object reached through different
/// vtables still matches.
pub fn same_callback(a: &Arc<dyn AudioCapture>, b: &Arc<dyn AudioCapture>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a).cast::<()>(),
        Arc::as_ptr(b).cast::<()>(),
    )
}
