//! Platform audio API contract.
//!
//! A playback session talks to the output device only through these traits:
//!
//! - [`AudioBackend`]: opens a device by id (or the default device)
//! - [`OutputDevice`]: an opened device; activates playback clients
//! - [`PlaybackClient`]: a negotiated connection (format, buffer, padding, start/stop)
//! - [`RenderClient`]: acquires and releases write regions of the device buffer
//!
//! Every call returns `Result`; callers only distinguish success from failure.
//!
//! Two implementations ship with the crate: [`CpalBackend`] for real hardware
//! and [`MockBackend`] for tests.

mod cpal_backend;
mod mock;

pub use cpal_backend::CpalBackend;
pub use mock::{LiveResources, MockBackend, MockEvent, UNWRITTEN};

use std::time::Duration;

use crate::config::DeviceId;
use crate::error::{BackendError, MonitorError};

/// A device's native mix format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MixFormat {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Number of interleaved channels.
    pub channels: u16,
    /// Speaker position bitmask, when the platform reports one.
    pub channel_mask: Option<u32>,
}

/// How a released write region should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferFlags {
    /// The region holds audio written by the caller.
    Data,
    /// The region should play as silence; its contents were not written.
    Silent,
}

/// Entry point into the platform audio API.
pub trait AudioBackend: Send + Sync {
    /// Opens an output device.
    ///
    /// [`DeviceId::Default`] selects the system default render endpoint.
    fn open_device(&self, id: &DeviceId) -> Result<Box<dyn OutputDevice>, MonitorError>;
}

/// An opened output device.
pub trait OutputDevice: Send {
    /// Human-readable device name.
    fn name(&self) -> String;

    /// Activates a playback client on this device.
    fn activate(&mut self) -> Result<Box<dyn PlaybackClient>, BackendError>;
}

/// A playback connection to an output device.
pub trait PlaybackClient: Send {
    /// Returns the device's native mix format.
    fn mix_format(&self) -> Result<MixFormat, BackendError>;

    /// Initializes a shared-mode connection in `format` with roughly
    /// `buffer_duration` of buffering. The device picks the exact size.
    fn initialize(&mut self, format: &MixFormat, buffer_duration: Duration)
        -> Result<(), BackendError>;

    /// Total device buffer size in frames.
    fn buffer_size(&self) -> Result<u32, BackendError>;

    /// Frames queued in the device buffer and not yet played.
    fn padding(&self) -> Result<u32, BackendError>;

    /// Returns the writer for the device buffer.
    fn render_client(&mut self) -> Result<Box<dyn RenderClient>, BackendError>;

    /// Starts playback.
    fn start(&mut self) -> Result<(), BackendError>;

    /// Stops playback.
    fn stop(&mut self) -> Result<(), BackendError>;
}

/// Writes into the device's ring buffer through acquire/release pairs.
pub trait RenderClient: Send {
    /// Acquires a contiguous region of exactly `frames` interleaved frames.
    fn get_buffer(&mut self, frames: u32) -> Result<&mut [f32], BackendError>;

    /// Releases the region acquired by the last [`get_buffer`](Self::get_buffer).
    fn release_buffer(&mut self, frames: u32, flags: BufferFlags) -> Result<(), BackendError>;
}
