//! Error types for audio-monitor.
//!
//! Errors are split into two categories:
//! - **Initialization errors** ([`MonitorError`]): a playback session could
//!   not be opened. Returned from [`AudioMonitor::create()`] and
//!   [`AudioMonitor::reset()`] after every partially acquired resource has
//!   been released.
//! - **Transient delivery failures**: never surfaced as errors. The buffer is
//!   dropped and counted in [`MonitorStats`](crate::MonitorStats).
//!
//! [`AudioMonitor::create()`]: crate::AudioMonitor::create
//! [`AudioMonitor::reset()`]: crate::AudioMonitor::reset

/// Errors that prevent a monitor session from being opened.
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    /// No monitoring device is configured.
    #[error("audio monitoring is disabled (no device configured)")]
    MonitoringDisabled,

    /// The requested output device was not found.
    #[error("output device not found: {id}")]
    DeviceNotFound {
        /// Id of the device that wasn't found.
        id: String,
    },

    /// No default output device is configured on this system.
    #[error("no default output device configured")]
    NoDefaultDevice,

    /// The device's mix format cannot be used for playback.
    #[error("unsupported device format: {format}")]
    UnsupportedFormat {
        /// Description of the rejected format.
        format: String,
    },

    /// A platform audio call failed while opening the session.
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// The format converter could not be built.
    #[error("format converter unavailable: {0}")]
    Converter(#[from] ConvertError),
}

/// A failed call into the platform audio API.
///
/// Only success or failure is interpreted; `reason` is kept for logging.
#[derive(Debug, Clone, thiserror::Error)]
#[error("audio backend failed during {stage}: {reason}")]
pub struct BackendError {
    /// Which platform operation failed.
    pub stage: BackendStage,
    /// Backend-provided description.
    pub reason: String,
}

impl BackendError {
    /// Creates a backend error for the given stage.
    pub fn new(stage: BackendStage, reason: impl Into<String>) -> Self {
        Self {
            stage,
            reason: reason.into(),
        }
    }
}

/// Platform operations that can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendStage {
    /// Looking up or opening the output device.
    OpenDevice,
    /// Activating a playback client on the device.
    Activate,
    /// Querying the device's native mix format.
    MixFormat,
    /// Initializing the shared-mode connection.
    Initialize,
    /// Querying the device buffer size.
    BufferSize,
    /// Querying the current device buffer fill.
    Padding,
    /// Obtaining the buffer writer.
    RenderClient,
    /// Starting the connection.
    Start,
    /// Stopping the connection.
    Stop,
    /// Acquiring a write region.
    GetBuffer,
    /// Releasing a write region.
    ReleaseBuffer,
}

impl std::fmt::Display for BackendStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::OpenDevice => "open device",
            Self::Activate => "activate",
            Self::MixFormat => "mix format query",
            Self::Initialize => "initialize",
            Self::BufferSize => "buffer size query",
            Self::Padding => "padding query",
            Self::RenderClient => "render client",
            Self::Start => "start",
            Self::Stop => "stop",
            Self::GetBuffer => "get buffer",
            Self::ReleaseBuffer => "release buffer",
        };
        f.write_str(name)
    }
}

/// Errors from building or running a [`FormatConverter`](crate::format::FormatConverter).
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConvertError {
    /// The (from, to) pair cannot be converted.
    #[error("unsupported conversion: {reason}")]
    Unsupported {
        /// Why the conversion is unsupported.
        reason: String,
    },

    /// The input buffer does not match the converter's input format.
    #[error("input mismatch: expected {expected} planes of {frames} frames")]
    InputMismatch {
        /// Number of planes the converter expects.
        expected: usize,
        /// Frames requested by the caller.
        frames: u32,
    },

    /// The underlying resampler failed.
    #[error("resampler error: {0}")]
    Resampler(String),
}

impl ConvertError {
    /// Creates an unsupported-conversion error.
    pub fn unsupported(reason: impl Into<String>) -> Self {
        Self::Unsupported {
            reason: reason.into(),
        }
    }
}
