//! Configuration types for audio monitoring.

use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::format::SpeakerLayout;

/// Sentinel device id selecting the system default output device.
pub const DEFAULT_DEVICE_ID: &str = "default";

/// Identifies the output device monitors play to.
///
/// Parsed from a configuration string: the literal `"default"` selects the
/// system default render endpoint, anything else is a platform device id.
///
/// ```
/// use audio_monitor::DeviceId;
///
/// let id: DeviceId = "default".parse().unwrap();
/// assert_eq!(id, DeviceId::Default);
///
/// let id: DeviceId = "Speakers (USB Audio)".parse().unwrap();
/// assert_eq!(id.as_str(), "Speakers (USB Audio)");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum DeviceId {
    /// The system default output device.
    #[default]
    Default,
    /// A specific device by platform id.
    Id(String),
}

impl DeviceId {
    /// Creates a device id, mapping the `"default"` sentinel to [`DeviceId::Default`].
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        if id == DEFAULT_DEVICE_ID {
            Self::Default
        } else {
            Self::Id(id)
        }
    }

    /// Returns the id as it appears in configuration.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Default => DEFAULT_DEVICE_ID,
            Self::Id(id) => id,
        }
    }

    /// Returns `true` for the system default device.
    pub fn is_default(&self) -> bool {
        matches!(self, Self::Default)
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceId {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

impl From<&str> for DeviceId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// The pipeline's fixed internal audio format.
///
/// Source buffers always arrive as planar `f32` in this rate and layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineFormat {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Channel layout of the source planes.
    pub layout: SpeakerLayout,
}

impl Default for PipelineFormat {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            layout: SpeakerLayout::Stereo,
        }
    }
}

/// Configuration for monitor sessions.
///
/// Use [`MonitorConfig::default()`] for sensible defaults, or customize as needed.
///
/// # Example
///
/// ```
/// use audio_monitor::{DeviceId, MonitorConfig};
///
/// let config = MonitorConfig {
///     device: Some(DeviceId::new("Headphones")),
///     ..Default::default()
/// };
/// assert_eq!(config.backpressure_factor, 2);
/// ```
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Output device to monitor through.
    ///
    /// `None` disables monitoring: new sessions fail to open.
    /// Default: the system default device
    pub device: Option<DeviceId>,

    /// Requested capacity of the device buffer.
    ///
    /// The device picks the exact frame count.
    /// Default: 1 second
    pub buffer_duration: Duration,

    /// Backpressure threshold as a multiple of the frame watermark.
    ///
    /// A buffer is dropped when the device already holds more than
    /// `backpressure_factor × watermark` unplayed frames. The value is a
    /// heuristic; 2 matches long-standing behavior.
    /// Default: 2
    pub backpressure_factor: u32,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            device: Some(DeviceId::Default),
            buffer_duration: Duration::from_secs(1),
            backpressure_factor: 2,
        }
    }
}
