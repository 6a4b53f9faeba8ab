//! Mock output backend for testing without hardware.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::backend::{
    AudioBackend, BufferFlags, MixFormat, OutputDevice, PlaybackClient, RenderClient,
};
use crate::config::DeviceId;
use crate::error::{BackendError, BackendStage, MonitorError};
use crate::format::mask;

/// Value a mock write region holds before the caller writes into it.
pub const UNWRITTEN: f32 = f32::MAX;

/// A call observed by [`MockBackend`].
///
/// Client-scoped events carry the serial number of the playback client
/// (starting at 1), so tests can tell sessions apart across resets.
#[derive(Debug, Clone, PartialEq)]
pub enum MockEvent {
    /// A device was opened.
    OpenDevice(DeviceId),
    /// A playback client was activated.
    Activate {
        /// Client serial.
        client: u64,
    },
    /// A client was initialized.
    Initialize {
        /// Client serial.
        client: u64,
        /// Requested buffer duration.
        buffer_duration: Duration,
    },
    /// A client was started.
    Start {
        /// Client serial.
        client: u64,
    },
    /// A client was stopped.
    Stop {
        /// Client serial.
        client: u64,
    },
    /// A write region was requested.
    GetBuffer {
        /// Client serial.
        client: u64,
        /// Frames requested.
        frames: u32,
    },
    /// A write region was released.
    Release {
        /// Client serial.
        client: u64,
        /// Frames released.
        frames: u32,
        /// Release flags.
        flags: BufferFlags,
        /// Whether any sample in the region was written.
        touched: bool,
    },
}

/// Handles currently alive, by kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LiveResources {
    /// Opened devices.
    pub devices: usize,
    /// Activated playback clients.
    pub clients: usize,
    /// Buffer writers.
    pub render_clients: usize,
}

impl LiveResources {
    /// Returns `true` when nothing is allocated.
    pub fn is_empty(&self) -> bool {
        self.devices == 0 && self.clients == 0 && self.render_clients == 0
    }
}

struct MockState {
    default_format: MixFormat,
    devices: HashMap<String, MixFormat>,
    fail_at: Option<BackendStage>,
    padding: u32,
    buffer_available: bool,
    next_client: u64,
    live: LiveResources,
    events: Vec<MockEvent>,
    written: Vec<f32>,
}

impl MockState {
    fn check(&self, stage: BackendStage) -> Result<(), BackendError> {
        if self.fail_at == Some(stage) {
            return Err(BackendError::new(stage, "injected failure"));
        }
        Ok(())
    }
}

/// A scriptable in-memory [`AudioBackend`].
///
/// This allows testing playback sessions and monitors without actual audio
/// hardware, making it suitable for CI environments. Every call is recorded
/// as a [`MockEvent`], any platform step can be made to fail, and the device
/// padding is set directly.
///
/// Clones share state, so a test can keep a handle while the monitor owns
/// another.
///
/// # Example
///
/// ```
/// use audio_monitor::backend::{AudioBackend, MockBackend, MockEvent};
/// use audio_monitor::DeviceId;
///
/// let backend = MockBackend::new();
/// let device = backend.open_device(&DeviceId::Default).unwrap();
///
/// assert_eq!(backend.live_resources().devices, 1);
/// drop(device);
/// assert!(backend.live_resources().is_empty());
/// assert_eq!(backend.events(), vec![MockEvent::OpenDevice(DeviceId::Default)]);
/// ```
#[derive(Clone)]
pub struct MockBackend {
    state: Arc<Mutex<MockState>>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    /// Creates a backend whose default device is 48 kHz stereo.
    pub fn new() -> Self {
        Self::with_format(MixFormat {
            sample_rate: 48_000,
            channels: 2,
            channel_mask: Some(mask::STEREO),
        })
    }

    /// Creates a backend whose default device uses `format`.
    pub fn with_format(format: MixFormat) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                default_format: format,
                devices: HashMap::new(),
                fail_at: None,
                padding: 0,
                buffer_available: true,
                next_client: 0,
                live: LiveResources::default(),
                events: Vec::new(),
                written: Vec::new(),
            })),
        }
    }

    /// Adds a named device with its own mix format.
    pub fn add_device(&self, id: impl Into<String>, format: MixFormat) {
        self.state.lock().devices.insert(id.into(), format);
    }

    /// Makes the given platform step fail until [`clear_failure`](Self::clear_failure).
    pub fn fail_at(&self, stage: BackendStage) {
        self.state.lock().fail_at = Some(stage);
    }

    /// Removes any injected failure.
    pub fn clear_failure(&self) {
        self.state.lock().fail_at = None;
    }

    /// Sets the padding reported by every client.
    pub fn set_padding(&self, frames: u32) {
        self.state.lock().padding = frames;
    }

    /// Controls whether write regions can be acquired.
    pub fn set_buffer_available(&self, available: bool) {
        self.state.lock().buffer_available = available;
    }

    /// Returns every recorded call, oldest first.
    pub fn events(&self) -> Vec<MockEvent> {
        self.state.lock().events.clone()
    }

    /// Clears the recorded calls and written samples.
    pub fn clear_events(&self) {
        let mut state = self.state.lock();
        state.events.clear();
        state.written.clear();
    }

    /// Returns all samples released with [`BufferFlags::Data`], in order.
    pub fn written(&self) -> Vec<f32> {
        self.state.lock().written.clone()
    }

    /// Returns the handles currently alive.
    pub fn live_resources(&self) -> LiveResources {
        self.state.lock().live
    }

    /// Counts write-region requests.
    pub fn get_buffer_requests(&self) -> usize {
        self.state
            .lock()
            .events
            .iter()
            .filter(|e| matches!(e, MockEvent::GetBuffer { .. }))
            .count()
    }
}

impl AudioBackend for MockBackend {
    fn open_device(&self, id: &DeviceId) -> Result<Box<dyn OutputDevice>, MonitorError> {
        let mut state = self.state.lock();
        state.events.push(MockEvent::OpenDevice(id.clone()));
        state.check(BackendStage::OpenDevice)?;

        let format = match id {
            DeviceId::Default => state.default_format,
            DeviceId::Id(name) => *state
                .devices
                .get(name)
                .ok_or_else(|| MonitorError::DeviceNotFound { id: name.clone() })?,
        };
        state.live.devices += 1;
        drop(state);

        Ok(Box::new(MockDevice {
            backend: self.clone(),
            name: id.to_string(),
            format,
        }))
    }
}

struct MockDevice {
    backend: MockBackend,
    name: String,
    format: MixFormat,
}

impl OutputDevice for MockDevice {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn activate(&mut self) -> Result<Box<dyn PlaybackClient>, BackendError> {
        let mut state = self.backend.state.lock();
        state.check(BackendStage::Activate)?;
        state.next_client += 1;
        let client = state.next_client;
        state.live.clients += 1;
        state.events.push(MockEvent::Activate { client });
        drop(state);

        Ok(Box::new(MockClient {
            backend: self.backend.clone(),
            serial: client,
            format: self.format,
            initialized: None,
        }))
    }
}

impl Drop for MockDevice {
    fn drop(&mut self) {
        self.backend.state.lock().live.devices -= 1;
    }
}

struct MockClient {
    backend: MockBackend,
    serial: u64,
    format: MixFormat,
    initialized: Option<(MixFormat, u32)>,
}

impl MockClient {
    fn initialized(&self, stage: BackendStage) -> Result<(MixFormat, u32), BackendError> {
        self.initialized
            .ok_or_else(|| BackendError::new(stage, "client not initialized"))
    }
}

impl PlaybackClient for MockClient {
    fn mix_format(&self) -> Result<MixFormat, BackendError> {
        self.backend.state.lock().check(BackendStage::MixFormat)?;
        Ok(self.format)
    }

    fn initialize(
        &mut self,
        format: &MixFormat,
        buffer_duration: Duration,
    ) -> Result<(), BackendError> {
        let mut state = self.backend.state.lock();
        state.events.push(MockEvent::Initialize {
            client: self.serial,
            buffer_duration,
        });
        state.check(BackendStage::Initialize)?;

        let frames = (f64::from(format.sample_rate) * buffer_duration.as_secs_f64()) as u32;
        self.initialized = Some((*format, frames));
        Ok(())
    }

    fn buffer_size(&self) -> Result<u32, BackendError> {
        self.backend.state.lock().check(BackendStage::BufferSize)?;
        Ok(self.initialized(BackendStage::BufferSize)?.1)
    }

    fn padding(&self) -> Result<u32, BackendError> {
        let state = self.backend.state.lock();
        state.check(BackendStage::Padding)?;
        Ok(state.padding)
    }

    fn render_client(&mut self) -> Result<Box<dyn RenderClient>, BackendError> {
        let (format, _) = self.initialized(BackendStage::RenderClient)?;
        let mut state = self.backend.state.lock();
        state.check(BackendStage::RenderClient)?;
        state.live.render_clients += 1;
        drop(state);

        Ok(Box::new(MockRenderClient {
            backend: self.backend.clone(),
            client: self.serial,
            channels: usize::from(format.channels),
            region: Vec::new(),
        }))
    }

    fn start(&mut self) -> Result<(), BackendError> {
        let mut state = self.backend.state.lock();
        state.check(BackendStage::Start)?;
        state.events.push(MockEvent::Start {
            client: self.serial,
        });
        Ok(())
    }

    fn stop(&mut self) -> Result<(), BackendError> {
        let mut state = self.backend.state.lock();
        state.events.push(MockEvent::Stop {
            client: self.serial,
        });
        state.check(BackendStage::Stop)
    }
}

impl Drop for MockClient {
    fn drop(&mut self) {
        self.backend.state.lock().live.clients -= 1;
    }
}

struct MockRenderClient {
    backend: MockBackend,
    client: u64,
    channels: usize,
    region: Vec<f32>,
}

impl RenderClient for MockRenderClient {
    fn get_buffer(&mut self, frames: u32) -> Result<&mut [f32], BackendError> {
        let mut state = self.backend.state.lock();
        state.events.push(MockEvent::GetBuffer {
            client: self.client,
            frames,
        });
        state.check(BackendStage::GetBuffer)?;
        if !state.buffer_available {
            return Err(BackendError::new(BackendStage::GetBuffer, "buffer full"));
        }
        drop(state);

        self.region.clear();
        self.region.resize(frames as usize * self.channels, UNWRITTEN);
        Ok(&mut self.region[..])
    }

    fn release_buffer(&mut self, frames: u32, flags: BufferFlags) -> Result<(), BackendError> {
        let samples = (frames as usize * self.channels).min(self.region.len());
        let region = &self.region[..samples];
        let touched = region.iter().any(|s| s.to_bits() != UNWRITTEN.to_bits());

        let mut state = self.backend.state.lock();
        state.events.push(MockEvent::Release {
            client: self.client,
            frames,
            flags,
            touched,
        });
        state.check(BackendStage::ReleaseBuffer)?;
        if flags == BufferFlags::Data {
            state.written.extend_from_slice(region);
        }
        Ok(())
    }
}

impl Drop for MockRenderClient {
    fn drop(&mut self) {
        self.backend.state.lock().live.render_clients -= 1;
    }
}
