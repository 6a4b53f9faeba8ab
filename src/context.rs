//! Shared monitoring environment.

use parking_lot::RwLock;

use crate::backend::AudioBackend;
use crate::config::{DeviceId, MonitorConfig, PipelineFormat};
use crate::format::{ConverterFactory, ResamplingFactory};

/// Everything a monitor needs to open playback sessions.
///
/// One context is shared (behind an `Arc`) by every monitor in the process.
/// The configuration is live: changing the device here affects the next
/// session any monitor opens, which is why a device change is followed by a
/// reset of every monitor (see [`ProcessRegistry::reset_all`]).
///
/// # Example
///
/// ```
/// use audio_monitor::backend::MockBackend;
/// use audio_monitor::{DeviceId, MonitorContext};
///
/// let ctx = MonitorContext::new(MockBackend::new());
/// assert_eq!(ctx.device(), Some(DeviceId::Default));
///
/// ctx.set_device(Some(DeviceId::new("Headphones")));
/// assert_eq!(ctx.device(), Some(DeviceId::new("Headphones")));
/// ```
///
/// [`ProcessRegistry::reset_all`]: crate::ProcessRegistry::reset_all
#[must_use]
pub struct MonitorContext {
    backend: Box<dyn AudioBackend>,
    converters: Box<dyn ConverterFactory>,
    pipeline: PipelineFormat,
    config: RwLock<MonitorConfig>,
}

impl MonitorContext {
    /// Creates a context with the default pipeline format, configuration and converter.
    pub fn new(backend: impl AudioBackend + 'static) -> Self {
        Self {
            backend: Box::new(backend),
            converters: Box::new(ResamplingFactory),
            pipeline: PipelineFormat::default(),
            config: RwLock::new(MonitorConfig::default()),
        }
    }

    /// Sets the pipeline's internal format.
    pub fn with_pipeline(mut self, pipeline: PipelineFormat) -> Self {
        self.pipeline = pipeline;
        self
    }

    /// Sets the monitor configuration.
    pub fn with_config(self, config: MonitorConfig) -> Self {
        *self.config.write() = config;
        self
    }

    /// Replaces the converter factory.
    pub fn with_converter_factory(mut self, factory: impl ConverterFactory + 'static) -> Self {
        self.converters = Box::new(factory);
        self
    }

    /// The platform audio API.
    pub fn backend(&self) -> &dyn AudioBackend {
        self.backend.as_ref()
    }

    /// The converter factory.
    pub fn converters(&self) -> &dyn ConverterFactory {
        self.converters.as_ref()
    }

    /// The pipeline's internal format.
    pub fn pipeline(&self) -> PipelineFormat {
        self.pipeline
    }

    /// A snapshot of the current configuration.
    pub fn config(&self) -> MonitorConfig {
        self.config.read().clone()
    }

    /// The configured monitoring device; `None` when monitoring is disabled.
    pub fn device(&self) -> Option<DeviceId> {
        self.config.read().device.clone()
    }

    /// Changes the monitoring device.
    ///
    /// Existing monitors keep playing to the old device until they are reset.
    pub fn set_device(&self, device: Option<DeviceId>) {
        let mut config = self.config.write();
        tracing::info!(
            from = ?config.device,
            to = ?device,
            "monitoring device changed"
        );
        config.device = device;
    }
}
