//! # audio-monitor
//!
//! **Note:** This crate is under active development. The API may change before 1.0.
//!
//! Real-time audio monitoring: play one source's audio to a local output device.
//!
//! A monitor subscribes to a source's post-processed audio, converts each
//! buffer to the output device's native format and writes it into the
//! device's playback buffer. It applies the source's volume and honors its
//! mute state. When the monitoring device changes, every monitor is reset to
//! the new device through the process registry.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use audio_monitor::backend::CpalBackend;
//! use audio_monitor::source::{CaptureSource, MonitoredSource};
//! use audio_monitor::{AudioMonitor, DeviceId, MonitorContext, ProcessRegistry};
//!
//! # fn main() -> Result<(), audio_monitor::MonitorError> {
//! let ctx = Arc::new(MonitorContext::new(CpalBackend));
//! let registry = Arc::new(ProcessRegistry::new());
//! let source: Arc<dyn MonitoredSource> = Arc::new(CaptureSource::new("mic"));
//!
//! let monitor = AudioMonitor::create(ctx.clone(), registry.clone(), &source)?;
//!
//! // Later, the user picks another device.
//! ctx.set_device(Some(DeviceId::new("Headphones")));
//! registry.reset_all();
//!
//! monitor.destroy();
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! The crate keeps a strict thread boundary:
//!
//! - **Audio thread**: the source's producer calls into the monitor and never waits.
//!   If a control operation holds the session, the buffer is dropped.
//! - **Control thread**: create, reset and destroy. Sessions are opened and
//!   closed here, outside the lock the audio thread contends on.
//!
//! Every device failure on the audio thread drops the buffer silently;
//! monitoring favors low latency over completeness.

#![warn(missing_docs)]
// Audio code requires intentional numeric casts between sample formats
#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap,
    clippy::cast_lossless
)]
// unwrap/expect allowed in tests only
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]
// These doc lints are too strict for internal implementation details
#![allow(clippy::missing_panics_doc, clippy::missing_errors_doc)]

pub mod backend;
mod config;
mod context;
mod error;
pub mod format;
mod monitor;
mod registry;
mod session;
pub mod source;
mod stats;

pub use config::{DeviceId, MonitorConfig, PipelineFormat, DEFAULT_DEVICE_ID};
pub use context::MonitorContext;
pub use error::{BackendError, BackendStage, ConvertError, MonitorError};
pub use monitor::AudioMonitor;
pub use registry::{MonitorHandle, MonitorId, MonitorRegistry, ProcessRegistry};
pub use session::{apply_volume, Delivery, DropReason, PlaybackSession, VOLUME_EPSILON};
pub use stats::MonitorStats;
