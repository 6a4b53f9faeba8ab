//! Playback sessions and the real-time delivery path.
//!
//! A [`PlaybackSession`] owns one negotiated connection to an output device.
//! It is built in one fallible step: if any stage fails, the handles acquired
//! so far are dropped before the error is returned, so a half-open session
//! never exists.

use crate::backend::{BufferFlags, MixFormat, OutputDevice, PlaybackClient, RenderClient};
use crate::context::MonitorContext;
use crate::error::MonitorError;
use crate::format::{AudioSpec, FormatConverter, SampleFormat, SpeakerLayout};
use crate::source::AudioData;

/// Volumes this close to 1.0 skip the gain multiply.
pub const VOLUME_EPSILON: f32 = 0.000_1;

/// What happened to one delivered buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Audio was written to the device.
    Written {
        /// Frames written.
        frames: u32,
    },
    /// A region was released as silence because the source is muted.
    Silenced {
        /// Frames released.
        frames: u32,
    },
    /// The buffer was dropped.
    Dropped(DropReason),
}

/// Why a buffer was dropped instead of played.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DropReason {
    /// A reset or destroy held the guard lock.
    LockBusy,
    /// The monitor has no current session.
    NoSession,
    /// The source is inactive or gone.
    Inactive,
    /// The converter rejected the buffer.
    ConversionFailed,
    /// The converter produced no frames yet.
    Empty,
    /// The device already holds more than the backpressure threshold.
    Backpressure,
    /// The device could not provide a write region.
    BufferUnavailable,
}

/// One open, negotiated connection to an output device.
pub struct PlaybackSession {
    // Field order is drop order: writer, then connection, then device.
    converter: Box<dyn FormatConverter>,
    render: Box<dyn RenderClient>,
    client: Box<dyn PlaybackClient>,
    device: Box<dyn OutputDevice>,
    format: MixFormat,
    layout: SpeakerLayout,
    buffer_frames: u32,
    frame_watermark: u32,
    backpressure_factor: u32,
}

impl PlaybackSession {
    /// Opens the configured device and negotiates a started playback connection.
    ///
    /// # Errors
    ///
    /// Returns the first failing step. Nothing acquired before that step
    /// outlives the call.
    pub fn open(ctx: &MonitorContext) -> Result<Self, MonitorError> {
        let config = ctx.config();
        let id = config.device.ok_or(MonitorError::MonitoringDisabled)?;

        let mut device = ctx.backend().open_device(&id)?;
        let mut client = device.activate()?;
        let format = client.mix_format()?;
        client.initialize(&format, config.buffer_duration)?;

        let layout = SpeakerLayout::negotiate(format.channel_mask, format.channels);
        if layout.channels() != format.channels {
            return Err(MonitorError::UnsupportedFormat {
                format: format!(
                    "{} channels (mask {:?}) at {} Hz",
                    format.channels, format.channel_mask, format.sample_rate
                ),
            });
        }

        let pipeline = ctx.pipeline();
        let from = AudioSpec {
            sample_rate: pipeline.sample_rate,
            layout: pipeline.layout,
            format: SampleFormat::FloatPlanar,
        };
        let to = AudioSpec {
            sample_rate: format.sample_rate,
            layout,
            format: SampleFormat::Float,
        };
        let converter = ctx.converters().create(&from, &to)?;

        let buffer_frames = client.buffer_size()?;
        let render = client.render_client()?;
        client.start()?;

        tracing::info!(
            device = %device.name(),
            sample_rate = format.sample_rate,
            channels = format.channels,
            %layout,
            buffer_frames,
            "monitor session opened"
        );

        Ok(Self {
            converter,
            render,
            client,
            device,
            format,
            layout,
            buffer_frames,
            frame_watermark: 0,
            backpressure_factor: config.backpressure_factor,
        })
    }

    /// Name of the output device.
    pub fn device_name(&self) -> String {
        self.device.name()
    }

    /// The device's negotiated mix format.
    pub fn format(&self) -> MixFormat {
        self.format
    }

    /// Negotiated output channel count.
    pub fn channels(&self) -> u16 {
        self.format.channels
    }

    /// Negotiated speaker layout.
    pub fn layout(&self) -> SpeakerLayout {
        self.layout
    }

    /// Device buffer size in frames.
    pub fn buffer_frames(&self) -> u32 {
        self.buffer_frames
    }

    /// Largest converted frame count seen by this session.
    pub fn frame_watermark(&self) -> u32 {
        self.frame_watermark
    }

    /// Padding above which buffers are dropped.
    pub fn backpressure_threshold(&self) -> u32 {
        self.frame_watermark.saturating_mul(self.backpressure_factor)
    }

    /// Converts one source buffer and writes it to the device.
    ///
    /// Never blocks and never retries: every failure drops the buffer.
    pub fn deliver(&mut self, audio: &AudioData<'_>, volume: f32, muted: bool) -> Delivery {
        let Ok(converted) = self.converter.convert(audio.planes, audio.frames) else {
            return Delivery::Dropped(DropReason::ConversionFailed);
        };

        let frames = converted.frames;
        self.frame_watermark = self.frame_watermark.max(frames);
        if frames == 0 {
            return Delivery::Dropped(DropReason::Empty);
        }

        // A failed padding query reads as an empty device buffer.
        let padding = self.client.padding().unwrap_or(0);
        let threshold = self.frame_watermark.saturating_mul(self.backpressure_factor);
        if padding > threshold {
            return Delivery::Dropped(DropReason::Backpressure);
        }

        let Ok(region) = self.render.get_buffer(frames) else {
            return Delivery::Dropped(DropReason::BufferUnavailable);
        };

        if muted {
            let _ = self.render.release_buffer(frames, BufferFlags::Silent);
            return Delivery::Silenced { frames };
        }

        let len = region.len().min(converted.samples.len());
        let samples = &mut converted.samples[..len];
        apply_volume(samples, volume);
        region[..len].copy_from_slice(samples);

        let _ = self.render.release_buffer(frames, BufferFlags::Data);
        Delivery::Written { frames }
    }
}

impl Drop for PlaybackSession {
    fn drop(&mut self) {
        if let Err(e) = self.client.stop() {
            tracing::debug!(error = %e, "stopping monitor session failed");
        }
    }
}

/// Returns `true` if `a` and `b` differ by at most `epsilon`.
#[inline]
pub fn close_float(a: f32, b: f32, epsilon: f32) -> bool {
    (a - b).abs() <= epsilon
}

/// Scales samples by `volume` in place.
///
/// Volumes within [`VOLUME_EPSILON`] of unity leave the samples untouched.
#[inline]
pub fn apply_volume(samples: &mut [f32], volume: f32) {
    if close_float(volume, 1.0, VOLUME_EPSILON) {
        return;
    }
    for sample in samples {
        *sample *= volume;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MockBackend, MockEvent, UNWRITTEN};
    use crate::config::{DeviceId, MonitorConfig, PipelineFormat};
    use crate::error::BackendStage;
    use crate::format::mask;
    use std::time::Duration;

    fn context(backend: &MockBackend) -> MonitorContext {
        MonitorContext::new(backend.clone())
    }

    fn stereo(frames: usize, value: f32) -> Vec<Vec<f32>> {
        vec![vec![value; frames]; 2]
    }

    fn deliver(session: &mut PlaybackSession, planes: &[Vec<f32>], volume: f32, muted: bool) -> Delivery {
        let refs: Vec<&[f32]> = planes.iter().map(Vec::as_slice).collect();
        let frames = planes.first().map_or(0, Vec::len) as u32;
        let audio = AudioData {
            planes: &refs,
            frames,
            timestamp: 0,
        };
        session.deliver(&audio, volume, muted)
    }

    #[test]
    fn test_open_negotiates_and_starts() {
        let backend = MockBackend::new();
        let session = PlaybackSession::open(&context(&backend)).unwrap();

        assert_eq!(session.channels(), 2);
        assert_eq!(session.layout(), SpeakerLayout::Stereo);
        assert_eq!(session.buffer_frames(), 48_000);
        assert_eq!(session.frame_watermark(), 0);
        assert_eq!(
            backend.events(),
            vec![
                MockEvent::OpenDevice(DeviceId::Default),
                MockEvent::Activate { client: 1 },
                MockEvent::Initialize {
                    client: 1,
                    buffer_duration: Duration::from_secs(1),
                },
                MockEvent::Start { client: 1 },
            ]
        );
    }

    #[test]
    fn test_every_failure_releases_everything() {
        let stages = [
            BackendStage::OpenDevice,
            BackendStage::Activate,
            BackendStage::MixFormat,
            BackendStage::Initialize,
            BackendStage::BufferSize,
            BackendStage::RenderClient,
            BackendStage::Start,
        ];

        for stage in stages {
            let backend = MockBackend::new();
            backend.fail_at(stage);

            let result = PlaybackSession::open(&context(&backend));
            assert!(result.is_err(), "{stage} should fail");
            assert!(backend.live_resources().is_empty(), "{stage} leaked");
        }
    }

    #[test]
    fn test_converter_failure_releases_everything() {
        let backend = MockBackend::new();
        let ctx = context(&backend).with_pipeline(PipelineFormat {
            sample_rate: 0,
            layout: SpeakerLayout::Stereo,
        });

        let result = PlaybackSession::open(&ctx);
        assert!(matches!(result, Err(MonitorError::Converter(_))));
        assert!(backend.live_resources().is_empty());
    }

    #[test]
    fn test_disabled_monitoring() {
        let backend = MockBackend::new();
        let ctx = context(&backend).with_config(MonitorConfig {
            device: None,
            ..Default::default()
        });

        assert!(matches!(
            PlaybackSession::open(&ctx),
            Err(MonitorError::MonitoringDisabled)
        ));
        assert!(backend.events().is_empty());
    }

    #[test]
    fn test_unrecognized_channel_count_is_rejected() {
        let backend = MockBackend::with_format(MixFormat {
            sample_rate: 48_000,
            channels: 7,
            channel_mask: None,
        });

        let result = PlaybackSession::open(&context(&backend));
        assert!(matches!(result, Err(MonitorError::UnsupportedFormat { .. })));
        assert!(backend.live_resources().is_empty());
    }

    #[test]
    fn test_surround_device_negotiation() {
        let backend = MockBackend::with_format(MixFormat {
            sample_rate: 44_100,
            channels: 6,
            channel_mask: Some(mask::FIVE_POINT_ONE_SURROUND),
        });

        let session = PlaybackSession::open(&context(&backend)).unwrap();
        assert_eq!(session.layout(), SpeakerLayout::FivePointOneSurround);
        assert_eq!(session.channels(), 6);
    }

    #[test]
    fn test_drop_stops_client() {
        let backend = MockBackend::new();
        let session = PlaybackSession::open(&context(&backend)).unwrap();
        drop(session);

        assert_eq!(backend.events().last(), Some(&MockEvent::Stop { client: 1 }));
        assert!(backend.live_resources().is_empty());
    }

    #[test]
    fn test_watermark_is_monotonic() {
        let backend = MockBackend::new();
        let mut session = PlaybackSession::open(&context(&backend)).unwrap();

        let mut max = 0;
        for frames in [480usize, 1024, 256, 1024, 2048, 16] {
            deliver(&mut session, &stereo(frames, 0.1), 1.0, false);
            max = max.max(frames as u32);
            assert_eq!(session.frame_watermark(), max);
            assert_eq!(session.backpressure_threshold(), 2 * max);
        }
    }

    #[test]
    fn test_backpressure_boundary() {
        let backend = MockBackend::new();
        let mut session = PlaybackSession::open(&context(&backend)).unwrap();

        // Watermark becomes 100, threshold 200.
        backend.set_padding(200);
        let result = deliver(&mut session, &stereo(100, 0.1), 1.0, false);
        assert_eq!(result, Delivery::Written { frames: 100 });

        backend.clear_events();
        backend.set_padding(201);
        let result = deliver(&mut session, &stereo(100, 0.1), 1.0, false);
        assert_eq!(result, Delivery::Dropped(DropReason::Backpressure));
        assert_eq!(backend.get_buffer_requests(), 0);
    }

    #[test]
    fn test_backpressure_factor_is_configurable() {
        let backend = MockBackend::new();
        let ctx = context(&backend).with_config(MonitorConfig {
            backpressure_factor: 3,
            ..Default::default()
        });
        let mut session = PlaybackSession::open(&ctx).unwrap();

        backend.set_padding(300);
        let result = deliver(&mut session, &stereo(100, 0.1), 1.0, false);
        assert_eq!(result, Delivery::Written { frames: 100 });
        assert_eq!(session.backpressure_threshold(), 300);
    }

    #[test]
    fn test_padding_failure_reads_as_empty() {
        let backend = MockBackend::new();
        let mut session = PlaybackSession::open(&context(&backend)).unwrap();

        backend.fail_at(BackendStage::Padding);
        let result = deliver(&mut session, &stereo(64, 0.1), 1.0, false);
        assert_eq!(result, Delivery::Written { frames: 64 });
    }

    #[test]
    fn test_volume_scaling() {
        let backend = MockBackend::new();
        let mut session = PlaybackSession::open(&context(&backend)).unwrap();

        deliver(&mut session, &[vec![0.5, -0.25], vec![1.0, 0.0]], 0.5, false);
        assert_eq!(backend.written(), vec![0.25, 0.5, -0.125, 0.0]);
    }

    #[test]
    fn test_unity_volume_is_exact() {
        let backend = MockBackend::new();
        let mut session = PlaybackSession::open(&context(&backend)).unwrap();

        let planes = [vec![0.3f32, -0.7], vec![0.123_456_7, 1.0]];
        deliver(&mut session, &planes, 1.0 + VOLUME_EPSILON / 2.0, false);
        assert_eq!(backend.written(), vec![0.3, 0.123_456_7, -0.7, 1.0]);
    }

    #[test]
    fn test_mute_marks_silence_without_copy() {
        let backend = MockBackend::new();
        let mut session = PlaybackSession::open(&context(&backend)).unwrap();

        for volume in [0.0, 0.5, 1.0, 2.0] {
            let result = deliver(&mut session, &stereo(32, 0.9), volume, true);
            assert_eq!(result, Delivery::Silenced { frames: 32 });
        }

        assert!(backend.written().is_empty());
        let silent_releases = backend
            .events()
            .into_iter()
            .filter(|e| {
                matches!(
                    e,
                    MockEvent::Release {
                        flags: BufferFlags::Silent,
                        touched: false,
                        ..
                    }
                )
            })
            .count();
        assert_eq!(silent_releases, 4);
    }

    #[test]
    fn test_buffer_unavailable_drops() {
        let backend = MockBackend::new();
        let mut session = PlaybackSession::open(&context(&backend)).unwrap();

        backend.set_buffer_available(false);
        let result = deliver(&mut session, &stereo(32, 0.1), 1.0, false);
        assert_eq!(result, Delivery::Dropped(DropReason::BufferUnavailable));
        assert!(!backend
            .events()
            .iter()
            .any(|e| matches!(e, MockEvent::Release { .. })));
    }

    #[test]
    fn test_conversion_failure_drops() {
        let backend = MockBackend::new();
        let mut session = PlaybackSession::open(&context(&backend)).unwrap();

        // Stereo pipeline, one plane supplied.
        let result = deliver(&mut session, &[vec![0.1; 16]], 1.0, false);
        assert_eq!(result, Delivery::Dropped(DropReason::ConversionFailed));
        assert_eq!(backend.get_buffer_requests(), 0);
    }

    #[test]
    fn test_zero_frames_drop_without_device_access() {
        let backend = MockBackend::new();
        let mut session = PlaybackSession::open(&context(&backend)).unwrap();

        let result = deliver(&mut session, &stereo(0, 0.0), 1.0, false);
        assert_eq!(result, Delivery::Dropped(DropReason::Empty));
        assert_eq!(backend.get_buffer_requests(), 0);
    }

    #[test]
    fn test_written_region_overwrites_sentinel() {
        let backend = MockBackend::new();
        let mut session = PlaybackSession::open(&context(&backend)).unwrap();

        deliver(&mut session, &stereo(4, 0.0), 1.0, false);
        assert!(backend.written().iter().all(|&s| s.to_bits() != UNWRITTEN.to_bits()));
    }

    #[test]
    fn test_apply_volume() {
        let mut samples = [1.0f32, -0.5];
        apply_volume(&mut samples, 2.0);
        assert_eq!(samples, [2.0, -1.0]);

        let mut samples = [1.0f32, -0.5];
        apply_volume(&mut samples, 1.0);
        assert_eq!(samples, [1.0, -0.5]);
    }

    #[test]
    fn test_close_float() {
        assert!(close_float(1.0, 1.000_05, VOLUME_EPSILON));
        assert!(!close_float(1.0, 1.001, VOLUME_EPSILON));
    }
}
