//! Default format converter backed by `rubato`.
//!
//! Channels are remixed first, then the remixed planes are resampled in
//! fixed-size chunks. Input that doesn't fill a whole chunk is held until the
//! next call, so the output frame count varies from call to call.

use rubato::{FastFixedIn, PolynomialDegree, Resampler};

use crate::error::ConvertError;
use crate::format::convert::{
    check_planes, interleave_into, AudioSpec, ConverterFactory, Converted, FormatConverter,
    Remix, SampleFormat,
};

/// Frames fed to the resampler per processing step.
const RESAMPLER_CHUNK_FRAMES: usize = 256;

/// Nanoseconds per second, for timestamp offsets.
const NANOS_PER_SEC: u64 = 1_000_000_000;

enum Stage {
    /// Rates match: remix and interleave only.
    Passthrough { remixed: Vec<Vec<f32>> },
    /// Rates differ: remix, buffer, resample.
    Resample {
        resampler: Box<FastFixedIn<f32>>,
        pending: Vec<Vec<f32>>,
        scratch: Vec<Vec<f32>>,
    },
}

/// Converts planar pipeline audio to interleaved device audio.
pub struct ResamplingConverter {
    from: AudioSpec,
    to: AudioSpec,
    remix: Remix,
    stage: Stage,
    output: Vec<f32>,
}

impl ResamplingConverter {
    /// Creates a converter for the given format pair.
    ///
    /// # Errors
    ///
    /// Returns [`ConvertError::Unsupported`] for zero sample rates, unknown
    /// layouts, or sample formats other than planar in / interleaved out.
    pub fn new(from: AudioSpec, to: AudioSpec) -> Result<Self, ConvertError> {
        if from.sample_rate == 0 || to.sample_rate == 0 {
            return Err(ConvertError::unsupported("sample rate must be non-zero"));
        }
        if from.channels() == 0 || to.channels() == 0 {
            return Err(ConvertError::unsupported(format!(
                "unknown speaker layout ({} -> {})",
                from.layout, to.layout
            )));
        }
        if from.format != SampleFormat::FloatPlanar || to.format != SampleFormat::Float {
            return Err(ConvertError::unsupported(format!(
                "{:?} -> {:?}",
                from.format, to.format
            )));
        }

        let out_channels = to.channels();
        let stage = if from.sample_rate == to.sample_rate {
            Stage::Passthrough {
                remixed: vec![Vec::new(); out_channels],
            }
        } else {
            let ratio = f64::from(to.sample_rate) / f64::from(from.sample_rate);
            let resampler = FastFixedIn::<f32>::new(
                ratio,
                1.0,
                PolynomialDegree::Cubic,
                RESAMPLER_CHUNK_FRAMES,
                out_channels,
            )
            .map_err(|e| ConvertError::Resampler(e.to_string()))?;
            let scratch = resampler.output_buffer_allocate(true);
            Stage::Resample {
                resampler: Box::new(resampler),
                pending: vec![Vec::with_capacity(RESAMPLER_CHUNK_FRAMES * 2); out_channels],
                scratch,
            }
        };

        Ok(Self {
            from,
            to,
            remix: Remix::new(from.layout, to.layout),
            stage,
            output: Vec::new(),
        })
    }

    fn ts_offset(&self) -> u64 {
        match &self.stage {
            Stage::Passthrough { .. } => 0,
            Stage::Resample { resampler, .. } => {
                resampler.output_delay() as u64 * NANOS_PER_SEC / u64::from(self.to.sample_rate)
            }
        }
    }
}

impl FormatConverter for ResamplingConverter {
    fn convert(&mut self, planes: &[&[f32]], frames: u32) -> Result<Converted<'_>, ConvertError> {
        self.output.clear();
        let ts_offset = self.ts_offset();

        if frames == 0 {
            return Ok(Converted {
                samples: &mut self.output[..],
                frames: 0,
                ts_offset,
            });
        }

        let in_channels = self.from.channels();
        check_planes(planes, in_channels, frames)?;
        let planes = &planes[..in_channels];
        let frames = frames as usize;

        let frames_out = match &mut self.stage {
            Stage::Passthrough { remixed } => {
                for plane in remixed.iter_mut() {
                    plane.clear();
                }
                self.remix.apply(planes, frames, remixed);
                interleave_into(remixed, frames, &mut self.output);
                frames
            }
            Stage::Resample {
                resampler,
                pending,
                scratch,
            } => {
                self.remix.apply(planes, frames, pending);
                let mut produced = 0;
                while pending[0].len() >= resampler.input_frames_next() {
                    let (consumed, written) = resampler
                        .process_into_buffer(&pending[..], &mut scratch[..], None)
                        .map_err(|e| ConvertError::Resampler(e.to_string()))?;
                    interleave_into(&scratch[..], written, &mut self.output);
                    for plane in pending.iter_mut() {
                        plane.drain(..consumed);
                    }
                    produced += written;
                }
                produced
            }
        };

        Ok(Converted {
            samples: &mut self.output[..],
            frames: frames_out as u32,
            ts_offset,
        })
    }

    fn input_spec(&self) -> AudioSpec {
        self.from
    }

    fn output_spec(&self) -> AudioSpec {
        self.to
    }
}

/// Builds [`ResamplingConverter`]s. The default [`ConverterFactory`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ResamplingFactory;

impl ConverterFactory for ResamplingFactory {
    fn create(
        &self,
        from: &AudioSpec,
        to: &AudioSpec,
    ) -> Result<Box<dyn FormatConverter>, ConvertError> {
        Ok(Box::new(ResamplingConverter::new(*from, *to)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::SpeakerLayout;

    fn planar(rate: u32, layout: SpeakerLayout) -> AudioSpec {
        AudioSpec {
            sample_rate: rate,
            layout,
            format: SampleFormat::FloatPlanar,
        }
    }

    fn interleaved(rate: u32, layout: SpeakerLayout) -> AudioSpec {
        AudioSpec {
            sample_rate: rate,
            layout,
            format: SampleFormat::Float,
        }
    }

    #[test]
    fn test_same_rate_interleaves() {
        let mut converter = ResamplingConverter::new(
            planar(48_000, SpeakerLayout::Stereo),
            interleaved(48_000, SpeakerLayout::Stereo),
        )
        .unwrap();

        let left = [0.1f32, 0.2, 0.3];
        let right = [-0.1f32, -0.2, -0.3];
        let out = converter.convert(&[&left, &right], 3).unwrap();

        assert_eq!(out.frames, 3);
        assert_eq!(out.ts_offset, 0);
        assert_eq!(out.samples, &[0.1, -0.1, 0.2, -0.2, 0.3, -0.3]);
    }

    #[test]
    fn test_zero_length_input() {
        let mut converter = ResamplingConverter::new(
            planar(48_000, SpeakerLayout::Stereo),
            interleaved(44_100, SpeakerLayout::Stereo),
        )
        .unwrap();

        let out = converter.convert(&[], 0).unwrap();
        assert_eq!(out.frames, 0);
        assert!(out.samples.is_empty());
    }

    #[test]
    fn test_short_input_is_rejected() {
        let mut converter = ResamplingConverter::new(
            planar(48_000, SpeakerLayout::Stereo),
            interleaved(48_000, SpeakerLayout::Stereo),
        )
        .unwrap();

        let left = [0.0f32; 4];
        assert!(matches!(
            converter.convert(&[&left], 4),
            Err(ConvertError::InputMismatch { expected: 2, .. })
        ));
    }

    #[test]
    fn test_resample_frame_counts_track_ratio() {
        let mut converter = ResamplingConverter::new(
            planar(48_000, SpeakerLayout::Stereo),
            interleaved(24_000, SpeakerLayout::Stereo),
        )
        .unwrap();

        let plane = vec![0.0f32; 1024];
        let mut total = 0u32;
        for _ in 0..8 {
            let out = converter.convert(&[&plane, &plane], 1024).unwrap();
            assert_eq!(out.samples.len(), out.frames as usize * 2);
            total += out.frames;
        }

        // 8192 frames in at half rate; allow for the chunk held back.
        let expected = 4096i64;
        assert!((i64::from(total) - expected).abs() <= RESAMPLER_CHUNK_FRAMES as i64);
    }

    #[test]
    fn test_resample_ts_offset_is_output_delay() {
        let mut converter = ResamplingConverter::new(
            planar(48_000, SpeakerLayout::Stereo),
            interleaved(44_100, SpeakerLayout::Stereo),
        )
        .unwrap();

        let delay = match &converter.stage {
            Stage::Resample { resampler, .. } => resampler.output_delay(),
            Stage::Passthrough { .. } => panic!("rates differ, expected a resampler"),
        };
        assert!(delay > 0);
        let expected = delay as u64 * NANOS_PER_SEC / 44_100;

        let plane = vec![0.25f32; 1024];
        let out = converter.convert(&[&plane, &plane], 1024).unwrap();
        assert!(out.frames > 0);
        assert_eq!(out.ts_offset, expected);

        // Reported even while input is still being buffered.
        let out = converter.convert(&[&plane, &plane], 0).unwrap();
        assert_eq!(out.frames, 0);
        assert_eq!(out.ts_offset, expected);
    }

    #[test]
    fn test_five_one_source_folds_to_stereo_device() {
        let mut converter = ResamplingConverter::new(
            planar(48_000, SpeakerLayout::FivePointOne),
            interleaved(48_000, SpeakerLayout::Stereo),
        )
        .unwrap();

        let silent = [0.0f32];
        let center = [1.0f32];
        let out = converter
            .convert(&[&silent, &silent, &center, &silent, &silent, &silent], 1)
            .unwrap();
        assert_eq!(out.frames, 1);
        assert!((out.samples[0] - std::f32::consts::FRAC_1_SQRT_2).abs() < 1e-6);
        assert!((out.samples[1] - std::f32::consts::FRAC_1_SQRT_2).abs() < 1e-6);
    }

    #[test]
    fn test_partial_chunk_is_held_back() {
        let mut converter = ResamplingConverter::new(
            planar(48_000, SpeakerLayout::Mono),
            interleaved(44_100, SpeakerLayout::Mono),
        )
        .unwrap();

        let plane = vec![0.5f32; RESAMPLER_CHUNK_FRAMES / 2];
        let out = converter
            .convert(&[&plane], (RESAMPLER_CHUNK_FRAMES / 2) as u32)
            .unwrap();
        assert_eq!(out.frames, 0);

        let out = converter
            .convert(&[&plane], (RESAMPLER_CHUNK_FRAMES / 2) as u32)
            .unwrap();
        assert!(out.frames > 0);
    }

    #[test]
    fn test_stereo_to_mono_device() {
        let mut converter = ResamplingConverter::new(
            planar(48_000, SpeakerLayout::Stereo),
            interleaved(48_000, SpeakerLayout::Mono),
        )
        .unwrap();

        let left = [1.0f32, 0.0];
        let right = [0.0f32, 1.0];
        let out = converter.convert(&[&left, &right], 2).unwrap();
        assert_eq!(out.samples, &[0.5, 0.5]);
    }

    #[test]
    fn test_rejects_unknown_layout() {
        let result = ResamplingConverter::new(
            planar(48_000, SpeakerLayout::Stereo),
            interleaved(48_000, SpeakerLayout::Unknown),
        );
        assert!(matches!(result, Err(ConvertError::Unsupported { .. })));
    }

    #[test]
    fn test_rejects_wrong_sample_formats() {
        let result = ResamplingConverter::new(
            interleaved(48_000, SpeakerLayout::Stereo),
            interleaved(48_000, SpeakerLayout::Stereo),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_factory_reports_specs() {
        let from = planar(48_000, SpeakerLayout::Stereo);
        let to = interleaved(44_100, SpeakerLayout::FivePointOne);
        let converter = ResamplingFactory.create(&from, &to).unwrap();
        assert_eq!(converter.input_spec(), from);
        assert_eq!(converter.output_spec(), to);
    }
}
