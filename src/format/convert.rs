//! Format converter contract and channel conversion helpers.

use crate::error::ConvertError;
use crate::format::SpeakerLayout;

/// Sample representation of an audio stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    /// One `f32` plane per channel.
    FloatPlanar,
    /// Interleaved `f32` frames.
    Float,
}

/// A complete audio format: rate, layout and sample representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioSpec {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Channel layout.
    pub layout: SpeakerLayout,
    /// Sample representation.
    pub format: SampleFormat,
}

impl AudioSpec {
    /// Number of channels in the layout.
    pub fn channels(&self) -> usize {
        usize::from(self.layout.channels())
    }
}

/// Output of one [`FormatConverter::convert`] call.
///
/// `samples` borrows the converter's internal buffer and holds
/// `frames × channels` interleaved samples. It is mutable so the caller can
/// apply gain in place before copying it out.
#[derive(Debug)]
pub struct Converted<'a> {
    /// Interleaved output samples.
    pub samples: &'a mut [f32],
    /// Number of output frames.
    pub frames: u32,
    /// Delay introduced by the converter, in nanoseconds.
    pub ts_offset: u64,
}

/// A stateful converter bound to one (input → output) format pair.
///
/// Input is always planar `f32`; output is always interleaved `f32`.
/// Zero-length input must yield zero frames, not an error.
pub trait FormatConverter: Send {
    /// Converts `frames` frames from the input planes.
    fn convert(&mut self, planes: &[&[f32]], frames: u32) -> Result<Converted<'_>, ConvertError>;

    /// The input format.
    fn input_spec(&self) -> AudioSpec;

    /// The output format.
    fn output_spec(&self) -> AudioSpec;
}

/// Builds converters for a negotiated format pair.
///
/// Injected into [`MonitorContext`](crate::MonitorContext) so the
/// resampling algorithm stays replaceable.
pub trait ConverterFactory: Send + Sync {
    /// Creates a converter from `from` to `to`.
    fn create(
        &self,
        from: &AudioSpec,
        to: &AudioSpec,
    ) -> Result<Box<dyn FormatConverter>, ConvertError>;
}

/// Checks a converter input against its expected plane count and length.
pub fn check_planes(planes: &[&[f32]], channels: usize, frames: u32) -> Result<(), ConvertError> {
    let needed = frames as usize;
    if planes.len() < channels || planes[..channels].iter().any(|p| p.len() < needed) {
        return Err(ConvertError::InputMismatch {
            expected: channels,
            frames,
        });
    }
    Ok(())
}

/// Remixes planar input into `out` planes, appending `frames` samples to each.
///
/// Equal channel counts copy straight through. A mono output averages every
/// input channel; a mono input is duplicated to every output. Otherwise
/// channels map by index and outputs with no matching input stay silent.
pub fn remix_into(planes: &[&[f32]], frames: usize, out: &mut [Vec<f32>]) {
    let in_channels = planes.len();
    let out_channels = out.len();

    if out_channels == 1 && in_channels > 1 {
        let scale = 1.0 / in_channels as f32;
        out[0].extend((0..frames).map(|i| planes.iter().map(|p| p[i]).sum::<f32>() * scale));
        return;
    }

    for (c, plane) in out.iter_mut().enumerate() {
        if in_channels == 1 {
            plane.extend_from_slice(&planes[0][..frames]);
        } else if c < in_channels {
            plane.extend_from_slice(&planes[c][..frames]);
        } else {
            plane.resize(plane.len() + frames, 0.0);
        }
    }
}

/// Center and surround gain when folding down to stereo (-3 dB).
const FOLD_GAIN: f32 = std::f32::consts::FRAC_1_SQRT_2;

/// Per-channel `[left, right]` gains for folding `layout` down to stereo.
///
/// Center channels feed both sides at -3 dB, surrounds feed their own side
/// at -3 dB and back center feeds both at -6 dB. LFE is not mixed in.
/// Returns `None` for layouts with two or fewer channels.
pub fn stereo_fold_gains(layout: SpeakerLayout) -> Option<Vec<[f32; 2]>> {
    use crate::format::speaker::{
        BACK_CENTER, BACK_LEFT, BACK_RIGHT, FRONT_CENTER, FRONT_LEFT, FRONT_LEFT_OF_CENTER,
        FRONT_RIGHT, FRONT_RIGHT_OF_CENTER, SIDE_LEFT, SIDE_RIGHT,
    };

    if layout.channels() <= 2 {
        return None;
    }
    let gains = layout
        .speakers()
        .into_iter()
        .map(|speaker| match speaker {
            FRONT_LEFT | FRONT_LEFT_OF_CENTER => [1.0, 0.0],
            FRONT_RIGHT | FRONT_RIGHT_OF_CENTER => [0.0, 1.0],
            FRONT_CENTER => [FOLD_GAIN, FOLD_GAIN],
            BACK_LEFT | SIDE_LEFT => [FOLD_GAIN, 0.0],
            BACK_RIGHT | SIDE_RIGHT => [0.0, FOLD_GAIN],
            BACK_CENTER => [FOLD_GAIN * FOLD_GAIN, FOLD_GAIN * FOLD_GAIN],
            _ => [0.0, 0.0],
        })
        .collect();
    Some(gains)
}

/// Channel mapping between two layouts, fixed when a converter is built.
///
/// Multichannel input played on a stereo device is folded down with
/// [`stereo_fold_gains`]; every other pair goes through [`remix_into`].
#[derive(Debug, Clone)]
pub struct Remix {
    fold: Option<Vec<[f32; 2]>>,
}

impl Remix {
    /// Builds the mapping from `from` to `to`.
    pub fn new(from: SpeakerLayout, to: SpeakerLayout) -> Self {
        let fold = if to.channels() == 2 {
            stereo_fold_gains(from)
        } else {
            None
        };
        Self { fold }
    }

    /// Returns `true` if this mapping folds down to stereo.
    pub fn is_fold(&self) -> bool {
        self.fold.is_some()
    }

    /// Remixes `frames` samples of `planes`, appending to `out`.
    pub fn apply(&self, planes: &[&[f32]], frames: usize, out: &mut [Vec<f32>]) {
        let Some(gains) = &self.fold else {
            remix_into(planes, frames, out);
            return;
        };

        let (left, right) = out.split_at_mut(1);
        let (left, right) = (&mut left[0], &mut right[0]);
        left.reserve(frames);
        right.reserve(frames);
        for i in 0..frames {
            let (mut l, mut r) = (0.0f32, 0.0f32);
            for (plane, [gl, gr]) in planes.iter().zip(gains) {
                l += plane[i] * gl;
                r += plane[i] * gr;
            }
            left.push(l);
            right.push(r);
        }
    }
}

/// Interleaves the first `frames` samples of each plane onto `out`.
pub fn interleave_into<P: AsRef<[f32]>>(planes: &[P], frames: usize, out: &mut Vec<f32>) {
    out.reserve(frames * planes.len());
    for i in 0..frames {
        out.extend(planes.iter().map(|p| p.as_ref()[i]));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_planes() {
        let left = [0.0f32; 4];
        let right = [0.0f32; 4];
        assert!(check_planes(&[&left, &right], 2, 4).is_ok());
        assert!(check_planes(&[&left], 2, 4).is_err());
        assert!(check_planes(&[&left, &right[..2]], 2, 4).is_err());
        assert!(check_planes(&[], 2, 0).is_err());
    }

    #[test]
    fn test_remix_same_channels() {
        let left = [1.0f32, 2.0];
        let right = [3.0f32, 4.0];
        let mut out = vec![Vec::new(), Vec::new()];
        remix_into(&[&left, &right], 2, &mut out);
        assert_eq!(out, vec![vec![1.0, 2.0], vec![3.0, 4.0]]);
    }

    #[test]
    fn test_remix_stereo_to_mono_averages() {
        let left = [1.0f32, 0.5];
        let right = [0.0f32, -0.5];
        let mut out = vec![Vec::new()];
        remix_into(&[&left, &right], 2, &mut out);
        assert_eq!(out, vec![vec![0.5, 0.0]]);
    }

    #[test]
    fn test_remix_mono_to_stereo_duplicates() {
        let mono = [0.25f32, -0.25];
        let mut out = vec![Vec::new(), Vec::new()];
        remix_into(&[&mono], 2, &mut out);
        assert_eq!(out, vec![vec![0.25, -0.25], vec![0.25, -0.25]]);
    }

    #[test]
    fn test_remix_stereo_to_quad_silences_extra_channels() {
        let left = [1.0f32];
        let right = [2.0f32];
        let mut out = vec![Vec::new(); 4];
        remix_into(&[&left, &right], 1, &mut out);
        assert_eq!(out, vec![vec![1.0], vec![2.0], vec![0.0], vec![0.0]]);
    }

    #[test]
    fn test_fold_five_one_to_stereo_keeps_center_and_surrounds() {
        // FL FR FC LFE BL BR
        let fl = [1.0f32, 0.0];
        let fr = [0.0f32, 0.0];
        let fc = [1.0f32, 0.0];
        let lfe = [1.0f32, 1.0];
        let bl = [0.0f32, 0.0];
        let br = [0.0f32, 1.0];
        let remix = Remix::new(SpeakerLayout::FivePointOne, SpeakerLayout::Stereo);
        assert!(remix.is_fold());

        let mut out = vec![Vec::new(), Vec::new()];
        remix.apply(&[&fl, &fr, &fc, &lfe, &bl, &br], 2, &mut out);

        let (left, right) = (&out[0], &out[1]);
        assert!((left[0] - (1.0 + FOLD_GAIN)).abs() < 1e-6);
        assert!((right[0] - FOLD_GAIN).abs() < 1e-6);
        // LFE alone is silent, the back right surround lands on the right only.
        assert_eq!(left[1], 0.0);
        assert!((right[1] - FOLD_GAIN).abs() < 1e-6);
    }

    #[test]
    fn test_fold_side_surrounds() {
        let gains = stereo_fold_gains(SpeakerLayout::SevenPointOneSurround).unwrap();
        assert_eq!(gains.len(), 8);
        // FL FR FC LFE BL BR SL SR
        assert_eq!(gains[6], [FOLD_GAIN, 0.0]);
        assert_eq!(gains[7], [0.0, FOLD_GAIN]);
        assert_eq!(gains[3], [0.0, 0.0]);
    }

    #[test]
    fn test_remix_without_fold_maps_by_index() {
        assert!(stereo_fold_gains(SpeakerLayout::Stereo).is_none());
        assert!(!Remix::new(SpeakerLayout::Stereo, SpeakerLayout::Stereo).is_fold());
        assert!(!Remix::new(SpeakerLayout::FivePointOne, SpeakerLayout::Quad).is_fold());
        assert!(!Remix::new(SpeakerLayout::FivePointOne, SpeakerLayout::Mono).is_fold());

        let left = [1.0f32];
        let right = [2.0f32];
        let mut out = vec![Vec::new(); 4];
        Remix::new(SpeakerLayout::Stereo, SpeakerLayout::Quad).apply(&[&left, &right], 1, &mut out);
        assert_eq!(out, vec![vec![1.0], vec![2.0], vec![0.0], vec![0.0]]);
    }

    #[test]
    fn test_interleave() {
        let planes = vec![vec![1.0f32, 2.0, 3.0], vec![-1.0f32, -2.0, -3.0]];
        let mut out = Vec::new();
        interleave_into(&planes, 2, &mut out);
        assert_eq!(out, vec![1.0, -1.0, 2.0, -2.0]);
    }
}
