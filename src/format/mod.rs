//! Audio format negotiation and conversion.
//!
//! This module provides:
//! - Speaker layout negotiation from device channel masks
//! - The [`FormatConverter`] contract used by playback sessions
//! - A default `rubato`-backed converter ([`ResamplingConverter`])

mod convert;
mod layout;
mod resample;

pub use convert::{
    check_planes, interleave_into, remix_into, stereo_fold_gains, AudioSpec, ConverterFactory,
    Converted, FormatConverter, Remix, SampleFormat,
};
pub use layout::{mask, speaker, SpeakerLayout};
pub use resample::{ResamplingConverter, ResamplingFactory};
