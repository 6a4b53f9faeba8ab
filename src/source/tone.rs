//! Synthetic planar audio for demos and tests.

use std::f64::consts::TAU;

/// Generates a continuous sine tone as planar `f32` blocks.
///
/// Phase carries over between blocks, so consecutive blocks join without
/// clicks.
///
/// # Example
///
/// ```
/// use audio_monitor::source::ToneGenerator;
///
/// let mut tone = ToneGenerator::new(48_000, 2, 440.0, 0.5);
/// let block = tone.next_block(480);
///
/// assert_eq!(block.len(), 2);
/// assert_eq!(block[0].len(), 480);
/// assert_eq!(block[0], block[1]);
/// ```
#[derive(Debug, Clone)]
pub struct ToneGenerator {
    sample_rate: u32,
    channels: usize,
    frequency: f64,
    amplitude: f32,
    phase: f64,
}

impl ToneGenerator {
    /// Creates a generator writing the same tone to every channel.
    pub fn new(sample_rate: u32, channels: usize, frequency: f64, amplitude: f32) -> Self {
        Self {
            sample_rate,
            channels,
            frequency,
            amplitude,
            phase: 0.0,
        }
    }

    /// Produces the next `frames` frames, one `Vec` per channel.
    pub fn next_block(&mut self, frames: usize) -> Vec<Vec<f32>> {
        let step = TAU * self.frequency / f64::from(self.sample_rate);
        let mut plane = Vec::with_capacity(frames);
        for _ in 0..frames {
            plane.push(self.phase.sin() as f32 * self.amplitude);
            self.phase = (self.phase + step) % TAU;
        }
        vec![plane; self.channels]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tone_has_both_polarities() {
        let mut tone = ToneGenerator::new(16_000, 1, 440.0, 1.0);
        let block = tone.next_block(1600);

        assert!(block[0].iter().any(|&s| s > 0.0));
        assert!(block[0].iter().any(|&s| s < 0.0));
        assert!(block[0].iter().all(|&s| s.abs() <= 1.0));
    }

    #[test]
    fn test_blocks_are_continuous() {
        let mut split = ToneGenerator::new(48_000, 1, 1000.0, 1.0);
        let mut whole = ToneGenerator::new(48_000, 1, 1000.0, 1.0);

        let mut joined = split.next_block(100).remove(0);
        joined.extend(split.next_block(100).remove(0));
        let reference = whole.next_block(200).remove(0);

        for (a, b) in joined.iter().zip(&reference) {
            assert!((a - b).abs() < 1e-5);
        }
    }

    #[test]
    fn test_zero_amplitude_is_silence() {
        let mut tone = ToneGenerator::new(48_000, 2, 440.0, 0.0);
        assert!(tone.next_block(64).iter().flatten().all(|&s| s == 0.0));
    }
}
