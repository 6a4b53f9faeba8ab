//! Speaker layout negotiation.
//!
//! Output devices report their channel arrangement as a speaker bitmask
//! (one bit per physical speaker position). Monitoring only distinguishes a
//! fixed set of layouts; anything else falls back to a layout picked by
//! channel count.

/// Speaker position bits, as reported in device channel masks.
pub mod speaker {
    /// Front left.
    pub const FRONT_LEFT: u32 = 0x1;
    /// Front right.
    pub const FRONT_RIGHT: u32 = 0x2;
    /// Front center.
    pub const FRONT_CENTER: u32 = 0x4;
    /// Low-frequency effects.
    pub const LOW_FREQUENCY: u32 = 0x8;
    /// Back left.
    pub const BACK_LEFT: u32 = 0x10;
    /// Back right.
    pub const BACK_RIGHT: u32 = 0x20;
    /// Front left of center.
    pub const FRONT_LEFT_OF_CENTER: u32 = 0x40;
    /// Front right of center.
    pub const FRONT_RIGHT_OF_CENTER: u32 = 0x80;
    /// Back center.
    pub const BACK_CENTER: u32 = 0x100;
    /// Side left.
    pub const SIDE_LEFT: u32 = 0x200;
    /// Side right.
    pub const SIDE_RIGHT: u32 = 0x400;
}

/// Channel masks of the recognized layouts.
pub mod mask {
    use super::speaker::{
        BACK_CENTER, BACK_LEFT, BACK_RIGHT, FRONT_CENTER, FRONT_LEFT, FRONT_LEFT_OF_CENTER,
        FRONT_RIGHT, FRONT_RIGHT_OF_CENTER, LOW_FREQUENCY, SIDE_LEFT, SIDE_RIGHT,
    };

    /// Mono (front center).
    pub const MONO: u32 = FRONT_CENTER;
    /// Stereo.
    pub const STEREO: u32 = FRONT_LEFT | FRONT_RIGHT;
    /// Stereo plus LFE.
    pub const TWO_POINT_ONE: u32 = STEREO | LOW_FREQUENCY;
    /// Front and back pairs.
    pub const QUAD: u32 = STEREO | BACK_LEFT | BACK_RIGHT;
    /// Quad plus LFE.
    pub const FOUR_POINT_ONE: u32 = QUAD | LOW_FREQUENCY;
    /// Front pair, front center, back center.
    pub const SURROUND: u32 = STEREO | FRONT_CENTER | BACK_CENTER;
    /// 5.1 with back surrounds.
    pub const FIVE_POINT_ONE: u32 = STEREO | FRONT_CENTER | LOW_FREQUENCY | BACK_LEFT | BACK_RIGHT;
    /// 5.1 with side surrounds.
    pub const FIVE_POINT_ONE_SURROUND: u32 =
        STEREO | FRONT_CENTER | LOW_FREQUENCY | SIDE_LEFT | SIDE_RIGHT;
    /// 7.1 with front-of-center pair.
    pub const SEVEN_POINT_ONE: u32 = FIVE_POINT_ONE | FRONT_LEFT_OF_CENTER | FRONT_RIGHT_OF_CENTER;
    /// 7.1 with side surrounds.
    pub const SEVEN_POINT_ONE_SURROUND: u32 = FIVE_POINT_ONE | SIDE_LEFT | SIDE_RIGHT;
}

/// A channel arrangement understood by the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SpeakerLayout {
    /// Unrecognized arrangement.
    #[default]
    Unknown,
    /// One channel.
    Mono,
    /// Two channels.
    Stereo,
    /// Stereo plus LFE.
    TwoPointOne,
    /// Four channels, front and back pairs.
    Quad,
    /// Quad plus LFE.
    FourPointOne,
    /// Four channels: front pair, center, back center.
    Surround,
    /// Six channels with back surrounds.
    FivePointOne,
    /// Six channels with side surrounds.
    FivePointOneSurround,
    /// Eight channels with front-of-center pair.
    SevenPointOne,
    /// Eight channels with side surrounds.
    SevenPointOneSurround,
}

impl SpeakerLayout {
    /// Maps a device channel mask to a layout.
    ///
    /// Masks outside the recognized set fall back to
    /// [`from_channel_count`](Self::from_channel_count).
    pub fn from_channel_mask(channel_mask: u32, channels: u16) -> Self {
        match channel_mask {
            mask::MONO => Self::Mono,
            mask::STEREO => Self::Stereo,
            mask::TWO_POINT_ONE => Self::TwoPointOne,
            mask::QUAD => Self::Quad,
            mask::FOUR_POINT_ONE => Self::FourPointOne,
            mask::SURROUND => Self::Surround,
            mask::FIVE_POINT_ONE => Self::FivePointOne,
            mask::FIVE_POINT_ONE_SURROUND => Self::FivePointOneSurround,
            mask::SEVEN_POINT_ONE => Self::SevenPointOne,
            mask::SEVEN_POINT_ONE_SURROUND => Self::SevenPointOneSurround,
            _ => Self::from_channel_count(channels),
        }
    }

    /// Picks a layout purely from the channel count.
    pub fn from_channel_count(channels: u16) -> Self {
        match channels {
            1 => Self::Mono,
            2 => Self::Stereo,
            3 => Self::TwoPointOne,
            4 => Self::Quad,
            5 => Self::FourPointOne,
            6 => Self::FivePointOne,
            8 => Self::SevenPointOne,
            _ => Self::Unknown,
        }
    }

    /// Negotiates the layout from an optional mask.
    pub fn negotiate(channel_mask: Option<u32>, channels: u16) -> Self {
        match channel_mask {
            Some(m) => Self::from_channel_mask(m, channels),
            None => Self::from_channel_count(channels),
        }
    }

    /// Number of channels in this layout; zero for [`SpeakerLayout::Unknown`].
    pub fn channels(self) -> u16 {
        match self {
            Self::Unknown => 0,
            Self::Mono => 1,
            Self::Stereo => 2,
            Self::TwoPointOne => 3,
            Self::Quad | Self::Surround => 4,
            Self::FourPointOne => 5,
            Self::FivePointOne | Self::FivePointOneSurround => 6,
            Self::SevenPointOne | Self::SevenPointOneSurround => 8,
        }
    }

    /// Speaker mask of this layout; `None` for [`SpeakerLayout::Unknown`].
    ///
    /// Channels are ordered by ascending speaker bit.
    pub fn channel_mask(self) -> Option<u32> {
        let m = match self {
            Self::Unknown => return None,
            Self::Mono => mask::MONO,
            Self::Stereo => mask::STEREO,
            Self::TwoPointOne => mask::TWO_POINT_ONE,
            Self::Quad => mask::QUAD,
            Self::FourPointOne => mask::FOUR_POINT_ONE,
            Self::Surround => mask::SURROUND,
            Self::FivePointOne => mask::FIVE_POINT_ONE,
            Self::FivePointOneSurround => mask::FIVE_POINT_ONE_SURROUND,
            Self::SevenPointOne => mask::SEVEN_POINT_ONE,
            Self::SevenPointOneSurround => mask::SEVEN_POINT_ONE_SURROUND,
        };
        Some(m)
    }

    /// Speaker bit of each channel, in channel order.
    pub fn speakers(self) -> Vec<u32> {
        let m = self.channel_mask().unwrap_or(0);
        (0..u32::BITS)
            .map(|bit| 1 << bit)
            .filter(|b| m & b != 0)
            .collect()
    }
}

impl std::fmt::Display for SpeakerLayout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Unknown => "unknown",
            Self::Mono => "mono",
            Self::Stereo => "stereo",
            Self::TwoPointOne => "2.1",
            Self::Quad => "quad",
            Self::FourPointOne => "4.1",
            Self::Surround => "surround",
            Self::FivePointOne => "5.1",
            Self::FivePointOneSurround => "5.1-surround",
            Self::SevenPointOne => "7.1",
            Self::SevenPointOneSurround => "7.1-surround",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_masks() {
        let cases = [
            (mask::QUAD, 4, SpeakerLayout::Quad),
            (mask::TWO_POINT_ONE, 3, SpeakerLayout::TwoPointOne),
            (mask::FOUR_POINT_ONE, 5, SpeakerLayout::FourPointOne),
            (mask::SURROUND, 4, SpeakerLayout::Surround),
            (mask::FIVE_POINT_ONE, 6, SpeakerLayout::FivePointOne),
            (mask::FIVE_POINT_ONE_SURROUND, 6, SpeakerLayout::FivePointOneSurround),
            (mask::SEVEN_POINT_ONE, 8, SpeakerLayout::SevenPointOne),
            (mask::SEVEN_POINT_ONE_SURROUND, 8, SpeakerLayout::SevenPointOneSurround),
        ];
        for (m, channels, expected) in cases {
            let layout = SpeakerLayout::from_channel_mask(m, channels);
            assert_eq!(layout, expected, "mask {m:#x}");
            assert_eq!(layout.channels(), channels);
        }
    }

    #[test]
    fn test_mask_values() {
        assert_eq!(mask::QUAD, 0x33);
        assert_eq!(mask::SURROUND, 0x107);
        assert_eq!(mask::FIVE_POINT_ONE, 0x3f);
        assert_eq!(mask::FIVE_POINT_ONE_SURROUND, 0x60f);
        assert_eq!(mask::SEVEN_POINT_ONE, 0xff);
        assert_eq!(mask::SEVEN_POINT_ONE_SURROUND, 0x63f);
    }

    #[test]
    fn test_unknown_mask_falls_back_to_channel_count() {
        // Front pair plus side pair is not a recognized arrangement.
        let odd = speaker::FRONT_LEFT | speaker::FRONT_RIGHT | speaker::SIDE_LEFT | speaker::SIDE_RIGHT;
        assert_eq!(SpeakerLayout::from_channel_mask(odd, 4), SpeakerLayout::Quad);
        assert_eq!(SpeakerLayout::from_channel_mask(0, 2), SpeakerLayout::Stereo);
        assert_eq!(SpeakerLayout::from_channel_mask(0, 7), SpeakerLayout::Unknown);
    }

    #[test]
    fn test_negotiate_without_mask() {
        assert_eq!(SpeakerLayout::negotiate(None, 1), SpeakerLayout::Mono);
        assert_eq!(SpeakerLayout::negotiate(None, 6), SpeakerLayout::FivePointOne);
        assert_eq!(
            SpeakerLayout::negotiate(Some(mask::STEREO), 2),
            SpeakerLayout::Stereo
        );
    }

    #[test]
    fn test_channel_count_round_trip_for_count_layouts() {
        for channels in [1u16, 2, 3, 4, 5, 6, 8] {
            assert_eq!(SpeakerLayout::from_channel_count(channels).channels(), channels);
        }
    }

    #[test]
    fn test_masks_agree_with_channel_counts() {
        let layouts = [
            SpeakerLayout::Mono,
            SpeakerLayout::Stereo,
            SpeakerLayout::TwoPointOne,
            SpeakerLayout::Quad,
            SpeakerLayout::FourPointOne,
            SpeakerLayout::Surround,
            SpeakerLayout::FivePointOne,
            SpeakerLayout::FivePointOneSurround,
            SpeakerLayout::SevenPointOne,
            SpeakerLayout::SevenPointOneSurround,
        ];
        for layout in layouts {
            let m = layout.channel_mask().unwrap();
            assert_eq!(m.count_ones(), u32::from(layout.channels()), "{layout}");
            assert_eq!(SpeakerLayout::from_channel_mask(m, layout.channels()), layout);
        }
        assert_eq!(SpeakerLayout::Unknown.channel_mask(), None);
        assert!(SpeakerLayout::Unknown.speakers().is_empty());
    }

    #[test]
    fn test_speakers_in_channel_order() {
        assert_eq!(
            SpeakerLayout::FivePointOne.speakers(),
            vec![
                speaker::FRONT_LEFT,
                speaker::FRONT_RIGHT,
                speaker::FRONT_CENTER,
                speaker::LOW_FREQUENCY,
                speaker::BACK_LEFT,
                speaker::BACK_RIGHT,
            ]
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(SpeakerLayout::FivePointOneSurround.to_string(), "5.1-surround");
        assert_eq!(SpeakerLayout::TwoPointOne.to_string(), "2.1");
    }
}
