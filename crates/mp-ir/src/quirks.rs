//! Format-tag registry: channel counts and effect quirks.
//!
//! The 4-byte tag at offset 1080 identifies which tracker wrote the
//! file; it fixes the channel count and may flag deviant effect
//! behavior. Resolution never fails — unknown tags fall back to the
//! legacy 4-channel default at the call site.

use bitflags::bitflags;

bitflags! {
    /// Per-format effect behavior deviations.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct EffectQuirks: u32 {
        /// 8xx is a panning command in this format (no known tag sets
        /// this yet; modeled so the registry can carry it).
        const PAN_SLIDE = 1;
    }
}

/// Channel count and effect quirks resolved from a format tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TrackerQuirks {
    pub channels: usize,
    pub effects: EffectQuirks,
}

impl Default for TrackerQuirks {
    /// The legacy default: 4 channels, no quirks.
    fn default() -> Self {
        plain(4)
    }
}

const fn plain(channels: usize) -> TrackerQuirks {
    TrackerQuirks {
        channels,
        effects: EffectQuirks::empty(),
    }
}

/// Resolve a format tag to its tracker quirks.
///
/// Returns `None` for unrecognized tags; callers fall back to
/// [`TrackerQuirks::default`] and report a non-fatal diagnostic.
pub fn resolve(tag: &[u8; 4]) -> Option<TrackerQuirks> {
    match tag {
        b"M.K." | b"M!K!" | b"FLT4" => Some(plain(4)),
        b"5CHN" => Some(plain(5)),
        b"6CHN" => Some(plain(6)),
        b"7CHN" => Some(plain(7)),
        b"8CHN" | b"OCTA" | b"OKTA" | b"CD81" => Some(plain(8)),
        b"9CHN" => Some(plain(9)),
        b"TDZ1" => Some(plain(1)),
        b"TDZ2" => Some(plain(2)),
        b"TDZ3" => Some(plain(3)),
        _ => resolve_multichannel(tag),
    }
}

/// FastTracker/TakeTracker tags: `<NN>CH` / `<NN>CN` for even NN in
/// 10..=32.
fn resolve_multichannel(tag: &[u8; 4]) -> Option<TrackerQuirks> {
    match &tag[2..] {
        b"CH" | b"CN" => {}
        _ => return None,
    }
    if !tag[0].is_ascii_digit() || !tag[1].is_ascii_digit() {
        return None;
    }
    let n = (tag[0] - b'0') as usize * 10 + (tag[1] - b'0') as usize;
    if (10..=32).contains(&n) && n % 2 == 0 {
        Some(plain(n))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channels(tag: &[u8; 4]) -> Option<usize> {
        resolve(tag).map(|q| q.channels)
    }

    #[test]
    fn classic_four_channel_tags() {
        assert_eq!(channels(b"M.K."), Some(4));
        assert_eq!(channels(b"M!K!"), Some(4));
        assert_eq!(channels(b"FLT4"), Some(4));
    }

    #[test]
    fn numbered_chn_tags() {
        assert_eq!(channels(b"5CHN"), Some(5));
        assert_eq!(channels(b"6CHN"), Some(6));
        assert_eq!(channels(b"7CHN"), Some(7));
        assert_eq!(channels(b"8CHN"), Some(8));
        assert_eq!(channels(b"9CHN"), Some(9));
    }

    #[test]
    fn eight_channel_aliases() {
        for tag in [b"OCTA", b"OKTA", b"CD81"] {
            assert_eq!(channels(tag), Some(8));
        }
    }

    #[test]
    fn tdz_tags() {
        assert_eq!(channels(b"TDZ1"), Some(1));
        assert_eq!(channels(b"TDZ2"), Some(2));
        assert_eq!(channels(b"TDZ3"), Some(3));
    }

    #[test]
    fn even_multichannel_tags() {
        assert_eq!(channels(b"10CH"), Some(10));
        assert_eq!(channels(b"10CN"), Some(10));
        assert_eq!(channels(b"16CH"), Some(16));
        assert_eq!(channels(b"32CN"), Some(32));
    }

    #[test]
    fn odd_or_out_of_range_multichannel_tags() {
        assert_eq!(channels(b"11CH"), None);
        assert_eq!(channels(b"08CH"), None);
        assert_eq!(channels(b"34CH"), None);
        assert_eq!(channels(b"xxCH"), None);
    }

    #[test]
    fn unknown_tag_resolves_to_none() {
        assert_eq!(resolve(b"XPKF"), None);
        assert_eq!(resolve(b"\0\0\0\0"), None);
    }

    #[test]
    fn default_is_legacy_four_channel() {
        let q = TrackerQuirks::default();
        assert_eq!(q.channels, 4);
        assert!(q.effects.is_empty());
    }
}
