//! Per-bone playback state and animation requests.

use bytemuck::{Pod, Zeroable};

/// How a sequence advances once it reaches its end.
#[repr(u32)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum PlayMode {
    /// Holds the current frame.
    #[default]
    Stopped = 0,
    /// Plays to the end, then stops on the last frame.
    PlayOnce = 1,
    /// Wraps to the start.
    Loop = 2,
}

impl PlayMode {
    /// Mode for a request's flags.
    #[must_use]
    pub const fn from_flags(is_playing: bool, is_looping: bool) -> Self {
        match (is_playing, is_looping) {
            (false, _) => Self::Stopped,
            (true, false) => Self::PlayOnce,
            (true, true) => Self::Loop,
        }
    }

    /// Decodes the GPU representation. Unknown values read as stopped.
    #[must_use]
    pub const fn from_raw(raw: u32) -> Self {
        match raw {
            1 => Self::PlayOnce,
            2 => Self::Loop,
            _ => Self::Stopped,
        }
    }
}

/// Playback state of one bone of one instance (16 bytes).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct AnimationBoneInstance {
    /// Seconds into the active sequence.
    pub progress: f32,
    /// Active sequence index.
    pub sequence_index: u32,
    /// Keyframe at or before `progress`.
    pub frame_index: u32,
    /// [`PlayMode`] as `u32`.
    pub play_mode: u32,
}

impl AnimationBoneInstance {
    /// Decoded play mode.
    #[inline]
    #[must_use]
    pub const fn mode(&self) -> PlayMode {
        PlayMode::from_raw(self.play_mode)
    }
}

/// Cross-thread request to change an instance's animation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnimationRequest {
    /// Target instance.
    pub instance_id: u32,
    /// Sequence index within the instance's model.
    pub sequence_id: u32,
    /// Starts playback. `false` stops on the first frame.
    pub is_playing: bool,
    /// Wraps at the end instead of stopping.
    pub is_looping: bool,
}

impl AnimationRequest {
    /// Play mode the request selects.
    #[must_use]
    pub const fn play_mode(&self) -> PlayMode {
        PlayMode::from_flags(self.is_playing, self.is_looping)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        assert_eq!(std::mem::size_of::<AnimationBoneInstance>(), 16);
    }

    #[test]
    fn test_play_mode_flags() {
        assert_eq!(PlayMode::from_flags(false, true), PlayMode::Stopped);
        assert_eq!(PlayMode::from_flags(true, false), PlayMode::PlayOnce);
        assert_eq!(PlayMode::from_flags(true, true), PlayMode::Loop);
        assert_eq!(PlayMode::from_raw(PlayMode::Loop as u32), PlayMode::Loop);
        assert_eq!(PlayMode::from_raw(7), PlayMode::Stopped);
    }
}
