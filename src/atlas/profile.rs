use glam::Vec3;
use serde::{Deserialize, Serialize};
use slotmap::new_key_type;

new_key_type! {
    /// Owner of a subsurface profile. Rows of the atlas are keyed by it.
    pub struct ProfileHandle;
}

/// Row index in the profile atlas. Row 0 is the default profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct SlotIndex(pub u8);

impl SlotIndex {
    pub const DEFAULT: SlotIndex = SlotIndex(0);

    /// Value published through the reserved profile scalar parameter.
    #[inline]
    #[must_use]
    pub fn encode(self) -> f32 {
        f32::from(self.0) / 255.0
    }

    /// Inverse of [`encode`](Self::encode).
    #[inline]
    #[must_use]
    pub fn decode(value: f32) -> Self {
        Self((value.clamp(0.0, 1.0) * 255.0).round() as u8)
    }

    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        usize::from(self.0)
    }
}

/// Subsurface scattering parameters of one profile.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubsurfaceProfileSettings {
    /// World-space scatter distance.
    pub scatter_radius: f32,
    /// Per-channel strength of the scattered contribution.
    pub subsurface_color: Vec3,
    /// Per-channel scatter distance relative to `scatter_radius`.
    pub falloff_color: Vec3,
}

impl Default for SubsurfaceProfileSettings {
    /// Human skin.
    fn default() -> Self {
        Self {
            scatter_radius: 1.2,
            subsurface_color: Vec3::new(0.48, 0.41, 0.28),
            falloff_color: Vec3::new(1.0, 0.37, 0.3),
        }
    }
}

impl SubsurfaceProfileSettings {
    /// All-zero settings written to released rows.
    pub const ZERO: Self = Self {
        scatter_radius: 0.0,
        subsurface_color: Vec3::ZERO,
        falloff_color: Vec3::ZERO,
    };
}
