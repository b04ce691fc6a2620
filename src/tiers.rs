//! Quality and Capability Tiers
//!
//! A compiled permutation is addressed by a [`TierPair`]: one coarse quality
//! setting chosen by the user and one hardware feature level the program
//! targets. The permutation matrix is a dense
//! `[QUALITY_TIER_COUNT][CAPABILITY_TIER_COUNT]` grid over these.

use std::fmt;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

pub const QUALITY_TIER_COUNT: usize = 4;
pub const CAPABILITY_TIER_COUNT: usize = 4;

/// Score table used to pick a replacement quality tier when discarding
/// unused quality programs. Indexed by [`QualityTier::index`].
///
/// Epic is the zero baseline; higher tiers weigh more so that a lower
/// neighbour wins when a higher and a lower tier are both available.
pub const QUALITY_DISCARD_SCORES: [i32; QUALITY_TIER_COUNT] = [1, 3, 10, 0];

/// Coarse rendering-fidelity setting, selectable independently of hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum QualityTier {
    Low,
    Medium,
    High,
    Epic,
}

impl QualityTier {
    pub const ALL: [QualityTier; QUALITY_TIER_COUNT] =
        [Self::Low, Self::Medium, Self::High, Self::Epic];

    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self as usize
    }

    #[inline]
    #[must_use]
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Score used by the quality discard policy.
    #[inline]
    #[must_use]
    pub fn discard_score(self) -> i32 {
        QUALITY_DISCARD_SCORES[self.index()]
    }

    /// Distance between two tiers under the discard policy.
    #[inline]
    #[must_use]
    pub fn discard_distance(self, desired: QualityTier) -> i32 {
        (self.discard_score() - desired.discard_score()).abs()
    }
}

/// Hardware/API feature level a compiled program targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CapabilityTier {
    Es2,
    Es3_1,
    Sm4,
    Sm5,
}

impl CapabilityTier {
    pub const ALL: [CapabilityTier; CAPABILITY_TIER_COUNT] =
        [Self::Es2, Self::Es3_1, Self::Sm4, Self::Sm5];

    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self as usize
    }

    #[inline]
    #[must_use]
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    #[inline]
    #[must_use]
    pub fn mask(self) -> CapabilityTierMask {
        match self {
            Self::Es2 => CapabilityTierMask::ES2,
            Self::Es3_1 => CapabilityTierMask::ES3_1,
            Self::Sm4 => CapabilityTierMask::SM4,
            Self::Sm5 => CapabilityTierMask::SM5,
        }
    }
}

bitflags! {
    /// Set of capability tiers, e.g. the tiers reachable on the running hardware.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct CapabilityTierMask: u8 {
        const ES2   = 1 << 0;
        const ES3_1 = 1 << 1;
        const SM4   = 1 << 2;
        const SM5   = 1 << 3;
    }
}

impl Default for CapabilityTierMask {
    fn default() -> Self {
        Self::SM5
    }
}

impl CapabilityTierMask {
    /// Iterates the contained tiers from lowest to highest.
    pub fn tiers(self) -> impl Iterator<Item = CapabilityTier> {
        CapabilityTier::ALL
            .into_iter()
            .filter(move |tier| self.contains(tier.mask()))
    }
}

/// One cell of the permutation matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TierPair {
    pub quality: QualityTier,
    pub capability: CapabilityTier,
}

impl TierPair {
    #[inline]
    #[must_use]
    pub fn new(quality: QualityTier, capability: CapabilityTier) -> Self {
        Self {
            quality,
            capability,
        }
    }

    /// Every cell of the matrix, quality-major.
    pub fn all() -> impl Iterator<Item = TierPair> {
        QualityTier::ALL.into_iter().flat_map(|quality| {
            CapabilityTier::ALL
                .into_iter()
                .map(move |capability| TierPair::new(quality, capability))
        })
    }
}

impl fmt::Display for TierPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}/{:?}", self.quality, self.capability)
    }
}

/// Shader target platform. Packaging compiles per platform; the running
/// hardware is described by a [`CapabilityTierMask`] instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShaderPlatform {
    GlslEs2,
    GlslEs3_1,
    MetalMobile,
    VulkanMobile,
    D3dSm4,
    D3dSm5,
    MetalSm5,
    VulkanSm5,
}

impl ShaderPlatform {
    /// Highest capability tier a platform can run.
    #[must_use]
    pub fn max_capability_tier(self) -> CapabilityTier {
        match self {
            Self::GlslEs2 => CapabilityTier::Es2,
            Self::GlslEs3_1 | Self::MetalMobile | Self::VulkanMobile => CapabilityTier::Es3_1,
            Self::D3dSm4 => CapabilityTier::Sm4,
            Self::D3dSm5 | Self::MetalSm5 | Self::VulkanSm5 => CapabilityTier::Sm5,
        }
    }

    /// Platform used when compiling a capability tier on the running hardware.
    #[must_use]
    pub fn for_capability(tier: CapabilityTier) -> Self {
        match tier {
            CapabilityTier::Es2 => Self::GlslEs2,
            CapabilityTier::Es3_1 => Self::GlslEs3_1,
            CapabilityTier::Sm4 => Self::D3dSm4,
            CapabilityTier::Sm5 => Self::D3dSm5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_iterates_in_order() {
        let mask = CapabilityTierMask::SM5 | CapabilityTierMask::ES2;
        let tiers: Vec<_> = mask.tiers().collect();
        assert_eq!(tiers, vec![CapabilityTier::Es2, CapabilityTier::Sm5]);
    }

    #[test]
    fn discard_distance_prefers_lower_neighbour() {
        // Desired Medium (3): Low (1) is 2 away, High (10) is 7 away.
        assert!(
            QualityTier::Low.discard_distance(QualityTier::Medium)
                < QualityTier::High.discard_distance(QualityTier::Medium)
        );
        assert_eq!(QualityTier::Epic.discard_distance(QualityTier::Epic), 0);
    }

    #[test]
    fn all_pairs_cover_matrix() {
        assert_eq!(TierPair::all().count(), QUALITY_TIER_COUNT * CAPABILITY_TIER_COUNT);
    }
}
