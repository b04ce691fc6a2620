//! Material Cache Settings
//!
//! Runtime configuration for the permutation cache and profile atlas.
//!
//! ```rust,ignore
//! use myth_material::{MaterialCacheSettings, QualityTier, CapabilityTierMask};
//!
//! let settings = MaterialCacheSettings {
//!     active_quality: QualityTier::Medium,
//!     capability_tiers: CapabilityTierMask::ES3_1 | CapabilityTierMask::SM5,
//!     ..Default::default()
//! };
//! ```

use serde::{Deserialize, Serialize};

use crate::errors::Result;
use crate::tiers::{CapabilityTierMask, QualityTier};

/// Configuration shared by the mutation-context side of the cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaterialCacheSettings {
    /// Quality tier programs are compiled for when caching for rendering.
    pub active_quality: QualityTier,

    /// Capability tiers reachable on the running hardware.
    ///
    /// Only these tiers are compiled by `cache_for_rendering`.
    pub capability_tiers: CapabilityTierMask,

    /// Keep a single best-matching quality program per capability tier when
    /// loading packaged permutations. Off by default.
    pub discard_unused_quality: bool,

    /// Initial row capacity of the subsurface profile atlas.
    pub atlas_initial_rows: usize,

    /// Hard limit on parent-chain walks. Chains deeper than this are reported
    /// as cyclic.
    pub max_inheritance_depth: usize,
}

impl Default for MaterialCacheSettings {
    fn default() -> Self {
        Self {
            active_quality: QualityTier::High,
            capability_tiers: CapabilityTierMask::SM5,
            discard_unused_quality: false,
            atlas_initial_rows: 64,
            max_inheritance_depth: 64,
        }
    }
}

impl MaterialCacheSettings {
    /// Parses settings from JSON. Missing fields fall back to defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serializes settings to pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
