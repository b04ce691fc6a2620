//! Subsurface Profile Atlas
//!
//! - [`profile`]: profile settings, owner handles and slot indices
//! - [`kernel`]: separable scattering kernel generation
//! - [`table`]: the row allocator and its GPU-ready texture

pub mod kernel;
pub mod profile;
pub mod table;

pub use profile::{ProfileHandle, SlotIndex, SubsurfaceProfileSettings};
pub use table::{
    ATLAS_ROW_TEXELS, AtlasTexel, AtlasTexture, MAX_ATLAS_ROWS, ProfileAtlas,
    SUBSURFACE_RADIUS_SCALE,
};
