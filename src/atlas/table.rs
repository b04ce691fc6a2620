//! Profile Atlas
//!
//! A 2D table with one row per subsurface profile. Row 0 always holds the
//! default (human skin) profile; rows are handed out lowest-free-first and
//! recycled on removal. The GPU-ready texture is rebuilt lazily after any
//! change and shared through an `Arc`.
//!
//! # Row layout
//!
//! | texel | contents |
//! |---|---|
//! | 0 | subsurface colour rgb, encoded scatter radius |
//! | 1.. | the three mirrored kernels, largest first |

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use half::f16;

use crate::atlas::kernel::{KERNEL_SIZES, KERNEL_TEXELS, mirrored_kernel};
use crate::atlas::profile::{ProfileHandle, SlotIndex, SubsurfaceProfileSettings};
use crate::errors::{MaterialError, Result};

/// Hard row limit. Slots are published as `index / 255`, so 256 rows is
/// the most that can be addressed.
pub const MAX_ATLAS_ROWS: usize = 256;

/// Texels per row: one header followed by every kernel tap.
pub const ATLAS_ROW_TEXELS: usize = 1 + KERNEL_TEXELS;

/// Scatter radii are divided by this before storage so they fit the
/// normalized half-float range.
pub const SUBSURFACE_RADIUS_SCALE: f32 = 1024.0;

/// Quantization steps per world unit.
const RADIUS_STEPS: f32 = 256.0;

/// Rounds a radius toward zero onto the storage grid.
///
/// Idempotent: quantizing a quantized radius returns it unchanged.
#[must_use]
pub fn quantize_radius(radius: f32) -> f32 {
    (radius.clamp(0.0, SUBSURFACE_RADIUS_SCALE) * RADIUS_STEPS).trunc() / RADIUS_STEPS
}

#[must_use]
pub fn encode_radius(radius: f32) -> f16 {
    f16::from_f32(quantize_radius(radius) / SUBSURFACE_RADIUS_SCALE)
}

#[must_use]
pub fn decode_radius(encoded: f16) -> f32 {
    encoded.to_f32() * SUBSURFACE_RADIUS_SCALE
}

/// One RGBA16F texel.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct AtlasTexel(pub [f16; 4]);

impl AtlasTexel {
    fn new(rgb: Vec3, a: f32) -> Self {
        Self([
            f16::from_f32(rgb.x),
            f16::from_f32(rgb.y),
            f16::from_f32(rgb.z),
            f16::from_f32(a),
        ])
    }
}

/// Immutable snapshot of the atlas, ready for upload.
#[derive(Debug, Clone, PartialEq)]
pub struct AtlasTexture {
    pub version: u64,
    pub rows: usize,
    texels: Vec<AtlasTexel>,
}

impl AtlasTexture {
    #[inline]
    #[must_use]
    pub fn width(&self) -> usize {
        ATLAS_ROW_TEXELS
    }

    #[must_use]
    pub fn row(&self, slot: SlotIndex) -> Option<&[AtlasTexel]> {
        let start = slot.index() * ATLAS_ROW_TEXELS;
        self.texels.get(start..start + ATLAS_ROW_TEXELS)
    }

    /// Decoded scatter radius stored in a row header.
    #[must_use]
    pub fn scatter_radius(&self, slot: SlotIndex) -> Option<f32> {
        self.row(slot).map(|row| decode_radius(row[0].0[3]))
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.texels)
    }
}

#[derive(Debug, Clone, Copy)]
struct AtlasRow {
    owner: Option<ProfileHandle>,
    settings: SubsurfaceProfileSettings,
}

const FREE_ROW: AtlasRow = AtlasRow {
    owner: None,
    settings: SubsurfaceProfileSettings::ZERO,
};

#[derive(Debug)]
pub struct ProfileAtlas {
    rows: Vec<AtlasRow>,
    capacity: usize,
    texture: Option<Arc<AtlasTexture>>,
    version: u64,
}

impl Default for ProfileAtlas {
    fn default() -> Self {
        Self::new(64)
    }
}

impl ProfileAtlas {
    #[must_use]
    pub fn new(initial_rows: usize) -> Self {
        let default_row = AtlasRow {
            owner: None,
            settings: quantized(SubsurfaceProfileSettings::default()),
        };
        Self {
            rows: vec![default_row],
            capacity: initial_rows.clamp(1, MAX_ATLAS_ROWS),
            texture: None,
            version: 1,
        }
    }

    /// Current row capacity. Doubles on demand up to [`MAX_ATLAS_ROWS`].
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Rows in use, including the default row.
    #[must_use]
    pub fn len(&self) -> usize {
        1 + self.rows.iter().filter(|r| r.owner.is_some()).count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 1
    }

    #[inline]
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// True if the texture must be rebuilt before the next upload.
    #[inline]
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.texture.is_none()
    }

    /// Linear scan for the row owned by `owner`.
    #[must_use]
    pub fn find_slot(&self, owner: ProfileHandle) -> Option<SlotIndex> {
        self.rows
            .iter()
            .position(|r| r.owner == Some(owner))
            .map(|i| SlotIndex(i as u8))
    }

    #[must_use]
    pub fn settings(&self, slot: SlotIndex) -> Option<&SubsurfaceProfileSettings> {
        self.rows.get(slot.index()).map(|r| &r.settings)
    }

    /// Updates the row of `owner`, allocating the lowest free row if it has none.
    pub fn add_or_update(
        &mut self,
        owner: ProfileHandle,
        settings: SubsurfaceProfileSettings,
    ) -> Result<SlotIndex> {
        let settings = quantized(settings);
        let slot = match self.find_slot(owner) {
            Some(slot) => slot,
            None => self.allocate(owner)?,
        };
        let row = &mut self.rows[slot.index()];
        if row.settings != settings {
            row.settings = settings;
            self.mark_dirty();
        }
        Ok(slot)
    }

    fn allocate(&mut self, owner: ProfileHandle) -> Result<SlotIndex> {
        let free = self
            .rows
            .iter()
            .skip(1)
            .position(|r| r.owner.is_none())
            .map(|i| i + 1);

        let index = if let Some(index) = free {
            index
        } else {
            if self.rows.len() >= MAX_ATLAS_ROWS {
                log::warn!("Subsurface profile atlas is full ({MAX_ATLAS_ROWS} rows)");
                return Err(MaterialError::AtlasFull {
                    capacity: MAX_ATLAS_ROWS,
                });
            }
            if self.rows.len() >= self.capacity {
                self.capacity = (self.capacity * 2).min(MAX_ATLAS_ROWS);
                log::info!("Grew subsurface profile atlas to {} rows", self.capacity);
            }
            self.rows.push(FREE_ROW);
            self.rows.len() - 1
        };

        self.rows[index].owner = Some(owner);
        self.mark_dirty();
        Ok(SlotIndex(index as u8))
    }

    /// Releases the row of `owner`. The row is zeroed and becomes reusable.
    pub fn remove(&mut self, owner: ProfileHandle) -> Option<SlotIndex> {
        let slot = self.find_slot(owner)?;
        self.rows[slot.index()] = FREE_ROW;
        self.mark_dirty();
        Some(slot)
    }

    fn mark_dirty(&mut self) {
        self.texture = None;
        self.version += 1;
    }

    /// Shared texture, rebuilt if anything changed since the last call.
    pub fn texture(&mut self) -> Arc<AtlasTexture> {
        if let Some(texture) = &self.texture {
            return Arc::clone(texture);
        }
        let texture = Arc::new(self.build_texture());
        self.texture = Some(Arc::clone(&texture));
        texture
    }

    fn build_texture(&self) -> AtlasTexture {
        let mut texels = vec![AtlasTexel::default(); self.capacity * ATLAS_ROW_TEXELS];

        for (index, row) in self.rows.iter().enumerate() {
            if index > 0 && row.owner.is_none() {
                continue;
            }
            let out = &mut texels[index * ATLAS_ROW_TEXELS..(index + 1) * ATLAS_ROW_TEXELS];
            let s = &row.settings;

            out[0] = AtlasTexel([
                f16::from_f32(s.subsurface_color.x),
                f16::from_f32(s.subsurface_color.y),
                f16::from_f32(s.subsurface_color.z),
                encode_radius(s.scatter_radius),
            ]);

            let mut cursor = 1;
            for stored in KERNEL_SIZES {
                for tap in mirrored_kernel(stored, s.subsurface_color, s.falloff_color) {
                    out[cursor] = AtlasTexel::new(tap.truncate(), tap.w);
                    cursor += 1;
                }
            }
        }

        log::debug!(
            "Rebuilt subsurface profile atlas: {} rows, version {}",
            self.capacity,
            self.version
        );
        AtlasTexture {
            version: self.version,
            rows: self.capacity,
            texels,
        }
    }
}

fn quantized(mut settings: SubsurfaceProfileSettings) -> SubsurfaceProfileSettings {
    settings.scatter_radius = quantize_radius(settings.scatter_radius);
    settings
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    fn owners(n: usize) -> Vec<ProfileHandle> {
        let mut map: SlotMap<ProfileHandle, ()> = SlotMap::with_key();
        (0..n).map(|_| map.insert(())).collect()
    }

    #[test]
    fn quantization_is_idempotent() {
        for r in [0.0, 0.1, 1.2, 3.3, 999.9] {
            let q = quantize_radius(r);
            assert_eq!(quantize_radius(q), q);
            assert!(q <= r);
        }
    }

    #[test]
    fn slots_are_reused_lowest_first() {
        let o = owners(3);
        let mut atlas = ProfileAtlas::new(4);
        let s = SubsurfaceProfileSettings::default();

        assert_eq!(atlas.add_or_update(o[0], s).unwrap(), SlotIndex(1));
        assert_eq!(atlas.add_or_update(o[1], s).unwrap(), SlotIndex(2));
        assert_eq!(atlas.add_or_update(o[2], s).unwrap(), SlotIndex(3));

        atlas.remove(o[0]);
        atlas.remove(o[1]);
        assert_eq!(atlas.settings(SlotIndex(1)), Some(&SubsurfaceProfileSettings::ZERO));

        let again = owners(5);
        assert_eq!(atlas.add_or_update(again[4], s).unwrap(), SlotIndex(1));
    }

    #[test]
    fn grows_by_doubling_until_full() {
        let o = owners(MAX_ATLAS_ROWS);
        let mut atlas = ProfileAtlas::new(2);
        let s = SubsurfaceProfileSettings::default();

        atlas.add_or_update(o[0], s).unwrap();
        assert_eq!(atlas.capacity(), 2);
        atlas.add_or_update(o[1], s).unwrap();
        assert_eq!(atlas.capacity(), 4);

        for &owner in &o[2..MAX_ATLAS_ROWS - 1] {
            atlas.add_or_update(owner, s).unwrap();
        }
        assert_eq!(atlas.capacity(), MAX_ATLAS_ROWS);
        assert!(matches!(
            atlas.add_or_update(o[MAX_ATLAS_ROWS - 1], s),
            Err(MaterialError::AtlasFull { .. })
        ));
    }

    #[test]
    fn texture_rebuilds_only_when_dirty() {
        let o = owners(1);
        let mut atlas = ProfileAtlas::new(8);
        let first = atlas.texture();
        assert!(Arc::ptr_eq(&first, &atlas.texture()));

        let settings = SubsurfaceProfileSettings {
            scatter_radius: 3.0,
            ..Default::default()
        };
        let slot = atlas.add_or_update(o[0], settings).unwrap();
        let second = atlas.texture();
        assert!(!Arc::ptr_eq(&first, &second));
        assert!((second.scatter_radius(slot).unwrap() - 3.0).abs() < 0.01);

        atlas.add_or_update(o[0], settings).unwrap();
        assert!(!atlas.is_dirty());
        assert_eq!(second.as_bytes().len(), 8 * ATLAS_ROW_TEXELS * 8);
    }

    #[test]
    fn default_row_survives_updates() {
        let o = owners(2);
        let mut atlas = ProfileAtlas::new(8);
        let before = *atlas.settings(SlotIndex::DEFAULT).unwrap();
        for i in 0..10 {
            let s = SubsurfaceProfileSettings {
                scatter_radius: i as f32,
                ..Default::default()
            };
            atlas.add_or_update(o[i % 2], s).unwrap();
        }
        assert_eq!(*atlas.settings(SlotIndex::DEFAULT).unwrap(), before);
        assert!(atlas.find_slot(o[0]).is_some());
    }
}
