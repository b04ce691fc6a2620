//! Parameter Values
//!
//! A material parameter is a tagged union over a fixed set of kinds. Two of
//! those kinds are *static*: changing them changes the compiled program. The
//! rest are *dynamic* and only change values uploaded at draw time.

use glam::Vec4;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use xxhash_rust::xxh3::Xxh3;

/// Reference to a texture asset. Resolved to a GPU handle by a
/// [`TextureResolver`](crate::compile::TextureResolver) before publishing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TextureRef(pub Uuid);

impl TextureRef {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TextureRef {
    fn default() -> Self {
        Self(Uuid::nil())
    }
}

/// A font page used as a texture source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct FontRef {
    pub font: TextureRef,
    pub page: u32,
}

/// Channel selection baked into the compiled program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ComponentMask {
    pub r: bool,
    pub g: bool,
    pub b: bool,
    pub a: bool,
}

impl ComponentMask {
    pub const RGBA: Self = Self {
        r: true,
        g: true,
        b: true,
        a: true,
    };

    #[must_use]
    pub fn bits(self) -> u8 {
        u8::from(self.r) | (u8::from(self.g) << 1) | (u8::from(self.b) << 2) | (u8::from(self.a) << 3)
    }
}

/// Discriminant of [`ParameterValue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParameterKind {
    Scalar,
    Vector,
    Texture,
    Font,
    StaticSwitch,
    StaticComponentMask,
    LayerWeight,
}

impl ParameterKind {
    /// Static kinds feed the shader compiler; dynamic kinds do not.
    #[inline]
    #[must_use]
    pub fn is_static(self) -> bool {
        matches!(
            self,
            Self::StaticSwitch | Self::StaticComponentMask | Self::LayerWeight
        )
    }

    /// Kinds that live in the render proxy's value tables.
    #[inline]
    #[must_use]
    pub fn is_dynamic(self) -> bool {
        !self.is_static()
    }
}

/// A parameter value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value")]
pub enum ParameterValue {
    Scalar(f32),
    Vector(Vec4),
    Texture(TextureRef),
    Font(FontRef),
    StaticSwitch(bool),
    StaticComponentMask(ComponentMask),
    /// Weightmap index of a landscape-style layer blend. `-1` means unused.
    LayerWeight(i32),
}

impl ParameterValue {
    #[must_use]
    pub fn kind(&self) -> ParameterKind {
        match self {
            Self::Scalar(_) => ParameterKind::Scalar,
            Self::Vector(_) => ParameterKind::Vector,
            Self::Texture(_) => ParameterKind::Texture,
            Self::Font(_) => ParameterKind::Font,
            Self::StaticSwitch(_) => ParameterKind::StaticSwitch,
            Self::StaticComponentMask(_) => ParameterKind::StaticComponentMask,
            Self::LayerWeight(_) => ParameterKind::LayerWeight,
        }
    }

    #[inline]
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.kind().is_static()
    }

    /// Zero value of a kind, returned when nothing in a chain declares a name.
    #[must_use]
    pub fn zeroed(kind: ParameterKind) -> Self {
        match kind {
            ParameterKind::Scalar => Self::Scalar(0.0),
            ParameterKind::Vector => Self::Vector(Vec4::ZERO),
            ParameterKind::Texture => Self::Texture(TextureRef::default()),
            ParameterKind::Font => Self::Font(FontRef::default()),
            ParameterKind::StaticSwitch => Self::StaticSwitch(false),
            ParameterKind::StaticComponentMask => {
                Self::StaticComponentMask(ComponentMask::default())
            }
            ParameterKind::LayerWeight => Self::LayerWeight(-1),
        }
    }

    #[must_use]
    pub fn as_scalar(&self) -> Option<f32> {
        match *self {
            Self::Scalar(v) => Some(v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_vector(&self) -> Option<Vec4> {
        match *self {
            Self::Vector(v) => Some(v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_texture(&self) -> Option<TextureRef> {
        match *self {
            Self::Texture(t) => Some(t),
            Self::Font(f) => Some(f.font),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_switch(&self) -> Option<bool> {
        match *self {
            Self::StaticSwitch(v) => Some(v),
            _ => None,
        }
    }

    /// Feeds a stable byte encoding of the value into a hasher.
    ///
    /// Floats are hashed by bit pattern, so `0.0` and `-0.0` differ.
    pub(crate) fn hash_into(&self, hasher: &mut Xxh3) {
        hasher.update(&[self.kind() as u8]);
        match *self {
            Self::Scalar(v) => hasher.update(&v.to_bits().to_le_bytes()),
            Self::Vector(v) => {
                for c in v.to_array() {
                    hasher.update(&c.to_bits().to_le_bytes());
                }
            }
            Self::Texture(t) => hasher.update(t.0.as_bytes()),
            Self::Font(f) => {
                hasher.update(f.font.0.as_bytes());
                hasher.update(&f.page.to_le_bytes());
            }
            Self::StaticSwitch(v) => hasher.update(&[u8::from(v)]),
            Self::StaticComponentMask(m) => hasher.update(&[m.bits()]),
            Self::LayerWeight(w) => hasher.update(&w.to_le_bytes()),
        }
    }
}

impl From<f32> for ParameterValue {
    fn from(v: f32) -> Self {
        Self::Scalar(v)
    }
}

impl From<Vec4> for ParameterValue {
    fn from(v: Vec4) -> Self {
        Self::Vector(v)
    }
}

impl From<TextureRef> for ParameterValue {
    fn from(t: TextureRef) -> Self {
        Self::Texture(t)
    }
}

impl From<bool> for ParameterValue {
    fn from(v: bool) -> Self {
        Self::StaticSwitch(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_kinds() {
        assert!(ParameterKind::StaticSwitch.is_static());
        assert!(ParameterKind::StaticComponentMask.is_static());
        assert!(ParameterKind::LayerWeight.is_static());
        assert!(ParameterKind::Scalar.is_dynamic());
        assert!(ParameterKind::Font.is_dynamic());
    }

    #[test]
    fn zeroed_matches_kind() {
        for kind in [
            ParameterKind::Scalar,
            ParameterKind::Vector,
            ParameterKind::Texture,
            ParameterKind::Font,
            ParameterKind::StaticSwitch,
            ParameterKind::StaticComponentMask,
            ParameterKind::LayerWeight,
        ] {
            assert_eq!(ParameterValue::zeroed(kind).kind(), kind);
        }
    }

    #[test]
    fn hash_distinguishes_kinds() {
        let digest = |v: ParameterValue| {
            let mut h = Xxh3::new();
            v.hash_into(&mut h);
            h.digest()
        };
        assert_ne!(
            digest(ParameterValue::StaticSwitch(false)),
            digest(ParameterValue::StaticComponentMask(ComponentMask::default()))
        );
        assert_eq!(digest(ParameterValue::Scalar(1.5)), digest(ParameterValue::Scalar(1.5)));
    }

    #[test]
    fn serde_uses_tagged_layout() {
        let json = serde_json::to_string(&ParameterValue::Scalar(3.0)).unwrap();
        assert_eq!(json, r#"{"kind":"Scalar","value":3.0}"#);
    }
}
