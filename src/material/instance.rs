//! Material Instances
//!
//! An instance inherits everything from its parent and stores only what it
//! overrides. Dynamic overrides never touch compiled programs; static
//! overrides and base-property overrides give the instance a permutation
//! matrix of its own.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::atlas::ProfileHandle;
use crate::compile::PermutationMatrix;
use crate::material::definition::{BlendMode, ShadingModel};
use crate::material::registry::MaterialHandle;
use crate::params::{ParameterOverrideTable, StaticParameterSet};

/// Lifetime flavour of an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum InstanceKind {
    /// Authored asset. May carry static overrides and be used as a parent.
    #[default]
    Constant,
    /// Created at runtime for per-object tweaks. Dynamic overrides only and
    /// never a parent.
    Dynamic,
}

/// Fixed-function properties an instance may override.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BasePropertyOverrides {
    pub opacity_mask_clip_value: Option<f32>,
    pub blend_mode: Option<BlendMode>,
    pub shading_model: Option<ShadingModel>,
    pub two_sided: Option<bool>,
    pub dithered_lod_transition: Option<bool>,
}

impl BasePropertyOverrides {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Fills fields this set leaves open from an ancestor's overrides.
    #[must_use]
    pub fn or(self, ancestor: &Self) -> Self {
        Self {
            opacity_mask_clip_value: self
                .opacity_mask_clip_value
                .or(ancestor.opacity_mask_clip_value),
            blend_mode: self.blend_mode.or(ancestor.blend_mode),
            shading_model: self.shading_model.or(ancestor.shading_model),
            two_sided: self.two_sided.or(ancestor.two_sided),
            dithered_lod_transition: self
                .dithered_lod_transition
                .or(ancestor.dithered_lod_transition),
        }
    }
}

#[derive(Debug)]
pub struct MaterialInstance {
    name: String,
    asset_id: Uuid,
    state_id: Uuid,
    kind: InstanceKind,
    parent: Option<MaterialHandle>,
    pub(crate) dynamic_overrides: ParameterOverrideTable,
    pub(crate) static_overrides: StaticParameterSet,
    base_overrides: BasePropertyOverrides,
    subsurface_profile: Option<ProfileHandle>,
    has_static_permutation: bool,
    permutation_key: u64,
    pub(crate) permutations: PermutationMatrix,
}

impl MaterialInstance {
    #[must_use]
    pub fn new(name: impl Into<String>, kind: InstanceKind) -> Self {
        Self {
            name: name.into(),
            asset_id: Uuid::new_v4(),
            state_id: Uuid::new_v4(),
            kind,
            parent: None,
            dynamic_overrides: ParameterOverrideTable::new(),
            static_overrides: StaticParameterSet::new(),
            base_overrides: BasePropertyOverrides::default(),
            subsurface_profile: None,
            has_static_permutation: false,
            permutation_key: 0,
            permutations: PermutationMatrix::new(),
        }
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    #[must_use]
    pub fn asset_id(&self) -> Uuid {
        self.asset_id
    }

    /// Identity token of this instance's compile-affecting overrides.
    #[inline]
    #[must_use]
    pub fn state_id(&self) -> Uuid {
        self.state_id
    }

    #[inline]
    #[must_use]
    pub fn kind(&self) -> InstanceKind {
        self.kind
    }

    #[inline]
    #[must_use]
    pub fn parent(&self) -> Option<MaterialHandle> {
        self.parent
    }

    #[inline]
    #[must_use]
    pub fn dynamic_overrides(&self) -> &ParameterOverrideTable {
        &self.dynamic_overrides
    }

    #[inline]
    #[must_use]
    pub fn static_overrides(&self) -> &StaticParameterSet {
        &self.static_overrides
    }

    #[inline]
    #[must_use]
    pub fn base_overrides(&self) -> &BasePropertyOverrides {
        &self.base_overrides
    }

    #[inline]
    #[must_use]
    pub fn subsurface_profile(&self) -> Option<ProfileHandle> {
        self.subsurface_profile
    }

    /// The instance compiles its own programs instead of sharing its parent's.
    #[inline]
    #[must_use]
    pub fn has_static_permutation(&self) -> bool {
        self.has_static_permutation
    }

    #[inline]
    #[must_use]
    pub fn permutation_key(&self) -> u64 {
        self.permutation_key
    }

    #[inline]
    #[must_use]
    pub fn permutations(&self) -> &PermutationMatrix {
        &self.permutations
    }

    /// Whether the current overrides call for a private permutation.
    ///
    /// Requires a parent: an orphaned instance has nothing to compile against.
    #[must_use]
    pub fn wants_static_permutation(&self) -> bool {
        self.parent.is_some()
            && (!self.static_overrides.is_empty() || !self.base_overrides.is_empty())
    }

    pub(crate) fn set_parent_handle(&mut self, parent: Option<MaterialHandle>) {
        self.parent = parent;
    }

    pub(crate) fn set_base_overrides(&mut self, overrides: BasePropertyOverrides) {
        self.base_overrides = overrides;
    }

    pub(crate) fn set_subsurface_profile(&mut self, profile: Option<ProfileHandle>) {
        self.subsurface_profile = profile;
    }

    pub(crate) fn set_asset_id(&mut self, asset_id: Uuid) {
        self.asset_id = asset_id;
    }

    pub(crate) fn set_state_id(&mut self, state_id: Uuid) {
        self.state_id = state_id;
    }

    /// Records a new permutation state, regenerating the identity token.
    pub(crate) fn set_static_permutation(&mut self, enabled: bool, permutation_key: u64) {
        self.has_static_permutation = enabled;
        self.permutation_key = permutation_key;
        self.state_id = Uuid::new_v4();
    }
}
