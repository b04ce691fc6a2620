//! Material Registry
//!
//! Owns every definition and instance of the mutation context. Materials are
//! addressed by generational [`MaterialHandle`]s; a stale handle simply fails
//! to resolve.

use rustc_hash::FxHashMap;
use slotmap::{SlotMap, new_key_type};
use uuid::Uuid;

use crate::atlas::ProfileHandle;
use crate::compile::PermutationMatrix;
use crate::errors::{MaterialError, Result};
use crate::material::definition::MaterialDefinition;
use crate::material::instance::MaterialInstance;

new_key_type! {
    /// Generational key of a material definition or instance.
    pub struct MaterialHandle;
}

/// A definition or an instance.
#[derive(Debug)]
pub enum MaterialAsset {
    Definition(MaterialDefinition),
    Instance(MaterialInstance),
}

impl MaterialAsset {
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Definition(d) => d.name(),
            Self::Instance(i) => i.name(),
        }
    }

    #[must_use]
    pub fn asset_id(&self) -> Uuid {
        match self {
            Self::Definition(d) => d.asset_id(),
            Self::Instance(i) => i.asset_id(),
        }
    }

    #[must_use]
    pub fn state_id(&self) -> Uuid {
        match self {
            Self::Definition(d) => d.state_id(),
            Self::Instance(i) => i.state_id(),
        }
    }

    /// Definitions have no parent.
    #[must_use]
    pub fn parent(&self) -> Option<MaterialHandle> {
        match self {
            Self::Definition(_) => None,
            Self::Instance(i) => i.parent(),
        }
    }

    #[must_use]
    pub fn subsurface_profile(&self) -> Option<ProfileHandle> {
        match self {
            Self::Definition(d) => d.subsurface_profile(),
            Self::Instance(i) => i.subsurface_profile(),
        }
    }

    /// True if this node compiles its own programs.
    #[must_use]
    pub fn owns_permutations(&self) -> bool {
        match self {
            Self::Definition(_) => true,
            Self::Instance(i) => i.has_static_permutation(),
        }
    }

    #[must_use]
    pub fn permutations(&self) -> &PermutationMatrix {
        match self {
            Self::Definition(d) => &d.permutations,
            Self::Instance(i) => &i.permutations,
        }
    }

    pub fn permutations_mut(&mut self) -> &mut PermutationMatrix {
        match self {
            Self::Definition(d) => &mut d.permutations,
            Self::Instance(i) => &mut i.permutations,
        }
    }

    #[must_use]
    pub fn as_definition(&self) -> Option<&MaterialDefinition> {
        match self {
            Self::Definition(d) => Some(d),
            Self::Instance(_) => None,
        }
    }

    pub fn as_definition_mut(&mut self) -> Option<&mut MaterialDefinition> {
        match self {
            Self::Definition(d) => Some(d),
            Self::Instance(_) => None,
        }
    }

    #[must_use]
    pub fn as_instance(&self) -> Option<&MaterialInstance> {
        match self {
            Self::Instance(i) => Some(i),
            Self::Definition(_) => None,
        }
    }

    pub fn as_instance_mut(&mut self) -> Option<&mut MaterialInstance> {
        match self {
            Self::Instance(i) => Some(i),
            Self::Definition(_) => None,
        }
    }
}

impl From<MaterialDefinition> for MaterialAsset {
    fn from(d: MaterialDefinition) -> Self {
        Self::Definition(d)
    }
}

impl From<MaterialInstance> for MaterialAsset {
    fn from(i: MaterialInstance) -> Self {
        Self::Instance(i)
    }
}

#[derive(Debug, Default)]
pub struct MaterialRegistry {
    materials: SlotMap<MaterialHandle, MaterialAsset>,
    lookup: FxHashMap<Uuid, MaterialHandle>,
}

impl MaterialRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a material. A material whose asset id is already registered
    /// returns the existing handle.
    pub fn insert(&mut self, asset: impl Into<MaterialAsset>) -> MaterialHandle {
        let asset = asset.into();
        let asset_id = asset.asset_id();
        if let Some(&handle) = self.lookup.get(&asset_id) {
            return handle;
        }
        let handle = self.materials.insert(asset);
        self.lookup.insert(asset_id, handle);
        handle
    }

    pub fn remove(&mut self, handle: MaterialHandle) -> Option<MaterialAsset> {
        let asset = self.materials.remove(handle)?;
        self.lookup.remove(&asset.asset_id());
        Some(asset)
    }

    #[inline]
    #[must_use]
    pub fn contains(&self, handle: MaterialHandle) -> bool {
        self.materials.contains_key(handle)
    }

    #[inline]
    #[must_use]
    pub fn get(&self, handle: MaterialHandle) -> Option<&MaterialAsset> {
        self.materials.get(handle)
    }

    #[inline]
    pub fn get_mut(&mut self, handle: MaterialHandle) -> Option<&mut MaterialAsset> {
        self.materials.get_mut(handle)
    }

    /// Like [`get`](Self::get) but reports a stale handle as an error.
    pub fn try_get(&self, handle: MaterialHandle) -> Result<&MaterialAsset> {
        self.materials
            .get(handle)
            .ok_or_else(|| MaterialError::InvalidHandle(format!("{handle:?}")))
    }

    pub fn try_get_mut(&mut self, handle: MaterialHandle) -> Result<&mut MaterialAsset> {
        self.materials
            .get_mut(handle)
            .ok_or_else(|| MaterialError::InvalidHandle(format!("{handle:?}")))
    }

    #[must_use]
    pub fn handle_by_asset_id(&self, asset_id: &Uuid) -> Option<MaterialHandle> {
        self.lookup.get(asset_id).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (MaterialHandle, &MaterialAsset)> {
        self.materials.iter()
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.materials.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }

    /// Materials whose parent is `handle`.
    pub fn children_of(&self, handle: MaterialHandle) -> impl Iterator<Item = MaterialHandle> + '_ {
        self.materials
            .iter()
            .filter(move |(_, asset)| asset.parent() == Some(handle))
            .map(|(h, _)| h)
    }

    /// Sets a parent link without any validation.
    ///
    /// Used when restoring graphs whose links were validated elsewhere.
    /// Resolution still detects cycles introduced this way.
    pub fn link_parent_unchecked(
        &mut self,
        child: MaterialHandle,
        parent: Option<MaterialHandle>,
    ) -> Result<()> {
        let instance = self
            .try_get_mut(child)?
            .as_instance_mut()
            .ok_or_else(|| MaterialError::InvalidHandle(format!("{child:?} is not an instance")))?;
        instance.set_parent_handle(parent);
        Ok(())
    }
}
