//! Instance Resolver
//!
//! Read-only queries over the inheritance graph. Every walk carries an
//! explicit visited set, so a cycle (possible only through unchecked links)
//! surfaces as [`MaterialError::CyclicInheritance`] instead of unbounded
//! recursion.
//!
//! Resolution order for a name on an instance: own dynamic overrides, own
//! static overrides, then the parent. On a definition: the declared default.

use smallvec::SmallVec;
use uuid::Uuid;

use crate::atlas::ProfileHandle;
use crate::errors::{MaterialError, Result};
use crate::interner::{self, Symbol};
use crate::material::definition::{MaterialDefinition, MaterialProperties};
use crate::material::instance::BasePropertyOverrides;
use crate::material::registry::{MaterialAsset, MaterialHandle, MaterialRegistry};
use crate::params::{ParameterOverrideTable, ParameterValue, StaticParameterSet, TextureRef};

/// Handles visited along one walk, child first.
pub type Chain = SmallVec<[MaterialHandle; 8]>;

const PARENT_WALK: &str = "<parent>";

/// A resolved static parameter and the graph node it belongs to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StaticResolution {
    pub value: ParameterValue,
    pub expression_id: Uuid,
}

#[derive(Clone, Copy)]
pub struct InstanceResolver<'a> {
    registry: &'a MaterialRegistry,
    max_depth: usize,
}

impl<'a> InstanceResolver<'a> {
    #[must_use]
    pub fn new(registry: &'a MaterialRegistry, max_depth: usize) -> Self {
        Self {
            registry,
            max_depth,
        }
    }

    fn visit(
        &self,
        handle: MaterialHandle,
        visited: &mut Chain,
        parameter: &str,
    ) -> Result<&'a MaterialAsset> {
        let asset = self.registry.try_get(handle)?;
        if visited.contains(&handle) || visited.len() >= self.max_depth {
            log::error!(
                "Cyclic inheritance at '{}' while resolving '{parameter}'",
                asset.name()
            );
            return Err(MaterialError::CyclicInheritance {
                material: asset.name().to_string(),
                parameter: parameter.to_string(),
            });
        }
        visited.push(handle);
        Ok(asset)
    }

    // ========================================================================
    // Parameter resolution
    // ========================================================================

    /// Effective value of `name` on `handle`, or `None` if no node in the
    /// chain declares or overrides it.
    pub fn resolve(&self, handle: MaterialHandle, name: Symbol) -> Result<Option<ParameterValue>> {
        let mut visited = Chain::new();
        Ok(self
            .resolve_with(handle, name, &mut visited)?
            .map(|r| r.value))
    }

    /// Like [`resolve`](Self::resolve) but only answers static kinds, and
    /// reports the owning expression id alongside the value.
    pub fn resolve_static(
        &self,
        handle: MaterialHandle,
        name: Symbol,
    ) -> Result<Option<StaticResolution>> {
        let mut visited = Chain::new();
        Ok(self
            .resolve_with(handle, name, &mut visited)?
            .filter(|r| r.value.is_static()))
    }

    fn resolve_with(
        &self,
        handle: MaterialHandle,
        name: Symbol,
        visited: &mut Chain,
    ) -> Result<Option<StaticResolution>> {
        match self.visit(handle, visited, interner::resolve(name))? {
            MaterialAsset::Definition(def) => Ok(def.declaration(name).map(|d| StaticResolution {
                value: d.default,
                expression_id: d.expression_id,
            })),
            MaterialAsset::Instance(inst) => {
                if let Some(value) = inst.dynamic_overrides().overridden(name) {
                    return Ok(Some(StaticResolution {
                        value: *value,
                        expression_id: Uuid::nil(),
                    }));
                }
                if let Some(entry) = inst.static_overrides().get(name) {
                    return Ok(Some(StaticResolution {
                        value: entry.value,
                        expression_id: entry.expression_id,
                    }));
                }
                match inst.parent() {
                    Some(parent) => self.resolve_with(parent, name, visited),
                    None => Ok(None),
                }
            }
        }
    }

    // ========================================================================
    // Graph queries
    // ========================================================================

    /// `handle` followed by each ancestor, root last.
    pub fn ancestry(&self, handle: MaterialHandle) -> Result<Chain> {
        let mut visited = Chain::new();
        let mut current = Some(handle);
        while let Some(h) = current {
            current = self.visit(h, &mut visited, PARENT_WALK)?.parent();
        }
        Ok(visited)
    }

    /// Base definition at the end of the chain. `None` for an orphaned instance.
    pub fn root_definition(
        &self,
        handle: MaterialHandle,
    ) -> Result<Option<(MaterialHandle, &'a MaterialDefinition)>> {
        let chain = self.ancestry(handle)?;
        let Some(&root) = chain.last() else {
            return Ok(None);
        };
        Ok(self
            .registry
            .try_get(root)?
            .as_definition()
            .map(|def| (root, def)))
    }

    /// True if `ancestor` appears strictly above `handle`.
    pub fn is_child_of(&self, handle: MaterialHandle, ancestor: MaterialHandle) -> Result<bool> {
        let chain = self.ancestry(handle)?;
        Ok(chain.iter().skip(1).any(|&h| h == ancestor))
    }

    /// Every material whose chain passes through `handle`, nearest first.
    ///
    /// Materials whose own chain is broken are skipped.
    #[must_use]
    pub fn dependents(&self, handle: MaterialHandle) -> Vec<MaterialHandle> {
        let mut found: Vec<(usize, MaterialHandle)> = self
            .registry
            .iter()
            .filter(|&(h, _)| h != handle)
            .filter_map(|(h, _)| {
                let chain = self.ancestry(h).ok()?;
                let depth = chain.iter().position(|&a| a == handle)?;
                Some((depth, h))
            })
            .collect();
        found.sort_by_key(|&(depth, _)| depth);
        found.into_iter().map(|(_, h)| h).collect()
    }

    /// Nearest node in the chain that compiles its own programs.
    pub fn permutation_owner(&self, handle: MaterialHandle) -> Result<Option<MaterialHandle>> {
        let chain = self.ancestry(handle)?;
        Ok(chain.into_iter().find(|&h| {
            self.registry
                .get(h)
                .is_some_and(MaterialAsset::owns_permutations)
        }))
    }

    // ========================================================================
    // Compile inputs
    // ========================================================================

    /// Static parameters overridden anywhere in the chain. Nearer overrides win.
    pub fn effective_static_parameters(&self, handle: MaterialHandle) -> Result<StaticParameterSet> {
        let chain = self.ancestry(handle)?;
        let mut set = StaticParameterSet::new();
        for &h in chain.iter().rev() {
            if let Some(inst) = self.registry.try_get(h)?.as_instance() {
                for entry in inst.static_overrides().iter() {
                    set.set(entry.name, entry.value, entry.expression_id);
                }
            }
        }
        Ok(set)
    }

    /// Base-property overrides merged along the chain.
    pub fn effective_base_overrides(&self, handle: MaterialHandle) -> Result<BasePropertyOverrides> {
        let chain = self.ancestry(handle)?;
        let mut merged = BasePropertyOverrides::default();
        for &h in &chain {
            if let Some(inst) = self.registry.try_get(h)?.as_instance() {
                merged = merged.or(inst.base_overrides());
            }
        }
        Ok(merged)
    }

    /// Root properties with every override applied.
    pub fn effective_properties(&self, handle: MaterialHandle) -> Result<Option<MaterialProperties>> {
        let Some((_, root)) = self.root_definition(handle)? else {
            return Ok(None);
        };
        let overrides = self.effective_base_overrides(handle)?;
        Ok(Some(root.properties().with_overrides(&overrides)))
    }

    /// Nearest subsurface profile assignment in the chain.
    pub fn effective_subsurface_profile(
        &self,
        handle: MaterialHandle,
    ) -> Result<Option<ProfileHandle>> {
        let chain = self.ancestry(handle)?;
        for h in chain {
            if let Some(profile) = self.registry.try_get(h)?.subsurface_profile() {
                return Ok(Some(profile));
            }
        }
        Ok(None)
    }

    /// Textures bound through texture and font parameters.
    pub fn resolved_textures(&self, handle: MaterialHandle) -> Result<Vec<TextureRef>> {
        let Some((_, root)) = self.root_definition(handle)? else {
            return Ok(Vec::new());
        };
        let mut textures = Vec::new();
        for decl in root.declarations() {
            if let Some(texture) = self
                .resolve(handle, decl.name)?
                .and_then(|v| v.as_texture())
                && !textures.contains(&texture)
            {
                textures.push(texture);
            }
        }
        Ok(textures)
    }

    /// Snapshot of the effective runtime parameters of `source`, restricted
    /// to the runtime parameters `target_root` declares. Static kinds are
    /// never copied.
    pub fn snapshot_parameters(
        &self,
        source: MaterialHandle,
        target_root: &MaterialDefinition,
    ) -> Result<ParameterOverrideTable> {
        let mut table = ParameterOverrideTable::new();
        for decl in target_root
            .declarations()
            .iter()
            .filter(|d| d.kind().is_dynamic())
        {
            if let Some(value) = self.resolve(source, decl.name)?
                && value.kind() == decl.kind()
            {
                table.set_symbol(decl.name, value);
            }
        }
        Ok(table)
    }
}
