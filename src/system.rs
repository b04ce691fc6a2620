//! Material System
//!
//! The mutation-context facade. [`MaterialSystem`] owns the registry, the
//! default material context, the subsurface profile atlas and the publish
//! queue, and keeps the three consistent with each other:
//!
//! - static edits re-derive permutations for the edited material and every
//!   material inheriting from it;
//! - runtime edits only publish new values and invalidate the expression
//!   caches downstream, never compiled programs;
//! - every public mutation ends with a single flushed batch, so the render
//!   context sees it whole.
//!
//! Reparenting is split in two: the edited material is fixed up at once and
//! its dependents are revisited by [`MaterialSystem::run_deferred_updates`].

use std::sync::Arc;

use rustc_hash::FxHashMap;
use slotmap::SlotMap;
use uuid::Uuid;

use crate::atlas::{ProfileAtlas, ProfileHandle, SlotIndex, SubsurfaceProfileSettings};
use crate::compile::{
    CacheReport, CompiledResource, PermutationContext, PermutationMatrix, ShaderCompiler,
    TextureResolver,
};
use crate::errors::{MaterialError, Result};
use crate::interner::{self, Symbol};
use crate::material::{
    BasePropertyOverrides, DefaultMaterials, DefinitionGuard, InstanceKind, InstanceResolver,
    MaterialAsset, MaterialDefinition, MaterialDomain, MaterialHandle, MaterialInstance,
    MaterialProperties, MaterialRegistry, PackagedPlatform, PackagedProgram, SerializedInstance,
};
use crate::params::{
    ExpressionList, ParameterKind, ParameterOverrideTable, ParameterValue, StaticParameterSet,
    TextureRef,
};
use crate::render::publish;
use crate::render::{ProxyInit, ProxyValues, PublishQueue, RenderCommand, RenderFence, RenderScene};
use crate::settings::MaterialCacheSettings;
use crate::tiers::{ShaderPlatform, TierPair};

/// Owned compile inputs of one material, borrowed into a [`PermutationContext`].
struct CompileInputs {
    name: String,
    shader_graph: Uuid,
    statics: StaticParameterSet,
    properties: MaterialProperties,
    textures: Vec<TextureRef>,
    quality_specific: bool,
    has_static_permutation: bool,
    default_for: Option<MaterialDomain>,
}

impl CompileInputs {
    fn context(&self) -> PermutationContext<'_> {
        PermutationContext {
            material: &self.name,
            shader_graph: self.shader_graph,
            static_parameters: &self.statics,
            properties: &self.properties,
            referenced_textures: &self.textures,
            quality_specific: self.quality_specific,
            has_static_permutation: self.has_static_permutation,
            default_for: self.default_for,
        }
    }
}

pub struct MaterialSystem {
    settings: MaterialCacheSettings,
    registry: MaterialRegistry,
    defaults: DefaultMaterials,
    compiler: Arc<dyn ShaderCompiler>,
    textures: Arc<dyn TextureResolver>,
    queue: PublishQueue,

    atlas: ProfileAtlas,
    profiles: SlotMap<ProfileHandle, SubsurfaceProfileSettings>,

    /// Reparented materials whose dependents still need a consistency pass.
    deferred_updates: Vec<MaterialHandle>,
    /// Fence a former parent must wait on before it may be destroyed.
    parent_fences: FxHashMap<MaterialHandle, RenderFence>,
    pending_destroy: Vec<MaterialHandle>,
}

impl MaterialSystem {
    /// Creates the system and the render scene it publishes to.
    ///
    /// The scene is meant to move to the render context.
    #[must_use]
    pub fn new(
        settings: MaterialCacheSettings,
        compiler: Arc<dyn ShaderCompiler>,
        textures: Arc<dyn TextureResolver>,
    ) -> (Self, RenderScene) {
        interner::preload_common_parameters();
        let (queue, receiver) = publish::channel();
        let scene = RenderScene::new(receiver, settings.max_inheritance_depth);
        let atlas = ProfileAtlas::new(settings.atlas_initial_rows);

        log::info!(
            "Material system ready: quality {:?}, capability tiers {:?}",
            settings.active_quality,
            settings.capability_tiers
        );

        let system = Self {
            settings,
            registry: MaterialRegistry::new(),
            defaults: DefaultMaterials::new(),
            compiler,
            textures,
            queue,
            atlas,
            profiles: SlotMap::with_key(),
            deferred_updates: Vec::new(),
            parent_fences: FxHashMap::default(),
            pending_destroy: Vec::new(),
        };
        (system, scene)
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    #[inline]
    #[must_use]
    pub fn settings(&self) -> &MaterialCacheSettings {
        &self.settings
    }

    #[inline]
    #[must_use]
    pub fn registry(&self) -> &MaterialRegistry {
        &self.registry
    }

    #[inline]
    #[must_use]
    pub fn defaults(&self) -> &DefaultMaterials {
        &self.defaults
    }

    #[inline]
    #[must_use]
    pub fn profile_atlas(&self) -> &ProfileAtlas {
        &self.atlas
    }

    #[inline]
    #[must_use]
    pub fn resolver(&self) -> InstanceResolver<'_> {
        InstanceResolver::new(&self.registry, self.settings.max_inheritance_depth)
    }

    #[must_use]
    pub fn get(&self, handle: MaterialHandle) -> Option<&MaterialAsset> {
        self.registry.get(handle)
    }

    /// Fence of the last published batch.
    #[must_use]
    pub fn render_fence(&self) -> RenderFence {
        self.queue.fence()
    }

    /// Handles of reparented materials still waiting for
    /// [`run_deferred_updates`](Self::run_deferred_updates).
    #[must_use]
    pub fn deferred_update_count(&self) -> usize {
        self.deferred_updates.len()
    }

    /// Materials whose destruction waits on the render context.
    #[must_use]
    pub fn pending_destroy_count(&self) -> usize {
        self.pending_destroy.len()
    }

    fn name_of(&self, handle: MaterialHandle) -> String {
        self.registry
            .get(handle)
            .map_or_else(|| format!("{handle:?}"), |a| a.name().to_string())
    }

    // ========================================================================
    // Creation
    // ========================================================================

    /// Registers a base definition and compiles it for the running hardware.
    ///
    /// A compile failure is not an error here: the material draws with its
    /// domain default and reports errors through
    /// [`get_compile_errors`](Self::get_compile_errors).
    pub fn create_definition(&mut self, definition: MaterialDefinition) -> Result<MaterialHandle> {
        let handle = self.registry.insert(definition);
        self.recache(handle, false)?;
        let init = self.proxy_init(handle)?;
        self.queue.push(RenderCommand::CreateProxy(Box::new(init)));
        self.flush();
        log::debug!("Registered definition '{}'", self.name_of(handle));
        Ok(handle)
    }

    /// Creates an instance, optionally inheriting from `parent`.
    pub fn create_instance(
        &mut self,
        name: &str,
        kind: InstanceKind,
        parent: Option<MaterialHandle>,
    ) -> Result<MaterialHandle> {
        if let Some(parent) = parent {
            self.validate_parent(None, parent)?;
        }
        let mut instance = MaterialInstance::new(name, kind);
        instance.set_parent_handle(parent);
        let handle = self.registry.insert(instance);

        let init = self.proxy_init(handle)?;
        self.queue.push(RenderCommand::CreateProxy(Box::new(init)));
        self.flush();
        log::debug!("Created {kind:?} instance '{name}'");
        Ok(handle)
    }

    // ========================================================================
    // Default material context
    // ========================================================================

    /// Registers the per-domain fallback materials and compiles them.
    ///
    /// Unlike ordinary materials a default that fails to compile is fatal:
    /// the context is torn down again and the error returned.
    pub fn initialize_defaults(
        &mut self,
        defaults: impl IntoIterator<Item = (MaterialDomain, MaterialHandle)>,
    ) -> Result<()> {
        let defaults: Vec<_> = defaults.into_iter().collect();
        for &(_, handle) in &defaults {
            if self.registry.try_get(handle)?.as_definition().is_none() {
                return Err(MaterialError::InvalidHandle(format!(
                    "default material '{}' is not a definition",
                    self.name_of(handle)
                )));
            }
        }
        self.defaults.initialize(defaults.iter().copied())?;

        for &(domain, handle) in &defaults {
            if let Err(err) = self.recache(handle, true) {
                self.defaults.teardown();
                log::error!("Could not initialize default {domain:?} material: {err}");
                return Err(err);
            }
            self.publish_permutations(handle)?;
        }

        let table = self.defaults.table()?;
        self.queue.push(RenderCommand::SetDefaultMaterials { table });
        self.flush();
        log::info!("Initialized {} default material(s)", defaults.len());
        Ok(())
    }

    /// Clears the default material context. Returns the handles it held.
    pub fn teardown_defaults(&mut self) -> Vec<MaterialHandle> {
        let handles = self.defaults.teardown();
        self.queue.push(RenderCommand::SetDefaultMaterials {
            table: Default::default(),
        });
        self.flush();
        handles
    }

    // ========================================================================
    // Inheritance
    // ========================================================================

    fn validate_parent(&self, child: Option<MaterialHandle>, parent: MaterialHandle) -> Result<()> {
        let asset = self.registry.try_get(parent)?;
        if self.pending_destroy.contains(&parent) {
            return Err(MaterialError::InvalidHandle(format!(
                "'{}' is being destroyed",
                asset.name()
            )));
        }
        if asset
            .as_instance()
            .is_some_and(|i| i.kind() == InstanceKind::Dynamic)
        {
            return Err(MaterialError::InvalidParentType {
                parent: asset.name().to_string(),
                reason: "dynamic instances cannot be inherited from",
            });
        }
        if let Some(child) = child
            && (parent == child || self.resolver().is_child_of(parent, child)?)
        {
            log::warn!(
                "Rejected parent '{}' for '{}': would create a cycle",
                asset.name(),
                self.name_of(child)
            );
            return Err(MaterialError::CyclicInheritance {
                material: self.name_of(child),
                parameter: "<parent>".to_string(),
            });
        }
        Ok(())
    }

    /// Reparents an instance. On error the previous parent is kept.
    ///
    /// Materials inheriting from `handle` are updated later, by
    /// [`run_deferred_updates`](Self::run_deferred_updates).
    pub fn set_parent(
        &mut self,
        handle: MaterialHandle,
        parent: Option<MaterialHandle>,
    ) -> Result<()> {
        let old = self.instance(handle)?.parent();
        if let Some(parent) = parent {
            self.validate_parent(Some(handle), parent)?;
        }
        if old == parent {
            return Ok(());
        }

        self.instance_mut(handle)?.set_parent_handle(parent);
        self.update_static_permutation(handle)?;
        self.push_parent(handle)?;
        let slot = self.effective_slot(handle)?;
        self.queue.push(RenderCommand::SetSubsurfaceSlot {
            material: handle,
            slot,
        });
        self.push_invalidations(handle);

        if !self.deferred_updates.contains(&handle) {
            self.deferred_updates.push(handle);
        }
        let fence = self.flush();
        if let (Some(old), Some(fence)) = (old, fence) {
            self.parent_fences.insert(old, fence);
        }
        log::debug!(
            "Reparented '{}' to {}",
            self.name_of(handle),
            parent.map_or_else(|| "nothing".to_string(), |p| self.name_of(p))
        );
        Ok(())
    }

    /// Brings the dependents of every reparented material up to date.
    /// Returns the number of dependents touched.
    pub fn run_deferred_updates(&mut self) -> Result<usize> {
        let roots = std::mem::take(&mut self.deferred_updates);
        let mut touched = 0;
        for root in roots {
            if !self.registry.contains(root) {
                continue;
            }
            let dependents = self.resolver().dependents(root);
            for dependent in dependents {
                self.update_static_permutation(dependent)?;
                self.push_parent(dependent)?;
                let slot = self.effective_slot(dependent)?;
                self.queue.push(RenderCommand::SetSubsurfaceSlot {
                    material: dependent,
                    slot,
                });
                touched += 1;
            }
        }
        self.flush();
        if touched > 0 {
            log::debug!("Deferred update pass touched {touched} material(s)");
        }
        Ok(touched)
    }

    // ========================================================================
    // Parameters
    // ========================================================================

    /// Writes a parameter on a material.
    ///
    /// On a definition this changes the declared default. On an instance
    /// runtime kinds land in the override table and static kinds in the
    /// static set, re-deriving permutations for the instance and everything
    /// below it.
    pub fn set_parameter_value(
        &mut self,
        handle: MaterialHandle,
        name: &str,
        value: ParameterValue,
    ) -> Result<()> {
        let sym = interner::intern(name);
        let declaration = self
            .resolver()
            .root_definition(handle)?
            .and_then(|(_, root)| root.declaration(sym).copied());
        if let Some(decl) = declaration
            && decl.kind() != value.kind()
        {
            return Err(MaterialError::ParameterKindMismatch {
                parameter: name.to_string(),
                expected: decl.kind(),
                found: value.kind(),
            });
        }

        if self.registry.try_get(handle)?.as_definition().is_some() {
            return self.edit_definition(handle, |def| def.declare_parameter(name, value));
        }

        let instance = self.instance_mut(handle)?;
        if value.is_static() {
            if instance.kind() == InstanceKind::Dynamic {
                return Err(MaterialError::StaticParameterOnDynamicInstance(
                    name.to_string(),
                ));
            }
            let Some(decl) = declaration else {
                return Err(MaterialError::UnknownStaticParameter(name.to_string()));
            };
            let previous = instance.static_overrides.get(sym).copied();
            let mark = self.queue.pending_len();
            instance_in(&mut self.registry, handle)?
                .static_overrides
                .set(sym, value, decl.expression_id);
            if let Err(err) = self
                .update_static_permutation(handle)
                .and_then(|_| self.refresh_dependents(handle))
            {
                self.queue.discard_since(mark);
                let instance = instance_in(&mut self.registry, handle)?;
                match previous {
                    Some(entry) => {
                        instance
                            .static_overrides
                            .set(sym, entry.value, entry.expression_id);
                    }
                    None => {
                        instance.static_overrides.remove(sym);
                    }
                }
                return Err(err);
            }
        } else {
            instance.dynamic_overrides.set_symbol(sym, value);
            self.push_value(handle, sym, value);
        }

        self.push_invalidations(handle);
        self.flush();
        log::trace!("Set '{name}' on '{}'", self.name_of(handle));
        Ok(())
    }

    /// Removes a local override so the value is inherited again. Returns
    /// false if nothing was overridden.
    pub fn clear_parameter_value(&mut self, handle: MaterialHandle, name: &str) -> Result<bool> {
        let Some(sym) = interner::get(name) else {
            self.instance(handle)?;
            return Ok(false);
        };
        let instance = self.instance_mut(handle)?;

        if instance.dynamic_overrides.remove(sym).is_some() {
            self.queue.push(RenderCommand::RemoveParameter {
                material: handle,
                name: sym,
            });
        } else if instance.static_overrides.remove(sym) {
            self.update_static_permutation(handle)?;
            self.refresh_dependents(handle)?;
        } else {
            return Ok(false);
        }

        self.push_invalidations(handle);
        self.flush();
        Ok(true)
    }

    /// Drops the runtime overrides of an instance. Texture and font
    /// overrides survive unless `include_textures` is set. Static overrides
    /// always stay.
    pub fn clear_parameter_values(
        &mut self,
        handle: MaterialHandle,
        include_textures: bool,
    ) -> Result<()> {
        let instance = self.instance_mut(handle)?;
        if include_textures {
            instance.dynamic_overrides.clear();
        } else {
            instance.dynamic_overrides.retain(|e| {
                matches!(
                    e.value,
                    ParameterValue::Texture(_) | ParameterValue::Font(_)
                )
            });
        }

        let kept: Vec<_> = instance
            .dynamic_overrides
            .iter()
            .map(|e| (e.name, e.value))
            .collect();
        self.queue
            .push(RenderCommand::ClearParameters { material: handle });
        for (name, value) in kept {
            self.push_value(handle, name, value);
        }
        self.push_invalidations(handle);
        self.flush();
        Ok(())
    }

    /// Replaces the runtime overrides of `target` with the effective runtime
    /// values of `source`, restricted to what `target`'s base declares.
    pub fn copy_parameters_from(
        &mut self,
        target: MaterialHandle,
        source: MaterialHandle,
    ) -> Result<()> {
        self.instance(target)?;
        self.registry.try_get(source)?;
        let table = {
            let resolver = self.resolver();
            match resolver.root_definition(target)? {
                Some((_, root)) => resolver.snapshot_parameters(source, root)?,
                None => ParameterOverrideTable::new(),
            }
        };

        let entries: Vec<_> = table.iter().map(|e| (e.name, e.value)).collect();
        self.instance_mut(target)?.dynamic_overrides = table;
        self.queue
            .push(RenderCommand::ClearParameters { material: target });
        for (name, value) in entries {
            self.push_value(target, name, value);
        }
        self.push_invalidations(target);
        self.flush();
        log::debug!(
            "Copied parameters from '{}' to '{}'",
            self.name_of(source),
            self.name_of(target)
        );
        Ok(())
    }

    /// Sets the base-property overrides of a constant instance.
    pub fn set_base_property_overrides(
        &mut self,
        handle: MaterialHandle,
        overrides: BasePropertyOverrides,
    ) -> Result<()> {
        let instance = self.instance_mut(handle)?;
        if instance.kind() == InstanceKind::Dynamic && !overrides.is_empty() {
            return Err(MaterialError::StaticParameterOnDynamicInstance(
                "<base properties>".to_string(),
            ));
        }
        instance.set_base_overrides(overrides);
        self.update_static_permutation(handle)?;
        self.refresh_dependents(handle)?;
        self.flush();
        Ok(())
    }

    /// Edits a definition in place.
    ///
    /// Edits that change the compile signature recompile the definition and
    /// re-derive every dependent permutation. Runtime defaults and uniform
    /// expressions are republished either way.
    pub fn edit_definition(
        &mut self,
        handle: MaterialHandle,
        edit: impl FnOnce(&mut DefinitionGuard<'_>),
    ) -> Result<()> {
        let definition = self
            .registry
            .try_get_mut(handle)?
            .as_definition_mut()
            .ok_or_else(|| MaterialError::InvalidHandle(format!("{handle:?} is not a definition")))?;
        let before = definition.state_id();
        {
            let mut guard = definition.edit();
            edit(&mut guard);
        }
        let recompile = definition.state_id() != before;

        if recompile {
            if let Some(asset) = self.registry.get_mut(handle) {
                asset.permutations_mut().invalidate(self.compiler.as_ref());
            }
            self.recache(handle, self.defaults.domain_of(handle).is_some())?;
            self.publish_permutations(handle)?;
            self.refresh_dependents(handle)?;
        }

        let values = self.proxy_values(handle)?;
        self.queue
            .push(RenderCommand::ClearParameters { material: handle });
        self.push_local_values(handle, values);
        self.push_parent(handle)?;
        let dependents = self.resolver().dependents(handle);
        for dependent in dependents {
            self.push_parent(dependent)?;
        }
        self.push_invalidations(handle);
        self.flush();
        log::debug!(
            "Edited definition '{}'{}",
            self.name_of(handle),
            if recompile { " (recompiled)" } else { "" }
        );
        Ok(())
    }

    /// Effective value of a parameter. `None` if nothing in the chain declares it.
    pub fn get_effective_value(
        &self,
        handle: MaterialHandle,
        name: &str,
    ) -> Result<Option<ParameterValue>> {
        let Some(sym) = interner::get(name) else {
            self.registry.try_get(handle)?;
            return Ok(None);
        };
        self.resolver().resolve(handle, sym)
    }

    /// Effective value, or the zero value of `kind` for undeclared names.
    pub fn get_effective_value_or_zeroed(
        &self,
        handle: MaterialHandle,
        name: &str,
        kind: ParameterKind,
    ) -> Result<ParameterValue> {
        Ok(self
            .get_effective_value(handle, name)?
            .filter(|v| v.kind() == kind)
            .unwrap_or(ParameterValue::zeroed(kind)))
    }

    // ========================================================================
    // Compilation
    // ========================================================================

    fn compile_inputs(&self, handle: MaterialHandle) -> Result<Option<CompileInputs>> {
        let resolver = self.resolver();
        let asset = self.registry.try_get(handle)?;
        let Some((_, root)) = resolver.root_definition(handle)? else {
            return Ok(None);
        };

        let mut statics = StaticParameterSet::new();
        for decl in root.declarations().iter().filter(|d| d.kind().is_static()) {
            statics.set(decl.name, decl.default, decl.expression_id);
        }
        for entry in resolver.effective_static_parameters(handle)?.iter() {
            statics.set(entry.name, entry.value, entry.expression_id);
        }
        let properties = resolver
            .effective_properties(handle)?
            .unwrap_or(*root.properties());

        Ok(Some(CompileInputs {
            name: asset.name().to_string(),
            shader_graph: root.shader_graph(),
            statics,
            properties,
            textures: root.referenced_textures().to_vec(),
            quality_specific: root.is_quality_specific(),
            has_static_permutation: asset
                .as_instance()
                .is_some_and(MaterialInstance::has_static_permutation),
            default_for: self.defaults.domain_of(handle),
        }))
    }

    fn recache(&mut self, handle: MaterialHandle, force: bool) -> Result<CacheReport> {
        let Some(inputs) = self.compile_inputs(handle)? else {
            return Ok(CacheReport::default());
        };
        let matrix = self.registry.try_get_mut(handle)?.permutations_mut();
        matrix.cache_for_rendering(
            &inputs.context(),
            &self.settings,
            self.compiler.as_ref(),
            force,
        )
    }

    /// Decides whether an instance needs its own permutation and brings the
    /// permutation up to date. Returns true if the permutation state changed.
    fn update_static_permutation(&mut self, handle: MaterialHandle) -> Result<bool> {
        let Some(instance) = self.registry.try_get(handle)?.as_instance() else {
            return Ok(false);
        };
        let wants =
            instance.kind() == InstanceKind::Constant && instance.wants_static_permutation();
        let had = instance.has_static_permutation();
        let old_key = instance.permutation_key();

        let key = if wants {
            self.compile_inputs(handle)?
                .map_or(0, |inputs| inputs.context().permutation_key())
        } else {
            0
        };

        let changed = wants != had || key != old_key;
        if changed {
            let instance = instance_in(&mut self.registry, handle)?;
            instance.set_static_permutation(wants, key);
            instance.permutations.invalidate(self.compiler.as_ref());
            log::debug!(
                "'{}' {} static permutation {key:#018x}",
                instance.name(),
                if wants { "uses" } else { "dropped its" }
            );
        }
        if wants {
            self.recache(handle, false)?;
        }
        if changed || wants {
            self.publish_permutations(handle)?;
        }
        Ok(changed)
    }

    fn refresh_dependents(&mut self, handle: MaterialHandle) -> Result<()> {
        let dependents = self.resolver().dependents(handle);
        for dependent in dependents {
            self.update_static_permutation(dependent)?;
        }
        Ok(())
    }

    /// Promotes finished asynchronous compiles and publishes the new
    /// programs. Returns the number of materials that changed.
    pub fn poll_compilations(&mut self) -> usize {
        let waiting: Vec<MaterialHandle> = self
            .registry
            .iter()
            .filter(|(_, a)| a.owns_permutations() && !a.permutations().is_compilation_finished())
            .map(|(h, _)| h)
            .collect();

        let mut changed = 0;
        for handle in waiting {
            let Some(asset) = self.registry.get_mut(handle) else {
                continue;
            };
            if asset.permutations_mut().poll(self.compiler.as_ref())
                && self.publish_permutations(handle).is_ok()
            {
                changed += 1;
            }
        }
        self.flush();
        changed
    }

    /// Compile errors of the program `handle` draws with.
    pub fn get_compile_errors(&self, handle: MaterialHandle, tiers: TierPair) -> Result<Vec<String>> {
        let Some(owner) = self.resolver().permutation_owner(handle)? else {
            return Ok(Vec::new());
        };
        Ok(self
            .registry
            .try_get(owner)?
            .permutations()
            .compile_errors(tiers)
            .to_vec())
    }

    /// `Ok` if the program `handle` draws with at `tiers` compiled, or is
    /// still compiling. A failed compile is reported as
    /// [`MaterialError::CompileFailure`] with the compiler output.
    pub fn check_compiled(&self, handle: MaterialHandle, tiers: TierPair) -> Result<()> {
        let Some(owner) = self.resolver().permutation_owner(handle)? else {
            return Ok(());
        };
        let asset = self.registry.try_get(owner)?;
        match asset.permutations().resource(tiers) {
            Some(resource) if resource.is_failed() => Err(MaterialError::CompileFailure {
                material: asset.name().to_string(),
                tiers,
                errors: resource.compile_errors().to_vec(),
            }),
            _ => Ok(()),
        }
    }

    /// True once nothing `handle` draws with is still compiling.
    pub fn is_compilation_finished(&self, handle: MaterialHandle) -> Result<bool> {
        let Some(owner) = self.resolver().permutation_owner(handle)? else {
            return Ok(true);
        };
        Ok(self
            .registry
            .try_get(owner)?
            .permutations()
            .is_compilation_finished())
    }

    /// Textures the material samples at `tiers`: those baked into the
    /// compiled program plus those bound through parameters.
    pub fn used_textures(&self, handle: MaterialHandle, tiers: TierPair) -> Result<Vec<TextureRef>> {
        let resolver = self.resolver();
        let mut textures = match resolver.permutation_owner(handle)? {
            Some(owner) => self
                .registry
                .try_get(owner)?
                .permutations()
                .used_textures(tiers)
                .to_vec(),
            None => Vec::new(),
        };
        for texture in resolver.resolved_textures(handle)? {
            if !textures.contains(&texture) {
                textures.push(texture);
            }
        }
        Ok(textures)
    }

    // ========================================================================
    // Subsurface profiles
    // ========================================================================

    pub fn create_subsurface_profile(
        &mut self,
        settings: SubsurfaceProfileSettings,
    ) -> Result<ProfileHandle> {
        let profile = self.profiles.insert(settings);
        if let Err(err) = self.atlas.add_or_update(profile, settings) {
            self.profiles.remove(profile);
            return Err(err);
        }
        self.flush();
        Ok(profile)
    }

    /// Updates a profile in place. Its atlas slot does not move.
    pub fn update_subsurface_profile(
        &mut self,
        profile: ProfileHandle,
        settings: SubsurfaceProfileSettings,
    ) -> Result<SlotIndex> {
        let stored = self
            .profiles
            .get_mut(profile)
            .ok_or_else(|| MaterialError::InvalidHandle(format!("profile {profile:?}")))?;
        *stored = settings;
        let slot = self.atlas.add_or_update(profile, settings)?;
        self.flush();
        Ok(slot)
    }

    /// Destroys a profile. Materials using it fall back to the default slot.
    pub fn destroy_subsurface_profile(&mut self, profile: ProfileHandle) -> Result<()> {
        if self.profiles.remove(profile).is_none() {
            return Err(MaterialError::InvalidHandle(format!("profile {profile:?}")));
        }
        let released = self.atlas.remove(profile);

        let users: Vec<MaterialHandle> = self
            .registry
            .iter()
            .filter(|(_, a)| a.subsurface_profile() == Some(profile))
            .map(|(h, _)| h)
            .collect();
        for handle in users {
            self.set_profile_field(handle, None);
            self.push_subsurface_slots(handle)?;
        }
        self.flush();
        log::debug!("Destroyed subsurface profile {profile:?} (slot {released:?})");
        Ok(())
    }

    /// Assigns a subsurface profile to a material and everything inheriting it.
    pub fn set_subsurface_profile(
        &mut self,
        handle: MaterialHandle,
        profile: Option<ProfileHandle>,
    ) -> Result<()> {
        if let Some(profile) = profile
            && !self.profiles.contains_key(profile)
        {
            return Err(MaterialError::InvalidHandle(format!("profile {profile:?}")));
        }
        self.registry.try_get(handle)?;
        self.set_profile_field(handle, profile);
        self.push_subsurface_slots(handle)?;
        self.flush();
        Ok(())
    }

    fn set_profile_field(&mut self, handle: MaterialHandle, profile: Option<ProfileHandle>) {
        match self.registry.get_mut(handle) {
            Some(MaterialAsset::Definition(def)) => def.set_subsurface_profile(profile),
            Some(MaterialAsset::Instance(inst)) => inst.set_subsurface_profile(profile),
            None => {}
        }
    }

    fn push_subsurface_slots(&mut self, handle: MaterialHandle) -> Result<()> {
        let mut targets = vec![handle];
        targets.extend(self.resolver().dependents(handle));
        for material in targets {
            let slot = self.effective_slot(material)?;
            self.queue
                .push(RenderCommand::SetSubsurfaceSlot { material, slot });
        }
        Ok(())
    }

    fn effective_slot(&self, handle: MaterialHandle) -> Result<SlotIndex> {
        Ok(self
            .resolver()
            .effective_subsurface_profile(handle)?
            .and_then(|p| self.atlas.find_slot(p))
            .unwrap_or(SlotIndex::DEFAULT))
    }

    // ========================================================================
    // Destruction
    // ========================================================================

    /// Destroys a material.
    ///
    /// A material with children, or one registered as a domain default, is
    /// refused. A former parent whose replacement the render context has not
    /// yet applied is destroyed later by [`collect_garbage`](Self::collect_garbage).
    pub fn destroy(&mut self, handle: MaterialHandle) -> Result<()> {
        let name = self.registry.try_get(handle)?.name().to_string();
        let children = self.registry.children_of(handle).count();
        if children > 0 {
            return Err(MaterialError::MaterialInUse {
                material: name,
                children,
            });
        }
        if self.defaults.domain_of(handle).is_some() {
            return Err(MaterialError::DefaultMaterialInUse(name));
        }
        if self.pending_destroy.contains(&handle) {
            return Ok(());
        }

        if let Some(asset) = self.registry.get_mut(handle) {
            asset.permutations_mut().cancel_pending(self.compiler.as_ref());
        }

        if self
            .parent_fences
            .get(&handle)
            .is_some_and(|f| !f.is_complete())
        {
            log::debug!("Deferring destruction of '{name}' until the render context catches up");
            self.pending_destroy.push(handle);
            return Ok(());
        }
        self.finish_destroy(handle);
        Ok(())
    }

    /// Completes deferred destructions whose fences have passed. Returns the
    /// number of materials destroyed.
    pub fn collect_garbage(&mut self) -> usize {
        self.parent_fences
            .retain(|h, fence| !fence.is_complete() || self.pending_destroy.contains(h));

        let ready: Vec<MaterialHandle> = self
            .pending_destroy
            .iter()
            .copied()
            .filter(|h| self.parent_fences.get(h).is_none_or(RenderFence::is_complete))
            .collect();
        self.pending_destroy.retain(|h| !ready.contains(h));
        for &handle in &ready {
            self.finish_destroy(handle);
        }
        ready.len()
    }

    fn finish_destroy(&mut self, handle: MaterialHandle) {
        self.parent_fences.remove(&handle);
        self.deferred_updates.retain(|&h| h != handle);
        if let Some(mut asset) = self.registry.remove(handle) {
            asset.permutations_mut().invalidate(self.compiler.as_ref());
            log::debug!("Destroyed '{}'", asset.name());
        }
        self.queue
            .push(RenderCommand::Destroy { material: handle });
        self.flush();
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    pub fn serialize_instance(&self, handle: MaterialHandle) -> Result<SerializedInstance> {
        let instance = self.instance(handle)?;
        let parent = instance
            .parent()
            .and_then(|p| self.registry.get(p))
            .map(MaterialAsset::asset_id);
        Ok(SerializedInstance::capture(instance, parent))
    }

    /// Serializes an instance together with its own programs compiled for
    /// every target platform.
    pub fn package_instance(
        &self,
        handle: MaterialHandle,
        platforms: &[ShaderPlatform],
    ) -> Result<SerializedInstance> {
        let mut record = self.serialize_instance(handle)?;
        if !self.instance(handle)?.has_static_permutation() {
            return Ok(record);
        }
        let Some(inputs) = self.compile_inputs(handle)? else {
            return Ok(record);
        };

        let resources = PermutationMatrix::cache_for_all_target_tiers(
            &inputs.context(),
            self.compiler.as_ref(),
            platforms,
        );
        for mut resource in resources {
            let Some(program) = resource.program() else {
                if resource.is_pending() {
                    log::warn!(
                        "Skipped packaging '{}' for {}: still compiling",
                        inputs.name,
                        resource.tiers()
                    );
                }
                resource.release(self.compiler.as_ref());
                continue;
            };
            if let Some(bytes) = self.compiler.export_program(program) {
                let entry = PackagedProgram {
                    tiers: resource.tiers(),
                    bytes,
                };
                match record
                    .packaged
                    .iter_mut()
                    .find(|p| p.platform == resource.platform())
                {
                    Some(platform) => platform.programs.push(entry),
                    None => record.packaged.push(PackagedPlatform {
                        platform: resource.platform(),
                        programs: vec![entry],
                    }),
                }
            }
            resource.release(self.compiler.as_ref());
        }
        log::debug!(
            "Packaged '{}' for {} platform(s)",
            inputs.name,
            record.packaged.len()
        );
        Ok(record)
    }

    /// Recreates an instance from a record. The parent is looked up by asset
    /// id and must already be registered. Packaged programs for the running
    /// hardware are installed instead of compiling where possible.
    pub fn restore_instance(&mut self, record: &SerializedInstance) -> Result<MaterialHandle> {
        if let Some(live) = self.registry.handle_by_asset_id(&record.asset_id) {
            return Err(MaterialError::AssetAlreadyRegistered {
                asset_id: record.asset_id,
                material: self.name_of(live),
            });
        }
        let parent = match record.parent {
            Some(id) => Some(
                self.registry
                    .handle_by_asset_id(&id)
                    .ok_or_else(|| MaterialError::InvalidHandle(format!("parent asset {id}")))?,
            ),
            None => None,
        };
        if let Some(parent) = parent {
            self.validate_parent(None, parent)?;
        }
        let mut statics = record.static_set();
        let declared: Vec<(Symbol, ParameterKind)> = match parent {
            Some(parent) => self
                .resolver()
                .root_definition(parent)?
                .map(|(_, root)| {
                    root.declarations()
                        .iter()
                        .map(|d| (d.name, d.kind()))
                        .collect()
                })
                .unwrap_or_default(),
            None => Vec::new(),
        };
        statics.retain(|e| {
            let keep = declared.contains(&(e.name, e.value.kind()));
            if !keep {
                log::warn!(
                    "Dropping undeclared static parameter '{}' from '{}'",
                    interner::resolve(e.name),
                    record.name
                );
            }
            keep
        });
        if record.kind == InstanceKind::Dynamic
            && (!statics.is_empty() || !record.base_overrides.is_empty())
        {
            return Err(MaterialError::StaticParameterOnDynamicInstance(
                record.name.clone(),
            ));
        }

        let mut instance = MaterialInstance::new(&record.name, record.kind);
        instance.set_asset_id(record.asset_id);
        instance.set_parent_handle(parent);
        instance.dynamic_overrides = record.dynamic_table();
        instance.static_overrides = statics;
        instance.set_base_overrides(record.base_overrides);
        let handle = self.registry.insert(instance);

        if self.instance(handle)?.wants_static_permutation()
            && let Some(inputs) = self.compile_inputs(handle)?
        {
            let key = inputs.context().permutation_key();
            let resources = self.import_packaged(record, key);
            let imported = resources.len();
            let instance = instance_in(&mut self.registry, handle)?;
            instance.set_static_permutation(true, key);
            instance.permutations.load_packaged(
                resources,
                inputs.quality_specific,
                &self.settings,
                self.compiler.as_ref(),
            );
            if imported > 0 {
                log::debug!("Loaded {imported} packaged program(s) for '{}'", record.name);
            }
        }
        self.update_static_permutation(handle)?;
        self.instance_mut(handle)?.set_state_id(record.state_id);

        let init = self.proxy_init(handle)?;
        self.queue.push(RenderCommand::CreateProxy(Box::new(init)));
        self.flush();
        Ok(handle)
    }

    fn import_packaged(&self, record: &SerializedInstance, key: u64) -> Vec<CompiledResource> {
        let mut resources = Vec::new();
        for packaged in &record.packaged {
            let platform = packaged.platform;
            if !self
                .settings
                .capability_tiers
                .contains(platform.max_capability_tier().mask())
            {
                continue;
            }
            for program in &packaged.programs {
                match self.compiler.import_program(program.tiers, &program.bytes) {
                    Ok(handle) => resources.push(CompiledResource::from_program(
                        program.tiers,
                        platform,
                        handle,
                        key,
                    )),
                    Err(errors) => log::warn!(
                        "Could not load packaged program for '{}' at {}: {}",
                        record.name,
                        program.tiers,
                        errors.join("; ")
                    ),
                }
            }
        }
        resources
    }

    // ========================================================================
    // Publishing
    // ========================================================================

    /// Sends everything queued so far as one batch.
    pub fn flush(&mut self) -> Option<RenderFence> {
        if self.atlas.is_dirty() {
            self.queue
                .push(RenderCommand::UpdateProfileAtlas(self.atlas.texture()));
        }
        self.queue.flush()
    }

    fn root_surface(&self, handle: MaterialHandle) -> Result<(MaterialDomain, ExpressionList)> {
        Ok(match self.resolver().root_definition(handle)? {
            Some((_, root)) => (root.domain(), root.expressions().clone()),
            None => (MaterialDomain::Surface, ExpressionList::from(Vec::new())),
        })
    }

    fn push_parent(&mut self, handle: MaterialHandle) -> Result<()> {
        let parent = self.registry.try_get(handle)?.parent();
        let (domain, expressions) = self.root_surface(handle)?;
        self.queue.push(RenderCommand::SetParent {
            material: handle,
            parent,
            domain,
            expressions,
        });
        Ok(())
    }

    fn publish_permutations(&mut self, handle: MaterialHandle) -> Result<()> {
        let asset = self.registry.try_get(handle)?;
        let command = RenderCommand::SetPermutations {
            material: handle,
            owns_permutations: asset.owns_permutations(),
            programs: asset.permutations().program_table(),
        };
        self.queue.push(command);
        Ok(())
    }

    fn push_invalidations(&mut self, handle: MaterialHandle) {
        self.queue
            .push(RenderCommand::InvalidateExpressions { material: handle });
        let dependents = self.resolver().dependents(handle);
        for material in dependents {
            self.queue
                .push(RenderCommand::InvalidateExpressions { material });
        }
    }

    fn push_value(&mut self, material: MaterialHandle, name: Symbol, value: ParameterValue) {
        let command = match value {
            ParameterValue::Scalar(value) => RenderCommand::SetScalar {
                material,
                name,
                value,
            },
            ParameterValue::Vector(value) => RenderCommand::SetVector {
                material,
                name,
                value,
            },
            ParameterValue::Texture(texture) => RenderCommand::SetTexture {
                material,
                name,
                texture: self.textures.resolve(texture),
            },
            ParameterValue::Font(font) => RenderCommand::SetTexture {
                material,
                name,
                texture: self.textures.resolve(font.font),
            },
            ParameterValue::StaticSwitch(_)
            | ParameterValue::StaticComponentMask(_)
            | ParameterValue::LayerWeight(_) => return,
        };
        self.queue.push(command);
    }

    fn push_local_values(&mut self, material: MaterialHandle, values: ProxyValues) {
        for (name, value) in values.scalars {
            self.queue.push(RenderCommand::SetScalar {
                material,
                name,
                value,
            });
        }
        for (name, value) in values.vectors {
            self.queue.push(RenderCommand::SetVector {
                material,
                name,
                value,
            });
        }
        for (name, texture) in values.textures {
            self.queue.push(RenderCommand::SetTexture {
                material,
                name,
                texture: Some(texture),
            });
        }
    }

    /// Runtime values the material sets itself: declared defaults for a
    /// definition, overrides for an instance.
    fn proxy_values(&self, handle: MaterialHandle) -> Result<ProxyValues> {
        let locals: Vec<(Symbol, ParameterValue)> = match self.registry.try_get(handle)? {
            MaterialAsset::Definition(def) => def
                .declarations()
                .iter()
                .map(|d| (d.name, d.default))
                .collect(),
            MaterialAsset::Instance(inst) => inst
                .dynamic_overrides()
                .iter()
                .filter(|e| e.overridden)
                .map(|e| (e.name, e.value))
                .collect(),
        };

        let mut values = ProxyValues::default();
        for (name, value) in locals {
            match value {
                ParameterValue::Scalar(v) => values.scalars.push((name, v)),
                ParameterValue::Vector(v) => values.vectors.push((name, v)),
                ParameterValue::Texture(t) => {
                    if let Some(gpu) = self.textures.resolve(t) {
                        values.textures.push((name, gpu));
                    }
                }
                ParameterValue::Font(f) => {
                    if let Some(gpu) = self.textures.resolve(f.font) {
                        values.textures.push((name, gpu));
                    }
                }
                ParameterValue::StaticSwitch(_)
                | ParameterValue::StaticComponentMask(_)
                | ParameterValue::LayerWeight(_) => {}
            }
        }
        Ok(values)
    }

    fn proxy_init(&self, handle: MaterialHandle) -> Result<ProxyInit> {
        let (domain, expressions) = self.root_surface(handle)?;
        let values = self.proxy_values(handle)?;
        let subsurface_slot = self.effective_slot(handle)?;
        let asset = self.registry.try_get(handle)?;
        Ok(ProxyInit {
            material: handle,
            name: asset.name().to_string(),
            domain,
            parent: asset.parent(),
            expressions,
            owns_permutations: asset.owns_permutations(),
            programs: asset.permutations().program_table(),
            subsurface_slot,
            values,
        })
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn instance(&self, handle: MaterialHandle) -> Result<&MaterialInstance> {
        self.registry
            .try_get(handle)?
            .as_instance()
            .ok_or_else(|| MaterialError::InvalidHandle(format!("{handle:?} is not an instance")))
    }

    fn instance_mut(&mut self, handle: MaterialHandle) -> Result<&mut MaterialInstance> {
        instance_in(&mut self.registry, handle)
    }
}

/// Field-level borrow of an instance, leaving the rest of the system usable.
fn instance_in(
    registry: &mut MaterialRegistry,
    handle: MaterialHandle,
) -> Result<&mut MaterialInstance> {
    registry
        .try_get_mut(handle)?
        .as_instance_mut()
        .ok_or_else(|| MaterialError::InvalidHandle(format!("{handle:?} is not an instance")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::SelectionState;
    use crate::testing::{MapTextureResolver, MockShaderCompiler};
    use crate::tiers::{CapabilityTier, QualityTier};
    use glam::Vec4;

    struct Fixture {
        system: MaterialSystem,
        scene: RenderScene,
        compiler: Arc<MockShaderCompiler>,
        fallback: MaterialHandle,
        skin: MaterialHandle,
    }

    fn fixture() -> Fixture {
        let compiler = Arc::new(MockShaderCompiler::new());
        let textures = Arc::new(MapTextureResolver::new());
        let (mut system, scene) =
            MaterialSystem::new(MaterialCacheSettings::default(), compiler.clone(), textures);

        let fallback = system
            .create_definition(MaterialDefinition::new("Fallback", MaterialDomain::Surface))
            .unwrap();
        system
            .initialize_defaults([(MaterialDomain::Surface, fallback)])
            .unwrap();
        let skin = system
            .create_definition(
                MaterialDefinition::new("Skin", MaterialDomain::Surface)
                    .with_parameter("scatterRadius", 1.2_f32)
                    .with_parameter("useTwoSided", false),
            )
            .unwrap();

        Fixture {
            system,
            scene,
            compiler,
            fallback,
            skin,
        }
    }

    fn high_sm5() -> TierPair {
        TierPair::new(QualityTier::High, CapabilityTier::Sm5)
    }

    #[test]
    fn runtime_override_does_not_recompile() {
        let mut f = fixture();
        let child = f
            .system
            .create_instance("SkinA", InstanceKind::Constant, Some(f.skin))
            .unwrap();
        let before = f.compiler.compile_count();

        f.system
            .set_parameter_value(child, "scatterRadius", ParameterValue::Scalar(3.0))
            .unwrap();

        assert_eq!(f.compiler.compile_count(), before);
        assert_eq!(
            f.system.get_effective_value(child, "scatterRadius").unwrap(),
            Some(ParameterValue::Scalar(3.0))
        );
        assert!(!f.system.instance(child).unwrap().has_static_permutation());
    }

    #[test]
    fn static_override_compiles_private_permutation() {
        let mut f = fixture();
        let child = f
            .system
            .create_instance("SkinB", InstanceKind::Constant, Some(f.skin))
            .unwrap();

        f.system
            .set_parameter_value(child, "useTwoSided", ParameterValue::StaticSwitch(true))
            .unwrap();

        let instance = f.system.instance(child).unwrap();
        assert!(instance.has_static_permutation());
        assert_eq!(f.compiler.compiles_for("SkinB").len(), 1);

        f.scene.process_commands();
        let own = f.scene.program(child, SelectionState::Unselected, high_sm5());
        let base = f.scene.program(f.skin, SelectionState::Unselected, high_sm5());
        assert!(own.is_some());
        assert_ne!(own, base);
    }

    #[test]
    fn kind_mismatch_is_rejected() {
        let mut f = fixture();
        let child = f
            .system
            .create_instance("SkinA", InstanceKind::Constant, Some(f.skin))
            .unwrap();
        let err = f
            .system
            .set_parameter_value(child, "scatterRadius", ParameterValue::StaticSwitch(true))
            .unwrap_err();
        assert!(matches!(err, MaterialError::ParameterKindMismatch { .. }));
    }

    #[test]
    fn dynamic_instance_rejects_static_override() {
        let mut f = fixture();
        let mid = f
            .system
            .create_instance("SkinMID", InstanceKind::Dynamic, Some(f.skin))
            .unwrap();
        let err = f
            .system
            .set_parameter_value(mid, "useTwoSided", ParameterValue::StaticSwitch(true))
            .unwrap_err();
        assert!(matches!(err, MaterialError::StaticParameterOnDynamicInstance(_)));
    }

    #[test]
    fn dynamic_instance_cannot_be_parent() {
        let mut f = fixture();
        let mid = f
            .system
            .create_instance("SkinMID", InstanceKind::Dynamic, Some(f.skin))
            .unwrap();
        let err = f
            .system
            .create_instance("Child", InstanceKind::Constant, Some(mid))
            .unwrap_err();
        assert!(matches!(err, MaterialError::InvalidParentType { .. }));
    }

    #[test]
    fn reparent_cycle_keeps_old_parent() {
        let mut f = fixture();
        let a = f
            .system
            .create_instance("A", InstanceKind::Constant, Some(f.skin))
            .unwrap();
        let b = f
            .system
            .create_instance("B", InstanceKind::Constant, Some(a))
            .unwrap();

        let err = f.system.set_parent(a, Some(b)).unwrap_err();
        assert!(matches!(err, MaterialError::CyclicInheritance { .. }));
        assert_eq!(f.system.instance(a).unwrap().parent(), Some(f.skin));
    }

    #[test]
    fn destroying_parent_with_children_is_refused() {
        let mut f = fixture();
        f.system
            .create_instance("A", InstanceKind::Constant, Some(f.skin))
            .unwrap();
        let err = f.system.destroy(f.skin).unwrap_err();
        assert!(matches!(err, MaterialError::MaterialInUse { children: 1, .. }));
    }

    #[test]
    fn former_parent_destruction_waits_for_fence() {
        let mut f = fixture();
        let other = f
            .system
            .create_definition(MaterialDefinition::new("Other", MaterialDomain::Surface))
            .unwrap();
        let child = f
            .system
            .create_instance("A", InstanceKind::Constant, Some(other))
            .unwrap();
        f.system.set_parent(child, Some(f.skin)).unwrap();

        f.system.destroy(other).unwrap();
        assert_eq!(f.system.pending_destroy_count(), 1);
        assert!(f.system.get(other).is_some());

        f.scene.process_commands();
        assert_eq!(f.system.collect_garbage(), 1);
        assert!(f.system.get(other).is_none());
    }

    #[test]
    fn default_material_cannot_be_destroyed() {
        let mut f = fixture();
        let err = f.system.destroy(f.fallback).unwrap_err();
        assert!(matches!(err, MaterialError::DefaultMaterialInUse(ref name) if name == "Fallback"));
        assert!(f.system.get(f.fallback).is_some());
    }

    #[test]
    fn undeclared_static_override_is_rejected() {
        let mut f = fixture();
        let child = f
            .system
            .create_instance("SkinA", InstanceKind::Constant, Some(f.skin))
            .unwrap();
        f.scene.process_commands();
        let fence = f.system.render_fence();

        let err = f
            .system
            .set_parameter_value(child, "notInGraph", ParameterValue::StaticSwitch(true))
            .unwrap_err();

        assert!(matches!(err, MaterialError::UnknownStaticParameter(_)));
        let instance = f.system.instance(child).unwrap();
        assert!(instance.static_overrides().is_empty());
        assert!(!instance.has_static_permutation());
        assert_eq!(f.compiler.compiles_for("SkinA").len(), 0);
        assert_eq!(f.system.queue.pending_len(), 0);
        assert_eq!(f.system.render_fence().sequence(), fence.sequence());
    }

    #[test]
    fn failing_default_is_fatal() {
        let compiler = Arc::new(MockShaderCompiler::new());
        compiler.fail_material("Broken");
        let (mut system, _scene) = MaterialSystem::new(
            MaterialCacheSettings::default(),
            compiler,
            Arc::new(MapTextureResolver::new()),
        );
        let broken = system
            .create_definition(MaterialDefinition::new("Broken", MaterialDomain::Surface))
            .unwrap();
        let err = system
            .initialize_defaults([(MaterialDomain::Surface, broken)])
            .unwrap_err();
        assert!(matches!(err, MaterialError::DefaultMaterialCompileFailed { .. }));
        assert!(!system.defaults().is_initialized());
    }

    #[test]
    fn undeclared_parameter_is_zeroed() {
        let f = fixture();
        assert_eq!(f.system.get_effective_value(f.skin, "neverDeclared").unwrap(), None);
        assert_eq!(
            f.system
                .get_effective_value_or_zeroed(f.skin, "neverDeclared", ParameterKind::Vector)
                .unwrap(),
            ParameterValue::Vector(Vec4::ZERO)
        );
    }
}
