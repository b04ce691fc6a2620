//! Render Proxies
//!
//! The render context's copy of a material. A proxy stores only the values
//! its material sets locally; every other lookup falls back to the parent
//! proxy with the same selection state and finally to the domain default,
//! which always answers.

use glam::Vec4;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::atlas::SlotIndex;
use crate::compile::{GpuTextureHandle, PermutationSlot, ProgramHandle, ProgramTable};
use crate::interner::{self, SUBSURFACE_PROFILE_PARAMETER, Symbol};
use crate::material::{MaterialDomain, MaterialHandle};
use crate::params::{ExpressionList, ExpressionValueCache, UniformSource};
use crate::render::command::{ProxyInit, SelectionState};
use crate::render::scene::RenderScene;
use crate::tiers::TierPair;

#[derive(Debug)]
pub struct RenderProxy {
    material: MaterialHandle,
    selection: SelectionState,
    name: String,
    domain: MaterialDomain,
    parent: Option<MaterialHandle>,
    scalars: FxHashMap<Symbol, f32>,
    vectors: FxHashMap<Symbol, Vec4>,
    textures: FxHashMap<Symbol, GpuTextureHandle>,
    owns_permutations: bool,
    programs: ProgramTable,
    subsurface_slot: SlotIndex,
    expressions: ExpressionList,
    expression_cache: Mutex<ExpressionValueCache>,
}

impl RenderProxy {
    pub(crate) fn new(init: &ProxyInit, selection: SelectionState) -> Self {
        Self {
            material: init.material,
            selection,
            name: init.name.clone(),
            domain: init.domain,
            parent: init.parent,
            scalars: init.values.scalars.iter().copied().collect(),
            vectors: init.values.vectors.iter().copied().collect(),
            textures: init.values.textures.iter().copied().collect(),
            owns_permutations: init.owns_permutations,
            programs: init.programs,
            subsurface_slot: init.subsurface_slot,
            expressions: init.expressions.clone(),
            expression_cache: Mutex::new(ExpressionValueCache::new()),
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    #[inline]
    #[must_use]
    pub fn material(&self) -> MaterialHandle {
        self.material
    }

    #[inline]
    #[must_use]
    pub fn selection(&self) -> SelectionState {
        self.selection
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    #[must_use]
    pub fn domain(&self) -> MaterialDomain {
        self.domain
    }

    #[inline]
    #[must_use]
    pub fn parent(&self) -> Option<MaterialHandle> {
        self.parent
    }

    #[inline]
    #[must_use]
    pub fn subsurface_slot(&self) -> SlotIndex {
        self.subsurface_slot
    }

    #[inline]
    #[must_use]
    pub fn owns_permutations(&self) -> bool {
        self.owns_permutations
    }

    #[must_use]
    pub fn local_scalar(&self, name: Symbol) -> Option<f32> {
        self.scalars.get(&name).copied()
    }

    #[must_use]
    pub fn local_vector(&self, name: Symbol) -> Option<Vec4> {
        self.vectors.get(&name).copied()
    }

    #[must_use]
    pub fn local_texture(&self, name: Symbol) -> Option<GpuTextureHandle> {
        self.textures.get(&name).copied()
    }

    /// Number of full uniform-expression recomputations so far.
    #[must_use]
    pub fn expression_evaluations(&self) -> u64 {
        self.expression_cache.lock().evaluations()
    }

    #[must_use]
    pub fn is_expression_cache_valid(&self) -> bool {
        self.expression_cache.lock().is_valid()
    }

    // ========================================================================
    // Chained lookups
    // ========================================================================

    /// Walks self, then ancestors, then the domain default, returning the
    /// first answer of `f`.
    fn walk<T>(&self, scene: &RenderScene, f: impl Fn(&RenderProxy) -> Option<T>) -> Option<T> {
        let mut current = self;
        for _ in 0..scene.max_depth() {
            if let Some(value) = f(current) {
                return Some(value);
            }
            match current
                .parent
                .and_then(|p| scene.get_render_proxy(p, self.selection))
            {
                Some(parent) => current = parent,
                None => break,
            }
        }

        let fallback = scene.default_proxy(self.domain, self.selection)?;
        if std::ptr::eq(fallback, current) {
            return None;
        }
        f(fallback)
    }

    /// Effective scalar. Undeclared names resolve to zero.
    ///
    /// The reserved subsurface profile name answers the encoded atlas slot.
    #[must_use]
    pub fn get_scalar_value(&self, name: Symbol, scene: &RenderScene) -> f32 {
        self.find_scalar(name, scene).unwrap_or(0.0)
    }

    /// Effective vector. Undeclared names resolve to zero.
    #[must_use]
    pub fn get_vector_value(&self, name: Symbol, scene: &RenderScene) -> Vec4 {
        self.find_vector(name, scene).unwrap_or(Vec4::ZERO)
    }

    fn find_scalar(&self, name: Symbol, scene: &RenderScene) -> Option<f32> {
        if interner::get(SUBSURFACE_PROFILE_PARAMETER) == Some(name) {
            return Some(self.subsurface_slot.encode());
        }
        self.walk(scene, |p| p.local_scalar(name))
    }

    fn find_vector(&self, name: Symbol, scene: &RenderScene) -> Option<Vec4> {
        self.walk(scene, |p| p.local_vector(name))
    }

    /// Effective texture binding. `None` only if no proxy in the chain,
    /// including the default, binds one.
    #[must_use]
    pub fn get_texture_value(&self, name: Symbol, scene: &RenderScene) -> Option<GpuTextureHandle> {
        self.walk(scene, |p| p.local_texture(name))
    }

    /// Program to draw with for `tiers`.
    ///
    /// A proxy without its own permutation uses its parent's. A missing,
    /// pending or failed program falls back to the domain default.
    #[must_use]
    pub fn get_program(&self, tiers: TierPair, scene: &RenderScene) -> Option<ProgramHandle> {
        let slot = |p: &RenderProxy| {
            p.owns_permutations
                .then(|| p.programs[tiers.quality.index()][tiers.capability.index()])
        };
        match self.walk(scene, slot) {
            Some(PermutationSlot::Ready(program)) => Some(program),
            _ => {
                let fallback = scene.default_proxy(self.domain, self.selection)?;
                match slot(fallback) {
                    Some(PermutationSlot::Ready(program)) => Some(program),
                    _ => None,
                }
            }
        }
    }

    /// Result of the uniform expression writing `output`, recomputing the
    /// whole cache if it was invalidated.
    #[must_use]
    pub fn get_uniform_value(&self, output: Symbol, scene: &RenderScene) -> Vec4 {
        let Some(index) = self.expressions.iter().position(|e| e.output == output) else {
            return Vec4::ZERO;
        };
        let source = ChainSource { proxy: self, scene };
        let mut cache = self.expression_cache.lock();
        cache.ensure_valid(&self.expressions, &source);
        cache.get(index).unwrap_or(Vec4::ZERO)
    }

    // ========================================================================
    // Mutation (render context only)
    // ========================================================================

    pub(crate) fn set_parent(
        &mut self,
        parent: Option<MaterialHandle>,
        domain: MaterialDomain,
        expressions: ExpressionList,
    ) {
        self.parent = parent;
        self.domain = domain;
        self.expressions = expressions;
        self.invalidate_expressions();
    }

    pub(crate) fn set_scalar(&mut self, name: Symbol, value: f32) {
        self.scalars.insert(name, value);
    }

    pub(crate) fn set_vector(&mut self, name: Symbol, value: Vec4) {
        self.vectors.insert(name, value);
    }

    pub(crate) fn set_texture(&mut self, name: Symbol, texture: Option<GpuTextureHandle>) {
        match texture {
            Some(texture) => {
                self.textures.insert(name, texture);
            }
            None => {
                self.textures.remove(&name);
            }
        }
    }

    pub(crate) fn remove_parameter(&mut self, name: Symbol) {
        self.scalars.remove(&name);
        self.vectors.remove(&name);
        self.textures.remove(&name);
    }

    pub(crate) fn clear_parameters(&mut self) {
        self.scalars.clear();
        self.vectors.clear();
        self.textures.clear();
    }

    pub(crate) fn set_permutations(&mut self, owns_permutations: bool, programs: ProgramTable) {
        self.owns_permutations = owns_permutations;
        self.programs = programs;
    }

    pub(crate) fn set_subsurface_slot(&mut self, slot: SlotIndex) {
        self.subsurface_slot = slot;
    }

    pub(crate) fn invalidate_expressions(&mut self) {
        self.expression_cache.get_mut().invalidate();
    }
}

struct ChainSource<'a> {
    proxy: &'a RenderProxy,
    scene: &'a RenderScene,
}

impl UniformSource for ChainSource<'_> {
    fn scalar(&self, name: Symbol) -> Option<f32> {
        self.proxy.find_scalar(name, self.scene)
    }

    fn vector(&self, name: Symbol) -> Option<Vec4> {
        self.proxy.find_vector(name, self.scene)
    }
}
