//! Render Scene
//!
//! Owned by the render context. Drains published batches and holds every
//! render proxy, the per-domain default table and the current profile atlas
//! texture.

use std::sync::Arc;

use glam::Vec4;
use rustc_hash::FxHashMap;

use crate::atlas::AtlasTexture;
use crate::compile::{GpuTextureHandle, ProgramHandle};
use crate::interner::Symbol;
use crate::material::{DOMAIN_COUNT, MaterialDomain, MaterialHandle};
use crate::render::command::{ProxyInit, RenderCommand, SELECTION_STATE_COUNT, SelectionState};
use crate::render::proxy::RenderProxy;
use crate::render::publish::CommandReceiver;
use crate::tiers::TierPair;

/// The three selection-state proxies of one material.
#[derive(Debug)]
struct ProxySet([RenderProxy; SELECTION_STATE_COUNT]);

impl ProxySet {
    fn new(init: &ProxyInit) -> Self {
        Self(std::array::from_fn(|i| {
            RenderProxy::new(init, SelectionState::ALL[i])
        }))
    }

    fn for_each(&mut self, mut f: impl FnMut(&mut RenderProxy)) {
        for proxy in &mut self.0 {
            f(proxy);
        }
    }
}

pub struct RenderScene {
    receiver: CommandReceiver,
    proxies: FxHashMap<MaterialHandle, ProxySet>,
    defaults: [Option<MaterialHandle>; DOMAIN_COUNT],
    atlas: Option<Arc<AtlasTexture>>,
    max_depth: usize,
}

impl RenderScene {
    pub(crate) fn new(receiver: CommandReceiver, max_depth: usize) -> Self {
        Self {
            receiver,
            proxies: FxHashMap::default(),
            defaults: [None; DOMAIN_COUNT],
            atlas: None,
            max_depth,
        }
    }

    /// Applies every waiting batch in order. Returns the number of batches.
    pub fn process_commands(&mut self) -> usize {
        let mut applied = 0;
        while let Some(batch) = self.receiver.try_recv() {
            for command in batch.commands {
                self.apply(command);
            }
            self.receiver.mark_applied(batch.sequence);
            applied += 1;
        }
        applied
    }

    fn apply(&mut self, command: RenderCommand) {
        match command {
            RenderCommand::CreateProxy(init) => {
                self.proxies.insert(init.material, ProxySet::new(&init));
            }
            RenderCommand::SetParent {
                material,
                parent,
                domain,
                expressions,
            } => self.update(material, |p| p.set_parent(parent, domain, expressions.clone())),
            RenderCommand::SetScalar {
                material,
                name,
                value,
            } => self.update(material, |p| p.set_scalar(name, value)),
            RenderCommand::SetVector {
                material,
                name,
                value,
            } => self.update(material, |p| p.set_vector(name, value)),
            RenderCommand::SetTexture {
                material,
                name,
                texture,
            } => self.update(material, |p| p.set_texture(name, texture)),
            RenderCommand::RemoveParameter { material, name } => {
                self.update(material, |p| p.remove_parameter(name));
            }
            RenderCommand::ClearParameters { material } => {
                self.update(material, RenderProxy::clear_parameters);
            }
            RenderCommand::InvalidateExpressions { material } => {
                self.update(material, RenderProxy::invalidate_expressions);
            }
            RenderCommand::SetPermutations {
                material,
                owns_permutations,
                programs,
            } => self.update(material, |p| p.set_permutations(owns_permutations, programs)),
            RenderCommand::SetSubsurfaceSlot { material, slot } => {
                self.update(material, |p| p.set_subsurface_slot(slot));
            }
            RenderCommand::SetDefaultMaterials { table } => self.defaults = table,
            RenderCommand::UpdateProfileAtlas(texture) => self.atlas = Some(texture),
            RenderCommand::Destroy { material } => {
                self.proxies.remove(&material);
            }
        }
    }

    fn update(&mut self, material: MaterialHandle, f: impl FnMut(&mut RenderProxy)) {
        if let Some(set) = self.proxies.get_mut(&material) {
            set.for_each(f);
        } else {
            log::debug!("Dropped command for unknown proxy {material:?}");
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    #[inline]
    #[must_use]
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    #[must_use]
    pub fn get_render_proxy(
        &self,
        material: MaterialHandle,
        selection: SelectionState,
    ) -> Option<&RenderProxy> {
        self.proxies
            .get(&material)
            .map(|set| &set.0[selection.index()])
    }

    #[must_use]
    pub fn default_proxy(
        &self,
        domain: MaterialDomain,
        selection: SelectionState,
    ) -> Option<&RenderProxy> {
        let material = self.defaults[domain.index()]?;
        self.get_render_proxy(material, selection)
    }

    #[must_use]
    pub fn proxy_count(&self) -> usize {
        self.proxies.len()
    }

    #[must_use]
    pub fn profile_atlas(&self) -> Option<&Arc<AtlasTexture>> {
        self.atlas.as_ref()
    }

    /// Proxy of `material`, or the surface default if it is unknown.
    fn proxy_or_default(
        &self,
        material: MaterialHandle,
        selection: SelectionState,
    ) -> Option<&RenderProxy> {
        self.get_render_proxy(material, selection)
            .or_else(|| self.default_proxy(MaterialDomain::Surface, selection))
    }

    #[must_use]
    pub fn scalar_value(
        &self,
        material: MaterialHandle,
        selection: SelectionState,
        name: Symbol,
    ) -> f32 {
        self.proxy_or_default(material, selection)
            .map_or(0.0, |p| p.get_scalar_value(name, self))
    }

    #[must_use]
    pub fn vector_value(
        &self,
        material: MaterialHandle,
        selection: SelectionState,
        name: Symbol,
    ) -> Vec4 {
        self.proxy_or_default(material, selection)
            .map_or(Vec4::ZERO, |p| p.get_vector_value(name, self))
    }

    #[must_use]
    pub fn texture_value(
        &self,
        material: MaterialHandle,
        selection: SelectionState,
        name: Symbol,
    ) -> Option<GpuTextureHandle> {
        self.proxy_or_default(material, selection)
            .and_then(|p| p.get_texture_value(name, self))
    }

    #[must_use]
    pub fn uniform_value(
        &self,
        material: MaterialHandle,
        selection: SelectionState,
        output: Symbol,
    ) -> Vec4 {
        self.proxy_or_default(material, selection)
            .map_or(Vec4::ZERO, |p| p.get_uniform_value(output, self))
    }

    #[must_use]
    pub fn program(
        &self,
        material: MaterialHandle,
        selection: SelectionState,
        tiers: TierPair,
    ) -> Option<ProgramHandle> {
        self.proxy_or_default(material, selection)
            .and_then(|p| p.get_program(tiers, self))
    }
}
