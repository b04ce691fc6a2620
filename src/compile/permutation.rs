//! Permutation Matrix
//!
//! Every material that owns compiled programs (a base definition, or an
//! instance with its own static permutation) keeps a dense
//! `[quality][capability]` grid of [`CompiledResource`]s.
//!
//! # Quality sharing
//!
//! Most graphs have no quality-specific nodes. For those only the `High`
//! column is compiled and every quality tier resolves to it. Loading packaged
//! data with `discard_unused_quality` set goes further and redirects every
//! quality tier of a capability to one retained program.

use uuid::Uuid;
use xxhash_rust::xxh3::Xxh3;

use crate::compile::compiler::{CompileRequest, ProgramHandle, ShaderCompiler};
use crate::compile::resource::{CompileState, CompiledResource};
use crate::errors::{MaterialError, Result};
use crate::material::{MaterialDomain, MaterialProperties};
use crate::params::{StaticParameterSet, TextureRef};
use crate::settings::MaterialCacheSettings;
use crate::tiers::{
    CAPABILITY_TIER_COUNT, CapabilityTier, QUALITY_TIER_COUNT, QualityTier, ShaderPlatform,
    TierPair,
};

/// Compile inputs shared by every cell of one matrix.
#[derive(Debug, Clone, Copy)]
pub struct PermutationContext<'a> {
    pub material: &'a str,
    pub shader_graph: Uuid,
    pub static_parameters: &'a StaticParameterSet,
    pub properties: &'a MaterialProperties,
    pub referenced_textures: &'a [TextureRef],
    /// The graph has nodes whose output differs per quality tier.
    pub quality_specific: bool,
    pub has_static_permutation: bool,
    /// Set when compiling a domain's fallback material.
    pub default_for: Option<MaterialDomain>,
}

impl PermutationContext<'_> {
    /// Content key identifying the compiled output.
    #[must_use]
    pub fn permutation_key(&self) -> u64 {
        let mut hasher = Xxh3::new();
        hasher.update(self.shader_graph.as_bytes());
        self.static_parameters.hash_into(&mut hasher);
        self.properties.hash_into(&mut hasher);
        hasher.digest()
    }

    fn request(&self, tiers: TierPair, platform: ShaderPlatform, key: u64) -> CompileRequest<'_> {
        CompileRequest {
            material: self.material,
            shader_graph: self.shader_graph,
            tiers,
            platform,
            static_parameters: self.static_parameters,
            properties: self.properties,
            permutation_key: key,
        }
    }
}

/// What one `cache_for_rendering` call did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheReport {
    pub requested: usize,
    pub failed: Vec<TierPair>,
}

/// Render-side view of one matrix cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PermutationSlot {
    #[default]
    Missing,
    Pending,
    Ready(ProgramHandle),
    Failed,
}

/// Snapshot of a matrix published to render proxies. Already accounts for
/// quality sharing and discard redirects.
pub type ProgramTable = [[PermutationSlot; CAPABILITY_TIER_COUNT]; QUALITY_TIER_COUNT];

#[derive(Debug)]
pub struct PermutationMatrix {
    slots: [[Option<CompiledResource>; CAPABILITY_TIER_COUNT]; QUALITY_TIER_COUNT],
    redirect: [Option<QualityTier>; CAPABILITY_TIER_COUNT],
    quality_specific: bool,
    generation: u64,
}

impl Default for PermutationMatrix {
    fn default() -> Self {
        Self::new()
    }
}

impl PermutationMatrix {
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| std::array::from_fn(|_| None)),
            redirect: [None; CAPABILITY_TIER_COUNT],
            quality_specific: false,
            generation: 0,
        }
    }

    /// Allocates every empty cell.
    pub fn ensure_allocated(&mut self, quality_specific: bool) {
        self.quality_specific = quality_specific;
        for tiers in TierPair::all() {
            let slot = &mut self.slots[tiers.quality.index()][tiers.capability.index()];
            if slot.is_none() {
                *slot = Some(CompiledResource::new(
                    tiers,
                    ShaderPlatform::for_capability(tiers.capability),
                ));
            }
        }
    }

    #[must_use]
    pub fn is_allocated(&self) -> bool {
        self.slots.iter().flatten().all(Option::is_some)
    }

    /// Bumped on every invalidation.
    #[inline]
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Quality column that actually answers for `tiers`.
    #[must_use]
    pub fn resident_quality(&self, tiers: TierPair) -> QualityTier {
        if let Some(quality) = self.redirect[tiers.capability.index()] {
            quality
        } else if self.quality_specific {
            tiers.quality
        } else {
            QualityTier::High
        }
    }

    #[must_use]
    pub fn resource(&self, tiers: TierPair) -> Option<&CompiledResource> {
        let quality = self.resident_quality(tiers);
        self.slots[quality.index()][tiers.capability.index()].as_ref()
    }

    fn slot_mut(&mut self, tiers: TierPair) -> &mut CompiledResource {
        let platform = ShaderPlatform::for_capability(tiers.capability);
        self.slots[tiers.quality.index()][tiers.capability.index()]
            .get_or_insert_with(|| CompiledResource::new(tiers, platform))
    }

    fn resources_mut(&mut self) -> impl Iterator<Item = &mut CompiledResource> {
        self.slots.iter_mut().flatten().flatten()
    }

    /// Releases every program. Compiles still in flight are cancelled.
    pub fn invalidate(&mut self, compiler: &dyn ShaderCompiler) {
        for resource in self.resources_mut() {
            resource.release(compiler);
        }
        self.redirect = [None; CAPABILITY_TIER_COUNT];
        self.generation += 1;
    }

    /// Compiles the active quality tier for each capability tier the running
    /// hardware supports.
    ///
    /// Cells that already hold the requested content are skipped unless
    /// `force_regenerate` is set. A failure is recoverable (the cell reports
    /// its errors and draws with the domain default) except when compiling a
    /// domain default, which has nothing further to fall back to.
    pub fn cache_for_rendering(
        &mut self,
        ctx: &PermutationContext<'_>,
        settings: &MaterialCacheSettings,
        compiler: &dyn ShaderCompiler,
        force_regenerate: bool,
    ) -> Result<CacheReport> {
        self.ensure_allocated(ctx.quality_specific);

        let active = if ctx.quality_specific {
            settings.active_quality
        } else {
            QualityTier::High
        };
        let key = ctx.permutation_key();
        let mut report = CacheReport::default();

        for capability in settings.capability_tiers.tiers() {
            let quality = self.redirect[capability.index()].unwrap_or(active);
            let tiers = TierPair::new(quality, capability);
            let slot = self.slot_mut(tiers);
            if !force_regenerate && slot.is_current(key) {
                continue;
            }

            report.requested += 1;
            let request = ctx.request(tiers, ShaderPlatform::for_capability(capability), key);
            if let Err(errors) = slot.compile(
                compiler,
                &request,
                ctx.has_static_permutation,
                ctx.referenced_textures,
            ) {
                log_compile_errors(ctx.material, tiers, &errors);
                if let Some(domain) = ctx.default_for {
                    log::error!("Default {domain:?} material failed to compile");
                    return Err(MaterialError::DefaultMaterialCompileFailed { domain, errors });
                }
                report.failed.push(tiers);
            }
        }

        if report.requested > 0 {
            log::debug!(
                "Cached '{}' for rendering: {} compile(s), {} failed",
                ctx.material,
                report.requested,
                report.failed.len()
            );
        }
        Ok(report)
    }

    /// Compiles for offline packaging. Results go to the caller; the matrix
    /// itself is not touched.
    ///
    /// Each platform compiles at its highest capability tier. All quality
    /// tiers are compiled only when the graph is quality specific.
    #[must_use]
    pub fn cache_for_all_target_tiers(
        ctx: &PermutationContext<'_>,
        compiler: &dyn ShaderCompiler,
        platforms: &[ShaderPlatform],
    ) -> Vec<CompiledResource> {
        let key = ctx.permutation_key();
        let mut out = Vec::new();

        for &platform in platforms {
            let capability = platform.max_capability_tier();
            for quality in QualityTier::ALL {
                if !ctx.quality_specific && quality != QualityTier::High {
                    continue;
                }
                let tiers = TierPair::new(quality, capability);
                let mut resource = CompiledResource::new(tiers, platform);
                let request = ctx.request(tiers, platform, key);
                if let Err(errors) = resource.compile(
                    compiler,
                    &request,
                    ctx.has_static_permutation,
                    ctx.referenced_textures,
                ) {
                    log_compile_errors(ctx.material, tiers, &errors);
                }
                out.push(resource);
            }
        }
        out
    }

    /// Installs programs loaded from packaged data.
    ///
    /// With `discard_unused_quality` set, each capability tier keeps only the
    /// loaded program whose quality score is closest to the active tier and
    /// every quality tier of that capability is redirected to it. Ties keep
    /// the lower quality tier.
    pub fn load_packaged(
        &mut self,
        resources: Vec<CompiledResource>,
        quality_specific: bool,
        settings: &MaterialCacheSettings,
        compiler: &dyn ShaderCompiler,
    ) {
        self.ensure_allocated(quality_specific);
        for resource in resources {
            let tiers = resource.tiers();
            let slot = self.slot_mut(tiers);
            slot.release(compiler);
            *slot = resource;
        }

        if settings.discard_unused_quality {
            self.discard_unused_quality(settings.active_quality, compiler);
        }
    }

    fn discard_unused_quality(&mut self, desired: QualityTier, compiler: &dyn ShaderCompiler) {
        for capability in CapabilityTier::ALL {
            let c = capability.index();
            let mut best: Option<(QualityTier, i32)> = None;

            for quality in QualityTier::ALL {
                let loaded = self.slots[quality.index()][c]
                    .as_ref()
                    .is_some_and(|r| r.program().is_some());
                if !loaded {
                    continue;
                }
                let distance = quality.discard_distance(desired);
                if best.is_none_or(|(_, d)| distance < d) {
                    best = Some((quality, distance));
                }
            }

            let Some((kept, _)) = best else { continue };
            for quality in QualityTier::ALL {
                if quality != kept
                    && let Some(resource) = self.slots[quality.index()][c].as_mut()
                {
                    resource.release(compiler);
                }
            }
            self.redirect[c] = Some(kept);
            log::debug!("Kept {kept:?} programs for {capability:?}, discarded other quality tiers");
        }
    }

    /// Promotes finished compiles. Returns true if any cell changed.
    pub fn poll(&mut self, compiler: &dyn ShaderCompiler) -> bool {
        let mut changed = false;
        for resource in self.resources_mut() {
            changed |= resource.poll(compiler);
        }
        changed
    }

    /// No cell is waiting on the compiler.
    #[must_use]
    pub fn is_compilation_finished(&self) -> bool {
        !self.slots.iter().flatten().flatten().any(CompiledResource::is_pending)
    }

    /// Cancels in-flight compiles, leaving finished programs alone.
    pub fn cancel_pending(&mut self, compiler: &dyn ShaderCompiler) {
        for resource in self.resources_mut() {
            if resource.is_pending() {
                resource.release(compiler);
            }
        }
    }

    #[must_use]
    pub fn compile_errors(&self, tiers: TierPair) -> &[String] {
        self.resource(tiers)
            .map_or(&[][..], CompiledResource::compile_errors)
    }

    #[must_use]
    pub fn used_textures(&self, tiers: TierPair) -> &[TextureRef] {
        self.resource(tiers)
            .map_or(&[][..], CompiledResource::referenced_textures)
    }

    /// Render-side snapshot of every cell.
    #[must_use]
    pub fn program_table(&self) -> ProgramTable {
        let mut table = ProgramTable::default();
        for tiers in TierPair::all() {
            table[tiers.quality.index()][tiers.capability.index()] =
                match self.resource(tiers).map(CompiledResource::state) {
                    None | Some(CompileState::Idle) => PermutationSlot::Missing,
                    Some(CompileState::Pending(_)) => PermutationSlot::Pending,
                    Some(CompileState::Ready(program)) => PermutationSlot::Ready(program),
                    Some(CompileState::Failed) => PermutationSlot::Failed,
                };
        }
        table
    }
}

fn log_compile_errors(material: &str, tiers: TierPair, errors: &[String]) {
    log::warn!("Failed to compile material '{material}' for {tiers}");
    for error in errors {
        log::warn!("    {error}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockShaderCompiler;
    use crate::tiers::CapabilityTierMask;

    fn context<'a>(
        statics: &'a StaticParameterSet,
        props: &'a MaterialProperties,
        quality_specific: bool,
    ) -> PermutationContext<'a> {
        PermutationContext {
            material: "Skin",
            shader_graph: Uuid::from_u128(7),
            static_parameters: statics,
            properties: props,
            referenced_textures: &[],
            quality_specific,
            has_static_permutation: false,
            default_for: None,
        }
    }

    #[test]
    fn shared_quality_compiles_high_only() {
        let compiler = MockShaderCompiler::new();
        let statics = StaticParameterSet::new();
        let props = MaterialProperties::default();
        let settings = MaterialCacheSettings {
            active_quality: QualityTier::Low,
            ..Default::default()
        };

        let mut matrix = PermutationMatrix::new();
        let report = matrix
            .cache_for_rendering(&context(&statics, &props, false), &settings, &compiler, false)
            .unwrap();
        assert_eq!(report.requested, 1);
        assert_eq!(compiler.compile_count(), 1);

        let low = TierPair::new(QualityTier::Low, CapabilityTier::Sm5);
        assert_eq!(matrix.resident_quality(low), QualityTier::High);
        assert!(matrix.resource(low).unwrap().program().is_some());
    }

    #[test]
    fn recache_is_idempotent() {
        let compiler = MockShaderCompiler::new();
        let statics = StaticParameterSet::new();
        let props = MaterialProperties::default();
        let settings = MaterialCacheSettings {
            capability_tiers: CapabilityTierMask::ES3_1 | CapabilityTierMask::SM5,
            ..Default::default()
        };
        let ctx = context(&statics, &props, true);

        let mut matrix = PermutationMatrix::new();
        matrix.cache_for_rendering(&ctx, &settings, &compiler, false).unwrap();
        assert_eq!(compiler.compile_count(), 2);

        let again = matrix.cache_for_rendering(&ctx, &settings, &compiler, false).unwrap();
        assert_eq!(again.requested, 0);

        matrix.cache_for_rendering(&ctx, &settings, &compiler, true).unwrap();
        assert_eq!(compiler.compile_count(), 4);
    }

    #[test]
    fn pending_compiles_promote_on_poll() {
        let compiler = MockShaderCompiler::new();
        compiler.set_async(true);
        let statics = StaticParameterSet::new();
        let props = MaterialProperties::default();
        let settings = MaterialCacheSettings::default();

        let mut matrix = PermutationMatrix::new();
        matrix
            .cache_for_rendering(&context(&statics, &props, false), &settings, &compiler, false)
            .unwrap();
        assert!(!matrix.is_compilation_finished());
        assert!(!matrix.poll(&compiler));

        compiler.finish_all();
        assert!(matrix.poll(&compiler));
        assert!(matrix.is_compilation_finished());
    }

    #[test]
    fn invalidate_cancels_in_flight() {
        let compiler = MockShaderCompiler::new();
        compiler.set_async(true);
        let statics = StaticParameterSet::new();
        let props = MaterialProperties::default();

        let mut matrix = PermutationMatrix::new();
        matrix
            .cache_for_rendering(
                &context(&statics, &props, false),
                &MaterialCacheSettings::default(),
                &compiler,
                false,
            )
            .unwrap();
        matrix.invalidate(&compiler);

        assert_eq!(compiler.cancelled_count(), 1);
        assert_eq!(matrix.generation(), 1);
        assert!(matrix.is_compilation_finished());
    }

    #[test]
    fn default_material_failure_is_fatal() {
        let compiler = MockShaderCompiler::new();
        compiler.fail_material("Skin");
        let statics = StaticParameterSet::new();
        let props = MaterialProperties::default();
        let mut ctx = context(&statics, &props, false);

        let mut matrix = PermutationMatrix::new();
        let report = matrix
            .cache_for_rendering(&ctx, &MaterialCacheSettings::default(), &compiler, false)
            .unwrap();
        assert_eq!(report.failed.len(), 1);
        let tiers = TierPair::new(QualityTier::High, CapabilityTier::Sm5);
        assert!(!matrix.compile_errors(tiers).is_empty());

        ctx.default_for = Some(MaterialDomain::Surface);
        let err = matrix
            .cache_for_rendering(&ctx, &MaterialCacheSettings::default(), &compiler, true)
            .unwrap_err();
        assert!(matches!(err, MaterialError::DefaultMaterialCompileFailed { .. }));
    }

    #[test]
    fn target_tiers_follow_quality_usage() {
        let compiler = MockShaderCompiler::new();
        let statics = StaticParameterSet::new();
        let props = MaterialProperties::default();
        let platforms = [ShaderPlatform::D3dSm5, ShaderPlatform::GlslEs3_1];

        let shared = PermutationMatrix::cache_for_all_target_tiers(
            &context(&statics, &props, false),
            &compiler,
            &platforms,
        );
        assert_eq!(shared.len(), 2);
        assert!(shared.iter().all(|r| r.tiers().quality == QualityTier::High));

        let distinct = PermutationMatrix::cache_for_all_target_tiers(
            &context(&statics, &props, true),
            &compiler,
            &platforms,
        );
        assert_eq!(distinct.len(), 8);
        assert_eq!(distinct[4].tiers().capability, CapabilityTier::Es3_1);
    }

    #[test]
    fn discard_keeps_closest_quality() {
        let compiler = MockShaderCompiler::new();
        let settings = MaterialCacheSettings {
            active_quality: QualityTier::Medium,
            discard_unused_quality: true,
            ..Default::default()
        };
        let loaded = [QualityTier::Low, QualityTier::High, QualityTier::Epic]
            .into_iter()
            .enumerate()
            .map(|(i, q)| {
                CompiledResource::from_program(
                    TierPair::new(q, CapabilityTier::Sm5),
                    ShaderPlatform::D3dSm5,
                    ProgramHandle(100 + i as u64),
                    1,
                )
            })
            .collect();

        let mut matrix = PermutationMatrix::new();
        matrix.load_packaged(loaded, true, &settings, &compiler);

        for quality in QualityTier::ALL {
            let tiers = TierPair::new(quality, CapabilityTier::Sm5);
            assert_eq!(matrix.resident_quality(tiers), QualityTier::Low);
            assert_eq!(
                matrix.resource(tiers).unwrap().program(),
                Some(ProgramHandle(100))
            );
        }
        let high = &matrix.slots[QualityTier::High.index()][CapabilityTier::Sm5.index()];
        assert!(high.as_ref().unwrap().program().is_none());
    }
}
