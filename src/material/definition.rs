//! Base Material Definitions
//!
//! A definition is the root of every inheritance chain. It owns the shader
//! graph identity, declares every parameter with its default, and always
//! owns a [`PermutationMatrix`].

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use xxhash_rust::xxh3::Xxh3;

use crate::atlas::ProfileHandle;
use crate::compile::PermutationMatrix;
use crate::interner::{self, Symbol};
use crate::material::instance::BasePropertyOverrides;
use crate::params::{
    ExpressionList, NamedExpression, ParameterKind, ParameterValue, TextureRef, UniformExpression,
};
use crate::tiers::{QUALITY_TIER_COUNT, QualityTier};

pub const DOMAIN_COUNT: usize = 6;

/// Broad category of surface a material applies to. Each domain has its own
/// fallback material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MaterialDomain {
    #[default]
    Surface,
    DeferredDecal,
    LightFunction,
    PostProcess,
    UserInterface,
    Volume,
}

impl MaterialDomain {
    pub const ALL: [MaterialDomain; DOMAIN_COUNT] = [
        Self::Surface,
        Self::DeferredDecal,
        Self::LightFunction,
        Self::PostProcess,
        Self::UserInterface,
        Self::Volume,
    ];

    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BlendMode {
    #[default]
    Opaque,
    Masked,
    Translucent,
    Additive,
    Modulate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ShadingModel {
    Unlit,
    #[default]
    DefaultLit,
    Subsurface,
    SubsurfaceProfile,
    ClearCoat,
    TwoSidedFoliage,
}

/// Fixed-function state that feeds the shader compiler.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MaterialProperties {
    pub domain: MaterialDomain,
    pub blend_mode: BlendMode,
    pub shading_model: ShadingModel,
    pub two_sided: bool,
    pub opacity_mask_clip_value: f32,
    pub dithered_lod_transition: bool,
}

impl Default for MaterialProperties {
    fn default() -> Self {
        Self {
            domain: MaterialDomain::Surface,
            blend_mode: BlendMode::Opaque,
            shading_model: ShadingModel::DefaultLit,
            two_sided: false,
            opacity_mask_clip_value: 0.3333,
            dithered_lod_transition: false,
        }
    }
}

impl MaterialProperties {
    /// Applies instance overrides on top of these properties.
    #[must_use]
    pub fn with_overrides(mut self, overrides: &BasePropertyOverrides) -> Self {
        if let Some(v) = overrides.opacity_mask_clip_value {
            self.opacity_mask_clip_value = v;
        }
        if let Some(v) = overrides.blend_mode {
            self.blend_mode = v;
        }
        if let Some(v) = overrides.shading_model {
            self.shading_model = v;
        }
        if let Some(v) = overrides.two_sided {
            self.two_sided = v;
        }
        if let Some(v) = overrides.dithered_lod_transition {
            self.dithered_lod_transition = v;
        }
        self
    }

    pub(crate) fn hash_into(&self, hasher: &mut Xxh3) {
        hasher.update(&[
            self.domain as u8,
            self.blend_mode as u8,
            self.shading_model as u8,
            u8::from(self.two_sided),
            u8::from(self.dithered_lod_transition),
        ]);
        hasher.update(&self.opacity_mask_clip_value.to_bits().to_le_bytes());
    }
}

/// A parameter declared by a base material.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParameterDeclaration {
    pub name: Symbol,
    pub default: ParameterValue,
    /// Identity of the graph node exposing the parameter.
    pub expression_id: Uuid,
}

impl ParameterDeclaration {
    #[inline]
    #[must_use]
    pub fn kind(&self) -> ParameterKind {
        self.default.kind()
    }
}

#[derive(Debug)]
pub struct MaterialDefinition {
    name: String,
    asset_id: Uuid,
    state_id: Uuid,
    shader_graph: Uuid,
    properties: MaterialProperties,
    declarations: Vec<ParameterDeclaration>,
    expressions: ExpressionList,
    quality_usage: [bool; QUALITY_TIER_COUNT],
    referenced_textures: Vec<TextureRef>,
    subsurface_profile: Option<ProfileHandle>,
    pub(crate) permutations: PermutationMatrix,
}

impl MaterialDefinition {
    #[must_use]
    pub fn new(name: impl Into<String>, domain: MaterialDomain) -> Self {
        Self {
            name: name.into(),
            asset_id: Uuid::new_v4(),
            state_id: Uuid::new_v4(),
            shader_graph: Uuid::new_v4(),
            properties: MaterialProperties {
                domain,
                ..Default::default()
            },
            declarations: Vec::new(),
            expressions: Arc::from(Vec::new()),
            quality_usage: [false; QUALITY_TIER_COUNT],
            referenced_textures: Vec::new(),
            subsurface_profile: None,
            permutations: PermutationMatrix::new(),
        }
    }

    // ========================================================================
    // Builder
    // ========================================================================

    #[must_use]
    pub fn with_blend_mode(mut self, blend_mode: BlendMode) -> Self {
        self.properties.blend_mode = blend_mode;
        self
    }

    #[must_use]
    pub fn with_shading_model(mut self, shading_model: ShadingModel) -> Self {
        self.properties.shading_model = shading_model;
        self
    }

    #[must_use]
    pub fn with_two_sided(mut self, two_sided: bool) -> Self {
        self.properties.two_sided = two_sided;
        self
    }

    #[must_use]
    pub fn with_parameter(mut self, name: &str, default: impl Into<ParameterValue>) -> Self {
        self.declare_parameter(name, default.into());
        self
    }

    #[must_use]
    pub fn with_expression(mut self, output: &str, expression: UniformExpression) -> Self {
        let mut list = self.expressions.to_vec();
        list.push(NamedExpression {
            output: interner::intern(output),
            expression,
        });
        self.expressions = Arc::from(list);
        self
    }

    /// Marks a quality tier as having nodes of its own.
    #[must_use]
    pub fn with_quality_usage(mut self, quality: QualityTier) -> Self {
        self.quality_usage[quality.index()] = true;
        self
    }

    #[must_use]
    pub fn with_texture(mut self, texture: TextureRef) -> Self {
        self.referenced_textures.push(texture);
        self
    }

    #[must_use]
    pub fn with_subsurface_profile(mut self, profile: ProfileHandle) -> Self {
        self.subsurface_profile = Some(profile);
        self
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Persistent identity of the asset. Never changes.
    #[inline]
    #[must_use]
    pub fn asset_id(&self) -> Uuid {
        self.asset_id
    }

    /// Identity token of the compile-affecting state. Regenerated whenever
    /// that state changes.
    #[inline]
    #[must_use]
    pub fn state_id(&self) -> Uuid {
        self.state_id
    }

    #[inline]
    #[must_use]
    pub fn shader_graph(&self) -> Uuid {
        self.shader_graph
    }

    #[inline]
    #[must_use]
    pub fn domain(&self) -> MaterialDomain {
        self.properties.domain
    }

    #[inline]
    #[must_use]
    pub fn properties(&self) -> &MaterialProperties {
        &self.properties
    }

    #[inline]
    #[must_use]
    pub fn declarations(&self) -> &[ParameterDeclaration] {
        &self.declarations
    }

    #[must_use]
    pub fn declaration(&self, name: Symbol) -> Option<&ParameterDeclaration> {
        self.declarations.iter().find(|d| d.name == name)
    }

    #[inline]
    #[must_use]
    pub fn expressions(&self) -> &ExpressionList {
        &self.expressions
    }

    /// True if any quality tier has distinct nodes.
    #[must_use]
    pub fn is_quality_specific(&self) -> bool {
        self.quality_usage.iter().any(|&used| used)
    }

    #[inline]
    #[must_use]
    pub fn referenced_textures(&self) -> &[TextureRef] {
        &self.referenced_textures
    }

    #[inline]
    #[must_use]
    pub fn subsurface_profile(&self) -> Option<ProfileHandle> {
        self.subsurface_profile
    }

    #[inline]
    #[must_use]
    pub fn permutations(&self) -> &PermutationMatrix {
        &self.permutations
    }

    // ========================================================================
    // Mutation
    // ========================================================================

    /// Declares a parameter or replaces the default of an existing one.
    pub fn declare_parameter(&mut self, name: &str, default: ParameterValue) {
        let name = interner::intern(name);
        if let Some(existing) = self.declarations.iter_mut().find(|d| d.name == name) {
            existing.default = default;
        } else {
            self.declarations.push(ParameterDeclaration {
                name,
                default,
                expression_id: Uuid::new_v4(),
            });
        }
    }

    pub fn remove_parameter(&mut self, name: Symbol) -> Option<ParameterDeclaration> {
        let idx = self.declarations.iter().position(|d| d.name == name)?;
        Some(self.declarations.remove(idx))
    }

    pub fn set_properties(&mut self, properties: MaterialProperties) {
        self.properties = properties;
    }

    pub fn set_expressions(&mut self, expressions: Vec<NamedExpression>) {
        self.expressions = Arc::from(expressions);
    }

    pub fn set_quality_usage(&mut self, quality: QualityTier, used: bool) {
        self.quality_usage[quality.index()] = used;
    }

    pub fn set_referenced_textures(&mut self, textures: Vec<TextureRef>) {
        self.referenced_textures = textures;
    }

    pub fn set_subsurface_profile(&mut self, profile: Option<ProfileHandle>) {
        self.subsurface_profile = profile;
    }

    /// Opens an edit scope. When the guard drops, the identity token is
    /// regenerated if compile-affecting state changed.
    pub fn edit(&mut self) -> DefinitionGuard<'_> {
        let initial_signature = self.compile_signature();
        DefinitionGuard {
            definition: self,
            initial_signature,
        }
    }

    /// Hash of everything that changes compiled output: graph, properties,
    /// static parameter defaults, quality usage.
    #[must_use]
    pub fn compile_signature(&self) -> u64 {
        let mut hasher = Xxh3::new();
        hasher.update(self.shader_graph.as_bytes());
        self.properties.hash_into(&mut hasher);
        for used in self.quality_usage {
            hasher.update(&[u8::from(used)]);
        }
        for decl in self.declarations.iter().filter(|d| d.kind().is_static()) {
            hasher.update(interner::resolve(decl.name).as_bytes());
            decl.default.hash_into(&mut hasher);
            hasher.update(decl.expression_id.as_bytes());
        }
        hasher.digest()
    }

    pub(crate) fn set_asset_id(&mut self, asset_id: Uuid) {
        self.asset_id = asset_id;
    }
}

/// Edit scope over a definition; see [`MaterialDefinition::edit`].
pub struct DefinitionGuard<'a> {
    definition: &'a mut MaterialDefinition,
    initial_signature: u64,
}

impl Deref for DefinitionGuard<'_> {
    type Target = MaterialDefinition;
    fn deref(&self) -> &Self::Target {
        self.definition
    }
}

impl DerefMut for DefinitionGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.definition
    }
}

impl Drop for DefinitionGuard<'_> {
    fn drop(&mut self) {
        if self.definition.compile_signature() != self.initial_signature {
            self.definition.state_id = Uuid::new_v4();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dynamic_default_edit_keeps_identity() {
        let mut def = MaterialDefinition::new("Skin", MaterialDomain::Surface)
            .with_parameter("scatterRadius", 1.2_f32)
            .with_parameter("useTwoSided", false);
        let before = def.state_id();

        def.edit().declare_parameter("scatterRadius", ParameterValue::Scalar(2.0));
        assert_eq!(def.state_id(), before);

        def.edit().declare_parameter("useTwoSided", ParameterValue::StaticSwitch(true));
        assert_ne!(def.state_id(), before);
    }

    #[test]
    fn property_edit_regenerates_identity() {
        let mut def = MaterialDefinition::new("Glass", MaterialDomain::Surface);
        let before = def.state_id();
        {
            let mut guard = def.edit();
            let props = MaterialProperties {
                blend_mode: BlendMode::Translucent,
                ..*guard.properties()
            };
            guard.set_properties(props);
        }
        assert_ne!(def.state_id(), before);
    }

    #[test]
    fn overrides_apply_on_top() {
        let base = MaterialProperties::default();
        let overrides = BasePropertyOverrides {
            two_sided: Some(true),
            ..Default::default()
        };
        let merged = base.with_overrides(&overrides);
        assert!(merged.two_sided);
        assert_eq!(merged.blend_mode, base.blend_mode);
    }
}
