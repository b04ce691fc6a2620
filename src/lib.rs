//! Myth Material Cache
//!
//! Keeps per-material matrices of compiled shader permutations, resolves
//! parameter values through chains of inheriting material instances, and
//! publishes the resolved values to the render context through a batched
//! command queue.
//!
//! # Contexts
//!
//! Two execution contexts cooperate:
//!
//! - The **mutation context** owns a [`MaterialSystem`]. All edits, parameter
//!   resolution and compile requests happen here.
//! - The **render context** owns a [`RenderScene`]. It drains command batches
//!   at its own cadence and answers parameter lookups through [`RenderProxy`]
//!   objects, falling back along the parent chain to the per-domain default.
//!
//! ```rust,ignore
//! use myth_material::{MaterialSystem, MaterialCacheSettings};
//!
//! let (mut system, mut scene) = MaterialSystem::new(MaterialCacheSettings::default(), compiler, textures);
//! system.initialize_defaults(defaults)?;
//! // ... edit on this thread, move `scene` to the render thread ...
//! scene.process_commands();
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod atlas;
pub mod compile;
pub mod errors;
pub mod interner;
pub mod material;
pub mod params;
pub mod render;
pub mod settings;
pub mod system;
pub mod testing;
pub mod tiers;

pub use atlas::{AtlasTexture, ProfileAtlas, ProfileHandle, SlotIndex, SubsurfaceProfileSettings};
pub use compile::{
    CompileRequest, CompileState, CompiledResource, GpuTextureHandle, PermutationMatrix,
    ProgramHandle, ShaderCompiler, TextureResolver,
};
pub use errors::{MaterialError, Result};
pub use interner::Symbol;
pub use material::{
    BasePropertyOverrides, BlendMode, DefaultMaterials, InstanceKind, MaterialAsset,
    MaterialDefinition, MaterialDomain, MaterialHandle, MaterialInstance, MaterialRegistry,
    ParameterDeclaration, ShadingModel,
};
pub use params::{
    ComponentMask, ExpressionValueCache, FontRef, ParameterKind, ParameterOverrideTable,
    ParameterValue, StaticParameterSet, TextureRef, UniformExpression,
};
pub use render::{PublishQueue, RenderProxy, RenderScene, SelectionState};
pub use settings::MaterialCacheSettings;
pub use system::MaterialSystem;
pub use tiers::{CapabilityTier, CapabilityTierMask, QualityTier, ShaderPlatform, TierPair};
