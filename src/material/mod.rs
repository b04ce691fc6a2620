//! Material Graph
//!
//! Definitions, instances, the registry that owns them, and the read-only
//! resolver that walks their inheritance chains.

pub mod defaults;
pub mod definition;
pub mod instance;
pub mod persist;
pub mod registry;
pub mod resolver;

pub use defaults::DefaultMaterials;
pub use definition::{
    BlendMode, DOMAIN_COUNT, DefinitionGuard, MaterialDefinition, MaterialDomain,
    MaterialProperties, ParameterDeclaration, ShadingModel,
};
pub use instance::{BasePropertyOverrides, InstanceKind, MaterialInstance};
pub use persist::{PackagedPlatform, PackagedProgram, SerializedInstance, SerializedParameter};
pub use registry::{MaterialAsset, MaterialHandle, MaterialRegistry};
pub use resolver::{Chain, InstanceResolver, StaticResolution};
