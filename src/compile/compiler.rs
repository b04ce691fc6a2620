//! Compiler and texture collaborators.
//!
//! Shader compilation and GPU resource creation live outside this crate.
//! They are reached through the two traits below; tests use the
//! implementations in [`crate::testing`].

use uuid::Uuid;

use crate::material::MaterialProperties;
use crate::params::{StaticParameterSet, TextureRef};
use crate::tiers::{ShaderPlatform, TierPair};

/// Opaque handle of a compiled (or compiling) GPU program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgramHandle(pub u64);

/// Opaque handle of a GPU texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GpuTextureHandle(pub u64);

/// Everything the compiler needs to build one permutation.
#[derive(Debug, Clone, Copy)]
pub struct CompileRequest<'a> {
    pub material: &'a str,
    /// Identity of the base material's node graph.
    pub shader_graph: Uuid,
    pub tiers: TierPair,
    pub platform: ShaderPlatform,
    pub static_parameters: &'a StaticParameterSet,
    pub properties: &'a MaterialProperties,
    /// Content key of (graph, static parameters, properties).
    pub permutation_key: u64,
}

/// Shader compiler interface.
///
/// `compile` may finish synchronously or hand back a program that is still
/// building; `is_compilation_finished` is polled until it reports true.
pub trait ShaderCompiler: Send + Sync {
    /// Starts a compile. Synchronous failures return the compiler's messages.
    fn compile(&self, request: &CompileRequest<'_>) -> Result<ProgramHandle, Vec<String>>;

    fn is_compilation_finished(&self, program: ProgramHandle) -> bool;

    /// Cancels an in-flight compile. Must be a no-op for finished programs.
    fn cancel(&self, program: ProgramHandle);

    /// Serialized program bytes for packaging.
    fn export_program(&self, _program: ProgramHandle) -> Option<Vec<u8>> {
        None
    }

    /// Recreates a program from packaged bytes.
    fn import_program(&self, tiers: TierPair, _bytes: &[u8]) -> Result<ProgramHandle, Vec<String>> {
        Err(vec![format!("compiler cannot load packaged programs ({tiers})")])
    }
}

/// Maps texture asset references to GPU handles.
pub trait TextureResolver: Send + Sync {
    fn resolve(&self, texture: TextureRef) -> Option<GpuTextureHandle>;
}
