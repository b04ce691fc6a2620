//! Shader Permutation Compilation
//!
//! - [`compiler`]: collaborator traits for the shader compiler and textures
//! - [`resource`]: one compiled cell and its status
//! - [`permutation`]: the per-material `[quality][capability]` matrix

pub mod compiler;
pub mod permutation;
pub mod resource;

pub use compiler::{CompileRequest, GpuTextureHandle, ProgramHandle, ShaderCompiler, TextureResolver};
pub use permutation::{
    CacheReport, PermutationContext, PermutationMatrix, PermutationSlot, ProgramTable,
};
pub use resource::{CompileState, CompiledResource};
