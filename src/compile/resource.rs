//! One cell of a permutation matrix.

use crate::compile::compiler::{CompileRequest, ProgramHandle, ShaderCompiler};
use crate::params::TextureRef;
use crate::tiers::{ShaderPlatform, TierPair};

/// Compile status of a [`CompiledResource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompileState {
    /// Allocated, never compiled (or released).
    Idle,
    /// Compile started; the program is not usable yet.
    Pending(ProgramHandle),
    Ready(ProgramHandle),
    Failed,
}

/// A compiled program for one (quality, capability) pair plus the metadata
/// needed to decide whether it is still current.
#[derive(Debug, Clone)]
pub struct CompiledResource {
    tiers: TierPair,
    platform: ShaderPlatform,
    state: CompileState,
    permutation_key: u64,
    has_static_permutation: bool,
    errors: Vec<String>,
    referenced_textures: Vec<TextureRef>,
}

impl CompiledResource {
    #[must_use]
    pub fn new(tiers: TierPair, platform: ShaderPlatform) -> Self {
        Self {
            tiers,
            platform,
            state: CompileState::Idle,
            permutation_key: 0,
            has_static_permutation: false,
            errors: Vec::new(),
            referenced_textures: Vec::new(),
        }
    }

    /// Wraps a program loaded from packaged data.
    #[must_use]
    pub fn from_program(
        tiers: TierPair,
        platform: ShaderPlatform,
        program: ProgramHandle,
        permutation_key: u64,
    ) -> Self {
        Self {
            state: CompileState::Ready(program),
            permutation_key,
            ..Self::new(tiers, platform)
        }
    }

    #[inline]
    #[must_use]
    pub fn tiers(&self) -> TierPair {
        self.tiers
    }

    #[inline]
    #[must_use]
    pub fn platform(&self) -> ShaderPlatform {
        self.platform
    }

    #[inline]
    #[must_use]
    pub fn state(&self) -> CompileState {
        self.state
    }

    #[inline]
    #[must_use]
    pub fn permutation_key(&self) -> u64 {
        self.permutation_key
    }

    #[inline]
    #[must_use]
    pub fn has_static_permutation(&self) -> bool {
        self.has_static_permutation
    }

    /// Program usable for drawing.
    #[must_use]
    pub fn program(&self) -> Option<ProgramHandle> {
        match self.state {
            CompileState::Ready(program) => Some(program),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        matches!(self.state, CompileState::Pending(_))
    }

    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.state == CompileState::Failed
    }

    #[must_use]
    pub fn compile_errors(&self) -> &[String] {
        &self.errors
    }

    #[must_use]
    pub fn referenced_textures(&self) -> &[TextureRef] {
        &self.referenced_textures
    }

    /// True if this cell already holds (or is building) the given content.
    #[must_use]
    pub fn is_current(&self, permutation_key: u64) -> bool {
        self.state != CompileState::Idle && self.permutation_key == permutation_key
    }

    /// Starts a compile, replacing whatever the cell held.
    pub fn compile(
        &mut self,
        compiler: &dyn ShaderCompiler,
        request: &CompileRequest<'_>,
        has_static_permutation: bool,
        referenced_textures: &[TextureRef],
    ) -> Result<(), Vec<String>> {
        self.release(compiler);
        self.permutation_key = request.permutation_key;
        self.has_static_permutation = has_static_permutation;
        self.platform = request.platform;
        self.referenced_textures = referenced_textures.to_vec();

        match compiler.compile(request) {
            Ok(program) => {
                self.state = if compiler.is_compilation_finished(program) {
                    CompileState::Ready(program)
                } else {
                    CompileState::Pending(program)
                };
                Ok(())
            }
            Err(errors) => {
                self.state = CompileState::Failed;
                self.errors.clone_from(&errors);
                Err(errors)
            }
        }
    }

    /// Promotes a pending program once the compiler reports it finished.
    pub fn poll(&mut self, compiler: &dyn ShaderCompiler) -> bool {
        if let CompileState::Pending(program) = self.state
            && compiler.is_compilation_finished(program)
        {
            self.state = CompileState::Ready(program);
            return true;
        }
        false
    }

    /// Drops the program, cancelling it if still compiling.
    pub fn release(&mut self, compiler: &dyn ShaderCompiler) {
        if let CompileState::Pending(program) = self.state {
            compiler.cancel(program);
        }
        self.state = CompileState::Idle;
        self.errors.clear();
        self.referenced_textures.clear();
    }
}
