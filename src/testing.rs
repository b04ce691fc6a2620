//! In-memory collaborators for tests and tools.
//!
//! [`MockShaderCompiler`] hands out sequential program handles and can be
//! told to fail specific materials or to leave compiles pending until
//! [`MockShaderCompiler::finish_all`]. [`MapTextureResolver`] maps texture
//! references through a plain table.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::compile::{CompileRequest, GpuTextureHandle, ProgramHandle, ShaderCompiler, TextureResolver};
use crate::params::TextureRef;
use crate::tiers::TierPair;

/// A compile the mock received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileRecord {
    pub material: String,
    pub tiers: TierPair,
    pub permutation_key: u64,
    pub program: Option<ProgramHandle>,
}

#[derive(Debug, Default)]
pub struct MockShaderCompiler {
    next_program: AtomicU64,
    deferred: AtomicBool,
    pending: Mutex<FxHashSet<ProgramHandle>>,
    cancelled: Mutex<Vec<ProgramHandle>>,
    failing: RwLock<FxHashSet<String>>,
    log: Mutex<Vec<CompileRecord>>,
}

impl MockShaderCompiler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// When set, compiles stay pending until [`finish_all`](Self::finish_all).
    pub fn set_async(&self, deferred: bool) {
        self.deferred.store(deferred, Ordering::Relaxed);
    }

    /// Every compile of a material with this name fails.
    pub fn fail_material(&self, name: &str) {
        self.failing.write().insert(name.to_string());
    }

    pub fn clear_failures(&self) {
        self.failing.write().clear();
    }

    /// Completes every pending compile.
    pub fn finish_all(&self) {
        self.pending.lock().clear();
    }

    #[must_use]
    pub fn compile_count(&self) -> usize {
        self.log.lock().len()
    }

    /// Compiles requested for one material.
    #[must_use]
    pub fn compiles_for(&self, material: &str) -> Vec<CompileRecord> {
        self.log
            .lock()
            .iter()
            .filter(|r| r.material == material)
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn cancelled_count(&self) -> usize {
        self.cancelled.lock().len()
    }

    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    fn allocate(&self) -> ProgramHandle {
        ProgramHandle(self.next_program.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

impl ShaderCompiler for MockShaderCompiler {
    fn compile(&self, request: &CompileRequest<'_>) -> Result<ProgramHandle, Vec<String>> {
        let failed = self.failing.read().contains(request.material);
        let program = (!failed).then(|| self.allocate());

        self.log.lock().push(CompileRecord {
            material: request.material.to_string(),
            tiers: request.tiers,
            permutation_key: request.permutation_key,
            program,
        });

        match program {
            Some(program) => {
                if self.deferred.load(Ordering::Relaxed) {
                    self.pending.lock().insert(program);
                }
                Ok(program)
            }
            None => Err(vec![
                format!("{}: error X3004: undeclared identifier", request.material),
                format!("{}: compilation aborted for {}", request.material, request.tiers),
            ]),
        }
    }

    fn is_compilation_finished(&self, program: ProgramHandle) -> bool {
        !self.pending.lock().contains(&program)
    }

    fn cancel(&self, program: ProgramHandle) {
        if self.pending.lock().remove(&program) {
            self.cancelled.lock().push(program);
        }
    }

    fn export_program(&self, program: ProgramHandle) -> Option<Vec<u8>> {
        Some(program.0.to_le_bytes().to_vec())
    }

    fn import_program(&self, tiers: TierPair, bytes: &[u8]) -> Result<ProgramHandle, Vec<String>> {
        if bytes.len() != 8 {
            return Err(vec![format!("corrupt program for {tiers}")]);
        }
        Ok(self.allocate())
    }
}

#[derive(Debug, Default)]
pub struct MapTextureResolver {
    textures: RwLock<FxHashMap<TextureRef, GpuTextureHandle>>,
}

impl MapTextureResolver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, texture: TextureRef, handle: GpuTextureHandle) {
        self.textures.write().insert(texture, handle);
    }
}

impl TextureResolver for MapTextureResolver {
    fn resolve(&self, texture: TextureRef) -> Option<GpuTextureHandle> {
        self.textures.read().get(&texture).copied()
    }
}
