//! Commands published from the mutation context to the render context.

use std::sync::Arc;

use glam::Vec4;

use crate::atlas::{AtlasTexture, SlotIndex};
use crate::compile::{GpuTextureHandle, ProgramTable};
use crate::interner::Symbol;
use crate::material::{DOMAIN_COUNT, MaterialDomain, MaterialHandle};
use crate::params::ExpressionList;

pub const SELECTION_STATE_COUNT: usize = 3;

/// Editor highlight state. Each material has one proxy per state; parameter
/// updates are applied to all of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SelectionState {
    #[default]
    Unselected,
    Selected,
    Hovered,
}

impl SelectionState {
    pub const ALL: [SelectionState; SELECTION_STATE_COUNT] =
        [Self::Unselected, Self::Selected, Self::Hovered];

    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self as usize
    }
}

/// Locally held runtime values of a proxy.
#[derive(Debug, Clone, Default)]
pub struct ProxyValues {
    pub scalars: Vec<(Symbol, f32)>,
    pub vectors: Vec<(Symbol, Vec4)>,
    pub textures: Vec<(Symbol, GpuTextureHandle)>,
}

/// Everything needed to create the proxies of one material.
#[derive(Debug, Clone)]
pub struct ProxyInit {
    pub material: MaterialHandle,
    pub name: String,
    pub domain: MaterialDomain,
    pub parent: Option<MaterialHandle>,
    pub expressions: ExpressionList,
    pub owns_permutations: bool,
    pub programs: ProgramTable,
    pub subsurface_slot: SlotIndex,
    pub values: ProxyValues,
}

#[derive(Debug, Clone)]
pub enum RenderCommand {
    CreateProxy(Box<ProxyInit>),
    /// New parent. Also carries the root's domain and expressions, which may
    /// change with it.
    SetParent {
        material: MaterialHandle,
        parent: Option<MaterialHandle>,
        domain: MaterialDomain,
        expressions: ExpressionList,
    },
    SetScalar {
        material: MaterialHandle,
        name: Symbol,
        value: f32,
    },
    SetVector {
        material: MaterialHandle,
        name: Symbol,
        value: Vec4,
    },
    /// `None` removes the local binding so lookups fall through to the parent.
    SetTexture {
        material: MaterialHandle,
        name: Symbol,
        texture: Option<GpuTextureHandle>,
    },
    RemoveParameter {
        material: MaterialHandle,
        name: Symbol,
    },
    ClearParameters {
        material: MaterialHandle,
    },
    InvalidateExpressions {
        material: MaterialHandle,
    },
    SetPermutations {
        material: MaterialHandle,
        owns_permutations: bool,
        programs: ProgramTable,
    },
    SetSubsurfaceSlot {
        material: MaterialHandle,
        slot: SlotIndex,
    },
    SetDefaultMaterials {
        table: [Option<MaterialHandle>; DOMAIN_COUNT],
    },
    UpdateProfileAtlas(Arc<AtlasTexture>),
    Destroy {
        material: MaterialHandle,
    },
}

impl RenderCommand {
    /// Material the command targets, if any.
    #[must_use]
    pub fn material(&self) -> Option<MaterialHandle> {
        match self {
            Self::CreateProxy(init) => Some(init.material),
            Self::SetParent { material, .. }
            | Self::SetScalar { material, .. }
            | Self::SetVector { material, .. }
            | Self::SetTexture { material, .. }
            | Self::RemoveParameter { material, .. }
            | Self::ClearParameters { material }
            | Self::InvalidateExpressions { material }
            | Self::SetPermutations { material, .. }
            | Self::SetSubsurfaceSlot { material, .. }
            | Self::Destroy { material } => Some(*material),
            Self::SetDefaultMaterials { .. } | Self::UpdateProfileAtlas(_) => None,
        }
    }
}
