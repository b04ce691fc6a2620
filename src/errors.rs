//! Error Types
//!
//! This module defines the error types used throughout the material cache.
//!
//! # Overview
//!
//! The main error type [`MaterialError`] covers all failure modes including:
//! - Inheritance-graph violations (cycles, invalid parents)
//! - Shader compilation failures
//! - Default material context lifecycle errors
//! - Profile atlas exhaustion
//! - Persistence errors
//!
//! Reading a parameter that is declared nowhere in a chain is **not** an
//! error: resolution yields `Ok(None)` and editor-facing accessors substitute the
//! declared default or a zeroed value.
//!
//! # Usage
//!
//! All public APIs return [`Result<T>`] which is an alias for `std::result::Result<T, MaterialError>`.
//!
//! ```rust,ignore
//! use myth_material::errors::{MaterialError, Result};
//!
//! fn reparent() -> Result<()> {
//!     // Operations that may fail return Result
//!     Ok(())
//! }
//! ```

use thiserror::Error;

use crate::material::MaterialDomain;
use crate::params::ParameterKind;
use crate::tiers::TierPair;

/// The main error type for the material cache.
#[derive(Error, Debug)]
pub enum MaterialError {
    // ========================================================================
    // Inheritance Errors
    // ========================================================================
    /// A material appears twice in its own ancestry.
    #[error("Cyclic inheritance detected at '{material}' while resolving '{parameter}'")]
    CyclicInheritance {
        /// Name of the material where the walk revisited a node
        material: String,
        /// Parameter being resolved, or `<parent>` for a parent assignment
        parameter: String,
    },

    /// The requested parent cannot be used; the previous parent is retained.
    #[error("'{parent}' is not a valid parent: {reason}")]
    InvalidParentType {
        /// Name of the rejected parent
        parent: String,
        /// Why it was rejected
        reason: &'static str,
    },

    /// A handle refers to a material, proxy or profile that no longer exists.
    #[error("Invalid handle: {0}")]
    InvalidHandle(String),

    /// A value of the wrong kind was written to a declared parameter.
    #[error("Parameter '{parameter}' expects {expected:?}, got {found:?}")]
    ParameterKindMismatch {
        /// Parameter name
        parameter: String,
        /// Declared kind
        expected: ParameterKind,
        /// Kind that was supplied
        found: ParameterKind,
    },

    /// A material cannot be destroyed while other materials inherit from it.
    #[error("'{material}' still has {children} child material(s)")]
    MaterialInUse {
        /// Name of the material
        material: String,
        /// Number of direct children
        children: usize,
    },

    /// Static overrides must name a parameter the root definition declares.
    #[error("Static parameter '{0}' is not declared by the root definition")]
    UnknownStaticParameter(String),

    /// Dynamic instances cannot carry compile-time overrides.
    #[error("Static parameter '{0}' cannot be overridden on a dynamic instance")]
    StaticParameterOnDynamicInstance(String),

    // ========================================================================
    // Compilation Errors
    // ========================================================================
    /// A permutation failed to compile. Recoverable: the domain default renders instead.
    #[error("Failed to compile '{material}' for {tiers}: {} error(s)", errors.len())]
    CompileFailure {
        /// Owner name
        material: String,
        /// Tier pair that failed
        tiers: TierPair,
        /// Human-readable compiler output
        errors: Vec<String>,
    },

    /// The fallback material of a domain failed to compile. Nothing further to fall back to.
    #[error("Failed to compile the default {domain:?} material: {}", errors.join("; "))]
    DefaultMaterialCompileFailed {
        /// Domain whose fallback failed
        domain: MaterialDomain,
        /// Compiler output
        errors: Vec<String>,
    },

    // ========================================================================
    // Default Material Context
    // ========================================================================
    /// The default material context was used before `initialize`.
    #[error("Default materials have not been initialized")]
    DefaultsNotInitialized,

    /// `initialize` was called twice without a teardown in between.
    #[error("Default materials are already initialized")]
    DefaultsAlreadyInitialized,

    /// Registered defaults live until `teardown`.
    #[error("'{0}' is a registered default material")]
    DefaultMaterialInUse(String),

    // ========================================================================
    // Profile Atlas
    // ========================================================================
    /// No free slot is left in the subsurface profile atlas.
    #[error("Subsurface profile atlas is full (capacity {capacity})")]
    AtlasFull {
        /// Maximum number of rows
        capacity: usize,
    },

    // ========================================================================
    // Persistence
    // ========================================================================
    /// A restored record carries the asset id of a live material.
    #[error("Asset {asset_id} is already registered as '{material}'")]
    AssetAlreadyRegistered {
        /// Persistent id from the record
        asset_id: uuid::Uuid,
        /// Name of the live material
        material: String,
    },

    /// JSON encoding or decoding failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Alias for `Result<T, MaterialError>`.
pub type Result<T> = std::result::Result<T, MaterialError>;
