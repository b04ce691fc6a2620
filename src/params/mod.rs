//! Material Parameters
//!
//! - [`value`]: the [`ParameterValue`] tagged union and its kinds
//! - [`overrides`]: per-instance override tables
//! - [`expression`]: uniform expressions and their render-side cache

pub mod expression;
pub mod overrides;
pub mod value;

pub use expression::{
    ExpressionList, ExpressionValueCache, NamedExpression, UniformExpression, UniformSource,
};
pub use overrides::{ParameterOverride, ParameterOverrideTable, StaticParameterSet};
pub use value::{ComponentMask, FontRef, ParameterKind, ParameterValue, TextureRef};
