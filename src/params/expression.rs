//! Uniform Expressions
//!
//! A material graph reduces to a handful of uniform expressions: small trees
//! over parameter reads that are evaluated once per change rather than per
//! pixel. The render proxy keeps their results in an [`ExpressionValueCache`]
//! and recomputes them lazily after an invalidation.

use std::sync::Arc;

use glam::Vec4;
use smallvec::SmallVec;

use crate::interner::Symbol;

/// Read access to parameter values for expression evaluation.
pub trait UniformSource {
    fn scalar(&self, name: Symbol) -> Option<f32>;
    fn vector(&self, name: Symbol) -> Option<Vec4>;
}

/// Expression tree evaluated to a `Vec4`. Scalars broadcast to all lanes.
#[derive(Debug, Clone, PartialEq)]
pub enum UniformExpression {
    Constant(Vec4),
    ScalarParameter { name: Symbol, default: f32 },
    VectorParameter { name: Symbol, default: Vec4 },
    Add(Box<UniformExpression>, Box<UniformExpression>),
    Multiply(Box<UniformExpression>, Box<UniformExpression>),
    Saturate(Box<UniformExpression>),
}

impl UniformExpression {
    #[must_use]
    pub fn scalar(name: Symbol, default: f32) -> Self {
        Self::ScalarParameter { name, default }
    }

    #[must_use]
    pub fn vector(name: Symbol, default: Vec4) -> Self {
        Self::VectorParameter { name, default }
    }

    #[must_use]
    pub fn add(a: Self, b: Self) -> Self {
        Self::Add(Box::new(a), Box::new(b))
    }

    #[must_use]
    pub fn multiply(a: Self, b: Self) -> Self {
        Self::Multiply(Box::new(a), Box::new(b))
    }

    #[must_use]
    pub fn saturate(a: Self) -> Self {
        Self::Saturate(Box::new(a))
    }

    pub fn evaluate(&self, source: &dyn UniformSource) -> Vec4 {
        match self {
            Self::Constant(v) => *v,
            Self::ScalarParameter { name, default } => {
                Vec4::splat(source.scalar(*name).unwrap_or(*default))
            }
            Self::VectorParameter { name, default } => source.vector(*name).unwrap_or(*default),
            Self::Add(a, b) => a.evaluate(source) + b.evaluate(source),
            Self::Multiply(a, b) => a.evaluate(source) * b.evaluate(source),
            Self::Saturate(a) => a.evaluate(source).clamp(Vec4::ZERO, Vec4::ONE),
        }
    }

    /// Parameter names read by this expression.
    #[must_use]
    pub fn parameters(&self) -> SmallVec<[Symbol; 4]> {
        let mut out = SmallVec::new();
        self.collect_parameters(&mut out);
        out
    }

    fn collect_parameters(&self, out: &mut SmallVec<[Symbol; 4]>) {
        match self {
            Self::Constant(_) => {}
            Self::ScalarParameter { name, .. } | Self::VectorParameter { name, .. } => {
                if !out.contains(name) {
                    out.push(*name);
                }
            }
            Self::Add(a, b) | Self::Multiply(a, b) => {
                a.collect_parameters(out);
                b.collect_parameters(out);
            }
            Self::Saturate(a) => a.collect_parameters(out),
        }
    }
}

/// A uniform expression bound to the output slot it writes.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedExpression {
    pub output: Symbol,
    pub expression: UniformExpression,
}

/// Shared, immutable expression list of a base material.
pub type ExpressionList = Arc<[NamedExpression]>;

/// Cached results of a proxy's uniform expressions.
///
/// Invalidation is coarse: any parameter change anywhere in the proxy's
/// ancestry marks the whole cache stale.
#[derive(Debug, Default)]
pub struct ExpressionValueCache {
    values: Vec<Vec4>,
    valid: bool,
    evaluations: u64,
}

impl ExpressionValueCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    #[inline]
    pub fn invalidate(&mut self) {
        self.valid = false;
    }

    /// Number of full recomputations performed so far.
    #[inline]
    #[must_use]
    pub fn evaluations(&self) -> u64 {
        self.evaluations
    }

    /// Recomputes every expression if the cache is stale.
    pub fn ensure_valid(&mut self, expressions: &[NamedExpression], source: &dyn UniformSource) {
        if self.valid && self.values.len() == expressions.len() {
            return;
        }
        self.values.clear();
        self.values
            .extend(expressions.iter().map(|e| e.expression.evaluate(source)));
        self.valid = true;
        self.evaluations += 1;
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<Vec4> {
        if self.valid {
            self.values.get(index).copied()
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interner::intern;
    use rustc_hash::FxHashMap;

    #[derive(Default)]
    struct MapSource {
        scalars: FxHashMap<Symbol, f32>,
    }

    impl UniformSource for MapSource {
        fn scalar(&self, name: Symbol) -> Option<f32> {
            self.scalars.get(&name).copied()
        }

        fn vector(&self, _name: Symbol) -> Option<Vec4> {
            None
        }
    }

    #[test]
    fn evaluates_with_defaults() {
        let radius = intern("expr_radius");
        let expr = UniformExpression::multiply(
            UniformExpression::scalar(radius, 2.0),
            UniformExpression::Constant(Vec4::splat(0.5)),
        );
        let mut source = MapSource::default();
        assert_eq!(expr.evaluate(&source), Vec4::splat(1.0));

        source.scalars.insert(radius, 6.0);
        assert_eq!(expr.evaluate(&source), Vec4::splat(3.0));
        assert_eq!(expr.parameters().as_slice(), &[radius]);
    }

    #[test]
    fn cache_recomputes_only_when_invalid() {
        let out = intern("expr_out");
        let input = intern("expr_in");
        let exprs = vec![NamedExpression {
            output: out,
            expression: UniformExpression::saturate(UniformExpression::scalar(input, 4.0)),
        }];
        let source = MapSource::default();

        let mut cache = ExpressionValueCache::new();
        assert!(cache.get(0).is_none());

        cache.ensure_valid(&exprs, &source);
        cache.ensure_valid(&exprs, &source);
        assert_eq!(cache.evaluations(), 1);
        assert_eq!(cache.get(0), Some(Vec4::ONE));

        cache.invalidate();
        assert!(cache.get(0).is_none());
        cache.ensure_valid(&exprs, &source);
        assert_eq!(cache.evaluations(), 2);
    }
}
