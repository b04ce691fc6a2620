//! Parameter Name Interner
//!
//! Parameter names are compared and hashed on every lookup along an
//! inheritance chain and on every render-context read. Interning turns them
//! into integer [`Symbol`]s so those comparisons are O(1).

use std::sync::LazyLock;

use lasso::{Spur, ThreadedRodeo};

/// Global interner instance
static INTERNER: LazyLock<ThreadedRodeo> = LazyLock::new(ThreadedRodeo::new);

/// Compact integer identifier for an interned parameter name.
pub type Symbol = Spur;

/// Reserved scalar parameter answered by render proxies with the encoded
/// subsurface profile slot.
pub const SUBSURFACE_PROFILE_PARAMETER: &str = "__SubsurfaceProfile";

/// Interns a string, returning its Symbol.
#[inline]
pub fn intern(s: &str) -> Symbol {
    INTERNER.get_or_intern(s)
}

/// Looks up an already interned string without allocating.
#[inline]
pub fn get(s: &str) -> Option<Symbol> {
    INTERNER.get(s)
}

/// Resolves a Symbol back to its string.
#[inline]
pub fn resolve(sym: Symbol) -> &'static str {
    INTERNER.resolve(&sym)
}

/// Pre-interns names that are looked up on hot paths.
pub fn preload_common_parameters() {
    let common = [
        SUBSURFACE_PROFILE_PARAMETER,
        "BaseColor",
        "Roughness",
        "Metallic",
        "Opacity",
        "EmissiveColor",
        "Normal",
    ];

    for name in common {
        intern(name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intern_is_stable() {
        let a = intern("scatterRadius");
        let b = intern("scatterRadius");
        let c = intern("useTwoSided");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(resolve(a), "scatterRadius");
    }

    #[test]
    fn get_does_not_intern() {
        assert!(get("never_interned_parameter_name").is_none());
        preload_common_parameters();
        assert!(get(SUBSURFACE_PROFILE_PARAMETER).is_some());
    }
}
