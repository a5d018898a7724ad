//! Target environments and feature gating.
//!
//! Lowering is driven by a bitset of features the configured target does
//! *not* support. A clear bit means the construct passes through unchanged;
//! a set bit means the transform rewrites it (or reports an error for the
//! few features that cannot be rewritten).

use bitflags::bitflags;

/// ECMAScript target version for the emitted output.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Target {
    Es2015 = 0,
    Es2016 = 1,
    Es2017 = 2,
    Es2018 = 3,
    Es2019 = 4,
    Es2020 = 5,
    Es2021 = 6,
    Es2022 = 7,
    Es2023 = 8,
    Es2024 = 9,
    #[default]
    EsNext = 99,
}

bitflags! {
    /// Language features that may need lowering, one bit each.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct CompatFeatures: u32 {
        const EXPONENT_OPERATOR        = 1 << 0;
        const ASYNC_AWAIT              = 1 << 1;
        const OBJECT_REST_SPREAD       = 1 << 2;
        const ASYNC_GENERATOR          = 1 << 3;
        const FOR_AWAIT                = 1 << 4;
        const OPTIONAL_CATCH_BINDING   = 1 << 5;
        const OPTIONAL_CHAIN           = 1 << 6;
        const NULLISH_COALESCING       = 1 << 7;
        const LOGICAL_ASSIGNMENT       = 1 << 8;
        const CLASS_FIELD              = 1 << 9;
        const CLASS_STATIC_FIELD       = 1 << 10;
        const CLASS_PRIVATE_FIELD      = 1 << 11;
        const CLASS_PRIVATE_METHOD     = 1 << 12;
        const CLASS_PRIVATE_ACCESSOR   = 1 << 13;
        const CLASS_PRIVATE_STATIC_FIELD = 1 << 14;
        const CLASS_PRIVATE_STATIC_METHOD = 1 << 15;
        const CLASS_PRIVATE_BRAND_CHECK = 1 << 16;
        const CLASS_STATIC_BLOCK       = 1 << 17;
        const TOP_LEVEL_AWAIT          = 1 << 18;
        const IMPORT_ATTRIBUTES        = 1 << 19;
        const USING                    = 1 << 20;
        const DECORATORS               = 1 << 21;
        const HASHBANG                 = 1 << 22;
        const REGEXP_MATCH_INDICES     = 1 << 23;
        /// Never set by a supported target; reachable through the explicit
        /// extra-unsupported escape hatch to force `__template` caching.
        const TEMPLATE_LITERAL         = 1 << 24;
    }
}

impl CompatFeatures {
    /// The set of features *unsupported* by `target`.
    #[must_use]
    pub fn unsupported_by(target: Target) -> CompatFeatures {
        let mut unsupported = CompatFeatures::empty();
        // Standard decorators and explicit resource management are not part
        // of any shipped ES edition yet; they always lower unless the target
        // is EsNext.
        if target < Target::EsNext {
            unsupported |= CompatFeatures::USING | CompatFeatures::DECORATORS;
        }
        if target < Target::Es2024 {
            unsupported |= CompatFeatures::REGEXP_MATCH_INDICES;
        }
        if target < Target::Es2022 {
            unsupported |= CompatFeatures::CLASS_FIELD
                | CompatFeatures::CLASS_STATIC_FIELD
                | CompatFeatures::CLASS_PRIVATE_FIELD
                | CompatFeatures::CLASS_PRIVATE_METHOD
                | CompatFeatures::CLASS_PRIVATE_ACCESSOR
                | CompatFeatures::CLASS_PRIVATE_STATIC_FIELD
                | CompatFeatures::CLASS_PRIVATE_STATIC_METHOD
                | CompatFeatures::CLASS_PRIVATE_BRAND_CHECK
                | CompatFeatures::CLASS_STATIC_BLOCK
                | CompatFeatures::TOP_LEVEL_AWAIT
                | CompatFeatures::IMPORT_ATTRIBUTES
                | CompatFeatures::HASHBANG;
        }
        if target < Target::Es2021 {
            unsupported |= CompatFeatures::LOGICAL_ASSIGNMENT;
        }
        if target < Target::Es2020 {
            unsupported |= CompatFeatures::OPTIONAL_CHAIN | CompatFeatures::NULLISH_COALESCING;
        }
        if target < Target::Es2019 {
            unsupported |= CompatFeatures::OPTIONAL_CATCH_BINDING;
        }
        if target < Target::Es2018 {
            unsupported |= CompatFeatures::OBJECT_REST_SPREAD
                | CompatFeatures::ASYNC_GENERATOR
                | CompatFeatures::FOR_AWAIT;
        }
        if target < Target::Es2017 {
            unsupported |= CompatFeatures::ASYNC_AWAIT;
        }
        if target < Target::Es2016 {
            unsupported |= CompatFeatures::EXPONENT_OPERATOR;
        }
        unsupported
    }

    #[inline]
    #[must_use]
    pub const fn has(self, feature: CompatFeatures) -> bool {
        self.contains(feature)
    }
}

impl Target {
    /// Human-readable name used in "not available in <target>" diagnostics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Target::Es2015 => "es2015",
            Target::Es2016 => "es2016",
            Target::Es2017 => "es2017",
            Target::Es2018 => "es2018",
            Target::Es2019 => "es2019",
            Target::Es2020 => "es2020",
            Target::Es2021 => "es2021",
            Target::Es2022 => "es2022",
            Target::Es2023 => "es2023",
            Target::Es2024 => "es2024",
            Target::EsNext => "esnext",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_esnext_supports_everything_shipped() {
        let unsupported = CompatFeatures::unsupported_by(Target::EsNext);
        assert!(!unsupported.has(CompatFeatures::ASYNC_AWAIT));
        assert!(!unsupported.has(CompatFeatures::OPTIONAL_CHAIN));
        assert!(!unsupported.has(CompatFeatures::USING));
    }

    #[test]
    fn test_es2016_needs_async_lowering() {
        let unsupported = CompatFeatures::unsupported_by(Target::Es2016);
        assert!(unsupported.has(CompatFeatures::ASYNC_AWAIT));
        assert!(!unsupported.has(CompatFeatures::EXPONENT_OPERATOR));
    }

    #[test]
    fn test_es2015_needs_exponent_lowering() {
        let unsupported = CompatFeatures::unsupported_by(Target::Es2015);
        assert!(unsupported.has(CompatFeatures::EXPONENT_OPERATOR));
    }

    #[test]
    fn test_es2020_private_fields_lower() {
        let unsupported = CompatFeatures::unsupported_by(Target::Es2020);
        assert!(unsupported.has(CompatFeatures::CLASS_PRIVATE_FIELD));
        assert!(!unsupported.has(CompatFeatures::OPTIONAL_CHAIN));
        assert!(!unsupported.has(CompatFeatures::NULLISH_COALESCING));
        assert!(unsupported.has(CompatFeatures::LOGICAL_ASSIGNMENT));
    }

    #[test]
    fn test_using_always_lowers_below_esnext() {
        assert!(CompatFeatures::unsupported_by(Target::Es2022).has(CompatFeatures::USING));
        assert!(CompatFeatures::unsupported_by(Target::Es2024).has(CompatFeatures::USING));
    }
}
