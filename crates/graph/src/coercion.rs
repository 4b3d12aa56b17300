//! Closed-set type coercion for ingested noun/verb tags (spec §4.9).
//!
//! The write path never rejects an unrecognized tag outright: when type
//! validation is enforced, an unknown tag is coerced to the default tag
//! and a warning is produced for the caller to surface (spec §7: "Type
//! coercion for unknown noun/verb tags: succeeds with a warning in the
//! return, not an error"). When enforcement is disabled, the raw tag is
//! preserved verbatim via [`vg_core::NounType::Other`] /
//! [`vg_core::VerbType::Other`] instead.

use vg_core::{NounType, VerbType};

/// Which closed sets (spec §3) the graph store enforces on the write
/// path. Corresponds to the `typeValidation` config option (spec §6).
#[derive(Debug, Clone, Copy)]
pub struct TypeValidation {
    /// Enforce the noun-type closed set (coerce unknown tags).
    pub enforce_noun_types: bool,
    /// Enforce the verb-type closed set (coerce unknown tags).
    pub enforce_verb_types: bool,
}

impl Default for TypeValidation {
    fn default() -> Self {
        TypeValidation { enforce_noun_types: true, enforce_verb_types: true }
    }
}

/// Resolve a raw noun-type tag, coercing and warning if enforcement is on
/// and the tag is unrecognized.
pub fn coerce_noun_type(tag: &str, validation: TypeValidation) -> (NounType, Option<String>) {
    match NounType::parse_known(tag) {
        Some(known) => (known, None),
        None if validation.enforce_noun_types => {
            let warning = format!("unrecognized noun type '{tag}', coerced to '{}'", NounType::default());
            tracing::warn!(tag, "{}", warning);
            (NounType::default(), Some(warning))
        }
        None => (NounType::Other(tag.to_string()), None),
    }
}

/// Resolve a raw verb-type tag, mirroring [`coerce_noun_type`].
pub fn coerce_verb_type(tag: &str, validation: TypeValidation) -> (VerbType, Option<String>) {
    match VerbType::parse_known(tag) {
        Some(known) => (known, None),
        None if validation.enforce_verb_types => {
            let warning = format!("unrecognized verb type '{tag}', coerced to '{}'", VerbType::default());
            tracing::warn!(tag, "{}", warning);
            (VerbType::default(), Some(warning))
        }
        None => (VerbType::Other(tag.to_string()), None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_tag_parses_without_warning() {
        let (t, warning) = coerce_noun_type("Person", TypeValidation::default());
        assert_eq!(t, NounType::Person);
        assert!(warning.is_none());
    }

    #[test]
    fn unknown_tag_coerces_to_default_when_enforced() {
        let (t, warning) = coerce_noun_type("Spaceship", TypeValidation::default());
        assert_eq!(t, NounType::Thing);
        assert!(warning.is_some());
    }

    #[test]
    fn unknown_tag_preserved_when_enforcement_disabled() {
        let validation = TypeValidation { enforce_noun_types: false, enforce_verb_types: false };
        let (t, warning) = coerce_noun_type("Spaceship", validation);
        assert_eq!(t, NounType::Other("Spaceship".to_string()));
        assert!(warning.is_none());
    }

    #[test]
    fn unknown_verb_tag_coerces_to_related_to() {
        let (t, warning) = coerce_verb_type("Despises", TypeValidation::default());
        assert_eq!(t, VerbType::RelatedTo);
        assert!(warning.is_some());
    }
}
