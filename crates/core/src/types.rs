//! Closed-set type tags for nouns and verbs (spec §3).
//!
//! Unknown tags encountered on the write path are coerced to the default
//! tag (`NounType::Thing` / `VerbType::RelatedTo`) rather than rejected; the
//! graph store (`vg-graph`) is responsible for recording a warning when
//! that happens. `Other` exists only to make that coercion lossless for the
//! *stored* copy — it is never constructed directly by public API.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed set of noun (entity) type tags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NounType {
    /// A human or other individual actor.
    Person,
    /// A physical or virtual location.
    Place,
    /// A physical or conceptual object.
    Thing,
    /// Something that happened at a point or span in time.
    Event,
    /// An abstract idea or topic.
    Concept,
    /// A piece of authored content (document, message, media).
    Content,
    /// A collection of other nouns treated as one unit.
    Group,
    /// An ordered collection.
    List,
    /// A classification bucket.
    Category,
    /// An unrecognized tag, preserved verbatim for round-trip fidelity.
    /// Never constructed directly; produced only by the coercion path.
    Other(String),
}

impl Default for NounType {
    /// The default tag unknown noun types are coerced to (spec §4.9).
    fn default() -> Self {
        NounType::Thing
    }
}

impl fmt::Display for NounType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.storage_tag())
    }
}

impl NounType {
    /// Parse a free-form tag, returning `None` if it is outside the closed
    /// set (callers then coerce to [`NounType::default`] and log a
    /// warning, per spec §4.9 — this function itself never coerces).
    pub fn parse_known(tag: &str) -> Option<Self> {
        Some(match tag {
            "Person" => NounType::Person,
            "Place" => NounType::Place,
            "Thing" => NounType::Thing,
            "Event" => NounType::Event,
            "Concept" => NounType::Concept,
            "Content" => NounType::Content,
            "Group" => NounType::Group,
            "List" => NounType::List,
            "Category" => NounType::Category,
            _ => return None,
        })
    }

    /// The storage key segment for this type (`nouns/{typeTag}/{id}`).
    pub fn storage_tag(&self) -> &str {
        match self {
            NounType::Person => "Person",
            NounType::Place => "Place",
            NounType::Thing => "Thing",
            NounType::Event => "Event",
            NounType::Concept => "Concept",
            NounType::Content => "Content",
            NounType::Group => "Group",
            NounType::List => "List",
            NounType::Category => "Category",
            NounType::Other(tag) => tag,
        }
    }
}

/// Closed set of verb (relationship) type tags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VerbType {
    /// Generic, untyped relation.
    RelatedTo,
    /// Source controls/owns target.
    Controls,
    /// Source contains target.
    Contains,
    /// Source is a member of target.
    MemberOf,
    /// Source collaborates with target.
    WorksWith,
    /// Source follows target.
    Follows,
    /// Source likes target.
    Likes,
    /// Source created target.
    Created,
    /// Source reports to target.
    ReportsTo,
    /// Source supervises target.
    Supervises,
    /// An unrecognized tag, preserved verbatim for round-trip fidelity.
    Other(String),
}

impl Default for VerbType {
    /// The default tag unknown verb types are coerced to (spec §4.9).
    fn default() -> Self {
        VerbType::RelatedTo
    }
}

impl fmt::Display for VerbType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.storage_tag())
    }
}

impl VerbType {
    /// Parse a free-form tag, returning `None` if outside the closed set.
    pub fn parse_known(tag: &str) -> Option<Self> {
        Some(match tag {
            "RelatedTo" => VerbType::RelatedTo,
            "Controls" => VerbType::Controls,
            "Contains" => VerbType::Contains,
            "MemberOf" => VerbType::MemberOf,
            "WorksWith" => VerbType::WorksWith,
            "Follows" => VerbType::Follows,
            "Likes" => VerbType::Likes,
            "Created" => VerbType::Created,
            "ReportsTo" => VerbType::ReportsTo,
            "Supervises" => VerbType::Supervises,
            _ => return None,
        })
    }

    /// The storage key segment for this type (`verbs/{typeTag}/{id}`).
    pub fn storage_tag(&self) -> &str {
        match self {
            VerbType::RelatedTo => "RelatedTo",
            VerbType::Controls => "Controls",
            VerbType::Contains => "Contains",
            VerbType::MemberOf => "MemberOf",
            VerbType::WorksWith => "WorksWith",
            VerbType::Follows => "Follows",
            VerbType::Likes => "Likes",
            VerbType::Created => "Created",
            VerbType::ReportsTo => "ReportsTo",
            VerbType::Supervises => "Supervises",
            VerbType::Other(tag) => tag,
        }
    }
}

/// Identifies the writer-of-record that produced a noun/verb version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedBy {
    /// Name of the augmentation/service that created this entity.
    pub name: String,
    /// Version of that augmentation/service.
    pub version: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_noun_tag_is_not_known() {
        assert!(NounType::parse_known("Spaceship").is_none());
    }

    #[test]
    fn known_tags_round_trip_through_storage_tag() {
        for tag in ["Person", "Place", "Thing", "Event", "Concept", "Content", "Group", "List", "Category"] {
            let parsed = NounType::parse_known(tag).unwrap();
            assert_eq!(parsed.storage_tag(), tag);
        }
    }

    #[test]
    fn default_noun_type_is_thing() {
        assert_eq!(NounType::default(), NounType::Thing);
    }

    #[test]
    fn default_verb_type_is_related_to() {
        assert_eq!(VerbType::default(), VerbType::RelatedTo);
    }
}
