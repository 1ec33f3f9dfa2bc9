//! Canonical entities and typed relationships.
//!
//! Entities are the deduplicated representation of a real-world subject
//! after alias merging. Canonical identity is derived from the pair
//! `(kind, normalized name)`, so uniqueness per that pair holds by
//! construction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// The kind of a canonical entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Person,
    Object,
    Location,
    Event,
    Organization,
}

impl EntityKind {
    /// All kinds, in a fixed order.
    pub const ALL: [EntityKind; 5] = [
        EntityKind::Person,
        EntityKind::Object,
        EntityKind::Location,
        EntityKind::Event,
        EntityKind::Organization,
    ];

    /// Parse a raw model-provided kind, tolerating case variance.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "person" | "suspect" | "witness" => Some(EntityKind::Person),
            "object" | "weapon" | "evidence" => Some(EntityKind::Object),
            "location" | "place" => Some(EntityKind::Location),
            "event" => Some(EntityKind::Event),
            "organization" | "organisation" => Some(EntityKind::Organization),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Person => "Person",
            EntityKind::Object => "Object",
            EntityKind::Location => "Location",
            EntityKind::Event => "Event",
            EntityKind::Organization => "Organization",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical entity identifier, derived from `(kind, normalized name)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId(String);

impl EntityId {
    pub fn new(kind: EntityKind, normalized_name: &str) -> Self {
        Self(format!(
            "{}:{}",
            kind.as_str().to_ascii_lowercase(),
            normalized_name
        ))
    }

    /// Rebuild an id from its stored string form.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The name portion of the id, used as a display fallback.
    pub fn name_part(&self) -> &str {
        self.0.split_once(':').map(|(_, n)| n).unwrap_or(&self.0)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The single deduplicated representation of a real-world subject.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub kind: EntityKind,

    /// Name as first seen in the evidence
    pub display_name: String,

    /// Normalized form of the display name (canonical identity key)
    pub normalized_name: String,

    /// Normalized alias forms merged into this entity
    #[serde(default)]
    pub aliases: BTreeSet<String>,

    #[serde(default)]
    pub attributes: BTreeMap<String, String>,

    /// Monotonic creation order, used for deterministic merge tie-breaks
    pub created_seq: u64,

    pub created_at: DateTime<Utc>,
}

impl Entity {
    pub fn new(
        kind: EntityKind,
        display_name: impl Into<String>,
        normalized_name: impl Into<String>,
        created_seq: u64,
    ) -> Self {
        let display_name = display_name.into();
        let normalized_name = normalized_name.into();
        Self {
            id: EntityId::new(kind, &normalized_name),
            kind,
            display_name,
            normalized_name,
            aliases: BTreeSet::new(),
            attributes: BTreeMap::new(),
            created_seq,
            created_at: Utc::now(),
        }
    }

    /// Add a normalized alias.
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.insert(alias.into());
        self
    }

    /// Add an attribute key-value pair.
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Whether a normalized name matches this entity's canonical name or
    /// one of its aliases.
    pub fn answers_to(&self, normalized: &str) -> bool {
        self.normalized_name == normalized || self.aliases.contains(normalized)
    }
}

/// Typed relationship label.
///
/// The set covers the labels the extraction prompt asks for; raw model
/// output is sanitized the same way the backing store sanitizes edge types
/// (upper snake case) before matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RelationLabel {
    HasMotive,
    CausedDeath,
    LocatedAt,
    AssociatedWith,
    Witnessed,
    Possesses,
    WasAt,
    RelatedTo,
}

impl RelationLabel {
    pub const ALL: [RelationLabel; 8] = [
        RelationLabel::HasMotive,
        RelationLabel::CausedDeath,
        RelationLabel::LocatedAt,
        RelationLabel::AssociatedWith,
        RelationLabel::Witnessed,
        RelationLabel::Possesses,
        RelationLabel::WasAt,
        RelationLabel::RelatedTo,
    ];

    /// Parse a raw model-provided label. Returns `None` for labels outside
    /// the enumerated set.
    pub fn parse(raw: &str) -> Option<Self> {
        let sanitized: String = raw
            .trim()
            .chars()
            .map(|c| match c {
                ' ' | '-' => '_',
                c => c.to_ascii_uppercase(),
            })
            .collect();
        match sanitized.as_str() {
            "HAS_MOTIVE" => Some(RelationLabel::HasMotive),
            "CAUSED_DEATH" | "CAUSED_DEATH_OF" => Some(RelationLabel::CausedDeath),
            "LOCATED_AT" => Some(RelationLabel::LocatedAt),
            "ASSOCIATED_WITH" => Some(RelationLabel::AssociatedWith),
            "WITNESSED" => Some(RelationLabel::Witnessed),
            "POSSESSES" => Some(RelationLabel::Possesses),
            "WAS_AT" => Some(RelationLabel::WasAt),
            "RELATED_TO" => Some(RelationLabel::RelatedTo),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RelationLabel::HasMotive => "HAS_MOTIVE",
            RelationLabel::CausedDeath => "CAUSED_DEATH",
            RelationLabel::LocatedAt => "LOCATED_AT",
            RelationLabel::AssociatedWith => "ASSOCIATED_WITH",
            RelationLabel::Witnessed => "WITNESSED",
            RelationLabel::Possesses => "POSSESSES",
            RelationLabel::WasAt => "WAS_AT",
            RelationLabel::RelatedTo => "RELATED_TO",
        }
    }
}

impl fmt::Display for RelationLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed edge between two canonical entities.
///
/// `(source, target, label)` is the idempotency key: re-ingestion must not
/// duplicate an edge with the same key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relationship {
    pub source: EntityId,
    pub target: EntityId,
    pub label: RelationLabel,

    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl Relationship {
    pub fn new(source: EntityId, target: EntityId, label: RelationLabel) -> Self {
        Self {
            source,
            target,
            label,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// The idempotent upsert key.
    pub fn key(&self) -> (EntityId, EntityId, RelationLabel) {
        (self.source.clone(), self.target.clone(), self.label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_id_is_stable_per_kind_and_name() {
        let a = EntityId::new(EntityKind::Person, "layla");
        let b = EntityId::new(EntityKind::Person, "layla");
        let c = EntityId::new(EntityKind::Location, "layla");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.name_part(), "layla");
    }

    #[test]
    fn label_parse_sanitizes_raw_forms() {
        assert_eq!(
            RelationLabel::parse("caused death of"),
            Some(RelationLabel::CausedDeath)
        );
        assert_eq!(
            RelationLabel::parse("HAS-MOTIVE"),
            Some(RelationLabel::HasMotive)
        );
        assert_eq!(RelationLabel::parse("was_at"), Some(RelationLabel::WasAt));
        assert_eq!(RelationLabel::parse("LIKES"), None);
    }

    #[test]
    fn kind_parse_tolerates_synonyms() {
        assert_eq!(EntityKind::parse("Suspect"), Some(EntityKind::Person));
        assert_eq!(EntityKind::parse("weapon"), Some(EntityKind::Object));
        assert_eq!(EntityKind::parse("Ghost"), None);
    }

    #[test]
    fn answers_to_covers_aliases() {
        let e = Entity::new(EntityKind::Person, "Dr. Agasa", "agasa", 0)
            .with_alias("hiroshi agasa");
        assert!(e.answers_to("agasa"));
        assert!(e.answers_to("hiroshi agasa"));
        assert!(!e.answers_to("conan"));
    }
}
