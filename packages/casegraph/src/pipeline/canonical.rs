//! Canonicalizer: merge candidate entities into canonical identities and
//! rewrite relationship endpoints.
//!
//! The canonicalizer is the single writer for graph mutations. Candidate
//! names are normalized (case-fold, honorifics and punctuation stripped),
//! then matched against the registry of known canonical entities: exact
//! name, alias, then token-subset ("Agasa" under "Hiroshi Agasa"). Merge
//! ambiguity is resolved with a deterministic tie-break and never surfaces
//! to the caller.

use std::collections::{BTreeSet, HashMap};
use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

use crate::error::Result;
use crate::retry::RetryPolicy;
use crate::traits::graph::{GraphStore, UpsertOutcome};
use crate::types::candidate::{CandidateEntity, ChunkExtraction};
use crate::types::chunk::EvidenceChunk;
use crate::types::entity::{Entity, EntityId, EntityKind, Relationship};

/// Honorific tokens stripped from the front of names.
const HONORIFICS: &[&str] = &[
    "dr", "mr", "mrs", "ms", "miss", "prof", "professor", "detective", "inspector", "officer",
    "chef", "sir", "lady", "madam", "captain", "capt",
];

fn punct_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^\p{L}\p{N}\s]+").expect("static regex"))
}

/// Normalize a surface name to its canonical matching form.
///
/// Case-folds, strips punctuation, drops leading honorifics, and collapses
/// whitespace. Falls back to the unstripped form when the name is nothing
/// but honorifics.
pub fn normalize_name(raw: &str) -> String {
    let folded = raw.to_lowercase();
    let cleaned = punct_re().replace_all(&folded, " ");
    let tokens: Vec<&str> = cleaned.split_whitespace().collect();

    let stripped: Vec<&str> = tokens
        .iter()
        .copied()
        .skip_while(|t| HONORIFICS.contains(t))
        .collect();

    let kept = if stripped.is_empty() { &tokens } else { &stripped };
    kept.join(" ")
}

fn tokens(name: &str) -> BTreeSet<&str> {
    name.split_whitespace().collect()
}

/// Whether the shorter of the two names is a token subset of the longer.
fn token_subset(a: &str, b: &str) -> bool {
    let (ta, tb) = (tokens(a), tokens(b));
    if ta.is_empty() || tb.is_empty() {
        return false;
    }
    let (small, large) = if ta.len() <= tb.len() { (&ta, &tb) } else { (&tb, &ta) };
    small.is_subset(large)
}

struct RegistryEntry {
    entity: Entity,
    /// Relationship endpoints seen on this entity, the merge tie-break signal
    corroborations: usize,
}

/// Per-chunk merge counts, absorbed into the ingest report.
#[derive(Debug, Clone, Copy, Default)]
pub struct MergeStats {
    pub entities_created: usize,
    pub entities_merged: usize,
    pub relationships_created: usize,
    pub relationships_existing: usize,
}

/// Single-writer alias merger over the canonical entity registry.
pub struct Canonicalizer {
    entries: HashMap<EntityId, RegistryEntry>,
    name_index: HashMap<(EntityKind, String), EntityId>,
    next_seq: u64,
}

impl Canonicalizer {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            name_index: HashMap::new(),
            next_seq: 0,
        }
    }

    /// Rebuild the registry from the graph store at the start of a run, so
    /// merges across repeated ingestions stay stable.
    pub async fn load<G: GraphStore + ?Sized>(graph: &G, retry: &RetryPolicy) -> Result<Self> {
        let mut canonicalizer = Self::new();
        for entity in retry.run("entity scan", || graph.all_entities()).await? {
            let corroborations = retry
                .run("relationship count", || graph.relationship_count(&entity.id))
                .await?;
            canonicalizer.next_seq = canonicalizer.next_seq.max(entity.created_seq + 1);
            canonicalizer.index_entity(&entity);
            canonicalizer
                .entries
                .insert(entity.id.clone(), RegistryEntry {
                    entity,
                    corroborations,
                });
        }
        Ok(canonicalizer)
    }

    fn index_entity(&mut self, entity: &Entity) {
        self.name_index
            .insert((entity.kind, entity.normalized_name.clone()), entity.id.clone());
        for alias in &entity.aliases {
            self.name_index
                .insert((entity.kind, alias.clone()), entity.id.clone());
        }
    }

    /// Merge one chunk's candidates into the graph. All upserts are safe to
    /// repeat.
    pub async fn merge_chunk<G: GraphStore + ?Sized>(
        &mut self,
        graph: &G,
        chunk: &EvidenceChunk,
        extraction: &ChunkExtraction,
        retry: &RetryPolicy,
    ) -> Result<MergeStats> {
        let mut stats = MergeStats::default();
        let mut by_surface: HashMap<String, EntityId> = HashMap::new();
        let mut mentioned: Vec<EntityId> = Vec::new();

        for candidate in &extraction.entities {
            let (id, outcome) = self.resolve(graph, candidate, retry).await?;
            if outcome.is_created() {
                stats.entities_created += 1;
            } else {
                stats.entities_merged += 1;
            }
            by_surface.insert(candidate.name.trim().to_lowercase(), id.clone());
            if !mentioned.contains(&id) {
                mentioned.push(id);
            }
        }

        for rel in &extraction.relationships {
            let (Some(source), Some(target)) = (
                by_surface.get(&rel.source.trim().to_lowercase()),
                by_surface.get(&rel.target.trim().to_lowercase()),
            ) else {
                // Endpoints are validated at parse time; unreachable in practice.
                debug!(chunk_id = %extraction.chunk_id, "dropping relationship with unresolved endpoint");
                continue;
            };
            if source == target {
                // Two surface forms of the same canonical entity.
                debug!(chunk_id = %extraction.chunk_id, entity = %source, "dropping self-relationship");
                continue;
            }

            let relationship = Relationship::new(source.clone(), target.clone(), rel.label);
            match retry
                .run("relationship upsert", || graph.upsert_relationship(&relationship))
                .await?
            {
                UpsertOutcome::Created => {
                    stats.relationships_created += 1;
                    self.bump_corroboration(source);
                    self.bump_corroboration(target);
                }
                UpsertOutcome::Merged => stats.relationships_existing += 1,
            }
        }

        for id in &mentioned {
            retry.run("mention upsert", || graph.upsert_mention(chunk, id)).await?;
        }

        Ok(stats)
    }

    fn bump_corroboration(&mut self, id: &EntityId) {
        if let Some(entry) = self.entries.get_mut(id) {
            entry.corroborations += 1;
        }
    }

    /// Resolve a candidate to a canonical entity, creating or merging.
    async fn resolve<G: GraphStore + ?Sized>(
        &mut self,
        graph: &G,
        candidate: &CandidateEntity,
        retry: &RetryPolicy,
    ) -> Result<(EntityId, UpsertOutcome)> {
        let normalized = normalize_name(&candidate.name);

        let winner = match self.name_index.get(&(candidate.kind, normalized.clone())) {
            Some(id) => Some(id.clone()),
            None => self.best_subset_match(candidate.kind, &normalized),
        };

        match winner {
            Some(id) => {
                if let Some(entry) = self.entries.get_mut(&id) {
                    if !entry.entity.answers_to(&normalized) {
                        entry.entity.aliases.insert(normalized.clone());
                    }
                    let entity = entry.entity.clone();
                    self.name_index.insert((candidate.kind, normalized), id.clone());
                    retry.run("entity upsert", || graph.upsert_entity(&entity)).await?;
                }
                Ok((id, UpsertOutcome::Merged))
            }
            None => {
                let entity = Entity::new(
                    candidate.kind,
                    candidate.name.trim(),
                    normalized,
                    self.next_seq,
                );
                self.next_seq += 1;
                self.index_entity(&entity);
                retry.run("entity upsert", || graph.upsert_entity(&entity)).await?;
                let id = entity.id.clone();
                self.entries.insert(id.clone(), RegistryEntry {
                    entity,
                    corroborations: 0,
                });
                Ok((id, UpsertOutcome::Created))
            }
        }
    }

    /// Find subset matches and pick the winner deterministically: most
    /// corroborating relationships, then earliest creation, then id.
    fn best_subset_match(&self, kind: EntityKind, normalized: &str) -> Option<EntityId> {
        let mut matches: Vec<&RegistryEntry> = self
            .entries
            .values()
            .filter(|entry| entry.entity.kind == kind)
            .filter(|entry| {
                token_subset(normalized, &entry.entity.normalized_name)
                    || entry
                        .entity
                        .aliases
                        .iter()
                        .any(|alias| token_subset(normalized, alias))
            })
            .collect();

        matches.sort_by(|a, b| {
            b.corroborations
                .cmp(&a.corroborations)
                .then(a.entity.created_seq.cmp(&b.entity.created_seq))
                .then(a.entity.id.cmp(&b.entity.id))
        });

        matches.first().map(|entry| entry.entity.id.clone())
    }

    /// Number of canonical entities in the registry.
    pub fn entity_count(&self) -> usize {
        self.entries.len()
    }
}

impl Default for Canonicalizer {
    fn default() -> Self {
        Self::new()
    }
}
