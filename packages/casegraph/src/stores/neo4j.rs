//! Neo4j adapter over the HTTP transaction API.
//!
//! One `Neo4jStore` serves as both the graph store and the vector index:
//! entities and relationships live as `:Entity` nodes and typed edges,
//! chunks as `:Chunk` nodes carrying their embedding, searched through a
//! native vector index. All writes are `MERGE`s with `includeStats`, which
//! is how created-versus-merged outcomes are derived.

use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{CaseError, StoreError, StoreResult};
use crate::traits::graph::{
    GraphStore, TraversalHit, TraversalNode, TraversalQuery, UpsertOutcome,
};
use crate::traits::vector::{ScoredChunk, VectorIndex};
use crate::types::chunk::EvidenceChunk;
use crate::types::entity::{Entity, EntityId, RelationLabel, Relationship};

const VECTOR_INDEX_NAME: &str = "chunk_embeddings";
const DEFAULT_EMBEDDING_DIMENSIONS: usize = 768;

/// Neo4j-backed graph store and vector index.
#[derive(Clone)]
pub struct Neo4jStore {
    http: reqwest::Client,
    tx_url: String,
    username: String,
    password: SecretString,
    embedding_dimensions: usize,
}

impl Neo4jStore {
    /// Connect to the HTTP endpoint, e.g. `http://localhost:7474`.
    pub fn new(
        uri: impl Into<String>,
        username: impl Into<String>,
        password: SecretString,
    ) -> Self {
        let uri = uri.into();
        Self {
            http: reqwest::Client::new(),
            tx_url: format!("{}/db/neo4j/tx/commit", uri.trim_end_matches('/')),
            username: username.into(),
            password,
            embedding_dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }

    /// Read `NEO4J_URI`, `NEO4J_USERNAME`, and `NEO4J_PASSWORD`.
    pub fn from_env() -> crate::error::Result<Self> {
        let uri = std::env::var("NEO4J_URI")
            .map_err(|_| CaseError::Config("NEO4J_URI not set".into()))?;
        let username = std::env::var("NEO4J_USERNAME")
            .map_err(|_| CaseError::Config("NEO4J_USERNAME not set".into()))?;
        let password = std::env::var("NEO4J_PASSWORD")
            .map_err(|_| CaseError::Config("NEO4J_PASSWORD not set".into()))?;
        Ok(Self::new(uri, username, SecretString::from(password)))
    }

    pub fn with_embedding_dimensions(mut self, dimensions: usize) -> Self {
        self.embedding_dimensions = dimensions;
        self
    }

    /// Create the uniqueness constraints and the chunk vector index.
    pub async fn ensure_schema(&self) -> StoreResult<()> {
        let statements = [
            "CREATE CONSTRAINT entity_id IF NOT EXISTS FOR (e:Entity) REQUIRE e.id IS UNIQUE"
                .to_string(),
            "CREATE CONSTRAINT chunk_id IF NOT EXISTS FOR (c:Chunk) REQUIRE c.chunk_id IS UNIQUE"
                .to_string(),
            format!(
                "CREATE VECTOR INDEX {VECTOR_INDEX_NAME} IF NOT EXISTS \
                 FOR (c:Chunk) ON (c.embedding) \
                 OPTIONS {{indexConfig: {{`vector.dimensions`: {}, `vector.similarity_function`: 'cosine'}}}}",
                self.embedding_dimensions
            ),
        ];
        for statement in statements {
            self.run(&statement, json!({})).await?;
        }
        Ok(())
    }

    async fn run(&self, statement: &str, parameters: Value) -> StoreResult<CypherResult> {
        debug!(statement, "running cypher");
        let request = CypherRequest {
            statements: vec![CypherStatement {
                statement: statement.to_string(),
                parameters,
                include_stats: true,
            }],
        };

        let response = self
            .http
            .post(&self.tx_url)
            .basic_auth(&self.username, Some(self.password.expose_secret()))
            .json(&request)
            .send()
            .await
            .map_err(|e| StoreError::Unavailable(format!("neo4j request failed: {e}")))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status.is_server_error() {
            return Err(StoreError::Unavailable(format!(
                "neo4j returned status {status}"
            )));
        }

        let mut body: CypherResponse = response
            .json()
            .await
            .map_err(|e| StoreError::Unavailable(format!("neo4j response unreadable: {e}")))?;

        if let Some(error) = body.errors.first() {
            if error.code.contains("ConstraintValidation") {
                return Err(StoreError::Conflict(error.message.clone()));
            }
            return Err(StoreError::Unavailable(format!(
                "{}: {}",
                error.code, error.message
            )));
        }

        body.results
            .pop()
            .ok_or_else(|| StoreError::Unavailable("neo4j returned no result".into()))
    }

    fn entity_from_props(props: &Value) -> StoreResult<Entity> {
        let node: EntityNode = serde_json::from_value(props.clone())
            .map_err(|e| StoreError::Unavailable(format!("unexpected entity shape: {e}")))?;
        node.into_entity()
    }
}

#[derive(Serialize)]
struct CypherRequest {
    statements: Vec<CypherStatement>,
}

#[derive(Serialize)]
struct CypherStatement {
    statement: String,
    parameters: Value,
    #[serde(rename = "includeStats")]
    include_stats: bool,
}

#[derive(Deserialize)]
struct CypherResponse {
    #[serde(default)]
    results: Vec<CypherResult>,
    #[serde(default)]
    errors: Vec<Neo4jError>,
}

#[derive(Deserialize)]
struct CypherResult {
    #[serde(default)]
    data: Vec<CypherRow>,
    #[serde(default)]
    stats: Option<CypherStats>,
}

impl CypherResult {
    fn created_nodes(&self) -> u64 {
        self.stats.as_ref().map(|s| s.nodes_created).unwrap_or(0)
    }

    fn created_relationships(&self) -> u64 {
        self.stats
            .as_ref()
            .map(|s| s.relationships_created)
            .unwrap_or(0)
    }
}

#[derive(Deserialize)]
struct CypherRow {
    row: Vec<Value>,
}

#[derive(Deserialize, Default)]
struct CypherStats {
    #[serde(default)]
    nodes_created: u64,
    #[serde(default)]
    relationships_created: u64,
}

#[derive(Deserialize)]
struct Neo4jError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

/// Wire shape of `properties(e)` for an `:Entity` node.
#[derive(Serialize, Deserialize)]
struct EntityNode {
    id: String,
    kind: String,
    display_name: String,
    normalized_name: String,
    #[serde(default)]
    aliases: Vec<String>,
    #[serde(default)]
    attributes_json: String,
    created_seq: u64,
    created_at: String,
}

impl EntityNode {
    fn from_entity(entity: &Entity) -> Self {
        Self {
            id: entity.id.as_str().to_string(),
            kind: entity.kind.as_str().to_string(),
            display_name: entity.display_name.clone(),
            normalized_name: entity.normalized_name.clone(),
            aliases: entity.aliases.iter().cloned().collect(),
            attributes_json: serde_json::to_string(&entity.attributes).unwrap_or_default(),
            created_seq: entity.created_seq,
            created_at: entity.created_at.to_rfc3339(),
        }
    }

    fn into_entity(self) -> StoreResult<Entity> {
        let bad = |what: &str| StoreError::Unavailable(format!("unexpected entity {what}"));
        let kind = crate::types::entity::EntityKind::parse(&self.kind)
            .ok_or_else(|| bad("kind"))?;
        let created_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&self.created_at)
            .map_err(|_| bad("timestamp"))?
            .with_timezone(&Utc);
        let attributes = if self.attributes_json.is_empty() {
            Default::default()
        } else {
            serde_json::from_str(&self.attributes_json).map_err(|_| bad("attributes"))?
        };

        let mut entity = Entity::new(kind, self.display_name, self.normalized_name, self.created_seq);
        entity.aliases = self.aliases.into_iter().collect();
        entity.attributes = attributes;
        entity.created_at = created_at;
        Ok(entity)
    }
}

#[async_trait]
impl GraphStore for Neo4jStore {
    async fn upsert_entity(&self, entity: &Entity) -> StoreResult<UpsertOutcome> {
        let props = serde_json::to_value(EntityNode::from_entity(entity))
            .map_err(|e| StoreError::Unavailable(format!("entity serialization: {e}")))?;
        let result = self
            .run(
                "MERGE (e:Entity {id: $id}) \
                 ON CREATE SET e += $props \
                 ON MATCH SET e.aliases = [a IN e.aliases WHERE NOT a IN $aliases] + $aliases",
                json!({
                    "id": entity.id.as_str(),
                    "props": props,
                    "aliases": entity.aliases.iter().collect::<Vec<_>>(),
                }),
            )
            .await?;
        Ok(if result.created_nodes() > 0 {
            UpsertOutcome::Created
        } else {
            UpsertOutcome::Merged
        })
    }

    async fn upsert_relationship(&self, rel: &Relationship) -> StoreResult<UpsertOutcome> {
        // Label text comes from the enum, never from model output, so
        // interpolating it into the pattern is safe.
        let statement = format!(
            "MATCH (a:Entity {{id: $source}}), (b:Entity {{id: $target}}) \
             MERGE (a)-[r:{}]->(b)",
            rel.label.as_str()
        );
        let result = self
            .run(
                &statement,
                json!({
                    "source": rel.source.as_str(),
                    "target": rel.target.as_str(),
                }),
            )
            .await?;
        Ok(if result.created_relationships() > 0 {
            UpsertOutcome::Created
        } else {
            UpsertOutcome::Merged
        })
    }

    async fn upsert_mention(
        &self,
        chunk: &EvidenceChunk,
        entity: &EntityId,
    ) -> StoreResult<UpsertOutcome> {
        let result = self
            .run(
                "MERGE (c:Chunk {chunk_id: $chunk_id}) \
                 SET c.text = $text \
                 WITH c MATCH (e:Entity {id: $entity}) \
                 MERGE (c)-[:MENTIONS]->(e)",
                json!({
                    "chunk_id": chunk.chunk_id,
                    "text": chunk.text,
                    "entity": entity.as_str(),
                }),
            )
            .await?;
        Ok(if result.created_relationships() > 0 {
            UpsertOutcome::Created
        } else {
            UpsertOutcome::Merged
        })
    }

    async fn all_entities(&self) -> StoreResult<Vec<Entity>> {
        let result = self
            .run(
                "MATCH (e:Entity) RETURN properties(e) ORDER BY e.created_seq",
                json!({}),
            )
            .await?;
        result
            .data
            .iter()
            .filter_map(|row| row.row.first())
            .map(Self::entity_from_props)
            .collect()
    }

    async fn entities_matching(&self, normalized_terms: &[String]) -> StoreResult<Vec<Entity>> {
        let result = self
            .run(
                "MATCH (e:Entity) \
                 WHERE e.normalized_name IN $terms \
                    OR any(a IN e.aliases WHERE a IN $terms) \
                 RETURN properties(e) ORDER BY e.created_seq",
                json!({ "terms": normalized_terms }),
            )
            .await?;
        result
            .data
            .iter()
            .filter_map(|row| row.row.first())
            .map(Self::entity_from_props)
            .collect()
    }

    async fn relationship_count(&self, id: &EntityId) -> StoreResult<usize> {
        let result = self
            .run(
                "MATCH (e:Entity {id: $id})-[r]-(:Entity) RETURN count(r)",
                json!({ "id": id.as_str() }),
            )
            .await?;
        Ok(result
            .data
            .first()
            .and_then(|row| row.row.first())
            .and_then(Value::as_u64)
            .unwrap_or(0) as usize)
    }

    async fn traverse(&self, query: &TraversalQuery) -> StoreResult<Vec<TraversalHit>> {
        let start: Vec<&str> = query.start.iter().map(EntityId::as_str).collect();
        let mut labels: Vec<&str> = match &query.labels {
            Some(labels) => labels.iter().map(|l| l.as_str()).collect(),
            None => RelationLabel::ALL.iter().map(|l| l.as_str()).collect(),
        };
        labels.push("MENTIONS");

        // Shortest occurrence of each node wins; the final hop's edge is
        // reported alongside it.
        let statement = format!(
            "MATCH (s:Entity) WHERE s.id IN $start \
             MATCH p = (s)-[rels*1..{}]-(n) \
             WHERE all(r IN rels WHERE type(r) IN $labels) \
               AND (n:Entity OR n:Chunk) \
               AND NOT (n:Entity AND n.id IN $start) \
             WITH n, p ORDER BY length(p) \
             WITH n, collect(p)[0] AS p \
             WITH n, p, last(relationships(p)) AS hop \
             RETURN properties(n), labels(n), length(p), \
                    type(hop), startNode(hop).id, endNode(hop).id \
             ORDER BY length(p)",
            query.max_hops.max(1)
        );
        let result = self
            .run(&statement, json!({ "start": start, "labels": labels }))
            .await?;

        let mut hits = Vec::new();
        for row in &result.data {
            let [props, node_labels, distance, hop_type, hop_source, hop_target] = &row.row[..]
            else {
                return Err(StoreError::Unavailable(
                    "unexpected traversal row shape".into(),
                ));
            };

            let is_chunk = node_labels
                .as_array()
                .map(|l| l.iter().any(|v| v == "Chunk"))
                .unwrap_or(false);
            let node = if is_chunk {
                TraversalNode::Chunk {
                    chunk_id: props
                        .get("chunk_id")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    text: props
                        .get("text")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                }
            } else {
                TraversalNode::Entity(Self::entity_from_props(props)?)
            };

            let via = match (hop_type.as_str(), hop_source.as_str(), hop_target.as_str()) {
                (Some(label), Some(source), Some(target)) if label != "MENTIONS" => {
                    RelationLabel::parse(label).map(|label| {
                        Relationship::new(
                            EntityId::from_raw(source),
                            EntityId::from_raw(target),
                            label,
                        )
                    })
                }
                _ => None,
            };

            hits.push(TraversalHit {
                node,
                via,
                distance: distance.as_u64().unwrap_or(0).min(u64::from(u8::MAX)) as u8,
            });
        }
        Ok(hits)
    }

    async fn entity_count(&self) -> StoreResult<usize> {
        let result = self
            .run("MATCH (e:Entity) RETURN count(e)", json!({}))
            .await?;
        Ok(result
            .data
            .first()
            .and_then(|row| row.row.first())
            .and_then(Value::as_u64)
            .unwrap_or(0) as usize)
    }

    async fn relationship_total(&self) -> StoreResult<usize> {
        let result = self
            .run(
                "MATCH (:Entity)-[r]->(:Entity) RETURN count(r)",
                json!({}),
            )
            .await?;
        Ok(result
            .data
            .first()
            .and_then(|row| row.row.first())
            .and_then(Value::as_u64)
            .unwrap_or(0) as usize)
    }
}

#[async_trait]
impl VectorIndex for Neo4jStore {
    async fn upsert_embedding(
        &self,
        chunk_id: &str,
        vector: &[f32],
        text: &str,
    ) -> StoreResult<UpsertOutcome> {
        let result = self
            .run(
                "MERGE (c:Chunk {chunk_id: $chunk_id}) \
                 WITH c, c.embedding IS NOT NULL AS existed \
                 SET c.text = $text, c.embedding = $vector \
                 RETURN existed",
                json!({ "chunk_id": chunk_id, "text": text, "vector": vector }),
            )
            .await?;
        let existed = result
            .data
            .first()
            .and_then(|row| row.row.first())
            .and_then(Value::as_bool)
            .unwrap_or(false);
        Ok(if existed {
            UpsertOutcome::Merged
        } else {
            UpsertOutcome::Created
        })
    }

    async fn query_top_k(&self, vector: &[f32], k: usize) -> StoreResult<Vec<ScoredChunk>> {
        let result = self
            .run(
                &format!(
                    "CALL db.index.vector.queryNodes('{VECTOR_INDEX_NAME}', $k, $vector) \
                     YIELD node, score \
                     RETURN node.chunk_id, node.text, score"
                ),
                json!({ "k": k, "vector": vector }),
            )
            .await?;
        Ok(result
            .data
            .iter()
            .filter_map(|row| {
                let [chunk_id, text, score] = &row.row[..] else {
                    return None;
                };
                Some(ScoredChunk {
                    chunk_id: chunk_id.as_str()?.to_string(),
                    text: text.as_str().unwrap_or_default().to_string(),
                    score: score.as_f64().unwrap_or(0.0).max(0.0) as f32,
                })
            })
            .collect())
    }

    async fn contains(&self, chunk_id: &str) -> StoreResult<bool> {
        let result = self
            .run(
                "MATCH (c:Chunk {chunk_id: $chunk_id}) \
                 WHERE c.embedding IS NOT NULL RETURN count(c)",
                json!({ "chunk_id": chunk_id }),
            )
            .await?;
        Ok(result
            .data
            .first()
            .and_then(|row| row.row.first())
            .and_then(Value::as_u64)
            .unwrap_or(0)
            > 0)
    }

    async fn chunk_count(&self) -> StoreResult<usize> {
        let result = self
            .run(
                "MATCH (c:Chunk) WHERE c.embedding IS NOT NULL RETURN count(c)",
                json!({}),
            )
            .await?;
        Ok(result
            .data
            .first()
            .and_then(|row| row.row.first())
            .and_then(Value::as_u64)
            .unwrap_or(0) as usize)
    }
}
