use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::info;

use crate::embeddings::EmbeddingClient;
use crate::store::{ScoredChunk, VectorRecord, VectorStore};

/// Qdrant over its REST API, with embeddings from Ollama
pub struct QdrantVectorStore {
    base_url: String,
    client: reqwest::Client,
    embedding_client: EmbeddingClient,
    collection_name: String,
}

#[derive(Serialize)]
struct CreateCollection {
    vectors: VectorParams,
}

#[derive(Serialize)]
struct VectorParams {
    size: usize,
    distance: String,
}

#[derive(Serialize)]
struct UpsertPoints {
    points: Vec<Point>,
}

#[derive(Serialize)]
struct Point {
    id: u64,
    vector: Vec<f32>,
    payload: HashMap<String, serde_json::Value>,
}

#[derive(Serialize)]
struct SearchRequest {
    vector: Vec<f32>,
    limit: usize,
    with_payload: bool,
}

#[derive(Deserialize)]
struct SearchResponse {
    result: Vec<SearchHit>,
}

#[derive(Deserialize)]
struct SearchHit {
    score: f32,
    #[serde(default)]
    payload: HashMap<String, serde_json::Value>,
}

#[derive(Deserialize)]
struct CollectionInfo {
    result: CollectionResult,
}

#[derive(Deserialize)]
struct CollectionResult {
    collections: Vec<Collection>,
}

#[derive(Deserialize)]
struct Collection {
    name: String,
}

impl QdrantVectorStore {
    pub fn new(
        base_url: String,
        embedding_client: EmbeddingClient,
        collection_name: String,
    ) -> Self {
        Self {
            base_url,
            client: reqwest::Client::new(),
            embedding_client,
            collection_name,
        }
    }

    async fn collection_exists(&self) -> Result<bool> {
        let url = format!("{}/collections", self.base_url);
        let response = self.client.get(&url).send().await
            .context("Failed to reach Qdrant")?;

        if !response.status().is_success() {
            anyhow::bail!("Failed to list collections: {}", response.status());
        }

        let info: CollectionInfo = response.json().await?;
        Ok(info.result.collections.iter().any(|c| c.name == self.collection_name))
    }

    /// Create the collection if missing, sized to the embedding model
    pub async fn init_collection(&self) -> Result<()> {
        if self.collection_exists().await? {
            info!(collection = %self.collection_name, "Collection already exists");
            return Ok(());
        }

        let dimension = self.embedding_client.dimension().await?;

        let url = format!("{}/collections/{}", self.base_url, self.collection_name);
        let create_req = CreateCollection {
            vectors: VectorParams {
                size: dimension,
                distance: "Cosine".to_string(),
            },
        };

        let response = self.client
            .put(&url)
            .json(&create_req)
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            anyhow::bail!("Failed to create collection: {}", error_text);
        }

        info!(collection = %self.collection_name, dimension, "Collection created");
        Ok(())
    }
}

/// Qdrant wants integer or UUID ids; fold the record id into a u64
fn point_id(id: &str) -> u64 {
    match id.get(..16).and_then(|prefix| u64::from_str_radix(prefix, 16).ok()) {
        Some(value) => value,
        None => {
            // Non-hex id: FNV-1a keeps the mapping stable across processes
            id.bytes().fold(0xcbf29ce484222325u64, |hash, byte| {
                (hash ^ byte as u64).wrapping_mul(0x100000001b3)
            })
        }
    }
}

fn payload_for(record: &VectorRecord) -> HashMap<String, serde_json::Value> {
    let mut payload = HashMap::new();
    payload.insert("text".to_string(), serde_json::json!(record.text));
    payload.insert("document_id".to_string(), serde_json::json!(record.metadata.document_id));
    payload.insert("filename".to_string(), serde_json::json!(record.metadata.filename));
    payload.insert("chunk_index".to_string(), serde_json::json!(record.metadata.chunk_index));
    payload.insert("total_chunks".to_string(), serde_json::json!(record.metadata.total_chunks));
    payload.insert("timestamp".to_string(), serde_json::json!(record.metadata.timestamp));
    payload
}

fn hit_to_chunk(hit: SearchHit) -> ScoredChunk {
    let text_field = |key: &str| {
        hit.payload
            .get(key)
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string()
    };
    ScoredChunk {
        document_id: text_field("document_id"),
        chunk_index: hit
            .payload
            .get("chunk_index")
            .and_then(|v| v.as_u64())
            .unwrap_or_default() as usize,
        text: text_field("text"),
        score: hit.score,
    }
}

#[async_trait]
impl VectorStore for QdrantVectorStore {
    async fn add_batch(&self, records: &[VectorRecord]) -> Result<()> {
        let texts: Vec<String> = records.iter().map(|r| r.text.clone()).collect();
        let embeddings = self.embedding_client
            .embed_batch(&texts)
            .await
            .context("Failed to generate embeddings")?;

        let points = records
            .iter()
            .zip(embeddings)
            .map(|(record, vector)| Point {
                id: point_id(&record.id),
                vector,
                payload: payload_for(record),
            })
            .collect();

        let url = format!(
            "{}/collections/{}/points?wait=true",
            self.base_url, self.collection_name
        );

        let response = self.client
            .put(&url)
            .json(&UpsertPoints { points })
            .send()
            .await
            .context("Failed to reach Qdrant")?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            anyhow::bail!("Failed to upsert points: {}", error_text);
        }

        Ok(())
    }

    async fn similarity_search(&self, query: &str, k: usize) -> Result<Vec<ScoredChunk>> {
        let vector = self.embedding_client
            .embed(query)
            .await
            .context("Failed to embed query")?;

        let url = format!(
            "{}/collections/{}/points/search",
            self.base_url, self.collection_name
        );
        let request = SearchRequest {
            vector,
            limit: k,
            with_payload: true,
        };

        let response = self.client
            .post(&url)
            .json(&request)
            .send()
            .await
            .context("Failed to reach Qdrant")?;

        if !response.status().is_success() {
            anyhow::bail!("Vector search failed: {}", response.status());
        }

        let search: SearchResponse = response
            .json()
            .await
            .context("Failed to parse search response")?;

        // Qdrant returns hits best first
        Ok(search.result.into_iter().map(hit_to_chunk).collect())
    }

    async fn health_check(&self) -> Result<()> {
        if !self.collection_exists().await? {
            anyhow::bail!("Collection '{}' does not exist", self.collection_name);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ChunkMetadata;

    #[test]
    fn test_point_id_from_hex_prefix() {
        assert_eq!(point_id("00000000000000ffdeadbeef"), 255);
        assert_eq!(point_id("not-hex-at-all"), point_id("not-hex-at-all"));
        assert_ne!(point_id("not-hex-at-all"), point_id("also-not-hex"));
    }

    #[test]
    fn test_payload_carries_chunk_metadata() {
        let record = VectorRecord {
            id: "abc".to_string(),
            text: "Alice works at Acme.".to_string(),
            metadata: ChunkMetadata {
                document_id: "doc-1".to_string(),
                filename: "notes.md".to_string(),
                chunk_index: 2,
                total_chunks: 5,
                timestamp: "2024-01-01T00:00:00Z".to_string(),
            },
        };
        let payload = payload_for(&record);
        assert_eq!(payload["chunk_index"], 2);
        assert_eq!(payload["total_chunks"], 5);
        assert_eq!(payload["filename"], "notes.md");
    }

    #[test]
    fn test_search_hit_parsing() {
        let body = r#"{"result": [{"id": 7, "score": 0.91,
            "payload": {"document_id": "doc-1", "chunk_index": 3,
                        "text": "Acme is in Berlin."}}]}"#;
        let response: SearchResponse = serde_json::from_str(body).unwrap();
        let chunk = hit_to_chunk(response.result.into_iter().next().unwrap());
        assert_eq!(chunk.source_id(), "doc-1#3");
        assert_eq!(chunk.text, "Acme is in Berlin.");
    }
}
