pub mod credential;
pub mod embeddings;
pub mod memory;
pub mod merge;
pub mod neo4j_index;
pub mod offload;
pub mod pipeline;
pub mod qdrant_index;
pub mod store;
pub mod writer;

pub use credential::{ReadOnlyCredential, ReadWriteCredential};
pub use embeddings::EmbeddingClient;
pub use memory::{InMemoryGraphStore, InMemoryVectorStore};
pub use merge::DocumentGraph;
pub use neo4j_index::Neo4jGraphStore;
pub use offload::BlockingPool;
pub use pipeline::{IngestionPipeline, IngestionRecord, IngestionState};
pub use qdrant_index::QdrantVectorStore;
pub use store::{
    ChunkMetadata, GraphRow, GraphStats, GraphStore, ResolvedRelationship, ScoredChunk,
    UNKNOWN_ENTITY_TYPE, VectorRecord, VectorStore,
};
pub use writer::BatchWriter;
