use anyhow::{Context, Result};
use extract::{ExtractionOrchestrator, Extractor, LlmCapability};
use index::{
    BatchWriter, BlockingPool, EmbeddingClient, GraphStore, InMemoryGraphStore, InMemoryVectorStore,
    IngestionPipeline, Neo4jGraphStore, QdrantVectorStore, ReadOnlyCredential, ReadWriteCredential,
    VectorStore,
};
use ingest::Chunker;
use query::HybridRetriever;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::{AppConfig, StoreBackend};
use crate::metrics::Metrics;

pub struct Stores {
    pub graph: Arc<dyn GraphStore>,
    pub vectors: Arc<dyn VectorStore>,
    pub rw: ReadWriteCredential,
    pub ro: ReadOnlyCredential,
}

impl Stores {
    pub fn in_memory() -> Self {
        Self {
            graph: Arc::new(InMemoryGraphStore::new()),
            vectors: Arc::new(InMemoryVectorStore::new()),
            rw: ReadWriteCredential::new("memory-rw", ""),
            ro: ReadOnlyCredential::new("memory-ro", ""),
        }
    }
}

/// Open the configured backends and make sure their schema exists
pub async fn connect_stores(config: &AppConfig) -> Result<Stores> {
    if config.store.backend == StoreBackend::Memory {
        info!("Using in-memory stores");
        return Ok(Stores::in_memory());
    }

    let rw = ReadWriteCredential::new(&config.store.rw_user, &config.store.rw_password);
    let ro = ReadOnlyCredential::new(&config.store.ro_user, &config.store.ro_password);

    let neo4j = Neo4jGraphStore::open(&config.store.neo4j_uri, &rw, &ro).await?;
    neo4j.init_schema().await.context("Failed to initialize Neo4j schema")?;

    let embeddings = EmbeddingClient::new(
        config.llm.ollama_url.clone(),
        config.llm.embedding_model.clone(),
    );
    let qdrant = QdrantVectorStore::new(
        config.store.qdrant_url.clone(),
        embeddings,
        config.store.qdrant_collection.clone(),
    );
    qdrant.init_collection().await.context("Failed to initialize Qdrant collection")?;

    Ok(Stores {
        graph: Arc::new(neo4j),
        vectors: Arc::new(qdrant),
        rw,
        ro,
    })
}

pub struct AppState {
    pub pipeline: IngestionPipeline,
    pub retriever: HybridRetriever,
    pub graph: Arc<dyn GraphStore>,
    pub vectors: Arc<dyn VectorStore>,
    pub pool: BlockingPool,
    pub metrics: Arc<Metrics>,
    /// Fires on shutdown; in-flight ingests and queries observe it
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn assemble(
        config: &AppConfig,
        stores: Stores,
        extraction_llm: Arc<dyn LlmCapability>,
        answer_llm: Arc<dyn LlmCapability>,
    ) -> Result<Self> {
        let retry = config.retry_policy();
        let pool = BlockingPool::new(config.concurrency.blocking_pool_size);

        let chunker =
            Chunker::new(config.chunker_config()).context("Invalid chunker configuration")?;
        let orchestrator =
            ExtractionOrchestrator::new(Extractor::new(extraction_llm, retry.clone()));
        let writer = BatchWriter::new(
            stores.graph.clone(),
            stores.vectors.clone(),
            pool.clone(),
            stores.rw,
        )
        .with_retry(retry.clone())
        .with_vector_batch_size(config.retrieval.vector_batch_size);
        let pipeline = IngestionPipeline::new(
            chunker,
            orchestrator,
            writer,
            config.concurrency.max_concurrent_llm_calls,
        );

        let retriever = HybridRetriever::new(
            stores.vectors.clone(),
            stores.graph.clone(),
            answer_llm,
            stores.ro,
            pool.clone(),
        )
        .with_retry(retry)
        .with_top_k(config.retrieval.vector_search_k);

        Ok(Self {
            pipeline,
            retriever,
            graph: stores.graph,
            vectors: stores.vectors,
            pool,
            metrics: Metrics::new(),
            shutdown: CancellationToken::new(),
        })
    }

    /// Refuse further store calls once the server has stopped
    pub async fn close(&self) -> Result<()> {
        let graph = self.graph.clone();
        self.pool.run(move || graph.close()).await
    }
}
