use anyhow::{Context, Result, bail};
use extract::RetryPolicy;
use ingest::ChunkerConfig;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub store: StoreConfig,
    pub llm: LlmConfig,
    pub chunking: ChunkingConfig,
    pub concurrency: ConcurrencyConfig,
    pub retry: RetryConfig,
    pub retrieval: RetrievalConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Neo4j,  // Neo4j graph + Qdrant vectors
    Memory, // In-process stores, nothing survives a restart
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub neo4j_uri: String,
    pub rw_user: String,
    #[serde(skip_serializing)]
    pub rw_password: String,
    pub ro_user: String,
    #[serde(skip_serializing)]
    pub ro_password: String,
    pub qdrant_url: String,
    pub qdrant_collection: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub ollama_url: String,
    pub llm_model: String,
    pub embedding_model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConcurrencyConfig {
    pub max_concurrent_llm_calls: usize,
    pub blocking_pool_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_retries: usize,
    pub min_wait_secs: u64,
    pub max_wait_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    pub vector_search_k: usize,
    pub vector_batch_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub log_format: LogFormat,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig {
                backend: StoreBackend::Neo4j,
                neo4j_uri: "bolt://localhost:7687".to_string(),
                rw_user: String::new(),
                rw_password: String::new(),
                ro_user: String::new(),
                ro_password: String::new(),
                qdrant_url: "http://localhost:6333".to_string(),
                qdrant_collection: "graphrag_chunks".to_string(),
            },
            llm: LlmConfig {
                ollama_url: "http://localhost:11434".to_string(),
                llm_model: "llama3".to_string(),
                embedding_model: "nomic-embed-text".to_string(),
            },
            chunking: ChunkingConfig {
                chunk_size: 1000,
                chunk_overlap: 200,
            },
            concurrency: ConcurrencyConfig {
                max_concurrent_llm_calls: 10,
                blocking_pool_size: 8,
            },
            retry: RetryConfig {
                max_retries: 3,
                min_wait_secs: 1,
                max_wait_secs: 10,
            },
            retrieval: RetrievalConfig {
                vector_search_k: 5,
                vector_batch_size: 100,
            },
            server: ServerConfig {
                bind_addr: "0.0.0.0:3000".to_string(),
                log_format: LogFormat::Text,
            },
        }
    }
}

impl FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "neo4j" => Ok(StoreBackend::Neo4j),
            "memory" => Ok(StoreBackend::Memory),
            other => bail!("unknown store backend '{}' (expected neo4j or memory)", other),
        }
    }
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "text" | "pretty" | "" => Ok(LogFormat::Text),
            other => bail!("unknown log format '{}'", other),
        }
    }
}

/// Overwrite `target` with the parsed value of `key`, if set
fn apply<T, F>(lookup: &F, key: &str, target: &mut T) -> Result<()>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    if let Some(raw) = lookup(key) {
        *target = raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid value for {}: {}", key, e))?;
    }
    Ok(())
}

impl AppConfig {
    /// Defaults overridden by the process environment and `.env`
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        let config = Self::from_lookup(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let f = &lookup;

        apply(f, "STORE_BACKEND", &mut config.store.backend)?;
        apply(f, "NEO4J_URI", &mut config.store.neo4j_uri)?;
        apply(f, "NEO4J_RW_USER", &mut config.store.rw_user)?;
        apply(f, "NEO4J_RW_PASSWORD", &mut config.store.rw_password)?;
        apply(f, "NEO4J_RO_USER", &mut config.store.ro_user)?;
        apply(f, "NEO4J_RO_PASSWORD", &mut config.store.ro_password)?;
        apply(f, "QDRANT_URL", &mut config.store.qdrant_url)?;
        apply(f, "QDRANT_COLLECTION", &mut config.store.qdrant_collection)?;

        apply(f, "OLLAMA_URL", &mut config.llm.ollama_url)?;
        apply(f, "LLM_MODEL", &mut config.llm.llm_model)?;
        apply(f, "EMBEDDING_MODEL", &mut config.llm.embedding_model)?;

        apply(f, "CHUNK_SIZE", &mut config.chunking.chunk_size)?;
        apply(f, "CHUNK_OVERLAP", &mut config.chunking.chunk_overlap)?;
        apply(f, "MAX_CONCURRENT_LLM_CALLS", &mut config.concurrency.max_concurrent_llm_calls)?;
        apply(f, "BLOCKING_POOL_SIZE", &mut config.concurrency.blocking_pool_size)?;

        apply(f, "MAX_RETRIES", &mut config.retry.max_retries)?;
        apply(f, "RETRY_MIN_WAIT", &mut config.retry.min_wait_secs)?;
        apply(f, "RETRY_MAX_WAIT", &mut config.retry.max_wait_secs)?;

        apply(f, "VECTOR_SEARCH_K", &mut config.retrieval.vector_search_k)?;
        apply(f, "VECTOR_BATCH_SIZE", &mut config.retrieval.vector_batch_size)?;

        apply(f, "BIND_ADDR", &mut config.server.bind_addr)?;
        apply(f, "LOG_FORMAT", &mut config.server.log_format)?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.chunker_config()
            .validate()
            .context("invalid CHUNK_SIZE / CHUNK_OVERLAP")?;

        let limits = [
            ("MAX_CONCURRENT_LLM_CALLS", self.concurrency.max_concurrent_llm_calls),
            ("BLOCKING_POOL_SIZE", self.concurrency.blocking_pool_size),
            ("MAX_RETRIES", self.retry.max_retries),
            ("VECTOR_SEARCH_K", self.retrieval.vector_search_k),
            ("VECTOR_BATCH_SIZE", self.retrieval.vector_batch_size),
        ];
        for (name, value) in limits {
            if value == 0 {
                bail!("{} must be greater than zero", name);
            }
        }

        if self.retry.min_wait_secs > self.retry.max_wait_secs {
            bail!("RETRY_MIN_WAIT must not exceed RETRY_MAX_WAIT");
        }

        if self.store.backend == StoreBackend::Neo4j {
            let credentials = [
                ("NEO4J_RW_USER", &self.store.rw_user),
                ("NEO4J_RW_PASSWORD", &self.store.rw_password),
                ("NEO4J_RO_USER", &self.store.ro_user),
                ("NEO4J_RO_PASSWORD", &self.store.ro_password),
            ];
            for (name, value) in credentials {
                if value.is_empty() {
                    bail!("{} is required for the neo4j backend", name);
                }
            }
        }

        Ok(())
    }

    pub fn chunker_config(&self) -> ChunkerConfig {
        ChunkerConfig {
            chunk_size: self.chunking.chunk_size,
            chunk_overlap: self.chunking.chunk_overlap,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry.max_retries,
            Duration::from_secs(self.retry.min_wait_secs),
            Duration::from_secs(self.retry.max_wait_secs),
        )
    }
}
