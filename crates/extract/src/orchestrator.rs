//! Bounded fan-out of chunk extraction with a fan-in barrier.

use ingest::{Chunk, Error};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::Extractor;
use crate::schema::KnowledgeGraphFragment;

#[derive(Debug)]
pub struct ChunkFailure {
    /// `None` when the extraction task itself died
    pub chunk_index: Option<usize>,
    pub error: Error,
}

#[derive(Debug, Default)]
pub struct ExtractionOutcome {
    /// One per scheduled chunk; failed chunks contribute an empty fragment
    pub fragments: Vec<KnowledgeGraphFragment>,
    pub failures: Vec<ChunkFailure>,
    /// Set when cancellation fired before extraction finished
    pub cancelled: bool,
}

impl ExtractionOutcome {
    pub fn entity_count(&self) -> usize {
        self.fragments.iter().map(|f| f.entities.len()).sum()
    }

    pub fn relationship_count(&self) -> usize {
        self.fragments.iter().map(|f| f.relationships.len()).sum()
    }
}

pub struct ExtractionOrchestrator {
    extractor: Extractor,
}

impl ExtractionOrchestrator {
    pub fn new(extractor: Extractor) -> Self {
        Self { extractor }
    }

    /// Run extraction for every chunk with at most `concurrency_limit`
    /// requests in flight, and wait for all of them.
    ///
    /// A permit is taken before a task is spawned and released when it
    /// finishes, so the bound covers retries and backoff too. Once `cancel`
    /// fires no further chunk is scheduled; running tasks are left to finish.
    pub async fn extract(
        &self,
        chunks: &[Chunk],
        concurrency_limit: usize,
        cancel: &CancellationToken,
    ) -> ExtractionOutcome {
        let semaphore = Arc::new(Semaphore::new(concurrency_limit.max(1)));
        let mut tasks = JoinSet::new();
        let mut cancelled = false;

        for chunk in chunks {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    cancelled = true;
                    break;
                }
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let extractor = self.extractor.clone();
            let chunk = chunk.clone();
            tasks.spawn(async move {
                let _permit = permit;
                let result = extractor.extract_chunk(&chunk).await;
                (chunk.index, result)
            });
        }

        if cancelled {
            warn!(
                scheduled = tasks.len(),
                total = chunks.len(),
                "Extraction cancelled, waiting for in-flight chunks"
            );
        }

        // Fan-in: this loop is the only place results are appended
        let mut outcome = ExtractionOutcome {
            cancelled,
            ..Default::default()
        };
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(fragment))) => outcome.fragments.push(fragment),
                Ok((index, Err(error))) => {
                    warn!(
                        chunk = index,
                        error = %error,
                        "Chunk extraction failed, using empty fragment"
                    );
                    outcome.fragments.push(KnowledgeGraphFragment::default());
                    outcome.failures.push(ChunkFailure {
                        chunk_index: Some(index),
                        error,
                    });
                }
                Err(join_error) => {
                    warn!(error = %join_error, "Extraction task aborted");
                    outcome.fragments.push(KnowledgeGraphFragment::default());
                    outcome.failures.push(ChunkFailure {
                        chunk_index: None,
                        error: Error::Provider(format!("extraction task failed: {}", join_error)),
                    });
                }
            }
        }

        // Fired while waiting on the last in-flight chunks
        if !outcome.cancelled && cancel.is_cancelled() {
            warn!("Extraction cancelled while draining in-flight chunks");
            outcome.cancelled = true;
        }

        info!(
            chunks = outcome.fragments.len(),
            failed = outcome.failures.len(),
            entities = outcome.entity_count(),
            relationships = outcome.relationship_count(),
            "Extraction finished"
        );

        outcome
    }
}
