use chrono::{DateTime, Utc};
use extract::ExtractionOrchestrator;
use ingest::{Chunker, Error, Result, generate_document_id};
use serde::Serialize;
use std::fmt;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::writer::BatchWriter;

/// Summary of one successfully ingested document
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestionRecord {
    pub document_id: String,
    pub filename: String,
    pub timestamp: DateTime<Utc>,
    pub chunk_count: usize,
    pub entity_count: usize,
    pub relationship_count: usize,
    /// Chunks whose extraction failed and contributed nothing
    pub failed_chunks: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestionState {
    Pending,
    Chunking,
    Extracting,
    Validating,
    Writing,
    Completed,
    Failed,
    Cancelled,
}

impl IngestionState {
    pub fn can_transition_to(self, next: IngestionState) -> bool {
        use IngestionState::*;
        matches!(
            (self, next),
            (Pending, Chunking)
                | (Chunking, Extracting)
                | (Chunking, Failed)
                | (Extracting, Validating)
                | (Extracting, Cancelled)
                | (Validating, Writing)
                | (Writing, Completed)
                | (Writing, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            IngestionState::Completed | IngestionState::Failed | IngestionState::Cancelled
        )
    }
}

impl fmt::Display for IngestionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IngestionState::Pending => "pending",
            IngestionState::Chunking => "chunking",
            IngestionState::Extracting => "extracting",
            IngestionState::Validating => "validating",
            IngestionState::Writing => "writing",
            IngestionState::Completed => "completed",
            IngestionState::Failed => "failed",
            IngestionState::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

struct StateTracker<'a> {
    document_id: &'a str,
    state: IngestionState,
    observer: Option<&'a UnboundedSender<IngestionState>>,
}

impl StateTracker<'_> {
    fn advance(&mut self, next: IngestionState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal ingestion transition {} -> {}",
            self.state,
            next
        );
        info!(
            document_id = self.document_id,
            from = %self.state,
            to = %next,
            "Ingestion state changed"
        );
        self.state = next;
        if let Some(observer) = self.observer {
            // A dropped receiver only means nobody is watching
            let _ = observer.send(next);
        }
    }
}

/// Drives one document from raw text to stored graph and chunks
pub struct IngestionPipeline {
    chunker: Chunker,
    orchestrator: ExtractionOrchestrator,
    writer: BatchWriter,
    concurrency_limit: usize,
}

impl IngestionPipeline {
    pub fn new(
        chunker: Chunker,
        orchestrator: ExtractionOrchestrator,
        writer: BatchWriter,
        concurrency_limit: usize,
    ) -> Self {
        Self {
            chunker,
            orchestrator,
            writer,
            concurrency_limit: concurrency_limit.max(1),
        }
    }

    pub async fn ingest(&self, text: &str, filename: &str) -> Result<IngestionRecord> {
        self.ingest_with(text, filename, &CancellationToken::new(), None)
            .await
    }

    /// Like [`ingest`](Self::ingest), reporting every state change to
    /// `observer` and stopping extraction when `cancel` fires
    pub async fn ingest_with(
        &self,
        text: &str,
        filename: &str,
        cancel: &CancellationToken,
        observer: Option<&UnboundedSender<IngestionState>>,
    ) -> Result<IngestionRecord> {
        let document_id = generate_document_id();
        let mut tracker = StateTracker {
            document_id: &document_id,
            state: IngestionState::Pending,
            observer,
        };

        tracker.advance(IngestionState::Chunking);
        let chunks = self.chunker.chunk(text);
        if chunks.is_empty() {
            tracker.advance(IngestionState::Failed);
            return Err(Error::UsagePrecondition(format!(
                "'{}' contains no text",
                filename
            )));
        }
        info!(document_id = %document_id, filename, chunks = chunks.len(), "Document chunked");

        tracker.advance(IngestionState::Extracting);
        let outcome = self
            .orchestrator
            .extract(&chunks, self.concurrency_limit, cancel)
            .await;
        if outcome.cancelled || cancel.is_cancelled() {
            tracker.advance(IngestionState::Cancelled);
            return Err(Error::Cancelled);
        }

        tracker.advance(IngestionState::Validating);
        let failed_chunks = outcome.failures.len();
        if failed_chunks > 0 {
            warn!(
                document_id = %document_id,
                failed = failed_chunks,
                total = chunks.len(),
                "Some chunks produced no extraction"
            );
        }

        tracker.advance(IngestionState::Writing);
        match self
            .writer
            .write(&document_id, filename, &chunks, outcome.fragments)
            .await
        {
            Ok(record) => {
                tracker.advance(IngestionState::Completed);
                Ok(IngestionRecord {
                    failed_chunks,
                    ..record
                })
            }
            Err(e) => {
                warn!(document_id = %document_id, error = %e, "Ingestion failed");
                tracker.advance(IngestionState::Failed);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::ReadWriteCredential;
    use crate::memory::{InMemoryGraphStore, InMemoryVectorStore};
    use crate::offload::BlockingPool;
    use crate::writer::fast_retry;
    use async_trait::async_trait;
    use extract::{Extractor, LlmCapability};
    use ingest::ChunkerConfig;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::mpsc;

    const EXTRACTION: &str = r#"{
        "entities": [
            {"name": "Alice", "type": "PERSON", "description": "engineer"},
            {"name": "Acme", "type": "ORGANIZATION", "description": "company"}
        ],
        "relationships": [
            {"source": "Alice", "relation_type": "WORKS_AT", "target": "Acme", "description": ""}
        ]
    }"#;

    struct CannedLlm {
        response: &'static str,
        delay: Duration,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LlmCapability for CannedLlm {
        async fn generate(&self, _prompt: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Ok(self.response.to_string())
        }
    }

    struct Harness {
        pipeline: IngestionPipeline,
        llm: Arc<CannedLlm>,
        graph: Arc<InMemoryGraphStore>,
        vectors: Arc<InMemoryVectorStore>,
    }

    fn harness(response: &'static str) -> Harness {
        slow_harness(response, Duration::ZERO)
    }

    fn slow_harness(response: &'static str, delay: Duration) -> Harness {
        let llm = Arc::new(CannedLlm {
            response,
            delay,
            calls: AtomicUsize::new(0),
        });
        let graph = Arc::new(InMemoryGraphStore::new());
        let vectors = Arc::new(InMemoryVectorStore::new());

        let chunker = Chunker::new(ChunkerConfig {
            chunk_size: 40,
            chunk_overlap: 5,
        })
        .unwrap();
        let orchestrator = ExtractionOrchestrator::new(Extractor::new(llm.clone(), fast_retry()));
        let writer = BatchWriter::new(
            graph.clone(),
            vectors.clone(),
            BlockingPool::new(2),
            ReadWriteCredential::new("writer", "pw"),
        )
        .with_retry(fast_retry());

        Harness {
            pipeline: IngestionPipeline::new(chunker, orchestrator, writer, 4),
            llm,
            graph,
            vectors,
        }
    }

    const TEXT: &str = "Alice joined Acme in 2019.\n\nShe leads the platform team at Acme.";

    #[tokio::test]
    async fn test_ingest_completes_and_reports_states() {
        let h = harness(EXTRACTION);
        let (tx, mut rx) = mpsc::unbounded_channel();

        let record = h
            .pipeline
            .ingest_with(TEXT, "team.md", &CancellationToken::new(), Some(&tx))
            .await
            .unwrap();

        assert_eq!(record.filename, "team.md");
        assert_eq!(record.entity_count, 2);
        assert_eq!(record.relationship_count, 1);
        assert_eq!(record.failed_chunks, 0);
        assert_eq!(record.chunk_count, h.vectors.len());
        assert_eq!(h.graph.entity_count(), 2);

        drop(tx);
        let mut states = Vec::new();
        while let Some(state) = rx.recv().await {
            states.push(state);
        }
        assert_eq!(
            states,
            vec![
                IngestionState::Chunking,
                IngestionState::Extracting,
                IngestionState::Validating,
                IngestionState::Writing,
                IngestionState::Completed,
            ]
        );
    }

    #[tokio::test]
    async fn test_empty_input_fails_before_any_store_call() {
        let h = harness(EXTRACTION);

        let result = h.pipeline.ingest("  \n\t  ", "blank.txt").await;

        assert!(matches!(result, Err(Error::UsagePrecondition(_))));
        assert_eq!(h.llm.calls.load(Ordering::SeqCst), 0);
        assert!(h.graph.calls().is_empty());
        assert!(h.vectors.batches().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_chunks_do_not_fail_ingestion_but_empty_graph_does() {
        let h = harness("I could not find anything");

        let result = h.pipeline.ingest(TEXT, "team.md").await;

        // Every chunk degraded, so nothing is left to write
        assert!(matches!(result, Err(Error::Validation(_))));
        assert!(h.graph.calls().is_empty());
    }

    #[tokio::test]
    async fn test_store_failure_ends_in_failed_state() {
        let h = harness(EXTRACTION);
        h.graph.set_fail_writes(true);
        let (tx, mut rx) = mpsc::unbounded_channel();

        let result = h
            .pipeline
            .ingest_with(TEXT, "team.md", &CancellationToken::new(), Some(&tx))
            .await;

        assert!(matches!(result, Err(Error::WriteUnavailable(_))));
        drop(tx);
        let mut last = None;
        while let Some(state) = rx.recv().await {
            last = Some(state);
        }
        assert_eq!(last, Some(IngestionState::Failed));
    }

    #[tokio::test]
    async fn test_cancelled_ingestion_writes_nothing() {
        let h = harness(EXTRACTION);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = h.pipeline.ingest_with(TEXT, "team.md", &cancel, None).await;

        assert!(matches!(result, Err(Error::Cancelled)));
        assert!(h.graph.calls().is_empty());
        assert!(h.vectors.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_during_extraction_of_single_chunk_writes_nothing() {
        let h = slow_harness(EXTRACTION, Duration::from_millis(50));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });
        let (tx, mut rx) = mpsc::unbounded_channel();

        let result = h
            .pipeline
            .ingest_with("Alice joined Acme.", "short.txt", &cancel, Some(&tx))
            .await;

        assert!(matches!(result, Err(Error::Cancelled)));
        assert_eq!(h.llm.calls.load(Ordering::SeqCst), 1);
        assert!(h.graph.calls().is_empty());
        assert!(h.vectors.is_empty());

        drop(tx);
        let mut last = None;
        while let Some(state) = rx.recv().await {
            last = Some(state);
        }
        assert_eq!(last, Some(IngestionState::Cancelled));
    }

    #[test]
    fn test_transition_table() {
        use IngestionState::*;
        assert!(Pending.can_transition_to(Chunking));
        assert!(Chunking.can_transition_to(Failed));
        assert!(Extracting.can_transition_to(Cancelled));
        assert!(Writing.can_transition_to(Failed));
        assert!(!Extracting.can_transition_to(Failed));
        assert!(!Completed.can_transition_to(Writing));
        assert!(!Pending.can_transition_to(Writing));
        assert!(Cancelled.is_terminal() && Completed.is_terminal());
    }
}
