//! Extraction pipeline: chunk → extract (concurrently) → aggregate
//!
//! A run is the expensive part of a session. It happens at most once per
//! document; follow-up turns reuse the resulting corpus.

pub mod aggregator;
pub mod chunker;
pub mod extractor;

pub use aggregator::{AggregatedCorpus, aggregate};
pub use chunker::{Chunk, DEFAULT_CHUNK_SIZE, chunk_document, estimate_tokens};
pub use extractor::{Extraction, Extractor, parse_extraction};

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::llm::{LlmClient, LlmError};

/// Number of progress-reporting stages (Done is not counted)
pub const TOTAL_STAGES: usize = 3;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no content to process")]
    NoContent,

    #[error("processing cancelled")]
    Cancelled,

    #[error("extraction task failed: {0}")]
    Join(#[from] JoinError),
}

/// Pipeline stage for progress reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Chunking,
    Extracting,
    Aggregating,
    Done,
}

impl Stage {
    /// One-based position among [`TOTAL_STAGES`]
    pub fn index(&self) -> usize {
        match self {
            Stage::Chunking => 1,
            Stage::Extracting => 2,
            Stage::Aggregating | Stage::Done => 3,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Stage::Chunking => "chunking",
            Stage::Extracting => "extracting",
            Stage::Aggregating => "aggregating",
            Stage::Done => "done",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A progress report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    pub stage: Stage,
    pub stage_index: usize,
    pub total_stages: usize,
    pub item_index: usize,
    pub total_items: usize,
    pub message: String,
}

impl Progress {
    pub fn new(stage: Stage, item_index: usize, total_items: usize, message: impl Into<String>) -> Self {
        Self {
            stage,
            stage_index: stage.index(),
            total_stages: TOTAL_STAGES,
            item_index,
            total_items,
            message: message.into(),
        }
    }
}

/// Progress sink; called from the pipeline's own task
pub type ProgressFn<'a> = &'a (dyn Fn(Progress) + Send + Sync);

/// Output of a pipeline run
#[derive(Debug, Clone)]
pub struct PipelineResult {
    pub corpus: AggregatedCorpus,
    pub chunks: Vec<Chunk>,
    /// Successful extractions, ordered by chunk id
    pub extractions: Vec<Extraction>,
    /// Chunks whose extraction call failed and were skipped
    pub failed_chunks: Vec<usize>,
}

/// Chunk, extract and aggregate a document
pub struct Pipeline {
    extractor: Extractor,
    chunk_size: usize,
    max_concurrent: usize,
}

impl Pipeline {
    pub fn new(llm: Arc<dyn LlmClient>, extraction_prompt: impl Into<String>, config: &PipelineConfig) -> Self {
        debug!(?config, "Pipeline::new: called");
        Self {
            extractor: Extractor::new(llm, extraction_prompt, config.extraction_timeout()),
            chunk_size: config.chunk_size,
            max_concurrent: config.max_concurrent_extractions.max(1),
        }
    }

    /// Run the whole pipeline over `text`
    ///
    /// Per-chunk transport failures are logged and skipped; if every chunk
    /// fails the corpus is simply empty. Cancellation aborts in-flight
    /// extraction calls and waits for them to wind down before returning.
    pub async fn run(
        &self,
        text: &str,
        progress: ProgressFn<'_>,
        cancel: &CancellationToken,
    ) -> Result<PipelineResult, PipelineError> {
        debug!(text_len = text.len(), "Pipeline::run: called");

        progress(Progress::new(Stage::Chunking, 0, 0, "Splitting document into chunks"));
        let chunks = chunk_document(text, self.chunk_size);
        if chunks.is_empty() {
            debug!("Pipeline::run: no chunks");
            return Err(PipelineError::NoContent);
        }
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        let total = chunks.len();
        info!("Extracting {} chunks ({} at a time)", total, self.max_concurrent);
        progress(Progress::new(
            Stage::Extracting,
            0,
            total,
            format!("Extracting 0/{} chunks", total),
        ));

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let mut tasks = JoinSet::new();
        for chunk in &chunks {
            let chunk = chunk.clone();
            let extractor = self.extractor.clone();
            let semaphore = semaphore.clone();
            tasks.spawn(async move {
                let result = match semaphore.acquire_owned().await {
                    Ok(_permit) => extractor.extract(&chunk).await,
                    Err(_) => Err(LlmError::InvalidResponse("extraction limiter closed".to_string())),
                };
                (chunk.id, result)
            });
        }

        let mut extractions = Vec::with_capacity(total);
        let mut failed_chunks = Vec::new();
        let mut completed = 0usize;

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    debug!("Pipeline::run: cancelled, aborting extractions");
                    tasks.abort_all();
                    while tasks.join_next().await.is_some() {}
                    return Err(PipelineError::Cancelled);
                }

                joined = tasks.join_next() => {
                    let Some(joined) = joined else { break };
                    let (chunk_id, result) = match joined {
                        Ok(pair) => pair,
                        Err(e) => {
                            tasks.abort_all();
                            while tasks.join_next().await.is_some() {}
                            return Err(e.into());
                        }
                    };
                    completed += 1;
                    match result {
                        Ok(extraction) => extractions.push(extraction),
                        Err(e) => {
                            warn!(%chunk_id, error = %e, "Pipeline::run: extraction failed, skipping chunk");
                            failed_chunks.push(chunk_id);
                        }
                    }
                    progress(Progress::new(
                        Stage::Extracting,
                        completed,
                        total,
                        format!("Extracted {}/{} chunks", completed, total),
                    ));
                }
            }
        }

        // Completion order is arbitrary; aggregate in document order
        extractions.sort_by_key(|e| e.chunk_id);
        failed_chunks.sort_unstable();

        progress(Progress::new(
            Stage::Aggregating,
            0,
            extractions.len(),
            format!("Aggregating {} extractions", extractions.len()),
        ));
        let corpus = aggregate(&extractions);

        info!(
            "Pipeline done: {} chunks, {} extracted, {} failed, {} corpus words",
            total,
            extractions.len(),
            failed_chunks.len(),
            corpus.word_count
        );
        progress(Progress::new(Stage::Done, total, total, "Document ready"));

        Ok(PipelineResult {
            corpus,
            chunks,
            extractions,
            failed_chunks,
        })
    }
}
