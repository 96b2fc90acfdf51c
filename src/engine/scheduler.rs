//! Job admission and worker threads
//!
//! Each admitted job runs its decode loop on a dedicated OS thread so the
//! async runtime serving HTTP never blocks on model compute. A semaphore caps
//! how many of those threads exist at once.

use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use super::{GenerationEngine, GenerationJob};
use crate::stream::{self, ChunkStream, TextSink};

/// Why a job could not be started
#[derive(Debug)]
pub enum SubmitError {
    /// Every generation slot is taken
    Busy { limit: usize },
    /// Tokenization or thread spawn failed
    Engine(anyhow::Error),
}

impl fmt::Display for SubmitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmitError::Busy { limit } => {
                write!(f, "all {} generation slots are busy", limit)
            }
            SubmitError::Engine(e) => write!(f, "failed to start generation: {:#}", e),
        }
    }
}

impl std::error::Error for SubmitError {}

/// Why a decode loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Token budget spent
    Length,
    /// The engine stopped by itself (end-of-sequence token or full context)
    Stopped,
    /// The consumer went away
    Cancelled,
}

/// Outcome of a finished job, for logging
#[derive(Debug, Clone)]
pub struct GenerationSummary {
    pub generated_tokens: usize,
    pub stop_reason: StopReason,
    pub elapsed: Duration,
}

impl GenerationSummary {
    pub fn tokens_per_sec(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.generated_tokens as f64 / secs
        } else {
            0.0
        }
    }
}

/// Starts generation jobs against a shared engine
pub struct Scheduler {
    engine: Arc<dyn GenerationEngine>,
    permits: Arc<Semaphore>,
    limit: usize,
}

impl Scheduler {
    /// Create a scheduler allowing `max_concurrent` decode threads (at least one)
    pub fn new(engine: Arc<dyn GenerationEngine>, max_concurrent: usize) -> Self {
        let limit = max_concurrent.max(1);
        Self {
            engine,
            permits: Arc::new(Semaphore::new(limit)),
            limit,
        }
    }

    /// Maximum number of concurrent decode threads
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Number of jobs currently holding a slot
    pub fn in_flight(&self) -> usize {
        self.limit - self.permits.available_permits()
    }

    /// Start `job` on a new worker thread and return its output stream.
    ///
    /// Fails fast with [`SubmitError::Busy`] when no slot is free; there is
    /// no waiting queue. Tokenization happens here, so a bad prompt is
    /// reported before any output exists.
    pub fn submit(&self, job: GenerationJob) -> Result<ChunkStream, SubmitError> {
        let permit = Arc::clone(&self.permits)
            .try_acquire_owned()
            .map_err(|_| SubmitError::Busy { limit: self.limit })?;

        // On the caller's thread so a bad prompt fails before the 200 goes
        // out. Encoding a short prompt is cheap next to the decode loop.
        let prompt_ids = self
            .engine
            .tokenize(&job.prompt)
            .map_err(SubmitError::Engine)?;
        if prompt_ids.is_empty() {
            return Err(SubmitError::Engine(anyhow!("prompt produced no tokens")));
        }

        let (sender, chunks) = stream::channel();
        let engine = Arc::clone(&self.engine);

        tracing::info!(
            job_id = %job.id,
            model = engine.model_id(),
            prompt_tokens = prompt_ids.len(),
            max_new_tokens = job.max_new_tokens,
            "Starting generation"
        );

        thread::Builder::new()
            .name(format!("generate-{}", job.short_id()))
            .spawn(move || {
                let sink = TextSink::new(Arc::clone(&engine), sender, job.max_new_tokens);
                run_job(engine.as_ref(), &job, &prompt_ids, sink, permit);
            })
            .map_err(|e| SubmitError::Engine(e.into()))?;

        Ok(chunks)
    }
}

/// Worker thread body. The permit is released when this returns.
fn run_job(
    engine: &dyn GenerationEngine,
    job: &GenerationJob,
    prompt_ids: &[u32],
    mut sink: TextSink<Arc<dyn GenerationEngine>>,
    _permit: OwnedSemaphorePermit,
) {
    let start = Instant::now();
    let result = drive(engine, job, prompt_ids, &mut sink);

    let summary = GenerationSummary {
        generated_tokens: sink.generated(),
        stop_reason: if sink.is_cancelled() {
            StopReason::Cancelled
        } else if sink.is_exhausted() {
            StopReason::Length
        } else {
            StopReason::Stopped
        },
        elapsed: start.elapsed(),
    };

    match &result {
        Ok(()) => tracing::info!(
            job_id = %job.id,
            "Generated {} tokens in {:?} ({:.2} tok/s, {:?})",
            summary.generated_tokens,
            summary.elapsed,
            summary.tokens_per_sec(),
            summary.stop_reason
        ),
        Err(e) => tracing::error!(
            job_id = %job.id,
            generated_tokens = summary.generated_tokens,
            "Generation failed: {:#}",
            e
        ),
    }

    sink.finish(result);
}

fn drive(
    engine: &dyn GenerationEngine,
    job: &GenerationJob,
    prompt_ids: &[u32],
    sink: &mut TextSink<Arc<dyn GenerationEngine>>,
) -> Result<()> {
    if !job.skip_prompt {
        sink.prime(prompt_ids)?;
    }
    engine.generate(prompt_ids, job.max_new_tokens, &job.sampling, sink)
}

#[cfg(test)]
mod tests {
    use std::ops::ControlFlow;

    use futures::StreamExt;

    use super::*;
    use crate::config::GenerationConfig;
    use crate::engine::{SamplingParams, StubEngine};
    use crate::stream::{Detokenize, TokenSink};

    fn default_job() -> GenerationJob {
        GenerationJob::from_config(&GenerationConfig::default())
    }

    async fn wait_idle(scheduler: &Scheduler) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while scheduler.in_flight() > 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("worker thread did not finish");
    }

    /// Ignores both the budget and `Break`.
    struct Runaway;

    impl Detokenize for Runaway {
        fn detokenize(&self, ids: &[u32]) -> Result<String> {
            Ok(ids.iter().map(|_| "x ").collect())
        }
    }

    impl GenerationEngine for Runaway {
        fn model_id(&self) -> &str {
            "runaway"
        }

        fn tokenize(&self, text: &str) -> Result<Vec<u32>> {
            Ok(text.split_whitespace().map(|_| 1).collect())
        }

        fn generate(
            &self,
            _prompt_ids: &[u32],
            _max_new_tokens: usize,
            _sampling: &SamplingParams,
            sink: &mut dyn TokenSink,
        ) -> Result<()> {
            for _ in 0..1000 {
                let _: ControlFlow<()> = sink.put(1)?;
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_default_job_streams_prompt_and_continuation() {
        let scheduler = Scheduler::new(Arc::new(StubEngine::new()), 1);
        let text = scheduler.submit(default_job()).unwrap().collect_text().await.unwrap();
        assert_eq!(
            text,
            "An increasing sequence: one, two, three, four, five, six, seven, eight, nine, "
        );
    }

    #[tokio::test]
    async fn test_skip_prompt() {
        let scheduler = Scheduler::new(Arc::new(StubEngine::new()), 1);
        let mut job = default_job();
        job.skip_prompt = true;
        job.max_new_tokens = 11;
        let text = scheduler.submit(job).unwrap().collect_text().await.unwrap();
        assert_eq!(text, " two, three");
    }

    #[tokio::test]
    async fn test_budget_holds_for_engines_that_ignore_it() {
        let scheduler = Scheduler::new(Arc::new(Runaway), 1);
        let mut job = default_job();
        job.skip_prompt = true;
        job.max_new_tokens = 7;

        let text = scheduler.submit(job).unwrap().collect_text().await.unwrap();
        assert_eq!(text.matches('x').count(), 7);
    }

    #[tokio::test]
    async fn test_rejects_when_all_slots_busy() {
        let engine = StubEngine::new().with_token_delay(Duration::from_millis(5));
        let scheduler = Scheduler::new(Arc::new(engine), 1);

        let first = scheduler.submit(default_job()).unwrap();
        assert_eq!(scheduler.in_flight(), 1);
        match scheduler.submit(default_job()) {
            Err(SubmitError::Busy { limit }) => assert_eq!(limit, 1),
            other => panic!("expected Busy, got {:?}", other.map(|_| ())),
        }

        first.collect_text().await.unwrap();
        wait_idle(&scheduler).await;
        assert!(scheduler.submit(default_job()).is_ok());
    }

    #[tokio::test]
    async fn test_engine_failure_reaches_consumer() {
        let scheduler = Scheduler::new(Arc::new(StubEngine::new().with_failure_after(20)), 1);
        let mut chunks = scheduler.submit(default_job()).unwrap();

        let mut received = String::new();
        let mut error = None;
        while let Some(chunk) = chunks.next().await {
            match chunk {
                Ok(text) => received.push_str(&text),
                Err(e) => error = Some(e),
            }
        }
        assert!(received.starts_with("An increasing sequence: "));
        assert!(error.unwrap().to_string().contains("after 20 tokens"));
        wait_idle(&scheduler).await;
    }

    #[tokio::test]
    async fn test_dropping_consumer_stops_worker() {
        let engine = StubEngine::new().with_token_delay(Duration::from_millis(2));
        let scheduler = Scheduler::new(Arc::new(engine), 1);
        let mut job = default_job();
        job.max_new_tokens = 100_000;

        let mut chunks = scheduler.submit(job).unwrap();
        assert!(chunks.next().await.unwrap().is_ok());
        drop(chunks);

        // At 2ms per token the full budget would take minutes.
        wait_idle(&scheduler).await;
    }

    #[test]
    fn test_empty_prompt_is_rejected() {
        let scheduler = Scheduler::new(Arc::new(StubEngine::new()), 1);
        let mut job = default_job();
        job.prompt.clear();
        assert!(matches!(scheduler.submit(job), Err(SubmitError::Engine(_))));
        assert_eq!(scheduler.in_flight(), 0);
    }

    /// Rejects every prompt at tokenization.
    struct Untokenizable;

    impl Detokenize for Untokenizable {
        fn detokenize(&self, _ids: &[u32]) -> Result<String> {
            Ok(String::new())
        }
    }

    impl GenerationEngine for Untokenizable {
        fn model_id(&self) -> &str {
            "untokenizable"
        }

        fn tokenize(&self, _text: &str) -> Result<Vec<u32>> {
            Err(anyhow!("tokenizer rejected the prompt"))
        }

        fn generate(
            &self,
            _prompt_ids: &[u32],
            _max_new_tokens: usize,
            _sampling: &SamplingParams,
            _sink: &mut dyn TokenSink,
        ) -> Result<()> {
            unreachable!("generate after a failed tokenize")
        }
    }

    #[test]
    fn test_tokenizer_error_fails_submit_and_frees_slot() {
        let scheduler = Scheduler::new(Arc::new(Untokenizable), 1);
        match scheduler.submit(default_job()) {
            Err(SubmitError::Engine(e)) => assert!(e.to_string().contains("tokenizer")),
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("submit should fail"),
        }
        assert_eq!(scheduler.in_flight(), 0);
    }

    #[test]
    fn test_zero_limit_still_admits_one() {
        let scheduler = Scheduler::new(Arc::new(StubEngine::new()), 0);
        assert_eq!(scheduler.limit(), 1);
    }
}
