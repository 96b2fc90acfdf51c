//! A single generation request

use uuid::Uuid;

use crate::config::GenerationConfig;

/// Sampling knobs handed to the engine's decode loop
#[derive(Debug, Clone, PartialEq)]
pub struct SamplingParams {
    /// Temperature (0 = greedy)
    pub temperature: f64,
    pub top_p: Option<f64>,
    pub top_k: Option<usize>,
    pub seed: u64,
    /// Repetition penalty (1.0 = off)
    pub repeat_penalty: f32,
    pub repeat_last_n: usize,
}

impl SamplingParams {
    pub fn is_greedy(&self) -> bool {
        self.temperature <= 0.0
    }
}

impl From<&GenerationConfig> for SamplingParams {
    fn from(config: &GenerationConfig) -> Self {
        Self {
            temperature: config.temperature,
            top_p: config.top_p,
            top_k: config.top_k,
            seed: config.seed,
            repeat_penalty: config.repeat_penalty,
            repeat_last_n: config.repeat_last_n,
        }
    }
}

/// One run of the decode loop. Owned by the worker thread that executes it.
#[derive(Debug, Clone)]
pub struct GenerationJob {
    pub id: Uuid,
    pub prompt: String,
    pub max_new_tokens: usize,
    /// Leave the prompt out of the streamed text
    pub skip_prompt: bool,
    pub sampling: SamplingParams,
}

impl GenerationJob {
    /// Build a job from configured defaults
    pub fn from_config(config: &GenerationConfig) -> Self {
        Self {
            id: Uuid::new_v4(),
            prompt: config.prompt.clone(),
            max_new_tokens: config.max_new_tokens,
            skip_prompt: config.skip_prompt,
            sampling: SamplingParams::from(config),
        }
    }

    /// First block of the id, for thread names
    pub fn short_id(&self) -> String {
        self.id.simple().to_string()[..8].to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_from_default_config() {
        let job = GenerationJob::from_config(&GenerationConfig::default());
        assert_eq!(job.prompt, "An increasing sequence: one,");
        assert_eq!(job.max_new_tokens, 50);
        assert!(!job.skip_prompt);
        assert!(job.sampling.is_greedy());
        assert_eq!(job.short_id().len(), 8);
    }

    #[test]
    fn test_jobs_get_distinct_ids() {
        let config = GenerationConfig::default();
        let a = GenerationJob::from_config(&config);
        let b = GenerationJob::from_config(&config);
        assert_ne!(a.id, b.id);
    }
}
