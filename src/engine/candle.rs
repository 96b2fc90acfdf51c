//! Llama-family checkpoints through candle
//!
//! Weights, `config.json` and `tokenizer.json` come from the HuggingFace hub
//! (cached locally by hf-hub) or from a local directory.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Error as E, Result};
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::generation::{LogitsProcessor, Sampling};
use candle_transformers::models::llama::{Cache, Config, Llama, LlamaConfig, LlamaEosToks};
use hf_hub::api::sync::{Api, ApiRepo};
use hf_hub::{Repo, RepoType};
use tokenizers::Tokenizer;

use super::{GenerationEngine, SamplingParams};
use crate::config::{parse_dtype, ModelConfig};
use crate::stream::{Detokenize, TokenSink};

/// Tokens treated as end-of-sequence when config.json names none
const FALLBACK_EOS_TOKENS: &[&str] = &["</s>", "<|endoftext|>"];

/// A llama model loaded once and shared by all worker threads
pub struct CandleEngine {
    model_id: String,
    model: Llama,
    config: Config,
    tokenizer: Tokenizer,
    eos_token_ids: Vec<u32>,
    device: Device,
    dtype: DType,
}

/// Files making up a checkpoint
struct ModelFiles {
    tokenizer: PathBuf,
    config: PathBuf,
    weights: Vec<PathBuf>,
}

impl ModelFiles {
    fn from_hub(model_id: &str, revision: &str) -> Result<Self> {
        let api = Api::new()?;
        let repo = api.repo(Repo::with_revision(
            model_id.to_string(),
            RepoType::Model,
            revision.to_string(),
        ));

        let tokenizer = repo.get("tokenizer.json")?;
        let config = repo.get("config.json")?;
        let weights = match repo.get("model.safetensors") {
            Ok(single) => vec![single],
            Err(_) => {
                let index = repo
                    .get("model.safetensors.index.json")
                    .context("repository has neither model.safetensors nor a shard index")?;
                shard_names(&index)?
                    .iter()
                    .map(|name| fetch(&repo, name))
                    .collect::<Result<Vec<_>>>()?
            }
        };

        Ok(Self {
            tokenizer,
            config,
            weights,
        })
    }

    fn from_dir(dir: &Path) -> Result<Self> {
        let single = dir.join("model.safetensors");
        let index = dir.join("model.safetensors.index.json");
        let weights = if single.exists() {
            vec![single]
        } else if index.exists() {
            shard_names(&index)?
                .iter()
                .map(|name| dir.join(name))
                .collect()
        } else {
            bail!("no safetensors weights found in {}", dir.display());
        };

        Ok(Self {
            tokenizer: dir.join("tokenizer.json"),
            config: dir.join("config.json"),
            weights,
        })
    }
}

fn fetch(repo: &ApiRepo, name: &str) -> Result<PathBuf> {
    repo.get(name)
        .with_context(|| format!("failed to download {}", name))
}

/// Shard file names listed in a `model.safetensors.index.json`
fn shard_names(index: &Path) -> Result<BTreeSet<String>> {
    let json: serde_json::Value = serde_json::from_slice(&std::fs::read(index)?)?;
    let weight_map = json
        .get("weight_map")
        .and_then(|m| m.as_object())
        .ok_or_else(|| anyhow!("no weight_map in {}", index.display()))?;

    Ok(weight_map
        .values()
        .filter_map(|v| v.as_str())
        .map(str::to_string)
        .collect())
}

fn select_device(cpu: bool) -> Result<Device> {
    if cpu {
        Ok(Device::Cpu)
    } else if candle_core::utils::cuda_is_available() {
        Ok(Device::new_cuda(0)?)
    } else if candle_core::utils::metal_is_available() {
        Ok(Device::new_metal(0)?)
    } else {
        Ok(Device::Cpu)
    }
}

/// candle only has flash attention when built with it; otherwise the first
/// forward pass hits `unimplemented!`.
fn check_flash_attn(requested: bool) -> Result<()> {
    if requested && !cfg!(feature = "flash-attn") {
        bail!("use_flash_attn is set but streamgen was built without the `flash-attn` feature");
    }
    Ok(())
}

/// Special tokens (EOS included) are left out of the streamed text.
fn decode_ids(tokenizer: &Tokenizer, ids: &[u32]) -> Result<String> {
    tokenizer.decode(ids, true).map_err(E::msg)
}

fn to_sampling(params: &SamplingParams) -> Sampling {
    if params.is_greedy() {
        return Sampling::ArgMax;
    }
    let temperature = params.temperature;
    match (params.top_k, params.top_p) {
        (None, None) => Sampling::All { temperature },
        (Some(k), None) => Sampling::TopK { k, temperature },
        (None, Some(p)) => Sampling::TopP { p, temperature },
        (Some(k), Some(p)) => Sampling::TopKThenTopP { k, p, temperature },
    }
}

impl CandleEngine {
    /// Load tokenizer and weights. Blocking, and slow on first download.
    pub fn load(config: &ModelConfig) -> Result<Self> {
        check_flash_attn(config.use_flash_attn)?;
        let device = select_device(config.cpu)?;
        let dtype = parse_dtype(&config.dtype)?;

        let files = match &config.local_dir {
            Some(dir) => ModelFiles::from_dir(dir)?,
            None => ModelFiles::from_hub(&config.model_id, &config.revision)?,
        };

        let llama_config: LlamaConfig = serde_json::from_slice(&std::fs::read(&files.config)?)
            .with_context(|| format!("invalid model config {}", files.config.display()))?;
        let model_config = llama_config.into_config(config.use_flash_attn);

        // SAFETY: the weight files are not modified while mapped.
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&files.weights, dtype, &device)? };
        let model = Llama::load(vb, &model_config)?;

        let tokenizer = Tokenizer::from_file(&files.tokenizer).map_err(E::msg)?;

        let eos_token_ids = match &model_config.eos_token_id {
            Some(LlamaEosToks::Single(id)) => vec![*id],
            Some(LlamaEosToks::Multiple(ids)) => ids.clone(),
            None => FALLBACK_EOS_TOKENS
                .iter()
                .filter_map(|t| tokenizer.token_to_id(t))
                .collect(),
        };

        tracing::info!(
            "Loaded {} ({} weight file(s), {:?}, {:?}, context {})",
            config.model_id,
            files.weights.len(),
            dtype,
            device,
            model_config.max_position_embeddings
        );

        Ok(Self {
            model_id: config.model_id.clone(),
            model,
            config: model_config,
            tokenizer,
            eos_token_ids,
            device,
            dtype,
        })
    }

    fn is_eos(&self, token: u32) -> bool {
        self.eos_token_ids.contains(&token)
    }
}

impl Detokenize for CandleEngine {
    /// Skips special tokens, unlike a plain `TextIteratorStreamer`, which
    /// would print them (EOS included) into the body.
    fn detokenize(&self, ids: &[u32]) -> Result<String> {
        decode_ids(&self.tokenizer, ids)
    }
}

impl GenerationEngine for CandleEngine {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn tokenize(&self, text: &str) -> Result<Vec<u32>> {
        let encoding = self.tokenizer.encode(text, true).map_err(E::msg)?;
        Ok(encoding.get_ids().to_vec())
    }

    fn generate(
        &self,
        prompt_ids: &[u32],
        max_new_tokens: usize,
        sampling: &SamplingParams,
        sink: &mut dyn TokenSink,
    ) -> Result<()> {
        let mut cache = Cache::new(true, self.dtype, &self.config, &self.device)?;
        let mut logits_processor = LogitsProcessor::from_sampling(sampling.seed, to_sampling(sampling));

        let mut tokens = prompt_ids.to_vec();
        let room = self
            .config
            .max_position_embeddings
            .saturating_sub(tokens.len());
        let max_tokens = max_new_tokens.min(room);
        if max_tokens < max_new_tokens {
            tracing::debug!(
                "Context window limits generation to {} tokens",
                max_tokens
            );
        }

        let mut index_pos = 0;
        for index in 0..max_tokens {
            // Full prompt on the first step, then one token at a time against the KV cache.
            let context_size = if index > 0 { 1 } else { tokens.len() };
            let ctxt = &tokens[tokens.len().saturating_sub(context_size)..];

            let input = Tensor::new(ctxt, &self.device)?.unsqueeze(0)?;
            let logits = self.model.forward(&input, index_pos, &mut cache)?;
            let logits = logits.squeeze(0)?.to_dtype(DType::F32)?;
            let logits = if sampling.repeat_penalty == 1.0 {
                logits
            } else {
                let start_at = tokens.len().saturating_sub(sampling.repeat_last_n);
                candle_transformers::utils::apply_repeat_penalty(
                    &logits,
                    sampling.repeat_penalty,
                    &tokens[start_at..],
                )?
            };
            index_pos += ctxt.len();

            let next_token = logits_processor.sample(&logits)?;
            tracing::trace!("Token {} / {}: {}", index + 1, max_tokens, next_token);
            tokens.push(next_token);

            if self.is_eos(next_token) {
                tracing::debug!("Hit EOS token, stopping generation");
                break;
            }
            if sink.put(next_token)?.is_break() {
                break;
            }
        }

        Ok(())
    }
}
