//! 🜁 Локальная генерация: Mistral 7B Instruct на candle
//!
//! Модель грузится лениво при первом запросе (локальный каталог или
//! HuggingFace Hub) и дальше живет под мьютексом: один `generate`
//! одновременно, KV кэш сбрасывается перед каждым промптом.

use anyhow::{Error as E, Result};
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::generation::{LogitsProcessor, Sampling};
use candle_transformers::models::mistral::{Config, Model as Mistral};
use hf_hub::{api::sync::Api, Repo, RepoType};
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tokenizers::Tokenizer;
use tracing::{debug, info, warn};

use crate::error::Error;
use crate::logos::Generator;
use crate::priests::device::select_device;

pub const DEFAULT_MODEL_ID: &str = "mistralai/Mistral-7B-Instruct-v0.2";
const SAFETENSORS_INDEX: &str = "model.safetensors.index.json";

/// Параметры загрузки и сэмплирования
#[derive(Debug, Clone)]
pub struct MistralSettings {
    pub model_id: String,
    pub revision: String,
    /// Каталог с tokenizer.json, config.json и шардами safetensors
    pub local_path: Option<PathBuf>,
    pub force_cpu: bool,
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub top_k: Option<usize>,
    pub repeat_penalty: f32,
    pub repeat_last_n: usize,
    /// Максимум новых токенов
    pub sample_len: usize,
    pub seed: u64,
}

impl Default for MistralSettings {
    fn default() -> Self {
        Self {
            model_id: DEFAULT_MODEL_ID.to_string(),
            revision: "main".to_string(),
            local_path: None,
            force_cpu: false,
            temperature: Some(0.7),
            top_p: None,
            top_k: None,
            repeat_penalty: 1.1,
            repeat_last_n: 64,
            sample_len: 512,
            seed: 299792458,
        }
    }
}

fn sampling(temperature: Option<f64>, top_k: Option<usize>, top_p: Option<f64>) -> Sampling {
    let temperature = temperature.unwrap_or(0.);
    if temperature <= 0. {
        return Sampling::ArgMax;
    }
    match (top_k, top_p) {
        (None, None) => Sampling::All { temperature },
        (Some(k), None) => Sampling::TopK { k, temperature },
        (None, Some(p)) => Sampling::TopP { p, temperature },
        (Some(k), Some(p)) => Sampling::TopKThenTopP { k, p, temperature },
    }
}

/// Уникальные имена шардов из `weight_map`, по порядку
fn weight_files(index: &serde_json::Value) -> Result<Vec<String>> {
    let weight_map = index
        .get("weight_map")
        .and_then(|v| v.as_object())
        .ok_or_else(|| E::msg("no 'weight_map' object in safetensors index"))?;

    let files: BTreeSet<String> = weight_map
        .values()
        .filter_map(|v| v.as_str().map(str::to_string))
        .collect();

    if files.is_empty() {
        anyhow::bail!("no weight files found in safetensors index");
    }
    Ok(files.into_iter().collect())
}

fn is_complete_local_dir(path: &Path) -> bool {
    path.join("tokenizer.json").exists()
        && path.join("config.json").exists()
        && path.join(SAFETENSORS_INDEX).exists()
}

fn wrap_instruction(prompt: &str) -> String {
    format!("[INST] {prompt} [/INST]")
}

struct MistralPipeline {
    model: Mistral,
    tokenizer: Tokenizer,
    device: Device,
    logits_processor: LogitsProcessor,
    repeat_penalty: f32,
    repeat_last_n: usize,
    eos_token: u32,
}

impl MistralPipeline {
    fn load(settings: &MistralSettings) -> Result<Self> {
        let device = select_device(settings.force_cpu)?;

        let (tokenizer_path, weight_paths, config_path) = match &settings.local_path {
            Some(local) if is_complete_local_dir(local) => {
                info!(path = %local.display(), "loading Mistral from local directory");
                let index: serde_json::Value =
                    serde_json::from_str(&std::fs::read_to_string(local.join(SAFETENSORS_INDEX))?)?;
                let weights = weight_files(&index)?
                    .into_iter()
                    .map(|f| local.join(f))
                    .collect::<Vec<_>>();
                (local.join("tokenizer.json"), weights, local.join("config.json"))
            }
            other => {
                if let Some(local) = other {
                    warn!(path = %local.display(), "local Mistral directory incomplete, using hub");
                }
                info!(model = %settings.model_id, revision = %settings.revision, "loading Mistral from hub");
                let api = Api::new()?;
                let repo = api.repo(Repo::with_revision(
                    settings.model_id.clone(),
                    RepoType::Model,
                    settings.revision.clone(),
                ));
                let index_path = repo.get("model.safetensors.index.json")?;
                let index: serde_json::Value =
                    serde_json::from_str(&std::fs::read_to_string(index_path)?)?;
                let weights = weight_files(&index)?
                    .iter()
                    .map(|f| repo.get(f))
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                (repo.get("tokenizer.json")?, weights, repo.get("config.json")?)
            }
        };

        let tokenizer = Tokenizer::from_file(tokenizer_path).map_err(E::msg)?;
        let config: Config = serde_json::from_slice(&std::fs::read(config_path)?)?;
        debug!(
            hidden_size = config.hidden_size,
            heads = config.num_attention_heads,
            layers = config.num_hidden_layers,
            shards = weight_paths.len(),
            "mistral config"
        );

        let dtype = if device.is_cuda() { DType::BF16 } else { DType::F32 };
        // SAFETY: шарды только читаются и не меняются, пока модель жива
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&weight_paths, dtype, &device)? };
        let model = Mistral::new(&config, vb)?;

        let eos_token = tokenizer.get_vocab(false).get("</s>").copied().unwrap_or(2);

        info!("✅ Mistral loaded");

        Ok(Self {
            model,
            tokenizer,
            device,
            logits_processor: LogitsProcessor::from_sampling(
                settings.seed,
                sampling(settings.temperature, settings.top_k, settings.top_p),
            ),
            repeat_penalty: settings.repeat_penalty,
            repeat_last_n: settings.repeat_last_n,
            eos_token,
        })
    }

    fn run(&mut self, prompt: &str, sample_len: usize) -> Result<String> {
        self.model.clear_kv_cache();

        let mut tokens = self
            .tokenizer
            .encode(prompt, true)
            .map_err(E::msg)?
            .get_ids()
            .to_vec();
        debug!(input_tokens = tokens.len(), "mistral prompt");

        let start_gen = std::time::Instant::now();
        let mut output_tokens = Vec::new();

        for index in 0..sample_len {
            let start_pos = if index == 0 { 0 } else { tokens.len().saturating_sub(1) };
            let input = Tensor::new(&tokens[start_pos..], &self.device)?.unsqueeze(0)?;

            let logits = self
                .model
                .forward(&input, start_pos)?
                .squeeze(0)?
                .squeeze(0)?
                .to_dtype(DType::F32)?;

            let logits = if self.repeat_penalty == 1. {
                logits
            } else {
                let start_at = tokens.len().saturating_sub(self.repeat_last_n);
                candle_transformers::utils::apply_repeat_penalty(
                    &logits,
                    self.repeat_penalty,
                    &tokens[start_at..],
                )?
            };

            let next_token = self.logits_processor.sample(&logits)?;
            if next_token == self.eos_token {
                break;
            }
            tokens.push(next_token);
            output_tokens.push(next_token);
        }

        let dt = start_gen.elapsed();
        debug!(
            generated = output_tokens.len(),
            tokens_per_sec = output_tokens.len() as f64 / dt.as_secs_f64(),
            "mistral generation done"
        );

        self.tokenizer.decode(&output_tokens, true).map_err(E::msg)
    }
}

/// Генератор на локальной модели; веса грузятся при первом вызове
pub struct MistralGenerator {
    settings: MistralSettings,
    pipeline: Mutex<Option<MistralPipeline>>,
}

impl MistralGenerator {
    pub fn new(settings: MistralSettings) -> Self {
        Self {
            settings,
            pipeline: Mutex::new(None),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.pipeline.lock().is_some()
    }
}

impl Generator for MistralGenerator {
    fn generate(&self, prompt: &str) -> crate::error::Result<String> {
        let mut guard = self.pipeline.lock();
        if guard.is_none() {
            let pipeline = MistralPipeline::load(&self.settings)
                .map_err(|e| Error::GenerationUnavailable(format!("{e:#}")))?;
            *guard = Some(pipeline);
        }
        let Some(pipeline) = guard.as_mut() else {
            return Err(Error::GenerationUnavailable("model not loaded".into()));
        };

        pipeline
            .run(&wrap_instruction(prompt), self.settings.sample_len)
            .map(|text| text.trim().to_string())
            .map_err(|e| Error::Generation(format!("{e:#}")))
    }

    fn model_name(&self) -> &str {
        &self.settings.model_id
    }
}
