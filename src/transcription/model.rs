//! # Whisper Model Management
//!
//! Handles loading and running the Whisper model through candle.
//!
//! ## Model Loading Process:
//! 1. Download model files from HuggingFace if not cached locally
//! 2. Load model weights (safetensors) and tokenizer
//! 3. Initialize the model on the requested device and precision
//!
//! ## Decoding:
//! Decoding is greedy (single hypothesis) to favor latency over the marginal
//! accuracy of a beam search; a repetition guard stops the loop when the
//! decoder starts cycling.

use candle_core::{DType, Device, IndexOp, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::whisper::{self as m, Config};
use tokenizers::Tokenizer;
use anyhow::{anyhow, Result};

/// Sample rate the model operates at.
pub const SAMPLE_RATE: usize = 16_000;
/// Whisper analysis window.
const N_FFT: usize = 400;
const HOP_LENGTH: usize = 160;
/// The model consumes fixed 30-second windows.
pub const CHUNK_SAMPLES: usize = 30 * SAMPLE_RATE;
const N_FRAMES: usize = CHUNK_SAMPLES / HOP_LENGTH;

// Special tokens of the multilingual Whisper vocabulary.
const SOT_TOKEN: u32 = 50258;
const EOT_TOKEN: u32 = 50257;
const TRANSCRIBE_TOKEN: u32 = 50359;
const NO_TIMESTAMPS_TOKEN: u32 = 50363;

/// Hard cap on decoded tokens per 30-second window.
const MAX_DECODE_TOKENS: usize = 224;

/// Language tokens, in vocabulary order starting at 50259.
const LANGUAGES: &[(&str, u32)] = &[
    ("en", 50259),
    ("zh", 50260),
    ("de", 50261),
    ("es", 50262),
    ("ru", 50263),
    ("ko", 50264),
    ("fr", 50265),
    ("ja", 50266),
    ("pt", 50267),
    ("tr", 50268),
    ("pl", 50269),
    ("ca", 50270),
    ("nl", 50271),
    ("ar", 50272),
    ("sv", 50273),
    ("it", 50274),
    ("id", 50275),
    ("hi", 50276),
    ("fi", 50277),
    ("vi", 50278),
];

/// Available Whisper model tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ModelSize {
    Tiny,
    Base,
    Small,
    Medium,
    Large,
}

impl ModelSize {
    /// HuggingFace repository holding this tier's multilingual weights.
    pub fn repo_name(&self) -> &'static str {
        match self {
            ModelSize::Tiny => "openai/whisper-tiny",
            ModelSize::Base => "openai/whisper-base",
            ModelSize::Small => "openai/whisper-small",
            ModelSize::Medium => "openai/whisper-medium",
            ModelSize::Large => "openai/whisper-large-v2",
        }
    }
}

impl std::str::FromStr for ModelSize {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "tiny" => Ok(ModelSize::Tiny),
            "base" => Ok(ModelSize::Base),
            "small" => Ok(ModelSize::Small),
            "medium" => Ok(ModelSize::Medium),
            "large" => Ok(ModelSize::Large),
            _ => Err(anyhow!("Unknown model size: {}", s)),
        }
    }
}

impl std::fmt::Display for ModelSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ModelSize::Tiny => "tiny",
            ModelSize::Base => "base",
            ModelSize::Small => "small",
            ModelSize::Medium => "medium",
            ModelSize::Large => "large",
        };
        write!(f, "{}", name)
    }
}

/// A loaded Whisper model ready for transcription.
///
/// Decoding takes `&mut self` (the decoder keeps a cross-attention cache), so
/// callers must hold the process-wide inference gate; this type is never
/// shared across concurrent calls.
pub struct WhisperModel {
    model: m::model::Whisper,
    config: Config,
    device: Device,
    dtype: DType,
    tokenizer: Tokenizer,
    mel_filters: Vec<f32>,
}

impl WhisperModel {
    /// Load a Whisper model from HuggingFace onto the given device.
    pub async fn load(size: ModelSize, device: Device, dtype: DType) -> Result<Self> {
        tracing::info!("Loading Whisper {} model...", size);
        let start_time = std::time::Instant::now();

        let api = {
            use hf_hub::api::tokio::ApiBuilder;

            let mut builder = ApiBuilder::new().with_progress(false);
            if let Ok(token) = std::env::var("HF_TOKEN") {
                builder = builder.with_token(Some(token));
            }
            if let Ok(cache_dir) = std::env::var("HF_HUB_CACHE") {
                builder = builder.with_cache_dir(cache_dir.into());
            }
            builder
                .build()
                .map_err(|e| anyhow!("Failed to initialize HuggingFace API: {}", e))?
        };

        let repo = api.model(size.repo_name().to_string());

        let config_filename = repo
            .get("config.json")
            .await
            .map_err(|e| anyhow!("Failed to download config.json from {}: {}", size.repo_name(), e))?;
        let tokenizer_filename = repo
            .get("tokenizer.json")
            .await
            .map_err(|e| anyhow!("Failed to download tokenizer.json from {}: {}", size.repo_name(), e))?;
        let model_filename = repo
            .get("model.safetensors")
            .await
            .map_err(|e| anyhow!("Failed to download model weights from {}: {}", size.repo_name(), e))?;

        let config: Config = serde_json::from_reader(std::fs::File::open(config_filename)?)?;

        let tokenizer = Tokenizer::from_file(tokenizer_filename)
            .map_err(|e| anyhow!("Failed to load tokenizer: {}", e))?;

        let mel_filters = mel_filter_bank(config.num_mel_bins as usize);

        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[model_filename], dtype, &device)? };
        let model = m::model::Whisper::load(&vb, config.clone())?;

        let load_time = start_time.elapsed();
        tracing::info!("Whisper {} model loaded in {:.2}s", size, load_time.as_secs_f64());

        Ok(Self {
            model,
            config,
            device,
            dtype,
            tokenizer,
            mel_filters,
        })
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Token id for a language code, if the model knows it.
    pub fn language_token(code: &str) -> Option<u32> {
        let code = code.to_lowercase();
        LANGUAGES.iter().find(|(c, _)| *c == code).map(|(_, t)| *t)
    }

    /// Detect the spoken language of a window of samples.
    ///
    /// Runs a single decoder step over the start-of-transcript token and
    /// reads the probability mass the model assigns to each language token.
    pub fn detect_language(&mut self, samples: &[f32]) -> Result<(&'static str, f32)> {
        let features = self.encode(samples)?;

        let tokens = Tensor::new(&[SOT_TOKEN], &self.device)?.unsqueeze(0)?;
        let ys = self.model.decoder.forward(&tokens, &features, true)?;
        let logits = self
            .model
            .decoder
            .final_linear(&ys.i((..1, ..1))?)?
            .i(0)?
            .i(0)?
            .to_dtype(DType::F32)?
            .to_vec1::<f32>()?;

        // Softmax restricted to the language tokens.
        let lang_logits: Vec<f32> = LANGUAGES
            .iter()
            .map(|(_, t)| logits.get(*t as usize).copied().unwrap_or(f32::NEG_INFINITY))
            .collect();
        let max_logit = lang_logits.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
        let exps: Vec<f32> = lang_logits.iter().map(|l| (l - max_logit).exp()).collect();
        let sum: f32 = exps.iter().sum();

        let (best, prob) = exps
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, e)| (i, e / sum))
            .unwrap_or((0, 0.0));

        let code = LANGUAGES[best].0;
        tracing::debug!("Detected language '{}' (probability {:.2})", code, prob);
        Ok((code, prob))
    }

    /// Transcribe one window of samples (at most 30 seconds) greedily.
    ///
    /// The returned text is kept exactly as the tokenizer produces it: each
    /// window typically begins with a space, which is what makes plain
    /// concatenation of consecutive windows read naturally.
    pub fn transcribe_window(&mut self, samples: &[f32], language_token: Option<u32>) -> Result<String> {
        let features = self.encode(samples)?;

        let mut tokens = vec![SOT_TOKEN];
        if let Some(lang) = language_token {
            tokens.push(lang);
        }
        tokens.push(TRANSCRIBE_TOKEN);
        tokens.push(NO_TIMESTAMPS_TOKEN);

        let mut output_tokens = Vec::new();

        for step in 0..MAX_DECODE_TOKENS {
            let token_tensor = Tensor::new(tokens.as_slice(), &self.device)?.unsqueeze(0)?;
            let ys = self.model.decoder.forward(&token_tensor, &features, step == 0)?;
            let (_, seq_len, _) = ys.dims3()?;

            let logits = self
                .model
                .decoder
                .final_linear(&ys.i((..1, seq_len - 1..))?)?
                .i(0)?
                .i(0)?
                .to_dtype(DType::F32)?
                .to_vec1::<f32>()?;

            let next_token = logits
                .iter()
                .enumerate()
                .max_by(|a, b| a.1.total_cmp(b.1))
                .map(|(i, _)| i as u32)
                .ok_or_else(|| anyhow!("Decoder produced empty logits"))?;

            if next_token == EOT_TOKEN {
                break;
            }

            if is_repetitive(&output_tokens, next_token) {
                tracing::debug!("Stopping decode on repetition guard");
                break;
            }

            tokens.push(next_token);
            output_tokens.push(next_token);
        }

        self.decode_tokens(&output_tokens)
    }

    /// Compute encoder features for a window of samples.
    fn encode(&mut self, samples: &[f32]) -> Result<Tensor> {
        let n_mels = self.config.num_mel_bins as usize;
        let mel = log_mel_spectrogram(samples, &self.mel_filters, n_mels);
        let mel = Tensor::from_vec(mel, (1, n_mels, N_FRAMES), &self.device)?.to_dtype(self.dtype)?;
        Ok(self.model.encoder.forward(&mel, true)?)
    }

    /// Decode tokens to text using the tokenizer.
    fn decode_tokens(&self, tokens: &[u32]) -> Result<String> {
        let text = self
            .tokenizer
            .decode(tokens, true)
            .map_err(|e| anyhow!("Tokenizer decode error: {}", e))?;

        // Specials are skipped by the tokenizer already; strip stragglers.
        let text = text
            .replace("<|startoftranscript|>", "")
            .replace("<|endoftext|>", "")
            .replace("<|notimestamps|>", "");

        Ok(text)
    }
}

/// Check whether appending a token would extend a degenerate repetition.
fn is_repetitive(tokens: &[u32], new_token: u32) -> bool {
    if tokens.len() >= 2 && tokens[tokens.len() - 2..] == [new_token, new_token] {
        return true;
    }

    if tokens.len() >= 5 {
        let last_3 = [tokens[tokens.len() - 2], tokens[tokens.len() - 1], new_token];
        let prev_3 = &tokens[tokens.len() - 5..tokens.len() - 2];
        if prev_3 == last_3 {
            return true;
        }
    }

    false
}

/// Triangular mel filter bank mapping FFT bins to mel bands.
fn mel_filter_bank(n_mels: usize) -> Vec<f32> {
    let n_bins = N_FFT / 2 + 1;
    let f_max = SAMPLE_RATE as f32 / 2.0;

    let to_mel = |f: f32| 2595.0 * (1.0 + f / 700.0).log10();
    let from_mel = |mel: f32| 700.0 * (10.0f32.powf(mel / 2595.0) - 1.0);

    let mel_max = to_mel(f_max);
    let points: Vec<f32> = (0..n_mels + 2)
        .map(|i| from_mel(mel_max * i as f32 / (n_mels + 1) as f32))
        .collect();

    let mut filters = vec![0.0f32; n_mels * n_bins];
    for band in 0..n_mels {
        let (f_lo, f_center, f_hi) = (points[band], points[band + 1], points[band + 2]);
        for bin in 0..n_bins {
            let f = bin as f32 * SAMPLE_RATE as f32 / N_FFT as f32;
            let weight = if f < f_lo || f > f_hi {
                0.0
            } else if f <= f_center {
                (f - f_lo) / (f_center - f_lo).max(1e-6)
            } else {
                (f_hi - f) / (f_hi - f_center).max(1e-6)
            };
            filters[band * n_bins + bin] = weight;
        }
    }

    filters
}

/// Compute a log-mel spectrogram the way Whisper expects: Hann window,
/// 400-point spectrum at a 160-sample hop, mel projection, log10, then
/// dynamic-range compression relative to the peak.
///
/// Input is padded (or truncated) to the fixed 30-second window, so the
/// output is always `n_mels * N_FRAMES` values in (mel, frame) order.
fn log_mel_spectrogram(samples: &[f32], filters: &[f32], n_mels: usize) -> Vec<f32> {
    let n_bins = N_FFT / 2 + 1;

    let mut padded = vec![0.0f32; CHUNK_SAMPLES];
    let copy_len = samples.len().min(CHUNK_SAMPLES);
    padded[..copy_len].copy_from_slice(&samples[..copy_len]);

    let window: Vec<f32> = (0..N_FFT)
        .map(|i| 0.5 - 0.5 * (2.0 * std::f32::consts::PI * i as f32 / N_FFT as f32).cos())
        .collect();

    // Precomputed DFT basis; the naive transform over it is fast enough for
    // a 30-second window and keeps this free of an FFT dependency.
    let mut cos_table = vec![0.0f32; n_bins * N_FFT];
    let mut sin_table = vec![0.0f32; n_bins * N_FFT];
    for k in 0..n_bins {
        for n in 0..N_FFT {
            let angle = -2.0 * std::f32::consts::PI * (k * n) as f32 / N_FFT as f32;
            cos_table[k * N_FFT + n] = angle.cos();
            sin_table[k * N_FFT + n] = angle.sin();
        }
    }

    let mut mel = vec![0.0f32; n_mels * N_FRAMES];
    let mut power = vec![0.0f32; n_bins];

    for frame in 0..N_FRAMES {
        let offset = frame * HOP_LENGTH;

        for k in 0..n_bins {
            let mut re = 0.0f32;
            let mut im = 0.0f32;
            for n in 0..N_FFT {
                let idx = offset + n;
                if idx >= CHUNK_SAMPLES {
                    break;
                }
                let s = padded[idx] * window[n];
                re += s * cos_table[k * N_FFT + n];
                im += s * sin_table[k * N_FFT + n];
            }
            power[k] = re * re + im * im;
        }

        for band in 0..n_mels {
            let mut acc = 0.0f32;
            for k in 0..n_bins {
                acc += filters[band * n_bins + k] * power[k];
            }
            mel[band * N_FRAMES + frame] = acc.max(1e-10).log10();
        }
    }

    let peak = mel.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    for value in mel.iter_mut() {
        *value = (value.max(peak - 8.0) + 4.0) / 4.0;
    }

    mel
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_size_parsing() {
        assert_eq!("tiny".parse::<ModelSize>().unwrap(), ModelSize::Tiny);
        assert_eq!("LARGE".parse::<ModelSize>().unwrap(), ModelSize::Large);
        assert!("invalid".parse::<ModelSize>().is_err());
    }

    #[test]
    fn test_language_token_lookup() {
        assert_eq!(WhisperModel::language_token("en"), Some(50259));
        assert_eq!(WhisperModel::language_token("ES"), Some(50262));
        assert_eq!(WhisperModel::language_token("xx"), None);
    }

    #[test]
    fn test_repetition_guard() {
        // third identical token in a row
        assert!(is_repetitive(&[5, 7, 7], 7));
        assert!(!is_repetitive(&[5, 7, 8], 7));
        // repeated 3-token pattern
        assert!(is_repetitive(&[1, 2, 3, 1, 2], 3));
        assert!(!is_repetitive(&[1, 2, 3, 4, 5], 6));
        // too short to repeat
        assert!(!is_repetitive(&[7], 7));
    }

    #[test]
    fn test_mel_filter_bank_shape() {
        let filters = mel_filter_bank(80);
        assert_eq!(filters.len(), 80 * (N_FFT / 2 + 1));
        assert!(filters.iter().all(|w| (0.0..=1.0).contains(w)));
        // every band should have some passband
        for band in 0..80 {
            let n_bins = N_FFT / 2 + 1;
            let sum: f32 = filters[band * n_bins..(band + 1) * n_bins].iter().sum();
            assert!(sum > 0.0, "band {} is empty", band);
        }
    }

    #[test]
    fn test_log_mel_shape_and_finiteness() {
        let filters = mel_filter_bank(80);
        let samples = vec![0.1f32; SAMPLE_RATE]; // one second
        let mel = log_mel_spectrogram(&samples, &filters, 80);
        assert_eq!(mel.len(), 80 * N_FRAMES);
        assert!(mel.iter().all(|v| v.is_finite()));
    }
}
