use std::fs::File;
use std::path::Path;

use anyhow::{bail, Context as _, Error};
use async_trait::async_trait;
use half::f16;
use memmap2::Mmap;
use safetensors::SafeTensors;
use tracing::{event, Level};
use web_rwkv::runtime::model::ModelVersion;
use web_rwkv::{
    context::{Context, ContextBuilder, InstanceExt},
    model::{loader::Loader, ContextAutoLimits},
    runtime::{
        infer::{InferInput, InferInputBatch, InferOption, InferOutput},
        model::{Build, ModelBuilder, ModelRuntime, Quant, State},
        softmax::softmax_one,
        v4, v5, v6, JobRuntime,
    },
    tensor::TensorCpu,
    tokenizer::Tokenizer,
};
use wgpu::{DeviceType, Instance, PowerPreference};

use crate::config::ModelConfig;
use crate::error::GenerateError;
use crate::sampler::Sampler;

/// System preamble baked into every prompt.
const SYSTEM_PREAMBLE: &str = "You are a helpful AI assistant.";

/// Marker that opens the assistant's turn; the reply is whatever follows the
/// last occurrence of it.
const ASSISTANT_MARKER: &str = "<|assistant|>";

/// Fixed top-probability-mass cutoff for nucleus sampling.
const TOP_P: f32 = 0.95;

/// Blocking "generate text for prompt" capability, behind a trait so the
/// completion service can be exercised without loading model weights.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
        max_tokens: usize,
        temperature: f32,
    ) -> Result<String, GenerateError>;

    /// The device the model runs on, `"gpu"` or `"cpu"`.
    fn device(&self) -> &str;
}

/// One loaded generative model with its tokenizer and decoding state.
pub struct GenerationEngine {
    config: ModelConfig,
    device: String,

    tokenizer: Tokenizer,
    context: Context,
    runtime: JobRuntime<InferInput, InferOutput>,
    state: Box<dyn State + Send + Sync>,
    initial_state: TensorCpu<f32>,
}

impl GenerationEngine {
    pub async fn create(weights_path: &Path, config: ModelConfig) -> Result<Self, Error> {
        // Load the tokenizer
        let contents = std::fs::read_to_string(&config.vocab)
            .with_context(|| format!("failed to read vocab {}", config.vocab))?;
        let tokenizer = Tokenizer::new(&contents)?;

        // Load the model
        let version = match config.architecture.as_str() {
            "rwkv4" => ModelVersion::V4,
            "rwkv5" => ModelVersion::V5,
            "rwkv6" => ModelVersion::V6,
            _ => bail!("unsupported architecture {:?}", config.architecture),
        };
        let (context, device, runtime, state) = load_model(version, weights_path).await?;

        // Keep the fresh state so each request starts from a clean slate
        let initial_state = state.back(0).await?;

        let value = Self {
            config,
            device,

            tokenizer,
            context,
            runtime,
            state,
            initial_state,
        };

        Ok(value)
    }

    async fn run(
        &self,
        prompt: &str,
        max_tokens: usize,
        temperature: f32,
    ) -> Result<String, Error> {
        event!(Level::DEBUG, len = prompt.len(), "processing prompt");

        // Each completion is independent, reset the decoding state
        self.state.load(self.initial_state.clone(), 0)?;

        // Wrap the raw prompt in the role-tagged template and feed it in
        let formatted = format_prompt(prompt);
        let mut tokens = self.tokenizer.encode(formatted.as_bytes())?;
        let mut next_input = tokens.pop().context("empty prompt encoding")?;
        self.process_tokens(tokens).await?;

        // Generate continuation tokens
        let sampler = Sampler {
            top_p: TOP_P,
            temperature,
        };
        let mut generated = Vec::new();

        while !self.should_stop_generation(max_tokens, &generated) {
            // Run model step
            let batch = InferInputBatch {
                tokens: vec![next_input],
                option: InferOption::Last,
            };
            let input = InferInput::new(vec![batch], 32);
            let (_input, output) = self.runtime.infer(input).await;

            let logits = &output[0].0;

            // Pick output token
            let logits = sampler.mask_padding(logits)?;
            let probabilities = softmax_one(&self.context, logits).await?;
            next_input = sampler.sample(&probabilities);

            generated.push(next_input);
        }

        let content = self.finalize_generated(&formatted, generated)?;

        Ok(content)
    }

    fn should_stop_generation(&self, max_tokens: usize, tokens: &[u16]) -> bool {
        // Maximum tokens
        if tokens.len() >= max_tokens {
            return true;
        }

        // Ending with stop tokens
        if tokens.ends_with(&self.config.stop_sequence) {
            return true;
        }

        false
    }

    fn finalize_generated(&self, formatted: &str, mut tokens: Vec<u16>) -> Result<String, Error> {
        // Trim stop tokens, if we got them at the end
        if tokens.ends_with(&self.config.stop_sequence) {
            for _ in 0..self.config.stop_sequence.len() {
                tokens.pop();
            }
        }

        // Decode the tokenized continuation
        let continuation_bytes = self.tokenizer.decode(&tokens)?;
        let continuation = String::from_utf8_lossy(&continuation_bytes);

        // Keep only the reply after the final assistant marker
        let full = format!("{formatted}{continuation}");
        Ok(extract_reply(&full))
    }

    async fn process_tokens(&self, tokens: Vec<u16>) -> Result<(), Error> {
        // Process initial prompt
        let batch = InferInputBatch {
            tokens,
            option: InferOption::Last,
        };
        let mut input = InferInput::new(vec![batch], 32);

        while !input.batches[0].tokens.is_empty() {
            let (out_input, _output) = self.runtime.infer(input).await;
            input = out_input;
        }

        Ok(())
    }
}

#[async_trait]
impl TextGenerator for GenerationEngine {
    async fn generate(
        &self,
        prompt: &str,
        max_tokens: usize,
        temperature: f32,
    ) -> Result<String, GenerateError> {
        // Reject bad parameters before touching the model
        validate_parameters(max_tokens, temperature)?;

        self.run(prompt, max_tokens, temperature)
            .await
            .map_err(|e| GenerateError::Failed(e.to_string()))
    }

    fn device(&self) -> &str {
        &self.device
    }
}

/// Check caller-supplied generation arguments before the model is invoked.
fn validate_parameters(max_tokens: usize, temperature: f32) -> Result<(), GenerateError> {
    if max_tokens < 1 {
        return Err(GenerateError::InvalidParameter(
            "max_tokens must be positive",
        ));
    }
    if temperature < 0.0 {
        return Err(GenerateError::InvalidParameter(
            "temperature must be non-negative",
        ));
    }
    Ok(())
}

/// Wrap a raw prompt in the fixed single-turn template.
fn format_prompt(prompt: &str) -> String {
    format!("<|system|>{SYSTEM_PREAMBLE}\n<|user|>{prompt}\n{ASSISTANT_MARKER}")
}

/// Extract the assistant's reply: the text after the final assistant marker,
/// whitespace-trimmed.
fn extract_reply(text: &str) -> String {
    text.rsplit(ASSISTANT_MARKER)
        .next()
        .unwrap_or(text)
        .trim()
        .to_string()
}

async fn load_model(
    version: ModelVersion,
    path: &Path,
) -> Result<
    (
        Context,
        String,
        JobRuntime<InferInput, InferOutput>,
        Box<dyn State + Send + Sync>,
    ),
    Error,
> {
    event!(Level::INFO, path = %path.display(), "loading model");

    // Preload the model
    let file = File::open(path)
        .with_context(|| format!("failed to open weights {}", path.display()))?;
    let data = unsafe { Mmap::map(&file)? };

    let safetensors = SafeTensors::deserialize(&data)?;
    let model_info = Loader::info(&safetensors)?;

    // Prepare a context for the model
    let instance = Instance::default();
    let adapter = instance.adapter(PowerPreference::HighPerformance).await?;
    let device = match adapter.get_info().device_type {
        DeviceType::Cpu => "cpu".to_string(),
        _ => "gpu".to_string(),
    };
    let context = ContextBuilder::new(adapter)
        .auto_limits(&model_info)
        .build()
        .await?;

    // Quantize all layers to 8-bit
    let quantize = (0..model_info.num_layer)
        .map(|layer| (layer, Quant::Int8))
        .collect();

    // Configure the model
    let builder = ModelBuilder::new(&context, safetensors).quant(quantize);

    // Build the runtime, actually loading weights
    let (runtime, state): (_, Box<dyn State + Send + Sync>) = match version {
        ModelVersion::V4 => {
            event!(Level::INFO, "loading rwkv-v4 model");
            let model = Build::<v4::Model>::build(builder).await?;
            let builder = v4::ModelRuntime::<f16>::new(model, 1);
            let state = builder.state();
            let runtime = JobRuntime::new(builder).await;
            (runtime, Box::new(state))
        }
        ModelVersion::V5 => {
            event!(Level::INFO, "loading rwkv-v5 model");
            let model = Build::<v5::Model>::build(builder).await?;
            let builder = v5::ModelRuntime::<f16>::new(model, 1);
            let state = builder.state();
            let runtime = JobRuntime::new(builder).await;
            (runtime, Box::new(state))
        }
        ModelVersion::V6 => {
            event!(Level::INFO, "loading rwkv-v6 model");
            let model = Build::<v6::Model>::build(builder).await?;
            let builder = v6::ModelRuntime::<f16>::new(model, 1);
            let state = builder.state();
            let runtime = JobRuntime::new(builder).await;
            (runtime, Box::new(state))
        }
    };

    event!(Level::INFO, device, "finished loading model");

    Ok((context, device, runtime, state))
}
