use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, Error};
use chrono::Utc;
use salvo::Depot;
use tokio::sync::Mutex;
use tracing::{event, Level};
use uuid::Uuid;

use crate::config::load_model_config;
use crate::engine::{GenerationEngine, TextGenerator};
use crate::error::CompletionError;
use crate::types::{
    CompletionChoice, CompletionRequest, CompletionResponse, CompletionUsage, FinishReason,
    HealthStatus, ModelInfo, ModelList,
};

/// Registry timestamp reported for the served model.
const MODEL_CREATED: u64 = 1735689600;

pub fn completion_service(depot: &Depot) -> Result<Arc<CompletionService>, Error> {
    depot
        .obtain::<Arc<CompletionService>>()
        .ok()
        .cloned()
        .context("failed to get completion service")
}

/// Settings the service needs to locate and drive the model.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Model identifier, echoed by the models listing.
    pub model_name: String,
    /// Explicit path to the weights; derived from `cache_dir` when absent.
    pub model_path: Option<PathBuf>,
    /// Directory holding model artifacts.
    pub cache_dir: PathBuf,
    /// Generation length used when a request doesn't specify one.
    pub max_length: usize,
    /// Sampling temperature used when a request doesn't specify one.
    pub temperature: f32,
}

/// Reference to the installed engine. Generation takes the inner lock for
/// exclusive access, since the engine mutates shared decoding state.
pub type EngineRef = Arc<Mutex<dyn TextGenerator>>;

/// Single-slot holder for one generation engine, shared by all requests.
///
/// Readiness is derived from the slot: empty at process start, filled by
/// [`initialize`](CompletionService::initialize), emptied again by
/// [`shutdown`](CompletionService::shutdown).
pub struct CompletionService {
    settings: EngineSettings,
    engine: Mutex<Option<EngineRef>>,
}

impl CompletionService {
    pub fn new(settings: EngineSettings) -> Self {
        Self {
            settings,
            engine: Mutex::new(None),
        }
    }

    /// Load the model config and construct the engine.
    ///
    /// Engine construction errors are surfaced as-is; callers must treat
    /// process startup as failed when this errors.
    pub async fn initialize(&self) -> Result<(), Error> {
        let config = load_model_config(&self.settings.cache_dir, &self.settings.model_name)?;

        let weights_path = self.settings.model_path.clone().unwrap_or_else(|| {
            self.settings
                .cache_dir
                .join(format!("{}.st", self.settings.model_name))
        });
        let engine = GenerationEngine::create(&weights_path, config).await?;

        event!(
            Level::INFO,
            model = self.settings.model_name,
            device = engine.device(),
            "text generation service initialized"
        );

        self.install(Arc::new(Mutex::new(engine))).await;

        Ok(())
    }

    /// Put an engine in the slot, making the service ready.
    pub async fn install(&self, engine: EngineRef) {
        let mut slot = self.engine.lock().await;
        *slot = Some(engine);
    }

    /// Release the engine reference and reset readiness. Safe to call even if
    /// the service was never initialized.
    pub async fn shutdown(&self) {
        let mut slot = self.engine.lock().await;
        *slot = None;

        event!(Level::INFO, "text generation service shut down");
    }

    pub async fn is_ready(&self) -> bool {
        self.engine.lock().await.is_some()
    }

    async fn engine(&self) -> Result<EngineRef, CompletionError> {
        let slot = self.engine.lock().await;
        slot.clone().ok_or(CompletionError::NotReady)
    }

    /// Generate one completion for the request.
    ///
    /// Token usage is approximated by whitespace-delimited word counts, not
    /// true subword tokenization. Exactly one choice is produced even when the
    /// request asks for more.
    pub async fn generate_completion(
        &self,
        request: &CompletionRequest,
        requester: &str,
    ) -> Result<CompletionResponse, CompletionError> {
        let engine = self.engine().await?;

        event!(Level::INFO, requester, "generating completion");

        let max_tokens = request.max_tokens.unwrap_or(self.settings.max_length);
        let temperature = request.temperature.unwrap_or(self.settings.temperature);

        // Hold the engine lock across generation; the decoding state is
        // shared, so overlapping requests take turns.
        let engine = engine.lock().await;
        let text = engine
            .generate(&request.prompt, max_tokens, temperature)
            .await?;
        drop(engine);

        let prompt_tokens = count_tokens(&request.prompt);
        let completion_tokens = count_tokens(&text);

        event!(
            Level::DEBUG,
            prompt_tokens,
            completion_tokens,
            "completion generated"
        );

        let response = CompletionResponse {
            id: format!("cmpl-{}", Uuid::new_v4()),
            object: "text_completion".to_string(),
            created: Utc::now().timestamp() as u64,
            model: request.model.clone(),
            choices: vec![CompletionChoice {
                text,
                index: 0,
                finish_reason: FinishReason::Stop,
            }],
            usage: CompletionUsage {
                prompt_tokens,
                completion_tokens,
                total_tokens: prompt_tokens + completion_tokens,
            },
        };

        Ok(response)
    }

    /// Static single-model listing.
    pub async fn available_models(&self) -> Result<ModelList, CompletionError> {
        if !self.is_ready().await {
            return Err(CompletionError::NotReady);
        }

        let list = ModelList {
            object: "list".to_string(),
            data: vec![ModelInfo {
                id: self.settings.model_name.clone(),
                object: "model".to_string(),
                created: MODEL_CREATED,
                owned_by: "default".to_string(),
            }],
        };

        Ok(list)
    }

    /// Status/model/device snapshot.
    pub async fn health_status(&self) -> Result<HealthStatus, CompletionError> {
        let engine = self.engine().await?;
        let device = engine.lock().await.device().to_string();

        Ok(HealthStatus {
            status: "healthy".to_string(),
            model: self.settings.model_name.clone(),
            device,
        })
    }
}

/// Approximate token count by whitespace-delimited words.
fn count_tokens(text: &str) -> usize {
    text.split_whitespace().count()
}
