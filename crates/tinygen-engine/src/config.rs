use std::path::Path;

use anyhow::{Context as _, Error};
use serde::{Deserialize, Serialize};

/// Description of one model's local artifacts, loaded from a TOML file next to
/// the weights.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ModelConfig {
    /// Path to the vocabulary file for the tokenizer.
    pub vocab: String,
    /// Model architecture, one of `rwkv4`/`rwkv5`/`rwkv6`.
    pub architecture: String,
    /// Token sequence the model emits to end its turn.
    pub stop_sequence: Vec<u16>,
}

/// Load the artifact description for a model id from `<dir>/<id>.toml`.
pub fn load_model_config(dir: &Path, id: &str) -> Result<ModelConfig, Error> {
    let path = dir.join(format!("{id}.toml"));
    let config_str = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read model config {}", path.display()))?;
    let value = toml::from_str(&config_str)?;
    Ok(value)
}
