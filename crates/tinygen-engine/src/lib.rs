pub mod config;
mod engine;
mod error;
mod sampler;
mod service;
pub mod types;

pub use self::{
    engine::{GenerationEngine, TextGenerator},
    error::{CompletionError, GenerateError},
    service::{completion_service, CompletionService, EngineSettings},
};
