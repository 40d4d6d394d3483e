//! Generation service contract
//!
//! The service turns a prompt into a stream of text fragments. Fragments are
//! consumed in arrival order; any error, whether raised before the stream
//! starts or while it is being read, fails the whole attempt.

pub mod openai;

pub use openai::OpenAiService;

use thiserror::Error;

/// Options forwarded with every generation request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerationConfig {
    /// Upper bound on generated output length
    pub max_output_length: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        GenerationConfig {
            max_output_length: 5000,
        }
    }
}

/// Failure of a single generation attempt
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("service responded with status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("stream interrupted: {0}")]
    Stream(String),

    #[error("undecodable stream event: {0}")]
    Decode(String),

    #[error("service returned an empty response")]
    EmptyResponse,
}

/// Text fragments in arrival order
pub type FragmentStream<'a> = Box<dyn Iterator<Item = Result<String, ServiceError>> + 'a>;

/// External text-generation backend
pub trait GenerationService: Send + Sync {
    /// Start generating text for `prompt` with `model`
    fn generate<'a>(
        &'a self,
        model: &str,
        prompt: &str,
        config: &GenerationConfig,
    ) -> Result<FragmentStream<'a>, ServiceError>;
}

impl<S: GenerationService + ?Sized> GenerationService for &S {
    fn generate<'a>(
        &'a self,
        model: &str,
        prompt: &str,
        config: &GenerationConfig,
    ) -> Result<FragmentStream<'a>, ServiceError> {
        (**self).generate(model, prompt, config)
    }
}
