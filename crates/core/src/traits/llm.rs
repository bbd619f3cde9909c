//! Language-model collaborator trait

use async_trait::async_trait;

use crate::error::Result;
use crate::llm_types::{GenerateRequest, GenerateResponse};

/// Language-model collaborator.
///
/// Takes the assembled system prompt, conversation history, and tool schema;
/// returns text and/or structured tool invocations.
#[async_trait]
pub trait LanguageModel: Send + Sync + 'static {
    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse>;

    /// Model name for logging
    fn model_name(&self) -> &str;
}
