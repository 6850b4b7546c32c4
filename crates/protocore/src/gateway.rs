use crate::{GatewayError, Map, Value};
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

/// Text chunks as they arrive from the model. Dropping the stream releases
/// the underlying connection.
pub type ChunkStream = BoxStream<'static, Result<String, GatewayError>>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    #[default]
    Text,
    Json,
}

impl OutputMode {
    /// Anything other than `"json"` is treated as text.
    pub fn parse(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("json") {
            OutputMode::Json
        } else {
            OutputMode::Text
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub model: String,
    pub output_mode: OutputMode,
    pub schema: Option<Value>,
    /// Provider parameters after policy and catalog sanitizing
    pub params: Map,
}

/// Boundary to whatever actually talks to model providers.
#[async_trait]
pub trait LlmGateway: Send + Sync {
    /// Open a streaming text generation.
    async fn stream(&self, request: &GenerationRequest) -> Result<ChunkStream, GatewayError>;

    /// Produce one complete structured result, returned as raw JSON text.
    async fn generate_structured(
        &self,
        request: &GenerationRequest,
        schema: &Value,
    ) -> Result<String, GatewayError>;
}
