use async_stream::stream;
use async_trait::async_trait;
use protocore::{ChunkStream, GatewayError, GenerationRequest, LlmGateway, Map, Value};
use std::time::Duration;

/// Offline gateway that answers without any provider.
///
/// Text generations stream the prompt back word by word. Structured
/// generations return an object with a placeholder for every schema
/// property.
#[derive(Debug, Clone, Default)]
pub struct EchoGateway {
    chunk_delay: Duration,
}

impl EchoGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pause between streamed chunks, to make streaming visible.
    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = delay;
        self
    }
}

#[async_trait]
impl LlmGateway for EchoGateway {
    async fn stream(&self, request: &GenerationRequest) -> Result<ChunkStream, GatewayError> {
        let words: Vec<String> = request
            .prompt
            .split_inclusive(char::is_whitespace)
            .map(String::from)
            .collect();
        let delay = self.chunk_delay;
        tracing::debug!(model = %request.model, chunks = words.len(), "Echoing prompt");

        Ok(Box::pin(stream! {
            for word in words {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                yield Ok::<_, GatewayError>(word);
            }
        }))
    }

    async fn generate_structured(
        &self,
        _request: &GenerationRequest,
        schema: &Value,
    ) -> Result<String, GatewayError> {
        let mut answer = Map::new();
        if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
            for (name, property) in properties {
                answer.insert(name.clone(), placeholder(name, property));
            }
        }
        serde_json::to_string_pretty(&answer).map_err(|e| GatewayError::Request(e.to_string()))
    }
}

fn placeholder(name: &str, property: &Value) -> Value {
    match property.get("type").and_then(Value::as_str) {
        Some("string") => Value::String(format!("<{}>", name)),
        Some("number") | Some("integer") => Value::from(0),
        Some("boolean") => Value::Bool(false),
        Some("array") => Value::Array(Vec::new()),
        Some("object") => Value::Object(Map::new()),
        _ => Value::Null,
    }
}
