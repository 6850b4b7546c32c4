//! Standard node library
//!
//! The four workflow node capabilities and a local LLM gateway.

mod agent;
mod dynamic_text;
mod echo;
mod output;
mod schema;

pub use agent::{structured_envelope, AgentConfig, AgentNode, AgentNodeFactory, AGENT_NODE};
pub use dynamic_text::{DynamicTextNode, DynamicTextNodeFactory, DYNAMIC_TEXT_NODE};
pub use echo::EchoGateway;
pub use output::{OutputNode, OutputNodeFactory, OUTPUT_NODE};
pub use schema::{SchemaNode, SchemaNodeFactory, SCHEMA_NODE};

use protocore::LlmGateway;
use protoruntime::NodeRegistry;
use std::sync::Arc;

/// Register all standard nodes with a registry. Agents talk to `gateway`.
pub fn register_all(registry: &mut NodeRegistry, gateway: Arc<dyn LlmGateway>) {
    register_with(registry, AgentNodeFactory::new(gateway));
}

/// Like [`register_all`], with a preconfigured agent factory.
pub fn register_with(registry: &mut NodeRegistry, agent: AgentNodeFactory) {
    registry.register(Arc::new(agent));
    registry.register(Arc::new(OutputNodeFactory));
    registry.register(Arc::new(SchemaNodeFactory));
    registry.register(Arc::new(DynamicTextNodeFactory));
}
