//! The external operation work items are dispatched to.
//!
//! The engine only needs "payload + instruction in, raw text out, or an
//! error". [`LlmCapability`] is the production adapter over the Anthropic
//! Messages API; tests supply their own implementations.

use std::future::Future;

use serde_json::Value;
use tracing::debug;

use crate::anthropic::{Message, MessageSender, MessagesRequest};
use crate::error::CapabilityError;

pub const DEFAULT_MODEL: &str = "claude-haiku-4-5-20251001";
pub const DEFAULT_MAX_TOKENS: u32 = 1024;

/// A fallible asynchronous operation applied to one payload.
///
/// Implementations must be shareable across worker slots; the returned
/// future must be `Send` so slots can run on any runtime thread.
pub trait Capability: Send + Sync + 'static {
    fn invoke(
        &self,
        payload: &Value,
        instruction: &str,
    ) -> impl Future<Output = Result<String, CapabilityError>> + Send;
}

/// Sends each payload to a model as a single user message.
pub struct LlmCapability<S> {
    sender: S,
    model: String,
    max_tokens: u32,
    system: Option<String>,
}

impl<S: MessageSender> LlmCapability<S> {
    pub fn new(sender: S) -> Self {
        Self {
            sender,
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            system: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    fn build_request(&self, payload: &Value, instruction: &str) -> MessagesRequest {
        let rendered = serde_json::to_string_pretty(payload).unwrap_or_else(|_| payload.to_string());
        MessagesRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            system: self.system.clone(),
            messages: vec![Message::user(format!(
                "{instruction}\n\nRespond with ONLY valid JSON, no other text.\n\nInput:\n{rendered}"
            ))],
        }
    }
}

impl<S> Capability for LlmCapability<S>
where
    S: MessageSender + Send + Sync + 'static,
{
    async fn invoke(&self, payload: &Value, instruction: &str) -> Result<String, CapabilityError> {
        let req = self.build_request(payload, instruction);
        let response = self.sender.send_message(&req).await?;
        debug!(
            model = %response.model,
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            stop_reason = response.stop_reason.as_deref().unwrap_or("none"),
            "capability responded"
        );

        let text = response.text();
        if text.trim().is_empty() {
            return Err(CapabilityError::EmptyResponse);
        }
        Ok(text)
    }
}
