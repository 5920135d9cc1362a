pub mod client;
pub mod error;
pub mod types;

use std::future::Future;

pub use client::{API_URL, AnthropicClient};
pub use error::AnthropicError;
pub use types::{ContentBlock, Message, MessagesRequest, MessagesResponse, Usage};

/// Anything that can answer a Messages API request.
///
/// Implemented by [`AnthropicClient`] and by test doubles, so the capability
/// adapter never depends on a live HTTP endpoint.
pub trait MessageSender {
    fn send_message(
        &self,
        req: &MessagesRequest,
    ) -> impl Future<Output = Result<MessagesResponse, AnthropicError>> + Send;
}
