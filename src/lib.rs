//! # wolram-batch
//!
//! Runs a batch of independent work items against a fallible capability
//! (usually an LLM call) with a fixed concurrency cap, validates every answer
//! against a structural contract, retries within a budget, and returns one
//! report in input order.
//!
//! ```no_run
//! use wolram_batch::anthropic::AnthropicClient;
//! use wolram_batch::capability::LlmCapability;
//! use wolram_batch::config::EngineConfig;
//! use wolram_batch::dispatcher::Dispatcher;
//! use wolram_batch::state_machine::WorkItem;
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let client = AnthropicClient::new("sk-ant-...".into())?;
//! let dispatcher = Dispatcher::new(LlmCapability::new(client), &EngineConfig::default())?;
//! let report = dispatcher
//!     .run(vec![WorkItem::new("a", serde_json::json!({"text": "hello"}))])
//!     .await?;
//! println!("{} of {} succeeded", report.success_count, report.total);
//! # Ok(())
//! # }
//! ```

pub mod anthropic;
pub mod capability;
pub mod cli;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod input;
pub mod report;
pub mod state_machine;
pub mod telemetry;
pub mod ui;
pub mod validator;
