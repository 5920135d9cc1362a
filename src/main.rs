use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing::{info, warn};

use wolram_batch::anthropic::AnthropicClient;
use wolram_batch::capability::LlmCapability;
use wolram_batch::cli::{Cli, Command};
use wolram_batch::config::BatchConfig;
use wolram_batch::dispatcher::{CancelHandle, Dispatcher};
use wolram_batch::input;
use wolram_batch::telemetry;
use wolram_batch::ui::BatchProgress;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    telemetry::init_logging(cli.verbose)?;

    let mut config = BatchConfig::load(cli.config.as_deref())?;

    match cli.command {
        Command::Check { overrides } => {
            overrides.apply(&mut config.engine);
            config.engine.validate()?;
            let engine = &config.engine;
            println!("concurrency:     {}", engine.concurrency);
            println!("max retries:     {}", engine.retry.max_retries);
            println!("retry delay:     {}ms", engine.retry.base_delay_ms);
            match engine.per_attempt_timeout_ms {
                Some(ms) => println!("attempt timeout: {ms}ms"),
                None => println!("attempt timeout: none"),
            }
            println!(
                "schema:          {} field(s), required: [{}]",
                engine.schema.fields.len(),
                engine.schema.required_fields().collect::<Vec<_>>().join(", ")
            );
            println!("model:           {}", config.model);
            Ok(ExitCode::SUCCESS)
        }
        Command::Run {
            input,
            output,
            overrides,
        } => {
            overrides.apply(&mut config.engine);
            run_batch(config, &input, output.as_deref()).await
        }
    }
}

async fn run_batch(config: BatchConfig, input: &Path, output: Option<&Path>) -> Result<ExitCode> {
    if config.api_key.is_empty() {
        bail!("no API key: set ANTHROPIC_API_KEY or api_key in the config file");
    }

    let client = AnthropicClient::with_options(
        config.api_key.clone(),
        config.base_url.clone(),
        config.request_timeout(),
    )?;
    let mut capability = LlmCapability::new(client)
        .with_model(&config.model)
        .with_max_tokens(config.max_tokens);
    if let Some(system) = &config.system {
        capability = capability.with_system(system);
    }

    // Configuration errors surface before the input is even read.
    let dispatcher = Dispatcher::new(capability, &config.engine)?;
    let items = input::load_items(input)?;
    info!(items = items.len(), input = %input.display(), "loaded work items");

    let cancel = CancelHandle::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, finishing in-flight items");
            on_interrupt.cancel();
        }
    });

    let progress = BatchProgress::start(items.len());
    let report = dispatcher
        .run_with_observer(items, &cancel, |result| progress.record(result))
        .await?;
    progress.finish(&report);

    let json = serde_json::to_string_pretty(&report)?;
    match output {
        Some(path) => {
            std::fs::write(path, json)
                .with_context(|| format!("failed to write report {}", path.display()))?;
            info!(path = %path.display(), "report written");
        }
        None => println!("{json}"),
    }

    Ok(if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
