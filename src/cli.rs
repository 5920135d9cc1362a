//! Interface de linha de comando do wolram-batch baseada em clap.
//!
//! Define a struct [`Cli`] com subcomandos [`Command`] (run, check) e a flag
//! global `--verbose`.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::EngineConfig;

/// wolram-batch — Executa lotes de chamadas LLM com validação e retentativas.
#[derive(Debug, Parser)]
#[command(name = "wolram-batch", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Caminho do arquivo de configuração (padrão: ./wolram-batch.toml).
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,

    /// Habilita logs detalhados (nível debug).
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

/// Ajustes do motor que sobrescrevem o arquivo de configuração.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct EngineOverrides {
    /// Máximo de itens em execução simultânea.
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Número máximo de retentativas por item.
    #[arg(long)]
    pub max_retries: Option<u32>,

    /// Limite, em milissegundos, para cada chamada à capacidade.
    #[arg(long)]
    pub timeout_ms: Option<u64>,
}

impl EngineOverrides {
    pub fn apply(&self, engine: &mut EngineConfig) {
        if let Some(concurrency) = self.concurrency {
            engine.concurrency = concurrency;
        }
        if let Some(max_retries) = self.max_retries {
            engine.retry.max_retries = max_retries;
        }
        if let Some(timeout_ms) = self.timeout_ms {
            engine.per_attempt_timeout_ms = Some(timeout_ms);
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Executa um lote de itens lido de um arquivo JSON.
    Run {
        /// Arquivo JSON com um array de itens `{"id": ..., "payload": ...}`.
        input: PathBuf,

        /// Grava o relatório JSON neste caminho em vez da saída padrão.
        #[arg(long, short)]
        output: Option<PathBuf>,

        #[command(flatten)]
        overrides: EngineOverrides,
    },

    /// Valida a configuração e o schema sem executar nada.
    Check {
        #[command(flatten)]
        overrides: EngineOverrides,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_parses_run_subcommand() {
        let cli = Cli::parse_from([
            "wolram-batch",
            "run",
            "items.json",
            "--concurrency",
            "8",
            "--max-retries",
            "1",
            "--timeout-ms",
            "5000",
            "-o",
            "report.json",
        ]);
        match cli.command {
            Command::Run {
                input,
                output,
                overrides,
            } => {
                assert_eq!(input, PathBuf::from("items.json"));
                assert_eq!(output, Some(PathBuf::from("report.json")));
                assert_eq!(overrides.concurrency, Some(8));
                assert_eq!(overrides.max_retries, Some(1));
                assert_eq!(overrides.timeout_ms, Some(5000));
            }
            _ => panic!("expected Run command"),
        }
    }

    #[test]
    fn cli_parses_global_flags() {
        let cli = Cli::parse_from(["wolram-batch", "--verbose", "--config", "alt.toml", "check"]);
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("alt.toml")));
        assert!(matches!(cli.command, Command::Check { .. }));
    }

    #[test]
    fn overrides_replace_only_given_values() {
        let mut engine = EngineConfig::default();
        let overrides = EngineOverrides {
            concurrency: Some(0),
            max_retries: None,
            timeout_ms: Some(250),
        };
        overrides.apply(&mut engine);
        assert_eq!(engine.concurrency, 0);
        assert_eq!(engine.retry.max_retries, 2);
        assert_eq!(engine.per_attempt_timeout_ms, Some(250));
        // Overrides are not validated here; the dispatcher rejects them.
        assert!(engine.validate().is_err());
    }

    #[test]
    fn cli_verify() {
        Cli::command().debug_assert();
    }
}
