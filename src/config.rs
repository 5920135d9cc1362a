//! Configuração do wolram-batch carregada a partir de `wolram-batch.toml`.
//!
//! [`BatchConfig`] reúne as opções do cliente da API e a seção `[engine]`
//! ([`EngineConfig`]), que é tudo o que o motor de lote enxerga.
//! Valores ausentes no arquivo usam defaults sensíveis.
//! A variável de ambiente `ANTHROPIC_API_KEY` tem precedência sobre o arquivo.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::anthropic::API_URL;
use crate::capability::{DEFAULT_MAX_TOKENS, DEFAULT_MODEL};
use crate::error::BatchError;
use crate::executor::AttemptContext;
use crate::state_machine::RetryConfig;
use crate::validator::StructuralContract;

pub const DEFAULT_CONFIG_FILE: &str = "wolram-batch.toml";

/// Opções do motor, validadas antes de qualquer despacho.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Máximo de itens em execução simultânea.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Orçamento de retentativas e atraso opcional entre tentativas.
    #[serde(flatten)]
    pub retry: RetryConfig,

    /// Limite superior para uma única chamada à capacidade.
    #[serde(default)]
    pub per_attempt_timeout_ms: Option<u64>,

    /// Instrução textual enviada junto com cada payload.
    #[serde(default = "default_instruction")]
    pub instruction: String,

    /// Contrato estrutural que cada resultado precisa satisfazer.
    #[serde(default)]
    pub schema: StructuralContract,
}

// Valor padrão para a concorrência: 4.
fn default_concurrency() -> usize {
    4
}

fn default_instruction() -> String {
    "Process the following input and answer with a JSON object.".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            retry: RetryConfig::default(),
            per_attempt_timeout_ms: None,
            instruction: default_instruction(),
            schema: StructuralContract::default(),
        }
    }
}

impl EngineConfig {
    /// Rejeita configurações inválidas antes de qualquer trabalho começar.
    pub fn validate(&self) -> Result<(), BatchError> {
        if self.concurrency < 1 {
            return Err(BatchError::Config(
                "concurrency must be at least 1".to_string(),
            ));
        }
        if self.per_attempt_timeout_ms == Some(0) {
            return Err(BatchError::Config(
                "per_attempt_timeout_ms must be greater than 0".to_string(),
            ));
        }
        self.schema.check()
    }

    pub fn per_attempt_timeout(&self) -> Option<Duration> {
        self.per_attempt_timeout_ms.map(Duration::from_millis)
    }

    pub fn attempt_context(&self) -> AttemptContext {
        AttemptContext {
            instruction: self.instruction.clone(),
            contract: self.schema.clone(),
            timeout: self.per_attempt_timeout(),
        }
    }
}

/// Configuração de nível superior carregada de `wolram-batch.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct BatchConfig {
    /// Chave da API Anthropic.
    #[serde(default)]
    pub api_key: String,

    /// Endpoint da API Messages (útil para proxies).
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Modelo usado pela capacidade LLM.
    #[serde(default = "default_model")]
    pub model: String,

    /// Máximo de tokens por resposta.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Prompt de sistema opcional.
    #[serde(default)]
    pub system: Option<String>,

    /// Timeout de transporte do cliente HTTP, em segundos.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default)]
    pub engine: EngineConfig,
}

fn default_base_url() -> String {
    API_URL.to_string()
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_max_tokens() -> u32 {
    DEFAULT_MAX_TOKENS
}

// Valor padrão para o timeout de transporte: 120s.
fn default_request_timeout_secs() -> u64 {
    120
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_base_url(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            system: None,
            request_timeout_secs: default_request_timeout_secs(),
            engine: EngineConfig::default(),
        }
    }
}

impl BatchConfig {
    /// Carrega a configuração.
    ///
    /// Com um caminho explícito o arquivo precisa existir. Sem caminho, usa
    /// `wolram-batch.toml` no diretório atual ou os valores padrão.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    Self::from_file(default_path)?
                } else {
                    Self::default()
                }
            }
        };

        Ok(config.with_api_key_override(std::env::var("ANTHROPIC_API_KEY").ok()))
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config = toml::from_str::<BatchConfig>(&contents)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        Ok(config)
    }

    /// Variável de ambiente tem precedência sobre o arquivo para a chave API.
    pub fn with_api_key_override(mut self, key: Option<String>) -> Self {
        if let Some(key) = key
            && !key.is_empty()
        {
            self.api_key = key;
        }
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
