//! Tipos de erro para o cliente da API Anthropic.
//!
//! Define [`AnthropicError`] com variantes para rate limiting, erros da API,
//! erros de rede e falhas na construção do cliente HTTP.

use thiserror::Error;

/// Erros que podem ocorrer ao interagir com a API da Anthropic.
///
/// Para o motor de lote todas as variantes são recuperáveis: a tentativa
/// falha e o controlador de retentativas decide se tenta de novo.
#[derive(Debug, Error)]
pub enum AnthropicError {
    /// O servidor retornou HTTP 429 (rate limit).
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// Erro retornado pela API (ex.: 401 chave inválida, 500 erro interno).
    #[error("API error (status {status}): {message}")]
    ApiError { status: u16, message: String },

    /// Falha de rede subjacente (DNS, conexão recusada, timeout do reqwest).
    #[error("network error: {0}")]
    NetworkError(#[from] reqwest::Error),
}
