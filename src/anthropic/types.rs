//! Tipos de dados para requisições e respostas da API Anthropic Messages.
//!
//! Apenas o subconjunto usado pelo adaptador de capacidade: uma mensagem de
//! usuário, um prompt de sistema opcional e os blocos de texto da resposta.

use serde::{Deserialize, Serialize};

/// Corpo da requisição para o endpoint `/v1/messages`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagesRequest {
    /// Identificador do modelo (ex.: "claude-haiku-4-5-20251001").
    pub model: String,
    /// Número máximo de tokens na resposta.
    pub max_tokens: u32,
    /// Prompt de sistema. Omitido do JSON quando ausente.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    pub messages: Vec<Message>,
}

/// Uma única mensagem em uma conversa.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// "user" ou "assistant".
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }
}

/// Resposta retornada pelo endpoint `/v1/messages`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagesResponse {
    pub id: String,
    pub content: Vec<ContentBlock>,
    pub model: String,
    /// Motivo da parada (ex.: "end_turn", "max_tokens").
    pub stop_reason: Option<String>,
    pub usage: Usage,
}

impl MessagesResponse {
    /// Concatena o texto de todos os blocos `text`, ignorando os demais tipos.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter(|b| b.content_type == "text")
            .map(|b| b.text.as_str())
            .collect::<Vec<_>>()
            .join("")
    }
}

/// Um bloco de conteúdo dentro da resposta.
///
/// Blocos que não são de texto (ex.: `tool_use`) chegam sem o campo `text`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub content_type: String,
    #[serde(default)]
    pub text: String,
}

/// Estatísticas de consumo de tokens.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_omits_missing_system_prompt() {
        let req = MessagesRequest {
            model: "claude-haiku-4-5-20251001".into(),
            max_tokens: 512,
            system: None,
            messages: vec![Message::user("Hello")],
        };
        let json = serde_json::to_string(&req).unwrap();
        assert!(!json.contains("system"));
        assert!(json.contains(r#""role":"user""#));
    }

    #[test]
    fn request_includes_system_prompt() {
        let req = MessagesRequest {
            model: "m".into(),
            max_tokens: 1,
            system: Some("Respond with JSON".into()),
            messages: vec![],
        };
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["system"], "Respond with JSON");
    }

    #[test]
    fn response_text_joins_text_blocks_only() {
        let api_json = r#"{
            "id": "msg_123",
            "content": [
                {"type": "text", "text": "{\"a\":"},
                {"type": "tool_use", "id": "t1", "name": "x", "input": {}},
                {"type": "text", "text": " 1}"}
            ],
            "model": "claude-haiku-4-5-20251001",
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 5, "output_tokens": 15}
        }"#;
        let resp: MessagesResponse = serde_json::from_str(api_json).unwrap();
        assert_eq!(resp.content.len(), 3);
        assert_eq!(resp.text(), r#"{"a": 1}"#);
    }

    #[test]
    fn response_null_stop_reason() {
        let json = r#"{
            "id": "msg_456",
            "content": [],
            "model": "test",
            "stop_reason": null,
            "usage": {"input_tokens": 0, "output_tokens": 0}
        }"#;
        let resp: MessagesResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.stop_reason, None);
        assert!(resp.text().is_empty());
    }
}
