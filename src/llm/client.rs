// src/llm/client.rs

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::config::{ApiKey, GenerationConfig, LlmConfig};
use crate::llm::prompt::LlmPrompt;
use crate::llm::sse::SseFragments;

/// Lazy, finite, non-restartable sequence of generated text pieces.
pub type Fragments = Box<dyn Iterator<Item = Result<String, LlmError>>>;

/// The generation capability: prompt + configuration in, text fragments out.
pub trait Generator {
    fn generate(&self, prompt: &LlmPrompt, config: &GenerationConfig)
        -> Result<Fragments, LlmError>;
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("stream error: {0}")]
    Stream(String),

    #[error("response contained no text")]
    EmptyResponse,

    #[error("response looks truncated: {chars} chars, expected at least {min}")]
    Truncated { chars: usize, min: usize },

    #[error("no API key for {0}: set it in the config file or the environment")]
    MissingApiKey(Provider),
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    Gemini,
    OpenAI,
    Anthropic,
}

impl Provider {
    /// Conventional environment variable holding this provider's key.
    pub fn key_env(self) -> &'static str {
        match self {
            Provider::Gemini => "GEMINI_API_KEY",
            Provider::OpenAI => "OPENAI_API_KEY",
            Provider::Anthropic => "ANTHROPIC_API_KEY",
        }
    }

    fn default_base_url(self) -> &'static str {
        match self {
            Provider::Gemini => "https://generativelanguage.googleapis.com/v1beta",
            Provider::OpenAI => "https://api.openai.com/v1/responses",
            Provider::Anthropic => "https://api.anthropic.com/v1/messages",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Provider::Gemini => "gemini",
            Provider::OpenAI => "openai",
            Provider::Anthropic => "anthropic",
        })
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "gemini" => Ok(Provider::Gemini),
            "openai" => Ok(Provider::OpenAI),
            "anthropic" => Ok(Provider::Anthropic),
            other => Err(format!(
                "unknown provider `{other}` (expected gemini, openai or anthropic)"
            )),
        }
    }
}

/* ============================================================
   HTTP client
   ============================================================ */

pub struct LlmClient {
    provider: Provider,
    model: String,
    base_url: Option<String>,
    api_key: ApiKey,
    stream: bool,
    http: reqwest::blocking::Client,
}

impl LlmClient {
    pub fn new(cfg: &LlmConfig) -> Result<Self, LlmError> {
        let api_key = cfg
            .resolve_api_key()
            .ok_or(LlmError::MissingApiKey(cfg.provider))?;

        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()?;

        Ok(Self {
            provider: cfg.provider,
            model: cfg.model.clone(),
            base_url: cfg.base_url.clone(),
            api_key,
            // only Gemini is consumed as a stream
            stream: cfg.stream && cfg.provider == Provider::Gemini,
            http,
        })
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

impl Generator for LlmClient {
    fn generate(
        &self,
        prompt: &LlmPrompt,
        config: &GenerationConfig,
    ) -> Result<Fragments, LlmError> {
        let (url, headers, body) = build_request(
            self.provider,
            &self.model,
            self.base_url.as_deref(),
            &self.api_key,
            self.stream,
            prompt,
            config,
        );

        debug!(provider = %self.provider, model = %self.model, stream = self.stream, "sending generation request");

        let mut req = self.http.post(url).json(&body);
        for (k, v) in headers {
            req = req.header(k, v);
        }

        let resp = req.send()?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            return Err(LlmError::Status {
                status: status.as_u16(),
                body: truncate(&body, 500),
            });
        }

        if self.stream {
            return Ok(Box::new(SseFragments::new(resp, extract_gemini)));
        }

        let json: Value = serde_json::from_reader(resp)?;
        let text = extract_text(self.provider, &json)?;
        Ok(Box::new(std::iter::once(Ok(text))))
    }
}

/* ============================================================
   Request / response shapes per provider
   ============================================================ */

fn build_request(
    provider: Provider,
    model: &str,
    base_url: Option<&str>,
    api_key: &ApiKey,
    stream: bool,
    prompt: &LlmPrompt,
    cfg: &GenerationConfig,
) -> (String, Vec<(&'static str, String)>, Value) {
    let base = base_url
        .unwrap_or_else(|| provider.default_base_url())
        .trim_end_matches('/');

    match provider {
        Provider::Gemini => {
            let url = if stream {
                format!("{base}/models/{model}:streamGenerateContent?alt=sse")
            } else {
                format!("{base}/models/{model}:generateContent")
            };

            let safety: Vec<Value> = cfg
                .safety
                .iter()
                .map(|(category, threshold)| {
                    serde_json::json!({ "category": category, "threshold": threshold })
                })
                .collect();

            let body = serde_json::json!({
                "systemInstruction": { "parts": [{ "text": prompt.system }] },
                "contents": [
                    { "role": "user", "parts": [{ "text": prompt.user }] }
                ],
                "generationConfig": {
                    "temperature": cfg.temperature,
                    "topP": cfg.top_p,
                    "maxOutputTokens": cfg.max_output_tokens,
                },
                "safetySettings": safety,
            });

            (
                url,
                vec![("x-goog-api-key", api_key.expose().to_string())],
                body,
            )
        }

        Provider::OpenAI => {
            let body = serde_json::json!({
                "model": model,
                "instructions": prompt.system,
                "input": prompt.user,
                "temperature": cfg.temperature,
                "top_p": cfg.top_p,
                "max_output_tokens": cfg.max_output_tokens,
            });

            (
                base.to_string(),
                vec![("Authorization", format!("Bearer {}", api_key.expose()))],
                body,
            )
        }

        Provider::Anthropic => {
            let body = serde_json::json!({
                "model": model,
                "max_tokens": cfg.max_output_tokens,
                "temperature": cfg.temperature,
                "system": prompt.system,
                "messages": [
                    { "role": "user", "content": prompt.user }
                ]
            });

            (
                base.to_string(),
                vec![
                    ("x-api-key", api_key.expose().to_string()),
                    ("anthropic-version", "2023-06-01".into()),
                ],
                body,
            )
        }
    }
}

fn extract_text(provider: Provider, v: &Value) -> Result<String, LlmError> {
    if let Some(msg) = v.pointer("/error/message").and_then(Value::as_str) {
        return Err(LlmError::Stream(msg.to_string()));
    }

    let text = match provider {
        Provider::Gemini => extract_gemini(v),

        Provider::OpenAI => v.get("output").and_then(Value::as_array).and_then(|arr| {
            arr.iter().find_map(|item| {
                item.get("content")?
                    .as_array()?
                    .iter()
                    .find_map(|c| c.get("text")?.as_str())
                    .map(str::to_owned)
            })
        }),

        Provider::Anthropic => {
            let parts: Vec<&str> = v
                .get("content")
                .and_then(Value::as_array)
                .map(|arr| {
                    arr.iter()
                        .filter_map(|c| c.get("text").and_then(Value::as_str))
                        .collect()
                })
                .unwrap_or_default();
            (!parts.is_empty()).then(|| parts.concat())
        }
    };

    text.ok_or(LlmError::EmptyResponse)
}

/// Concatenated text parts of the first candidate.
pub(crate) fn extract_gemini(v: &Value) -> Option<String> {
    let parts = v.pointer("/candidates/0/content/parts")?.as_array()?;
    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(Value::as_str))
        .collect();
    (!text.is_empty()).then_some(text)
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prompt() -> LlmPrompt {
        LlmPrompt {
            system: "sys".into(),
            user: "usr".into(),
        }
    }

    #[test]
    fn gemini_request_carries_generation_settings() {
        let key = ApiKey::new("k");
        let (url, headers, body) = build_request(
            Provider::Gemini,
            "gemini-2.5-flash",
            None,
            &key,
            true,
            &prompt(),
            &GenerationConfig::default(),
        );

        assert!(url.ends_with("/models/gemini-2.5-flash:streamGenerateContent?alt=sse"));
        assert_eq!(headers[0].0, "x-goog-api-key");
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "sys");
        assert_eq!(body["contents"][0]["parts"][0]["text"], "usr");
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 8192);
        assert_eq!(body["safetySettings"].as_array().unwrap().len(), 4);
    }

    #[test]
    fn non_streaming_gemini_uses_generate_content() {
        let (url, _, _) = build_request(
            Provider::Gemini,
            "m",
            Some("http://localhost:9/v1beta/"),
            &ApiKey::new("k"),
            false,
            &prompt(),
            &GenerationConfig::default(),
        );
        assert_eq!(url, "http://localhost:9/v1beta/models/m:generateContent");
    }

    #[test]
    fn extracts_text_per_provider() {
        let gemini = serde_json::json!({
            "candidates": [{ "content": { "parts": [{ "text": "a" }, { "text": "b" }] } }]
        });
        assert_eq!(extract_text(Provider::Gemini, &gemini).unwrap(), "ab");

        let openai = serde_json::json!({
            "output": [{ "type": "reasoning" }, { "content": [{ "text": "hi" }] }]
        });
        assert_eq!(extract_text(Provider::OpenAI, &openai).unwrap(), "hi");

        let anthropic = serde_json::json!({ "content": [{ "type": "text", "text": "yo" }] });
        assert_eq!(extract_text(Provider::Anthropic, &anthropic).unwrap(), "yo");
    }

    #[test]
    fn missing_text_is_empty_response() {
        let v = serde_json::json!({ "candidates": [] });
        assert!(matches!(
            extract_text(Provider::Gemini, &v),
            Err(LlmError::EmptyResponse)
        ));

        let err = serde_json::json!({ "error": { "message": "quota" } });
        assert!(matches!(
            extract_text(Provider::OpenAI, &err),
            Err(LlmError::Stream(m)) if m == "quota"
        ));
    }

    #[test]
    fn provider_parses_case_insensitively() {
        assert_eq!("Gemini".parse::<Provider>().unwrap(), Provider::Gemini);
        assert_eq!("openai".parse::<Provider>().unwrap(), Provider::OpenAI);
        assert!("ollama".parse::<Provider>().is_err());
        assert_eq!(Provider::Anthropic.to_string(), "anthropic");
    }

    #[test]
    fn client_without_key_is_rejected() {
        let cfg = LlmConfig {
            provider: Provider::Anthropic,
            ..LlmConfig::default()
        };
        // only meaningful when the environment carries no key
        if cfg.resolve_api_key().is_none() {
            assert!(matches!(
                LlmClient::new(&cfg),
                Err(LlmError::MissingApiKey(Provider::Anthropic))
            ));
        }
    }
}
