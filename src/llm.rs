//! LLM API abstraction: builds vision requests and extracts the reply text
//! for Anthropic, OpenAI-compatible and Gemini APIs.

use serde_json::Value;

use crate::config::{LlmProvider, LlmProviderConfig};
use crate::provider::ProviderError;

const MAX_TOKENS: u32 = 4096;

/// Resolved provider details ready for making an API call.
#[derive(Debug, Clone)]
pub struct ResolvedProvider {
    pub url: String,
    pub api_key: String,
    pub model: String,
    pub provider: LlmProvider,
}

/// An image attached to a request.
#[derive(Debug, Clone, Copy)]
pub struct ImagePart<'a> {
    pub mime: &'a str,
    pub base64: &'a str,
}

impl ResolvedProvider {
    /// Resolve a provider config into concrete URL / key / model values.
    pub fn from_config(config: &LlmProviderConfig) -> Result<Self, ProviderError> {
        let api_key = config
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or(ProviderError::MissingApiKey(config.provider.api_key_env()))?
            .to_string();
        let base = |default: &'static str| {
            config
                .base_url
                .as_deref()
                .unwrap_or(default)
                .trim_end_matches('/')
                .to_string()
        };
        let model = |default: &str| config.model.clone().unwrap_or_else(|| default.to_string());

        Ok(match config.provider {
            LlmProvider::Anthropic => Self {
                url: format!("{}/messages", base("https://api.anthropic.com/v1")),
                api_key,
                model: model("claude-sonnet-4-20250514"),
                provider: LlmProvider::Anthropic,
            },
            LlmProvider::OpenAiCompatible => Self {
                url: format!("{}/chat/completions", base("https://api.openai.com/v1")),
                api_key,
                model: model("gpt-4o"),
                provider: LlmProvider::OpenAiCompatible,
            },
            LlmProvider::Gemini => {
                let model = model("gemini-2.0-flash");
                Self {
                    url: format!(
                        "{}/models/{model}:generateContent",
                        base("https://generativelanguage.googleapis.com/v1beta")
                    ),
                    api_key,
                    model,
                    provider: LlmProvider::Gemini,
                }
            }
        })
    }
}

/// Build an HTTP request carrying `prompt` and `image` for the resolved provider.
pub fn build_request(
    client: &reqwest::Client,
    provider: &ResolvedProvider,
    system_prompt: &str,
    prompt: &str,
    image: ImagePart<'_>,
) -> reqwest::RequestBuilder {
    let body = request_body(provider, system_prompt, prompt, image);
    let request = client.post(&provider.url).header("content-type", "application/json");
    let request = match provider.provider {
        LlmProvider::Anthropic => request
            .header("x-api-key", &provider.api_key)
            .header("anthropic-version", "2023-06-01"),
        LlmProvider::OpenAiCompatible => {
            request.header("Authorization", format!("Bearer {}", provider.api_key))
        }
        LlmProvider::Gemini => request.header("x-goog-api-key", &provider.api_key),
    };
    request.json(&body)
}

/// JSON body for the resolved provider.
pub fn request_body(
    provider: &ResolvedProvider,
    system_prompt: &str,
    prompt: &str,
    image: ImagePart<'_>,
) -> Value {
    match provider.provider {
        LlmProvider::Anthropic => serde_json::json!({
            "model": provider.model,
            "max_tokens": MAX_TOKENS,
            "system": system_prompt,
            "messages": [{
                "role": "user",
                "content": [
                    {
                        "type": "image",
                        "source": {
                            "type": "base64",
                            "media_type": image.mime,
                            "data": image.base64,
                        }
                    },
                    { "type": "text", "text": prompt },
                ],
            }],
        }),
        LlmProvider::OpenAiCompatible => serde_json::json!({
            "model": provider.model,
            "max_tokens": MAX_TOKENS,
            "response_format": { "type": "json_object" },
            "messages": [
                { "role": "system", "content": system_prompt },
                {
                    "role": "user",
                    "content": [
                        { "type": "text", "text": prompt },
                        {
                            "type": "image_url",
                            "image_url": { "url": format!("data:{};base64,{}", image.mime, image.base64) },
                        },
                    ],
                },
            ],
        }),
        LlmProvider::Gemini => serde_json::json!({
            "systemInstruction": { "parts": [{ "text": system_prompt }] },
            "contents": [{
                "role": "user",
                "parts": [
                    { "text": prompt },
                    { "inline_data": { "mime_type": image.mime, "data": image.base64 } },
                ],
            }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "maxOutputTokens": MAX_TOKENS,
            },
        }),
    }
}

/// Pull the model's text out of the provider's response JSON.
pub fn extract_text(provider: LlmProvider, json: &Value) -> Result<String, ProviderError> {
    let text = match provider {
        LlmProvider::Anthropic => json
            .get("content")
            .and_then(Value::as_array)
            .map(|blocks| join_text(blocks.iter().filter(|b| b.get("type").and_then(Value::as_str) == Some("text"))))
            .unwrap_or_default(),
        LlmProvider::OpenAiCompatible => json
            .get("choices")
            .and_then(Value::as_array)
            .and_then(|arr| arr.first())
            .and_then(|choice| choice.get("message"))
            .and_then(|message| message.get("content"))
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string(),
        LlmProvider::Gemini => json
            .get("candidates")
            .and_then(Value::as_array)
            .and_then(|arr| arr.first())
            .and_then(|c| c.get("content"))
            .and_then(|c| c.get("parts"))
            .and_then(Value::as_array)
            .map(|parts| join_text(parts.iter()))
            .unwrap_or_default(),
    };
    if text.trim().is_empty() {
        Err(ProviderError::EmptyResponse)
    } else {
        Ok(text)
    }
}

fn join_text<'a>(blocks: impl Iterator<Item = &'a Value>) -> String {
    blocks
        .filter_map(|b| b.get("text").and_then(Value::as_str))
        .collect::<Vec<_>>()
        .join("\n")
}
