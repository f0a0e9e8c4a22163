use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use futures_util::{stream, StreamExt, TryStreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{GenerativeModel, ModelError, ModelResult, TextStream};
use crate::config::AppConfig;

const CONNECT_TIMEOUT_SECS: u64 = 10;
const REQUEST_TIMEOUT_SECS: u64 = 120;

/// Gemini REST client (`generateContent` / `streamGenerateContent`).
pub struct GeminiClient {
    http: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl GeminiClient {
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            http,
            base_url: config.gemini_base_url.trim_end_matches('/').to_string(),
            api_key: config.gemini_api_key.clone(),
            model: config.gemini_model.clone(),
        })
    }

    fn endpoint(&self, action: &str) -> String {
        format!("{}/v1beta/models/{}:{}", self.base_url, self.model, action)
    }

    async fn invoke(&self, request: &GenerateRequest<'_>) -> ModelResult<String> {
        let response = self
            .http
            .post(self.endpoint("generateContent"))
            .header("x-goog-api-key", &self.api_key)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .json(request)
            .send()
            .await
            .map_err(|err| ModelError::Request(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|err| ModelError::ResponseParsing(err.to_string()))?;

        parsed.into_text().ok_or(ModelError::EmptyResponse)
    }
}

#[async_trait]
impl GenerativeModel for GeminiClient {
    async fn generate(&self, system: &str, prompt: &str) -> ModelResult<String> {
        self.invoke(&GenerateRequest::new(system, prompt, None)).await
    }

    async fn generate_stream(&self, system: &str, prompt: &str) -> ModelResult<TextStream> {
        let request = GenerateRequest::new(system, prompt, None);
        let url = format!("{}?alt=sse", self.endpoint("streamGenerateContent"));

        let response = self
            .http
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|err| ModelError::Request(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes_stream().boxed();
        let fragments = stream::try_unfold(
            (bytes, String::new()),
            |(mut bytes, mut buffer)| async move {
                while let Some(chunk) = bytes.next().await {
                    let chunk = chunk.map_err(|err| ModelError::Request(err.to_string()))?;
                    buffer.push_str(&String::from_utf8_lossy(&chunk));
                    let texts = drain_sse_events(&mut buffer)?;
                    if !texts.is_empty() {
                        return Ok(Some((texts, (bytes, buffer))));
                    }
                }
                Ok(None)
            },
        )
        .map_ok(|texts| stream::iter(texts.into_iter().map(Ok::<String, ModelError>)))
        .try_flatten();

        Ok(fragments.boxed())
    }

    async fn generate_structured(
        &self,
        system: &str,
        prompt: &str,
        schema: Value,
    ) -> ModelResult<String> {
        let config = GenerationConfig {
            response_mime_type: Some("application/json"),
            response_schema: Some(schema),
        };
        self.invoke(&GenerateRequest::new(system, prompt, Some(config)))
            .await
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    system_instruction: Instruction<'a>,
    contents: Vec<Content<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

impl<'a> GenerateRequest<'a> {
    fn new(system: &'a str, prompt: &'a str, generation_config: Option<GenerationConfig>) -> Self {
        Self {
            system_instruction: Instruction {
                parts: vec![Part { text: system }],
            },
            contents: vec![Content {
                role: "user",
                parts: vec![Part { text: prompt }],
            }],
            generation_config,
        }
    }
}

#[derive(Serialize)]
struct Instruction<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_schema: Option<Value>,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

impl GenerateResponse {
    /// Concatenated text of the first candidate; None when the provider sent
    /// no usable content (safety block, empty candidate list).
    fn into_text(self) -> Option<String> {
        let candidate = self.candidates.into_iter().next()?;
        let content = candidate.content?;

        let mut out = String::new();
        for part in content.parts {
            if let Some(text) = part.text {
                out.push_str(&text);
            }
        }

        (!out.is_empty()).then_some(out)
    }
}

/// Consumes complete `data:` lines from the SSE buffer, leaving any partial
/// trailing line in place for the next network chunk.
fn drain_sse_events(buffer: &mut String) -> ModelResult<Vec<String>> {
    let mut texts = Vec::new();

    while let Some(pos) = buffer.find('\n') {
        let line: String = buffer.drain(..=pos).collect();
        let line = line.trim();
        let Some(data) = line.strip_prefix("data:") else {
            continue;
        };
        let data = data.trim();
        if data.is_empty() {
            continue;
        }

        let parsed: GenerateResponse = serde_json::from_str(data)
            .map_err(|err| ModelError::ResponseParsing(err.to_string()))?;
        if let Some(text) = parsed.into_text() {
            texts.push(text);
        }
    }

    Ok(texts)
}
