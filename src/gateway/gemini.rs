//! Google Gemini gateway implementation

use super::types::{GenerateRequest, Role};
use super::{FragmentStream, GatewayError, ModelGateway};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DIRECT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Gemini gateway
pub struct GeminiGateway {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl GeminiGateway {
    pub fn new(
        api_key: String,
        model: impl Into<String>,
        gateway: Option<&str>,
    ) -> Result<Self, GatewayError> {
        let base_url = match gateway {
            Some(gw) => format!("{}/gemini/v1beta", gw.trim_end_matches('/')),
            None => DIRECT_BASE_URL.to_string(),
        };

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .timeout(Duration::from_secs(600))
            .build()
            .map_err(|e| GatewayError::unknown(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key,
            base_url,
            model: model.into(),
        })
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/models/{}:{}", self.base_url, self.model, method)
    }

    fn post(&self, url: &str) -> reqwest::RequestBuilder {
        let builder = self
            .client
            .post(url)
            .header("Content-Type", "application/json");
        if self.api_key == "implicit" {
            // Gateway mode - the proxy authenticates
            builder
        } else {
            builder.header("x-goog-api-key", &self.api_key)
        }
    }

    fn translate_request(request: &GenerateRequest) -> GeminiRequest {
        let mut contents: Vec<GeminiContent> = request
            .history
            .iter()
            .map(|turn| GeminiContent {
                role: Some(role_name(turn.role).to_string()),
                parts: vec![GeminiPart::Text {
                    text: turn.text.clone(),
                }],
            })
            .collect();

        let mut prompt = GeminiContent {
            role: Some("user".to_string()),
            parts: vec![GeminiPart::Text {
                text: request.prompt.clone(),
            }],
        };

        if let Some(attachment) = &request.attachment {
            let part = GeminiPart::InlineData {
                inline_data: GeminiInlineData {
                    mime_type: attachment.mime_type.clone(),
                    data: BASE64.encode(&attachment.data),
                },
            };
            // The document rides with the first user turn so follow-ups keep it in view
            match contents
                .iter_mut()
                .find(|c| c.role.as_deref() == Some("user"))
            {
                Some(first_user) => first_user.parts.push(part),
                None => prompt.parts.push(part),
            }
        }

        contents.push(prompt);

        GeminiRequest { contents }
    }

    async fn send(
        &self,
        url: &str,
        request: &GenerateRequest,
    ) -> Result<reqwest::Response, GatewayError> {
        let body = Self::translate_request(request);

        let response = self
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GatewayError::network(format!("Request timeout: {e}"))
                } else if e.is_connect() {
                    GatewayError::network(format!("Connection failed: {e}"))
                } else {
                    GatewayError::unknown(format!("Request failed: {e}"))
                }
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response
            .text()
            .await
            .map_err(|e| GatewayError::network(format!("Failed to read response: {e}")))?;
        if let Ok(error_resp) = serde_json::from_str::<GeminiErrorResponse>(&body) {
            return Err(GatewayError::from_status(
                status.as_u16(),
                &error_resp.error.message,
            ));
        }
        Err(GatewayError::from_status(status.as_u16(), &body))
    }
}

#[async_trait]
impl ModelGateway for GeminiGateway {
    async fn stream_generate(
        &self,
        request: &GenerateRequest,
    ) -> Result<FragmentStream, GatewayError> {
        let url = format!("{}?alt=sse", self.endpoint("streamGenerateContent"));
        let response = self.send(&url, request).await?;

        // Comments and keep-alives never surface as events; an interrupted
        // body becomes a terminal error item
        let fragments = response
            .bytes_stream()
            .eventsource()
            .filter_map(|event| async move {
                match event {
                    Ok(event) => decode_chunk(&event.data),
                    Err(e) => Some(Err(GatewayError::network(format!(
                        "Stream interrupted: {e}"
                    )))),
                }
            });

        Ok(fragments.boxed())
    }

    async fn generate_once(&self, request: &GenerateRequest) -> Result<String, GatewayError> {
        let response = self.send(&self.endpoint("generateContent"), request).await?;
        let body = response
            .text()
            .await
            .map_err(|e| GatewayError::network(format!("Failed to read response: {e}")))?;

        let parsed: GeminiResponse = serde_json::from_str(&body)
            .map_err(|e| GatewayError::unknown(format!("Failed to parse response: {e}")))?;

        let text = normalize_chunk(parsed)?;
        if text.is_empty() {
            return Err(GatewayError::unknown("No text in model response"));
        }
        Ok(text)
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

fn role_name(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Model => "model",
    }
}

/// Decode one streamed payload into its text. Chunks without text (usage
/// metadata, empty parts) yield nothing.
fn decode_chunk(payload: &str) -> Option<Result<String, GatewayError>> {
    if payload.trim().is_empty() {
        return None;
    }
    let item = serde_json::from_str::<GeminiResponse>(payload)
        .map_err(|e| GatewayError::unknown(format!("Malformed stream chunk: {e}")))
        .and_then(normalize_chunk);
    match item {
        Ok(text) if text.is_empty() => None,
        other => Some(other),
    }
}

/// Concatenate the text parts of the first candidate
fn normalize_chunk(resp: GeminiResponse) -> Result<String, GatewayError> {
    if let Some(reason) = resp.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(GatewayError::invalid_request(format!(
            "Prompt blocked: {reason}"
        )));
    }

    let text = resp
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| match part {
                    GeminiPart::Text { text } => Some(text),
                    GeminiPart::InlineData { .. } => None,
                })
                .collect::<String>()
        })
        .unwrap_or_default();

    Ok(text)
}

// Gemini API types

#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum GeminiPart {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: GeminiInlineData,
    },
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiInlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    prompt_feedback: Option<GeminiPromptFeedback>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorResponse {
    error: GeminiError,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    message: String,
}
