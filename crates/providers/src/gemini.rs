//! Google Gemini provider implementation.
//!
//! Uses the `models/{model}:generateContent` REST endpoint directly.
//!
//! Mapping notes:
//! - The system instruction is a top-level `systemInstruction` field
//! - Model turns use role `model`; tool responses are sent back with role
//!   `user` as `functionResponse` parts
//! - Tool declarations go in a single `functionDeclarations` block
//! - `functionCall` parts come back as tool requests. Gemini doesn't always
//!   assign call IDs, so missing ones are generated locally with a `local-`
//!   prefix. Only model-assigned IDs are echoed back on later turns

use async_trait::async_trait;
use sandpilot_config::AppConfig;
use sandpilot_core::error::ProviderError;
use sandpilot_core::message::{Part, Role, Turn};
use sandpilot_core::provider::{
    Provider, ProviderRequest, ProviderResponse, ToolDefinition, Usage,
};
use sandpilot_core::tool::{ToolRequest, ToolResponseEnvelope};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Marks call IDs the model never saw.
const LOCAL_CALL_ID_PREFIX: &str = "local-";

/// Gemini `generateContent` provider.
pub struct GeminiProvider {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl GeminiProvider {
    /// Create a provider against the public Gemini endpoint.
    pub fn new(api_key: impl Into<String>) -> Result<Self, ProviderError> {
        Self::with_options(api_key, DEFAULT_BASE_URL, DEFAULT_TIMEOUT_SECS)
    }

    /// Create a provider with a custom base URL and request timeout.
    pub fn with_options(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        timeout_secs: u64,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ProviderError::NotConfigured(format!("HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
        })
    }

    /// Build from application config. Fails if no API key is configured.
    pub fn from_config(config: &AppConfig) -> Result<Self, ProviderError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                ProviderError::NotConfigured(format!(
                    "{} is not set",
                    sandpilot_config::API_KEY_ENV
                ))
            })?;
        Self::with_options(api_key, &config.api_url, config.request_timeout_secs)
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/models/{}:generateContent", self.base_url, model)
    }

    /// Convert conversation turns to Gemini `contents`.
    fn to_api_contents(turns: &[Turn]) -> Vec<GeminiContent> {
        turns
            .iter()
            .filter(|t| !t.parts.is_empty())
            .map(|turn| GeminiContent {
                role: Some(
                    match turn.role {
                        Role::Model => "model",
                        // Gemini has no tool role; responses ride on user turns
                        Role::User | Role::Tool => "user",
                    }
                    .into(),
                ),
                parts: turn.parts.iter().map(Self::to_api_part).collect(),
            })
            .collect()
    }

    fn to_api_part(part: &Part) -> GeminiPart {
        match part {
            Part::Text { text } => GeminiPart {
                text: Some(text.clone()),
                ..GeminiPart::default()
            },
            Part::ToolRequest(req) => GeminiPart {
                function_call: Some(GeminiFunctionCall {
                    id: wire_call_id(&req.id),
                    name: req.name.clone(),
                    args: req.arguments.clone(),
                }),
                ..GeminiPart::default()
            },
            Part::ToolResponse(env) => GeminiPart {
                function_response: Some(Self::to_api_response(env)),
                ..GeminiPart::default()
            },
        }
    }

    fn to_api_response(env: &ToolResponseEnvelope) -> GeminiFunctionResponse {
        GeminiFunctionResponse {
            id: wire_call_id(&env.call_id),
            name: env.tool_name.clone(),
            response: serde_json::Value::Object(env.response.clone()),
        }
    }

    /// Convert tool definitions to a Gemini `tools` block.
    fn to_api_tools(tools: &[ToolDefinition]) -> Vec<GeminiTool> {
        if tools.is_empty() {
            return Vec::new();
        }
        vec![GeminiTool {
            function_declarations: tools
                .iter()
                .map(|t| GeminiFunctionDeclaration {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.parameters.clone(),
                })
                .collect(),
        }]
    }

    fn build_body(request: &ProviderRequest) -> GeminiRequest {
        GeminiRequest {
            system_instruction: (!request.system_instruction.is_empty()).then(|| GeminiContent {
                role: None,
                parts: vec![GeminiPart {
                    text: Some(request.system_instruction.clone()),
                    ..GeminiPart::default()
                }],
            }),
            contents: Self::to_api_contents(&request.turns),
            tools: Self::to_api_tools(&request.tools),
        }
    }

    /// Convert a decoded API response into domain turns.
    fn from_api_response(api: GeminiResponse, requested_model: &str) -> ProviderResponse {
        let candidates = api
            .candidates
            .into_iter()
            .filter_map(|c| {
                if c.content.is_none() {
                    warn!(finish_reason = ?c.finish_reason, "Candidate returned without content");
                }
                c.content
            })
            .map(|content| {
                let parts = content
                    .parts
                    .into_iter()
                    .filter_map(|p| {
                        if let Some(call) = p.function_call {
                            let mut req = ToolRequest::new(call.name, call.args);
                            req.id = match call.id {
                                Some(id) => id,
                                None => format!("{LOCAL_CALL_ID_PREFIX}{}", req.id),
                            };
                            Some(Part::ToolRequest(req))
                        } else {
                            p.text.map(|text| Part::Text { text })
                        }
                    })
                    .collect();
                Turn::new(Role::Model, parts)
            })
            .collect();

        let usage = api.usage_metadata.map(|u| Usage {
            prompt_tokens: u.prompt_token_count,
            completion_tokens: u.candidates_token_count,
            total_tokens: u.total_token_count,
        });

        ProviderResponse {
            candidates,
            usage,
            model: api
                .model_version
                .unwrap_or_else(|| requested_model.to_string()),
        }
    }

    fn status_error(status: u16, body: String) -> ProviderError {
        match status {
            401 | 403 => ProviderError::AuthenticationFailed(
                "Invalid API key or insufficient permissions".into(),
            ),
            429 => ProviderError::RateLimited {
                retry_after_secs: 5,
            },
            _ => ProviderError::ApiError {
                status_code: status,
                message: body,
            },
        }
    }
}

#[async_trait]
impl Provider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        let url = self.endpoint(&request.model);
        let body = Self::build_body(&request);

        debug!(
            model = %request.model,
            turns = request.turns.len(),
            tools = request.tools.len(),
            "Sending generateContent request"
        );

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Gemini returned error");
            return Err(Self::status_error(status, error_body));
        }

        let api_response: GeminiResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::MalformedResponse(e.to_string()))?;

        Ok(Self::from_api_response(api_response, &request.model))
    }
}

// --- Gemini API types ---

/// The ID to send back to the model, if the model assigned it.
fn wire_call_id(id: &str) -> Option<String> {
    (!id.is_empty() && !id.starts_with(LOCAL_CALL_ID_PREFIX)).then(|| id.to_string())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<GeminiTool>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_call: Option<GeminiFunctionCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_response: Option<GeminiFunctionResponse>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiFunctionCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    name: String,
    #[serde(default)]
    args: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiFunctionResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    name: String,
    response: serde_json::Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiTool {
    function_declarations: Vec<GeminiFunctionDeclaration>,
}

#[derive(Debug, Serialize)]
struct GeminiFunctionDeclaration {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    usage_metadata: Option<GeminiUsage>,
    #[serde(default)]
    model_version: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiUsage {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
    #[serde(default)]
    total_token_count: u32,
}
