//! Shared test doubles for agent loop tests.

use sandpilot_core::error::ProviderError;
use sandpilot_core::message::{Part, Role, Turn};
use sandpilot_core::provider::{
    Provider, ProviderRequest, ProviderResponse, ToolDefinition, Usage,
};
use sandpilot_core::tool::{ToolExecutor, ToolRequest, ToolResponseEnvelope};
use std::sync::Mutex;

/// A mock provider that returns a sequence of scripted responses.
///
/// Each call to `complete` returns the next response in the queue and records
/// the request it was given. Panics if more calls are made than responses
/// provided.
pub struct SequentialMockProvider {
    responses: Vec<ProviderResponse>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl SequentialMockProvider {
    pub fn new(responses: Vec<ProviderResponse>) -> Self {
        Self {
            responses,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// A provider that returns a single text response (no tool calls).
    pub fn single_text(text: &str) -> Self {
        Self::new(vec![make_text_response(text)])
    }

    /// A provider that first returns tool requests, then a final answer.
    pub fn tool_then_answer(requests: Vec<ToolRequest>, thought: &str, answer: &str) -> Self {
        Self::new(vec![
            make_tool_call_response(requests, thought),
            make_text_response(answer),
        ])
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Every request seen so far, in call order.
    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Provider for SequentialMockProvider {
    fn name(&self) -> &str {
        "sequential_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let mut requests = self.requests.lock().unwrap();
        let index = requests.len();
        let Some(response) = self.responses.get(index) else {
            panic!(
                "SequentialMockProvider: no more responses (call #{index}, have {})",
                self.responses.len()
            );
        };
        requests.push(request);
        Ok(response.clone())
    }
}

/// A provider whose model never stops requesting tools.
#[derive(Default)]
pub struct AlwaysCallsTools {
    calls: Mutex<usize>,
}

impl AlwaysCallsTools {
    pub fn call_count(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait::async_trait]
impl Provider for AlwaysCallsTools {
    fn name(&self) -> &str {
        "always_tools"
    }

    async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        *self.calls.lock().unwrap() += 1;
        Ok(make_tool_call_response(
            vec![ToolRequest::new(
                "get_files_info",
                serde_json::json!({"directory": "."}),
            )],
            "",
        ))
    }
}

/// A provider whose every call fails at the transport level.
pub struct FailingProvider;

#[async_trait::async_trait]
impl Provider for FailingProvider {
    fn name(&self) -> &str {
        "failing"
    }

    async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        Err(ProviderError::Network("connection refused".into()))
    }
}

/// Answers every request with `"<name> <args>"`, except `broken`, which is
/// treated as an unknown tool.
#[derive(Default)]
pub struct EchoExecutor {
    calls: Mutex<Vec<String>>,
}

impl EchoExecutor {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl ToolExecutor for EchoExecutor {
    fn definitions(&self) -> Vec<ToolDefinition> {
        vec![ToolDefinition {
            name: "get_files_info".into(),
            description: "List files".into(),
            parameters: serde_json::json!({"type": "object", "properties": {}}),
        }]
    }

    async fn execute(&self, request: &ToolRequest) -> ToolResponseEnvelope {
        self.calls.lock().unwrap().push(request.name.clone());
        if request.name == "broken" {
            return ToolResponseEnvelope::error(
                &request.id,
                &request.name,
                format!("Unknown function: {}", request.name),
            );
        }
        ToolResponseEnvelope::result(
            &request.id,
            &request.name,
            format!("{} {}", request.name, request.arguments),
        )
    }
}

/// An executor that violates the envelope contract.
pub struct FaultyExecutor;

#[async_trait::async_trait]
impl ToolExecutor for FaultyExecutor {
    fn definitions(&self) -> Vec<ToolDefinition> {
        Vec::new()
    }

    async fn execute(&self, request: &ToolRequest) -> ToolResponseEnvelope {
        ToolResponseEnvelope {
            call_id: request.id.clone(),
            tool_name: request.name.clone(),
            response: serde_json::Map::new(),
        }
    }
}

fn usage() -> Option<Usage> {
    Some(Usage {
        prompt_tokens: 10,
        completion_tokens: 5,
        total_tokens: 15,
    })
}

/// A text-only response (no tool calls).
pub fn make_text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        candidates: vec![Turn::model_text(text)],
        usage: usage(),
        model: "mock-model".into(),
    }
}

/// A response carrying tool requests, optionally preceded by text.
pub fn make_tool_call_response(requests: Vec<ToolRequest>, thought: &str) -> ProviderResponse {
    let mut parts = Vec::new();
    if !thought.is_empty() {
        parts.push(Part::Text {
            text: thought.into(),
        });
    }
    parts.extend(requests.into_iter().map(Part::ToolRequest));
    ProviderResponse {
        candidates: vec![Turn::new(Role::Model, parts)],
        usage: usage(),
        model: "mock-model".into(),
    }
}

/// A response with no candidates at all.
pub fn make_empty_response() -> ProviderResponse {
    ProviderResponse {
        candidates: Vec::new(),
        usage: None,
        model: "mock-model".into(),
    }
}
