//! The step-bounded agent loop.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use sandpilot_core::error::ProviderError;
use sandpilot_core::event::{DomainEvent, EventBus};
use sandpilot_core::message::{Conversation, Turn};
use sandpilot_core::provider::{Provider, ProviderRequest};
use sandpilot_core::tool::{ToolExecutor, ToolRequest};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::prompt::SYSTEM_INSTRUCTION;
use crate::stream_event::AgentEvent;

/// Default number of model calls allowed per invocation.
pub const MAX_STEPS: u32 = 20;

/// Step-fatal failures. Tool failures are never reported here; they go back
/// to the model as error envelopes.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Model call failed at step {step}: {source}")]
    Provider {
        step: u32,
        #[source]
        source: ProviderError,
    },

    #[error("Tool '{tool_name}' answered with neither a result nor an error")]
    ProtocolViolation { tool_name: String },
}

/// How an invocation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentOutcome {
    /// The model answered with text only.
    Completed { answer: String, steps: u32 },

    /// The step budget ran out while the model kept requesting tools.
    StepLimitReached { steps: u32 },
}

impl AgentOutcome {
    pub fn steps(&self) -> u32 {
        match self {
            Self::Completed { steps, .. } | Self::StepLimitReached { steps } => *steps,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

impl fmt::Display for AgentOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed { answer, .. } => f.write_str(answer),
            Self::StepLimitReached { steps } => {
                write!(f, "Stopped after {steps} steps without a final response")
            }
        }
    }
}

/// Bounded step counter, `1..=max`.
#[derive(Debug, Clone, Copy)]
pub struct StepCounter {
    current: u32,
    max: u32,
}

impl StepCounter {
    pub fn new(max: u32) -> Self {
        Self { current: 0, max }
    }

    /// Move to the next step. `None` once the budget is spent.
    pub fn advance(&mut self) -> Option<u32> {
        if self.current >= self.max {
            return None;
        }
        self.current += 1;
        Some(self.current)
    }

    pub fn current(&self) -> u32 {
        self.current
    }

    pub fn max(&self) -> u32 {
        self.max
    }

    pub fn is_exhausted(&self) -> bool {
        self.current >= self.max
    }
}

/// Drives model calls and tool dispatch for one conversation at a time.
pub struct AgentLoop {
    /// The model backend
    provider: Arc<dyn Provider>,

    /// Answers tool requests; owns the working root
    tools: Arc<dyn ToolExecutor>,

    /// The model to use
    model: String,

    system_instruction: String,

    /// Model calls allowed per invocation
    max_steps: u32,

    /// Optional domain event bus
    event_bus: Option<Arc<EventBus>>,

    /// Optional progress channel, drained by the CLI
    events: Option<mpsc::Sender<AgentEvent>>,
}

impl AgentLoop {
    /// Create a new agent loop with the default instruction and step budget.
    pub fn new(
        provider: Arc<dyn Provider>,
        tools: Arc<dyn ToolExecutor>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            tools,
            model: model.into(),
            system_instruction: SYSTEM_INSTRUCTION.to_string(),
            max_steps: MAX_STEPS,
            event_bus: None,
            events: None,
        }
    }

    /// Set the maximum number of model calls per invocation.
    pub fn with_max_steps(mut self, max: u32) -> Self {
        self.max_steps = max;
        self
    }

    /// Publish `ModelResponded` / `ToolExecuted` on this bus.
    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    /// Send progress events to this channel.
    pub fn with_events(mut self, sender: mpsc::Sender<AgentEvent>) -> Self {
        self.events = Some(sender);
        self
    }

    async fn emit(&self, event: AgentEvent) {
        if let Some(tx) = &self.events {
            // A closed receiver only means nobody is watching
            let _ = tx.send(event).await;
        }
    }

    fn publish(&self, event: DomainEvent) {
        if let Some(bus) = &self.event_bus {
            bus.publish(event);
        }
    }

    /// Seed a conversation with `prompt` and run it.
    pub async fn ask(&self, prompt: impl Into<String>) -> Result<AgentOutcome, AgentError> {
        let mut conversation = Conversation::from_prompt(prompt);
        self.run(&mut conversation).await
    }

    /// Run the loop until the model answers with text or the budget runs out.
    ///
    /// Every model turn and every tool response is appended to
    /// `conversation`. Tool requests within a step are dispatched in the order
    /// the model emitted them, each appended before the next one starts.
    pub async fn run(&self, conversation: &mut Conversation) -> Result<AgentOutcome, AgentError> {
        info!(
            conversation_id = %conversation.id,
            turns = conversation.len(),
            max_steps = self.max_steps,
            "Starting agent loop"
        );

        let definitions = self.tools.definitions();
        let mut steps = StepCounter::new(self.max_steps);

        while let Some(step) = steps.advance() {
            self.emit(AgentEvent::StepStarted { step }).await;
            debug!(conversation_id = %conversation.id, step, "Agent step");

            let request = ProviderRequest {
                model: self.model.clone(),
                system_instruction: self.system_instruction.clone(),
                turns: conversation.turns().to_vec(),
                tools: definitions.clone(),
            };

            let response = self.provider.complete(request).await.map_err(|source| {
                warn!(step, provider = self.provider.name(), error = %source, "Model call failed");
                AgentError::Provider { step, source }
            })?;

            let requests: Vec<ToolRequest> = response
                .candidates
                .iter()
                .flat_map(|c| c.tool_requests().cloned())
                .collect();
            let text = response
                .candidates
                .first()
                .map(Turn::text)
                .unwrap_or_default();

            self.publish(DomainEvent::ModelResponded {
                conversation_id: conversation.id.to_string(),
                model: response.model.clone(),
                step,
                tool_requests: requests.len(),
                tokens_used: response.usage.map(|u| u.total_tokens),
                timestamp: chrono::Utc::now(),
            });

            for candidate in response.candidates {
                conversation.push(candidate);
            }

            if requests.is_empty() {
                info!(steps = step, "Agent produced a final response");
                self.emit(AgentEvent::Finished {
                    steps: step,
                    completed: true,
                })
                .await;
                return Ok(AgentOutcome::Completed {
                    answer: text,
                    steps: step,
                });
            }

            if !text.is_empty() {
                self.emit(AgentEvent::ModelText { step, text }).await;
            }

            debug!(step, tool_count = requests.len(), "Dispatching tool requests");
            for request in requests {
                self.emit(AgentEvent::ToolCall {
                    step,
                    request: request.clone(),
                })
                .await;

                let start = Instant::now();
                let envelope = self.tools.execute(&request).await;
                let duration_ms = start.elapsed().as_millis() as u64;

                let success = match envelope.outcome() {
                    Some(outcome) => !outcome.is_error(),
                    None => {
                        warn!(tool = %envelope.tool_name, "Tool response carries neither result nor error");
                        return Err(AgentError::ProtocolViolation {
                            tool_name: envelope.tool_name,
                        });
                    }
                };

                self.publish(DomainEvent::ToolExecuted {
                    tool_name: envelope.tool_name.clone(),
                    success,
                    duration_ms,
                    timestamp: chrono::Utc::now(),
                });
                self.emit(AgentEvent::ToolResponse {
                    step,
                    envelope: envelope.clone(),
                })
                .await;

                conversation.push(Turn::tool_response(envelope));
            }
        }

        warn!(
            conversation_id = %conversation.id,
            steps = steps.current(),
            "Step budget exhausted without a final response"
        );
        self.emit(AgentEvent::Finished {
            steps: steps.current(),
            completed: false,
        })
        .await;
        Ok(AgentOutcome::StepLimitReached {
            steps: steps.current(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;
    use sandpilot_core::message::{Part, Role};
    use sandpilot_core::tool::ToolResponse;

    fn agent(provider: Arc<dyn Provider>, tools: Arc<dyn ToolExecutor>) -> AgentLoop {
        AgentLoop::new(provider, tools, "mock-model")
    }

    #[test]
    fn step_counter_is_bounded() {
        let mut counter = StepCounter::new(3);
        assert_eq!(counter.advance(), Some(1));
        assert_eq!(counter.advance(), Some(2));
        assert_eq!(counter.advance(), Some(3));
        assert!(counter.is_exhausted());
        assert_eq!(counter.advance(), None);
        assert_eq!(counter.current(), 3);
        assert_eq!(counter.max(), 3);
    }

    #[test]
    fn outcome_display() {
        let done = AgentOutcome::Completed {
            answer: "All good".into(),
            steps: 2,
        };
        assert_eq!(done.to_string(), "All good");
        assert!(done.is_completed());

        let limit = AgentOutcome::StepLimitReached { steps: 20 };
        assert_eq!(
            limit.to_string(),
            "Stopped after 20 steps without a final response"
        );
        assert_eq!(limit.steps(), 20);
    }

    #[tokio::test]
    async fn simple_text_response() {
        let provider = Arc::new(SequentialMockProvider::single_text("Hello! How can I help?"));
        let tools = Arc::new(EchoExecutor::default());
        let agent = agent(provider.clone(), tools.clone());

        let mut conv = Conversation::from_prompt("Hello!");
        let outcome = agent.run(&mut conv).await.unwrap();

        assert_eq!(
            outcome,
            AgentOutcome::Completed {
                answer: "Hello! How can I help?".into(),
                steps: 1
            }
        );
        // User + Model
        assert_eq!(conv.len(), 2);
        assert_eq!(provider.call_count(), 1);
        assert!(tools.calls().is_empty());
    }

    #[tokio::test]
    async fn request_carries_instruction_and_tools() {
        let provider = Arc::new(SequentialMockProvider::single_text("ok"));
        let agent = agent(provider.clone(), Arc::new(EchoExecutor::default()));
        agent.ask("what files are in the root?").await.unwrap();

        let requests = provider.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].model, "mock-model");
        assert_eq!(requests[0].system_instruction, SYSTEM_INSTRUCTION);
        assert_eq!(requests[0].tools.len(), 1);
        assert_eq!(requests[0].turns.len(), 1);
        assert_eq!(requests[0].turns[0].text(), "what files are in the root?");
    }

    #[tokio::test]
    async fn tool_call_then_answer() {
        let provider = Arc::new(SequentialMockProvider::tool_then_answer(
            vec![ToolRequest::new(
                "get_files_info",
                serde_json::json!({"directory": "."}),
            )],
            "Let me look.",
            "The root contains main.py.",
        ));
        let tools = Arc::new(EchoExecutor::default());
        let agent = agent(provider.clone(), tools.clone());

        let mut conv = Conversation::from_prompt("what files are in the root?");
        let outcome = agent.run(&mut conv).await.unwrap();

        assert_eq!(
            outcome,
            AgentOutcome::Completed {
                answer: "The root contains main.py.".into(),
                steps: 2
            }
        );
        // User, Model (call), Tool, Model (answer)
        let roles: Vec<Role> = conv.turns().iter().map(|t| t.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Model, Role::Tool, Role::Model]);
        assert_eq!(tools.calls(), vec!["get_files_info".to_string()]);

        // The second model call sees the tool response
        let requests = provider.requests();
        assert_eq!(requests[1].turns.len(), 3);
    }

    #[tokio::test]
    async fn two_requests_dispatched_in_order_before_next_call() {
        let provider = Arc::new(SequentialMockProvider::tool_then_answer(
            vec![
                ToolRequest::new("get_file_content", serde_json::json!({"file_path": "a.py"})),
                ToolRequest::new("get_file_content", serde_json::json!({"file_path": "b.py"})),
            ],
            "",
            "Read both.",
        ));
        let tools = Arc::new(EchoExecutor::default());
        let agent = agent(provider.clone(), tools.clone());

        let mut conv = Conversation::from_prompt("read a.py and b.py");
        agent.run(&mut conv).await.unwrap();

        let turns = conv.turns();
        assert_eq!(turns.len(), 5);
        let paths: Vec<String> = turns[2..4]
            .iter()
            .map(|t| match &t.parts[0] {
                Part::ToolResponse(env) => env.outcome().unwrap().text().to_string(),
                other => panic!("expected tool response, got {other:?}"),
            })
            .collect();
        assert_eq!(
            paths,
            vec![
                r#"get_file_content {"file_path":"a.py"}"#.to_string(),
                r#"get_file_content {"file_path":"b.py"}"#.to_string(),
            ]
        );
        // Both responses were present before the second model call
        assert_eq!(provider.requests()[1].turns.len(), 4);
    }

    #[tokio::test]
    async fn step_limit_is_not_an_error() {
        let provider = Arc::new(AlwaysCallsTools::default());
        let tools = Arc::new(EchoExecutor::default());
        let agent = agent(provider.clone(), tools.clone());

        let outcome = agent.ask("loop forever").await.unwrap();
        assert_eq!(outcome, AgentOutcome::StepLimitReached { steps: MAX_STEPS });
        assert_eq!(provider.call_count(), MAX_STEPS as usize);
        assert_eq!(tools.calls().len(), MAX_STEPS as usize);
    }

    #[tokio::test]
    async fn custom_step_budget() {
        let provider = Arc::new(AlwaysCallsTools::default());
        let agent = agent(provider.clone(), Arc::new(EchoExecutor::default())).with_max_steps(3);

        let outcome = agent.ask("loop").await.unwrap();
        assert_eq!(outcome, AgentOutcome::StepLimitReached { steps: 3 });
        assert_eq!(provider.call_count(), 3);
    }

    #[tokio::test]
    async fn provider_failure_is_step_fatal() {
        let agent = agent(
            Arc::new(FailingProvider),
            Arc::new(EchoExecutor::default()),
        );
        let mut conv = Conversation::from_prompt("hi");
        let err = agent.run(&mut conv).await.unwrap_err();
        match err {
            AgentError::Provider { step, source } => {
                assert_eq!(step, 1);
                assert!(matches!(source, ProviderError::Network(_)));
            }
            other => panic!("expected provider error, got {other:?}"),
        }
        // Nothing appended after the failed call
        assert_eq!(conv.len(), 1);
    }

    #[tokio::test]
    async fn missing_result_and_error_is_protocol_violation() {
        let provider = Arc::new(SequentialMockProvider::tool_then_answer(
            vec![ToolRequest::new("get_files_info", serde_json::json!({}))],
            "",
            "unreachable",
        ));
        let agent = agent(provider.clone(), Arc::new(FaultyExecutor));

        let err = agent.ask("list").await.unwrap_err();
        assert!(matches!(
            err,
            AgentError::ProtocolViolation { ref tool_name } if tool_name == "get_files_info"
        ));
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn tool_error_is_fed_back() {
        let provider = Arc::new(SequentialMockProvider::tool_then_answer(
            vec![ToolRequest::new("broken", serde_json::json!({}))],
            "",
            "That tool failed, sorry.",
        ));
        let agent = agent(provider.clone(), Arc::new(EchoExecutor::default()));

        let mut conv = Conversation::from_prompt("try the broken tool");
        let outcome = agent.run(&mut conv).await.unwrap();
        assert!(outcome.is_completed());

        let second = &provider.requests()[1];
        let Part::ToolResponse(env) = &second.turns[2].parts[0] else {
            panic!("expected tool response part");
        };
        assert_eq!(env.outcome(), Some(ToolResponse::Error("Unknown function: broken")));
    }

    #[tokio::test]
    async fn empty_candidates_complete_with_empty_answer() {
        let provider = Arc::new(SequentialMockProvider::new(vec![make_empty_response()]));
        let agent = agent(provider.clone(), Arc::new(EchoExecutor::default()));

        let outcome = agent.ask("hello?").await.unwrap();
        assert_eq!(
            outcome,
            AgentOutcome::Completed {
                answer: String::new(),
                steps: 1
            }
        );
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn progress_events_in_order() {
        let provider = Arc::new(SequentialMockProvider::tool_then_answer(
            vec![ToolRequest::new("get_files_info", serde_json::json!({}))],
            "Checking.",
            "Done.",
        ));
        let (tx, mut rx) = mpsc::channel(64);
        let agent = agent(provider, Arc::new(EchoExecutor::default())).with_events(tx);

        agent.ask("list").await.unwrap();
        drop(agent);

        let mut kinds = Vec::new();
        while let Some(event) = rx.recv().await {
            kinds.push(event.event_type());
        }
        assert_eq!(
            kinds,
            vec![
                "step_started",
                "model_text",
                "tool_call",
                "tool_response",
                "step_started",
                "finished",
            ]
        );
    }

    #[tokio::test]
    async fn domain_events_published() {
        let provider = Arc::new(SequentialMockProvider::tool_then_answer(
            vec![ToolRequest::new("broken", serde_json::json!({}))],
            "",
            "Done.",
        ));
        let bus = Arc::new(EventBus::default());
        let mut rx = bus.subscribe();
        let agent = agent(provider, Arc::new(EchoExecutor::default())).with_event_bus(bus.clone());

        agent.ask("go").await.unwrap();

        let first = rx.recv().await.unwrap();
        assert!(matches!(
            *first,
            DomainEvent::ModelResponded {
                step: 1,
                tool_requests: 1,
                tokens_used: Some(15),
                ..
            }
        ));
        let second = rx.recv().await.unwrap();
        assert!(matches!(
            *second,
            DomainEvent::ToolExecuted { success: false, ref tool_name, .. } if tool_name == "broken"
        ));
        let third = rx.recv().await.unwrap();
        assert!(matches!(*third, DomainEvent::ModelResponded { step: 2, .. }));
    }
}
