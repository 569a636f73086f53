//! Terminal rendering of agent progress.
//!
//! Stdout carries agent output only; tracing goes to stderr.

use sandpilot_agent::{AgentEvent, AgentOutcome};
use tokio::sync::mpsc;

/// Render one progress event, or `None` if it is silent at this verbosity.
pub fn render(event: &AgentEvent, verbose: bool) -> Option<String> {
    match event {
        AgentEvent::StepStarted { step } => verbose.then(|| format!("=== Step {step} ===")),
        AgentEvent::ModelText { text, .. } => verbose.then(|| text.clone()),
        AgentEvent::ToolCall { request, .. } => Some(if verbose {
            format!("Calling function: {}({})", request.name, request.arguments)
        } else {
            format!(" - Calling function: {}", request.name)
        }),
        AgentEvent::ToolResponse { envelope, .. } => {
            verbose.then(|| format!("-> {}", envelope.raw_payload()))
        }
        AgentEvent::Finished { .. } => None,
    }
}

/// The final block printed once the loop stops.
pub fn render_outcome(outcome: &AgentOutcome) -> String {
    match outcome {
        AgentOutcome::Completed { answer, .. } => format!("Final response:\n{answer}"),
        limit @ AgentOutcome::StepLimitReached { .. } => limit.to_string(),
    }
}

/// Print events until the sender side is dropped.
pub async fn drain(mut events: mpsc::Receiver<AgentEvent>, verbose: bool) {
    while let Some(event) = events.recv().await {
        if let Some(line) = render(&event, verbose) {
            println!("{line}");
        }
    }
}
