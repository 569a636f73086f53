//! Wires config, sandbox, tools, provider and agent for one invocation.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use sandpilot_agent::{AgentError, AgentLoop, AgentOutcome};
use sandpilot_config::{AppConfig, ConfigError};
use sandpilot_core::error::ProviderError;
use sandpilot_core::event::{DomainEvent, EventBus};
use sandpilot_providers::GeminiProvider;
use sandpilot_security::{SandboxError, WorkingRoot};
use sandpilot_tools::{ToolDispatcher, ToolLimits};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::output;

/// Command-line overrides applied on top of the loaded config.
#[derive(Debug, Default)]
pub struct Overrides {
    pub working_dir: Option<PathBuf>,
    pub max_steps: Option<u32>,
    pub model: Option<String>,
}

/// Startup and step-fatal failures. Each ends the process with exit code 1.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("GEMINI_API_KEY is not set in your environment.")]
    MissingApiKey,

    #[error("Failed to load config: {0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    WorkingRoot(#[from] SandboxError),

    #[error("{0}")]
    Provider(#[from] ProviderError),

    #[error("{0}")]
    Agent(#[from] AgentError),
}

/// Load config, then layer `.env`, the process environment and command-line
/// overrides on top. `.env` values win over the process environment.
pub fn load_config(overrides: Overrides) -> Result<AppConfig, SessionError> {
    let dotenv = dotenv_vars();
    let config = AppConfig::load(|key| {
        dotenv
            .get(key)
            .cloned()
            .or_else(|| std::env::var(key).ok())
    })?;
    prepare(config, overrides)
}

/// Apply command-line overrides and check the config is usable.
pub fn prepare(mut config: AppConfig, overrides: Overrides) -> Result<AppConfig, SessionError> {
    apply_overrides(&mut config, overrides);
    config.validate()?;
    if !config.has_api_key() {
        return Err(SessionError::MissingApiKey);
    }
    Ok(config)
}

/// Pairs from the nearest `.env` file, searching upward from the current
/// directory. The process environment is left untouched.
fn dotenv_vars() -> HashMap<String, String> {
    match dotenvy::dotenv_iter() {
        Ok(iter) => iter
            .filter_map(|item| {
                item.map_err(|e| warn!(error = %e, "Skipping malformed .env line"))
                    .ok()
            })
            .collect(),
        Err(e) if e.not_found() => HashMap::new(),
        Err(e) => {
            warn!(error = %e, "Ignoring unreadable .env file");
            HashMap::new()
        }
    }
}

fn apply_overrides(config: &mut AppConfig, overrides: Overrides) {
    if let Some(dir) = overrides.working_dir {
        config.working_dir = dir;
    }
    if let Some(steps) = overrides.max_steps {
        config.agent.max_steps = steps;
    }
    if let Some(model) = overrides.model {
        config.model = model;
    }
}

pub fn tool_limits(config: &AppConfig) -> ToolLimits {
    ToolLimits {
        max_read_chars: config.tools.max_read_chars,
        exec_timeout: Duration::from_secs(config.tools.exec_timeout_secs),
        python_interpreter: config.tools.python_interpreter.clone(),
    }
}

/// Run one prompt to completion, printing progress as it happens.
pub async fn run(
    config: &AppConfig,
    prompt: String,
    verbose: bool,
) -> Result<AgentOutcome, SessionError> {
    let root = WorkingRoot::new(&config.working_dir)?;
    info!(root = %root.path().display(), model = %config.model, "Working root established");

    let dispatcher = Arc::new(ToolDispatcher::new(root, tool_limits(config)));
    let provider = Arc::new(GeminiProvider::from_config(config)?);

    let (tx, rx) = mpsc::channel(64);
    let printer = tokio::spawn(output::drain(rx, verbose));

    let bus = Arc::new(EventBus::default());
    let logger = spawn_event_logger(bus.subscribe());

    let agent = AgentLoop::new(provider, dispatcher, &config.model)
        .with_max_steps(config.agent.max_steps)
        .with_event_bus(bus.clone())
        .with_events(tx);

    let result = agent.ask(prompt).await;

    // Dropping every sender lets both consumers finish
    drop(agent);
    drop(bus);
    let _ = printer.await;
    let _ = logger.await;

    Ok(result?)
}

/// Log domain events through tracing until the bus closes.
fn spawn_event_logger(mut rx: broadcast::Receiver<Arc<DomainEvent>>) -> JoinHandle<u64> {
    tokio::spawn(async move {
        let mut logged = 0;
        loop {
            match rx.recv().await {
                Ok(event) => {
                    log_event(&event);
                    logged += 1;
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "Event logger fell behind");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        logged
    })
}

fn log_event(event: &DomainEvent) {
    match event {
        DomainEvent::ModelResponded {
            conversation_id,
            model,
            step,
            tool_requests,
            tokens_used,
            ..
        } => debug!(
            conversation = %conversation_id,
            model = %model,
            step,
            tool_requests,
            tokens = ?tokens_used,
            "Model responded"
        ),
        DomainEvent::ToolExecuted {
            tool_name,
            success,
            duration_ms,
            ..
        } => debug!(tool = %tool_name, success, duration_ms, "Tool executed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_win_over_config() {
        let mut config = AppConfig::default();
        apply_overrides(
            &mut config,
            Overrides {
                working_dir: Some(PathBuf::from("/tmp/project")),
                max_steps: Some(5),
                model: Some("gemini-2.5-pro".into()),
            },
        );
        assert_eq!(config.working_dir, PathBuf::from("/tmp/project"));
        assert_eq!(config.agent.max_steps, 5);
        assert_eq!(config.model, "gemini-2.5-pro");
    }

    #[test]
    fn empty_overrides_keep_defaults() {
        let mut config = AppConfig::default();
        apply_overrides(&mut config, Overrides::default());
        assert_eq!(config.working_dir, PathBuf::from("./calculator"));
        assert_eq!(config.agent.max_steps, 20);
    }

    #[test]
    fn limits_follow_config() {
        let mut config = AppConfig::default();
        config.tools.exec_timeout_secs = 7;
        config.tools.python_interpreter = "python3.12".into();
        let limits = tool_limits(&config);
        assert_eq!(limits.exec_timeout, Duration::from_secs(7));
        assert_eq!(limits.max_read_chars, 10_000);
        assert_eq!(limits.python_interpreter, "python3.12");
    }

    #[test]
    fn prepare_rejects_missing_key() {
        let err = prepare(AppConfig::default(), Overrides::default()).unwrap_err();
        assert!(matches!(err, SessionError::MissingApiKey));
    }

    #[test]
    fn prepare_rejects_blank_key_from_env() {
        let mut config = AppConfig::default();
        config.apply_env(|key| (key == "GEMINI_API_KEY").then(|| "   ".to_string()));
        let err = prepare(config, Overrides::default()).unwrap_err();
        assert!(matches!(err, SessionError::MissingApiKey));
    }

    #[test]
    fn prepare_accepts_key_from_env_and_applies_overrides() {
        let mut config = AppConfig::default();
        config.apply_env(|key| (key == "GEMINI_API_KEY").then(|| "secret".to_string()));
        let config = prepare(
            config,
            Overrides {
                max_steps: Some(3),
                ..Overrides::default()
            },
        )
        .unwrap();
        assert!(config.has_api_key());
        assert_eq!(config.agent.max_steps, 3);
    }

    #[test]
    fn prepare_validates_overrides() {
        let config = AppConfig {
            api_key: Some("k".into()),
            ..AppConfig::default()
        };
        let err = prepare(
            config,
            Overrides {
                max_steps: Some(0),
                ..Overrides::default()
            },
        )
        .unwrap_err();
        assert!(matches!(err, SessionError::Config(_)));
    }

    #[tokio::test]
    async fn event_logger_drains_until_bus_closes() {
        let bus = EventBus::new(8);
        let logger = spawn_event_logger(bus.subscribe());
        bus.publish(DomainEvent::ToolExecuted {
            tool_name: "get_files_info".into(),
            success: true,
            duration_ms: 3,
            timestamp: chrono::Utc::now(),
        });
        bus.publish(DomainEvent::ModelResponded {
            conversation_id: "c1".into(),
            model: "gemini-2.0-flash-001".into(),
            step: 1,
            tool_requests: 1,
            tokens_used: Some(42),
            timestamp: chrono::Utc::now(),
        });
        drop(bus);

        assert_eq!(logger.await.unwrap(), 2);
    }

    #[test]
    fn missing_key_message() {
        assert_eq!(
            SessionError::MissingApiKey.to_string(),
            "GEMINI_API_KEY is not set in your environment."
        );
    }

    #[tokio::test]
    async fn missing_root_fails_before_any_call() {
        let config = AppConfig {
            api_key: Some("k".into()),
            working_dir: PathBuf::from("/definitely/not/a/real/dir"),
            ..AppConfig::default()
        };
        let err = run(&config, "hi".into(), false).await.unwrap_err();
        assert!(matches!(err, SessionError::WorkingRoot(_)));
    }
}
