//! SandPilot CLI: the main entry point.
//!
//! Takes a single prompt, runs the agent against the working directory, and
//! prints the final response.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

mod output;
mod session;

#[derive(Parser)]
#[command(
    name = "sandpilot",
    about = "SandPilot: a sandboxed coding agent",
    version
)]
struct Cli {
    /// The request for the agent (words are joined with spaces)
    prompt: Vec<String>,

    /// Print every step, tool argument and tool response
    #[arg(short, long)]
    verbose: bool,

    /// Directory the tools are confined to
    #[arg(long, value_name = "DIR")]
    working_dir: Option<PathBuf>,

    /// Maximum model calls for this prompt
    #[arg(long, value_name = "N")]
    max_steps: Option<u32>,

    /// Override the model name
    #[arg(long)]
    model: Option<String>,
}

const USAGE: &str = "Usage: sandpilot \"your prompt here\" [--verbose]";

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let prompt = cli.prompt.join(" ");
    if prompt.trim().is_empty() {
        eprintln!("{USAGE}");
        return ExitCode::FAILURE;
    }

    // Initialize tracing on stderr; stdout is for agent output
    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let config = match session::load_config(session::Overrides {
        working_dir: cli.working_dir,
        max_steps: cli.max_steps,
        model: cli.model,
    }) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Fatal: {e}");
            return ExitCode::FAILURE;
        }
    };

    if cli.verbose {
        println!("User prompt: {prompt}");
    }

    match session::run(&config, prompt, cli.verbose).await {
        Ok(outcome) => {
            println!("{}", output::render_outcome(&outcome));
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Fatal: {e}");
            ExitCode::FAILURE
        }
    }
}
