//! Human-approved coding agent loop.
//!
//! Asks a local chat model for one action at a time, gates every write and
//! command on a console `y/N` answer, and stops when the success text shows up
//! in command output, the model says `done`, or the step budget runs out.

use std::path::PathBuf;

use agent_loop::exit_codes;
use agent_loop::io::actions::ActionExecutor;
use agent_loop::io::approval::ConsoleApprover;
use agent_loop::io::config::{ConfigOverrides, apply_overrides, load_config};
use agent_loop::io::model::OllamaClient;
use agent_loop::io::prompt::PromptEngine;
use agent_loop::io::session_log::{DEFAULT_LOG_DIR, SessionLog};
use agent_loop::io::shell::ShellRunner;
use agent_loop::logging;
use agent_loop::looping::{LoopOutcome, LoopRequest, LoopStop, run_loop};
use agent_loop::step::StepEvent;
use anyhow::{Context, Result};
use clap::Parser;

#[derive(Parser)]
#[command(
    name = "agent-loop",
    version,
    about = "Propose, approve, execute, observe: a human-gated coding agent loop"
)]
struct Cli {
    /// What the agent should accomplish.
    #[arg(long)]
    goal: String,

    /// Stop successfully once this text appears in a command's output.
    #[arg(long, value_parser = non_empty)]
    success: String,

    /// Chat model identifier.
    #[arg(long, env = "OLLAMA_MODEL")]
    model: Option<String>,

    /// Step budget.
    #[arg(long)]
    max_steps: Option<u32>,

    /// Chat backend base address.
    #[arg(long, env = "OLLAMA_BASE_URL")]
    base_url: Option<String>,

    /// Config file (defaults to `.agent/config.toml`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory that receives one session log directory per run.
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Kill a command after this many seconds.
    #[arg(long)]
    command_timeout_secs: Option<u64>,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            base_url: self.base_url.clone(),
            model: self.model.clone(),
            max_steps: self.max_steps,
            command_timeout_secs: self.command_timeout_secs,
            log_dir: self.log_dir.clone(),
        }
    }

    fn config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_DIR).join("config.toml"))
    }
}

fn non_empty(value: &str) -> Result<String, String> {
    if value.is_empty() {
        Err("must not be empty".to_string())
    } else {
        Ok(value.to_string())
    }
}

fn main() {
    logging::init();
    match run(Cli::parse()) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::ERROR);
        }
    }
}

fn run(cli: Cli) -> Result<i32> {
    let cfg = apply_overrides(load_config(&cli.config_path())?, &cli.overrides())?;

    let model = OllamaClient::new(cfg.model_config())?;
    let workdir = std::env::current_dir().context("resolve working directory")?;
    let executor = ActionExecutor::new(
        ConsoleApprover,
        ShellRunner::default(),
        workdir,
        cfg.command_limits(),
    );
    let log = SessionLog::create(&cfg.log_dir, cfg.max_steps)?;
    let system_instruction = PromptEngine::new()?.system_instruction()?;

    let request = LoopRequest {
        goal: cli.goal,
        success: cli.success,
        max_steps: cfg.max_steps,
        system_instruction,
    };
    let max_steps = request.max_steps;
    let outcome = run_loop(&request, &model, &executor, &log, |event| {
        print_event(event, max_steps);
    })?;
    print_summary(&outcome);
    println!("Session log: {}", log.dir().display());
    Ok(outcome.exit_code())
}

/// Progress for the gatekeeper. The step line comes before any approval prompt.
fn print_event(event: StepEvent<'_>, max_steps: u32) {
    match event {
        StepEvent::Proposed { step, proposal } => {
            println!(
                "\nStep {step}/{max_steps}: action={} :: {}",
                proposal.action, proposal.rationale
            );
        }
        StepEvent::Finished(outcome) => {
            if let Some(err) = &outcome.parse_error {
                println!("Could not parse JSON plan from model output: {err}");
            }
            if let Some(output) = &outcome.last_output {
                println!("{output}");
            }
        }
    }
}

fn print_summary(outcome: &LoopOutcome) {
    let message = match outcome.stop {
        LoopStop::SuccessMatched => "Success criteria met.",
        LoopStop::Done => "Model indicated done.",
        LoopStop::MaxStepsReached => "Max steps reached without meeting success criteria.",
    };
    println!("{message}");
}
