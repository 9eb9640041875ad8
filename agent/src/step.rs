//! Orchestration for a single propose/approve/execute/observe step.

use anyhow::{Context, Result};
use tracing::{info, instrument, warn};

use crate::core::action::{ActionKind, ActionProposal, parse_action};
use crate::core::conversation::Conversation;
use crate::core::feedback;
use crate::io::actions::{ActionExecutor, ActionOutcome};
use crate::io::approval::Approver;
use crate::io::model::ModelClient;
use crate::io::session_log::SessionLog;
use crate::io::shell::CommandRunner;

/// Result of a single step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutcome {
    /// Step number (1-indexed).
    pub step: u32,
    /// Parsed action kind; `None` when the reply did not parse.
    pub action: Option<ActionKind>,
    pub rationale: String,
    /// Parser error text for unparseable replies.
    pub parse_error: Option<String>,
    /// Message appended to the conversation, if any.
    pub feedback: Option<String>,
    /// The model declared the goal complete.
    pub terminal: bool,
    /// Output of the command this step ran, if any.
    pub last_output: Option<String>,
}

/// Progress reported while the loop runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepEvent<'a> {
    /// The reply parsed; fired before any approval is requested.
    Proposed {
        step: u32,
        proposal: &'a ActionProposal,
    },
    /// The step is complete.
    Finished(&'a StepOutcome),
}

/// Execute one step against the conversation.
///
/// Requests a proposal, records the raw reply, parses it, executes it and
/// appends whatever feedback results. `on_event` sees the parsed proposal
/// before the executor asks for approval. A backend failure is returned as an
/// error wrapping [`crate::io::model::ModelError`]; everything the model
/// can fix itself becomes feedback instead.
#[instrument(skip_all, fields(step = step))]
pub fn run_step<M, A, R, F>(
    step: u32,
    conversation: &mut Conversation,
    model: &M,
    executor: &ActionExecutor<A, R>,
    log: &SessionLog,
    on_event: &mut F,
) -> Result<StepOutcome>
where
    M: ModelClient,
    A: Approver,
    R: CommandRunner,
    F: FnMut(StepEvent<'_>),
{
    let reply = model
        .complete(conversation.messages())
        .with_context(|| format!("model request failed at step {step}"))?;
    log.record_assistant(step, &reply)?;

    let proposal = match parse_action(&reply) {
        Ok(proposal) => proposal,
        Err(err) => {
            warn!(err = %err, "unparseable model reply");
            conversation.push_user(feedback::INVALID_JSON);
            return Ok(StepOutcome {
                step,
                action: None,
                rationale: String::new(),
                parse_error: Some(err.to_string()),
                feedback: Some(feedback::INVALID_JSON.to_string()),
                terminal: false,
                last_output: None,
            });
        }
    };
    info!(action = %proposal.action, rationale = %proposal.rationale, "proposal");
    on_event(StepEvent::Proposed {
        step,
        proposal: &proposal,
    });

    let outcome = executor
        .execute(&proposal)
        .with_context(|| format!("execute {} at step {step}", proposal.action))?;

    let feedback = outcome.feedback().map(str::to_owned);
    if let Some(message) = &feedback {
        conversation.push_user(message.as_str());
    }

    let mut last_output = None;
    if let ActionOutcome::Ran {
        command, output, ..
    } = &outcome
    {
        log.record_command(step, command)?;
        log.record_output(step, output)?;
        last_output = Some(output.clone());
    }

    Ok(StepOutcome {
        step,
        terminal: outcome.is_terminal(),
        action: Some(proposal.action),
        rationale: proposal.rationale,
        parse_error: None,
        feedback,
        last_output,
    })
}
