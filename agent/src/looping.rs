//! Multi-step loop controller.

use anyhow::Result;
use tracing::{info, instrument};

use crate::core::conversation::Conversation;
use crate::exit_codes;
use crate::io::actions::ActionExecutor;
use crate::io::approval::Approver;
use crate::io::model::ModelClient;
use crate::io::session_log::SessionLog;
use crate::io::shell::CommandRunner;
use crate::step::{StepEvent, run_step};

/// Inputs for one run of the loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopRequest {
    pub goal: String,
    /// Substring that marks success when it appears in the last command output.
    pub success: String,
    pub max_steps: u32,
    pub system_instruction: String,
}

/// Mutable state for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopState {
    /// Step about to run (1-indexed).
    pub step: u32,
    /// Output of the most recent `run` action; empty until one runs.
    pub last_output: String,
    pub max_steps: u32,
}

impl LoopState {
    pub fn new(max_steps: u32) -> Self {
        Self {
            step: 1,
            last_output: String::new(),
            max_steps,
        }
    }

    /// An empty success string never matches.
    pub fn success_reached(&self, success: &str) -> bool {
        !success.is_empty() && self.last_output.contains(success)
    }
}

/// Reason why `run_loop` stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopStop {
    /// The last command output contains the success substring.
    SuccessMatched,
    /// The model proposed `done`.
    Done,
    /// The step budget ran out.
    MaxStepsReached,
}

/// Summary of a loop invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopOutcome {
    /// Number of model calls made.
    pub steps_executed: u32,
    pub stop: LoopStop,
    pub last_output: String,
    pub conversation: Conversation,
}

impl LoopOutcome {
    pub fn exit_code(&self) -> i32 {
        match self.stop {
            LoopStop::SuccessMatched | LoopStop::Done => exit_codes::OK,
            LoopStop::MaxStepsReached => exit_codes::MAX_STEPS,
        }
    }
}

/// Run steps until success, `done`, or the step budget is spent.
///
/// Success is checked at the start of each step, before the model call, so
/// output produced by the final step is never checked and the run ends with
/// [`LoopStop::MaxStepsReached`]. Backend failures and a broken environment
/// stop the loop with an error; everything else becomes feedback for the model.
#[instrument(skip_all, fields(max_steps = request.max_steps))]
pub fn run_loop<M, A, R, F>(
    request: &LoopRequest,
    model: &M,
    executor: &ActionExecutor<A, R>,
    log: &SessionLog,
    mut on_step: F,
) -> Result<LoopOutcome>
where
    M: ModelClient,
    A: Approver,
    R: CommandRunner,
    F: FnMut(StepEvent<'_>),
{
    let mut conversation = Conversation::new(&request.system_instruction, &request.goal);
    let mut state = LoopState::new(request.max_steps);
    let mut steps_executed = 0u32;

    let stop = loop {
        if state.step > state.max_steps {
            break LoopStop::MaxStepsReached;
        }
        if state.success_reached(&request.success) {
            break LoopStop::SuccessMatched;
        }

        let outcome = run_step(
            state.step,
            &mut conversation,
            model,
            executor,
            log,
            &mut on_step,
        )?;
        steps_executed += 1;
        if let Some(output) = &outcome.last_output {
            state.last_output.clone_from(output);
        }
        on_step(StepEvent::Finished(&outcome));
        if outcome.terminal {
            break LoopStop::Done;
        }
        state.step += 1;
    };

    info!(steps_executed, stop = ?stop, "loop finished");
    Ok(LoopOutcome {
        steps_executed,
        stop,
        last_output: state.last_output,
        conversation,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::actions::CommandLimits;
    use crate::io::shell::CommandCapture;
    use crate::test_support::{ScriptedApprover, ScriptedModel, ScriptedRunner};

    fn request(max_steps: u32) -> LoopRequest {
        LoopRequest {
            goal: "make tests pass".to_string(),
            success: "ALL GREEN".to_string(),
            max_steps,
            system_instruction: "sys".to_string(),
        }
    }

    fn run(
        max_steps: u32,
        replies: &[&str],
        approvals: Vec<bool>,
        captures: Vec<CommandCapture>,
    ) -> (LoopOutcome, ScriptedModel, Vec<u32>) {
        let temp = tempfile::tempdir().expect("tempdir");
        let log = SessionLog::open(temp.path().join("log"), max_steps).expect("log");
        let exec = ActionExecutor::new(
            ScriptedApprover::new(approvals),
            ScriptedRunner::new(captures),
            temp.path(),
            CommandLimits::default(),
        );
        let model = ScriptedModel::new(replies.iter().copied());
        let mut seen = Vec::new();
        let outcome = run_loop(&request(max_steps), &model, &exec, &log, |event| {
            if let StepEvent::Finished(step) = event {
                seen.push(step.step);
            }
        })
        .expect("loop");
        (outcome, model, seen)
    }

    #[test]
    fn success_is_detected_before_the_next_model_call() {
        let (outcome, model, seen) = run(
            5,
            &[r#"{"action":"run","command":"make test"}"#],
            vec![true],
            vec![CommandCapture::completed("ALL GREEN\n", 0)],
        );
        assert_eq!(outcome.stop, LoopStop::SuccessMatched);
        assert_eq!(outcome.exit_code(), exit_codes::OK);
        assert_eq!(model.call_count(), 1);
        assert_eq!(seen, vec![1]);
    }

    #[test]
    fn success_produced_by_final_step_still_exhausts_budget() {
        let (outcome, model, _) = run(
            1,
            &[r#"{"action":"run","command":"make test"}"#],
            vec![true],
            vec![CommandCapture::completed("ALL GREEN", 0)],
        );
        assert_eq!(outcome.stop, LoopStop::MaxStepsReached);
        assert_eq!(outcome.exit_code(), exit_codes::MAX_STEPS);
        assert_eq!(outcome.last_output, "ALL GREEN");
        assert_eq!(model.call_count(), 1);
    }

    #[test]
    fn success_before_final_step_is_honored() {
        let (outcome, model, _) = run(
            2,
            &[r#"{"action":"run","command":"make test"}"#],
            vec![true],
            vec![CommandCapture::completed("ALL GREEN", 0)],
        );
        assert_eq!(outcome.stop, LoopStop::SuccessMatched);
        assert_eq!(outcome.exit_code(), exit_codes::OK);
        assert_eq!(model.call_count(), 1);
    }

    #[test]
    fn done_stops_immediately() {
        let (outcome, model, _) = run(5, &[r#"{"action":"done"}"#], vec![], vec![]);
        assert_eq!(outcome.stop, LoopStop::Done);
        assert_eq!(outcome.exit_code(), exit_codes::OK);
        assert_eq!(outcome.steps_executed, 1);
        assert_eq!(model.call_count(), 1);
    }

    #[test]
    fn budget_exhaustion_makes_exactly_max_steps_calls() {
        let replies = ["not json"; 3];
        let (outcome, model, seen) = run(3, &replies, vec![], vec![]);
        assert_eq!(outcome.stop, LoopStop::MaxStepsReached);
        assert_eq!(outcome.exit_code(), exit_codes::MAX_STEPS);
        assert_eq!(model.call_count(), 3);
        assert_eq!(seen, vec![1, 2, 3]);
    }

    #[test]
    fn last_output_only_changes_when_a_command_runs() {
        let (outcome, _, _) = run(
            3,
            &[
                r#"{"action":"run","command":"make"}"#,
                r#"{"action":"read","path":"missing.txt"}"#,
                r#"{"action":"run","command":"rm -rf /"}"#,
            ],
            vec![true, false],
            vec![CommandCapture::completed("built\n", 0)],
        );
        assert_eq!(outcome.stop, LoopStop::MaxStepsReached);
        assert_eq!(outcome.last_output, "built\n");
    }

    #[test]
    fn empty_success_never_matches() {
        let state = LoopState::new(3);
        assert!(!state.success_reached(""));
        let state = LoopState {
            last_output: "anything".to_string(),
            ..LoopState::new(3)
        };
        assert!(!state.success_reached(""));
        assert!(state.success_reached("thing"));
    }

    #[test]
    fn conversation_starts_with_system_then_goal() {
        let (outcome, model, _) = run(2, &["???", r#"{"action":"done"}"#], vec![], vec![]);
        let messages = outcome.conversation.messages();
        assert_eq!(messages[0].content, "sys");
        assert_eq!(messages[1].content, "make tests pass");
        assert_eq!(model.calls()[0].len(), 2);
        assert_eq!(model.calls()[1].len(), 3);
    }

    #[test]
    fn proposal_event_precedes_approval_and_finish() {
        let temp = tempfile::tempdir().expect("tempdir");
        let log = SessionLog::open(temp.path().join("log"), 1).expect("log");
        let exec = ActionExecutor::new(
            ScriptedApprover::new(vec![false]),
            ScriptedRunner::new(vec![]),
            temp.path(),
            CommandLimits::default(),
        );
        let model = ScriptedModel::new([
            r#"{"action":"run","command":"make","rationale":"build first"}"#,
        ]);

        let mut events = Vec::new();
        run_loop(&request(1), &model, &exec, &log, |event| match event {
            StepEvent::Proposed { step, proposal } => events.push(format!(
                "proposed {step} {} approvals={}",
                proposal.rationale,
                exec.approver().descriptions().len()
            )),
            StepEvent::Finished(outcome) => events.push(format!(
                "finished {} approvals={}",
                outcome.step,
                exec.approver().descriptions().len()
            )),
        })
        .expect("loop");

        assert_eq!(
            events,
            vec![
                "proposed 1 build first approvals=0".to_string(),
                "finished 1 approvals=1".to_string(),
            ]
        );
    }
}
