//! Dispatcher (C7): turns a `ParallelGroup` into a `DispatchInstruction`,
//! substituting `{result:<taskId>}` placeholders with prior handoff context
//! and shell-escaping the resulting agent-runner invocation.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use orch_types::{AgentType, AggregatedResults, DispatchInstruction, Handoff, ParallelGroup, Spawn, Subtask};
use regex::Regex;

pub const DEFAULT_RUNNER_COMMAND: &str = "orch-agent-runner";

static RESULT_REF_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{result:([A-Za-z0-9_\-]+)\}").expect("valid result-ref regex"));

/// One task's outcome as observed by the caller, fed into `aggregate_results`.
#[derive(Debug, Clone)]
pub struct TaskOutcome {
    pub task_id: String,
    pub completed: bool,
    pub handoff: Option<Handoff>,
    pub tokens_used: u64,
    pub error: Option<String>,
}

/// `aggregateResults(results[])`: folds individual task outcomes into
/// the running context the dispatcher substitutes into later prompts.
pub fn aggregate_results(outcomes: &[TaskOutcome]) -> AggregatedResults {
    let mut completed_tasks = Vec::new();
    let mut handoffs = HashMap::new();
    let mut total_tokens_used = 0;
    let mut errors = Vec::new();

    for outcome in outcomes {
        if outcome.completed {
            completed_tasks.push(outcome.task_id.clone());
        }
        if let Some(handoff) = &outcome.handoff {
            handoffs.insert(outcome.task_id.clone(), handoff.clone());
        }
        total_tokens_used += outcome.tokens_used;
        if let Some(error) = &outcome.error {
            errors.push(format!("{}: {error}", outcome.task_id));
        }
    }

    AggregatedResults { completed_tasks, handoffs, total_tokens_used, errors }
}

/// Builds the `DispatchInstruction` for one scheduled group. Advisory only:
/// never refuses to emit instructions, only flags a token-budget overrun in
/// `summary`.
pub fn build_dispatch(
    group: &ParallelGroup,
    aggregated: &AggregatedResults,
    runner_command: &str,
    used_tokens: u64,
    token_budget: Option<u64>,
) -> DispatchInstruction {
    let spawns: Vec<Spawn> = group.tasks.iter().map(|task| build_spawn(task, aggregated, runner_command)).collect();
    let estimated_tokens: u64 = group.tasks.iter().filter_map(|t| t.estimated_tokens).sum();

    let mut summary = format!("{}: dispatching {} task(s)", group.group_id, spawns.len());
    if let Some(budget) = token_budget {
        if !within_budget(used_tokens, estimated_tokens, budget) {
            summary.push_str(&format!(
                " (token budget overrun: {used_tokens} used + {estimated_tokens} estimated > {budget} budget)"
            ));
        }
    }

    DispatchInstruction {
        group_id: group.group_id.clone(),
        agent_count: spawns.len(),
        wait_for_all: group.wait_for_all,
        spawns,
        estimated_tokens,
        summary,
    }
}

/// `true` iff `used_tokens + estimated_tokens` stays within `budget`. Never
/// used to block a dispatch, only to annotate it.
pub fn within_budget(used_tokens: u64, estimated_tokens: u64, budget: u64) -> bool {
    used_tokens.saturating_add(estimated_tokens) <= budget
}

fn build_spawn(task: &Subtask, aggregated: &AggregatedResults, runner_command: &str) -> Spawn {
    let prompt = substitute_result_refs(&task.prompt, aggregated);
    let command = format!(
        "{runner} --agent-type {agent_type} --task-id {task_id} --prompt {prompt}",
        runner = runner_command,
        agent_type = shell_escape(agent_type_name(task.agent_type)),
        task_id = shell_escape(&task.id),
        prompt = shell_escape(&prompt),
    );
    Spawn { task_id: task.id.clone(), agent_type: task.agent_type, command, run_in_background: false }
}

/// Replaces every `{result:<taskId>}` occurrence. A completed dependency
/// with a handoff gets the full structured block; a completed dependency
/// without one gets a neutral marker; an incomplete dependency gets a
/// warning placeholder. The placeholder is always substituted, never
/// dropped, so a stale reference stays visible to whoever reads the prompt.
fn substitute_result_refs(prompt: &str, aggregated: &AggregatedResults) -> String {
    RESULT_REF_RE
        .replace_all(prompt, |caps: &regex::Captures| {
            let task_id = &caps[1];
            if let Some(handoff) = aggregated.handoffs.get(task_id) {
                render_result_block(task_id, handoff)
            } else if aggregated.completed_tasks.iter().any(|t| t == task_id) {
                format!("<result taskId=\"{task_id}\">completed, no handoff</result>")
            } else {
                format!("<!-- warning: task `{task_id}` has not yet completed; result unavailable -->")
            }
        })
        .into_owned()
}

fn render_result_block(task_id: &str, handoff: &Handoff) -> String {
    let summaries: Vec<String> = handoff.results.iter().map(|r| format!("  - {}: {}", r.task_id, r.summary)).collect();
    let outputs: Vec<String> = handoff
        .results
        .iter()
        .filter_map(|r| r.output.as_ref().map(|o| format!("  - {}: {o}", r.task_id)))
        .collect();
    let critical_context = handoff.state.get("criticalContext").and_then(|v| v.as_str()).unwrap_or("none recorded");
    let resume_instructions =
        handoff.state.get("resumeInstructions").and_then(|v| v.as_str()).unwrap_or("none recorded");
    let files_modified: Vec<String> = handoff
        .state
        .get("filesModified")
        .and_then(|v| v.as_array())
        .map(|arr| arr.iter().filter_map(|f| f.as_str().map(|s| format!("  - {s}"))).collect())
        .unwrap_or_default();

    format!(
        "<result taskId=\"{task_id}\">\n\
         summaries:\n{}\n\
         outputs:\n{}\n\
         criticalContext: {critical_context}\n\
         resumeInstructions: {resume_instructions}\n\
         filesModified:\n{}\n\
         </result>",
        join_or_none(&summaries),
        join_or_none(&outputs),
        join_or_none(&files_modified),
    )
}

fn join_or_none(lines: &[String]) -> String {
    if lines.is_empty() {
        "  (none)".to_string()
    } else {
        lines.join("\n")
    }
}

fn agent_type_name(agent_type: AgentType) -> &'static str {
    match agent_type {
        AgentType::Analyst => "analyst",
        AgentType::Developer => "developer",
        AgentType::Browser => "browser",
        AgentType::Orchestrator => "orchestrator",
    }
}

/// Wraps `s` in single quotes, escaping any embedded `'` as `'\''`, so the
/// result is safe to splice into a `sh -c` command line verbatim.
pub fn shell_escape(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use orch_types::{AgentRef, HandoffMetadata, Reason, TaskResult};
    use serde_json::json;

    fn subtask(id: &str, prompt: &str) -> Subtask {
        Subtask { id: id.to_string(), agent_type: AgentType::Developer, prompt: prompt.to_string(), dependencies: vec![], estimated_tokens: Some(100) }
    }

    fn sample_handoff(task_id: &str) -> Handoff {
        Handoff {
            id: "h1".to_string(),
            metadata: HandoffMetadata {
                session_id: "s1".to_string(),
                plan_id: "p1".to_string(),
                from_agent: AgentRef { agent_type: AgentType::Developer, id: None },
                to_agent: AgentRef { agent_type: AgentType::Analyst, id: None },
                timestamp: "2026-01-01T00:00:00Z".to_string(),
                version: "1".to_string(),
            },
            reason: Reason::TaskComplete,
            results: vec![TaskResult { task_id: task_id.to_string(), status: "done".to_string(), summary: "wired up the thing".to_string(), output: None }],
            state: json!({ "criticalContext": "watch the retry loop", "filesModified": ["src/lib.rs"] }),
        }
    }

    #[test]
    fn shell_escape_wraps_and_escapes_single_quotes() {
        assert_eq!(shell_escape("hello"), "'hello'");
        assert_eq!(shell_escape("it's here"), "'it'\\''s here'");
    }

    #[test]
    fn substitutes_completed_task_with_full_handoff_block() {
        let aggregated = aggregate_results(&[TaskOutcome {
            task_id: "a".to_string(),
            completed: true,
            handoff: Some(sample_handoff("a")),
            tokens_used: 50,
            error: None,
        }]);
        let rendered = substitute_result_refs("continue from {result:a}", &aggregated);
        assert!(rendered.contains("wired up the thing"));
        assert!(rendered.contains("watch the retry loop"));
        assert!(rendered.contains("src/lib.rs"));
    }

    #[test]
    fn substitutes_completed_without_handoff_as_neutral_marker() {
        let aggregated = aggregate_results(&[TaskOutcome { task_id: "a".to_string(), completed: true, handoff: None, tokens_used: 0, error: None }]);
        let rendered = substitute_result_refs("{result:a}", &aggregated);
        assert_eq!(rendered, "<result taskId=\"a\">completed, no handoff</result>");
    }

    #[test]
    fn substitutes_incomplete_task_as_warning_placeholder_never_dropped() {
        let aggregated = AggregatedResults::default();
        let rendered = substitute_result_refs("{result:a}", &aggregated);
        assert!(rendered.contains("has not yet completed"));
    }

    #[test]
    fn build_dispatch_flags_token_budget_overrun_but_still_emits() {
        let group = ParallelGroup { group_id: "p1-L0-G0".to_string(), tasks: vec![subtask("a", "go")], wait_for_all: false };
        let aggregated = AggregatedResults::default();
        let instruction = build_dispatch(&group, &aggregated, DEFAULT_RUNNER_COMMAND, 950, Some(1000));
        assert_eq!(instruction.spawns.len(), 1);
        assert!(instruction.summary.contains("overrun"));
    }

    #[test]
    fn build_dispatch_command_contains_escaped_prompt() {
        let group = ParallelGroup { group_id: "p1-L0-G0".to_string(), tasks: vec![subtask("a", "it's time")], wait_for_all: true };
        let aggregated = AggregatedResults::default();
        let instruction = build_dispatch(&group, &aggregated, DEFAULT_RUNNER_COMMAND, 0, None);
        assert!(instruction.spawns[0].command.contains("'it'\\''s time'"));
        assert!(instruction.wait_for_all);
    }
}
