//! Schema Registry (C1): artifact validation primitives and id/timestamp helpers.
//!
//! `orch-types` defines the shapes; this crate defines what makes an instance of
//! a shape *valid* beyond what serde already enforces (required fields, enum
//! membership via Rust's type system) — numeric ranges, RFC3339/UUID shape, and
//! cross-field invariants like "a subtask may only depend on an earlier subtask
//! in the same plan".

use chrono::{DateTime, Utc};
use orch_types::{
    EvidenceChain, GateResult, Handoff, LinkedMemory, OrchestratorState, Plan, Prompt,
    ValidationError,
};

/// Implemented by every artifact kind the registry knows how to validate.
pub trait Validate {
    fn validate(&self) -> Vec<ValidationError>;
}

impl Validate for Prompt {
    fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        require_uuid(&self.id, "id", &mut errors);
        require_non_empty(&self.session_id, "sessionId", &mut errors);
        require_non_empty(&self.description, "description", &mut errors);
        errors
    }
}

impl Validate for Plan {
    fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        require_uuid(&self.id, "id", &mut errors);
        require_non_empty(&self.session_id, "sessionId", &mut errors);
        for (phase_idx, phase) in self.phases.iter().enumerate() {
            let phase_path = format!("phases[{phase_idx}]");
            require_non_empty(&phase.id, &format!("{phase_path}.id"), &mut errors);
            require_non_empty(&phase.name, &format!("{phase_path}.name"), &mut errors);

            let mut seen_ids = std::collections::HashSet::new();
            for (task_idx, task) in phase.subtasks.iter().enumerate() {
                let task_path = format!("{phase_path}.subtasks[{task_idx}]");
                require_non_empty(&task.id, &format!("{task_path}.id"), &mut errors);
                if !seen_ids.insert(task.id.as_str()) {
                    errors.push(ValidationError::new(
                        format!("{task_path}.id"),
                        format!("duplicate subtask id `{}` in phase `{}`", task.id, phase.id),
                    ));
                }
                for dep in &task.dependencies {
                    if dep == &task.id {
                        errors.push(ValidationError::new(
                            format!("{task_path}.dependencies"),
                            format!("subtask `{}` cannot depend on itself", task.id),
                        ));
                    } else if !seen_ids.contains(dep.as_str()) {
                        errors.push(ValidationError::new(
                            format!("{task_path}.dependencies"),
                            format!(
                                "subtask `{}` depends on `{}`, which is not a prior subtask in phase `{}`",
                                task.id, dep, phase.id
                            ),
                        ));
                    }
                }
            }
        }
        errors
    }
}

impl Validate for Handoff {
    fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        require_uuid(&self.id, "id", &mut errors);
        require_non_empty(&self.metadata.session_id, "metadata.sessionId", &mut errors);
        require_non_empty(&self.metadata.plan_id, "metadata.planId", &mut errors);
        require_rfc3339(&self.metadata.timestamp, "metadata.timestamp", &mut errors);
        require_non_empty(&self.metadata.version, "metadata.version", &mut errors);
        if self.results.is_empty() {
            errors.push(ValidationError::new(
                "results",
                "handoff must report at least one task result",
            ));
        }
        for (idx, result) in self.results.iter().enumerate() {
            require_non_empty(
                &result.task_id,
                &format!("results[{idx}].taskId"),
                &mut errors,
            );
        }
        errors
    }
}

impl Validate for OrchestratorState {
    fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        if let Some(phase) = &self.current_phase {
            require_range(
                phase.progress,
                0.0,
                100.0,
                "currentPhase.progress",
                &mut errors,
            );
        }
        for (idx, agent) in self.agents.iter().enumerate() {
            require_non_empty(&agent.id, &format!("agents[{idx}].id"), &mut errors);
            require_rfc3339(
                &agent.start_time,
                &format!("agents[{idx}].startTime"),
                &mut errors,
            );
        }
        if let Some(usage) = &self.token_usage {
            require_range(
                usage.percentage,
                0.0,
                100.0,
                "tokenUsage.percentage",
                &mut errors,
            );
        }
        errors
    }
}

impl Validate for LinkedMemory {
    fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        require_non_empty(&self.memory_name, "memoryName", &mut errors);
        require_non_empty(&self.source_path, "sourcePath", &mut errors);
        require_rfc3339(&self.linked_at, "linkedAt", &mut errors);
        errors
    }
}

impl Validate for EvidenceChain {
    fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        require_non_empty(&self.chain_id, "chainId", &mut errors);
        require_range(
            self.coverage_percent,
            0.0,
            100.0,
            "coveragePercent",
            &mut errors,
        );
        errors
    }
}

impl Validate for GateResult {
    fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        require_non_empty(&self.phase_id, "phaseId", &mut errors);
        require_rfc3339(&self.checked_at, "checkedAt", &mut errors);
        errors
    }
}

fn require_non_empty(value: &str, field_path: &str, errors: &mut Vec<ValidationError>) {
    if value.trim().is_empty() {
        errors.push(ValidationError::new(field_path, "must not be empty"));
    }
}

fn require_uuid(value: &str, field_path: &str, errors: &mut Vec<ValidationError>) {
    if uuid::Uuid::parse_str(value).is_err() {
        errors.push(ValidationError::new(
            field_path,
            format!("`{value}` is not a valid UUID"),
        ));
    }
}

fn require_rfc3339(value: &str, field_path: &str, errors: &mut Vec<ValidationError>) {
    if DateTime::parse_from_rfc3339(value).is_err() {
        errors.push(ValidationError::new(
            field_path,
            format!("`{value}` is not a valid RFC3339 timestamp"),
        ));
    }
}

fn require_range(value: f64, lo: f64, hi: f64, field_path: &str, errors: &mut Vec<ValidationError>) {
    if !(lo..=hi).contains(&value) {
        errors.push(ValidationError::new(
            field_path,
            format!("{value} is outside the allowed range [{lo}, {hi}]"),
        ));
    }
}

/// Mints a new session id in the sortable `YYYYMMDD_HH-MM_<uuid>` form.
pub fn new_session_id() -> String {
    let now = Utc::now();
    format!(
        "{}_{}_{}",
        now.format("%Y%m%d"),
        now.format("%H-%M"),
        uuid::Uuid::new_v4()
    )
}

/// Mints a fresh v4 UUID as a string, as most artifact ids expect.
pub fn new_uuid() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// The current instant as an RFC3339 string, matching the timestamp shape
/// every artifact is validated against.
pub fn now() -> String {
    Utc::now().to_rfc3339()
}

/// Replaces `:` and `.` with `-`, matching the on-disk filename convention for
/// handoffs and archived orchestrator state ("Timestamp sanitization").
pub fn sanitize_timestamp(ts: &str) -> String {
    ts.replace([':', '.'], "-")
}

#[cfg(test)]
mod tests {
    use super::*;
    use orch_types::{AgentType, Phase, Plan, Subtask};

    #[test]
    fn session_id_sorts_lexicographically_across_a_minute_boundary() {
        let earlier = "20260727_08-59_00000000-0000-0000-0000-000000000000".to_string();
        let later = "20260727_09-00_00000000-0000-0000-0000-000000000000".to_string();
        assert!(earlier < later);
    }

    #[test]
    fn new_session_id_matches_the_yyyymmdd_hh_mm_uuid_shape() {
        let id = new_session_id();
        let parts: Vec<&str> = id.splitn(3, '_').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].len(), 8);
        assert_eq!(parts[1].len(), 5);
        assert!(uuid::Uuid::parse_str(parts[2]).is_ok());
    }

    #[test]
    fn plan_rejects_self_dependency_and_forward_reference() {
        let plan = Plan {
            id: new_uuid(),
            session_id: "s1".into(),
            phases: vec![Phase {
                id: "phase-1".into(),
                name: "Phase 1".into(),
                gate_condition: None,
                parallelizable: true,
                subtasks: vec![
                    Subtask {
                        id: "a".into(),
                        agent_type: AgentType::Developer,
                        prompt: "do a".into(),
                        dependencies: vec!["a".into()],
                        estimated_tokens: None,
                    },
                    Subtask {
                        id: "b".into(),
                        agent_type: AgentType::Developer,
                        prompt: "do b".into(),
                        dependencies: vec!["c".into()],
                        estimated_tokens: None,
                    },
                ],
            }],
        };
        let errors = plan.validate();
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn sanitize_timestamp_replaces_colons_and_dots() {
        assert_eq!(
            sanitize_timestamp("2026-07-27T09:00:00.123Z"),
            "2026-07-27T09-00-00-123Z"
        );
    }
}
