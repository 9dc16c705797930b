//! Evidence Linker (C8): the `orch_repo::HandoffHook` that auto-populates
//! evidence chain stages whenever a handoff is written.

use async_trait::async_trait;
use orch_repo::{EvidenceRepository, HandoffHook};
use orch_types::{AgentType, EvidenceChain, Handoff};
use serde_json::json;
use tracing::warn;

/// Wires into `HandoffRepository::with_hook`. Every error it encounters is
/// logged and swallowed — evidence linking never fails the handoff write
/// that triggered it.
pub struct EvidenceLinker {
    evidence_repo: EvidenceRepository,
}

impl EvidenceLinker {
    pub fn new(evidence_repo: EvidenceRepository) -> Self {
        Self { evidence_repo }
    }

    async fn link_task(&self, handoff: &Handoff, task_id: &str) {
        let existed = self.evidence_repo.exists(task_id).await;
        let mut chain = match self.evidence_repo.get_or_create(task_id).await {
            Ok(chain) => chain,
            Err(err) => {
                warn!(task_id, error = %err, "evidence linker could not load chain");
                return;
            }
        };

        populate_stage(&mut chain, handoff);
        chain.recompute();

        if let Err(err) = self.evidence_repo.write(chain, !existed).await {
            warn!(task_id, error = %err, "evidence linker could not persist chain");
        }
    }
}

#[async_trait]
impl HandoffHook for EvidenceLinker {
    async fn on_handoff_written(&self, handoff: &Handoff) {
        for result in &handoff.results {
            self.link_task(handoff, &result.task_id).await;
        }
    }
}

/// Overwrites (not appends to) the stage matching `fromAgentType`, so
/// re-running the same handoff is idempotent.
fn populate_stage(chain: &mut EvidenceChain, handoff: &Handoff) {
    let stage = json!({
        "fromAgentType": agent_type_name(handoff.metadata.from_agent.agent_type),
        "handoffId": handoff.id,
        "timestamp": handoff.metadata.timestamp,
    });
    match handoff.metadata.from_agent.agent_type {
        AgentType::Analyst => chain.analysis = Some(stage),
        AgentType::Developer => chain.implementation = Some(stage),
        AgentType::Browser => chain.validation = Some(stage),
        AgentType::Orchestrator => {
            // The orchestrator itself never hands off a stage of evidence.
        }
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

#[cfg(test)]
mod tests {
    use super::*;
    use orch_store::SessionStore;
    use orch_types::{AgentRef, HandoffMetadata, Reason, TaskResult};
    use tempfile::tempdir;

    fn handoff(from: AgentType, task_id: &str) -> Handoff {
        Handoff {
            id: "h1".to_string(),
            metadata: HandoffMetadata {
                session_id: "s1".to_string(),
                plan_id: "p1".to_string(),
                from_agent: AgentRef { agent_type: from, id: None },
                to_agent: AgentRef { agent_type: AgentType::Orchestrator, id: None },
                timestamp: "2026-07-27T09:00:00Z".to_string(),
                version: "1".to_string(),
            },
            reason: Reason::TaskComplete,
            results: vec![TaskResult { task_id: task_id.to_string(), status: "done".to_string(), summary: "did it".to_string(), output: None }],
            state: json!({}),
        }
    }

    #[tokio::test]
    async fn populates_implementation_stage_for_developer_handoff() {
        let base = tempdir().unwrap();
        let store = SessionStore::create(base.path().join("s1")).await.unwrap();
        let repo = EvidenceRepository::new(store, 50);
        let linker = EvidenceLinker::new(repo);
        linker.on_handoff_written(&handoff(AgentType::Developer, "T1")).await;

        let chain = linker.evidence_repo.get("T1").await.unwrap();
        assert!(chain.implementation.is_some());
        assert!(chain.analysis.is_none());
        assert!(chain.coverage_percent > 0.0);
    }

    #[tokio::test]
    async fn restaging_the_same_agent_type_overwrites_not_duplicates() {
        let base = tempdir().unwrap();
        let store = SessionStore::create(base.path().join("s1")).await.unwrap();
        let repo = EvidenceRepository::new(store, 50);
        let linker = EvidenceLinker::new(repo);
        linker.on_handoff_written(&handoff(AgentType::Analyst, "T1")).await;
        linker.on_handoff_written(&handoff(AgentType::Analyst, "T1")).await;

        let chain = linker.evidence_repo.get("T1").await.unwrap();
        assert_eq!(chain.coverage_percent, 25.0);
    }

    #[tokio::test]
    async fn all_three_stages_drive_coverage_to_seventy_five_percent() {
        let base = tempdir().unwrap();
        let store = SessionStore::create(base.path().join("s1")).await.unwrap();
        let repo = EvidenceRepository::new(store, 50);
        let linker = EvidenceLinker::new(repo);
        linker.on_handoff_written(&handoff(AgentType::Analyst, "T1")).await;
        linker.on_handoff_written(&handoff(AgentType::Developer, "T1")).await;
        linker.on_handoff_written(&handoff(AgentType::Browser, "T1")).await;

        let chain = linker.evidence_repo.get("T1").await.unwrap();
        assert_eq!(chain.coverage_percent, 75.0);
        assert!(chain.valid);
    }
}
