use std::sync::Arc;

use async_trait::async_trait;
use orch_schema::{sanitize_timestamp, Validate};
use orch_store::SessionStore;
use orch_types::{AgentType, Handoff, OrchError, Result};
use serde::Serialize;
use tracing::warn;

use crate::no_pointer_error;

const HISTORY_KIND: &str = "handoff";

/// The Evidence Linker's hook into a successful handoff write.
/// `orch-evidence` implements this over its own repository; `orch-core`'s
/// Facade is the only place that wires the two together — this repository
/// never depends on `orch-evidence` itself, avoiding a cycle.
#[async_trait]
pub trait HandoffHook: Send + Sync {
    async fn on_handoff_written(&self, handoff: &Handoff);
}

/// Display-ready handoff listing entry: just enough to render a list
/// without reading every full handoff document.
#[derive(Debug, Clone, Serialize)]
pub struct HandoffSummary {
    pub id: String,
    pub from_agent_type: AgentType,
    pub timestamp: String,
}

/// CRUD for agent handoffs, one of the artifact documents a session accumulates, with the evidence auto-link
/// post-write hook.
pub struct HandoffRepository {
    store: SessionStore,
    max_history_items: usize,
    hook: Option<Arc<dyn HandoffHook>>,
}

impl HandoffRepository {
    pub fn new(store: SessionStore, max_history_items: usize) -> Self {
        Self { store, max_history_items, hook: None }
    }

    /// Installs the post-write hook. Called once by the Facade at
    /// construction time.
    pub fn with_hook(mut self, hook: Arc<dyn HandoffHook>) -> Self {
        self.hook = Some(hook);
        self
    }

    fn filename(handoff: &Handoff) -> String {
        let from = match handoff.metadata.from_agent.agent_type {
            AgentType::Analyst => "analyst",
            AgentType::Developer => "developer",
            AgentType::Browser => "browser",
            AgentType::Orchestrator => "orchestrator",
        };
        let ts = sanitize_timestamp(&handoff.metadata.timestamp);
        format!("handoffs/handoff-{from}-{ts}.json")
    }

    pub async fn write(&self, handoff: Handoff) -> Result<Handoff> {
        let errors = handoff.validate();
        if !errors.is_empty() {
            return Err(OrchError::Validation(errors));
        }
        let canonical = Self::filename(&handoff);
        self.store.write_json(&canonical, &handoff).await?;
        self.store.write_json("handoffs/latest-handoff.json", &handoff).await?;
        self.store
            .append_history(HISTORY_KIND, &handoff.id, self.max_history_items)
            .await?;

        // Evidence linking is advisory: its failures are logged and never
        // fail the handoff write, so the hook itself must never return an
        // error here — it has already swallowed its own.
        if let Some(hook) = &self.hook {
            hook.on_handoff_written(&handoff).await;
        } else {
            warn!("handoff written with no evidence-linker hook installed");
        }

        Ok(handoff)
    }

    pub async fn read(&self, id: Option<&str>) -> Result<Handoff> {
        match id {
            Some(id) => self.read_by_id(id).await,
            None => match self.store.read_json("handoffs/latest-handoff.json").await {
                Ok(handoff) => Ok(handoff),
                Err(OrchError::NotFound { .. }) => {
                    let ids = self.list_raw().await?;
                    Err(no_pointer_error(
                        "handoff",
                        &ids.into_iter().map(|s| s.id).collect::<Vec<_>>(),
                    ))
                }
                Err(other) => Err(other),
            },
        }
    }

    async fn read_by_id(&self, id: &str) -> Result<Handoff> {
        for summary in self.list_raw().await? {
            if summary.id == id {
                let names = self
                    .store
                    .list_dir("handoffs", |n| n.starts_with("handoff-") && n.ends_with(".json"), |n| n.to_string())
                    .await?;
                for name in names {
                    let candidate: Handoff = self.store.read_json(&format!("handoffs/{name}")).await?;
                    if candidate.id == id {
                        return Ok(candidate);
                    }
                }
            }
        }
        Err(OrchError::not_found("handoff", id))
    }

    /// Sorted timestamp-descending, newest handoff first.
    pub async fn list(&self) -> Result<Vec<HandoffSummary>> {
        self.list_raw().await
    }

    async fn list_raw(&self) -> Result<Vec<HandoffSummary>> {
        let names = self
            .store
            .list_dir(
                "handoffs",
                |n| n.starts_with("handoff-") && n.ends_with(".json"),
                |n| n.to_string(),
            )
            .await?;
        let mut summaries = Vec::new();
        for name in names {
            let handoff: Handoff = match self.store.read_json(&format!("handoffs/{name}")).await {
                Ok(h) => h,
                Err(_) => continue,
            };
            summaries.push(HandoffSummary {
                id: handoff.id,
                from_agent_type: handoff.metadata.from_agent.agent_type,
                timestamp: handoff.metadata.timestamp,
            });
        }
        summaries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(summaries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orch_types::{AgentRef, HandoffMetadata, Reason, TaskResult};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    struct CountingHook(Arc<AtomicUsize>);

    #[async_trait]
    impl HandoffHook for CountingHook {
        async fn on_handoff_written(&self, _handoff: &Handoff) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn handoff(id: &str, from: AgentType, ts: &str) -> Handoff {
        Handoff {
            id: id.to_string(),
            metadata: HandoffMetadata {
                session_id: "s1".into(),
                plan_id: "p1".into(),
                from_agent: AgentRef { agent_type: from, id: None },
                to_agent: AgentRef { agent_type: AgentType::Orchestrator, id: None },
                timestamp: ts.to_string(),
                version: "1".into(),
            },
            reason: Reason::TaskComplete,
            results: vec![TaskResult {
                task_id: "T".into(),
                status: "done".into(),
                summary: "did it".into(),
                output: None,
            }],
            state: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn write_invokes_the_evidence_hook() {
        let base = tempdir().unwrap();
        let store = SessionStore::create(base.path().join("s1")).await.unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let repo = HandoffRepository::new(store, 50)
            .with_hook(Arc::new(CountingHook(calls.clone())));
        repo.write(handoff("11111111-1111-1111-1111-111111111111", AgentType::Developer, "2026-07-27T09:00:00Z"))
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn list_is_sorted_timestamp_descending() {
        let base = tempdir().unwrap();
        let store = SessionStore::create(base.path().join("s1")).await.unwrap();
        let repo = HandoffRepository::new(store, 50);
        let id1 = "11111111-1111-1111-1111-111111111111";
        let id2 = "22222222-2222-2222-2222-222222222222";
        repo.write(handoff(id1, AgentType::Analyst, "2026-07-27T09:00:00Z")).await.unwrap();
        repo.write(handoff(id2, AgentType::Developer, "2026-07-27T10:00:00Z")).await.unwrap();
        let list = repo.list().await.unwrap();
        assert_eq!(list[0].id, id2);
        assert_eq!(list[1].id, id1);
    }

    #[tokio::test]
    async fn read_none_returns_latest_pointer() {
        let base = tempdir().unwrap();
        let store = SessionStore::create(base.path().join("s1")).await.unwrap();
        let repo = HandoffRepository::new(store, 50);
        let id1 = "11111111-1111-1111-1111-111111111111";
        let id2 = "22222222-2222-2222-2222-222222222222";
        repo.write(handoff(id1, AgentType::Analyst, "2026-07-27T09:00:00Z")).await.unwrap();
        repo.write(handoff(id2, AgentType::Developer, "2026-07-27T10:00:00Z")).await.unwrap();
        assert_eq!(repo.read(None).await.unwrap().id, id2);
    }
}
