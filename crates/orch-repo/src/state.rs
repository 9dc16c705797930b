use orch_schema::{sanitize_timestamp, Validate};
use orch_store::SessionStore;
use orch_types::{OrchError, OrchestratorState, Result};

const HISTORY_KIND: &str = "state";
const CANONICAL: &str = "state/orchestrator.json";

/// CRUD for the single orchestrator state document. Every successful write
/// archives the prior value first.
pub struct StateRepository {
    store: SessionStore,
    max_history_items: usize,
}

impl StateRepository {
    pub fn new(store: SessionStore, max_history_items: usize) -> Self {
        Self { store, max_history_items }
    }

    pub async fn write(&self, state: OrchestratorState) -> Result<OrchestratorState> {
        let errors = state.validate();
        if !errors.is_empty() {
            return Err(OrchError::Validation(errors));
        }
        let ts = sanitize_timestamp(&orch_schema::now());
        self.store.archive(CANONICAL, &ts).await?;
        self.store.write_json(CANONICAL, &state).await?;
        self.store
            .append_history(HISTORY_KIND, &state_id(&state), self.max_history_items)
            .await?;
        Ok(state)
    }

    pub async fn read(&self) -> Result<OrchestratorState> {
        self.store.read_json(CANONICAL).await
    }
}

fn state_id(state: &OrchestratorState) -> String {
    state
        .current_phase
        .as_ref()
        .map(|p| p.id.clone())
        .unwrap_or_else(|| "no-phase".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use orch_types::OrchestratorStatus;
    use tempfile::tempdir;

    fn state(status: OrchestratorStatus) -> OrchestratorState {
        OrchestratorState {
            status,
            current_phase: None,
            agents: vec![],
            token_usage: None,
        }
    }

    #[tokio::test]
    async fn second_write_archives_the_first() {
        let base = tempdir().unwrap();
        let store = SessionStore::create(base.path().join("s1")).await.unwrap();
        let repo = StateRepository::new(store.clone(), 50);
        repo.write(state(OrchestratorStatus::Idle)).await.unwrap();
        repo.write(state(OrchestratorStatus::Running)).await.unwrap();

        let current: OrchestratorState = repo.read().await.unwrap();
        assert_eq!(current.status, OrchestratorStatus::Running);

        let names = store
            .list_dir("state", |n| n.starts_with("orchestrator-"), |n| n.to_string())
            .await
            .unwrap();
        assert_eq!(names.len(), 1);
    }
}
