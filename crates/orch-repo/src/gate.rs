use orch_schema::{sanitize_timestamp, Validate};
use orch_store::SessionStore;
use orch_types::{GateResult, OrchError, Result};

const HISTORY_KIND: &str = "gate_result";

/// CRUD for recorded gate outcomes. Canonical files are timestamped per
/// check; `gate-<phaseId>-latest.json` always mirrors the newest result for
/// a phase, so a caller that just wants the current status never has to
/// scan the whole history.
pub struct GateRepository {
    store: SessionStore,
    max_history_items: usize,
}

impl GateRepository {
    pub fn new(store: SessionStore, max_history_items: usize) -> Self {
        Self { store, max_history_items }
    }

    pub async fn write(&self, result: GateResult) -> Result<GateResult> {
        let errors = result.validate();
        if !errors.is_empty() {
            return Err(OrchError::Validation(errors));
        }
        let ts = sanitize_timestamp(&result.checked_at);
        let canonical = format!("gates/gate-{}-{ts}.json", result.phase_id);
        self.store.write_json(&canonical, &result).await?;
        self.store
            .write_json(&format!("gates/gate-{}-latest.json", result.phase_id), &result)
            .await?;
        self.store
            .append_history(HISTORY_KIND, &result.phase_id, self.max_history_items)
            .await?;
        Ok(result)
    }

    pub async fn read_latest(&self, phase_id: &str) -> Result<GateResult> {
        self.store
            .read_json(&format!("gates/gate-{phase_id}-latest.json"))
            .await
            .map_err(|e| match e {
                OrchError::NotFound { .. } => OrchError::not_found("gate_result", phase_id),
                other => other,
            })
    }

    /// All gate results recorded, most recent first. When `phase_id` is
    /// given, restricted to that phase's history entries (the `-latest`
    /// mirror is excluded since it duplicates the newest timestamped file).
    pub async fn list(&self, phase_id: Option<&str>) -> Result<Vec<GateResult>> {
        let prefix = match phase_id {
            Some(id) => format!("gate-{id}-"),
            None => "gate-".to_string(),
        };
        let names = self
            .store
            .list_dir(
                "gates",
                move |n| n.starts_with(&prefix) && n.ends_with(".json") && !n.ends_with("-latest.json"),
                |n| n.to_string(),
            )
            .await?;
        let mut results = Vec::new();
        for name in names {
            if let Ok(result) = self.store.read_json::<GateResult>(&format!("gates/{name}")).await {
                results.push(result);
            }
        }
        results.sort_by(|a, b| b.checked_at.cmp(&a.checked_at));
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn gate_result(phase_id: &str, checked_at: &str, passed: bool) -> GateResult {
        GateResult {
            phase_id: phase_id.to_string(),
            passed,
            checked_at: checked_at.to_string(),
            results: vec![],
            blockers: vec![],
            duration_ms: None,
        }
    }

    #[tokio::test]
    async fn write_then_read_latest() {
        let base = tempdir().unwrap();
        let store = SessionStore::create(base.path().join("s1")).await.unwrap();
        let repo = GateRepository::new(store, 50);
        repo.write(gate_result("p1", "2026-07-27T09:00:00Z", false)).await.unwrap();
        repo.write(gate_result("p1", "2026-07-27T10:00:00Z", true)).await.unwrap();
        let latest = repo.read_latest("p1").await.unwrap();
        assert!(latest.passed);
    }

    #[tokio::test]
    async fn list_scoped_to_phase_excludes_the_latest_mirror() {
        let base = tempdir().unwrap();
        let store = SessionStore::create(base.path().join("s1")).await.unwrap();
        let repo = GateRepository::new(store, 50);
        repo.write(gate_result("p1", "2026-07-27T09:00:00Z", false)).await.unwrap();
        repo.write(gate_result("p2", "2026-07-27T09:30:00Z", true)).await.unwrap();
        let list = repo.list(Some("p1")).await.unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].phase_id, "p1");
    }
}
