use orch_schema::Validate;
use orch_store::SessionStore;
use orch_types::{OrchError, Plan, Result};

use crate::no_pointer_error;

const HISTORY_KIND: &str = "plan";

/// CRUD for the ordered phase/subtask plan, one of the artifact documents a session accumulates.
pub struct PlanRepository {
    store: SessionStore,
    max_history_items: usize,
}

impl PlanRepository {
    pub fn new(store: SessionStore, max_history_items: usize) -> Self {
        Self { store, max_history_items }
    }

    pub async fn write(&self, plan: Plan) -> Result<Plan> {
        let errors = plan.validate();
        if !errors.is_empty() {
            return Err(OrchError::Validation(errors));
        }
        let canonical = format!("plans/plan-{}.json", plan.id);
        self.store.write_json(&canonical, &plan).await?;
        self.store.write_json("plans/current-plan.json", &plan).await?;
        self.store
            .append_history(HISTORY_KIND, &plan.id, self.max_history_items)
            .await?;
        Ok(plan)
    }

    pub async fn read(&self, id: Option<&str>) -> Result<Plan> {
        match id {
            Some(id) => self.store.read_json(&format!("plans/plan-{id}.json")).await,
            None => match self.store.read_json("plans/current-plan.json").await {
                Ok(plan) => Ok(plan),
                Err(OrchError::NotFound { .. }) => {
                    let ids = self.list_ids().await?;
                    Err(no_pointer_error("plan", &ids))
                }
                Err(other) => Err(other),
            },
        }
    }

    pub async fn list(&self) -> Result<Vec<String>> {
        self.list_ids().await
    }

    async fn list_ids(&self) -> Result<Vec<String>> {
        let names = self
            .store
            .list_dir(
                "plans",
                |n| n.starts_with("plan-") && n.ends_with(".json"),
                |n| n.to_string(),
            )
            .await?;
        Ok(names
            .into_iter()
            .filter_map(|n| crate::strip_prefix_suffix(&n, "plan-", ".json").map(str::to_string))
            .collect())
    }
}
