use orch_schema::Validate;
use orch_store::SessionStore;
use orch_types::{LinkedMemory, OrchError, Result};

const HISTORY_KIND: &str = "memory";

/// CRUD for linked memories, one of the artifact documents a session accumulates. Keyed by `memoryName`,
/// one file per memory, no pointer mirror (there is no single "current"
/// memory).
pub struct MemoryRepository {
    store: SessionStore,
    max_history_items: usize,
}

impl MemoryRepository {
    pub fn new(store: SessionStore, max_history_items: usize) -> Self {
        Self { store, max_history_items }
    }

    pub async fn write(&self, memory: LinkedMemory) -> Result<LinkedMemory> {
        let errors = memory.validate();
        if !errors.is_empty() {
            return Err(OrchError::Validation(errors));
        }
        let path = format!("memories/{}.json", memory.memory_name);
        self.store.write_json(&path, &memory).await?;
        self.store
            .append_history(HISTORY_KIND, &memory.memory_name, self.max_history_items)
            .await?;
        Ok(memory)
    }

    pub async fn get(&self, name: &str) -> Result<LinkedMemory> {
        self.store
            .read_json(&format!("memories/{name}.json"))
            .await
            .map_err(|e| match e {
                OrchError::NotFound { .. } => OrchError::not_found("memory", name),
                other => other,
            })
    }

    pub async fn list(&self) -> Result<Vec<String>> {
        let names = self
            .store
            .list_dir("memories", |n| n.ends_with(".json"), |n| n.to_string())
            .await?;
        Ok(names
            .into_iter()
            .filter_map(|n| n.strip_suffix(".json").map(str::to_string))
            .collect())
    }

    /// All memories currently linked, for checks that scan `traceabilityData`
    /// or filenames (the `memory`/`traceability` gate providers).
    pub async fn list_all(&self) -> Result<Vec<LinkedMemory>> {
        let mut memories = Vec::new();
        for name in self.list().await? {
            if let Ok(memory) = self.get(&name).await {
                memories.push(memory);
            }
        }
        Ok(memories)
    }
}
