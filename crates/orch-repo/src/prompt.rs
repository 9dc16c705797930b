use orch_schema::Validate;
use orch_store::SessionStore;
use orch_types::{OrchError, Prompt, Result};

use crate::no_pointer_error;

const HISTORY_KIND: &str = "prompt";

/// CRUD for the originating user intent, one of the artifact documents a session accumulates.
pub struct PromptRepository {
    store: SessionStore,
    max_history_items: usize,
}

impl PromptRepository {
    pub fn new(store: SessionStore, max_history_items: usize) -> Self {
        Self { store, max_history_items }
    }

    pub async fn write(&self, prompt: Prompt) -> Result<Prompt> {
        let errors = prompt.validate();
        if !errors.is_empty() {
            return Err(OrchError::Validation(errors));
        }
        let canonical = format!("prompts/prompt-{}.json", prompt.id);
        self.store.write_json(&canonical, &prompt).await?;
        self.store.write_json("prompts/current-prompt.json", &prompt).await?;
        self.store
            .append_history(HISTORY_KIND, &prompt.id, self.max_history_items)
            .await?;
        Ok(prompt)
    }

    pub async fn read(&self, id: Option<&str>) -> Result<Prompt> {
        match id {
            Some(id) => self.store.read_json(&format!("prompts/prompt-{id}.json")).await,
            None => match self.store.read_json("prompts/current-prompt.json").await {
                Ok(prompt) => Ok(prompt),
                Err(OrchError::NotFound { .. }) => {
                    let ids = self.list_ids().await?;
                    Err(no_pointer_error("prompt", &ids))
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
                "prompts",
                |n| n.starts_with("prompt-") && n.ends_with(".json"),
                |n| n.to_string(),
            )
            .await?;
        Ok(names
            .into_iter()
            .filter_map(|n| crate::strip_prefix_suffix(&n, "prompt-", ".json").map(str::to_string))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn prompt(id: &str) -> Prompt {
        Prompt {
            id: id.to_string(),
            session_id: "s1".to_string(),
            description: "do the thing".to_string(),
            request: None,
        }
    }

    #[tokio::test]
    async fn write_then_read_none_returns_the_pointer_mirror() {
        let base = tempdir().unwrap();
        let store = SessionStore::create(base.path().join("s1")).await.unwrap();
        let repo = PromptRepository::new(store, 50);
        repo.write(prompt("11111111-1111-1111-1111-111111111111")).await.unwrap();
        let read = repo.read(None).await.unwrap();
        assert_eq!(read.id, "11111111-1111-1111-1111-111111111111");
    }

    #[tokio::test]
    async fn read_with_no_pointer_enumerates_available_ids() {
        let base = tempdir().unwrap();
        let store = SessionStore::create(base.path().join("s1")).await.unwrap();
        let repo = PromptRepository::new(store.clone(), 50);
        store
            .write_json("prompts/prompt-aaa.json", &prompt("aaa"))
            .await
            .unwrap();
        let err = repo.read(None).await.unwrap_err();
        match err {
            OrchError::NotFound { id, .. } => assert!(id.contains("aaa")),
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn write_rejects_empty_description() {
        let base = tempdir().unwrap();
        let store = SessionStore::create(base.path().join("s1")).await.unwrap();
        let repo = PromptRepository::new(store, 50);
        let mut p = prompt("11111111-1111-1111-1111-111111111111");
        p.description = "   ".to_string();
        let err = repo.write(p).await.unwrap_err();
        assert!(matches!(err, OrchError::Validation(_)));
    }
}
