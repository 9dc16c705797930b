use orch_schema::Validate;
use orch_store::SessionStore;
use orch_types::{EvidenceChain, OrchError, Result};
use tracing::warn;

const HISTORY_KIND_CREATED: &str = "evidence_created";
const HISTORY_KIND_UPDATED: &str = "evidence_updated";

/// CRUD for evidence chains, one of the artifact documents a session accumulates. One file per chain id, no
/// pointer mirror.
pub struct EvidenceRepository {
    store: SessionStore,
    max_history_items: usize,
}

impl EvidenceRepository {
    pub fn new(store: SessionStore, max_history_items: usize) -> Self {
        Self { store, max_history_items }
    }

    fn path(chain_id: &str) -> String {
        format!("evidence/{chain_id}.json")
    }

    pub async fn get(&self, chain_id: &str) -> Result<EvidenceChain> {
        self.store
            .read_json(&Self::path(chain_id))
            .await
            .map_err(|e| match e {
                OrchError::NotFound { .. } => OrchError::not_found("evidence_chain", chain_id),
                other => other,
            })
    }

    pub async fn get_or_create(&self, chain_id: &str) -> Result<EvidenceChain> {
        match self.get(chain_id).await {
            Ok(chain) => Ok(chain),
            Err(OrchError::NotFound { .. }) => Ok(EvidenceChain::new(chain_id)),
            Err(other) => Err(other),
        }
    }

    pub async fn write(&self, chain: EvidenceChain, created: bool) -> Result<EvidenceChain> {
        let errors = chain.validate();
        if !errors.is_empty() {
            return Err(OrchError::Validation(errors));
        }
        self.store.write_json(&Self::path(&chain.chain_id), &chain).await?;
        let kind = if created { HISTORY_KIND_CREATED } else { HISTORY_KIND_UPDATED };
        self.store
            .append_history(kind, &chain.chain_id, self.max_history_items)
            .await?;
        Ok(chain)
    }

    pub async fn exists(&self, chain_id: &str) -> bool {
        self.store.exists(&Self::path(chain_id)).await
    }

    pub async fn list(&self) -> Result<Vec<String>> {
        let names = self
            .store
            .list_dir("evidence", |n| n.ends_with(".json"), |n| n.to_string())
            .await?;
        Ok(names
            .into_iter()
            .filter_map(|n| n.strip_suffix(".json").map(str::to_string))
            .collect())
    }

    /// All evidence chains currently on disk, skipping malformed files with
    /// a warning rather than failing — the `evidence_coverage` check needs
    /// exactly this tolerance.
    pub async fn list_all(&self) -> Result<Vec<EvidenceChain>> {
        let names = self
            .store
            .list_dir("evidence", |n| n.ends_with(".json"), |n| n.to_string())
            .await?;
        let mut chains = Vec::new();
        for name in names {
            match self.store.read_json(&format!("evidence/{name}")).await {
                Ok(chain) => chains.push(chain),
                Err(err) => warn!(file = %name, error = %err, "skipping malformed evidence chain"),
            }
        }
        Ok(chains)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn get_or_create_returns_a_fresh_chain_when_missing() {
        let base = tempdir().unwrap();
        let store = SessionStore::create(base.path().join("s1")).await.unwrap();
        let repo = EvidenceRepository::new(store, 50);
        let chain = repo.get_or_create("T1").await.unwrap();
        assert_eq!(chain.chain_id, "T1");
        assert_eq!(chain.coverage_percent, 0.0);
    }

    #[tokio::test]
    async fn list_all_skips_malformed_files() {
        let base = tempdir().unwrap();
        let store = SessionStore::create(base.path().join("s1")).await.unwrap();
        tokio::fs::write(store.root().join("evidence/bad.json"), b"{not json").await.unwrap();
        let repo = EvidenceRepository::new(store, 50);
        let mut chain = EvidenceChain::new("T1");
        chain.recompute();
        repo.write(chain, true).await.unwrap();
        let all = repo.list_all().await.unwrap();
        assert_eq!(all.len(), 1);
    }
}
