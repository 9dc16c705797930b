//! Session Lifecycle (C9): minting, listing, recency, and aged purge over a
//! directory of `SessionStore` roots.

use std::path::PathBuf;
use std::time::SystemTime;

use orch_store::SessionStore;
use orch_types::{OrchError, Result};
use tokio::fs;
use tracing::info;

/// Owns the `sessions/` directory; each entry under it is one
/// `SessionStore` root.
#[derive(Debug, Clone)]
pub struct SessionManager {
    sessions_root: PathBuf,
}

impl SessionManager {
    pub fn new(sessions_root: impl Into<PathBuf>) -> Self {
        Self { sessions_root: sessions_root.into() }
    }

    /// Mints `sessionId = <UTC YYYYMMDD>_<UTC HH-MM>_<uuid>` and creates its
    /// directory skeleton.
    pub async fn new_session(&self) -> Result<(String, SessionStore)> {
        let id = orch_schema::new_session_id();
        let store = SessionStore::create(self.sessions_root.join(&id)).await?;
        info!(session_id = %id, "created session");
        Ok((id, store))
    }

    pub async fn open(&self, session_id: &str) -> Result<SessionStore> {
        SessionStore::open(self.sessions_root.join(session_id)).await
    }

    /// Directory enumeration of `sessions/`, sorted by name (which, given the
    /// `YYYYMMDD_HH-MM_...` id shape, is also chronological).
    pub async fn list(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut entries = match fs::read_dir(&self.sessions_root).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(names),
            Err(err) => return Err(OrchError::Io(err)),
        };
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    /// The session whose liveness markers (or directory mtime) are most
    /// recent, or `None` if there are no sessions yet.
    pub async fn latest(&self) -> Result<Option<String>> {
        let mut best: Option<(String, SystemTime)> = None;
        for name in self.list().await? {
            let activity = self.open(&name).await?.last_activity().await?;
            best = match best {
                Some((best_name, best_time)) if best_time >= activity => Some((best_name, best_time)),
                _ => Some((name, activity)),
            };
        }
        Ok(best.map(|(name, _)| name))
    }

    /// Whole days elapsed since `session_id`'s last activity.
    pub async fn age_days(&self, session_id: &str) -> Result<i64> {
        let activity = self.open(session_id).await?.last_activity().await?;
        let elapsed = SystemTime::now().duration_since(activity).unwrap_or_default();
        Ok((elapsed.as_secs() / 86_400) as i64)
    }

    /// Sorts sessions by age ascending, always retains the `keep` newest,
    /// and deletes the rest that exceed `older_than_days`. `dry_run` skips
    /// the deletion and just returns the names that would go.
    pub async fn purge_old(&self, older_than_days: i64, keep: usize, dry_run: bool) -> Result<Vec<String>> {
        let mut aged = Vec::new();
        for name in self.list().await? {
            let age = self.age_days(&name).await?;
            aged.push((name, age));
        }
        aged.sort_by_key(|(_, age)| *age);

        let mut purged = Vec::new();
        for (name, age) in aged.into_iter().skip(keep) {
            if age > older_than_days {
                if !dry_run {
                    self.open(&name).await?.remove_all().await?;
                    info!(session_id = %name, age_days = age, "purged session");
                }
                purged.push(name);
            }
        }
        Ok(purged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::tempdir;

    #[tokio::test]
    async fn new_session_creates_a_store_and_appears_in_list() {
        let base = tempdir().unwrap();
        let manager = SessionManager::new(base.path());
        let (id, _store) = manager.new_session().await.unwrap();
        assert!(manager.list().await.unwrap().contains(&id));
    }

    #[tokio::test]
    async fn latest_picks_the_most_recently_touched_session() {
        let base = tempdir().unwrap();
        let manager = SessionManager::new(base.path());
        let (old_id, old_store) = manager.new_session().await.unwrap();
        old_store.write_json("state/orchestrator.json", &serde_json::json!({"status": "idle"})).await.unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;

        let (new_id, new_store) = manager.new_session().await.unwrap();
        new_store.write_json("state/orchestrator.json", &serde_json::json!({"status": "running"})).await.unwrap();

        assert_eq!(manager.latest().await.unwrap(), Some(new_id));
        assert_ne!(manager.latest().await.unwrap(), Some(old_id));
    }

    #[tokio::test]
    async fn purge_old_always_retains_keep_newest_regardless_of_age() {
        let base = tempdir().unwrap();
        let manager = SessionManager::new(base.path());
        let (id_a, _) = manager.new_session().await.unwrap();
        let (id_b, _) = manager.new_session().await.unwrap();

        // olderThanDays=0 with nothing older than "just created" would
        // normally purge everything; keep=2 must still save both.
        let purged = manager.purge_old(0, 2, false).await.unwrap();
        assert!(purged.is_empty());
        let remaining = manager.list().await.unwrap();
        assert!(remaining.contains(&id_a));
        assert!(remaining.contains(&id_b));
    }

    #[tokio::test]
    async fn purge_old_dry_run_reports_without_deleting() {
        let base = tempdir().unwrap();
        let manager = SessionManager::new(base.path());
        let (id_a, _) = manager.new_session().await.unwrap();

        let purged = manager.purge_old(-1, 0, true).await.unwrap();
        assert_eq!(purged, vec![id_a.clone()]);
        assert!(manager.list().await.unwrap().contains(&id_a));
    }

    #[tokio::test]
    async fn purge_old_deletes_sessions_exceeding_keep_and_age() {
        let base = tempdir().unwrap();
        let manager = SessionManager::new(base.path());
        let (id_a, _) = manager.new_session().await.unwrap();

        let purged = manager.purge_old(-1, 0, false).await.unwrap();
        assert_eq!(purged, vec![id_a.clone()]);
        assert!(!manager.list().await.unwrap().contains(&id_a));
    }
}
