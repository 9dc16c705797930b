//! Session Store (C2): a file-backed, per-session directory tree.
//!
//! Exposes the core primitives — atomic JSON writes, directory listing with
//! a caller-supplied predicate and sort, archival, and an append-only
//! history journal trimmed to a configured maximum — and nothing else.
//! Callers (the repositories in `orch-repo`) own artifact semantics; this
//! crate only owns bytes-on-disk.
//!
//! Concurrency is single-writer-assumed: the store takes no cross-process
//! locks. Within a process it is plain `tokio::fs`.

use std::path::{Path, PathBuf};

use orch_types::{OrchError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::fs;

pub const SESSION_SUBDIRS: &[&str] = &[
    "prompts", "plans", "handoffs", "state", "history", "gates", "memories", "evidence",
];

/// One history journal entry.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct HistoryEntry {
    pub timestamp: String,
    #[serde(rename = "type")]
    pub entry_type: String,
    pub id: String,
}

/// A session's on-disk root, with the fixed subdirectory skeleton already
/// present. Cheap to clone (just a `PathBuf`); every method reopens the file
/// it needs rather than holding handles, matching the request-scoped
/// lifetime repositories use it with.
#[derive(Debug, Clone)]
pub struct SessionStore {
    root: PathBuf,
}

impl SessionStore {
    /// Creates the session directory skeleton atomically: all fixed
    /// subdirectories are built in a staging directory beside `root`, then
    /// the whole thing is renamed into place in one filesystem operation, so
    /// a reader never observes a partially-built session.
    pub async fn create(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if fs::metadata(&root).await.is_ok() {
            return Self::open(root).await;
        }

        let parent = root.parent().ok_or_else(|| {
            OrchError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "session root has no parent directory",
            ))
        })?;
        fs::create_dir_all(parent).await?;

        let staging = parent.join(format!(
            ".{}.staging-{}",
            root.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "session".to_string()),
            uuid_like_suffix()
        ));
        fs::create_dir_all(&staging).await?;
        for dir in SESSION_SUBDIRS {
            fs::create_dir_all(staging.join(dir)).await?;
        }
        match fs::rename(&staging, &root).await {
            Ok(()) => Ok(Self { root }),
            Err(err) => {
                let _ = fs::remove_dir_all(&staging).await;
                Err(OrchError::Io(err))
            }
        }
    }

    /// Opens an existing session root, creating any missing subdirectories
    /// (idempotent; tolerates a session created by an older store version).
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        for dir in SESSION_SUBDIRS {
            fs::create_dir_all(root.join(dir)).await?;
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, rel_path: &str) -> PathBuf {
        self.root.join(rel_path)
    }

    /// Writes `doc` to `rel_path`, creating parent directories if absent, via
    /// a sibling temp file then an atomic rename.
    pub async fn write_json<T: Serialize>(&self, rel_path: &str, doc: &T) -> Result<()> {
        let path = self.resolve(rel_path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let body = serde_json::to_string_pretty(doc)
            .map_err(|e| OrchError::Parse { message: e.to_string() })?;
        write_atomic(&path, body.as_bytes()).await
    }

    /// Reads and parses `rel_path`. Returns `NotFound` if the file is
    /// missing, `Corrupt` if it fails to parse as JSON.
    pub async fn read_json<T: DeserializeOwned>(&self, rel_path: &str) -> Result<T> {
        let path = self.resolve(rel_path);
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(OrchError::not_found("artifact", rel_path));
            }
            Err(err) => return Err(OrchError::Io(err)),
        };
        serde_json::from_slice(&bytes).map_err(|_| OrchError::corrupt(rel_path))
    }

    pub async fn exists(&self, rel_path: &str) -> bool {
        fs::metadata(self.resolve(rel_path)).await.is_ok()
    }

    /// Lists entry names directly under `rel_path` matching `predicate`, in
    /// the order `sort_key` prescribes. `sort_key` receives each matched
    /// name and returns a value its results are sorted descending by (e.g.
    /// timestamp-descending for handoffs); pass a constant to get plain
    /// directory order.
    pub async fn list_dir<P, K, O>(&self, rel_path: &str, predicate: P, mut sort_key: K) -> Result<Vec<String>>
    where
        P: Fn(&str) -> bool,
        K: FnMut(&str) -> O,
        O: Ord,
    {
        let dir = self.resolve(rel_path);
        let mut names = Vec::new();
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(OrchError::Io(err)),
        };
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if predicate(&name) {
                names.push(name);
            }
        }
        names.sort_by(|a, b| sort_key(b).cmp(&sort_key(a)));
        Ok(names)
    }

    /// Copies the current contents of `rel_path` alongside it with a
    /// timestamp suffix before the caller overwrites it. A no-op if the file
    /// doesn't exist yet (nothing to archive on first write).
    pub async fn archive(&self, rel_path: &str, sanitized_timestamp: &str) -> Result<Option<PathBuf>> {
        let path = self.resolve(rel_path);
        let Ok(bytes) = fs::read(&path).await else {
            return Ok(None);
        };
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let ext = path
            .extension()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "json".to_string());
        let archived = path.with_file_name(format!("{stem}-{sanitized_timestamp}.{ext}"));
        write_atomic(&archived, &bytes).await?;
        Ok(Some(archived))
    }

    /// Appends one history line and trims the journal to its last `max_items`
    /// lines. Malformed existing lines are dropped rather than failing the
    /// append — the journal is a best-effort tail, not a source of truth.
    pub async fn append_history(
        &self,
        entry_type: &str,
        id: &str,
        max_items: usize,
    ) -> Result<()> {
        let path = self.resolve("history/log.jsonl");
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let mut lines: Vec<String> = match fs::read_to_string(&path).await {
            Ok(content) => content.lines().map(|l| l.to_string()).collect(),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(err) => return Err(OrchError::Io(err)),
        };
        let entry = HistoryEntry {
            timestamp: chrono::Utc::now().to_rfc3339(),
            entry_type: entry_type.to_string(),
            id: id.to_string(),
        };
        let line = serde_json::to_string(&entry)
            .map_err(|e| OrchError::Parse { message: e.to_string() })?;
        lines.push(line);
        if lines.len() > max_items {
            let drop = lines.len() - max_items;
            lines.drain(0..drop);
        }
        let mut body = lines.join("\n");
        if !body.is_empty() {
            body.push('\n');
        }
        write_atomic(&path, body.as_bytes()).await
    }

    /// Reads all history entries currently retained in the journal, skipping
    /// any line that fails to parse.
    pub async fn read_history(&self) -> Result<Vec<HistoryEntry>> {
        let path = self.resolve("history/log.jsonl");
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(OrchError::Io(err)),
        };
        Ok(content
            .lines()
            .filter_map(|l| serde_json::from_str::<HistoryEntry>(l).ok())
            .collect())
    }

    /// Removes the session directory entirely (used by session purge).
    pub async fn remove_all(&self) -> Result<()> {
        match fs::remove_dir_all(&self.root).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(OrchError::Io(err)),
        }
    }

    /// The most recent modification time among the session's liveness
    /// markers, falling back to the session directory's own mtime. Used by
    /// `orch-session`'s `latest`/`age` operations.
    pub async fn last_activity(&self) -> Result<std::time::SystemTime> {
        let candidates = [
            "history/log.jsonl",
            "handoffs/latest-handoff.json",
            "plans/current-plan.json",
            "state/orchestrator.json",
        ];
        let mut latest: Option<std::time::SystemTime> = None;
        for rel in candidates {
            if let Ok(meta) = fs::metadata(self.resolve(rel)).await {
                if let Ok(modified) = meta.modified() {
                    latest = Some(latest.map_or(modified, |cur| cur.max(modified)));
                }
            }
        }
        if let Some(latest) = latest {
            return Ok(latest);
        }
        let meta = fs::metadata(&self.root).await?;
        Ok(meta.modified()?)
    }
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension(format!(
        "{}.tmp-{}",
        path.extension().map(|e| e.to_string_lossy().into_owned()).unwrap_or_default(),
        uuid_like_suffix()
    ));
    fs::write(&tmp, bytes).await?;
    match fs::rename(&tmp, path).await {
        Ok(()) => Ok(()),
        Err(err) => {
            let _ = fs::remove_file(&tmp).await;
            Err(OrchError::Io(err))
        }
    }
}

/// A short process-local uniqueness suffix for staging paths. Not a real
/// UUID (this crate has no `uuid` dependency); collisions only matter within
/// a single write, so a counter seeded from the current time is enough.
fn uuid_like_suffix() -> String {
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    format!("{nanos:x}-{n:x}")
}
