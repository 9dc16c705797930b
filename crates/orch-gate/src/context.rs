use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use orch_repo::{EvidenceRepository, MemoryRepository};

/// Per-check subprocess timeouts. Each check has its own inner timeout,
/// bounded in turn by whatever remains of the gate's total deadline.
#[derive(Debug, Clone)]
pub struct CheckTimeouts {
    pub typecheck: Duration,
    pub tests: Duration,
    pub lint: Duration,
    pub custom: Duration,
}

impl Default for CheckTimeouts {
    fn default() -> Self {
        Self {
            typecheck: Duration::from_secs(60),
            tests: Duration::from_secs(120),
            lint: Duration::from_secs(30),
            custom: Duration::from_secs(30),
        }
    }
}

/// Everything a check provider needs to run: where to run subprocesses, the
/// configured commands, and read access to the session's memories/evidence.
pub struct GateContext {
    pub working_dir: PathBuf,
    pub typecheck_command: String,
    pub test_command: String,
    pub lint_command: String,
    pub custom_commands: HashMap<String, String>,
    pub timeouts: CheckTimeouts,
    pub memory_repo: MemoryRepository,
    pub evidence_repo: EvidenceRepository,
}

impl GateContext {
    pub fn new(
        working_dir: PathBuf,
        memory_repo: MemoryRepository,
        evidence_repo: EvidenceRepository,
    ) -> Self {
        Self {
            working_dir,
            typecheck_command: "npm run typecheck".to_string(),
            test_command: "npm test -- --run".to_string(),
            lint_command: "npm run lint".to_string(),
            custom_commands: HashMap::new(),
            timeouts: CheckTimeouts::default(),
            memory_repo,
            evidence_repo,
        }
    }
}
