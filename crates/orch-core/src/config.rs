use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use orch_gate::CheckTimeouts;

/// Configuration the Facade is constructed with: base path, session
/// limits, check/gate timeouts, concurrency, and token budget. Flattened
/// into one struct since the orchestration core has no per-layer override
/// chain.
#[derive(Debug, Clone)]
pub struct OrchConfig {
    /// Root directory holding the `sessions/` tree.
    pub base_path: PathBuf,
    /// Working directory gate check subprocesses run in (the project
    /// being orchestrated, not the session directory).
    pub working_dir: PathBuf,
    pub max_history_items: usize,
    pub check_timeouts: CheckTimeouts,
    pub total_gate_deadline: Duration,
    pub max_concurrent_agents: usize,
    pub token_budget: Option<u64>,
    pub runner_command: String,
    /// Named commands resolvable by the gate DSL's `custom(<name>)` check.
    pub custom_commands: HashMap<String, String>,
}

impl OrchConfig {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        let base_path = base_path.into();
        Self {
            working_dir: base_path.clone(),
            base_path,
            max_history_items: 50,
            check_timeouts: CheckTimeouts::default(),
            total_gate_deadline: Duration::from_secs(180),
            max_concurrent_agents: 4,
            token_budget: None,
            runner_command: orch_dispatch::DEFAULT_RUNNER_COMMAND.to_string(),
            custom_commands: HashMap::new(),
        }
    }

    pub fn sessions_root(&self) -> PathBuf {
        self.base_path.join("sessions")
    }
}
