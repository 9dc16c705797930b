use std::sync::Arc;

use orch_dispatch::{aggregate_results, build_dispatch, TaskOutcome};
use orch_evidence::EvidenceLinker;
use orch_gate::{check_gate, CheckRegistry, GateContext, Observer};
use orch_repo::{
    EvidenceRepository, GateRepository, HandoffRepository, HandoffSummary, MemoryRepository, PlanRepository,
    PromptRepository, StateRepository,
};
use orch_scheduler::{schedule, SchedulerConfig};
use orch_session::SessionManager;
use orch_store::SessionStore;
use orch_types::{
    AgentRecord, AgentStatus, CurrentPhase, DispatchInstruction, GateResult, Handoff, LinkedMemory,
    OrchestratorState, OrchestratorStatus, Plan, Prompt, Result,
};

use crate::config::OrchConfig;

/// What `advancePhase` returns: either the state moved forward, or the gate
/// blocked it — in which case the session's state is left untouched.
#[derive(Debug, Clone)]
pub enum AdvanceOutcome {
    Advanced { state: OrchestratorState, gate: GateResult },
    Blocked { gate: GateResult, blockers: Vec<String> },
}

/// The single stateful object bound to one session. Owns every
/// repository, the gate's check registry/context, and the evidence-linker
/// wiring; consumers never assemble those themselves.
pub struct Facade {
    config: OrchConfig,
    session_id: String,
    session_manager: SessionManager,
    prompt_repo: PromptRepository,
    plan_repo: PlanRepository,
    handoff_repo: HandoffRepository,
    state_repo: StateRepository,
    memory_repo: MemoryRepository,
    gate_repo: GateRepository,
    gate_ctx: GateContext,
    check_registry: CheckRegistry,
    store: SessionStore,
}

impl Facade {
    /// Opens `session_id` if given, otherwise mints a new session. `ORCH_SESSION`
    /// and any sessions-base-directory override are read by the caller (the
    /// CLI), not here — the facade only ever sees the resolved values.
    pub async fn open(config: OrchConfig, session_id: Option<&str>) -> Result<Self> {
        let session_manager = SessionManager::new(config.sessions_root());
        let (session_id, store) = match session_id {
            Some(id) => (id.to_string(), session_manager.open(id).await?),
            None => session_manager.new_session().await?,
        };
        Ok(Self::wire(config, session_id, store, session_manager))
    }

    fn wire(config: OrchConfig, session_id: String, store: SessionStore, session_manager: SessionManager) -> Self {
        let linker_evidence_repo = EvidenceRepository::new(store.clone(), config.max_history_items);
        let linker = Arc::new(EvidenceLinker::new(linker_evidence_repo));
        let handoff_repo = HandoffRepository::new(store.clone(), config.max_history_items).with_hook(linker);

        let gate_memory_repo = MemoryRepository::new(store.clone(), config.max_history_items);
        let gate_evidence_repo = EvidenceRepository::new(store.clone(), config.max_history_items);
        let mut gate_ctx = GateContext::new(config.working_dir.clone(), gate_memory_repo, gate_evidence_repo);
        gate_ctx.timeouts = config.check_timeouts.clone();
        gate_ctx.custom_commands = config.custom_commands.clone();

        Self {
            prompt_repo: PromptRepository::new(store.clone(), config.max_history_items),
            plan_repo: PlanRepository::new(store.clone(), config.max_history_items),
            handoff_repo,
            state_repo: StateRepository::new(store.clone(), config.max_history_items),
            memory_repo: MemoryRepository::new(store.clone(), config.max_history_items),
            gate_repo: GateRepository::new(store.clone(), config.max_history_items),
            gate_ctx,
            check_registry: CheckRegistry::new(),
            store,
            session_id,
            session_manager,
            config,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    // --- session lifecycle -------------------------------------------------

    pub async fn session_list(&self) -> Result<Vec<String>> {
        self.session_manager.list().await
    }

    pub async fn session_latest(&self) -> Result<Option<String>> {
        self.session_manager.latest().await
    }

    pub async fn session_purge(&self, older_than_days: i64, keep: usize, dry_run: bool) -> Result<Vec<String>> {
        self.session_manager.purge_old(older_than_days, keep, dry_run).await
    }

    // --- prompt --------------------------------------------------------

    pub async fn prompt_write(&self, prompt: Prompt) -> Result<Prompt> {
        self.prompt_repo.write(prompt).await
    }

    pub async fn prompt_read(&self, id: Option<&str>) -> Result<Prompt> {
        self.prompt_repo.read(id).await
    }

    // --- plan ------------------------------------------------------------

    pub async fn plan_write(&self, plan: Plan) -> Result<Plan> {
        self.plan_repo.write(plan).await
    }

    pub async fn plan_read(&self, id: Option<&str>) -> Result<Plan> {
        self.plan_repo.read(id).await
    }

    // --- handoff ---------------------------------------------------------

    pub async fn handoff_write(&self, handoff: Handoff) -> Result<Handoff> {
        self.handoff_repo.write(handoff).await
    }

    pub async fn handoff_read(&self, id: Option<&str>) -> Result<Handoff> {
        self.handoff_repo.read(id).await
    }

    pub async fn handoff_list(&self) -> Result<Vec<HandoffSummary>> {
        self.handoff_repo.list().await
    }

    // --- state -------------------------------------------------------------

    pub async fn state_read(&self) -> Result<OrchestratorState> {
        self.state_repo.read().await
    }

    pub async fn state_write(&self, state: OrchestratorState) -> Result<OrchestratorState> {
        self.state_repo.write(state).await
    }

    // --- memory --------------------------------------------------------

    pub async fn memory_link(&self, memory: LinkedMemory) -> Result<LinkedMemory> {
        self.memory_repo.write(memory).await
    }

    pub async fn memory_list(&self) -> Result<Vec<String>> {
        self.memory_repo.list().await
    }

    pub async fn memory_get(&self, name: &str) -> Result<LinkedMemory> {
        self.memory_repo.get(name).await
    }

    // --- gate ------------------------------------------------------------

    pub async fn gate_check(&self, phase_id: &str, condition: &str) -> Result<GateResult> {
        let result = check_gate(
            phase_id,
            condition,
            &self.gate_ctx,
            &self.check_registry,
            self.config.total_gate_deadline,
            &Observer::none(),
        )
        .await?;
        self.gate_repo.write(result.clone()).await?;
        Ok(result)
    }

    pub async fn gate_list(&self, phase_id: Option<&str>) -> Result<Vec<GateResult>> {
        self.gate_repo.list(phase_id).await
    }

    pub async fn gate_read(&self, phase_id: &str) -> Result<GateResult> {
        self.gate_repo.read_latest(phase_id).await
    }

    /// Runs the gate for `phaseId`, and only on a pass
    /// writes a new orchestrator state pointing `currentPhase` at the next
    /// phase in the plan (or the "complete" sentinel if none remain), then
    /// records a `phase_advanced` history entry. On failure, state is left
    /// untouched and the blockers are returned.
    pub async fn advance_phase(&self, phase_id: &str) -> Result<AdvanceOutcome> {
        let plan = self.plan_repo.read(None).await?;
        let condition = plan
            .phases
            .iter()
            .find(|p| p.id == phase_id)
            .and_then(|p| p.gate_condition.clone())
            .unwrap_or_default();

        let gate = self.gate_check(phase_id, &condition).await?;
        if !gate.passed {
            return Ok(AdvanceOutcome::Blocked { blockers: gate.blockers.clone(), gate });
        }

        let next_phase = plan
            .phases
            .iter()
            .position(|p| p.id == phase_id)
            .and_then(|idx| plan.phases.get(idx + 1));

        let mut state = match self.state_repo.read().await {
            Ok(state) => state,
            Err(_) => OrchestratorState { status: OrchestratorStatus::Idle, current_phase: None, agents: vec![], token_usage: None },
        };
        state.current_phase = next_phase.map(|p| CurrentPhase { id: p.id.clone(), name: p.name.clone(), progress: 0.0 });
        state.status = if next_phase.is_some() { OrchestratorStatus::Running } else { OrchestratorStatus::Complete };

        let state = self.state_repo.write(state).await?;
        self.store
            .append_history("phase_advanced", phase_id, self.config.max_history_items)
            .await?;

        Ok(AdvanceOutcome::Advanced { state, gate })
    }

    // --- execute / dispatch ------------------------------------------------

    /// Builds the dispatch instructions for one phase: schedules its
    /// subtasks into parallel groups and turns each group into a
    /// `DispatchInstruction`, substituting `{result:<taskId>}` placeholders
    /// from every handoff already on record in this session.
    pub async fn execute(&self, phase_id: &str, max_agents_override: Option<usize>) -> Result<Vec<DispatchInstruction>> {
        let plan = self.plan_repo.read(None).await?;
        let phase = plan
            .phases
            .iter()
            .find(|p| p.id == phase_id)
            .ok_or_else(|| orch_types::OrchError::not_found("phase", phase_id))?;

        let scheduler_config = SchedulerConfig {
            max_concurrent_agents: max_agents_override.unwrap_or(self.config.max_concurrent_agents),
            wait_for_all: !phase.parallelizable,
        };
        let scheduled = schedule(phase_id, &phase.subtasks, &scheduler_config);

        let aggregated = self.aggregated_results().await?;
        let used_tokens = aggregated.total_tokens_used;
        let instructions = scheduled
            .groups
            .iter()
            .map(|group| build_dispatch(group, &aggregated, &self.config.runner_command, used_tokens, self.config.token_budget))
            .collect();
        Ok(instructions)
    }

    /// Runs `execute` for every phase from `resume_from` (or the plan's
    /// first phase) onward, in plan order.
    pub async fn execute_plan(&self, resume_from: Option<&str>) -> Result<Vec<DispatchInstruction>> {
        let plan = self.plan_repo.read(None).await?;
        let start = match resume_from {
            Some(id) => plan.phases.iter().position(|p| p.id == id).unwrap_or(0),
            None => 0,
        };
        let mut all = Vec::new();
        for phase in &plan.phases[start..] {
            all.extend(self.execute(&phase.id, None).await?);
        }
        Ok(all)
    }

    async fn aggregated_results(&self) -> Result<orch_types::AggregatedResults> {
        let mut outcomes = Vec::new();
        for summary in self.handoff_repo.list().await? {
            let handoff = self.handoff_repo.read(Some(&summary.id)).await?;
            for result in &handoff.results {
                outcomes.push(TaskOutcome {
                    task_id: result.task_id.clone(),
                    completed: true,
                    handoff: Some(handoff.clone()),
                    tokens_used: 0,
                    error: None,
                });
            }
        }
        Ok(aggregate_results(&outcomes))
    }

    // --- agent registry ------------------------------------------------

    pub async fn agents_list(&self) -> Result<Vec<AgentRecord>> {
        Ok(self.state_repo.read().await?.agents)
    }

    /// Marks an agent record `failed` in orchestrator state. The core has no
    /// process handle to actually terminate — killing the external agent
    /// runner is the controller's responsibility.
    pub async fn agents_kill(&self, agent_id: &str) -> Result<AgentRecord> {
        let mut state = self.state_repo.read().await?;
        let agent = state
            .agents
            .iter_mut()
            .find(|a| a.id == agent_id)
            .ok_or_else(|| orch_types::OrchError::not_found("agent", agent_id))?;
        agent.status = AgentStatus::Failed;
        let killed = agent.clone();
        self.state_repo.write(state).await?;
        Ok(killed)
    }

    // --- status --------------------------------------------------------

    pub async fn status(&self) -> Result<OrchestratorState> {
        self.state_repo.read().await
    }
}
