use std::path::PathBuf;

use clap::{Parser, Subcommand};
use orch_core::{FacadeError, Facade, OrchConfig};
use orch_types::{LinkedMemory, Prompt};
use serde_json::{json, Value};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "orch")]
#[command(about = "Orchestration core CLI")]
struct Cli {
    /// Session to operate on; falls back to `ORCH_SESSION`, then the most
    /// recently active session.
    #[arg(long, env = "ORCH_SESSION", global = true)]
    session: Option<String>,

    /// Base directory holding the `sessions/` tree.
    #[arg(long, global = true)]
    base_path: Option<PathBuf>,

    /// Emit a structured JSON body instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },
    Prompt {
        #[command(subcommand)]
        action: PromptAction,
    },
    Plan {
        #[command(subcommand)]
        action: PlanAction,
    },
    Handoff {
        #[command(subcommand)]
        action: HandoffAction,
    },
    State {
        #[command(subcommand)]
        action: StateAction,
    },
    Memory {
        #[command(subcommand)]
        action: MemoryAction,
    },
    Gate {
        #[command(subcommand)]
        action: GateAction,
    },
    Execute {
        phase_id: String,
        #[arg(long)]
        max_agents: Option<usize>,
    },
    ExecutePlan {
        #[arg(long)]
        resume_from: Option<String>,
    },
    Agents {
        #[command(subcommand)]
        action: AgentsAction,
    },
    Status,
}

#[derive(Subcommand, Debug)]
enum SessionAction {
    New,
    List,
    Info,
    Purge {
        #[arg(long, default_value_t = 7)]
        older_than_days: i64,
        #[arg(long, default_value_t = 3)]
        keep: usize,
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(Subcommand, Debug)]
enum PromptAction {
    Write { description: String },
    Read { id: Option<String> },
}

#[derive(Subcommand, Debug)]
enum PlanAction {
    Write { file: PathBuf },
    Read { id: Option<String> },
}

#[derive(Subcommand, Debug)]
enum HandoffAction {
    Write { file: PathBuf },
    Read { id: Option<String> },
    List,
}

#[derive(Subcommand, Debug)]
enum StateAction {
    Read,
    Write { file: PathBuf },
}

#[derive(Subcommand, Debug)]
enum MemoryAction {
    Link {
        name: String,
        summary: Option<String>,
        #[arg(long)]
        source: Option<PathBuf>,
    },
    List,
    Get { name: String },
}

#[derive(Subcommand, Debug)]
enum GateAction {
    Check {
        phase_id: String,
        #[arg(long)]
        condition: Option<String>,
    },
    Advance {
        phase_id: String,
    },
    List {
        phase_id: Option<String>,
    },
    Read {
        phase_id: String,
    },
}

#[derive(Subcommand, Debug)]
enum AgentsAction {
    List,
    Kill { agent_id: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").with_target(false).init();

    let cli = Cli::parse();
    let base_path = cli.base_path.unwrap_or_else(default_base_path);
    let config = OrchConfig::new(base_path);
    let want_json = cli.json;

    let outcome = run(config, cli.session.as_deref(), cli.command).await;
    match outcome {
        Ok(value) => {
            print_success(&value, want_json);
            Ok(())
        }
        Err(err) => {
            print_failure(&err, want_json);
            std::process::exit(1);
        }
    }
}

async fn run(config: OrchConfig, session: Option<&str>, command: Command) -> Result<Value, FacadeError> {
    let Command::Session { action } = command else {
        let facade = Facade::open(config, session).await?;
        return match command {
            Command::Session { .. } => unreachable!("handled above"),
            Command::Prompt { action } => prompt_command(&facade, action).await,
            Command::Plan { action } => plan_command(&facade, action).await,
            Command::Handoff { action } => handoff_command(&facade, action).await,
            Command::State { action } => state_command(&facade, action).await,
            Command::Memory { action } => memory_command(&facade, action).await,
            Command::Gate { action } => gate_command(&facade, action).await,
            Command::Execute { phase_id, max_agents } => {
                let instructions = facade.execute(&phase_id, max_agents).await?;
                Ok(json!({ "instructions": instructions }))
            }
            Command::ExecutePlan { resume_from } => {
                let instructions = facade.execute_plan(resume_from.as_deref()).await?;
                Ok(json!({ "instructions": instructions }))
            }
            Command::Agents { action } => agents_command(&facade, action).await,
            Command::Status => Ok(json!(facade.status().await?)),
        };
    };
    session_command(config, session, action).await
}

async fn session_command(config: OrchConfig, session: Option<&str>, action: SessionAction) -> Result<Value, FacadeError> {
    match action {
        SessionAction::New => {
            let facade = Facade::open(config, None).await?;
            Ok(json!({ "sessionId": facade.session_id() }))
        }
        SessionAction::List => {
            let facade = Facade::open(config, session).await?;
            Ok(json!({ "sessions": facade.session_list().await? }))
        }
        SessionAction::Info => {
            let facade = Facade::open(config, session).await?;
            Ok(json!({ "sessionId": facade.session_id(), "latest": facade.session_latest().await? }))
        }
        SessionAction::Purge { older_than_days, keep, dry_run } => {
            let facade = Facade::open(config, session).await?;
            let purged = facade.session_purge(older_than_days, keep, dry_run).await?;
            Ok(json!({ "purged": purged, "dryRun": dry_run }))
        }
    }
}

async fn prompt_command(facade: &Facade, action: PromptAction) -> Result<Value, FacadeError> {
    match action {
        PromptAction::Write { description } => {
            let prompt = Prompt {
                id: orch_schema::new_uuid(),
                session_id: facade.session_id().to_string(),
                description,
                request: None,
            };
            Ok(json!(facade.prompt_write(prompt).await?))
        }
        PromptAction::Read { id } => Ok(json!(facade.prompt_read(id.as_deref()).await?)),
    }
}

async fn plan_command(facade: &Facade, action: PlanAction) -> Result<Value, FacadeError> {
    match action {
        PlanAction::Write { file } => {
            let plan = read_json_file(&file).await?;
            Ok(json!(facade.plan_write(plan).await?))
        }
        PlanAction::Read { id } => Ok(json!(facade.plan_read(id.as_deref()).await?)),
    }
}

async fn handoff_command(facade: &Facade, action: HandoffAction) -> Result<Value, FacadeError> {
    match action {
        HandoffAction::Write { file } => {
            let handoff = read_json_file(&file).await?;
            Ok(json!(facade.handoff_write(handoff).await?))
        }
        HandoffAction::Read { id } => Ok(json!(facade.handoff_read(id.as_deref()).await?)),
        HandoffAction::List => Ok(json!({ "handoffs": facade.handoff_list().await? })),
    }
}

async fn state_command(facade: &Facade, action: StateAction) -> Result<Value, FacadeError> {
    match action {
        StateAction::Read => Ok(json!(facade.state_read().await?)),
        StateAction::Write { file } => {
            let state = read_json_file(&file).await?;
            Ok(json!(facade.state_write(state).await?))
        }
    }
}

async fn memory_command(facade: &Facade, action: MemoryAction) -> Result<Value, FacadeError> {
    match action {
        MemoryAction::Link { name, summary, source } => {
            let memory = LinkedMemory {
                memory_name: name,
                source_path: source.map(|p| p.display().to_string()).unwrap_or_default(),
                linked_at: orch_schema::now(),
                for_agents: vec![],
                traceability_data: None,
                summary,
            };
            Ok(json!(facade.memory_link(memory).await?))
        }
        MemoryAction::List => Ok(json!({ "memories": facade.memory_list().await? })),
        MemoryAction::Get { name } => Ok(json!(facade.memory_get(&name).await?)),
    }
}

async fn gate_command(facade: &Facade, action: GateAction) -> Result<Value, FacadeError> {
    match action {
        GateAction::Check { phase_id, condition } => {
            let condition = condition.unwrap_or_default();
            Ok(json!(facade.gate_check(&phase_id, &condition).await?))
        }
        GateAction::Advance { phase_id } => {
            let outcome = facade.advance_phase(&phase_id).await?;
            Ok(match outcome {
                orch_core::AdvanceOutcome::Advanced { state, gate } => json!({ "advanced": true, "state": state, "gate": gate }),
                orch_core::AdvanceOutcome::Blocked { gate, blockers } => json!({ "advanced": false, "gate": gate, "blockers": blockers }),
            })
        }
        GateAction::List { phase_id } => Ok(json!({ "gates": facade.gate_list(phase_id.as_deref()).await? })),
        GateAction::Read { phase_id } => Ok(json!(facade.gate_read(&phase_id).await?)),
    }
}

async fn agents_command(facade: &Facade, action: AgentsAction) -> Result<Value, FacadeError> {
    match action {
        AgentsAction::List => Ok(json!({ "agents": facade.agents_list().await? })),
        AgentsAction::Kill { agent_id } => Ok(json!(facade.agents_kill(&agent_id).await?)),
    }
}

async fn read_json_file<T: serde::de::DeserializeOwned>(path: &std::path::Path) -> Result<T, FacadeError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| FacadeError::from(orch_types::OrchError::Io(e)))?;
    serde_json::from_slice(&bytes).map_err(|e| FacadeError::from(orch_types::OrchError::Parse { message: e.to_string() }))
}

fn default_base_path() -> PathBuf {
    dirs::data_dir().unwrap_or_else(|| PathBuf::from(".")).join("orch")
}

fn print_success(value: &Value, json_mode: bool) {
    if json_mode {
        println!("{}", json!({ "success": true, "data": value }));
    } else {
        println!("{}", serde_json::to_string_pretty(value).unwrap_or_default());
    }
}

fn print_failure(err: &FacadeError, json_mode: bool) {
    if json_mode {
        eprintln!("{}", err.to_json());
    } else {
        eprintln!("error: {err}");
    }
    info!("command failed: {err}");
}
