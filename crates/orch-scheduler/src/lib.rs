//! Scheduler (C6): topological leveling of a phase's subtasks, chunked by
//! `maxConcurrentAgents` into parallel groups.
//!
//! Computes the whole group plan up front rather than handing out one
//! runnable task at a time: cycle detection via a DFS `visiting` path set,
//! leveling by max-dependency-depth, chunking each level by concurrency cap.

use std::collections::{HashMap, HashSet};

use orch_types::{ParallelGroup, Subtask};
use tracing::warn;

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub max_concurrent_agents: usize,
    pub wait_for_all: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { max_concurrent_agents: 4, wait_for_all: false }
    }
}

/// The result of scheduling one phase: the ordered parallel groups plus any
/// cycle warnings. A cyclic dependency graph still yields a non-empty
/// ordering — it never loops and never fails the schedule outright.
#[derive(Debug, Clone)]
pub struct ScheduleResult {
    pub groups: Vec<ParallelGroup>,
    pub warnings: Vec<String>,
}

/// Computes dependency levels and chunks each level into groups of at most
/// `config.max_concurrent_agents` tasks, in input order.
pub fn schedule(phase_id: &str, subtasks: &[Subtask], config: &SchedulerConfig) -> ScheduleResult {
    let (levels, warnings) = compute_levels(subtasks);
    for warning in &warnings {
        warn!(phase = phase_id, "{warning}");
    }

    let max_level = levels.values().copied().max().unwrap_or(0);
    let mut by_level: Vec<Vec<&Subtask>> = vec![Vec::new(); (max_level + 1) as usize];
    for task in subtasks {
        let level = levels.get(&task.id).copied().unwrap_or(0);
        by_level[level as usize].push(task);
    }

    let chunk_size = config.max_concurrent_agents.max(1);
    let mut groups = Vec::new();
    for (level, tasks) in by_level.into_iter().enumerate() {
        for (chunk_idx, chunk) in tasks.chunks(chunk_size).enumerate() {
            groups.push(ParallelGroup {
                group_id: format!("{phase_id}-L{level}-G{chunk_idx}"),
                tasks: chunk.iter().map(|t| (*t).clone()).collect(),
                wait_for_all: config.wait_for_all,
            });
        }
    }

    ScheduleResult { groups, warnings }
}

/// `true` iff every dependency of `task` appears in `completed_task_ids`.
/// The scheduler only computes groups; it never executes tasks itself.
pub fn can_execute(task: &Subtask, completed_task_ids: &HashSet<String>) -> bool {
    task.dependencies.iter().all(|dep| completed_task_ids.contains(dep))
}

/// DFS with a per-path `visiting` set. A dependency edge that points back
/// into the current path is a cycle: the closing task is assigned level 0
/// and a warning recorded rather than failing the schedule. Dependency ids
/// that don't resolve within the phase are ignored, not fatal.
fn compute_levels(subtasks: &[Subtask]) -> (HashMap<String, u32>, Vec<String>) {
    let task_map: HashMap<&str, &Subtask> = subtasks.iter().map(|t| (t.id.as_str(), t)).collect();
    let mut levels = HashMap::new();
    let mut warnings = Vec::new();

    for task in subtasks {
        if !levels.contains_key(task.id.as_str()) {
            let mut visiting = HashSet::new();
            level_of(&task.id, &task_map, &mut levels, &mut visiting, &mut warnings);
        }
    }

    (levels, warnings)
}

fn level_of<'a>(
    id: &'a str,
    task_map: &HashMap<&'a str, &'a Subtask>,
    levels: &mut HashMap<String, u32>,
    visiting: &mut HashSet<String>,
    warnings: &mut Vec<String>,
) -> u32 {
    if let Some(&level) = levels.get(id) {
        return level;
    }
    if visiting.contains(id) {
        warnings.push(format!(
            "dependency cycle detected closing at task `{id}`; treating it as level 0"
        ));
        levels.insert(id.to_string(), 0);
        return 0;
    }
    let Some(task) = task_map.get(id) else {
        levels.insert(id.to_string(), 0);
        return 0;
    };

    visiting.insert(id.to_string());
    let mut max_dep_level: Option<u32> = None;
    for dep in &task.dependencies {
        if !task_map.contains_key(dep.as_str()) {
            continue;
        }
        let dep_level = level_of(dep, task_map, levels, visiting, warnings);
        max_dep_level = Some(max_dep_level.map_or(dep_level, |m| m.max(dep_level)));
    }
    visiting.remove(id);

    let level = max_dep_level.map_or(0, |m| m + 1);
    levels.insert(id.to_string(), level);
    level
}

#[cfg(test)]
mod tests {
    use super::*;
    use orch_types::AgentType;

    fn task(id: &str, deps: &[&str]) -> Subtask {
        Subtask {
            id: id.to_string(),
            agent_type: AgentType::Developer,
            prompt: format!("work on {id}"),
            dependencies: deps.iter().map(|s| s.to_string()).collect(),
            estimated_tokens: None,
        }
    }

    #[test]
    fn levels_diamond_dependency_into_three_groups() {
        // diamond: a (no deps), b (deps=[a]), c (deps=[a]), d (deps=[b,c]), max=2
        let subtasks = vec![task("a", &[]), task("b", &["a"]), task("c", &["a"]), task("d", &["b", "c"])];
        let config = SchedulerConfig { max_concurrent_agents: 2, wait_for_all: false };
        let result = schedule("p1", &subtasks, &config);
        assert_eq!(result.groups.len(), 3);
        assert_eq!(result.groups[0].group_id, "p1-L0-G0");
        assert_eq!(result.groups[0].tasks.iter().map(|t| t.id.as_str()).collect::<Vec<_>>(), vec!["a"]);
        assert_eq!(result.groups[1].group_id, "p1-L1-G0");
        assert_eq!(result.groups[1].tasks.iter().map(|t| t.id.as_str()).collect::<Vec<_>>(), vec!["b", "c"]);
        assert_eq!(result.groups[2].group_id, "p1-L2-G0");
        assert_eq!(result.groups[2].tasks.iter().map(|t| t.id.as_str()).collect::<Vec<_>>(), vec!["d"]);
    }

    #[test]
    fn no_group_exceeds_max_concurrent_agents() {
        let subtasks: Vec<Subtask> = (0..5).map(|i| task(&format!("t{i}"), &[])).collect();
        let config = SchedulerConfig { max_concurrent_agents: 2, wait_for_all: false };
        let result = schedule("p1", &subtasks, &config);
        for group in &result.groups {
            assert!(group.tasks.len() <= 2);
        }
    }

    #[test]
    fn cyclic_phase_terminates_with_a_warning_and_non_empty_ordering() {
        let subtasks = vec![task("a", &["c"]), task("b", &["a"]), task("c", &["b"])];
        let config = SchedulerConfig::default();
        let result = schedule("p1", &subtasks, &config);
        assert!(!result.groups.is_empty());
        assert!(!result.warnings.is_empty());
    }

    #[test]
    fn unresolved_dependency_ids_are_ignored_not_fatal() {
        let subtasks = vec![task("a", &["does-not-exist"])];
        let config = SchedulerConfig::default();
        let result = schedule("p1", &subtasks, &config);
        assert_eq!(result.groups.len(), 1);
        assert_eq!(result.groups[0].tasks[0].id, "a");
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn can_execute_requires_every_dependency_completed() {
        let t = task("d", &["a", "b"]);
        let mut completed = HashSet::new();
        completed.insert("a".to_string());
        assert!(!can_execute(&t, &completed));
        completed.insert("b".to_string());
        assert!(can_execute(&t, &completed));
    }
}
