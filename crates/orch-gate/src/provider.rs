use std::path::Path;

use async_trait::async_trait;
use glob::Pattern;
use orch_types::{CheckOutcome, TestCounters};
use regex::Regex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::time::Instant;
use tracing::warn;

use crate::ast::Arg;
use crate::context::GateContext;
use crate::observer::Observer;

/// One leaf check provider. `run` is bounded by `deadline` — the
/// minimum of the provider's own default timeout and whatever remains of the
/// gate's total deadline — and must return rather than block past it.
#[async_trait]
pub trait CheckProvider: Send + Sync {
    async fn run(&self, args: &[Arg], ctx: &GateContext, deadline: Instant, observer: &Observer) -> CheckOutcome;
}

pub struct TypecheckProvider;
pub struct TestsProvider;
pub struct LintProvider;
pub struct ManualOverrideProvider;
pub struct MemoryProvider;
pub struct TraceabilityProvider;
pub struct EvidenceExistsProvider;
pub struct EvidenceCoverageProvider;
pub struct CustomProvider;

#[async_trait]
impl CheckProvider for TypecheckProvider {
    async fn run(&self, _args: &[Arg], ctx: &GateContext, deadline: Instant, observer: &Observer) -> CheckOutcome {
        run_subprocess_check(&ctx.typecheck_command, &ctx.working_dir, deadline, observer, parse_typecheck_failure).await
    }
}

#[async_trait]
impl CheckProvider for TestsProvider {
    async fn run(&self, _args: &[Arg], ctx: &GateContext, deadline: Instant, observer: &Observer) -> CheckOutcome {
        run_subprocess_check(&ctx.test_command, &ctx.working_dir, deadline, observer, parse_test_counters).await
    }
}

#[async_trait]
impl CheckProvider for LintProvider {
    async fn run(&self, _args: &[Arg], ctx: &GateContext, deadline: Instant, observer: &Observer) -> CheckOutcome {
        run_subprocess_check(&ctx.lint_command, &ctx.working_dir, deadline, observer, |_| None).await
    }
}

#[async_trait]
impl CheckProvider for ManualOverrideProvider {
    async fn run(&self, _args: &[Arg], _ctx: &GateContext, _deadline: Instant, _observer: &Observer) -> CheckOutcome {
        CheckOutcome { passed: true, counters: TestCounters::default() }
    }
}

#[async_trait]
impl CheckProvider for MemoryProvider {
    async fn run(&self, args: &[Arg], ctx: &GateContext, _deadline: Instant, _observer: &Observer) -> CheckOutcome {
        let glob_arg = args.first().map(Arg::as_str).unwrap_or_default();
        let Ok(pattern) = Pattern::new(&glob_arg) else {
            return CheckOutcome { passed: false, counters: TestCounters::default() };
        };
        let names = ctx.memory_repo.list().await.unwrap_or_default();
        let matched = names.iter().any(|name| pattern.matches(name));
        CheckOutcome { passed: matched, counters: TestCounters::default() }
    }
}

#[async_trait]
impl CheckProvider for TraceabilityProvider {
    async fn run(&self, args: &[Arg], ctx: &GateContext, _deadline: Instant, _observer: &Observer) -> CheckOutcome {
        let field = args.first().map(Arg::as_str).unwrap_or_default();
        let memories = ctx.memory_repo.list_all().await.unwrap_or_default();
        let found = memories.iter().any(|m| {
            let Some(data) = &m.traceability_data else { return false };
            match field.as_str() {
                "analyzed_symbols" => !data.analyzed_symbols.is_empty(),
                "entry_points" => !data.entry_points.is_empty(),
                "data_flow_map" => data.data_flow_map.is_some(),
                _ => false,
            }
        });
        CheckOutcome { passed: found, counters: TestCounters::default() }
    }
}

#[async_trait]
impl CheckProvider for EvidenceExistsProvider {
    async fn run(&self, args: &[Arg], ctx: &GateContext, _deadline: Instant, _observer: &Observer) -> CheckOutcome {
        let chain_id = args.first().map(Arg::as_str).unwrap_or_default();
        let exists = ctx.evidence_repo.exists(&chain_id).await;
        CheckOutcome { passed: exists, counters: TestCounters::default() }
    }
}

#[async_trait]
impl CheckProvider for EvidenceCoverageProvider {
    async fn run(&self, args: &[Arg], ctx: &GateContext, _deadline: Instant, _observer: &Observer) -> CheckOutcome {
        let threshold = args.first().map(Arg::as_str).and_then(|s| s.parse::<f64>().ok()).unwrap_or(0.0);
        evidence_coverage_outcome(ctx, threshold).await
    }
}

pub async fn evidence_coverage_outcome(ctx: &GateContext, threshold: f64) -> CheckOutcome {
    let chains = ctx.evidence_repo.list_all().await.unwrap_or_default();
    if chains.is_empty() {
        return CheckOutcome { passed: false, counters: TestCounters::default() };
    }
    let mean = chains.iter().map(|c| c.coverage_percent).sum::<f64>() / chains.len() as f64;
    CheckOutcome { passed: mean >= threshold, counters: TestCounters::default() }
}

#[async_trait]
impl CheckProvider for CustomProvider {
    async fn run(&self, args: &[Arg], ctx: &GateContext, deadline: Instant, observer: &Observer) -> CheckOutcome {
        let command_name = args.first().map(Arg::as_str).unwrap_or_default();
        let Some(command) = ctx.custom_commands.get(&command_name) else {
            warn!(command = %command_name, "no custom command registered under this name");
            return CheckOutcome { passed: false, counters: TestCounters::default() };
        };
        run_subprocess_check(command, &ctx.working_dir, deadline, observer, |_| None).await
    }
}

/// Spawns `command` through a shell (custom-check strings are user-supplied
/// and may legitimately be a small pipeline), streaming stdout/stderr lines
/// to `observer`, and kills it if `deadline` elapses first.
async fn run_subprocess_check(
    command: &str,
    cwd: &Path,
    deadline: Instant,
    observer: &Observer,
    parse_counters: impl Fn(&str) -> Option<TestCounters>,
) -> CheckOutcome {
    let mut cmd = if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.args(["/C", command]);
        c
    } else {
        let mut c = Command::new("sh");
        c.args(["-c", command]);
        c
    };
    cmd.current_dir(cwd);
    cmd.stdout(std::process::Stdio::piped());
    cmd.stderr(std::process::Stdio::piped());

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(err) => {
            return CheckOutcome { passed: false, counters: TestCounters::default() }.with_failure_message(observer, format!("failed to spawn: {err}"));
        }
    };

    let mut combined_output = String::new();
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let timeout = deadline.saturating_duration_since(Instant::now());
    let wait = async {
        if let Some(stdout) = stdout {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                observer.progress(&line);
                combined_output.push_str(&line);
                combined_output.push('\n');
            }
        }
        if let Some(stderr) = stderr {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                observer.progress(&line);
                combined_output.push_str(&line);
                combined_output.push('\n');
            }
        }
        child.wait().await
    };

    tokio::select! {
        status = wait => {
            match status {
                Ok(status) => {
                    let passed = status.success();
                    let counters = parse_counters(&combined_output).unwrap_or_default();
                    let mut outcome = CheckOutcome { passed, counters };
                    if !passed {
                        outcome = outcome.with_failure_message(observer, terse_failure(&combined_output));
                    }
                    outcome
                }
                Err(err) => CheckOutcome { passed: false, counters: TestCounters::default() }
                    .with_failure_message(observer, format!("process error: {err}")),
            }
        }
        _ = tokio::time::sleep(timeout) => {
            let _ = child.kill().await;
            CheckOutcome { passed: false, counters: TestCounters::default() }
                .with_failure_message(observer, format!("timed out (>{}s)", timeout.as_secs()))
        }
    }
}

trait WithFailureMessage {
    fn with_failure_message(self, observer: &Observer, message: String) -> Self;
}

impl WithFailureMessage for CheckOutcome {
    fn with_failure_message(self, observer: &Observer, message: String) -> Self {
        observer.progress(&message);
        self
    }
}

fn terse_failure(output: &str) -> String {
    parse_typecheck_failure(output)
        .map(|c| format!("{} errors", c.failed))
        .unwrap_or_else(|| {
            output
                .lines()
                .rev()
                .find(|l| !l.trim().is_empty())
                .unwrap_or("command failed")
                .trim()
                .to_string()
        })
}

fn parse_typecheck_failure(output: &str) -> Option<TestCounters> {
    let re = Regex::new(r"Found (\d+) errors?").ok()?;
    let caps = re.captures(output)?;
    let n: u64 = caps.get(1)?.as_str().parse().ok()?;
    Some(TestCounters { passed: 0, failed: n, skipped: 0 })
}

/// Parses common `npm test` / `cargo test` summary line shapes
/// (`"X passed, Y failed"`, `"test result: ok. N passed"`), per
/// DESIGN.md's documented fallback when the shape isn't recognized.
fn parse_test_counters(output: &str) -> Option<TestCounters> {
    if let Ok(re) = Regex::new(r"(?i)(\d+)\s+passed(?:,\s*(\d+)\s+failed)?(?:,\s*(\d+)\s+skipped)?") {
        if let Some(caps) = re.captures(output) {
            return Some(TestCounters {
                passed: caps.get(1).and_then(|m| m.as_str().parse().ok()).unwrap_or(0),
                failed: caps.get(2).and_then(|m| m.as_str().parse().ok()).unwrap_or(0),
                skipped: caps.get(3).and_then(|m| m.as_str().parse().ok()).unwrap_or(0),
            });
        }
    }
    if let Ok(re) = Regex::new(r"test result: \w+\. (\d+) passed; (\d+) failed;(?: (\d+) ignored;)?") {
        if let Some(caps) = re.captures(output) {
            return Some(TestCounters {
                passed: caps.get(1).and_then(|m| m.as_str().parse().ok()).unwrap_or(0),
                failed: caps.get(2).and_then(|m| m.as_str().parse().ok()).unwrap_or(0),
                skipped: caps.get(3).and_then(|m| m.as_str().parse().ok()).unwrap_or(0),
            });
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_npm_style_summary() {
        let counters = parse_test_counters("Tests: 12 passed, 1 failed, 2 skipped").unwrap();
        assert_eq!(counters.passed, 12);
        assert_eq!(counters.failed, 1);
        assert_eq!(counters.skipped, 2);
    }

    #[test]
    fn parses_cargo_style_summary() {
        let counters = parse_test_counters("test result: ok. 7 passed; 0 failed; 1 ignored;").unwrap();
        assert_eq!(counters.passed, 7);
        assert_eq!(counters.skipped, 1);
    }

    #[test]
    fn falls_back_to_empty_counters_on_unrecognized_shape() {
        assert!(parse_test_counters("no recognizable summary here").is_none());
    }

    #[test]
    fn parses_found_n_errors() {
        let counters = parse_typecheck_failure("Found 3 errors in 2 files").unwrap();
        assert_eq!(counters.failed, 3);
    }
}
