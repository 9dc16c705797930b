use async_recursion::async_recursion;
use orch_types::{CheckOutcome, CheckResult, GateResult, OrchError, Result};
use tokio::time::Instant;

use crate::ast::{Arg, Atom, Expr};
use crate::context::GateContext;
use crate::observer::Observer;
use crate::parser::parse;
use crate::provider::evidence_coverage_outcome;
use crate::registry::CheckRegistry;

/// Evaluates a `gateCondition` string into a `GateResult`.
///
/// An empty/whitespace condition is "no gate": passes trivially with no
/// recorded atoms. A non-empty condition that fails to parse is a
/// `ParseError` — no check runs. Otherwise the expression is evaluated with
/// AND/OR short-circuiting; every evaluated atom contributes one
/// `CheckResult`, and the whole call is bounded by `total_deadline`.
pub async fn check_gate(
    phase_id: &str,
    condition: &str,
    ctx: &GateContext,
    registry: &CheckRegistry,
    total_deadline: std::time::Duration,
    observer: &Observer,
) -> Result<GateResult> {
    let started = Instant::now();
    if condition.trim().is_empty() {
        return Ok(GateResult {
            phase_id: phase_id.to_string(),
            passed: true,
            checked_at: orch_schema::now(),
            results: vec![],
            blockers: vec![],
            duration_ms: Some(started.elapsed().as_millis() as u64),
        });
    }

    let expr = parse(condition).map_err(|e| OrchError::Parse { message: e.to_string() })?;
    let deadline = started + total_deadline;

    let mut state = EvalState { results: Vec::new(), timed_out: false };
    let passed = eval(&expr, ctx, registry, deadline, observer, &mut state).await;

    let blockers = state
        .results
        .iter()
        .filter(|r| !r.passed)
        .map(|r| r.message.clone().unwrap_or_else(|| format!("{} failed", r.check)))
        .collect();

    Ok(GateResult {
        phase_id: phase_id.to_string(),
        passed,
        checked_at: orch_schema::now(),
        results: state.results,
        blockers,
        duration_ms: Some(started.elapsed().as_millis() as u64),
    })
}

struct EvalState {
    results: Vec<CheckResult>,
    timed_out: bool,
}

#[async_recursion]
async fn eval(
    expr: &Expr,
    ctx: &GateContext,
    registry: &CheckRegistry,
    deadline: Instant,
    observer: &Observer,
    state: &mut EvalState,
) -> bool {
    match expr {
        Expr::And(lhs, rhs) => {
            if !eval(lhs, ctx, registry, deadline, observer, state).await {
                return false;
            }
            eval(rhs, ctx, registry, deadline, observer, state).await
        }
        Expr::Or(lhs, rhs) => {
            if eval(lhs, ctx, registry, deadline, observer, state).await {
                return true;
            }
            eval(rhs, ctx, registry, deadline, observer, state).await
        }
        Expr::Not(inner) => !eval(inner, ctx, registry, deadline, observer, state).await,
        Expr::Leaf(atom) => eval_atom(atom, ctx, registry, deadline, observer, state).await,
    }
}

async fn eval_atom(
    atom: &Atom,
    ctx: &GateContext,
    registry: &CheckRegistry,
    deadline: Instant,
    observer: &Observer,
    state: &mut EvalState,
) -> bool {
    if Instant::now() >= deadline {
        record_timeout_once(state);
        return false;
    }

    let label = atom.display();
    observer.starting(&label);

    let outcome = match atom {
        Atom::Call { name, args } => {
            let check_deadline = per_check_deadline(name, ctx, deadline);
            run_call(name, args, ctx, registry, check_deadline, observer).await
        }
        Atom::Threshold { name, field, op, value } => {
            let check_deadline = per_check_deadline(name, ctx, deadline);
            run_threshold(name, field, *op, *value, ctx, registry, check_deadline, observer).await
        }
    };

    observer.finished(&label, outcome.passed);
    state.results.push(CheckResult {
        check: label.clone(),
        passed: outcome.passed,
        message: if outcome.passed { None } else { Some(format!("{label} did not pass")) },
    });

    // The check itself may have been the one killed by the gate's total
    // deadline (its inner timeout is capped at `deadline`, see
    // `per_check_deadline`); a short-circuiting AND/OR can then stop
    // evaluation before any later atom ever reaches the guard above. Catch
    // that here so the synthetic `timeout` atom is still recorded (I11/S3).
    if !outcome.passed && Instant::now() >= deadline {
        record_timeout_once(state);
    }

    outcome.passed
}

async fn run_call(
    name: &str,
    args: &[Arg],
    ctx: &GateContext,
    registry: &CheckRegistry,
    deadline: Instant,
    observer: &Observer,
) -> CheckOutcome {
    match registry.get(name) {
        Some(provider) => provider.run(args, ctx, deadline, observer).await,
        None => CheckOutcome { passed: false, counters: Default::default() },
    }
}

async fn run_threshold(
    name: &str,
    field: &str,
    op: crate::lexer::CompareOp,
    value: f64,
    ctx: &GateContext,
    registry: &CheckRegistry,
    deadline: Instant,
    observer: &Observer,
) -> CheckOutcome {
    match (name, field) {
        ("tests", "passed") => {
            if let Some(provider) = registry.get("tests") {
                let outcome = provider.run(&[], ctx, deadline, observer).await;
                let lhs = outcome.counters.passed as f64;
                CheckOutcome { passed: op.apply(lhs, value), counters: outcome.counters }
            } else {
                CheckOutcome { passed: false, counters: Default::default() }
            }
        }
        ("evidence", "coverage") => {
            let outcome = evidence_coverage_outcome(ctx, 0.0).await;
            // re-derive the mean so we can compare with the DSL's own operator,
            // not just `>=` (evidence_coverage_outcome always checks `>=`).
            let chains = ctx.evidence_repo.list_all().await.unwrap_or_default();
            if chains.is_empty() {
                return CheckOutcome { passed: false, counters: Default::default() };
            }
            let mean = chains.iter().map(|c| c.coverage_percent).sum::<f64>() / chains.len() as f64;
            CheckOutcome { passed: op.apply(mean, value), counters: outcome.counters }
        }
        _ => CheckOutcome { passed: false, counters: Default::default() },
    }
}

/// Each subprocess check's own inner timeout, bounded by whatever remains of
/// the gate's total deadline — never the other way around.
fn per_check_deadline(name: &str, ctx: &GateContext, gate_deadline: Instant) -> Instant {
    let default = match name {
        "typecheck" => ctx.timeouts.typecheck,
        "tests" => ctx.timeouts.tests,
        "lint" => ctx.timeouts.lint,
        "custom" => ctx.timeouts.custom,
        _ => return gate_deadline,
    };
    std::cmp::min(Instant::now() + default, gate_deadline)
}

fn record_timeout_once(state: &mut EvalState) {
    if state.timed_out {
        return;
    }
    state.timed_out = true;
    state.results.push(CheckResult {
        check: "timeout".to_string(),
        passed: false,
        message: Some("total gate deadline elapsed before this check could run".to_string()),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use orch_store::SessionStore;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::tempdir;

    async fn test_context() -> (GateContext, tempfile::TempDir) {
        let base = tempdir().unwrap();
        let store = SessionStore::create(base.path().join("s1")).await.unwrap();
        let memory_repo = orch_repo::MemoryRepository::new(store.clone(), 50);
        let evidence_repo = orch_repo::EvidenceRepository::new(store, 50);
        (GateContext::new(base.path().to_path_buf(), memory_repo, evidence_repo), base)
    }

    #[tokio::test]
    async fn empty_condition_passes_trivially() {
        let (ctx, _base) = test_context().await;
        let registry = CheckRegistry::new();
        let result = check_gate("p1", "", &ctx, &registry, std::time::Duration::from_secs(5), &Observer::none())
            .await
            .unwrap();
        assert!(result.passed);
        assert!(result.results.is_empty());
        assert!(result.blockers.is_empty());
    }

    #[tokio::test]
    async fn manual_override_short_circuits_or() {
        let (ctx, _base) = test_context().await;
        let registry = CheckRegistry::new();
        // "tests" would try to spawn `npm test -- --run`, which doesn't
        // exist in the test sandbox; if OR didn't short-circuit this would
        // show up as a failing `tests` result.
        let result = check_gate(
            "p1",
            "manual_override OR tests",
            &ctx,
            &registry,
            std::time::Duration::from_secs(5),
            &Observer::none(),
        )
        .await
        .unwrap();
        assert!(result.passed);
        assert_eq!(result.results.len(), 1);
        assert_eq!(result.results[0].check, "manual_override");
    }

    #[tokio::test]
    async fn parse_error_is_surfaced_without_running_checks() {
        let (ctx, _base) = test_context().await;
        let registry = CheckRegistry::new();
        let err = check_gate("p1", "frobnicate", &ctx, &registry, std::time::Duration::from_secs(5), &Observer::none())
            .await
            .unwrap_err();
        assert!(matches!(err, OrchError::Parse { .. }));
    }

    #[tokio::test]
    async fn observer_receives_progress_strings() {
        let (ctx, _base) = test_context().await;
        let registry = CheckRegistry::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        let observer = Observer::new(move |_msg| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });
        check_gate("p1", "manual_override", &ctx, &registry, std::time::Duration::from_secs(5), &observer)
            .await
            .unwrap();
        assert!(count.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn evidence_coverage_with_no_chains_fails() {
        let (ctx, _base) = test_context().await;
        let registry = CheckRegistry::new();
        let result = check_gate(
            "p1",
            "evidence_coverage(50)",
            &ctx,
            &registry,
            std::time::Duration::from_secs(5),
            &Observer::none(),
        )
        .await
        .unwrap();
        assert!(!result.passed);
    }
}
