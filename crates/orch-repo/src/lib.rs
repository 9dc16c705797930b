//! Artifact Repositories (C3): typed CRUD over the Session Store, validated
//! through the Schema Registry.
//!
//! Every repository shares the same three behaviors:
//! 1. `write` validates via `orch-schema`, writes the canonical file, writes
//!    the pointer mirror (when the kind has one), then appends a history
//!    entry.
//! 2. `read(id)` returns that id's document, or the pointer mirror when `id`
//!    is `None`; if no pointer exists but canonical files do, the error lists
//!    the available ids.
//! 3. `list()` returns the id summaries needed for display.

mod evidence;
mod gate;
mod handoff;
mod memory;
mod plan;
mod prompt;
mod state;

pub use evidence::EvidenceRepository;
pub use gate::GateRepository;
pub use handoff::{HandoffHook, HandoffRepository, HandoffSummary};
pub use memory::MemoryRepository;
pub use plan::PlanRepository;
pub use prompt::PromptRepository;
pub use state::StateRepository;

use orch_types::{OrchError, Result};

/// Builds the "no current pointer; available ids: ..." `NotFound` error from
/// a listing of canonical ids already on disk.
pub(crate) fn no_pointer_error(kind: &str, available_ids: &[String]) -> OrchError {
    if available_ids.is_empty() {
        OrchError::not_found(kind, "<none>")
    } else {
        OrchError::not_found(kind, format!("no current pointer; available ids: {}", available_ids.join(", ")))
    }
}

pub(crate) fn strip_prefix_suffix<'a>(name: &'a str, prefix: &str, suffix: &str) -> Option<&'a str> {
    name.strip_prefix(prefix)?.strip_suffix(suffix)
}

pub(crate) type RResult<T> = Result<T>;
