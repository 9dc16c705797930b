use std::collections::HashMap;

use crate::provider::{
    CheckProvider, CustomProvider, EvidenceCoverageProvider, EvidenceExistsProvider,
    LintProvider, ManualOverrideProvider, MemoryProvider, TestsProvider, TraceabilityProvider,
    TypecheckProvider,
};

/// Maps a check name to its provider: a tagged sum plus registry, no
/// inheritance. Built once per evaluation; cheap enough that callers don't
/// need to cache it.
pub struct CheckRegistry {
    providers: HashMap<&'static str, Box<dyn CheckProvider>>,
}

impl CheckRegistry {
    pub fn new() -> Self {
        let mut providers: HashMap<&'static str, Box<dyn CheckProvider>> = HashMap::new();
        providers.insert("typecheck", Box::new(TypecheckProvider));
        providers.insert("tests", Box::new(TestsProvider));
        providers.insert("lint", Box::new(LintProvider));
        providers.insert("manual_override", Box::new(ManualOverrideProvider));
        providers.insert("memory", Box::new(MemoryProvider));
        providers.insert("traceability", Box::new(TraceabilityProvider));
        providers.insert("evidence_exists", Box::new(EvidenceExistsProvider));
        providers.insert("evidence_coverage", Box::new(EvidenceCoverageProvider));
        providers.insert("custom", Box::new(CustomProvider));
        Self { providers }
    }

    pub fn get(&self, name: &str) -> Option<&dyn CheckProvider> {
        self.providers.get(name).map(|b| b.as_ref())
    }
}

impl Default for CheckRegistry {
    fn default() -> Self {
        Self::new()
    }
}
