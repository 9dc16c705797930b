use tracing::debug;

/// Optional progress sink for the gate evaluator (`"Running
/// typecheck…"`, `"  [OK] typecheck"`). Layered on top of `tracing`, not a
/// replacement for it — every call is also emitted as a `debug` event so the
/// progress stream is visible with or without an observer installed.
pub struct Observer {
    sink: Option<Box<dyn Fn(&str) + Send + Sync>>,
}

impl Observer {
    pub fn none() -> Self {
        Self { sink: None }
    }

    pub fn new(sink: impl Fn(&str) + Send + Sync + 'static) -> Self {
        Self { sink: Some(Box::new(sink)) }
    }

    pub fn progress(&self, message: &str) {
        debug!(%message, "gate check progress");
        if let Some(sink) = &self.sink {
            sink(message);
        }
    }

    pub fn starting(&self, check: &str) {
        self.progress(&format!("Running {check}…"));
    }

    pub fn finished(&self, check: &str, passed: bool) {
        self.progress(&format!("  [{}] {check}", if passed { "OK" } else { "FAIL" }));
    }
}

impl Default for Observer {
    fn default() -> Self {
        Self::none()
    }
}
