use orch_types::OrchError;
use serde_json::{json, Value};

/// The `{success:false, error, details?}` shape every facade failure path
/// returns, for the CLI wrapper's exit-code/JSON handling.
#[derive(Debug, Clone)]
pub struct FacadeError {
    pub error: String,
    pub details: Option<Value>,
}

impl FacadeError {
    pub fn to_json(&self) -> Value {
        match &self.details {
            Some(details) => json!({ "success": false, "error": self.error, "details": details }),
            None => json!({ "success": false, "error": self.error }),
        }
    }
}

impl std::fmt::Display for FacadeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl std::error::Error for FacadeError {}

impl From<OrchError> for FacadeError {
    fn from(err: OrchError) -> Self {
        let details = match &err {
            OrchError::Validation(errors) => Some(json!(errors)),
            _ => None,
        };
        Self { error: err.to_string(), details }
    }
}
