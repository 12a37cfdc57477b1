//! Engine configuration

use serde::{Deserialize, Serialize};

/// Tunables for [`WorkflowEngine`](crate::engine::WorkflowEngine)
///
/// Every field has a default, so a partial JSON object is a valid config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// Prefix of generated run ids
    pub run_id_prefix: String,
    /// Maximum rows copied into a table dashboard item
    pub dashboard_row_limit: usize,
    /// Stop a full-graph run at the first failure instead of continuing
    /// with independent branches
    pub halt_on_failure: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            run_id_prefix: "run".to_string(),
            dashboard_row_limit: 100,
            halt_on_failure: false,
        }
    }
}

impl EngineConfig {
    /// Parse from JSON, filling absent fields with defaults
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn with_dashboard_row_limit(mut self, limit: usize) -> Self {
        self.dashboard_row_limit = limit;
        self
    }

    pub fn with_halt_on_failure(mut self, halt: bool) -> Self {
        self.halt_on_failure = halt;
        self
    }

    /// Fresh run id: `{prefix}-{uuid}`
    pub fn next_run_id(&self) -> String {
        format!("{}-{}", self.run_id_prefix, uuid::Uuid::new_v4())
    }
}
