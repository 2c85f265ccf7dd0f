use crate::error::{ReconcileError, ReconcileResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_CONFIG_NAME: &str = "arbor.config.json";

/// How the time-slice budget is measured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BudgetMode {
    /// Elapsed time accumulates from the first unit of a task. Once the
    /// budget is spent, every remaining unit runs on its own tick.
    #[default]
    PerTask,
    /// Elapsed time restarts after every yield, so each slice gets a full budget.
    PerSlice,
}

/// Scheduler tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SchedulerConfig {
    /// Work time allowed before the scheduler yields
    pub time_budget_ms: u64,

    /// Delay of the tick that starts a newly in-flight task
    pub tick_delay_ms: u64,

    /// Delay of the tick armed when yielding mid-task
    pub yield_delay_ms: u64,

    pub budget_mode: BudgetMode,
}

impl SchedulerConfig {
    pub fn time_budget(&self) -> Duration {
        Duration::from_millis(self.time_budget_ms)
    }

    pub fn tick_delay(&self) -> Duration {
        Duration::from_millis(self.tick_delay_ms)
    }

    pub fn yield_delay(&self) -> Duration {
        Duration::from_millis(self.yield_delay_ms)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            time_budget_ms: 50,
            tick_delay_ms: 10,
            yield_delay_ms: 0,
            budget_mode: BudgetMode::PerTask,
        }
    }
}

/// Reconciler configuration file format
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcilerConfig {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

impl ReconcilerConfig {
    pub fn from_json_str(json: &str) -> ReconcileResult<Self> {
        serde_json::from_str(json).map_err(ReconcileError::Config)
    }

    /// Load `arbor.config.json` from a directory, falling back to defaults
    pub fn load(dir: impl AsRef<Path>) -> ReconcileResult<Self> {
        let config_path = dir.as_ref().join(DEFAULT_CONFIG_NAME);

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            Self::from_json_str(&content)
        } else {
            Ok(Self::default())
        }
    }
}
