//! # arbor-reconciler
//!
//! Incremental UI reconciliation with a cooperative, time-sliced scheduler.
//!
//! ```text
//! mount / dispatch
//!        │
//!        ▼
//! ┌─────────────┐  copy()   ┌─────────────┐  work()   ┌─────────────┐
//! │ Reconciler  │──────────▶│  Scheduler  │──────────▶│  WorkTree   │
//! │ (committed) │           │ (FIFO tasks)│           │ (units)     │
//! └─────────────┘           └─────────────┘           └─────────────┘
//!        ▲                         │ completed task
//!        │ commit                  ▼
//!        │                  ┌─────────────┐  apply()  ┌─────────────┐
//!        └──────────────────│ diff_trees  │──────────▶│  HostSync   │
//!                           └─────────────┘           └─────────────┘
//! ```
//!
//! Components describe their output as [`Element`]s. Each component
//! instance is a [`WorkUnit`]; rendering a unit produces an [`OutputNode`]
//! subtree that is spliced into the tree-wide output by key. Finished trees
//! are diffed against the committed one and only dirty nodes need host work.

pub mod clock;
pub mod config;
pub mod diff;
pub mod element;
pub mod error;
pub mod hooks;
pub mod host;
pub mod output;
pub mod reconciler;
pub mod scheduler;
pub mod work_unit;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{BudgetMode, ReconcilerConfig, SchedulerConfig};
pub use diff::{compare, count_removed, diff_trees, DiffSummary};
pub use element::{Children, Component, Element, Props};
pub use error::{ReconcileError, ReconcileResult};
pub use hooks::{
    Dispatcher, Effect, RenderContext, StartTransition, StatePatch, TransitionId,
    TransitionScope, UpdateRequest,
};
pub use host::HostSync;
pub use output::{Handler, OutputNode, FRAGMENT_TAG};
pub use reconciler::{CommitReport, Reconciler};
pub use scheduler::{CompletedTask, ScheduleTask, Scheduler, TaskKind};
pub use work_unit::{UnitId, WorkTree, WorkUnit, ROOT_KEY};
