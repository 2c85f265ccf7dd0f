//! # Reconciler
//!
//! Top-level orchestrator. Mount and state-update requests become scheduler
//! tasks; every completed task is diffed against the committed tree, handed
//! to the host and then promoted to the committed tree.
//!
//! Dispatchers created during renders publish on a channel owned by the
//! reconciler. Requests are picked up by [`Reconciler::flush`] or by the
//! async driver [`Reconciler::run_until_idle`], which also honours the
//! scheduler's deferred tick delays.

use crate::clock::{Clock, SystemClock};
use crate::config::ReconcilerConfig;
use crate::diff::diff_trees;
use crate::element::Component;
use crate::error::{ReconcileError, ReconcileResult};
use crate::host::HostSync;
use crate::hooks::{Effect, TransitionId, UpdateRequest};
use crate::scheduler::{CompletedTask, Scheduler, TaskKind};
use crate::work_unit::WorkTree;
use std::fmt;
use std::rc::Rc;
use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver, UnboundedSender};
use tracing::{debug, error, info, instrument, warn};

/// Summary of one commit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitReport {
    pub kind: TaskKind,
    /// Nodes the host had to (re)apply. Removed nodes are not included.
    pub dirty: usize,
    /// Committed nodes the host dropped because the new tree has no
    /// counterpart for them
    pub removed: usize,
    /// Work units in the committed tree
    pub units: usize,
}

pub struct Reconciler<H: HostSync> {
    scheduler: Scheduler,
    host: H,
    committed: Option<WorkTree>,
    /// Unit showing its pending state in the committed tree
    pending_target: Option<TransitionId>,
    updates_tx: UnboundedSender<UpdateRequest>,
    updates_rx: UnboundedReceiver<UpdateRequest>,
}

impl<H: HostSync> Reconciler<H> {
    pub fn new(host: H) -> Self {
        Self::with_config(host, ReconcilerConfig::default())
    }

    pub fn with_config(host: H, config: ReconcilerConfig) -> Self {
        Self::with_clock(host, config, Rc::new(SystemClock))
    }

    pub fn with_clock(host: H, config: ReconcilerConfig, clock: Rc<dyn Clock>) -> Self {
        let (updates_tx, updates_rx) = mpsc::unbounded_channel();

        Self {
            scheduler: Scheduler::with_clock(config.scheduler, clock),
            host,
            committed: None,
            pending_target: None,
            updates_tx,
            updates_rx,
        }
    }

    /// Schedule the first render of `component` as the root
    #[instrument(skip_all, fields(component = component.name()))]
    pub fn mount(&mut self, component: Component) -> ReconcileResult<()> {
        let tree = WorkTree::create_root(component, self.updates_tx.clone());
        self.scheduler.schedule(tree, Vec::new(), None)
    }

    /// Schedule a render of a copy of the committed tree with `effect` applied
    #[instrument(skip_all, fields(key = %effect.key, transition = ?transition))]
    pub fn request_state_update(
        &mut self,
        effect: Effect,
        transition: Option<TransitionId>,
    ) -> ReconcileResult<()> {
        let Some(committed) = &self.committed else {
            error!("State update requested before the first commit");
            return Err(ReconcileError::NoCommittedTree);
        };

        let mut work_in_progress = committed.copy()?;
        work_in_progress.set_active(effect.key.clone());
        // The committed output of a pending target is not a function of its
        // committed state, so it renders again rather than being spliced.
        if let Some(target) = &self.pending_target {
            work_in_progress.invalidate(target.as_str());
        }

        self.scheduler
            .schedule(work_in_progress, vec![effect], transition)
            .map_err(|e| {
                error!(error = %e, "Rejected state update");
                e
            })
    }

    pub fn dispatch(&mut self, request: UpdateRequest) -> ReconcileResult<()> {
        self.request_state_update(request.effect, request.transition)
    }

    /// Dispatch every request already waiting on the update channel
    pub fn drain_updates(&mut self) -> ReconcileResult<usize> {
        let mut count = 0;
        loop {
            match self.updates_rx.try_recv() {
                Ok(request) => {
                    self.dispatch(request)?;
                    count += 1;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        Ok(count)
    }

    /// Run one scheduler work call, committing the task if it completed
    pub fn work(&mut self) -> ReconcileResult<Option<CommitReport>> {
        match self.scheduler.work()? {
            Some(completed) => self.commit(completed).map(Some),
            None => Ok(None),
        }
    }

    /// Work synchronously until no request or task is left, ignoring tick
    /// delays.
    pub fn flush(&mut self) -> ReconcileResult<Vec<CommitReport>> {
        let mut reports = Vec::new();
        loop {
            self.drain_updates()?;
            if self.scheduler.is_idle() {
                break;
            }
            if let Some(report) = self.work()? {
                reports.push(report);
            }
        }
        Ok(reports)
    }

    /// Service update requests and deferred ticks until nothing is left.
    ///
    /// Requests are always taken before the next tick fires, so an update
    /// that arrives while a transition is yielding aborts it.
    pub async fn run_until_idle(&mut self) -> ReconcileResult<Vec<CommitReport>> {
        let mut reports = Vec::new();

        loop {
            let Some(delay) = self.scheduler.armed_tick() else {
                match self.updates_rx.try_recv() {
                    Ok(request) => {
                        self.dispatch(request)?;
                        continue;
                    }
                    Err(_) => break,
                }
            };

            tokio::select! {
                biased;
                Some(request) = self.updates_rx.recv() => {
                    self.dispatch(request)?;
                }
                _ = tokio::time::sleep(delay) => {
                    if let Some(report) = self.work()? {
                        reports.push(report);
                    }
                }
            }
        }

        debug!(commits = reports.len(), "Idle");
        Ok(reports)
    }

    /// Diff, apply to the host, then promote the finished tree
    #[instrument(skip_all, fields(kind = %completed.kind))]
    fn commit(&mut self, completed: CompletedTask) -> ReconcileResult<CommitReport> {
        let CompletedTask {
            kind,
            mut tree,
            transition,
        } = completed;

        let previous = self.committed.as_ref().map(WorkTree::output);
        let summary = diff_trees(previous, tree.output_mut());

        if let Err(e) = self.host.apply(tree.output()) {
            error!(error = %e, "Host rejected patch; committed tree unchanged");
            return Err(ReconcileError::Host(e.to_string()));
        }

        tree.output_mut().clear_dirty();
        tree.commit_pending();

        let report = CommitReport {
            kind,
            dirty: summary.dirty,
            removed: summary.removed,
            units: tree.len(),
        };
        self.committed = Some(tree);
        self.pending_target = match kind {
            TaskKind::UrgentPending => transition,
            TaskKind::Urgent | TaskKind::Transition => None,
        };
        info!(
            dirty = report.dirty,
            removed = report.removed,
            units = report.units,
            "Committed"
        );

        // The transition after a pending pass keeps the snapshot it was
        // requested against, so it never inherits the pending output.
        if kind != TaskKind::UrgentPending {
            if let Some(committed) = &self.committed {
                if let Err(e) = self.scheduler.rebase_unstarted(committed) {
                    warn!(error = %e, "Could not rebase queued tasks");
                }
            }
        }

        Ok(report)
    }

    pub fn committed(&self) -> Option<&WorkTree> {
        self.committed.as_ref()
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Sender for requests issued outside of a render
    pub fn updates(&self) -> UnboundedSender<UpdateRequest> {
        self.updates_tx.clone()
    }
}

impl<H: HostSync + fmt::Debug> fmt::Debug for Reconciler<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reconciler")
            .field("scheduler", &self.scheduler)
            .field("host", &self.host)
            .field("committed", &self.committed)
            .finish()
    }
}
