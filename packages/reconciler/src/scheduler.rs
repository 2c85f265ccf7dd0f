//! # Scheduler
//!
//! Cooperative task queue that walks a [`WorkTree`] one unit at a time.
//!
//! At most one task is in flight; the rest wait in FIFO order. Work never
//! runs inside [`Scheduler::schedule`]: starting a task only arms a deferred
//! tick, and the driver calls [`Scheduler::work`] once the tick's delay has
//! passed. A work call keeps rendering units synchronously until the task
//! completes or the time budget is spent, in which case it arms a new tick
//! and returns.
//!
//! ## Priorities
//!
//! - `Urgent` tasks are never aborted.
//! - A request carrying a transition id becomes two tasks: an
//!   `UrgentPending` pass over a copy of the tree that re-renders only the
//!   transition's unit with the pending flag set, then the `Transition` task
//!   that applies the real state change.
//! - Any new request aborts every in-flight or queued non-urgent task.

use crate::clock::{Clock, SystemClock};
use crate::config::{BudgetMode, SchedulerConfig};
use crate::error::{ReconcileError, ReconcileResult};
use crate::hooks::{Effect, StatePatch, TransitionId};
use crate::work_unit::{UnitId, WorkTree};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::rc::Rc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, instrument, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Urgent,
    UrgentPending,
    Transition,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskKind::Urgent => "urgent",
            TaskKind::UrgentPending => "urgent-pending",
            TaskKind::Transition => "transition",
        };
        f.write_str(name)
    }
}

/// One render request, in flight or queued
pub struct ScheduleTask {
    kind: TaskKind,
    tree: WorkTree,
    cursor: UnitId,
    effects: HashMap<String, Vec<StatePatch>>,
    transition: Option<TransitionId>,
    started_at: Option<Instant>,
}

impl ScheduleTask {
    fn new(
        kind: TaskKind,
        tree: WorkTree,
        effects: HashMap<String, Vec<StatePatch>>,
        transition: Option<TransitionId>,
    ) -> Self {
        Self {
            kind,
            cursor: tree.root(),
            tree,
            effects,
            transition,
            started_at: None,
        }
    }

    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    pub fn transition(&self) -> Option<&TransitionId> {
        self.transition.as_ref()
    }

    /// Render the unit under the cursor after applying its queued effects
    fn step(&mut self) -> ReconcileResult<()> {
        let cursor = self.cursor;
        let key = self
            .tree
            .unit(cursor)
            .map(|unit| unit.key().to_string())
            .ok_or_else(|| ReconcileError::UnknownUnit {
                key: format!("{:?}", cursor),
            })?;

        if let Some(patches) = self.effects.remove(&key) {
            for patch in &patches {
                self.tree.apply_patch(cursor, patch)?;
            }
            trace!(key = %key, count = patches.len(), "Applied effects");
        }

        match self.kind {
            TaskKind::UrgentPending => {
                let is_target = self
                    .transition
                    .as_ref()
                    .is_some_and(|id| id.as_str() == key);
                let invalidated = self.tree.unit(cursor).is_some_and(|unit| !unit.has_rendered());
                if is_target {
                    self.tree.render(cursor, true)?;
                } else if invalidated {
                    self.tree.render(cursor, false)?;
                } else {
                    self.tree.splice(cursor)?;
                }
            }
            TaskKind::Urgent | TaskKind::Transition => {
                self.tree.render(cursor, false)?;
            }
        }

        Ok(())
    }
}

impl fmt::Debug for ScheduleTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduleTask")
            .field("kind", &self.kind)
            .field("cursor", &self.tree.unit(self.cursor).map(|u| u.key()))
            .field("effects", &self.effects.len())
            .field("transition", &self.transition)
            .finish()
    }
}

/// A task whose traversal finished
#[derive(Debug)]
pub struct CompletedTask {
    pub kind: TaskKind,
    pub tree: WorkTree,
    /// Unit whose pending state a finished pending pass shows
    pub transition: Option<TransitionId>,
}

pub struct Scheduler {
    queue: VecDeque<ScheduleTask>,
    current: Option<ScheduleTask>,
    /// Delay of the armed deferred tick, if any
    tick: Option<Duration>,
    config: SchedulerConfig,
    clock: Rc<dyn Clock>,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self::with_clock(config, Rc::new(SystemClock))
    }

    pub fn with_clock(config: SchedulerConfig, clock: Rc<dyn Clock>) -> Self {
        Self {
            queue: VecDeque::new(),
            current: None,
            tick: None,
            config,
            clock,
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Queue a render of `tree`.
    ///
    /// Effects and the transition id are validated against the tree before
    /// anything is aborted, so a rejected request leaves the queue untouched.
    #[instrument(skip_all, fields(transition = ?transition, effects = effects.len()))]
    pub fn schedule(
        &mut self,
        tree: WorkTree,
        effects: Vec<Effect>,
        transition: Option<TransitionId>,
    ) -> ReconcileResult<()> {
        for effect in &effects {
            if tree.find_unit(&effect.key).is_none() {
                return Err(ReconcileError::UnknownUnit {
                    key: effect.key.clone(),
                });
            }
        }
        if let Some(id) = &transition {
            if id.as_str().is_empty() || tree.find_unit(id.as_str()).is_none() {
                return Err(ReconcileError::UnresolvedTransition {
                    key: id.to_string(),
                });
            }
        }

        let mut effect_map: HashMap<String, Vec<StatePatch>> = HashMap::new();
        for effect in effects {
            effect_map.entry(effect.key).or_default().push(effect.patch);
        }

        self.abort_non_urgent();

        match transition {
            Some(id) => {
                let pending_tree = tree.copy()?;
                self.enqueue(ScheduleTask::new(
                    TaskKind::UrgentPending,
                    pending_tree,
                    HashMap::new(),
                    Some(id),
                ));
                self.enqueue(ScheduleTask::new(TaskKind::Transition, tree, effect_map, None));
            }
            None => {
                self.enqueue(ScheduleTask::new(TaskKind::Urgent, tree, effect_map, None));
            }
        }

        Ok(())
    }

    /// Run units of the in-flight task until it completes or yields.
    ///
    /// Returns the finished tree when the traversal completed. A failing
    /// unit drops its task and the error is returned.
    pub fn work(&mut self) -> ReconcileResult<Option<CompletedTask>> {
        self.tick = None;
        if self.current.is_none() {
            self.current = self.queue.pop_front();
        }

        let budget = self.config.time_budget();
        let Some(task) = self.current.as_mut() else {
            return Ok(None);
        };

        loop {
            task.started_at.get_or_insert_with(|| self.clock.now());

            if let Err(e) = task.step() {
                error!(kind = %task.kind, error = %e, "Aborting task after failed step");
                self.current = None;
                self.start_next();
                return Err(e);
            }

            let Some(next) = task.tree.next(task.cursor) else {
                let completed = self.current.take().map(|task| CompletedTask {
                    kind: task.kind,
                    tree: task.tree,
                    transition: task.transition,
                });
                if let Some(completed) = &completed {
                    info!(kind = %completed.kind, units = completed.tree.len(), "Render complete");
                }
                self.start_next();
                return Ok(completed);
            };
            task.cursor = next;

            let elapsed = task
                .started_at
                .map(|start| self.clock.now().saturating_duration_since(start))
                .unwrap_or_default();
            if elapsed > budget {
                if self.config.budget_mode == BudgetMode::PerSlice {
                    task.started_at = None;
                }
                debug!(kind = %task.kind, elapsed_ms = elapsed.as_millis() as u64, "Yielding");
                self.tick = Some(self.config.yield_delay());
                return Ok(None);
            }
        }
    }

    /// Re-copy tasks that have not run a unit yet from a newer committed tree.
    ///
    /// Such a task was copied before an earlier task committed and would
    /// otherwise commit over that task's changes. When its effects or
    /// transition target no longer exist in `committed` the task is dropped.
    pub fn rebase_unstarted(&mut self, committed: &WorkTree) -> ReconcileResult<usize> {
        let resolves = |task: &ScheduleTask| {
            task.started_at.is_some()
                || (task.effects.keys().all(|key| committed.find_unit(key).is_some())
                    && task
                        .transition
                        .as_ref()
                        .map_or(true, |id| committed.find_unit(id.as_str()).is_some()))
        };

        if self.current.as_ref().is_some_and(|task| !resolves(task)) {
            if let Some(task) = self.current.take() {
                warn!(kind = %task.kind, "Dropped task whose target left the committed tree");
            }
        }
        self.queue.retain(|task| {
            let keep = resolves(task);
            if !keep {
                warn!(kind = %task.kind, "Dropped task whose target left the committed tree");
            }
            keep
        });
        if self.current.is_none() {
            self.start_next();
        }

        let mut rebased = 0;
        for task in self.current.iter_mut().chain(self.queue.iter_mut()) {
            if task.started_at.is_some() {
                continue;
            }

            let mut tree = committed.copy()?;
            if let Some(key) = task.tree.active_key() {
                tree.set_active(key.to_string());
            }
            task.cursor = tree.root();
            task.tree = tree;
            rebased += 1;
        }

        if rebased > 0 {
            debug!(rebased, "Rebased unstarted tasks");
        }
        Ok(rebased)
    }

    /// Delay of the armed deferred tick
    pub fn armed_tick(&self) -> Option<Duration> {
        self.tick
    }

    pub fn is_idle(&self) -> bool {
        self.current.is_none() && self.queue.is_empty()
    }

    pub fn current_kind(&self) -> Option<TaskKind> {
        self.current.as_ref().map(ScheduleTask::kind)
    }

    pub fn queued_kinds(&self) -> Vec<TaskKind> {
        self.queue.iter().map(ScheduleTask::kind).collect()
    }

    fn enqueue(&mut self, task: ScheduleTask) {
        debug!(kind = %task.kind, "Enqueue task");
        if self.current.is_none() {
            self.current = Some(task);
            self.tick = Some(self.config.tick_delay());
        } else {
            self.queue.push_back(task);
        }
    }

    fn start_next(&mut self) {
        if self.current.is_none() {
            self.current = self.queue.pop_front();
        }
        self.tick = self
            .current
            .as_ref()
            .map(|_| self.config.tick_delay());
    }

    fn abort_non_urgent(&mut self) {
        if self
            .current
            .as_ref()
            .is_some_and(|task| task.kind != TaskKind::Urgent)
        {
            self.abort_current();
        }

        let queued = self.queue.len();
        self.queue.retain(|task| task.kind == TaskKind::Urgent);
        if self.queue.len() != queued {
            debug!(dropped = queued - self.queue.len(), "Dropped queued non-urgent tasks");
        }

        if self.current.is_none() && !self.queue.is_empty() {
            self.start_next();
        }
    }

    fn abort_current(&mut self) {
        if let Some(task) = self.current.take() {
            info!(kind = %task.kind, "Aborted task");
        }
        self.tick = None;
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("current", &self.current)
            .field("queue", &self.queue)
            .field("tick", &self.tick)
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::element::{Component, Element};
    use crate::hooks::UpdateRequest;
    use serde_json::Value;
    use std::cell::RefCell;
    use tokio::sync::mpsc::{self, UnboundedSender};

    type Log = Rc<RefCell<Vec<(String, bool)>>>;

    /// Root with two children; every render is logged with its pending flag
    fn logged_app(log: &Log) -> Component {
        let child = {
            let log = log.clone();
            Component::new("Child", move |cx, _| {
                log.borrow_mut().push((cx.key().to_string(), cx.is_transition_pending()));
                let (n, _) = cx.use_state(0i64)?;
                Ok(Element::intrinsic("span").with_text(n.to_string()))
            })
        };
        let log = log.clone();
        Component::new("App", move |cx, _| {
            log.borrow_mut().push((cx.key().to_string(), cx.is_transition_pending()));
            let (n, _) = cx.use_state(0i64)?;
            Ok(Element::intrinsic("div")
                .with_attr("data-count", n.to_string())
                .with_children([Element::component(&child), Element::component(&child)]))
        })
    }

    fn committed_tree(component: Component, tx: UnboundedSender<UpdateRequest>) -> WorkTree {
        let mut scheduler = Scheduler::new(SchedulerConfig::default());
        scheduler
            .schedule(WorkTree::create_root(component, tx), vec![], None)
            .unwrap();
        let mut tree = drain(&mut scheduler).pop().unwrap().tree;
        tree.commit_pending();
        tree
    }

    fn drain(scheduler: &mut Scheduler) -> Vec<CompletedTask> {
        let mut completed = Vec::new();
        while !scheduler.is_idle() {
            if let Some(task) = scheduler.work().unwrap() {
                completed.push(task);
            }
        }
        completed
    }

    fn effect(key: &str, value: i64) -> Effect {
        Effect {
            key: key.to_string(),
            patch: StatePatch {
                slot: 0,
                value: Value::from(value),
            },
        }
    }

    #[test]
    fn test_schedule_arms_tick_without_working() {
        let log = Log::default();
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut scheduler = Scheduler::new(SchedulerConfig::default());

        scheduler
            .schedule(WorkTree::create_root(logged_app(&log), tx), vec![], None)
            .unwrap();

        assert_eq!(scheduler.armed_tick(), Some(Duration::from_millis(10)));
        assert_eq!(scheduler.current_kind(), Some(TaskKind::Urgent));
        assert!(log.borrow().is_empty(), "Scheduling must not render synchronously");

        let completed = scheduler.work().unwrap().expect("small tree completes in one call");
        assert_eq!(completed.kind, TaskKind::Urgent);
        assert_eq!(log.borrow().len(), 3);
        assert!(scheduler.is_idle());
        assert_eq!(scheduler.armed_tick(), None);
    }

    #[test]
    fn test_tasks_serialize_fifo() {
        let log = Log::default();
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut scheduler = Scheduler::new(SchedulerConfig::default());

        for _ in 0..3 {
            scheduler
                .schedule(WorkTree::create_root(logged_app(&log), tx.clone()), vec![], None)
                .unwrap();
        }
        assert_eq!(scheduler.queued_kinds().len(), 2);

        let first = scheduler.work().unwrap();
        assert!(first.is_some());
        assert_eq!(log.borrow().len(), 3, "Only the in-flight task ran");
        assert_eq!(scheduler.armed_tick(), Some(Duration::from_millis(10)));

        assert_eq!(drain(&mut scheduler).len(), 2);
    }

    #[test]
    fn test_effects_apply_before_target_renders() {
        let log = Log::default();
        let (tx, _rx) = mpsc::unbounded_channel();
        let committed = committed_tree(logged_app(&log), tx);
        log.borrow_mut().clear();

        let mut scheduler = Scheduler::new(SchedulerConfig::default());
        scheduler
            .schedule(committed.copy().unwrap(), vec![effect("__root__/1", 4)], None)
            .unwrap();
        let done = drain(&mut scheduler).pop().unwrap();

        assert_eq!(*log.borrow(), vec![("__root__/1".to_string(), false)]);
        assert_eq!(done.tree.output().find("__root__/1").unwrap().text.as_deref(), Some("4"));
    }

    #[test]
    fn test_unknown_effect_target_rejected() {
        let log = Log::default();
        let (tx, _rx) = mpsc::unbounded_channel();
        let committed = committed_tree(logged_app(&log), tx);
        let mut scheduler = Scheduler::new(SchedulerConfig::default());

        let err = scheduler
            .schedule(committed.copy().unwrap(), vec![effect("nope", 1)], None)
            .unwrap_err();
        assert!(matches!(err, ReconcileError::UnknownUnit { .. }));

        let err = scheduler
            .schedule(committed.copy().unwrap(), vec![], Some(TransitionId::new("")))
            .unwrap_err();
        assert!(matches!(err, ReconcileError::UnresolvedTransition { .. }));
        assert!(scheduler.is_idle());
    }

    #[test]
    fn test_transition_runs_pending_pass_first() {
        let log = Log::default();
        let (tx, _rx) = mpsc::unbounded_channel();
        let committed = committed_tree(logged_app(&log), tx);
        log.borrow_mut().clear();

        let mut scheduler = Scheduler::new(SchedulerConfig::default());
        scheduler
            .schedule(
                committed.copy().unwrap(),
                vec![effect("__root__", 1)],
                Some(TransitionId::new("__root__")),
            )
            .unwrap();
        assert_eq!(scheduler.current_kind(), Some(TaskKind::UrgentPending));
        assert_eq!(scheduler.queued_kinds(), vec![TaskKind::Transition]);

        let completed = drain(&mut scheduler);
        let kinds: Vec<TaskKind> = completed.iter().map(|c| c.kind).collect();
        assert_eq!(kinds, vec![TaskKind::UrgentPending, TaskKind::Transition]);

        assert_eq!(
            *log.borrow(),
            vec![("__root__".to_string(), true), ("__root__".to_string(), false)],
            "Only the target renders in the pending pass, then the real update"
        );

        let pending = &completed[0].tree;
        assert_eq!(
            pending.output().attributes.get("data-count").map(String::as_str),
            Some("0"),
            "State change not applied while pending"
        );
        assert_eq!(pending.output().children.len(), 2, "Pending tree keeps its children");
        assert_eq!(
            completed[1].tree.output().attributes.get("data-count").map(String::as_str),
            Some("1")
        );
    }

    #[test]
    fn test_urgent_is_not_preempted_by_transition() {
        let log = Log::default();
        let (tx, _rx) = mpsc::unbounded_channel();
        let committed = committed_tree(logged_app(&log), tx);
        let mut scheduler = Scheduler::new(SchedulerConfig::default());

        scheduler
            .schedule(committed.copy().unwrap(), vec![effect("__root__", 1)], None)
            .unwrap();
        scheduler
            .schedule(
                committed.copy().unwrap(),
                vec![effect("__root__", 2)],
                Some(TransitionId::new("__root__")),
            )
            .unwrap();

        assert_eq!(scheduler.current_kind(), Some(TaskKind::Urgent));
        assert_eq!(
            scheduler.queued_kinds(),
            vec![TaskKind::UrgentPending, TaskKind::Transition]
        );
        assert_eq!(drain(&mut scheduler).len(), 3);
    }

    #[test]
    fn test_any_request_aborts_transition() {
        let log = Log::default();
        let (tx, _rx) = mpsc::unbounded_channel();
        let committed = committed_tree(logged_app(&log), tx);
        log.borrow_mut().clear();
        let mut scheduler = Scheduler::new(SchedulerConfig::default());

        scheduler
            .schedule(
                committed.copy().unwrap(),
                vec![effect("__root__", 2)],
                Some(TransitionId::new("__root__")),
            )
            .unwrap();
        scheduler
            .schedule(committed.copy().unwrap(), vec![effect("__root__/0", 5)], None)
            .unwrap();

        assert_eq!(scheduler.current_kind(), Some(TaskKind::Urgent));
        assert!(scheduler.queued_kinds().is_empty());

        let completed = drain(&mut scheduler);
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].kind, TaskKind::Urgent);
        assert!(
            log.borrow().iter().all(|(_, pending)| !pending),
            "Aborted pending pass never rendered"
        );
    }

    #[test]
    fn test_transition_aborts_queued_transition() {
        let log = Log::default();
        let (tx, _rx) = mpsc::unbounded_channel();
        let committed = committed_tree(logged_app(&log), tx);
        let mut scheduler = Scheduler::new(SchedulerConfig::default());
        let id = TransitionId::new("__root__");

        scheduler
            .schedule(committed.copy().unwrap(), vec![effect("__root__", 1)], Some(id.clone()))
            .unwrap();
        scheduler
            .schedule(committed.copy().unwrap(), vec![effect("__root__", 2)], Some(id))
            .unwrap();

        let completed = drain(&mut scheduler);
        let kinds: Vec<TaskKind> = completed.iter().map(|c| c.kind).collect();
        assert_eq!(kinds, vec![TaskKind::UrgentPending, TaskKind::Transition]);
        assert_eq!(
            completed[1].tree.output().attributes.get("data-count").map(String::as_str),
            Some("2")
        );
    }

    fn slow_app(clock: &Rc<ManualClock>, per_render: Duration) -> Component {
        let leaf = {
            let clock = clock.clone();
            Component::new("Slow", move |_, _| {
                clock.advance(per_render);
                Ok(Element::intrinsic("i"))
            })
        };
        Component::new("List", move |_, _| {
            Ok(Element::intrinsic("div").with_children((0..4).map(|_| Element::component(&leaf))))
        })
    }

    #[test]
    fn test_time_slicing_yields_after_budget() {
        let clock = Rc::new(ManualClock::new());
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut scheduler =
            Scheduler::with_clock(SchedulerConfig::default(), clock.clone());

        scheduler
            .schedule(
                WorkTree::create_root(slow_app(&clock, Duration::from_millis(30)), tx),
                vec![],
                None,
            )
            .unwrap();

        // root (0ms), child 1 (30ms), child 2 (60ms > 50ms) then yield
        assert!(scheduler.work().unwrap().is_none());
        assert_eq!(scheduler.armed_tick(), Some(Duration::ZERO));

        // Per-task budget stays spent: one unit per call from here on
        assert!(scheduler.work().unwrap().is_none());
        let done = scheduler.work().unwrap().expect("last unit completes the task");
        assert_eq!(done.tree.len(), 5);
        assert_eq!(clock.elapsed(), Duration::from_millis(120));
    }

    #[test]
    fn test_per_slice_budget_resets_after_yield() {
        let clock = Rc::new(ManualClock::new());
        let (tx, _rx) = mpsc::unbounded_channel();
        let config = SchedulerConfig {
            budget_mode: BudgetMode::PerSlice,
            ..SchedulerConfig::default()
        };
        let mut scheduler = Scheduler::with_clock(config, clock.clone());

        scheduler
            .schedule(
                WorkTree::create_root(slow_app(&clock, Duration::from_millis(30)), tx),
                vec![],
                None,
            )
            .unwrap();

        assert!(scheduler.work().unwrap().is_none(), "First slice: root, 1, 2");
        let done = scheduler.work().unwrap();
        assert!(done.is_some(), "Second slice fits children 3 and 4");
    }

    #[test]
    fn test_failed_step_drops_task_and_starts_next() {
        let failing = Component::new("Failing", |cx, _| {
            Err(ReconcileError::Render {
                key: cx.key().to_string(),
                message: "boom".to_string(),
            })
        });
        let log = Log::default();
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut scheduler = Scheduler::new(SchedulerConfig::default());

        scheduler
            .schedule(WorkTree::create_root(failing, tx.clone()), vec![], None)
            .unwrap();
        scheduler
            .schedule(WorkTree::create_root(logged_app(&log), tx), vec![], None)
            .unwrap();

        assert!(scheduler.work().is_err());
        assert_eq!(scheduler.current_kind(), Some(TaskKind::Urgent));
        assert_eq!(scheduler.armed_tick(), Some(Duration::from_millis(10)));
        assert!(scheduler.work().unwrap().is_some());
    }

    #[test]
    fn test_rebase_keeps_earlier_commit() {
        let log = Log::default();
        let (tx, _rx) = mpsc::unbounded_channel();
        let committed = committed_tree(logged_app(&log), tx);
        let mut scheduler = Scheduler::new(SchedulerConfig::default());

        scheduler
            .schedule(committed.copy().unwrap(), vec![effect("__root__/0", 1)], None)
            .unwrap();
        scheduler
            .schedule(committed.copy().unwrap(), vec![effect("__root__/1", 2)], None)
            .unwrap();

        let mut first = scheduler.work().unwrap().unwrap().tree;
        first.commit_pending();
        assert_eq!(scheduler.rebase_unstarted(&first).unwrap(), 1);

        let second = scheduler.work().unwrap().unwrap().tree;
        let output = second.output();
        assert_eq!(output.find("__root__/0").unwrap().text.as_deref(), Some("1"));
        assert_eq!(output.find("__root__/1").unwrap().text.as_deref(), Some("2"));
    }

    /// Root that shows a child counter until its `show` flag is cleared
    fn toggled_app() -> Component {
        let child = Component::new("Child", |cx, _| {
            let (n, _) = cx.use_state(0i64)?;
            Ok(Element::intrinsic("span").with_text(n.to_string()))
        });
        Component::new("Toggled", move |cx, _| {
            let (show, _) = cx.use_state(true)?;
            let children = if show { vec![Element::component(&child)] } else { Vec::new() };
            Ok(Element::intrinsic("div").with_children(children))
        })
    }

    #[test]
    fn test_rebase_drops_task_whose_target_was_removed() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let committed = committed_tree(toggled_app(), tx);
        assert!(committed.find_unit("__root__/0").is_some());
        let mut scheduler = Scheduler::new(SchedulerConfig::default());

        let hide = Effect {
            key: "__root__".to_string(),
            patch: StatePatch {
                slot: 0,
                value: Value::Bool(false),
            },
        };
        scheduler
            .schedule(committed.copy().unwrap(), vec![hide], None)
            .unwrap();
        scheduler
            .schedule(committed.copy().unwrap(), vec![effect("__root__/0", 5)], None)
            .unwrap();

        let mut first = scheduler.work().unwrap().unwrap().tree;
        first.commit_pending();
        assert!(first.find_unit("__root__/0").is_none());
        assert_eq!(scheduler.current_kind(), Some(TaskKind::Urgent));

        assert_eq!(scheduler.rebase_unstarted(&first).unwrap(), 0);
        assert!(scheduler.is_idle(), "The stale update must not commit the old tree");
        assert_eq!(scheduler.armed_tick(), None);
    }

    #[test]
    fn test_rebase_starts_next_after_dropping_current() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let committed = committed_tree(toggled_app(), tx);
        let mut scheduler = Scheduler::new(SchedulerConfig::default());

        let hide = Effect {
            key: "__root__".to_string(),
            patch: StatePatch {
                slot: 0,
                value: Value::Bool(false),
            },
        };
        let show = Effect {
            key: "__root__".to_string(),
            patch: StatePatch {
                slot: 0,
                value: Value::Bool(true),
            },
        };
        scheduler
            .schedule(committed.copy().unwrap(), vec![hide], None)
            .unwrap();
        scheduler
            .schedule(committed.copy().unwrap(), vec![effect("__root__/0", 5)], None)
            .unwrap();
        scheduler
            .schedule(committed.copy().unwrap(), vec![show], None)
            .unwrap();

        let mut first = scheduler.work().unwrap().unwrap().tree;
        first.commit_pending();
        assert_eq!(scheduler.rebase_unstarted(&first).unwrap(), 1);
        assert_eq!(scheduler.current_kind(), Some(TaskKind::Urgent));
        assert!(scheduler.queued_kinds().is_empty());
        assert_eq!(scheduler.armed_tick(), Some(Duration::from_millis(10)));

        let last = scheduler.work().unwrap().unwrap().tree;
        assert_eq!(
            last.output().find("__root__/0").unwrap().text.as_deref(),
            Some("0"),
            "The child comes back with fresh state"
        );
    }

    #[test]
    fn test_rebase_skips_started_task() {
        let clock = Rc::new(ManualClock::new());
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut scheduler = Scheduler::with_clock(SchedulerConfig::default(), clock.clone());
        let tree = WorkTree::create_root(slow_app(&clock, Duration::from_millis(30)), tx);
        let snapshot = tree.copy().unwrap();

        scheduler.schedule(tree, vec![], None).unwrap();
        assert!(scheduler.work().unwrap().is_none());
        assert_eq!(scheduler.rebase_unstarted(&snapshot).unwrap(), 0);
    }
}
