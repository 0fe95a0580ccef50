//! The subsumption task dispatcher.
//!
//! Every dispatched task starts a *chain*. A chain keeps the routine it is
//! currently running plus an explicit stack of the routines it suspended to
//! get there, so the dispatcher never recurses into ancestors: each tick it
//! resumes the leaf, drills down when the leaf delegates and returns up one
//! level when the leaf is exhausted.
//!
//! Chains are advanced in registration order on every [`process`] call.
//! Earlier chains therefore see each tick first; there is no preemption,
//! only cooperative yielding.
//!
//! [`process`]: SubsumptionTaskDispatcher::process

use std::any::Any;
use std::mem;
use std::panic::{self, AssertUnwindSafe};

use tracing::{debug, info, warn};

use crate::error::{ChainFault, DispatchError};
use crate::task::{Routine, Step, Task};

/// Default bound on how deep a chain may delegate.
pub const DEFAULT_MAX_DEPTH: usize = 32;

/// Dispatcher tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// Deepest allowed delegation stack. A chain that tries to go deeper is
    /// faulted and dropped.
    pub max_depth: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        DispatcherConfig { max_depth: DEFAULT_MAX_DEPTH }
    }
}

/// Counters for monitoring the dispatcher.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatcherStats {
    /// Number of `process` calls.
    pub ticks: u64,
    /// Chains that ran to completion.
    pub finished: u64,
    /// Chains dropped because a routine failed.
    pub faulted: u64,
}

/// A read-only view of one active chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainStatus {
    /// Name of the dispatched task at the bottom of the chain.
    pub root: String,
    /// Name of the task whose routine runs next.
    pub leaf: String,
    /// Number of suspended routines below the leaf.
    pub depth: usize,
}

struct Frame<C> {
    name: String,
    /// Sub-tasks are owned by their frame; dispatched tasks live in the registry.
    owner: Option<Box<dyn Task<C>>>,
    routine: Box<dyn Routine<C>>,
}

impl<C> Frame<C> {
    fn discard(self) {
        if let Some(mut task) = self.owner {
            close_task(task.as_mut());
        }
    }
}

enum ChainState {
    Active,
    Finished,
}

struct IteratorState<C> {
    root: String,
    current: Frame<C>,
    stack: Vec<Frame<C>>,
}

impl<C> IteratorState<C> {
    fn depth(&self) -> usize {
        self.stack.len()
    }

    fn status(&self) -> ChainStatus {
        ChainStatus {
            root: self.root.clone(),
            leaf: self.current.name.clone(),
            depth: self.depth(),
        }
    }

    /// Run the chain until it yields `Continue`, returns up a level, or ends.
    fn advance(&mut self, ctx: &mut C, max_depth: usize) -> Result<ChainState, ChainFault> {
        loop {
            let name = &self.current.name;
            let routine = &mut self.current.routine;
            let step = guarded(name, || routine.resume(ctx))?.map_err(|source| {
                ChainFault::Failed {
                    task: self.current.name.clone(),
                    source,
                }
            })?;

            match step {
                Step::Continue => return Ok(ChainState::Active),
                Step::Delegate(mut child) => {
                    if self.depth() >= max_depth {
                        close_task(child.as_mut());
                        return Err(ChainFault::TooDeep {
                            task: self.current.name.clone(),
                            max_depth,
                        });
                    }
                    let child_name = child.name().to_owned();
                    let routine = guarded(&child_name, || child.execute())?;
                    let parent = mem::replace(
                        &mut self.current,
                        Frame {
                            name: child_name,
                            owner: Some(child),
                            routine,
                        },
                    );
                    self.stack.push(parent);
                    debug!(
                        root = %self.root,
                        task = %self.current.name,
                        depth = self.depth(),
                        "Chain delegated to sub-task"
                    );
                }
                Step::Done => {
                    let Some(parent) = self.stack.pop() else {
                        return Ok(ChainState::Finished);
                    };
                    let exhausted = mem::replace(&mut self.current, parent);
                    debug!(
                        root = %self.root,
                        finished = %exhausted.name,
                        task = %self.current.name,
                        depth = self.depth(),
                        "Sub-task finished, parent resumes next tick"
                    );
                    exhausted.discard();
                    return Ok(ChainState::Active);
                }
            }
        }
    }

    fn discard(self) {
        self.current.discard();
        for frame in self.stack.into_iter().rev() {
            frame.discard();
        }
    }
}

fn guarded<T>(task: &str, f: impl FnOnce() -> T) -> Result<T, ChainFault> {
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| ChainFault::Panicked {
        task: task.to_owned(),
        message: panic_message(payload.as_ref()),
    })
}

/// Run a task's close hook; a panicking hook is logged, never propagated.
fn close_task<C>(task: &mut dyn Task<C>) {
    let name = task.name().to_owned();
    if let Err(fault) = guarded(&name, || task.close()) {
        warn!(task = %name, error = %fault, "Task close hook failed");
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

/// Runs behavior tasks cooperatively, one step per chain per tick.
pub struct SubsumptionTaskDispatcher<C> {
    tasks: Vec<Box<dyn Task<C>>>,
    active: Vec<IteratorState<C>>,
    config: DispatcherConfig,
    stats: DispatcherStats,
    closed: bool,
}

impl<C> Default for SubsumptionTaskDispatcher<C> {
    fn default() -> Self {
        Self::new(DispatcherConfig::default())
    }
}

impl<C> SubsumptionTaskDispatcher<C> {
    pub fn new(config: DispatcherConfig) -> Self {
        Self {
            tasks: Vec::new(),
            active: Vec::new(),
            config,
            stats: DispatcherStats::default(),
            closed: false,
        }
    }

    /// Register a task and start its chain.
    ///
    /// The chain is first resumed on the next [`process`](Self::process).
    pub fn dispatch(&mut self, mut task: Box<dyn Task<C>>) -> Result<(), DispatchError> {
        if self.closed {
            return Err(DispatchError::Closed);
        }
        let name = task.name().to_owned();
        let routine = match panic::catch_unwind(AssertUnwindSafe(|| task.execute())) {
            Ok(routine) => routine,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                warn!(task = %name, %message, "Task rejected, execute panicked");
                self.stats.faulted += 1;
                close_task(task.as_mut());
                return Err(DispatchError::ExecutePanicked { task: name, message });
            }
        };
        info!(task = %name, priority = self.tasks.len(), "Task dispatched");

        self.active.push(IteratorState {
            root: name.clone(),
            current: Frame {
                name,
                owner: None,
                routine,
            },
            stack: Vec::new(),
        });
        self.tasks.push(task);
        Ok(())
    }

    /// Advance every active chain by one step, in registration order.
    ///
    /// A chain that fails or panics is logged and dropped; the others carry
    /// on. Returns `true` while at least one chain is still active.
    pub fn process(&mut self, ctx: &mut C) -> Result<bool, DispatchError> {
        if self.closed {
            return Err(DispatchError::Closed);
        }
        self.stats.ticks += 1;

        let max_depth = self.config.max_depth;
        let mut chains = mem::take(&mut self.active);
        let mut kept = Vec::with_capacity(chains.len());

        for mut chain in chains.drain(..) {
            match chain.advance(ctx, max_depth) {
                Ok(ChainState::Active) => kept.push(chain),
                Ok(ChainState::Finished) => {
                    info!(task = %chain.root, "Task finished");
                    self.stats.finished += 1;
                    chain.discard();
                }
                Err(fault) => {
                    warn!(
                        task = %chain.root,
                        depth = chain.depth(),
                        error = %fault,
                        "Dropping faulted task chain"
                    );
                    self.stats.faulted += 1;
                    chain.discard();
                }
            }
        }

        self.active = kept;
        Ok(!self.active.is_empty())
    }

    /// Close every task and clear the dispatcher.
    ///
    /// Sub-tasks still on a chain are closed leaf first, then every
    /// registered task in registration order. Calling this again does nothing.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        for chain in self.active.drain(..) {
            chain.discard();
        }
        for task in self.tasks.iter_mut() {
            close_task(task.as_mut());
        }
        info!(tasks = self.tasks.len(), "Dispatcher closed");
        self.tasks.clear();
    }

    /// Broadcast an operator command to every registered task, including
    /// tasks whose chain has already finished.
    pub fn control_device_command(&mut self, command: &str) {
        debug!(command, tasks = self.tasks.len(), "Forwarding control device command");
        for task in self.tasks.iter_mut() {
            let name = task.name().to_owned();
            if let Err(fault) = guarded(&name, || task.on_command(command)) {
                warn!(task = %name, error = %fault, "Task command hook failed");
            }
        }
    }

    pub fn active_tasks_count(&self) -> usize {
        self.active.len()
    }

    pub fn tasks_count(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn stats(&self) -> DispatcherStats {
        self.stats
    }

    /// Snapshot of the active chains in priority order.
    pub fn chains(&self) -> Vec<ChainStatus> {
        self.active.iter().map(IteratorState::status).collect()
    }
}

impl<C> Drop for SubsumptionTaskDispatcher<C> {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TaskError;
    use crate::task::FnTask;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    type Trace = Vec<String>;

    /// Logs its name each resume, continues `continues` times, then finishes.
    fn counting(name: &'static str, continues: usize) -> FnTask<Trace> {
        FnTask::new(name, move || {
            let mut remaining = continues;
            Box::new(move |trace: &mut Trace| -> Result<Step<Trace>, TaskError> {
                trace.push(name.to_owned());
                if remaining == 0 {
                    Ok(Step::Done)
                } else {
                    remaining -= 1;
                    Ok(Step::Continue)
                }
            })
        })
    }

    /// Delegates to `make_child()` on its first resume, then finishes.
    fn delegating<F>(name: &'static str, make_child: F) -> FnTask<Trace>
    where
        F: Fn() -> FnTask<Trace> + Send + Sync + 'static,
    {
        let make_child = Arc::new(make_child);
        FnTask::new(name, move || {
            let make_child = Arc::clone(&make_child);
            let mut delegated = false;
            Box::new(move |trace: &mut Trace| -> Result<Step<Trace>, TaskError> {
                trace.push(name.to_owned());
                if delegated {
                    Ok(Step::Done)
                } else {
                    delegated = true;
                    Ok(Step::delegate((*make_child)()))
                }
            })
        })
    }

    fn leaf_depths(dispatcher: &SubsumptionTaskDispatcher<Trace>) -> Vec<(String, usize)> {
        dispatcher
            .chains()
            .into_iter()
            .map(|c| (c.leaf, c.depth))
            .collect()
    }

    #[test]
    fn test_three_tick_task_drains_after_three_calls() {
        let mut dispatcher = SubsumptionTaskDispatcher::default();
        let mut trace = Trace::new();
        dispatcher.dispatch(Box::new(counting("a", 2))).unwrap();
        assert_eq!(dispatcher.active_tasks_count(), 1);

        assert!(dispatcher.process(&mut trace).unwrap());
        assert!(dispatcher.process(&mut trace).unwrap());
        assert!(!dispatcher.process(&mut trace).unwrap());
        assert_eq!(dispatcher.active_tasks_count(), 0);
        assert_eq!(dispatcher.tasks_count(), 1);
        assert_eq!(trace, ["a", "a", "a"]);
    }

    #[test]
    fn test_exhaustion_is_seen_on_the_call_after_the_last_continue() {
        let mut dispatcher = SubsumptionTaskDispatcher::default();
        let mut trace = Trace::new();
        dispatcher.dispatch(Box::new(counting("a", 3))).unwrap();

        for _ in 0..3 {
            assert!(dispatcher.process(&mut trace).unwrap());
        }
        assert!(!dispatcher.process(&mut trace).unwrap());
        assert_eq!(dispatcher.stats().finished, 1);
    }

    #[test]
    fn test_nested_delegation_depth_transitions() {
        let mut dispatcher = SubsumptionTaskDispatcher::default();
        let mut trace = Trace::new();
        dispatcher
            .dispatch(Box::new(delegating("a", || counting("b", 2))))
            .unwrap();

        // Tick 1: a delegates, b is resumed in the same call and continues.
        assert!(dispatcher.process(&mut trace).unwrap());
        assert_eq!(leaf_depths(&dispatcher), [("b".to_owned(), 1)]);
        assert_eq!(trace, ["a", "b"]);

        // Tick 2: b continues again.
        assert!(dispatcher.process(&mut trace).unwrap());
        assert_eq!(leaf_depths(&dispatcher), [("b".to_owned(), 1)]);

        // Tick 3: b is exhausted, control returns to a without resuming it.
        assert!(dispatcher.process(&mut trace).unwrap());
        assert_eq!(leaf_depths(&dispatcher), [("a".to_owned(), 0)]);
        assert_eq!(trace, ["a", "b", "b", "b"]);

        // Tick 4: a resumes after its delegation and finishes.
        assert!(!dispatcher.process(&mut trace).unwrap());
        assert_eq!(trace, ["a", "b", "b", "b", "a"]);
        assert_eq!(dispatcher.stats().ticks, 4);
    }

    #[test]
    fn test_drill_down_runs_through_several_levels_in_one_tick() {
        let mut dispatcher = SubsumptionTaskDispatcher::default();
        let mut trace = Trace::new();
        dispatcher
            .dispatch(Box::new(delegating("a", || {
                delegating("b", || counting("c", 1))
            })))
            .unwrap();

        assert!(dispatcher.process(&mut trace).unwrap());
        assert_eq!(trace, ["a", "b", "c"]);
        assert_eq!(
            dispatcher.chains(),
            [ChainStatus {
                root: "a".to_owned(),
                leaf: "c".to_owned(),
                depth: 2
            }]
        );
    }

    #[test]
    fn test_immediately_finished_sub_task_returns_next_tick() {
        let mut dispatcher = SubsumptionTaskDispatcher::default();
        let mut trace = Trace::new();
        dispatcher
            .dispatch(Box::new(delegating("a", || counting("b", 0))))
            .unwrap();

        assert!(dispatcher.process(&mut trace).unwrap());
        assert_eq!(trace, ["a", "b"]);
        assert_eq!(leaf_depths(&dispatcher), [("a".to_owned(), 0)]);
        assert!(!dispatcher.process(&mut trace).unwrap());
    }

    #[test]
    fn test_chains_run_in_registration_order() {
        let mut dispatcher = SubsumptionTaskDispatcher::default();
        let mut trace = Trace::new();
        dispatcher.dispatch(Box::new(counting("high", 1))).unwrap();
        dispatcher.dispatch(Box::new(counting("low", 3))).unwrap();

        dispatcher.process(&mut trace).unwrap();
        dispatcher.process(&mut trace).unwrap();
        dispatcher.process(&mut trace).unwrap();
        assert_eq!(trace, ["high", "low", "high", "low", "low"]);
        assert_eq!(dispatcher.active_tasks_count(), 1);
    }

    #[test]
    fn test_execute_starts_a_fresh_sequence_each_delegation() {
        let executions = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&executions);
        let child = move || {
            counter.fetch_add(1, Ordering::SeqCst);
            counting("child", 0)
        };
        let parent = FnTask::new("parent", {
            let child = Arc::new(child);
            move || {
                let child = Arc::clone(&child);
                let mut rounds = 0;
                Box::new(move |_: &mut Trace| -> Result<Step<Trace>, TaskError> {
                    rounds += 1;
                    if rounds <= 2 {
                        Ok(Step::delegate((*child)()))
                    } else {
                        Ok(Step::Done)
                    }
                })
            }
        });

        let mut dispatcher = SubsumptionTaskDispatcher::default();
        let mut trace = Trace::new();
        dispatcher.dispatch(Box::new(parent)).unwrap();
        while dispatcher.process(&mut trace).unwrap() {}
        assert_eq!(executions.load(Ordering::SeqCst), 2);
        assert_eq!(trace, ["child", "child"]);
    }

    #[test]
    fn test_failing_chain_is_dropped_and_others_continue() {
        let failing = FnTask::new("broken", || {
            Box::new(|_: &mut Trace| -> Result<Step<Trace>, TaskError> {
                Err(TaskError::Failed("sensor stuck".to_owned()))
            })
        });
        let mut dispatcher = SubsumptionTaskDispatcher::default();
        let mut trace = Trace::new();
        dispatcher.dispatch(Box::new(failing)).unwrap();
        dispatcher.dispatch(Box::new(counting("steady", 5))).unwrap();

        assert!(dispatcher.process(&mut trace).unwrap());
        assert_eq!(dispatcher.active_tasks_count(), 1);
        assert_eq!(dispatcher.chains()[0].root, "steady");
        assert_eq!(dispatcher.stats().faulted, 1);
        assert_eq!(trace, ["steady"]);
    }

    #[test]
    fn test_panicking_sub_task_drops_only_its_chain() {
        let closed = Arc::new(AtomicUsize::new(0));
        let closed_hook = Arc::clone(&closed);
        let make_bomb = move || {
            let closed_hook = Arc::clone(&closed_hook);
            FnTask::new("bomb", || {
                Box::new(|_: &mut Trace| -> Result<Step<Trace>, TaskError> {
                    panic!("wheel fell off")
                })
            })
            .with_close(move || {
                closed_hook.fetch_add(1, Ordering::SeqCst);
            })
        };

        let mut dispatcher = SubsumptionTaskDispatcher::default();
        let mut trace = Trace::new();
        dispatcher.dispatch(Box::new(delegating("a", make_bomb))).unwrap();
        dispatcher.dispatch(Box::new(counting("steady", 1))).unwrap();

        assert!(dispatcher.process(&mut trace).unwrap());
        assert_eq!(dispatcher.stats().faulted, 1);
        assert_eq!(closed.load(Ordering::SeqCst), 1);
        assert_eq!(dispatcher.chains()[0].root, "steady");
    }

    #[test]
    fn test_panicking_execute_rejects_the_task() {
        let closed = Arc::new(AtomicUsize::new(0));
        let closed_hook = Arc::clone(&closed);
        let bad = FnTask::new("bad", || -> Box<dyn Routine<Trace>> { panic!("no routine") })
            .with_close(move || {
                closed_hook.fetch_add(1, Ordering::SeqCst);
            });

        let mut dispatcher = SubsumptionTaskDispatcher::default();
        let mut trace = Trace::new();
        dispatcher.dispatch(Box::new(counting("steady", 1))).unwrap();
        assert_eq!(
            dispatcher.dispatch(Box::new(bad)),
            Err(DispatchError::ExecutePanicked {
                task: "bad".to_owned(),
                message: "no routine".to_owned(),
            })
        );
        assert_eq!(closed.load(Ordering::SeqCst), 1);
        assert_eq!(dispatcher.tasks_count(), 1);
        assert_eq!(dispatcher.stats().faulted, 1);

        assert!(dispatcher.process(&mut trace).unwrap());
        assert_eq!(trace, ["steady"]);
    }

    #[test]
    fn test_panicking_close_hook_does_not_lose_other_chains() {
        let child = || counting("child", 0).with_close(|| panic!("close failed"));
        let mut dispatcher = SubsumptionTaskDispatcher::default();
        let mut trace = Trace::new();
        dispatcher.dispatch(Box::new(delegating("parent", child))).unwrap();
        dispatcher.dispatch(Box::new(counting("steady", 5))).unwrap();

        // the child finishes in the first tick and is closed right away
        assert!(dispatcher.process(&mut trace).unwrap());
        assert_eq!(trace, ["parent", "child", "steady"]);
        assert_eq!(dispatcher.active_tasks_count(), 2);

        assert!(dispatcher.process(&mut trace).unwrap());
        assert_eq!(dispatcher.active_tasks_count(), 1);
        assert_eq!(dispatcher.chains()[0].root, "steady");
    }

    #[test]
    fn test_panicking_hooks_on_registered_tasks_are_contained() {
        let mut dispatcher = SubsumptionTaskDispatcher::default();
        dispatcher
            .dispatch(Box::new(
                counting("fragile", 3)
                    .with_command(|_| panic!("bad command"))
                    .with_close(|| panic!("bad close")),
            ))
            .unwrap();
        dispatcher.control_device_command("go");
        dispatcher.close();
        assert!(dispatcher.is_closed());
        assert_eq!(dispatcher.tasks_count(), 0);
    }

    #[test]
    fn test_endless_delegation_hits_depth_limit() {
        fn recursive() -> FnTask<Trace> {
            delegating("loop", recursive)
        }
        let mut dispatcher = SubsumptionTaskDispatcher::new(DispatcherConfig { max_depth: 4 });
        let mut trace = Trace::new();
        dispatcher.dispatch(Box::new(recursive())).unwrap();

        assert!(!dispatcher.process(&mut trace).unwrap());
        assert_eq!(trace.len(), 5);
        assert_eq!(dispatcher.stats().faulted, 1);
    }

    #[test]
    fn test_close_runs_hooks_once_and_blocks_further_work() {
        let closes = Arc::new(AtomicUsize::new(0));
        let make = |name: &'static str| {
            let closes = Arc::clone(&closes);
            counting(name, 10).with_close(move || {
                closes.fetch_add(1, Ordering::SeqCst);
            })
        };
        let mut dispatcher = SubsumptionTaskDispatcher::default();
        let mut trace = Trace::new();
        dispatcher.dispatch(Box::new(make("a"))).unwrap();
        dispatcher.dispatch(Box::new(make("b"))).unwrap();
        dispatcher.process(&mut trace).unwrap();

        dispatcher.close();
        dispatcher.close();
        assert_eq!(closes.load(Ordering::SeqCst), 2);
        assert_eq!(dispatcher.tasks_count(), 0);
        assert_eq!(dispatcher.active_tasks_count(), 0);
        assert_eq!(dispatcher.process(&mut trace), Err(DispatchError::Closed));
        assert_eq!(
            dispatcher.dispatch(Box::new(counting("late", 0))),
            Err(DispatchError::Closed)
        );
    }

    #[test]
    fn test_close_also_closes_suspended_sub_tasks() {
        let closed = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&closed);
        let child = move || {
            let log = Arc::clone(&log);
            counting("child", 10).with_close(move || log.lock().unwrap().push("child"))
        };
        let parent_log = Arc::clone(&closed);
        let parent = delegating("parent", child)
            .with_close(move || parent_log.lock().unwrap().push("parent"));

        let mut dispatcher = SubsumptionTaskDispatcher::default();
        dispatcher.dispatch(Box::new(parent)).unwrap();
        dispatcher.process(&mut Trace::new()).unwrap();
        dispatcher.close();

        assert_eq!(*closed.lock().unwrap(), ["child", "parent"]);
    }

    #[test]
    fn test_commands_reach_finished_tasks_too() {
        let received = Arc::new(Mutex::new(Vec::new()));
        let make = |name: &'static str, continues| {
            let received = Arc::clone(&received);
            counting(name, continues)
                .with_command(move |cmd| received.lock().unwrap().push(format!("{name}:{cmd}")))
        };
        let mut dispatcher = SubsumptionTaskDispatcher::default();
        dispatcher.dispatch(Box::new(make("quick", 0))).unwrap();
        dispatcher.dispatch(Box::new(make("slow", 5))).unwrap();
        dispatcher.process(&mut Trace::new()).unwrap();
        assert_eq!(dispatcher.active_tasks_count(), 1);

        dispatcher.control_device_command("button_a");
        assert_eq!(*received.lock().unwrap(), ["quick:button_a", "slow:button_a"]);
    }
}
