//! Behavior tasks and the resumable routines they run.
//!
//! A [`Task`] is a named behavior. Each call to [`Task::execute`] starts a
//! fresh [`Routine`], a resumable sequence that the dispatcher steps once per
//! control tick. Every step yields a [`Step`]: keep going next tick, hand
//! control to a sub-task, or finish.

use std::fmt;

use crate::error::TaskError;

/// What a routine produced when it was resumed.
pub enum Step<C> {
    /// Nothing more to do this tick; resume at the same point next tick.
    Continue,
    /// Run this sub-task now. The current routine is suspended until the
    /// sub-task's routine is exhausted.
    Delegate(Box<dyn Task<C>>),
    /// The routine is exhausted.
    Done,
}

impl<C> Step<C> {
    /// Delegate to `task`.
    pub fn delegate<T: Task<C> + 'static>(task: T) -> Self {
        Step::Delegate(Box::new(task))
    }
}

impl<C> fmt::Debug for Step<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Continue => f.write_str("Continue"),
            Step::Delegate(task) => f.debug_tuple("Delegate").field(&task.name()).finish(),
            Step::Done => f.write_str("Done"),
        }
    }
}

/// A resumable execution of a task.
///
/// `C` is the per-tick context the host passes in (sensor snapshot, drive
/// arbitration and so on).
pub trait Routine<C>: Send {
    /// Advance to the next yield point.
    fn resume(&mut self, ctx: &mut C) -> Result<Step<C>, TaskError>;
}

impl<C, F> Routine<C> for F
where
    F: FnMut(&mut C) -> Result<Step<C>, TaskError> + Send,
{
    fn resume(&mut self, ctx: &mut C) -> Result<Step<C>, TaskError> {
        self(ctx)
    }
}

/// A named behavior.
pub trait Task<C>: Send {
    /// Name used for logging and chain inspection.
    fn name(&self) -> &str;

    /// Start a new execution sequence.
    fn execute(&mut self) -> Box<dyn Routine<C>>;

    /// Release resources.
    ///
    /// Called once: for a registered task when the dispatcher closes or
    /// rejects it, for a delegated sub-task when its frame finishes, faults
    /// or is dropped with its chain.
    fn close(&mut self) {}

    /// Receive an operator command, whatever the task's current state.
    fn on_command(&mut self, _command: &str) {}
}

type RoutineFactory<C> = Box<dyn FnMut() -> Box<dyn Routine<C>> + Send>;
type CommandHook = Box<dyn FnMut(&str) + Send>;
type CloseHook = Box<dyn FnMut() + Send>;

/// A task assembled from closures.
pub struct FnTask<C> {
    name: String,
    factory: RoutineFactory<C>,
    on_command: Option<CommandHook>,
    on_close: Option<CloseHook>,
}

impl<C> FnTask<C> {
    /// Create a task whose `execute` calls `factory`.
    pub fn new<F>(name: impl Into<String>, factory: F) -> Self
    where
        F: FnMut() -> Box<dyn Routine<C>> + Send + 'static,
    {
        FnTask {
            name: name.into(),
            factory: Box::new(factory),
            on_command: None,
            on_close: None,
        }
    }

    /// Handle operator commands with `hook`.
    pub fn with_command<F>(mut self, hook: F) -> Self
    where
        F: FnMut(&str) + Send + 'static,
    {
        self.on_command = Some(Box::new(hook));
        self
    }

    /// Run `hook` when the task is closed.
    pub fn with_close<F>(mut self, hook: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        self.on_close = Some(Box::new(hook));
        self
    }
}

impl<C> Task<C> for FnTask<C> {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&mut self) -> Box<dyn Routine<C>> {
        (self.factory)()
    }

    fn close(&mut self) {
        if let Some(hook) = self.on_close.as_mut() {
            hook();
        }
    }

    fn on_command(&mut self, command: &str) {
        if let Some(hook) = self.on_command.as_mut() {
            hook(command);
        }
    }
}

impl<C> fmt::Debug for FnTask<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnTask").field("name", &self.name).finish_non_exhaustive()
    }
}
