//! Cooperative subsumption scheduling for robot behaviors.
//!
//! Behaviors implement [`Task`]. The [`SubsumptionTaskDispatcher`] resumes each
//! dispatched task's [`Routine`] once per control tick, in registration order,
//! so earlier tasks act as higher-priority layers. A routine yields a
//! [`Step`]: [`Step::Continue`] to wait for the next tick,
//! [`Step::Delegate`] to hand control to a sub-task, or [`Step::Done`].
//!
//! ```
//! use subsume_behavior::{FnTask, Step, SubsumptionTaskDispatcher, TaskError};
//!
//! let mut dispatcher = SubsumptionTaskDispatcher::<u32>::default();
//! dispatcher
//!     .dispatch(Box::new(FnTask::new("count", || {
//!         Box::new(|ticks: &mut u32| -> Result<Step<u32>, TaskError> {
//!             *ticks += 1;
//!             Ok(if *ticks < 3 { Step::Continue } else { Step::Done })
//!         })
//!     })))
//!     .unwrap();
//!
//! let mut ticks = 0;
//! while dispatcher.process(&mut ticks).unwrap() {}
//! assert_eq!(ticks, 3);
//! ```

pub mod dispatcher;
pub mod error;
pub mod task;

pub use dispatcher::{
    ChainStatus, DispatcherConfig, DispatcherStats, SubsumptionTaskDispatcher, DEFAULT_MAX_DEPTH,
};
pub use error::{ChainFault, DispatchError, TaskError};
pub use task::{FnTask, Routine, Step, Task};
