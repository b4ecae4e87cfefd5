//! Cooperative priority scheduler for the Nexa runtime.
//!
//! Units of work are queued at one of five priorities and run on a single
//! thread in short time slices. Between slices control goes back to the host
//! platform so it stays responsive. Each priority has a timeout after which
//! its work stops yielding, so low priority work cannot starve.
//!
//! ```no_run
//! use nexa_scheduler::{PriorityLevel, Scheduler, VirtualHost, WorkResult};
//! use std::rc::Rc;
//!
//! let host = Rc::new(VirtualHost::new());
//! let scheduler = Scheduler::new(host.clone());
//! scheduler.schedule_callback(PriorityLevel::Normal, |_did_timeout| {
//!     println!("hello from a time slice");
//!     WorkResult::Done
//! });
//! host.flush_posted();
//! ```

pub mod clock;
pub mod config;
pub mod error;
pub mod heap;
pub mod host;
pub mod priority;
pub mod profiling;
pub mod scheduler;
pub mod task;

pub use clock::{Clock, ManualClock, MonotonicClock, WallClock};
pub use config::SchedulerConfig;
pub use error::SchedulerError;
#[cfg(feature = "tokio")]
pub use host::TokioHost;
pub use host::{EventLoopHost, HostKind, HostPlatform, HostTask, TimeoutHandle, VirtualHost, select_platform};
pub use priority::{PriorityLevel, PriorityTimeouts};
pub use profiling::{ProfilingEvent, SchedulerMetrics};
pub use scheduler::{InputQuery, QueueKind, QueueSnapshot, Scheduler, SchedulerBuilder, TaskInfo};
pub use task::{Callback, ScheduleOptions, Task, WorkResult};
