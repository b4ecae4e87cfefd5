//! Runtime inspection for the Nexa scheduler.
//!
//! In debug builds a global [`DevToolsContext`] captures serializable
//! snapshots of a [`Scheduler`] and forwards them to an attached
//! [`DevBridge`]. Release builds keep the same API but do nothing.

use nexa_scheduler::{
    PriorityLevel, ProfilingEvent, QueueKind, Scheduler, SchedulerError, SchedulerMetrics, TaskInfo,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DevToolsError {
    #[error("malformed devtools command: {0}")]
    InvalidCommand(#[source] serde_json::Error),

    #[error("devtools command rejected by the scheduler: {0}")]
    Rejected(#[from] SchedulerError),
}

/// One queued task as shown in the inspector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskNode {
    pub id: u64,
    pub priority: PriorityLevel,
    pub queue: QueueKind,
    /// Position in its queue, 0 runs first.
    pub position: usize,
    pub start_time: f64,
    pub expiration_time: f64,
    pub cancelled: bool,
}

impl TaskNode {
    fn from_info(info: &TaskInfo, position: usize) -> Self {
        Self {
            id: info.id,
            priority: info.priority_level,
            queue: info.queue,
            position,
            start_time: info.start_time,
            expiration_time: info.expiration_time,
            cancelled: info.cancelled,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchedulerSnapshot {
    pub tasks: Vec<TaskNode>,
    pub metrics: SchedulerMetrics,
    pub events: Vec<ProfilingEvent>,
    pub frame_interval_ms: f64,
    pub current_priority: PriorityLevel,
    pub paused: bool,
    /// Scheduler clock reading when the snapshot was taken.
    pub timestamp: f64,
}

impl SchedulerSnapshot {
    pub fn of(scheduler: &Scheduler) -> Self {
        let queues = scheduler.queue_snapshot();
        let ready = queues.ready.iter().enumerate();
        let delayed = queues.delayed.iter().enumerate();
        let tasks = ready
            .chain(delayed)
            .map(|(position, info)| TaskNode::from_info(info, position))
            .collect();

        Self {
            tasks,
            metrics: scheduler.metrics(),
            events: scheduler.profiling_events(),
            frame_interval_ms: scheduler.frame_interval(),
            current_priority: scheduler.get_current_priority_level(),
            paused: scheduler.is_paused(),
            timestamp: scheduler.now(),
        }
    }
}

/// Commands an inspector can send back, as JSON tagged by `command`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "kebab-case")]
pub enum DevCommand {
    StartProfiling,
    StopProfiling,
    Pause,
    Resume,
    ForceFrameRate { fps: f64 },
    ResetFrameRate,
}

impl DevCommand {
    pub fn parse(json: &str) -> Result<Self, DevToolsError> {
        serde_json::from_str(json).map_err(DevToolsError::InvalidCommand)
    }

    pub fn apply(&self, scheduler: &Scheduler) -> Result<(), DevToolsError> {
        tracing::debug!(command = ?self, "applying devtools command");
        match *self {
            DevCommand::StartProfiling => scheduler.start_logging_profiling_events(),
            DevCommand::StopProfiling => {
                scheduler.stop_logging_profiling_events();
            }
            DevCommand::Pause => scheduler.pause_execution(),
            DevCommand::Resume => scheduler.continue_execution(),
            DevCommand::ForceFrameRate { fps } => scheduler.force_frame_rate(fps)?,
            DevCommand::ResetFrameRate => scheduler.reset_frame_rate(),
        }
        Ok(())
    }
}

/// Transport to an external inspector.
pub trait DevBridge: Send + Sync {
    fn send_snapshot(&self, snapshot: &SchedulerSnapshot);
}

#[cfg(debug_assertions)]
mod internal {
    use super::{DevBridge, SchedulerSnapshot};
    use nexa_scheduler::Scheduler;
    use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};

    pub struct DevToolsContext {
        snapshot: Mutex<SchedulerSnapshot>,
        bridge: Mutex<Option<Box<dyn DevBridge>>>,
    }

    fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
        mutex.lock().unwrap_or_else(PoisonError::into_inner)
    }

    impl DevToolsContext {
        pub fn new() -> Self {
            Self {
                snapshot: Mutex::new(SchedulerSnapshot::default()),
                bridge: Mutex::new(None),
            }
        }

        pub fn set_bridge(&self, bridge: Box<dyn DevBridge>) {
            *lock(&self.bridge) = Some(bridge);
        }

        pub fn clear_bridge(&self) {
            *lock(&self.bridge) = None;
        }

        /// Records the scheduler's current state and pushes it to the bridge.
        pub fn capture(&self, scheduler: &Scheduler) {
            let captured = SchedulerSnapshot::of(scheduler);
            tracing::trace!(tasks = captured.tasks.len(), "devtools snapshot");
            let mut snapshot = lock(&self.snapshot);
            *snapshot = captured;

            // Auto-push to bridge if exists
            if let Some(bridge) = lock(&self.bridge).as_ref() {
                bridge.send_snapshot(&snapshot);
            }
        }

        pub fn last_snapshot(&self) -> SchedulerSnapshot {
            lock(&self.snapshot).clone()
        }

        pub fn export_state(&self) -> String {
            let snapshot = lock(&self.snapshot);
            serde_json::to_string(&*snapshot).unwrap_or_default()
        }
    }

    impl Default for DevToolsContext {
        fn default() -> Self {
            Self::new()
        }
    }

    pub static DEVTOOLS: OnceLock<DevToolsContext> = OnceLock::new();
}

#[cfg(debug_assertions)]
pub use internal::*;

// Production no-op implementation
#[cfg(not(debug_assertions))]
pub mod production {
    use super::{DevBridge, SchedulerSnapshot};
    use nexa_scheduler::Scheduler;

    pub struct DevToolsContext;

    impl DevToolsContext {
        pub fn set_bridge(&self, _: Box<dyn DevBridge>) {}
        pub fn clear_bridge(&self) {}
        pub fn capture(&self, _: &Scheduler) {}
        pub fn last_snapshot(&self) -> SchedulerSnapshot {
            SchedulerSnapshot::default()
        }
        pub fn export_state(&self) -> String {
            String::new()
        }
    }

    pub static DEVTOOLS: DevToolsContext = DevToolsContext;
}

#[cfg(not(debug_assertions))]
pub use production::*;

pub fn devtools() -> &'static DevToolsContext {
    #[cfg(debug_assertions)]
    {
        DEVTOOLS.get_or_init(DevToolsContext::new)
    }
    #[cfg(not(debug_assertions))]
    {
        &DEVTOOLS
    }
}
