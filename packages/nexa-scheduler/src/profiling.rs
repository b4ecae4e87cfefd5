use crate::priority::PriorityLevel;
use crate::task::Task;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

/// One entry of the profiling event log. Times are clock readings in ms.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ProfilingEvent {
    TaskStart {
        time: f64,
        task_id: u64,
        priority: PriorityLevel,
    },
    TaskRun {
        time: f64,
        task_id: u64,
        run_id: u64,
    },
    TaskYield {
        time: f64,
        task_id: u64,
        run_id: u64,
    },
    TaskComplete {
        time: f64,
        task_id: u64,
    },
    TaskCancel {
        time: f64,
        task_id: u64,
    },
    TaskError {
        time: f64,
        task_id: u64,
    },
    SchedulerSuspend {
        time: f64,
        main_thread_id: u64,
    },
    SchedulerResume {
        time: f64,
        main_thread_id: u64,
    },
}

impl ProfilingEvent {
    pub fn task_id(&self) -> Option<u64> {
        match *self {
            ProfilingEvent::TaskStart { task_id, .. }
            | ProfilingEvent::TaskRun { task_id, .. }
            | ProfilingEvent::TaskYield { task_id, .. }
            | ProfilingEvent::TaskComplete { task_id, .. }
            | ProfilingEvent::TaskCancel { task_id, .. }
            | ProfilingEvent::TaskError { task_id, .. } => Some(task_id),
            ProfilingEvent::SchedulerSuspend { .. } | ProfilingEvent::SchedulerResume { .. } => None,
        }
    }
}

/// Counters kept whether or not the event log is enabled.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchedulerMetrics {
    /// Live tasks in the ready queue.
    pub pending_tasks: usize,
    /// Live tasks still waiting on their delay.
    pub delayed_tasks: usize,
    pub total_tasks_executed: u64,
    pub total_tasks_cancelled: u64,
    pub total_tasks_errored: u64,
    /// Mean time between a task becoming eligible and its first run.
    pub average_latency_ms: f64,
}

#[derive(Default)]
pub(crate) struct Profiler {
    log: Option<Vec<ProfilingEvent>>,
    run_id_counter: u64,
    main_thread_id_counter: u64,
    // Tasks that have run at least once and not finished yet.
    started: FxHashSet<u64>,
    executed: u64,
    cancelled: u64,
    errored: u64,
    latency_total: f64,
    latency_samples: u64,
}

impl Profiler {
    pub fn start_logging(&mut self) {
        self.log = Some(Vec::new());
    }

    pub fn stop_logging(&mut self) -> Vec<ProfilingEvent> {
        self.log.take().unwrap_or_default()
    }

    pub fn is_logging(&self) -> bool {
        self.log.is_some()
    }

    /// Copy of the log so far, leaving logging on.
    pub fn events(&self) -> Vec<ProfilingEvent> {
        self.log.clone().unwrap_or_default()
    }

    fn record(&mut self, event: ProfilingEvent) {
        if let Some(log) = self.log.as_mut() {
            log.push(event);
        }
    }

    pub fn mark_task_start(&mut self, task: &Task, time: f64) {
        self.record(ProfilingEvent::TaskStart {
            time,
            task_id: task.id(),
            priority: task.priority_level(),
        });
    }

    pub fn mark_task_run(&mut self, task: &Task, time: f64) {
        self.run_id_counter += 1;
        if self.started.insert(task.id()) {
            self.latency_total += (time - task.start_time()).max(0.0);
            self.latency_samples += 1;
        }
        self.record(ProfilingEvent::TaskRun {
            time,
            task_id: task.id(),
            run_id: self.run_id_counter,
        });
    }

    pub fn mark_task_yield(&mut self, task: &Task, time: f64) {
        self.record(ProfilingEvent::TaskYield {
            time,
            task_id: task.id(),
            run_id: self.run_id_counter,
        });
    }

    pub fn mark_task_completed(&mut self, task: &Task, time: f64) {
        self.started.remove(&task.id());
        self.executed += 1;
        self.record(ProfilingEvent::TaskComplete {
            time,
            task_id: task.id(),
        });
    }

    pub fn mark_task_canceled(&mut self, task: &Task, time: f64) {
        self.started.remove(&task.id());
        self.cancelled += 1;
        self.record(ProfilingEvent::TaskCancel {
            time,
            task_id: task.id(),
        });
    }

    pub fn mark_task_errored(&mut self, task: &Task, time: f64) {
        self.started.remove(&task.id());
        self.errored += 1;
        self.record(ProfilingEvent::TaskError {
            time,
            task_id: task.id(),
        });
    }

    pub fn mark_scheduler_suspended(&mut self, time: f64) {
        self.main_thread_id_counter += 1;
        self.record(ProfilingEvent::SchedulerSuspend {
            time,
            main_thread_id: self.main_thread_id_counter,
        });
    }

    pub fn mark_scheduler_unsuspended(&mut self, time: f64) {
        self.record(ProfilingEvent::SchedulerResume {
            time,
            main_thread_id: self.main_thread_id_counter,
        });
    }

    pub fn metrics(&self, pending_tasks: usize, delayed_tasks: usize) -> SchedulerMetrics {
        let average_latency_ms = if self.latency_samples > 0 {
            self.latency_total / self.latency_samples as f64
        } else {
            0.0
        };
        SchedulerMetrics {
            pending_tasks,
            delayed_tasks,
            total_tasks_executed: self.executed,
            total_tasks_cancelled: self.cancelled,
            total_tasks_errored: self.errored,
            average_latency_ms,
        }
    }
}
