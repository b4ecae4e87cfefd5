use crate::clock::Clock;
use crate::config::SchedulerConfig;
use crate::error::{Result, SchedulerError};
use crate::heap::MinHeap;
use crate::host::{HostBridge, HostKind, HostPlatform, HostTask};
use crate::priority::{PriorityLevel, PriorityTimeouts};
use crate::profiling::{Profiler, ProfilingEvent, SchedulerMetrics};
use crate::task::{ScheduleOptions, Task, WorkResult};
use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

/// Which pending input an input-pending probe is asked about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputQuery {
    /// Clicks, key presses and other discrete events.
    Discrete,
    /// Discrete events plus continuous ones such as pointer moves.
    IncludeContinuous,
}

/// Optional platform probe for pending user input.
pub type InputPending = Box<dyn Fn(InputQuery) -> bool>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QueueKind {
    Ready,
    Delayed,
}

/// Point-in-time view of one queued task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskInfo {
    pub id: u64,
    pub priority_level: PriorityLevel,
    pub start_time: f64,
    pub expiration_time: f64,
    pub sort_index: f64,
    pub cancelled: bool,
    pub queue: QueueKind,
}

impl TaskInfo {
    fn of(task: &Task, queue: QueueKind) -> Self {
        Self {
            id: task.id(),
            priority_level: task.priority_level(),
            start_time: task.start_time(),
            expiration_time: task.expiration_time(),
            sort_index: task.sort_index(),
            cancelled: task.is_cancelled(),
            queue,
        }
    }
}

/// Both queues, each listed in the order tasks would leave it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueSnapshot {
    pub ready: Vec<TaskInfo>,
    pub delayed: Vec<TaskInfo>,
}

struct Inner {
    this: Weak<Inner>,
    clock: Rc<dyn Clock>,
    host: HostBridge,
    timeouts: PriorityTimeouts,
    continuous_input_interval: f64,
    max_yield_interval: f64,
    input_pending: Option<InputPending>,

    // Tasks eligible to run, keyed by expiration time.
    task_queue: RefCell<MinHeap<Task>>,
    // Delayed tasks, keyed by start time.
    timer_queue: RefCell<MinHeap<Task>>,
    task_id_counter: Cell<u64>,

    current_task: RefCell<Option<Task>>,
    current_priority_level: Cell<PriorityLevel>,

    is_performing_work: Cell<bool>,
    is_host_callback_scheduled: Cell<bool>,
    is_host_timeout_scheduled: Cell<bool>,
    is_paused: Cell<bool>,
    needs_paint: Cell<bool>,

    profiler: RefCell<Profiler>,
}

/// Cooperative priority scheduler.
///
/// All state lives on one thread. Cloning gives another handle to the same
/// scheduler, which is how units of work schedule follow-up work.
#[derive(Clone)]
pub struct Scheduler {
    inner: Rc<Inner>,
}

pub struct SchedulerBuilder {
    platform: Option<Rc<dyn HostPlatform>>,
    clock: Option<Rc<dyn Clock>>,
    config: SchedulerConfig,
    input_pending: Option<InputPending>,
}

impl SchedulerBuilder {
    pub fn platform(mut self, platform: Rc<dyn HostPlatform>) -> Self {
        self.platform = Some(platform);
        self
    }

    /// Overrides the platform's clock.
    pub fn clock(mut self, clock: Rc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn input_pending<F>(mut self, probe: F) -> Self
    where
        F: Fn(InputQuery) -> bool + 'static,
    {
        self.input_pending = Some(Box::new(probe));
        self
    }

    pub fn build(self) -> Result<Scheduler> {
        self.config.validate()?;
        let platform = self.platform.ok_or(SchedulerError::MissingPlatform)?;
        let clock = self.clock.unwrap_or_else(|| platform.clock());
        Ok(Scheduler::assemble(platform, clock, self.config, self.input_pending))
    }
}

impl Scheduler {
    pub fn builder() -> SchedulerBuilder {
        SchedulerBuilder {
            platform: None,
            clock: None,
            config: SchedulerConfig::default(),
            input_pending: None,
        }
    }

    /// Scheduler with the default config on `platform`.
    pub fn new(platform: Rc<dyn HostPlatform>) -> Self {
        let clock = platform.clock();
        Self::assemble(platform, clock, SchedulerConfig::default(), None)
    }

    fn assemble(
        platform: Rc<dyn HostPlatform>,
        clock: Rc<dyn Clock>,
        config: SchedulerConfig,
        input_pending: Option<InputPending>,
    ) -> Self {
        let mut profiler = Profiler::default();
        if config.profiling {
            profiler.start_logging();
        }

        tracing::debug!(
            kind = ?platform.kind(),
            frame_interval_ms = config.frame_interval_ms,
            "scheduler created"
        );

        let inner = Rc::new_cyclic(|this| Inner {
            this: this.clone(),
            clock,
            host: HostBridge::new(platform, config.frame_interval_ms),
            timeouts: config.timeouts,
            continuous_input_interval: config.continuous_input_interval_ms,
            max_yield_interval: config.max_yield_interval_ms,
            input_pending,
            task_queue: RefCell::new(MinHeap::new()),
            timer_queue: RefCell::new(MinHeap::new()),
            task_id_counter: Cell::new(1),
            current_task: RefCell::new(None),
            current_priority_level: Cell::new(PriorityLevel::Normal),
            is_performing_work: Cell::new(false),
            is_host_callback_scheduled: Cell::new(false),
            is_host_timeout_scheduled: Cell::new(false),
            is_paused: Cell::new(false),
            needs_paint: Cell::new(false),
            profiler: RefCell::new(profiler),
        });
        Scheduler { inner }
    }

    pub fn now(&self) -> f64 {
        self.inner.clock.now()
    }

    pub fn host_kind(&self) -> HostKind {
        self.inner.host.kind()
    }

    pub fn schedule_callback<F>(&self, priority_level: PriorityLevel, callback: F) -> Task
    where
        F: FnOnce(bool) -> WorkResult + 'static,
    {
        self.schedule_callback_with(priority_level, callback, ScheduleOptions::default())
    }

    pub fn schedule_callback_with<F>(
        &self,
        priority_level: PriorityLevel,
        callback: F,
        options: ScheduleOptions,
    ) -> Task
    where
        F: FnOnce(bool) -> WorkResult + 'static,
    {
        self.inner.schedule(priority_level, Box::new(callback), options)
    }

    /// Marks `task` dead. It is dropped lazily when it reaches the head of its
    /// queue. Cancelling twice, or after the task finished, does nothing.
    pub fn cancel_callback(&self, task: &Task) {
        self.inner.cancel(task);
    }

    pub fn should_yield(&self) -> bool {
        self.inner.should_yield_to_host()
    }

    /// Runs `f` with `priority_level` as the current priority, restoring the
    /// previous level afterwards even if `f` panics.
    pub fn run_with_priority<R>(&self, priority_level: PriorityLevel, f: impl FnOnce() -> R) -> R {
        let _restore = PriorityScope::enter(&self.inner.current_priority_level, priority_level);
        f()
    }

    /// Runs `f` at Normal priority, or at the current level if that is already
    /// lower than Normal.
    pub fn next<R>(&self, f: impl FnOnce() -> R) -> R {
        let priority_level = match self.inner.current_priority_level.get() {
            PriorityLevel::Immediate | PriorityLevel::UserBlocking | PriorityLevel::Normal => {
                PriorityLevel::Normal
            }
            lower => lower,
        };
        self.run_with_priority(priority_level, f)
    }

    /// Captures the current priority; every call of the returned closure runs
    /// `f` at that priority, whatever the priority is at call time.
    pub fn wrap_callback<F, R>(&self, mut f: F) -> impl FnMut() -> R + use<F, R>
    where
        F: FnMut() -> R,
    {
        let parent_priority_level = self.inner.current_priority_level.get();
        let scheduler = self.clone();
        move || scheduler.run_with_priority(parent_priority_level, &mut f)
    }

    pub fn get_current_priority_level(&self) -> PriorityLevel {
        self.inner.current_priority_level.get()
    }

    /// Head of the ready queue, if any.
    pub fn get_first_callback_node(&self) -> Option<Task> {
        self.inner.peek_task()
    }

    /// Sets the time-slice length to `floor(1000 / fps)` ms. Rates outside
    /// `(0, 125]` are logged and rejected, keeping the current slice.
    pub fn force_frame_rate(&self, fps: f64) -> Result<()> {
        self.inner.host.force_frame_rate(fps)
    }

    pub fn reset_frame_rate(&self) {
        self.inner.host.reset_frame_rate();
    }

    pub fn frame_interval(&self) -> f64 {
        self.inner.host.frame_interval()
    }

    pub fn request_paint(&self) {
        self.inner.needs_paint.set(true);
    }

    pub fn pause_execution(&self) {
        self.inner.is_paused.set(true);
    }

    pub fn continue_execution(&self) {
        let inner = &self.inner;
        inner.is_paused.set(false);
        if !inner.task_queue.borrow().is_empty() {
            inner.ensure_host_callback();
        } else if !inner.is_host_timeout_scheduled.get() && !inner.is_performing_work.get() {
            let now = inner.clock.now();
            inner.arm_timeout_for_first_timer(now);
        }
    }

    pub fn is_paused(&self) -> bool {
        self.inner.is_paused.get()
    }

    /// True while any task that still has work is queued, ready or delayed.
    pub fn has_pending_work(&self) -> bool {
        live_tasks(&self.inner.task_queue) + live_tasks(&self.inner.timer_queue) > 0
    }

    pub fn start_logging_profiling_events(&self) {
        self.inner.profiler.borrow_mut().start_logging();
    }

    /// Stops logging and hands back everything logged since it started.
    pub fn stop_logging_profiling_events(&self) -> Vec<ProfilingEvent> {
        self.inner.profiler.borrow_mut().stop_logging()
    }

    pub fn profiling_events(&self) -> Vec<ProfilingEvent> {
        self.inner.profiler.borrow().events()
    }

    pub fn is_profiling(&self) -> bool {
        self.inner.profiler.borrow().is_logging()
    }

    pub fn metrics(&self) -> SchedulerMetrics {
        let pending = live_tasks(&self.inner.task_queue);
        let delayed = live_tasks(&self.inner.timer_queue);
        self.inner.profiler.borrow().metrics(pending, delayed)
    }

    pub fn queue_snapshot(&self) -> QueueSnapshot {
        let list = |queue: &RefCell<MinHeap<Task>>, kind: QueueKind| {
            let mut tasks: Vec<TaskInfo> =
                queue.borrow().iter().map(|t| TaskInfo::of(t, kind)).collect();
            tasks.sort_by(|a, b| {
                a.sort_index
                    .total_cmp(&b.sort_index)
                    .then_with(|| a.id.cmp(&b.id))
            });
            tasks
        };
        QueueSnapshot {
            ready: list(&self.inner.task_queue, QueueKind::Ready),
            delayed: list(&self.inner.timer_queue, QueueKind::Delayed),
        }
    }
}

fn live_tasks(queue: &RefCell<MinHeap<Task>>) -> usize {
    queue.borrow().iter().filter(|t| t.has_callback()).count()
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("host", &self.inner.host.kind())
            .field("ready", &self.inner.task_queue.borrow().len())
            .field("delayed", &self.inner.timer_queue.borrow().len())
            .field("current_priority_level", &self.inner.current_priority_level.get())
            .field("is_performing_work", &self.inner.is_performing_work.get())
            .finish()
    }
}

impl Inner {
    fn peek_task(&self) -> Option<Task> {
        self.task_queue.borrow().peek().cloned()
    }

    fn peek_timer(&self) -> Option<Task> {
        self.timer_queue.borrow().peek().cloned()
    }

    fn schedule(
        &self,
        priority_level: PriorityLevel,
        callback: crate::task::Callback,
        options: ScheduleOptions,
    ) -> Task {
        let current_time = self.clock.now();
        let start_time = match options.delay {
            Some(delay) if delay > 0.0 => current_time + delay,
            _ => current_time,
        };
        let expiration_time = start_time + self.timeouts.timeout(priority_level);

        let id = self.task_id_counter.get();
        self.task_id_counter.set(id + 1);
        let task = Task::new(id, callback, priority_level, start_time, expiration_time);

        if start_time > current_time {
            // Delayed task.
            task.set_sort_index(start_time);
            self.timer_queue.borrow_mut().push(task.clone());
            tracing::trace!(task_id = id, %priority_level, start_time, "delayed task queued");

            let is_first_timer = self.peek_timer().as_ref() == Some(&task);
            if self.task_queue.borrow().is_empty() && is_first_timer {
                // All ready work is done and this is the earliest delay.
                if self.is_host_timeout_scheduled.get() {
                    self.host.cancel_host_timeout();
                } else {
                    self.is_host_timeout_scheduled.set(true);
                }
                self.request_host_timeout(start_time - current_time);
            }
        } else {
            task.set_sort_index(expiration_time);
            self.task_queue.borrow_mut().push(task.clone());
            self.profiler.borrow_mut().mark_task_start(&task, current_time);
            task.set_queued(true);
            tracing::trace!(task_id = id, %priority_level, expiration_time, "task queued");

            // Wait until the next time we yield if we're already performing work.
            self.ensure_host_callback();
        }
        task
    }

    fn cancel(&self, task: &Task) {
        if task.is_queued() {
            let now = self.clock.now();
            self.profiler.borrow_mut().mark_task_canceled(task, now);
            task.set_queued(false);
        }
        task.mark_cancelled();
        // Dropped outside of any queue borrow; the closure may own scheduler handles.
        drop(task.take_callback());
        tracing::trace!(task_id = task.id(), "task cancelled");
    }

    fn ensure_host_callback(&self) {
        if self.is_host_callback_scheduled.get()
            || self.is_performing_work.get()
            || self.is_paused.get()
        {
            return;
        }
        self.is_host_callback_scheduled.set(true);
        self.request_host_callback();
    }

    fn request_host_callback(&self) {
        self.host.request_host_callback(self.slice_tick());
    }

    fn continue_message_loop(&self) {
        self.host.continue_message_loop(self.slice_tick());
    }

    /// Host task that runs the next slice, if the scheduler is still alive.
    fn slice_tick(&self) -> HostTask {
        let this = self.this.clone();
        Box::new(move || match this.upgrade() {
            Some(inner) => inner.perform_work_until_deadline(),
            None => tracing::warn!("host callback delivered after the scheduler was dropped"),
        })
    }

    fn request_host_timeout(&self, delay_ms: f64) {
        let this = self.this.clone();
        self.host.request_host_timeout(
            delay_ms,
            Box::new(move || match this.upgrade() {
                Some(inner) => {
                    inner.host.host_timeout_fired();
                    let now = inner.clock.now();
                    inner.handle_timeout(now);
                }
                None => tracing::warn!("host timeout delivered after the scheduler was dropped"),
            }),
        );
    }

    fn arm_timeout_for_first_timer(&self, current_time: f64) {
        if let Some(first_timer) = self.peek_timer() {
            self.is_host_timeout_scheduled.set(true);
            self.request_host_timeout(first_timer.start_time() - current_time);
        }
    }

    /// Moves every delayed task whose start time has come into the ready queue.
    fn advance_timers(&self, current_time: f64) {
        while let Some(timer) = self.peek_timer() {
            if !timer.has_callback() {
                // Cancelled while waiting.
                self.timer_queue.borrow_mut().pop();
            } else if timer.start_time() <= current_time {
                self.timer_queue.borrow_mut().pop();
                timer.set_sort_index(timer.expiration_time());
                self.task_queue.borrow_mut().push(timer.clone());
                self.profiler.borrow_mut().mark_task_start(&timer, current_time);
                timer.set_queued(true);
            } else {
                // Remaining timers are pending.
                return;
            }
        }
    }

    fn handle_timeout(&self, current_time: f64) {
        self.is_host_timeout_scheduled.set(false);
        self.advance_timers(current_time);

        if !self.is_host_callback_scheduled.get() {
            if !self.task_queue.borrow().is_empty() {
                self.ensure_host_callback();
            } else {
                self.arm_timeout_for_first_timer(current_time);
            }
        }
    }

    fn perform_work_until_deadline(&self) {
        if !self.host.is_message_loop_running() {
            return;
        }
        let current_time = self.clock.now();
        // Keep track of the start time so we can measure how long the main
        // thread has been blocked.
        self.host.start_slice(current_time);
        self.needs_paint.set(false);

        // If the work panics, the guard still re-arms the loop so the next
        // task gets its turn.
        let mut slice = SliceGuard {
            inner: self,
            has_more_work: true,
        };
        slice.has_more_work = self.flush_work(true, current_time);
    }

    fn flush_work(&self, has_time_remaining: bool, initial_time: f64) -> bool {
        // We'll need a host callback the next time work is scheduled.
        self.is_host_callback_scheduled.set(false);
        if self.is_host_timeout_scheduled.get() {
            // We scheduled a timeout but it's no longer needed.
            self.is_host_timeout_scheduled.set(false);
            self.host.cancel_host_timeout();
        }

        self.is_performing_work.set(true);
        let _flush = FlushGuard {
            inner: self,
            previous_priority_level: self.current_priority_level.get(),
        };
        self.profiler.borrow_mut().mark_scheduler_unsuspended(initial_time);
        self.work_loop(has_time_remaining, initial_time)
    }

    fn work_loop(&self, has_time_remaining: bool, initial_time: f64) -> bool {
        let mut current_time = initial_time;
        self.advance_timers(current_time);

        while let Some(task) = self.peek_task() {
            if self.is_paused.get() {
                // continue_execution re-arms the host.
                return false;
            }
            if task.expiration_time() > current_time
                && (!has_time_remaining || self.should_yield_to_host())
            {
                // This task hasn't expired, and we've reached the deadline.
                return true;
            }

            match task.take_callback() {
                Some(callback) => {
                    *self.current_task.borrow_mut() = Some(task.clone());
                    self.current_priority_level.set(task.priority_level());
                    let did_user_callback_timeout = task.expiration_time() <= current_time;
                    self.profiler.borrow_mut().mark_task_run(&task, current_time);
                    tracing::trace!(task_id = task.id(), did_user_callback_timeout, "running task");

                    let result = callback(did_user_callback_timeout);
                    current_time = self.clock.now();

                    match result {
                        WorkResult::Continue(continuation) if !task.is_cancelled() => {
                            task.set_callback(continuation);
                            self.profiler.borrow_mut().mark_task_yield(&task, current_time);
                        }
                        _ => {
                            if !task.is_cancelled() {
                                self.profiler
                                    .borrow_mut()
                                    .mark_task_completed(&task, current_time);
                                task.set_queued(false);
                            }
                            if self.peek_task().as_ref() == Some(&task) {
                                self.task_queue.borrow_mut().pop();
                            }
                        }
                    }
                    *self.current_task.borrow_mut() = None;
                    self.advance_timers(current_time);
                }
                None => {
                    self.task_queue.borrow_mut().pop();
                }
            }
        }

        self.arm_timeout_for_first_timer(current_time);
        false
    }

    fn should_yield_to_host(&self) -> bool {
        let time_elapsed = self.host.time_elapsed(self.clock.now());
        if time_elapsed < self.host.frame_interval() {
            // The main thread has only been blocked for a really short amount
            // of time; smaller than a single frame. Don't yield yet.
            return false;
        }

        let Some(input_pending) = self.input_pending.as_ref() else {
            return true;
        };
        if self.needs_paint.get() {
            return true;
        }
        if time_elapsed < self.continuous_input_interval {
            return input_pending(InputQuery::Discrete);
        }
        if time_elapsed < self.max_yield_interval {
            return input_pending(InputQuery::IncludeContinuous);
        }
        true
    }
}

/// Restores the previous current priority on drop.
struct PriorityScope<'a> {
    cell: &'a Cell<PriorityLevel>,
    previous: PriorityLevel,
}

impl<'a> PriorityScope<'a> {
    fn enter(cell: &'a Cell<PriorityLevel>, priority_level: PriorityLevel) -> Self {
        let previous = cell.replace(priority_level);
        Self { cell, previous }
    }
}

impl Drop for PriorityScope<'_> {
    fn drop(&mut self) {
        self.cell.set(self.previous);
    }
}

struct FlushGuard<'a> {
    inner: &'a Inner,
    previous_priority_level: PriorityLevel,
}

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        let inner = self.inner;
        let now = inner.clock.now();
        let unfinished = inner.current_task.borrow_mut().take();
        if let Some(task) = unfinished {
            // Only reachable when a unit of work panicked.
            tracing::error!(task_id = task.id(), "task panicked");
            inner.profiler.borrow_mut().mark_task_errored(&task, now);
            task.set_queued(false);
            task.mark_cancelled();
        }
        inner.current_priority_level.set(self.previous_priority_level);
        inner.is_performing_work.set(false);
        inner.profiler.borrow_mut().mark_scheduler_suspended(now);
    }
}

struct SliceGuard<'a> {
    inner: &'a Inner,
    has_more_work: bool,
}

impl Drop for SliceGuard<'_> {
    fn drop(&mut self) {
        if self.has_more_work {
            // Yield to the host and pick up where we left off next slice.
            self.inner.continue_message_loop();
        } else {
            self.inner.host.stop_message_loop();
        }
    }
}
