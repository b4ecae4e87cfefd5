use crate::heap::HeapNode;
use crate::priority::PriorityLevel;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

/// A unit of work. The argument is true when the task's deadline has already
/// passed by the time it runs.
pub type Callback = Box<dyn FnOnce(bool) -> WorkResult>;

/// What a unit of work reports back to the work loop.
pub enum WorkResult {
    /// Finished; the task leaves the queue.
    Done,
    /// Not finished; run this next, keeping the task's place in the queue.
    Continue(Callback),
}

impl WorkResult {
    pub fn continue_with<F>(f: F) -> Self
    where
        F: FnOnce(bool) -> WorkResult + 'static,
    {
        WorkResult::Continue(Box::new(f))
    }

    pub fn is_done(&self) -> bool {
        matches!(self, WorkResult::Done)
    }
}

impl fmt::Debug for WorkResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkResult::Done => f.write_str("Done"),
            WorkResult::Continue(_) => f.write_str("Continue(..)"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ScheduleOptions {
    /// Milliseconds to wait before the task becomes eligible to run.
    /// Non-positive values are ignored.
    pub delay: Option<f64>,
}

impl ScheduleOptions {
    pub fn delay(ms: f64) -> Self {
        Self { delay: Some(ms) }
    }
}

struct TaskInner {
    id: u64,
    callback: RefCell<Option<Callback>>,
    priority_level: PriorityLevel,
    start_time: f64,
    expiration_time: f64,
    sort_index: Cell<f64>,
    cancelled: Cell<bool>,
    // Profiling bookkeeping.
    is_queued: Cell<bool>,
}

/// Handle to a scheduled unit of work.
///
/// Cloning the handle does not clone the work; all clones refer to the same
/// task and compare equal.
#[derive(Clone)]
pub struct Task(Rc<TaskInner>);

impl Task {
    pub(crate) fn new(
        id: u64,
        callback: Callback,
        priority_level: PriorityLevel,
        start_time: f64,
        expiration_time: f64,
    ) -> Self {
        Task(Rc::new(TaskInner {
            id,
            callback: RefCell::new(Some(callback)),
            priority_level,
            start_time,
            expiration_time,
            sort_index: Cell::new(-1.0),
            cancelled: Cell::new(false),
            is_queued: Cell::new(false),
        }))
    }

    pub fn id(&self) -> u64 {
        self.0.id
    }

    pub fn priority_level(&self) -> PriorityLevel {
        self.0.priority_level
    }

    pub fn start_time(&self) -> f64 {
        self.0.start_time
    }

    pub fn expiration_time(&self) -> f64 {
        self.0.expiration_time
    }

    pub fn sort_index(&self) -> f64 {
        self.0.sort_index.get()
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.cancelled.get()
    }

    /// False once the work has been consumed, whether it finished, panicked
    /// or was cancelled. Also false while a slice of it is running.
    pub fn has_callback(&self) -> bool {
        self.0.callback.borrow().is_some()
    }

    pub(crate) fn set_sort_index(&self, sort_index: f64) {
        self.0.sort_index.set(sort_index);
    }

    pub(crate) fn mark_cancelled(&self) {
        self.0.cancelled.set(true);
    }

    pub(crate) fn take_callback(&self) -> Option<Callback> {
        self.0.callback.borrow_mut().take()
    }

    pub(crate) fn set_callback(&self, callback: Callback) {
        *self.0.callback.borrow_mut() = Some(callback);
    }

    pub(crate) fn is_queued(&self) -> bool {
        self.0.is_queued.get()
    }

    pub(crate) fn set_queued(&self, queued: bool) {
        self.0.is_queued.set(queued);
    }
}

impl HeapNode for Task {
    fn sort_index(&self) -> f64 {
        self.0.sort_index.get()
    }

    fn id(&self) -> u64 {
        self.0.id
    }
}

impl PartialEq for Task {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Task {}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.0.id)
            .field("priority_level", &self.0.priority_level)
            .field("start_time", &self.0.start_time)
            .field("expiration_time", &self.0.expiration_time)
            .field("sort_index", &self.0.sort_index.get())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
