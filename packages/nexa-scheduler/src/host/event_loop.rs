use super::{HostKind, HostPlatform, HostTask, TimeoutHandle, TimerTable, delay_duration};
use crate::clock::{Clock, MonotonicClock};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

/// Single-threaded event loop on top of std, in real time.
///
/// In channel mode posted tasks go to a queue that is drained before any
/// timer. In timer-only mode every posted task becomes a timeout of at least
/// `min_delay_ms`, the way environments without a message primitive behave.
pub struct EventLoopHost {
    clock: Rc<dyn Clock>,
    min_post_delay: Option<f64>,
    posted: RefCell<VecDeque<HostTask>>,
    timers: RefCell<TimerTable>,
}

impl EventLoopHost {
    pub fn new() -> Self {
        Self::with_clock(Rc::new(MonotonicClock::new()))
    }

    pub fn with_clock(clock: Rc<dyn Clock>) -> Self {
        Self {
            clock,
            min_post_delay: None,
            posted: RefCell::new(VecDeque::new()),
            timers: RefCell::new(TimerTable::default()),
        }
    }

    pub fn timer_only(min_delay_ms: f64) -> Self {
        Self {
            min_post_delay: Some(min_delay_ms.max(0.0)),
            ..Self::new()
        }
    }

    pub fn is_idle(&self) -> bool {
        self.posted.borrow().is_empty() && self.timers.borrow().is_empty()
    }

    /// Runs one turn: every posted task queued at the start of the turn, then
    /// every timer that is due. Returns false if the loop is idle.
    pub fn turn(&self) -> bool {
        if self.is_idle() {
            return false;
        }

        let batch: Vec<HostTask> = self.posted.borrow_mut().drain(..).collect();
        for task in batch {
            task();
        }

        let now = self.clock.now();
        let due = self.timers.borrow_mut().drain_due(now);
        for task in due {
            task();
        }
        true
    }

    /// Runs until nothing is posted and no timer is pending, sleeping while
    /// only future timers remain. Timers at infinity are left pending.
    pub fn run(&self) {
        loop {
            if !self.posted.borrow().is_empty() {
                self.turn();
                continue;
            }
            let next_due = self.timers.borrow().next_due();
            let Some(due) = next_due else { break };
            if !due.is_finite() {
                // Never falls due.
                break;
            }
            let wait = due - self.clock.now();
            if wait > 0.0 {
                std::thread::sleep(delay_duration(wait));
            }
            self.turn();
        }
    }
}

impl Default for EventLoopHost {
    fn default() -> Self {
        Self::new()
    }
}

impl HostPlatform for EventLoopHost {
    fn kind(&self) -> HostKind {
        if self.min_post_delay.is_some() {
            HostKind::Timer
        } else {
            HostKind::MessageChannel
        }
    }

    fn clock(&self) -> Rc<dyn Clock> {
        self.clock.clone()
    }

    fn post_task(&self, task: HostTask) {
        match self.min_post_delay {
            Some(delay) => {
                self.set_timeout(delay, task);
            }
            None => self.posted.borrow_mut().push_back(task),
        }
    }

    fn set_timeout(&self, delay_ms: f64, task: HostTask) -> TimeoutHandle {
        let due = self.clock.now() + delay_ms.max(0.0);
        self.timers.borrow_mut().insert(due, task)
    }

    fn clear_timeout(&self, handle: TimeoutHandle) {
        self.timers.borrow_mut().remove(handle);
    }
}
