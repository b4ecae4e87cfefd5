use super::{HostKind, HostPlatform, HostTask, TimeoutHandle, TimerTable};
use crate::clock::{Clock, ManualClock};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

/// Deterministic platform for tests and simulations.
///
/// Nothing runs until the owner drives it. Time comes from a [`ManualClock`]
/// and only moves through [`VirtualHost::advance_time`], [`VirtualHost::run_until_idle`]
/// or by advancing the clock directly (e.g. from inside a unit of work to
/// simulate an expensive step).
pub struct VirtualHost {
    clock: Rc<ManualClock>,
    posted: RefCell<VecDeque<HostTask>>,
    timers: RefCell<TimerTable>,
}

impl VirtualHost {
    pub fn new() -> Self {
        Self::with_clock(Rc::new(ManualClock::new()))
    }

    pub fn with_clock(clock: Rc<ManualClock>) -> Self {
        Self {
            clock,
            posted: RefCell::new(VecDeque::new()),
            timers: RefCell::new(TimerTable::default()),
        }
    }

    pub fn manual_clock(&self) -> Rc<ManualClock> {
        self.clock.clone()
    }

    pub fn now(&self) -> f64 {
        self.clock.now()
    }

    pub fn has_posted_task(&self) -> bool {
        !self.posted.borrow().is_empty()
    }

    pub fn pending_timeouts(&self) -> usize {
        self.timers.borrow().len()
    }

    pub fn next_timeout_due(&self) -> Option<f64> {
        self.timers.borrow().next_due()
    }

    /// Runs one posted task. Returns false if nothing was posted.
    pub fn run_posted_task(&self) -> bool {
        let task = self.posted.borrow_mut().pop_front();
        match task {
            Some(task) => {
                task();
                true
            }
            None => false,
        }
    }

    /// Runs posted tasks, including ones posted along the way, until none are
    /// left. Time does not move. Returns how many ran.
    pub fn flush_posted(&self) -> usize {
        let mut ran = 0;
        while self.run_posted_task() {
            ran += 1;
        }
        ran
    }

    /// Moves the clock forward by `ms`, firing each timeout that falls due at
    /// its own due time. Posted tasks are left for the caller to flush.
    pub fn advance_time(&self, ms: f64) {
        let target = self.clock.now() + ms;
        loop {
            let next = self.timers.borrow_mut().pop_due(target);
            let Some((due, task)) = next else { break };
            if due > self.clock.now() {
                self.clock.set(due);
            }
            task();
        }
        if target > self.clock.now() {
            self.clock.set(target);
        }
    }

    /// Flushes posted work, then jumps the clock to each pending timeout in
    /// turn, until the platform has nothing left to do.
    pub fn run_until_idle(&self) {
        loop {
            self.flush_posted();
            let Some(due) = self.next_timeout_due() else { break };
            let wait = (due - self.clock.now()).max(0.0);
            self.advance_time(wait);
        }
    }
}

impl Default for VirtualHost {
    fn default() -> Self {
        Self::new()
    }
}

impl HostPlatform for VirtualHost {
    fn kind(&self) -> HostKind {
        HostKind::MessageChannel
    }

    fn clock(&self) -> Rc<dyn Clock> {
        self.clock.clone()
    }

    fn post_task(&self, task: HostTask) {
        self.posted.borrow_mut().push_back(task);
    }

    fn set_timeout(&self, delay_ms: f64, task: HostTask) -> TimeoutHandle {
        let due = self.clock.now() + delay_ms.max(0.0);
        self.timers.borrow_mut().insert(due, task)
    }

    fn clear_timeout(&self, handle: TimeoutHandle) {
        self.timers.borrow_mut().remove(handle);
    }
}
