//! Bridge between the scheduler and whatever gives the thread back to it.
//!
//! A [`HostPlatform`] knows two things: how to run a closure "soon" and how to
//! run one after a delay. The scheduler never talks to a platform directly; it
//! goes through [`HostBridge`], which keeps at most one immediate callback and
//! one timeout outstanding and owns the time-slice bookkeeping.

pub mod event_loop;
#[cfg(feature = "tokio")]
pub mod tokio_host;
pub mod virtual_host;

use crate::clock::Clock;
use crate::config::MAX_FRAME_RATE;
use crate::error::{Result, SchedulerError};
use crate::heap::{HeapNode, MinHeap};
use slotmap::{Key, KeyData, SlotMap, new_key_type};
use smallvec::SmallVec;
use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

pub use event_loop::EventLoopHost;
#[cfg(feature = "tokio")]
pub use tokio_host::{TokioClock, TokioHost};
pub use virtual_host::VirtualHost;

pub type HostTask = Box<dyn FnOnce()>;

/// Opaque handle for a pending platform timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeoutHandle(pub u64);

/// The kind of "run me soon" primitive a platform offers, most preferred first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HostKind {
    /// Same-thread message queue, drained before timers.
    MessageChannel,
    /// Macrotask-speed "run on the next turn".
    Immediate,
    /// Minimal-delay timer; slowest, always available.
    Timer,
}

pub trait HostPlatform {
    fn kind(&self) -> HostKind;

    /// The clock this platform measures its delays against.
    fn clock(&self) -> Rc<dyn Clock>;

    /// Run `task` as soon as the platform gets control back.
    fn post_task(&self, task: HostTask);

    /// Run `task` once `delay_ms` have elapsed.
    fn set_timeout(&self, delay_ms: f64, task: HostTask) -> TimeoutHandle;

    /// Forget a pending timeout. Clearing a fired or unknown handle does nothing.
    fn clear_timeout(&self, handle: TimeoutHandle);
}

/// Picks the most preferred platform among those the environment provides.
pub fn select_platform<I>(candidates: I) -> Option<Rc<dyn HostPlatform>>
where
    I: IntoIterator<Item = Rc<dyn HostPlatform>>,
{
    candidates.into_iter().min_by_key(|platform| platform.kind())
}

pub(crate) struct HostBridge {
    platform: Rc<dyn HostPlatform>,
    is_message_loop_running: Cell<bool>,
    timeout_handle: Cell<Option<TimeoutHandle>>,
    frame_interval: Cell<f64>,
    default_frame_interval: f64,
    start_time: Cell<f64>,
}

impl HostBridge {
    pub fn new(platform: Rc<dyn HostPlatform>, frame_interval: f64) -> Self {
        Self {
            platform,
            is_message_loop_running: Cell::new(false),
            timeout_handle: Cell::new(None),
            frame_interval: Cell::new(frame_interval),
            default_frame_interval: frame_interval,
            start_time: Cell::new(-1.0),
        }
    }

    pub fn kind(&self) -> HostKind {
        self.platform.kind()
    }

    pub fn is_message_loop_running(&self) -> bool {
        self.is_message_loop_running.get()
    }

    /// Starts the message loop unless it is already running.
    pub fn request_host_callback(&self, tick: HostTask) {
        if !self.is_message_loop_running.replace(true) {
            tracing::debug!(kind = ?self.platform.kind(), "arming host callback");
            self.platform.post_task(tick);
        }
    }

    /// Posts the next slice of an already running message loop.
    pub fn continue_message_loop(&self, tick: HostTask) {
        self.platform.post_task(tick);
    }

    pub fn stop_message_loop(&self) {
        self.is_message_loop_running.set(false);
    }

    pub fn request_host_timeout(&self, delay_ms: f64, task: HostTask) {
        self.cancel_host_timeout();
        tracing::debug!(delay_ms, "arming host timeout");
        let handle = self.platform.set_timeout(delay_ms, task);
        self.timeout_handle.set(Some(handle));
    }

    pub fn cancel_host_timeout(&self) {
        if let Some(handle) = self.timeout_handle.take() {
            tracing::debug!(?handle, "cancelling host timeout");
            self.platform.clear_timeout(handle);
        }
    }

    /// Called from the timeout itself; the handle is spent.
    pub fn host_timeout_fired(&self) {
        self.timeout_handle.set(None);
    }

    pub fn start_slice(&self, now: f64) {
        self.start_time.set(now);
    }

    pub fn time_elapsed(&self, now: f64) -> f64 {
        now - self.start_time.get()
    }

    pub fn frame_interval(&self) -> f64 {
        self.frame_interval.get()
    }

    pub fn force_frame_rate(&self, fps: f64) -> Result<()> {
        if !(fps > 0.0 && fps <= MAX_FRAME_RATE) {
            tracing::error!(
                fps,
                "forcing frame rates higher than 125 fps is not supported; keeping {}ms slices",
                self.frame_interval.get()
            );
            return Err(SchedulerError::InvalidFrameRate(fps));
        }
        self.frame_interval.set((1000.0 / fps).floor());
        Ok(())
    }

    pub fn reset_frame_rate(&self) {
        self.frame_interval.set(self.default_frame_interval);
    }
}

new_key_type! {
    pub(crate) struct TimeoutKey;
}

fn handle_for(key: TimeoutKey) -> TimeoutHandle {
    TimeoutHandle(key.data().as_ffi())
}

fn key_for(handle: TimeoutHandle) -> TimeoutKey {
    TimeoutKey::from(KeyData::from_ffi(handle.0))
}

/// Converts a millisecond delay for the real-time platforms. Saturates
/// instead of panicking on delays too large for a `Duration`.
pub(crate) fn delay_duration(delay_ms: f64) -> Duration {
    if delay_ms.is_nan() || delay_ms <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(delay_ms / 1000.0).unwrap_or(Duration::MAX)
}

#[derive(Debug, Clone, Copy)]
struct DueEntry {
    due: f64,
    seq: u64,
    key: TimeoutKey,
}

impl HeapNode for DueEntry {
    fn sort_index(&self) -> f64 {
        self.due
    }

    fn id(&self) -> u64 {
        self.seq
    }
}

/// Pending timeouts shared by the std-based platforms. Ties on `due` fire in
/// the order they were set.
///
/// Cleared timeouts leave a stale entry in `order`; the head of `order` is
/// always live (or the heap is empty).
#[derive(Default)]
pub(crate) struct TimerTable {
    timers: SlotMap<TimeoutKey, HostTask>,
    order: MinHeap<DueEntry>,
    seq: u64,
}

impl TimerTable {
    pub fn insert(&mut self, due: f64, task: HostTask) -> TimeoutHandle {
        self.seq += 1;
        let key = self.timers.insert(task);
        self.order.push(DueEntry {
            due,
            seq: self.seq,
            key,
        });
        handle_for(key)
    }

    pub fn remove(&mut self, handle: TimeoutHandle) -> bool {
        let removed = self.timers.remove(key_for(handle)).is_some();
        if removed {
            self.prune();
            self.compact();
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    pub fn next_due(&self) -> Option<f64> {
        self.order.peek().map(|entry| entry.due)
    }

    /// Removes the earliest timeout if it is due at `now`.
    pub fn pop_due(&mut self, now: f64) -> Option<(f64, HostTask)> {
        let head = self.order.peek()?;
        if head.due > now {
            return None;
        }
        let entry = self.order.pop()?;
        let task = self.timers.remove(entry.key);
        self.prune();
        task.map(|task| (entry.due, task))
    }

    /// Removes every timeout due at `now`, earliest first.
    pub fn drain_due(&mut self, now: f64) -> SmallVec<[HostTask; 4]> {
        let mut due = SmallVec::new();
        while let Some((_, task)) = self.pop_due(now) {
            due.push(task);
        }
        due
    }

    fn prune(&mut self) {
        while let Some(head) = self.order.peek() {
            if self.timers.contains_key(head.key) {
                return;
            }
            self.order.pop();
        }
    }

    // Rebuilds the heap once stale entries outnumber live ones.
    fn compact(&mut self) {
        if self.order.len() <= 2 * self.timers.len() + 64 {
            return;
        }
        let mut order = MinHeap::with_capacity(self.timers.len());
        for entry in self.order.iter() {
            if self.timers.contains_key(entry.key) {
                order.push(*entry);
            }
        }
        self.order = order;
    }

    #[cfg(test)]
    fn stale_entries(&self) -> usize {
        self.order.len() - self.timers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn recorder(log: &Rc<RefCell<Vec<&'static str>>>, name: &'static str) -> HostTask {
        let log = log.clone();
        Box::new(move || log.borrow_mut().push(name))
    }

    #[test]
    fn test_timer_table_orders_by_due_then_insertion() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut table = TimerTable::default();
        table.insert(20.0, recorder(&log, "late"));
        table.insert(10.0, recorder(&log, "first"));
        table.insert(10.0, recorder(&log, "second"));
        table.insert(30.0, recorder(&log, "never"));

        assert_eq!(table.next_due(), Some(10.0));
        for task in table.drain_due(25.0) {
            task();
        }
        assert_eq!(*log.borrow(), vec!["first", "second", "late"]);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_timer_table_remove_is_idempotent() {
        let mut table = TimerTable::default();
        let handle = table.insert(5.0, Box::new(|| {}));
        assert!(table.remove(handle));
        assert!(!table.remove(handle));
        assert!(table.is_empty());
    }

    #[test]
    fn test_timer_table_skips_cleared_timeouts() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut table = TimerTable::default();
        let first = table.insert(1.0, recorder(&log, "cleared head"));
        let middle = table.insert(2.0, recorder(&log, "cleared middle"));
        table.insert(3.0, recorder(&log, "kept"));

        assert!(table.remove(first));
        assert_eq!(table.next_due(), Some(2.0));
        assert!(table.remove(middle));
        assert_eq!(table.next_due(), Some(3.0));
        assert_eq!(table.stale_entries(), 0);

        for task in table.drain_due(10.0) {
            task();
        }
        assert_eq!(*log.borrow(), vec!["kept"]);
        assert!(table.is_empty());
        assert_eq!(table.next_due(), None);
    }

    #[test]
    fn test_timer_table_compacts_after_many_clears() {
        let fired = Rc::new(RefCell::new(Vec::new()));
        let mut table = TimerTable::default();
        let mut handles = Vec::new();
        for i in 0..400u32 {
            let fired = fired.clone();
            // Reverse due order so clears land away from the head.
            let due = f64::from(400 - i);
            handles.push((i, table.insert(due, Box::new(move || fired.borrow_mut().push(i)))));
        }
        for (i, handle) in &handles {
            if i % 4 != 0 {
                assert!(table.remove(*handle));
            }
        }
        assert_eq!(table.len(), 100);
        assert!(table.stale_entries() <= 2 * table.len() + 64);

        for task in table.drain_due(f64::INFINITY) {
            task();
        }
        let expected: Vec<u32> = (0..400).rev().filter(|i| i % 4 == 0).collect();
        assert_eq!(*fired.borrow(), expected);
    }

    #[test]
    fn test_delay_duration_saturates() {
        assert_eq!(delay_duration(1500.0), Duration::from_millis(1500));
        assert_eq!(delay_duration(-3.0), Duration::ZERO);
        assert_eq!(delay_duration(f64::NAN), Duration::ZERO);
        assert_eq!(delay_duration(1e30), Duration::MAX);
        assert_eq!(delay_duration(f64::INFINITY), Duration::MAX);
    }

    #[test]
    fn test_select_platform_prefers_message_channel() {
        let timer_only: Rc<dyn HostPlatform> = Rc::new(EventLoopHost::timer_only(4.0));
        let channel: Rc<dyn HostPlatform> = Rc::new(EventLoopHost::new());

        let chosen = select_platform(vec![timer_only.clone(), channel]).unwrap();
        assert_eq!(chosen.kind(), HostKind::MessageChannel);

        let chosen = select_platform(vec![timer_only]).unwrap();
        assert_eq!(chosen.kind(), HostKind::Timer);

        assert!(select_platform(Vec::new()).is_none());
    }
}
