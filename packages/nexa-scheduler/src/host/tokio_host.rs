use super::{
    HostKind, HostPlatform, HostTask, TimeoutHandle, TimeoutKey, delay_duration, handle_for, key_for,
};
use crate::clock::Clock;
use slotmap::SlotMap;
use std::cell::RefCell;
use std::rc::Rc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Clock on tokio's time source, so paused test runtimes apply to it too.
#[derive(Debug, Clone, Copy)]
pub struct TokioClock {
    origin: Instant,
}

impl TokioClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TokioClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }
}

/// Platform backed by a tokio current-thread runtime.
///
/// Posted tasks and timeouts are spawned with [`tokio::task::spawn_local`], so
/// the host must be used from inside a [`tokio::task::LocalSet`].
pub struct TokioHost {
    clock: Rc<TokioClock>,
    timers: Rc<RefCell<SlotMap<TimeoutKey, JoinHandle<()>>>>,
}

impl TokioHost {
    pub fn new() -> Self {
        Self {
            clock: Rc::new(TokioClock::new()),
            timers: Rc::new(RefCell::new(SlotMap::with_key())),
        }
    }

    pub fn pending_timeouts(&self) -> usize {
        self.timers.borrow().len()
    }
}

impl Default for TokioHost {
    fn default() -> Self {
        Self::new()
    }
}

impl HostPlatform for TokioHost {
    fn kind(&self) -> HostKind {
        HostKind::Immediate
    }

    fn clock(&self) -> Rc<dyn Clock> {
        self.clock.clone()
    }

    fn post_task(&self, task: HostTask) {
        tokio::task::spawn_local(async move {
            task();
        });
    }

    fn set_timeout(&self, delay_ms: f64, task: HostTask) -> TimeoutHandle {
        let delay = delay_duration(delay_ms);
        let timers = Rc::downgrade(&self.timers);
        let key = self.timers.borrow_mut().insert_with_key(|key| {
            tokio::task::spawn_local(async move {
                tokio::time::sleep(delay).await;
                if let Some(timers) = timers.upgrade() {
                    timers.borrow_mut().remove(key);
                }
                task();
            })
        });
        handle_for(key)
    }

    fn clear_timeout(&self, handle: TimeoutHandle) {
        let removed = self.timers.borrow_mut().remove(key_for(handle));
        if let Some(join) = removed {
            join.abort();
        }
    }
}
