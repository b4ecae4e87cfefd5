use nexa_scheduler::{ManualClock, PriorityLevel, Scheduler, VirtualHost, WorkResult};
use std::cell::RefCell;
use std::rc::Rc;

type Log = Rc<RefCell<Vec<String>>>;

fn setup() -> (Rc<VirtualHost>, Scheduler) {
    let host = Rc::new(VirtualHost::new());
    let scheduler = Scheduler::new(host.clone());
    (host, scheduler)
}

/// A unit of work that takes `cost` ms of (virtual) time.
fn busy(log: &Log, clock: &Rc<ManualClock>, label: &str, cost: f64) -> impl FnOnce(bool) -> WorkResult + use<> {
    let log = log.clone();
    let clock = clock.clone();
    let label = label.to_string();
    move |_| {
        log.borrow_mut().push(label);
        clock.advance(cost);
        WorkResult::Done
    }
}

/// Runs `total` steps of `cost` ms each, returning a continuation between steps.
fn steps(log: Log, clock: Rc<ManualClock>, label: &'static str, step: u32, total: u32, cost: f64) -> WorkResult {
    log.borrow_mut().push(format!("{label}{step}"));
    clock.advance(cost);
    if step < total {
        WorkResult::continue_with(move |_| steps(log, clock, label, step + 1, total, cost))
    } else {
        WorkResult::Done
    }
}

#[test]
fn test_yields_once_the_slice_is_used_up() {
    let (host, scheduler) = setup();
    let clock = host.manual_clock();
    let log: Log = Rc::default();

    for label in ["a", "b", "c"] {
        scheduler.schedule_callback(PriorityLevel::Normal, busy(&log, &clock, label, 3.0));
    }

    // 0ms and 3ms are inside the 5ms slice; at 6ms the loop yields.
    assert!(host.run_posted_task());
    assert_eq!(*log.borrow(), vec!["a", "b"]);
    assert!(host.has_posted_task(), "the scheduler re-armed itself");
    assert!(scheduler.has_pending_work());

    assert!(host.run_posted_task());
    assert_eq!(*log.borrow(), vec!["a", "b", "c"]);
    assert!(!host.has_posted_task());
}

#[test]
fn test_continuation_keeps_its_place() {
    let (host, scheduler) = setup();
    let clock = host.manual_clock();
    let log: Log = Rc::default();

    let task = {
        let (log, clock) = (log.clone(), clock.clone());
        scheduler.schedule_callback(PriorityLevel::Normal, move |_| steps(log, clock, "a", 1, 3, 3.0))
    };
    scheduler.schedule_callback(PriorityLevel::Normal, busy(&log, &clock, "b", 0.0));

    assert!(host.run_posted_task());
    assert_eq!(*log.borrow(), vec!["a1", "a2"]);
    // Still the head, with its original ordering key.
    assert_eq!(scheduler.get_first_callback_node(), Some(task.clone()));
    assert_eq!(task.sort_index(), 5000.0);
    assert!(task.has_callback());

    host.flush_posted();
    assert_eq!(*log.borrow(), vec!["a1", "a2", "a3", "b"]);
}

#[test]
fn test_should_yield_tracks_the_current_slice() {
    let (host, scheduler) = setup();
    let clock = host.manual_clock();
    let observed = Rc::new(RefCell::new(Vec::new()));

    {
        let (sch, clock, observed) = (scheduler.clone(), clock.clone(), observed.clone());
        scheduler.schedule_callback(PriorityLevel::Normal, move |_| {
            observed.borrow_mut().push(sch.should_yield());
            clock.advance(4.0);
            observed.borrow_mut().push(sch.should_yield());
            clock.advance(1.0);
            observed.borrow_mut().push(sch.should_yield());
            WorkResult::Done
        });
    }

    host.flush_posted();
    assert_eq!(*observed.borrow(), vec![false, false, true]);
}

#[test]
fn test_expired_work_does_not_yield() {
    let (host, scheduler) = setup();
    let clock = host.manual_clock();
    let log: Log = Rc::default();

    for label in ["a", "b", "c", "d"] {
        scheduler.schedule_callback(PriorityLevel::Immediate, busy(&log, &clock, label, 10.0));
    }

    // Immediate work is born expired, so one slice runs all of it.
    assert!(host.run_posted_task());
    assert_eq!(log.borrow().len(), 4);
    assert!(!host.has_posted_task());
}

#[test]
fn test_callback_learns_when_it_is_overdue() {
    let (host, scheduler) = setup();
    let clock = host.manual_clock();
    let seen = Rc::new(RefCell::new(Vec::new()));

    for priority in [PriorityLevel::UserBlocking, PriorityLevel::Normal] {
        let seen = seen.clone();
        scheduler.schedule_callback(priority, move |did_timeout| {
            seen.borrow_mut().push((priority, did_timeout));
            WorkResult::Done
        });
    }

    // Past the 250ms UserBlocking window, inside the Normal one.
    clock.advance(300.0);
    host.flush_posted();
    assert_eq!(
        *seen.borrow(),
        vec![(PriorityLevel::UserBlocking, true), (PriorityLevel::Normal, false)]
    );
}

#[test]
fn test_current_priority_inside_a_task() {
    let (host, scheduler) = setup();
    let seen = Rc::new(RefCell::new(Vec::new()));

    for priority in [PriorityLevel::Low, PriorityLevel::UserBlocking] {
        let (sch, seen) = (scheduler.clone(), seen.clone());
        scheduler.schedule_callback(priority, move |_| {
            seen.borrow_mut().push(sch.get_current_priority_level());
            WorkResult::Done
        });
    }

    scheduler.run_with_priority(PriorityLevel::Idle, || host.flush_posted());
    assert_eq!(*seen.borrow(), vec![PriorityLevel::UserBlocking, PriorityLevel::Low]);
    assert_eq!(scheduler.get_current_priority_level(), PriorityLevel::Normal);
}
