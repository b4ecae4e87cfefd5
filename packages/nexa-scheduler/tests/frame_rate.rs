use nexa_scheduler::{PriorityLevel, Scheduler, SchedulerError, VirtualHost, WorkResult};
use std::cell::Cell;
use std::rc::Rc;

fn setup() -> (Rc<VirtualHost>, Scheduler) {
    let host = Rc::new(VirtualHost::new());
    let scheduler = Scheduler::new(host.clone());
    (host, scheduler)
}

#[test]
fn test_default_slice_is_five_ms() {
    let (_host, scheduler) = setup();
    assert_eq!(scheduler.frame_interval(), 5.0);
}

#[test]
fn test_valid_frame_rates_set_the_slice() {
    let (_host, scheduler) = setup();

    scheduler.force_frame_rate(60.0).unwrap();
    assert_eq!(scheduler.frame_interval(), 16.0);

    scheduler.force_frame_rate(125.0).unwrap();
    assert_eq!(scheduler.frame_interval(), 8.0);

    scheduler.force_frame_rate(0.5).unwrap();
    assert_eq!(scheduler.frame_interval(), 2000.0);

    scheduler.reset_frame_rate();
    assert_eq!(scheduler.frame_interval(), 5.0);
}

#[test]
fn test_out_of_range_frame_rates_are_rejected() {
    let (_host, scheduler) = setup();
    scheduler.force_frame_rate(30.0).unwrap();

    for fps in [0.0, -1.0, 125.5, 200.0, f64::NAN, f64::INFINITY] {
        let err = scheduler.force_frame_rate(fps).unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidFrameRate(_)));
        assert_eq!(scheduler.frame_interval(), 33.0, "rejected {fps} must not change the slice");
    }
}

#[test]
fn test_frame_rate_changes_how_much_runs_per_slice() {
    let (host, scheduler) = setup();
    let clock = host.manual_clock();
    let ran = Rc::new(Cell::new(0));

    // 40ms slices.
    scheduler.force_frame_rate(25.0).unwrap();
    for _ in 0..5 {
        let (ran, clock) = (ran.clone(), clock.clone());
        scheduler.schedule_callback(PriorityLevel::Low, move |_| {
            ran.set(ran.get() + 1);
            clock.advance(10.0);
            WorkResult::Done
        });
    }

    assert!(host.run_posted_task());
    assert_eq!(ran.get(), 4);
    assert!(host.run_posted_task());
    assert_eq!(ran.get(), 5);
}
