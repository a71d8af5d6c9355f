//! Property-based tests for the timer state machine
//!
//! Drives the machine through random action sequences and checks the
//! counters after every step.

use chrono::{DateTime, Duration, TimeZone, Utc};
use fieldops::client::timer::{TimerMachine, TimerState};
use fieldops::shared::BreakKind;
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Step {
    Start,
    Pause,
    Resume,
    BreakStart,
    BreakEnd,
    Stop,
    Advance(i64),
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        Just(Step::Start),
        Just(Step::Pause),
        Just(Step::Resume),
        Just(Step::BreakStart),
        Just(Step::BreakEnd),
        Just(Step::Stop),
        (1i64..3600).prop_map(Step::Advance),
    ]
}

fn origin() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap()
}

proptest! {
    #[test]
    fn test_work_is_elapsed_minus_breaks(steps in prop::collection::vec(step(), 1..60)) {
        let mut machine = TimerMachine::new();
        let mut now = origin();

        for step in steps {
            let result = match step {
                Step::Advance(secs) => {
                    now += Duration::seconds(secs);
                    None
                }
                Step::Start => Some(machine.start("JOB-1", now)),
                Step::Pause => Some(machine.pause(now)),
                Step::Resume => Some(machine.resume(now)),
                Step::BreakStart => Some(machine.start_break(BreakKind::Rest, None, now)),
                Step::BreakEnd => Some(machine.end_break(now)),
                Step::Stop => Some(machine.stop(now)),
            };

            if let Some(Ok(log)) = result {
                prop_assert_eq!(log.work_secs, log.elapsed_secs - log.break_secs);
                prop_assert!(log.work_secs >= 0);
            }

            let snapshot = machine.snapshot(now);
            prop_assert_eq!(snapshot.work_secs, snapshot.elapsed_secs - snapshot.break_secs);
            prop_assert!(snapshot.elapsed_secs >= 0);
            prop_assert!(snapshot.break_secs >= 0);
            prop_assert!(snapshot.work_secs >= 0);
            prop_assert_eq!(snapshot.current_break.is_some(), snapshot.state == TimerState::OnBreak);
        }
    }

    #[test]
    fn test_rejected_actions_change_nothing(steps in prop::collection::vec(step(), 1..60)) {
        let mut machine = TimerMachine::new();
        let mut now = origin();

        for step in steps {
            let before = machine.snapshot(now);
            let result = match step {
                Step::Advance(secs) => {
                    now += Duration::seconds(secs);
                    continue;
                }
                Step::Start => machine.start("JOB-1", now),
                Step::Pause => machine.pause(now),
                Step::Resume => machine.resume(now),
                Step::BreakStart => machine.start_break(BreakKind::Lunch, None, now),
                Step::BreakEnd => machine.end_break(now),
                Step::Stop => machine.stop(now),
            };
            if result.is_err() {
                prop_assert_eq!(machine.snapshot(now), before);
            }
        }
    }

    #[test]
    fn test_paused_time_is_not_counted(work in 1i64..3600, paused in 1i64..3600) {
        let mut machine = TimerMachine::new();
        let mut now = origin();

        machine.start("JOB-1", now).unwrap();
        now += Duration::seconds(work);
        machine.pause(now).unwrap();
        now += Duration::seconds(paused);
        machine.resume(now).unwrap();

        let log = machine.stop(now).unwrap();
        prop_assert_eq!(log.elapsed_secs, work);
        prop_assert_eq!(log.work_secs, work);
        prop_assert_eq!(machine.state(), TimerState::Stopped);
    }
}
