//! Work timer state machine
//!
//! ```text
//!            start(job)            pause
//! Stopped ─────────────► Running ─────────► Paused
//!    ▲                    │  ▲   ◄─────────
//!    │             break  │  │ end   resume
//!    │                    ▼  │
//!    └──── stop ───────  OnBreak
//! ```
//!
//! `stop` is accepted from Running, Paused and OnBreak. `manual_entry` is
//! accepted in every state and never changes it. Elapsed time advances while
//! Running or OnBreak; work time is elapsed minus breaks.
//!
//! The machine does no I/O. Every accepted transition returns the
//! [`TimeLog`] describing it.

use crate::shared::{Break, BreakKind, TimeAction, TimeLog};
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Mutex;
use uuid::Uuid;

use super::TimerError;

/// Source of the current time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *now += by;
    }

    pub fn advance_secs(&self, secs: i64) {
        self.advance(chrono::Duration::seconds(secs));
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimerState {
    #[default]
    Stopped,
    Running,
    Paused,
    OnBreak,
}

impl fmt::Display for TimerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TimerState::Stopped => "stopped",
            TimerState::Running => "running",
            TimerState::Paused => "paused",
            TimerState::OnBreak => "on break",
        })
    }
}

/// Timer counters at an instant
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TimerSnapshot {
    pub state: TimerState,
    pub job_id: Option<String>,
    pub elapsed_secs: i64,
    pub work_secs: i64,
    pub break_secs: i64,
    /// The break in progress, if any
    pub current_break: Option<Break>,
}

#[derive(Debug, Clone, Default)]
pub struct TimerMachine {
    state: TimerState,
    job_id: Option<String>,
    /// Elapsed milliseconds up to `segment_start`
    banked_ms: i64,
    /// Start of the current counting segment (Running or OnBreak)
    segment_start: Option<DateTime<Utc>>,
    breaks: Vec<Break>,
}

impl TimerMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> TimerState {
        self.state
    }

    pub fn job_id(&self) -> Option<&str> {
        self.job_id.as_deref()
    }

    pub fn breaks(&self) -> &[Break] {
        &self.breaks
    }

    fn elapsed_ms(&self, now: DateTime<Utc>) -> i64 {
        let running = self
            .segment_start
            .map(|start| (now - start).num_milliseconds().max(0))
            .unwrap_or(0);
        self.banked_ms + running
    }

    fn bank(&mut self, now: DateTime<Utc>) {
        self.banked_ms = self.elapsed_ms(now);
        self.segment_start = None;
    }

    pub fn snapshot(&self, now: DateTime<Utc>) -> TimerSnapshot {
        let elapsed_secs = self.elapsed_ms(now) / 1000;
        let break_secs: i64 = self.breaks.iter().map(|b| b.duration_secs(now)).sum();
        TimerSnapshot {
            state: self.state,
            job_id: self.job_id.clone(),
            elapsed_secs,
            work_secs: elapsed_secs - break_secs,
            break_secs,
            current_break: self.breaks.last().filter(|b| b.ended_at.is_none()).cloned(),
        }
    }

    fn log(&self, action: TimeAction, now: DateTime<Utc>, reason: Option<String>) -> TimeLog {
        let snapshot = self.snapshot(now);
        TimeLog {
            id: Uuid::new_v4(),
            job_id: snapshot.job_id.unwrap_or_default(),
            action,
            timestamp: now,
            elapsed_secs: snapshot.elapsed_secs,
            work_secs: snapshot.work_secs,
            break_secs: snapshot.break_secs,
            breaks: self.breaks.clone(),
            reason,
            synced: false,
            server_timestamp: None,
        }
    }

    fn expect(&self, allowed: &[TimerState], action: TimeAction) -> Result<(), TimerError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(TimerError::InvalidTransition {
                from: self.state,
                action,
            })
        }
    }

    pub fn start(&mut self, job_id: &str, now: DateTime<Utc>) -> Result<TimeLog, TimerError> {
        self.expect(&[TimerState::Stopped], TimeAction::Start)?;
        if job_id.trim().is_empty() {
            return Err(TimerError::NoJob);
        }
        *self = Self {
            state: TimerState::Running,
            job_id: Some(job_id.to_string()),
            banked_ms: 0,
            segment_start: Some(now),
            breaks: Vec::new(),
        };
        Ok(self.log(TimeAction::Start, now, None))
    }

    pub fn pause(&mut self, now: DateTime<Utc>) -> Result<TimeLog, TimerError> {
        self.expect(&[TimerState::Running], TimeAction::Pause)?;
        self.bank(now);
        self.state = TimerState::Paused;
        Ok(self.log(TimeAction::Pause, now, None))
    }

    pub fn resume(&mut self, now: DateTime<Utc>) -> Result<TimeLog, TimerError> {
        self.expect(&[TimerState::Paused], TimeAction::Resume)?;
        self.segment_start = Some(now);
        self.state = TimerState::Running;
        Ok(self.log(TimeAction::Resume, now, None))
    }

    pub fn start_break(
        &mut self,
        kind: BreakKind,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<TimeLog, TimerError> {
        self.expect(&[TimerState::Running], TimeAction::BreakStart)?;
        let reason = reason.filter(|r| !r.trim().is_empty());
        self.breaks.push(Break {
            kind,
            reason: reason.clone(),
            started_at: now,
            ended_at: None,
        });
        self.state = TimerState::OnBreak;
        Ok(self.log(TimeAction::BreakStart, now, reason))
    }

    fn close_open_break(&mut self, now: DateTime<Utc>) {
        if let Some(open) = self.breaks.last_mut().filter(|b| b.ended_at.is_none()) {
            open.ended_at = Some(now.max(open.started_at));
        }
    }

    pub fn end_break(&mut self, now: DateTime<Utc>) -> Result<TimeLog, TimerError> {
        self.expect(&[TimerState::OnBreak], TimeAction::BreakEnd)?;
        self.close_open_break(now);
        self.state = TimerState::Running;
        Ok(self.log(TimeAction::BreakEnd, now, None))
    }

    /// Close the session. An open break is closed first; counters reset.
    pub fn stop(&mut self, now: DateTime<Utc>) -> Result<TimeLog, TimerError> {
        self.expect(
            &[TimerState::Running, TimerState::Paused, TimerState::OnBreak],
            TimeAction::Stop,
        )?;
        self.close_open_break(now);
        self.bank(now);
        self.state = TimerState::Stopped;
        let log = self.log(TimeAction::Stop, now, None);
        *self = Self::default();
        Ok(log)
    }

    /// Add time worked but not tracked. Applies to the active job, or to
    /// `job_id` when no session is active.
    pub fn manual_entry(
        &mut self,
        duration_secs: i64,
        reason: &str,
        job_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<TimeLog, TimerError> {
        if reason.trim().is_empty() {
            return Err(TimerError::MissingReason);
        }
        if duration_secs <= 0 {
            return Err(TimerError::InvalidDuration(duration_secs));
        }

        match (&self.job_id, job_id) {
            (Some(active), Some(other)) if active != other => Err(TimerError::InvalidTransition {
                from: self.state,
                action: TimeAction::ManualEntry,
            }),
            (Some(_), _) => {
                self.banked_ms += duration_secs * 1000;
                Ok(self.log(TimeAction::ManualEntry, now, Some(reason.to_string())))
            }
            (None, Some(job)) if !job.trim().is_empty() => Ok(TimeLog {
                id: Uuid::new_v4(),
                job_id: job.to_string(),
                action: TimeAction::ManualEntry,
                timestamp: now,
                elapsed_secs: duration_secs,
                work_secs: duration_secs,
                break_secs: 0,
                breaks: Vec::new(),
                reason: Some(reason.to_string()),
                synced: false,
                server_timestamp: None,
            }),
            (None, _) => Err(TimerError::NoJob),
        }
    }

    /// Rebuild the machine from one job's logs, oldest first. Returns a
    /// stopped machine if the last session was closed.
    pub fn restore(logs: &[TimeLog]) -> Self {
        let Some(last) = logs.last() else {
            return Self::default();
        };
        let state = logs
            .iter()
            .rev()
            .find(|log| log.action != TimeAction::ManualEntry)
            .map(|log| match log.action {
                TimeAction::Start | TimeAction::Resume | TimeAction::BreakEnd => TimerState::Running,
                TimeAction::Pause => TimerState::Paused,
                TimeAction::BreakStart => TimerState::OnBreak,
                TimeAction::Stop | TimeAction::ManualEntry => TimerState::Stopped,
            })
            .unwrap_or(TimerState::Stopped);

        if state == TimerState::Stopped {
            return Self::default();
        }

        let counting = matches!(state, TimerState::Running | TimerState::OnBreak);
        Self {
            state,
            job_id: Some(last.job_id.clone()),
            banked_ms: last.elapsed_secs * 1000,
            segment_start: counting.then_some(last.timestamp),
            breaks: last.breaks.clone(),
        }
    }
}
