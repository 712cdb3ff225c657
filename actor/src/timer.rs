// SPDX-License-Identifier: Apache-2.0

//! # Timers
//!
//! One hierarchical timing wheel per system drives every actor timer. The
//! wheel never runs user code: when a timer is due it pushes the timer id
//! into the owning actor's timer queue, and the callback executes on the
//! actor's own task with exclusive state access like any other mailbox work.
//!
//! Recurring timers carry a [`Scheduler`] that yields the next wall-clock
//! fire time; one-shot timers are dropped from the wheel after firing.
//!

use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Timelike, Utc};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use std::collections::HashMap;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex,
};
use std::time::Duration;

use crate::queue::QueueSender;
use crate::Error;

/// Opaque handle to a registered timer.
pub type TimerId = u64;

/// Wheel resolution. Timers fire within one tick of their deadline.
const TICK: Duration = Duration::from_millis(10);

/// Slots per wheel level. Level `n` spans `TICK * SIZE^(n+1)`.
const WHEEL_SIZE: usize = 256;

/// Computes the next fire time of a recurring timer.
///
/// Returning `None` retires the timer.
pub trait Scheduler: Send + Sync {
    fn next(&self, prev: DateTime<Utc>) -> Option<DateTime<Utc>>;
}

/// Fires at a fixed period.
pub struct IntervalSchedule(pub Duration);

impl Scheduler for IntervalSchedule {
    fn next(&self, prev: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let step = ChronoDuration::from_std(self.0).ok()?;
        Some(prev + step)
    }
}

/// Fires once a day at the given UTC time.
pub struct DailySchedule {
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
}

impl Scheduler for DailySchedule {
    fn next(&self, prev: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let at = prev
            .date_naive()
            .and_hms_opt(self.hour, self.minute, self.second)?;
        let candidate = Utc.from_utc_datetime(&at);
        if candidate > prev {
            Some(candidate)
        } else {
            Some(candidate + ChronoDuration::days(1))
        }
    }
}

/// Fires once an hour at the given minute and second.
pub struct HourlySchedule {
    pub minute: u32,
    pub second: u32,
}

impl Scheduler for HourlySchedule {
    fn next(&self, prev: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let at = prev
            .date_naive()
            .and_hms_opt(prev.hour(), self.minute, self.second)?;
        let candidate = Utc.from_utc_datetime(&at);
        if candidate > prev {
            Some(candidate)
        } else {
            Some(candidate + ChronoDuration::hours(1))
        }
    }
}

struct WheelEntry {
    deadline: Instant,
    sink: QueueSender<TimerId>,
    schedule: Option<Arc<dyn Scheduler>>,
}

struct Level {
    slots: Vec<Vec<TimerId>>,
    cursor: usize,
}

impl Level {
    fn new() -> Self {
        Level {
            slots: (0..WHEEL_SIZE).map(|_| Vec::new()).collect(),
            cursor: 0,
        }
    }
}

struct WheelState {
    levels: Vec<Level>,
    entries: HashMap<TimerId, WheelEntry>,
}

impl WheelState {
    /// Places an entry relative to the current cursors. Overflow levels grow
    /// lazily the first time a deadline needs them.
    fn place(&mut self, id: TimerId, now: Instant) {
        let deadline = match self.entries.get(&id) {
            Some(entry) => entry.deadline,
            None => return,
        };
        let remaining = deadline.saturating_duration_since(now);
        let mut ticks =
            (remaining.as_millis() / TICK.as_millis()).max(1) as usize;

        let mut level = 0;
        let mut slot_ticks = 1usize;
        while ticks >= WHEEL_SIZE * slot_ticks {
            level += 1;
            slot_ticks *= WHEEL_SIZE;
        }
        while self.levels.len() <= level {
            self.levels.push(Level::new());
        }
        ticks /= slot_ticks;
        let wheel = &mut self.levels[level];
        let slot = (wheel.cursor + ticks) % WHEEL_SIZE;
        wheel.slots[slot].push(id);
    }
}

/// The system-wide timer wheel. Shared by every actor; one driver task per
/// system advances it.
pub(crate) struct TimingWheel {
    state: Mutex<WheelState>,
    next_id: AtomicU64,
}

impl TimingWheel {
    pub(crate) fn new() -> Self {
        TimingWheel {
            state: Mutex::new(WheelState {
                levels: vec![Level::new()],
                entries: HashMap::new(),
            }),
            next_id: AtomicU64::new(1),
        }
    }

    /// Registers a one-shot timer.
    pub(crate) fn add_once(
        &self,
        delay: Duration,
        sink: QueueSender<TimerId>,
    ) -> TimerId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let now = Instant::now();
        if let Ok(mut state) = self.state.lock() {
            state.entries.insert(
                id,
                WheelEntry {
                    deadline: now + delay,
                    sink,
                    schedule: None,
                },
            );
            state.place(id, now);
        }
        id
    }

    /// Registers a fixed-period recurring timer. The first fire is one full
    /// period out.
    pub(crate) fn add_interval(
        &self,
        interval: Duration,
        sink: QueueSender<TimerId>,
    ) -> TimerId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let now = Instant::now();
        if let Ok(mut state) = self.state.lock() {
            state.entries.insert(
                id,
                WheelEntry {
                    deadline: now + interval,
                    sink,
                    schedule: Some(Arc::new(IntervalSchedule(interval))),
                },
            );
            state.place(id, now);
        }
        id
    }

    /// Registers a recurring timer. Fails when the schedule yields no fire
    /// time at all.
    pub(crate) fn add_schedule(
        &self,
        schedule: Arc<dyn Scheduler>,
        sink: QueueSender<TimerId>,
    ) -> Result<TimerId, Error> {
        let first = schedule.next(Utc::now()).ok_or(Error::Schedule)?;
        let delay = (first - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let now = Instant::now();
        if let Ok(mut state) = self.state.lock() {
            state.entries.insert(
                id,
                WheelEntry {
                    deadline: now + delay,
                    sink,
                    schedule: Some(schedule),
                },
            );
            state.place(id, now);
        }
        Ok(id)
    }

    /// Cancels a timer. Stale slot references are skipped when their slot
    /// comes around.
    pub(crate) fn remove(&self, id: TimerId) {
        if let Ok(mut state) = self.state.lock() {
            state.entries.remove(&id);
        }
    }

    /// Drives the wheel until the token is cancelled.
    pub(crate) async fn run(&self, token: CancellationToken) {
        let mut ticker = tokio::time::interval(TICK);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => self.advance(),
            }
        }
    }

    fn advance(&self) {
        let now = Instant::now();
        let mut state = match self.state.lock() {
            Ok(state) => state,
            Err(_) => return,
        };

        let mut due = Vec::new();
        let mut level = 0;
        // One step at the base level; a wrap advances the level above, whose
        // drained entries re-place themselves closer to the base.
        loop {
            let Some(wheel) = state.levels.get_mut(level) else {
                break;
            };
            wheel.cursor = (wheel.cursor + 1) % WHEEL_SIZE;
            due.append(&mut std::mem::take(&mut wheel.slots[wheel.cursor]));
            if wheel.cursor != 0 {
                break;
            }
            level += 1;
        }

        for id in due {
            let Some(entry) = state.entries.get(&id) else {
                // Cancelled while parked in a slot.
                continue;
            };
            if entry.deadline > now + TICK {
                state.place(id, now);
                continue;
            }
            if entry.sink.push(id).is_err() {
                // Owning actor is gone.
                state.entries.remove(&id);
                continue;
            }
            let next = entry
                .schedule
                .as_ref()
                .and_then(|schedule| schedule.next(Utc::now()));
            match next {
                Some(at) => {
                    let delay =
                        (at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
                    if let Some(entry) = state.entries.get_mut(&id) {
                        entry.deadline = now + delay;
                    }
                    state.place(id, now);
                }
                None => {
                    state.entries.remove(&id);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {

    use super::*;
    use crate::queue::queue;

    #[test]
    fn interval_schedule_steps_forward() {
        let schedule = IntervalSchedule(Duration::from_secs(30));
        let prev = Utc::now();
        let next = schedule.next(prev).unwrap();
        assert_eq!(next - prev, ChronoDuration::seconds(30));
    }

    #[test]
    fn daily_schedule_rolls_over_midnight() {
        let schedule = DailySchedule {
            hour: 3,
            minute: 0,
            second: 0,
        };
        let prev = Utc.with_ymd_and_hms(2026, 5, 1, 2, 0, 0).unwrap();
        assert_eq!(
            schedule.next(prev).unwrap(),
            Utc.with_ymd_and_hms(2026, 5, 1, 3, 0, 0).unwrap()
        );
        let prev = Utc.with_ymd_and_hms(2026, 5, 1, 3, 0, 0).unwrap();
        assert_eq!(
            schedule.next(prev).unwrap(),
            Utc.with_ymd_and_hms(2026, 5, 2, 3, 0, 0).unwrap()
        );
    }

    #[test]
    fn hourly_schedule_rolls_over_hour() {
        let schedule = HourlySchedule {
            minute: 15,
            second: 0,
        };
        let prev = Utc.with_ymd_and_hms(2026, 5, 1, 10, 20, 0).unwrap();
        assert_eq!(
            schedule.next(prev).unwrap(),
            Utc.with_ymd_and_hms(2026, 5, 1, 11, 15, 0).unwrap()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn one_shot_fires_once() {
        let wheel = Arc::new(TimingWheel::new());
        let token = CancellationToken::new();
        let (sink, mut timers) = queue();

        let driver = wheel.clone();
        let driver_token = token.clone();
        tokio::spawn(async move { driver.run(driver_token).await });

        let id = wheel.add_once(Duration::from_millis(50), sink);
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(timers.try_pop(), Some(id));
        assert_eq!(timers.try_pop(), None);
        token.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn removed_timer_never_fires() {
        let wheel = Arc::new(TimingWheel::new());
        let token = CancellationToken::new();
        let (sink, mut timers) = queue();

        let driver = wheel.clone();
        let driver_token = token.clone();
        tokio::spawn(async move { driver.run(driver_token).await });

        let id = wheel.add_once(Duration::from_millis(50), sink);
        wheel.remove(id);
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(timers.try_pop(), None);
        token.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn recurring_timer_keeps_firing() {
        let wheel = Arc::new(TimingWheel::new());
        let token = CancellationToken::new();
        let (sink, mut timers) = queue();

        let driver = wheel.clone();
        let driver_token = token.clone();
        tokio::spawn(async move { driver.run(driver_token).await });

        let id = wheel
            .add_schedule(
                Arc::new(IntervalSchedule(Duration::from_millis(40))),
                sink,
            )
            .unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;

        let mut fired = 0;
        while timers.try_pop() == Some(id) {
            fired += 1;
        }
        assert!(fired >= 2, "expected repeated fires, got {fired}");
        token.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn far_deadline_lands_in_overflow_level() {
        let wheel = Arc::new(TimingWheel::new());
        {
            let (sink, _timers) = queue();
            // Beyond the base level's span of TICK * WHEEL_SIZE.
            wheel.add_once(Duration::from_secs(60), sink);
        }
        let state = wheel.state.lock().unwrap();
        assert!(state.levels.len() >= 2);
    }
}
