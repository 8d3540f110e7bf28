use std::time::Duration;

use tokio::time::Instant;

const MIN_PERIOD: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SchedulerState {
    Stopped,
    Running { period: Duration, next_tick: Instant },
}

/// Repeating deadline that drives timeline playback.
///
/// The owner polls it with [`PlaybackScheduler::take_due`]; nothing fires on
/// its own, so `disarm` takes effect immediately.
#[derive(Debug)]
pub struct PlaybackScheduler {
    state: SchedulerState,
}

impl PlaybackScheduler {
    pub fn new() -> Self {
        Self {
            state: SchedulerState::Stopped,
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, SchedulerState::Running { .. })
    }

    /// Start (or restart) with a fresh phase: the first tick is one full
    /// period after `now`.
    pub fn arm(&mut self, period: Duration, now: Instant) {
        let period = period.max(MIN_PERIOD);
        self.state = SchedulerState::Running {
            period,
            next_tick: now + period,
        };
    }

    pub fn disarm(&mut self) {
        self.state = SchedulerState::Stopped;
    }

    pub fn deadline(&self) -> Option<Instant> {
        match self.state {
            SchedulerState::Stopped => None,
            SchedulerState::Running { next_tick, .. } => Some(next_tick),
        }
    }

    /// Number of ticks that elapsed up to `now`; advances the next deadline past them.
    pub fn take_due(&mut self, now: Instant) -> u32 {
        let SchedulerState::Running { period, next_tick } = &mut self.state else {
            return 0;
        };
        let mut ticks = 0;
        while *next_tick <= now {
            ticks += 1;
            *next_tick += *period;
        }
        ticks
    }
}

impl Default for PlaybackScheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PollerState {
    Idle,
    Active { next_poll: Instant },
}

/// Fixed-period refresh of the live frame.
#[derive(Debug)]
pub struct LivePoller {
    interval: Duration,
    state: PollerState,
}

impl LivePoller {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval: interval.max(MIN_PERIOD),
            state: PollerState::Idle,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, PollerState::Active { .. })
    }

    /// The caller performs the immediate fetch; the first timed poll is one
    /// interval later.
    pub fn activate(&mut self, now: Instant) {
        self.state = PollerState::Active {
            next_poll: now + self.interval,
        };
    }

    pub fn deactivate(&mut self) {
        self.state = PollerState::Idle;
    }

    pub fn deadline(&self) -> Option<Instant> {
        match self.state {
            PollerState::Idle => None,
            PollerState::Active { next_poll } => Some(next_poll),
        }
    }

    /// Whether a poll is due at `now`. Missed periods collapse into one poll.
    pub fn take_due(&mut self, now: Instant) -> bool {
        let PollerState::Active { next_poll } = &mut self.state else {
            return false;
        };
        if *next_poll > now {
            return false;
        }
        while *next_poll <= now {
            *next_poll += self.interval;
        }
        true
    }
}
