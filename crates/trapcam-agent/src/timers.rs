//! Wrapping millisecond clock and the interval timers built on it.
//!
//! The counter is a `u32` that overflows roughly every 49.7 days, like a
//! microcontroller tick. All comparisons go through unsigned wrapping
//! subtraction so none of them break across the overflow.

use tokio::time::Instant;

pub type Millis = u32;

pub trait Clock: Send + Sync {
    fn now_ms(&self) -> Millis;
}

/// Clock derived from the tokio monotonic instant, so paused test time drives it.
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    origin: Instant,
    offset: Millis,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self::with_offset(0)
    }

    /// Start the counter at `offset` instead of zero.
    pub fn with_offset(offset: Millis) -> Self {
        Self {
            origin: Instant::now(),
            offset,
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_ms(&self) -> Millis {
        // Truncation is the intended wrap.
        let ticks = self.origin.elapsed().as_millis() as u64 as Millis;
        ticks.wrapping_add(self.offset)
    }
}

pub fn elapsed(now: Millis, since: Millis) -> Millis {
    now.wrapping_sub(since)
}

/// True once `now` is at or past `deadline`. Valid while the two are less
/// than 2^31 ms apart.
pub fn deadline_reached(now: Millis, deadline: Millis) -> bool {
    (deadline.wrapping_sub(now) as i32) <= 0
}

#[derive(Debug, Clone, Copy)]
pub struct IntervalTimer {
    last_fired: Millis,
    interval: Millis,
}

impl IntervalTimer {
    /// First due one full interval after `now`.
    pub fn starting_at(now: Millis, interval: Millis) -> Self {
        Self {
            last_fired: now,
            interval,
        }
    }

    /// Due immediately.
    pub fn due_at(now: Millis, interval: Millis) -> Self {
        Self {
            last_fired: now.wrapping_sub(interval),
            interval,
        }
    }

    pub fn is_due(&self, now: Millis) -> bool {
        elapsed(now, self.last_fired) >= self.interval
    }

    pub fn fire(&mut self, now: Millis) {
        self.last_fired = now;
    }

    pub fn last_fired(&self) -> Millis {
        self.last_fired
    }
}

/// The three last-fired timestamps the agent keeps.
#[derive(Debug, Clone, Copy)]
pub struct Timers {
    pub poll: IntervalTimer,
    pub stream_frame: IntervalTimer,
    pub reconnect_check: IntervalTimer,
}

impl Timers {
    pub fn new(
        now: Millis,
        poll_interval: Millis,
        frame_delay: Millis,
        reconnect_check_interval: Millis,
    ) -> Self {
        Self {
            poll: IntervalTimer::starting_at(now, poll_interval),
            stream_frame: IntervalTimer::starting_at(now, frame_delay),
            reconnect_check: IntervalTimer::due_at(now, reconnect_check_interval),
        }
    }
}
