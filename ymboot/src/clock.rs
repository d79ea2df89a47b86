//! Monotonic time source and deadlines.
//!
//! Ticks are milliseconds in a `u32` that wraps after ~49.7 days. All
//! elapsed-time math uses wrapping subtraction, so a deadline that straddles
//! the wrap still expires on time.

use std::time::{Duration, Instant};

/// Monotonic tick source with a blocking sleep.
pub trait Clock {
    /// Current tick in milliseconds. Wraps at `u32::MAX`.
    fn now_ms(&self) -> u32;

    /// Block the caller for `ms` milliseconds.
    fn sleep_ms(&self, ms: u32);
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now_ms(&self) -> u32 {
        (**self).now_ms()
    }

    fn sleep_ms(&self, ms: u32) {
        (**self).sleep_ms(ms);
    }
}

/// Milliseconds from `start` to `now`, robust to counter wraparound.
pub fn elapsed_ms(start: u32, now: u32) -> u32 {
    now.wrapping_sub(start)
}

/// [`Clock`] backed by [`Instant`].
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    /// Create a clock whose tick 0 is now.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    #[allow(clippy::cast_possible_truncation)]
    fn now_ms(&self) -> u32 {
        // Truncation is the wrap.
        self.origin
            .elapsed()
            .as_millis() as u32
    }

    fn sleep_ms(&self, ms: u32) {
        std::thread::sleep(Duration::from_millis(u64::from(ms)));
    }
}

/// A time budget that started at a given tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    start: u32,
    budget_ms: u32,
}

impl Deadline {
    /// Start a budget of `budget_ms` at the clock's current tick.
    pub fn after<C: Clock + ?Sized>(clock: &C, budget_ms: u32) -> Self {
        Self::starting_at(clock.now_ms(), budget_ms)
    }

    /// Start a budget of `budget_ms` at tick `start`.
    pub fn starting_at(start: u32, budget_ms: u32) -> Self {
        Self { start, budget_ms }
    }

    /// Whether the whole budget has been used up at tick `now`.
    pub fn expired_at(&self, now: u32) -> bool {
        elapsed_ms(self.start, now) >= self.budget_ms
    }

    /// Time left at tick `now`, zero once the budget is used up.
    pub fn remaining_at(&self, now: u32) -> u32 {
        self.budget_ms
            .saturating_sub(elapsed_ms(self.start, now))
    }

    /// Whether the budget is exhausted on `clock`.
    pub fn expired<C: Clock + ?Sized>(&self, clock: &C) -> bool {
        self.expired_at(clock.now_ms())
    }

    /// Time left on `clock`.
    pub fn remaining<C: Clock + ?Sized>(&self, clock: &C) -> u32 {
        self.remaining_at(clock.now_ms())
    }
}
