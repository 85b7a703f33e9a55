//
// clock.rs --- Real-time pacing clock.
//
// Released under the "BSD3" license. See the file "LICENSE"
// for details.
//

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::debug;

/// A coarse real-time pacing clock.
///
/// The CPU consumes a number of ticks after each instruction; with a
/// non-zero tick duration the consuming thread blocks for
/// `duration * ticks` milliseconds. A duration of zero disables
/// waiting entirely. Pacing never affects computed register, flag or
/// memory state.
///
/// `Clock` is a shared handle: clones refer to the same underlying
/// state, so a handle cloned before starting a background run can
/// reconfigure the tick duration or cut a wait short with
/// [`Clock::kill_sleep`] while another thread is blocked in
/// [`Clock::consume_ticks`].
#[derive(Clone)]
pub struct Clock {
    inner: Arc<ClockInner>,
}

struct ClockInner {
    state: Mutex<ClockState>,
    wake: Condvar,
}

struct ClockState {
    /// Tick duration in milliseconds; zero means no waiting.
    tick_ms: u64,
    /// Bumped by `kill_sleep` so blocked waiters notice the signal.
    generation: u64,
}

impl Clock {
    /// Create a clock with the given tick duration in milliseconds.
    /// A duration of zero produces a no-wait clock.
    pub fn new(tick_ms: u64) -> Clock {
        Clock {
            inner: Arc::new(ClockInner {
                state: Mutex::new(ClockState {
                    tick_ms,
                    generation: 0,
                }),
                wake: Condvar::new(),
            }),
        }
    }

    /// Consume one clock tick.
    pub fn consume_tick(&self) {
        self.consume_ticks(1);
    }

    /// Consume `ticks` clock ticks, blocking the calling thread for
    /// `tick duration * ticks` milliseconds. Returns immediately in
    /// no-wait mode or when [`Clock::kill_sleep`] is signalled.
    pub fn consume_ticks(&self, ticks: u32) {
        let mut state = self.inner.state.lock();
        if state.tick_ms == 0 {
            return;
        }

        let deadline = Instant::now() + Duration::from_millis(state.tick_ms * u64::from(ticks));
        let generation = state.generation;

        while state.generation == generation {
            if self.inner.wake.wait_until(&mut state, deadline).timed_out() {
                break;
            }
        }
    }

    /// Wake every thread currently blocked in a tick wait, regardless
    /// of remaining time.
    pub fn kill_sleep(&self) {
        let mut state = self.inner.state.lock();
        state.generation += 1;
        self.inner.wake.notify_all();
    }

    /// The current tick duration in milliseconds.
    pub fn sleep_time(&self) -> u64 {
        self.inner.state.lock().tick_ms
    }

    /// Reconfigure the tick duration in milliseconds; zero disables
    /// waiting. Takes effect from the next tick wait.
    pub fn set_sleep_time(&self, tick_ms: u64) {
        let mut state = self.inner.state.lock();
        debug!("clock tick duration {} -> {} ms", state.tick_ms, tick_ms);
        state.tick_ms = tick_ms;
    }
}

impl Default for Clock {
    fn default() -> Clock {
        Clock::new(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn no_wait_clock_returns_immediately() {
        let clock = Clock::new(0);
        let start = Instant::now();
        clock.consume_ticks(1_000_000);
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[test]
    fn ticks_block_for_duration() {
        let clock = Clock::new(10);
        let start = Instant::now();
        clock.consume_ticks(3);
        assert!(start.elapsed() >= Duration::from_millis(25));
    }

    #[test]
    fn kill_sleep_wakes_blocked_waiter() {
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::sync::Arc;

        let clock = Clock::new(10_000);
        let waiter = clock.clone();
        let done = Arc::new(AtomicBool::new(false));
        let finished = done.clone();

        let handle = thread::spawn(move || {
            let start = Instant::now();
            waiter.consume_tick();
            finished.store(true, Ordering::SeqCst);
            start.elapsed()
        });

        // Keep signalling until the waiter reports back, so the kill
        // cannot slip in before the wait has begun.
        while !done.load(Ordering::SeqCst) {
            clock.kill_sleep();
            thread::sleep(Duration::from_millis(10));
        }

        let waited = handle.join().unwrap();
        assert!(waited < Duration::from_secs(5));
    }

    #[test]
    fn reconfigure_to_no_wait() {
        let clock = Clock::new(500);
        assert_eq!(clock.sleep_time(), 500);

        clock.set_sleep_time(0);
        assert_eq!(clock.sleep_time(), 0);

        let start = Instant::now();
        clock.consume_ticks(100);
        assert!(start.elapsed() < Duration::from_millis(100));
    }
}
