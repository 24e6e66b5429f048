use std::time::Instant;

use parking_lot::Mutex;

use crate::time::MediaTime;

const CLOCK_TIMESCALE: i32 = 600;

struct ClockState {
    anchor_instant: Instant,
    anchor_seconds: f64,
    rate: f64,
    running: bool,
}

/// The presentation clock shared by the video and audio sinks.
///
/// Time advances from an anchor point at the configured rate while running;
/// pause freezes it, seek re-anchors it.
pub struct PresentationClock {
    state: Mutex<ClockState>,
}

impl PresentationClock {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ClockState {
                anchor_instant: Instant::now(),
                anchor_seconds: 0.0,
                rate: 1.0,
                running: false,
            }),
        }
    }

    pub fn now(&self) -> MediaTime {
        let state = self.state.lock();
        let seconds = if state.running {
            state.anchor_seconds + state.anchor_instant.elapsed().as_secs_f64() * state.rate
        } else {
            state.anchor_seconds
        };
        MediaTime::with_seconds(seconds, CLOCK_TIMESCALE)
    }

    pub fn set_time(&self, time: MediaTime) {
        let mut state = self.state.lock();
        state.anchor_seconds = time.seconds();
        state.anchor_instant = Instant::now();
    }

    pub fn set_rate(&self, rate: f64) {
        let mut state = self.state.lock();
        // Re-anchor so already-elapsed time keeps the old rate.
        let now = if state.running {
            state.anchor_seconds + state.anchor_instant.elapsed().as_secs_f64() * state.rate
        } else {
            state.anchor_seconds
        };
        state.anchor_seconds = now;
        state.anchor_instant = Instant::now();
        state.rate = rate;
    }

    pub fn rate(&self) -> f64 {
        self.state.lock().rate
    }

    pub fn resume(&self) {
        let mut state = self.state.lock();
        if !state.running {
            state.anchor_instant = Instant::now();
            state.running = true;
        }
    }

    pub fn pause(&self) {
        let mut state = self.state.lock();
        if state.running {
            state.anchor_seconds +=
                state.anchor_instant.elapsed().as_secs_f64() * state.rate;
            state.running = false;
        }
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().running
    }
}

impl Default for PresentationClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paused_clock_stands_still() {
        let clock = PresentationClock::new();
        clock.set_time(MediaTime::with_seconds(3.0, 600));
        let a = clock.now();
        std::thread::sleep(std::time::Duration::from_millis(20));
        let b = clock.now();
        assert_eq!(a, b);
        assert!((a.seconds() - 3.0).abs() < 1e-6);
    }

    #[test]
    fn running_clock_advances() {
        let clock = PresentationClock::new();
        clock.resume();
        let a = clock.now();
        std::thread::sleep(std::time::Duration::from_millis(20));
        let b = clock.now();
        assert!(b > a);
    }

    #[test]
    fn seek_reanchors_while_running() {
        let clock = PresentationClock::new();
        clock.resume();
        clock.set_time(MediaTime::with_seconds(60.0, 600));
        let now = clock.now().seconds();
        assert!((59.0..62.0).contains(&now), "clock at {now}");
    }
}
