use std::time::Duration;

use parking_lot::Mutex;

/// Number of samples at which the window is collapsed to its running mean.
const CONSOLIDATE_AT: usize = 20;

/// Minimum number of observed samples before an estimate is reported.
const MIN_SAMPLES: usize = 4;

/// Rolling bits-per-second estimate shared by every fetcher in a player.
///
/// The window is collapsed to a single mean entry once it fills; this loses
/// variance on purpose, trading it for a stable long-run figure.
#[derive(Debug, Default)]
pub struct BandwidthMeter {
    state: Mutex<MeterState>,
}

#[derive(Debug, Default)]
struct MeterState {
    samples: Vec<u64>,
    observed: usize,
}

impl BandwidthMeter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one transfer. Zero-length transfers and zero elapsed times
    /// carry no information and are dropped.
    pub fn add(&self, elapsed: Duration, bytes: u64) {
        let secs = elapsed.as_secs_f64();
        if secs <= 0.0 || bytes == 0 {
            return;
        }

        let bps = ((bytes * 8) as f64 / secs) as u64;

        let mut state = self.state.lock();
        state.samples.push(bps);
        state.observed += 1;

        if state.samples.len() >= CONSOLIDATE_AT {
            let mean = state.samples.iter().sum::<u64>() / state.samples.len() as u64;
            state.samples.clear();
            state.samples.push(mean);
        }
    }

    /// Current estimate in bits per second, `None` until enough samples
    /// have been observed to mean anything.
    pub fn estimate_bps(&self) -> Option<u64> {
        let state = self.state.lock();
        if state.observed < MIN_SAMPLES || state.samples.is_empty() {
            return None;
        }
        Some(state.samples.iter().sum::<u64>() / state.samples.len() as u64)
    }

    #[cfg(test)]
    fn window_len(&self) -> usize {
        self.state.lock().samples.len()
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn one_second() -> Duration {
        Duration::from_secs(1)
    }

    #[rstest]
    #[case(Duration::ZERO, 1000)]
    #[case(one_second(), 0)]
    fn degenerate_samples_are_ignored(#[case] elapsed: Duration, #[case] bytes: u64) {
        let meter = BandwidthMeter::new();
        meter.add(elapsed, bytes);
        assert_eq!(meter.window_len(), 0);
        assert_eq!(meter.estimate_bps(), None);
    }

    #[test]
    fn no_estimate_below_four_samples() {
        let meter = BandwidthMeter::new();
        for _ in 0..3 {
            meter.add(one_second(), 1000);
        }
        assert_eq!(meter.estimate_bps(), None);

        meter.add(one_second(), 1000);
        assert_eq!(meter.estimate_bps(), Some(8000));
    }

    #[test]
    fn estimate_is_integer_mean() {
        let meter = BandwidthMeter::new();
        meter.add(one_second(), 1000); // 8_000 bps
        meter.add(one_second(), 2000); // 16_000 bps
        meter.add(one_second(), 3000); // 24_000 bps
        meter.add(one_second(), 4000); // 32_000 bps
        assert_eq!(meter.estimate_bps(), Some(20_000));
    }

    #[test]
    fn window_collapses_to_mean_at_twenty() {
        let meter = BandwidthMeter::new();
        for _ in 0..20 {
            meter.add(one_second(), 1250); // 10_000 bps each
        }
        assert_eq!(meter.window_len(), 1);
        assert_eq!(meter.estimate_bps(), Some(10_000));

        // Subsequent samples keep averaging against the collapsed entry.
        meter.add(one_second(), 3750); // 30_000 bps
        assert_eq!(meter.estimate_bps(), Some(20_000));
    }
}
