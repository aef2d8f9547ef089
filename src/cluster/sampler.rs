//! Minute-resolution sampling of a historical range.
//!
//! Comparing two month-long series minute by minute means ~43k dimensions per
//! comparison. Instead, each window draws at most `cap` minutes from the lookback
//! range and every similarity in that window is evaluated on those minutes only.

use chrono::Duration;
use rand::prelude::*;

use crate::series::Timestamp;

/// Default upper bound on the number of sampled minutes per window.
pub const DEFAULT_SAMPLE_CAP: usize = 10_000;

/// Draws per-window sample sets from an explicitly seeded RNG.
#[derive(Debug, Clone)]
pub struct WindowSampler {
    cap: usize,
    rng: StdRng,
}

impl WindowSampler {
    /// Create a sampler drawing at most `cap` minutes per call.
    ///
    /// With `seed: None` the RNG is seeded from OS entropy and runs are not
    /// reproducible.
    pub fn new(cap: usize, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_os_rng(),
        };
        Self { cap, rng }
    }

    /// Maximum sample size.
    pub fn cap(&self) -> usize {
        self.cap
    }

    /// Sample minutes in `[start, end)`, ascending.
    ///
    /// Every minute is used when the range has at most `cap` of them; otherwise a
    /// uniform subset of exactly `cap` distinct minutes is drawn.
    ///
    /// `end` itself is never drawn: a window sampled over `[lookback, next)` stops at
    /// the minute before `next`, one minute short of an inclusive count of the range.
    pub fn sample(&mut self, start: Timestamp, end: Timestamp) -> Vec<Timestamp> {
        let ticks = (end - start).num_minutes().max(0) as usize;
        if ticks <= self.cap {
            return (0..ticks)
                .map(|i| start + Duration::minutes(i as i64))
                .collect();
        }

        let mut picked = rand::seq::index::sample(&mut self.rng, ticks, self.cap).into_vec();
        picked.sort_unstable();
        picked
            .into_iter()
            .map(|i| start + Duration::minutes(i as i64))
            .collect()
    }
}

impl Default for WindowSampler {
    fn default() -> Self {
        Self::new(DEFAULT_SAMPLE_CAP, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn start() -> Timestamp {
        NaiveDate::from_ymd_opt(2016, 10, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    #[test]
    fn short_range_uses_every_minute() {
        let mut sampler = WindowSampler::new(100, Some(1));
        let s = sampler.sample(start(), start() + Duration::minutes(60));
        assert_eq!(s.len(), 60);
        assert_eq!(s[0], start());
        assert_eq!(s[59], start() + Duration::minutes(59));
        assert!(!s.contains(&(start() + Duration::minutes(60))));
    }

    #[test]
    fn long_range_is_capped_sorted_and_in_range() {
        let mut sampler = WindowSampler::new(500, Some(7));
        let end = start() + Duration::days(30);
        let s = sampler.sample(start(), end);
        assert_eq!(s.len(), 500);
        assert!(s.windows(2).all(|w| w[0] < w[1]));
        assert!(s.iter().all(|t| *t >= start() && *t < end));
    }

    #[test]
    fn same_seed_same_samples() {
        let end = start() + Duration::days(10);
        let a = WindowSampler::new(1000, Some(42)).sample(start(), end);
        let b = WindowSampler::new(1000, Some(42)).sample(start(), end);
        assert_eq!(a, b);
    }

    #[test]
    fn empty_range_gives_empty_sample() {
        let mut sampler = WindowSampler::new(10, Some(0));
        assert!(sampler.sample(start(), start()).is_empty());
    }
}
