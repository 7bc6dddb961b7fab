//! Bounded exponential backoff with a randomization window.

// crates.io
use rand::Rng;
// self
use crate::_prelude::*;

/// Backoff bases in milliseconds, indexed by attempt count; attempts beyond the table
/// clamp to the last entry. Each wait is the base with ±50% uniform jitter applied.
const BACKOFF_TABLE_MS: [u64; 7] = [0, 1_000, 2_000, 4_000, 10_000, 30_000, 60_000];

/// Maps a retry attempt count to the wait before the next attempt.
#[derive(Clone, Copy, Debug, Default)]
pub struct RetryScheduler;
impl RetryScheduler {
	/// Deterministic backoff base for an attempt count, before jitter.
	pub fn base(attempt: u32) -> Duration {
		let index = (attempt as usize).min(BACKOFF_TABLE_MS.len() - 1);

		Duration::from_millis(BACKOFF_TABLE_MS[index])
	}

	/// Jittered wait for an attempt count: the base widened to `[base/2, base*3/2]`.
	pub fn delay(attempt: u32) -> Duration {
		let base = Self::base(attempt).as_millis() as u64;

		if base == 0 {
			return Duration::ZERO;
		}

		let low = base / 2;
		let high = base + base / 2;

		Duration::from_millis(rand::rng().random_range(low..=high))
	}

	/// Absolute instant at which the next attempt should run.
	pub fn time_to_retry(attempt: u32) -> Instant {
		Instant::now() + Self::delay(attempt)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn first_attempt_has_no_backoff() {
		assert_eq!(RetryScheduler::base(0), Duration::ZERO);
		assert_eq!(RetryScheduler::delay(0), Duration::ZERO);
	}

	#[test]
	fn attempts_beyond_the_table_clamp_to_the_last_entry() {
		assert_eq!(RetryScheduler::base(6), Duration::from_millis(60_000));
		assert_eq!(RetryScheduler::base(7), RetryScheduler::base(6));
		assert_eq!(RetryScheduler::base(u32::MAX), RetryScheduler::base(6));
	}

	#[test]
	fn jitter_stays_within_the_randomization_window() {
		for attempt in 1..=6 {
			let base = RetryScheduler::base(attempt);

			for _ in 0..32 {
				let delay = RetryScheduler::delay(attempt);

				assert!(delay >= base / 2, "Delay fell below the jitter window.");
				assert!(delay <= base * 3 / 2, "Delay exceeded the jitter window.");
			}
		}
	}

	#[test]
	fn table_is_monotonic() {
		for window in BACKOFF_TABLE_MS.windows(2) {
			assert!(window[0] <= window[1]);
		}
	}
}
