use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Source of wall-clock time for expiry and window computations.
pub trait Clock: Send + Sync {
	fn now(&self) -> DateTime<Utc>;

	/// Seconds since the unix epoch, clamped at zero.
	fn unix_secs(&self) -> u64 {
		u64::try_from(self.now().timestamp()).unwrap_or(0)
	}
}

pub type SharedClock = Arc<dyn Clock>;

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
	fn now(&self) -> DateTime<Utc> {
		Utc::now()
	}
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
	now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
	#[must_use]
	pub fn new(start: DateTime<Utc>) -> Arc<Self> {
		Arc::new(Self { now: Mutex::new(start) })
	}

	/// A clock starting at the given unix timestamp.
	#[must_use]
	pub fn at_epoch_secs(secs: i64) -> Arc<Self> {
		Self::new(DateTime::from_timestamp(secs, 0).unwrap_or_default())
	}

	pub fn advance(&self, by: Duration) {
		let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
		*now += chrono::Duration::from_std(by).unwrap_or_else(|_| chrono::Duration::zero());
	}
}

impl Clock for ManualClock {
	fn now(&self) -> DateTime<Utc> {
		*self.now.lock().unwrap_or_else(PoisonError::into_inner)
	}
}

#[must_use]
pub fn system() -> SharedClock {
	Arc::new(SystemClock)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_manual_clock_advances() {
		let clock = ManualClock::at_epoch_secs(1_700_000_000);
		assert_eq!(clock.unix_secs(), 1_700_000_000);
		clock.advance(Duration::from_secs(90));
		assert_eq!(clock.unix_secs(), 1_700_000_090);
	}
}
