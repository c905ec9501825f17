use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Caches the result of an expensive probe for a fixed period.
///
/// The first call always runs the probe. Later calls within `period` of the
/// last run return the cached value, whatever happened in between. The lock
/// is held while probing, so concurrent callers never probe in parallel.
#[derive(Debug)]
pub struct Throttle<T> {
    period: Duration,
    last: Mutex<Option<(Instant, T)>>,
}

impl<T: Clone> Throttle<T> {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            last: Mutex::new(None),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn get_or_refresh(&self, refresh: impl FnOnce() -> T) -> T {
        let mut last = self.last.lock();
        if let Some((at, value)) = last.as_ref() {
            if at.elapsed() < self.period {
                return value.clone();
            }
        }

        let started = Instant::now();
        let value = refresh();
        *last = Some((started, value.clone()));
        value
    }

    /// Most recent value, without probing.
    pub fn cached(&self) -> Option<T> {
        self.last.lock().as_ref().map(|(_, value)| value.clone())
    }

    /// Force the next call to probe.
    pub fn invalidate(&self) {
        *self.last.lock() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn caches_within_period() {
        let throttle = Throttle::new(Duration::from_secs(60));
        let calls = Cell::new(0);
        let probe = || {
            calls.set(calls.get() + 1);
            calls.get()
        };

        assert_eq!(throttle.get_or_refresh(probe), 1);
        assert_eq!(throttle.get_or_refresh(probe), 1);
        assert_eq!(throttle.get_or_refresh(probe), 1);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn zero_period_always_probes() {
        let throttle = Throttle::new(Duration::ZERO);
        assert_eq!(throttle.get_or_refresh(|| 1), 1);
        assert_eq!(throttle.get_or_refresh(|| 2), 2);
    }

    #[test]
    fn refreshes_after_period() {
        let throttle = Throttle::new(Duration::from_millis(20));
        assert!(throttle.get_or_refresh(|| true));
        std::thread::sleep(Duration::from_millis(30));
        assert!(!throttle.get_or_refresh(|| false));
    }

    #[test]
    fn invalidate_forces_probe() {
        let throttle = Throttle::new(Duration::from_secs(60));
        assert_eq!(throttle.get_or_refresh(|| "first"), "first");
        throttle.invalidate();
        assert_eq!(throttle.cached(), None);
        assert_eq!(throttle.get_or_refresh(|| "second"), "second");
    }
}
