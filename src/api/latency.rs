//! In-memory histogram of monitoring cycle durations.
//! Measured from the balance wait to the end of publish.

use std::sync::Mutex;
use std::time::Duration;

use crate::error::{AppError, Result};

/// Shared cycle latency stats. Monitor records, API reads.
/// Values stored in milliseconds.
pub struct CycleLatency {
    inner: Mutex<hdrhistogram::Histogram<u64>>,
}

impl CycleLatency {
    /// Tracks 1ms to 1h, 3 significant figures.
    pub fn new() -> Self {
        let histogram = hdrhistogram::Histogram::new_with_bounds(1, 3_600_000, 3)
            .expect("valid histogram bounds");
        Self {
            inner: Mutex::new(histogram),
        }
    }

    pub fn record(&self, d: Duration) {
        let ms = d.as_millis().clamp(1, 3_600_000) as u64;
        if let Ok(mut h) = self.inner.lock() {
            let _ = h.record(ms);
        }
    }

    /// Return (p50_ms, p95_ms, p99_ms, max_ms). None if no samples.
    pub fn percentiles(&self) -> Result<Option<(u64, u64, u64, u64)>> {
        let h = self
            .inner
            .lock()
            .map_err(|_| AppError::Stats("cycle latency histogram lock poisoned".to_string()))?;
        if h.len() == 0 {
            return Ok(None);
        }
        Ok(Some((
            h.value_at_quantile(0.5),
            h.value_at_quantile(0.95),
            h.value_at_quantile(0.99),
            h.max(),
        )))
    }

    pub fn len(&self) -> u64 {
        self.inner.lock().map(|h| h.len()).unwrap_or(0)
    }
}

impl Default for CycleLatency {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_histogram_has_no_percentiles() {
        let l = CycleLatency::new();
        assert_eq!(l.len(), 0);
        assert!(l.percentiles().unwrap().is_none());
    }

    #[test]
    fn sub_millisecond_cycles_count_as_one_ms() {
        let l = CycleLatency::new();
        l.record(Duration::from_micros(10));
        l.record(Duration::from_secs(12));
        assert_eq!(l.len(), 2);
        let (p50, _, _, max) = l.percentiles().unwrap().unwrap();
        assert_eq!(p50, 1);
        assert!(max >= 11_990 && max <= 12_010);
    }

    #[test]
    fn poisoned_histogram_is_reported() {
        let l = std::sync::Arc::new(CycleLatency::new());
        let holder = std::sync::Arc::clone(&l);
        let _ = std::thread::spawn(move || {
            let _guard = holder.inner.lock().unwrap();
            panic!("recorder died");
        })
        .join();
        assert!(matches!(l.percentiles(), Err(AppError::Stats(_))));
    }
}
