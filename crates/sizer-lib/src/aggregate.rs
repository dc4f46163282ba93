//! Statistics aggregator
//!
//! Reduces a sample history to {average, peak} pairs per series. The
//! empty-history guard is the single most important check in the system:
//! a container that exited before the first valid CPU sample must surface
//! a typed failure, never an all-zero recommendation.

use crate::error::RunError;
use crate::models::{AggregateStats, SampleHistory};

/// Reduce a history to summary statistics.
///
/// Fails with [`RunError::EmptyHistory`] when either series has zero
/// elements.
pub fn aggregate(history: &SampleHistory) -> Result<AggregateStats, RunError> {
    let cpu = history.cpu();
    let mem = history.mem_mb();

    if cpu.is_empty() || mem.is_empty() {
        return Err(RunError::EmptyHistory);
    }

    Ok(AggregateStats {
        cpu_avg: mean(cpu),
        cpu_peak: peak(cpu),
        mem_avg_mb: mean(mem),
        mem_peak_mb: peak(mem),
        sample_count: history.sample_count(),
        duration_secs: history.duration_secs(),
    })
}

fn mean(series: &[f64]) -> f64 {
    series.iter().sum::<f64>() / series.len() as f64
}

fn peak(series: &[f64]) -> f64 {
    series.iter().fold(f64::MIN, |acc, v| acc.max(*v))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_history_fails() {
        let history = SampleHistory::new();
        let err = aggregate(&history).unwrap_err();
        assert!(matches!(err, RunError::EmptyHistory));
    }

    #[test]
    fn test_memory_only_history_still_fails() {
        // Warm-up samples record memory but no CPU point; without a valid
        // CPU sample there is no aggregate.
        let mut history = SampleHistory::new();
        history.push(None, 100.0);
        history.push(None, 110.0);

        let err = aggregate(&history).unwrap_err();
        assert!(matches!(err, RunError::EmptyHistory));
    }

    #[test]
    fn test_avg_and_peak() {
        let mut history = SampleHistory::new();
        history.push(None, 100.0);
        history.push(Some(10.0), 200.0);
        history.push(Some(30.0), 150.0);

        let stats = aggregate(&history).unwrap();
        assert!((stats.cpu_avg - 20.0).abs() < 1e-9);
        assert!((stats.cpu_peak - 30.0).abs() < 1e-9);
        assert!((stats.mem_avg_mb - 150.0).abs() < 1e-9);
        assert!((stats.mem_peak_mb - 200.0).abs() < 1e-9);
        assert_eq!(stats.sample_count, 3);
    }

    #[test]
    fn test_peak_at_least_avg() {
        let mut history = SampleHistory::new();
        history.push(Some(5.0), 50.0);
        history.push(Some(95.0), 60.0);

        let stats = aggregate(&history).unwrap();
        assert!(stats.cpu_peak >= stats.cpu_avg);
        assert!(stats.mem_peak_mb >= stats.mem_avg_mb);
        assert!(stats.cpu_avg >= 0.0);
    }

    #[test]
    fn test_single_sample() {
        let mut history = SampleHistory::new();
        history.push(Some(42.0), 256.0);

        let stats = aggregate(&history).unwrap();
        assert_eq!(stats.cpu_avg, 42.0);
        assert_eq!(stats.cpu_peak, 42.0);
    }
}
