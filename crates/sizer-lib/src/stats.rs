//! Counter delta calculator
//!
//! Converts two consecutive cumulative CPU counter snapshots into an
//! instantaneous utilization percentage, and the memory gauge into MB.
//! Pure functions; all state lives with the caller.

use crate::models::StatsSnapshot;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// CPU utilization percent between two consecutive snapshots.
///
/// Returns `None` when the deltas are not usable (`system_delta <= 0` or
/// `cpu_delta < 0`); such samples must be skipped, not recorded as zero,
/// or they would bias the average downward and be indistinguishable from
/// genuine idle periods.
///
/// The result scales with the online CPU count and can legitimately
/// exceed 100% for multi-core containers.
pub fn cpu_percent(prev: &StatsSnapshot, curr: &StatsSnapshot) -> Option<f64> {
    let cpu_delta = curr.container_cpu_ns as i128 - prev.container_cpu_ns as i128;
    let system_delta = curr.system_cpu_ns as i128 - prev.system_cpu_ns as i128;

    if system_delta > 0 && cpu_delta >= 0 {
        Some((cpu_delta as f64 / system_delta as f64) * online_cpus(curr) as f64 * 100.0)
    } else {
        None
    }
}

/// Resolve the online CPU count for a snapshot.
///
/// Fallback chain, in order: explicit nonzero online-CPU field, length of
/// the per-CPU usage array, 1. The chain affects percentage scale and is
/// preserved exactly.
pub fn online_cpus(snapshot: &StatsSnapshot) -> u32 {
    if let Some(n) = snapshot.online_cpus {
        if n > 0 {
            return n;
        }
    }
    if !snapshot.percpu_usage.is_empty() {
        return snapshot.percpu_usage.len() as u32;
    }
    1
}

/// Memory usage in MB. An absolute gauge, no delta involved.
pub fn memory_mb(snapshot: &StatsSnapshot) -> f64 {
    snapshot.memory_bytes as f64 / BYTES_PER_MB
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(container_cpu_ns: u64, system_cpu_ns: u64) -> StatsSnapshot {
        StatsSnapshot {
            container_cpu_ns,
            system_cpu_ns,
            online_cpus: Some(1),
            percpu_usage: vec![],
            memory_bytes: 0,
        }
    }

    #[test]
    fn test_cpu_percent_basic() {
        let prev = snapshot(1_000, 100_000);
        let curr = snapshot(2_000, 200_000);

        // 1000 / 100000 * 1 cpu * 100 = 1%
        let pct = cpu_percent(&prev, &curr).unwrap();
        assert!((pct - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_cpu_percent_scales_linearly_with_cpu_count() {
        let prev = snapshot(1_000, 100_000);
        let mut curr = snapshot(2_000, 200_000);

        curr.online_cpus = Some(4);
        let four = cpu_percent(&prev, &curr).unwrap();

        curr.online_cpus = Some(8);
        let eight = cpu_percent(&prev, &curr).unwrap();

        assert!((eight / four - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_cpu_percent_can_exceed_100_on_multi_core() {
        let prev = snapshot(0, 0);
        let mut curr = snapshot(90, 100);
        curr.online_cpus = Some(4);

        let pct = cpu_percent(&prev, &curr).unwrap();
        assert!(pct > 100.0);
    }

    #[test]
    fn test_zero_system_delta_is_skipped() {
        let prev = snapshot(1_000, 100_000);
        let curr = snapshot(2_000, 100_000);
        assert_eq!(cpu_percent(&prev, &curr), None);
    }

    #[test]
    fn test_negative_system_delta_is_skipped() {
        let prev = snapshot(1_000, 200_000);
        let curr = snapshot(2_000, 100_000);
        assert_eq!(cpu_percent(&prev, &curr), None);
    }

    #[test]
    fn test_negative_cpu_delta_is_skipped() {
        // Counter reset: current reading below the previous one.
        let prev = snapshot(5_000, 100_000);
        let curr = snapshot(1_000, 200_000);
        assert_eq!(cpu_percent(&prev, &curr), None);
    }

    #[test]
    fn test_online_cpus_explicit_field_wins() {
        let snap = StatsSnapshot {
            container_cpu_ns: 0,
            system_cpu_ns: 0,
            online_cpus: Some(6),
            percpu_usage: vec![1, 2],
            memory_bytes: 0,
        };
        assert_eq!(online_cpus(&snap), 6);
    }

    #[test]
    fn test_online_cpus_zero_field_falls_back_to_percpu_len() {
        let snap = StatsSnapshot {
            container_cpu_ns: 0,
            system_cpu_ns: 0,
            online_cpus: Some(0),
            percpu_usage: vec![1, 2, 3],
            memory_bytes: 0,
        };
        assert_eq!(online_cpus(&snap), 3);
    }

    #[test]
    fn test_online_cpus_final_fallback_is_one() {
        let snap = StatsSnapshot {
            container_cpu_ns: 0,
            system_cpu_ns: 0,
            online_cpus: None,
            percpu_usage: vec![],
            memory_bytes: 0,
        };
        assert_eq!(online_cpus(&snap), 1);
    }

    #[test]
    fn test_memory_mb_conversion() {
        let snap = StatsSnapshot {
            container_cpu_ns: 0,
            system_cpu_ns: 0,
            online_cpus: None,
            percpu_usage: vec![],
            memory_bytes: 512 * 1024 * 1024,
        };
        assert!((memory_mb(&snap) - 512.0).abs() < 1e-9);
    }
}
