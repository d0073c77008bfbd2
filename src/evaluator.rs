//! Threshold evaluation.
//!
//! Pure: no I/O, deterministic for a given snapshot. Every check uses strict
//! greater-than, and a zero total disables its check instead of dividing by zero.

use serde::Deserialize;

use crate::models::{BITS_PER_MEGABIT, BYTES_PER_MIB, MetricsSnapshot, Warning};

/// Alert thresholds. Ratios are fractions of the total (0.8 = 80%).
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    pub load_average: f64,
    pub memory_ratio: f64,
    pub disk_ratio: f64,
    pub network_ratio: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            load_average: 30.0,
            memory_ratio: 0.80,
            disk_ratio: 0.90,
            network_ratio: 0.90,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvaluatorOptions {
    /// Skip the network check unless `used_network > 0`.
    pub require_network_usage: bool,
}

impl Default for EvaluatorOptions {
    fn default() -> Self {
        Self {
            require_network_usage: true,
        }
    }
}

/// `used / total`, or `None` when the total is zero.
fn usage_ratio(used: u64, total: u64) -> Option<f64> {
    (total > 0).then(|| used as f64 / total as f64)
}

/// Returns the warnings for `snapshot` in load, memory, disk, network order.
pub fn evaluate(
    snapshot: &MetricsSnapshot,
    thresholds: &Thresholds,
    options: EvaluatorOptions,
) -> Vec<Warning> {
    let mut warnings = Vec::new();

    if snapshot.load_average > thresholds.load_average {
        warnings.push(Warning::LoadAverage {
            load_average: snapshot.load_average,
        });
    }

    if let Some(ratio) = usage_ratio(snapshot.used_memory, snapshot.total_memory)
        && ratio > thresholds.memory_ratio
    {
        warnings.push(Warning::Memory {
            usage_percent: ratio * 100.0,
        });
    }

    if let Some(ratio) = usage_ratio(snapshot.used_disk, snapshot.total_disk)
        && ratio > thresholds.disk_ratio
    {
        let free = snapshot.total_disk.saturating_sub(snapshot.used_disk);
        warnings.push(Warning::Disk {
            free_mib: free as f64 / BYTES_PER_MIB,
        });
    }

    let network_reported = !options.require_network_usage || snapshot.used_network > 0;
    if network_reported
        && let Some(ratio) = usage_ratio(snapshot.used_network, snapshot.total_network)
        && ratio > thresholds.network_ratio
    {
        let available = snapshot.total_network.saturating_sub(snapshot.used_network);
        warnings.push(Warning::Network {
            available_mbit_per_sec: available as f64 * 8.0 / BITS_PER_MEGABIT,
        });
    }

    warnings
}
