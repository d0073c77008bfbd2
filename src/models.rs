// Domain models: one stats sample and the warnings derived from it

use std::fmt;

/// Bytes in one MiB (used for "Mb left" on disk).
pub const BYTES_PER_MIB: f64 = 1024.0 * 1024.0;
/// Bits in one megabit (used for "Mbit/s available" on the network link).
pub const BITS_PER_MEGABIT: f64 = 1_000_000.0;

/// One parsed sample from the stats endpoint. Built fresh per successful fetch,
/// evaluated within the same tick and then dropped.
///
/// `used_* <= total_*` is expected but not enforced; a violating sample is still evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MetricsSnapshot {
    pub load_average: f64,
    pub total_memory: u64,
    pub used_memory: u64,
    pub total_disk: u64,
    pub used_disk: u64,
    /// Link capacity in bytes/sec.
    pub total_network: u64,
    /// Current throughput in bytes/sec. Derived by policy when the feed omits it.
    pub used_network: u64,
}

/// A threshold breach, carrying the already-derived value shown to the operator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Warning {
    LoadAverage { load_average: f64 },
    Memory { usage_percent: f64 },
    Disk { free_mib: f64 },
    Network { available_mbit_per_sec: f64 },
}

/// Rounds half away from zero and drops the fraction for display.
fn whole(value: f64) -> u64 {
    value.round() as u64
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Warning::LoadAverage { load_average } => {
                write!(f, "Load Average is too high: {}", whole(load_average))
            }
            Warning::Memory { usage_percent } => {
                write!(f, "Memory usage too high: {}%", whole(usage_percent))
            }
            Warning::Disk { free_mib } => {
                write!(f, "Free disk space is too low: {} Mb left", whole(free_mib))
            }
            Warning::Network {
                available_mbit_per_sec,
            } => write!(
                f,
                "Network bandwidth usage high: {} Mbit/s available",
                whole(available_mbit_per_sec)
            ),
        }
    }
}
