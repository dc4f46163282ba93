//! Sizing recommender
//!
//! Maps aggregated peak CPU/memory to a discrete (vCPU, RAM) size and a
//! vendor instance tier. The tier lookup is a total, ordered decision
//! table evaluated top-down; rule order is part of the contract (a 1-vCPU
//! container with 5 GB of RAM falls through to the catch-all, not to a
//! 1-vCPU tier).

use crate::models::{InstanceSet, SizingRecommendation};

/// Size for 80% utilization of each vCPU at peak, not 100%.
pub const CPU_HEADROOM_DIVISOR: f64 = 80.0;

/// Fixed 50% headroom over observed peak memory.
pub const MEM_HEADROOM_FACTOR: f64 = 1.5;

struct InstanceTier {
    matches: fn(vcpu: u32, ram_gb: f64) -> bool,
    aws: &'static str,
    gcp: &'static str,
    azure: &'static str,
}

fn tier_micro(vcpu: u32, ram_gb: f64) -> bool {
    vcpu == 1 && ram_gb <= 1.0
}

fn tier_small(vcpu: u32, ram_gb: f64) -> bool {
    vcpu == 1 && ram_gb <= 2.0
}

fn tier_medium(vcpu: u32, _ram_gb: f64) -> bool {
    vcpu == 2
}

fn tier_any(_vcpu: u32, _ram_gb: f64) -> bool {
    true
}

/// Evaluated top-down; the final row matches everything.
const INSTANCE_TIERS: &[InstanceTier] = &[
    InstanceTier { matches: tier_micro, aws: "t3.micro", gcp: "e2-micro", azure: "B1s" },
    InstanceTier { matches: tier_small, aws: "t3.small", gcp: "e2-small", azure: "B1ms" },
    InstanceTier { matches: tier_medium, aws: "t3.medium", gcp: "e2-medium", azure: "B2s" },
    InstanceTier { matches: tier_any, aws: "t3.large+", gcp: "e2-standard+", azure: "B2ms+" },
];

/// Derive a sizing recommendation from peak CPU percent and peak memory MB.
pub fn recommend(peak_cpu_percent: f64, peak_mem_mb: f64) -> SizingRecommendation {
    let vcpu = round_half_up(peak_cpu_percent / CPU_HEADROOM_DIVISOR).max(1);
    let ram_gb = round2(peak_mem_mb * MEM_HEADROOM_FACTOR / 1024.0);

    let tier = INSTANCE_TIERS
        .iter()
        .find(|t| (t.matches)(vcpu, ram_gb))
        .unwrap_or(&INSTANCE_TIERS[INSTANCE_TIERS.len() - 1]);

    SizingRecommendation {
        vcpu,
        ram_gb,
        instances: InstanceSet {
            aws: tier.aws.to_string(),
            gcp: tier.gcp.to_string(),
            azure: tier.azure.to_string(),
        },
    }
}

/// Round-half-up on a non-negative value. Chosen explicitly over the
/// platform's half-to-even default so .5 sizing boundaries round toward
/// the larger instance.
fn round_half_up(value: f64) -> u32 {
    (value + 0.5).floor() as u32
}

/// Round to two decimal places.
pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
