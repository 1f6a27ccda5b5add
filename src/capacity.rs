//! Greedy first-come-first-served packing of applications into a shipment.
//!
//! Candidates are considered strictly in the order given. A candidate that does
//! not fit is skipped for good, even if a later, smaller one would have fit in
//! its place. This is first-fit, not optimal bin packing.

use serde::{Deserialize, Serialize};

/// Committed weight/volume on a shipment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Load {
    pub weight_kg: f64,
    pub volume_m3: f64,
}

/// Maximum weight/volume a shipment may carry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Capacity {
    pub max_weight_kg: f64,
    pub max_volume_m3: f64,
}

impl Capacity {
    /// True if `load + (weight, volume)` stays within both limits.
    pub fn fits(&self, load: Load, weight_kg: f64, volume_m3: f64) -> bool {
        load.weight_kg + weight_kg <= self.max_weight_kg
            && load.volume_m3 + volume_m3 <= self.max_volume_m3
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub application_id: i64,
    pub weight_kg: f64,
    pub volume_m3: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Packing {
    pub accepted: Vec<Candidate>,
    pub rejected: Vec<Candidate>,
    pub load: Load,
}

/// Decide which candidates to accept, in order, starting from `load`.
pub fn pack(capacity: Capacity, load: Load, candidates: &[Candidate]) -> Packing {
    let mut load = load;
    let mut accepted = Vec::new();
    let mut rejected = Vec::new();
    for c in candidates {
        if capacity.fits(load, c.weight_kg, c.volume_m3) {
            load.weight_kg += c.weight_kg;
            load.volume_m3 += c.volume_m3;
            accepted.push(*c);
        } else {
            rejected.push(*c);
        }
    }
    Packing {
        accepted,
        rejected,
        load,
    }
}
