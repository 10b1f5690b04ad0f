//! Workload generation: a lazy stream of scheduled operations.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use oxbow_common::{Key, KeyDistribution, OpKind, SimConfig, SimTime, Value};

/// Fraction of write operations that are inserts; the rest are deletes.
const INSERT_SHARE_OF_WRITES: f64 = 0.9;

/// One scheduled workload operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkloadOp {
    pub kind: OpKind,
    pub key: Key,
    pub value: Value,
    /// Simulated time at which the compute node picks this up.
    pub timestamp: SimTime,
}

/// Produces operations paced at `ops_per_second` until the simulated
/// duration is exhausted. Deterministic for a fixed seed.
pub struct WorkloadGenerator {
    rng: StdRng,
    node_id: u32,
    key_range: u64,
    read_ratio: f64,
    zipfian_alpha: f64,
    interval: SimTime,
    next_time: SimTime,
    end_time: SimTime,
}

impl WorkloadGenerator {
    pub fn new(config: &SimConfig, node_id: u32) -> Self {
        let alpha = match config.key_distribution {
            KeyDistribution::Uniform => 0.0,
            KeyDistribution::Zipfian => config.zipfian_alpha,
        };
        Self {
            rng: StdRng::seed_from_u64(config.seed.wrapping_add(node_id as u64)),
            node_id,
            key_range: config.key_range,
            read_ratio: config.read_ratio,
            zipfian_alpha: alpha,
            interval: 1_000_000_000 / config.ops_per_second,
            next_time: 0,
            end_time: config.simulation_duration_ns(),
        }
    }

    fn next_key(&mut self) -> Key {
        let u: f64 = self.rng.gen();
        if self.zipfian_alpha <= 0.0 {
            (u * self.key_range as f64) as Key % self.key_range
        } else {
            // Inverse-power Zipfian; clamp away from zero so the pow
            // stays finite.
            let u = u.max(1e-10);
            u.powf(-1.0 / self.zipfian_alpha) as Key % self.key_range
        }
    }

    fn next_kind(&mut self) -> OpKind {
        if self.rng.gen::<f64>() < self.read_ratio {
            OpKind::Search
        } else if self.rng.gen::<f64>() < INSERT_SHARE_OF_WRITES {
            OpKind::Insert
        } else {
            OpKind::Delete
        }
    }
}

impl Iterator for WorkloadGenerator {
    type Item = WorkloadOp;

    fn next(&mut self) -> Option<WorkloadOp> {
        if self.next_time >= self.end_time {
            return None;
        }
        let timestamp = self.next_time;
        self.next_time += self.interval;

        let kind = self.next_kind();
        let key = self.next_key();
        Some(WorkloadOp {
            kind,
            key,
            value: key * 1000 + self.node_id as u64,
            timestamp,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(read_ratio: f64, dist: KeyDistribution) -> SimConfig {
        let mut config = SimConfig::default();
        config.key_range = 1_000;
        config.read_ratio = read_ratio;
        config.key_distribution = dist;
        config.zipfian_alpha = 0.9;
        config.ops_per_second = 1_000_000; // one op per microsecond
        config.simulation_duration_us = 10_000;
        config.seed = 7;
        config
    }

    #[test]
    fn test_ops_are_paced_by_rate() {
        let config = config(0.5, KeyDistribution::Uniform);
        let ops: Vec<_> = WorkloadGenerator::new(&config, 0).collect();
        assert_eq!(ops.len(), 10_000);
        assert_eq!(ops[0].timestamp, 0);
        assert_eq!(ops[1].timestamp, 1_000);
        assert_eq!(ops[9_999].timestamp, 9_999_000);
    }

    #[test]
    fn test_deterministic_for_fixed_seed() {
        let config = config(0.5, KeyDistribution::Zipfian);
        let a: Vec<_> = WorkloadGenerator::new(&config, 0).collect();
        let b: Vec<_> = WorkloadGenerator::new(&config, 0).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_different_nodes_get_different_streams() {
        let config = config(0.5, KeyDistribution::Uniform);
        let a: Vec<_> = WorkloadGenerator::new(&config, 0).collect();
        let b: Vec<_> = WorkloadGenerator::new(&config, 1).collect();
        assert_ne!(
            a.iter().map(|op| op.key).collect::<Vec<_>>(),
            b.iter().map(|op| op.key).collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_keys_stay_in_range() {
        let config = config(0.0, KeyDistribution::Zipfian);
        for op in WorkloadGenerator::new(&config, 0) {
            assert!(op.key < 1_000);
        }
    }

    #[test]
    fn test_read_ratio_controls_mix() {
        let config = config(0.95, KeyDistribution::Uniform);
        let ops: Vec<_> = WorkloadGenerator::new(&config, 0).collect();
        let searches = ops.iter().filter(|op| op.kind == OpKind::Search).count();
        let ratio = searches as f64 / ops.len() as f64;
        assert!((0.93..=0.97).contains(&ratio), "search ratio {}", ratio);
    }

    #[test]
    fn test_all_reads_when_ratio_is_one() {
        let config = config(1.0, KeyDistribution::Uniform);
        assert!(WorkloadGenerator::new(&config, 0).all(|op| op.kind == OpKind::Search));
    }

    #[test]
    fn test_writes_split_between_inserts_and_deletes() {
        let config = config(0.0, KeyDistribution::Uniform);
        let ops: Vec<_> = WorkloadGenerator::new(&config, 0).collect();
        let inserts = ops.iter().filter(|op| op.kind == OpKind::Insert).count();
        let deletes = ops.iter().filter(|op| op.kind == OpKind::Delete).count();
        assert_eq!(inserts + deletes, ops.len());
        let insert_share = inserts as f64 / ops.len() as f64;
        assert!((0.87..=0.93).contains(&insert_share), "insert share {}", insert_share);
    }

    #[test]
    fn test_zipfian_skews_toward_small_keys() {
        let config = config(0.0, KeyDistribution::Zipfian);
        let ops: Vec<_> = WorkloadGenerator::new(&config, 0).collect();
        let small = ops.iter().filter(|op| op.key < 10).count();
        let uniform_config = config_uniform();
        let uniform_small = WorkloadGenerator::new(&uniform_config, 0)
            .filter(|op| op.key < 10)
            .count();
        assert!(
            small > uniform_small * 5,
            "zipfian small-key hits {} vs uniform {}",
            small,
            uniform_small
        );
    }

    fn config_uniform() -> SimConfig {
        config(0.0, KeyDistribution::Uniform)
    }

    #[test]
    fn test_values_encode_key_and_node() {
        let config = config(0.0, KeyDistribution::Uniform);
        for op in WorkloadGenerator::new(&config, 3).take(100) {
            assert_eq!(op.value, op.key * 1000 + 3);
        }
    }
}
