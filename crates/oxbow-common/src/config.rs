//! Simulation configuration.

use serde::{Deserialize, Serialize};

use crate::addr::{AddressMap, NODE_POOL_OFFSET};
use crate::error::{OxbowError, Result};
use crate::node::serialized_size;

/// Key skew of the generated workload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyDistribution {
    Uniform,
    #[default]
    Zipfian,
}

/// Configuration for one simulation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimConfig {
    /// B+tree fanout: maximum keys per node. Determines the serialized
    /// node footprint.
    pub fanout: u32,
    /// Number of memory nodes (slabs). Must match the deployment.
    pub num_memory_nodes: u32,
    /// Bytes of address space per memory node.
    pub slab_size: u64,
    /// Base of the global memory address space.
    pub base_address: u64,
    /// Upper bound for workload key generation.
    pub key_range: u64,
    /// Probability of generating a Search instead of a write.
    pub read_ratio: f64,
    /// Key skew of the workload.
    pub key_distribution: KeyDistribution,
    /// Zipfian skew exponent; 0 degrades to uniform.
    pub zipfian_alpha: f64,
    /// Workload pacing: operations per simulated second.
    pub ops_per_second: u64,
    /// Simulated run length in microseconds.
    pub simulation_duration_us: u64,
    /// One-way request/response latency in nanoseconds.
    pub mem_latency_ns: u64,
    /// Workload RNG seed; runs are reproducible for a fixed seed.
    pub seed: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            fanout: 16,
            num_memory_nodes: 4,
            slab_size: 0x100_0000, // 16 MiB per memory node
            base_address: 0x1000_0000,
            key_range: 1_000_000,
            read_ratio: 0.95,
            key_distribution: KeyDistribution::Zipfian,
            zipfian_alpha: 0.9,
            ops_per_second: 10_000,
            simulation_duration_us: 1_000_000,
            mem_latency_ns: 100,
            seed: 0,
        }
    }
}

impl SimConfig {
    /// Serialized footprint of one tree node under this configuration.
    pub fn node_size(&self) -> usize {
        serialized_size(self.fanout)
    }

    /// Simulated run length in nanoseconds.
    pub fn simulation_duration_ns(&self) -> u64 {
        self.simulation_duration_us * 1_000
    }

    /// Builds the address map shared by compute and memory nodes.
    pub fn address_map(&self) -> AddressMap {
        AddressMap::new(
            self.base_address,
            self.slab_size,
            self.num_memory_nodes,
            self.node_size() as u64,
        )
    }

    /// Validates the configuration and reports the first invalid
    /// parameter, if any.
    pub fn validate(&self) -> Result<()> {
        if self.fanout < 2 {
            return Err(invalid("fanout", self.fanout));
        }
        if self.num_memory_nodes == 0 {
            return Err(invalid("num_memory_nodes", self.num_memory_nodes));
        }
        if self.slab_size < NODE_POOL_OFFSET + self.node_size() as u64 {
            return Err(invalid("slab_size", self.slab_size));
        }
        if !(0.0..=1.0).contains(&self.read_ratio) {
            return Err(invalid("read_ratio", self.read_ratio));
        }
        if self.zipfian_alpha < 0.0 {
            return Err(invalid("zipfian_alpha", self.zipfian_alpha));
        }
        if self.key_range == 0 {
            return Err(invalid("key_range", self.key_range));
        }
        if self.ops_per_second == 0 {
            return Err(invalid("ops_per_second", self.ops_per_second));
        }
        Ok(())
    }
}

fn invalid(name: &str, value: impl std::fmt::Display) -> OxbowError {
    OxbowError::InvalidParameter {
        name: name.to_string(),
        value: value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = SimConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.fanout, 16);
        assert_eq!(config.num_memory_nodes, 4);
        assert_eq!(config.slab_size, 16 * 1024 * 1024);
        assert_eq!(config.base_address, 0x1000_0000);
        assert_eq!(config.key_distribution, KeyDistribution::Zipfian);
    }

    #[test]
    fn test_node_size_tracks_fanout() {
        let mut config = SimConfig::default();
        config.fanout = 4;
        assert_eq!(config.node_size(), serialized_size(4));
        config.fanout = 16;
        assert_eq!(config.node_size(), serialized_size(16));
    }

    #[test]
    fn test_validate_rejects_zero_fanout() {
        let mut config = SimConfig::default();
        config.fanout = 0;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, OxbowError::InvalidParameter { name, .. } if name == "fanout"));
    }

    #[test]
    fn test_validate_rejects_zero_memory_nodes() {
        let mut config = SimConfig::default();
        config.num_memory_nodes = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_tiny_slab() {
        let mut config = SimConfig::default();
        config.slab_size = NODE_POOL_OFFSET; // no room for a single pooled node
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_read_ratio() {
        let mut config = SimConfig::default();
        config.read_ratio = 1.5;
        assert!(config.validate().is_err());
        config.read_ratio = -0.1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_rate_and_range() {
        let mut config = SimConfig::default();
        config.ops_per_second = 0;
        assert!(config.validate().is_err());

        let mut config = SimConfig::default();
        config.key_range = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_address_map_uses_config_geometry() {
        let mut config = SimConfig::default();
        config.fanout = 4;
        config.num_memory_nodes = 2;
        let map = config.address_map();
        assert_eq!(map.num_memory_nodes(), 2);
        assert_eq!(map.node_size(), serialized_size(4) as u64);
        assert_eq!(map.root_address().0, config.base_address);
    }

    #[test]
    fn test_serde_roundtrip() {
        let original = SimConfig::default();
        let serialized = serde_json::to_string(&original).unwrap();
        let deserialized: SimConfig = serde_json::from_str(&serialized).unwrap();
        assert_eq!(original.fanout, deserialized.fanout);
        assert_eq!(original.slab_size, deserialized.slab_size);
        assert_eq!(original.key_distribution, deserialized.key_distribution);
        assert_eq!(original.read_ratio, deserialized.read_ratio);
    }

    #[test]
    fn test_key_distribution_serde_names() {
        assert_eq!(
            serde_json::to_string(&KeyDistribution::Uniform).unwrap(),
            "\"uniform\""
        );
        assert_eq!(
            serde_json::from_str::<KeyDistribution>("\"zipfian\"").unwrap(),
            KeyDistribution::Zipfian
        );
    }

    #[test]
    fn test_duration_conversion() {
        let mut config = SimConfig::default();
        config.simulation_duration_us = 2_500;
        assert_eq!(config.simulation_duration_ns(), 2_500_000);
    }
}
