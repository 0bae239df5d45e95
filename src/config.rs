//! Machine description, loadable from JSON.
//!
//! ```json
//! {
//!     "units": [{ "kind": "adder", "count": 2, "latency": 1 }],
//!     "rob_size": 16,
//!     "cache": { "kind": "set_associative", "ways": 2, "capacity": 8 },
//!     "predictor": { "kind": "dynamic", "counter_max": 3, "table_size": 16 }
//! }
//! ```
//!
//! Every field is optional and falls back to [`CpuConfig::default`].

use std::path::Path;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::execution_units::FuKind;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UnitConfig {
    pub kind: FuKind,
    #[serde(default = "UnitConfig::default_count")]
    pub count: usize,
    pub latency: u64,
}
impl UnitConfig {
    pub fn new(kind: FuKind, count: usize, latency: u64) -> Self {
        Self {
            kind,
            count,
            latency,
        }
    }

    fn default_count() -> usize {
        1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RegisterConfig {
    pub ints: u32,
    pub floats: u32,
}
impl Default for RegisterConfig {
    fn default() -> Self {
        Self { ints: 8, floats: 8 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Words, addresses wrap around.
    pub size: usize,
    pub read_latency: u64,
    pub write_latency: u64,
}
impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            size: 1024,
            read_latency: 2,
            write_latency: 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CacheConfig {
    #[default]
    None,
    SetAssociative {
        ways: usize,
        /// Lines.
        capacity: usize,
        #[serde(default = "default_cache_latency")]
        read_latency: u64,
        #[serde(default = "default_cache_latency")]
        write_latency: u64,
        #[serde(default = "default_write_back")]
        write_back: bool,
    },
}

fn default_cache_latency() -> u64 {
    1
}

fn default_write_back() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PredictorConfig {
    #[default]
    NonSpeculative,
    AlwaysTaken,
    AlwaysNotTaken,
    Btfnt,
    Dynamic { counter_max: u32, table_size: usize },
}
impl PredictorConfig {
    pub fn is_speculative(&self) -> bool {
        !matches!(self, PredictorConfig::NonSpeculative)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CpuConfig {
    pub units: Vec<UnitConfig>,
    pub registers: RegisterConfig,
    /// Zero disables the reorder buffer and falls back to register-direct
    /// renaming.
    pub rob_size: usize,
    pub memory: MemoryConfig,
    pub cache: CacheConfig,
    pub predictor: PredictorConfig,
    /// One extra cycle between issue and execution start.
    pub issue_delay: bool,
    /// One extra cycle between execution end and publication.
    pub writeback_delay: bool,
    /// Seeds cache victim selection.
    pub seed: u64,
    pub max_cycles: u64,
}
impl Default for CpuConfig {
    fn default() -> Self {
        Self {
            units: vec![
                UnitConfig::new(FuKind::Adder, 3, 2),
                UnitConfig::new(FuKind::Multiplier, 2, 4),
                UnitConfig::new(FuKind::Divider, 1, 8),
                UnitConfig::new(FuKind::Memory, 2, 1),
            ],
            registers: RegisterConfig::default(),
            rob_size: 8,
            memory: MemoryConfig::default(),
            cache: CacheConfig::None,
            predictor: PredictorConfig::NonSpeculative,
            issue_delay: false,
            writeback_delay: false,
            seed: 0,
            max_cycles: 10_000,
        }
    }
}
impl CpuConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: CpuConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn rob_enabled(&self) -> bool {
        self.rob_size > 0
    }

    pub fn has_unit(&self, kind: FuKind) -> bool {
        self.units.iter().any(|unit| unit.kind == kind && unit.count > 0)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.units.iter().all(|unit| unit.count == 0) {
            return Err(ConfigError::NoUnits);
        }

        if self.memory.size == 0 {
            return Err(ConfigError::ZeroMemory);
        }

        if let CacheConfig::SetAssociative { ways, capacity, .. } = self.cache {
            if ways == 0 {
                return Err(ConfigError::ZeroWays);
            }
            if capacity == 0 || capacity % ways != 0 {
                return Err(ConfigError::CacheGeometry { capacity, ways });
            }
        }

        if self.predictor.is_speculative() && !self.rob_enabled() {
            return Err(ConfigError::SpeculationWithoutRob);
        }

        if let PredictorConfig::Dynamic { table_size: 0, .. } = self.predictor {
            return Err(ConfigError::ZeroPredictorTable);
        }

        Ok(())
    }
}
