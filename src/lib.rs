//! Cycle level Tomasulo simulator.
//!
//! A [`Cpu`] is built from a [`CpuConfig`] and an assembled [`Program`] and
//! then driven one clock cycle at a time with [`Cpu::step`], or to completion
//! with [`Cpu::run`]. Each cycle issues at most one instruction, lets every
//! functional unit execute and publish on the common data bus, lets every
//! listener snoop the bus, and finally retires the reorder buffer head.

pub mod assembler;
pub mod branch_prediction;
pub mod cache;
pub mod circular_buffer;
pub mod commiter;
pub mod common_data_bus;
pub mod config;
pub mod cpu;
pub mod dispatcher;
pub mod error;
pub mod execution_units;
pub mod instructions;
pub mod memory;
pub mod registers;
pub mod reorder_buffer;
pub mod stats;

pub use assembler::{assemble, assemble_file};
pub use config::{CacheConfig, CpuConfig, PredictorConfig, UnitConfig};
pub use cpu::Cpu;
pub use error::{ConfigError, ParseError, SimError};
pub use execution_units::FuKind;
pub use instructions::{Op, Operand, Program, Register, StaticInstruction, Value};
pub use stats::{StatsTracker, Timeline};
