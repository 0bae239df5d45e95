use thiserror::Error;

use crate::execution_units::FuKind;
use crate::instructions::Register;

/// Assembler errors. Lines are 1-based.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("line {line}: unknown mnemonic `{mnemonic}`")]
    UnknownMnemonic { line: usize, mnemonic: String },

    #[error("line {line}: {mnemonic} takes {expected} operands, found {found}")]
    OperandCount {
        line: usize,
        mnemonic: String,
        expected: usize,
        found: usize,
    },

    #[error("line {line}: `{operand}` is neither an integer nor a register")]
    BadOperand { line: usize, operand: String },

    #[error("line {line}: destination `{operand}` must be a register")]
    BadDestination { line: usize, operand: String },

    #[error("line {line}: jump target `{target}` must be an integer literal")]
    BadTarget { line: usize, target: String },

    #[error(transparent)]
    Pattern(#[from] regex::Error),
}

/// Rejected configurations, reported before the first cycle.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cache capacity {capacity} is not a multiple of its {ways} ways")]
    CacheGeometry { capacity: usize, ways: usize },

    #[error("cache needs at least one way")]
    ZeroWays,

    #[error("no functional units configured")]
    NoUnits,

    #[error("row {row} needs a {kind} unit but none is configured")]
    MissingUnit { kind: FuKind, row: usize },

    #[error("row {row} names register {register} which does not exist")]
    UnknownRegister { register: Register, row: usize },

    #[error("speculative branch prediction needs a reorder buffer")]
    SpeculationWithoutRob,

    #[error("memory must hold at least one word")]
    ZeroMemory,

    #[error("dynamic predictor table needs at least one slot")]
    ZeroPredictorTable,

    #[error("invalid configuration file: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum SimError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("simulation still running after {0} cycles")]
    CycleLimit(u64),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
