//! Shared harness for the integration tests.
#![allow(dead_code)]

use std::collections::BTreeMap;

use tomasim::{
    assemble, CacheConfig, Cpu, CpuConfig, FuKind, Op, Operand, PredictorConfig, Program,
    Register, UnitConfig, Value,
};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn program(source: &str) -> Program {
    assemble(source).expect("test program assembles")
}

/// Small machine with short latencies so runs stay short.
pub fn small_config() -> CpuConfig {
    CpuConfig {
        units: vec![
            UnitConfig::new(FuKind::Adder, 2, 1),
            UnitConfig::new(FuKind::Multiplier, 1, 3),
            UnitConfig::new(FuKind::Divider, 1, 4),
            UnitConfig::new(FuKind::Memory, 2, 1),
        ],
        memory: tomasim::config::MemoryConfig {
            size: 256,
            read_latency: 2,
            write_latency: 2,
        },
        max_cycles: 5_000,
        ..CpuConfig::default()
    }
}

pub fn with_rob(mut config: CpuConfig, rob_size: usize, predictor: PredictorConfig) -> CpuConfig {
    config.rob_size = rob_size;
    config.predictor = predictor;
    config
}

pub fn with_cache(mut config: CpuConfig, ways: usize, capacity: usize, write_back: bool) -> CpuConfig {
    config.cache = CacheConfig::SetAssociative {
        ways,
        capacity,
        read_latency: 1,
        write_latency: 1,
        write_back,
    };
    config
}

/// Every configuration family the scenario tests run under.
pub fn all_configs() -> Vec<(&'static str, CpuConfig)> {
    let dynamic = PredictorConfig::Dynamic {
        counter_max: 3,
        table_size: 4,
    };

    vec![
        ("register-direct", with_rob(small_config(), 0, PredictorConfig::NonSpeculative)),
        ("rob non-speculative", with_rob(small_config(), 6, PredictorConfig::NonSpeculative)),
        ("rob always-taken", with_rob(small_config(), 6, PredictorConfig::AlwaysTaken)),
        ("rob always-not-taken", with_rob(small_config(), 6, PredictorConfig::AlwaysNotTaken)),
        ("rob btfnt", with_rob(small_config(), 4, PredictorConfig::Btfnt)),
        ("rob dynamic", with_rob(small_config(), 8, dynamic)),
        (
            "rob dynamic write-back cache",
            with_cache(with_rob(small_config(), 8, dynamic), 2, 4, true),
        ),
        (
            "register-direct write-through cache",
            with_cache(with_rob(small_config(), 0, PredictorConfig::NonSpeculative), 1, 2, false),
        ),
    ]
}

pub fn run(config: CpuConfig, program: Program) -> Cpu {
    init_logging();
    let mut cpu = Cpu::new(config, program).expect("valid machine");
    cpu.run().expect("program terminates");
    cpu
}

/// Architectural state of a sequential, one instruction at a time run.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Reference {
    pub registers: BTreeMap<Register, Value>,
    /// Only words that differ from their power-on value.
    pub memory: BTreeMap<usize, Value>,
}
impl Reference {
    pub fn register(&self, reg: Register) -> Value {
        self.registers.get(&reg).copied().unwrap_or(0)
    }
}

pub fn evaluate(program: &Program, memory_size: usize) -> Reference {
    let mut state = Reference::default();
    let mut zero = false;
    let mut pc = 0;
    let mut steps = 0;

    let wrap = |addr: Value| addr.rem_euclid(memory_size as Value) as usize;

    while let Some(instr) = program.get(pc) {
        steps += 1;
        assert!(steps < 100_000, "reference run does not terminate");

        let read = |state: &Reference, operand: &Operand| match operand {
            Operand::Literal(v) => *v,
            Operand::Reg(reg) => state.register(*reg),
        };
        let a = read(&state, &instr.src0);
        let b = read(&state, &instr.src1);

        pc += 1;
        match instr.op {
            Op::Add | Op::Sub | Op::Mul | Op::Div => {
                let value = match instr.op {
                    Op::Add => a.wrapping_add(b),
                    Op::Sub => a.wrapping_sub(b),
                    Op::Mul => a.wrapping_mul(b),
                    _ => a.checked_div(b).unwrap_or(0),
                };
                zero = value == 0;
                state.registers.insert(instr.dst.unwrap(), value);
            }
            Op::Ldr => {
                let addr = wrap(a.wrapping_add(b));
                let value = state.memory.get(&addr).copied().unwrap_or(addr as Value);
                state.registers.insert(instr.dst.unwrap(), value);
            }
            Op::Str => {
                let addr = wrap(a);
                if b == addr as Value {
                    state.memory.remove(&addr);
                } else {
                    state.memory.insert(addr, b);
                }
            }
            Op::Jmp => pc = instr.target(),
            Op::Jz if zero => pc = instr.target(),
            Op::Jnz if !zero => pc = instr.target(),
            Op::Jz | Op::Jnz => (),
        }
    }

    state.registers.retain(|_, v| *v != 0);
    state
}

/// The simulator's architectural state in the same shape as [`evaluate`].
pub fn observe(cpu: &Cpu) -> Reference {
    let registers = cpu
        .registers()
        .iter()
        .filter(|(_, entry)| entry.value != 0)
        .map(|(reg, entry)| (*reg, entry.value))
        .collect();

    let size = cpu.memory().cache().memory().size();
    let memory = (0..size)
        .filter_map(|addr| {
            let value = cpu.memory().peek(addr as Value);
            (value != addr as Value).then_some((addr, value))
        })
        .collect();

    Reference { registers, memory }
}
