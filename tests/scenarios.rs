mod common;

use pretty_assertions::assert_eq;
use rstest::rstest;

use common::{all_configs, evaluate, observe, program, run, small_config, with_rob};
use tomasim::{PredictorConfig, Register, Value};

const SCENARIO_A: &str = "
ADD 3,5,R0
SUB R0,2,R0
MUL R0,1,R1
DIV R1,3,R3
";

const SCENARIO_B: &str = "
ADD 3,5,R0
STR 42,R0
LDR R0,0,R1
ADD 1,R1,R2
";

const SCENARIO_C: &str = "
ADD 1,R0,R0   ; loop
SUB R0,5,R1
JNZ 0
ADD 42,0,R2
";

/// Countdown that stores partial sums, then reads two of them back.
const STORE_LOOP: &str = "
ADD 0,3,R0
ADD 0,0,R1
ADD R1,R0,R1    ; row 2
STR R0,R1
SUB R0,1,R0
JNZ 2
LDR 2,0,R2
LDR 0,1,R3
MUL R2,R3,R4
DIV R4,2,F5
";

/// Memory accesses whose address is ready long before the stored value.
const SLOW_STORES: &str = "
DIV 84,2,R2
STR 10,R2
LDR 10,0,R1
MUL R1,3,R3
STR 12,R3
STR 12,7
LDR 12,0,R4
";

fn reg(cpu: &tomasim::Cpu, name: &str) -> Value {
    let reg: Register = name.parse().unwrap();
    cpu.registers().get(reg)
}

#[test]
fn scenario_a_register_direct() {
    let config = with_rob(small_config(), 0, PredictorConfig::NonSpeculative);
    let cpu = run(config, program(SCENARIO_A));

    assert_eq!(
        (reg(&cpu, "R0"), reg(&cpu, "R1"), reg(&cpu, "R3")),
        (6, 6, 2)
    );
    assert_eq!(cpu.stats().instructions_commited, 4);
}

#[test]
fn scenario_b_store_then_load() {
    for (name, config) in all_configs() {
        let cpu = run(config, program(SCENARIO_B));

        assert_eq!(cpu.memory().peek(42), 8, "{}", name);
        assert_eq!((reg(&cpu, "R1"), reg(&cpu, "R2")), (8, 9), "{}", name);
    }
}

#[rstest]
#[case::non_speculative(0, PredictorConfig::NonSpeculative)]
#[case::non_speculative_with_rob(4, PredictorConfig::NonSpeculative)]
#[case::always_taken(8, PredictorConfig::AlwaysTaken)]
#[case::always_not_taken(8, PredictorConfig::AlwaysNotTaken)]
#[case::btfnt(2, PredictorConfig::Btfnt)]
#[case::dynamic(8, PredictorConfig::Dynamic { counter_max: 3, table_size: 2 })]
fn scenario_c_converges(#[case] rob_size: usize, #[case] predictor: PredictorConfig) {
    let cpu = run(with_rob(small_config(), rob_size, predictor), program(SCENARIO_C));

    assert_eq!((reg(&cpu, "R0"), reg(&cpu, "R1"), reg(&cpu, "R2")), (5, 0, 42));
    assert!(cpu.is_finished());
}

#[test]
fn always_taken_discards_extra_iterations() {
    let config = with_rob(small_config(), 8, PredictorConfig::AlwaysTaken);
    let cpu = run(config, program(SCENARIO_C));

    let stats = cpu.stats();
    assert_eq!(stats.branch_mispredictions, 1);
    assert_eq!(stats.flushes, 1);
    assert!(stats.instructions_issued > stats.instructions_commited);
    // 5 iterations of three rows plus the final add
    assert_eq!(stats.instructions_commited, 16);
    assert!(cpu.timeline().records().iter().any(|r| r.flushed));
}

#[test]
fn non_speculative_never_mispredicts() {
    let config = with_rob(small_config(), 0, PredictorConfig::NonSpeculative);
    let cpu = run(config, program(SCENARIO_C));

    assert_eq!(cpu.stats().branch_mispredictions, 0);
    assert_eq!(cpu.stats().instructions_issued, 16);
    assert!(cpu.timeline().records().iter().all(|r| !r.flushed));
}

#[rstest]
#[case::scenario_a(SCENARIO_A)]
#[case::scenario_b(SCENARIO_B)]
#[case::scenario_c(SCENARIO_C)]
#[case::store_loop(STORE_LOOP)]
#[case::slow_stores(SLOW_STORES)]
fn matches_sequential_evaluation(#[case] source: &str) {
    let program = program(source);

    for (name, config) in all_configs() {
        let expected = evaluate(&program, config.memory.size);
        let cpu = run(config, program.clone());
        assert_eq!(observe(&cpu), expected, "{}", name);
    }
}

#[test]
fn store_loop_values() {
    let program = program(STORE_LOOP);
    let expected = evaluate(&program, 256);

    assert_eq!(expected.register("R4".parse().unwrap()), 30);
    assert_eq!(expected.register("F5".parse().unwrap()), 15);
    // first partial sum equals its own address
    assert_eq!(expected.memory.get(&3), None);
    assert_eq!(expected.memory.get(&2), Some(&5));
    assert_eq!(expected.memory.get(&1), Some(&6));
}

#[test]
fn register_direct_load_sees_older_store() {
    let config = with_rob(small_config(), 0, PredictorConfig::NonSpeculative);
    let cpu = run(config, program(SLOW_STORES));

    assert_eq!((reg(&cpu, "R1"), reg(&cpu, "R4")), (42, 7));
    assert_eq!(cpu.memory().peek(12), 7);
    assert!(cpu.stats().issue_stalls > 0);
}

#[test]
fn delays_slow_the_machine_down_without_changing_results() {
    let fast = run(small_config(), program(SCENARIO_A));

    let mut config = small_config();
    config.issue_delay = true;
    config.writeback_delay = true;
    let slow = run(config, program(SCENARIO_A));

    assert_eq!(observe(&fast), observe(&slow));
    assert!(slow.clock() > fast.clock());
}
