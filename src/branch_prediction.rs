use std::fmt;

use crate::config::PredictorConfig;
use crate::instructions::{Op, StaticInstruction, Value};
use crate::registers::Flags;
use crate::reorder_buffer::RobEntry;

/// Whether the branch really goes to its target under `flags`.
pub fn is_taken(instr: &StaticInstruction, flags: Flags) -> bool {
    match instr.op {
        Op::Jmp => true,
        Op::Jz => flags.zero,
        Op::Jnz => !flags.zero,
        _ => false,
    }
}

/// The correct next program counter once the flags are known.
pub fn resolve(instr: &StaticInstruction, flags: Flags) -> usize {
    if is_taken(instr, flags) {
        instr.target()
    } else {
        instr.row + 1
    }
}

pub trait BranchPredictor: fmt::Debug {
    /// Non speculative predictors make the issue stage wait for the machine
    /// to drain, so every prediction is already correct.
    fn is_speculative(&self) -> bool {
        true
    }

    /// Predicted next program counter, asked at issue.
    fn next_pc(&mut self, instr: &StaticInstruction, flags: Flags) -> usize;

    /// Checks a committed branch. `None` when the prediction held, the
    /// correct program counter otherwise.
    fn validate_choice(&mut self, entry: &RobEntry, flags: Flags) -> Option<usize> {
        let correct = resolve(&entry.instruction, flags);
        (entry.value != correct as Value).then_some(correct)
    }
}

#[derive(Debug, Default)]
pub struct NonSpeculative;
impl BranchPredictor for NonSpeculative {
    fn is_speculative(&self) -> bool {
        false
    }

    fn next_pc(&mut self, instr: &StaticInstruction, flags: Flags) -> usize {
        resolve(instr, flags)
    }
}

#[derive(Debug, Default)]
pub struct AlwaysTaken;
impl BranchPredictor for AlwaysTaken {
    fn next_pc(&mut self, instr: &StaticInstruction, _flags: Flags) -> usize {
        instr.target()
    }
}

/// Unconditional jumps still go to their target.
#[derive(Debug, Default)]
pub struct AlwaysNotTaken;
impl BranchPredictor for AlwaysNotTaken {
    fn next_pc(&mut self, instr: &StaticInstruction, _flags: Flags) -> usize {
        match instr.op {
            Op::Jmp => instr.target(),
            _ => instr.row + 1,
        }
    }
}

/// Backward branches are loops and predicted taken.
#[derive(Debug, Default)]
pub struct BackwardTakenForwardNotTaken;
impl BranchPredictor for BackwardTakenForwardNotTaken {
    fn next_pc(&mut self, instr: &StaticInstruction, _flags: Flags) -> usize {
        if instr.op == Op::Jmp || instr.target() < instr.row {
            instr.target()
        } else {
            instr.row + 1
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaturatingCounter {
    value: u32,
    max: u32,
}
impl SaturatingCounter {
    pub fn new(max: u32) -> Self {
        Self { value: max / 2, max }
    }

    pub fn value(&self) -> u32 {
        self.value
    }

    pub fn update_taken(&mut self) {
        self.value = (self.value + 1).min(self.max);
    }

    pub fn update_not_taken(&mut self) {
        self.value = self.value.saturating_sub(1);
    }

    /// Above the midpoint is taken, exactly on it is undecided.
    pub fn predict(&self) -> Option<bool> {
        let doubled = 2 * u64::from(self.value);
        let max = u64::from(self.max);

        match doubled.cmp(&max) {
            std::cmp::Ordering::Greater => Some(true),
            std::cmp::Ordering::Less => Some(false),
            std::cmp::Ordering::Equal => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PredictorSlot {
    pub counter: SaturatingCounter,
    pub last_taken: bool,
    /// Row that last used this slot.
    pub owner: Option<usize>,
}
impl PredictorSlot {
    fn fresh(counter_max: u32, owner: Option<usize>) -> Self {
        Self {
            counter: SaturatingCounter::new(counter_max),
            last_taken: false,
            owner,
        }
    }
}

/// Table of saturating counters indexed by row modulo the table size.
#[derive(Debug)]
pub struct Dynamic {
    counter_max: u32,
    slots: Vec<PredictorSlot>,
}
impl Dynamic {
    pub fn new(counter_max: u32, table_size: usize) -> Self {
        Self {
            counter_max,
            slots: vec![PredictorSlot::fresh(counter_max, None); table_size],
        }
    }

    pub fn slots(&self) -> &[PredictorSlot] {
        &self.slots
    }

    /// Slot for `row`, reset first if another row owns it.
    fn slot(&mut self, row: usize) -> Option<&mut PredictorSlot> {
        let counter_max = self.counter_max;
        let len = self.slots.len();
        let slot = self.slots.get_mut(row % len.max(1))?;

        if slot.owner != Some(row) {
            *slot = PredictorSlot::fresh(counter_max, Some(row));
        }

        Some(slot)
    }
}
impl BranchPredictor for Dynamic {
    fn next_pc(&mut self, instr: &StaticInstruction, _flags: Flags) -> usize {
        if instr.op == Op::Jmp {
            return instr.target();
        }

        let taken = match self.slot(instr.row) {
            Some(slot) => slot.counter.predict().unwrap_or(slot.last_taken),
            None => false,
        };

        if taken {
            instr.target()
        } else {
            instr.row + 1
        }
    }

    fn validate_choice(&mut self, entry: &RobEntry, flags: Flags) -> Option<usize> {
        let instr = &entry.instruction;

        if instr.op != Op::Jmp {
            let taken = is_taken(instr, flags);
            if let Some(slot) = self.slot(instr.row) {
                if taken {
                    slot.counter.update_taken();
                } else {
                    slot.counter.update_not_taken();
                }
                slot.last_taken = taken;
            }
        }

        let correct = resolve(instr, flags);
        (entry.value != correct as Value).then_some(correct)
    }
}

pub fn build(config: &PredictorConfig) -> Box<dyn BranchPredictor> {
    match config {
        PredictorConfig::NonSpeculative => Box::new(NonSpeculative),
        PredictorConfig::AlwaysTaken => Box::new(AlwaysTaken),
        PredictorConfig::AlwaysNotTaken => Box::new(AlwaysNotTaken),
        PredictorConfig::Btfnt => Box::new(BackwardTakenForwardNotTaken),
        PredictorConfig::Dynamic {
            counter_max,
            table_size,
        } => Box::new(Dynamic::new(*counter_max, *table_size)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common_data_bus::Destination;
    use rstest::rstest;

    const ZERO: Flags = Flags {
        zero: true,
        negative: false,
    };
    const NONZERO: Flags = Flags {
        zero: false,
        negative: false,
    };

    fn committed(instr: StaticInstruction, predicted: usize) -> RobEntry {
        RobEntry {
            instruction: instr,
            destination: Destination::ProgramCounter,
            value: predicted as Value,
            ready_at: Some(1),
            uid: 0,
        }
    }

    #[rstest]
    #[case(Op::Jmp, NONZERO, 2)]
    #[case(Op::Jz, ZERO, 2)]
    #[case(Op::Jz, NONZERO, 6)]
    #[case(Op::Jnz, NONZERO, 2)]
    #[case(Op::Jnz, ZERO, 6)]
    fn resolution(#[case] op: Op, #[case] flags: Flags, #[case] expected: usize) {
        assert_eq!(resolve(&StaticInstruction::jump(op, 2, 5), flags), expected);
    }

    #[test]
    fn static_strategies() {
        let back = StaticInstruction::jump(Op::Jnz, 1, 4);
        let fwd = StaticInstruction::jump(Op::Jz, 9, 4);
        let jmp = StaticInstruction::jump(Op::Jmp, 9, 4);

        assert_eq!(AlwaysTaken.next_pc(&fwd, NONZERO), 9);
        assert_eq!(AlwaysNotTaken.next_pc(&back, NONZERO), 5);
        assert_eq!(AlwaysNotTaken.next_pc(&jmp, NONZERO), 9);
        assert_eq!(BackwardTakenForwardNotTaken.next_pc(&back, NONZERO), 1);
        assert_eq!(BackwardTakenForwardNotTaken.next_pc(&fwd, NONZERO), 5);
        // a branch to itself is not backward
        let spin = StaticInstruction::jump(Op::Jnz, 4, 4);
        assert_eq!(BackwardTakenForwardNotTaken.next_pc(&spin, NONZERO), 5);
        assert_eq!(NonSpeculative.next_pc(&fwd, ZERO), 9);
        assert!(!NonSpeculative.is_speculative());
    }

    #[test]
    fn validation_reports_the_correct_target() {
        let jnz = StaticInstruction::jump(Op::Jnz, 0, 2);
        let mut predictor = AlwaysTaken;

        assert_eq!(predictor.validate_choice(&committed(jnz.clone(), 0), NONZERO), None);
        assert_eq!(predictor.validate_choice(&committed(jnz, 0), ZERO), Some(3));
    }

    #[test]
    fn counter_saturates() {
        let mut counter = SaturatingCounter::new(3);
        assert_eq!(counter.value(), 1);
        assert_eq!(counter.predict(), Some(false));

        for _ in 0..5 {
            counter.update_taken();
        }
        assert_eq!(counter.value(), 3);
        assert_eq!(counter.predict(), Some(true));

        for _ in 0..5 {
            counter.update_not_taken();
        }
        assert_eq!(counter.value(), 0);
        assert_eq!(SaturatingCounter::new(2).predict(), None);
    }

    #[test]
    fn dynamic_learns_a_loop() {
        let jnz = StaticInstruction::jump(Op::Jnz, 0, 3);
        let mut predictor = Dynamic::new(3, 4);

        assert_eq!(predictor.next_pc(&jnz, NONZERO), 4);
        assert_eq!(predictor.validate_choice(&committed(jnz.clone(), 4), NONZERO), Some(0));
        // counter is now 2 of 3
        assert_eq!(predictor.next_pc(&jnz, NONZERO), 0);
        assert_eq!(predictor.validate_choice(&committed(jnz.clone(), 0), NONZERO), None);
        assert_eq!(predictor.slots()[3].counter.value(), 3);
    }

    #[test]
    fn dynamic_ties_follow_last_outcome() {
        let jz = StaticInstruction::jump(Op::Jz, 0, 1);
        let mut predictor = Dynamic::new(2, 2);

        // midpoint with no history predicts not taken
        assert_eq!(predictor.next_pc(&jz, ZERO), 2);
        predictor.validate_choice(&committed(jz.clone(), 2), ZERO);
        predictor.validate_choice(&committed(jz.clone(), 2), NONZERO);

        // back on the midpoint, last outcome was not taken
        assert_eq!(predictor.slots()[1].counter.value(), 1);
        assert_eq!(predictor.next_pc(&jz, ZERO), 2);
    }

    #[test]
    fn dynamic_resets_aliased_slot() {
        let a = StaticInstruction::jump(Op::Jnz, 0, 1);
        let b = StaticInstruction::jump(Op::Jnz, 0, 3);
        let mut predictor = Dynamic::new(3, 2);

        predictor.validate_choice(&committed(a.clone(), 0), NONZERO);
        predictor.validate_choice(&committed(a.clone(), 0), NONZERO);
        assert_eq!(predictor.slots()[1].counter.value(), 3);

        // row 3 maps onto the same slot and starts over
        assert_eq!(predictor.next_pc(&b, NONZERO), 4);
        assert_eq!(predictor.slots()[1].owner, Some(3));
        assert_eq!(predictor.slots()[1].counter.value(), 1);
    }
}
