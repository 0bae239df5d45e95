use crate::branch_prediction::BranchPredictor;
use crate::common_data_bus::{Destination, ProducerTag};
use crate::execution_units::{DynamicInstruction, FunctionalUnit};
use crate::instructions::{Op, Operand, StaticInstruction, Value};
use crate::registers::{Flags, RegisterFile};
use crate::reorder_buffer::{ReorderBuffer, RobEntry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stall {
    RobFull,
    NoFreeUnit,
    /// Non speculative branch waiting for in-flight work to finish.
    Draining,
    /// Register-direct memory access behind an older conflicting one.
    MemoryOrder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueOutcome {
    Issued { uid: u64, next_pc: usize },
    Stalled(Stall),
    /// Program counter is past the end of the program.
    Exhausted,
}

/// Issue stage. Hands out uids, which increase in program order.
#[derive(Debug, Default)]
pub struct Dispatcher {
    next_uid: u64,
}
impl Dispatcher {
    pub fn new() -> Self {
        Self { next_uid: 0 }
    }

    /// Without a reorder buffer nothing else orders memory accesses, so a
    /// load waits out every resident store and a store waits out every
    /// resident load or store.
    fn memory_conflict(instr: &StaticInstruction, units: &[FunctionalUnit]) -> bool {
        units
            .iter()
            .filter_map(|unit| unit.instruction())
            .any(|inst| inst.op == Op::Str || (instr.op == Op::Str && inst.op.is_memory()))
    }

    fn take_uid(&mut self) -> u64 {
        let uid = self.next_uid;
        self.next_uid += 1;
        uid
    }

    #[allow(clippy::too_many_arguments)]
    pub fn dispatch(
        &mut self,
        clock: u64,
        pc: usize,
        program: &[StaticInstruction],
        registers: &mut RegisterFile,
        mut rob: Option<&mut ReorderBuffer>,
        units: &mut [FunctionalUnit],
        predictor: &mut dyn BranchPredictor,
        flags: Flags,
    ) -> IssueOutcome {
        let Some(instr) = program.get(pc) else {
            return IssueOutcome::Exhausted;
        };

        if rob.as_ref().is_some_and(|rob| rob.is_full()) {
            return IssueOutcome::Stalled(Stall::RobFull);
        }

        if rob.is_none() && instr.op.is_memory() && Self::memory_conflict(instr, units) {
            return IssueOutcome::Stalled(Stall::MemoryOrder);
        }

        if instr.op.is_branch() {
            let drained = units.iter().all(|unit| !unit.is_busy())
                && rob.as_ref().map_or(true, |rob| rob.is_empty());
            if !predictor.is_speculative() && !drained {
                return IssueOutcome::Stalled(Stall::Draining);
            }

            let next_pc = predictor.next_pc(instr, flags);
            let uid = self.take_uid();
            if let Some(rob) = rob {
                rob.push(RobEntry {
                    instruction: instr.clone(),
                    destination: Destination::ProgramCounter,
                    value: next_pc as Value,
                    ready_at: Some(clock),
                    uid,
                });
            }

            log::debug!("{}: issue uid {} {} -> {}", clock, uid, instr, next_pc);
            return IssueOutcome::Issued { uid, next_pc };
        }

        let resolve = |operand: &Operand| match rob.as_deref() {
            Some(rob) => rob.patcher(registers, operand),
            None => registers.resolve(operand),
        };
        let operands = [resolve(&instr.src0), resolve(&instr.src1)];
        let tag = rob
            .as_ref()
            .map_or(ProducerTag::None, |rob| ProducerTag::RobSlot(rob.next_tag()));

        let mut pending = Some(DynamicInstruction {
            op: instr.op,
            row: instr.row,
            dst: instr.dst,
            uid: self.next_uid,
            operands,
            tag,
        });

        // first idle unit of the right kind wins
        let mut accepted_by = None;
        for unit in units.iter_mut() {
            let Some(inst) = pending.take() else { break };
            match unit.try_issue(clock, inst) {
                Ok(()) => accepted_by = Some(unit.name.clone()),
                Err(inst) => pending = Some(inst),
            }
        }

        let Some(unit_name) = accepted_by else {
            return IssueOutcome::Stalled(Stall::NoFreeUnit);
        };
        let uid = self.take_uid();

        match rob.as_deref_mut() {
            Some(rob) => {
                rob.push(RobEntry {
                    instruction: instr.clone(),
                    destination: instr.dst.map_or(Destination::Unresolved, Destination::Register),
                    value: 0,
                    ready_at: None,
                    uid,
                });
            }
            None => {
                if let Some(dst) = instr.dst {
                    registers.declare_producer(dst, ProducerTag::Unit(unit_name));
                }
            }
        }

        log::debug!("{}: issue uid {} {}", clock, uid, instr);
        IssueOutcome::Issued {
            uid,
            next_pc: pc + 1,
        }
    }
}
