use crate::branch_prediction::BranchPredictor;
use crate::common_data_bus::Destination;
use crate::memory::{MemoryManager, COMMIT_PORT};
use crate::registers::{Flags, RegisterFile};
use crate::reorder_buffer::ReorderBuffer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Head missing or not ready yet.
    Idle,
    /// Head is a store waiting on the memory port.
    Writing,
    Retired(u64),
    /// The branch retired but its prediction was wrong.
    Mispredicted { uid: u64, target: usize },
}

/// In-order retirement: only the reorder buffer head is ever looked at.
#[derive(Debug, Default)]
pub struct Commiter;
impl Commiter {
    pub fn new() -> Self {
        Self
    }

    pub fn commit_head(
        &self,
        clock: u64,
        rob: &mut ReorderBuffer,
        registers: &mut RegisterFile,
        flags: &mut Flags,
        predictor: &mut dyn BranchPredictor,
        memory: &mut MemoryManager,
    ) -> CommitOutcome {
        let Some(head) = rob.head() else {
            return CommitOutcome::Idle;
        };
        if !head.is_ready() {
            return CommitOutcome::Idle;
        }

        let uid = head.uid;
        let op = head.instruction.op;

        if op.is_branch() {
            let correction = predictor.validate_choice(head, *flags);
            rob.pop();
            log::debug!("{}: commit uid {} {}", clock, uid, op);

            return match correction {
                Some(target) => CommitOutcome::Mispredicted { uid, target },
                None => CommitOutcome::Retired(uid),
            };
        }

        match head.destination {
            Destination::Memory(addr) => {
                if !memory.write(COMMIT_PORT, clock, addr, head.value, true) {
                    return CommitOutcome::Writing;
                }
            }
            Destination::Register(reg) => {
                if op.is_arithmetic() {
                    *flags = Flags::from_result(head.value);
                }
                registers.set(reg, head.value);
            }
            Destination::ProgramCounter | Destination::Unresolved => {
                log::warn!("{}: uid {} retires without a destination", clock, uid);
            }
        }

        rob.pop();
        log::debug!("{}: commit uid {} {}", clock, uid, op);
        CommitOutcome::Retired(uid)
    }
}
