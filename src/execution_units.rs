use std::fmt;

use serde::Deserialize;

use crate::common_data_bus::{CdbMessage, CommonDataBus, Destination, ProducerTag};
use crate::instructions::{Op, Register, Value};
use crate::memory::MemoryManager;
use crate::registers::Resolved;
use crate::reorder_buffer::ReorderBuffer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FuKind {
    Adder,
    Multiplier,
    Divider,
    Memory,
}
impl FuKind {
    /// Prefix for unit names, `ADDR0`, `MULT1`, ...
    pub fn name_prefix(&self) -> &'static str {
        match self {
            FuKind::Adder => "ADDR",
            FuKind::Multiplier => "MULT",
            FuKind::Divider => "DIVD",
            FuKind::Memory => "LSU",
        }
    }

    /// Result of an arithmetic op. Division by zero gives zero.
    pub fn compute(&self, op: Op, left: Value, right: Value) -> Value {
        match (self, op) {
            (FuKind::Adder, Op::Add) => left.wrapping_add(right),
            (FuKind::Adder, Op::Sub) => left.wrapping_sub(right),
            (FuKind::Multiplier, Op::Mul) => left.wrapping_mul(right),
            (FuKind::Divider, Op::Div) => left.checked_div(right).unwrap_or(0),
            _ => {
                log::warn!("{:?} asked to compute {}", self, op);
                0
            }
        }
    }
}
impl fmt::Display for FuKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            FuKind::Adder => "adder",
            FuKind::Multiplier => "multiplier",
            FuKind::Divider => "divider",
            FuKind::Memory => "memory",
        };
        f.write_str(name)
    }
}

/// An instruction in flight, owned by exactly one unit until it publishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DynamicInstruction {
    pub op: Op,
    pub row: usize,
    pub dst: Option<Register>,
    pub uid: u64,
    pub operands: [Resolved; 2],
    /// Rename tag handed out at issue; `None` when the unit's name is the tag.
    pub tag: ProducerTag,
}
impl DynamicInstruction {
    pub fn kind(&self) -> Option<FuKind> {
        self.op.needs_fu_kind()
    }

    pub fn is_ready(&self) -> bool {
        self.operands.iter().all(|op| op.is_ready())
    }

    pub fn operand(&self, index: usize) -> Value {
        self.operands[index].value().unwrap_or(0)
    }

    /// Raw effective address: `base + offset` for loads, the first operand
    /// for stores.
    pub fn address(&self) -> Value {
        match self.op {
            Op::Ldr => self.operand(0).wrapping_add(self.operand(1)),
            _ => self.operand(0),
        }
    }

    fn has_offset(&self) -> bool {
        self.op == Op::Ldr && self.operand(1) != 0
    }

    fn read_cdb(&mut self, cdb: &CommonDataBus) {
        for operand in self.operands.iter_mut() {
            if let Resolved::Pending(tag) = operand {
                if let Some(value) = cdb.value_for(tag) {
                    *operand = Resolved::Value(value);
                }
            }
        }
    }
}

/// The two one-cycle delay toggles, fixed for a whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Timing {
    pub issue_delay: bool,
    pub writeback_delay: bool,
}
impl Timing {
    fn writeback(&self) -> u64 {
        self.writeback_delay as u64
    }
}

#[derive(Debug, Clone, Default)]
enum UnitState {
    #[default]
    Idle,
    Waiting {
        inst: DynamicInstruction,
        issued_at: u64,
    },
    Executing {
        inst: DynamicInstruction,
        end: u64,
    },
    Addressing {
        inst: DynamicInstruction,
        address: usize,
        request_at: u64,
    },
    Publishing {
        inst: DynamicInstruction,
        value: Value,
        destination: Destination,
        end: u64,
    },
}

/// Coarse view of a unit's progress for presentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    WaitingOperands,
    Executing,
    AccessingMemory,
    Publishing,
}

#[derive(Debug, Clone)]
pub struct FunctionalUnit {
    pub kind: FuKind,
    pub name: String,
    duration: u64,
    timing: Timing,
    state: UnitState,
}
impl FunctionalUnit {
    pub fn new(kind: FuKind, name: String, duration: u64, timing: Timing) -> Self {
        FunctionalUnit {
            kind,
            name,
            duration,
            timing,
            state: UnitState::Idle,
        }
    }

    pub fn duration(&self) -> u64 {
        self.duration
    }

    pub fn is_busy(&self) -> bool {
        !matches!(self.state, UnitState::Idle)
    }

    pub fn flush(&mut self) {
        self.state = UnitState::Idle;
    }

    pub fn stage(&self) -> Stage {
        match self.state {
            UnitState::Idle => Stage::Idle,
            UnitState::Waiting { .. } => Stage::WaitingOperands,
            UnitState::Executing { .. } => Stage::Executing,
            UnitState::Addressing { .. } => Stage::AccessingMemory,
            UnitState::Publishing { .. } => Stage::Publishing,
        }
    }

    pub fn instruction(&self) -> Option<&DynamicInstruction> {
        match &self.state {
            UnitState::Idle => None,
            UnitState::Waiting { inst, .. }
            | UnitState::Executing { inst, .. }
            | UnitState::Addressing { inst, .. }
            | UnitState::Publishing { inst, .. } => Some(inst),
        }
    }

    fn tag_for(&self, inst: &DynamicInstruction) -> ProducerTag {
        if inst.tag.is_pending() {
            inst.tag.clone()
        } else {
            ProducerTag::Unit(self.name.clone())
        }
    }

    /// Takes ownership if idle and of the right kind, otherwise hands the
    /// instruction back.
    pub fn try_issue(
        &mut self,
        clock: u64,
        inst: DynamicInstruction,
    ) -> Result<(), DynamicInstruction> {
        if self.is_busy() || inst.kind() != Some(self.kind) {
            return Err(inst);
        }

        log::debug!("{}: {} {} issued (uid {})", clock, self.name, inst.op, inst.uid);
        self.state = UnitState::Waiting {
            inst,
            issued_at: clock,
        };
        Ok(())
    }

    /// Starts execution once both operands are in. Returns the uid of an
    /// instruction that started this cycle.
    pub fn execute(
        &mut self,
        clock: u64,
        memory: &mut MemoryManager,
        rob: Option<&ReorderBuffer>,
    ) -> Option<u64> {
        let mut started = None;

        self.state = match std::mem::take(&mut self.state) {
            UnitState::Waiting { inst, issued_at }
                if inst.is_ready() && !(self.timing.issue_delay && clock <= issued_at) =>
            {
                started = Some(inst.uid);
                log::trace!("{}: {} starts uid {}", clock, self.name, inst.uid);

                if self.kind == FuKind::Memory {
                    let address = memory.wrap(inst.address());
                    let request_at = clock + self.duration + inst.has_offset() as u64;
                    UnitState::Addressing {
                        inst,
                        address,
                        request_at,
                    }
                } else {
                    let end = clock + self.duration + self.timing.writeback();
                    UnitState::Executing { inst, end }
                }
            }
            other => other,
        };

        if matches!(self.state, UnitState::Addressing { .. }) {
            self.access(clock, memory, rob);
        }

        started
    }

    fn access(&mut self, clock: u64, memory: &mut MemoryManager, rob: Option<&ReorderBuffer>) {
        let UnitState::Addressing {
            inst,
            address,
            request_at,
        } = std::mem::take(&mut self.state)
        else {
            return;
        };

        let done = if clock < request_at {
            None
        } else if inst.op == Op::Str {
            let value = inst.operand(1);
            memory
                .write(&self.name, clock, address, value, false)
                .then_some((value, Destination::Memory(address)))
        } else {
            let destination = inst.dst.map_or(Destination::Unresolved, Destination::Register);
            memory
                .read(&self.name, clock, address, rob, inst.uid)
                .map(|value| (value, destination))
        };

        self.state = match done {
            Some((value, destination)) => UnitState::Publishing {
                inst,
                value,
                destination,
                end: clock + self.timing.writeback(),
            },
            None => UnitState::Addressing {
                inst,
                address,
                request_at,
            },
        };
    }

    /// Publishes on the bus when the end cycle arrives and frees the unit.
    pub fn write_result(&mut self, clock: u64, cdb: &mut CommonDataBus) -> Option<u64> {
        let (inst, value, destination) = match std::mem::take(&mut self.state) {
            UnitState::Executing { inst, end } if end <= clock => {
                let value = self.kind.compute(inst.op, inst.operand(0), inst.operand(1));
                let destination = inst.dst.map_or(Destination::Unresolved, Destination::Register);
                (inst, value, destination)
            }
            UnitState::Publishing {
                inst,
                value,
                destination,
                end,
            } if end <= clock => (inst, value, destination),
            other => {
                self.state = other;
                return None;
            }
        };

        log::debug!("{}: {} writes {} (uid {})", clock, self.name, value, inst.uid);
        cdb.publish(CdbMessage {
            tag: self.tag_for(&inst),
            value,
            destination,
            uid: inst.uid,
            op: inst.op,
        });

        Some(inst.uid)
    }

    /// Picks up operands this unit is still waiting on.
    pub fn read_cdb(&mut self, cdb: &CommonDataBus) {
        if let UnitState::Waiting { inst, .. } = &mut self.state {
            inst.read_cdb(cdb);
        }
    }
}
