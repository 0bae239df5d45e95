use crate::circular_buffer::CircularBuffer;
use crate::common_data_bus::{CommonDataBus, Destination, ProducerTag};
use crate::instructions::{Op, Operand, StaticInstruction, Value};
use crate::registers::{RegisterFile, Resolved};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RobEntry {
    /// Own copy of the program row, never shared with the program.
    pub instruction: StaticInstruction,
    pub destination: Destination,
    pub value: Value,
    /// Cycle the value arrived, `None` until its producer broadcasts.
    pub ready_at: Option<u64>,
    pub uid: u64,
}
impl RobEntry {
    pub fn is_ready(&self) -> bool {
        self.ready_at.is_some()
    }
}

/// Result of looking for an older store to the same address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Forward {
    Value(Value),
    /// An older store has not computed its address yet.
    Blocked,
    Miss,
}

#[derive(Debug, Clone)]
pub struct ReorderBuffer {
    buffer: CircularBuffer<RobEntry>,
}
impl ReorderBuffer {
    pub fn new(size: usize) -> Self {
        Self {
            buffer: CircularBuffer::new(size),
        }
    }

    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_full(&self) -> bool {
        self.buffer.is_full()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Slot the next pushed entry will get, used as its rename tag.
    pub fn next_tag(&self) -> usize {
        self.buffer.next_tag()
    }

    pub fn push(&mut self, entry: RobEntry) -> Option<usize> {
        self.buffer.push(entry)
    }

    pub fn head(&self) -> Option<&RobEntry> {
        self.buffer.front()
    }

    pub fn pop(&mut self) -> Option<RobEntry> {
        self.buffer.pop()
    }

    pub fn get(&self, slot: usize) -> Option<&RobEntry> {
        self.buffer.get(slot)
    }

    /// Oldest first, with slot indexes.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &RobEntry)> + '_ {
        self.buffer.iter()
    }

    /// Drops every entry and returns their uids.
    pub fn flush(&mut self) -> Vec<u64> {
        let uids = self.buffer.iter().map(|(_, entry)| entry.uid).collect();
        self.buffer.clear();
        uids
    }

    /// Rename resolution when the reorder buffer owns renaming: the newest
    /// in-flight writer of a register wins, otherwise the committed value.
    pub fn patcher(&self, registers: &RegisterFile, operand: &Operand) -> Resolved {
        let reg = match operand {
            Operand::Literal(val) => return Resolved::Value(*val),
            Operand::Reg(reg) => *reg,
        };

        for (slot, entry) in self.buffer.iter_rev() {
            if entry.destination == Destination::Register(reg) {
                if entry.is_ready() {
                    return Resolved::Value(entry.value);
                } else {
                    return Resolved::Pending(ProducerTag::RobSlot(slot));
                }
            }
        }

        Resolved::Value(registers.get(reg))
    }

    pub fn read_cdb(&mut self, clock: u64, cdb: &CommonDataBus) {
        for msg in cdb.messages() {
            if let ProducerTag::RobSlot(slot) = msg.tag {
                if let Some(entry) = self.buffer.get_mut(slot) {
                    if entry.uid == msg.uid {
                        entry.value = msg.value;
                        entry.destination = msg.destination;
                        entry.ready_at = Some(clock);
                    }
                }
            }
        }
    }

    /// Store to load forwarding. Only stores older than the load `uid`
    /// count; the youngest such store to `addr` supplies the value.
    pub fn forward(&self, addr: usize, uid: u64) -> Forward {
        let older_stores = self
            .buffer
            .iter_rev()
            .map(|(_, entry)| entry)
            .filter(|entry| entry.uid < uid && entry.instruction.op == Op::Str);

        for entry in older_stores {
            match entry.destination {
                Destination::Memory(a) if a == addr => return Forward::Value(entry.value),
                Destination::Unresolved => return Forward::Blocked,
                _ => (),
            }
        }

        Forward::Miss
    }
}
