use std::collections::BTreeMap;

use crate::common_data_bus::{CommonDataBus, Destination, ProducerTag};
use crate::instructions::{Operand, Register, Value};

/// Condition codes written by arithmetic results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Flags {
    pub zero: bool,
    pub negative: bool,
}
impl Flags {
    pub fn from_result(value: Value) -> Self {
        Self {
            zero: value == 0,
            negative: value < 0,
        }
    }
}

/// An operand after rename resolution: either a value or the tag of the
/// instruction that will produce it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    Value(Value),
    Pending(ProducerTag),
}
impl Resolved {
    pub fn is_ready(&self) -> bool {
        matches!(self, Resolved::Value(_))
    }

    pub fn value(&self) -> Option<Value> {
        match self {
            Resolved::Value(val) => Some(*val),
            Resolved::Pending(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterEntry {
    pub value: Value,
    pub producer: ProducerTag,
}

/// Architectural registers plus the register-direct rename table.
#[derive(Debug, Clone)]
pub struct RegisterFile {
    registers: BTreeMap<Register, RegisterEntry>,
}
impl RegisterFile {
    pub fn new(ints: u32, floats: u32) -> Self {
        let mut registers = BTreeMap::new();
        let blank = RegisterEntry {
            value: 0,
            producer: ProducerTag::None,
        };

        for i in 0..ints {
            registers.insert(Register::Int(i), blank.clone());
        }
        for i in 0..floats {
            registers.insert(Register::Float(i), blank.clone());
        }

        RegisterFile { registers }
    }

    pub fn contains(&self, reg: Register) -> bool {
        self.registers.contains_key(&reg)
    }

    /// Architectural value; unknown registers read as zero.
    pub fn get(&self, reg: Register) -> Value {
        self.registers.get(&reg).map_or(0, |entry| entry.value)
    }

    pub fn producer(&self, reg: Register) -> Option<&ProducerTag> {
        self.registers.get(&reg).map(|entry| &entry.producer)
    }

    pub fn set(&mut self, reg: Register, value: Value) {
        if let Some(entry) = self.registers.get_mut(&reg) {
            entry.value = value;
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Register, &RegisterEntry)> {
        self.registers.iter()
    }

    /// Never blocks: literals and idle registers give a value, registers with
    /// an outstanding producer give its tag.
    pub fn resolve(&self, operand: &Operand) -> Resolved {
        match operand {
            Operand::Literal(val) => Resolved::Value(*val),
            Operand::Reg(reg) => match self.registers.get(reg) {
                Some(entry) if entry.producer.is_pending() => {
                    Resolved::Pending(entry.producer.clone())
                }
                Some(entry) => Resolved::Value(entry.value),
                None => Resolved::Value(0),
            },
        }
    }

    /// Last issued producer wins.
    pub fn declare_producer(&mut self, reg: Register, tag: ProducerTag) {
        if let Some(entry) = self.registers.get_mut(&reg) {
            entry.producer = tag;
        }
    }

    pub fn read_cdb(&mut self, cdb: &CommonDataBus) {
        for msg in cdb.messages() {
            if let Destination::Register(reg) = msg.destination {
                if let Some(entry) = self.registers.get_mut(&reg) {
                    // only if we're still waiting on that producer
                    if entry.producer.is_pending() && entry.producer == msg.tag {
                        entry.value = msg.value;
                        entry.producer = ProducerTag::None;
                    }
                }
            }
        }
    }

    pub fn clear_producers(&mut self) {
        self.registers
            .values_mut()
            .for_each(|entry| entry.producer = ProducerTag::None);
    }
}
