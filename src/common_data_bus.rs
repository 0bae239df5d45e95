use std::fmt;

use crate::instructions::{Op, Register, Value};

/// Who will eventually supply a value.
///
/// Exactly one naming scheme is live per run: unit names when the register
/// file renames, reorder buffer slots when the reorder buffer does.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum ProducerTag {
    #[default]
    None,
    Unit(String),
    RobSlot(usize),
}
impl ProducerTag {
    pub fn is_pending(&self) -> bool {
        !matches!(self, ProducerTag::None)
    }
}
impl fmt::Display for ProducerTag {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ProducerTag::None => f.write_str("-"),
            ProducerTag::Unit(name) => f.write_str(name),
            ProducerTag::RobSlot(index) => write!(f, "#{}", index),
        }
    }
}

/// Where a published result is headed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    Register(Register),
    Memory(usize),
    ProgramCounter,
    /// A store whose address is not known yet.
    Unresolved,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CdbMessage {
    pub tag: ProducerTag,
    pub value: Value,
    pub destination: Destination,
    pub uid: u64,
    pub op: Op,
}

/// The per cycle broadcast list. Every publisher writes before any
/// listener reads; the driver clears it at the top of each cycle.
#[derive(Debug, Clone, Default)]
pub struct CommonDataBus {
    messages: Vec<CdbMessage>,
}
impl CommonDataBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn publish(&mut self, message: CdbMessage) {
        log::trace!(
            "cdb: {} publishes {} for {:?} (uid {})",
            message.tag,
            message.value,
            message.destination,
            message.uid
        );
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[CdbMessage] {
        &self.messages
    }

    /// First value broadcast under `tag` this cycle.
    pub fn value_for(&self, tag: &ProducerTag) -> Option<Value> {
        if !tag.is_pending() {
            return None;
        }

        self.messages
            .iter()
            .find(|msg| &msg.tag == tag)
            .map(|msg| msg.value)
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(tag: ProducerTag, value: Value) -> CdbMessage {
        CdbMessage {
            tag,
            value,
            destination: Destination::Register(Register::Int(0)),
            uid: 0,
            op: Op::Add,
        }
    }

    #[test]
    fn lookup_by_tag() {
        let mut cdb = CommonDataBus::new();
        cdb.publish(message(ProducerTag::Unit("ADDR0".into()), 8));
        cdb.publish(message(ProducerTag::RobSlot(3), -1));

        assert_eq!(cdb.value_for(&ProducerTag::Unit("ADDR0".into())), Some(8));
        assert_eq!(cdb.value_for(&ProducerTag::RobSlot(3)), Some(-1));
        assert_eq!(cdb.value_for(&ProducerTag::RobSlot(4)), None);
        assert_eq!(cdb.value_for(&ProducerTag::None), None);

        cdb.clear();
        assert!(cdb.is_empty());
    }

    #[test]
    fn tags_display_compactly() {
        assert_eq!(ProducerTag::RobSlot(2).to_string(), "#2");
        assert_eq!(ProducerTag::Unit("MULT1".into()).to_string(), "MULT1");
        assert!(!ProducerTag::None.is_pending());
    }
}
