use std::fmt;
use std::str::FromStr;

use crate::execution_units::FuKind;

/// Every register, bus message and memory word carries one of these.
pub type Value = i64;

#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, PartialOrd, Ord)]
pub enum Register {
    Int(u32),
    Float(u32),
}
impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Register::Int(i) => write!(f, "R{}", i),
            Register::Float(i) => write!(f, "F{}", i),
        }
    }
}
impl FromStr for Register {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        let bank = chars.next().ok_or(())?;
        let index: u32 = chars.as_str().parse().map_err(|_| ())?;

        match bank {
            'R' | 'r' => Ok(Register::Int(index)),
            'F' | 'f' => Ok(Register::Float(index)),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    Literal(Value),
    Reg(Register),
}
impl Operand {
    pub fn register(&self) -> Option<Register> {
        match self {
            Self::Reg(reg) => Some(*reg),
            Self::Literal(_) => None,
        }
    }

    pub fn literal(&self) -> Option<Value> {
        match self {
            Self::Literal(val) => Some(*val),
            Self::Reg(_) => None,
        }
    }
}
impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Operand::Literal(val) => write!(f, "{}", val),
            Operand::Reg(reg) => write!(f, "{}", reg),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Op {
    Add,
    Sub,
    Mul,
    Div,
    Ldr,
    Str,
    Jmp,
    Jz,
    Jnz,
}
impl Op {
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Op::Add => "ADD",
            Op::Sub => "SUB",
            Op::Mul => "MUL",
            Op::Div => "DIV",
            Op::Ldr => "LDR",
            Op::Str => "STR",
            Op::Jmp => "JMP",
            Op::Jz => "JZ",
            Op::Jnz => "JNZ",
        }
    }

    pub fn from_mnemonic(mnemonic: &str) -> Option<Op> {
        let op = match mnemonic.to_ascii_uppercase().as_str() {
            "ADD" => Op::Add,
            "SUB" => Op::Sub,
            "MUL" => Op::Mul,
            "DIV" => Op::Div,
            "LDR" => Op::Ldr,
            "STR" => Op::Str,
            "JMP" => Op::Jmp,
            "JZ" => Op::Jz,
            "JNZ" => Op::Jnz,
            _ => return None,
        };
        Some(op)
    }

    /// Number of comma separated operands the assembler expects.
    pub fn operand_count(&self) -> usize {
        match self {
            Op::Add | Op::Sub | Op::Mul | Op::Div | Op::Ldr => 3,
            Op::Str => 2,
            Op::Jmp | Op::Jz | Op::Jnz => 1,
        }
    }

    pub fn is_arithmetic(&self) -> bool {
        matches!(self, Op::Add | Op::Sub | Op::Mul | Op::Div)
    }

    pub fn is_branch(&self) -> bool {
        matches!(self, Op::Jmp | Op::Jz | Op::Jnz)
    }

    pub fn is_memory(&self) -> bool {
        matches!(self, Op::Ldr | Op::Str)
    }

    /// The unit kind able to execute this op, `None` for control flow.
    pub fn needs_fu_kind(&self) -> Option<FuKind> {
        match self {
            Op::Add | Op::Sub => Some(FuKind::Adder),
            Op::Mul => Some(FuKind::Multiplier),
            Op::Div => Some(FuKind::Divider),
            Op::Ldr | Op::Str => Some(FuKind::Memory),
            Op::Jmp | Op::Jz | Op::Jnz => None,
        }
    }
}
impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

/// One parsed program row.
///
/// Operand layout per op:
/// * arithmetic: `src0 op src1 -> dst`
/// * `LDR`: `mem[src0 + src1] -> dst`
/// * `STR`: `src1 -> mem[src0]`, no register destination
/// * jumps: `src0` is the literal target row, `src1` is zero
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticInstruction {
    pub op: Op,
    pub src0: Operand,
    pub src1: Operand,
    pub dst: Option<Register>,
    pub row: usize,
}
impl StaticInstruction {
    pub fn arithmetic(op: Op, src0: Operand, src1: Operand, dst: Register, row: usize) -> Self {
        Self {
            op,
            src0,
            src1,
            dst: Some(dst),
            row,
        }
    }

    pub fn load(base: Operand, offset: Operand, dst: Register, row: usize) -> Self {
        Self {
            op: Op::Ldr,
            src0: base,
            src1: offset,
            dst: Some(dst),
            row,
        }
    }

    pub fn store(address: Operand, value: Operand, row: usize) -> Self {
        Self {
            op: Op::Str,
            src0: address,
            src1: value,
            dst: None,
            row,
        }
    }

    pub fn jump(op: Op, target: Value, row: usize) -> Self {
        Self {
            op,
            src0: Operand::Literal(target),
            src1: Operand::Literal(0),
            dst: None,
            row,
        }
    }

    /// Literal jump target. Negative targets clamp to row 0.
    pub fn target(&self) -> usize {
        self.src0.literal().map_or(0, |t| t.max(0) as usize)
    }

    /// Every register this instruction reads or writes.
    pub fn registers(&self) -> impl Iterator<Item = Register> + '_ {
        self.src0
            .register()
            .into_iter()
            .chain(self.src1.register())
            .chain(self.dst)
    }
}
impl fmt::Display for StaticInstruction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.op {
            Op::Str => write!(f, "{} {},{}", self.op, self.src0, self.src1),
            Op::Jmp | Op::Jz | Op::Jnz => write!(f, "{} {}", self.op, self.src0),
            _ => match self.dst {
                Some(dst) => write!(f, "{} {},{},{}", self.op, self.src0, self.src1, dst),
                None => write!(f, "{} {},{}", self.op, self.src0, self.src1),
            },
        }
    }
}

pub type Program = Vec<StaticInstruction>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_names_round_trip_through_display() {
        assert_eq!("R3".parse::<Register>(), Ok(Register::Int(3)));
        assert_eq!("f12".parse::<Register>(), Ok(Register::Float(12)));
        assert_eq!(Register::Float(2).to_string(), "F2");
        assert!("X1".parse::<Register>().is_err());
        assert!("R".parse::<Register>().is_err());
    }

    #[test]
    fn ops_map_to_unit_kinds() {
        assert_eq!(Op::Sub.needs_fu_kind(), Some(FuKind::Adder));
        assert_eq!(Op::Div.needs_fu_kind(), Some(FuKind::Divider));
        assert_eq!(Op::Str.needs_fu_kind(), Some(FuKind::Memory));
        assert_eq!(Op::Jnz.needs_fu_kind(), None);
        assert_eq!(Op::from_mnemonic("jnz"), Some(Op::Jnz));
        assert_eq!(Op::from_mnemonic("NOP"), None);
    }

    #[test]
    fn display_matches_source_form() {
        let add = StaticInstruction::arithmetic(
            Op::Add,
            Operand::Literal(3),
            Operand::Reg(Register::Int(0)),
            Register::Int(1),
            0,
        );
        assert_eq!(add.to_string(), "ADD 3,R0,R1");
        assert_eq!(StaticInstruction::jump(Op::Jz, 4, 2).to_string(), "JZ 4");
        assert_eq!(
            add.registers().collect::<Vec<_>>(),
            vec![Register::Int(0), Register::Int(1)]
        );
    }
}
