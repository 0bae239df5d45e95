use std::fs;
use std::path::Path;

use regex::Regex;

use crate::error::{ParseError, SimError};
use crate::instructions::{Op, Operand, Program, Register, StaticInstruction};

pub fn assemble_file(path: &Path) -> Result<Program, SimError> {
    let source = fs::read_to_string(path)?;
    Ok(assemble(&source)?)
}

/// Drops `;` comments, keeping line numbering intact.
fn preprocessor(source: &str) -> impl Iterator<Item = (usize, &str)> {
    source
        .lines()
        .enumerate()
        .map(|(i, l)| (i + 1, l.split(';').next().unwrap_or("").trim()))
        .filter(|(_, l)| !l.is_empty())
}

/// One instruction per line: `MNEMONIC op, op, op`. Operands may be
/// separated by commas, whitespace or both. Rows count instructions only.
pub fn assemble(source: &str) -> Result<Program, ParseError> {
    let line_re = Regex::new(r"^([A-Za-z]+)\s*(.*)$")?;
    let separator_re = Regex::new(r"[,\s]+")?;

    let mut program = Vec::new();

    for (line, text) in preprocessor(source) {
        let Some(captures) = line_re.captures(text) else {
            return Err(ParseError::UnknownMnemonic {
                line,
                mnemonic: text.to_string(),
            });
        };

        let mnemonic = &captures[1];
        let op = Op::from_mnemonic(mnemonic).ok_or_else(|| ParseError::UnknownMnemonic {
            line,
            mnemonic: mnemonic.to_string(),
        })?;

        let operands: Vec<&str> = separator_re
            .split(&captures[2])
            .filter(|s| !s.is_empty())
            .collect();
        if operands.len() != op.operand_count() {
            return Err(ParseError::OperandCount {
                line,
                mnemonic: op.mnemonic().to_string(),
                expected: op.operand_count(),
                found: operands.len(),
            });
        }

        let row = program.len();
        program.push(create_instruction(op, &operands, line, row)?);
    }

    Ok(program)
}

fn create_instruction(
    op: Op,
    operands: &[&str],
    line: usize,
    row: usize,
) -> Result<StaticInstruction, ParseError> {
    let instr = match op {
        Op::Add | Op::Sub | Op::Mul | Op::Div => StaticInstruction::arithmetic(
            op,
            operand(operands[0], line)?,
            operand(operands[1], line)?,
            destination(operands[2], line)?,
            row,
        ),
        Op::Ldr => StaticInstruction::load(
            operand(operands[0], line)?,
            operand(operands[1], line)?,
            destination(operands[2], line)?,
            row,
        ),
        Op::Str => StaticInstruction::store(
            operand(operands[0], line)?,
            operand(operands[1], line)?,
            row,
        ),
        Op::Jmp | Op::Jz | Op::Jnz => {
            let target = operands[0]
                .parse()
                .map_err(|_| ParseError::BadTarget {
                    line,
                    target: operands[0].to_string(),
                })?;
            StaticInstruction::jump(op, target, row)
        }
    };

    Ok(instr)
}

fn operand(text: &str, line: usize) -> Result<Operand, ParseError> {
    if let Ok(value) = text.parse() {
        return Ok(Operand::Literal(value));
    }

    text.parse::<Register>()
        .map(Operand::Reg)
        .map_err(|_| ParseError::BadOperand {
            line,
            operand: text.to_string(),
        })
}

fn destination(text: &str, line: usize) -> Result<Register, ParseError> {
    text.parse().map_err(|_| ParseError::BadDestination {
        line,
        operand: text.to_string(),
    })
}
