// Copyright (C) 2024 Ethan Uppal. All rights reserved.

use std::{collections::HashMap, fmt};

use log::debug;
use machine::{
    arch::{Word, BYTE_BITS, MODE_BITS, OPCODE_BITS, REGISTER_BITS},
    memory::Memory,
    op::{AddressingMode, Opcode},
};

use crate::{
    error::{AssemblyError, AssemblyResult},
    grammar::{parse_program, Argument, Operand, Shape, Statement},
};

/// An argument with every label replaced by its address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolved {
    Accumulator,
    Immediate(u64),
    Direct(u64),
}

impl Resolved {
    /// The value of the operand field, if the mode has one.
    pub fn payload(&self) -> Option<u64> {
        match self {
            Self::Accumulator => None,
            Self::Immediate(value) | Self::Direct(value) => Some(*value),
        }
    }
}

impl Operand for Resolved {
    fn mode(&self) -> AddressingMode {
        match self {
            Self::Accumulator => AddressingMode::Accumulator,
            Self::Immediate(_) => AddressingMode::Immediate,
            Self::Direct(_) => AddressingMode::Direct,
        }
    }
}

impl fmt::Display for Resolved {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Accumulator => Argument::Accumulator.fmt(f),
            Self::Immediate(value) => Argument::Immediate(*value).fmt(f),
            Self::Direct(address) => Argument::Direct(*address).fmt(f),
        }
    }
}

/// A statement placed at its byte address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub labels: Vec<String>,
    pub shape: Shape<Resolved>,
    pub address: usize,
}

impl Instruction {
    pub fn size(&self) -> usize {
        self.shape.size()
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04X}  ", self.address)?;
        for label in &self.labels {
            write!(f, "@{label}: ")?;
        }
        self.shape.fmt(f)
    }
}

#[derive(Debug, Default)]
struct LabelTable {
    addresses: HashMap<String, usize>,
}

impl LabelTable {
    fn define(&mut self, label: String, address: usize) -> AssemblyResult<()> {
        if self.addresses.contains_key(&label) {
            return Err(AssemblyError::DuplicateLabel { label });
        }
        self.addresses.insert(label, address);
        Ok(())
    }

    fn lookup(&self, label: String) -> AssemblyResult<usize> {
        self.addresses
            .get(&label)
            .copied()
            .ok_or(AssemblyError::UndefinedLabel { label })
    }
}

fn place(
    statements: Vec<Statement>,
) -> AssemblyResult<(Vec<(usize, Statement)>, LabelTable)> {
    let mut labels = LabelTable::default();
    let mut address = 0;
    let mut placed = Vec::with_capacity(statements.len());
    for statement in statements {
        for label in &statement.labels {
            labels.define(label.clone(), address)?;
        }
        let size = statement.shape.size();
        placed.push((address, statement));
        address += size;
    }
    Ok((placed, labels))
}

fn resolve_with_labels(
    statements: Vec<Statement>,
) -> AssemblyResult<(Vec<Instruction>, LabelTable)> {
    let (placed, labels) = place(statements)?;
    debug!("placed {} labels", labels.addresses.len());
    let instructions = placed
        .into_iter()
        .map(|(address, Statement { labels: names, shape })| -> AssemblyResult<_> {
            let shape = shape.try_map_argument(|argument| -> AssemblyResult<_> {
                Ok(match argument {
                    Argument::Accumulator => Resolved::Accumulator,
                    Argument::Immediate(value) => Resolved::Immediate(value),
                    Argument::Direct(address) => Resolved::Direct(address),
                    Argument::Label(label) => {
                        Resolved::Direct(labels.lookup(label)? as u64)
                    }
                })
            })?;
            Ok(Instruction {
                labels: names,
                shape,
                address,
            })
        })
        .collect::<AssemblyResult<Vec<_>>>()?;
    Ok((instructions, labels))
}

/// Assigns every statement its byte address, then replaces label
/// references with those addresses.
pub fn resolve(statements: Vec<Statement>) -> AssemblyResult<Vec<Instruction>> {
    resolve_with_labels(statements).map(|(instructions, _)| instructions)
}

/// Number of bytes `instructions` occupy.
pub fn program_size(instructions: &[Instruction]) -> usize {
    instructions
        .last()
        .map_or(0, |last| last.address + last.size())
}

/// Writes `instructions` into `memory` at their addresses.
pub fn encode_into(
    instructions: &[Instruction],
    memory: &mut Memory,
) -> AssemblyResult<()> {
    for instruction in instructions {
        encode_one(instruction, memory)?;
    }
    debug!(
        "encoded {} bytes into {} bytes of memory",
        program_size(instructions),
        memory.len_bytes()
    );
    Ok(())
}

fn encode_one(instruction: &Instruction, memory: &mut Memory) -> AssemblyResult<()> {
    let address = instruction.address;
    if let Shape::Data { value } = instruction.shape {
        let byte = u8::try_from(value)
            .map_err(|_| AssemblyError::DataTooWide { value, address })?;
        memory.write_byte(address, byte)?;
        return Ok(());
    }
    let Some((opcode, register, argument)) = instruction.shape.framing() else {
        return Ok(());
    };

    let mode = argument.map_or(AddressingMode::Accumulator, Operand::mode);
    if opcode == Opcode::Store && mode == AddressingMode::Immediate {
        return Err(AssemblyError::ImmediateStore { address });
    }

    let start = address * BYTE_BITS;
    memory.set_bits_from_number(start, OPCODE_BITS, opcode.tag())?;
    memory.set_bits_from_number(start + OPCODE_BITS, REGISTER_BITS, register.tag())?;
    memory.set_bits_from_number(
        start + OPCODE_BITS + REGISTER_BITS,
        MODE_BITS,
        mode.tag(),
    )?;

    if let Some(value) = argument.and_then(Resolved::payload) {
        let word = Word::try_from(value)
            .map_err(|_| AssemblyError::OperandTooWide { value, address })?;
        memory.write_word(address + 1, word)?;
    }
    Ok(())
}

/// Options for [`assemble_with`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AssemblerConfig {
    /// Size of the memory image. Defaults to exactly the program's size;
    /// anything past the program is zeroed.
    pub memory_bytes: Option<usize>,
}

/// An assembled program together with its listing.
#[derive(Debug)]
pub struct Assembly {
    instructions: Vec<Instruction>,
    labels: LabelTable,
    memory: Memory,
}

impl Assembly {
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn label_address(&self, label: &str) -> Option<usize> {
        self.labels.addresses.get(label).copied()
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    pub fn into_memory(self) -> Memory {
        self.memory
    }
}

impl fmt::Display for Assembly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for instruction in &self.instructions {
            writeln!(f, "{instruction}")?;
        }
        Ok(())
    }
}

/// Assembles `source` into a memory image exactly as large as the program.
pub fn assemble(source: &str) -> AssemblyResult<Memory> {
    assemble_with(source, &AssemblerConfig::default()).map(Assembly::into_memory)
}

pub fn assemble_with(
    source: &str,
    config: &AssemblerConfig,
) -> AssemblyResult<Assembly> {
    let (instructions, labels) = resolve_with_labels(parse_program(source)?)?;
    let mut memory = Memory::zeroed(
        config
            .memory_bytes
            .unwrap_or_else(|| program_size(&instructions)),
    );
    encode_into(&instructions, &mut memory)?;
    Ok(Assembly {
        instructions,
        labels,
        memory,
    })
}
