// Copyright (C) 2024 Ethan Uppal. All rights reserved.

use std::fmt;

use bit_tags::bit_tags;
use static_assertions::const_assert_eq;
use thiserror::Error;

use crate::arch::{
    LONG_INSTRUCTION_BYTES, MODE_BITS, OPCODE_BITS, REGISTER_BITS,
    SHORT_INSTRUCTION_BYTES, WORD_BYTES,
};

/// Raw bits of a tag field, right-aligned.
pub type RawTag = u8;

/// An operation selected by the upper nibble of an instruction byte. The
/// pattern `1111` has no operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[bit_tags(public, repr(RawTag), bits(4))]
pub enum Opcode {
    /// No effect.
    Nop,
    /// Stops the machine.
    Halt,
    /// `pc := operand`.
    Jump,
    /// `pc := operand` if the selected register is zero.
    JumpIfZero,
    /// `reg := operand`.
    Load,
    /// Copies the selected register into `R0` (accumulator mode) or into
    /// memory (direct mode).
    Store,
    Add,
    Subtract,
    Multiply,
    Divide,
    /// `reg := (reg == 1) && (operand == 1)`.
    And,
    /// `reg := (reg == 1) || (operand == 1)`.
    Or,
    /// `reg := reg != 1`.
    Not,
    /// `reg := operand == 0`.
    EqualsZero,
    /// `reg :=` the sign bit of the operand.
    LessThanZero,
}
const_assert_eq!(Opcode::TAG_BITS, OPCODE_BITS);

impl Opcode {
    pub const fn mnemonic(&self) -> &'static str {
        match self {
            Self::Nop => "nop",
            Self::Halt => "halt",
            Self::Jump => "jmp",
            Self::JumpIfZero => "jmz",
            Self::Load => "load",
            Self::Store => "store",
            Self::Add => "add",
            Self::Subtract => "sub",
            Self::Multiply => "mul",
            Self::Divide => "div",
            Self::And => "and",
            Self::Or => "or",
            Self::Not => "not",
            Self::EqualsZero => "cpz",
            Self::LessThanZero => "cpl",
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.mnemonic().fmt(f)
    }
}

/// `R0` doubles as the accumulator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[bit_tags(public, repr(RawTag), bits(2))]
pub enum Register {
    R0,
    R1,
    R2,
}
const_assert_eq!(Register::TAG_BITS, REGISTER_BITS);

impl Register {
    pub const ACCUMULATOR: Register = Register::R0;

    /// Position of this register in the register file.
    pub const fn index(&self) -> usize {
        self.tag() as usize
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R{}", self.index())
    }
}

/// How an instruction obtains its operand.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[bit_tags(public, repr(RawTag), bits(2))]
pub enum AddressingMode {
    /// The operand is the current value of `R0`.
    Accumulator,
    /// The operand is the 16-bit value following the instruction byte.
    Immediate,
    /// The 16-bit value following the instruction byte is the byte address
    /// of the operand.
    Direct,
}
const_assert_eq!(AddressingMode::TAG_BITS, MODE_BITS);

impl AddressingMode {
    /// Bytes of operand field following the instruction byte.
    pub const fn operand_bytes(&self) -> usize {
        match self {
            Self::Accumulator => 0,
            Self::Immediate | Self::Direct => WORD_BYTES,
        }
    }

    pub const fn instruction_size(&self) -> usize {
        match self {
            Self::Accumulator => SHORT_INSTRUCTION_BYTES,
            Self::Immediate | Self::Direct => LONG_INSTRUCTION_BYTES,
        }
    }
}

impl fmt::Display for AddressingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Accumulator => "accumulator",
            Self::Immediate => "immediate",
            Self::Direct => "direct",
        }
        .fmt(f)
    }
}

/// A bit pattern in an instruction byte that names nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("{0:04b} is a non-existent instruction code")]
    ReservedOpcode(RawTag),
    #[error("{0:02b} is a non-existent register")]
    ReservedRegister(RawTag),
    #[error("{0:02b} is a non-existent addressing mode")]
    ReservedMode(RawTag),
}

/// The leading byte of every instruction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InstructionByte {
    pub opcode: Opcode,
    pub register: Register,
    pub mode: AddressingMode,
}

impl InstructionByte {
    pub const fn new(
        opcode: Opcode,
        register: Register,
        mode: AddressingMode,
    ) -> Self {
        Self {
            opcode,
            register,
            mode,
        }
    }

    /// Encodes this instruction byte.
    pub const fn encode(&self) -> u8 {
        (self.opcode.tag() << (REGISTER_BITS + MODE_BITS))
            | (self.register.tag() << MODE_BITS)
            | self.mode.tag()
    }

    /// Decodes an instruction byte, reporting the first reserved field in
    /// opcode, register, mode order.
    pub fn decode(byte: u8) -> Result<Self, DecodeError> {
        let opcode_bits = (byte >> (REGISTER_BITS + MODE_BITS)) & bitmask(OPCODE_BITS);
        let register_bits = (byte >> MODE_BITS) & bitmask(REGISTER_BITS);
        let mode_bits = byte & bitmask(MODE_BITS);

        let opcode = Opcode::from_tag(opcode_bits)
            .ok_or(DecodeError::ReservedOpcode(opcode_bits))?;
        let register = Register::from_tag(register_bits)
            .ok_or(DecodeError::ReservedRegister(register_bits))?;
        let mode = AddressingMode::from_tag(mode_bits)
            .ok_or(DecodeError::ReservedMode(mode_bits))?;

        Ok(Self::new(opcode, register, mode))
    }

    pub const fn size(&self) -> usize {
        self.mode.instruction_size()
    }
}

impl fmt::Display for InstructionByte {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ({})", self.opcode, self.register, self.mode)
    }
}

pub const fn bitmask(bits: usize) -> u8 {
    ((1u16 << bits) - 1) as u8
}

#[cfg(test)]
mod tests {
    use crate::op::{
        AddressingMode, DecodeError, InstructionByte, Opcode, Register,
    };

    #[test]
    fn tags_match_the_instruction_table() {
        assert_eq!(0b0000, Opcode::NOP_TAG);
        assert_eq!(0b0011, Opcode::JUMP_IF_ZERO_TAG);
        assert_eq!(0b1110, Opcode::LESS_THAN_ZERO_TAG);
        assert_eq!(0b10, Register::R2.tag());
        assert_eq!(0b10, AddressingMode::DIRECT_TAG);
        assert_eq!(None, Opcode::from_tag(0b1111));
    }

    #[test]
    fn encodes_correctly() {
        assert_eq!(
            0,
            InstructionByte::new(
                Opcode::Nop,
                Register::R0,
                AddressingMode::Accumulator
            )
            .encode()
        );
        assert_eq!(
            0b0100_01_01,
            InstructionByte::new(
                Opcode::Load,
                Register::R1,
                AddressingMode::Immediate
            )
            .encode()
        );
        assert_eq!(
            0b0101_10_10,
            InstructionByte::new(
                Opcode::Store,
                Register::R2,
                AddressingMode::Direct
            )
            .encode()
        );
    }

    #[test]
    fn decodes_what_it_encodes() {
        let byte = InstructionByte::new(
            Opcode::Divide,
            Register::R2,
            AddressingMode::Direct,
        );
        assert_eq!(Ok(byte), InstructionByte::decode(byte.encode()));
        assert_eq!(3, byte.size());
    }

    #[test]
    fn rejects_reserved_patterns() {
        assert_eq!(
            Err(DecodeError::ReservedOpcode(0b1111)),
            InstructionByte::decode(0b1111_00_00)
        );
        assert_eq!(
            Err(DecodeError::ReservedRegister(0b11)),
            InstructionByte::decode(0b0110_11_01)
        );
        assert_eq!(
            Err(DecodeError::ReservedMode(0b11)),
            InstructionByte::decode(0b0110_01_11)
        );
        // opcode is checked first
        assert_eq!(
            Err(DecodeError::ReservedOpcode(0b1111)),
            InstructionByte::decode(0xFF)
        );
    }
}
