// Copyright (C) 2024 Ethan Uppal. All rights reserved.

use log::{debug, trace};
use thiserror::Error;

use crate::{
    arch::{Word, REGISTER_COUNT, SHORT_INSTRUCTION_BYTES, WORD_BITS},
    memory::{Encoding, Memory, MemoryError},
    op::{AddressingMode, DecodeError, InstructionByte, Opcode, Register},
};

#[derive(Debug, PartialEq, Eq, Error)]
pub enum VMError {
    #[error("{source} @ {pc}")]
    Decode {
        pc: usize,
        #[source]
        source: DecodeError,
    },
    #[error("store @ {pc} uses invalid immediate addressing mode")]
    ImmediateStore { pc: usize },
    #[error("division by zero @ {pc}")]
    DivisionByZero { pc: usize },
    #[error("no halt within {0} steps")]
    StepBudgetExhausted(u64),
    #[error(transparent)]
    Memory(#[from] MemoryError),
}

pub type VMResult<T> = Result<T, VMError>;

/// What the machine is doing after a [`VM::step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Running,
    Halted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    /// Instructions executed, the final `halt` included.
    pub steps: u64,
}

/// An operand after addressing-mode resolution.
#[derive(Debug, Clone, Copy)]
struct Operand {
    value: Word,
    /// Byte address the operand names, in direct mode.
    address: Option<usize>,
}

impl Operand {
    /// Where a jump goes: a direct operand names its destination, otherwise
    /// the value is the destination.
    fn target(&self) -> usize {
        self.address.unwrap_or(self.value as usize)
    }
}

/// A machine executing a [`Memory`] in place. Program and data share the
/// one address space.
pub struct VM {
    memory: Memory,
    registers: [Word; REGISTER_COUNT],
    pc: usize,
    halted: bool,
}

impl VM {
    /// Creates a [`VM`] that starts executing `memory` at address 0.
    pub fn new(memory: Memory) -> Self {
        Self {
            memory,
            registers: [0; REGISTER_COUNT],
            pc: 0,
            halted: false,
        }
    }

    /// Creates a [`VM`] from a memory image written with
    /// [`Memory::to_encoded`].
    pub fn from_encoded(text: &str, encoding: Encoding) -> VMResult<Self> {
        Ok(Self::new(Memory::from_encoded(text, encoding)?))
    }

    /// Runs the [`VM`] until it halts, giving up after `max_steps`
    /// instructions if a budget is given.
    pub fn run(&mut self, max_steps: Option<u64>) -> VMResult<RunSummary> {
        let mut steps = 0;
        while !self.halted {
            if max_steps.is_some_and(|limit| steps >= limit) {
                return Err(VMError::StepBudgetExhausted(steps));
            }
            self.step()?;
            steps += 1;
        }
        debug!("halted after {steps} steps at pc {}", self.pc);
        Ok(RunSummary { steps })
    }

    /// Executes one instruction. A halted machine stays halted.
    pub fn step(&mut self) -> VMResult<Status> {
        if self.halted {
            return Ok(Status::Halted);
        }

        let at = self.pc;
        let instruction = self.decode_op()?;
        let operand = self.resolve_operand(instruction)?;
        self.pc = at + instruction.size();
        trace!(
            "{at:04X}: {} {} {} = {}",
            instruction.opcode,
            instruction.register,
            instruction.mode,
            operand.value
        );

        let register = instruction.register;
        let current = self.register(register);
        match instruction.opcode {
            Opcode::Nop => {}
            Opcode::Halt => {
                self.halted = true;
                return Ok(Status::Halted);
            }
            Opcode::Jump => self.pc = operand.target(),
            Opcode::JumpIfZero => {
                if current == 0 {
                    self.pc = operand.target();
                }
            }
            Opcode::Load => self.set_register(register, operand.value),
            Opcode::Store => match (instruction.mode, operand.address) {
                (AddressingMode::Direct, Some(address)) => {
                    self.memory.write_word(address, current)?
                }
                (AddressingMode::Immediate, _) => {
                    return Err(VMError::ImmediateStore { pc: at })
                }
                _ => self.set_register(Register::ACCUMULATOR, current),
            },
            Opcode::Add => {
                self.set_register(register, current.wrapping_add(operand.value))
            }
            Opcode::Subtract => {
                self.set_register(register, current.wrapping_sub(operand.value))
            }
            Opcode::Multiply => {
                self.set_register(register, current.wrapping_mul(operand.value))
            }
            Opcode::Divide => {
                let quotient = current
                    .checked_div(operand.value)
                    .ok_or(VMError::DivisionByZero { pc: at })?;
                self.set_register(register, quotient)
            }
            Opcode::And => self
                .set_register(register, flag(current == 1 && operand.value == 1)),
            Opcode::Or => self
                .set_register(register, flag(current == 1 || operand.value == 1)),
            Opcode::Not => self.set_register(register, flag(current != 1)),
            Opcode::EqualsZero => {
                self.set_register(register, flag(operand.value == 0))
            }
            Opcode::LessThanZero => {
                self.set_register(register, operand.value >> (WORD_BITS - 1))
            }
        }

        Ok(Status::Running)
    }

    fn decode_op(&self) -> VMResult<InstructionByte> {
        let byte = self.memory.read_byte(self.pc)?;
        InstructionByte::decode(byte)
            .map_err(|source| VMError::Decode { pc: self.pc, source })
    }

    fn resolve_operand(&self, instruction: InstructionByte) -> VMResult<Operand> {
        let field = self.pc + SHORT_INSTRUCTION_BYTES;
        Ok(match instruction.mode {
            AddressingMode::Accumulator => Operand {
                value: self.register(Register::ACCUMULATOR),
                address: None,
            },
            AddressingMode::Immediate => Operand {
                value: self.memory.read_word(field)?,
                address: None,
            },
            AddressingMode::Direct => {
                let address = self.memory.read_word(field)? as usize;
                // jumps and stores only use the address
                let value = match instruction.opcode {
                    Opcode::Jump | Opcode::JumpIfZero | Opcode::Store => 0,
                    _ => self.memory.read_word(address)?,
                };
                Operand {
                    value,
                    address: Some(address),
                }
            }
        })
    }

    pub fn pc(&self) -> usize {
        self.pc
    }

    pub fn set_pc(&mut self, pc: usize) {
        self.pc = pc;
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn registers(&self) -> [Word; REGISTER_COUNT] {
        self.registers
    }

    pub fn register(&self, register: Register) -> Word {
        self.registers[register.index()]
    }

    pub fn set_register(&mut self, register: Register, value: Word) {
        self.registers[register.index()] = value;
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut Memory {
        &mut self.memory
    }

    pub fn into_memory(self) -> Memory {
        self.memory
    }
}

const fn flag(condition: bool) -> Word {
    condition as Word
}

#[cfg(test)]
mod tests {
    use paste::paste;

    use crate::{
        memory::{Memory, MemoryError},
        op::{AddressingMode, DecodeError, InstructionByte, Opcode, Register},
        vm::{Status, VMError, VM},
    };

    fn short(opcode: Opcode, register: Register) -> Vec<u8> {
        vec![InstructionByte::new(opcode, register, AddressingMode::Accumulator)
            .encode()]
    }

    fn long(
        opcode: Opcode,
        register: Register,
        mode: AddressingMode,
        operand: u16,
    ) -> Vec<u8> {
        let [high, low] = operand.to_be_bytes();
        vec![InstructionByte::new(opcode, register, mode).encode(), high, low]
    }

    fn immediate(opcode: Opcode, register: Register, operand: u16) -> Vec<u8> {
        long(opcode, register, AddressingMode::Immediate, operand)
    }

    /// Lays out `parts` from address 0 in a memory of at least `size` bytes.
    fn machine(parts: &[Vec<u8>], size: usize) -> VM {
        let mut bytes = parts.concat();
        if bytes.len() < size {
            bytes.resize(size, 0);
        }
        VM::new(Memory::from_bytes(bytes))
    }

    macro_rules! arithmetic_cases {
        ($($name:ident: $opcode:ident($initial:expr, $operand:expr) => $expected:expr;)*) => {
            paste! {
                $(
                    #[test]
                    fn [<executes_ $name>]() {
                        let mut vm = machine(
                            &[immediate(Opcode::$opcode, Register::R1, $operand)],
                            0,
                        );
                        vm.set_register(Register::R1, $initial);
                        assert_eq!(Ok(Status::Running), vm.step());
                        assert_eq!($expected, vm.register(Register::R1));
                        assert_eq!(3, vm.pc());
                    }
                )*
            }
        };
    }

    arithmetic_cases! {
        add: Add(5, 3) => 8;
        add_wrapping: Add(0xFFFF, 1) => 0;
        subtract_wrapping: Subtract(8, 20) => 0xFFF4;
        multiply_wrapping: Multiply(300, 300) => 24464;
        divide_floor: Divide(7, 2) => 3;
        and_of_ones: And(1, 1) => 1;
        and_is_not_bitwise: And(3, 3) => 0;
        or_of_one: Or(0, 1) => 1;
        or_is_not_bitwise: Or(2, 2) => 0;
        equals_zero: EqualsZero(5, 0) => 1;
        equals_zero_nonzero: EqualsZero(0, 7) => 0;
        less_than_zero: LessThanZero(0, 0x8000) => 1;
        less_than_zero_positive: LessThanZero(1, 0x7FFF) => 0;
    }

    #[test]
    fn add_then_subtract_wraps_to_twos_complement() {
        let mut vm = machine(
            &[
                immediate(Opcode::Add, Register::R1, 5),
                immediate(Opcode::Add, Register::R1, 3),
                immediate(Opcode::Subtract, Register::R1, 20),
            ],
            0,
        );
        vm.step().unwrap();
        vm.step().unwrap();
        assert_eq!(8, vm.register(Register::R1));
        vm.step().unwrap();
        assert_eq!((-12i16) as u16, vm.register(Register::R1));
    }

    #[test]
    fn store_then_read_back() {
        let mut vm = machine(
            &[
                immediate(Opcode::Load, Register::R1, 42),
                long(Opcode::Store, Register::R1, AddressingMode::Direct, 10),
                short(Opcode::Halt, Register::R0),
            ],
            12,
        );
        assert_eq!(3, vm.run(None).unwrap().steps);
        assert_eq!(Ok(42), vm.memory().read_word(10));
    }

    #[test]
    fn direct_mode_reads_memory() {
        let mut vm = machine(
            &[
                long(Opcode::Load, Register::R2, AddressingMode::Direct, 4),
                vec![0, 0x01, 0x02],
            ],
            0,
        );
        vm.step().unwrap();
        assert_eq!(0x0102, vm.register(Register::R2));
        assert_eq!(3, vm.pc());
    }

    #[test]
    fn accumulator_mode_uses_r0() {
        let mut vm = machine(
            &[
                immediate(Opcode::Load, Register::R0, 6),
                short(Opcode::Add, Register::R1),
                short(Opcode::Add, Register::R1),
            ],
            0,
        );
        vm.step().unwrap();
        vm.step().unwrap();
        assert_eq!(4, vm.pc());
        vm.step().unwrap();
        assert_eq!(12, vm.register(Register::R1));
        assert_eq!(5, vm.pc());
    }

    #[test]
    fn store_in_accumulator_mode_copies_to_r0() {
        let mut vm = machine(
            &[
                immediate(Opcode::Load, Register::R2, 9),
                short(Opcode::Store, Register::R2),
            ],
            0,
        );
        vm.step().unwrap();
        vm.step().unwrap();
        assert_eq!([9, 0, 9], vm.registers());
    }

    #[test]
    fn store_rejects_immediate_mode() {
        let mut vm = machine(&[immediate(Opcode::Store, Register::R1, 4)], 0);
        assert_eq!(Err(VMError::ImmediateStore { pc: 0 }), vm.step());
    }

    #[test]
    fn division_by_zero_is_an_error() {
        let mut vm = machine(&[immediate(Opcode::Divide, Register::R1, 0)], 0);
        vm.set_register(Register::R1, 10);
        assert_eq!(Err(VMError::DivisionByZero { pc: 0 }), vm.step());
        assert_eq!(10, vm.register(Register::R1));
    }

    #[test]
    fn not_inverts_single_bit_sense() {
        let mut vm = machine(
            &[short(Opcode::Not, Register::R1), short(Opcode::Not, Register::R1)],
            0,
        );
        vm.step().unwrap();
        assert_eq!(1, vm.register(Register::R1));
        vm.step().unwrap();
        assert_eq!(0, vm.register(Register::R1));
    }

    #[test]
    fn jumps() {
        let mut vm = machine(
            &[
                short(Opcode::Nop, Register::R0),
                immediate(Opcode::Jump, Register::R0, 0),
            ],
            0,
        );
        vm.step().unwrap();
        assert_eq!(1, vm.pc());
        vm.step().unwrap();
        assert_eq!(0, vm.pc());
    }

    #[test]
    fn direct_jumps_go_to_the_address() {
        let mut vm = machine(
            &[
                short(Opcode::Nop, Register::R0),
                long(Opcode::Jump, Register::R0, AddressingMode::Direct, 0),
            ],
            0,
        );
        vm.step().unwrap();
        vm.step().unwrap();
        assert_eq!(0, vm.pc());

        let mut vm = machine(
            &[long(Opcode::JumpIfZero, Register::R1, AddressingMode::Direct, 6)],
            8,
        );
        vm.step().unwrap();
        assert_eq!(6, vm.pc());
    }

    #[test]
    fn jump_if_zero_tests_the_selected_register() {
        let program = [
            immediate(Opcode::JumpIfZero, Register::R2, 9),
            immediate(Opcode::JumpIfZero, Register::R2, 9),
        ];

        let mut taken = machine(&program, 0);
        taken.step().unwrap();
        assert_eq!(9, taken.pc());

        let mut skipped = machine(&program, 0);
        skipped.set_register(Register::R2, 1);
        skipped.step().unwrap();
        assert_eq!(3, skipped.pc());
    }

    #[test]
    fn halt_is_terminal() {
        let mut vm = machine(
            &[
                short(Opcode::Halt, Register::R0),
                immediate(Opcode::Load, Register::R1, 1),
            ],
            0,
        );
        assert_eq!(Ok(Status::Halted), vm.step());
        assert!(vm.is_halted());
        assert_eq!(1, vm.pc());
        assert_eq!(Ok(Status::Halted), vm.step());
        assert_eq!(0, vm.register(Register::R1));
        assert_eq!(0, vm.run(None).unwrap().steps);
    }

    #[test]
    fn reserved_opcode_does_not_advance() {
        let mut vm = machine(&[vec![0b1111_0000]], 4);
        assert_eq!(
            Err(VMError::Decode {
                pc: 0,
                source: DecodeError::ReservedOpcode(0b1111)
            }),
            vm.step()
        );
        assert_eq!(0, vm.pc());
    }

    #[test]
    fn reserved_register_and_mode_are_rejected() {
        let mut vm = machine(&[vec![0b0100_11_01, 0, 0]], 0);
        assert!(matches!(
            vm.step(),
            Err(VMError::Decode {
                source: DecodeError::ReservedRegister(0b11),
                ..
            })
        ));

        let mut vm = machine(&[vec![0b0100_01_11, 0, 0]], 0);
        assert!(matches!(
            vm.step(),
            Err(VMError::Decode {
                source: DecodeError::ReservedMode(0b11),
                ..
            })
        ));
    }

    #[test]
    fn running_off_the_end_is_a_bounds_error() {
        let mut vm = machine(&[short(Opcode::Nop, Register::R0)], 0);
        vm.step().unwrap();
        assert!(matches!(
            vm.step(),
            Err(VMError::Memory(MemoryError::OutOfBounds { .. }))
        ));

        let mut truncated = machine(&[vec![0b0100_01_01, 0]], 0);
        assert!(truncated.step().is_err());
        assert_eq!(0, truncated.pc());
    }

    #[test]
    fn run_respects_step_budget() {
        let mut vm = machine(&[immediate(Opcode::Jump, Register::R0, 0)], 0);
        assert_eq!(Err(VMError::StepBudgetExhausted(10)), vm.run(Some(10)));
    }

    #[test]
    fn sums_with_a_loop() {
        // R1 = 5 + 4 + 3 + 2 + 1 using R2 as the counter
        let mut vm = machine(
            &[
                immediate(Opcode::Load, Register::R2, 5), // 0
                immediate(Opcode::JumpIfZero, Register::R2, 23), // 3
                long(Opcode::Load, Register::R0, AddressingMode::Immediate, 0), // 6
                short(Opcode::Store, Register::R2), // 9: R0 = R2
                short(Opcode::Add, Register::R1), // 10: R1 += R0
                immediate(Opcode::Subtract, Register::R2, 1), // 11
                immediate(Opcode::Jump, Register::R0, 3), // 14
                vec![0; 6], // 17..23
                short(Opcode::Halt, Register::R0), // 23
            ],
            0,
        );
        vm.run(Some(1000)).unwrap();
        assert_eq!(15, vm.register(Register::R1));
        assert_eq!(24, vm.pc());
    }
}
