use crate::asm::{assemble, AsmError};
use crate::op::{Comp, Instruction, Jump};

/// RAM size in 16-bit words.
pub const RAM_WORDS: usize = 1 << 15;

/// Why `run_until` stopped executing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Halted,
    CycleLimit,
}

/// An executable machine: instruction memory, data memory, and the three
/// registers. Data memory cells are signed 16-bit words; addressing wraps
/// into the 32K RAM.
pub struct Machine {
    pub rom: Vec<Instruction>,
    pub ram: Vec<i16>,
    pub pc: usize,
    pub a: i16,
    pub d: i16,
}

impl std::fmt::Debug for Machine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Machine")
            .field("pc", &self.pc)
            .field("a", &self.a)
            .field("d", &self.d)
            .finish()
    }
}

pub fn machine_with_program(source: &str) -> Result<Machine, AsmError> {
    Ok(Machine::new(assemble(source)?))
}

impl Machine {
    pub fn new(rom: Vec<Instruction>) -> Self {
        Self {
            rom,
            ram: vec![0; RAM_WORDS],
            pc: 0,
            a: 0,
            d: 0,
        }
    }

    fn address(&self) -> usize {
        self.a as u16 as usize & (RAM_WORDS - 1)
    }

    fn eval(&self, comp: Comp, m: i16) -> i16 {
        let (a, d) = (self.a, self.d);
        match comp {
            Comp::Zero => 0,
            Comp::One => 1,
            Comp::NegOne => -1,
            Comp::D => d,
            Comp::A => a,
            Comp::M => m,
            Comp::NotD => !d,
            Comp::NotA => !a,
            Comp::NotM => !m,
            Comp::NegD => d.wrapping_neg(),
            Comp::NegA => a.wrapping_neg(),
            Comp::NegM => m.wrapping_neg(),
            Comp::DPlusOne => d.wrapping_add(1),
            Comp::APlusOne => a.wrapping_add(1),
            Comp::MPlusOne => m.wrapping_add(1),
            Comp::DMinusOne => d.wrapping_sub(1),
            Comp::AMinusOne => a.wrapping_sub(1),
            Comp::MMinusOne => m.wrapping_sub(1),
            Comp::DPlusA => d.wrapping_add(a),
            Comp::DPlusM => d.wrapping_add(m),
            Comp::DMinusA => d.wrapping_sub(a),
            Comp::DMinusM => d.wrapping_sub(m),
            Comp::AMinusD => a.wrapping_sub(d),
            Comp::MMinusD => m.wrapping_sub(d),
            Comp::DAndA => d & a,
            Comp::DAndM => d & m,
            Comp::DOrA => d | a,
            Comp::DOrM => d | m,
        }
    }

    pub fn step(&mut self) {
        let Some(instruction) = self.rom.get(self.pc).copied() else {
            return;
        };
        match instruction {
            Instruction::Address(value) => {
                self.a = value as i16;
                self.pc += 1;
            }
            Instruction::Compute { dest, comp, jump } => {
                // M reads and writes use the pre-instruction A, as does
                // the jump target
                let address = self.address();
                let target = self.a as u16 as usize;
                let value = self.eval(comp, self.ram[address]);

                if dest.m {
                    self.ram[address] = value;
                }
                if dest.a {
                    self.a = value;
                }
                if dest.d {
                    self.d = value;
                }

                let taken = match jump {
                    None => false,
                    Some(Jump::JGT) => value > 0,
                    Some(Jump::JEQ) => value == 0,
                    Some(Jump::JGE) => value >= 0,
                    Some(Jump::JLT) => value < 0,
                    Some(Jump::JNE) => value != 0,
                    Some(Jump::JLE) => value <= 0,
                    Some(Jump::JMP) => true,
                };
                self.pc = if taken { target } else { self.pc + 1 };
            }
        }
    }

    /// Run until the program halts or the cycle budget runs out. A program
    /// is halted when the PC stops advancing: either a direct self-jump or
    /// the conventional two-instruction end loop (`(END) @END 0;JMP`).
    pub fn run_until(&mut self, max_cycles: u64) -> StopReason {
        let mut cycles = 0;
        while cycles < max_cycles {
            if self.pc >= self.rom.len() {
                return StopReason::Halted;
            }
            let pc = self.pc;
            self.step();
            cycles += 1;
            if self.pc == pc {
                return StopReason::Halted;
            }
            if self.pc + 1 == pc {
                let looping = matches!(
                    self.rom.get(self.pc),
                    Some(Instruction::Address(target)) if *target as usize == self.pc
                );
                if looping {
                    return StopReason::Halted;
                }
            }
        }
        StopReason::CycleLimit
    }
}
