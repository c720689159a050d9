use std::fmt::Display;
use std::str::FromStr;

use strum_macros::EnumString;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum OpError {
    #[error("unknown computation: {0}")]
    UnknownComp(String),
    #[error("unknown destination: {0}")]
    UnknownDest(String),
    #[error("unknown jump: {0}")]
    UnknownJump(String),
}

/// Which registers receive the ALU result. All three may be set at once;
/// a store to M uses the value A held before the instruction executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Dest {
    pub a: bool,
    pub m: bool,
    pub d: bool,
}

impl Dest {
    pub const NONE: Dest = Dest {
        a: false,
        m: false,
        d: false,
    };
    pub const A: Dest = Dest {
        a: true,
        m: false,
        d: false,
    };
    pub const M: Dest = Dest {
        a: false,
        m: true,
        d: false,
    };
    pub const D: Dest = Dest {
        a: false,
        m: false,
        d: true,
    };
    pub const AM: Dest = Dest {
        a: true,
        m: true,
        d: false,
    };

    pub fn is_empty(&self) -> bool {
        !(self.a || self.m || self.d)
    }
}

impl FromStr for Dest {
    type Err = OpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut dest = Dest::NONE;
        for c in s.chars() {
            let field = match c {
                'A' => &mut dest.a,
                'M' => &mut dest.m,
                'D' => &mut dest.d,
                _ => return Err(OpError::UnknownDest(s.into())),
            };
            if *field {
                // Same register named twice
                return Err(OpError::UnknownDest(s.into()));
            }
            *field = true;
        }
        if dest.is_empty() {
            return Err(OpError::UnknownDest(s.into()));
        }
        Ok(dest)
    }
}

impl Display for Dest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.a {
            write!(f, "A")?;
        }
        if self.m {
            write!(f, "M")?;
        }
        if self.d {
            write!(f, "D")?;
        }
        Ok(())
    }
}

/// The 28 ALU computations the machine can perform in one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comp {
    Zero,
    One,
    NegOne,
    D,
    A,
    M,
    NotD,
    NotA,
    NotM,
    NegD,
    NegA,
    NegM,
    DPlusOne,
    APlusOne,
    MPlusOne,
    DMinusOne,
    AMinusOne,
    MMinusOne,
    DPlusA,
    DPlusM,
    DMinusA,
    DMinusM,
    AMinusD,
    MMinusD,
    DAndA,
    DAndM,
    DOrA,
    DOrM,
}

impl Comp {
    pub fn from_mnemonic(s: &str) -> Option<Self> {
        match s {
            "0" => Some(Self::Zero),
            "1" => Some(Self::One),
            "-1" => Some(Self::NegOne),
            "D" => Some(Self::D),
            "A" => Some(Self::A),
            "M" => Some(Self::M),
            "!D" => Some(Self::NotD),
            "!A" => Some(Self::NotA),
            "!M" => Some(Self::NotM),
            "-D" => Some(Self::NegD),
            "-A" => Some(Self::NegA),
            "-M" => Some(Self::NegM),
            "D+1" => Some(Self::DPlusOne),
            "A+1" => Some(Self::APlusOne),
            "M+1" => Some(Self::MPlusOne),
            "D-1" => Some(Self::DMinusOne),
            "A-1" => Some(Self::AMinusOne),
            "M-1" => Some(Self::MMinusOne),
            "D+A" | "A+D" => Some(Self::DPlusA),
            "D+M" | "M+D" => Some(Self::DPlusM),
            "D-A" => Some(Self::DMinusA),
            "D-M" => Some(Self::DMinusM),
            "A-D" => Some(Self::AMinusD),
            "M-D" => Some(Self::MMinusD),
            "D&A" | "A&D" => Some(Self::DAndA),
            "D&M" | "M&D" => Some(Self::DAndM),
            "D|A" | "A|D" => Some(Self::DOrA),
            "D|M" | "M|D" => Some(Self::DOrM),
            _ => None,
        }
    }

    pub fn mnemonic(&self) -> &'static str {
        match self {
            Self::Zero => "0",
            Self::One => "1",
            Self::NegOne => "-1",
            Self::D => "D",
            Self::A => "A",
            Self::M => "M",
            Self::NotD => "!D",
            Self::NotA => "!A",
            Self::NotM => "!M",
            Self::NegD => "-D",
            Self::NegA => "-A",
            Self::NegM => "-M",
            Self::DPlusOne => "D+1",
            Self::APlusOne => "A+1",
            Self::MPlusOne => "M+1",
            Self::DMinusOne => "D-1",
            Self::AMinusOne => "A-1",
            Self::MMinusOne => "M-1",
            Self::DPlusA => "D+A",
            Self::DPlusM => "D+M",
            Self::DMinusA => "D-A",
            Self::DMinusM => "D-M",
            Self::AMinusD => "A-D",
            Self::MMinusD => "M-D",
            Self::DAndA => "D&A",
            Self::DAndM => "D&M",
            Self::DOrA => "D|A",
            Self::DOrM => "D|M",
        }
    }
}

impl Display for Comp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.mnemonic())
    }
}

/// Conditional jump mnemonics. The condition compares the ALU result
/// against zero; the target is the address held in A.
#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString)]
pub enum Jump {
    JGT,
    JEQ,
    JGE,
    JLT,
    JNE,
    JLE,
    JMP,
}

impl Display for Jump {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::JGT => "JGT",
            Self::JEQ => "JEQ",
            Self::JGE => "JGE",
            Self::JLT => "JLT",
            Self::JNE => "JNE",
            Self::JLE => "JLE",
            Self::JMP => "JMP",
        };
        f.write_str(s)
    }
}

/// One resolved machine instruction: either load an immediate into A or
/// compute-store-jump. Symbolic addresses are resolved by the assembler
/// before an `Instruction` exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    Address(u16),
    Compute {
        dest: Dest,
        comp: Comp,
        jump: Option<Jump>,
    },
}

impl Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Instruction::Address(value) => write!(f, "@{}", value),
            Instruction::Compute { dest, comp, jump } => {
                if !dest.is_empty() {
                    write!(f, "{}=", dest)?;
                }
                write!(f, "{}", comp)?;
                if let Some(jump) = jump {
                    write!(f, ";{}", jump)?;
                }
                Ok(())
            }
        }
    }
}
