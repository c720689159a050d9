use std::collections::HashMap;
use std::str::FromStr;

use thiserror::Error;

use crate::op::{Comp, Dest, Instruction, Jump, OpError};

/// A-instruction immediates are 15 bits.
pub static MAX_ADDRESS: u16 = 0x7FFF;

/// First RAM cell handed out to variable symbols.
static VARIABLE_BASE: u16 = 16;

#[derive(Error, Debug)]
pub enum AsmError {
    #[error("line {line}: malformed instruction: {text}")]
    Malformed { line: usize, text: String },
    #[error("line {line}: {source}")]
    Op {
        line: usize,
        #[source]
        source: OpError,
    },
    #[error("line {line}: address out of range: {text}")]
    AddressRange { line: usize, text: String },
    #[error("line {line}: duplicate label: {label}")]
    DuplicateLabel { line: usize, label: String },
}

fn predefined(symbol: &str) -> Option<u16> {
    let address = match symbol {
        "SP" => 0,
        "LCL" => 1,
        "ARG" => 2,
        "THIS" => 3,
        "THAT" => 4,
        "SCREEN" => 16384,
        "KBD" => 24576,
        _ => {
            let numbered = symbol.strip_prefix('R')?;
            let register = numbered.parse::<u16>().ok()?;
            if register > 15 || (numbered.len() > 1 && numbered.starts_with('0')) {
                return None;
            }
            register
        }
    };
    Some(address)
}

enum Line<'a> {
    Label(&'a str),
    Instruction(&'a str),
}

fn scan(source: &str) -> impl Iterator<Item = (usize, Line<'_>)> {
    source.lines().enumerate().filter_map(|(line_no, raw)| {
        let text = raw.split("//").next().unwrap_or("").trim();
        if text.is_empty() {
            return None;
        }
        let line = if let Some(label) = text.strip_prefix('(') {
            Line::Label(label.trim_end_matches(')'))
        } else {
            Line::Instruction(text)
        };
        Some((line_no + 1, line))
    })
}

fn parse_compute(line: usize, text: &str) -> Result<Instruction, AsmError> {
    let (rest, jump) = match text.split_once(';') {
        Some((rest, jump)) => {
            let jump = Jump::from_str(jump.trim())
                .map_err(|_| AsmError::Op {
                    line,
                    source: OpError::UnknownJump(jump.trim().into()),
                })?;
            (rest.trim(), Some(jump))
        }
        None => (text, None),
    };

    let (dest, comp) = match rest.split_once('=') {
        Some((dest, comp)) => {
            let dest = Dest::from_str(dest.trim()).map_err(|source| AsmError::Op { line, source })?;
            (dest, comp.trim())
        }
        None => (Dest::NONE, rest),
    };

    let comp = Comp::from_mnemonic(comp).ok_or_else(|| AsmError::Op {
        line,
        source: OpError::UnknownComp(comp.into()),
    })?;

    Ok(Instruction::Compute { dest, comp, jump })
}

/// Assemble symbolic machine text into executable instructions.
///
/// Pass one binds each `(LABEL)` to the address of the instruction that
/// follows it. Pass two resolves `@symbol` against the predefined cells,
/// the bound labels, and finally a variable cell allocated at first use,
/// counting up from 16.
pub fn assemble(source: &str) -> Result<Vec<Instruction>, AsmError> {
    let mut labels: HashMap<&str, u16> = HashMap::new();
    let mut address = 0u16;
    for (line_no, line) in scan(source) {
        match line {
            Line::Label(label) => {
                if labels.insert(label, address).is_some() {
                    return Err(AsmError::DuplicateLabel {
                        line: line_no,
                        label: label.into(),
                    });
                }
            }
            Line::Instruction(_) => address += 1,
        }
    }

    let mut variables: HashMap<&str, u16> = HashMap::new();
    let mut next_variable = VARIABLE_BASE;
    let mut instructions = Vec::with_capacity(address as usize);

    for (line_no, line) in scan(source) {
        let Line::Instruction(text) = line else {
            continue;
        };
        let instruction = if let Some(target) = text.strip_prefix('@') {
            let value = if target.chars().all(|c| c.is_ascii_digit()) {
                target
                    .parse::<u16>()
                    .ok()
                    .filter(|v| *v <= MAX_ADDRESS)
                    .ok_or_else(|| AsmError::AddressRange {
                        line: line_no,
                        text: text.into(),
                    })?
            } else if let Some(value) = predefined(target) {
                value
            } else if let Some(value) = labels.get(target) {
                *value
            } else {
                *variables.entry(target).or_insert_with(|| {
                    let cell = next_variable;
                    next_variable += 1;
                    cell
                })
            };
            Instruction::Address(value)
        } else if text.contains('=') || text.contains(';') {
            parse_compute(line_no, text)?
        } else {
            return Err(AsmError::Malformed {
                line: line_no,
                text: text.into(),
            });
        };
        instructions.push(instruction);
    }

    Ok(instructions)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assembles_simple_program() {
        let program = r#"
            @2
            D=A
            @3
            D=D+A
            @0
            M=D
        "#;

        let rom = assemble(program).unwrap();
        assert_eq!(rom.len(), 6);
        assert_eq!(rom[0], Instruction::Address(2));
        assert_eq!(
            rom[3],
            Instruction::Compute {
                dest: Dest::D,
                comp: Comp::DPlusA,
                jump: None,
            }
        );
    }

    #[test]
    fn binds_labels_and_allocates_variables() {
        let program = r#"
            @counter     // variable -> 16
            M=1
        (LOOP)
            @counter
            M=M+1
            @limit       // variable -> 17
            D=M
            @LOOP
            D;JGT
        (END)
            @END
            0;JMP
        "#;

        let rom = assemble(program).unwrap();
        assert_eq!(rom.len(), 10);
        assert_eq!(rom[0], Instruction::Address(16));
        assert_eq!(rom[2], Instruction::Address(16));
        assert_eq!(rom[4], Instruction::Address(17));
        // (LOOP) binds to the instruction after the first two
        assert_eq!(rom[6], Instruction::Address(2));
        // (END) binds past the conditional jump
        assert_eq!(rom[8], Instruction::Address(8));
    }

    #[test]
    fn resolves_predefined_symbols() {
        let program = "@R13\nM=D\n@SP\nAM=M-1\n@SCREEN\nD=A\n@KBD\nD=A\n@THAT\nD=M";
        let rom = assemble(program).unwrap();
        assert_eq!(rom[0], Instruction::Address(13));
        assert_eq!(rom[2], Instruction::Address(0));
        assert_eq!(rom[4], Instruction::Address(16384));
        assert_eq!(rom[6], Instruction::Address(24576));
        assert_eq!(rom[8], Instruction::Address(4));
    }

    #[test]
    fn dotted_symbols_are_variables() {
        // Per-module static cells arrive as dotted symbols
        let rom = assemble("@Main.0\nM=D\n@Other.0\nM=D\n@Main.0\nD=M").unwrap();
        assert_eq!(rom[0], Instruction::Address(16));
        assert_eq!(rom[2], Instruction::Address(17));
        assert_eq!(rom[4], Instruction::Address(16));
    }

    #[test]
    fn rejects_bad_input() {
        assert!(matches!(
            assemble("@32768"),
            Err(AsmError::AddressRange { line: 1, .. })
        ));
        assert!(matches!(
            assemble("M=M*2"),
            Err(AsmError::Op { line: 1, .. })
        ));
        assert!(matches!(
            assemble("bogus"),
            Err(AsmError::Malformed { line: 1, .. })
        ));
        assert!(matches!(
            assemble("(X)\nD=M\n(X)\nD=M"),
            Err(AsmError::DuplicateLabel { line: 3, .. })
        ));
    }
}
