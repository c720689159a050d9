use log::debug;
use thiserror::Error;

use crate::command::{ArithmeticOp, Command, FlowOp, FunctionOp, MemoryAccess, MemoryOp, Segment};

/// Absolute base of the pointer segment (THIS/THAT live at 3-4).
static POINTER_BASE: u16 = 3;
/// Absolute base of the temp segment (cells 5-12).
static TEMP_BASE: u16 = 5;
/// The entry function the bootstrap hands control to.
static ENTRY_FUNCTION: &str = "Sys.init";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CodegenError {
    #[error("cannot pop into the constant segment (index {0})")]
    PopConstant(u16),
}

/// Translates command sequences into machine instruction text.
///
/// One translator spans one output program: the label counter makes every
/// generated branch target and return address unique across all modules of
/// the run, and the bootstrap preamble is emitted exactly once, ahead of
/// the first module's code.
pub struct Translator {
    label_seq: usize,
    bootstrapped: bool,
}

impl Translator {
    pub fn new() -> Self {
        Self {
            label_seq: 0,
            bootstrapped: false,
        }
    }

    fn next_label_seq(&mut self) -> usize {
        let seq = self.label_seq;
        self.label_seq += 1;
        seq
    }

    /// Translate one module's commands. Each command expands to a block
    /// preceded by a comment echoing the source instruction.
    pub fn translate(&mut self, commands: &[Command]) -> Result<String, CodegenError> {
        let mut out = Vec::new();

        if !self.bootstrapped {
            self.bootstrapped = true;
            self.emit_bootstrap(&mut out);
        }

        for command in commands {
            out.push(format!("// {}", command));
            match command {
                Command::Arithmetic(op) => self.emit_arithmetic(&mut out, *op),
                Command::Memory(access) => self.emit_memory_access(&mut out, access)?,
                Command::Flow(flow) => match flow.op {
                    FlowOp::Label => out.push(format!("({})", flow.scoped_symbol())),
                    FlowOp::Goto => {
                        out.push(format!("@{}", flow.scoped_symbol()));
                        out.push("0;JMP".into());
                    }
                    FlowOp::IfGoto => {
                        emit_pop_to_d(&mut out);
                        out.push(format!("@{}", flow.scoped_symbol()));
                        out.push("D;JNE".into());
                    }
                },
                Command::Function(op) => match op {
                    FunctionOp::Declare { name, locals } => {
                        self.emit_declare(&mut out, name, *locals)
                    }
                    FunctionOp::Invoke { name, args } => self.emit_invoke(&mut out, name, *args),
                    FunctionOp::Return => emit_return(&mut out),
                },
            }
        }

        debug!(
            "translated {} commands into {} lines",
            commands.len(),
            out.len()
        );

        if out.is_empty() {
            return Ok(String::new());
        }
        let mut text = out.join("\n");
        text.push('\n');
        Ok(text)
    }

    /// Point SP at the bottom of the stack region and transfer control to
    /// the entry function. The entry invoke reserves no extra slot: the
    /// entry function never returns, so its frame is never unwound.
    fn emit_bootstrap(&mut self, out: &mut Vec<String>) {
        out.push("// bootstrap".into());
        out.push("@256".into());
        out.push("D=A".into());
        out.push("@SP".into());
        out.push("M=D".into());
        out.push(format!("// call {} 0", ENTRY_FUNCTION));
        self.emit_call(out, ENTRY_FUNCTION, 0);
    }

    fn emit_arithmetic(&mut self, out: &mut Vec<String>, op: ArithmeticOp) {
        match op {
            ArithmeticOp::Add => emit_binary(out, '+'),
            ArithmeticOp::Sub => emit_binary(out, '-'),
            ArithmeticOp::And => emit_binary(out, '&'),
            ArithmeticOp::Or => emit_binary(out, '|'),
            ArithmeticOp::Neg => emit_unary(out, '-'),
            ArithmeticOp::Not => emit_unary(out, '!'),
            ArithmeticOp::Eq => self.emit_compare(out, "JEQ"),
            ArithmeticOp::Gt => self.emit_compare(out, "JGT"),
            ArithmeticOp::Lt => self.emit_compare(out, "JLT"),
        }
    }

    /// Subtract the top cell from the one below it and branch on the
    /// difference; the new top holds -1 for true, 0 for false. The label
    /// suffix comes from the session counter, so repeated comparisons
    /// anywhere in the program never share targets.
    fn emit_compare(&mut self, out: &mut Vec<String>, jump: &str) {
        let seq = self.next_label_seq();
        out.push("@SP".into());
        out.push("AM=M-1".into());
        out.push("D=M".into());
        out.push("A=A-1".into());
        out.push("D=M-D".into());
        out.push(format!("@CMP_TRUE_{}", seq));
        out.push(format!("D;{}", jump));
        out.push("@SP".into());
        out.push("A=M-1".into());
        out.push("M=0".into());
        out.push(format!("@CMP_END_{}", seq));
        out.push("0;JMP".into());
        out.push(format!("(CMP_TRUE_{})", seq));
        out.push("@SP".into());
        out.push("A=M-1".into());
        out.push("M=-1".into());
        out.push(format!("(CMP_END_{})", seq));
    }

    fn emit_memory_access(
        &mut self,
        out: &mut Vec<String>,
        access: &MemoryAccess,
    ) -> Result<(), CodegenError> {
        match access.op {
            MemoryOp::Push => self.emit_push(out, access),
            MemoryOp::Pop => self.emit_pop(out, access)?,
        }
        Ok(())
    }

    fn emit_push(&mut self, out: &mut Vec<String>, access: &MemoryAccess) {
        match access.segment {
            Segment::Constant => {
                out.push(format!("@{}", access.index));
                out.push("D=A".into());
            }
            Segment::Argument => emit_read_indirect(out, "ARG", access.index),
            Segment::Local => emit_read_indirect(out, "LCL", access.index),
            Segment::This => emit_read_indirect(out, "THIS", access.index),
            Segment::That => emit_read_indirect(out, "THAT", access.index),
            Segment::Pointer => {
                out.push(format!("@{}", POINTER_BASE + access.index));
                out.push("D=M".into());
            }
            Segment::Temp => {
                out.push(format!("@{}", TEMP_BASE + access.index));
                out.push("D=M".into());
            }
            Segment::Static => {
                out.push(format!("@{}", access.static_symbol()));
                out.push("D=M".into());
            }
        }
        emit_push_from_d(out);
    }

    fn emit_pop(&mut self, out: &mut Vec<String>, access: &MemoryAccess) -> Result<(), CodegenError> {
        let direct = match access.segment {
            Segment::Constant => return Err(CodegenError::PopConstant(access.index)),
            Segment::Pointer => Some((POINTER_BASE + access.index).to_string()),
            Segment::Temp => Some((TEMP_BASE + access.index).to_string()),
            Segment::Static => Some(access.static_symbol()),
            Segment::Argument | Segment::Local | Segment::This | Segment::That => None,
        };

        if let Some(symbol) = direct {
            emit_pop_to_d(out);
            out.push(format!("@{}", symbol));
            out.push("M=D".into());
            return Ok(());
        }

        let base = match access.segment {
            Segment::Argument => "ARG",
            Segment::Local => "LCL",
            Segment::This => "THIS",
            // Only That can remain
            _ => "THAT",
        };
        emit_pop_base(out, base, access.index);
        Ok(())
    }

    /// Entry label, grow SP past the locals, then zero each local with the
    /// ordinary push-constant-0 / pop-local pair so the writes go through
    /// the LCL base the caller just set.
    fn emit_declare(&mut self, out: &mut Vec<String>, name: &str, locals: u16) {
        out.push(format!("({})", name));
        if locals == 0 {
            return;
        }
        out.push(format!("@{}", locals));
        out.push("D=A".into());
        out.push("@SP".into());
        out.push("M=M+D".into());
        for index in 0..locals {
            out.push("@0".into());
            out.push("D=A".into());
            emit_push_from_d(out);
            emit_pop_base(out, "LCL", index);
        }
    }

    /// A call from translated code: a zero-argument callee (other than the
    /// entry function) gets one reserved stack slot so its future return
    /// value cannot land on the saved return address; the slot counts as a
    /// single argument in the frame arithmetic.
    fn emit_invoke(&mut self, out: &mut Vec<String>, name: &str, args: u16) {
        if args == 0 && name != ENTRY_FUNCTION {
            out.push("@SP".into());
            out.push("M=M+1".into());
            self.emit_call(out, name, 1);
        } else {
            self.emit_call(out, name, args);
        }
    }

    /// The raw frame-building sequence: push the return address and the
    /// caller's LCL, ARG, THIS, THAT, point ARG at the first argument
    /// slot, point LCL at the new frame top, and jump.
    fn emit_call(&mut self, out: &mut Vec<String>, name: &str, arg_slots: u16) {
        let return_label = format!("RET_{}", self.next_label_seq());

        out.push(format!("@{}", return_label));
        out.push("D=A".into());
        emit_push_from_d(out);
        for saved in ["LCL", "ARG", "THIS", "THAT"] {
            out.push(format!("@{}", saved));
            out.push("D=M".into());
            emit_push_from_d(out);
        }
        // ARG = SP - argSlots - 5
        out.push("@SP".into());
        out.push("D=M".into());
        out.push(format!("@{}", arg_slots + 5));
        out.push("D=D-A".into());
        out.push("@ARG".into());
        out.push("M=D".into());
        // LCL = SP
        out.push("@SP".into());
        out.push("D=M".into());
        out.push("@LCL".into());
        out.push("M=D".into());
        out.push(format!("@{}", name));
        out.push("0;JMP".into());
        out.push(format!("({})", return_label));
    }
}

/// Combine the top two cells in place, decrementing SP once.
fn emit_binary(out: &mut Vec<String>, op: char) {
    out.push("@SP".into());
    out.push("AM=M-1".into());
    out.push("D=M".into());
    out.push("A=A-1".into());
    out.push(format!("M=M{}D", op));
}

/// Rewrite the top cell in place; SP is untouched.
fn emit_unary(out: &mut Vec<String>, op: char) {
    out.push("@SP".into());
    out.push("A=M-1".into());
    out.push(format!("M={}M", op));
}

/// Push the value in D onto the stack.
fn emit_push_from_d(out: &mut Vec<String>) {
    out.push("@SP".into());
    out.push("A=M".into());
    out.push("M=D".into());
    out.push("@SP".into());
    out.push("M=M+1".into());
}

/// Pop the top of the stack into D.
fn emit_pop_to_d(out: &mut Vec<String>) {
    out.push("@SP".into());
    out.push("AM=M-1".into());
    out.push("D=M".into());
}

/// D = RAM[base + index] for the four register-relative segments.
fn emit_read_indirect(out: &mut Vec<String>, base: &str, index: u16) {
    out.push(format!("@{}", base));
    out.push("D=M".into());
    out.push(format!("@{}", index));
    out.push("A=D+A".into());
    out.push("D=M".into());
}

/// Pop the stack top into RAM[base + index]. The target address parks in
/// R13 while the value is popped.
fn emit_pop_base(out: &mut Vec<String>, base: &str, index: u16) {
    out.push(format!("@{}", base));
    out.push("D=M".into());
    out.push(format!("@{}", index));
    out.push("D=D+A".into());
    out.push("@R13".into());
    out.push("M=D".into());
    emit_pop_to_d(out);
    out.push("@R13".into());
    out.push("A=M".into());
    out.push("M=D".into());
}

/// Unwind the frame: write the return value into the caller's stack top,
/// collapse SP, restore the four saved registers walking down from FRAME,
/// and jump through the saved return address at FRAME-5.
fn emit_return(out: &mut Vec<String>) {
    // R13 = FRAME
    out.push("@LCL".into());
    out.push("D=M".into());
    out.push("@R13".into());
    out.push("M=D".into());
    // Return value lands at RAM[ARG]
    out.push("@SP".into());
    out.push("A=M-1".into());
    out.push("D=M".into());
    out.push("@ARG".into());
    out.push("A=M".into());
    out.push("M=D".into());
    // SP = ARG + 1
    out.push("@ARG".into());
    out.push("D=M+1".into());
    out.push("@SP".into());
    out.push("M=D".into());
    for restored in ["THAT", "THIS", "ARG", "LCL"] {
        out.push("@R13".into());
        out.push("AM=M-1".into());
        out.push("D=M".into());
        out.push(format!("@{}", restored));
        out.push("M=D".into());
    }
    // Jump to RAM[FRAME-5]; R13 has walked down to FRAME-4 by now
    out.push("@R13".into());
    out.push("A=M-1".into());
    out.push("A=M".into());
    out.push("0;JMP".into());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::ProgramFlow;
    use crate::parser::Parser;

    fn commands(module: &str, lines: &[&str]) -> Vec<Command> {
        Parser::new(module).parse_lines(lines).unwrap()
    }

    /// A translator with the bootstrap already consumed, for tests that
    /// look at a single module's block.
    fn warm_translator() -> Translator {
        let mut translator = Translator::new();
        translator.translate(&[]).unwrap();
        translator
    }

    #[test]
    fn emits_the_stack_primitives() {
        let asm = warm_translator()
            .translate(&commands("Main", &["push constant 7", "push constant 8", "add"]))
            .unwrap();

        insta::assert_snapshot!(asm.trim_end(), @r###"
        // push constant 7
        @7
        D=A
        @SP
        A=M
        M=D
        @SP
        M=M+1
        // push constant 8
        @8
        D=A
        @SP
        A=M
        M=D
        @SP
        M=M+1
        // add
        @SP
        AM=M-1
        D=M
        A=A-1
        M=M+D
        "###);
    }

    #[test]
    fn emits_the_bootstrap_preamble() {
        let asm = Translator::new().translate(&[]).unwrap();

        insta::assert_snapshot!(asm.trim_end(), @r###"
        // bootstrap
        @256
        D=A
        @SP
        M=D
        // call Sys.init 0
        @RET_0
        D=A
        @SP
        A=M
        M=D
        @SP
        M=M+1
        @LCL
        D=M
        @SP
        A=M
        M=D
        @SP
        M=M+1
        @ARG
        D=M
        @SP
        A=M
        M=D
        @SP
        M=M+1
        @THIS
        D=M
        @SP
        A=M
        M=D
        @SP
        M=M+1
        @THAT
        D=M
        @SP
        A=M
        M=D
        @SP
        M=M+1
        @SP
        D=M
        @5
        D=D-A
        @ARG
        M=D
        @SP
        D=M
        @LCL
        M=D
        @Sys.init
        0;JMP
        (RET_0)
        "###);
    }

    #[test]
    fn bootstrap_is_emitted_once_and_first() {
        let mut translator = Translator::new();
        let first = translator
            .translate(&commands("One", &["push constant 1"]))
            .unwrap();
        let second = translator
            .translate(&commands("Two", &["push constant 2"]))
            .unwrap();

        assert!(first.starts_with("// bootstrap\n"));
        assert_eq!(first.matches("// bootstrap").count(), 1);
        assert_eq!(second.matches("// bootstrap").count(), 0);
    }

    #[test]
    fn comparisons_never_share_labels() {
        let asm = warm_translator()
            .translate(&commands(
                "Main",
                &[
                    "push constant 1",
                    "push constant 2",
                    "eq",
                    "push constant 3",
                    "eq",
                ],
            ))
            .unwrap();

        let mut labels: Vec<&str> = asm
            .lines()
            .filter(|line| line.starts_with('('))
            .collect();
        assert_eq!(labels.len(), 4);
        labels.sort_unstable();
        labels.dedup();
        assert_eq!(labels.len(), 4, "duplicate branch label generated");
    }

    #[test]
    fn return_labels_continue_the_sequence() {
        let mut translator = Translator::new();
        let asm = translator
            .translate(&commands(
                "Main",
                &["push constant 1", "push constant 2", "lt", "call Main.go 1"],
            ))
            .unwrap();

        // RET_0 went to the bootstrap call; the comparison takes 1, the
        // explicit call takes 2
        assert!(asm.contains("(CMP_TRUE_1)"));
        assert!(asm.contains("(RET_2)"));
    }

    #[test]
    fn scopes_labels_inside_functions() {
        let asm = warm_translator()
            .translate(&commands(
                "Main",
                &["function Main.fib 0", "label LOOP", "goto LOOP"],
            ))
            .unwrap();

        assert!(asm.contains("(Main.fib$LOOP)"));
        assert!(asm.contains("@Main.fib$LOOP"));

        let bare = warm_translator()
            .translate(&[Command::Flow(ProgramFlow {
                op: FlowOp::Label,
                symbol: "START".into(),
                function: None,
            })])
            .unwrap();
        assert!(bare.contains("(START)"));
    }

    #[test]
    fn namespaces_static_cells_by_module() {
        let mut translator = warm_translator();
        let first = translator
            .translate(&commands("One", &["pop static 0", "push static 0"]))
            .unwrap();
        let second = translator
            .translate(&commands("Two", &["pop static 0"]))
            .unwrap();

        assert!(first.contains("@One.0"));
        assert!(!first.contains("@Two.0"));
        assert!(second.contains("@Two.0"));
    }

    #[test]
    fn zero_argument_calls_reserve_a_slot() {
        let with_args = warm_translator()
            .translate(&commands("Main", &["call Main.go 2"]))
            .unwrap();
        // ARG = SP - 2 - 5
        assert!(with_args.contains("@7"));

        let zero_args = warm_translator()
            .translate(&commands("Main", &["call Main.go 0"]))
            .unwrap();
        // Reserved slot counts as one argument
        assert!(zero_args.starts_with("// call Main.go 0\n@SP\nM=M+1\n"));
        assert!(zero_args.contains("@6"));

        // The entry function is exempt even outside the bootstrap
        let entry = warm_translator()
            .translate(&commands("Main", &["call Sys.init 0"]))
            .unwrap();
        assert!(!entry.contains("@SP\nM=M+1\n@RET_1\nD=A\n@SP\nA=M\nM=D"));
        assert!(entry.contains("@5"));
    }

    #[test]
    fn pop_constant_is_a_typed_error() {
        let access = MemoryAccess {
            op: MemoryOp::Pop,
            segment: Segment::Constant,
            index: 3,
            module: "Main".into(),
        };
        let result = warm_translator().translate(&[Command::Memory(access)]);
        assert_eq!(result, Err(CodegenError::PopConstant(3)));
    }

    #[test]
    fn declare_grows_and_zeroes_locals() {
        let asm = warm_translator()
            .translate(&commands("Main", &["function Main.two 2"]))
            .unwrap();

        assert!(asm.contains("(Main.two)"));
        // SP += 2 up front
        assert!(asm.contains("@2\nD=A\n@SP\nM=M+D"));
        // Two push-0 / pop-local pairs follow
        assert_eq!(asm.matches("@0\nD=A").count(), 2);
        assert_eq!(asm.matches("@LCL\nD=M").count(), 2);
    }
}
