use std::str::FromStr;

use strum_macros::EnumString;
use thiserror::Error;

use crate::command::{
    ArithmeticOp, Command, FlowOp, FunctionOp, MemoryAccess, MemoryOp, ProgramFlow, Segment,
};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("empty line")]
    EmptyLine,
    #[error("unexpected keyword: {0}")]
    UnexpectedKeyword(String),
    #[error("unexpected command: {0}")]
    UnexpectedCommand(String),
    #[error("incomplete memory command: {0}")]
    IncompleteMemoryCommand(String),
    #[error("unexpected memory segment: {0}")]
    UnexpectedMemorySegment(String),
    #[error("unexpected memory index: {0}")]
    UnexpectedMemoryIndex(String),
    #[error("incomplete program flow command: {0}")]
    IncompleteProgramFlowCommand(String),
    #[error("incomplete function command: {0}")]
    IncompleteFunctionCommand(String),
    #[error("unexpected function count: {0}")]
    UnexpectedFunctionCount(String),
}

/// Every token that may start a line, plus the segment names so that a
/// segment in command position is diagnosed as a misplaced command rather
/// than an unknown word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString)]
#[strum(serialize_all = "kebab-case")]
enum Keyword {
    Push,
    Pop,
    Argument,
    Local,
    Static,
    Constant,
    This,
    That,
    Pointer,
    Temp,
    Add,
    Sub,
    Neg,
    Eq,
    Gt,
    Lt,
    And,
    Or,
    Not,
    Label,
    Goto,
    IfGoto,
    Function,
    Call,
    Return,
}

/// Turns preprocessed source lines of one module into commands, one per
/// line. The parser tracks the enclosing function so program-flow symbols
/// can be scoped later; nothing else carries over between lines.
pub struct Parser {
    module: String,
    current_function: Option<String>,
}

impl Parser {
    pub fn new(module: &str) -> Self {
        Self {
            module: module.to_owned(),
            current_function: None,
        }
    }

    /// Parse a whole module, failing on the first malformed line.
    pub fn parse_lines<S: AsRef<str>>(&mut self, lines: &[S]) -> Result<Vec<Command>, ParseError> {
        lines
            .iter()
            .map(|line| self.parse_line(line.as_ref()))
            .collect()
    }

    /// Parse one comment-stripped, trimmed, non-blank line.
    pub fn parse_line(&mut self, line: &str) -> Result<Command, ParseError> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let Some(&first) = tokens.first() else {
            return Err(ParseError::EmptyLine);
        };
        let keyword = Keyword::from_str(first)
            .map_err(|_| ParseError::UnexpectedKeyword(first.to_owned()))?;

        match keyword {
            Keyword::Push | Keyword::Pop => self.memory_access(keyword, &tokens),

            Keyword::Add
            | Keyword::Sub
            | Keyword::Neg
            | Keyword::Eq
            | Keyword::Gt
            | Keyword::Lt
            | Keyword::And
            | Keyword::Or
            | Keyword::Not => {
                Self::expect_arity(&tokens, 1)?;
                let op = ArithmeticOp::from_str(first)
                    .map_err(|_| ParseError::UnexpectedKeyword(first.to_owned()))?;
                Ok(Command::Arithmetic(op))
            }

            Keyword::Label | Keyword::Goto | Keyword::IfGoto => {
                if tokens.len() < 2 {
                    return Err(ParseError::IncompleteProgramFlowCommand(line.to_owned()));
                }
                Self::expect_arity(&tokens, 2)?;
                let op = match keyword {
                    Keyword::Label => FlowOp::Label,
                    Keyword::Goto => FlowOp::Goto,
                    _ => FlowOp::IfGoto,
                };
                Ok(Command::Flow(ProgramFlow {
                    op,
                    symbol: tokens[1].to_owned(),
                    function: self.current_function.clone(),
                }))
            }

            Keyword::Function | Keyword::Call => {
                if tokens.len() < 3 {
                    return Err(ParseError::IncompleteFunctionCommand(line.to_owned()));
                }
                Self::expect_arity(&tokens, 3)?;
                let name = tokens[1].to_owned();
                let count: u16 = tokens[2]
                    .parse()
                    .map_err(|_| ParseError::UnexpectedFunctionCount(tokens[2].to_owned()))?;
                let op = if keyword == Keyword::Function {
                    self.current_function = Some(name.clone());
                    FunctionOp::Declare {
                        name,
                        locals: count,
                    }
                } else {
                    FunctionOp::Invoke { name, args: count }
                };
                Ok(Command::Function(op))
            }

            Keyword::Return => {
                Self::expect_arity(&tokens, 1)?;
                Ok(Command::Function(FunctionOp::Return))
            }

            // A segment name in command position
            _ => Err(ParseError::UnexpectedCommand(first.to_owned())),
        }
    }

    fn memory_access(&self, keyword: Keyword, tokens: &[&str]) -> Result<Command, ParseError> {
        if tokens.len() < 3 {
            return Err(ParseError::IncompleteMemoryCommand(tokens.join(" ")));
        }
        Self::expect_arity(tokens, 3)?;

        let op = if keyword == Keyword::Push {
            MemoryOp::Push
        } else {
            MemoryOp::Pop
        };
        let segment = Segment::from_str(tokens[1])
            .map_err(|_| ParseError::UnexpectedMemorySegment(tokens[1].to_owned()))?;
        if op == MemoryOp::Pop && segment == Segment::Constant {
            // Constants have no backing cell to pop into
            return Err(ParseError::UnexpectedMemorySegment(tokens[1].to_owned()));
        }
        let index: u16 = tokens[2]
            .parse()
            .map_err(|_| ParseError::UnexpectedMemoryIndex(tokens[2].to_owned()))?;

        Ok(Command::Memory(MemoryAccess {
            op,
            segment,
            index,
            module: self.module.clone(),
        }))
    }

    fn expect_arity(tokens: &[&str], arity: usize) -> Result<(), ParseError> {
        if tokens.len() == arity {
            Ok(())
        } else {
            Err(ParseError::UnexpectedCommand(tokens.join(" ")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_one(line: &str) -> Result<Command, ParseError> {
        Parser::new("Test").parse_line(line)
    }

    #[test]
    fn round_trips_canonical_lines() {
        let lines = [
            "push constant 7",
            "pop local 2",
            "push static 0",
            "push pointer 1",
            "pop temp 3",
            "add",
            "sub",
            "neg",
            "eq",
            "gt",
            "lt",
            "and",
            "or",
            "not",
            "label LOOP",
            "goto LOOP",
            "if-goto LOOP",
            "function Main.fib 2",
            "call Main.fib 1",
            "return",
        ];

        let mut parser = Parser::new("Test");
        for line in lines {
            let command = parser.parse_line(line).unwrap();
            assert_eq!(command.to_string(), line);
        }
    }

    #[test]
    fn normalizes_whitespace_runs() {
        let command = parse_one("push   constant\t42").unwrap();
        assert_eq!(command.to_string(), "push constant 42");
    }

    #[test]
    fn threads_the_enclosing_function() {
        let mut parser = Parser::new("Main");
        let before = parser.parse_line("label TOP").unwrap();
        parser.parse_line("function Main.fib 2").unwrap();
        let inside = parser.parse_line("label LOOP").unwrap();
        let jump = parser.parse_line("goto LOOP").unwrap();

        let Command::Flow(before) = before else {
            panic!("expected flow command");
        };
        assert_eq!(before.scoped_symbol(), "TOP");

        let Command::Flow(inside) = inside else {
            panic!("expected flow command");
        };
        assert_eq!(inside.scoped_symbol(), "Main.fib$LOOP");

        let Command::Flow(jump) = jump else {
            panic!("expected flow command");
        };
        assert_eq!(jump.scoped_symbol(), "Main.fib$LOOP");
    }

    #[test]
    fn stamps_the_module_on_memory_access() {
        let command = Parser::new("Screen").parse_line("pop static 4").unwrap();
        let Command::Memory(access) = command else {
            panic!("expected memory command");
        };
        assert_eq!(access.static_symbol(), "Screen.4");
    }

    #[test]
    fn rejects_malformed_lines() {
        assert_eq!(
            parse_one("push argument"),
            Err(ParseError::IncompleteMemoryCommand("push argument".into()))
        );
        assert_eq!(
            parse_one("zzz 1 2"),
            Err(ParseError::UnexpectedKeyword("zzz".into()))
        );
        assert_eq!(
            parse_one("push constant abc"),
            Err(ParseError::UnexpectedMemoryIndex("abc".into()))
        );
        assert_eq!(
            parse_one("push constant -1"),
            Err(ParseError::UnexpectedMemoryIndex("-1".into()))
        );
        assert_eq!(
            parse_one("pop constant 0"),
            Err(ParseError::UnexpectedMemorySegment("constant".into()))
        );
        assert_eq!(
            parse_one("push register 0"),
            Err(ParseError::UnexpectedMemorySegment("register".into()))
        );
        assert_eq!(
            parse_one("argument 1"),
            Err(ParseError::UnexpectedCommand("argument".into()))
        );
        assert_eq!(parse_one(""), Err(ParseError::EmptyLine));
        assert_eq!(
            parse_one("goto"),
            Err(ParseError::IncompleteProgramFlowCommand("goto".into()))
        );
        assert_eq!(
            parse_one("call Main.fib"),
            Err(ParseError::IncompleteFunctionCommand("call Main.fib".into()))
        );
        assert_eq!(
            parse_one("function Main.fib two"),
            Err(ParseError::UnexpectedFunctionCount("two".into()))
        );
        assert_eq!(
            parse_one("add 1"),
            Err(ParseError::UnexpectedCommand("add 1".into()))
        );
        assert_eq!(
            parse_one("return 0"),
            Err(ParseError::UnexpectedCommand("return 0".into()))
        );
    }

    #[test]
    fn fails_fast_on_the_first_bad_line() {
        let mut parser = Parser::new("Test");
        let result = parser.parse_lines(&["push constant 1", "pop constant 2", "add"]);
        assert_eq!(
            result,
            Err(ParseError::UnexpectedMemorySegment("constant".into()))
        );
    }
}
