use std::fmt::Display;

use strum::EnumString;

/// Arithmetic and logic operations on the top one or two stack cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum ArithmeticOp {
    Add,
    Sub,
    Neg,
    Eq,
    Gt,
    Lt,
    And,
    Or,
    Not,
}

impl ArithmeticOp {
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Sub => "sub",
            Self::Neg => "neg",
            Self::Eq => "eq",
            Self::Gt => "gt",
            Self::Lt => "lt",
            Self::And => "and",
            Self::Or => "or",
            Self::Not => "not",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryOp {
    Push,
    Pop,
}

/// The eight named address spaces a memory command may reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Segment {
    Argument,
    Local,
    Static,
    Constant,
    This,
    That,
    Pointer,
    Temp,
}

impl Segment {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Argument => "argument",
            Self::Local => "local",
            Self::Static => "static",
            Self::Constant => "constant",
            Self::This => "this",
            Self::That => "that",
            Self::Pointer => "pointer",
            Self::Temp => "temp",
        }
    }
}

/// One push or pop. The module name namespaces the backing cell when the
/// segment is `static`; it is carried on every access so the command stays
/// self-contained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryAccess {
    pub op: MemoryOp,
    pub segment: Segment,
    pub index: u16,
    pub module: String,
}

impl MemoryAccess {
    /// The assembly symbol backing `static index` for this module. The same
    /// index in one module always aliases; across modules it never does.
    pub fn static_symbol(&self) -> String {
        format!("{}.{}", self.module, self.index)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowOp {
    Label,
    Goto,
    IfGoto,
}

/// A label declaration or jump. `function` is the enclosing function at the
/// point the command appeared, used to scope the symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramFlow {
    pub op: FlowOp,
    pub symbol: String,
    pub function: Option<String>,
}

impl ProgramFlow {
    /// The symbol as it appears in generated code: `fn$symbol` inside a
    /// function body, the bare symbol outside any function.
    pub fn scoped_symbol(&self) -> String {
        match &self.function {
            Some(function) => format!("{}${}", function, self.symbol),
            None => self.symbol.clone(),
        }
    }
}

/// Function operations. The variant shapes carry exactly the fields that
/// are meaningful: a declaration knows its local count, an invocation its
/// argument count, and a return knows neither.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FunctionOp {
    Declare { name: String, locals: u16 },
    Invoke { name: String, args: u16 },
    Return,
}

/// One decoded source instruction, closed over the four command families.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Arithmetic(ArithmeticOp),
    Memory(MemoryAccess),
    Flow(ProgramFlow),
    Function(FunctionOp),
}

impl Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Arithmetic(op) => f.write_str(op.mnemonic()),
            Command::Memory(access) => {
                let op = match access.op {
                    MemoryOp::Push => "push",
                    MemoryOp::Pop => "pop",
                };
                write!(f, "{} {} {}", op, access.segment.name(), access.index)
            }
            Command::Flow(flow) => {
                let op = match flow.op {
                    FlowOp::Label => "label",
                    FlowOp::Goto => "goto",
                    FlowOp::IfGoto => "if-goto",
                };
                write!(f, "{} {}", op, flow.symbol)
            }
            Command::Function(op) => match op {
                FunctionOp::Declare { name, locals } => write!(f, "function {} {}", name, locals),
                FunctionOp::Invoke { name, args } => write!(f, "call {} {}", name, args),
                FunctionOp::Return => f.write_str("return"),
            },
        }
    }
}
