//! Structured error types and the shared rendering convention (`spec.md`
//! §4.10, C10).
//!
//! Every error in this crate, and in `seqc`, renders the same way:
//! `"error in <file> at line <n>: <reason>"` followed by the offending
//! source line and a caret. That rendering lives once, on `SeqError`, and
//! `CompileError`/`RuntimeError` both implement `Located` so `seqc` can
//! reuse it without depending on this crate's concrete error enums.
//!
//! Manual `Display`/`std::error::Error` impls, no `thiserror` — grounded on
//! the teacher's `codegen::error::CodeGenError` (`examples/navicore-cem3`),
//! which hand-writes the same pattern for the same reason: a compiler/VM
//! crate's error type is small and stable enough that a derive macro buys
//! little.

use std::fmt;

/// Anything that can report where it happened.
pub trait Located: fmt::Display {
    fn file(&self) -> &str;
    fn line(&self) -> u32;
    fn reason(&self) -> String;
}

/// Render the shared convention: `"error in <file> at line <n>: <reason>"`,
/// plus the source line and a caret when `source_line` is available.
pub fn render_located(err: &impl Located, source_line: Option<&str>) -> String {
    let mut out = format!("error in {} at line {}: {}", err.file(), err.line(), err.reason());
    if let Some(line) = source_line {
        out.push('\n');
        out.push_str(line);
        out.push('\n');
        out.push('^');
    }
    out
}

/// Errors raised while compiling (`seqc`'s resolver/specializer/codegen).
/// Defined here so `seqc` and `seq-runtime` share one rendering rule instead
/// of duplicating it per crate.
#[derive(Debug, Clone)]
pub enum CompileError {
    UnresolvedLocal { file: Box<str>, line: u32, name: Box<str> },
    TooManyConstants { file: Box<str>, line: u32 },
    /// More than 255 locals live in one frame at once — a hard cap `spec.md`
    /// §4.2 names explicitly as a compile-time failure mode.
    LocalSlotOverflow { file: Box<str>, line: u32, name: Box<str> },
    /// A forward jump or loop body exceeds the 2-byte offset a
    /// `Jump`/`JumpIfFalse`/`Loop` operand can encode (`spec.md` §4.2).
    JumpOutOfRange { file: Box<str>, line: u32 },
    InvalidAssignmentTarget { file: Box<str>, line: u32 },
    DuplicateStructField { file: Box<str>, line: u32, name: Box<str> },
    Logic { file: Box<str>, line: u32, message: Box<str> },
}

impl Located for CompileError {
    fn file(&self) -> &str {
        match self {
            CompileError::UnresolvedLocal { file, .. }
            | CompileError::TooManyConstants { file, .. }
            | CompileError::LocalSlotOverflow { file, .. }
            | CompileError::JumpOutOfRange { file, .. }
            | CompileError::InvalidAssignmentTarget { file, .. }
            | CompileError::DuplicateStructField { file, .. }
            | CompileError::Logic { file, .. } => file,
        }
    }

    fn line(&self) -> u32 {
        match self {
            CompileError::UnresolvedLocal { line, .. }
            | CompileError::TooManyConstants { line, .. }
            | CompileError::LocalSlotOverflow { line, .. }
            | CompileError::JumpOutOfRange { line, .. }
            | CompileError::InvalidAssignmentTarget { line, .. }
            | CompileError::DuplicateStructField { line, .. }
            | CompileError::Logic { line, .. } => *line,
        }
    }

    fn reason(&self) -> String {
        match self {
            CompileError::UnresolvedLocal { name, .. } => format!("unresolved identifier '{name}'"),
            CompileError::TooManyConstants { .. } => "too many constants in one chunk".to_string(),
            CompileError::LocalSlotOverflow { name, .. } => {
                format!("too many locals in scope when declaring '{name}' (max 255 per frame)")
            }
            CompileError::JumpOutOfRange { .. } => "jump target out of range".to_string(),
            CompileError::InvalidAssignmentTarget { .. } => "invalid assignment target".to_string(),
            CompileError::DuplicateStructField { name, .. } => format!("duplicate struct field '{name}'"),
            CompileError::Logic { message, .. } => message.to_string(),
        }
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", render_located(self, None))
    }
}

impl std::error::Error for CompileError {}

/// Errors raised by the interpreter at run time (`spec.md` §4.10).
#[derive(Debug, Clone)]
pub enum RuntimeError {
    TypeMismatch { file: Box<str>, line: u32, expected: Box<str>, got: Box<str> },
    UndefinedVariable { file: Box<str>, line: u32, name: Box<str> },
    IndexOutOfBounds { file: Box<str>, line: u32, index: i64, len: usize },
    DivisionByZero { file: Box<str>, line: u32 },
    NotCallable { file: Box<str>, line: u32, type_name: Box<str> },
    ArityMismatch { file: Box<str>, line: u32, expected: u8, got: u8 },
    StackOverflow { file: Box<str>, line: u32 },
    NoSuchField { file: Box<str>, line: u32, name: Box<str> },
    ModuleNotFound { file: Box<str>, line: u32, name: Box<str> },
}

impl Located for RuntimeError {
    fn file(&self) -> &str {
        match self {
            RuntimeError::TypeMismatch { file, .. }
            | RuntimeError::UndefinedVariable { file, .. }
            | RuntimeError::IndexOutOfBounds { file, .. }
            | RuntimeError::DivisionByZero { file, .. }
            | RuntimeError::NotCallable { file, .. }
            | RuntimeError::ArityMismatch { file, .. }
            | RuntimeError::StackOverflow { file, .. }
            | RuntimeError::NoSuchField { file, .. }
            | RuntimeError::ModuleNotFound { file, .. } => file,
        }
    }

    fn line(&self) -> u32 {
        match self {
            RuntimeError::TypeMismatch { line, .. }
            | RuntimeError::UndefinedVariable { line, .. }
            | RuntimeError::IndexOutOfBounds { line, .. }
            | RuntimeError::DivisionByZero { line, .. }
            | RuntimeError::NotCallable { line, .. }
            | RuntimeError::ArityMismatch { line, .. }
            | RuntimeError::StackOverflow { line, .. }
            | RuntimeError::NoSuchField { line, .. }
            | RuntimeError::ModuleNotFound { line, .. } => *line,
        }
    }

    fn reason(&self) -> String {
        match self {
            RuntimeError::TypeMismatch { expected, got, .. } => {
                format!("expected {expected}, got {got}")
            }
            RuntimeError::UndefinedVariable { name, .. } => format!("undefined variable '{name}'"),
            RuntimeError::IndexOutOfBounds { index, len, .. } => {
                format!("index {index} out of bounds for length {len}")
            }
            RuntimeError::DivisionByZero { .. } => "division by zero".to_string(),
            RuntimeError::NotCallable { type_name, .. } => format!("value of type {type_name} is not callable"),
            RuntimeError::ArityMismatch { expected, got, .. } => {
                format!("expected {expected} arguments, got {got}")
            }
            RuntimeError::StackOverflow { .. } => "stack overflow".to_string(),
            RuntimeError::NoSuchField { name, .. } => format!("no such field '{name}'"),
            RuntimeError::ModuleNotFound { name, .. } => format!("module '{name}' not found"),
        }
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", render_located(self, None))
    }
}

impl std::error::Error for RuntimeError {}

/// Top-level error type a `Runtime` call returns: either stage can fail.
#[derive(Debug, Clone)]
pub enum SeqError {
    Compile(CompileError),
    Runtime(RuntimeError),
}

impl fmt::Display for SeqError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SeqError::Compile(e) => write!(f, "{e}"),
            SeqError::Runtime(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for SeqError {}

impl From<CompileError> for SeqError {
    fn from(e: CompileError) -> Self {
        SeqError::Compile(e)
    }
}

impl From<RuntimeError> for SeqError {
    fn from(e: RuntimeError) -> Self {
        SeqError::Runtime(e)
    }
}
