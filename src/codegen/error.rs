//! Specific error types for classfile reading and writing

use thiserror::Error;

/// Errors that can occur during constant pool operations
#[derive(Error, Debug)]
pub enum ConstPoolError {
    #[error("Constant pool is out of space")]
    OutOfSpace,
    #[error("Invalid constant pool index: {0}")]
    InvalidIndex(u16),
    #[error("Unexpected constant at index {index}, expected {expected}")]
    UnexpectedConstant { index: u16, expected: &'static str },
    #[error("Unknown constant pool tag: {0}")]
    UnknownTag(u8),
    #[error("Malformed modified UTF-8 in constant {0}")]
    MalformedUtf8(u16),
}

/// Errors that can occur while decoding, rewriting or encoding method code
#[derive(Error, Debug)]
pub enum BytecodeError {
    #[error("Unknown opcode 0x{opcode:02x} at offset {offset}")]
    UnknownOpcode { opcode: u8, offset: usize },
    #[error("Truncated instruction at offset {0}")]
    Truncated(usize),
    #[error("Branch at offset {offset} targets {target}, which is not an instruction boundary")]
    InvalidBranchTarget { offset: usize, target: i64 },
    #[error("Label {0} is not placed in the method body")]
    UnboundLabel(u32),
    #[error("Method code is too large: {0} bytes")]
    CodeTooLarge(usize),
    #[error("Stack underflow at offset {0}")]
    StackUnderflow(usize),
    #[error("Inconsistent stack height at offset {0}")]
    InconsistentStack(usize),
    #[error("Execution falls off the end of the code at offset {0}")]
    FallsOffEnd(usize),
}
