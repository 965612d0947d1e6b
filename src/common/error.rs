use thiserror::Error;

use crate::codegen::error::{BytecodeError, ConstPoolError};

/// Result type for tolstr operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the string obfuscation pipeline
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Constant pool error: {0}")]
    ConstPool(#[from] ConstPoolError),

    #[error("Bytecode error: {0}")]
    Bytecode(#[from] BytecodeError),

    #[error("Invalid class file: {message}")]
    ClassFormat { message: String },

    #[error("Code generation error: {message}")]
    CodeGen { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("String registry error: {message}")]
    String { message: String },

    #[error("Failed to process {name}: {source}")]
    Entry {
        name: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Create an error for malformed classfile data
    pub fn class_format(message: impl Into<String>) -> Self {
        Self::ClassFormat { message: message.into() }
    }

    /// Create a code generation error
    pub fn codegen_error(message: impl Into<String>) -> Self {
        Self::CodeGen { message: message.into() }
    }

    /// Create a configuration error
    pub fn config_error(message: impl Into<String>) -> Self {
        Self::Config { message: message.into() }
    }

    /// Create a string registry error
    pub fn string_error(message: impl Into<String>) -> Self {
        Self::String { message: message.into() }
    }

    /// Attach the class or file being processed to an error
    pub fn in_entry(name: impl Into<String>, source: Error) -> Self {
        Self::Entry { name: name.into(), source: Box::new(source) }
    }
}
