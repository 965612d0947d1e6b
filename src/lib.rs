//! Tolstr: build-time string obfuscation for JVM bytecode
//!
//! Classes carrying the marker annotation (by default `io.tolstr.Obfuscate`,
//! inherited through enclosing classes) have their string literals replaced
//! by calls into a generated decoder class that rebuilds each string from
//! an encrypted table at run time.
//!
//! ## Architecture
//!
//! - **io**: directory and jar sources and sinks
//! - **codegen**: classfile parsing, editing, frame computation and writing
//! - **obfuscate**: scope decisions, constant analysis, the string codec,
//!   class patching and decoder generation
//! - **processor**: the driver tying inputs, outputs and classpath together
//! - **bin**: command-line interface
//!
//! ## Processing Flow
//!
//! ```text
//! inputs → Analyzer → Patcher → outputs
//!                        ↓
//!                 StringRegistry → DeobfuscatorGenerator → decoder class
//! ```

pub mod codegen;
pub mod common;
pub mod config;
pub mod consts;
pub mod io;
pub mod obfuscate;
pub mod processor;

pub use common::error::{Error, Result};
pub use config::{Config, Seed};
pub use processor::{ProcessReport, Processor};
