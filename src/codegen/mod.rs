//! Classfile model for reading, editing and writing JVM classes
//!
//! [`class::ClassFile`] is the parsed form of a `.class` file; method bodies
//! are lifted into [`code::MethodBody`] through [`class_node::ClassNode`],
//! which recomputes `StackMapTable` frames when a class is written back.

pub mod annotation;
pub mod attribute;
pub mod class;
pub mod class_node;
pub mod code;
pub mod constpool;
pub mod defs;
pub mod descriptor;
pub mod error;
pub mod field;
pub mod frame;
pub mod method;
pub mod mutf8;
pub mod opcodes;
pub mod reader;
pub mod refs;
pub mod stackmap;
pub mod writer;

pub use class::ClassFile;
pub use class_node::ClassNode;
pub use constpool::{Constant, ConstantPool};
pub use error::{BytecodeError, ConstPoolError};
pub use writer::ClassfileWritable;
