//! Common definitions shared across modules
//!
//! Error types and the class metadata view over inputs and classpath.

pub mod classpath;
pub mod error;

pub use classpath::{ClassHierarchy, ClassMetadataProvider, ClassMirror, ClassRegistry};
pub use error::{Error, Result};
