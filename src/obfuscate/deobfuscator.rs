//! Identity of the generated decoder class

use crate::consts::{DECODER_BASE_NAME, DECODER_METHOD_DESCRIPTOR, DECODER_METHOD_NAME};

/// The decoder type and the static method patched code calls into
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deobfuscator {
    pub type_name: String,
    pub method_name: &'static str,
    pub method_descriptor: &'static str,
}

impl Deobfuscator {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            method_name: DECODER_METHOD_NAME,
            method_descriptor: DECODER_METHOD_DESCRIPTOR,
        }
    }

    pub fn for_project(project_name: &str) -> Self {
        Self::new(decoder_name(project_name))
    }
}

/// Internal name of the decoder for a project.
///
/// Project paths such as `:app:feature` use `:` as separator; it becomes `$`.
/// Anything but letters, digits, `_` and `$` is dropped, and the result is
/// joined to the base name with a `$`.
pub fn decoder_name(project_name: &str) -> String {
    let suffix: String = project_name
        .chars()
        .map(|c| if c == ':' { '$' } else { c })
        .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '$')
        .collect();
    if suffix.is_empty() || suffix.starts_with('$') {
        format!("{}{}", DECODER_BASE_NAME, suffix)
    } else {
        format!("{}${}", DECODER_BASE_NAME, suffix)
    }
}
