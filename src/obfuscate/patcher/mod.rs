//! Per-class rewriting stages and the pipeline that runs them.
//!
//! Stages run in a fixed order over one [`ClassNode`]: constant fields are
//! moved into `<clinit>` first, so the literal loads they add are hidden by
//! the literal stage like any other. The marker annotation goes last.

mod annotation;
mod constants;
mod literals;

pub use annotation::RemoveAnnotationPatcher;
pub use constants::StringConstantsPatcher;
pub use literals::StringLiteralsPatcher;

use super::analyzer::{AnalysisResult, ClassConfiguration};
use super::deobfuscator::Deobfuscator;
use super::registry::StringRegistry;
use super::target::ObfuscatedTypeRegistry;
use crate::codegen::class_node::ClassNode;
use crate::common::classpath::ClassHierarchy;
use crate::common::error::Result;

/// One rewriting stage
pub trait ClassPatcher {
    /// Rewrites the class in place and reports whether anything changed
    fn patch(&mut self, class: &mut ClassNode) -> Result<bool>;
}

pub struct Patcher<'a> {
    analysis: &'a AnalysisResult,
    targets: &'a dyn ObfuscatedTypeRegistry,
    strings: &'a mut StringRegistry,
    deobfuscator: &'a Deobfuscator,
    annotation_descriptor: String,
    hierarchy: &'a dyn ClassHierarchy,
}

impl<'a> Patcher<'a> {
    pub fn new(
        analysis: &'a AnalysisResult,
        targets: &'a dyn ObfuscatedTypeRegistry,
        strings: &'a mut StringRegistry,
        deobfuscator: &'a Deobfuscator,
        annotation_descriptor: impl Into<String>,
        hierarchy: &'a dyn ClassHierarchy,
    ) -> Self {
        Self { analysis, targets, strings, deobfuscator, annotation_descriptor: annotation_descriptor.into(), hierarchy }
    }

    /// Whether a class entry goes through the stages at all
    pub fn should_patch(&self, name: &str) -> bool {
        self.analysis.get(name).is_some() || self.targets.should_obfuscate(name)
    }

    /// The rewritten class, or `None` when it is copied unchanged
    pub fn patch_class(&mut self, name: &str, bytes: &[u8]) -> Result<Option<Vec<u8>>> {
        if !self.should_patch(name) {
            return Ok(None);
        }
        let configuration = self.analysis.get(name);
        dump(name, configuration);

        let mut node = ClassNode::from_bytes(bytes)?;
        {
            let mut stages: Vec<Box<dyn ClassPatcher + '_>> = Vec::with_capacity(3);
            if let Some(configuration) = configuration {
                stages.push(Box::new(StringConstantsPatcher::new(configuration)));
            }
            if self.targets.should_obfuscate(name) {
                stages.push(Box::new(StringLiteralsPatcher::new(self.strings, self.deobfuscator)));
            }
            stages.push(Box::new(RemoveAnnotationPatcher::new(&self.annotation_descriptor)));
            for stage in stages.iter_mut() {
                stage.patch(&mut node)?;
            }
        }
        node.to_bytes(self.hierarchy).map(Some)
    }
}

fn dump(name: &str, configuration: Option<&ClassConfiguration>) {
    log::info!("Patching class {}...", name);
    let configuration = match configuration {
        Some(configuration) if !configuration.constant_strings_by_field_name.is_empty() => configuration,
        _ => return,
    };
    log::info!("  Constants:");
    for (field, value) in &configuration.constant_strings_by_field_name {
        log::info!("  - {} = \"{}\"", field, String::from_utf16_lossy(value));
    }
}
