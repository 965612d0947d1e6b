use super::ClassPatcher;
use crate::codegen::annotation::{join_annotations, split_annotations};
use crate::codegen::attribute::AttributeInfo;
use crate::codegen::class_node::ClassNode;
use crate::codegen::defs::attribute_names::{RUNTIME_INVISIBLE_ANNOTATIONS, RUNTIME_VISIBLE_ANNOTATIONS};
use crate::common::error::Result;

/// Drops the marker annotation from the class-level annotation attributes
pub struct RemoveAnnotationPatcher<'a> {
    descriptor: &'a str,
}

impl<'a> RemoveAnnotationPatcher<'a> {
    /// `descriptor` is the marker as a field descriptor, `Lio/tolstr/Obfuscate;`
    pub fn new(descriptor: &'a str) -> Self {
        Self { descriptor }
    }
}

impl ClassPatcher for RemoveAnnotationPatcher<'_> {
    fn patch(&mut self, class: &mut ClassNode) -> Result<bool> {
        let class_file = &mut class.class;
        let pool = &class_file.constant_pool;
        let mut changed = false;
        let mut attributes = Vec::with_capacity(class_file.attributes.len());
        for attribute in class_file.attributes.drain(..) {
            if !attribute.is_named(pool, RUNTIME_VISIBLE_ANNOTATIONS)
                && !attribute.is_named(pool, RUNTIME_INVISIBLE_ANNOTATIONS)
            {
                attributes.push(attribute);
                continue;
            }
            let stripped = {
                let annotations = split_annotations(&attribute.info)?;
                let mut kept = Vec::with_capacity(annotations.len());
                for annotation in &annotations {
                    if pool.utf8_bytes(annotation.type_index)? != self.descriptor.as_bytes() {
                        kept.push(*annotation);
                    }
                }
                if kept.len() == annotations.len() {
                    None
                } else {
                    Some((!kept.is_empty()).then(|| join_annotations(&kept)))
                }
            };
            match stripped {
                None => attributes.push(attribute),
                Some(info) => {
                    changed = true;
                    if let Some(info) = info {
                        attributes.push(AttributeInfo::new(attribute.name_index, info));
                    }
                }
            }
        }
        class_file.attributes = attributes;
        Ok(changed)
    }
}
