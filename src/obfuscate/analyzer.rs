//! Finds the string constants of in-scope classes.

use std::collections::BTreeMap;
use std::rc::Rc;

use super::target::ObfuscatedTypeRegistry;
use crate::codegen::defs::STRING_DESCRIPTOR;
use crate::common::classpath::ClassMetadataProvider;
use crate::common::error::Result;
use crate::io::{EntryType, FileSource};

/// Compile-time string constants of one class, by field name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassConfiguration {
    pub container: String,
    pub constant_strings_by_field_name: BTreeMap<String, Vec<u16>>,
}

/// In-scope classes that declare at least one string constant
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnalysisResult {
    pub configurations_by_type: BTreeMap<String, ClassConfiguration>,
}

impl AnalysisResult {
    pub fn get(&self, name: &str) -> Option<&ClassConfiguration> {
        self.configurations_by_type.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.configurations_by_type.is_empty()
    }

    pub fn dump(&self) {
        if self.is_empty() {
            log::info!("No classes to obfuscate");
            return;
        }
        log::info!("Classes to obfuscate:");
        for (name, configuration) in &self.configurations_by_type {
            log::info!("  {}:", name);
            for field in configuration.constant_strings_by_field_name.keys() {
                log::info!("    {}", field);
            }
        }
    }
}

pub struct Analyzer<'a> {
    provider: &'a dyn ClassMetadataProvider,
    registry: &'a dyn ObfuscatedTypeRegistry,
}

impl<'a> Analyzer<'a> {
    pub fn new(provider: &'a dyn ClassMetadataProvider, registry: &'a dyn ObfuscatedTypeRegistry) -> Self {
        Self { provider, registry }
    }

    pub fn analyze(&self, inputs: &[Rc<dyn FileSource>]) -> Result<AnalysisResult> {
        let mut result = AnalysisResult::default();
        for input in inputs {
            for entry in input.entries()? {
                if entry.kind != EntryType::Class || entry.path.starts_with("META-INF/") {
                    continue;
                }
                let name = match entry.class_name() {
                    Some(name) => name,
                    None => continue,
                };
                if result.configurations_by_type.contains_key(name) || !self.registry.should_obfuscate(name) {
                    continue;
                }
                if let Some(configuration) = self.configuration(name) {
                    result.configurations_by_type.insert(name.to_string(), configuration);
                }
            }
        }
        Ok(result)
    }

    fn configuration(&self, name: &str) -> Option<ClassConfiguration> {
        let mirror = self.provider.mirror(name)?;
        let constant_strings_by_field_name: BTreeMap<String, Vec<u16>> = mirror
            .fields
            .iter()
            .filter(|field| field.is_static() && field.is_final() && field.descriptor == STRING_DESCRIPTOR)
            .filter_map(|field| Some((field.name.clone(), field.constant_string.clone()?)))
            .collect();
        if constant_strings_by_field_name.is_empty() {
            return None;
        }
        Some(ClassConfiguration { container: name.to_string(), constant_strings_by_field_name })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::attribute::AttributeInfo;
    use crate::codegen::class::ClassFile;
    use crate::codegen::defs::access_flags::{ACC_FINAL, ACC_PUBLIC, ACC_STATIC};
    use crate::codegen::defs::attribute_names;
    use crate::codegen::field::FieldInfo;
    use crate::codegen::writer::ClassfileWritable;
    use crate::common::classpath::ClassRegistry;
    use crate::io::{DirectoryFileSink, DirectoryFileSource, FileSink};
    use crate::obfuscate::target::ObfuscatedTypeRegistryImpl;
    use tempfile::TempDir;

    fn class(name: &str, annotated: bool, fields: &[(&str, u16, &str, Option<&str>)]) -> Vec<u8> {
        let mut class = ClassFile::new();
        let pool = &mut class.constant_pool;
        class.this_class = pool.add_class(name).unwrap();
        class.super_class = pool.add_class("java/lang/Object").unwrap();
        for (field_name, access, descriptor, value) in fields {
            let mut field = FieldInfo::new(*access, pool.add_utf8(field_name).unwrap(), pool.add_utf8(descriptor).unwrap());
            if let Some(value) = value {
                let value_index = pool.add_string(value).unwrap();
                let attribute_name = pool.add_utf8(attribute_names::CONSTANT_VALUE).unwrap();
                field.attributes.push(AttributeInfo::new(attribute_name, value_index.to_be_bytes().to_vec()));
            }
            class.fields.push(field);
        }
        if annotated {
            let type_index = pool.add_utf8("Lio/tolstr/Obfuscate;").unwrap();
            let attribute_name = pool.add_utf8(attribute_names::RUNTIME_INVISIBLE_ANNOTATIONS).unwrap();
            let [high, low] = type_index.to_be_bytes();
            class.attributes.push(AttributeInfo::new(attribute_name, vec![0, 1, high, low, 0, 0]));
        }
        class.to_classfile_bytes()
    }

    #[test]
    fn test_collects_static_final_string_constants_of_annotated_classes() {
        let dir = TempDir::new().unwrap();
        let mut sink = DirectoryFileSink::new(dir.path());
        let constant = ACC_PUBLIC | ACC_STATIC | ACC_FINAL;
        sink.create_file(
            "a/Secrets.class",
            &class(
                "a/Secrets",
                true,
                &[
                    ("KEY", constant, "Ljava/lang/String;", Some("hunter2")),
                    ("URL", constant, "Ljava/lang/String;", Some("https://example.com")),
                    ("mutable", ACC_STATIC, "Ljava/lang/String;", Some("no")),
                    ("computed", constant, "Ljava/lang/String;", None),
                ],
            ),
        )
        .unwrap();
        sink.create_file("a/Plain.class", &class("a/Plain", false, &[("KEY", constant, "Ljava/lang/String;", Some("x"))]))
            .unwrap();
        sink.create_file("a/Empty.class", &class("a/Empty", true, &[])).unwrap();

        let source: Rc<dyn FileSource> = Rc::new(DirectoryFileSource::new(dir.path()));
        let registry = ClassRegistry::new(vec![source.clone()]);
        let targets = ObfuscatedTypeRegistryImpl::new(&registry, "io/tolstr/Obfuscate").cached();
        let result = Analyzer::new(&registry, &targets).analyze(&[source]).unwrap();

        assert_eq!(result.configurations_by_type.len(), 1);
        let configuration = result.get("a/Secrets").unwrap();
        let fields: Vec<_> = configuration.constant_strings_by_field_name.keys().map(String::as_str).collect();
        assert_eq!(fields, vec!["KEY", "URL"]);
        assert_eq!(configuration.constant_strings_by_field_name["KEY"], "hunter2".encode_utf16().collect::<Vec<_>>());
        assert!(result.get("a/Plain").is_none());
        assert!(result.get("a/Empty").is_none());
    }
}
