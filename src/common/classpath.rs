//! Class metadata lookup across inputs, classpath and boot classpath
//!
//! Lookups follow classpath order: the first source holding a class wins, the
//! way a class loader would resolve it. Mirrors and common superclasses are
//! cached for the lifetime of the registry.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::codegen::annotation::annotation_types;
use crate::codegen::class::ClassFile;
use crate::codegen::defs::{access_flags, attribute_names, OBJECT_CLASS};
use crate::codegen::reader::ByteReader;
use crate::common::error::Result;
use crate::consts::HIERARCHY_MAX_DEPTH;
use crate::io::{EntryType, FileSource};

/// Metadata of one field, enough to find compile-time string constants
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMirror {
    pub access: u16,
    pub name: String,
    pub descriptor: String,
    /// Value of a `ConstantValue` attribute that points at a String constant
    pub constant_string: Option<Vec<u16>>,
}

impl FieldMirror {
    pub fn is_static(&self) -> bool {
        self.access & access_flags::ACC_STATIC != 0
    }

    pub fn is_final(&self) -> bool {
        self.access & access_flags::ACC_FINAL != 0
    }
}

/// Class-level metadata read from a classfile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassMirror {
    pub name: String,
    pub access: u16,
    pub super_name: Option<String>,
    pub interfaces: Vec<String>,
    /// Descriptors of the visible and invisible class annotations
    pub annotations: Vec<String>,
    pub enclosing_type: Option<String>,
    pub fields: Vec<FieldMirror>,
}

impl ClassMirror {
    pub fn from_class(class: &ClassFile) -> Result<Self> {
        let pool = &class.constant_pool;
        let name = class.name()?;

        let mut annotations = Vec::new();
        for attribute_name in [
            attribute_names::RUNTIME_VISIBLE_ANNOTATIONS,
            attribute_names::RUNTIME_INVISIBLE_ANNOTATIONS,
        ] {
            if let Some(attribute) = class.find_attribute(attribute_name) {
                annotations.extend(annotation_types(pool, &attribute.info)?);
            }
        }

        let mut enclosing_type = None;
        if let Some(attribute) = class.find_attribute(attribute_names::INNER_CLASSES) {
            let mut reader = ByteReader::new(&attribute.info);
            for _ in 0..reader.read_u16()? {
                let inner = reader.read_u16()?;
                let outer = reader.read_u16()?;
                reader.skip(4)?;
                if outer != 0 && pool.class_name(inner)? == name {
                    enclosing_type = Some(pool.class_name(outer)?);
                    break;
                }
            }
        }
        if enclosing_type.is_none() {
            if let Some(attribute) = class.find_attribute(attribute_names::ENCLOSING_METHOD) {
                let index = ByteReader::new(&attribute.info).read_u16()?;
                enclosing_type = Some(pool.class_name(index)?);
            }
        }

        let mut fields = Vec::with_capacity(class.fields.len());
        for field in &class.fields {
            let constant_string = match field.constant_value_index(pool)? {
                Some(index) => pool.string_units(index)?,
                None => None,
            };
            fields.push(FieldMirror {
                access: field.access_flags,
                name: field.name(pool)?,
                descriptor: field.descriptor(pool)?,
                constant_string,
            });
        }

        Ok(Self {
            name,
            access: class.access_flags,
            super_name: class.super_name()?,
            interfaces: class.interface_names()?,
            annotations,
            enclosing_type,
            fields,
        })
    }

    pub fn is_interface(&self) -> bool {
        self.access & access_flags::ACC_INTERFACE != 0
    }
}

/// Read access to class metadata by internal name
pub trait ClassMetadataProvider {
    /// The mirror of a class, or `None` when it cannot be found or read
    fn mirror(&self, name: &str) -> Option<Rc<ClassMirror>>;
}

/// Resolution of the nearest common superclass of two classes
pub trait ClassHierarchy {
    fn common_super_class(&self, first: &str, second: &str) -> String;
}

/// Class metadata over an ordered list of sources
pub struct ClassRegistry {
    sources: Vec<Rc<dyn FileSource>>,
    /// Class name to the source holding it and the entry path there
    locations: RefCell<Option<HashMap<String, (usize, String)>>>,
    mirrors: RefCell<HashMap<String, Option<Rc<ClassMirror>>>>,
    common_supers: RefCell<HashMap<(String, String), String>>,
}

impl ClassRegistry {
    pub fn new(sources: Vec<Rc<dyn FileSource>>) -> Self {
        Self {
            sources,
            locations: RefCell::new(None),
            mirrors: RefCell::new(HashMap::new()),
            common_supers: RefCell::new(HashMap::new()),
        }
    }

    /// Source and entry path of each class, built on first use
    fn location(&self, name: &str) -> Result<Option<(usize, String)>> {
        let mut locations = self.locations.borrow_mut();
        if locations.is_none() {
            let mut index = HashMap::new();
            for (position, source) in self.sources.iter().enumerate() {
                for entry in source.entries()? {
                    if entry.kind != EntryType::Class || entry.path.starts_with("META-INF/") {
                        continue;
                    }
                    if let Some(class_name) = entry.class_name() {
                        index.entry(class_name.to_string()).or_insert_with(|| (position, entry.path.clone()));
                    }
                }
            }
            log::debug!("Indexed {} classes from {} sources", index.len(), self.sources.len());
            *locations = Some(index);
        }
        Ok(locations.as_ref().and_then(|index| index.get(name).cloned()))
    }

    fn read_mirror(&self, name: &str) -> Result<Option<ClassMirror>> {
        let (position, path) = match self.location(name)? {
            Some(location) => location,
            None => return Ok(None),
        };
        let bytes = self.sources[position].read_file(&path)?;
        let class = ClassFile::from_bytes(&bytes)?;
        ClassMirror::from_class(&class).map(Some)
    }

    /// Superclass chain starting at `name` itself, including names that cannot be resolved
    fn super_chain(&self, name: &str) -> Vec<String> {
        let mut chain = vec![name.to_string()];
        let mut current = self.mirror(name);
        while let Some(mirror) = current {
            if chain.len() > HIERARCHY_MAX_DEPTH {
                break;
            }
            match &mirror.super_name {
                Some(super_name) => {
                    chain.push(super_name.clone());
                    current = self.mirror(super_name);
                }
                None => break,
            }
        }
        chain
    }

    fn resolve_common_super_class(&self, first: &str, second: &str) -> String {
        let first_mirror = self.mirror(first);
        let second_mirror = self.mirror(second);
        if first_mirror.as_ref().map_or(false, |mirror| mirror.is_interface())
            || second_mirror.as_ref().map_or(false, |mirror| mirror.is_interface())
        {
            return OBJECT_CLASS.to_string();
        }
        let second_chain = self.super_chain(second);
        for candidate in self.super_chain(first) {
            if second_chain.contains(&candidate) {
                return candidate;
            }
        }
        log::warn!(
            "Cannot find a common superclass of {} and {}, using {}",
            first,
            second,
            OBJECT_CLASS
        );
        OBJECT_CLASS.to_string()
    }
}

impl ClassMetadataProvider for ClassRegistry {
    fn mirror(&self, name: &str) -> Option<Rc<ClassMirror>> {
        if let Some(cached) = self.mirrors.borrow().get(name) {
            return cached.clone();
        }
        let mirror = match self.read_mirror(name) {
            Ok(mirror) => mirror.map(Rc::new),
            Err(error) => {
                log::warn!("Cannot read class {}: {}", name, error);
                None
            }
        };
        self.mirrors.borrow_mut().insert(name.to_string(), mirror.clone());
        mirror
    }
}

impl ClassHierarchy for ClassRegistry {
    fn common_super_class(&self, first: &str, second: &str) -> String {
        if first == second {
            return first.to_string();
        }
        if first == OBJECT_CLASS || second == OBJECT_CLASS {
            return OBJECT_CLASS.to_string();
        }
        let key = (first.to_string(), second.to_string());
        if let Some(cached) = self.common_supers.borrow().get(&key) {
            return cached.clone();
        }
        let result = self.resolve_common_super_class(first, second);
        log::debug!("Common superclass of {} and {} is {}", first, second, result);
        self.common_supers.borrow_mut().insert(key, result.clone());
        result
    }
}
