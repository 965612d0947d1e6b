//! Which classes are in scope for string hiding.
//!
//! A class is in scope when it carries the marker annotation or when its
//! enclosing class is in scope.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::common::classpath::{ClassMetadataProvider, ClassMirror};
use crate::consts::HIERARCHY_MAX_DEPTH;

pub trait ObfuscatedTypeRegistry {
    fn should_obfuscate(&self, name: &str) -> bool;

    /// Memoises the answers of this registry
    fn cached(self) -> CachedObfuscatedTypeRegistry<Self>
    where
        Self: Sized,
    {
        CachedObfuscatedTypeRegistry::new(self)
    }
}

/// Scope decisions read from class metadata
pub struct ObfuscatedTypeRegistryImpl<'a> {
    provider: &'a dyn ClassMetadataProvider,
    annotation_descriptor: String,
}

impl<'a> ObfuscatedTypeRegistryImpl<'a> {
    /// `annotation` is the internal name of the marker annotation
    pub fn new(provider: &'a dyn ClassMetadataProvider, annotation: &str) -> Self {
        Self { provider, annotation_descriptor: format!("L{};", annotation) }
    }

    /// Mirror of `name`, falling back to its outer classes when it cannot be resolved
    fn find_mirror(&self, name: &str) -> Option<Rc<ClassMirror>> {
        let mut current = name;
        for _ in 0..HIERARCHY_MAX_DEPTH {
            if let Some(mirror) = self.provider.mirror(current) {
                return Some(mirror);
            }
            let (outer, _) = current.rsplit_once('$')?;
            if outer.is_empty() {
                return None;
            }
            log::debug!("Cannot resolve {}, trying {}", current, outer);
            current = outer;
        }
        None
    }
}

impl ObfuscatedTypeRegistry for ObfuscatedTypeRegistryImpl<'_> {
    fn should_obfuscate(&self, name: &str) -> bool {
        let mut current = name.to_string();
        for _ in 0..HIERARCHY_MAX_DEPTH {
            let mirror = match self.find_mirror(&current) {
                Some(mirror) => mirror,
                None => return false,
            };
            if mirror.annotations.iter().any(|annotation| *annotation == self.annotation_descriptor) {
                return true;
            }
            match &mirror.enclosing_type {
                Some(enclosing) if *enclosing != mirror.name => current = enclosing.clone(),
                _ => return false,
            }
        }
        log::warn!("Enclosing classes of {} nest too deep, leaving it out of scope", name);
        false
    }
}

pub struct CachedObfuscatedTypeRegistry<R> {
    inner: R,
    decisions: RefCell<HashMap<String, bool>>,
}

impl<R: ObfuscatedTypeRegistry> CachedObfuscatedTypeRegistry<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, decisions: RefCell::new(HashMap::new()) }
    }
}

impl<R: ObfuscatedTypeRegistry> ObfuscatedTypeRegistry for CachedObfuscatedTypeRegistry<R> {
    fn should_obfuscate(&self, name: &str) -> bool {
        if let Some(&decision) = self.decisions.borrow().get(name) {
            return decision;
        }
        let decision = self.inner.should_obfuscate(name);
        self.decisions.borrow_mut().insert(name.to_string(), decision);
        decision
    }
}
