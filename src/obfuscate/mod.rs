//! String hiding: scope decisions, analysis, the string codec, class
//! patching and the generated decoder.

pub mod analyzer;
pub mod deobfuscator;
pub mod generator;
pub mod patcher;
pub mod random;
pub mod registry;
pub mod target;

pub use analyzer::{AnalysisResult, Analyzer, ClassConfiguration};
pub use deobfuscator::{decoder_name, Deobfuscator};
pub use generator::DeobfuscatorGenerator;
pub use patcher::{ClassPatcher, Patcher};
pub use registry::StringRegistry;
pub use target::{CachedObfuscatedTypeRegistry, ObfuscatedTypeRegistry, ObfuscatedTypeRegistryImpl};
