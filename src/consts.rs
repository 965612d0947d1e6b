// Shared names and caps used across the pipeline

/// Marker annotation that puts a class and its nested classes in scope
pub const DEFAULT_ANNOTATION: &str = "io/tolstr/Obfuscate";

/// Internal name of the generated decoder before the project suffix
pub const DECODER_BASE_NAME: &str = "io/tolstr/Deobfuscator";

/// Name and descriptor of the decoder lookup method
pub const DECODER_METHOD_NAME: &str = "getString";
pub const DECODER_METHOD_DESCRIPTOR: &str = "(J)Ljava/lang/String;";

/// Longest slice of the encoded buffer stored in one decoder constant
pub const MAX_CHUNK_LENGTH: usize = 0x1fff;

// Environment overrides for values not set explicitly
pub const SEED_ENV: &str = "TOLSTR_SEED";
pub const PROJECT_NAME_ENV: &str = "TOLSTR_PROJECT_NAME";

// Superclass chains and enclosing-class walks stop after this many steps
pub const HIERARCHY_MAX_DEPTH: usize = 256;
