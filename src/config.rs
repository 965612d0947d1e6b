//! Pipeline configuration

use std::path::PathBuf;

use crate::common::error::{Error, Result};
use crate::consts::{DEFAULT_ANNOTATION, PROJECT_NAME_ENV, SEED_ENV};

/// Where the obfuscation seed of a run comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Seed {
    /// Drawn from the thread RNG for every run
    #[default]
    Random,
    Fixed(i32),
    /// Derived from the newest modification time of the inputs
    FromInputs,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// When disabled every input is copied to its output unchanged
    pub enabled: bool,
    pub seed: Seed,
    /// Suffix that keeps decoders of separately processed projects apart
    pub project_name: String,
    /// Scan and patch subproject inputs instead of copying them
    pub include_subprojects: bool,
    /// Internal name of the marker annotation
    pub annotation: String,
    /// Directory receiving the decoder class; the first output when unset
    pub decoder_output: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            enabled: true,
            seed: Seed::Random,
            project_name: String::new(),
            include_subprojects: false,
            annotation: DEFAULT_ANNOTATION.to_string(),
            decoder_output: None,
        }
    }
}

impl Config {
    pub fn with_seed(mut self, seed: Seed) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_project_name(mut self, project_name: impl Into<String>) -> Self {
        self.project_name = project_name.into();
        self
    }

    pub fn with_annotation(mut self, annotation: impl Into<String>) -> Self {
        self.annotation = annotation.into();
        self
    }

    /// Fills the seed and project name from `TOLSTR_SEED` and
    /// `TOLSTR_PROJECT_NAME` when they were not set explicitly.
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides_from(|name| std::env::var(name).ok())
    }

    fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if self.seed == Seed::Random {
            if let Some(value) = lookup(SEED_ENV) {
                let seed = value
                    .trim()
                    .parse::<i32>()
                    .map_err(|_| Error::config_error(format!("{} is not a 32-bit integer: {}", SEED_ENV, value)))?;
                self.seed = Seed::Fixed(seed);
            }
        }
        if self.project_name.is_empty() {
            if let Some(value) = lookup(PROJECT_NAME_ENV) {
                self.project_name = value;
            }
        }
        Ok(self)
    }

    /// Internal name of the annotation as a field descriptor
    pub fn annotation_descriptor(&self) -> String {
        format!("L{};", self.annotation)
    }
}
