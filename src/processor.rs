//! The driver: analysis, patching and decoder generation over a set of
//! input and output locations.
//!
//! ```text
//! inputs ──► Analyzer ──► Patcher ──► outputs
//!               │            │
//!          ClassRegistry  StringRegistry ──► DeobfuscatorGenerator ──► decoder class
//! ```

use std::path::{Path, PathBuf};
use std::rc::Rc;

use rand::Rng;

use crate::common::classpath::ClassRegistry;
use crate::common::error::{Error, Result};
use crate::config::{Config, Seed};
use crate::io::{self, DirectoryFileSink, Entry, EntryType, FileSink, FileSource};
use crate::obfuscate::analyzer::{AnalysisResult, Analyzer};
use crate::obfuscate::deobfuscator::Deobfuscator;
use crate::obfuscate::generator::DeobfuscatorGenerator;
use crate::obfuscate::patcher::Patcher;
use crate::obfuscate::registry::StringRegistry;
use crate::obfuscate::target::{ObfuscatedTypeRegistry, ObfuscatedTypeRegistryImpl};

/// What one run did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessReport {
    /// `None` when processing was disabled
    pub seed: Option<i32>,
    pub patched_classes: usize,
    pub hidden_strings: usize,
    /// Internal name of the generated decoder
    pub decoder: Option<String>,
}

/// Sources opened for one run, in lookup order
struct Sources {
    inputs: Vec<Rc<dyn FileSource>>,
    subprojects: Vec<Rc<dyn FileSource>>,
    classpath: Vec<Rc<dyn FileSource>>,
}

impl Sources {
    fn all(&self) -> Vec<Rc<dyn FileSource>> {
        self.inputs.iter().chain(&self.subprojects).chain(&self.classpath).cloned().collect()
    }
}

pub struct Processor {
    inputs: Vec<PathBuf>,
    outputs: Vec<PathBuf>,
    subproject_inputs: Vec<PathBuf>,
    subproject_outputs: Vec<PathBuf>,
    classpath: Vec<PathBuf>,
    boot_classpath: Vec<PathBuf>,
    config: Config,
}

impl Processor {
    /// Inputs and outputs pair up by position
    pub fn new(inputs: Vec<PathBuf>, outputs: Vec<PathBuf>, config: Config) -> Self {
        Self {
            inputs,
            outputs,
            subproject_inputs: Vec::new(),
            subproject_outputs: Vec::new(),
            classpath: Vec::new(),
            boot_classpath: Vec::new(),
            config,
        }
    }

    /// Compiled output of nested projects; scanned only with `include_subprojects`
    pub fn with_subprojects(mut self, inputs: Vec<PathBuf>, outputs: Vec<PathBuf>) -> Self {
        self.subproject_inputs = inputs;
        self.subproject_outputs = outputs;
        self
    }

    /// Library locations consulted for type resolution only
    pub fn with_classpath(mut self, classpath: Vec<PathBuf>) -> Self {
        self.classpath = classpath;
        self
    }

    pub fn with_boot_classpath(mut self, boot_classpath: Vec<PathBuf>) -> Self {
        self.boot_classpath = boot_classpath;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn validate(&self) -> Result<()> {
        if self.inputs.len() != self.outputs.len() {
            return Err(Error::config_error(format!(
                "{} inputs but {} outputs",
                self.inputs.len(),
                self.outputs.len()
            )));
        }
        if self.subproject_inputs.len() != self.subproject_outputs.len() {
            return Err(Error::config_error(format!(
                "{} subproject inputs but {} subproject outputs",
                self.subproject_inputs.len(),
                self.subproject_outputs.len()
            )));
        }
        if self.config.enabled && self.outputs.is_empty() && self.config.decoder_output.is_none() {
            return Err(Error::config_error("no output to write the decoder class to"));
        }
        Ok(())
    }

    fn open_sources(&self) -> Result<Sources> {
        let open = |paths: &[PathBuf]| -> Result<Vec<Rc<dyn FileSource>>> {
            paths.iter().map(|path| io::create_source(path)).collect()
        };
        let mut classpath = open(&self.classpath)?;
        classpath.extend(open(&self.boot_classpath)?);
        Ok(Sources { inputs: open(&self.inputs)?, subprojects: open(&self.subproject_inputs)?, classpath })
    }

    /// Inputs whose classes are analyzed and patched
    fn scanned(&self, sources: &Sources) -> Vec<Rc<dyn FileSource>> {
        let mut scanned = sources.inputs.clone();
        if self.config.include_subprojects {
            scanned.extend(sources.subprojects.iter().cloned());
        }
        scanned
    }

    /// Analyzes the inputs without writing anything; outputs are not consulted
    pub fn analyze(&self) -> Result<AnalysisResult> {
        let sources = self.open_sources()?;
        let registry = ClassRegistry::new(sources.all());
        let targets = ObfuscatedTypeRegistryImpl::new(&registry, &self.config.annotation).cached();
        let result = Analyzer::new(&registry, &targets).analyze(&self.scanned(&sources))?;
        result.dump();
        Ok(result)
    }

    pub fn process(&self) -> Result<ProcessReport> {
        self.validate()?;
        if !self.config.enabled {
            log::info!("String obfuscation is disabled, copying inputs");
            self.copy_all()?;
            return Ok(ProcessReport { seed: None, patched_classes: 0, hidden_strings: 0, decoder: None });
        }

        let sources = self.open_sources()?;
        let registry = ClassRegistry::new(sources.all());
        let targets = ObfuscatedTypeRegistryImpl::new(&registry, &self.config.annotation).cached();
        let analysis = Analyzer::new(&registry, &targets).analyze(&self.scanned(&sources))?;
        analysis.dump();

        let seed = self.resolve_seed(&sources)?;
        log::debug!("Obfuscation seed is {}", seed);
        let deobfuscator = Deobfuscator::for_project(&self.config.project_name);
        let mut strings = StringRegistry::new(seed);

        let mut sinks = Vec::with_capacity(self.outputs.len() + self.subproject_outputs.len());
        let result = self.patch_all(&sources, &analysis, &targets, &registry, &deobfuscator, &mut strings, &mut sinks);
        let result = result.and_then(|patched_classes| {
            log::info!("Generating {} with {} strings", deobfuscator.type_name, strings.count());
            let decoder = DeobfuscatorGenerator::new(&deobfuscator, &strings, &registry).generate()?;
            self.write_decoder(&deobfuscator, &decoder, &mut sinks)?;
            Ok(patched_classes)
        });
        let patched_classes = finish(sinks, result)?;

        Ok(ProcessReport {
            seed: Some(seed),
            patched_classes,
            hidden_strings: strings.count(),
            decoder: Some(deobfuscator.type_name),
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn patch_all(
        &self,
        sources: &Sources,
        analysis: &AnalysisResult,
        targets: &dyn ObfuscatedTypeRegistry,
        registry: &ClassRegistry,
        deobfuscator: &Deobfuscator,
        strings: &mut StringRegistry,
        sinks: &mut Vec<Box<dyn FileSink>>,
    ) -> Result<usize> {
        let descriptor = self.config.annotation_descriptor();
        let mut patcher = Patcher::new(analysis, targets, strings, deobfuscator, descriptor, registry);
        let mut patched = 0;
        for ((source, input), output) in sources.inputs.iter().zip(&self.inputs).zip(&self.outputs) {
            let mut sink = io::create_sink(input, output)?;
            let result = copy_entries(source.as_ref(), sink.as_mut(), Some(&mut patcher));
            sinks.push(sink);
            patched += result?;
        }
        let subprojects = sources.subprojects.iter().zip(&self.subproject_inputs).zip(&self.subproject_outputs);
        for ((source, input), output) in subprojects {
            let mut sink = io::create_sink(input, output)?;
            let subproject_patcher = if self.config.include_subprojects { Some(&mut patcher) } else { None };
            let result = copy_entries(source.as_ref(), sink.as_mut(), subproject_patcher);
            sinks.push(sink);
            patched += result?;
        }
        Ok(patched)
    }

    fn write_decoder(&self, deobfuscator: &Deobfuscator, bytes: &[u8], sinks: &mut [Box<dyn FileSink>]) -> Result<()> {
        let path = format!("{}.class", deobfuscator.type_name);
        let written = match &self.config.decoder_output {
            Some(directory) => {
                let mut sink = DirectoryFileSink::new(directory);
                let result = sink.create_file(&path, bytes).and_then(|_| sink.flush());
                sink.close();
                result
            }
            None => match sinks.first_mut() {
                Some(sink) => sink.create_file(&path, bytes),
                None => Err(Error::config_error("no output to write the decoder class to")),
            },
        };
        written.map_err(|e| Error::in_entry(path, e))
    }

    fn resolve_seed(&self, sources: &Sources) -> Result<i32> {
        match self.config.seed {
            Seed::Fixed(seed) => Ok(seed),
            Seed::Random => Ok(rand::thread_rng().gen()),
            Seed::FromInputs => {
                let mut newest: Option<i64> = None;
                for source in sources.inputs.iter().chain(&sources.subprojects) {
                    if let Some(modified) = source.last_modified()? {
                        newest = Some(newest.map_or(modified, |newest| newest.max(modified)));
                    }
                }
                Ok(newest.map_or(0, fold_timestamp))
            }
        }
    }

    fn copy_all(&self) -> Result<()> {
        let pairs = self.inputs.iter().zip(&self.outputs).chain(self.subproject_inputs.iter().zip(&self.subproject_outputs));
        let mut sinks = Vec::new();
        let mut result = Ok(0);
        for (input, output) in pairs {
            result = copy_location(input, output, &mut sinks);
            if result.is_err() {
                break;
            }
        }
        finish(sinks, result).map(|_| ())
    }
}

fn copy_location(input: &Path, output: &Path, sinks: &mut Vec<Box<dyn FileSink>>) -> Result<usize> {
    let source = io::create_source(input)?;
    let mut sink = io::create_sink(input, output)?;
    let result = copy_entries(source.as_ref(), sink.as_mut(), None);
    sinks.push(sink);
    result
}

/// Folds a millisecond timestamp into a seed
fn fold_timestamp(time: i64) -> i32 {
    (time ^ ((time as u64) >> 32) as i64) as i32
}

/// Copies every entry of `source`, patching classes when a patcher is given.
/// Returns the number of patched classes.
fn copy_entries(source: &dyn FileSource, sink: &mut dyn FileSink, mut patcher: Option<&mut Patcher<'_>>) -> Result<usize> {
    let mut patched = 0;
    for entry in source.entries()? {
        let result = match (entry.kind, patcher.as_deref_mut()) {
            (EntryType::Directory, _) => sink.create_directory(&entry.path),
            (EntryType::Class, Some(patcher)) if !entry.path.starts_with("META-INF/") => {
                patch_entry(source, sink, patcher, &entry).map(|was_patched| patched += usize::from(was_patched))
            }
            _ => {
                log::debug!("Copying {}", entry.path);
                source.read_file(&entry.path).and_then(|bytes| sink.create_file(&entry.path, &bytes))
            }
        };
        result.map_err(|e| Error::in_entry(entry.path.clone(), e))?;
    }
    Ok(patched)
}

fn patch_entry(source: &dyn FileSource, sink: &mut dyn FileSink, patcher: &mut Patcher<'_>, entry: &Entry) -> Result<bool> {
    let bytes = source.read_file(&entry.path)?;
    let name = entry.class_name().unwrap_or(&entry.path);
    match patcher.patch_class(name, &bytes)? {
        Some(output) => {
            sink.create_file(&entry.path, &output)?;
            Ok(true)
        }
        None => {
            log::debug!("Copying {}", entry.path);
            sink.create_file(&entry.path, &bytes)?;
            Ok(false)
        }
    }
}

/// Flushes and closes every sink; the first failure wins
fn finish<T>(sinks: Vec<Box<dyn FileSink>>, result: Result<T>) -> Result<T> {
    let mut result = result;
    for mut sink in sinks {
        if result.is_ok() {
            if let Err(e) = sink.flush() {
                result = Err(e);
            }
        }
        sink.close();
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_mismatched_outputs_fail_before_io() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("out");
        let processor = Processor::new(
            vec![dir.path().join("a"), dir.path().join("b")],
            vec![output.clone()],
            Config::default(),
        );
        let error = processor.process().unwrap_err();
        assert!(matches!(error, Error::Config { .. }));
        assert!(!output.exists());
    }

    #[test]
    fn test_mismatched_subprojects_fail() {
        let dir = TempDir::new().unwrap();
        let processor = Processor::new(vec![dir.path().join("a")], vec![dir.path().join("b")], Config::default())
            .with_subprojects(vec![dir.path().join("c")], Vec::new());
        assert!(matches!(processor.process(), Err(Error::Config { .. })));
    }

    #[test]
    fn test_decoder_needs_an_output() {
        let processor = Processor::new(Vec::new(), Vec::new(), Config::default());
        assert!(matches!(processor.process(), Err(Error::Config { .. })));
    }

    #[test]
    fn test_fold_timestamp() {
        assert_eq!(fold_timestamp(0), 0);
        assert_eq!(fold_timestamp(0x1_0000_0002), 3);
        assert_eq!(fold_timestamp(1_700_000_000_000), (1_700_000_000_000_i64 ^ 395) as i32);
    }

    #[test]
    fn test_fixed_seed_is_reported() {
        let _ = env_logger::builder().is_test(true).try_init();
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("in/a")).unwrap();
        std::fs::write(dir.path().join("in/a/readme.txt"), b"notes").unwrap();
        let processor = Processor::new(
            vec![dir.path().join("in")],
            vec![dir.path().join("out")],
            Config::default().with_seed(Seed::Fixed(77)).with_project_name("demo"),
        );
        let report = processor.process().unwrap();
        assert_eq!(report.seed, Some(77));
        assert_eq!(report.patched_classes, 0);
        assert_eq!(report.decoder.as_deref(), Some("io/tolstr/Deobfuscator$demo"));
        assert_eq!(std::fs::read(dir.path().join("out/a/readme.txt")).unwrap(), b"notes");
        assert!(dir.path().join("out/io/tolstr/Deobfuscator$demo.class").exists());
    }
}
