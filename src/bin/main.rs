use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tolstr::obfuscate::decoder_name;
use tolstr::{Config, Processor, Seed};

#[derive(Parser)]
#[command(name = "tolstr")]
#[command(about = "Hide string literals of compiled JVM classes")]
#[command(version)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Patch marked classes and write the decoder class
    Process(ProcessArgs),

    /// List the classes and constants that would be obfuscated
    Analyze(AnalyzeArgs),

    /// Print the decoder class name used for a project
    DecoderName {
        #[arg(value_name = "PROJECT", default_value = "")]
        project: String,
    },
}

#[derive(Args)]
struct ScopeArgs {
    /// Class directory or jar to process; repeat for several inputs
    #[arg(short, long = "input", value_name = "PATH")]
    inputs: Vec<PathBuf>,

    /// Library directory or jar used for type resolution only
    #[arg(long = "classpath", value_name = "PATH")]
    classpath: Vec<PathBuf>,

    /// Platform classes used for type resolution only
    #[arg(long = "boot-classpath", value_name = "PATH")]
    boot_classpath: Vec<PathBuf>,

    /// Internal name of the marker annotation
    #[arg(long, value_name = "NAME")]
    annotation: Option<String>,
}

#[derive(Args)]
struct AnalyzeArgs {
    #[command(flatten)]
    scope: ScopeArgs,
}

#[derive(Args)]
struct ProcessArgs {
    #[command(flatten)]
    scope: ScopeArgs,

    /// Output for the input at the same position
    #[arg(short, long = "output", value_name = "PATH")]
    outputs: Vec<PathBuf>,

    #[arg(long = "subproject-input", value_name = "PATH")]
    subproject_inputs: Vec<PathBuf>,

    #[arg(long = "subproject-output", value_name = "PATH")]
    subproject_outputs: Vec<PathBuf>,

    /// Patch subproject classes too instead of copying them
    #[arg(long)]
    include_subprojects: bool,

    /// Fixed obfuscation seed
    #[arg(long, value_name = "N", allow_negative_numbers = true, conflicts_with = "seed_from_inputs")]
    seed: Option<i32>,

    /// Derive the seed from the newest input modification time
    #[arg(long)]
    seed_from_inputs: bool,

    #[arg(long, value_name = "NAME")]
    project_name: Option<String>,

    /// Directory receiving the decoder class instead of the first output
    #[arg(long, value_name = "DIR")]
    decoder_output: Option<PathBuf>,

    /// Copy inputs to outputs without changes
    #[arg(long)]
    disabled: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();

    match cli.command {
        Commands::Process(args) => process(args),
        Commands::Analyze(args) => analyze(args),
        Commands::DecoderName { project } => {
            println!("{}", decoder_name(&project));
            Ok(())
        }
    }
}

fn base_config(scope: &ScopeArgs) -> Config {
    match &scope.annotation {
        Some(annotation) => Config::default().with_annotation(annotation.replace('.', "/")),
        None => Config::default(),
    }
}

fn process(args: ProcessArgs) -> Result<()> {
    if args.scope.inputs.is_empty() && args.subproject_inputs.is_empty() {
        bail!("nothing to process, pass at least one --input");
    }
    let mut config = base_config(&args.scope);
    config.enabled = !args.disabled;
    config.include_subprojects = args.include_subprojects;
    config.decoder_output = args.decoder_output;
    if let Some(seed) = args.seed {
        config = config.with_seed(Seed::Fixed(seed));
    } else if args.seed_from_inputs {
        config = config.with_seed(Seed::FromInputs);
    }
    if let Some(project_name) = args.project_name {
        config = config.with_project_name(project_name);
    }
    let config = config.with_env_overrides()?;

    let processor = Processor::new(args.scope.inputs, args.outputs, config)
        .with_subprojects(args.subproject_inputs, args.subproject_outputs)
        .with_classpath(args.scope.classpath)
        .with_boot_classpath(args.scope.boot_classpath);
    let report = processor.process().context("string obfuscation failed")?;

    match (report.seed, &report.decoder) {
        (Some(seed), Some(decoder)) => log::info!(
            "Patched {} classes, hid {} strings in {} (seed {})",
            report.patched_classes,
            report.hidden_strings,
            decoder,
            seed
        ),
        _ => log::info!("Copied inputs unchanged"),
    }
    Ok(())
}

fn analyze(args: AnalyzeArgs) -> Result<()> {
    let config = base_config(&args.scope);
    let processor = Processor::new(args.scope.inputs, Vec::new(), config)
        .with_classpath(args.scope.classpath)
        .with_boot_classpath(args.scope.boot_classpath);
    processor.analyze().context("analysis failed")?;
    Ok(())
}
