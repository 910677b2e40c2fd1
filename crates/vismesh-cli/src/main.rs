//! vismesh CLI entry point.
//!
//! Trains and resamples visual mesh networks. The network topology comes
//! from a structure descriptor string (`4-4-4_8-8`: groups separated by `_`,
//! layer widths by `-`); trained models land under
//! `{output}/{size}{type}/{network_name}/` with YAML exports in a nested
//! `yaml_models/` directory.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use vismesh_core::StructureDescriptor;
use vismesh_learning::{load_dataset, ResampleConfig, Resampler, Trainer, TrainingConfig};
use vismesh_net::Network;
use vismesh_op::{create_operator, OperatorKind};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser, Debug)]
#[command(name = "vismesh")]
#[command(version = VERSION)]
#[command(about = "Visual mesh network training and resampling", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Train a network on a mesh dataset
    Train(TrainArgs),
    /// Run a trained network over a dataset and write a re-weighted copy
    Resample(ResampleArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OperatorChoice {
    /// Native mesh kernel, discovered by the fixed-priority search
    Native,
    /// In-tree CPU reference kernel
    Reference,
}

impl From<OperatorChoice> for OperatorKind {
    fn from(choice: OperatorChoice) -> Self {
        match choice {
            OperatorChoice::Native => OperatorKind::Native,
            OperatorChoice::Reference => OperatorKind::Reference,
        }
    }
}

/// Arguments shared by both subcommands.
#[derive(Args, Debug)]
struct CommonArgs {
    /// Compute device index
    #[arg(short = 'g', long = "gpu", default_value_t = 0)]
    gpu: u32,

    /// Network structure descriptor, e.g. "4-4-4_8-8"
    #[arg(short = 's', long)]
    structure: String,

    /// Category type label (keys the output directory)
    #[arg(short = 't', long = "type")]
    category: String,

    /// Mesh size label (keys the output directory)
    #[arg(short = 'l', long)]
    size: String,

    /// Mesh operator implementation
    #[arg(long, value_enum, default_value_t = OperatorChoice::Native)]
    operator: OperatorChoice,

    /// Mesh graph degree requested from lookup
    #[arg(long, default_value_t = 7)]
    degree: usize,

    /// Input dataset directory
    input: PathBuf,

    /// Output directory
    output: PathBuf,
}

#[derive(Args, Debug)]
struct TrainArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Samples per optimizer step
    #[arg(long, default_value_t = 16)]
    batch_size: usize,

    /// Total optimizer steps
    #[arg(long, default_value_t = 1000)]
    max_batches: usize,

    /// SGD learning rate
    #[arg(long, default_value_t = 0.1)]
    learning_rate: f32,

    /// Batches between checkpoint exports
    #[arg(long, default_value_t = 100)]
    checkpoint_interval: usize,

    /// Seed for weight initialization
    #[arg(long, default_value_t = 42)]
    seed: u64,
}

#[derive(Args, Debug)]
struct ResampleArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Directory holding previously trained models
    #[arg(short = 'm', long)]
    model: PathBuf,
}

/// `{root}/{size}{type}/{network_name}`, the per-model directory convention.
fn model_dir(root: &Path, common: &CommonArgs, network_name: &str) -> PathBuf {
    root.join(format!("{}{}", common.size, common.category))
        .join(network_name)
}

fn run_train(args: TrainArgs) -> Result<()> {
    let descriptor: StructureDescriptor = args.common.structure.parse()?;
    let network = Network::build(&descriptor, args.seed);
    let run_dir = model_dir(&args.common.output, &args.common, network.name());
    std::fs::create_dir_all(run_dir.join("yaml_models"))
        .with_context(|| format!("failed to create output directory {:?}", run_dir))?;

    let operator = create_operator(args.common.operator.into())
        .context("mesh operator initialization failed")?;
    let dataset = load_dataset(&args.common.input)
        .with_context(|| format!("failed to load dataset from {:?}", args.common.input))?;

    let config = TrainingConfig {
        batch_size: args.batch_size,
        max_batches: args.max_batches,
        learning_rate: args.learning_rate,
        checkpoint_interval: args.checkpoint_interval,
        degree: args.common.degree,
        device: args.common.gpu,
        seed: args.seed,
        ..Default::default()
    };

    let mut trainer = Trainer::new(
        network,
        operator,
        config,
        args.common.category.clone(),
        args.common.size.clone(),
        run_dir,
    );
    let summary = trainer.train(&dataset)?;
    log::info!(
        "trained '{}': loss {:.6} -> {:.6}",
        summary.network_name,
        summary.first_loss,
        summary.final_loss
    );
    Ok(())
}

fn run_resample(args: ResampleArgs) -> Result<()> {
    let descriptor: StructureDescriptor = args.common.structure.parse()?;
    let run_dir = model_dir(&args.model, &args.common, &descriptor.canonical_name());
    let model_path = run_dir.join("model.json");
    let network = Network::load(&model_path, 0)
        .with_context(|| format!("failed to load trained model from {:?}", model_path))?;

    let operator = create_operator(args.common.operator.into())
        .context("mesh operator initialization failed")?;
    let dataset = load_dataset(&args.common.input)
        .with_context(|| format!("failed to load dataset from {:?}", args.common.input))?;

    let config = ResampleConfig {
        degree: args.common.degree,
        device: args.common.gpu,
        ..Default::default()
    };
    let mut resampler = Resampler::new(network, operator, config);
    let summary = resampler.resample(&dataset, &args.common.output)?;
    resampler.write_summary(&summary, &run_dir)?;
    log::info!(
        "resampled {} samples with '{}' | mean weight {:.4}",
        summary.samples_written,
        summary.network_name,
        summary.mean_weight
    );
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    }

    match cli.command {
        Command::Train(args) => run_train(args),
        Command::Resample(args) => run_resample(args),
    }
}
