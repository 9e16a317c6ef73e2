//! lattix-transe - Train TransE embeddings from the command line.
//!
//! # Usage
//!
//! ```bash
//! # Show statistics about a triples file
//! lattix-transe stats train.txt
//!
//! # Train on the full training split for 100 epochs
//! lattix-transe train --train train.txt --valid valid.txt --test test.txt \
//!     --epochs 100 --full-train
//!
//! # Start from a JSON config, override a field
//! lattix-transe train --train train.txt --valid valid.txt --test test.txt \
//!     --config run.json --learning-rate 0.05
//! ```

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use indicatif::ProgressBar;
use lattix_transe::{
    Dataset, Error as TransEError, Norm, RankSide, Trainer, TrainingConfig, TrainingEvent,
};
use rand::SeedableRng;
use rand_xorshift::XorShiftRng;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "lattix-transe")]
#[command(about = "TransE knowledge graph embedding trainer", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show statistics about a triples file
    Stats {
        /// Input file (one tab- or space-separated triple per line)
        input: PathBuf,
    },

    /// Train a model and report link-prediction ranks
    Train(TrainArgs),
}

#[derive(Args)]
struct TrainArgs {
    /// Training triples (builds the vocabularies)
    #[arg(long)]
    train: PathBuf,

    /// Validation triples
    #[arg(long)]
    valid: PathBuf,

    /// Test triples
    #[arg(long)]
    test: PathBuf,

    /// JSON training config; explicit flags override its fields
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of epochs
    #[arg(long)]
    epochs: Option<usize>,

    /// Train on every training triple
    #[arg(long)]
    full_train: bool,

    /// Training sample size when not using --full-train
    #[arg(long)]
    num_train: Option<usize>,

    /// Negatives per positive (accepted, one per side is used)
    #[arg(long)]
    negative_samples: Option<usize>,

    /// Embedding dimension
    #[arg(long)]
    dim: Option<usize>,

    /// L1 regularization weight (accepted, not applied)
    #[arg(long)]
    l1_reg: Option<f32>,

    /// L2 regularization weight (accepted, not applied)
    #[arg(long)]
    l2_reg: Option<f32>,

    /// Learning rate
    #[arg(long)]
    learning_rate: Option<f32>,

    /// Minibatch size
    #[arg(long)]
    batch_size: Option<usize>,

    /// Ranking margin
    #[arg(long)]
    margin: Option<f32>,

    /// Dissimilarity norm
    #[arg(long)]
    norm: Option<NormArg>,

    /// Shuffle minibatches every epoch
    #[arg(long)]
    shuffle: bool,

    /// Filtered rank evaluation
    #[arg(long)]
    filtered: bool,

    /// Slots to rank during evaluation
    #[arg(long)]
    rank_side: Option<SideArg>,

    /// Random seed
    #[arg(long)]
    seed: Option<u64>,

    /// Do not print the cost of every minibatch
    #[arg(long)]
    quiet_batches: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum NormArg {
    /// Manhattan distance
    L1,
    /// Euclidean distance
    L2,
}

impl From<NormArg> for Norm {
    fn from(n: NormArg) -> Self {
        match n {
            NormArg::L1 => Norm::L1,
            NormArg::L2 => Norm::L2,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum SideArg {
    Tail,
    Head,
    Both,
}

impl From<SideArg> for RankSide {
    fn from(s: SideArg) -> Self {
        match s {
            SideArg::Tail => RankSide::Tail,
            SideArg::Head => RankSide::Head,
            SideArg::Both => RankSide::Both,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Stats { input } => cmd_stats(&input),
        Commands::Train(args) => cmd_train(args),
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn build_config(args: &TrainArgs) -> Result<TrainingConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("Failed to parse config {}", path.display()))?
        }
        None => TrainingConfig::default(),
    };

    if let Some(v) = args.epochs {
        config.epochs = v;
    }
    if args.full_train {
        config.full_train = true;
    }
    if let Some(v) = args.num_train {
        config.num_train = v;
    }
    if let Some(v) = args.negative_samples {
        config.negative_samples = v;
    }
    if let Some(v) = args.dim {
        config.embedding_dim = v;
    }
    if let Some(v) = args.l1_reg {
        config.l1_reg = v;
    }
    if let Some(v) = args.l2_reg {
        config.l2_reg = v;
    }
    if let Some(v) = args.learning_rate {
        config.learning_rate = v;
    }
    if let Some(v) = args.batch_size {
        config.batch_size = v;
    }
    if let Some(v) = args.margin {
        config.margin = v;
    }
    if let Some(v) = args.norm {
        config.norm = v.into();
    }
    if args.shuffle {
        config.shuffle = true;
    }
    if args.filtered {
        config.filtered = true;
    }
    if let Some(v) = args.rank_side {
        config.rank_side = v.into();
    }
    if let Some(v) = args.seed {
        config.seed = v;
    }

    config.validate()?;
    Ok(config)
}

fn load(path: &Path, reference: Option<&Dataset>) -> Result<Dataset> {
    let start = Instant::now();
    let pb = ProgressBar::new_spinner();
    pb.set_message(format!("Loading {}...", path.display()));

    let dataset = match reference {
        Some(train) => Dataset::from_file_closed(path, train),
        None => Dataset::from_file(path),
    }
    .with_context(|| format!("Failed to load {}", path.display()))?;

    pb.finish_and_clear();
    println!(
        "  {}: {} (loaded in {:.2?})",
        path.display(),
        dataset.stats(),
        start.elapsed()
    );
    Ok(dataset)
}

fn cmd_stats(input: &Path) -> Result<()> {
    let dataset = load(input, None)?;
    let stats = dataset.stats();

    println!("Triples File Statistics");
    println!("=======================");
    println!("Entities:       {}", stats.entities);
    println!("Relations:      {}", stats.relations);
    println!("Triples:        {}", stats.triples);

    Ok(())
}

fn cmd_train(args: TrainArgs) -> Result<()> {
    let config = build_config(&args)?;

    println!("Loading data...");
    println!("model options {:?}", config);
    let train = load(&args.train, None)?;
    let valid = load(&args.valid, Some(&train))?;
    let test = load(&args.test, Some(&train))?;

    println!("Building model and starting training...");
    let mut rng = XorShiftRng::seed_from_u64(config.seed);
    let trainer = Trainer::new(config);
    let epochs = trainer.config().epochs;
    let quiet_batches = args.quiet_batches;

    let result = trainer.fit(
        &train,
        &valid,
        &test,
        &mut rng,
        Box::new(move |event: &TrainingEvent| match event {
            TrainingEvent::Baseline(eval) => println!("{eval}"),
            TrainingEvent::Minibatch { epoch, cost, .. } => {
                if !quiet_batches {
                    println!("Epoch {epoch} Cost {cost}");
                }
            }
            TrainingEvent::EpochEnd(summary) => {
                println!(
                    "Epoch {} of {} took {:.3}s",
                    summary.epoch,
                    epochs,
                    summary.elapsed.as_secs_f64()
                );
                println!("{}", summary.eval);
            }
            TrainingEvent::Diverged { cost, .. } => {
                println!("bad cost detected! Cost is {cost}");
            }
            TrainingEvent::Finished(eval) => {
                println!("Final evaluation:");
                println!("{eval}");
            }
        }),
    );

    match result {
        Ok(_) => Ok(()),
        // Divergence ends the run early; it is reported, not a process failure.
        Err(TransEError::NonFiniteLoss { .. }) => Ok(()),
        Err(e) => Err(e.into()),
    }
}
