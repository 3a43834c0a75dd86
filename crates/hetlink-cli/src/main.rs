//! hetlink CLI - multi-relational link prediction from the command line.
//!
//! # Usage
//!
//! ```bash
//! # Write a synthetic two-type graph
//! hetlink synth -o graph.json --nodes 60,40 --communities 3
//!
//! # Inspect it
//! hetlink stats graph.json
//!
//! # Train on every relation, checkpoint every 5 epochs, save the report
//! hetlink train graph.json --epochs 20 --checkpoint-dir runs --checkpoint-every 5 --report report.json
//!
//! # Train on two relations only
//! hetlink train graph.json --relation 0,1,0 --relation 1,1,1
//!
//! # Re-score a checkpoint
//! hetlink evaluate graph.json --checkpoint runs/ep20
//! ```
//!
//! Logging goes to stderr and is controlled by `RUST_LOG` (default `info`).

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use hetlink_core::{GraphData, NegativeStrategy, RelationType, SyntheticGraph};
use hetlink_kge::{read_checkpoint_meta, HeldOut, LossKind, Trainer, TrainingConfig};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "hetlink")]
#[command(about = "Multi-relational link prediction CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train a model and report test metrics per relation
    Train {
        /// Graph file (JSON)
        input: PathBuf,

        /// Training configuration (JSON); flags override its fields
        #[arg(long)]
        config: Option<PathBuf>,

        /// Relation to train, as `row,col,index` (repeatable; default: all)
        #[arg(long = "relation", value_parser = parse_relation)]
        relations: Vec<RelationType>,

        /// Number of epochs
        #[arg(long)]
        epochs: Option<usize>,

        /// Learning rate
        #[arg(long)]
        learning_rate: Option<f64>,

        /// First layer width
        #[arg(long)]
        hidden1: Option<usize>,

        /// Embedding width
        #[arg(long)]
        hidden2: Option<usize>,

        /// Positive edges per batch
        #[arg(long)]
        batch_size: Option<usize>,

        /// Negatives per positive
        #[arg(long)]
        neg_sample_size: Option<usize>,

        /// Dropout rate
        #[arg(long)]
        dropout: Option<f32>,

        /// L2 coefficient
        #[arg(long)]
        weight_decay: Option<f64>,

        /// Hinge margin
        #[arg(long)]
        margin: Option<f64>,

        /// Held-out fraction for validation and for test
        #[arg(long)]
        held_out: Option<f64>,

        /// Random seed
        #[arg(long)]
        seed: Option<u64>,

        /// Loss function
        #[arg(long)]
        loss: Option<LossArg>,

        /// Draw training negatives by degree^distortion instead of uniformly
        #[arg(long)]
        degree_weighted: Option<f64>,

        /// Skip per-step validation/test cost
        #[arg(long)]
        no_held_out_cost: bool,

        /// Checkpoint root directory
        #[arg(long)]
        checkpoint_dir: Option<PathBuf>,

        /// Checkpoint period in epochs
        #[arg(long)]
        checkpoint_every: Option<usize>,

        /// Write the training report as JSON
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Score a checkpoint on its held-out edges
    Evaluate {
        /// Graph file the checkpoint was trained on
        input: PathBuf,

        /// Checkpoint directory (`<root>/ep<N>`)
        #[arg(long)]
        checkpoint: PathBuf,

        /// Held-out split to score
        #[arg(long, default_value = "test")]
        split: SplitArg,
    },

    /// Show node and relation statistics
    Stats {
        /// Graph file (JSON)
        input: PathBuf,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Generate a synthetic graph with planted communities
    Synth {
        /// Output file (JSON)
        #[arg(short, long)]
        output: PathBuf,

        /// Node counts per type, comma separated
        #[arg(long, default_value = "60,40", value_delimiter = ',')]
        nodes: Vec<usize>,

        /// Number of communities
        #[arg(long, default_value = "3")]
        communities: usize,

        /// Edge probability inside a community
        #[arg(long, default_value = "0.3")]
        p_in: f64,

        /// Edge probability across communities
        #[arg(long, default_value = "0.02")]
        p_out: f64,

        /// Random seed
        #[arg(long, default_value = "0")]
        seed: u64,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum LossArg {
    /// Max-margin ranking
    Hinge,
    /// Sigmoid cross-entropy
    CrossEntropy,
}

impl From<LossArg> for LossKind {
    fn from(arg: LossArg) -> Self {
        match arg {
            LossArg::Hinge => LossKind::Hinge,
            LossArg::CrossEntropy => LossKind::CrossEntropy,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum SplitArg {
    Validation,
    Test,
}

impl From<SplitArg> for HeldOut {
    fn from(arg: SplitArg) -> Self {
        match arg {
            SplitArg::Validation => HeldOut::Validation,
            SplitArg::Test => HeldOut::Test,
        }
    }
}

fn parse_relation(s: &str) -> std::result::Result<RelationType, String> {
    let parts: Vec<&str> = s.split(',').map(str::trim).collect();
    let [row, col, index] = parts.as_slice() else {
        return Err(format!("expected row,col,index, got '{s}'"));
    };
    let num = |p: &str| p.parse::<usize>().map_err(|e| format!("'{p}': {e}"));
    Ok(RelationType::new(num(row)?, num(col)?, num(index)?))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Train {
            input,
            config,
            relations,
            epochs,
            learning_rate,
            hidden1,
            hidden2,
            batch_size,
            neg_sample_size,
            dropout,
            weight_decay,
            margin,
            held_out,
            seed,
            loss,
            degree_weighted,
            no_held_out_cost,
            checkpoint_dir,
            checkpoint_every,
            report,
        } => {
            let mut cfg = match config {
                Some(path) => load_config(&path)?,
                None => TrainingConfig::default(),
            };
            if let Some(v) = epochs {
                cfg.epochs = v;
            }
            if let Some(v) = learning_rate {
                cfg.learning_rate = v;
            }
            if let Some(v) = hidden1 {
                cfg.hidden1 = v;
            }
            if let Some(v) = hidden2 {
                cfg.hidden2 = v;
            }
            if let Some(v) = batch_size {
                cfg.batch_size = v;
            }
            if let Some(v) = neg_sample_size {
                cfg.neg_sample_size = v;
            }
            if let Some(v) = dropout {
                cfg.dropout = v;
            }
            if let Some(v) = weight_decay {
                cfg.weight_decay = v;
            }
            if let Some(v) = margin {
                cfg.max_margin = v;
            }
            if let Some(v) = held_out {
                cfg.held_out_fraction = v;
            }
            if let Some(v) = seed {
                cfg.seed = v;
            }
            if let Some(v) = loss {
                cfg.loss = v.into();
            }
            if let Some(distortion) = degree_weighted {
                cfg.negative_strategy = NegativeStrategy::DegreeWeighted { distortion };
            }
            if no_held_out_cost {
                cfg.track_held_out_cost = false;
            }
            if checkpoint_dir.is_some() {
                cfg.checkpoint_dir = checkpoint_dir;
            }
            if checkpoint_every.is_some() {
                cfg.checkpoint_every = checkpoint_every;
            }
            cmd_train(&input, relations, cfg, report.as_deref())
        }
        Commands::Evaluate {
            input,
            checkpoint,
            split,
        } => cmd_evaluate(&input, &checkpoint, split.into()),
        Commands::Stats { input, json } => cmd_stats(&input, json),
        Commands::Synth {
            output,
            nodes,
            communities,
            p_in,
            p_out,
            seed,
        } => cmd_synth(&output, nodes, communities, p_in, p_out, seed),
    }
}

fn load_config(path: &Path) -> Result<TrainingConfig> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    serde_json::from_str(&json).with_context(|| format!("Failed to parse config {}", path.display()))
}

fn load_graph(path: &Path) -> Result<GraphData> {
    let start = Instant::now();
    let pb = ProgressBar::new_spinner();
    pb.set_message(format!("Loading {}...", path.display()));

    let graph = GraphData::from_json_file(path)
        .with_context(|| format!("Failed to load graph {}", path.display()))?;

    pb.finish_with_message(format!("Loaded in {:.2?}", start.elapsed()));
    Ok(graph)
}

fn cmd_train(
    input: &Path,
    relations: Vec<RelationType>,
    config: TrainingConfig,
    report_path: Option<&Path>,
) -> Result<()> {
    let graph = load_graph(input)?;
    let selection = if relations.is_empty() {
        graph.catalog().relation_types()
    } else {
        relations
    };

    let epochs = config.epochs as u64;
    let mut trainer =
        Trainer::new(graph, selection, config).context("Failed to set up training")?;

    let pb = ProgressBar::new(epochs);
    pb.set_style(
        ProgressStyle::with_template("{bar:40} {pos}/{len} epochs {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    let report = trainer
        .train_with_progress(|s| {
            pb.set_message(format!("train_cost={:.5}", s.train_cost));
            pb.inc(1);
        })
        .context("Training failed")?;
    pb.finish_and_clear();

    println!("Epoch summaries");
    println!("===============");
    for e in &report.epochs {
        let fmt_cost = |c: Option<f64>| c.map_or_else(|| "-".to_string(), |c| format!("{c:.5}"));
        println!(
            "Epoch: {:04} train_loss={:.5} val_loss={} test_loss={} time={:.3}s",
            e.epoch,
            e.train_cost,
            fmt_cost(e.val_cost),
            fmt_cost(e.test_cost),
            e.seconds
        );
    }
    println!();
    println!("Test metrics");
    println!("============");
    for r in &report.test {
        println!("{r}");
    }

    if let Some(path) = report_path {
        report
            .write_json(path)
            .with_context(|| format!("Failed to write report {}", path.display()))?;
        println!("Report written to {}", path.display());
    }
    Ok(())
}

fn cmd_evaluate(input: &Path, checkpoint: &Path, split: HeldOut) -> Result<()> {
    let meta = read_checkpoint_meta(checkpoint)
        .with_context(|| format!("Failed to read checkpoint {}", checkpoint.display()))?;
    let graph = load_graph(input)?;

    // Same seed and selection reproduce the held-out edges of the run.
    let mut config = meta.config.clone();
    config.checkpoint_dir = None;
    let mut trainer =
        Trainer::new(graph, meta.selection.clone(), config).context("Failed to rebuild model")?;
    trainer
        .load_checkpoint(checkpoint)
        .with_context(|| format!("Failed to load checkpoint {}", checkpoint.display()))?;

    let reports = trainer.evaluate(split)?;
    if reports.is_empty() {
        bail!("no relation has {split} edges to score");
    }
    println!("Checkpoint epoch {} ({split} split)", meta.epoch);
    for r in &reports {
        println!("{r}");
    }
    Ok(())
}

fn cmd_stats(input: &Path, json: bool) -> Result<()> {
    let graph = load_graph(input)?;
    let stats = graph.stats();

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("Graph Statistics");
    println!("================");
    println!("Node types:     {}", stats.node_types.len());
    println!("Relation types: {}", stats.relations.len());
    println!("Total edges:    {}", stats.total_edges());
    println!();
    for n in &stats.node_types {
        println!(
            "Node type {:02}: {} nodes, {} feature dims",
            n.id, n.count, n.feature_dim
        );
    }
    println!();
    for r in &stats.relations {
        println!(
            "{} {}x{} edges={} density={:.5} decoder={}",
            r.relation, r.rows, r.cols, r.edges, r.density, r.decoder
        );
    }
    Ok(())
}

fn cmd_synth(
    output: &Path,
    nodes: Vec<usize>,
    communities: usize,
    p_in: f64,
    p_out: f64,
    seed: u64,
) -> Result<()> {
    let mut relations = Vec::new();
    for row in 0..nodes.len() {
        for col in 0..nodes.len() {
            relations.push((row, col, 1));
        }
    }
    let graph = SyntheticGraph::default()
        .with_node_types(nodes)
        .with_relations(relations)
        .with_communities(communities)
        .with_probabilities(p_in, p_out)
        .with_seed(seed)
        .generate()
        .context("Failed to generate graph")?;

    let file = graph.to_graph_file();
    fs::write(output, serde_json::to_string_pretty(&file)?)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    let stats = graph.stats();
    println!(
        "Wrote {} node types, {} relations, {} edges to {}",
        stats.node_types.len(),
        stats.relations.len(),
        stats.total_edges(),
        output.display()
    );
    Ok(())
}
