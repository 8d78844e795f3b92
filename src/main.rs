//! `chess-prep` command line.

use std::io::{self, Read};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use log::{info, warn};

use chess_prep::config::Config;
use chess_prep::dataset::{self, Dataset};
use chess_prep::engine::UciEngine;
use chess_prep::replay::replay;
use chess_prep::store::{Compression, DirStore};
use chess_prep::{normalize, pool};

#[derive(Parser, Debug)]
#[command(
    name = "chess-prep",
    version,
    about = "Annotate recorded chess games with UCI engine evaluations"
)]
struct Cli {
    /// TOML configuration file
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Process the dataset with a pool of engine workers
    Run(RunArgs),
    /// Print the clean move sequence of one game (argument or stdin)
    Normalize {
        move_text: Option<String>,
        /// Also replay the moves and print the FEN before each one
        #[arg(long)]
        fen: bool,
    },
    /// Report how many games of the dataset are already stored
    Status(RunArgs),
}

/// Overrides for values of the configuration file.
#[derive(Args, Debug, Default)]
struct RunArgs {
    /// Dataset path or glob pattern (overrides [dataset].path)
    #[arg(long)]
    dataset: Option<String>,

    /// Output directory (overrides [output].dir)
    #[arg(long)]
    output: Option<PathBuf>,

    /// Output compression: zstd or none (overrides [output].compression)
    #[arg(long, value_parser = Compression::parse)]
    compression: Option<Compression>,

    /// Number of workers (overrides [partition].worker_count)
    #[arg(long, short = 'j')]
    workers: Option<usize>,

    /// Games per worker (overrides [partition].games_per_worker)
    #[arg(long)]
    games_per_worker: Option<usize>,

    /// Engine binary (overrides [engine].path)
    #[arg(long)]
    engine: Option<PathBuf>,

    /// Search depth (overrides [engine].depth)
    #[arg(long)]
    depth: Option<u32>,

    /// Candidate moves on the subject's turns (overrides [engine].top_k)
    #[arg(long)]
    top_k: Option<usize>,

    /// Retries after a non-fatal engine error (overrides [engine].retries)
    #[arg(long)]
    retries: Option<u32>,

    /// PGN only: the subject is whichever side this player had
    #[arg(long)]
    player: Option<String>,
}

impl RunArgs {
    fn apply(&self, config: &mut Config) {
        if let Some(v) = &self.dataset {
            config.dataset.path = Some(v.clone());
        }
        if let Some(v) = &self.output {
            config.output.dir = v.clone();
        }
        if let Some(v) = self.compression {
            config.output.compression = v;
        }
        if let Some(v) = self.workers {
            config.partition.worker_count = Some(v);
        }
        if let Some(v) = self.games_per_worker {
            config.partition.games_per_worker = v;
        }
        if let Some(v) = &self.engine {
            config.engine.path = v.clone();
        }
        if let Some(v) = self.depth {
            config.engine.depth = v;
        }
        if let Some(v) = self.top_k {
            config.engine.top_k = v;
        }
        if let Some(v) = self.retries {
            config.engine.retries = v;
        }
        if let Some(v) = &self.player {
            config.dataset.subject_player = Some(v.clone());
            config.dataset.subject_color = None;
        }
    }
}

fn load_config(path: Option<&PathBuf>, args: &RunArgs) -> Result<Config> {
    let mut config = match path {
        Some(path) => Config::load(path)
            .with_context(|| format!("failed to load config '{}'", path.display()))?,
        None => Config::default(),
    };
    args.apply(&mut config);
    config.validate()?;
    Ok(config)
}

fn run(config: &Config) -> Result<ExitCode> {
    let source = config.dataset_source()?;
    let dataset = dataset::load(&source)
        .with_context(|| format!("failed to load dataset '{}'", source.pattern))?;
    let store = DirStore::open(&config.output.dir, config.output.compression).with_context(|| {
        format!(
            "failed to open output directory '{}'",
            config.output.dir.display()
        )
    })?;
    let partition = config.partition()?;
    let uci = config.uci_config();
    info!(
        "Engine {} at depth {}, {} workers x {} games, output in {}",
        uci.path.display(),
        uci.depth,
        partition.worker_count(),
        partition.games_per_worker(),
        store.dir().display()
    );

    let summary = pool::run_pool(
        &partition,
        &dataset,
        &store,
        config.worker_settings(),
        |worker_id| UciEngine::spawn(&uci, format!("engine{worker_id}")),
        config.partition.report_interval,
    );

    for (index, reason) in &summary.failed {
        warn!("game {index}: {reason}");
    }
    if !summary.fatal_workers.is_empty() {
        for (worker_id, reason) in &summary.fatal_workers {
            warn!("worker {worker_id} stopped: {reason}");
        }
        bail!(
            "{} worker(s) stopped early; re-run to resume",
            summary.fatal_workers.len()
        );
    }
    Ok(if summary.is_clean() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(2)
    })
}

fn status(config: &Config) -> Result<()> {
    let store = DirStore::open_existing(&config.output.dir, config.output.compression);
    let done = store.completed()?;

    match config.dataset_source() {
        Ok(source) => {
            let dataset = dataset::load(&source)?;
            let partition = config.partition()?;
            let assigned = (0..partition.worker_count())
                .map(|id| partition.indices(id, Some(dataset.len())))
                .collect::<Result<Vec<_>, _>>()?;
            let total: usize = assigned.iter().map(Vec::len).sum();
            let remaining = assigned
                .iter()
                .flatten()
                .filter(|&&index| !done.contains(&index))
                .count();
            println!(
                "{} of {} games stored; {remaining} of {total} assigned games remaining",
                done.len(),
                dataset.len()
            );
        }
        Err(_) => println!("{} games stored in {}", done.len(), store.dir().display()),
    }
    Ok(())
}

fn print_normalized(move_text: Option<String>, fen: bool) -> Result<()> {
    let raw = match move_text {
        Some(text) => text,
        None => {
            let mut text = String::new();
            io::stdin()
                .read_to_string(&mut text)
                .context("failed to read stdin")?;
            text
        }
    };
    let sequence = normalize(&raw)?;

    if fen {
        let replayed = replay(&sequence)?;
        for ply in &replayed.plies {
            println!("{}\t{}\t{}\t{}", ply.index, ply.san, ply.uci, ply.fen_before);
        }
        println!("final\t{}", replayed.final_fen);
    } else {
        println!("{}", sequence.join(" "));
    }
    Ok(())
}

fn main() -> Result<ExitCode> {
    chess_prep::log::init();
    let cli = Cli::parse();

    match &cli.command {
        Command::Run(args) => {
            let config = load_config(cli.config.as_ref(), args)?;
            run(&config)
        }
        Command::Status(args) => {
            let config = load_config(cli.config.as_ref(), args)?;
            status(&config)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Normalize { move_text, fen } => {
            print_normalized(move_text.clone(), *fen)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}
