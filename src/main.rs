use anyhow::{Result, bail};
use clap::Parser;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use kira_fliprqc::cli::{BatchArgs, Cli, Commands, ConfigArgs, QcCommand};
use kira_fliprqc::config::RunConfig;
use kira_fliprqc::ctx::Ctx;
use kira_fliprqc::io;
use kira_fliprqc::pipeline::Pipeline;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => {
            let config = load_config(&args.config)?;
            let mut ctx = Ctx::new(
                Some(args.data),
                args.config.layout.clone(),
                args.out,
                config,
                args.json,
                args.tsv,
                env!("CARGO_PKG_VERSION"),
            );
            Pipeline::analysis().run(&mut ctx)?;
            print_summary(&ctx)?;
        }
        Commands::Validate(args) => {
            let config = load_config(&args.config)?;
            let mut ctx = Ctx::new(
                Some(args.data),
                args.config.layout.clone(),
                PathBuf::from("."),
                config,
                false,
                false,
                env!("CARGO_PKG_VERSION"),
            );
            Pipeline::validation().run(&mut ctx)?;
            print_validate_summary(&ctx)?;
        }
        Commands::Batch(args) => run_batch(args)?,
        Commands::Qc(args) => match args.command {
            QcCommand::Show(show) => {
                let config = match show.config {
                    Some(path) => RunConfig::load(&path)?,
                    None => RunConfig::default(),
                };
                config.qc.validate()?;
                print_registry(&config);
            }
        },
    }

    Ok(())
}

/// Config file (or defaults) with command-line overrides applied.
fn load_config(args: &ConfigArgs) -> Result<RunConfig> {
    let mut config = match &args.config {
        Some(path) => RunConfig::load(path)?,
        None => RunConfig::default(),
    };
    if args.remove_artifact {
        config.remove_artifact = true;
    }
    if args.keep_artifact {
        config.remove_artifact = false;
    }
    if let Some(threshold) = args.threshold {
        config.diagnosis.threshold_value = threshold;
    }
    if let Some(threshold_type) = args.threshold_type {
        config.diagnosis.threshold_type = threshold_type.into();
    }
    if let Some(interval) = args.frame_interval {
        config.frame_interval = Some(interval);
    }
    Ok(config)
}

fn run_batch(args: BatchArgs) -> Result<()> {
    let config = load_config(&args.config)?;
    let jobs: Vec<(String, PathBuf)> = batch_labels(&args.data)
        .into_iter()
        .zip(args.data.iter().cloned())
        .collect();

    let run_one = |(label, data): &(String, PathBuf)| -> (String, Result<Ctx>) {
        let mut ctx = Ctx::new(
            Some(data.clone()),
            args.config.layout.clone(),
            args.out.join(label),
            config.clone(),
            args.json,
            args.tsv,
            env!("CARGO_PKG_VERSION"),
        );
        let result = Pipeline::analysis().run(&mut ctx).map(|_| ctx);
        (label.clone(), result)
    };

    #[cfg(feature = "mt")]
    let results: Vec<(String, Result<Ctx>)> = {
        use rayon::prelude::*;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(args.threads)
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build thread pool: {}", e))?;
        pool.install(|| jobs.par_iter().map(run_one).collect())
    };

    #[cfg(not(feature = "mt"))]
    let results: Vec<(String, Result<Ctx>)> = jobs.iter().map(run_one).collect();

    let mut failed = 0;
    for (label, result) in &results {
        match result {
            Ok(ctx) => {
                println!("== {} ==", label);
                print_summary(ctx)?;
            }
            Err(err) => {
                failed += 1;
                eprintln!("== {} == error: {:#}", label, err);
            }
        }
    }
    if failed > 0 {
        bail!("{} of {} plates failed", failed, results.len());
    }
    Ok(())
}

fn print_summary(ctx: &Ctx) -> Result<()> {
    let summary = io::summary::format_summary(ctx)?;
    print!("{}", summary);
    print_warnings(ctx);
    Ok(())
}

fn print_validate_summary(ctx: &Ctx) -> Result<()> {
    let store = ctx.store()?;
    println!("kira-fliprqc validate ok");
    println!("wells: {}", store.len());
    println!("labeled: {}", store.labeled_count());
    println!("frames: {}", store.frame_count());
    println!("frame_interval: {}", store.frame_interval());
    print_warnings(ctx);
    Ok(())
}

fn print_warnings(ctx: &Ctx) {
    if !ctx.warnings.is_empty() {
        println!("warnings:");
        for warning in &ctx.warnings {
            println!("- {}", warning);
        }
    }
}

fn print_registry(config: &RunConfig) {
    println!("qc tests:");
    for entry in &config.qc.entries {
        let params = serde_json::to_string(&entry.test).unwrap_or_default();
        println!(
            "{}\t{}\t{}\t{}",
            entry.test.name(),
            entry.test.category(),
            if entry.enabled { "enabled" } else { "disabled" },
            params
        );
    }
}

/// One output label per plate. Repeated file stems get `-2`, `-3`, ...
/// so plates never share an output directory.
fn batch_labels(paths: &[PathBuf]) -> Vec<String> {
    let mut used = BTreeSet::new();
    paths
        .iter()
        .map(|p| {
            let stem = label_from_path(p);
            let mut label = stem.clone();
            let mut n = 2;
            while !used.insert(label.clone()) {
                label = format!("{}-{}", stem, n);
                n += 1;
            }
            label
        })
        .collect()
}

fn label_from_path(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("plate")
        .to_string()
}
