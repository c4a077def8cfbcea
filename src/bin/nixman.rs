// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use nixman::{
    aggregate,
    path::{default_config_path, Normalizer},
    standard_bindings, write_documents, Assembler, ExternalRenderer, ManualConfig, Mode,
    ModuleSet,
};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use futures::future::try_join_all;
use std::{
    collections::BTreeMap,
    fs::write,
    path::{Path, PathBuf},
    process::exit,
    sync::Arc,
};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "nixman [options] <command>",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    /// Path to manual configuration file.
    #[arg(short, long, global = true, value_name = "path")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    async fn run(self) -> Result<()> {
        let config_path = match self.config {
            Some(path) => path,
            None => default_config_path()?,
        };

        match self.command {
            Command::Init(opts) => run_init(config_path, opts),
            Command::Options => run_options(load(&config_path)?),
            Command::Build(opts) => run_build(load(&config_path)?, opts).await,
            Command::Normalize(opts) => run_normalize(load(&config_path)?, opts),
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Write starter configuration file.
    #[command(override_usage = "nixman init [options]")]
    Init(InitOptions),

    /// Aggregate options documentation of every module set.
    #[command(override_usage = "nixman options [options]")]
    Options,

    /// Build manual in selected artifact modes.
    #[command(override_usage = "nixman build [options] [--mode <mode>]...")]
    Build(BuildOptions),

    /// Normalize declaration sites against configured source roots.
    #[command(override_usage = "nixman normalize [options] <path>...")]
    Normalize(NormalizeOptions),
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct InitOptions {
    /// Overwrite existing configuration file.
    #[arg(short, long)]
    pub force: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct BuildOptions {
    /// Artifact modes to build, all of them by default.
    #[arg(short, long = "mode", value_enum, value_name = "mode")]
    pub modes: Vec<Mode>,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct NormalizeOptions {
    /// Declaration sites to normalize.
    #[arg(required = true, value_name = "path")]
    pub paths: Vec<String>,

    /// Extra source roots to strip.
    #[arg(short, long, value_name = "root")]
    pub strip: Vec<String>,
}

#[tokio::main]
async fn main() {
    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .without_time();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    if let Err(error) = run().await {
        error!("{error:?}");
        exit(1);
    }

    exit(0)
}

async fn run() -> Result<()> {
    Cli::parse().run().await
}

fn load(path: &Path) -> Result<ManualConfig> {
    ManualConfig::load(path)
        .with_context(|| format!("failed to load configuration {:?}", path.display()))
}

fn run_init(path: PathBuf, opts: InitOptions) -> Result<()> {
    if path.exists() && !opts.force {
        bail!("configuration {:?} already exists, use --force to overwrite", path.display());
    }

    if let Some(parent) = path.parent() {
        mkdirp::mkdirp(parent)?;
    }
    write(&path, ManualConfig::starter().to_string())?;
    info!("wrote starter configuration to {:?}", path.display());

    Ok(())
}

fn run_options(config: ManualConfig) -> Result<()> {
    let written = write_options(&config)?;
    for (set, path) in written {
        info!("options of {set:?} at {:?}", path.display());
    }

    Ok(())
}

async fn run_build(config: ManualConfig, opts: BuildOptions) -> Result<()> {
    let options = write_options(&config)?;
    let bindings = Arc::new(standard_bindings(&config.manual, &options)?);
    let primary = config.primary_set().map(|set| set.name.clone());
    let assembler = Arc::new(Assembler::new(
        config.manual,
        primary,
        ExternalRenderer::new(config.tools),
    ));

    let mut modes = if opts.modes.is_empty() {
        Mode::ALL.to_vec()
    } else {
        opts.modes
    };
    modes.sort();
    modes.dedup();

    // INVARIANT: Modes write to disjoint directories, so they run concurrently.
    let tasks = modes.into_iter().map(|mode| {
        let assembler = Arc::clone(&assembler);
        let bindings = Arc::clone(&bindings);
        tokio::task::spawn_blocking(move || {
            assembler
                .assemble(mode, &bindings)
                .map(|artifacts| (mode, artifacts))
        })
    });

    for joined in try_join_all(tasks).await? {
        let (mode, artifacts) = joined?;
        info!("built {mode} manual at {:?}", artifacts.primary.display());
    }

    Ok(())
}

fn run_normalize(config: ManualConfig, opts: NormalizeOptions) -> Result<()> {
    let normalizer: Normalizer = config.normalizer()?.with_extra_roots(opts.strip)?;
    for path in opts.paths {
        println!("{}", serde_json::to_string(&normalizer.normalize(path))?);
    }

    Ok(())
}

fn write_options(config: &ManualConfig) -> Result<BTreeMap<String, PathBuf>> {
    let sets = config
        .module_sets
        .iter()
        .map(ModuleSet::resolve)
        .collect::<Result<Vec<_>, _>>()?;
    let aggregation = aggregate(&sets, &config.normalizer()?);
    let written = write_documents(&aggregation.documents, &config.manual.output)?;

    if !aggregation.is_complete() {
        for failure in &aggregation.failures {
            error!("{failure}: {}", failure.source);
        }
        let names = aggregation
            .failures
            .iter()
            .map(|failure| format!("{:?}", failure.set))
            .collect::<Vec<_>>()
            .join(", ");
        bail!("module sets failed to evaluate: {names}");
    }

    Ok(written)
}
