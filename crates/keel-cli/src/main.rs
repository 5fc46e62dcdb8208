//! Keel - pipeline compile driver
//!
//! ## Commands
//!
//! - `compile`: purge a pipeline for an event and sanitize it for a runtime
//! - `match`: evaluate a single ruleset against an event

mod telemetry;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use keel_pipeline::{Build, Driver, RuleData, Ruleset};
use serde::de::DeserializeOwned;
use tracing::info;

#[derive(Parser)]
#[command(name = "keel")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Compile pipeline definitions into runtime-ready plans", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true, env = "KEEL_LOG_JSON")]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Purge a pipeline for an event, then sanitize it for a runtime driver
    Compile {
        /// Path to the pipeline tree (JSON)
        #[arg(short, long, env = "KEEL_BUILD")]
        build: PathBuf,

        /// Path to the event rule data (JSON)
        #[arg(short, long, env = "KEEL_RULES")]
        rules: PathBuf,

        /// Runtime driver: docker or kubernetes
        #[arg(short, long, default_value = "docker", env = "KEEL_DRIVER")]
        driver: String,
    },

    /// Check whether a ruleset matches an event
    Match {
        /// Path to the ruleset (JSON)
        #[arg(long)]
        ruleset: PathBuf,

        /// Path to the event rule data (JSON)
        #[arg(short, long, env = "KEEL_RULES")]
        rules: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    telemetry::install(cli.json, cli.verbose)?;

    match cli.command {
        Commands::Compile {
            build,
            rules,
            driver,
        } => cmd_compile(&build, &rules, &driver),
        Commands::Match { ruleset, rules } => cmd_match(&ruleset, &rules),
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = fs::read_to_string(path).context(format!("Failed to read {:?}", path))?;
    serde_json::from_str(&raw).context(format!("Failed to parse {:?}", path))
}

fn cmd_compile(build_path: &Path, rules_path: &Path, driver: &str) -> Result<()> {
    let driver: Driver = driver.parse()?;
    let build: Build = read_json(build_path)?;
    let data: RuleData = read_json(rules_path)?;

    info!(build = %build.id, driver = %driver, "Compiling pipeline");

    let compiled = build
        .purge(&data)
        .context("Failed to purge pipeline")?
        .sanitize(driver)
        .context("Failed to sanitize pipeline")?;

    info!(
        build = %compiled.id,
        stages = compiled.stages.len(),
        steps = compiled.steps.len(),
        services = compiled.services.len(),
        "Pipeline compiled"
    );

    println!("{}", serde_json::to_string_pretty(&compiled)?);
    Ok(())
}

fn cmd_match(ruleset_path: &Path, rules_path: &Path) -> Result<()> {
    let ruleset: Ruleset = read_json(ruleset_path)?;
    let data: RuleData = read_json(rules_path)?;

    let matched = ruleset
        .matches(&data, &data.env)
        .context("Failed to evaluate ruleset")?;

    println!("{}", serde_json::json!({ "matched": matched }));
    Ok(())
}
