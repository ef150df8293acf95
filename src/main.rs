#![allow(missing_docs)]

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use concordia::{
    app_config::AppConfig,
    artifacts::{GitArtifactProvider, GitCli},
    cli::{self, Cli},
    config::{reader, writer, Config, LaunchState},
    gate::{LaunchCoordinator, LaunchRequest, Launcher, LifecycleGate},
    model::{AggregatedEntry, EntryKey, ServerLaunch},
    AggregationEngine, CollectionRegistry, ConcordiaError,
};
use regex::Regex;
use std::path::Path;
use tracing::{debug, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let app_config = AppConfig::load().context("Failed to load app configuration")?;
    initialize_tracing(cli.debug, cli.trace, app_config.as_ref());
    log_config_status(app_config.as_ref())?;

    let Some(command) = cli.command else {
        Cli::command().print_help().context("failed to print top-level help")?;
        println!();
        return Ok(());
    };

    match command {
        cli::Commands::Resolve(args) => run_resolve(&args, app_config.as_ref()),
        cli::Commands::Plan(args) => run_plan(args, app_config.as_ref()),
        cli::Commands::Artifacts(args) => run_artifacts(&args),
    }
}

/// Initialize tracing: flags win over the configured level, which wins over WARN
fn initialize_tracing(debug: bool, trace: bool, app_config: Option<&AppConfig>) {
    let log_level = if trace {
        Level::TRACE
    } else if debug {
        Level::DEBUG
    } else {
        app_config.and_then(|c| c.log_level).map_or(Level::WARN, Level::from)
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::builder().with_default_directive(log_level.into()).from_env_lossy())
        .init();
}

fn log_config_status(app_config: Option<&AppConfig>) -> Result<()> {
    if let Some(config) = app_config {
        debug!("Loaded app configuration from: {}", AppConfig::config_path()?.display());
        debug!("{} consent record(s) configured", config.consent.len());
    } else {
        debug!("No app configuration file found at: {}", AppConfig::config_path()?.display());
    }
    Ok(())
}

/// Registers the manifest's collections and runs the engine once
fn load_servers(manifest_path: &Path) -> Result<(Vec<AggregatedEntry>, Vec<String>)> {
    debug!("Reading collections manifest from {}", manifest_path.display());
    let manifest = reader::read_collections_manifest(manifest_path)
        .with_context(|| format!("Failed to load {}", manifest_path.display()))?;

    let mut registry = CollectionRegistry::new();
    let mut engine = AggregationEngine::attach(&mut registry);
    manifest.register_into(&mut registry).context("Invalid collections manifest")?;

    engine.pump(&mut registry);

    let pending = registry.pending_discovery().into_iter().map(str::to_string).collect();
    let servers = engine.servers().to_vec();
    engine.detach(&mut registry);

    Ok((servers, pending))
}

fn transport_label(launch: &ServerLaunch) -> String {
    match launch {
        ServerLaunch::Stdio(stdio) => {
            let mut parts = vec![stdio.command.clone()];
            parts.extend(stdio.args.iter().cloned());
            format!("stdio  {}", parts.join(" "))
        },
        ServerLaunch::Http(http) => format!("http   {}", http.uri),
    }
}

fn run_resolve(args: &cli::ResolveArgs, app_config: Option<&AppConfig>) -> Result<()> {
    let config = Config::resolve(args.collections.clone(), None, app_config)?;
    let (mut servers, pending) = load_servers(&config.collections_path)?;

    if let Some(pattern) = &args.filter {
        let filter = Regex::new(pattern)
            .with_context(|| format!("Invalid --filter pattern '{pattern}'"))?;
        servers.retain(|entry| filter.is_match(&entry.definition.id));
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&servers)?);
        return Ok(());
    }

    if servers.is_empty() {
        println!("No servers resolved");
    } else {
        println!("Resolved {} server(s):", servers.len());
        for entry in &servers {
            println!(
                "  [{:>2}] {}  {}",
                entry.priority_rank,
                entry.key(),
                transport_label(&entry.definition.launch)
            );
        }
    }

    if !pending.is_empty() {
        println!();
        println!("Still discovering: {}", pending.join(", "));
    }

    Ok(())
}

/// Accepts every launch; `plan` only records what would run
#[derive(Debug, Default)]
struct RecordingLauncher {
    launched: Vec<EntryKey>,
    stopped: Vec<EntryKey>,
}

impl Launcher for RecordingLauncher {
    fn launch(&mut self, request: &LaunchRequest) -> Result<(), ConcordiaError> {
        self.launched.push(request.key.clone());
        Ok(())
    }

    fn stop(&mut self, key: &EntryKey) {
        self.stopped.push(key.clone());
    }
}

fn run_plan(args: cli::PlanArgs, app_config: Option<&AppConfig>) -> Result<()> {
    let config = Config::resolve(args.collections, args.state, app_config)?;
    let (servers, _) = load_servers(&config.collections_path)?;

    let state = reader::read_launch_state(&config.state_path)
        .with_context(|| format!("Failed to load {}", config.state_path.display()))?;

    let consent = app_config.map(AppConfig::consent_store).unwrap_or_default();
    let mut coordinator =
        LaunchCoordinator::new(LifecycleGate::new(consent)).with_running(state.to_running());

    for (key, decision) in coordinator.plan(&servers) {
        println!("  {key}: {decision}");
    }

    if !args.write_state {
        return Ok(());
    }

    let mut launcher = RecordingLauncher::default();
    let report = coordinator.reconcile(&servers, &mut launcher);
    info!(
        "Recorded {} launch(es), {} stop(s)",
        launcher.launched.len(),
        launcher.stopped.len()
    );

    if args.backup && config.state_exists() {
        if let Some(backup) = writer::backup_file(&config.state_path)? {
            println!("Backup created: {}", backup.display());
        }
    }

    writer::write_launch_state(&config.state_path, &LaunchState::from_running(coordinator.running()))
        .with_context(|| format!("Failed to write {}", config.state_path.display()))?;

    println!(
        "Launch state updated: {} launched, {} stopped",
        report.launched.len(),
        report.stopped.len()
    );
    Ok(())
}

fn run_artifacts(args: &cli::ArtifactsArgs) -> Result<()> {
    let provider = GitArtifactProvider::new(GitCli::new(&args.repo));

    let Some(group) = &args.group else {
        for group in provider.groups() {
            println!("  {:<10} {}", group.id, group.name);
        }
        return Ok(());
    };

    let artifacts = provider
        .provide_artifacts(group)
        .with_context(|| format!("Failed to list {group} in {}", args.repo.display()))?;

    for artifact in artifacts {
        match artifact.description {
            Some(description) => println!("  {:<32} {}  ({})", artifact.id, artifact.name, description),
            None => println!("  {:<32} {}", artifact.id, artifact.name),
        }
    }

    Ok(())
}
