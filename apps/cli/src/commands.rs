//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use feedscout_core::sources::{self, Rescore};
use feedscout_core::{Coordinator, LearningReport, ProgressReporter, RunStage};
use feedscout_discovery::{ChainedSeeds, SeedFile, SeedSource, StaticSeeds};
use feedscout_fetch::HttpFetcher;
use feedscout_shared::{
    AppConfig, RunSummary, SourceStatus, ValidationOutcome, init_config, load_config,
    load_config_from,
};
use feedscout_storage::JsonFileStore;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// FeedScout: find, validate and track trustworthy content feeds.
#[derive(Parser)]
#[command(
    name = "feedscout",
    version,
    about = "Discover and validate multilingual content feeds, tracking per-source trust across runs.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file (defaults to ~/.feedscout/feedscout.toml).
    #[arg(long, global = true, env = "FEEDSCOUT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Validation store file (overrides `run.store_path`).
    #[arg(long, global = true, env = "FEEDSCOUT_STORE")]
    pub store: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run one discovery and validation cycle.
    Run {
        /// Seed list file, read in addition to the config's seeds.
        #[arg(long)]
        seeds: Option<PathBuf>,

        /// Worker pool size.
        #[arg(long)]
        workers: Option<usize>,

        /// Run deadline in seconds.
        #[arg(long)]
        timeout: Option<u64>,

        /// Write the run summary as JSON to this file.
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Show what discovery has learned: pattern and strategy acceptance,
    /// category health and convergence.
    #[command(visible_alias = "patterns")]
    Report {
        /// Recent runs used to judge convergence.
        #[arg(long, default_value_t = 3)]
        window: usize,

        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Inspect and maintain known sources.
    Sources {
        #[command(subcommand)]
        action: SourcesAction,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Source maintenance subcommands.
#[derive(Subcommand)]
pub(crate) enum SourcesAction {
    /// List known sources.
    List {
        /// Only sources with this status.
        #[arg(long, value_parser = parse_status)]
        status: Option<SourceStatus>,
    },
    /// Put a quarantined source on probation for the next run.
    Reinstate {
        /// Source id or URL.
        source: String,
    },
    /// Recompute trust scores from the stored outcome history.
    Rescore {
        /// Write the replayed scores back to the store.
        #[arg(long)]
        apply: bool,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with a sample pattern and seed.
    Init,
    /// Show resolved configuration.
    Show,
}

fn parse_status(s: &str) -> std::result::Result<SourceStatus, String> {
    s.parse()
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "feedscout=info",
        1 => "feedscout=debug",
        _ => "feedscout=trace",
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let mut config = resolve_config(cli.config.as_deref())?;
    if let Some(store) = cli.store {
        config.run.store_path = Some(store);
    }

    match cli.command {
        Command::Run {
            seeds,
            workers,
            timeout,
            out,
        } => {
            if let Some(workers) = workers {
                config.run.workers = workers;
            }
            if let Some(timeout) = timeout {
                config.run.timeout_secs = timeout;
            }
            cmd_run(config, seeds.as_deref(), out.as_deref()).await
        }
        Command::Report { window, json } => cmd_report(&config, window, json).await,
        Command::Sources { action } => match action {
            SourcesAction::List { status } => cmd_sources_list(&config, status).await,
            SourcesAction::Reinstate { source } => cmd_sources_reinstate(&config, &source).await,
            SourcesAction::Rescore { apply } => cmd_sources_rescore(&config, apply).await,
        },
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(&config).await,
        },
    }
}

fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    Ok(config)
}

fn open_store(config: &AppConfig) -> Result<JsonFileStore> {
    Ok(JsonFileStore::new(config.store_path()?))
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_run(config: AppConfig, seeds: Option<&Path>, out: Option<&Path>) -> Result<()> {
    let store = open_store(&config)?;
    info!(store = %store.path().display(), workers = config.run.workers, "preparing run");

    let mut seed_sources: Vec<Arc<dyn SeedSource>> =
        vec![Arc::new(StaticSeeds(config.seeds.clone()))];
    if let Some(path) = seeds {
        seed_sources.push(Arc::new(SeedFile::new(path)));
    }

    let fetch = HttpFetcher::new(&config.fetch)?;
    let coordinator = Coordinator::new(
        config,
        Arc::new(fetch),
        Arc::new(store),
        Arc::new(ChainedSeeds(seed_sources)),
    );

    let reporter = CliProgress::new();
    let summary = match coordinator.run(&reporter).await {
        Ok(summary) => summary,
        Err(aborted) => {
            reporter.spinner.finish_and_clear();
            if !aborted.outcomes.is_empty() {
                warn!(
                    outcomes = aborted.outcomes.len(),
                    "validated outcomes were not persisted"
                );
            }
            return Err(aborted.into());
        }
    };

    if let Some(path) = out {
        let json = serde_json::to_string_pretty(&summary)?;
        std::fs::write(path, json)
            .wrap_err_with(|| format!("failed to write summary to {}", path.display()))?;
    }

    print_summary(&summary, out);
    Ok(())
}

fn print_summary(summary: &RunSummary, out: Option<&Path>) {
    let elapsed = summary
        .finished_at
        .map(|end| (end - summary.started_at).num_milliseconds() as f64 / 1000.0)
        .unwrap_or_default();

    println!();
    println!("  Run complete");
    println!("  Run ID:    {}", summary.run_id);
    println!("  Accepted:  {}", summary.accepted_count);
    println!("  Rejected:  {}", summary.rejected_count);
    println!("  Timed out: {}", summary.timed_out_count);
    println!("  Records:   {}", summary.content_records.len());
    println!("  Updated:   {} sources", summary.updated_sources.len());
    println!("  Time:      {elapsed:.1}s");
    if let Some(path) = out {
        println!("  Summary:   {}", path.display());
    }
    println!();
}

async fn cmd_sources_list(config: &AppConfig, status: Option<SourceStatus>) -> Result<()> {
    let store = open_store(config)?;
    let sources = sources::list_sources(&store, status).await?;

    if sources.is_empty() {
        println!("No sources.");
        return Ok(());
    }

    println!(
        "{:<32}  {:<11}  {:>5}  {:>4}  {:<5}  URL",
        "ID", "STATUS", "SCORE", "FAIL", "LANG"
    );
    for s in &sources {
        let status = if s.probation {
            format!("{}*", s.status)
        } else {
            s.status.to_string()
        };
        println!(
            "{:<32}  {:<11}  {:>5.2}  {:>4}  {:<5}  {}",
            s.id, status, s.trust_score, s.consecutive_failures, s.language, s.url
        );
    }
    println!("\n{} sources (* on probation)", sources.len());
    Ok(())
}

async fn cmd_sources_reinstate(config: &AppConfig, source: &str) -> Result<()> {
    let store = open_store(config)?;
    let reinstated = sources::reinstate(&store, source).await?;
    println!(
        "Source {} ({}) is on probation and will be re-checked next run.",
        reinstated.id, reinstated.url
    );
    Ok(())
}

async fn cmd_sources_rescore(config: &AppConfig, apply: bool) -> Result<()> {
    let store = open_store(config)?;
    let report = sources::rescore(&store, &config.trust, apply).await?;

    let drifted: Vec<&Rescore> = report.iter().filter(|r| r.drift() > 1e-9).collect();
    for r in &drifted {
        println!(
            "{:<32}  stored {:.3}  replayed {:.3}",
            r.source_id, r.stored, r.replayed
        );
    }
    let verb = if apply { "updated" } else { "would change" };
    println!(
        "{} of {} sources {verb}.",
        drifted.len(),
        report.len()
    );
    Ok(())
}

async fn cmd_report(config: &AppConfig, window: usize, json: bool) -> Result<()> {
    let store = open_store(config)?;
    let report = sources::report(&store, &config.discovery.patterns, window).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    print_report(&report);
    Ok(())
}

fn print_report(report: &LearningReport) {
    let pct = |rate: Option<f64>| match rate {
        Some(r) => format!("{:.0}%", r * 100.0),
        None => "-".to_string(),
    };

    println!();
    println!("  Runs completed: {}", report.runs);

    println!();
    println!(
        "  {:<20}  {:>6}  {:>6}  {:>5}  {:>5}  COOLDOWN",
        "PATTERN", "ACCEPT", "REJECT", "RATE", "LAST"
    );
    if report.patterns.is_empty() {
        println!("  (no patterns)");
    }
    for p in &report.patterns {
        let cooldown = match (p.cooling_down, p.disabled_through_run) {
            (true, Some(run)) => format!("through run {run}"),
            _ => "-".to_string(),
        };
        println!(
            "  {:<20}  {:>6}  {:>6}  {:>5}  {:>5}  {cooldown}",
            p.id,
            p.accepted,
            p.rejected,
            pct(p.rate()),
            pct(p.last_rate)
        );
    }

    println!();
    println!("  {:<20}  {:>6}  {:>6}  {:>5}", "STRATEGY", "ACCEPT", "REJECT", "RATE");
    for s in &report.strategies {
        println!(
            "  {:<20}  {:>6}  {:>6}  {:>5}",
            s.strategy,
            s.accepted,
            s.rejected,
            pct(s.rate())
        );
    }
    if let Some(best) = &report.recommended_strategy {
        println!("  Best strategy: {best}");
    }

    println!();
    println!(
        "  {:<20}  {:>7}  {:>7}  {:>11}  {:>8}",
        "CATEGORY", "SOURCES", "TRUSTED", "QUARANTINED", "REJECTED"
    );
    for c in &report.categories {
        println!(
            "  {:<20}  {:>7}  {:>7}  {:>11}  {:>8}",
            c.category, c.sources, c.trusted, c.quarantined, c.rejected
        );
    }

    println!();
    println!("  Discovery: {}", report.convergence);
    println!();
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(config: &AppConfig) -> Result<()> {
    let toml_str = toml::to_string_pretty(config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
            spinner.set_style(
                style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
            );
        }
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn stage(&self, stage: RunStage) {
        let msg = match stage {
            RunStage::Init => "Loading store",
            RunStage::Discover => "Discovering candidates",
            RunStage::Validate => "Validating candidates",
            RunStage::Retrieve => "Retrieving accepted content",
            RunStage::Learn => "Updating trust scores",
            RunStage::Persist => "Saving store",
            RunStage::Done => "Done",
            RunStage::Failed => "Failed",
        };
        self.spinner.set_message(msg);
    }

    fn candidate_validated(&self, outcome: &ValidationOutcome, done: usize, total: usize) {
        self.spinner.set_message(format!(
            "Validating [{done}/{total}] {} {}",
            outcome.source_id, outcome.reason
        ));
    }

    fn finished(&self, _summary: &RunSummary) {
        self.spinner.finish_and_clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_run_flags() {
        let cli = Cli::try_parse_from([
            "feedscout", "run", "--seeds", "seeds.txt", "--workers", "8", "--timeout", "60",
            "--out", "summary.json",
        ])
        .unwrap();
        match cli.command {
            Command::Run {
                seeds,
                workers,
                timeout,
                out,
            } => {
                assert_eq!(seeds, Some(PathBuf::from("seeds.txt")));
                assert_eq!(workers, Some(8));
                assert_eq!(timeout, Some(60));
                assert_eq!(out, Some(PathBuf::from("summary.json")));
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn patterns_alias_parses_report() {
        let cli =
            Cli::try_parse_from(["feedscout", "patterns", "--window", "5", "--json"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Report {
                window: 5,
                json: true
            }
        ));

        let cli = Cli::try_parse_from(["feedscout", "report"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Report {
                window: 3,
                json: false
            }
        ));
    }

    #[test]
    fn parses_source_status_filter() {
        let cli =
            Cli::try_parse_from(["feedscout", "sources", "list", "--status", "quarantined"])
                .unwrap();
        assert!(matches!(
            cli.command,
            Command::Sources {
                action: SourcesAction::List {
                    status: Some(SourceStatus::Quarantined)
                }
            }
        ));
        assert!(Cli::try_parse_from(["feedscout", "sources", "list", "--status", "bogus"]).is_err());
    }
}
