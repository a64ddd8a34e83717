//! CLI command definitions, routing, and tracing setup.

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::Result;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use newsrouter_core::{
    BridgeReasoner, KeywordPlanner, Orchestrator, PipelineOutcome, Planner, ProgressReporter,
    Reasoner, RunOptions, StageRegistry, StubReasoner,
};
use newsrouter_shared::{
    AppConfig, PipelineRequest, StageOutput, init_config, load_config, resolve_credentials,
};
use newsrouter_sources::{Aggregator, FallbackDataset, SourceClient, source_client_from_config};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// NewsRouter: fetch headlines from several sources and run them through stages.
#[derive(Parser)]
#[command(
    name = "newsrouter",
    version,
    about = "Aggregate headlines from multiple sources and route them through summarization, classification and analysis stages.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Result output format.
#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Fetch sources and run a stage sequence over them.
    Run {
        /// Source identifier (repeatable). Defaults to the configured set.
        #[arg(short, long = "source")]
        sources: Vec<String>,

        /// Stage id, applied in order (repeatable or comma-separated).
        #[arg(long = "stage", value_delimiter = ',')]
        stages: Vec<String>,

        /// Maximum items per source.
        #[arg(short = 'n', long)]
        limit: Option<usize>,

        /// Free-form request, resolved into sources, stages and limit.
        /// Explicit flags take precedence over what it resolves to.
        #[arg(short, long)]
        query: Option<String>,

        /// Overall deadline for source retrieval, in seconds.
        #[arg(long)]
        deadline_secs: Option<u64>,

        /// Skip live retrieval and serve fallback data only.
        #[arg(long)]
        offline: bool,

        /// Output format for the result.
        #[arg(long, default_value = "text")]
        format: OutputFormat,
    },

    /// Show how a free-form request would be resolved, without running it.
    Plan {
        /// Request text.
        text: String,
    },

    /// List sources with built-in fallback data and the live retrieval status.
    Sources,

    /// List registered stages.
    Stages,

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "newsrouter=info",
        1 => "newsrouter=debug",
        _ => "newsrouter=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    // Logs go to stderr so `--format json` output stays machine-readable.
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
    match cli.command {
        Command::Run {
            sources,
            stages,
            limit,
            query,
            deadline_secs,
            offline,
            format,
        } => {
            let args = RunArgs {
                sources,
                stages,
                limit,
                query,
                deadline: deadline_secs.map(Duration::from_secs),
                offline,
                format,
            };
            cmd_run(args).await
        }
        Command::Plan { text } => cmd_plan(&text).await,
        Command::Sources => cmd_sources(),
        Command::Stages => cmd_stages(),
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

struct RunArgs {
    sources: Vec<String>,
    stages: Vec<String>,
    limit: Option<usize>,
    query: Option<String>,
    deadline: Option<Duration>,
    offline: bool,
    format: OutputFormat,
}

async fn cmd_run(args: RunArgs) -> Result<()> {
    let config = load_config()?;
    let registry = StageRegistry::from_config(&config);
    let request = build_request(&config, &registry, &args).await?;

    let client = if args.offline {
        SourceClient::offline(Arc::new(
            FallbackDataset::builtin().with_extra(&config.fallback),
        ))
    } else {
        source_client_from_config(&config)?
    };
    let aggregator = Aggregator::new(client, config.defaults.sources.clone());

    let (reasoner, bridge) = select_reasoner(&config).await;

    let orchestrator = Orchestrator::new(
        aggregator,
        registry,
        reasoner,
        config.classification.clone(),
    );

    info!(
        stages = ?request.stages,
        sources = ?request.sources,
        limit = request.limit,
        "running pipeline"
    );

    let options = RunOptions {
        fetch_deadline: args.deadline,
    };
    let reporter = CliProgress::new();
    let outcome = orchestrator.run(&request, &options, &reporter).await;
    reporter.finish();

    if let Some(bridge) = &bridge {
        bridge.shutdown().await;
    }

    let outcome = outcome?;
    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&outcome)?),
        OutputFormat::Text => print_outcome(&outcome),
    }
    Ok(())
}

/// The configured bridge when it starts, the keyword stub otherwise.
///
/// The typed bridge handle is returned too so it can be shut down after the run.
async fn select_reasoner(config: &AppConfig) -> (Arc<dyn Reasoner>, Option<Arc<BridgeReasoner>>) {
    let stub = || -> Arc<dyn Reasoner> {
        Arc::new(StubReasoner::new(config.classification.keywords.clone()))
    };

    if config.bridge.cmd.is_none() {
        return (stub(), None);
    }
    match BridgeReasoner::spawn(&config.bridge).await {
        Ok(bridge) => {
            let bridge = Arc::new(bridge);
            (bridge.clone() as Arc<dyn Reasoner>, Some(bridge))
        }
        Err(e) => {
            warn!(error = %e, "reasoning bridge unavailable, using keyword stub");
            (stub(), None)
        }
    }
}

/// Merge `--query` resolution with explicit flags.
async fn build_request(
    config: &AppConfig,
    registry: &StageRegistry,
    args: &RunArgs,
) -> Result<PipelineRequest> {
    let mut request = match &args.query {
        Some(text) => {
            KeywordPlanner::new(registry.clone(), config.defaults.limit)
                .resolve_intent(text)
                .await?
        }
        None => PipelineRequest::new(Vec::new(), Vec::new(), config.defaults.limit)?,
    };

    if !args.stages.is_empty() {
        request.stages = args.stages.clone();
    }
    if !args.sources.is_empty() {
        request.sources = args.sources.clone();
    }
    if let Some(limit) = args.limit {
        request.limit = limit;
    }
    request.validate()?;
    Ok(request)
}

async fn cmd_plan(text: &str) -> Result<()> {
    let config = load_config()?;
    let planner = KeywordPlanner::new(StageRegistry::from_config(&config), config.defaults.limit);
    let request = planner.resolve_intent(text).await?;

    let sources = if request.sources.is_empty() {
        format!("(defaults: {})", config.defaults.sources.join(", "))
    } else {
        request.sources.join(", ")
    };

    println!();
    println!("  Stages:  {}", request.stages.join(" -> "));
    println!("  Sources: {sources}");
    println!("  Limit:   {}", request.limit);
    println!();
    Ok(())
}

fn cmd_sources() -> Result<()> {
    let config = load_config()?;
    let fallback = FallbackDataset::builtin().with_extra(&config.fallback);

    match resolve_credentials(&config.reddit) {
        Ok(_) => println!("Live retrieval: enabled"),
        Err(missing) => println!("Live retrieval: disabled (missing {})", missing.join(", ")),
    }
    println!("Default sources: {}", config.defaults.sources.join(", "));
    println!();
    println!("Sources with fallback data:");
    for source in fallback.sources() {
        println!("  r/{source}");
    }
    Ok(())
}

fn cmd_stages() -> Result<()> {
    let config = load_config()?;
    let registry = StageRegistry::from_config(&config);

    println!("{:<22} {:<13} {:<12}", "STAGE", "SHAPE", "CATEGORY");
    for def in registry.iter() {
        println!(
            "{:<22} {:<13} {:<12}",
            def.id,
            format!("{:?}", def.shape),
            def.category.as_deref().unwrap_or("-"),
        );
    }
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

fn print_outcome(outcome: &PipelineOutcome) {
    println!();
    match &outcome.result.output {
        StageOutput::Items(items) if items.is_empty() => {
            println!("  (no items)");
        }
        StageOutput::Items(items) => {
            for (source, headlines) in items.iter() {
                match outcome.source_modes.get(source) {
                    Some(mode) => println!("  r/{source} ({})", mode.as_str()),
                    None => println!("  r/{source}"),
                }
                for headline in headlines {
                    println!("    - {headline}");
                }
            }
        }
        StageOutput::Categorized(categories) => {
            for (category, items) in categories.iter() {
                println!("  [{category}]");
                for (source, headlines) in items.iter() {
                    for headline in headlines {
                        println!("    - {headline} (r/{source})");
                    }
                }
            }
        }
    }

    if !outcome.ledger.is_empty() {
        println!();
        println!("  Issues ({}):", outcome.ledger.len());
        for entry in outcome.ledger.entries() {
            println!("    {} {}: {}", entry.kind, entry.origin, entry.message);
        }
    }

    println!();
    println!(
        "  Run {} {:?} in {:.1}s",
        outcome.run_id,
        outcome.state,
        outcome.elapsed_ms as f64 / 1000.0
    );
    println!();
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
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(Duration::from_millis(80));
        Self { spinner }
    }

    /// Clear the spinner even when the run ended in an error.
    fn finish(&self) {
        if !self.spinner.is_finished() {
            self.spinner.finish_and_clear();
        }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn stage_started(&self, index: usize, total: usize, stage: &str) {
        self.spinner
            .set_message(format!("Stage [{}/{total}] {stage}", index + 1));
    }

    fn done(&self, _outcome: &PipelineOutcome) {
        self.spinner.finish_and_clear();
    }
}
