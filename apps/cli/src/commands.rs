//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;

use bylines_core::{
    ProgressReporter, RunConfig, RunSummary, SyncOutcome, backfill_twitter, run_source,
    search_reporters, sync_search_results,
};
use bylines_fetcher::TwitterClient;
use bylines_shared::{
    AppConfig, init_config, load_config, load_config_from, resolve_store_path,
    twitter_api_key, validate_store_credentials,
};
use bylines_storage::{DirectoryStore, LibsqlDirectory, MemoryDirectory};
use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// bylines: keep a reporter directory in sync with news site bylines.
#[derive(Parser)]
#[command(
    name = "bylines",
    version,
    about = "Scrape reporter bylines from news sources and sync them into a contact directory.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Config file (defaults to ~/.bylines/bylines.toml).
    #[arg(long, env = "BYLINES_CONFIG", global = true)]
    pub config: Option<PathBuf>,

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

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Scrape one source and synchronize its reporters into the directory.
    Run {
        /// Source name from the config file.
        source: String,

        /// Reconcile and print reporters without writing to the directory.
        #[arg(long)]
        dry_run: bool,

        /// Print the run summary as JSON.
        #[arg(long)]
        json: bool,
    },

    /// List configured sources.
    Sources,

    /// Look up a Twitter/X profile for every directory record that has none.
    TwitterBackfill {
        /// Report matches without writing them.
        #[arg(long)]
        dry_run: bool,

        /// Print the summary as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Discover reporters through Twitter/X user search and add new ones.
    TwitterSearch {
        /// Override the configured queries (repeatable).
        #[arg(long = "query")]
        queries: Vec<String>,

        /// List discovered reporters without writing them.
        #[arg(long)]
        dry_run: bool,

        /// Print the summary as JSON.
        #[arg(long)]
        json: bool,
    },

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
        0 => "bylines=info",
        1 => "bylines=debug",
        _ => "bylines=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt().with_env_filter(env_filter).with_target(false).init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config;
    match cli.command {
        Command::Run {
            source,
            dry_run,
            json,
        } => cmd_run(config_path, &source, dry_run, json).await,
        Command::Sources => cmd_sources(config_path),
        Command::TwitterBackfill { dry_run, json } => {
            cmd_twitter_backfill(config_path, dry_run, json).await
        }
        Command::TwitterSearch {
            queries,
            dry_run,
            json,
        } => cmd_twitter_search(config_path, queries, dry_run, json).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(config_path),
        },
    }
}

fn read_config(path: Option<PathBuf>) -> Result<AppConfig> {
    Ok(match path {
        Some(p) => load_config_from(&p)?,
        None => load_config()?,
    })
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_run(
    config_path: Option<PathBuf>,
    source: &str,
    dry_run: bool,
    json: bool,
) -> Result<()> {
    let config = read_config(config_path)?;
    let source = config.source(source)?.clone();

    let run_config = RunConfig {
        source,
        fetch: config.fetch.clone(),
        dry_run,
    };

    info!(source = %run_config.source.name, dry_run, "running source");

    let reporter = CliProgress::new();
    let summary = if dry_run {
        run_source(&run_config, &MemoryDirectory::new(), &reporter).await?
    } else {
        // Credentials are checked before any page is fetched.
        let token = validate_store_credentials(&config.store)?;
        let store = open_store(&config, token).await?;
        run_source(&run_config, store.as_ref(), &reporter).await?
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!();
    if summary.dry_run {
        println!("  Dry run: {} reporters found", summary.reporters.len());
        for r in &summary.reporters {
            let title = if r.title_role.is_empty() { "-" } else { r.title_role.as_str() };
            println!("  - {} ({title}), {} articles", r.display_name, r.articles.len());
        }
    } else {
        println!("  Source:  {}", summary.source);
        println!("  Added:   {}", summary.sync.added);
        println!("  Updated: {}", summary.sync.updated);
        println!("  Failed:  {}", summary.sync.failed);
    }
    println!("  Pages:   {}", summary.pages);
    println!("  Time:    {:.1}s", summary.elapsed.as_secs_f64());
    println!();

    Ok(())
}

async fn open_store(config: &AppConfig, token: Option<String>) -> Result<Box<dyn DirectoryStore>> {
    match (&config.store.url, token) {
        (Some(url), Some(token)) => {
            info!(%url, "opening remote directory");
            Ok(Box::new(LibsqlDirectory::open_remote(url, &token).await?))
        }
        (Some(_), None) => Err(eyre!("remote directory configured without a token")),
        (None, _) => {
            let path = resolve_store_path(&config.store)?;
            info!(path = %path.display(), "opening local directory");
            Ok(Box::new(LibsqlDirectory::open(&path).await?))
        }
    }
}

fn twitter_client(config: &AppConfig) -> Result<TwitterClient> {
    let api_key = twitter_api_key(&config.twitter)?;
    Ok(TwitterClient::new(&config.twitter, api_key)?)
}

async fn cmd_twitter_backfill(
    config_path: Option<PathBuf>,
    dry_run: bool,
    json: bool,
) -> Result<()> {
    let config = read_config(config_path)?;
    let client = twitter_client(&config)?;
    let token = validate_store_credentials(&config.store)?;
    let store = open_store(&config, token).await?;

    info!(dry_run, "running twitter backfill");
    let summary = backfill_twitter(store.as_ref(), &client, dry_run).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!();
    println!("  Records:      {}", summary.records);
    println!("  Already had:  {}", summary.already_had);
    println!("  Found:        {}", summary.found);
    println!("  Not found:    {}", summary.not_found);
    println!("  Updated:      {}", summary.updated);
    println!("  Failed:       {}", summary.failed);
    println!();
    Ok(())
}

async fn cmd_twitter_search(
    config_path: Option<PathBuf>,
    queries: Vec<String>,
    dry_run: bool,
    json: bool,
) -> Result<()> {
    let config = read_config(config_path)?;
    let client = twitter_client(&config)?;
    let queries = if queries.is_empty() {
        config.twitter.queries.clone()
    } else {
        queries
    };
    if queries.is_empty() {
        return Err(eyre!("no search queries configured"));
    }

    let reporters = search_reporters(&client, &queries, config.twitter.max_pages).await;

    if dry_run {
        if json {
            println!("{}", serde_json::to_string_pretty(&reporters)?);
            return Ok(());
        }
        println!();
        println!("  Dry run: {} reporters found", reporters.len());
        for r in &reporters {
            println!("  - {} ({})", r.display_name, r.contacts.twitter);
        }
        println!();
        return Ok(());
    }

    let token = validate_store_credentials(&config.store)?;
    let store = open_store(&config, token).await?;
    let summary = sync_search_results(store.as_ref(), &reporters).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!();
    println!("  Found:    {}", summary.found);
    println!("  Added:    {}", summary.added);
    println!("  Existing: {}", summary.existing);
    println!("  Failed:   {}", summary.failed);
    println!();
    Ok(())
}

fn cmd_sources(config_path: Option<PathBuf>) -> Result<()> {
    let config = read_config(config_path)?;
    if config.sources.is_empty() {
        println!("No sources configured. Add [[sources]] tables to your config file.");
        return Ok(());
    }
    for s in &config.sources {
        println!(
            "{:<16} {:<9} {} (roster: {})",
            s.name,
            format!("{:?}", s.mode).to_lowercase(),
            s.listing_url,
            s.roster.len()
        );
    }
    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(config_path: Option<PathBuf>) -> Result<()> {
    let config = read_config(config_path)?;
    let toml_str = toml::to_string_pretty(&config)?;
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

// A failed run never reaches `done`; the spinner must not outlive it.
impl Drop for CliProgress {
    fn drop(&mut self) {
        if !self.spinner.is_finished() {
            self.spinner.finish_and_clear();
        }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn page_fetched(&self, url: &str, page: u32, observations: usize) {
        self.spinner
            .set_message(format!("Listing page {page}: {observations} bylines from {url}"));
    }

    fn reporter_synced(&self, name: &str, outcome: &SyncOutcome) {
        let status = match outcome {
            SyncOutcome::Created(_) => "added",
            SyncOutcome::Updated(_) => "updated",
            SyncOutcome::Failed(_) => "failed",
        };
        self.spinner.set_message(format!("{status}: {name}"));
    }

    fn done(&self, _summary: &RunSummary) {
        self.spinner.finish_and_clear();
    }
}
