//! Darkwatch main entry point
//!
//! This is the command-line interface for the Darkwatch forum crawler.

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use darkwatch::alert::{known_findings, AlertFeed, AlertSink, FeedSource, LogHook, SeenStore};
use darkwatch::batch::{manifest_path, plan_chunks, BatchManifest, BatchRunner, CrawlChunkExecutor};
use darkwatch::config::{load_config, load_config_with_hash, Config};
use darkwatch::crawler::{run_crawl, CrawlOptions, FetchStrategy};
use darkwatch::output;
use darkwatch::storage::RecordSink;
use darkwatch::triage::{resolve_input, run_pipeline, PipelineKind};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Darkwatch: a forum-harvesting crawler
///
/// Darkwatch walks forum listing pages over clear-web or onion transports,
/// extracts threads and posts with per-forum selector profiles, and triages
/// the resulting JSONL logs into scored keep/review/drop outputs.
#[derive(Parser, Debug)]
#[command(name = "darkwatch")]
#[command(version = "1.0.0")]
#[command(about = "A forum-harvesting crawler", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate a configuration and show what would be crawled
    Check {
        #[arg(value_name = "CONFIG")]
        config: PathBuf,
    },

    /// Crawl one or more forums into a JSONL log
    Crawl(CrawlArgs),

    /// Filter, tag and score a crawl log
    Triage(TriageArgs),

    /// Crawl a large page range in chunks with strategy escalation
    Batch(BatchArgs),

    /// List findings from crawl logs, or follow them as they appear
    Alerts(AlertArgs),
}

#[derive(Args, Debug)]
struct CrawlArgs {
    #[arg(short, long, default_value = "darkwatch.toml")]
    config: PathBuf,

    /// Forum keys to crawl (defaults to every configured forum)
    #[arg(short, long, value_delimiter = ',')]
    forums: Vec<String>,

    /// List pages per seed
    #[arg(short, long)]
    pages: Option<u32>,

    #[arg(short, long, value_enum, default_value_t = EngineArg::Auto)]
    engine: EngineArg,

    /// Route traffic through the SOCKS proxy
    #[arg(long, conflicts_with = "no_proxy")]
    proxy: bool,

    /// Connect directly even if the config enables the proxy
    #[arg(long)]
    no_proxy: bool,

    /// Exact output log path instead of a timestamped one
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// Dispatch new findings while crawling
    #[arg(long)]
    alerts: bool,
}

#[derive(Args, Debug)]
struct TriageArgs {
    #[arg(short, long, default_value = "darkwatch.toml")]
    config: PathBuf,

    /// Crawl log to triage, or `latest`
    #[arg(short, long, default_value = "latest")]
    input: String,

    /// strict, relaxed or dual
    #[arg(short, long, default_value = "dual")]
    pipeline: PipelineKind,

    #[arg(long)]
    keep_threshold: Option<i32>,

    #[arg(long)]
    drop_threshold: Option<i32>,
}

#[derive(Args, Debug)]
struct BatchArgs {
    #[arg(short, long, default_value = "darkwatch.toml")]
    config: PathBuf,

    /// Forum key to crawl
    #[arg(short, long)]
    forum: String,

    /// Last list page of the range
    #[arg(long)]
    max_page: Option<u32>,

    /// Pages per chunk
    #[arg(long)]
    chunk_size: Option<u32>,

    /// Re-run only the failed chunks of an earlier manifest
    #[arg(long, value_name = "MANIFEST")]
    resume: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct AlertArgs {
    #[arg(short, long, default_value = "darkwatch.toml")]
    config: PathBuf,

    /// Crawl logs to read (defaults to every log in the log directory)
    #[arg(short, long)]
    logs: Vec<PathBuf>,

    /// Keep polling and print findings not yet seen
    #[arg(short, long)]
    follow: bool,

    /// Poll interval in seconds when following
    #[arg(long, default_value_t = 60)]
    interval: u64,

    /// Maximum findings listed without --follow
    #[arg(long, default_value_t = 50)]
    limit: usize,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum EngineArg {
    Auto,
    Lightweight,
    Browser,
}

impl EngineArg {
    fn strategy(self) -> Option<FetchStrategy> {
        match self {
            Self::Auto => None,
            Self::Lightweight => Some(FetchStrategy::Lightweight),
            Self::Browser => Some(FetchStrategy::Browser),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    match cli.command {
        Command::Check { config } => handle_check(&config),
        Command::Crawl(args) => handle_crawl(args).await,
        Command::Triage(args) => handle_triage(args),
        Command::Batch(args) => handle_batch(args).await,
        Command::Alerts(args) => handle_alerts(args).await,
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("darkwatch=info,warn"),
            1 => EnvFilter::new("darkwatch=debug,info"),
            2 => EnvFilter::new("darkwatch=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

fn load(path: &Path) -> anyhow::Result<Config> {
    tracing::info!("Loading configuration from: {}", path.display());
    match load_config(path) {
        Ok(config) => Ok(config),
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            Err(e.into())
        }
    }
}

/// Directory holding crawl logs, derived from the configured log path
fn log_dir(config: &Config) -> PathBuf {
    config
        .output
        .log_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Handles `check`: validates config and shows what would be crawled
fn handle_check(path: &Path) -> anyhow::Result<()> {
    let (config, hash) = load_config_with_hash(path)
        .with_context(|| format!("invalid configuration {}", path.display()))?;
    output::print_config_plan(&config, &hash);
    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(args: CrawlArgs) -> anyhow::Result<()> {
    let config = load(&args.config)?;

    let forums = if args.forums.is_empty() {
        config.forums.keys().cloned().collect()
    } else {
        args.forums.clone()
    };
    if forums.is_empty() {
        anyhow::bail!("no forums configured");
    }

    let use_proxy = if args.proxy {
        Some(true)
    } else if args.no_proxy {
        Some(false)
    } else {
        None
    };
    let options = CrawlOptions {
        strategy: args.engine.strategy(),
        max_pages: args.pages,
        use_proxy,
        log_path: args.out.clone(),
    };

    let mut extra: Vec<Box<dyn RecordSink>> = Vec::new();
    if args.alerts {
        let seen = SeenStore::load(&config.output.seen_ids_path)?;
        extra.push(Box::new(AlertSink::new(seen).with_hook(Box::new(LogHook))));
    }

    tracing::info!("Crawling {} forum(s): {}", forums.len(), forums.join(", "));
    match run_crawl(&config, &forums, &options, extra).await {
        Ok(summary) => {
            output::print_crawl_summary(&summary);
            Ok(())
        }
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            Err(e.into())
        }
    }
}

/// Handles `triage`: runs the selected passes over one log
fn handle_triage(args: TriageArgs) -> anyhow::Result<()> {
    let mut config = load(&args.config)?;
    if let Some(keep) = args.keep_threshold {
        config.triage.keep_threshold = keep;
    }
    if let Some(drop) = args.drop_threshold {
        config.triage.drop_threshold = drop;
    }

    let input = resolve_input(&args.input, &log_dir(&config))?;
    let summary = run_pipeline(&input, args.pipeline, &config.triage)?;
    output::print_triage_summary(&summary);
    Ok(())
}

/// Handles `batch`: chunked crawl, or resume of a saved manifest
async fn handle_batch(args: BatchArgs) -> anyhow::Result<()> {
    let config = load(&args.config)?;
    let batch = config.batch.clone();
    let log_base = config.output.log_path.clone();
    let runner = BatchRunner::new(CrawlChunkExecutor::new(config, &args.forum)?, &batch);

    let (manifest, path) = match &args.resume {
        Some(path) => {
            let previous = BatchManifest::load(path)
                .with_context(|| format!("cannot resume from {}", path.display()))?;
            if previous.forum != args.forum {
                anyhow::bail!(
                    "manifest {} belongs to forum '{}'",
                    path.display(),
                    previous.forum
                );
            }
            (runner.resume(previous).await, path.clone())
        }
        None => {
            let max_page = args.max_page.unwrap_or(batch.max_page);
            let chunk_size = args.chunk_size.unwrap_or(batch.chunk_size);
            let chunks = plan_chunks(max_page, chunk_size);
            tracing::info!(
                forum = %args.forum,
                "Planned {} chunk(s) of {} page(s) up to page {}",
                chunks.len(),
                chunk_size,
                max_page
            );
            let path = manifest_path(&log_base, &args.forum, chrono::Utc::now());
            (runner.run(&args.forum, &chunks).await, path)
        }
    };

    manifest.save(&path)?;
    output::print_batch_manifest(&manifest);
    println!("Manifest: {}", path.display());
    Ok(())
}

/// Handles `alerts`: lists known findings or follows new ones
async fn handle_alerts(args: AlertArgs) -> anyhow::Result<()> {
    let config = load(&args.config)?;
    let source = if args.logs.is_empty() {
        FeedSource::Directory(log_dir(&config))
    } else {
        FeedSource::Files(args.logs.clone())
    };

    if !args.follow {
        for finding in known_findings(&source.logs()?)?.iter().take(args.limit) {
            output::print_finding(finding);
        }
        return Ok(());
    }

    let seen = SeenStore::load(&config.output.seen_ids_path)?;
    let feed = AlertFeed::new(source, seen, Duration::from_secs(args.interval.max(1)));
    let (mut rx, handle) = feed.spawn(64);
    tracing::info!("Following findings every {}s (Ctrl-C to stop)", args.interval.max(1));

    loop {
        tokio::select! {
            finding = rx.recv() => match finding {
                Some(finding) => output::print_finding(&finding),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    drop(rx);
    let _ = handle.await;
    Ok(())
}
