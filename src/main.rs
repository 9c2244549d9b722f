// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use console::Emoji;
use indicatif::{HumanBytes, MultiProgress, ProgressBar, ProgressStyle};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing_subscriber::EnvFilter;

use castsync::{
    ChannelReporter, ConfigError, DEFAULT_MAX_REDIRECTS, LogReporter, ProgressEvent,
    ReqwestClient, Registry, SharedProgressReporter, SyncConfig, sync_feeds,
};

// Emoji with fallback for terminals without Unicode support
static SATELLITE: Emoji<'_, '_> = Emoji("📡 ", "");
static SEARCH: Emoji<'_, '_> = Emoji("🔍 ", "[~] ");
static DOWNLOAD: Emoji<'_, '_> = Emoji("📥 ", "[v] ");
static SUCCESS: Emoji<'_, '_> = Emoji("✅ ", "[+] ");
static FAILURE: Emoji<'_, '_> = Emoji("❌ ", "[!] ");
static PARTY: Emoji<'_, '_> = Emoji("🎉 ", "[*] ");
static CROSS: Emoji<'_, '_> = Emoji("✗ ", "x ");

/// Keep local directories in sync with a registry of podcast feeds
#[derive(Parser, Debug)]
#[command(name = "castsync")]
#[command(about = "Keep local directories in sync with a registry of podcast feeds")]
#[command(version)]
struct Args {
    /// Path of the feed registry file
    #[arg(short = 'c', long, default_value = "./config.json", global = true)]
    config: PathBuf,

    /// Workers per feed unless the feed sets its own
    #[arg(long, default_value = "3", global = true)]
    concurrent: usize,

    /// Per-request timeout in seconds
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// Redirects followed per item before giving up
    #[arg(long, default_value_t = DEFAULT_MAX_REDIRECTS, global = true)]
    max_redirects: usize,

    /// Log every step instead of drawing progress bars
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List configured feeds
    List,

    /// Register a new feed and sync it
    Add { name: String, url: String },

    /// Point an existing feed at a new URL and sync it
    Update { name: String, url: String },

    /// Sync every feed, or only the named ones
    #[command(alias = "refresh")]
    Sync { names: Vec<String> },
}

/// Draws one spinner per worker slot from the progress event stream
struct Renderer {
    multi: MultiProgress,
    main_bar: ProgressBar,
    workers: HashMap<usize, ProgressBar>,
}

impl Renderer {
    fn new() -> Self {
        let multi = MultiProgress::new();
        let main_bar = multi.add(ProgressBar::new_spinner());
        main_bar.set_style(spinner_style("{spinner:.green} {wide_msg}"));
        main_bar.enable_steady_tick(Duration::from_millis(100));

        Self {
            multi,
            main_bar,
            workers: HashMap::new(),
        }
    }

    fn worker_bar(&mut self, worker_id: usize) -> &ProgressBar {
        let multi = &self.multi;
        self.workers.entry(worker_id).or_insert_with(|| {
            let bar = multi.add(ProgressBar::new_spinner());
            bar.set_style(spinner_style("  {spinner:.cyan} {wide_msg}"));
            bar
        })
    }

    fn clear_workers(&mut self) {
        for (_, bar) in self.workers.drain() {
            bar.finish_and_clear();
        }
    }

    fn handle(&mut self, event: ProgressEvent) {
        match &event {
            ProgressEvent::FeedStarted { feed, .. } => {
                self.main_bar
                    .set_message(format!("{SATELLITE}Updating {}", feed.bold().green()));
            }

            ProgressEvent::FetchingFeed { url } => {
                self.main_bar
                    .set_message(format!("{SEARCH}Fetching feed: {}", url.cyan()));
            }

            ProgressEvent::FeedParsed { feed, total_items } => {
                self.main_bar.set_message(format!(
                    "{SATELLITE}{} • {} items",
                    feed.bold().green(),
                    total_items.to_string().cyan()
                ));
            }

            ProgressEvent::DownloadStarting { worker_id, .. }
            | ProgressEvent::DownloadProgress { worker_id, .. } => {
                let line = format!("{DOWNLOAD}{}", event.status_line());
                self.worker_bar(*worker_id).set_message(line);
            }

            ProgressEvent::ItemCompleted { worker_id, .. }
            | ProgressEvent::ItemCached { worker_id, .. } => {
                let line = format!("{SUCCESS}{}", event.status_line());
                self.worker_bar(*worker_id).set_message(line);
            }

            ProgressEvent::ItemFailed { worker_id, .. } => {
                let line = format!("{FAILURE}{}", event.status_line().red());
                self.multi.println(&line).ok();
                self.worker_bar(*worker_id).set_message(line);
            }

            ProgressEvent::FeedCompleted {
                feed,
                total_bytes,
                completed,
                failed,
            } => {
                self.clear_workers();
                self.multi
                    .println(format!(
                        "{PARTY}{} {} items, {} total, {} failed",
                        format!("{feed}:").bold().green(),
                        completed.to_string().green().bold(),
                        HumanBytes(*total_bytes).to_string().cyan(),
                        if *failed > 0 {
                            failed.to_string().red().bold()
                        } else {
                            failed.to_string().green()
                        }
                    ))
                    .ok();
            }

            ProgressEvent::FeedFailed { .. } => {
                self.clear_workers();
                self.multi
                    .println(format!("{FAILURE}{}", event.status_line().red()))
                    .ok();
            }

            ProgressEvent::WorkerFinished { worker_id } => {
                self.worker_bar(*worker_id).set_message("Idle".dimmed().to_string());
            }

            _ => {
                if let Some(worker_id) = event.worker_id() {
                    let line = event.status_line();
                    self.worker_bar(worker_id).set_message(line);
                }
            }
        }

        for bar in self.workers.values() {
            bar.tick();
        }
    }

    fn finish(mut self) {
        self.clear_workers();
        self.main_bar.finish_and_clear();
    }
}

fn spinner_style(template: &str) -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template(template)
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

async fn render(mut events: UnboundedReceiver<ProgressEvent>) {
    let mut renderer = Renderer::new();
    while let Some(event) = events.recv().await {
        renderer.handle(event);
    }
    renderer.finish();
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "warn" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run_sync(registry: &Registry, names: &[String], config: &SyncConfig) -> Result<()> {
    for name in names {
        if registry.find(name).is_none() {
            println!("{CROSS}No such feed {}", name.yellow());
        }
    }

    let base_dir = std::env::current_dir().context("Failed to determine working directory")?;
    let feeds = registry.select(names, &base_dir, config.default_concurrency);
    let client = ReqwestClient::with_timeout(config.request_timeout)
        .context("Failed to build HTTP client")?;

    let report = if config.verbose {
        let reporter: SharedProgressReporter = Arc::new(LogReporter);
        sync_feeds(&client, &feeds, config, reporter).await
    } else {
        let (reporter, events) = ChannelReporter::new();
        let renderer = tokio::spawn(render(events));
        let report = sync_feeds(&client, &feeds, config, Arc::new(reporter)).await;
        renderer.await.context("Progress renderer crashed")?;
        report
    };

    let failed_items: Vec<_> = report
        .feeds
        .iter()
        .flat_map(|feed| feed.failed_items.iter().map(move |item| (&feed.feed, item)))
        .collect();

    if !failed_items.is_empty() {
        println!("\n{}", "Failed items:".red().bold());
        for (feed, (title, error)) in failed_items {
            println!(
                "  {}{} / {} - {}",
                CROSS,
                feed.cyan(),
                title.yellow(),
                error.dimmed()
            );
        }
    }

    if !report.failed_feeds.is_empty() {
        println!("\n{}", "Failed feeds:".red().bold());
        for (feed, error) in &report.failed_feeds {
            println!("  {}{} - {}", CROSS, feed.yellow(), error.dimmed());
        }
    }

    println!(
        "\n{PARTY}{} {}",
        "Total size:".bold().green(),
        HumanBytes(report.total_bytes()).to_string().cyan()
    );

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let config = SyncConfig {
        config_path: args.config,
        default_concurrency: args.concurrent,
        verbose: args.verbose,
        request_timeout: args.timeout.map(Duration::from_secs),
        max_redirects: args.max_redirects,
    };

    let mut registry = Registry::load(&config.config_path)
        .await
        .context("Failed to load feed registry")?;

    match args.command.unwrap_or(Command::List) {
        Command::List => {
            if registry.feeds.is_empty() {
                println!(
                    "No feeds configured in {}",
                    config.config_path.display().to_string().cyan()
                );
            }
            for name in registry.names() {
                println!("{name}");
            }
        }

        Command::Add { name, url } => match registry.add(&name, &url) {
            Ok(()) => {
                registry
                    .save(&config.config_path)
                    .await
                    .context("Failed to save feed registry")?;
                run_sync(&registry, &[name], &config).await?;
            }
            Err(ConfigError::DuplicateFeed(name)) => {
                println!("{CROSS}Feed {} already exists", name.yellow());
            }
            Err(e) => return Err(e).context("Failed to add feed"),
        },

        Command::Update { name, url } => match registry.update(&name, &url) {
            Ok(()) => {
                registry
                    .save(&config.config_path)
                    .await
                    .context("Failed to save feed registry")?;
                run_sync(&registry, &[name], &config).await?;
            }
            Err(ConfigError::UnknownFeed(name)) => {
                println!("{CROSS}No such feed {} found", name.yellow());
            }
            Err(e) => return Err(e).context("Failed to update feed"),
        },

        Command::Sync { names } => run_sync(&registry, &names, &config).await?,
    }

    Ok(())
}
