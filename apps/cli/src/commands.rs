//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;
use url::Url;

use linkgraph_core::{BuildReport, GraphBuilder, Phase, PhaseReport, ProgressReporter};
use linkgraph_crawler::{LinkSource, WikipediaClient};
use linkgraph_shared::{
    AppConfig, BuildConfig, LinkGraphError, SourceConfig, StoreConfig, Table, init_config,
    load_config, load_config_from, load_seed_file,
};
use linkgraph_storage::{KeyValueStore, Storage};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// LinkGraph: build a link graph of articles from a list of seed titles.
#[derive(Parser)]
#[command(
    name = "linkgraph",
    version,
    about = "Build a graph of links between seed articles and store it as node and edge tables.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file to use instead of ~/.linkgraph/linkgraph.toml.
    #[arg(long, global = true, env = "LINKGRAPH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Database file (overrides `[store].path`).
    #[arg(long, global = true, env = "LINKGRAPH_DB")]
    pub db: Option<PathBuf>,

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
    /// Build the graph from a seed file.
    Build {
        /// JSON file of the form {"titles": [...]}.
        seeds: PathBuf,

        /// Maximum titles processed concurrently per phase.
        #[arg(short, long)]
        concurrency: Option<u32>,

        /// Fraction of failed titles (0.0..=1.0) a phase may have.
        #[arg(long)]
        max_failure_rate: Option<f64>,

        /// MediaWiki api.php endpoint.
        #[arg(long)]
        api_url: Option<String>,
    },

    /// Print every record of a table as JSON lines.
    Scan {
        /// Table to scan: nodes or edges.
        table: Table,
    },

    /// Delete a table and everything in it.
    Drop {
        /// Table to delete: nodes or edges.
        table: Table,

        /// Confirm the deletion.
        #[arg(long)]
        yes: bool,
    },

    /// List the tables in the catalog.
    Tables,

    /// Show one node's links and its edges.
    Node {
        /// Article title (case-sensitive).
        title: String,
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
        0 => "linkgraph=info",
        1 => "linkgraph=debug",
        _ => "linkgraph=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

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
    let ctx = Context {
        config_path: cli.config,
        db: cli.db,
    };
    match cli.command {
        Command::Build {
            seeds,
            concurrency,
            max_failure_rate,
            api_url,
        } => cmd_build(&ctx, &seeds, concurrency, max_failure_rate, api_url.as_deref()).await,
        Command::Scan { table } => cmd_scan(&ctx, table).await,
        Command::Drop { table, yes } => cmd_drop(&ctx, table, yes).await,
        Command::Tables => cmd_tables(&ctx).await,
        Command::Node { title } => cmd_node(&ctx, &title).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(&ctx).await,
        },
    }
}

/// Global flags shared by every command.
struct Context {
    config_path: Option<PathBuf>,
    db: Option<PathBuf>,
}

impl Context {
    fn app_config(&self) -> Result<AppConfig> {
        let config = match &self.config_path {
            Some(path) => load_config_from(path)?,
            None => load_config()?,
        };
        Ok(config)
    }

    fn store_config(&self, config: &AppConfig) -> Result<StoreConfig> {
        let mut store = StoreConfig::from_app(config)?;
        if let Some(db) = &self.db {
            store.path = db.clone();
        }
        Ok(store)
    }

    async fn open_readonly(&self) -> Result<Storage> {
        let config = self.app_config()?;
        let store = self.store_config(&config)?;
        Ok(Storage::open_readonly(&store.path).await?)
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_build(
    ctx: &Context,
    seeds_path: &Path,
    concurrency: Option<u32>,
    max_failure_rate: Option<f64>,
    api_url: Option<&str>,
) -> Result<()> {
    let config = ctx.app_config()?;
    let store_config = ctx.store_config(&config)?;

    let mut source_config = SourceConfig::from_app(&config)?;
    if let Some(url) = api_url {
        source_config.api_url = Url::parse(url).map_err(|e| eyre!("invalid API URL '{url}': {e}"))?;
    }

    let mut build_config = BuildConfig::from(&config);
    if let Some(c) = concurrency {
        build_config.concurrency = c.max(1) as usize;
    }
    if let Some(rate) = max_failure_rate {
        build_config.max_failure_rate = rate;
    }
    build_config.validate()?;

    let seeds = load_seed_file(seeds_path)?;

    info!(
        seeds = seeds.len(),
        db = %store_config.path.display(),
        api_url = %source_config.api_url,
        "building link graph"
    );

    let store = Storage::open(&store_config.path)
        .await?
        .with_edge_retry_budget(store_config.edge_retry_budget);
    let source: Arc<dyn LinkSource> = Arc::new(WikipediaClient::new(&source_config)?);
    let builder = GraphBuilder::new(Arc::new(store), source, build_config);

    let reporter = CliProgress::new();
    let report = builder.run(&seeds, &reporter).await?;

    print_report(&report);

    match report.exceeded_phase() {
        Some(phase) => Err(eyre!(
            "{phase} phase failure rate above the allowed {:.0}%",
            report.max_failure_rate * 100.0
        )),
        None => Ok(()),
    }
}

async fn cmd_scan(ctx: &Context, table: Table) -> Result<()> {
    let store = ctx.open_readonly().await?;
    for record in store.scan_all(table).await? {
        println!("{}", serde_json::to_string(&record)?);
    }
    Ok(())
}

async fn cmd_drop(ctx: &Context, table: Table, yes: bool) -> Result<()> {
    if !yes {
        return Err(eyre!("refusing to drop '{table}' without --yes"));
    }
    let config = ctx.app_config()?;
    let store_config = ctx.store_config(&config)?;
    let store = Storage::open(&store_config.path).await?;

    store.delete_table(table).await?;
    println!("Dropped table '{table}'.");
    Ok(())
}

async fn cmd_tables(ctx: &Context) -> Result<()> {
    let store = ctx.open_readonly().await?;
    let tables = store.list_tables().await?;
    if tables.is_empty() {
        println!("No tables. Run `linkgraph build` first.");
        return Ok(());
    }

    println!("  {:<8} {:>8} {:>8}  CREATED", "TABLE", "READ", "WRITE");
    for info in tables {
        println!(
            "  {:<8} {:>8} {:>8}  {}",
            info.table.as_str(),
            info.read_capacity,
            info.write_capacity,
            info.created_at.to_rfc3339()
        );
    }
    Ok(())
}

async fn cmd_node(ctx: &Context, title: &str) -> Result<()> {
    let store = ctx.open_readonly().await?;
    let links = match store.get_links(title).await {
        Ok(links) => links,
        Err(LinkGraphError::NodeNotFound { .. }) => {
            return Err(eyre!("no node for '{title}' (titles are case-sensitive)"));
        }
        Err(e) => return Err(e.into()),
    };
    let edges = store.get_edges(title).await?.unwrap_or_default();

    println!();
    println!("  Node:  {title}");
    println!("  Links: {}", links.len());
    println!("  Edges: {}", edges.len());
    println!();
    for link in &links {
        let marker = if edges.contains(link) { "->" } else { "  " };
        println!("  {marker} {link}");
    }
    println!();
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(ctx: &Context) -> Result<()> {
    let config = ctx.app_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Report output
// ---------------------------------------------------------------------------

fn print_report(report: &BuildReport) {
    println!();
    println!("  Run:    {}", report.run_id);
    println!("  Seeds:  {}", report.seeds);
    print_phase(&report.nodes);
    match &report.edges {
        Some(edges) => print_phase(edges),
        None => println!("  edges:  skipped"),
    }
    println!("  Edges added:      {}", report.edges_added);
    println!("  Links suppressed: {}", report.edges_suppressed);
    println!("  Time:   {:.1}s", report.duration_ms as f64 / 1000.0);
    println!();
}

fn print_phase(phase: &PhaseReport) {
    println!(
        "  {}:  {}/{} ok, {} failed ({:.1}%) in {:.1}s",
        phase.phase,
        phase.succeeded,
        phase.attempted,
        phase.failed_titles(),
        phase.failure_rate() * 100.0,
        phase.duration_ms as f64 / 1000.0
    );
    for (kind, count) in phase.failure_counts() {
        println!("      {kind:<20} {count}");
    }
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif bar, reset per phase.
struct CliProgress {
    bar: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{prefix:>6} [{bar:30.cyan/blue}] {pos}/{len} {wide_msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ");
        bar.set_style(style);
        Self { bar }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, phase: Phase, total: usize) {
        self.bar.reset();
        self.bar.set_length(total as u64);
        self.bar.set_prefix(phase.to_string());
    }

    fn title_done(&self, _phase: Phase, title: &str, ok: bool, current: usize, _total: usize) {
        self.bar.set_position(current as u64);
        if ok {
            self.bar.set_message(title.to_string());
        } else {
            self.bar.set_message(format!("{title} (failed)"));
        }
    }

    fn done(&self, _report: &BuildReport) {
        self.bar.finish_and_clear();
    }
}
