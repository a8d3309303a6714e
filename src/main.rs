//! # TheArk CLI (`ark`)
//!
//! The `ark` binary crawls arXiv into a local SQLite database, runs the
//! background crawl loop and serves the HTTP API.
//!
//! ## Usage
//!
//! ```bash
//! ark --config ./config/ark.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ark init` | Create the SQLite database and schema |
//! | `ark crawl paper <id>...` | Fetch papers by id or URL |
//! | `ark crawl date` | Fetch one category-day |
//! | `ark crawl recent` | Resumable crawl of yesterday for every category |
//! | `ark crawl historical` | Step the backward crawl |
//! | `ark run` | Run the background loops until Ctrl-C |
//! | `ark serve` | Start the HTTP API |
//! | `ark papers` | List stored papers |
//! | `ark show <id>` | Show one paper and its summary |
//! | `ark events` | Show the crawl event log |
//! | `ark stats` | Database and crawl statistics |

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use theark::progress::ProgressMode;
use theark::{commands, config, logging, migrate, server, stats};

/// TheArk CLI: a rate-limited, resumable arXiv crawler.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/ark.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "ark",
    about = "TheArk: a rate-limited, resumable arXiv crawler",
    version,
    long_about = "TheArk polls the arXiv API on a schedule, stores papers in SQLite \
    without duplicates, tracks crawl progress so interrupted crawls resume, and \
    exposes papers and crawl control over HTTP."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/ark.toml")]
    config: PathBuf,

    /// Crawl progress on stderr. `auto` shows it when stderr is a terminal.
    #[arg(long, global = true, value_enum, default_value_t = ProgressArg::Auto)]
    progress: ProgressArg,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum ProgressArg {
    Auto,
    Off,
    Human,
    Json,
}

impl ProgressArg {
    fn mode(self) -> ProgressMode {
        match self {
            ProgressArg::Auto => ProgressMode::default_for_tty(),
            ProgressArg::Off => ProgressMode::Off,
            ProgressArg::Human => ProgressMode::Human,
            ProgressArg::Json => ProgressMode::Json,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// This command is idempotent; running it multiple times is safe.
    /// When the config file does not exist the database is created at
    /// `./data/theark.sqlite`.
    Init,

    /// Fetch papers from arXiv.
    Crawl {
        #[command(subcommand)]
        target: CrawlTarget,
    },

    /// Run the recent-papers monitor and the historical crawl until Ctrl-C.
    Run,

    /// Start the HTTP API.
    ///
    /// Binds to `[server].bind`. The background crawl starts immediately
    /// when `[crawler].auto_start` is set, otherwise via `PUT /v1/crawler`.
    Serve,

    /// List stored papers, newest first.
    Papers {
        #[arg(long)]
        category: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },

    /// Show one paper by paper id or arXiv id.
    Show { identifier: String },

    /// Show the most recent crawl events.
    Events {
        #[arg(long, default_value_t = 30)]
        limit: i64,
    },

    /// Show database and crawl statistics.
    Stats,
}

#[derive(Subcommand)]
enum CrawlTarget {
    /// Fetch papers by arXiv id, abstract URL or PDF URL.
    Paper {
        #[arg(required = true)]
        identifiers: Vec<String>,
    },

    /// Fetch every paper submitted to one category on one day.
    Date {
        #[arg(long)]
        category: String,
        /// Day in YYYY-MM-DD (UTC).
        #[arg(long)]
        date: String,
        /// Only report how many papers arXiv lists.
        #[arg(long)]
        dry_run: bool,
    },

    /// Resumable crawl of one day for every configured category.
    Recent {
        /// Day in YYYY-MM-DD; defaults to yesterday (UTC).
        #[arg(long)]
        date: Option<String>,
    },

    /// Advance the backward crawl by a number of date-category steps.
    Historical {
        #[arg(long, default_value_t = 1)]
        steps: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = match &cli.command {
        // Without a config file, `init` creates the default database.
        Commands::Init if !cli.config.exists() => config::Config::minimal(),
        _ => config::load_config(&cli.config)?,
    };
    logging::init(&cfg.logging.level)?;
    let progress = cli.progress.mode();

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Crawl { target } => match target {
            CrawlTarget::Paper { identifiers } => {
                commands::run_crawl_papers(&cfg, &identifiers, progress).await?;
            }
            CrawlTarget::Date {
                category,
                date,
                dry_run,
            } => {
                commands::run_crawl_date(&cfg, &category, &date, dry_run, progress).await?;
            }
            CrawlTarget::Recent { date } => {
                commands::run_crawl_recent(&cfg, date.as_deref(), progress).await?;
            }
            CrawlTarget::Historical { steps } => {
                commands::run_crawl_historical(&cfg, steps, progress).await?;
            }
        },
        Commands::Run => {
            commands::run_background(&cfg).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Papers { category, limit } => {
            commands::run_papers(&cfg, category, limit).await?;
        }
        Commands::Show { identifier } => {
            commands::run_show(&cfg, &identifier).await?;
        }
        Commands::Events { limit } => {
            commands::run_events(&cfg, limit).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
    }

    Ok(())
}
