mod config;
mod db;
mod feed;
mod models;
mod saved;
mod share;
mod tui;
mod view;

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use config::{Config, ShareMode, DEFAULT_FEED_URL};
use db::SqliteStore;
use feed::{FeedSession, FeedStatus, HttpFeedSource};
use models::JobRecord;
use saved::SavedJobStore;
use share::DEFAULT_DEEP_LINK_BASE;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;
use tracing_subscriber::EnvFilter;
use tui::truncate;
use view::{compute_view, Tab, ViewState};

#[derive(Parser)]
#[command(name = "jobfeed")]
#[command(about = "Personal job dashboard - rank, filter, save and share analyzed job postings")]
struct Cli {
    /// URL of the analyzed jobs JSON feed
    #[arg(long, global = true, env = "JOBFEED_URL", default_value = DEFAULT_FEED_URL)]
    feed_url: String,

    /// Directory holding the saved-jobs database
    #[arg(long, global = true, env = "JOBFEED_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// How shared jobs are delivered
    #[arg(long, global = true, value_enum, default_value = "clipboard")]
    share: ShareMode,

    /// Prefix for messaging deep links (used with --share deep-link)
    #[arg(long, global = true, env = "JOBFEED_DEEP_LINK_BASE", default_value = DEFAULT_DEEP_LINK_BASE)]
    deep_link_base: String,

    /// Feed request timeout in seconds
    #[arg(long, global = true, default_value = "15")]
    timeout_secs: u64,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the live feed, best matches first
    List {
        /// Only jobs whose title or company contains this text
        #[arg(short, long, default_value = "")]
        search: String,

        /// Number of jobs to show
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// List saved jobs
    Saved {
        /// Only jobs whose title or company contains this text
        #[arg(short, long, default_value = "")]
        search: String,
    },

    /// Save a job, or unsave it if already saved
    Save {
        /// Job ID
        id: String,
    },

    /// Show job details
    Show {
        /// Job ID
        id: String,
    },

    /// Share a job with a friend
    Share {
        /// Job ID
        id: String,
    },

    /// Open a job's apply link
    Open {
        /// Job ID
        id: String,
    },

    /// Browse the feed interactively
    Browse,
}

fn init_tracing(log_file: Option<&Path>, interactive: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("jobfeed=warn"));

    match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file: {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        // Anything written to the terminal would corrupt the dashboard
        None if interactive => {}
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
    Ok(())
}

fn open_saved(config: &Config) -> Result<SavedJobStore<SqliteStore>> {
    let backend = SqliteStore::open(&config.data_dir)?;
    debug!(path = ?backend.path(), "opened saved jobs store");
    Ok(SavedJobStore::open(backend))
}

/// Loads the feed once for a CLI command. A failed load is reported and the
/// command continues with an empty feed.
fn load_session(config: &Config) -> Result<FeedSession> {
    let source = HttpFeedSource::new(&config.feed_url, config.timeout)?;
    let session = FeedSession::start(&source);
    if let FeedStatus::Failed(_) = session.status() {
        if let Some(e) = session.last_error() {
            eprintln!("Could not load jobs from {}: {}", source.url(), e);
        }
    }
    Ok(session)
}

fn find_job<'a>(jobs: &'a [JobRecord], id: &str) -> Result<&'a JobRecord> {
    jobs.iter()
        .find(|j| j.id == id)
        .ok_or_else(|| anyhow!("Job {} not found in the current feed", id))
}

fn print_jobs(config: &Config, tab: Tab, search: String, limit: Option<usize>) -> Result<()> {
    let session = load_session(config)?;
    let saved = open_saved(config)?;
    let state = ViewState::new(tab, search);
    let mut jobs = compute_view(session.jobs(), &state, saved.current(), Utc::now());
    if let Some(limit) = limit {
        jobs.truncate(limit);
    }

    if jobs.is_empty() {
        match (session.status(), tab) {
            (FeedStatus::Failed(_), _) => println!("Waiting for data. Try again later."),
            (_, Tab::Saved) if saved.current().is_empty() => println!("No saved jobs yet."),
            (_, Tab::Saved) if state.search.trim().is_empty() => {
                println!("None of your saved jobs are in the current feed.")
            }
            _ => println!("No jobs found."),
        }
        return Ok(());
    }

    println!(
        "{:<5} {:<14} {:>5} {:<30} {:<20} {:<12} {:<14}",
        "RANK", "ID", "MATCH", "TITLE", "COMPANY", "SOURCE", "FOUND"
    );
    println!("{}", "-".repeat(106));
    for (i, d) in jobs.iter().enumerate() {
        let marker = if d.is_saved { "*" } else { " " };
        println!(
            "{:<5} {:<14} {:>4}% {:<30} {:<20} {:<12} {:<14}{}",
            i + 1,
            truncate(&d.job.id, 14),
            d.job.analysis.match_score,
            truncate(&d.job.title, 28),
            truncate(&d.job.company, 18),
            truncate(&d.source_label, 12),
            d.time_label,
            marker
        );
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_file.as_deref(), matches!(cli.command, Commands::Browse))?;

    let config = Config::resolve(
        cli.feed_url,
        cli.data_dir,
        cli.share,
        cli.deep_link_base,
        cli.timeout_secs,
    )?;

    match cli.command {
        Commands::List { search, limit } => {
            print_jobs(&config, Tab::Feed, search, limit)?;
        }

        Commands::Saved { search } => {
            print_jobs(&config, Tab::Saved, search, None)?;
        }

        Commands::Save { id } => {
            let mut saved = open_saved(&config)?;
            let set = saved.toggle(&id)?;
            if set.contains(&id) {
                println!("Saved job {} ({} saved).", id, set.len());
            } else {
                println!("Removed job {} from saved ({} saved).", id, set.len());
            }
        }

        Commands::Show { id } => {
            let session = load_session(&config)?;
            let saved = open_saved(&config)?;
            let views = compute_view(session.jobs(), &ViewState::default(), saved.current(), Utc::now());
            let d = views
                .iter()
                .find(|d| d.job.id == id)
                .ok_or_else(|| anyhow!("Job {} not found in the current feed", id))?;
            let job = d.job;

            println!("Job {}", job.id);
            println!("Title: {}", job.title);
            println!("Company: {}", job.company);
            println!("Match: {}%", job.analysis.match_score);
            if !job.location.is_empty() {
                println!("Location: {}", job.location);
            }
            println!("Source: {}", d.source_label);
            println!("Found: {}", d.time_label);
            if let Some(posted) = &job.date_posted {
                println!("Posted: {}", posted);
            }
            if d.show_salary {
                println!("Salary: {}", job.analysis.salary_estimate);
            }
            if let Some(fresher) = job.analysis.is_suitable_for_fresher {
                println!("Fresher friendly: {}", if fresher { "yes" } else { "no" });
            }
            println!("Saved: {}", if d.is_saved { "yes" } else { "no" });
            println!("Apply: {}", job.job_url);
            if job.analysis.has_skill_gap() {
                println!("\n--- Skill Gaps ---\n{}", job.analysis.skill_gap.join(", "));
            }
            if let Some(hook) = &job.analysis.cover_letter_hook {
                println!("\n--- Cover Letter Hook ---\n{}", textwrap::fill(hook, 80));
            }
        }

        Commands::Share { id } => {
            let session = load_session(&config)?;
            let job = find_job(session.jobs(), &id)?;
            let channel = config.share_channel();
            let receipt = share::share_job(job, &config.share_policy(), channel.as_ref())?;
            println!("{}", receipt.confirmation());
        }

        Commands::Open { id } => {
            let session = load_session(&config)?;
            let job = find_job(session.jobs(), &id)?;
            if job.job_url.is_empty() {
                return Err(anyhow!("Job {} has no apply link", id));
            }
            share::open_external(&job.job_url)?;
            println!("Opened {}", job.job_url);
        }

        Commands::Browse => {
            let source = HttpFeedSource::new(&config.feed_url, config.timeout)?;
            let saved = open_saved(&config)?;
            let channel = config.share_channel();
            tui::run_browse(&source, saved, &config.share_policy(), channel.as_ref())?;
        }
    }

    Ok(())
}
