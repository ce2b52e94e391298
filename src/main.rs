mod ai;
mod blocklist;
mod browser;
mod config;
mod db;
mod error;
mod extractor;
mod filters;
mod fixture;
mod models;
mod notify;
mod people;
mod pipeline;
mod scheduler;
mod scoring;
mod search;
mod selectors;
mod sponsorship;
#[cfg(test)]
mod testing;
mod walker;
mod webdriver;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use blocklist::Blocklist;
use browser::{Browser, Pacer};
use config::{Prompts, Settings};
use db::JobStore;
use filters::FilterChain;
use fixture::FixtureBrowser;
use models::{CycleResult, CycleStatus, JobFlag, RoleQuery};
use people::{PeopleConfig, PeopleFinder};
use pipeline::RolePipeline;
use scheduler::Scheduler;
use scoring::ScoringEngine;
use selectors::SelectorSet;
use webdriver::WebDriverSession;

#[derive(Parser)]
#[command(name = "jobwatch")]
#[command(about = "Watch job listings, filter and score them against your resume")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline on a schedule
    Run {
        /// Stop after this many cycles
        #[arg(long)]
        max_cycles: Option<u32>,

        /// Minutes between cycle starts (overrides SCRAPE_INTERVAL_MINUTES)
        #[arg(long)]
        interval_minutes: Option<u64>,
    },

    /// Run a single cycle over all enabled roles
    Once,

    /// Run one role against saved HTML pages instead of a live browser
    Replay {
        /// Directory holding manifest.json and the page files
        #[arg(long)]
        fixtures: PathBuf,

        /// Role title (defaults to the first enabled role)
        #[arg(long)]
        role: Option<String>,

        /// Location for --role
        #[arg(long, default_value = "")]
        location: String,
    },

    /// List stored jobs
    List {
        /// Only show jobs scoring at least this much
        #[arg(short, long)]
        min_score: Option<f64>,
    },

    /// Show a stored job
    Show {
        /// Posting ID
        id: String,
    },

    /// Set or clear a bookkeeping flag (viewed, saved, applied, emailed)
    Mark {
        /// Posting ID
        id: String,

        /// Flag name
        flag: String,

        /// Clear the flag instead of setting it
        #[arg(long)]
        off: bool,
    },

    /// Show database statistics
    Stats,

    /// List the outreach log
    Connections,

    /// List configured roles
    Roles,

    /// Manage the company blocklist
    Blocklist {
        #[command(subcommand)]
        command: BlocklistCommands,
    },
}

#[derive(Subcommand)]
enum BlocklistCommands {
    /// List blocked companies and patterns
    List,

    /// Block a company
    Add {
        /// Company name
        name: String,
    },

    /// Check whether a company is blocked
    Check {
        /// Company name
        name: String,
    },
}

// --- Setup ---

fn init_logging(settings: &Settings) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

fn load_roles_checked(settings: &Settings) -> Result<Vec<RoleQuery>> {
    let roles = config::load_roles(&settings.roles_path)?;
    let problems = settings.validate(&roles);
    if !problems.is_empty() {
        for problem in &problems {
            eprintln!("config: {}", problem);
        }
        return Err(anyhow!("{} configuration problem(s); not starting", problems.len()));
    }
    Ok(roles)
}

/// Wire the per-role pipeline around any browser.
fn build_pipeline<B: Browser>(browser: B, settings: &Settings) -> Result<RolePipeline<B>> {
    let profile = config::load_profile(&settings.resume_path, &settings.preferences_path)?;
    let prompts = Prompts::load(&settings.prompt_dir);
    let blocklist = Blocklist::load(&settings.blocklist_path)?;
    let selectors = SelectorSet::load_or_default(&settings.selectors_path)?;
    let provider = ai::create_provider(settings).context("Failed to create LLM provider")?;

    let filters = FilterChain::from_settings(settings, &prompts, blocklist, provider.clone());
    let scorer = ScoringEngine::new(settings, &prompts, provider);
    let store = JobStore::open(&settings.db_path)?;

    let mut pipeline = RolePipeline::new(browser, settings, filters, scorer, store, profile)
        .with_selectors(selectors.clone());
    if settings.networking_enabled {
        info!(pages = settings.connect_pages_limit, "people search enabled");
        pipeline = pipeline.with_outreach(Box::new(PeopleFinder::new(
            selectors,
            PeopleConfig::from_settings(settings),
        )));
    }
    Ok(pipeline)
}

fn print_cycle(results: &[CycleResult]) {
    if results.is_empty() {
        println!("No enabled roles.");
        return;
    }
    println!(
        "{:<30} {:<6} {:>5} {:>6} {:>8} {:>7} {:>7}  {}",
        "ROLE", "STATUS", "PAGES", "CARDS", "REJECTED", "NEW", "UPDATED", "STOP"
    );
    println!("{}", "-".repeat(100));
    for result in results {
        match (&result.status, &result.outcome) {
            (CycleStatus::Ok, Some(o)) => println!(
                "{:<30} {:<6} {:>5} {:>6} {:>8} {:>7} {:>7}  {}",
                truncate(&result.role, 28),
                result.status,
                o.pages,
                o.cards,
                o.rejected,
                o.inserted,
                o.updated,
                o.stop_reason.map(|r| r.to_string()).unwrap_or_else(|| "-".to_string())
            ),
            _ => println!(
                "{:<30} {:<6} {}",
                truncate(&result.role, 28),
                result.status,
                result.error.as_deref().unwrap_or("")
            ),
        }
    }
}

// --- Helpers ---

/// The first two sentences of a model's explanation, for log lines.
pub fn short_reason(reason: &str) -> String {
    let trimmed = reason.trim();
    if trimmed.is_empty() {
        return "No reason provided".to_string();
    }

    let mut sentences = 0;
    let mut chars = trimmed.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if matches!(c, '.' | '!' | '?') {
            let at_break = chars.peek().is_none_or(|(_, next)| next.is_whitespace());
            if at_break {
                sentences += 1;
                if sentences == 2 {
                    return trimmed[..i + c.len_utf8()].to_string();
                }
            }
        }
    }
    trimmed.to_string()
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

fn yes_no(flag: bool) -> &'static str {
    if flag { "yes" } else { "no" }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = Settings::from_env()?;
    init_logging(&settings);

    match cli.command {
        Commands::Run {
            max_cycles,
            interval_minutes,
        } => {
            let roles = load_roles_checked(&settings)?;
            let interval = interval_minutes
                .map(config::minutes)
                .unwrap_or(settings.scrape_interval);

            let session = WebDriverSession::connect(&settings.webdriver_url, settings.headless)
                .context("Failed to start browser session")?;
            let pipeline = build_pipeline(session, &settings)?;
            let mut scheduler = Scheduler::new(roles, pipeline, interval);

            info!(interval_secs = interval.as_secs(), "scheduler started");
            let cycles = scheduler.run(max_cycles, |cycle, results| {
                println!("\nCycle {}", cycle);
                print_cycle(results);
            });
            info!(cycles, "scheduler stopped");
        }

        Commands::Once => {
            let roles = load_roles_checked(&settings)?;
            let session = WebDriverSession::connect(&settings.webdriver_url, settings.headless)
                .context("Failed to start browser session")?;
            let pipeline = build_pipeline(session, &settings)?;
            let mut scheduler = Scheduler::new(roles, pipeline, settings.scrape_interval);
            print_cycle(&scheduler.run_cycle());
        }

        Commands::Replay {
            fixtures,
            role,
            location,
        } => {
            let role = match role {
                Some(title) => RoleQuery::new(title, location),
                None => config::load_roles(&settings.roles_path)?
                    .into_iter()
                    .find(|r| r.enabled)
                    .ok_or_else(|| anyhow!("no enabled roles; pass --role"))?,
            };
            let browser = FixtureBrowser::from_dir(&fixtures)?;
            info!(url = %search::build_search_url(&role), "replaying fixtures");

            let pipeline = build_pipeline(browser, &settings)?.with_pacer(Pacer::none());
            let mut scheduler = Scheduler::new(vec![role], pipeline, Duration::ZERO);
            print_cycle(&scheduler.run_cycle());
        }

        Commands::List { min_score } => {
            let store = JobStore::open(&settings.db_path)?;
            let jobs = store.list(min_score)?;
            if jobs.is_empty() {
                println!("No jobs found.");
            } else {
                println!(
                    "{:<12} {:>5} {:<32} {:<22} {:<20} {:<4}",
                    "ID", "SCORE", "TITLE", "COMPANY", "POSTED", "SEEN"
                );
                println!("{}", "-".repeat(100));
                for job in jobs {
                    println!(
                        "{:<12} {:>5.1} {:<32} {:<22} {:<20} {:<4}",
                        job.posting_id,
                        job.match_score,
                        truncate(&job.title, 30),
                        truncate(&job.company, 20),
                        truncate(&job.posted_date, 18),
                        yes_no(job.viewed)
                    );
                }
            }
        }

        Commands::Show { id } => {
            let store = JobStore::open(&settings.db_path)?;
            match store.get(&id)? {
                Some(job) => {
                    println!("Job {}", job.posting_id);
                    println!("Title: {}", job.title);
                    println!("Company: {}", job.company);
                    println!("Location: {}", job.location);
                    println!("URL: {}", job.job_url);
                    println!("Posted: {}", job.posted_date);
                    if let Some(applicants) = job.applicants {
                        println!("Applicants: {}", applicants);
                    }
                    println!("Scraped: {}", job.scraped_date);
                    println!("Score: {:.1}", job.match_score);
                    if job.reranked {
                        println!(
                            "  first pass {:.1} ({}), rerank by {}",
                            job.first_score,
                            job.model_used.as_deref().unwrap_or("-"),
                            job.model_used_rerank.as_deref().unwrap_or("-")
                        );
                    }
                    println!("Reason: {}", job.match_reason);
                    println!(
                        "Viewed: {}  Saved: {}  Applied: {}  Emailed: {}",
                        yes_no(job.viewed),
                        yes_no(job.saved),
                        yes_no(job.applied),
                        yes_no(job.emailed)
                    );
                    println!("\n--- Description ---\n{}", textwrap::fill(&job.description, 100));
                }
                None => {
                    println!("Job {} not found.", id);
                }
            }
        }

        Commands::Mark { id, flag, off } => {
            let flag: JobFlag = flag.parse().map_err(|e: String| anyhow!(e))?;
            let mut store = JobStore::open(&settings.db_path)?;
            if store.set_flag(&id, flag, !off)? {
                println!("Job {}: {} = {}", id, flag.column(), yes_no(!off));
            } else {
                println!("Job {} not found.", id);
            }
        }

        Commands::Stats => {
            let store = JobStore::open(&settings.db_path)?;
            let stats = store.stats()?;
            println!("Database: {}", store.path().display());
            println!("Jobs:        {}", stats.total);
            println!("  viewed:    {}", stats.viewed);
            println!("  saved:     {}", stats.saved);
            println!("  applied:   {}", stats.applied);
            println!("  emailed:   {}", stats.emailed);
            println!("  reranked:  {}", stats.reranked);
            match stats.average_score {
                Some(avg) => println!("Avg score:   {:.2}", avg),
                None => println!("Avg score:   -"),
            }
            println!("Connections: {}", stats.connections);
        }

        Commands::Connections => {
            let store = JobStore::open(&settings.db_path)?;
            let records = store.list_connections()?;
            if records.is_empty() {
                println!("No connections logged.");
            } else {
                println!("{:<20} {:<24} {:<22} {:<24} {:<10}", "DATE", "NAME", "COMPANY", "ROLE", "STATUS");
                println!("{}", "-".repeat(100));
                for record in records {
                    println!(
                        "{:<20} {:<24} {:<22} {:<24} {:<10}",
                        record.timestamp,
                        truncate(&record.name, 22),
                        truncate(&record.company, 20),
                        truncate(&record.role_searched, 22),
                        record.status
                    );
                }
            }
        }

        Commands::Roles => {
            let roles = config::load_roles(&settings.roles_path)?;
            if roles.is_empty() {
                println!("No roles configured in {}.", settings.roles_path.display());
            } else {
                println!("{:<32} {:<20} {:<7} {:<8} {:<8}", "TITLE", "LOCATION", "REMOTE", "POSTED", "ENABLED");
                println!("{}", "-".repeat(80));
                for role in roles {
                    println!(
                        "{:<32} {:<20} {:<7} {:<8} {:<8}",
                        truncate(&role.title, 30),
                        truncate(&role.location, 18),
                        yes_no(role.remote),
                        role.date_posted_window.as_deref().unwrap_or("-"),
                        yes_no(role.enabled)
                    );
                }
            }
        }

        Commands::Blocklist { command } => {
            let mut blocklist = Blocklist::load(&settings.blocklist_path)?;
            match command {
                BlocklistCommands::List => {
                    if blocklist.companies().is_empty() && blocklist.patterns().is_empty() {
                        println!("Blocklist is empty.");
                    }
                    for company in blocklist.companies() {
                        println!("{}", company);
                    }
                    for pattern in blocklist.patterns() {
                        println!("{} (pattern)", pattern);
                    }
                }

                BlocklistCommands::Add { name } => {
                    if blocklist.add(&name)? {
                        println!("Blocked '{}'.", name);
                    } else {
                        warn!(company = %name, "already blocked");
                        println!("'{}' is already blocked.", name);
                    }
                }

                BlocklistCommands::Check { name } => match blocklist.matches(&name) {
                    Some(entry) => println!("'{}' is blocked (matches '{}').", name, entry),
                    None => println!("'{}' is not blocked.", name),
                },
            }
        }
    }

    Ok(())
}
