mod config;
mod db;
mod export;
mod fetch;
mod parser;
mod report;

use std::path::PathBuf;
use std::time::Instant;

use chrono::{Datelike, Local, Utc};
use clap::{Parser, Subcommand};
use rusqlite::Connection;
use tracing::info;

use crate::config::Settings;
use crate::db::{PageKind, Table};
use crate::report::{IssueLog, TracingReporter};

#[derive(Parser)]
#[command(
    name = "bayarea_scraper",
    about = "Bay Area startup directory and company list scraper"
)]
struct Cli {
    /// SQLite database path (overrides settings)
    #[arg(long, global = true)]
    db: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl the startup directory pages
    ScrapeStartups {
        /// Max directory pages to fetch (default: until the last page)
        #[arg(short = 'n', long)]
        max_pages: Option<usize>,
    },
    /// Crawl the wiki company list and its article pages
    ScrapeCompanies,
    /// Parse stored pages into startup and company records
    Process,
    /// Both crawls, then process
    Run {
        /// Max directory pages to fetch
        #[arg(short = 'n', long)]
        max_pages: Option<usize>,
    },
    /// Write stored records to files
    Export {
        /// Output path for startups
        #[arg(long)]
        startups: PathBuf,
        /// Output path for companies
        #[arg(long)]
        companies: PathBuf,
        #[arg(long, value_enum, default_value = "csv")]
        format: export::Format,
    },
    /// Show page, record and issue counts
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let mut settings = Settings::load()?;
    if let Some(db) = cli.db {
        settings.db_path = db;
    }

    let result = match cli.command {
        Commands::ScrapeStartups { max_pages } => {
            let conn = open(&settings)?;
            let fetcher = fetch::Fetcher::new(&settings)?;
            let max_pages = max_pages.or(settings.max_pages);
            let stats = fetch::crawl_directory(&conn, &fetcher, &settings, max_pages).await?;
            println!(
                "Done: {} directory pages ({} ok, {} errors).",
                stats.total, stats.ok, stats.errors
            );
            Ok(())
        }
        Commands::ScrapeCompanies => {
            let conn = open(&settings)?;
            let fetcher = fetch::Fetcher::new(&settings)?;
            let stats = fetch::crawl_wiki(&conn, &fetcher, &settings).await?;
            println!(
                "Done: {} wiki pages ({} ok, {} errors).",
                stats.total, stats.ok, stats.errors
            );
            Ok(())
        }
        Commands::Process => {
            let conn = open(&settings)?;
            let counts = process_pages(&conn, &settings)?;
            counts.print();
            Ok(())
        }
        Commands::Run { max_pages } => {
            let conn = open(&settings)?;
            let fetcher = fetch::Fetcher::new(&settings)?;

            // Phase 1: directory
            let t_dir = Instant::now();
            let max_pages = max_pages.or(settings.max_pages);
            let dir = fetch::crawl_directory(&conn, &fetcher, &settings, max_pages).await?;
            println!(
                "Directory: {} pages ({} ok, {} errors) in {:.1}s",
                dir.total,
                dir.ok,
                dir.errors,
                t_dir.elapsed().as_secs_f64()
            );

            // Phase 2: wiki
            let t_wiki = Instant::now();
            let wiki = fetch::crawl_wiki(&conn, &fetcher, &settings).await?;
            println!(
                "Wiki: {} pages ({} ok, {} errors) in {:.1}s",
                wiki.total,
                wiki.ok,
                wiki.errors,
                t_wiki.elapsed().as_secs_f64()
            );

            // Phase 3: process
            let t_process = Instant::now();
            let counts = process_pages(&conn, &settings)?;
            println!("Processed in {:.1}s", t_process.elapsed().as_secs_f64());
            counts.print();
            Ok(())
        }
        Commands::Export {
            startups,
            companies,
            format,
        } => {
            let conn = open(&settings)?;
            for (table, path) in [(Table::Startups, &startups), (Table::Companies, &companies)] {
                let rows = db::export_rows(&conn, table)?;
                let n = export::write_table(path, table.columns(), &rows, format)?;
                println!("Wrote {} {} to {}", n, table.name(), path.display());
            }
            Ok(())
        }
        Commands::Stats => {
            let conn = open(&settings)?;
            let s = db::get_stats(&conn)?;
            println!("Directory pages: {}", s.directory_pages);
            println!("Wiki pages:      {}", s.wiki_pages);
            println!("Fetch errors:    {}", s.fetch_errors);
            println!("Startups:        {}", s.startups);
            println!("Companies:       {}", s.companies);
            println!("Issues:          {}", s.issues);

            let st = &s.startup_data;
            if s.startups > 0 {
                println!("\n--- startups ---");
                println!("Unique industries: {}", st.unique_industries);
                if let Some(size) = &st.common_size {
                    println!("Most common size:  {}", size);
                }
                if let Some((first, last)) = st.founded_range {
                    println!("Founded:           {} - {}", first, last);
                }
            }
            let co = &s.company_data;
            if s.companies > 0 {
                println!("\n--- companies ---");
                for (industry, n) in &co.top_industries {
                    println!("  {:<28} {:>6}", industry, n);
                }
                if let (Some(total), Some(avg)) = (co.total_employees, co.avg_employees) {
                    println!("Total employees:   {}", total);
                    println!("Average employees: {:.0}", avg);
                }
                println!("Fortune 500:       {}", co.fortune_500);
            }
            if let Some(run) = &s.latest_run {
                println!("\n--- {} ---", run);
                for (field, n) in &s.latest_fields {
                    println!("  {:<28} {:>6}", field, n);
                }
            }
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn open(settings: &Settings) -> anyhow::Result<Connection> {
    let conn = db::connect(&settings.db_path)?;
    db::init_schema(&conn)?;
    Ok(conn)
}

struct ProcessCounts {
    run_id: String,
    startups: usize,
    companies: usize,
    dropped: usize,
    issues: usize,
    fields: Vec<(&'static str, usize)>,
}

impl ProcessCounts {
    fn print(&self) {
        println!(
            "Saved {} startups, {} companies ({} entities dropped, {} issues in {}).",
            self.startups, self.companies, self.dropped, self.issues, self.run_id,
        );
        for (field, n) in self.fields.iter().take(10) {
            println!("  {:<28} {:>6}", field, n);
        }
    }
}

fn process_pages(conn: &Connection, settings: &Settings) -> anyhow::Result<ProcessCounts> {
    use indicatif::{ProgressBar, ProgressStyle};

    let run_id = Utc::now().format("run-%Y%m%dT%H%M%S").to_string();
    let as_of_year = Local::now().year();

    let directory = db::fetch_pages(conn, PageKind::Directory)?;
    let lists = db::fetch_pages(conn, PageKind::WikiList)?;
    let details = db::detail_pages(conn)?;
    info!(
        "Processing {} directory pages, {} list pages ({} articles)",
        directory.len(),
        lists.len(),
        details.len()
    );

    let pb = ProgressBar::new((directory.len() + lists.len()) as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")?
            .progress_chars("#>-"),
    );

    let mut log = IssueLog::default();
    let mut startups = Vec::new();
    let mut companies = Vec::new();
    {
        let mut reporter = (TracingReporter, &mut log);
        for page in &directory {
            let parsed = parser::process_directory_page(&page.html, &mut reporter);
            if parsed.is_empty() {
                info!("No cards on {}", page.url);
            }
            startups.extend(parsed.records);
            pb.inc(1);
        }
        for page in &lists {
            companies.extend(parser::process_company_list(
                &page.html,
                &settings.wiki_base_url,
                |url| details.get(url).cloned(),
                as_of_year,
                &mut reporter,
            ));
            pb.inc(1);
        }
    }
    pb.finish_and_clear();

    db::save_records(conn, &startups, &companies)?;
    let issues = db::save_issues(conn, &run_id, log.reports())?;

    Ok(ProcessCounts {
        run_id,
        startups: startups.len(),
        companies: companies.len(),
        dropped: log.dropped(),
        issues,
        fields: log.field_counts(),
    })
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
