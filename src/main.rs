mod db;
mod enrich;
mod extract;
mod fetcher;
mod normalize;
mod search;

use std::time::Instant;

use clap::{Parser, Subcommand};

use crate::normalize::classify::looks_educational;
use crate::search::SearchFilters;

#[derive(Parser)]
#[command(name = "edu_scraper", about = "Educational program search & extraction pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search the web for candidate pages and populate the URL queue
    Search {
        /// Topic to search for (e.g. "early childhood literacy")
        topic: String,
        /// Max search results to queue
        #[arg(short = 'n', long, default_value = "8")]
        max_results: usize,
        /// Resource type filter (Any, Course, Seminar, Video, Other)
        #[arg(long = "type", default_value = "Any")]
        kind: String,
        /// Delivery mode filter (Any, Online, In-person)
        #[arg(long, default_value = "Any")]
        mode: String,
        /// Cost filter (Any, Free, Paid)
        #[arg(long, default_value = "Any")]
        cost: String,
        /// Country filter ("Any" disables)
        #[arg(long, default_value = "Any")]
        country: String,
        /// Region/city filter ("Any" disables)
        #[arg(long, default_value = "Any")]
        region: String,
    },
    /// Fetch unvisited pages from the queue
    Fetch {
        /// Max pages to fetch (default: all unvisited)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Extract program records from fetched pages
    Extract {
        /// Max pages to process (default: all unprocessed)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Fetch + extract in one pipeline
    Run {
        /// Max pages to fetch+extract
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Fetch a single URL and extract programs without touching the queue
    Probe { url: String },
    /// List stored programs
    List {
        /// Filter by type (Course, Seminar, Video, Other)
        #[arg(long = "type")]
        kind: Option<String>,
        /// Filter by mode (Online, In-person, Unknown)
        #[arg(long)]
        mode: Option<String>,
        /// Filter by cost (Free, Paid)
        #[arg(long)]
        cost: Option<String>,
        /// Country substring filter
        #[arg(long)]
        country: Option<String>,
        /// City substring filter
        #[arg(long)]
        city: Option<String>,
        /// Max rows to display
        #[arg(short = 'n', long, default_value = "50")]
        limit: usize,
    },
    /// Show one stored program in full
    Show { id: i64 },
    /// Toggle a program's approved flag
    Approve { id: i64 },
    /// Show pipeline statistics
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

    let result = match cli.command {
        Commands::Search { topic, max_results, kind, mode, cost, country, region } => {
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            let filters = SearchFilters { kind, mode, cost, country, region };
            let query_id = db::save_query(&conn, &topic, &filters)?;

            let client = fetcher::http_client()?;
            let hits = search::search_web(&client, &topic, &filters, max_results).await?;
            if hits.is_empty() {
                println!("No search results, even after relaxing location. Try different filters.");
                return Ok(());
            }
            let inserted = db::insert_pages(&conn, query_id, &hits)?;
            println!("Queued {} new pages ({} hits total). Run 'fetch' next.", inserted, hits.len());
            Ok(())
        }
        Commands::Fetch { limit } => {
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            let pages = db::fetch_unvisited(&conn, limit)?;
            if pages.is_empty() {
                println!("No unvisited pages. Run 'search' first or all pages are fetched.");
                return Ok(());
            }
            println!("Fetching {} pages (streaming to DB)...", pages.len());
            let stats = fetcher::fetch_pages_streaming(&conn, pages).await?;
            println!("Done: {} fetched ({} ok, {} errors).", stats.total, stats.ok, stats.errors);
            Ok(())
        }
        Commands::Extract { limit } => {
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            let pages = db::fetch_unprocessed(&conn, limit)?;
            if pages.is_empty() {
                println!("No unprocessed pages. Run 'fetch' first.");
                return Ok(());
            }
            println!("Extracting from {} pages...", pages.len());
            let saved = process_pages(&conn, &pages)?;
            println!("Saved {} program entries.", saved);
            Ok(())
        }
        Commands::Run { limit } => {
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            let pages = db::fetch_unvisited(&conn, limit)?;
            if pages.is_empty() {
                println!("No unvisited pages. Run 'search' first.");
                return Ok(());
            }

            // Phase 1: Fetch (streaming to DB)
            let t_fetch = Instant::now();
            println!("Pipeline: fetching {} pages (streaming to DB)...", pages.len());
            let stats = fetcher::fetch_pages_streaming(&conn, pages).await?;
            println!(
                "Fetched {} pages ({} ok, {} errors) in {:.1}s",
                stats.total, stats.ok, stats.errors, t_fetch.elapsed().as_secs_f64()
            );

            // Phase 2: Extract
            let unprocessed = db::fetch_unprocessed(&conn, None)?;
            if unprocessed.is_empty() {
                println!("Nothing to extract (all fetched pages had errors).");
                return Ok(());
            }
            println!("Extracting from {} pages...", unprocessed.len());
            let saved = process_pages(&conn, &unprocessed)?;
            println!("Saved {} program entries.", saved);
            Ok(())
        }
        Commands::Probe { url } => {
            let client = fetcher::http_client()?;
            let html = fetcher::fetch_html(&client, &url).await;
            if html.is_empty() {
                println!("Fetch failed or empty body: {}", url);
                return Ok(());
            }
            let records = extract::extract_programs(&html, &url);
            if records.is_empty() {
                println!("No programs extracted from {}", url);
                return Ok(());
            }
            for (i, r) in records.iter().enumerate() {
                println!("{:>3}. {} [{} | {}]", i + 1, r.title, r.kind.as_str(), r.mode.as_str());
                if let Some(price) = r.price {
                    println!("     Price: {} {}", price, r.currency.as_deref().unwrap_or(""));
                }
                if let Some(start) = r.start_date {
                    println!(
                        "     When: {} -> {}",
                        start,
                        r.end_date.map(|d| d.to_string()).unwrap_or_else(|| "-".into())
                    );
                }
                println!("     {}", r.url);
            }
            Ok(())
        }
        Commands::List { kind, mode, cost, country, city, limit } => {
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            let filters = db::ListFilters {
                kind: kind.filter(|v| v != "Any"),
                mode: mode.filter(|v| v != "Any"),
                cost: cost.filter(|v| v != "Any"),
                country_contains: country,
                city_contains: city,
                limit,
            };
            let rows = db::list_programs(&conn, &filters)?;
            if rows.is_empty() {
                println!("No programs found. Use 'search' + 'run' to scrape more.");
                return Ok(());
            }

            println!(
                "{:>4} | {:<40} | {:<8} | {:<9} | {:<14} | {:<12} | {:>10}",
                "ID", "Title", "Type", "Mode", "Country", "City", "Price"
            );
            println!("{}", "-".repeat(115));
            for r in &rows {
                let price = match r.price {
                    Some(p) => format!("{} {}", p, r.currency),
                    None => "-".to_string(),
                };
                println!(
                    "{:>4} | {:<40} | {:<8} | {:<9} | {:<14} | {:<12} | {:>10}",
                    r.id,
                    truncate(&r.title, 40),
                    r.kind,
                    r.mode,
                    truncate(&r.country, 14),
                    truncate(&r.city, 12),
                    truncate(&price, 10),
                );
            }
            println!("\n{} programs | 'show <id>' for details", rows.len());
            Ok(())
        }
        Commands::Show { id } => {
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            match db::get_program(&conn, id)? {
                Some(p) => {
                    println!("{}", p.title);
                    println!("{}", "=".repeat(p.title.chars().count().min(80)));
                    println!("{}", p.description.as_deref().unwrap_or("(no description)"));
                    println!("Type: {} | Mode: {}", p.kind, p.mode);
                    println!(
                        "When: {} -> {}",
                        p.start_date.as_deref().unwrap_or("-"),
                        p.end_date.as_deref().unwrap_or("-")
                    );
                    println!(
                        "Where: {}, {}, {}",
                        p.venue.as_deref().unwrap_or("-"),
                        p.city.as_deref().unwrap_or("-"),
                        p.country.as_deref().unwrap_or("-")
                    );
                    if let Some(price) = p.price {
                        let usd = p
                            .price_usd
                            .map(|u| format!(" (~USD {:.2})", u))
                            .unwrap_or_default();
                        println!("Price: {} {}{}", price, p.currency.as_deref().unwrap_or(""), usd);
                    }
                    println!("Approved: {} | Added: {}", p.is_approved, p.created_at);
                    println!("Source: {}", p.url);
                }
                None => println!("Program {} not found.", id),
            }
            Ok(())
        }
        Commands::Approve { id } => {
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            if db::toggle_approved(&conn, id)? {
                println!("Toggled approval state for program {}.", id);
            } else {
                println!("Program {} not found.", id);
            }
            Ok(())
        }
        Commands::Stats => {
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            let s = db::get_stats(&conn)?;
            println!("Pages:     {}", s.pages_total);
            println!("Visited:   {}", s.visited);
            println!("Unvisited: {}", s.unvisited);
            println!("Fetched:   {}", s.fetched);
            println!("Errors:    {}", s.errors);
            println!("Programs:  {}", s.programs);
            println!("Approved:  {}", s.approved);
            println!("Sources:   {}", s.sources);
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

/// Run the extraction pipeline over fetched pages in parallel chunks,
/// saving each chunk as it completes.
fn process_pages(conn: &rusqlite::Connection, pages: &[db::FetchedPage]) -> anyhow::Result<usize> {
    use indicatif::{ProgressBar, ProgressStyle};
    use rayon::prelude::*;

    let filters_by_query = db::load_filters(conn)?;
    let default_filters = SearchFilters::default();

    let pb = ProgressBar::new(pages.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")
            .unwrap()
            .progress_chars("#>-"),
    );

    let mut saved = 0usize;
    for chunk in pages.chunks(100) {
        let results: Vec<(i64, Vec<db::ProgramRow>)> = chunk
            .par_iter()
            .map(|page| {
                let filters = page
                    .query_id
                    .and_then(|id| filters_by_query.get(&id))
                    .unwrap_or(&default_filters);
                (page.page_data_id, build_rows(page, filters))
            })
            .collect();

        for (page_data_id, rows) in results {
            saved += db::save_programs(conn, &rows)?;
            db::mark_processed(conn, page_data_id)?;
        }
        pb.inc(chunk.len() as u64);
    }

    pb.finish_and_clear();
    Ok(saved)
}

/// Gate one page on relevance and location, then extract and enrich.
fn build_rows(page: &db::FetchedPage, filters: &SearchFilters) -> Vec<db::ProgramRow> {
    let text = enrich::page_text(&page.html);
    let page_title = enrich::page_title(&page.html);
    let combined = format!("{} {} {}", page.hit_title, page.snippet, text);

    if !looks_educational(&combined) {
        return Vec::new();
    }
    if !enrich::matches_location(&combined, &filters.country, &filters.region) {
        return Vec::new();
    }

    extract::extract_programs(&page.html, &page.url)
        .into_iter()
        .map(|mut record| {
            let usd = enrich::enrich_record(
                &mut record,
                &combined,
                &page.hit_title,
                page_title.as_deref(),
                filters,
            );
            to_program_row(record, usd)
        })
        .collect()
}

fn to_program_row(r: extract::ProgramRecord, price_usd: Option<f64>) -> db::ProgramRow {
    db::ProgramRow {
        url: r.url,
        title: r.title,
        description: r.description,
        price: r.price,
        currency: r.currency,
        price_usd,
        start_date: r.start_date.map(|d| d.to_string()),
        end_date: r.end_date.map(|d| d.to_string()),
        mode: r.mode.as_str().to_string(),
        venue: r.venue,
        city: r.city,
        country: r.country,
        kind: r.kind.as_str().to_string(),
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::FetchedPage;

    fn page(html: &str, url: &str, hit_title: &str, snippet: &str) -> FetchedPage {
        FetchedPage {
            page_data_id: 1,
            url: url.to_string(),
            hit_title: hit_title.to_string(),
            snippet: snippet.to_string(),
            html: html.to_string(),
            query_id: None,
        }
    }

    #[test]
    fn build_rows_gates_on_relevance() {
        let html =
            "<html><head><title>Cheap socks</title></head><body>Wool socks on sale.</body></html>";
        let p = page(html, "https://shop.example.com/", "Cheap socks", "sale");
        assert!(build_rows(&p, &SearchFilters::default()).is_empty());
    }

    #[test]
    fn build_rows_gates_on_location() {
        let html = r#"<html><head><title>Python course</title></head>
            <body>A beginner course held in Berlin.</body></html>"#;
        let p = page(html, "https://e.com/", "Python course", "");
        let filters = SearchFilters {
            country: "Australia".to_string(),
            ..SearchFilters::default()
        };
        assert!(build_rows(&p, &filters).is_empty());
        assert!(!build_rows(&p, &SearchFilters::default()).is_empty());
    }

    #[test]
    fn build_rows_enriches_and_converts() {
        let html = r#"<html><head>
            <script type="application/ld+json">
            {"@context":"https://schema.org","@type":"Course","name":"Statistics Bootcamp",
             "description":"Twelve weeks of applied statistics.",
             "offers":{"price":"650","priceCurrency":"AUD"}}
            </script></head><body>Statistics Bootcamp, online, Australia.</body></html>"#;
        let p = page(html, "https://e.com/stats", "Statistics Bootcamp", "12-week course");
        let rows = build_rows(&p, &SearchFilters::default());
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.title, "Statistics Bootcamp");
        assert_eq!(row.kind, "Course");
        assert_eq!(row.price, Some(650.0));
        let usd = row.price_usd.unwrap();
        assert!((usd - 1000.0).abs() < 1e-9);
    }

    #[test]
    fn truncate_is_char_safe() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a much longer string", 6), "a much...");
    }
}
