use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use rusqlite::Connection;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::db::FetchRow;

const CONCURRENCY: usize = 10;
const MAX_RETRIES: u32 = 3;
const BASE_BACKOFF_MS: u64 = 2000;
const FETCH_TIMEOUT_SECS: u64 = 15;
/// Some listing sites refuse default client agents outright.
const USER_AGENT: &str = "Mozilla/5.0";

/// Fetch stats returned after completion.
pub struct FetchStats {
    pub total: usize,
    pub ok: usize,
    pub errors: usize,
}

pub fn http_client() -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(FETCH_TIMEOUT_SECS))
        .build()?;
    Ok(client)
}

/// Fetch pages concurrently, saving each result to DB as it arrives.
pub async fn fetch_pages_streaming(
    conn: &Connection,
    pages: Vec<(i64, String)>,
) -> Result<FetchStats> {
    let client = http_client()?;
    let semaphore = Arc::new(Semaphore::new(CONCURRENCY));
    let total = pages.len();

    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")?
            .progress_chars("=> "),
    );

    // Channel: workers send results, main loop saves to DB
    let (tx, mut rx) = tokio::sync::mpsc::channel::<FetchRow>(CONCURRENCY * 2);

    for (page_id, url) in pages {
        let client = client.clone();
        let sem = Arc::clone(&semaphore);
        let tx = tx.clone();

        tokio::spawn(async move {
            let _permit = sem.acquire().await.unwrap();
            let row = fetch_with_retry(&client, page_id, &url).await;
            let _ = tx.send(row).await;
        });
    }

    // Drop our copy of tx so rx closes when all spawned tasks finish
    drop(tx);

    let mut ok = 0usize;
    let mut errors = 0usize;

    // Prepare statements once, reuse for each row
    let mut insert_stmt = conn.prepare(
        "INSERT INTO page_data (page_id, url, html, status, error, latency_ms)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )?;
    let mut update_stmt =
        conn.prepare("UPDATE pages SET visited = 1, visited_at = datetime('now') WHERE id = ?1")?;

    while let Some(row) = rx.recv().await {
        if row.error.is_some() {
            errors += 1;
        } else {
            ok += 1;
        }

        save_one(&mut insert_stmt, &mut update_stmt, &row)?;
        pb.inc(1);
    }

    pb.finish_and_clear();
    info!("Fetched {} pages ({} ok, {} errors)", total, ok, errors);

    Ok(FetchStats { total, ok, errors })
}

/// Save a single fetch result to DB using pre-prepared statements.
fn save_one(
    insert: &mut rusqlite::Statement,
    update: &mut rusqlite::Statement,
    row: &FetchRow,
) -> Result<()> {
    insert.execute(rusqlite::params![
        row.page_id, row.url, row.html, row.status, row.error, row.latency_ms,
    ])?;
    update.execute(rusqlite::params![row.page_id])?;
    Ok(())
}

async fn fetch_with_retry(client: &reqwest::Client, page_id: i64, url: &str) -> FetchRow {
    for attempt in 0..=MAX_RETRIES {
        let row = fetch_one(client, page_id, url).await;

        let should_retry = matches!(row.status, Some(429) | Some(500) | Some(502) | Some(503));
        if !should_retry || attempt == MAX_RETRIES {
            return row;
        }

        let backoff = Duration::from_millis(BASE_BACKOFF_MS * 2u64.pow(attempt));
        warn!(
            "HTTP {} on {} (attempt {}/{}), backing off {:.1}s",
            row.status.unwrap_or(0),
            url,
            attempt + 1,
            MAX_RETRIES,
            backoff.as_secs_f64()
        );
        tokio::time::sleep(backoff).await;
    }

    fetch_one(client, page_id, url).await
}

async fn fetch_one(client: &reqwest::Client, page_id: i64, url: &str) -> FetchRow {
    let start = Instant::now();
    let row = |html, status, error, elapsed| FetchRow {
        page_id,
        url: url.to_string(),
        html,
        status,
        error,
        latency_ms: Some(elapsed),
    };

    match client.get(url).send().await {
        Ok(response) => {
            let status = response.status().as_u16() as i32;
            if !response.status().is_success() {
                let elapsed = start.elapsed().as_millis() as i64;
                return row(None, Some(status), Some(format!("HTTP {}", status)), elapsed);
            }
            match response.text().await {
                Ok(body) => {
                    let elapsed = start.elapsed().as_millis() as i64;
                    row(Some(body), Some(status), None, elapsed)
                }
                Err(e) => {
                    let elapsed = start.elapsed().as_millis() as i64;
                    row(None, Some(status), Some(e.to_string()), elapsed)
                }
            }
        }
        Err(e) => {
            let elapsed = start.elapsed().as_millis() as i64;
            row(None, None, Some(e.to_string()), elapsed)
        }
    }
}

/// Fetch a single URL with the pipeline contract: raw HTML, or an empty
/// string on any failure. Nothing propagates.
pub async fn fetch_html(client: &reqwest::Client, url: &str) -> String {
    let response = match client.get(url).send().await {
        Ok(r) => r,
        Err(_) => return String::new(),
    };
    if !response.status().is_success() {
        return String::new();
    }
    response.text().await.unwrap_or_default()
}
