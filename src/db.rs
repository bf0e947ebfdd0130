use std::collections::HashMap;

use anyhow::Result;
use rusqlite::Connection;

use crate::search::{SearchFilters, SearchHit};

const DB_PATH: &str = "data/programs.sqlite";

pub fn connect() -> Result<Connection> {
    std::fs::create_dir_all("data")?;
    let conn = Connection::open(DB_PATH)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON; PRAGMA busy_timeout=30000;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS queries (
            id           INTEGER PRIMARY KEY,
            topic        TEXT NOT NULL,
            filters_json TEXT,
            created_at   TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS pages (
            id         INTEGER PRIMARY KEY,
            query_id   INTEGER REFERENCES queries(id),
            url        TEXT UNIQUE NOT NULL,
            title      TEXT,
            snippet    TEXT,
            visited    BOOLEAN NOT NULL DEFAULT 0,
            visited_at TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_pages_visited ON pages(visited);

        CREATE TABLE IF NOT EXISTS page_data (
            id         INTEGER PRIMARY KEY,
            page_id    INTEGER NOT NULL REFERENCES pages(id),
            url        TEXT NOT NULL,
            html       TEXT,
            status     INTEGER,
            error      TEXT,
            latency_ms INTEGER,
            processed  BOOLEAN NOT NULL DEFAULT 0,
            fetched_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_page_data_page ON page_data(page_id);
        CREATE INDEX IF NOT EXISTS idx_page_data_processed ON page_data(processed);

        CREATE TABLE IF NOT EXISTS sources (
            id              INTEGER PRIMARY KEY,
            url             TEXT UNIQUE NOT NULL,
            last_scraped_at TEXT
        );

        CREATE TABLE IF NOT EXISTS programs (
            id             INTEGER PRIMARY KEY,
            source_id      INTEGER REFERENCES sources(id),
            url            TEXT NOT NULL,
            title          TEXT NOT NULL,
            description    TEXT,
            price          REAL,
            currency       TEXT,
            price_usd_real REAL,
            start_date     TEXT,
            end_date       TEXT,
            mode           TEXT CHECK(mode IN ('Online','In-person','Unknown')),
            venue          TEXT,
            city           TEXT,
            country        TEXT,
            type           TEXT CHECK(type IN ('Course','Seminar','Video','Other')),
            is_approved    INTEGER NOT NULL DEFAULT 1,
            created_at     TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE(url, title)
        );
        CREATE INDEX IF NOT EXISTS idx_programs_type ON programs(type);
        CREATE INDEX IF NOT EXISTS idx_programs_mode ON programs(mode);
        CREATE INDEX IF NOT EXISTS idx_programs_source ON programs(source_id);
        ",
    )?;
    Ok(())
}

// ── Queries ──

pub fn save_query(conn: &Connection, topic: &str, filters: &SearchFilters) -> Result<i64> {
    conn.execute(
        "INSERT INTO queries (topic, filters_json) VALUES (?1, ?2)",
        rusqlite::params![topic, serde_json::to_string(filters)?],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Filters of every saved query, keyed by query id. Unreadable JSON
/// falls back to defaults.
pub fn load_filters(conn: &Connection) -> Result<HashMap<i64, SearchFilters>> {
    let mut stmt = conn.prepare("SELECT id, filters_json FROM queries")?;
    let rows = stmt
        .query_map([], |row| {
            let id: i64 = row.get(0)?;
            let json: Option<String> = row.get(1)?;
            Ok((id, json))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows
        .into_iter()
        .map(|(id, json)| {
            let filters = json
                .and_then(|j| serde_json::from_str(&j).ok())
                .unwrap_or_default();
            (id, filters)
        })
        .collect())
}

// ── Candidate pages ──

pub fn insert_pages(conn: &Connection, query_id: i64, hits: &[SearchHit]) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let mut count = 0;
    {
        let mut stmt = tx.prepare(
            "INSERT OR IGNORE INTO pages (query_id, url, title, snippet) VALUES (?1, ?2, ?3, ?4)",
        )?;
        for hit in hits {
            count += stmt.execute(rusqlite::params![query_id, hit.link, hit.title, hit.snippet])?;
        }
    }
    tx.commit()?;
    Ok(count)
}

pub fn fetch_unvisited(conn: &Connection, limit: Option<usize>) -> Result<Vec<(i64, String)>> {
    let sql = match limit {
        Some(n) => format!("SELECT id, url FROM pages WHERE visited = 0 ORDER BY id LIMIT {}", n),
        None => "SELECT id, url FROM pages WHERE visited = 0 ORDER BY id".to_string(),
    };
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// One fetch attempt, as streamed back by the fetcher.
pub struct FetchRow {
    pub page_id: i64,
    pub url: String,
    pub html: Option<String>,
    pub status: Option<i32>,
    pub error: Option<String>,
    pub latency_ms: Option<i64>,
}

// ── Processing ──

/// A fetched page ready for extraction, joined with its search hit.
pub struct FetchedPage {
    pub page_data_id: i64,
    pub url: String,
    pub hit_title: String,
    pub snippet: String,
    pub html: String,
    pub query_id: Option<i64>,
}

pub fn fetch_unprocessed(conn: &Connection, limit: Option<usize>) -> Result<Vec<FetchedPage>> {
    let sql = format!(
        "SELECT pd.id, pd.url, COALESCE(p.title, ''), COALESCE(p.snippet, ''), pd.html, p.query_id
         FROM page_data pd
         JOIN pages p ON p.id = pd.page_id
         WHERE pd.html IS NOT NULL AND pd.processed = 0
         ORDER BY pd.id{}",
        match limit {
            Some(n) => format!(" LIMIT {}", n),
            None => String::new(),
        }
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], |row| {
            Ok(FetchedPage {
                page_data_id: row.get(0)?,
                url: row.get(1)?,
                hit_title: row.get(2)?,
                snippet: row.get(3)?,
                html: row.get(4)?,
                query_id: row.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn mark_processed(conn: &Connection, page_data_id: i64) -> Result<()> {
    conn.execute(
        "UPDATE page_data SET processed = 1 WHERE id = ?1",
        rusqlite::params![page_data_id],
    )?;
    Ok(())
}

// ── Programs ──

/// A fully enriched program row bound for storage.
pub struct ProgramRow {
    pub url: String,
    pub title: String,
    pub description: Option<String>,
    pub price: Option<f64>,
    pub currency: Option<String>,
    pub price_usd: Option<f64>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub mode: String,
    pub venue: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub kind: String,
}

fn domain_of(raw: &str) -> String {
    url::Url::parse(raw)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_lowercase()))
        .unwrap_or_else(|| raw.to_lowercase())
}

fn ensure_source(tx: &rusqlite::Transaction, program_url: &str) -> Result<i64> {
    let domain = domain_of(program_url);
    tx.execute(
        "INSERT OR IGNORE INTO sources (url) VALUES (?1)",
        rusqlite::params![domain],
    )?;
    tx.execute(
        "UPDATE sources SET last_scraped_at = datetime('now') WHERE url = ?1",
        rusqlite::params![domain],
    )?;
    let id = tx.query_row(
        "SELECT id FROM sources WHERE url = ?1",
        rusqlite::params![domain],
        |row| row.get(0),
    )?;
    Ok(id)
}

/// Insert program rows, silently skipping duplicate (url, title) pairs.
/// Returns the number actually inserted.
pub fn save_programs(conn: &Connection, rows: &[ProgramRow]) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let mut count = 0;
    for r in rows {
        if r.url.is_empty() {
            continue;
        }
        let source_id = ensure_source(&tx, &r.url)?;
        count += tx.execute(
            "INSERT OR IGNORE INTO programs
             (source_id, url, title, description, price, currency, price_usd_real,
              start_date, end_date, mode, venue, city, country, type)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14)",
            rusqlite::params![
                source_id, r.url, r.title, r.description, r.price, r.currency, r.price_usd,
                r.start_date, r.end_date, r.mode, r.venue, r.city, r.country, r.kind,
            ],
        )?;
    }
    tx.commit()?;
    Ok(count)
}

// ── Listing ──

#[derive(Default)]
pub struct ListFilters {
    pub kind: Option<String>,
    pub mode: Option<String>,
    pub cost: Option<String>,
    pub country_contains: Option<String>,
    pub city_contains: Option<String>,
    pub limit: usize,
}

pub struct ProgramSummary {
    pub id: i64,
    pub title: String,
    pub kind: String,
    pub mode: String,
    pub country: String,
    pub city: String,
    pub price: Option<f64>,
    pub currency: String,
    pub url: String,
}

pub fn list_programs(conn: &Connection, filters: &ListFilters) -> Result<Vec<ProgramSummary>> {
    let mut conditions = Vec::new();
    let mut params: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

    if let Some(kind) = &filters.kind {
        conditions.push(format!("type = ?{}", params.len() + 1));
        params.push(Box::new(kind.clone()));
    }
    if let Some(mode) = &filters.mode {
        conditions.push(format!("mode = ?{}", params.len() + 1));
        params.push(Box::new(mode.clone()));
    }
    match filters.cost.as_deref() {
        Some("Free") => conditions.push("(price IS NULL OR price = 0)".to_string()),
        Some(_) => conditions.push("(price IS NOT NULL AND price > 0)".to_string()),
        None => {}
    }
    if let Some(country) = &filters.country_contains {
        conditions.push(format!("LOWER(country) LIKE ?{}", params.len() + 1));
        params.push(Box::new(format!("%{}%", country.to_lowercase())));
    }
    if let Some(city) = &filters.city_contains {
        conditions.push(format!("LOWER(city) LIKE ?{}", params.len() + 1));
        params.push(Box::new(format!("%{}%", city.to_lowercase())));
    }

    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", conditions.join(" AND "))
    };
    let limit = if filters.limit == 0 { 50 } else { filters.limit };
    let sql = format!(
        "SELECT id, title, COALESCE(type,''), COALESCE(mode,''), COALESCE(country,''),
                COALESCE(city,''), price, COALESCE(currency,''), url
         FROM programs{}
         ORDER BY id DESC
         LIMIT {}",
        where_clause, limit
    );

    let mut stmt = conn.prepare(&sql)?;
    let param_refs: Vec<&dyn rusqlite::types::ToSql> = params.iter().map(|p| p.as_ref()).collect();
    let rows = stmt
        .query_map(param_refs.as_slice(), |row| {
            Ok(ProgramSummary {
                id: row.get(0)?,
                title: row.get(1)?,
                kind: row.get(2)?,
                mode: row.get(3)?,
                country: row.get(4)?,
                city: row.get(5)?,
                price: row.get(6)?,
                currency: row.get(7)?,
                url: row.get(8)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub struct ProgramDetail {
    pub id: i64,
    pub url: String,
    pub title: String,
    pub description: Option<String>,
    pub price: Option<f64>,
    pub currency: Option<String>,
    pub price_usd: Option<f64>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub mode: String,
    pub venue: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub kind: String,
    pub is_approved: bool,
    pub created_at: String,
}

pub fn get_program(conn: &Connection, id: i64) -> Result<Option<ProgramDetail>> {
    let mut stmt = conn.prepare(
        "SELECT id, url, title, description, price, currency, price_usd_real,
                start_date, end_date, COALESCE(mode,''), venue, city, country,
                COALESCE(type,''), is_approved, created_at
         FROM programs WHERE id = ?1",
    )?;
    let mut rows = stmt.query_map(rusqlite::params![id], |row| {
        Ok(ProgramDetail {
            id: row.get(0)?,
            url: row.get(1)?,
            title: row.get(2)?,
            description: row.get(3)?,
            price: row.get(4)?,
            currency: row.get(5)?,
            price_usd: row.get(6)?,
            start_date: row.get(7)?,
            end_date: row.get(8)?,
            mode: row.get(9)?,
            venue: row.get(10)?,
            city: row.get(11)?,
            country: row.get(12)?,
            kind: row.get(13)?,
            is_approved: row.get(14)?,
            created_at: row.get(15)?,
        })
    })?;
    Ok(rows.next().transpose()?)
}

pub fn toggle_approved(conn: &Connection, id: i64) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE programs SET is_approved = 1 - is_approved WHERE id = ?1",
        rusqlite::params![id],
    )?;
    Ok(changed > 0)
}

// ── Stats ──

pub struct Stats {
    pub pages_total: usize,
    pub visited: usize,
    pub unvisited: usize,
    pub fetched: usize,
    pub errors: usize,
    pub programs: usize,
    pub approved: usize,
    pub sources: usize,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let pages_total: usize = conn.query_row("SELECT COUNT(*) FROM pages", [], |r| r.get(0))?;
    let visited: usize =
        conn.query_row("SELECT COUNT(*) FROM pages WHERE visited = 1", [], |r| r.get(0))?;
    let fetched: usize = conn.query_row("SELECT COUNT(*) FROM page_data", [], |r| r.get(0))?;
    let errors: usize = conn.query_row(
        "SELECT COUNT(*) FROM page_data WHERE error IS NOT NULL",
        [],
        |r| r.get(0),
    )?;
    let programs: usize = conn.query_row("SELECT COUNT(*) FROM programs", [], |r| r.get(0))?;
    let approved: usize = conn.query_row(
        "SELECT COUNT(*) FROM programs WHERE is_approved = 1",
        [],
        |r| r.get(0),
    )?;
    let sources: usize = conn.query_row("SELECT COUNT(*) FROM sources", [], |r| r.get(0))?;
    Ok(Stats {
        pages_total,
        visited,
        unvisited: pages_total - visited,
        fetched,
        errors,
        programs,
        approved,
        sources,
    })
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    fn hit(title: &str, link: &str) -> SearchHit {
        SearchHit {
            title: title.to_string(),
            link: link.to_string(),
            snippet: String::new(),
        }
    }

    fn row(url: &str, title: &str) -> ProgramRow {
        ProgramRow {
            url: url.to_string(),
            title: title.to_string(),
            description: None,
            price: Some(100.0),
            currency: Some("USD".to_string()),
            price_usd: Some(100.0),
            start_date: None,
            end_date: None,
            mode: "Online".to_string(),
            venue: None,
            city: Some("Melbourne".to_string()),
            country: Some("Australia".to_string()),
            kind: "Course".to_string(),
        }
    }

    #[test]
    fn page_queue_insert_is_idempotent() {
        let conn = test_conn();
        let qid = save_query(&conn, "python", &SearchFilters::default()).unwrap();
        let hits = vec![hit("A", "https://a.com/1"), hit("B", "https://b.com/2")];
        assert_eq!(insert_pages(&conn, qid, &hits).unwrap(), 2);
        assert_eq!(insert_pages(&conn, qid, &hits).unwrap(), 0);
        assert_eq!(fetch_unvisited(&conn, None).unwrap().len(), 2);
    }

    #[test]
    fn duplicate_url_title_pairs_are_ignored() {
        let conn = test_conn();
        let rows = vec![
            row("https://a.com/c", "Course One"),
            row("https://a.com/c", "Course One"),
            row("https://a.com/c", "Course Two"),
        ];
        assert_eq!(save_programs(&conn, &rows).unwrap(), 2);
        assert_eq!(save_programs(&conn, &rows).unwrap(), 0);
    }

    #[test]
    fn sources_are_deduplicated_by_domain() {
        let conn = test_conn();
        let rows = vec![
            row("https://a.com/one", "One Course"),
            row("https://a.com/two", "Two Course"),
            row("https://b.org/x", "Other Course"),
        ];
        save_programs(&conn, &rows).unwrap();
        assert_eq!(get_stats(&conn).unwrap().sources, 2);
    }

    #[test]
    fn list_filters_compose() {
        let conn = test_conn();
        let mut cheap = row("https://a.com/free", "Free Course");
        cheap.price = None;
        cheap.price_usd = None;
        let mut seminar = row("https://a.com/s", "Paid Seminar");
        seminar.kind = "Seminar".to_string();
        save_programs(&conn, &[row("https://a.com/c", "Paid Course"), cheap, seminar]).unwrap();

        let all = list_programs(&conn, &ListFilters::default()).unwrap();
        assert_eq!(all.len(), 3);

        let filters = ListFilters {
            kind: Some("Course".to_string()),
            cost: Some("Free".to_string()),
            country_contains: Some("austral".to_string()),
            ..ListFilters::default()
        };
        let filtered = list_programs(&conn, &filters).unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].title, "Free Course");
    }

    #[test]
    fn detail_and_approval_toggle() {
        let conn = test_conn();
        save_programs(&conn, &[row("https://a.com/c", "Course One")]).unwrap();
        let listed = list_programs(&conn, &ListFilters::default()).unwrap();
        let id = listed[0].id;

        let detail = get_program(&conn, id).unwrap().unwrap();
        assert!(detail.is_approved);
        assert_eq!(detail.price_usd, Some(100.0));

        assert!(toggle_approved(&conn, id).unwrap());
        assert!(!get_program(&conn, id).unwrap().unwrap().is_approved);
        assert!(!toggle_approved(&conn, 9999).unwrap());
    }

    #[test]
    fn missing_program_is_none() {
        let conn = test_conn();
        assert!(get_program(&conn, 1).unwrap().is_none());
    }
}
