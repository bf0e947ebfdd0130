//! Web search for candidate program pages (SerpAPI, Google engine).

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

const SEARCH_ENDPOINT: &str = "https://serpapi.com/search.json";

/// Terms biasing results toward program listings.
const BASE_TERMS: &[&str] = &["education", "course OR workshop OR webinar OR training"];
/// Negative terms keeping job boards and scholarship spam out.
const EXCLUSION_TERMS: &[&str] = &["-jobs", "-careers", "-employment", "-hire", "-vacancy", "-scholarship"];

/// One organic search result.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchHit {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub snippet: String,
}

/// User-facing search filters, persisted as JSON alongside the query.
/// "Any" disables a dimension.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchFilters {
    #[serde(rename = "type")]
    pub kind: String,
    pub mode: String,
    pub cost: String,
    pub country: String,
    pub region: String,
}

impl Default for SearchFilters {
    fn default() -> Self {
        Self {
            kind: "Any".to_string(),
            mode: "Any".to_string(),
            cost: "Any".to_string(),
            country: "Any".to_string(),
            region: "Any".to_string(),
        }
    }
}

/// Run the relaxation ladder: country+region, country only, then bare.
/// The first query returning anything wins; per-query errors are logged
/// and fall through to the next rung.
pub async fn search_web(
    client: &reqwest::Client,
    topic: &str,
    filters: &SearchFilters,
    max_results: usize,
) -> Result<Vec<SearchHit>> {
    let api_key = std::env::var("SERPAPI_API_KEY")
        .map_err(|_| anyhow!("SERPAPI_API_KEY environment variable must be set"))?;

    for query in query_ladder(topic, filters) {
        match run_query(client, &api_key, &query, max_results).await {
            Ok(hits) if !hits.is_empty() => {
                info!("Search '{}': {} hits", query, hits.len());
                return Ok(hits);
            }
            Ok(_) => info!("Search '{}': no hits, relaxing", query),
            Err(e) => warn!("Search '{}' failed: {}", query, e),
        }
    }
    Ok(Vec::new())
}

fn query_ladder(topic: &str, filters: &SearchFilters) -> Vec<String> {
    let mut base: Vec<String> = vec![topic.to_string()];
    base.extend(BASE_TERMS.iter().map(|s| s.to_string()));
    base.extend(EXCLUSION_TERMS.iter().map(|s| s.to_string()));

    match filters.kind.as_str() {
        "Course" => base.push("course".to_string()),
        "Seminar" => base.push("seminar OR workshop".to_string()),
        "Video" => base.push("video OR lecture".to_string()),
        _ => {}
    }
    match filters.mode.as_str() {
        "Online" => base.push("online".to_string()),
        "In-person" => base.push("in person OR on campus".to_string()),
        _ => {}
    }
    match filters.cost.as_str() {
        "Free" => base.push("free".to_string()),
        "Paid" => base.push("fee OR $".to_string()),
        _ => {}
    }

    let mut tries = Vec::new();
    if filters.country != "Any" && filters.region != "Any" {
        let mut parts = base.clone();
        parts.push(filters.country.clone());
        parts.push(filters.region.clone());
        tries.push(parts.join(" "));
    }
    if filters.country != "Any" {
        let mut parts = base.clone();
        parts.push(filters.country.clone());
        tries.push(parts.join(" "));
    }
    tries.push(base.join(" "));
    tries
}

async fn run_query(
    client: &reqwest::Client,
    api_key: &str,
    query: &str,
    max_results: usize,
) -> Result<Vec<SearchHit>> {
    #[derive(Deserialize)]
    struct Response {
        #[serde(default)]
        organic_results: Vec<SearchHit>,
    }

    let num = max_results.to_string();
    let response = client
        .get(SEARCH_ENDPOINT)
        .query(&[
            ("engine", "google"),
            ("q", query),
            ("num", num.as_str()),
            ("api_key", api_key),
        ])
        .send()
        .await?
        .error_for_status()?;

    let body: Response = response.json().await.context("Malformed search response")?;
    let mut hits = body.organic_results;
    hits.truncate(max_results);
    hits.retain(|h| !h.link.is_empty());
    Ok(hits)
}
