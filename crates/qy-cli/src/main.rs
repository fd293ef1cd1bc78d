//! # qy-cli — The "Chisel" of QUARRY
//!
//! Minimal CLI for the suggestion hub.
//!
//! - `qy suggest <field> [input]` — Ask for field-value suggestions.
//! - `qy streams list|add|remove` — Manage the stream catalog.
//! - `qy ingest <file>` — Send events (JSON array, object or NDJSON).
//! - `qy failures` / `qy shards` — Inspect the index.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use qy_core::{SuggestRequest, SuggestionResponse, TimeWindow};
use serde::Deserialize;
use tabled::{Table, Tabled};

/// ⛏  QUARRY — Scoped field-value suggestions over stream events.
#[derive(Parser)]
#[command(name = "qy", version, about, long_about = None)]
struct Cli {
    /// Hub base URL (default: $QY_BASE_URL or http://127.0.0.1:3000).
    #[arg(long, global = true)]
    hub: Option<String>,

    /// API key (default: $QY_API_KEY).
    #[arg(long, global = true)]
    key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Suggest values for a field.
    Suggest {
        field: String,

        /// Prefix typed so far.
        #[arg(default_value = "")]
        input: String,

        /// Restrict to a stream (repeatable).
        #[arg(long = "stream")]
        streams: Vec<String>,

        /// Relative window in seconds.
        #[arg(long, conflicts_with_all = ["from", "to"])]
        range: Option<i64>,

        /// Absolute window start (RFC 3339).
        #[arg(long, requires = "to")]
        from: Option<String>,

        /// Absolute window end (RFC 3339).
        #[arg(long, requires = "from")]
        to: Option<String>,

        /// Number of suggestions.
        #[arg(long)]
        size: Option<usize>,

        /// Print the raw JSON response.
        #[arg(long)]
        json: bool,
    },

    /// Manage streams (list, add, remove).
    Streams {
        #[command(subcommand)]
        action: StreamCmd,
    },

    /// Index events from a file.
    Ingest { file: PathBuf },

    /// List recent indexing failures.
    Failures {
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Inspect or toggle index shards.
    Shards {
        #[command(subcommand)]
        action: Option<ShardCmd>,
    },
}

#[derive(Subcommand)]
enum StreamCmd {
    List,
    Add {
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },
    Remove {
        id: String,
    },
}

#[derive(Subcommand)]
enum ShardCmd {
    List,
    Enable { id: String },
    Disable { id: String },
}

// =============================================================================
// Table rows
// =============================================================================

#[derive(Tabled)]
struct SuggestionRow {
    #[tabled(rename = "Value")]
    value: String,
    #[tabled(rename = "Occurrences")]
    occurrence: u64,
}

#[derive(Deserialize, Tabled)]
struct StreamRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Title")]
    title: String,
    #[tabled(rename = "Created")]
    created_at: String,
}

#[derive(Deserialize, Tabled)]
struct ShardRow {
    #[tabled(rename = "Shard")]
    id: String,
    #[tabled(rename = "Available")]
    available: bool,
    #[tabled(rename = "Events")]
    events: usize,
    #[tabled(rename = "Capacity")]
    capacity: usize,
    #[tabled(rename = "Evicted")]
    evicted_total: u64,
    #[tabled(rename = "Queries")]
    queries_total: u64,
}

#[derive(Deserialize, Tabled)]
struct FailureRow {
    #[tabled(rename = "Time")]
    timestamp: String,
    #[tabled(rename = "Message")]
    failed_message_id: String,
    #[tabled(rename = "Error")]
    error_message: String,
}

fn main() {
    let cli = Cli::parse();

    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: failed to build tokio runtime: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = rt.block_on(async_main(cli)) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn async_main(cli: Cli) -> Result<(), String> {
    let client = reqwest::Client::new();
    let base_url = cli
        .hub
        .or_else(|| std::env::var("QY_BASE_URL").ok())
        .unwrap_or_else(|| "http://127.0.0.1:3000".to_string());
    let base_url = base_url.trim_end_matches('/').to_string();
    let api_key = cli.key.or_else(|| std::env::var("QY_API_KEY").ok());
    let key = api_key.as_deref();

    match cli.command {
        Commands::Suggest {
            field,
            input,
            streams,
            range,
            from,
            to,
            size,
            json,
        } => {
            let request =
                build_suggest_request(field, input, streams, range, from.as_deref(), to.as_deref(), size)?;
            let url = format!("{}/api/search/suggest", base_url);
            let body = serde_json::to_value(&request).map_err(|e| e.to_string())?;
            let resp = checked(post_request(&client, &url, key, &body).await).await?;
            let response: SuggestionResponse = resp.json().await.map_err(|e| e.to_string())?;
            if json {
                println!("{}", pretty(&response)?);
            } else {
                print_suggestions(&response);
            }
        }

        Commands::Streams { action } => match action {
            StreamCmd::List => {
                let url = format!("{}/api/streams", base_url);
                let resp = checked(get_request(&client, &url, key).await).await?;
                let rows: Vec<StreamRow> = resp.json().await.map_err(|e| e.to_string())?;
                println!("{}", Table::new(rows));
            }
            StreamCmd::Add {
                id,
                title,
                description,
            } => {
                let url = format!("{}/api/streams", base_url);
                let payload = serde_json::json!({
                    "id": id,
                    "title": title,
                    "description": description,
                });
                checked(post_request(&client, &url, key, &payload).await).await?;
                println!("Stream created: {}", id);
            }
            StreamCmd::Remove { id } => {
                let url = format!("{}/api/streams/{}", base_url, id);
                checked(delete_request(&client, &url, key).await).await?;
                println!("Stream removed: {}", id);
            }
        },

        Commands::Ingest { file } => {
            let content = std::fs::read_to_string(&file)
                .map_err(|e| format!("cannot read {}: {}", file.display(), e))?;
            let events = parse_events(&content)?;
            let url = format!("{}/api/events", base_url);
            let resp = checked(
                post_request(&client, &url, key, &serde_json::Value::Array(events)).await,
            )
            .await?;
            let report: serde_json::Value = resp.json().await.map_err(|e| e.to_string())?;
            println!(
                "Accepted: {}  Failed: {}",
                report["accepted"].as_u64().unwrap_or(0),
                report["failed"].as_u64().unwrap_or(0)
            );
        }

        Commands::Failures { limit } => {
            let url = match limit {
                Some(limit) => format!("{}/api/failures?limit={}", base_url, limit),
                None => format!("{}/api/failures", base_url),
            };
            let resp = checked(get_request(&client, &url, key).await).await?;
            let rows: Vec<FailureRow> = resp.json().await.map_err(|e| e.to_string())?;
            if rows.is_empty() {
                println!("No indexing failures.");
            } else {
                println!("{}", Table::new(rows));
            }
        }

        Commands::Shards { action } => match action.unwrap_or(ShardCmd::List) {
            ShardCmd::List => {
                let url = format!("{}/api/index/shards", base_url);
                let resp = checked(get_request(&client, &url, key).await).await?;
                let rows: Vec<ShardRow> = resp.json().await.map_err(|e| e.to_string())?;
                println!("{}", Table::new(rows));
            }
            ShardCmd::Enable { id } => set_availability(&client, &base_url, key, &id, true).await?,
            ShardCmd::Disable { id } => set_availability(&client, &base_url, key, &id, false).await?,
        },
    }
    Ok(())
}

async fn set_availability(
    client: &reqwest::Client,
    base_url: &str,
    key: Option<&str>,
    id: &str,
    available: bool,
) -> Result<(), String> {
    let url = format!("{}/api/index/shards/{}/availability", base_url, id);
    let payload = serde_json::json!({ "available": available });
    checked(post_request(client, &url, key, &payload).await).await?;
    println!(
        "Shard {} is now {}",
        id,
        if available { "available" } else { "unavailable" }
    );
    Ok(())
}

fn build_suggest_request(
    field: String,
    input: String,
    streams: Vec<String>,
    range: Option<i64>,
    from: Option<&str>,
    to: Option<&str>,
    size: Option<usize>,
) -> Result<SuggestRequest, String> {
    let mut request = SuggestRequest::new(field)
        .with_input(input)
        .with_streams(streams);
    if let Some(range) = range {
        request = request.with_timerange(TimeWindow::relative(range));
    }
    if let (Some(from), Some(to)) = (from, to) {
        request = request.with_timerange(TimeWindow::absolute(parse_time(from)?, parse_time(to)?));
    }
    if let Some(size) = size {
        request = request.with_size(size);
    }
    Ok(request)
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("invalid time '{}': {}", raw, e))
}

/// A JSON array, a single JSON object, or one object per line.
fn parse_events(content: &str) -> Result<Vec<serde_json::Value>, String> {
    match serde_json::from_str::<serde_json::Value>(content) {
        Ok(serde_json::Value::Array(events)) => Ok(events),
        Ok(event @ serde_json::Value::Object(_)) => Ok(vec![event]),
        Ok(_) => Err("expected a JSON object or array of objects".into()),
        Err(_) => content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(n, line)| {
                serde_json::from_str(line).map_err(|e| format!("line {}: {}", n + 1, e))
            })
            .collect(),
    }
}

fn print_suggestions(response: &SuggestionResponse) {
    if response.suggestions.is_empty() {
        println!("No suggestions for {}:{:?}", response.field, response.input);
        return;
    }
    let rows: Vec<SuggestionRow> = response
        .suggestions
        .iter()
        .map(|s| SuggestionRow {
            value: s.value.clone(),
            occurrence: s.occurrence,
        })
        .collect();
    println!("{}", Table::new(rows));
    if response.sum_other_occurrences > 0 {
        println!(
            "{} more occurrences of other values",
            response.sum_other_occurrences
        );
    }
}

fn pretty<T: serde::Serialize>(value: &T) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| e.to_string())
}

/// Turn transport errors and non-2xx answers into a message.
async fn checked(
    resp: Result<reqwest::Response, reqwest::Error>,
) -> Result<reqwest::Response, String> {
    let resp = resp.map_err(|e| e.to_string())?;
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    if body.is_empty() {
        Err(format!("hub answered {}", status))
    } else {
        Err(format!("hub answered {}: {}", status, body))
    }
}

async fn get_request(
    client: &reqwest::Client,
    url: &str,
    key: Option<&str>,
) -> Result<reqwest::Response, reqwest::Error> {
    let mut req = client.get(url);
    if let Some(k) = key {
        req = req.header("Authorization", format!("Bearer {}", k));
    }
    req.send().await
}

async fn post_request(
    client: &reqwest::Client,
    url: &str,
    key: Option<&str>,
    json: &serde_json::Value,
) -> Result<reqwest::Response, reqwest::Error> {
    let mut req = client.post(url).json(json);
    if let Some(k) = key {
        req = req.header("Authorization", format!("Bearer {}", k));
    }
    req.send().await
}

async fn delete_request(
    client: &reqwest::Client,
    url: &str,
    key: Option<&str>,
) -> Result<reqwest::Response, reqwest::Error> {
    let mut req = client.delete(url);
    if let Some(k) = key {
        req = req.header("Authorization", format!("Bearer {}", k));
    }
    req.send().await
}
