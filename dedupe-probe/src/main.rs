// ABOUTME: Simple REPL for probing a backend through the coordinated API client.
// ABOUTME: Reads DEDUPE_* settings from .env, fires single and burst requests.

use std::collections::HashSet;

use anyhow::{Result, bail};
use rustyline::DefaultEditor;
use serde_json::Value;
use tracing_subscriber::{EnvFilter, fmt};

use dedupe::prelude::*;

#[derive(Debug, PartialEq)]
enum Command {
    Get { path: String, params: Value },
    Post { path: String, body: Value },
    Burst { count: usize, path: String },
    Status,
    Clear { key: Option<String> },
    Help,
    Quit,
}

const HELP: &str = "\
Commands:
  get <path> [json]      GET with optional query params
  post <path> [json]     POST with optional JSON body
  burst <n> <path>       fire n concurrent GETs, count distinct results
  status                 list in-flight keys
  clear [key]            drop coordinator state (all keys or one)
  quit";

fn parse_json(rest: Option<&str>) -> Result<Value> {
    match rest.map(str::trim) {
        None | Some("") => Ok(Value::Null),
        Some(raw) => Ok(serde_json::from_str(raw)?),
    }
}

fn parse_command(line: &str) -> Result<Command> {
    let mut parts = line.trim().splitn(3, ' ');
    let verb = parts.next().unwrap_or_default();

    let command = match verb {
        "get" | "post" => {
            let Some(path) = parts.next() else {
                bail!("usage: {} <path> [json]", verb);
            };
            let params = parse_json(parts.next())?;
            if verb == "get" {
                Command::Get {
                    path: path.to_string(),
                    params,
                }
            } else {
                Command::Post {
                    path: path.to_string(),
                    body: params,
                }
            }
        }
        "burst" => {
            let (Some(count), Some(path)) = (parts.next(), parts.next()) else {
                bail!("usage: burst <n> <path>");
            };
            Command::Burst {
                count: count.parse()?,
                path: path.trim().to_string(),
            }
        }
        "status" => Command::Status,
        "clear" => Command::Clear {
            key: parts.next().map(str::to_string),
        },
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => bail!("unknown command '{}', try 'help'", other),
    };

    Ok(command)
}

fn print_result(result: Result<ApiResponse, ApiError>) {
    match result {
        Ok(response) => {
            let body = serde_json::to_string_pretty(&response.body)
                .unwrap_or_else(|_| response.body.to_string());
            println!("[{}]\n{}\n", response.status, body);
        }
        Err(e) if e.is_rejected() => println!("Skipped: {}\n", e),
        Err(e) => println!("Error: {}\n", e),
    }
}

#[derive(Debug, Default, PartialEq)]
struct BurstSummary {
    ok: usize,
    rejected: usize,
    failed: usize,
    /// Distinct response bodies among the successful results.
    distinct: usize,
}

fn summarize(results: &[Result<ApiResponse, ApiError>]) -> BurstSummary {
    let mut summary = BurstSummary::default();
    let mut bodies = HashSet::new();

    for result in results {
        match result {
            Ok(response) => {
                summary.ok += 1;
                bodies.insert(response.body.to_string());
            }
            Err(e) if e.is_rejected() => summary.rejected += 1,
            Err(_) => summary.failed += 1,
        }
    }

    summary.distinct = bodies.len();
    summary
}

async fn run_burst(client: &ApiClient, count: usize, path: &str) {
    let requests = (0..count).map(|_| client.get(path, &()));
    let results = futures::future::join_all(requests).await;

    let summary = summarize(&results);
    println!(
        "{} requests: {} ok ({} distinct), {} rejected, {} failed\n",
        count, summary.ok, summary.distinct, summary.rejected, summary.failed
    );
}

async fn run_repl(client: &ApiClient) -> Result<()> {
    let mut rl = DefaultEditor::new()?;

    println!("Type 'help' for commands, 'quit' to exit.\n");

    loop {
        let line = match rl.readline("> ") {
            Ok(line) => line,
            Err(_) => break,
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let _ = rl.add_history_entry(line);

        let command = match parse_command(line) {
            Ok(command) => command,
            Err(e) => {
                println!("{}\n", e);
                continue;
            }
        };

        match command {
            Command::Get { path, params } => print_result(client.get(&path, &params).await),
            Command::Post { path, body } => print_result(client.post(&path, &body).await),
            Command::Burst { count, path } => run_burst(client, count, &path).await,
            Command::Status => {
                let status = client.coordinator().status();
                println!("{}\n", serde_json::to_string_pretty(&status)?);
            }
            Command::Clear { key: Some(key) } => {
                client.coordinator().clear_key(&key);
                println!("Cleared {}\n", key);
            }
            Command::Clear { key: None } => {
                client.coordinator().clear();
                println!("Cleared all keys\n");
            }
            Command::Help => println!("{}\n", HELP),
            Command::Quit => break,
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let client = ApiClient::from_env()?;
    println!("Probing {}", client.base_url());

    run_repl(&client).await
}
