use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};

use club_stats::config::db_path_from_env;
use club_stats::sqlite_store::SqliteStore;
use club_stats::{StatsRequest, StatsService};

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let request = parse_request(&args)?;
    let db_path = arg_value(&args, "--db")
        .map(PathBuf::from)
        .or_else(db_path_from_env)
        .context("unable to resolve sqlite path")?;

    let store = SqliteStore::open(&db_path)?;
    let service = StatsService::new(Arc::new(store));

    match service.get(&request) {
        Ok(response) => {
            let json =
                serde_json::to_string_pretty(&response).context("serialize stats response")?;
            println!("{json}");
            if response.from_cache {
                log::info!("served from cache");
            }
            Ok(())
        }
        Err(err) => {
            eprintln!("error ({}): {err}", err.status_code());
            std::process::exit(if err.is_not_found() { 2 } else { 1 });
        }
    }
}

fn parse_request(args: &[String]) -> Result<StatsRequest> {
    let club_id = arg_value(args, "--club").ok_or_else(|| anyhow!("--club is required"))?;
    let player_id = arg_value(args, "--player").ok_or_else(|| anyhow!("--player is required"))?;
    let mut request = StatsRequest::new(&club_id, &player_id);
    request.season = arg_value(args, "--season");
    request.include_summaries = args.iter().any(|arg| arg == "--summaries");
    request.force_refresh = args.iter().any(|arg| arg == "--force");
    Ok(request)
}

fn arg_value(args: &[String], name: &str) -> Option<String> {
    let prefix = format!("{name}=");
    for (idx, arg) in args.iter().enumerate() {
        if let Some(value) = arg.strip_prefix(&prefix) {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
        if arg == name {
            let Some(next) = args.get(idx + 1) else {
                continue;
            };
            if !next.trim().is_empty() {
                return Some(next.trim().to_string());
            }
        }
    }
    None
}
