use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};

use club_stats::config::db_path_from_env;
use club_stats::sqlite_store::SqliteStore;

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let files = input_files(&args);
    if files.is_empty() {
        return Err(anyhow!("usage: store_import [--db PATH] FILE.json..."));
    }

    let db_path = parse_db_path_arg(&args)
        .or_else(db_path_from_env)
        .context("unable to resolve sqlite path")?;
    let store = SqliteStore::open(&db_path)?;

    let mut total = 0usize;
    let mut errors: Vec<String> = Vec::new();
    for file in &files {
        let raw = match fs::read_to_string(file) {
            Ok(raw) => raw,
            Err(err) => {
                errors.push(format!("{}: {err}", file.display()));
                continue;
            }
        };
        match store.import_json(&raw) {
            Ok(written) => {
                log::info!("imported {written} documents from {}", file.display());
                total += written;
            }
            Err(err) => errors.push(format!("{}: {err:#}", file.display())),
        }
    }

    println!("Import complete");
    println!("DB: {}", db_path.display());
    println!("Documents written: {total}");
    if !errors.is_empty() {
        println!("Errors: {}", errors.len());
        for err in errors.iter().take(8) {
            println!(" - {err}");
        }
    }
    Ok(())
}

fn input_files(args: &[String]) -> Vec<PathBuf> {
    let mut out = Vec::new();
    let mut skip_next = false;
    for arg in args {
        if skip_next {
            skip_next = false;
            continue;
        }
        if arg == "--db" {
            skip_next = true;
            continue;
        }
        if arg.starts_with("--") {
            continue;
        }
        out.push(PathBuf::from(arg));
    }
    out
}

fn parse_db_path_arg(args: &[String]) -> Option<PathBuf> {
    for (idx, arg) in args.iter().enumerate() {
        if let Some(path) = arg.strip_prefix("--db=") {
            let trimmed = path.trim();
            if !trimmed.is_empty() {
                return Some(PathBuf::from(trimmed));
            }
        }
        if arg == "--db" {
            let Some(next) = args.get(idx + 1) else {
                continue;
            };
            if !next.trim().is_empty() {
                return Some(PathBuf::from(next));
            }
        }
    }
    None
}
