//! `autobuild status` — clone and last-built state per repository.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use autobuild_core::RepositoryConfig;
use autobuild_sync::{git, read_marker};

use super::load_config;

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl StatusArgs {
    pub fn run(self, config_path: &Path) -> Result<()> {
        let config = load_config(config_path)?;
        let rows = config
            .repos
            .iter()
            .map(repo_status)
            .collect::<Result<Vec<_>>>()?;

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&rows).context("failed to serialize status JSON")?
            );
            return Ok(());
        }

        print_table(rows);
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct RepoStatus {
    name: String,
    branch: String,
    cloned: bool,
    last_built_commit: Option<String>,
    last_built_at: Option<DateTime<Utc>>,
    output_dir: String,
}

#[derive(Tabled)]
struct StatusTableRow {
    #[tabled(rename = "repository")]
    name: String,
    #[tabled(rename = "branch")]
    branch: String,
    #[tabled(rename = "clone")]
    clone: String,
    #[tabled(rename = "last built")]
    commit: String,
    #[tabled(rename = "when")]
    when: String,
}

fn repo_status(repo: &RepositoryConfig) -> Result<RepoStatus> {
    let marker = read_marker(repo)
        .with_context(|| format!("failed to read last-built marker for '{}'", repo.name))?;
    Ok(RepoStatus {
        name: repo.name.to_string(),
        branch: repo.branch.clone(),
        cloned: git::is_cloned(repo),
        last_built_commit: marker.as_ref().map(|m| m.commit.clone()),
        last_built_at: marker.and_then(|m| m.written_at),
        output_dir: repo.output_dir.display().to_string(),
    })
}

fn print_table(rows: Vec<RepoStatus>) {
    println!(
        "autobuild v{} | {} repositories",
        env!("CARGO_PKG_VERSION"),
        rows.len()
    );
    if rows.is_empty() {
        println!("No repositories configured.");
        return;
    }

    let never_built = rows.iter().filter(|r| r.last_built_commit.is_none()).count();
    let table_rows: Vec<StatusTableRow> = rows
        .into_iter()
        .map(|row| StatusTableRow {
            name: row.name,
            branch: row.branch,
            clone: if row.cloned {
                "cloned".green().to_string()
            } else {
                "missing".yellow().to_string()
            },
            commit: row
                .last_built_commit
                .as_deref()
                .map(|c| git::short(c).to_string())
                .unwrap_or_else(|| "never".bright_black().to_string()),
            when: row
                .last_built_at
                .map(format_age)
                .unwrap_or_else(|| "-".to_string()),
        })
        .collect();
    let mut table = Table::new(table_rows);
    table.with(Style::rounded());
    println!("{table}");

    if never_built > 0 {
        println!("Run 'autobuild build <name>' to build a repository now.");
    }
}

fn format_age(at: DateTime<Utc>) -> String {
    let secs = Utc::now().signed_duration_since(at).num_seconds().max(0);
    match secs {
        0..=59 => format!("{secs}s ago"),
        60..=3599 => format!("{}m ago", secs / 60),
        3600..=86_399 => format!("{}h ago", secs / 3600),
        _ => format!("{}d ago", secs / 86_400),
    }
}
