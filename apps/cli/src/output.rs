//! Output formatting utilities

use crate::OutputFormat;
use console::style;
use fsbridge_types::{DirEntry, FileStat};
use serde::Serialize;

/// Print output in the specified format
pub fn print_output<T: Serialize + std::fmt::Display>(
    value: &T,
    format: OutputFormat,
) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(value)?);
        }
        OutputFormat::Human | OutputFormat::Table => {
            println!("{}", value);
        }
    }
    Ok(())
}

/// Print a confirmation line, or `{"ok": true, ...}` in JSON mode
pub fn print_done(message: &str, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => {
            let value = serde_json::json!({ "ok": true, "message": message });
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        OutputFormat::Human | OutputFormat::Table => {
            println!("{} {}", style("✓").green().bold(), message);
        }
    }
    Ok(())
}

/// Format bytes as human-readable
pub fn format_bytes(bytes: u64) -> String {
    human_bytes::human_bytes(bytes as f64)
}

pub fn print_entries(entries: &[DirEntry], format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(entries)?);
        }
        OutputFormat::Table => {
            use tabled::{Table, Tabled};

            #[derive(Tabled)]
            struct EntryRow {
                name: String,
                kind: String,
                size: String,
            }

            let rows: Vec<EntryRow> = entries
                .iter()
                .map(|e| EntryRow {
                    name: e.name.clone(),
                    kind: if e.is_directory() { "dir" } else { "file" }.to_string(),
                    size: if e.is_directory() {
                        "-".to_string()
                    } else {
                        format_bytes(e.size)
                    },
                })
                .collect();

            println!("{}", Table::new(rows));
        }
        OutputFormat::Human => {
            if entries.is_empty() {
                println!("{}", style("Empty directory").dim());
                return Ok(());
            }

            for entry in entries {
                if entry.is_directory() {
                    println!("{}/", style(&entry.name).blue().bold());
                } else {
                    println!("{}  {}", entry.name, style(format_bytes(entry.size)).dim());
                }
            }
        }
    }
    Ok(())
}

pub fn print_stat(stat: &FileStat, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(stat)?);
        }
        OutputFormat::Human | OutputFormat::Table => {
            println!("{}", style(stat.path.display()).bold());
            println!("  Kind: {}", if stat.is_directory() { "directory" } else { "file" });
            println!("  Size: {} ({} bytes)", format_bytes(stat.size), stat.size);
            println!("  Modified: {}", stat.mtime.to_rfc3339());
            println!("  Created: {}", stat.ctime.to_rfc3339());
            if let Some(mode) = stat.mode {
                println!("  Mode: {:o}", mode & 0o7777);
            }
            if stat.readonly {
                println!("  {}", style("read-only").yellow());
            }
        }
    }
    Ok(())
}
