//! CLI command implementations

use crate::output::{format_bytes, print_done, print_entries, print_output, print_stat};
use crate::progress::DownloadProgress;
use crate::{AssetsAction, ConfigAction, OutputFormat};
use anyhow::{anyhow, bail, Context, Result};
use console::style;
use fsbridge_core::config::{load_config, save_config};
use fsbridge_core::FsBridge;
use fsbridge_types::{DownloadEvent, DownloadOutcome, DownloadRequest, DownloaderConfig};
use futures::StreamExt;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::io::AsyncReadExt;
use tracing::debug;

// ============================================================================
// Download Commands
// ============================================================================

pub async fn download(
    bridge: &FsBridge,
    url: String,
    dest: PathBuf,
    headers: Vec<String>,
    job_id: Option<u32>,
    interval: Option<u64>,
    format: OutputFormat,
) -> Result<()> {
    let job_id = job_id.unwrap_or_else(|| bridge.downloads().next_job_id());

    let mut request = DownloadRequest::new(job_id, url, &dest);
    for header in &headers {
        let (name, value) = parse_header(header)?;
        request = request.with_header(name, value);
    }
    if let Some(interval) = interval {
        request = request.with_progress_interval(interval);
    }

    // Subscribe first so the Begin event can't be missed
    let events = bridge.subscribe_job(job_id);
    tokio::pin!(events);

    let mut bars = DownloadProgress::new();
    if !matches!(format, OutputFormat::Json) {
        let label = dest
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| dest.display().to_string());
        bars.add_job(job_id, &label);
    }

    bridge.download_file(request).await?;
    debug!(job_id, "Waiting for download events");

    let result = loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                bridge.stop_download(job_id).await;
                bars.stopped(job_id);
                if matches!(format, OutputFormat::Json) {
                    println!("{}", serde_json::json!({ "jobId": job_id, "stopped": true }));
                } else {
                    println!("{} Partial file kept at {}", style("○").dim(), dest.display());
                }
                return Ok(());
            }
            event = events.next() => {
                let Some(event) = event else {
                    bail!("event stream closed before job {} finished", job_id);
                };
                if matches!(format, OutputFormat::Json) {
                    println!("{}", serde_json::to_string(&event)?);
                } else {
                    bars.handle_event(&event);
                }
                if let DownloadEvent::Result(result) = event {
                    break result;
                }
            }
        }
    };

    match result.outcome {
        DownloadOutcome::Success => {
            if !matches!(format, OutputFormat::Json) {
                println!(
                    "  {} written to {}",
                    format_bytes(result.bytes_written),
                    style(dest.display()).cyan()
                );
            }
            Ok(())
        }
        DownloadOutcome::Failure { kind, message } => {
            Err(anyhow!("download failed ({:?}): {}", kind, message))
        }
    }
}

/// Split `Name: value`
fn parse_header(raw: &str) -> Result<(String, String)> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| anyhow!("header must look like 'Name: value', got '{}'", raw))?;
    let name = name.trim();
    if name.is_empty() {
        bail!("header name is empty in '{}'", raw);
    }
    Ok((name.to_string(), value.trim().to_string()))
}

// ============================================================================
// File Commands
// ============================================================================

pub async fn list_dir(bridge: &FsBridge, dir: &Path, format: OutputFormat) -> Result<()> {
    let entries = bridge.read_dir(dir).await?;
    print_entries(&entries, format)
}

pub async fn stat(bridge: &FsBridge, path: &Path, format: OutputFormat) -> Result<()> {
    let stat = bridge.stat(path).await?;
    print_stat(&stat, format)
}

pub async fn exists(bridge: &FsBridge, path: &Path, format: OutputFormat) -> Result<()> {
    let exists = bridge.exists(path).await?;
    print_output(&exists, format)
}

pub async fn cat(bridge: &FsBridge, path: &Path) -> Result<()> {
    let contents = bridge.read_file(path).await?;
    write_stdout(&contents)
}

pub async fn write_stdin(bridge: &FsBridge, path: &Path, format: OutputFormat) -> Result<()> {
    let mut contents = Vec::new();
    tokio::io::stdin()
        .read_to_end(&mut contents)
        .await
        .context("failed to read stdin")?;

    bridge.write_file(path, &contents).await?;
    print_done(
        &format!("Wrote {} to {}", format_bytes(contents.len() as u64), path.display()),
        format,
    )
}

pub async fn move_file(bridge: &FsBridge, from: &Path, to: &Path, format: OutputFormat) -> Result<()> {
    bridge.move_file(from, to).await?;
    print_done(&format!("Moved {} to {}", from.display(), to.display()), format)
}

pub async fn remove(bridge: &FsBridge, path: &Path, yes: bool, format: OutputFormat) -> Result<()> {
    let stat = bridge.stat(path).await?;

    if stat.is_directory() && !yes {
        let confirmed = dialoguer::Confirm::new()
            .with_prompt(format!(
                "Delete directory {} and everything in it?",
                path.display()
            ))
            .default(false)
            .interact()?;
        if !confirmed {
            println!("{}", style("Aborted").dim());
            return Ok(());
        }
    }

    bridge.unlink(path).await?;
    print_done(&format!("Deleted {}", path.display()), format)
}

pub async fn mkdir(bridge: &FsBridge, path: &Path, format: OutputFormat) -> Result<()> {
    bridge.mkdir(path).await?;
    print_done(&format!("Created {}", path.display()), format)
}

// ============================================================================
// Asset Commands
// ============================================================================

pub async fn assets_action(bridge: &FsBridge, action: AssetsAction, format: OutputFormat) -> Result<()> {
    match action {
        AssetsAction::Ls { dir } => {
            let entries = bridge.read_dir_assets(&dir).await?;
            print_entries(&entries, format)
        }
        AssetsAction::Stat { path } => {
            let stat = bridge.stat_assets(&path).await?;
            print_stat(&stat, format)
        }
        AssetsAction::Cat { path } => {
            let contents = bridge.read_file_assets(&path).await?;
            write_stdout(&contents)
        }
        AssetsAction::Copy { asset, dest } => {
            let copied = bridge.copy_file_assets(&asset, &dest).await?;
            print_done(
                &format!("Copied {} ({}) to {}", asset, format_bytes(copied), dest.display()),
                format,
            )
        }
    }
}

// ============================================================================
// Config Commands
// ============================================================================

pub async fn config_action(
    path: &Path,
    action: Option<ConfigAction>,
    format: OutputFormat,
) -> Result<()> {
    match action.unwrap_or(ConfigAction::Show) {
        ConfigAction::Show => {
            let config = load_config(path).await?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&config)?),
                OutputFormat::Human | OutputFormat::Table => print_config(&config),
            }
        }
        ConfigAction::Path => {
            println!("{}", path.display());
        }
        ConfigAction::Reset => {
            save_config(path, &DownloaderConfig::default()).await?;
            print_done(&format!("Config reset at {}", path.display()), format)?;
        }
    }
    Ok(())
}

fn print_config(config: &DownloaderConfig) {
    println!("{}", style("Downloader").bold());
    println!("  User agent: {}", config.user_agent);
    println!("  Connect timeout: {}s", config.connect_timeout_secs);
    match config.read_timeout_secs {
        Some(secs) => println!("  Read timeout: {}s", secs),
        None => println!("  Read timeout: none"),
    }
    println!("  Chunk size: {}", format_bytes(config.chunk_size as u64));
    println!("  Progress interval: {}ms", config.progress_interval_ms);
    println!("  Fail on HTTP error: {}", config.fail_on_http_error);
    println!("  Event capacity: {}", config.event_capacity);
    if let Some(ref dir) = config.assets_dir {
        println!("  Assets: {}", dir.display());
    }
    println!("  Proxy: {:?}", config.proxy.mode);
}

fn write_stdout(bytes: &[u8]) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(bytes)?;
    stdout.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_header() {
        let (name, value) = parse_header("Authorization: Bearer abc:def").unwrap();
        assert_eq!(name, "Authorization");
        assert_eq!(value, "Bearer abc:def");

        assert!(parse_header("no-colon").is_err());
        assert!(parse_header(": value").is_err());
    }
}
