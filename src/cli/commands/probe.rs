//! Read-only probing commands.

use std::path::Path;
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;

use super::{cancel_on_ctrl_c, collect_audio_files, print_tool_install_instructions};
use crate::config::Config;
use crate::error::Error;
use crate::probe::{ProbeResult, probe_file};
use crate::tool::Transcoder;

/// Probe one file and print what the transcoder reports
pub fn cmd_probe(rt: &Runtime, config: &Config, path: &Path, json: bool) -> anyhow::Result<()> {
    let transcoder = Transcoder::new(&config.tool.path);
    let timeout = config.transform_settings().probe_timeout;

    let result = rt.block_on(probe_file(
        &transcoder,
        path,
        timeout,
        &CancellationToken::new(),
    ));
    let result = match result {
        Ok(result) => result,
        Err(Error::ToolUnavailable(tool)) => {
            print_tool_install_instructions(&tool);
            std::process::exit(1);
        }
        Err(e) => return Err(e.into()),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    println!("File:        {}", result.file_path.display());
    println!("Format:      {}", result.format);
    println!("Codec:       {}", result.codec);
    println!("Bitrate:     {}", optional(result.bitrate_kbps, "kb/s"));
    println!("Sample rate: {}", optional(result.sample_rate_hz, "Hz"));
    println!("Channels:    {}", optional(result.channels, ""));
    println!(
        "Duration:    {}",
        result
            .duration_seconds
            .map(|d| format!("{:.2}s", d))
            .unwrap_or_else(|| "-".to_string())
    );
    print_issues(&result);
    Ok(())
}

/// Probe every audio file under a directory
pub fn cmd_analyze(
    rt: &Runtime,
    config: &Config,
    path: &Path,
    recursive: bool,
    issues_only: bool,
) -> anyhow::Result<()> {
    let files = collect_audio_files(path, recursive)?;
    if files.is_empty() {
        println!("No audio files found in {:?}", path);
        return Ok(());
    }

    let transcoder = Transcoder::new(&config.tool.path);
    let timeout = config.transform_settings().probe_timeout;
    println!("Analyzing {} files...\n", files.len());

    rt.block_on(async {
        let cancel = cancel_on_ctrl_c();
        let mut with_issues = 0;
        let mut unreadable = 0;

        for file in &files {
            let result = match probe_file(&transcoder, file, timeout, &cancel).await {
                Ok(result) => result,
                Err(Error::ToolUnavailable(tool)) => {
                    print_tool_install_instructions(&tool);
                    std::process::exit(1);
                }
                Err(Error::Cancelled) => break,
                Err(e) => {
                    unreadable += 1;
                    eprintln!("✗ {}: {}", file.display(), e);
                    continue;
                }
            };

            if result.issues.has_any_issue() {
                with_issues += 1;
            } else if issues_only {
                continue;
            }

            let name = file
                .strip_prefix(path)
                .unwrap_or(file)
                .display()
                .to_string();
            let descriptions = result.issues.descriptions();
            if descriptions.is_empty() {
                println!("{} {}", result.issues.summary_icon(), name);
            } else {
                println!(
                    "{} {} ({})",
                    result.issues.summary_icon(),
                    name,
                    descriptions.join(", ")
                );
            }
        }

        println!();
        println!("Files analyzed:  {}", files.len());
        println!("  With issues:   {}", with_issues);
        if unreadable > 0 {
            println!("  Probe errors:  {}", unreadable);
        }
        anyhow::Ok(())
    })
}

fn optional<T: std::fmt::Display>(value: Option<T>, unit: &str) -> String {
    match value {
        Some(v) if unit.is_empty() => v.to_string(),
        Some(v) => format!("{} {}", v, unit),
        None => "-".to_string(),
    }
}

fn print_issues(result: &ProbeResult) {
    let descriptions = result.issues.descriptions();
    if descriptions.is_empty() {
        println!("Issues:      {} none", result.issues.summary_icon());
        return;
    }
    println!("Issues:      {}", result.issues.summary_icon());
    for description in descriptions {
        println!("  - {}", description);
    }
    if let Some(message) = &result.error_message {
        println!("  {}", message);
    }
}
