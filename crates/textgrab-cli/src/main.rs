// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// textgrab — command-line text extraction.
//
// Entry point. Initialises logging, loads configuration, runs every image
// through one shared extractor concurrently and prints the results in input
// order. Logs go to stderr so stdout carries only extracted text.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use serde_json::json;
use textgrab_core::config::TextgrabConfig;
use textgrab_core::types::{DEFAULT_MIME_TYPE, EngineMode, ExtractionOptions, ImageBuffer, SegmentationMode};
use textgrab_ocr::TextExtractor;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "textgrab")]
#[command(version)]
#[command(about = "Extract clean, normalised text from images")]
struct Args {
    /// Image files to read.
    #[arg(required = true)]
    images: Vec<PathBuf>,

    /// Page segmentation mode for the primary pass (0-13).
    #[arg(long)]
    psm: Option<SegmentationMode>,

    /// Engine mode (0-3).
    #[arg(long)]
    oem: Option<EngineMode>,

    /// Only recognise these characters.
    #[arg(long)]
    whitelist: Option<String>,

    /// Average confidence below which an alternate pass runs.
    #[arg(long)]
    min_confidence: Option<f32>,

    /// Page segmentation mode for the alternate pass.
    #[arg(long)]
    retry_psm: Option<SegmentationMode>,

    /// Repair digit/letter confusions in numeric-looking text.
    #[arg(long)]
    numeric: bool,

    /// Keep colour and control characters (emoji, symbols).
    #[arg(long)]
    emoji_preserve: bool,

    /// JSON configuration file (defaults to $TEXTGRAB_CONFIG, then built-ins).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print one JSON report per image instead of plain text.
    #[arg(long)]
    json: bool,
}

impl Args {
    fn options(&self, base: ExtractionOptions) -> ExtractionOptions {
        ExtractionOptions {
            psm: self.psm.or(base.psm),
            whitelist: self.whitelist.clone().or(base.whitelist),
            oem: self.oem.or(base.oem),
            min_confidence: self.min_confidence.unwrap_or(base.min_confidence),
            retry_psm: self.retry_psm.unwrap_or(base.retry_psm),
            numeric: self.numeric,
            emoji_preserve: self.emoji_preserve,
        }
    }
}

/// What happened to one input file.
enum FileOutcome {
    Unreadable(String),
    Text(String),
    Report(serde_json::Value),
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => TextgrabConfig::load(path),
        None => TextgrabConfig::from_env(),
    };
    let config = match config {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "Could not load configuration");
            return ExitCode::from(2);
        }
    };

    info!(backend = ?config.engine.backend, files = args.images.len(), "textgrab starting");

    let extractor = Arc::new(TextExtractor::new(config));
    let options = Arc::new(args.options(extractor.default_options()));

    let tasks: Vec<_> = args
        .images
        .iter()
        .cloned()
        .map(|path| {
            let extractor = Arc::clone(&extractor);
            let options = Arc::clone(&options);
            let json = args.json;
            tokio::spawn(async move { process_file(&extractor, &path, &options, json).await })
        })
        .collect();

    let mut unreadable = 0usize;
    let multiple = args.images.len() > 1;
    for (path, task) in args.images.iter().zip(tasks) {
        let outcome = match task.await {
            Ok(outcome) => outcome,
            Err(err) => FileOutcome::Unreadable(format!("extraction task failed: {err}")),
        };
        match outcome {
            FileOutcome::Unreadable(reason) => {
                unreadable += 1;
                error!(path = %path.display(), %reason, "Skipping unreadable image");
                if args.json {
                    println!("{}", json!({ "path": path.display().to_string(), "error": reason }));
                }
            }
            FileOutcome::Text(text) => {
                if multiple {
                    println!("==> {} <==", path.display());
                }
                println!("{text}");
            }
            FileOutcome::Report(report) => println!("{report}"),
        }
    }

    extractor.shutdown().await;

    if unreadable > 0 {
        warn!(unreadable, "Some images could not be read");
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

async fn process_file(
    extractor: &TextExtractor,
    path: &Path,
    options: &ExtractionOptions,
    json: bool,
) -> FileOutcome {
    let data = match tokio::fs::read(path).await {
        Ok(data) => data,
        Err(err) => return FileOutcome::Unreadable(err.to_string()),
    };
    let image = ImageBuffer::new(data, mime_for(path));

    if !json {
        return FileOutcome::Text(extractor.extract_text(image, options).await);
    }

    let report = match extractor.extract(image, options).await {
        Ok(report) => serde_json::to_value(&report)
            .map(|mut value| {
                value["path"] = json!(path.display().to_string());
                value
            })
            .unwrap_or_else(|err| json!({ "path": path.display().to_string(), "error": err.to_string() })),
        Err(err) => json!({
            "path": path.display().to_string(),
            "text": extractor.config().sentinel(),
            "error": err.to_string(),
        }),
    };
    FileOutcome::Report(report)
}

/// MIME type from the file extension, PNG when unknown.
fn mime_for(path: &Path) -> &'static str {
    image::ImageFormat::from_path(path)
        .map(|format| format.to_mime_type())
        .unwrap_or(DEFAULT_MIME_TYPE)
}
