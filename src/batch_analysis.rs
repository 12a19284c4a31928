/// Folder-wide analysis: every recording below a directory is processed
/// independently (in parallel), with a metrics CSV written next to each file
/// and one summary table for the whole folder.
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{SecondsFormat, Utc};
use csv::Writer;
use rayon::prelude::*;
use serde::Serialize;
use walkdir::WalkDir;

use crate::config::AnalysisConfig;
use crate::error::CmjError;
use crate::metrics_export::{format_percent, format_value, write_metrics_csv};
use crate::session::AnalysisSession;

pub const METRICS_SUFFIX: &str = "_metrics.csv";
pub const TRACE_SUFFIX: &str = "_trace.csv";
pub const SUMMARY_FILE: &str = "batch_summary.csv";

#[derive(Debug, Clone, Serialize)]
pub struct BatchSummaryRow {
    pub filename: String,
    pub analyzed_at: String,
    pub flights_detected: usize,
    pub flight_time_s: String,
    pub jump_height_cm: String,
    pub fmax_n: String,
    pub pmax_w: String,
    pub asymmetry_pct: String,
}

#[derive(Debug)]
pub struct BatchReport {
    pub rows: Vec<BatchSummaryRow>,
    pub failures: Vec<(PathBuf, String)>,
    pub summary_path: PathBuf,
}

/// `<stem>_metrics.csv` next to the recording.
pub fn metrics_path_for(recording: &Path) -> PathBuf {
    sibling_with_suffix(recording, METRICS_SUFFIX)
}

pub fn trace_path_for(recording: &Path) -> PathBuf {
    sibling_with_suffix(recording, TRACE_SUFFIX)
}

fn sibling_with_suffix(recording: &Path, suffix: &str) -> PathBuf {
    let stem = recording
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("recording");
    recording.with_file_name(format!("{}{}", stem, suffix))
}

fn is_recording(path: &Path) -> bool {
    let name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .to_lowercase();
    if name.ends_with(METRICS_SUFFIX) || name.ends_with(TRACE_SUFFIX) || name == SUMMARY_FILE {
        return false;
    }
    name.ends_with(".txt") || name.ends_with(".csv")
}

pub fn find_recordings(folder: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(folder)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file() && is_recording(entry.path()))
        .map(|entry| entry.path().to_path_buf())
        .collect();
    files.sort();
    files
}

fn analyze_one(path: &Path, config: &AnalysisConfig) -> Result<BatchSummaryRow, CmjError> {
    let session = AnalysisSession::run_file(config.clone(), path)?;
    let metrics = session.metrics();
    write_metrics_csv(&metrics, &metrics_path_for(path))?;

    Ok(BatchSummaryRow {
        filename: path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("unknown")
            .to_string(),
        analyzed_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        flights_detected: session.flights().len(),
        flight_time_s: format_value(metrics.tempo_volo, 3),
        jump_height_cm: format_value(metrics.jump_height_cm(), 1),
        fmax_n: format_value(metrics.fmax, 1),
        pmax_w: format_value(metrics.pmax, 1),
        asymmetry_pct: format_percent(metrics.asymmetry_contact_pct),
    })
}

pub fn run_batch(folder: &Path, config: &AnalysisConfig) -> Result<BatchReport, CmjError> {
    config.validate()?;

    let files = find_recordings(folder);
    let total_files = files.len();
    println!("📁 Found {} recordings to process", total_files);
    println!("⚡ Using parallel processing on {} cores", num_cpus::get());

    let processed_count = AtomicUsize::new(0);
    let outcomes: Vec<(PathBuf, Result<BatchSummaryRow, CmjError>)> = files
        .par_iter()
        .map(|path| {
            let outcome = analyze_one(path, config);
            let count = processed_count.fetch_add(1, Ordering::Relaxed) + 1;
            match &outcome {
                Ok(_) => println!("  [{}/{}] Processed: {}", count, total_files, path.display()),
                Err(e) => eprintln!("❌ Error processing {}: {}", path.display(), e),
            }
            (path.clone(), outcome)
        })
        .collect();

    let mut rows = Vec::new();
    let mut failures = Vec::new();
    for (path, outcome) in outcomes {
        match outcome {
            Ok(row) => rows.push(row),
            Err(e) => failures.push((path, e.to_string())),
        }
    }
    rows.sort_by(|a, b| a.filename.cmp(&b.filename));

    let summary_path = folder.join(SUMMARY_FILE);
    let mut wtr = Writer::from_path(&summary_path)?;
    for row in &rows {
        wtr.serialize(row)?;
    }
    wtr.flush().map_err(|e| CmjError::io(&summary_path, e))?;

    Ok(BatchReport { rows, failures, summary_path })
}
