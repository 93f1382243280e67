pub mod cancel;
pub mod classify;
pub mod filename_date;
pub mod history;
pub mod relocate;
pub mod scan;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Context;
use filetime::FileTime;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use classify::{Bucket, Classification};

pub use cancel::{CancellationToken, CancelledError};

/// OS housekeeping files that are never media and never relocated.
pub const NOISE_FILENAMES: &[&str] = &[".DS_Store", "Thumbs.db", "desktop.ini"];

/// Immutable run configuration, built once by the caller and passed into
/// every component. Paths are never read from ambient state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessOptions {
    /// Root of the exported media files (a writable working copy; files are
    /// moved out of it, so a re-run only sees what is left).
    pub input: PathBuf,
    /// Output root under which the bucket directories are created.
    pub output: PathBuf,
    /// memories_history.json (Source A, required).
    pub memories_history: PathBuf,
    /// chat_history.json (Source B, optional).
    #[serde(default)]
    pub chat_history: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessResult {
    pub total_files: u64,
    pub found: u64,
    pub not_found: u64,
    pub manual_date_mismatch: u64,
    pub manual_older_date_found: u64,
    pub passed: u64,
    pub skipped_noise: u64,
    pub errors: u64,
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl ProcessResult {
    pub fn manual(&self) -> u64 {
        self.manual_date_mismatch + self.manual_older_date_found
    }
}

/// Control options for process execution (cancellation).
#[derive(Debug, Clone, Default)]
pub struct ProcessControl {
    /// Cancellation token, checked between files only.
    pub cancel_token: Option<CancellationToken>,
}

/// Type alias for progress callback
pub type ProgressCallback = dyn Fn(&str, u64, u64, &str) + Send + Sync;

/// Throttled progress reporter — emits at most every 200ms or on completion.
pub struct ThrottledProgress<'a> {
    inner: &'a ProgressCallback,
    last_emit: std::sync::Mutex<Instant>,
}

impl<'a> ThrottledProgress<'a> {
    pub fn new(inner: &'a ProgressCallback) -> Self {
        Self {
            inner,
            last_emit: std::sync::Mutex::new(Instant::now() - std::time::Duration::from_secs(1)),
        }
    }

    pub fn report(&self, stage: &str, current: u64, total: u64, message: &str) {
        let is_done = current + 1 >= total;
        if !is_done {
            let mut last = self.last_emit.lock().unwrap();
            if last.elapsed().as_millis() < 200 {
                return;
            }
            *last = Instant::now();
        }
        (self.inner)(stage, current, total, message);
    }
}

/// Run the full pipeline with progress reporting.
pub fn process(
    options: &ProcessOptions,
    progress_callback: &ProgressCallback,
) -> anyhow::Result<ProcessResult> {
    process_with_control(options, &ProcessControl::default(), progress_callback)
}

/// Run the full pipeline: build the record index once, then stream every
/// file through pre-filter -> classify -> relocate -> timestamp.
pub fn process_with_control(
    options: &ProcessOptions,
    control: &ProcessControl,
    progress_callback: &ProgressCallback,
) -> anyhow::Result<ProcessResult> {
    let tp = ThrottledProgress::new(progress_callback);

    if let Some(token) = &control.cancel_token {
        token.check()?;
    }

    // Both history documents are fatal on load/parse failure: without the
    // index the run cannot classify anything.
    let index = history::build_index(
        &options.memories_history,
        options.chat_history.as_deref(),
    )?;
    let record_count = index.len() as u64;
    tp.report("index", record_count, record_count, "history records loaded");

    let files = scan::collect_files(&options.input)?;
    let total = files.len() as u64;

    let mut result = ProcessResult {
        total_files: total,
        ..ProcessResult::default()
    };

    for (i, path) in files.iter().enumerate() {
        if let Some(token) = &control.cancel_token {
            // Between files only; never interrupt a relocation in flight.
            token.check()?;
        }

        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
        tp.report("sort", i as u64, total, name);

        if NOISE_FILENAMES.contains(&name) {
            result.skipped_noise += 1;
            continue;
        }

        let classification = classify::classify(path, &index);
        match relocate_and_stamp(path, &classification, &options.output) {
            Ok(dest) => {
                debug!(
                    "{} -> {} ({:?})",
                    path.display(),
                    dest.display(),
                    classification.bucket
                );
                count_bucket(&mut result, classification.bucket);
            }
            Err(e) => {
                warn!("failed to process {}: {e:#}", path.display());
                result.warnings.push(format!("{}: {e:#}", path.display()));
                result.errors += 1;
            }
        }
    }
    tp.report("sort", total, total, "done");

    Ok(result)
}

fn count_bucket(result: &mut ProcessResult, bucket: Bucket) {
    match bucket {
        Bucket::Found => result.found += 1,
        Bucket::NotFound => result.not_found += 1,
        Bucket::ManualDateMismatch => result.manual_date_mismatch += 1,
        Bucket::ManualOlderDateFound => result.manual_older_date_found += 1,
        Bucket::Passed(_) => result.passed += 1,
    }
}

/// Move the file into its bucket directory, overwrite the relocated file's
/// modification and access times, and persist the annotation if any.
fn relocate_and_stamp(
    path: &Path,
    classification: &Classification,
    output_root: &Path,
) -> anyhow::Result<PathBuf> {
    let dst_dir = output_root.join(classification.bucket.relative_dir());
    let dest = relocate::safe_move(path, &dst_dir)?;

    if let Some(stamp) = classification.stamp {
        let ft = FileTime::from_unix_time(stamp.timestamp(), 0);
        filetime::set_file_times(&dest, ft, ft)
            .with_context(|| format!("stamping {}", dest.display()))?;
    }

    if let Some(lines) = &classification.annotation {
        let mut note = dest.clone().into_os_string();
        note.push(".txt");
        fs::write(&note, lines.join("\n") + "\n")
            .with_context(|| format!("writing annotation for {}", dest.display()))?;
    }

    Ok(dest)
}
