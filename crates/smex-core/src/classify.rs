use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};

use crate::filename_date;
use crate::history::HistoryRecord;

pub const PHOTO_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "gif", "webp", "tiff"];
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "avi", "mkv", "webm", "flv", "wmv", "m4v"];

/// Path markers for export artifacts that bypass date logic entirely.
const STRUCTURAL_MARKERS: &[(&str, PassedKind)] = &[
    ("overlay", PassedKind::Overlays),
    ("thumbnail", PassedKind::Thumbnails),
    ("metadata", PassedKind::Metadata),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassedKind {
    Overlays,
    Thumbnails,
    Metadata,
    OtherFiles,
}

impl PassedKind {
    fn dir_name(self) -> &'static str {
        match self {
            PassedKind::Overlays => "overlays",
            PassedKind::Thumbnails => "thumbnails",
            PassedKind::Metadata => "metadata",
            PassedKind::OtherFiles => "other_files",
        }
    }
}

/// Terminal classification of a file, determining its output directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    Found,
    NotFound,
    ManualDateMismatch,
    ManualOlderDateFound,
    Passed(PassedKind),
}

impl Bucket {
    /// Output directory for this bucket, relative to the output root.
    pub fn relative_dir(&self) -> PathBuf {
        match self {
            Bucket::Found => PathBuf::from("found_files"),
            Bucket::NotFound => PathBuf::from("not_found_files"),
            Bucket::ManualDateMismatch => Path::new("manual_check").join("date_mismatch"),
            Bucket::ManualOlderDateFound => Path::new("manual_check").join("older_date_found"),
            Bucket::Passed(kind) => Path::new("passed_files").join(kind.dir_name()),
        }
    }

    /// Manual buckets get a sibling annotation file for human review.
    pub fn is_manual(&self) -> bool {
        matches!(self, Bucket::ManualDateMismatch | Bucket::ManualOlderDateFound)
    }
}

#[derive(Debug, Clone)]
pub struct Classification {
    pub bucket: Bucket,
    /// Timestamp to stamp on the relocated file, when one could be resolved.
    pub stamp: Option<DateTime<Utc>>,
    /// Explanation lines persisted next to manual-review files.
    pub annotation: Option<Vec<String>>,
}

/// Structural pre-filter: overlay/thumbnail/metadata markers and unrecognized
/// extensions short-circuit without consulting the record index.
pub fn structural_bucket(path: &Path) -> Option<PassedKind> {
    let path_str = path.to_string_lossy();
    for (marker, kind) in STRUCTURAL_MARKERS {
        if path_str.contains(marker) {
            return Some(*kind);
        }
    }

    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase());
    match ext.as_deref() {
        Some(e) if PHOTO_EXTENSIONS.contains(&e) || VIDEO_EXTENSIONS.contains(&e) => None,
        _ => Some(PassedKind::OtherFiles),
    }
}

/// Match one file against the full record index and reconcile its date.
pub fn classify(path: &Path, index: &[HistoryRecord]) -> Classification {
    if let Some(kind) = structural_bucket(path) {
        return Classification {
            bucket: Bucket::Passed(kind),
            stamp: None,
            annotation: None,
        };
    }

    let path_str = path.to_string_lossy();

    // Every identifier hit appends an entry; duplicate hits from the same
    // record are harmless since "oldest" picks the same date either way.
    let mut candidates: Vec<(DateTime<Utc>, &str)> = Vec::new();
    for record in index {
        for id in &record.identifiers {
            if !id.is_empty() && path_str.contains(id.as_str()) {
                candidates.push((record.date, record.provenance.as_str()));
            }
        }
    }

    let filename_date = filename_date::date_from_filename(path);

    match candidates.as_slice() {
        [] => Classification {
            bucket: Bucket::NotFound,
            // Fall back to the filename date; without one the stamp step is
            // skipped entirely rather than guessed.
            stamp: filename_date.and_then(midnight_utc),
            annotation: None,
        },
        [(date, _)] => Classification {
            bucket: Bucket::Found,
            stamp: Some(*date),
            annotation: None,
        },
        [first, rest @ ..] => {
            let oldest = rest.iter().fold(first.0, |acc, (date, _)| acc.min(*date));
            reconcile_many(oldest, filename_date, &candidates)
        }
    }
}

/// Multiple candidates: prefer the oldest record sharing the filename's
/// calendar day; otherwise flag the mismatch and keep the global oldest.
fn reconcile_many(
    oldest: DateTime<Utc>,
    filename_date: Option<NaiveDate>,
    candidates: &[(DateTime<Utc>, &str)],
) -> Classification {
    if let Some(day) = filename_date {
        let same_day_oldest = candidates
            .iter()
            .filter(|(date, _)| date.date_naive() == day)
            .map(|(date, _)| *date)
            .min();
        if let Some(stamp) = same_day_oldest {
            return Classification {
                bucket: Bucket::ManualOlderDateFound,
                stamp: Some(stamp),
                annotation: Some(annotation_lines(
                    "Found more than one date; the oldest record matching the filename date was set for this file.",
                    candidates,
                )),
            };
        }
    }

    Classification {
        bucket: Bucket::ManualDateMismatch,
        stamp: Some(oldest),
        annotation: Some(annotation_lines(
            "Found more than one date and none matches the filename date; the oldest was set for this file.",
            candidates,
        )),
    }
}

fn annotation_lines(header: &str, candidates: &[(DateTime<Utc>, &str)]) -> Vec<String> {
    let mut lines = vec![header.to_string(), String::new()];
    for (date, provenance) in candidates {
        lines.push(format!(
            "{} ({})",
            date.format("%Y-%m-%d %H:%M:%S UTC"),
            provenance
        ));
    }
    lines
}

fn midnight_utc(day: NaiveDate) -> Option<DateTime<Utc>> {
    Some(day.and_hms_opt(0, 0, 0)?.and_utc())
}
