//! Date Matcher: picks the dated export for a target day.
//!
//! Artifacts are named `<prefix><YYYYMMDDHHMMSS>[anything]`, the prefix
//! compared case-insensitively. A single `_` or `-` between prefix and
//! timestamp is tolerated.

use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveDateTime};

use crate::error::ReportError;

const TIMESTAMP_LEN: usize = 14;

/// A file whose name carries a valid embedded timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatedArtifact {
    pub path: PathBuf,
    pub name: String,
    pub timestamp: NaiveDateTime,
}

impl DatedArtifact {
    pub fn date(&self) -> NaiveDate {
        self.timestamp.date()
    }
}

/// Timestamp embedded in `name` after `prefix`, or None when the name does
/// not follow the convention.
pub fn parse_timestamp(name: &str, prefix: &str) -> Option<NaiveDateTime> {
    let prefix = prefix.trim();
    if prefix.is_empty() || name.len() < prefix.len() {
        return None;
    }
    let head = name.get(..prefix.len())?;
    if !head.eq_ignore_ascii_case(prefix) {
        return None;
    }

    let mut rest = &name[prefix.len()..];
    if let Some(stripped) = rest.strip_prefix(&['_', '-'][..]) {
        rest = stripped;
    }

    let digits = rest.get(..TIMESTAMP_LEN)?;
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    // Exactly 14 digits: a 15th digit means a different convention
    if rest[TIMESTAMP_LEN..].starts_with(|c: char| c.is_ascii_digit()) {
        return None;
    }

    NaiveDateTime::parse_from_str(digits, "%Y%m%d%H%M%S").ok()
}

/// Keep the names that follow the convention, newest first. Equal
/// timestamps order by name so the result never depends on listing order.
pub fn collect_artifacts<I>(paths: I, prefix: &str) -> Vec<DatedArtifact>
where
    I: IntoIterator<Item = PathBuf>,
{
    let mut found: Vec<DatedArtifact> = paths
        .into_iter()
        .filter_map(|path| {
            let name = path.file_name()?.to_str()?.to_string();
            let timestamp = parse_timestamp(&name, prefix)?;
            Some(DatedArtifact { path, name, timestamp })
        })
        .collect();

    found.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| a.name.cmp(&b.name)));
    found
}

/// List matching files in `dir` (files only, not recursive).
pub fn list_artifacts(dir: &Path, prefix: &str) -> Result<Vec<DatedArtifact>, ReportError> {
    let entries = std::fs::read_dir(dir).map_err(|e| {
        ReportError::Configuration(format!("cannot list export directory {}: {e}", dir.display()))
    })?;

    let paths = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file());

    Ok(collect_artifacts(paths, prefix))
}

/// Choose among newest-first candidates: the latest one dated `target`, or
/// simply the newest when `use_latest` is set.
pub fn select_artifact(
    candidates: &[DatedArtifact],
    prefix: &str,
    target: NaiveDate,
    use_latest: bool,
) -> Result<DatedArtifact, ReportError> {
    let picked = if use_latest {
        candidates.first()
    } else {
        candidates.iter().find(|a| a.date() == target)
    };

    picked.cloned().ok_or_else(|| {
        let listed = if candidates.is_empty() {
            "none".to_string()
        } else {
            candidates
                .iter()
                .map(|a| a.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        };
        if use_latest {
            ReportError::NotFound(format!("no {prefix} export found (candidates: {listed})"))
        } else {
            ReportError::NotFound(format!("no {prefix} export dated {target} (candidates: {listed})"))
        }
    })
}

/// List `dir` and select the artifact for `target`.
pub fn find_artifact(
    dir: &Path,
    prefix: &str,
    target: NaiveDate,
    use_latest: bool,
) -> Result<DatedArtifact, ReportError> {
    let candidates = list_artifacts(dir, prefix)?;
    log::debug!("{} {prefix} candidates in {}", candidates.len(), dir.display());
    let artifact = select_artifact(&candidates, prefix, target, use_latest)?;
    log::info!("resolved {} for {target}", artifact.name);
    Ok(artifact)
}

/// The run's target day: an explicit `YYYY-MM-DD`, or the day before `today`.
pub fn resolve_target_date(explicit: Option<&str>, today: NaiveDate) -> Result<NaiveDate, ReportError> {
    match explicit.map(str::trim).filter(|s| !s.is_empty()) {
        Some(text) => NaiveDate::parse_from_str(text, "%Y-%m-%d").map_err(|_| {
            ReportError::Configuration(format!("invalid target date '{text}' (expected YYYY-MM-DD)"))
        }),
        None => today
            .pred_opt()
            .ok_or_else(|| ReportError::Configuration(format!("no day before {today}"))),
    }
}
