use crate::error::{PipelineError, PipelineResult};
use crate::models::issue::RawIssueRecord;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

const RUN_ID_FORMAT: &str = "%Y%m%d_%H%M%S";

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LabelPayload {
    Named { name: Option<String> },
    Plain(String),
}

impl LabelPayload {
    fn into_name(self) -> Option<String> {
        match self {
            LabelPayload::Named { name } => name,
            LabelPayload::Plain(name) => Some(name),
        }
    }
}

/// The subset of a tracker issue payload the engine consumes.
#[derive(Debug, Deserialize)]
struct IssuePayload {
    id: u64,
    #[serde(default)]
    labels: Vec<LabelPayload>,
    #[serde(default)]
    created_at: Option<Value>,
    #[serde(default)]
    closed_at: Option<Value>,
}

/// All `issues_<run id>.jsonl` files directly inside one repository's bronze
/// directory, sorted by path. A root holding `owner__repo` folders is rejected.
pub fn discover_bronze_files(bronze_dir: &Path) -> PipelineResult<Vec<PathBuf>> {
    if !bronze_dir.is_dir() {
        return Err(PipelineError::Bronze(format!(
            "{} is not a directory",
            bronze_dir.display()
        )));
    }

    let root = glob::Pattern::escape(&bronze_dir.to_string_lossy());
    let files = glob_files(&format!("{root}/issues_*.jsonl"))?;

    let nested = glob_files(&format!("{root}/*/**/issues_*.jsonl"))?;
    if !nested.is_empty() {
        let mut repos: Vec<String> = nested
            .iter()
            .filter_map(|path| path.strip_prefix(bronze_dir).ok())
            .filter_map(|rel| rel.components().next())
            .map(|first| first.as_os_str().to_string_lossy().into_owned())
            .collect();
        repos.dedup();
        return Err(PipelineError::Bronze(format!(
            "{} holds extractions for {} nested folder(s) ({}); point the run at a single repository directory",
            bronze_dir.display(),
            repos.len(),
            repos.join(", ")
        )));
    }

    Ok(files)
}

fn glob_files(pattern: &str) -> PipelineResult<Vec<PathBuf>> {
    let entries = glob::glob(pattern)
        .map_err(|e| PipelineError::Bronze(format!("invalid bronze pattern {pattern}: {e}")))?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| match entry {
            Ok(path) => Some(path),
            Err(e) => {
                log::warn!("skipping unreadable bronze entry: {e}");
                None
            }
        })
        .collect();
    files.sort();
    Ok(files)
}

/// The extraction instant encoded in a bronze file name.
pub fn extraction_time(path: &Path) -> PipelineResult<DateTime<Utc>> {
    let run_id = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .and_then(|stem| stem.strip_prefix("issues_"))
        .ok_or_else(|| {
            PipelineError::Bronze(format!("{} is not named issues_<run id>.jsonl", path.display()))
        })?;

    NaiveDateTime::parse_from_str(run_id, RUN_ID_FORMAT)
        .map(|naive| Utc.from_utc_datetime(&naive))
        .map_err(|e| {
            PipelineError::Bronze(format!("{}: bad run id {run_id:?}: {e}", path.display()))
        })
}

/// Decode one JSON line. A `pull_request` key of any value marks a PR.
pub fn parse_issue_line(line: &str, extracted_at: DateTime<Utc>) -> Result<RawIssueRecord, serde_json::Error> {
    let value: Value = serde_json::from_str(line)?;
    let is_pull_request = value
        .as_object()
        .is_some_and(|obj| obj.contains_key("pull_request"));
    let payload: IssuePayload = serde_json::from_value(value)?;

    let labels: BTreeSet<String> = payload
        .labels
        .into_iter()
        .filter_map(LabelPayload::into_name)
        .filter(|name| !name.is_empty())
        .collect();

    Ok(RawIssueRecord {
        id: payload.id,
        labels,
        created_at: payload.created_at.and_then(timestamp_text),
        closed_at: payload.closed_at.and_then(timestamp_text),
        extracted_at,
        is_pull_request,
    })
}

/// Non-string timestamps are kept as text so normalization can reject them.
fn timestamp_text(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text),
        other => Some(other.to_string()),
    }
}

pub fn read_bronze_file(path: &Path) -> PipelineResult<Vec<RawIssueRecord>> {
    let extracted_at = extraction_time(path)?;
    let content = fs::read_to_string(path)?;

    let mut records = Vec::new();
    for (index, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let record = parse_issue_line(line, extracted_at).map_err(|e| {
            PipelineError::Bronze(format!("{}:{}: {e}", path.display(), index + 1))
        })?;
        records.push(record);
    }

    log::debug!("read {} records from {}", records.len(), path.display());
    Ok(records)
}

/// Every raw observation from every extraction run under `bronze_dir`.
pub fn read_bronze_dir(bronze_dir: &Path) -> PipelineResult<Vec<RawIssueRecord>> {
    let files = discover_bronze_files(bronze_dir)?;
    if files.is_empty() {
        log::warn!("no bronze files found in {}", bronze_dir.display());
    }

    let mut records = Vec::new();
    for file in &files {
        records.extend(read_bronze_file(file)?);
    }

    log::info!(
        "loaded {} raw records from {} bronze files",
        records.len(),
        files.len()
    );
    Ok(records)
}
