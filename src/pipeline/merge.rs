use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use chrono::{DateTime, Local};

use crate::progress::ConsoleProgress;
use crate::template::DataDocument;

use super::naming::{modification_date, stamp};

pub const MERGED_SHEET_SUFFIX: &str = "_data_sheet.xml";

#[derive(Clone, Debug)]
pub struct MergeReport {
    pub output: PathBuf,
    pub sources: usize,
    pub elements: usize,
}

/// Merges data sheets into `<stamp>_data_sheet.xml` inside `out_dir`.
///
/// Elements are unioned by name with the first occurrence kept; each kept element
/// without a `modification-date` gets the current local time. `out_dir` must exist and
/// every sheet must parse, otherwise nothing is written.
pub fn merge_data_sheets(
    sheets: &[PathBuf],
    out_dir: &Path,
    now: &DateTime<Local>,
    progress: &ConsoleProgress,
) -> anyhow::Result<MergeReport> {
    if !out_dir.is_dir() {
        return Err(anyhow!("output dir does not exist: {}", out_dir.display()));
    }
    let mut docs = Vec::with_capacity(sheets.len());
    for (i, sheet) in sheets.iter().enumerate() {
        progress.progress("merge", i + 1, sheets.len());
        docs.push(DataDocument::load(sheet)?);
    }
    let merged = DataDocument::merge(docs, &modification_date(now));

    let output = out_dir.join(format!("{}{MERGED_SHEET_SUFFIX}", stamp(now)));
    merged
        .save(&output)
        .with_context(|| format!("save merged sheet: {}", output.display()))?;
    progress.info(format!(
        "merged {} sheet(s), {} element(s) -> {}",
        sheets.len(),
        merged.entries.len(),
        output.display()
    ));
    Ok(MergeReport {
        output,
        sources: sheets.len(),
        elements: merged.entries.len(),
    })
}
