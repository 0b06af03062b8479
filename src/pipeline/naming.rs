use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// `dd-mm-YYYYTHH-MM-SS`, used for output folder and merged sheet names.
pub const STAMP_FORMAT: &str = "%d-%m-%YT%H-%M-%S";
/// Human-readable local time stored in `modification-date` attributes.
pub const MODIFICATION_DATE_FORMAT: &str = "%A, %d %B %Y %H:%M";

pub fn stamp(now: &DateTime<Local>) -> String {
    now.format(STAMP_FORMAT).to_string()
}

pub fn modification_date(now: &DateTime<Local>) -> String {
    now.format(MODIFICATION_DATE_FORMAT).to_string()
}

/// Where the file key goes in an output file name.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyPlacement {
    #[default]
    Suffix,
    Prefix,
    Omit,
}

/// Naming policy for one kind of output file.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputNaming {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub placement: KeyPlacement,
}

impl OutputNaming {
    pub fn new(key: impl Into<String>, placement: KeyPlacement) -> Self {
        Self {
            key: key.into(),
            placement,
        }
    }

    /// `stem` + key + `.ext`, key + `stem` + `.ext` or `stem.ext`.
    pub fn file_name(&self, stem: &str, ext: &str) -> String {
        match self.placement {
            KeyPlacement::Suffix => format!("{stem}{}.{ext}", self.key),
            KeyPlacement::Prefix => format!("{}{stem}.{ext}", self.key),
            KeyPlacement::Omit => format!("{stem}.{ext}"),
        }
    }
}

/// How a folder scan decides which files carry the file key.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyFilter {
    #[default]
    Contains,
    StartsWith,
    EndsWith,
}

impl KeyFilter {
    pub fn matches(self, stem: &str, key: &str) -> bool {
        match self {
            Self::Contains => stem.contains(key),
            Self::StartsWith => stem.starts_with(key),
            Self::EndsWith => stem.ends_with(key),
        }
    }
}

/// An input file and the key that is stripped from its name on output.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoadedFile {
    pub path: PathBuf,
    pub key: String,
}

impl LoadedFile {
    pub fn new(path: impl Into<PathBuf>, key: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            key: key.into(),
        }
    }

    /// File stem with every occurrence of the key removed.
    pub fn output_stem(&self) -> String {
        let stem = self
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        if self.key.is_empty() {
            stem
        } else {
            stem.replace(&self.key, "")
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InputSelection {
    All,
    Keyed { key: String, filter: KeyFilter },
}

/// Files with extension `ext` directly inside `dir`, sorted by name.
///
/// With [`InputSelection::Keyed`] only files whose stem matches the key are kept and
/// they remember the key; [`InputSelection::All`] keeps everything with no key.
pub fn collect_inputs(dir: &Path, ext: &str, selection: &InputSelection) -> anyhow::Result<Vec<LoadedFile>> {
    let rd = std::fs::read_dir(dir).with_context(|| format!("read input dir: {}", dir.display()))?;
    let mut paths: Vec<PathBuf> = Vec::new();
    for ent in rd {
        let ent = ent.with_context(|| format!("read input dir entry: {}", dir.display()))?;
        let path = ent.path();
        if !path.is_file() {
            continue;
        }
        let matches_ext = path
            .extension()
            .map(|e| e.to_string_lossy().eq_ignore_ascii_case(ext))
            .unwrap_or(false);
        // Word lock files (`~$name.docx`) are never inputs.
        let is_lock = path
            .file_name()
            .map(|n| n.to_string_lossy().starts_with("~$"))
            .unwrap_or(false);
        if matches_ext && !is_lock {
            paths.push(path);
        }
    }
    paths.sort();

    let files = paths
        .into_iter()
        .filter_map(|path| match selection {
            InputSelection::All => Some(LoadedFile::new(path, "")),
            InputSelection::Keyed { key, filter } => {
                let stem = path.file_stem()?.to_string_lossy().into_owned();
                filter
                    .matches(&stem, key)
                    .then(|| LoadedFile::new(path, key.clone()))
            }
        })
        .collect();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::{collect_inputs, stamp, InputSelection, KeyFilter, KeyPlacement, LoadedFile, OutputNaming};
    use chrono::{Local, TimeZone};

    #[test]
    fn naming_policies() {
        let suffix = OutputNaming::new("_tpl", KeyPlacement::Suffix);
        let prefix = OutputNaming::new("tpl_", KeyPlacement::Prefix);
        let omit = OutputNaming::new("_tpl", KeyPlacement::Omit);
        assert_eq!(suffix.file_name("offer", "docx"), "offer_tpl.docx");
        assert_eq!(prefix.file_name("offer", "xml"), "tpl_offer.xml");
        assert_eq!(omit.file_name("offer", "docx"), "offer.docx");
    }

    #[test]
    fn output_stem_strips_key() {
        assert_eq!(LoadedFile::new("/in/offer_src.docx", "_src").output_stem(), "offer");
        assert_eq!(LoadedFile::new("/in/offer_src.docx", "").output_stem(), "offer_src");
        assert_eq!(LoadedFile::new("a_k_b_k.docx", "_k").output_stem(), "a_b");
    }

    #[test]
    fn stamp_format() {
        let t = Local.with_ymd_and_hms(2024, 3, 5, 7, 8, 9).single().expect("valid time");
        assert_eq!(stamp(&t), "05-03-2024T07-08-09");
    }

    #[test]
    fn folder_scan_filters_by_key() {
        let dir = tempfile::tempdir().expect("tempdir");
        for name in ["b_key.docx", "key_a.docx", "plain.docx", "~$lock.docx", "notes.txt", "c.DOCX"] {
            std::fs::write(dir.path().join(name), b"x").expect("write");
        }
        std::fs::create_dir(dir.path().join("sub.docx")).expect("mkdir");

        let all = collect_inputs(dir.path(), "docx", &InputSelection::All).expect("all");
        let names: Vec<String> = all
            .iter()
            .map(|f| f.path.file_name().expect("name").to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["b_key.docx", "c.DOCX", "key_a.docx", "plain.docx"]);
        assert!(all.iter().all(|f| f.key.is_empty()));

        let keyed = |filter| {
            collect_inputs(
                dir.path(),
                "docx",
                &InputSelection::Keyed {
                    key: "key".to_string(),
                    filter,
                },
            )
            .expect("keyed")
            .into_iter()
            .map(|f| f.output_stem())
            .collect::<Vec<_>>()
        };
        assert_eq!(keyed(KeyFilter::Contains), vec!["b_", "_a"]);
        assert_eq!(keyed(KeyFilter::StartsWith), vec!["_a"]);
        assert_eq!(keyed(KeyFilter::EndsWith), vec!["b_"]);
    }
}
