use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;
use unicode_normalization::UnicodeNormalization;

use super::error::{Result, StoreError};

pub const DEFAULT_KEYS_FILE: &str = "all_keys.json";

#[derive(Serialize)]
struct KeysFile<'a> {
    #[serde(rename = "Keys")]
    keys: &'a [String],
}

/// Suggestion list of every tag name seen so far, stored as `{"Keys": [...]}`.
///
/// Keys are unique ignoring case and kept sorted ignoring case.
#[derive(Clone, Debug)]
pub struct KeyStore {
    path: PathBuf,
}

impl KeyStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stored keys; a missing or unreadable file yields an empty list.
    pub fn load(&self) -> Vec<String> {
        let Ok(text) = std::fs::read_to_string(&self.path) else {
            return Vec::new();
        };
        let Ok(root) = serde_json::from_str::<Value>(&text) else {
            return Vec::new();
        };
        let mut set = CaseInsensitiveSet::default();
        if let Some(Value::Array(items)) = root.get("Keys") {
            for s in items.iter().filter_map(Value::as_str) {
                if !s.trim().is_empty() {
                    set.insert(normalize_added(s));
                }
            }
        }
        set.into_sorted()
    }

    /// Adds `new_keys` (trimmed, spaces turned into `_`) to the stored list.
    ///
    /// Returns `Ok(false)` without writing when nothing was new and the file exists.
    pub fn merge_new<I, S>(&self, new_keys: I) -> Result<bool>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = CaseInsensitiveSet::default();
        for k in self.load() {
            set.insert(k);
        }
        let mut added = false;
        for k in new_keys {
            let k = k.as_ref();
            if k.trim().is_empty() {
                continue;
            }
            added |= set.insert(normalize_added(k));
        }
        if !added && self.path.exists() {
            return Ok(false);
        }
        self.write(&set.into_sorted())?;
        Ok(true)
    }

    /// Replaces the stored list after validating every value.
    ///
    /// Values are sanitized with [`sanitize_key`]; empty values, values that sanitize
    /// to nothing and duplicates are all reported and nothing is written.
    pub fn replace_all<S: AsRef<str>>(&self, values: &[S]) -> Result<Vec<String>> {
        let mut problems = Vec::new();
        let mut set = CaseInsensitiveSet::default();
        for (i, v) in values.iter().enumerate() {
            let v = v.as_ref();
            if v.trim().is_empty() {
                problems.push(format!("value #{} is empty", i + 1));
                continue;
            }
            let key = sanitize_key(v);
            if key.is_empty() {
                problems.push(format!("value #{} is empty after normalization", i + 1));
                continue;
            }
            if !set.insert(key.clone()) {
                problems.push(format!("duplicate value: {key}"));
            }
        }
        if problems.is_empty() && set.is_empty() {
            problems.push("no keys to save".to_string());
        }
        if !problems.is_empty() {
            return Err(StoreError::invalid(problems));
        }
        let keys = set.into_sorted();
        self.write(&keys)?;
        Ok(keys)
    }

    /// Replaces the stored list with the `Keys` array of another file.
    ///
    /// Repeated keys collapse into one; every non-string or blank element is reported.
    /// The file must be strict JSON: comments and trailing commas are parse errors.
    pub fn import(&self, source: &Path) -> Result<Vec<String>> {
        let text = std::fs::read_to_string(source).map_err(|e| StoreError::Io {
            path: source.to_path_buf(),
            source: e,
        })?;
        let root: Value = serde_json::from_str(&text).map_err(|e| StoreError::Json {
            path: source.to_path_buf(),
            source: e,
        })?;
        let Some(Value::Array(items)) = root.get("Keys") else {
            return Err(StoreError::invalid(vec![
                "expected an object with a \"Keys\" array".to_string(),
            ]));
        };

        let mut problems = Vec::new();
        let mut set = CaseInsensitiveSet::default();
        for (i, item) in items.iter().enumerate() {
            let Some(raw) = item.as_str() else {
                problems.push(format!("Keys[{}] is not a string", i + 1));
                continue;
            };
            let key = sanitize_key(raw);
            if key.is_empty() {
                problems.push(format!("Keys[{}] is empty after normalization", i + 1));
                continue;
            }
            set.insert(key);
        }
        if problems.is_empty() && set.is_empty() {
            problems.push("\"Keys\" is empty".to_string());
        }
        if !problems.is_empty() {
            return Err(StoreError::invalid(problems));
        }
        let keys = set.into_sorted();
        self.write(&keys)?;
        Ok(keys)
    }

    fn write(&self, keys: &[String]) -> Result<()> {
        let json = serde_json::to_string_pretty(&KeysFile { keys }).map_err(|e| StoreError::Json {
            path: self.path.clone(),
            source: e,
        })?;
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|e| StoreError::Io {
                path: dir.to_path_buf(),
                source: e,
            })?;
        }
        std::fs::write(&self.path, json).map_err(|e| StoreError::Io {
            path: self.path.clone(),
            source: e,
        })
    }
}

fn normalize_added(raw: &str) -> String {
    raw.trim().replace(' ', "_")
}

/// NFKC-normalizes, trims, collapses whitespace runs to one `_` and trims `_`.
pub fn sanitize_key(raw: &str) -> String {
    let normalized: String = raw.nfkc().collect();
    let mut out = String::with_capacity(normalized.len());
    let mut last_underscore = false;
    for c in normalized.trim().chars() {
        if c.is_whitespace() {
            if !last_underscore {
                out.push('_');
                last_underscore = true;
            }
        } else {
            out.push(c);
            last_underscore = c == '_';
        }
    }
    out.trim_matches('_').to_string()
}

/// Insertion-ordered set that treats keys differing only in case as equal.
#[derive(Default)]
struct CaseInsensitiveSet {
    folded: HashSet<String>,
    keys: Vec<String>,
}

impl CaseInsensitiveSet {
    fn insert(&mut self, key: String) -> bool {
        if !self.folded.insert(key.to_lowercase()) {
            return false;
        }
        self.keys.push(key);
        true
    }

    fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    fn into_sorted(mut self) -> Vec<String> {
        self.keys.sort_by_cached_key(|k| k.to_lowercase());
        self.keys
    }
}

#[cfg(test)]
mod tests {
    use super::{sanitize_key, KeyStore};
    use crate::store::StoreError;

    #[test]
    fn sanitize_collapses_and_trims() {
        assert_eq!(sanitize_key("  first   name "), "first_name");
        assert_eq!(sanitize_key("_a  b_"), "a_b");
        assert_eq!(sanitize_key("a _ b"), "a__b");
        assert_eq!(sanitize_key("ｆｕｌｌ width"), "full_width");
        assert_eq!(sanitize_key(" \t "), "");
        assert_eq!(sanitize_key("__"), "");
    }

    #[test]
    fn merge_adds_sorted_unique_keys() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = KeyStore::new(dir.path().join("all_keys.json"));
        assert!(store.merge_new(["beta", " Alpha one ", "", "gamma"]).expect("merge"));
        assert_eq!(store.load(), vec!["Alpha_one", "beta", "gamma"]);

        assert!(!store.merge_new(["BETA", "alpha_one"]).expect("merge"));
        assert!(store.merge_new(["delta"]).expect("merge"));
        assert_eq!(store.load(), vec!["Alpha_one", "beta", "delta", "gamma"]);

        let text = std::fs::read_to_string(store.path()).expect("read");
        assert!(text.contains("\"Keys\""));
    }

    #[test]
    fn merge_writes_missing_file_even_without_keys() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = KeyStore::new(dir.path().join("nested").join("all_keys.json"));
        assert!(store.merge_new(Vec::<String>::new()).expect("merge"));
        assert!(store.path().exists());
        assert!(store.load().is_empty());
    }

    #[test]
    fn load_is_lenient() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("all_keys.json");
        let store = KeyStore::new(&path);
        assert!(store.load().is_empty());
        std::fs::write(&path, "{ not json").expect("write");
        assert!(store.load().is_empty());
        std::fs::write(&path, r#"{"Keys": ["b", 3, " ", "a b", "A_B"]}"#).expect("write");
        assert_eq!(store.load(), vec!["a_b", "b"]);
    }

    #[test]
    fn replace_reports_every_problem() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = KeyStore::new(dir.path().join("all_keys.json"));
        let err = store
            .replace_all(&["ok", "", "___", "OK ", "fine"])
            .expect_err("invalid");
        let problems = err.problems();
        assert_eq!(problems.len(), 3, "{problems:?}");
        assert!(problems.iter().any(|p| p.contains("duplicate value: OK")));
        assert!(!store.path().exists());

        let saved = store.replace_all(&["b key", "a"]).expect("replace");
        assert_eq!(saved, vec!["a", "b_key"]);
        assert_eq!(store.load(), saved);
    }

    #[test]
    fn import_validates_then_replaces() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = KeyStore::new(dir.path().join("all_keys.json"));
        store.merge_new(["old"]).expect("seed");

        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, r#"{"Keys": ["x", 1, "  "]}"#).expect("write");
        let err = store.import(&bad).expect_err("invalid");
        assert_eq!(err.problems(), &["Keys[2] is not a string", "Keys[3] is empty after normalization"]);
        assert_eq!(store.load(), vec!["old"]);

        let good = dir.path().join("good.json");
        std::fs::write(&good, r#"{"Keys": ["z  z", "Y", "y"]}"#).expect("write");
        assert_eq!(store.import(&good).expect("import"), vec!["Y", "z_z"]);
        assert_eq!(store.load(), vec!["Y", "z_z"]);

        let shapeless = dir.path().join("shapeless.json");
        std::fs::write(&shapeless, r#"["a"]"#).expect("write");
        assert!(!store.import(&shapeless).expect_err("invalid").problems().is_empty());
    }

    #[test]
    fn import_rejects_comments_and_trailing_commas() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = KeyStore::new(dir.path().join("all_keys.json"));
        store.merge_new(["kept"]).expect("seed");

        for (name, body) in [
            ("commented.json", "{\n  // exported\n  \"Keys\": [\"a\"]\n}"),
            ("trailing.json", r#"{"Keys": ["a", "b",]}"#),
        ] {
            let source = dir.path().join(name);
            std::fs::write(&source, body).expect("write");
            let err = store.import(&source).expect_err("strict json");
            assert!(matches!(err, StoreError::Json { .. }), "{name}: {err}");
        }
        assert_eq!(store.load(), vec!["kept"]);
    }
}
