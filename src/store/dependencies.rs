use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::de::{self, Deserialize, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::ser::{Serialize, SerializeMap, Serializer};

use super::error::{Result, StoreError};

pub const DEFAULT_DEPENDENCIES_FILE: &str = "dependencies.json";
pub const DEFAULT_SUB_VALUE: &str = "New sub-value";

const ROOT_KEY: &str = "Dependencies";
const INCOMPLETE: &str =
    "incomplete data: at least one key with at least one value is required (values may have no sub-pairs)";

/// `key -> value -> sub_key -> sub_value`, in file order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Dependencies {
    pub keys: Vec<KeyItem>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct KeyItem {
    pub name: String,
    pub values: Vec<ValueItem>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ValueItem {
    pub name: String,
    pub sub_pairs: Vec<SubPair>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SubPair {
    pub sub_key: String,
    pub sub_value: String,
}

impl KeyItem {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: Vec::new(),
        }
    }

    pub fn value(&self, name: &str) -> Option<&ValueItem> {
        self.values.iter().find(|v| eq_ci(&v.name, name))
    }
}

impl ValueItem {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sub_pairs: Vec::new(),
        }
    }

    pub fn with_pair(mut self, sub_key: &str, sub_value: &str) -> Self {
        self.sub_pairs.push(SubPair {
            sub_key: sub_key.to_string(),
            sub_value: sub_value.to_string(),
        });
        self
    }
}

impl Dependencies {
    pub fn key(&self, name: &str) -> Option<&KeyItem> {
        self.keys.iter().find(|k| eq_ci(&k.name, name))
    }

    pub fn contains_key(&self, name: &str) -> bool {
        !name.trim().is_empty() && self.key(name).is_some()
    }

    /// Value names recorded for `key`, empty when the key is unknown.
    pub fn values_for_key(&self, key: &str) -> Vec<&str> {
        self.key(key)
            .map(|k| k.values.iter().map(|v| v.name.as_str()).collect())
            .unwrap_or_default()
    }

    pub fn sub_value(&self, key: &str, value: &str, sub_key: &str) -> Option<&str> {
        self.key(key)?
            .value(value)?
            .sub_pairs
            .iter()
            .find(|p| eq_ci(&p.sub_key, sub_key))
            .map(|p| p.sub_value.as_str())
    }

    /// Checks an edited model and returns its cleaned form.
    ///
    /// Blank names and sub-pairs with a blank side are ignored. Duplicates at every
    /// level and keys without values are reported together.
    pub fn build_validated(edited: &[KeyItem]) -> Result<Self> {
        let mut problems = Vec::new();
        let mut keys: Vec<KeyItem> = Vec::new();
        let mut seen_keys = CiSet::default();
        let mut key_without_values = false;

        for key in edited {
            if key.name.trim().is_empty() {
                continue;
            }
            let key_name = key.name.trim();
            let first_key = seen_keys.insert(key_name);
            if !first_key {
                problems.push(format!("duplicate key: \"{key_name}\""));
            }

            let mut values: Vec<ValueItem> = Vec::new();
            let mut seen_values = CiSet::default();
            for value in &key.values {
                if value.name.trim().is_empty() {
                    continue;
                }
                let value_name = value.name.trim();
                if !seen_values.insert(value_name) {
                    problems.push(format!(
                        "duplicate value: \"{value_name}\" for key: \"{key_name}\""
                    ));
                    continue;
                }
                let mut cleaned = ValueItem::new(value_name);
                let mut seen_sub = CiSet::default();
                for pair in &value.sub_pairs {
                    if pair.sub_key.trim().is_empty() || pair.sub_value.trim().is_empty() {
                        continue;
                    }
                    let sub_key = pair.sub_key.trim();
                    if !seen_sub.insert(sub_key) {
                        problems.push(format!(
                            "duplicate sub-key: \"{sub_key}\" for key: \"{key_name}\" and value: \"{value_name}\""
                        ));
                        continue;
                    }
                    cleaned.sub_pairs.push(SubPair {
                        sub_key: sub_key.to_string(),
                        sub_value: pair.sub_value.clone(),
                    });
                }
                values.push(cleaned);
            }

            if values.is_empty() {
                key_without_values = true;
                problems.push(format!("key: \"{key_name}\" has no values"));
            } else if first_key {
                keys.push(KeyItem {
                    name: key_name.to_string(),
                    values,
                });
            }
        }

        if key_without_values || keys.is_empty() {
            problems.push(INCOMPLETE.to_string());
        }
        if !problems.is_empty() {
            return Err(StoreError::invalid(problems));
        }
        Ok(Self { keys })
    }

    /// Reads the model from parsed JSON, collecting every shape problem on the way.
    fn from_raw(root: &RawJson) -> (Self, Vec<String>) {
        let mut problems = Vec::new();
        let mut keys: Vec<KeyItem> = Vec::new();

        let deps = match root {
            RawJson::Object(entries) => entries.iter().find(|(k, _)| k == ROOT_KEY).map(|(_, v)| v),
            _ => None,
        };
        let Some(RawJson::Object(key_entries)) = deps else {
            problems.push(format!("missing \"{ROOT_KEY}\" section or it is not an object"));
            return (Self { keys }, problems);
        };

        let mut seen_keys = CiSet::default();
        for (raw_key, key_body) in key_entries {
            if raw_key.trim().is_empty() {
                continue;
            }
            let key_name = raw_key.trim();
            let first_key = seen_keys.insert(key_name);
            if !first_key {
                problems.push(format!("duplicate key: \"{key_name}\""));
            }
            let RawJson::Object(value_entries) = key_body else {
                problems.push(format!(
                    "key \"{key_name}\" has a {} value, expected an object",
                    key_body.kind()
                ));
                continue;
            };

            let mut values: Vec<ValueItem> = Vec::new();
            let mut seen_values = CiSet::default();
            for (raw_value, value_body) in value_entries {
                if raw_value.trim().is_empty() {
                    continue;
                }
                let value_name = raw_value.trim();
                let first_value = seen_values.insert(value_name);
                if !first_value {
                    problems.push(format!(
                        "duplicate value: \"{value_name}\" for key: \"{key_name}\""
                    ));
                }
                let RawJson::Object(sub_entries) = value_body else {
                    problems.push(format!(
                        "value: \"{value_name}\" for key: \"{key_name}\" is a {}, expected an object",
                        value_body.kind()
                    ));
                    continue;
                };

                let mut cleaned = ValueItem::new(value_name);
                let mut seen_sub = CiSet::default();
                for (raw_sub, sub_body) in sub_entries {
                    if raw_sub.trim().is_empty() {
                        continue;
                    }
                    let sub_key = raw_sub.trim();
                    if !seen_sub.insert(sub_key) {
                        problems.push(format!(
                            "duplicate sub-key: \"{sub_key}\" for key: \"{key_name}\" and value: \"{value_name}\""
                        ));
                        continue;
                    }
                    let RawJson::String(sub_value) = sub_body else {
                        problems.push(format!(
                            "sub-key: \"{sub_key}\" for key: \"{key_name}\" and value: \"{value_name}\" must be a string"
                        ));
                        continue;
                    };
                    cleaned.sub_pairs.push(SubPair {
                        sub_key: sub_key.to_string(),
                        sub_value: sub_value.clone(),
                    });
                }
                if first_value {
                    values.push(cleaned);
                }
            }

            if first_key && !values.is_empty() {
                keys.push(KeyItem {
                    name: key_name.to_string(),
                    values,
                });
            }
        }

        if keys.is_empty() {
            problems.push(INCOMPLETE.to_string());
        }
        (Self { keys }, problems)
    }

    /// Parses and fully validates a dependency file.
    pub fn validate_file(path: &Path) -> Result<Self> {
        let root = read_raw(path)?;
        let (deps, problems) = Self::from_raw(&root);
        if !problems.is_empty() {
            return Err(StoreError::invalid(problems));
        }
        Ok(deps)
    }
}

/// Adds the sub-keys of the latest value that has any to `target`, each with
/// `default_sub_value`.
pub fn prepopulate_sub_pairs(key: &KeyItem, target: &mut ValueItem, default_sub_value: &str) {
    let Some(source) = key.values.iter().rev().find(|v| !v.sub_pairs.is_empty()) else {
        return;
    };
    for pair in &source.sub_pairs {
        target.sub_pairs.push(SubPair {
            sub_key: pair.sub_key.clone(),
            sub_value: default_sub_value.to_string(),
        });
    }
}

/// The `dependencies.json` file.
#[derive(Clone, Debug)]
pub struct DependencyStore {
    path: PathBuf,
}

impl DependencyStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Lenient load: unreadable files give an empty model and malformed entries
    /// are skipped.
    pub fn load(&self) -> Dependencies {
        match read_raw(&self.path) {
            Ok(root) => Dependencies::from_raw(&root).0,
            Err(_) => Dependencies::default(),
        }
    }

    /// Validates an edited model and writes it. Nothing is written on failure.
    pub fn save(&self, edited: &[KeyItem]) -> Result<Dependencies> {
        let deps = Dependencies::build_validated(edited)?;
        self.write(&deps)?;
        Ok(deps)
    }

    /// Validates another dependency file and replaces this store with its
    /// normalized content. Nothing is written on failure.
    pub fn import(&self, source: &Path) -> Result<Dependencies> {
        let deps = Dependencies::validate_file(source)?;
        self.write(&deps)?;
        Ok(deps)
    }

    /// Records `value` under `key` and saves through [`DependencyStore::save`].
    ///
    /// A new value starts with the sub-keys of the latest value that has any, set to
    /// [`DEFAULT_SUB_VALUE`]; `pairs` then overwrite or extend its sub-pairs. Unknown
    /// keys are created.
    pub fn add_value(&self, key: &str, value: &str, pairs: &[(String, String)]) -> Result<Dependencies> {
        let mut keys = self.load().keys;
        let key_index = match keys.iter().position(|k| eq_ci(&k.name, key)) {
            Some(i) => i,
            None => {
                keys.push(KeyItem::new(key));
                keys.len() - 1
            }
        };
        let item = &mut keys[key_index];
        let value_index = match item.values.iter().position(|v| eq_ci(&v.name, value)) {
            Some(i) => i,
            None => {
                let mut fresh = ValueItem::new(value);
                prepopulate_sub_pairs(item, &mut fresh, DEFAULT_SUB_VALUE);
                item.values.push(fresh);
                item.values.len() - 1
            }
        };
        let target = &mut item.values[value_index];
        for (sub_key, sub_value) in pairs {
            match target.sub_pairs.iter_mut().find(|p| eq_ci(&p.sub_key, sub_key)) {
                Some(pair) => pair.sub_value = sub_value.clone(),
                None => target.sub_pairs.push(SubPair {
                    sub_key: sub_key.clone(),
                    sub_value: sub_value.clone(),
                }),
            }
        }
        self.save(&keys)
    }

    fn write(&self, deps: &Dependencies) -> Result<()> {
        let json = serde_json::to_string_pretty(&DependenciesFile(deps)).map_err(|e| {
            StoreError::Json {
                path: self.path.clone(),
                source: e,
            }
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

fn read_raw(path: &Path) -> Result<RawJson> {
    let text = std::fs::read_to_string(path).map_err(|e| StoreError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    serde_json::from_str(&text).map_err(|e| StoreError::Json {
        path: path.to_path_buf(),
        source: e,
    })
}

fn eq_ci(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}

#[derive(Default)]
struct CiSet(HashSet<String>);

impl CiSet {
    fn insert(&mut self, s: &str) -> bool {
        self.0.insert(s.to_lowercase())
    }
}

/// JSON value that keeps every object member, repeated names included.
#[derive(Debug)]
enum RawJson {
    Object(Vec<(String, RawJson)>),
    String(String),
    Other(&'static str),
}

impl RawJson {
    fn kind(&self) -> &'static str {
        match self {
            Self::Object(_) => "object",
            Self::String(_) => "string",
            Self::Other(kind) => *kind,
        }
    }
}

impl<'de> Deserialize<'de> for RawJson {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_any(RawJsonVisitor)
    }
}

struct RawJsonVisitor;

impl<'de> Visitor<'de> for RawJsonVisitor {
    type Value = RawJson;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("any JSON value")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> std::result::Result<RawJson, A::Error> {
        let mut entries = Vec::new();
        while let Some((k, v)) = map.next_entry::<String, RawJson>()? {
            entries.push((k, v));
        }
        Ok(RawJson::Object(entries))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> std::result::Result<RawJson, A::Error> {
        while seq.next_element::<RawJson>()?.is_some() {}
        Ok(RawJson::Other("array"))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<RawJson, E> {
        Ok(RawJson::String(v.to_string()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> std::result::Result<RawJson, E> {
        Ok(RawJson::String(v))
    }

    fn visit_bool<E: de::Error>(self, _: bool) -> std::result::Result<RawJson, E> {
        Ok(RawJson::Other("boolean"))
    }

    fn visit_i64<E: de::Error>(self, _: i64) -> std::result::Result<RawJson, E> {
        Ok(RawJson::Other("number"))
    }

    fn visit_u64<E: de::Error>(self, _: u64) -> std::result::Result<RawJson, E> {
        Ok(RawJson::Other("number"))
    }

    fn visit_f64<E: de::Error>(self, _: f64) -> std::result::Result<RawJson, E> {
        Ok(RawJson::Other("number"))
    }

    fn visit_unit<E: de::Error>(self) -> std::result::Result<RawJson, E> {
        Ok(RawJson::Other("null"))
    }
}

/// Serializes as `{"Dependencies": {...}}` keeping model order.
struct DependenciesFile<'a>(&'a Dependencies);

struct KeysMap<'a>(&'a [KeyItem]);
struct ValuesMap<'a>(&'a [ValueItem]);
struct PairsMap<'a>(&'a [SubPair]);

impl Serialize for DependenciesFile<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(ROOT_KEY, &KeysMap(&self.0.keys))?;
        map.end()
    }
}

impl Serialize for KeysMap<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.iter().map(|k| (&k.name, ValuesMap(&k.values))))
    }
}

impl Serialize for ValuesMap<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.iter().map(|v| (&v.name, PairsMap(&v.sub_pairs))))
    }
}

impl Serialize for PairsMap<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.iter().map(|p| (&p.sub_key, &p.sub_value)))
    }
}
