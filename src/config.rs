use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

use crate::pipeline::naming::{KeyFilter, OutputNaming};
use crate::store::dependencies::DEFAULT_DEPENDENCIES_FILE;
use crate::store::keys::DEFAULT_KEYS_FILE;

pub const CONFIG_FILE_NAME: &str = "docs-generator.toml";
pub const CONFIG_ENV: &str = "DOCS_GENERATOR_CONFIG";

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub naming: NamingSection,
    #[serde(default)]
    pub input: InputSection,
    #[serde(default)]
    pub stores: StoresSection,
    #[serde(default)]
    pub output: OutputSection,
}

/// Output file naming; each key doubles as the default folder filter key.
#[derive(Clone, Debug, Deserialize, Default)]
pub struct NamingSection {
    #[serde(default)]
    pub template: OutputNaming,
    #[serde(default)]
    pub data_sheet: OutputNaming,
    #[serde(default)]
    pub document: OutputNaming,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct InputSection {
    #[serde(default)]
    pub key_filter: KeyFilter,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct StoresSection {
    /// Relative paths are resolved against the config file directory.
    #[serde(default)]
    pub keys_file: Option<PathBuf>,
    #[serde(default)]
    pub dependencies_file: Option<PathBuf>,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct OutputSection {
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

/// A loaded configuration and the file it came from, if any.
#[derive(Clone, Debug, Default)]
pub struct ResolvedConfig {
    pub path: Option<PathBuf>,
    pub config: AppConfig,
}

impl ResolvedConfig {
    /// Directory relative paths in the config are resolved against.
    pub fn base_dir(&self) -> PathBuf {
        self.path
            .as_deref()
            .and_then(Path::parent)
            .map(Path::to_path_buf)
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn keys_path(&self) -> PathBuf {
        self.resolve(self.config.stores.keys_file.as_deref(), DEFAULT_KEYS_FILE)
    }

    pub fn dependencies_path(&self) -> PathBuf {
        self.resolve(
            self.config.stores.dependencies_file.as_deref(),
            DEFAULT_DEPENDENCIES_FILE,
        )
    }

    pub fn output_dir(&self) -> Option<PathBuf> {
        self.config
            .output
            .dir
            .as_deref()
            .map(|d| self.resolve(Some(d), ""))
    }

    fn resolve(&self, configured: Option<&Path>, default_name: &str) -> PathBuf {
        let p = configured.unwrap_or_else(|| Path::new(default_name));
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.base_dir().join(p)
        }
    }
}

/// Explicit path, then `DOCS_GENERATOR_CONFIG`, then an upward search; built-in
/// defaults when nothing is found.
pub fn resolve_config(explicit: Option<&Path>, workdir: &Path) -> anyhow::Result<ResolvedConfig> {
    let from_env = std::env::var_os(CONFIG_ENV)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from);
    let path = match explicit.map(Path::to_path_buf).or(from_env) {
        Some(p) => Some(p),
        None => find_default_config(workdir, CONFIG_FILE_NAME),
    };
    match path {
        Some(p) => Ok(ResolvedConfig {
            config: load_config(&p)?,
            path: Some(p),
        }),
        None => Ok(ResolvedConfig::default()),
    }
}

pub fn find_default_config(workdir: &Path, filename: &str) -> Option<PathBuf> {
    if let Ok(cwd) = std::env::current_dir() {
        if let Some(p) = find_file_upwards(&cwd, filename, 8) {
            return Some(p);
        }
    }
    if let Some(p) = find_file_upwards(workdir, filename, 8) {
        return Some(p);
    }
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            if let Some(p) = find_file_upwards(dir, filename, 10) {
                return Some(p);
            }
        }
    }
    None
}

pub fn find_file_upwards(start_dir: &Path, filename: &str, max_levels: usize) -> Option<PathBuf> {
    let mut dir = start_dir;
    for _ in 0..=max_levels {
        let candidate = dir.join(filename);
        if candidate.exists() {
            return Some(candidate);
        }
        dir = dir.parent()?;
    }
    None
}

pub fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read config: {}", path.display()))?;
    let cfg: AppConfig = toml::from_str(&text)
        .with_context(|| format!("parse config toml: {}", path.display()))?;
    Ok(cfg)
}

const DEFAULT_CONFIG_TOML: &str = r#"# docs-generator configuration.
#
# placement: "suffix" | "prefix" | "omit" (where the key goes in output names)
# Each key is also the default filter key when loading inputs from a folder.

[naming.template]
key = "_template"
placement = "suffix"

[naming.data_sheet]
key = "_sheet"
placement = "suffix"

[naming.document]
key = "_template"
placement = "omit"

[input]
# "contains" | "starts_with" | "ends_with"
key_filter = "contains"

[stores]
# Relative to this file.
keys_file = "all_keys.json"
dependencies_file = "dependencies.json"

[output]
# Default output directory when -o is not given.
# dir = "out"
"#;

/// Writes a commented default config into `dir`; an existing file is kept unless
/// `force` is set.
pub fn init_default_config(dir: &Path, force: bool) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("create config dir: {}", dir.display()))?;
    let cfg_path = dir.join(CONFIG_FILE_NAME);
    if cfg_path.exists() && !force {
        return Ok(cfg_path);
    }
    std::fs::write(&cfg_path, DEFAULT_CONFIG_TOML)
        .with_context(|| format!("write config: {}", cfg_path.display()))?;
    Ok(cfg_path)
}

#[cfg(test)]
mod tests {
    use super::{find_file_upwards, init_default_config, load_config, resolve_config, CONFIG_FILE_NAME};
    use crate::pipeline::naming::{KeyFilter, KeyPlacement};

    #[test]
    fn default_file_parses() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = init_default_config(dir.path(), false).expect("init");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.naming.template.key, "_template");
        assert_eq!(cfg.naming.document.placement, KeyPlacement::Omit);
        assert_eq!(cfg.input.key_filter, KeyFilter::Contains);
        assert!(cfg.output.dir.is_none());
    }

    #[test]
    fn init_keeps_existing_file_without_force() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "[input]\nkey_filter = \"ends_with\"\n").expect("write");
        init_default_config(dir.path(), false).expect("init");
        assert_eq!(load_config(&path).expect("load").input.key_filter, KeyFilter::EndsWith);
        init_default_config(dir.path(), true).expect("force");
        assert_eq!(load_config(&path).expect("load").input.key_filter, KeyFilter::Contains);
    }

    #[test]
    fn partial_config_uses_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("custom.toml");
        std::fs::write(
            &path,
            "[naming.template]\nkey = \"T_\"\nplacement = \"prefix\"\n[stores]\nkeys_file = \"data/keys.json\"\n",
        )
        .expect("write");
        let resolved = resolve_config(Some(&path), dir.path()).expect("resolve");
        let cfg = &resolved.config;
        assert_eq!(cfg.naming.template.file_name("offer", "docx"), "T_offer.docx");
        assert_eq!(cfg.naming.data_sheet.placement, KeyPlacement::Suffix);
        assert_eq!(resolved.keys_path(), dir.path().join("data/keys.json"));
        assert_eq!(resolved.dependencies_path(), dir.path().join("dependencies.json"));
    }

    #[test]
    fn bad_values_are_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[naming.template]\nplacement = \"middle\"\n").expect("write");
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn upward_search_finds_parent_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let nested = dir.path().join("a").join("b");
        std::fs::create_dir_all(&nested).expect("mkdir");
        std::fs::write(dir.path().join(CONFIG_FILE_NAME), "").expect("write");
        assert_eq!(
            find_file_upwards(&nested, CONFIG_FILE_NAME, 8),
            Some(dir.path().join(CONFIG_FILE_NAME))
        );
        assert_eq!(find_file_upwards(&nested, CONFIG_FILE_NAME, 1), None);
    }
}
