use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use wirekit::{ConfigAccessor, DrainPolicy};

/// Prefix for environment overrides: `APP__CONTAINER__SHUTDOWN__MAX_ATTEMPTS=3`
/// maps to `container.shutdown.max_attempts`.
pub const ENV_PREFIX: &str = "APP__";

const CONFIG_EXTENSIONS: &[&str] = &["json", "yaml", "yml"];

/// Typed view of the framework sections. Everything else in the merged tree
/// belongs to components and is reached through [`LoadedConfig::accessor`].
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default = "default_logging_config")]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub container: ContainerConfig,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ContainerConfig {
    #[serde(default)]
    pub shutdown: DrainPolicy,
}

/// `"default"` sets the baseline; any other key is a target prefix
/// (`wirekit`, `wirekit_server::components`) with its own levels and file.
pub type LoggingConfig = HashMap<String, LogSection>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSection {
    pub console_level: String,
    /// Empty means no file sink for this section.
    #[serde(default)]
    pub file: String,
    #[serde(default)]
    pub file_level: String,
    #[serde(default)]
    pub max_age_days: Option<u32>,
    #[serde(default)]
    pub max_backups: Option<usize>,
    #[serde(default)]
    pub max_size_mb: Option<u64>,
}

impl LogSection {
    pub fn console(level: &str) -> Self {
        Self {
            console_level: level.to_owned(),
            file: String::new(),
            file_level: String::new(),
            max_age_days: None,
            max_backups: None,
            max_size_mb: None,
        }
    }
}

pub fn default_logging_config() -> LoggingConfig {
    HashMap::from([("default".to_owned(), LogSection::console("info"))])
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            logging: default_logging_config(),
            container: ContainerConfig::default(),
        }
    }
}

impl AppConfig {
    /// Apply overrides from command line arguments.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        let section = self
            .logging
            .entry("default".to_owned())
            .or_insert_with(|| LogSection::console("info"));

        if let Some(level) = &args.log_level {
            section.console_level.clone_from(level);
        }
        match args.verbose {
            0 => {}
            1 => section.console_level = "debug".to_owned(),
            _ => section.console_level = "trace".to_owned(),
        }
    }
}

/// Command line arguments the loader cares about.
#[derive(Debug, Clone, Default)]
pub struct CliArgs {
    pub config: Vec<PathBuf>,
    pub log_level: Option<String>,
    pub print_config: bool,
    pub verbose: u8,
}

/// Result of layered loading: the typed framework sections plus the full
/// merged tree components read their settings from.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub app: AppConfig,
    pub tree: serde_json::Value,
    /// Files that went into the merge, in merge order.
    pub sources: Vec<PathBuf>,
}

impl LoadedConfig {
    pub fn accessor(&self) -> ConfigAccessor {
        ConfigAccessor::new(self.tree.clone())
    }

    /// Serialize the merged tree to YAML.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(&self.tree).context("Failed to serialize config to YAML")
    }
}

/// Layered loading: defaults → config files in order → environment variables.
///
/// Each path is a file (`.json`, `.yaml`, `.yml`) or a directory whose config
/// files are merged in name order. Later layers override earlier ones key by
/// key; nested objects are merged, not replaced.
pub fn load_layered<P: AsRef<Path>>(paths: &[P]) -> Result<LoadedConfig> {
    use figment::{
        providers::{Env, Format, Json, Serialized, Yaml},
        Figment,
    };

    let sources = expand_config_paths(paths)?;

    let mut figment = Figment::new().merge(Serialized::defaults(AppConfig::default()));
    for source in &sources {
        figment = if has_extension(source, "json") {
            figment.merge(Json::file(source))
        } else {
            figment.merge(Yaml::file(source))
        };
    }
    let figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

    let app: AppConfig = figment
        .extract()
        .context("Failed to extract config from figment")?;
    let tree: serde_json::Value = figment
        .extract()
        .context("Failed to extract config tree from figment")?;

    tracing::debug!(files = sources.len(), "Configuration loaded");
    Ok(LoadedConfig { app, tree, sources })
}

/// Resolve the command line paths into the ordered list of files to merge.
/// Every named path must exist.
pub fn expand_config_paths<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        let path = path.as_ref();
        let meta = std::fs::metadata(path)
            .with_context(|| format!("Config path '{}' does not exist", path.display()))?;

        if meta.is_dir() {
            let mut entries = std::fs::read_dir(path)
                .with_context(|| format!("Failed to read config dir '{}'", path.display()))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.is_file() && is_config_file(p))
                .collect::<Vec<_>>();
            entries.sort();
            files.extend(entries);
        } else if is_config_file(path) {
            files.push(path.to_path_buf());
        } else {
            anyhow::bail!(
                "Config file '{}' must have one of the extensions: {}",
                path.display(),
                CONFIG_EXTENSIONS.join(", ")
            );
        }
    }
    Ok(files)
}

fn is_config_file(path: &Path) -> bool {
    CONFIG_EXTENSIONS.iter().any(|ext| has_extension(path, ext))
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(ext))
}

#[cfg(test)]
mod tests;
