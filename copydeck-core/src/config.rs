//! Pipeline configuration.
//!
//! One [`PipelineConfig`] is built at startup and handed by reference to every
//! component constructor; nothing else in the crate reads paths or limits from
//! the environment. Defaults are compiled in from `config/pipeline.toml` and a
//! project may override any key with a `copydeck.toml` at its root.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::PipelineError;

/// Default configuration embedded in the binary at compile time.
const DEFAULT_CONFIG: &str = include_str!("../config/pipeline.toml");

/// File name looked up at the project root for overrides.
pub const PROJECT_CONFIG_FILE: &str = "copydeck.toml";

/// What happens to a section after its review was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RejectionPolicy {
    /// Wait until an improve completion is recorded explicitly.
    Hold,
    /// Re-enter the improve queue automatically.
    Reimprove,
}

/// How a partial approval is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartialPolicy {
    /// Counts as reviewed; only the approved subset is implemented.
    Proceed,
    /// Counts as a rejection.
    Rework,
}

/// Review-related policy switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewPolicy {
    pub rejected: RejectionPolicy,
    pub partial: PartialPolicy,
    pub require_original_match: bool,
}

impl Default for ReviewPolicy {
    fn default() -> Self {
        Self {
            rejected: RejectionPolicy::Hold,
            partial: PartialPolicy::Proceed,
            require_original_match: false,
        }
    }
}

/// Paths, caps and thresholds shared by every pipeline component.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Project root all relative paths resolve against.
    #[serde(skip)]
    pub root: PathBuf,
    pub content_dir: PathBuf,
    pub backup_dir: PathBuf,
    pub change_log: PathBuf,
    pub status_file: PathBuf,
    pub review_dir: PathBuf,
    pub approved_changes: PathBuf,
    pub max_log_entries: usize,
    pub backup_retention_days: u32,
    pub json_indent: usize,
    pub sections: Vec<String>,
    pub policy: ReviewPolicy,
}

impl PipelineConfig {
    /// Embedded defaults rooted at `root`.
    ///
    /// A relative `root` is made absolute against the current directory, so
    /// every derived path stays valid after the process changes directory.
    ///
    /// # Panics
    /// Panics if the embedded TOML is invalid (a build-time bug, covered by tests).
    pub fn defaults(root: impl Into<PathBuf>) -> Self {
        let mut config: PipelineConfig = toml::from_str(DEFAULT_CONFIG)
            .expect("embedded config/pipeline.toml must be valid");
        config.root = absolute_root(root.into());
        config
    }

    /// Resolve a configured path against the project root.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    pub fn backup_dir(&self) -> PathBuf {
        self.resolve(&self.backup_dir)
    }

    pub fn change_log_path(&self) -> PathBuf {
        self.resolve(&self.change_log)
    }

    pub fn status_path(&self) -> PathBuf {
        self.resolve(&self.status_file)
    }

    pub fn review_dir(&self) -> PathBuf {
        self.resolve(&self.review_dir)
    }

    pub fn approved_changes_path(&self) -> PathBuf {
        self.resolve(&self.approved_changes)
    }

    /// Location of a content file named in an approved change.
    ///
    /// Relative names are looked up under `content_dir`.
    pub fn content_path(&self, file: &str) -> PathBuf {
        let file = Path::new(file);
        if file.is_absolute() {
            file.to_path_buf()
        } else {
            self.resolve(&self.content_dir).join(file)
        }
    }
}

/// Load the configuration for a project.
///
/// Uses `explicit` when given, otherwise `<root>/copydeck.toml` if it exists.
/// Keys missing from the override keep their embedded defaults.
pub fn load_config(root: &Path, explicit: Option<&Path>) -> Result<PipelineConfig, PipelineError> {
    let override_path = match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => {
            let candidate = root.join(PROJECT_CONFIG_FILE);
            candidate.exists().then_some(candidate)
        }
    };

    let Some(path) = override_path else {
        debug!("No {} under {:?}, using embedded defaults", PROJECT_CONFIG_FILE, root);
        return Ok(PipelineConfig::defaults(root));
    };

    let content = std::fs::read_to_string(&path)
        .map_err(|e| PipelineError::Config(format!("Failed to read {:?}: {}", path, e)))?;
    let mut config = config_from_str(&content)
        .map_err(|e| PipelineError::Config(format!("Invalid config {:?}: {}", path, e)))?;
    config.root = absolute_root(root.to_path_buf());

    debug!("Loaded pipeline config from {:?}", path);
    Ok(config)
}

fn absolute_root(root: PathBuf) -> PathBuf {
    if root.as_os_str().is_empty() {
        return std::env::current_dir().unwrap_or(root);
    }
    std::path::absolute(&root).unwrap_or(root)
}

/// Parse an override document layered over the embedded defaults.
fn config_from_str(content: &str) -> Result<PipelineConfig, toml::de::Error> {
    let mut base: toml::Table = toml::from_str(DEFAULT_CONFIG)?;
    let overrides: toml::Table = toml::from_str(content)?;
    merge_tables(&mut base, overrides);
    toml::Value::Table(base).try_into()
}

/// Recursively overlay `overrides` onto `base`.
fn merge_tables(base: &mut toml::Table, overrides: toml::Table) {
    for (key, value) in overrides {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}
