//! Agent configuration.
//!
//! Priority: command-line flags > environment variables > config file > defaults.
//! A missing config file at the default location means defaults; a config file given
//! explicitly must exist.

use letter_remap::TagNames;
use letter_remap::tags::{DEFAULT_LABEL_TAG, DEFAULT_LETTER_TAG};
use log::debug;
use serde::Deserialize;
use std::env;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Where the agent looks for its config file when none is given.
pub const DEFAULT_CONFIG_PATH: &str = r"C:\ProgramData\drivemap\config.json";

/// Link-local address of the EC2 instance metadata service.
pub const DEFAULT_METADATA_ENDPOINT: &str = "http://169.254.169.254";

/// Agent configuration, matching the JSON config file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AgentConfig {
    /// Tag holding the desired drive letter.
    pub letter_tag: String,
    /// Tag holding the desired volume label.
    pub label_tag: String,
    pub metadata_endpoint: String,
    pub metadata_timeout_secs: u64,
    /// Region for tag lookups. Taken from instance metadata when unset.
    pub region: Option<String>,
    /// AWS CLI executable used for tag lookups.
    pub aws_cli: String,
    /// PowerShell executable used for storage management and `.ps1` scripts.
    pub powershell: String,
    /// Directory of startup scripts. No scripts run when unset.
    pub scripts_dir: Option<PathBuf>,
    /// Bring offline or read-only non-boot disks online before remapping.
    pub online_disks: bool,
    /// Log every change instead of applying it.
    pub dry_run: bool,
    pub log_level: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            letter_tag: DEFAULT_LETTER_TAG.to_string(),
            label_tag: DEFAULT_LABEL_TAG.to_string(),
            metadata_endpoint: DEFAULT_METADATA_ENDPOINT.to_string(),
            metadata_timeout_secs: 2,
            region: None,
            aws_cli: "aws".to_string(),
            powershell: "powershell.exe".to_string(),
            scripts_dir: None,
            online_disks: true,
            dry_run: false,
            log_level: "info".to_string(),
        }
    }
}

/// Error loading the config file.
#[derive(Debug)]
pub enum ConfigError {
    /// The file exists (or was asked for explicitly) but couldn't be read.
    Read { path: PathBuf, error: io::Error },
    /// The file isn't valid config JSON.
    Parse { path: PathBuf, error: serde_json::Error },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read { path, error } => write!(f, "Couldn't read config {}: {}", path.display(), error),
            Self::Parse { path, error } => write!(f, "Invalid config {}: {}", path.display(), error),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Read { error, .. } => Some(error),
            Self::Parse { error, .. } => Some(error),
        }
    }
}

impl AgentConfig {
    /// Loads the config file (explicit path, else the default location) and applies
    /// environment overrides.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match explicit_path {
            Some(path) => Self::from_file(path)?,
            None => Self::from_file_or_default(Path::new(DEFAULT_CONFIG_PATH))?,
        };
        Ok(config.with_env_overrides(|key| env::var(key).ok()))
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|error| ConfigError::Read {
            path: path.to_path_buf(),
            error,
        })?;
        Self::from_json(&contents).map_err(|error| ConfigError::Parse {
            path: path.to_path_buf(),
            error,
        })
    }

    /// Like `from_file`, but a file that doesn't exist yields defaults.
    pub fn from_file_or_default(path: &Path) -> Result<Self, ConfigError> {
        match Self::from_file(path) {
            Err(ConfigError::Read { error, .. }) if error.kind() == io::ErrorKind::NotFound => {
                debug!("No config at {}, using defaults", path.display());
                Ok(Self::default())
            }
            other => other,
        }
    }

    pub fn from_json(contents: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(contents)
    }

    /// Applies `DRIVEMAP_*` overrides. `get` reads a variable; tests pass a map lookup.
    pub fn with_env_overrides(mut self, get: impl Fn(&str) -> Option<String>) -> Self {
        let get_nonempty = |key: &str| get(key).filter(|v| !v.trim().is_empty());
        let get_bool = |key: &str| get_nonempty(key).map(|v| v == "true" || v == "1");

        if let Some(v) = get_nonempty("DRIVEMAP_LETTER_TAG") {
            self.letter_tag = v;
        }
        if let Some(v) = get_nonempty("DRIVEMAP_LABEL_TAG") {
            self.label_tag = v;
        }
        if let Some(v) = get_nonempty("DRIVEMAP_METADATA_ENDPOINT") {
            self.metadata_endpoint = v;
        }
        if let Some(v) = get_nonempty("DRIVEMAP_METADATA_TIMEOUT").and_then(|v| v.trim().parse().ok()) {
            self.metadata_timeout_secs = v;
        }
        if let Some(v) = get_nonempty("DRIVEMAP_REGION") {
            self.region = Some(v);
        }
        if let Some(v) = get_nonempty("DRIVEMAP_AWS_CLI") {
            self.aws_cli = v;
        }
        if let Some(v) = get_nonempty("DRIVEMAP_POWERSHELL") {
            self.powershell = v;
        }
        if let Some(v) = get_nonempty("DRIVEMAP_SCRIPTS_DIR") {
            self.scripts_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = get_bool("DRIVEMAP_ONLINE_DISKS") {
            self.online_disks = v;
        }
        if let Some(v) = get_bool("DRIVEMAP_DRY_RUN") {
            self.dry_run = v;
        }
        if let Some(v) = get_nonempty("DRIVEMAP_LOG") {
            self.log_level = v;
        }
        self
    }

    pub fn tag_names(&self) -> TagNames {
        TagNames {
            letter: self.letter_tag.clone(),
            label: self.label_tag.clone(),
        }
    }

    pub fn metadata_timeout(&self) -> Duration {
        Duration::from_secs(self.metadata_timeout_secs)
    }
}
