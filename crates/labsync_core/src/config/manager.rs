//! Config manager for loading, checking and writing the run config.
//!
//! Key features:
//! - Schema check on load (unknown tables and keys are dropped with a warning)
//! - Required stage tables, each with at least one recognised key
//! - Output-folder placeholder substitution
//! - Atomic writes (write to temp file, then rename)

use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use toml_edit::{DocumentMut, Item};

use super::settings::{ConfigSection, Settings};

/// Errors that can occur during config operations.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("Failed to parse config for editing: {0}")]
    EditParseError(#[from] toml_edit::TomlError),

    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    #[error("Output folder {path} is not usable: {source}")]
    InvalidOutputFolder {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("No valid parameters in [{section}]")]
    EmptyStageParams { section: String },

    #[error("Missing required config table [{section}]")]
    MissingStageSection { section: String },
}

/// Result type for config operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Something dropped from the config file during the schema check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigWarning {
    UnknownTable(String),
    UnknownKey { section: String, key: String },
}

impl fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigWarning::UnknownTable(name) => {
                write!(f, "Unknown config entry '{}' ignored", name)
            }
            ConfigWarning::UnknownKey { section, key } => {
                write!(f, "Unsupported parameter '{}' in [{}] ignored", key, section)
            }
        }
    }
}

/// Loads the run configuration and resolves its paths.
pub struct ConfigManager {
    /// Path to the config file.
    config_path: PathBuf,
    /// Settings as written in the file (placeholders unresolved).
    settings: Settings,
    /// Schema-check findings from the last load.
    warnings: Vec<ConfigWarning>,
}

impl ConfigManager {
    /// Create a manager for `config_path`. Call `load()` after.
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
            settings: Settings::default(),
            warnings: Vec::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.config_path
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn warnings(&self) -> &[ConfigWarning] {
        &self.warnings
    }

    /// Load config from file.
    ///
    /// Returns error if the file doesn't exist, is not valid TOML, or
    /// lacks a usable stage table.
    pub fn load(&mut self) -> ConfigResult<()> {
        if !self.config_path.exists() {
            return Err(ConfigError::NotFound(self.config_path.clone()));
        }

        let content = fs::read_to_string(&self.config_path)?;
        let (settings, warnings) = parse_and_check(&content)?;
        for warning in &warnings {
            tracing::warn!("{}", warning);
        }
        tracing::debug!("Loaded config from {}", self.config_path.display());

        self.settings = settings;
        self.warnings = warnings;
        Ok(())
    }

    /// Override `paths.output_folder` (e.g. from the command line).
    pub fn set_output_folder(&mut self, folder: impl Into<String>) {
        self.settings.paths.output_folder = folder.into();
    }

    /// Settings with output-folder placeholders substituted.
    pub fn resolved_settings(&self) -> Settings {
        let mut settings = self.settings.clone();
        settings.resolve_placeholders();
        settings
    }

    pub fn output_folder(&self) -> PathBuf {
        PathBuf::from(&self.settings.paths.output_folder)
    }

    /// Folder for run-level reports and the log file.
    pub fn logs_folder(&self) -> PathBuf {
        self.output_folder().join(&self.settings.paths.logs_subfolder)
    }

    /// Create the output folder and its logs subfolder.
    pub fn ensure_output_folder(&self) -> ConfigResult<PathBuf> {
        for dir in [self.output_folder(), self.logs_folder()] {
            fs::create_dir_all(&dir).map_err(|source| ConfigError::InvalidOutputFolder {
                path: dir.clone(),
                source,
            })?;
        }
        Ok(self.output_folder())
    }

    /// Write the commented default config to `path` atomically.
    pub fn write_default(path: &Path) -> ConfigResult<()> {
        let content = generate_default_config()?;
        atomic_write(path, &content)?;
        tracing::info!("Wrote default config to {}", path.display());
        Ok(())
    }
}

/// Parse config content, dropping what the schema does not know.
pub fn parse_and_check(content: &str) -> ConfigResult<(Settings, Vec<ConfigWarning>)> {
    // Syntax errors surface as ParseError.
    let _: toml::Table = toml::from_str(content)?;
    let mut doc: DocumentMut = content.parse()?;
    let mut warnings = Vec::new();

    let top_level: Vec<String> = doc.iter().map(|(k, _)| k.to_string()).collect();
    for name in top_level {
        let Some(section) = ConfigSection::from_table_name(&name) else {
            doc.remove(&name);
            warnings.push(ConfigWarning::UnknownTable(name));
            continue;
        };
        let Some(table) = doc.get_mut(&name).and_then(Item::as_table_like_mut) else {
            continue;
        };
        let unknown: Vec<String> = table
            .iter()
            .map(|(k, _)| k.to_string())
            .filter(|k| !section.known_keys().contains(&k.as_str()))
            .collect();
        for key in unknown {
            table.remove(&key);
            warnings.push(ConfigWarning::UnknownKey {
                section: name.clone(),
                key,
            });
        }
        if section.is_stage() && table.is_empty() {
            return Err(ConfigError::EmptyStageParams { section: name });
        }
    }

    for section in ConfigSection::ALL.iter().filter(|s| s.is_stage()) {
        if !doc.contains_key(section.table_name()) {
            return Err(ConfigError::MissingStageSection {
                section: section.table_name().to_string(),
            });
        }
    }

    let settings: Settings = toml::from_str(&doc.to_string())?;
    Ok((settings, warnings))
}

/// Generate the default config with comments.
fn generate_default_config() -> ConfigResult<String> {
    let defaults = Settings::default();
    let mut output = String::new();

    output.push_str("# labsync configuration\n");
    output.push_str("# Values equal to out_folder, output_folder or output_location in the\n");
    output.push_str("# stage tables are replaced by paths.output_folder.\n\n");

    let sections: [(&str, &str, String); 5] = [
        (
            "Output, template and log locations",
            "paths",
            toml::to_string_pretty(&defaults.paths)?,
        ),
        (
            "Diagnostic logging (RUST_LOG overrides level)",
            "logging",
            toml::to_string_pretty(&defaults.logging)?,
        ),
        (
            "Fetch stage: remote drop-off and local materialization",
            "download",
            toml::to_string_pretty(&defaults.download)?,
        ),
        (
            "Normalize stage: lab spreadsheet + sample list to JSON",
            "read_lab_metadata",
            toml::to_string_pretty(&defaults.read_lab_metadata)?,
        ),
        (
            "Validate stage (json_schema_file is optional)",
            "validate",
            toml::to_string_pretty(&defaults.validate)?,
        ),
    ];

    for (comment, table, body) in sections {
        output.push_str(&format!("# {}\n[{}]\n", comment, table));
        for line in body.lines() {
            output.push_str(line);
            output.push('\n');
        }
        output.push('\n');
    }

    Ok(output)
}

/// Write content to `path` atomically (temp file, then rename).
fn atomic_write(path: &Path, content: &str) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let temp_path = path.with_extension("toml.tmp");
    {
        let mut file = fs::File::create(&temp_path)?;
        file.write_all(content.as_bytes())?;
        file.sync_all()?;
    }

    fs::rename(&temp_path, path)
}
