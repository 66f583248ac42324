//! Settings struct with TOML-based sections.
//!
//! One table per concern. The three stage tables (`download`,
//! `read_lab_metadata`, `validate`) are statically declared so unknown
//! keys can be detected at load time.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::logging::LogLevel;

/// Config values replaced by the resolved output folder.
pub const OUTPUT_PLACEHOLDERS: [&str; 3] = ["out_folder", "output_folder", "output_location"];

/// Root settings structure containing all configuration sections.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub paths: PathSettings,

    #[serde(default)]
    pub logging: LoggingSettings,

    /// Fetch stage.
    #[serde(default)]
    pub download: DownloadSettings,

    /// Normalize stage.
    #[serde(default)]
    pub read_lab_metadata: ReadLabMetadataSettings,

    /// Validate stage.
    #[serde(default)]
    pub validate: ValidateSettings,
}

impl Settings {
    /// Replace placeholder values in the stage tables with the output folder.
    pub fn resolve_placeholders(&mut self) {
        let out = self.paths.output_folder.clone();
        let subst = |value: &mut String| {
            if OUTPUT_PLACEHOLDERS.contains(&value.as_str()) {
                *value = out.clone();
            }
        };

        let d = &mut self.download;
        subst(&mut d.remote_root);
        subst(&mut d.output_location);
        d.target_folders.iter_mut().for_each(subst);

        let r = &mut self.read_lab_metadata;
        subst(&mut r.program);
        r.args.iter_mut().for_each(subst);

        let v = &mut self.validate;
        subst(&mut v.program);
        v.args.iter_mut().for_each(subst);
        if let Some(schema) = v.json_schema_file.as_mut() {
            subst(schema);
        }
    }
}

/// Output, template and log locations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathSettings {
    /// Root output folder; must exist or be creatable.
    #[serde(default = "default_output_folder")]
    pub output_folder: String,

    /// Folder holding `metadata_template*.xlsx`.
    #[serde(default = "default_template_folder")]
    pub template_folder: String,

    /// Run-level reports and `labsync.log`, relative to the output folder.
    #[serde(default = "default_logs_subfolder")]
    pub logs_subfolder: String,
}

fn default_output_folder() -> String {
    "labsync_output".to_string()
}

fn default_template_folder() -> String {
    "assets".to_string()
}

fn default_logs_subfolder() -> String {
    "logs".to_string()
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            output_folder: default_output_folder(),
            template_folder: default_template_folder(),
            logs_subfolder: default_logs_subfolder(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Fallback level when `RUST_LOG` is unset.
    #[serde(default)]
    pub level: LogLevel,

    /// Also write `labsync.log` in the logs folder.
    #[serde(default = "default_true")]
    pub file_log: bool,
}

fn default_true() -> bool {
    true
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            file_log: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadSettings {
    /// Root of the mounted drop-off.
    #[serde(default = "default_remote_root")]
    pub remote_root: String,

    /// Restrict the run to these keys (all when empty).
    #[serde(default)]
    pub target_folders: Vec<String>,

    /// Where batches are materialized.
    #[serde(default = "default_output_location")]
    pub output_location: String,
}

fn default_remote_root() -> String {
    "dropoff".to_string()
}

fn default_output_location() -> String {
    "output_folder".to_string()
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            remote_root: default_remote_root(),
            target_folders: Vec::new(),
            output_location: default_output_location(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadLabMetadataSettings {
    #[serde(default = "default_program")]
    pub program: String,

    #[serde(default = "default_read_args")]
    pub args: Vec<String>,

    /// Wall-clock limit; 0 disables it.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_program() -> String {
    "relecov-tools".to_string()
}

fn default_read_args() -> Vec<String> {
    vec!["read-lab-metadata".to_string()]
}

fn default_timeout_secs() -> u64 {
    600
}

fn timeout_from_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

impl ReadLabMetadataSettings {
    pub fn timeout(&self) -> Option<Duration> {
        timeout_from_secs(self.timeout_secs)
    }
}

impl Default for ReadLabMetadataSettings {
    fn default() -> Self {
        Self {
            program: default_program(),
            args: default_read_args(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidateSettings {
    #[serde(default = "default_program")]
    pub program: String,

    #[serde(default = "default_validate_args")]
    pub args: Vec<String>,

    /// Passed as `--json-schema-file` when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json_schema_file: Option<String>,

    /// Wall-clock limit; 0 disables it.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_validate_args() -> Vec<String> {
    vec!["validate".to_string()]
}

impl ValidateSettings {
    pub fn timeout(&self) -> Option<Duration> {
        timeout_from_secs(self.timeout_secs)
    }

    pub fn schema_path(&self) -> Option<PathBuf> {
        self.json_schema_file.as_ref().map(PathBuf::from)
    }
}

impl Default for ValidateSettings {
    fn default() -> Self {
        Self {
            program: default_program(),
            args: default_validate_args(),
            json_schema_file: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Names of config sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigSection {
    Paths,
    Logging,
    Download,
    ReadLabMetadata,
    Validate,
}

impl ConfigSection {
    pub const ALL: [ConfigSection; 5] = [
        ConfigSection::Paths,
        ConfigSection::Logging,
        ConfigSection::Download,
        ConfigSection::ReadLabMetadata,
        ConfigSection::Validate,
    ];

    /// Get the TOML table name for this section.
    pub fn table_name(&self) -> &'static str {
        match self {
            ConfigSection::Paths => "paths",
            ConfigSection::Logging => "logging",
            ConfigSection::Download => "download",
            ConfigSection::ReadLabMetadata => "read_lab_metadata",
            ConfigSection::Validate => "validate",
        }
    }

    pub fn from_table_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.table_name() == name)
    }

    /// Keys accepted inside this table.
    pub fn known_keys(&self) -> &'static [&'static str] {
        match self {
            ConfigSection::Paths => &["output_folder", "template_folder", "logs_subfolder"],
            ConfigSection::Logging => &["level", "file_log"],
            ConfigSection::Download => &["remote_root", "target_folders", "output_location"],
            ConfigSection::ReadLabMetadata => &["program", "args", "timeout_secs"],
            ConfigSection::Validate => &["program", "args", "json_schema_file", "timeout_secs"],
        }
    }

    /// Whether the section configures a pipeline stage (required).
    pub fn is_stage(&self) -> bool {
        matches!(
            self,
            ConfigSection::Download | ConfigSection::ReadLabMetadata | ConfigSection::Validate
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_serializes() {
        let toml = toml::to_string_pretty(&Settings::default()).unwrap();
        assert!(toml.contains("[paths]"));
        assert!(toml.contains("[read_lab_metadata]"));
        assert!(toml.contains("output_folder"));
    }

    #[test]
    fn missing_fields_use_defaults() {
        let parsed: Settings =
            toml::from_str("[validate]\nprogram = \"my-validator\"").unwrap();
        assert_eq!(parsed.validate.program, "my-validator");
        assert_eq!(parsed.validate.args, vec!["validate"]);
        assert_eq!(parsed.validate.timeout(), Some(Duration::from_secs(600)));
        assert_eq!(parsed.logging.level, LogLevel::Info);
    }

    #[test]
    fn placeholders_resolve_to_output_folder() {
        let mut settings = Settings::default();
        settings.paths.output_folder = "/runs/today".to_string();
        settings.validate.args = vec!["validate".into(), "out_folder".into()];

        settings.resolve_placeholders();

        assert_eq!(settings.download.output_location, "/runs/today");
        assert_eq!(settings.validate.args[1], "/runs/today");
        assert_eq!(settings.validate.args[0], "validate");
    }

    #[test]
    fn zero_timeout_disables_limit() {
        let settings = ReadLabMetadataSettings {
            timeout_secs: 0,
            ..Default::default()
        };
        assert_eq!(settings.timeout(), None);
    }

    #[test]
    fn section_lookup_by_name() {
        assert_eq!(
            ConfigSection::from_table_name("read_lab_metadata"),
            Some(ConfigSection::ReadLabMetadata)
        );
        assert_eq!(ConfigSection::from_table_name("analysis"), None);
        assert!(ConfigSection::Validate.is_stage());
        assert!(!ConfigSection::Paths.is_stage());
    }
}
