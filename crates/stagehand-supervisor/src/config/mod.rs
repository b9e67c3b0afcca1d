use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use stagehand_common::GroupName;
use std::path::{Path, PathBuf};

pub mod validation;

/// String-keyed, JSON-like configuration values.
pub type PropertyMap = Map<String, Value>;

/// Top-level configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FleetConfig {
    #[serde(default)]
    pub supervisor: SupervisorOptions,
    #[serde(default)]
    pub groups: Vec<GroupConfig>,
}

/// Settings shared by every stage group supervisor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorOptions {
    /// Parent of every group's working directory
    #[serde(default = "default_base_directory")]
    pub base_directory: PathBuf,

    /// Host the launched process calls back to
    #[serde(default = "default_control_plane_host")]
    pub control_plane_host: String,

    #[serde(default = "default_control_plane_port")]
    pub control_plane_port: u16,

    #[serde(default)]
    pub performance_logging: bool,

    #[serde(default = "default_performance_logging_port")]
    pub performance_logging_port: u16,

    /// Passed verbatim as the last launch argument
    #[serde(default)]
    pub startup_args: String,

    /// Launcher parameters used until a group overrides them
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_runtime_parameters: Option<String>,

    /// Entry point identifier passed after the classpath
    #[serde(default = "default_entry_point")]
    pub entry_point: String,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            base_directory: default_base_directory(),
            control_plane_host: default_control_plane_host(),
            control_plane_port: default_control_plane_port(),
            performance_logging: false,
            performance_logging_port: default_performance_logging_port(),
            startup_args: String::new(),
            default_runtime_parameters: None,
            entry_point: default_entry_point(),
        }
    }
}

/// One stage group as written in the configuration file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupConfig {
    pub name: GroupName,

    /// Group-level properties (`java-location`, `jvm-parameters`, `retries`, ...)
    #[serde(default)]
    pub properties: PropertyMap,

    #[serde(default)]
    pub stages: Vec<StageConfig>,

    /// Local directory whose files are staged into the working directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifacts_directory: Option<PathBuf>,
}

/// One stage inside a group
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageConfig {
    pub name: String,
    #[serde(default)]
    pub properties: PropertyMap,
}

impl StageConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: PropertyMap::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

impl FleetConfig {
    /// Load configuration from a YAML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        Self::load_from_string(&content)
    }

    /// Load configuration from a YAML string
    pub fn load_from_string(content: &str) -> Result<Self> {
        let config: FleetConfig =
            serde_yaml::from_str(content).context("Failed to parse YAML configuration")?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        validation::validate_config(self)
    }
}

// Default value functions
fn default_base_directory() -> PathBuf {
    std::env::temp_dir().join("stagehand")
}

fn default_control_plane_host() -> String {
    "localhost".to_string()
}

fn default_control_plane_port() -> u16 {
    12001
}

fn default_performance_logging_port() -> u16 {
    12002
}

fn default_entry_point() -> String {
    "GroupStarter".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = FleetConfig::load_from_string("groups: []\n").unwrap();

        assert_eq!(config.supervisor.control_plane_host, "localhost");
        assert_eq!(config.supervisor.control_plane_port, 12001);
        assert!(!config.supervisor.performance_logging);
        assert_eq!(config.supervisor.startup_args, "");
        assert_eq!(config.supervisor.entry_point, "GroupStarter");
        assert!(config.supervisor.default_runtime_parameters.is_none());
    }

    #[test]
    fn test_full_config() {
        let yaml = r#"
supervisor:
  base_directory: /var/lib/stagehand
  control_plane_port: 14000
  performance_logging: true
  startup_args: "--verbose"
  default_runtime_parameters: "-Xmx512m"
groups:
  - name: ocr
    properties:
      retries: 2
      jvm-parameters: "-Xmx1g -Dmode=fast"
    artifacts_directory: /opt/stages/ocr
    stages:
      - name: tesseract
        properties:
          java-location: /usr/lib/jvm/bin/java
  - name: noop
"#;
        let config = FleetConfig::load_from_string(yaml).unwrap();

        assert_eq!(config.supervisor.base_directory, PathBuf::from("/var/lib/stagehand"));
        assert_eq!(config.supervisor.control_plane_port, 14000);
        assert_eq!(config.groups.len(), 2);

        let ocr = &config.groups[0];
        assert_eq!(ocr.name.as_str(), "ocr");
        assert_eq!(ocr.properties["retries"], Value::from(2));
        assert_eq!(ocr.stages[0].name, "tesseract");
        assert_eq!(ocr.artifacts_directory.as_deref(), Some(Path::new("/opt/stages/ocr")));

        assert!(config.groups[1].stages.is_empty());
    }

    #[test]
    fn test_invalid_group_name_is_rejected_at_parse() {
        let yaml = "groups:\n  - name: ../escape\n";
        let err = FleetConfig::load_from_string(yaml).unwrap_err();
        assert!(format!("{:#}", err).contains("escape"));
    }

    #[test]
    fn test_load_from_missing_file() {
        let err = FleetConfig::load_from_file("/nonexistent/stagehand.yaml").unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
