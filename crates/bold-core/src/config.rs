//! Configuration loading and typed config structures.
//!
//! The configuration lives in `bold-config.yaml`. Every section and field
//! has a default, so an empty file (or no file) yields a server on port
//! 8080 that runs the built-in control programs only.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

/// Environment variable overriding [`ServerConfig::port`].
pub const ENV_HTTP_PORT: &str = "BOLD_HTTP_PORT";

/// Environment variable overriding [`SimulationConfig::output_dir`].
pub const ENV_OUTPUT_DIR: &str = "BOLD_OUTPUT_DIR";

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file or list a directory.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// An environment override has an invalid value.
    #[error("invalid value {value:?} for {variable}")]
    InvalidOverride {
        /// The environment variable.
        variable: &'static str,
        /// The rejected value.
        value: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level configuration, mirroring `bold-config.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct BoldConfig {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Experiment settings.
    #[serde(default)]
    pub simulation: SimulationConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl BoldConfig {
    /// Load configuration from a YAML file, then apply environment
    /// overrides (`BOLD_HTTP_PORT`, `BOLD_OUTPUT_DIR`).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if the content is not valid YAML, or
    /// [`ConfigError::InvalidOverride`] if an override is malformed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config = Self::parse(&contents)?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Parse configuration from a YAML string. No overrides are applied.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yml::from_str(yaml)?)
    }

    /// Apply overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(
            std::env::var(ENV_HTTP_PORT).ok(),
            std::env::var(ENV_OUTPUT_DIR).ok(),
        )
    }

    /// Apply explicit override values, as read from the environment.
    pub fn apply_overrides(
        &mut self,
        port: Option<String>,
        output_dir: Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(value) = port {
            let parsed = value.trim().parse::<u16>();
            self.server.port = parsed.map_err(|_invalid| ConfigError::InvalidOverride {
                variable: ENV_HTTP_PORT,
                value,
            })?;
        }
        if let Some(value) = output_dir {
            self.simulation.output_dir = PathBuf::from(value);
        }
        Ok(())
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerConfig {
    /// Interface to bind.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Base IRI of graph resources. Defaults to `http://localhost:<port>`.
    #[serde(default)]
    pub base_uri: Option<String>,
}

impl ServerConfig {
    /// The effective base IRI, without a trailing slash.
    pub fn base_uri(&self) -> String {
        self.base_uri.as_ref().map_or_else(
            || format!("http://localhost:{}", self.port),
            |uri| uri.trim_end_matches('/').to_owned(),
        )
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            base_uri: None,
        }
    }
}

/// Experiment configuration: programs, datasets, timing and outputs.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SimulationConfig {
    /// Real-time milliseconds per slot.
    #[serde(default = "default_timeslot_ms")]
    pub timeslot_ms: u64,

    /// Dataset files (or directories) loaded at initialization.
    #[serde(default)]
    pub datasets: Vec<PathBuf>,

    /// Single update program files (or directories).
    #[serde(default)]
    pub init_updates: Vec<PathBuf>,

    /// Continuous update program files (or directories).
    #[serde(default)]
    pub continuous_updates: Vec<PathBuf>,

    /// Query program files (or directories).
    #[serde(default)]
    pub queries: Vec<PathBuf>,

    /// Optional termination predicate file replacing the built-in one.
    #[serde(default)]
    pub termination_predicate: Option<PathBuf>,

    /// Optional dump pattern; `%d` is replaced by the slot index.
    #[serde(default)]
    pub dump_pattern: Option<String>,

    /// Directory receiving one `run-<n>` directory per run.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

impl SimulationConfig {
    /// The slot period.
    pub const fn timeslot(&self) -> Duration {
        Duration::from_millis(self.timeslot_ms)
    }

    /// Whether any program source file is configured.
    pub fn has_program_sources(&self) -> bool {
        !self.init_updates.is_empty()
            || !self.continuous_updates.is_empty()
            || !self.queries.is_empty()
            || self.termination_predicate.is_some()
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            timeslot_ms: default_timeslot_ms(),
            datasets: Vec::new(),
            init_updates: Vec::new(),
            continuous_updates: Vec::new(),
            queries: Vec::new(),
            termination_predicate: None,
            dump_pattern: None,
            output_dir: default_output_dir(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format: `text` or `json`.
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl LoggingConfig {
    /// Whether JSON output was requested.
    pub fn json(&self) -> bool {
        self.format.eq_ignore_ascii_case("json")
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Expand a file list: files are kept, directories are replaced by the
/// regular files they contain, sorted by name. Order is otherwise kept.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] if an entry cannot be inspected.
pub fn expand_paths(entries: &[PathBuf]) -> Result<Vec<PathBuf>, ConfigError> {
    let mut files = Vec::new();
    for entry in entries {
        if entry.is_dir() {
            let mut children = Vec::new();
            for child in std::fs::read_dir(entry)? {
                let path = child?.path();
                if path.is_file() {
                    children.push(path);
                }
            }
            children.sort();
            files.extend(children);
        } else {
            files.push(entry.clone());
        }
    }
    Ok(files)
}

// ---------------------------------------------------------------------------
// Default value functions for serde
// ---------------------------------------------------------------------------

fn default_host() -> String {
    String::from("0.0.0.0")
}

const fn default_port() -> u16 {
    8080
}

const fn default_timeslot_ms() -> u64 {
    1000
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("results")
}

fn default_log_level() -> String {
    String::from("info")
}

fn default_log_format() -> String {
    String::from("text")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = BoldConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.base_uri(), "http://localhost:8080");
        assert_eq!(config.simulation.timeslot(), Duration::from_secs(1));
        assert_eq!(config.simulation.output_dir, PathBuf::from("results"));
        assert!(!config.simulation.has_program_sources());
        assert!(!config.logging.json());
    }

    #[test]
    fn empty_yaml_gives_defaults() {
        assert_eq!(BoldConfig::parse("").unwrap(), BoldConfig::default());
    }

    #[test]
    fn parse_full_yaml() {
        let yaml = r#"
server:
  host: "127.0.0.1"
  port: 9090
  base_uri: "http://example.org/"

simulation:
  timeslot_ms: 100
  datasets:
    - data/building.nq
  continuous_updates:
    - updates/
  queries:
    - queries/occupancy.rq
  dump_pattern: "dumps/state-%d.nq"
  output_dir: "out"

logging:
  level: "debug"
  format: "json"
"#;
        let config = BoldConfig::parse(yaml).unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.base_uri(), "http://example.org");
        assert_eq!(config.simulation.timeslot_ms, 100);
        assert_eq!(config.simulation.datasets, vec![PathBuf::from("data/building.nq")]);
        assert_eq!(config.simulation.dump_pattern.as_deref(), Some("dumps/state-%d.nq"));
        assert!(config.simulation.has_program_sources());
        assert!(config.logging.json());
    }

    #[test]
    fn partial_yaml_fills_defaults() {
        let config = BoldConfig::parse("simulation:\n  timeslot_ms: 250\n").unwrap();
        assert_eq!(config.simulation.timeslot_ms, 250);
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn invalid_yaml_returns_error() {
        assert!(matches!(
            BoldConfig::parse("server: [not, a, map"),
            Err(ConfigError::Yaml { .. })
        ));
    }

    #[test]
    fn overrides_replace_port_and_output_dir() {
        let mut config = BoldConfig::default();
        config
            .apply_overrides(Some(String::from("3000")), Some(String::from("/tmp/bold")))
            .unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.simulation.output_dir, PathBuf::from("/tmp/bold"));

        let err = config
            .apply_overrides(Some(String::from("http")), None)
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidOverride { variable: ENV_HTTP_PORT, .. }));
    }

    #[test]
    fn directories_expand_to_sorted_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.ru"), "").unwrap();
        std::fs::write(dir.path().join("a.ru"), "").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        let single = PathBuf::from("z.ru");

        let files = expand_paths(&[single.clone(), dir.path().to_path_buf()]).unwrap();
        assert_eq!(
            files,
            vec![single, dir.path().join("a.ru"), dir.path().join("b.ru")]
        );
    }
}
