use crate::access::{AccessPolicy, InvalidAccessPolicy};
use crate::cli::{Cli, OutputFormat};
use crate::reader::ReaderConfig;
use crate::resource::{SchemaRegistry, TrustedResource};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Trait for abstracting environment variable access
pub trait EnvProvider {
    fn get(&self, key: &str) -> Option<String>;
}

/// System environment variable provider for production use
pub struct SystemEnvProvider;

impl EnvProvider for SystemEnvProvider {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParsing(#[from] toml::de::Error),

    #[error("JSON parsing error: {0}")]
    JsonParsing(#[from] serde_json::Error),

    #[error("Configuration validation error: {0}")]
    Validation(String),

    #[error("Environment variable error: {0}")]
    Environment(String),

    #[error("Unsupported configuration file format: {0}")]
    UnsupportedFormat(String),

    #[error(transparent)]
    AccessPolicy(#[from] InvalidAccessPolicy),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub security: SecurityConfig,
    pub schemas: Vec<SchemaEntry>,
    pub validation: ValidationConfig,
    pub output: OutputConfig,
    pub files: FileConfig,
}

/// External access settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct SecurityConfig {
    /// Value of the accessExternalSchema property; empty means no access
    pub access_external_schema: AccessPolicy,
}

/// One trusted schema: the id documents refer to it by, and where its bytes live
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SchemaEntry {
    pub canonical_id: String,
    pub path: PathBuf,
}

/// Validation-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct ValidationConfig {
    /// Number of concurrent validation threads
    pub threads: Option<usize>,
    /// Stop validation on first error
    pub fail_fast: bool,
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OutputConfig {
    pub format: OutputFormat,
    pub verbose: bool,
    /// Errors only
    pub quiet: bool,
}

/// File processing configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FileConfig {
    /// File extensions to process
    pub extensions: Vec<String>,
    /// Include patterns (glob syntax)
    pub include_patterns: Vec<String>,
    /// Exclude patterns (glob syntax)
    pub exclude_patterns: Vec<String>,
    pub max_depth: Option<usize>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::Human,
            verbose: false,
            quiet: false,
        }
    }
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            extensions: vec!["xml".to_string()],
            include_patterns: vec![],
            exclude_patterns: vec![],
            max_depth: None,
        }
    }
}

impl Config {
    pub fn reader_config(&self) -> ReaderConfig {
        ReaderConfig {
            access_external_schema: self.security.access_external_schema.clone(),
        }
    }

    /// Read every configured schema into memory, in configuration order
    pub fn schema_registry(&self) -> crate::error::Result<SchemaRegistry> {
        let mut resources = Vec::with_capacity(self.schemas.len());
        for entry in &self.schemas {
            resources.push(TrustedResource::from_path(&entry.canonical_id, &entry.path)?);
        }
        Ok(SchemaRegistry::new(resources))
    }
}

const CONFIG_NAMES: [&str; 4] = [
    "xsd-guard.toml",
    "xsd-guard.json",
    ".xsd-guard.toml",
    ".xsd-guard.json",
];

/// Configuration manager for loading and merging configurations
pub struct ConfigManager;

impl ConfigManager {
    /// Load configuration with precedence: file -> environment -> CLI
    pub fn load_config(cli: &Cli) -> Result<Config> {
        Self::load_config_with(&SystemEnvProvider, cli)
    }

    pub fn load_config_with(env: &impl EnvProvider, cli: &Cli) -> Result<Config> {
        let mut config = Config::default();

        if let Some(config_path) = &cli.config {
            let file_config = Self::load_from_file(config_path)?;
            config = Self::merge_configs(config, file_config);
        } else if let Some(found_config) = Self::find_config_file()? {
            config = Self::merge_configs(config, found_config);
        }

        config = Self::apply_environment_overrides_with(env, config)?;
        config = Self::merge_with_cli(config, cli)?;
        Self::validate_config(&config)?;

        Ok(config)
    }

    /// Load configuration from a file (TOML or JSON).
    ///
    /// Relative schema paths are taken relative to the file's directory.
    pub fn load_from_file(path: &Path) -> Result<Config> {
        let content = std::fs::read_to_string(path)?;

        let mut config: Config = match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => toml::from_str(&content)?,
            Some("json") => serde_json::from_str(&content)?,
            Some(ext) => return Err(ConfigError::UnsupportedFormat(ext.to_string())),
            None => match toml::from_str::<Config>(&content) {
                Ok(config) => config,
                Err(_) => serde_json::from_str(&content)?,
            },
        };

        if let Some(base) = path.parent() {
            for entry in &mut config.schemas {
                if entry.path.is_relative() {
                    entry.path = base.join(&entry.path);
                }
            }
        }

        Ok(config)
    }

    /// Find configuration file in standard locations
    pub fn find_config_file() -> Result<Option<Config>> {
        for name in &CONFIG_NAMES {
            let path = PathBuf::from(name);
            if path.exists() {
                return Ok(Some(Self::load_from_file(&path)?));
            }
        }

        if let Some(config_dir) = dirs::config_dir() {
            let app_config_dir = config_dir.join("xsd-guard");
            for name in &CONFIG_NAMES {
                let path = app_config_dir.join(name);
                if path.exists() {
                    return Ok(Some(Self::load_from_file(&path)?));
                }
            }
        }

        Ok(None)
    }

    /// Apply environment variable overrides using the system environment
    pub fn apply_environment_overrides(config: Config) -> Result<Config> {
        Self::apply_environment_overrides_with(&SystemEnvProvider, config)
    }

    /// Apply environment variable overrides with a custom environment provider
    pub fn apply_environment_overrides_with(
        env: &impl EnvProvider,
        mut config: Config,
    ) -> Result<Config> {
        if let Some(policy) = env.get("XSD_GUARD_ACCESS_EXTERNAL_SCHEMA") {
            config.security.access_external_schema = AccessPolicy::parse(&policy)?;
        }

        if let Some(threads) = env.get("XSD_GUARD_THREADS") {
            config.validation.threads = Some(threads.parse().map_err(|_| {
                ConfigError::Environment(format!("Invalid XSD_GUARD_THREADS value: {}", threads))
            })?);
        }

        if let Some(fail_fast) = env.get("XSD_GUARD_FAIL_FAST") {
            config.validation.fail_fast = fail_fast.parse().map_err(|_| {
                ConfigError::Environment(format!("Invalid XSD_GUARD_FAIL_FAST value: {}", fail_fast))
            })?;
        }

        if let Some(verbose) = env.get("XSD_GUARD_VERBOSE") {
            config.output.verbose = verbose.parse().map_err(|_| {
                ConfigError::Environment(format!("Invalid XSD_GUARD_VERBOSE value: {}", verbose))
            })?;
        }

        if let Some(quiet) = env.get("XSD_GUARD_QUIET") {
            config.output.quiet = quiet.parse().map_err(|_| {
                ConfigError::Environment(format!("Invalid XSD_GUARD_QUIET value: {}", quiet))
            })?;
        }

        if let Some(format) = env.get("XSD_GUARD_FORMAT") {
            config.output.format = match format.to_lowercase().as_str() {
                "human" => OutputFormat::Human,
                "json" => OutputFormat::Json,
                "summary" => OutputFormat::Summary,
                _ => {
                    return Err(ConfigError::Environment(format!(
                        "Invalid XSD_GUARD_FORMAT value: {}",
                        format
                    )));
                }
            };
        }

        if let Some(extensions) = env.get("XSD_GUARD_EXTENSIONS") {
            config.files.extensions = split_list(&extensions);
        }

        Ok(config)
    }

    /// Merge CLI arguments with configuration (CLI takes precedence)
    pub fn merge_with_cli(mut config: Config, cli: &Cli) -> Result<Config> {
        if let Some(policy) = &cli.access_external_schema {
            config.security.access_external_schema = AccessPolicy::parse(policy)?;
        }
        config.schemas.extend(cli.schemas.iter().map(|arg| SchemaEntry {
            canonical_id: arg.canonical_id.clone(),
            path: arg.path.clone(),
        }));

        if cli.threads.is_some() {
            config.validation.threads = cli.threads;
        }
        if cli.fail_fast {
            config.validation.fail_fast = true;
        }

        if let Some(format) = cli.format {
            config.output.format = format;
        }
        if cli.verbose {
            config.output.verbose = true;
            config.output.quiet = false;
        }
        if cli.quiet {
            config.output.quiet = true;
            config.output.verbose = false;
        }

        if let Some(extensions) = cli.get_extensions() {
            config.files.extensions = extensions;
        }
        if !cli.include_patterns.is_empty() {
            config.files.include_patterns = cli.include_patterns.clone();
        }
        if !cli.exclude_patterns.is_empty() {
            config.files.exclude_patterns = cli.exclude_patterns.clone();
        }
        if cli.max_depth.is_some() {
            config.files.max_depth = cli.max_depth;
        }

        Ok(config)
    }

    /// Merge two configurations (second takes precedence for non-empty values)
    pub fn merge_configs(mut base: Config, override_config: Config) -> Config {
        if !override_config.security.access_external_schema.is_deny() {
            base.security.access_external_schema = override_config.security.access_external_schema;
        }
        base.schemas.extend(override_config.schemas);

        if override_config.validation.threads.is_some() {
            base.validation.threads = override_config.validation.threads;
        }
        base.validation.fail_fast = override_config.validation.fail_fast;

        base.output = override_config.output;

        if !override_config.files.extensions.is_empty() {
            base.files.extensions = override_config.files.extensions;
        }
        if !override_config.files.include_patterns.is_empty() {
            base.files.include_patterns = override_config.files.include_patterns;
        }
        if !override_config.files.exclude_patterns.is_empty() {
            base.files.exclude_patterns = override_config.files.exclude_patterns;
        }
        if override_config.files.max_depth.is_some() {
            base.files.max_depth = override_config.files.max_depth;
        }

        base
    }

    /// Validate configuration values
    pub fn validate_config(config: &Config) -> Result<()> {
        if let Some(threads) = config.validation.threads {
            if threads == 0 {
                return Err(ConfigError::Validation(
                    "Number of threads must be greater than 0".to_string(),
                ));
            }
            if threads > 1000 {
                return Err(ConfigError::Validation(
                    "Number of threads cannot exceed 1000".to_string(),
                ));
            }
        }

        if config.output.verbose && config.output.quiet {
            return Err(ConfigError::Validation(
                "Cannot enable both verbose and quiet modes".to_string(),
            ));
        }

        if config.files.extensions.is_empty() {
            return Err(ConfigError::Validation(
                "At least one file extension must be specified".to_string(),
            ));
        }
        for ext in &config.files.extensions {
            if ext.contains('/') || ext.contains('\\') || ext.contains('.') {
                return Err(ConfigError::Validation(format!(
                    "Invalid file extension: {}",
                    ext
                )));
            }
        }

        for entry in &config.schemas {
            if entry.canonical_id.trim().is_empty() {
                return Err(ConfigError::Validation(format!(
                    "Schema {} has an empty canonical id",
                    entry.path.display()
                )));
            }
        }

        Ok(())
    }

    /// Get the effective thread count
    pub fn get_thread_count(config: &Config) -> usize {
        config.validation.threads.unwrap_or_else(num_cpus::get)
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::collections::HashMap;
    use std::fs;
    use tempfile::TempDir;

    /// Mock environment variable provider for testing
    #[derive(Default)]
    struct MockEnvProvider {
        vars: HashMap<String, String>,
    }

    impl MockEnvProvider {
        fn new() -> Self {
            Self {
                vars: HashMap::new(),
            }
        }

        fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
            self.vars.insert(key.into(), value.into());
        }
    }

    impl EnvProvider for MockEnvProvider {
        fn get(&self, key: &str) -> Option<String> {
            self.vars.get(key).cloned()
        }
    }

    fn cli(args: &[&str]) -> Cli {
        let mut argv = vec!["xsd-guard"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert!(config.security.access_external_schema.is_deny());
        assert!(config.schemas.is_empty());
        assert_eq!(config.validation.threads, None);
        assert!(!config.validation.fail_fast);
        assert_eq!(config.output.format, OutputFormat::Human);
        assert_eq!(config.files.extensions, vec!["xml"]);
        assert!(config.reader_config().access_external_schema.is_deny());
    }

    #[test]
    fn test_load_toml_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");

        let toml_content = r#"
[security]
access_external_schema = "file,https"

[[schemas]]
canonical_id = "https://dependency-check.github.io/DependencyCheck/simple.xsd"
path = "schemas/simple.xsd"

[[schemas]]
canonical_id = "https://example.com/other.xsd"
path = "/opt/schemas/other.xsd"

[validation]
threads = 8
fail_fast = true

[output]
format = "json"
verbose = true

[files]
extensions = ["xml", "cmdi"]
exclude_patterns = ["*.bak"]
"#;
        fs::write(&config_path, toml_content).unwrap();

        let config = ConfigManager::load_from_file(&config_path).unwrap();

        assert!(config.security.access_external_schema.permits("https"));
        assert!(!config.security.access_external_schema.permits("http"));
        assert_eq!(config.schemas.len(), 2);
        assert_eq!(
            config.schemas[0].path,
            temp_dir.path().join("schemas/simple.xsd")
        );
        assert_eq!(config.schemas[1].path, PathBuf::from("/opt/schemas/other.xsd"));
        assert_eq!(config.validation.threads, Some(8));
        assert!(config.validation.fail_fast);
        assert_eq!(config.output.format, OutputFormat::Json);
        assert!(!config.output.quiet);
        assert_eq!(config.files.extensions, vec!["xml", "cmdi"]);
        assert!(config.files.include_patterns.is_empty());
    }

    #[test]
    fn test_load_json_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.json");

        let json_content = r#"{
  "schemas": [{ "canonical_id": "urn:a", "path": "a.xsd" }],
  "output": { "format": "summary", "quiet": true }
}"#;
        fs::write(&config_path, json_content).unwrap();

        let config = ConfigManager::load_from_file(&config_path).unwrap();
        assert!(config.security.access_external_schema.is_deny());
        assert_eq!(config.schemas[0].canonical_id, "urn:a");
        assert_eq!(config.output.format, OutputFormat::Summary);
        assert!(config.output.quiet);
    }

    #[test]
    fn test_unsupported_file_format() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");
        fs::write(&config_path, "invalid: yaml").unwrap();

        match ConfigManager::load_from_file(&config_path).unwrap_err() {
            ConfigError::UnsupportedFormat(ext) => assert_eq!(ext, "yaml"),
            other => panic!("Expected UnsupportedFormat error, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        fs::write(&config_path, "invalid toml [[[").unwrap();

        let result = ConfigManager::load_from_file(&config_path);
        assert!(matches!(result.unwrap_err(), ConfigError::TomlParsing(_)));
    }

    #[test]
    fn test_invalid_access_policy_in_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        fs::write(
            &config_path,
            "[security]\naccess_external_schema = \"file,all\"\n",
        )
        .unwrap();

        assert!(ConfigManager::load_from_file(&config_path).is_err());
    }

    #[test]
    fn test_environment_overrides() {
        let mut env = MockEnvProvider::new();
        env.set("XSD_GUARD_ACCESS_EXTERNAL_SCHEMA", "all");
        env.set("XSD_GUARD_THREADS", "3");
        env.set("XSD_GUARD_FAIL_FAST", "true");
        env.set("XSD_GUARD_FORMAT", "JSON");
        env.set("XSD_GUARD_EXTENSIONS", "xml, cmdi ,");

        let config =
            ConfigManager::apply_environment_overrides_with(&env, Config::default()).unwrap();

        assert_eq!(config.security.access_external_schema, AccessPolicy::All);
        assert_eq!(config.validation.threads, Some(3));
        assert!(config.validation.fail_fast);
        assert_eq!(config.output.format, OutputFormat::Json);
        assert_eq!(config.files.extensions, vec!["xml", "cmdi"]);
    }

    #[test]
    fn test_invalid_environment_values() {
        let mut env = MockEnvProvider::new();
        env.set("XSD_GUARD_THREADS", "many");
        assert!(matches!(
            ConfigManager::apply_environment_overrides_with(&env, Config::default()),
            Err(ConfigError::Environment(_))
        ));

        let mut env = MockEnvProvider::new();
        env.set("XSD_GUARD_ACCESS_EXTERNAL_SCHEMA", "ht tp");
        assert!(matches!(
            ConfigManager::apply_environment_overrides_with(&env, Config::default()),
            Err(ConfigError::AccessPolicy(_))
        ));
    }

    #[test]
    fn test_cli_takes_precedence_over_environment() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("xsd-guard.toml");
        fs::write(&config_path, "[validation]\nthreads = 2\n").unwrap();

        let mut env = MockEnvProvider::new();
        env.set("XSD_GUARD_ACCESS_EXTERNAL_SCHEMA", "all");
        env.set("XSD_GUARD_THREADS", "4");

        let cli = cli(&[
            "--config",
            config_path.to_str().unwrap(),
            "--access-external-schema",
            "",
            "--schema",
            "https://example.com/a.xsd=a.xsd",
            "--threads",
            "6",
            "docs",
        ]);
        let config = ConfigManager::load_config_with(&env, &cli).unwrap();

        assert!(config.security.access_external_schema.is_deny());
        assert_eq!(config.validation.threads, Some(6));
        assert_eq!(config.schemas.len(), 1);
        assert_eq!(config.schemas[0].canonical_id, "https://example.com/a.xsd");
    }

    #[test]
    fn test_validate_config_rejections() {
        let mut config = Config::default();
        config.validation.threads = Some(0);
        assert!(ConfigManager::validate_config(&config).is_err());

        let mut config = Config::default();
        config.output.verbose = true;
        config.output.quiet = true;
        assert!(ConfigManager::validate_config(&config).is_err());

        let mut config = Config::default();
        config.files.extensions.clear();
        assert!(ConfigManager::validate_config(&config).is_err());

        let mut config = Config::default();
        config.files.extensions = vec![".xml".to_string()];
        assert!(ConfigManager::validate_config(&config).is_err());

        let mut config = Config::default();
        config.schemas.push(SchemaEntry {
            canonical_id: " ".to_string(),
            path: PathBuf::from("a.xsd"),
        });
        assert!(ConfigManager::validate_config(&config).is_err());
    }

    #[test]
    fn test_schema_registry_reads_files_in_order() {
        let temp_dir = TempDir::new().unwrap();
        let a = temp_dir.path().join("a.xsd");
        let b = temp_dir.path().join("b.xsd");
        fs::write(&a, "A").unwrap();
        fs::write(&b, "B").unwrap();

        let mut config = Config::default();
        config.schemas = vec![
            SchemaEntry {
                canonical_id: "urn:b".to_string(),
                path: b,
            },
            SchemaEntry {
                canonical_id: "urn:a".to_string(),
                path: a,
            },
        ];

        let registry = config.schema_registry().unwrap();
        let contents: Vec<_> = registry.iter().map(|r| r.content().to_vec()).collect();
        assert_eq!(contents, vec![b"B".to_vec(), b"A".to_vec()]);

        config.schemas[0].path = temp_dir.path().join("missing.xsd");
        assert!(config.schema_registry().is_err());
    }
}
