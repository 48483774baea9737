use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

/// Verbosity levels for output
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum VerbosityLevel {
    /// Only show failures
    Quiet,
    /// Show standard information
    #[default]
    Normal,
    /// Show every file and every diagnostic
    Verbose,
}

impl VerbosityLevel {
    pub fn from_flags(verbose: bool, quiet: bool) -> Self {
        if quiet {
            VerbosityLevel::Quiet
        } else if verbose {
            VerbosityLevel::Verbose
        } else {
            VerbosityLevel::Normal
        }
    }
}

/// Report format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Human,
    Json,
    Summary,
}

/// `--schema` value: `<CANONICAL_ID>=<FILE>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaArg {
    pub canonical_id: String,
    pub path: PathBuf,
}

impl FromStr for SchemaArg {
    type Err = String;

    /// Splits at the last `=`, so canonical ids may carry query strings
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (canonical_id, path) = s
            .rsplit_once('=')
            .ok_or_else(|| format!("expected <CANONICAL_ID>=<FILE>, got '{}'", s))?;
        let canonical_id = canonical_id.trim();
        let path = path.trim();
        if canonical_id.is_empty() || path.is_empty() {
            return Err(format!("expected <CANONICAL_ID>=<FILE>, got '{}'", s));
        }
        Ok(Self {
            canonical_id: canonical_id.to_string(),
            path: PathBuf::from(path),
        })
    }
}

/// Hardened XML Schema validation against trusted, locally supplied schemas
#[derive(Parser, Debug, Clone)]
#[command(name = "xsd-guard")]
#[command(
    about = "Validate XML documents against trusted schemas without fetching anything the documents point at"
)]
#[command(version)]
pub struct Cli {
    /// Path to scan for XML files (directory or file)
    #[arg(help = "Directory or file to validate")]
    pub path: PathBuf,

    /// Trusted schema, repeatable
    #[arg(
        short = 's',
        long = "schema",
        value_name = "CANONICAL_ID=FILE",
        action = clap::ArgAction::Append
    )]
    pub schemas: Vec<SchemaArg>,

    /// accessExternalSchema value for references no trusted schema covers
    #[arg(
        long = "access-external-schema",
        value_name = "POLICY",
        help = "Schemes the engine may fetch itself: '' (none, default), 'all', or e.g. 'file,https'"
    )]
    pub access_external_schema: Option<String>,

    /// Configuration file (TOML or JSON)
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// File extensions to process (comma-separated)
    #[arg(
        short = 'e',
        long = "extensions",
        help = "File extensions to process (e.g., 'xml,cmdi')"
    )]
    pub extensions: Option<String>,

    /// Include file patterns (glob syntax)
    #[arg(long = "include", action = clap::ArgAction::Append)]
    pub include_patterns: Vec<String>,

    /// Exclude file patterns (glob syntax)
    #[arg(long = "exclude", action = clap::ArgAction::Append)]
    pub exclude_patterns: Vec<String>,

    /// Maximum directory depth
    #[arg(long = "max-depth")]
    pub max_depth: Option<usize>,

    /// Number of concurrent validation threads
    #[arg(
        short = 't',
        long = "threads",
        help = "Number of concurrent validation threads"
    )]
    pub threads: Option<usize>,

    /// Fail fast on first validation error
    #[arg(long = "fail-fast")]
    pub fail_fast: bool,

    /// Report format
    #[arg(short = 'f', long = "format", value_enum)]
    pub format: Option<OutputFormat>,

    /// Enable verbose output
    #[arg(short = 'v', long = "verbose", help = "Enable verbose output")]
    pub verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(
        short = 'q',
        long = "quiet",
        help = "Quiet mode",
        conflicts_with = "verbose"
    )]
    pub quiet: bool,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Extensions given on the command line, if any
    pub fn get_extensions(&self) -> Option<Vec<String>> {
        self.extensions.as_ref().map(|extensions| {
            extensions
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
    }

    pub fn validate(&self) -> Result<(), String> {
        if !self.path.exists() {
            return Err(format!("Path does not exist: {}", self.path.display()));
        }
        if let Some(threads) = self.threads
            && threads == 0
        {
            return Err("Number of threads must be greater than 0".to_string());
        }
        for schema in &self.schemas {
            if !schema.path.is_file() {
                return Err(format!(
                    "Schema file does not exist: {} (for {})",
                    schema.path.display(),
                    schema.canonical_id
                ));
            }
        }
        Ok(())
    }

    pub fn verbosity(&self) -> VerbosityLevel {
        VerbosityLevel::from_flags(self.verbose, self.quiet)
    }
}
