//! # xsd-guard
//!
//! Hardened XML Schema validation. Documents are checked against a registry of trusted
//! schemas held in memory; schema references are answered from that registry first, and
//! anything it does not cover is refused unless the `accessExternalSchema` policy allows
//! the scheme. DOCTYPE declarations are rejected outright.

pub mod access;
pub mod cli;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod file_discovery;
pub mod libxml2;
pub mod output;
pub mod reader;
pub mod resolver;
pub mod resource;
pub mod scanner;
pub mod validator;

pub use access::{ACCESS_EXTERNAL_SCHEMA, AccessPolicy, InvalidAccessPolicy};
pub use cli::{Cli, OutputFormat, VerbosityLevel};
pub use config::{Config, ConfigManager};
pub use diagnostics::{Diagnostic, Severity};
pub use error::{ErrorKind, ValidationError};
pub use file_discovery::{DiscoveryStats, FileDiscovery};
pub use output::Output;
pub use reader::{
    InputSource, ReaderConfig, SecureReader, SecureReaderFactory, validate_document,
};
pub use resolver::{EntityResolver, InterceptingResolver, Resolution, ResolutionRequest};
pub use resource::{SchemaRegistry, TrustedResource};
pub use validator::{
    EngineOptions, FileValidationResult, PerformanceMetrics, ValidationEngine, ValidationResults,
    ValidationStatus,
};
