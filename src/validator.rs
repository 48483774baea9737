//! Batch validation engine
//!
//! Runs the secure reader over every discovered file on a rayon pool. Each document gets
//! its own reader built from the shared registry; the registry is compiled once up front
//! so a broken trusted schema stops the run before any document is looked at.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{ErrorKind, Result, ValidationError};
use crate::file_discovery::FileDiscovery;
use crate::reader::{InputSource, ReaderConfig, SecureReaderFactory};
use crate::resource::SchemaRegistry;

/// Engine settings
#[derive(Debug, Clone, PartialEq)]
pub struct EngineOptions {
    /// Number of worker threads
    pub threads: usize,
    /// Stop validation on first failure
    pub fail_fast: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            threads: num_cpus::get(),
            fail_fast: false,
        }
    }
}

/// Status of a single file validation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationStatus {
    /// File validated successfully
    Valid,
    /// The document was rejected: schema violations, a blocked reference, a DOCTYPE, or
    /// broken markup
    Invalid { error_count: usize },
    /// The file could not be validated at all
    Error { message: String },
    /// Not attempted, because an earlier file failed under fail-fast
    Skipped { reason: String },
}

impl ValidationStatus {
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationStatus::Valid)
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, ValidationStatus::Invalid { .. })
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ValidationStatus::Error { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, ValidationStatus::Skipped { .. })
    }
}

/// Result of validating a single file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileValidationResult {
    pub path: PathBuf,
    pub status: ValidationStatus,
    /// Category of the failure, if any
    pub error_kind: Option<ErrorKind>,
    pub duration: Duration,
    /// One entry per diagnostic, or the error message when there are none
    pub error_details: Vec<String>,
}

impl FileValidationResult {
    pub fn valid(path: PathBuf, duration: Duration) -> Self {
        Self {
            path,
            status: ValidationStatus::Valid,
            error_kind: None,
            duration,
            error_details: Vec::new(),
        }
    }

    /// Classify a reader failure: document failures are `Invalid`, everything else `Error`
    pub fn from_error(path: PathBuf, error: ValidationError, duration: Duration) -> Self {
        let mut error_details: Vec<String> =
            error.diagnostics().iter().map(ToString::to_string).collect();
        if error_details.is_empty() {
            error_details.push(error.to_string());
        }

        let status = if error.is_document_failure() {
            ValidationStatus::Invalid {
                error_count: error_details.len(),
            }
        } else {
            ValidationStatus::Error {
                message: error.to_string(),
            }
        };

        Self {
            path,
            status,
            error_kind: Some(error.kind()),
            duration,
            error_details,
        }
    }

    pub fn skipped(path: PathBuf, reason: String) -> Self {
        Self {
            path,
            status: ValidationStatus::Skipped {
                reason: reason.clone(),
            },
            error_kind: None,
            duration: Duration::ZERO,
            error_details: vec![reason],
        }
    }
}

/// Timing for a whole run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub total_duration: Duration,
    pub discovery_duration: Duration,
    pub validation_duration: Duration,
    pub average_time_per_file: Duration,
    pub throughput_files_per_second: f64,
    pub threads: usize,
}

/// Aggregated results of validating multiple files
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResults {
    pub total_files: usize,
    pub valid_files: usize,
    pub invalid_files: usize,
    pub error_files: usize,
    pub skipped_files: usize,
    /// Sum of per-file durations
    pub total_duration: Duration,
    pub average_duration: Duration,
    pub file_results: Vec<FileValidationResult>,
    /// Canonical ids of the trusted schemas in effect
    pub trusted_schemas: Vec<String>,
    pub performance_metrics: PerformanceMetrics,
}

impl ValidationResults {
    pub fn aggregate(file_results: Vec<FileValidationResult>) -> Self {
        let total_files = file_results.len();
        let mut valid_files = 0;
        let mut invalid_files = 0;
        let mut error_files = 0;
        let mut skipped_files = 0;
        let mut total_duration = Duration::ZERO;

        for result in &file_results {
            match result.status {
                ValidationStatus::Valid => valid_files += 1,
                ValidationStatus::Invalid { .. } => invalid_files += 1,
                ValidationStatus::Error { .. } => error_files += 1,
                ValidationStatus::Skipped { .. } => skipped_files += 1,
            }
            total_duration += result.duration;
        }

        let average_duration = if total_files > 0 {
            total_duration / total_files as u32
        } else {
            Duration::ZERO
        };

        Self {
            total_files,
            valid_files,
            invalid_files,
            error_files,
            skipped_files,
            total_duration,
            average_duration,
            file_results,
            trusted_schemas: Vec::new(),
            performance_metrics: PerformanceMetrics::default(),
        }
    }

    pub fn all_valid(&self) -> bool {
        self.valid_files == self.total_files && self.total_files > 0
    }

    /// Any file that was not valid, skipped files included
    pub fn has_errors(&self) -> bool {
        self.valid_files < self.total_files
    }

    /// Get success rate as a percentage
    pub fn success_rate(&self) -> f64 {
        if self.total_files == 0 {
            0.0
        } else {
            (self.valid_files as f64 / self.total_files as f64) * 100.0
        }
    }
}

/// Validates files in parallel against one trusted registry
pub struct ValidationEngine {
    factory: SecureReaderFactory,
    registry: Arc<SchemaRegistry>,
    pool: rayon::ThreadPool,
    options: EngineOptions,
}

impl ValidationEngine {
    /// Create an engine, compiling the registry once to surface schema problems early.
    ///
    /// # Errors
    ///
    /// Everything [`SecureReaderFactory::build`] can fail with, plus
    /// [`ValidationError::Config`] if the thread pool cannot be created.
    pub fn new(
        registry: SchemaRegistry,
        reader_config: ReaderConfig,
        options: EngineOptions,
    ) -> Result<Self> {
        let factory = SecureReaderFactory::new(reader_config);
        factory.build(&registry)?;

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(options.threads)
            .thread_name(|i| format!("xsd-guard-{}", i))
            .build()
            .map_err(|e| ValidationError::Config(format!("Failed to build thread pool: {}", e)))?;

        debug!(
            threads = options.threads,
            schemas = registry.len(),
            "validation engine ready"
        );

        Ok(Self {
            factory,
            registry: Arc::new(registry),
            pool,
            options,
        })
    }

    /// Discover files under `path` and validate them
    pub fn validate_path(
        &self,
        path: &Path,
        file_discovery: &FileDiscovery,
    ) -> Result<ValidationResults> {
        let workflow_start = Instant::now();

        let (files, stats) = file_discovery.discover_with_stats(path)?;
        let discovery_duration = workflow_start.elapsed();
        if stats.errors > 0 {
            warn!(errors = stats.errors, "some entries could not be read during discovery");
        }
        info!(files = files.len(), "discovered files");

        let validation_start = Instant::now();
        let file_results = self.validate_files(files);
        let validation_duration = validation_start.elapsed();

        let mut results = ValidationResults::aggregate(file_results);
        results.trusted_schemas = self
            .registry
            .iter()
            .map(|r| r.canonical_id().to_string())
            .collect();

        let total_duration = workflow_start.elapsed();
        results.performance_metrics = PerformanceMetrics {
            total_duration,
            discovery_duration,
            validation_duration,
            average_time_per_file: results.average_duration,
            throughput_files_per_second: if total_duration.as_secs_f64() > 0.0 {
                results.total_files as f64 / total_duration.as_secs_f64()
            } else {
                0.0
            },
            threads: self.options.threads,
        };

        Ok(results)
    }

    /// Validate files on the pool; results come back in input order
    pub fn validate_files(&self, files: Vec<PathBuf>) -> Vec<FileValidationResult> {
        let stop = AtomicBool::new(false);
        let fail_fast = self.options.fail_fast;

        self.pool.install(|| {
            files
                .into_par_iter()
                .map(|path| {
                    if fail_fast && stop.load(Ordering::SeqCst) {
                        return FileValidationResult::skipped(
                            path,
                            "not validated: an earlier file failed (fail-fast)".to_string(),
                        );
                    }
                    let result = self.validate_single_file(&path);
                    if fail_fast && !result.status.is_valid() {
                        stop.store(true, Ordering::SeqCst);
                    }
                    result
                })
                .collect()
        })
    }

    /// Validate one file with a freshly built reader
    pub fn validate_single_file(&self, path: &Path) -> FileValidationResult {
        let start = Instant::now();
        let outcome = InputSource::from_path(path).and_then(|input| {
            self.factory.build(&self.registry)?.parse(&input)
        });

        match outcome {
            Ok(()) => {
                debug!(path = %path.display(), "valid");
                FileValidationResult::valid(path.to_path_buf(), start.elapsed())
            }
            Err(error) => {
                debug!(path = %path.display(), error = %error, "validation failed");
                FileValidationResult::from_error(path.to_path_buf(), error, start.elapsed())
            }
        }
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }
}
