//! Output and reporting
//!
//! Renders validation results as human-readable text, a one-line summary, or JSON.

use std::fmt::Write as _;
use std::time::Duration;

use serde::Serialize;

use crate::cli::{OutputFormat, VerbosityLevel};
use crate::validator::{
    FileValidationResult, PerformanceMetrics, ValidationResults, ValidationStatus,
};

/// Output formatter for validation results
pub struct Output {
    verbosity: VerbosityLevel,
    format: OutputFormat,
    show_colors: bool,
}

impl Output {
    pub fn new(verbosity: VerbosityLevel, format: OutputFormat) -> Self {
        Self {
            verbosity,
            format,
            show_colors: format == OutputFormat::Human && atty::is(atty::Stream::Stdout),
        }
    }

    pub fn with_colors(mut self, show_colors: bool) -> Self {
        self.show_colors = show_colors;
        self
    }

    fn colorize(&self, text: &str, color: &str) -> String {
        if self.show_colors {
            format!("\x1b[{}m{}\x1b[0m", color, text)
        } else {
            text.to_string()
        }
    }

    pub fn format_results(&self, results: &ValidationResults) -> String {
        match self.format {
            OutputFormat::Human => self.format_human(results),
            OutputFormat::Summary => self.format_one_line(results),
            OutputFormat::Json => format_json(results),
        }
    }

    fn format_human(&self, results: &ValidationResults) -> String {
        let mut output = String::new();

        match self.verbosity {
            VerbosityLevel::Quiet => {
                for file_result in results.file_results.iter().filter(|r| !r.status.is_valid()) {
                    output.push_str(&self.format_file_result(file_result));
                    output.push('\n');
                }
            }
            VerbosityLevel::Normal | VerbosityLevel::Verbose => {
                for file_result in &results.file_results {
                    if self.verbosity == VerbosityLevel::Verbose || !file_result.status.is_valid()
                    {
                        output.push_str(&self.format_file_result(file_result));
                        output.push('\n');
                    }
                }
                if !results.file_results.is_empty() {
                    output.push('\n');
                }
                output.push_str(&self.format_summary(results));
            }
        }

        output
    }

    pub fn format_file_result(&self, result: &FileValidationResult) -> String {
        let path_display = result.path.display();
        let duration_str = format_duration(result.duration);

        match &result.status {
            ValidationStatus::Valid => {
                format!(
                    "{}  {} ({})",
                    self.colorize("✓ VALID", "32"),
                    path_display,
                    duration_str
                )
            }
            ValidationStatus::Invalid { error_count } => {
                let mut output = format!(
                    "{}  {} ({}) - {} error{}",
                    self.colorize("✗ INVALID", "31"),
                    path_display,
                    duration_str,
                    error_count,
                    if *error_count == 1 { "" } else { "s" }
                );
                for error_detail in &result.error_details {
                    let _ = write!(output, "\n    {}", error_detail);
                }
                output
            }
            ValidationStatus::Error { message } => {
                format!(
                    "{}  {} ({}) - {}",
                    self.colorize("⚠ ERROR", "33"),
                    path_display,
                    duration_str,
                    message
                )
            }
            ValidationStatus::Skipped { reason } => {
                format!(
                    "{}  {} - {}",
                    self.colorize("- SKIPPED", "36"),
                    path_display,
                    reason
                )
            }
        }
    }

    fn format_summary(&self, results: &ValidationResults) -> String {
        let mut output = String::new();
        output.push_str("Validation Summary:\n");
        let _ = writeln!(output, "  Total files: {}", results.total_files);
        let _ = writeln!(
            output,
            "  {} {}",
            self.colorize("Valid:", "32"),
            results.valid_files
        );

        if results.invalid_files > 0 {
            let _ = writeln!(
                output,
                "  {} {}",
                self.colorize("Invalid:", "31"),
                results.invalid_files
            );
        }
        if results.error_files > 0 {
            let _ = writeln!(
                output,
                "  {} {}",
                self.colorize("Errors:", "33"),
                results.error_files
            );
        }
        if results.skipped_files > 0 {
            let _ = writeln!(
                output,
                "  {} {}",
                self.colorize("Skipped:", "36"),
                results.skipped_files
            );
        }

        let _ = writeln!(output, "  Success rate: {:.1}%", results.success_rate());
        let _ = writeln!(
            output,
            "  Duration: {}",
            format_duration(results.performance_metrics.total_duration)
        );

        if self.verbosity == VerbosityLevel::Verbose {
            output.push_str(&format_trusted_schemas(&results.trusted_schemas));
            output.push_str(&format_performance_metrics(&results.performance_metrics));
        }

        output
    }

    fn format_one_line(&self, results: &ValidationResults) -> String {
        format!(
            "{} files: {} valid, {} invalid, {} errors, {} skipped ({})\n",
            results.total_files,
            results.valid_files,
            results.invalid_files,
            results.error_files,
            results.skipped_files,
            format_duration(results.performance_metrics.total_duration)
        )
    }
}

fn format_trusted_schemas(schemas: &[String]) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "\nTrusted schemas: {}", schemas.len());
    for (i, schema) in schemas.iter().enumerate() {
        let _ = writeln!(output, "    {}: {}", i + 1, schema);
    }
    output
}

fn format_performance_metrics(metrics: &PerformanceMetrics) -> String {
    let mut output = String::new();
    output.push_str("\nPerformance Metrics:\n");
    let _ = writeln!(
        output,
        "  Discovery: {}",
        format_duration(metrics.discovery_duration)
    );
    let _ = writeln!(
        output,
        "  Validation: {}",
        format_duration(metrics.validation_duration)
    );
    let _ = writeln!(
        output,
        "  Throughput: {:.1} files/sec",
        metrics.throughput_files_per_second
    );
    let _ = writeln!(output, "  Threads: {}", metrics.threads);
    output
}

#[derive(Serialize)]
struct JsonReport<'a> {
    summary: JsonSummary,
    files: &'a [FileValidationResult],
    trusted_schemas: &'a [String],
    performance: &'a PerformanceMetrics,
}

#[derive(Serialize)]
struct JsonSummary {
    total: usize,
    valid: usize,
    invalid: usize,
    errors: usize,
    skipped: usize,
    success_rate: f64,
}

fn format_json(results: &ValidationResults) -> String {
    let report = JsonReport {
        summary: JsonSummary {
            total: results.total_files,
            valid: results.valid_files,
            invalid: results.invalid_files,
            errors: results.error_files,
            skipped: results.skipped_files,
            success_rate: results.success_rate(),
        },
        files: &results.file_results,
        trusted_schemas: &results.trusted_schemas,
        performance: &results.performance_metrics,
    };
    match serde_json::to_string_pretty(&report) {
        Ok(mut json) => {
            json.push('\n');
            json
        }
        Err(e) => format!("{{\"error\": \"failed to serialize results: {}\"}}\n", e),
    }
}

pub fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs_f64();
    if total_secs < 1.0 {
        format!("{:.0}ms", duration.as_millis())
    } else if total_secs < 60.0 {
        format!("{:.2}s", total_secs)
    } else {
        let mins = (total_secs / 60.0) as u64;
        let secs = total_secs % 60.0;
        format!("{}m{:.1}s", mins, secs)
    }
}
