use std::io::Write;
use std::process::ExitCode;

use anyhow::Context;
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

use xsd_guard::cli::{Cli, VerbosityLevel};
use xsd_guard::config::{Config, ConfigManager};
use xsd_guard::file_discovery::FileDiscovery;
use xsd_guard::output::Output;
use xsd_guard::validator::{EngineOptions, ValidationEngine};

/// Every file validated
const EXIT_OK: u8 = 0;
/// At least one file invalid, unreadable or skipped
const EXIT_FAILURES: u8 = 1;
/// Bad arguments, configuration, or trusted schemas
const EXIT_SETUP: u8 = 2;

fn main() -> ExitCode {
    let cli = Cli::parse_args();
    init_tracing(cli.verbose);

    if let Err(message) = cli.validate() {
        error!("{}", message);
        eprintln!("Error: {}", message);
        return ExitCode::from(EXIT_SETUP);
    }

    let config = match ConfigManager::load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::from(EXIT_SETUP);
        }
    };

    match run(&cli, &config) {
        Ok(true) => ExitCode::from(EXIT_OK),
        Ok(false) => ExitCode::from(EXIT_FAILURES),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(EXIT_SETUP)
        }
    }
}

/// `RUST_LOG` wins; otherwise warnings, or debug with `--verbose`
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "xsd_guard=debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: &Cli, config: &Config) -> anyhow::Result<bool> {
    let registry = config
        .schema_registry()
        .context("Failed to load trusted schemas")?;
    if registry.is_empty() {
        debug!("no trusted schemas configured; every element will be undeclared");
    }

    let discovery = FileDiscovery::new()
        .with_extensions(config.files.extensions.clone())
        .with_include_patterns(config.files.include_patterns.clone())?
        .with_exclude_patterns(config.files.exclude_patterns.clone())?
        .with_max_depth(config.files.max_depth);

    let options = EngineOptions {
        threads: ConfigManager::get_thread_count(config),
        fail_fast: config.validation.fail_fast,
    };
    let engine = ValidationEngine::new(registry, config.reader_config(), options)
        .context("Failed to compile trusted schemas")?;

    let results = engine.validate_path(&cli.path, &discovery)?;

    let verbosity = VerbosityLevel::from_flags(config.output.verbose, config.output.quiet);
    let rendered = Output::new(verbosity, config.output.format).format_results(&results);
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(rendered.as_bytes())?;
    stdout.flush()?;

    Ok(!results.has_errors())
}
