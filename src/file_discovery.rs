use crate::error::{Result, ValidationError};
use ignore::overrides::{Override, OverrideBuilder};
use ignore::{Match, WalkBuilder};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Include/exclude globs, kept as raw patterns and compiled per walk root
#[derive(Debug, Clone, Default)]
struct Patterns {
    include: Vec<String>,
    exclude: Vec<String>,
}

/// Walks a file or directory tree and picks out the documents to validate
#[derive(Debug, Clone)]
pub struct FileDiscovery {
    /// File extensions to include (e.g., ["xml", "cmdi"])
    extensions: Vec<String>,
    patterns: Patterns,
    /// Maximum depth below the root directory (None = unlimited)
    max_depth: Option<usize>,
    follow_symlinks: bool,
}

impl FileDiscovery {
    pub fn new() -> Self {
        Self {
            extensions: vec!["xml".to_string()],
            patterns: Patterns::default(),
            max_depth: None,
            follow_symlinks: false,
        }
    }

    pub fn with_extensions(mut self, extensions: Vec<String>) -> Self {
        self.extensions = extensions.into_iter().map(|e| e.to_lowercase()).collect();
        self
    }

    /// Only files matching at least one of these globs are kept
    pub fn with_include_patterns(mut self, patterns: Vec<String>) -> Result<Self> {
        check_patterns(&patterns)?;
        self.patterns.include = patterns;
        Ok(self)
    }

    /// Files matching any of these globs are dropped
    pub fn with_exclude_patterns(mut self, patterns: Vec<String>) -> Result<Self> {
        check_patterns(&patterns)?;
        self.patterns.exclude = patterns;
        Ok(self)
    }

    pub fn with_max_depth(mut self, depth: Option<usize>) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn with_follow_symlinks(mut self, follow: bool) -> Self {
        self.follow_symlinks = follow;
        self
    }

    /// Discover files in the given path (file or directory), sorted
    pub fn discover_files(&self, path: &Path) -> Result<Vec<PathBuf>> {
        self.discover_with_stats(path).map(|(files, _)| files)
    }

    /// Discover files and report how many entries could not be read
    pub fn discover_with_stats(&self, path: &Path) -> Result<(Vec<PathBuf>, DiscoveryStats)> {
        let metadata = std::fs::metadata(path)?;
        let root = if metadata.is_file() {
            path.parent().unwrap_or(path)
        } else {
            path
        };
        let matchers = self.matchers(root)?;

        if metadata.is_file() {
            let files = if self.should_process_with(path, &matchers) {
                vec![path.to_path_buf()]
            } else {
                Vec::new()
            };
            let stats = DiscoveryStats {
                files_found: files.len(),
                errors: 0,
            };
            return Ok((files, stats));
        }

        let mut walker = WalkBuilder::new(path);
        walker
            .standard_filters(false)
            .follow_links(self.follow_symlinks)
            .max_depth(self.max_depth.map(|depth| depth + 1));

        let mut files = Vec::new();
        let mut stats = DiscoveryStats::default();
        for entry in walker.build() {
            match entry {
                Ok(entry) => {
                    let is_file = entry.file_type().is_some_and(|t| t.is_file());
                    if is_file && self.should_process_with(entry.path(), &matchers) {
                        files.push(entry.into_path());
                    }
                }
                Err(e) => {
                    warn!(error = %e, "error while walking directory");
                    stats.errors += 1;
                }
            }
        }

        files.sort();
        stats.files_found = files.len();
        Ok((files, stats))
    }

    /// Check if a file should be processed based on extensions and patterns.
    ///
    /// Patterns are matched relative to the file's own directory.
    pub fn should_process(&self, path: &Path) -> bool {
        let root = path.parent().unwrap_or(Path::new(""));
        match self.matchers(root) {
            Ok(matchers) => self.should_process_with(path, &matchers),
            Err(_) => false,
        }
    }

    fn should_process_with(&self, path: &Path, matchers: &Matchers) -> bool {
        let Some(extension) = path.extension().and_then(|ext| ext.to_str()) else {
            return false;
        };
        if !self.extensions.contains(&extension.to_lowercase()) {
            return false;
        }

        if let Some(exclude) = &matchers.exclude {
            if matches!(exclude.matched(path, false), Match::Whitelist(_)) {
                return false;
            }
        }
        if let Some(include) = &matchers.include {
            return matches!(include.matched(path, false), Match::Whitelist(_));
        }

        true
    }

    fn matchers(&self, root: &Path) -> Result<Matchers> {
        Ok(Matchers {
            include: build_override(root, &self.patterns.include)?,
            exclude: build_override(root, &self.patterns.exclude)?,
        })
    }
}

impl Default for FileDiscovery {
    fn default() -> Self {
        Self::new()
    }
}

struct Matchers {
    include: Option<Override>,
    exclude: Option<Override>,
}

fn build_override(root: &Path, patterns: &[String]) -> Result<Option<Override>> {
    if patterns.is_empty() {
        return Ok(None);
    }

    let mut builder = OverrideBuilder::new(root);
    for pattern in patterns {
        builder.add(pattern).map_err(|e| {
            ValidationError::Config(format!("Invalid glob pattern '{}': {}", pattern, e))
        })?;
    }
    let matcher = builder
        .build()
        .map_err(|e| ValidationError::Config(format!("Failed to build glob set: {}", e)))?;
    Ok(Some(matcher))
}

fn check_patterns(patterns: &[String]) -> Result<()> {
    build_override(Path::new(""), patterns).map(|_| ())
}

/// Statistics about file discovery operation
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DiscoveryStats {
    pub files_found: usize,
    pub errors: usize,
}
