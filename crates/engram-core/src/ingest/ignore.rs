//! Ignore rules
//!
//! Built-in defaults plus gitignore-style lines from the global ignore file
//! and the repository's `.engramignore`. Each line is a glob matched against
//! both the file name and the repository-relative path.

use glob::Pattern;
use std::fs;
use std::path::Path;

/// Per-repository ignore file name
pub const IGNORE_FILE_NAME: &str = ".engramignore";

/// Directories and files that are never indexed
pub const DEFAULT_IGNORE_PATTERNS: &[&str] = &[
    // Version control
    ".git",
    ".svn",
    ".hg",
    // Dependencies
    "node_modules",
    ".venv",
    "venv",
    "env",
    "__pycache__",
    ".pytest_cache",
    ".mypy_cache",
    ".ruff_cache",
    "vendor",
    // Build outputs
    "dist",
    "build",
    "out",
    ".next",
    ".nuxt",
    "target",
    // IDE
    ".idea",
    ".vscode",
    // Misc
    ".cache",
    "coverage",
    ".coverage",
    ".tox",
    ".eggs",
    "*.egg-info",
    "*.lock",
    "package-lock.json",
    "*.min.js",
    "*.map",
    ".DS_Store",
];

/// Extensions skipped without reading
pub const BINARY_EXTENSIONS: &[&str] = &[
    "exe", "bin", "so", "dylib", "dll", "o", "a", "lib", "class", "jar", "pyc", "wasm",
    // Images
    "png", "jpg", "jpeg", "gif", "bmp", "ico", "svg", "webp",
    // Media
    "mp3", "mp4", "wav", "avi", "mov", "webm",
    // Archives
    "zip", "tar", "gz", "bz2", "7z", "rar", "xz",
    // Documents and data
    "pdf", "doc", "docx", "xls", "xlsx", "db", "sqlite", "woff", "woff2", "ttf", "eot",
];

/// Compiled ignore rules for one repository
#[derive(Debug, Clone)]
pub struct IgnoreRules {
    patterns: Vec<Pattern>,
}

impl Default for IgnoreRules {
    fn default() -> Self {
        Self::defaults()
    }
}

impl IgnoreRules {
    /// Built-in defaults only
    pub fn defaults() -> Self {
        let mut rules = Self {
            patterns: Vec::new(),
        };
        for pattern in DEFAULT_IGNORE_PATTERNS {
            rules.add_pattern(pattern);
        }
        rules
    }

    /// Defaults merged with the global file and `<root>/.engramignore`
    ///
    /// Unreadable ignore files are skipped with a warning.
    pub fn load(root: &Path, global_file: Option<&Path>, use_ignore_files: bool) -> Self {
        let mut rules = Self::defaults();
        if !use_ignore_files {
            return rules;
        }
        let project_file = root.join(IGNORE_FILE_NAME);
        for file in global_file.into_iter().chain(std::iter::once(project_file.as_path())) {
            if !file.exists() {
                continue;
            }
            match fs::read_to_string(file) {
                Ok(content) => {
                    for line in parse_ignore_lines(&content) {
                        rules.add_pattern(&line);
                    }
                    tracing::debug!(file = %file.display(), "Loaded ignore file");
                }
                Err(e) => {
                    tracing::warn!(file = %file.display(), error = %e, "Could not read ignore file");
                }
            }
        }
        rules
    }

    /// Add one gitignore-style line; invalid globs are dropped
    pub fn add_pattern(&mut self, line: &str) {
        match Pattern::new(line) {
            Ok(pattern) => self.patterns.push(pattern),
            Err(e) => tracing::warn!(pattern = line, error = %e, "Ignoring invalid ignore pattern"),
        }
    }

    /// Whether the entry named `name` at `relative` is ignored
    pub fn is_ignored(&self, name: &str, relative: &str) -> bool {
        self.patterns
            .iter()
            .any(|p| p.matches(name) || p.matches(relative))
    }

    /// Directory pruning: ignored, hidden, or egg-info
    pub fn skip_dir(&self, name: &str, relative: &str) -> bool {
        name.starts_with('.') || name.ends_with(".egg-info") || self.is_ignored(name, relative)
    }
}

/// Meaningful lines of an ignore file, with trailing `/` removed
pub fn parse_ignore_lines(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(|l| l.trim_end_matches('/').to_string())
        .filter(|l| !l.is_empty())
        .collect()
}

/// True if the extension is on the binary skip list
pub fn is_binary_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| BINARY_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}
