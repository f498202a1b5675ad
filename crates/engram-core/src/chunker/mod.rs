//! Chunker
//!
//! Splits file content into chunks aligned to function and class boundaries.
//! A registry maps file extensions to boundary detectors; unknown extensions
//! fall back to fixed-size line windows with overlap. Every chunk passes
//! through secret redaction before it is yielded.
//!
//! # Example
//!
//! ```rust
//! use engram_core::chunker::ChunkerRegistry;
//!
//! let registry = ChunkerRegistry::with_defaults();
//! let chunks: Vec<_> = registry.chunk("class A:\n    def run(self):\n        pass\n", "py").collect();
//! assert_eq!(chunks[0].scope.as_deref(), Some("A.run"));
//! ```

mod generic;
mod languages;

use std::collections::HashMap;
use std::sync::Arc;

use crate::security::scrub_secrets;

pub use generic::line_windows;
pub use languages::RegexDetector;

// ============================================================================
// TYPES
// ============================================================================

/// A chunk of a source file
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// Redacted chunk text
    pub text: String,
    /// First line (1-indexed)
    pub start_line: usize,
    /// Last line (1-indexed, inclusive)
    pub end_line: usize,
    pub function_name: Option<String>,
    pub class_name: Option<String>,
    /// Dotted path such as `ClassName.method`
    pub scope: Option<String>,
}

/// Configuration for the chunker
#[derive(Debug, Clone)]
pub struct ChunkerConfig {
    /// Number of lines per window for the generic splitter
    pub line_chunk_size: usize,
    /// Number of overlapping lines between windows
    pub line_overlap: usize,
    /// Segments shorter than this are merged into the next one
    pub min_chunk_lines: usize,
    /// Maximum lines before a syntactic segment is split into windows
    pub max_chunk_lines: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            line_chunk_size: 50,
            line_overlap: 10,
            min_chunk_lines: 3,
            max_chunk_lines: 200,
        }
    }
}

/// Kind of syntactic boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundaryKind {
    /// Class, struct, impl, module, interface
    Container,
    /// Function or method
    Function,
}

/// A definition detected on a single line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineBoundary {
    pub kind: BoundaryKind,
    pub name: String,
    /// Explicit owner for languages that declare methods outside their type (Go receivers)
    pub owner: Option<String>,
}

/// Detects definition starts for one language
pub trait BoundaryDetector: Send + Sync {
    /// Language name recorded on chunks
    fn language(&self) -> &'static str;

    /// Definition starting on this line, if any
    fn detect(&self, line: &str) -> Option<LineBoundary>;
}

// ============================================================================
// REGISTRY
// ============================================================================

/// Extension to boundary detector registry
pub struct ChunkerRegistry {
    detectors: HashMap<String, Arc<dyn BoundaryDetector>>,
    config: ChunkerConfig,
}

impl Default for ChunkerRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl ChunkerRegistry {
    /// Empty registry; every extension uses the generic splitter
    pub fn new(config: ChunkerConfig) -> Self {
        Self {
            detectors: HashMap::new(),
            config,
        }
    }

    /// Registry with the built-in language detectors
    pub fn with_defaults() -> Self {
        let mut registry = Self::new(ChunkerConfig::default());
        for (extensions, detector) in languages::builtin_detectors() {
            for ext in extensions {
                registry.register(ext, detector.clone());
            }
        }
        registry
    }

    /// Register (or replace) the detector for an extension
    pub fn register(&mut self, extension: &str, detector: Arc<dyn BoundaryDetector>) {
        self.detectors
            .insert(normalize_extension(extension), detector);
    }

    /// Language recorded for an extension
    pub fn language_for(&self, extension: &str) -> String {
        self.detectors
            .get(&normalize_extension(extension))
            .map(|d| d.language().to_string())
            .unwrap_or_else(|| {
                let ext = normalize_extension(extension);
                if ext.is_empty() { "text".to_string() } else { ext }
            })
    }

    pub fn config(&self) -> &ChunkerConfig {
        &self.config
    }

    /// Lazily chunk `content` using the detector registered for `extension`
    pub fn chunk<'a>(&'a self, content: &'a str, extension: &str) -> Chunks<'a> {
        let lines: Vec<&'a str> = content.lines().collect();
        let segments = match self.detectors.get(&normalize_extension(extension)) {
            Some(detector) => syntactic_segments(&lines, detector.as_ref(), &self.config),
            None => generic::generic_segments(lines.len(), &self.config),
        };
        Chunks {
            lines,
            segments: segments.into_iter(),
        }
    }
}

fn normalize_extension(extension: &str) -> String {
    extension.trim_start_matches('.').to_lowercase()
}

// ============================================================================
// SEGMENTATION
// ============================================================================

/// Line range [start, end) with scope metadata
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Segment {
    pub start: usize,
    pub end: usize,
    pub function_name: Option<String>,
    pub class_name: Option<String>,
    pub scope: Option<String>,
}

impl Segment {
    pub(crate) fn plain(start: usize, end: usize) -> Self {
        Self {
            start,
            end,
            function_name: None,
            class_name: None,
            scope: None,
        }
    }
}

fn indent_of(line: &str) -> usize {
    line.chars()
        .take_while(|c| c.is_whitespace())
        .map(|c| if c == '\t' { 4 } else { 1 })
        .sum()
}

fn syntactic_segments(
    lines: &[&str],
    detector: &dyn BoundaryDetector,
    config: &ChunkerConfig,
) -> Vec<Segment> {
    // (line index, indent, boundary)
    let mut boundaries = Vec::new();
    for (idx, line) in lines.iter().enumerate() {
        if let Some(boundary) = detector.detect(line) {
            boundaries.push((idx, indent_of(line), boundary));
        }
    }
    if boundaries.is_empty() {
        return generic::generic_segments(lines.len(), config);
    }

    let mut segments = Vec::new();
    if boundaries[0].0 > 0 {
        segments.push(Segment::plain(0, boundaries[0].0));
    }

    // Enclosing containers as (indent, name)
    let mut containers: Vec<(usize, String)> = Vec::new();
    for (i, (start, indent, boundary)) in boundaries.iter().enumerate() {
        let end = boundaries.get(i + 1).map(|b| b.0).unwrap_or(lines.len());
        while containers.last().is_some_and(|(depth, _)| *depth >= *indent) {
            containers.pop();
        }

        let mut segment = Segment::plain(*start, end);
        match boundary.kind {
            BoundaryKind::Container => {
                containers.push((*indent, boundary.name.clone()));
                segment.class_name = Some(boundary.name.clone());
                segment.scope = Some(
                    containers
                        .iter()
                        .map(|(_, n)| n.as_str())
                        .collect::<Vec<_>>()
                        .join("."),
                );
            }
            BoundaryKind::Function => {
                let mut path: Vec<&str> = containers.iter().map(|(_, n)| n.as_str()).collect();
                if path.is_empty()
                    && let Some(owner) = &boundary.owner
                {
                    path.push(owner.as_str());
                }
                segment.class_name = path.last().map(|s| s.to_string());
                segment.function_name = Some(boundary.name.clone());
                path.push(boundary.name.as_str());
                segment.scope = Some(path.join("."));
            }
        }
        segments.push(segment);
    }

    let merged = merge_short_segments(segments, config.min_chunk_lines);

    let mut out = Vec::with_capacity(merged.len());
    for segment in merged {
        if segment.end - segment.start > config.max_chunk_lines {
            for (start, end) in line_windows(
                segment.start,
                segment.end,
                config.line_chunk_size,
                config.line_overlap,
            ) {
                out.push(Segment {
                    start,
                    end,
                    ..segment.clone()
                });
            }
        } else {
            out.push(segment);
        }
    }
    out
}

/// Fold container headers shorter than `min_lines` into their successor
///
/// A bare class header followed by its first method becomes one chunk scoped
/// to that method.
fn merge_short_segments(segments: Vec<Segment>, min_lines: usize) -> Vec<Segment> {
    let mut out: Vec<Segment> = Vec::with_capacity(segments.len());
    let mut carry: Option<Segment> = None;
    for mut segment in segments {
        if let Some(header) = carry.take() {
            segment.start = header.start;
        }
        let is_container = segment.function_name.is_none() && segment.class_name.is_some();
        if is_container && segment.end - segment.start < min_lines {
            carry = Some(segment);
            continue;
        }
        out.push(segment);
    }
    if let Some(header) = carry {
        out.push(header);
    }
    out
}

// ============================================================================
// ITERATOR
// ============================================================================

/// Lazy chunk sequence; text is assembled and redacted on demand
pub struct Chunks<'a> {
    lines: Vec<&'a str>,
    segments: std::vec::IntoIter<Segment>,
}

impl Iterator for Chunks<'_> {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        for segment in self.segments.by_ref() {
            let end = segment.end.min(self.lines.len());
            if segment.start >= end {
                continue;
            }
            let body = &self.lines[segment.start..end];
            if body.iter().all(|l| l.trim().is_empty()) {
                continue;
            }
            // Trailing blank lines belong to no definition
            let trimmed_len = body
                .iter()
                .rposition(|l| !l.trim().is_empty())
                .map(|p| p + 1)
                .unwrap_or(body.len());
            let text = scrub_secrets(&body[..trimmed_len].join("\n"));
            return Some(Chunk {
                text,
                start_line: segment.start + 1,
                end_line: segment.start + trimmed_len,
                function_name: segment.function_name,
                class_name: segment.class_name,
                scope: segment.scope,
            });
        }
        None
    }
}

// ============================================================================
// TESTS
// ============================================================================
