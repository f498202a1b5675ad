//! Repository traversal and content hashing

use glob::Pattern;
use sha2::{Digest, Sha256};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::ignore::{is_binary_extension, IgnoreRules};

/// Files larger than this are never indexed
pub const MAX_FILE_SIZE: u64 = 1_000_000;

/// An indexable file found under a repository root
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct WalkedFile {
    /// Repository-relative path with `/` separators
    pub relative: String,
    pub absolute: PathBuf,
}

/// SHA-256 of `bytes` as lowercase hex
pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// SHA-256 of a file's content
pub fn hash_file(path: &Path) -> io::Result<String> {
    Ok(content_hash(&fs::read(path)?))
}

/// Repository-relative form of `path` using `/` separators
pub fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

/// Whether `relative` matches any include pattern (no patterns matches all)
pub fn matches_include(relative: &str, include: &[Pattern]) -> bool {
    include.is_empty() || include.iter().any(|p| p.matches(relative))
}

/// Compile include globs
pub fn compile_patterns(patterns: &[String]) -> Result<Vec<Pattern>, glob::PatternError> {
    patterns.iter().map(|p| Pattern::new(p)).collect()
}

/// Whether a single file passes every walk-time filter
///
/// Used to vet paths reported by version control, which does not know the
/// ignore rules.
pub fn is_indexable(root: &Path, relative: &str, rules: &IgnoreRules) -> bool {
    let mut prefix = String::new();
    let parts: Vec<&str> = relative.split('/').collect();
    let Some((name, dirs)) = parts.split_last() else {
        return false;
    };
    for dir in dirs {
        if !prefix.is_empty() {
            prefix.push('/');
        }
        prefix.push_str(dir);
        if rules.skip_dir(dir, &prefix) {
            return false;
        }
    }
    let absolute = root.join(relative);
    file_passes(&absolute, name, relative, rules)
}

fn file_passes(absolute: &Path, name: &str, relative: &str, rules: &IgnoreRules) -> bool {
    if name.starts_with('.') || is_binary_extension(absolute) || rules.is_ignored(name, relative) {
        return false;
    }
    match fs::metadata(absolute) {
        Ok(meta) => meta.is_file() && meta.len() <= MAX_FILE_SIZE,
        Err(_) => false,
    }
}

/// Every indexable file under `root`, sorted by relative path
///
/// Symlinked directories are not followed.
pub fn walk_repository(root: &Path, rules: &IgnoreRules) -> io::Result<Vec<WalkedFile>> {
    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if dir == root => return Err(e),
            Err(e) => {
                tracing::warn!(dir = %dir.display(), error = %e, "Skipping unreadable directory");
                continue;
            }
        };
        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().into_owned();
            let Some(relative) = relative_path(root, &path) else {
                continue;
            };
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                if !rules.skip_dir(&name, &relative) {
                    pending.push(path);
                }
            } else if file_passes(&path, &name, &relative, rules) {
                files.push(WalkedFile {
                    relative,
                    absolute: path,
                });
            }
        }
    }

    files.sort();
    Ok(files)
}
