//! Version control collaborator
//!
//! Reports what changed in a working tree since a commit. Paths are relative
//! to the indexed root, which may be a subdirectory of the repository.

use git2::{Delta, DiffFindOptions, DiffOptions, ErrorCode, Oid, Repository};
use std::path::{Path, PathBuf};

/// Version control error
#[derive(Debug, thiserror::Error)]
pub enum VcsError {
    #[error("Not a repository: {0}")]
    NotARepository(PathBuf),
    #[error("Unknown commit: {0}")]
    UnknownCommit(String),
    #[error("Git error: {0}")]
    Git(#[from] git2::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Changes between a commit and the working tree (untracked files included)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VcsDiff {
    pub added: Vec<String>,
    pub modified: Vec<String>,
    pub deleted: Vec<String>,
    /// (old path, new path)
    pub renamed: Vec<(String, String)>,
}

impl VcsDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty()
            && self.modified.is_empty()
            && self.deleted.is_empty()
            && self.renamed.is_empty()
    }
}

/// Version control operations used by delta sync
pub trait VersionControl: Send + Sync {
    /// Commit id of HEAD, `None` before the first commit
    fn head_commit(&self, root: &Path) -> Result<Option<String>, VcsError>;

    /// Checked-out branch name
    fn current_branch(&self, root: &Path) -> Result<String, VcsError>;

    /// Working tree changes since `since_commit`
    fn diff(&self, root: &Path, since_commit: &str) -> Result<VcsDiff, VcsError>;
}

/// git via libgit2
#[derive(Debug, Clone, Copy, Default)]
pub struct GitVcs;

impl GitVcs {
    fn open(root: &Path) -> Result<Repository, VcsError> {
        Repository::discover(root).map_err(|_| VcsError::NotARepository(root.to_path_buf()))
    }

    /// Prefix of `root` inside the repository's working directory
    fn root_prefix(repo: &Repository, root: &Path) -> Result<String, VcsError> {
        let workdir = repo
            .workdir()
            .ok_or_else(|| VcsError::NotARepository(root.to_path_buf()))?
            .canonicalize()?;
        let root = root.canonicalize()?;
        let rel = root.strip_prefix(&workdir).unwrap_or(Path::new(""));
        let prefix: Vec<String> = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        Ok(if prefix.is_empty() {
            String::new()
        } else {
            format!("{}/", prefix.join("/"))
        })
    }
}

fn under_prefix(path: Option<&Path>, prefix: &str) -> Option<String> {
    let path = path?.to_string_lossy().replace('\\', "/");
    path.strip_prefix(prefix).map(str::to_string)
}

impl VersionControl for GitVcs {
    fn head_commit(&self, root: &Path) -> Result<Option<String>, VcsError> {
        let repo = Self::open(root)?;
        let head = match repo.head() {
            Ok(head) => head,
            Err(e) if e.code() == ErrorCode::UnbornBranch => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(head.peel_to_commit()?.id().to_string()))
    }

    fn current_branch(&self, root: &Path) -> Result<String, VcsError> {
        let repo = Self::open(root)?;
        match repo.head() {
            Ok(head) if head.is_branch() => Ok(head.shorthand().unwrap_or("HEAD").to_string()),
            Ok(_) => Ok("HEAD".to_string()),
            Err(e) if e.code() == ErrorCode::UnbornBranch => {
                let head = repo.find_reference("HEAD")?;
                Ok(head
                    .symbolic_target()
                    .and_then(|t| t.strip_prefix("refs/heads/"))
                    .unwrap_or("HEAD")
                    .to_string())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn diff(&self, root: &Path, since_commit: &str) -> Result<VcsDiff, VcsError> {
        let repo = Self::open(root)?;
        let prefix = Self::root_prefix(&repo, root)?;
        let oid =
            Oid::from_str(since_commit).map_err(|_| VcsError::UnknownCommit(since_commit.into()))?;
        let commit = repo
            .find_commit(oid)
            .map_err(|_| VcsError::UnknownCommit(since_commit.into()))?;
        let tree = commit.tree()?;

        let mut opts = DiffOptions::new();
        opts.include_untracked(true).recurse_untracked_dirs(true);
        let mut diff = repo.diff_tree_to_workdir_with_index(Some(&tree), Some(&mut opts))?;
        let mut find = DiffFindOptions::new();
        find.renames(true).for_untracked(true);
        diff.find_similar(Some(&mut find))?;

        let mut out = VcsDiff::default();
        for delta in diff.deltas() {
            let old = under_prefix(delta.old_file().path(), &prefix);
            let new = under_prefix(delta.new_file().path(), &prefix);
            match delta.status() {
                Delta::Added | Delta::Untracked | Delta::Copied => out.added.extend(new),
                Delta::Modified | Delta::Typechange => out.modified.extend(new),
                Delta::Deleted => out.deleted.extend(old),
                Delta::Renamed => match (old, new) {
                    (Some(old), Some(new)) => out.renamed.push((old, new)),
                    // Moved across the indexed root boundary
                    (Some(old), None) => out.deleted.push(old),
                    (None, Some(new)) => out.added.push(new),
                    (None, None) => {}
                },
                _ => {}
            }
        }
        tracing::debug!(
            added = out.added.len(),
            modified = out.modified.len(),
            deleted = out.deleted.len(),
            renamed = out.renamed.len(),
            "Computed working tree diff"
        );
        Ok(out)
    }
}
