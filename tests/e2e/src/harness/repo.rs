//! Git Repository Fixture
//!
//! A real repository on disk so delta sync exercises the same diff path it
//! uses in production.

use git2::{build::CheckoutBuilder, IndexAddOption, Repository, RepositoryInitOptions, Signature};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Temporary git repository checked out on `main`
pub struct TestRepo {
    repo: Repository,
    name: String,
    _dir: TempDir,
    root: PathBuf,
}

impl TestRepo {
    /// Empty repository named `acme`
    pub fn new() -> Self {
        Self::named("acme")
    }

    pub fn named(name: &str) -> Self {
        let dir = TempDir::new().expect("Failed to create repo directory");
        let root = dir.path().to_path_buf();
        let mut opts = RepositoryInitOptions::new();
        opts.initial_head("main");
        let repo = Repository::init_opts(&root, &opts).expect("Failed to init repository");

        Self {
            repo,
            name: name.to_string(),
            _dir: dir,
            root,
        }
    }

    /// Repository with `files` written and committed
    pub fn with_files(files: &[(&str, &str)]) -> Self {
        let repo = Self::new();
        for (path, content) in files {
            repo.write(path, content);
        }
        repo.commit_all("initial");
        repo
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Write a file relative to the root, creating parent directories
    pub fn write(&self, relative: &str, content: &str) {
        let path = self.root.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent directory");
        }
        fs::write(path, content).expect("Failed to write file");
    }

    pub fn delete(&self, relative: &str) {
        fs::remove_file(self.root.join(relative)).expect("Failed to delete file");
    }

    /// Stage every change, deletions included, and commit on HEAD
    pub fn commit_all(&self, message: &str) -> String {
        let mut index = self.repo.index().expect("index");
        index
            .add_all(["*"].iter(), IndexAddOption::DEFAULT, None)
            .expect("add_all");
        index.update_all(["*"].iter(), None).expect("update_all");
        index.write().expect("write index");
        let tree_id = index.write_tree().expect("write tree");
        let tree = self.repo.find_tree(tree_id).expect("find tree");
        let sig = Signature::now("Test", "test@example.com").expect("signature");

        let parent = self.repo.head().ok().and_then(|h| h.peel_to_commit().ok());
        let parents: Vec<&git2::Commit> = parent.iter().collect();
        let oid = self
            .repo
            .commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
            .expect("commit");
        oid.to_string()
    }

    /// Create `branch` at HEAD and switch to it
    pub fn checkout_new_branch(&self, branch: &str) {
        let head = self
            .repo
            .head()
            .and_then(|h| h.peel_to_commit())
            .expect("branching needs a commit");
        self.repo.branch(branch, &head, false).expect("create branch");
        self.checkout(branch);
    }

    /// Switch to an existing branch, overwriting the working tree
    pub fn checkout(&self, branch: &str) {
        self.repo
            .set_head(&format!("refs/heads/{branch}"))
            .expect("set head");
        self.repo
            .checkout_head(Some(CheckoutBuilder::new().force().remove_untracked(true)))
            .expect("checkout");
    }
}

impl Default for TestRepo {
    fn default() -> Self {
        Self::new()
    }
}
