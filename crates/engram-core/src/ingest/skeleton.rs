//! Repository skeleton document

use std::collections::BTreeMap;

use crate::memory::{Document, DocumentType};

/// Rendered directory tree and its counts
#[derive(Debug, Clone, PartialEq)]
pub struct Skeleton {
    pub tree: String,
    pub total_files: usize,
    pub total_dirs: usize,
}

#[derive(Default)]
struct Node {
    dirs: BTreeMap<String, Node>,
    files: Vec<String>,
}

impl Node {
    fn render(&self, depth: usize, out: &mut String, dirs: &mut usize) {
        for (name, child) in &self.dirs {
            *dirs += 1;
            out.push_str(&"  ".repeat(depth));
            out.push_str(name);
            out.push_str("/\n");
            child.render(depth + 1, out, dirs);
        }
        for file in &self.files {
            out.push_str(&"  ".repeat(depth));
            out.push_str(file);
            out.push('\n');
        }
    }
}

/// Build an indented tree from repository-relative paths
pub fn build_skeleton<'a>(repository: &str, paths: impl IntoIterator<Item = &'a str>) -> Skeleton {
    let mut root = Node::default();
    let mut total_files = 0;
    for path in paths {
        let mut parts: Vec<&str> = path.split('/').collect();
        let Some(file) = parts.pop() else { continue };
        let mut node = &mut root;
        for dir in parts {
            node = node.dirs.entry(dir.to_string()).or_default();
        }
        node.files.push(file.to_string());
        total_files += 1;
    }
    sort_tree(&mut root);

    let mut tree = format!("{repository}/\n");
    let mut total_dirs = 0;
    root.render(1, &mut tree, &mut total_dirs);
    Skeleton {
        tree,
        total_files,
        total_dirs,
    }
}

fn sort_tree(node: &mut Node) {
    node.files.sort();
    for child in node.dirs.values_mut() {
        sort_tree(child);
    }
}

/// Id of a repository's skeleton on one branch
pub fn skeleton_id(repository: &str, branch: &str) -> String {
    format!("skeleton:{repository}:{branch}")
}

/// Skeleton as a storable document
pub fn skeleton_document(repository: &str, branch: &str, skeleton: &Skeleton) -> Document {
    let mut doc = Document::new(
        skeleton_id(repository, branch),
        DocumentType::Skeleton,
        repository,
        skeleton.tree.clone(),
    );
    doc.branch = Some(branch.to_string());
    doc.metadata = serde_json::json!({
        "totalFiles": skeleton.total_files,
        "totalDirs": skeleton.total_dirs,
    });
    doc
}
