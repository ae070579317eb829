use crate::newick::Tree;
use crate::TreeError;
use itertools::Itertools;
use log::{debug, info};
use regex::Regex;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Ancestor levels labeled above each matching leaf unless configured.
pub const DEFAULT_DEPTH: usize = 4;

/// Suffix of the unmarked copy of a tree used by the site models.
pub const UNLABELED_SUFFIX: &str = "nl";

/// One labeled copy of a tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabeledVariant {
    /// PAML id of the ancestor marked last; names the variant file.
    pub node_id: usize,
    /// The mark token given to that ancestor.
    pub token: u32,
    /// The matching leaf whose walk produced the variant.
    pub leaf: String,
    /// The tree with every mark assigned so far.
    pub newick: String,
}

/// Compile a node name pattern, anchored at the start of the name.
pub fn compile_pattern(pattern: &str) -> Result<Regex, TreeError> {
    Ok(Regex::new(&format!("^(?:{pattern})"))?)
}

/// Label the ancestors of every leaf whose name matches `pattern`.
///
/// Leaves are visited in level order. For each matching leaf up to `depth`
/// ancestors are walked, nearest first, stopping after the root. Each
/// ancestor not yet marked receives the next token (`#1`, `#2`, ... across
/// the whole traversal) and yields one variant carrying all marks assigned
/// so far. An ancestor already marked by an earlier walk keeps its token and
/// yields no variant.
pub fn label_by_pattern(tree: &Tree, pattern: &Regex, depth: usize) -> Vec<LabeledVariant> {
    let mut marked = tree.clone();
    marked.clear_marks();
    let mut token = 0;
    let mut variants = Vec::new();
    for idx in tree.level_order() {
        let leaf = tree.node(idx);
        if !leaf.is_leaf() || !pattern.is_match(&leaf.name) {
            continue;
        }
        debug!("{} matches, node {}", leaf.name, leaf.node_id);
        for ancestor in tree.ancestors(idx).take(depth) {
            if marked.node(ancestor).mark.is_some() {
                continue;
            }
            token += 1;
            marked.set_mark(ancestor, Some(token));
            variants.push(LabeledVariant {
                node_id: tree.node(ancestor).node_id,
                token,
                leaf: leaf.name.clone(),
                newick: marked.to_newick(),
            });
        }
    }
    variants
}

/// Mark the given nodes `#1..#k` in list order and return the tree text.
pub fn label_nodes(tree: &Tree, node_ids: &[usize]) -> Result<String, TreeError> {
    let mut marked = tree.clone();
    marked.clear_marks();
    for (token, &node_id) in (1..).zip(node_ids) {
        let idx = marked
            .find_by_node_id(node_id)
            .ok_or(TreeError::UnknownNode(node_id))?;
        marked.set_mark(idx, Some(token));
    }
    Ok(marked.to_newick())
}

/// `path` with `.suffix` appended to its file name.
pub fn suffixed_path(path: &Path, suffix: impl std::fmt::Display) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(format!(".{suffix}"));
    PathBuf::from(name)
}

fn write_tree_file(path: &Path, newick: &str) -> Result<(), TreeError> {
    std::fs::write(path, format!("{newick}\n")).map_err(|source| TreeError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Write each variant next to `tree_path` as `<tree>.<node_id>`.
pub fn write_variants(
    tree_path: &Path,
    variants: &[LabeledVariant],
) -> Result<Vec<PathBuf>, TreeError> {
    let paths = variants
        .iter()
        .map(|variant| {
            let path = suffixed_path(tree_path, variant.node_id);
            write_tree_file(&path, &variant.newick)?;
            Ok(path)
        })
        .collect::<Result<Vec<_>, TreeError>>()?;
    info!(
        "{}: {} labeled trees",
        tree_path.display(),
        paths.len()
    );
    Ok(paths)
}

/// Write the tree without any marks as `<tree>.nl`.
pub fn write_unlabeled(tree_path: &Path, tree: &Tree) -> Result<PathBuf, TreeError> {
    let mut clean = tree.clone();
    clean.clear_marks();
    let path = suffixed_path(tree_path, UNLABELED_SUFFIX);
    write_tree_file(&path, &clean.to_newick())?;
    Ok(path)
}

/// Label an explicit node list and write it as `<tree>.<id>_<id>...`.
pub fn write_labeled_nodes(
    tree_path: &Path,
    tree: &Tree,
    node_ids: &[usize],
) -> Result<PathBuf, TreeError> {
    let newick = label_nodes(tree, node_ids)?;
    let path = suffixed_path(tree_path, node_ids.iter().join("_"));
    write_tree_file(&path, &newick)?;
    Ok(path)
}
