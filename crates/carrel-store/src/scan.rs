//! Stateless tree scanner: rebuilds the category tree on demand.
//!
//! Cheap enough to re-run every scheduling tick; no persistent index and
//! no filesystem watching. A directory containing `meta.json` is an item
//! leaf; everything else is a category. Hidden (dot-prefixed) directories
//! are skipped, except the trash container at the root, which is scanned
//! like any other category so restore and acknowledge can find items there.

use std::path::{Path, PathBuf};

use carrel_core::Result;

use crate::record::{Record, is_item_dir};

/// A category node: a directory that is not itself an item.
#[derive(Debug, Clone)]
pub struct Category {
    pub name: String,
    /// Store-relative path ("" for the root).
    pub path: PathBuf,
    pub items: Vec<Record>,
    pub children: Vec<Category>,
}

/// The scanned store: the root category and everything under it.
#[derive(Debug, Clone)]
pub struct Tree {
    pub root: Category,
}

impl Tree {
    /// Depth-first collection of all records, trash included.
    pub fn flatten(&self) -> Vec<&Record> {
        let mut out = Vec::new();
        collect(&self.root, &mut out);
        out
    }

    pub fn find(&self, id: &str) -> Option<&Record> {
        self.flatten().into_iter().find(|r| r.item.id == id)
    }
}

fn collect<'a>(cat: &'a Category, out: &mut Vec<&'a Record>) {
    out.extend(cat.items.iter());
    for child in &cat.children {
        collect(child, out);
    }
}

pub(crate) fn scan_tree(root_abs: &Path, trash_dir: &str) -> Result<Tree> {
    let root = scan_category(root_abs, Path::new(""), true, trash_dir, false)?;
    Ok(Tree { root })
}

fn scan_category(
    abs: &Path,
    rel: &Path,
    at_root: bool,
    trash_dir: &str,
    in_trash: bool,
) -> Result<Category> {
    let mut items = Vec::new();
    let mut children = Vec::new();

    let mut entries: Vec<_> = std::fs::read_dir(abs)?
        .filter_map(|e| e.ok())
        .collect();
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        if !file_type.is_dir() {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str().map(str::to_string) else {
            continue;
        };
        let is_trash = at_root && name == trash_dir;
        if name.starts_with('.') && !is_trash {
            continue;
        }

        let child_abs = entry.path();
        let child_rel = rel.join(&name);
        if is_item_dir(&child_abs) {
            match Record::load(&child_abs, &child_rel, in_trash || is_trash) {
                Ok(record) => items.push(record),
                // One unreadable record never aborts the scan.
                Err(e) => tracing::warn!("skipping unreadable record {}: {e}", child_rel.display()),
            }
        } else {
            match scan_category(&child_abs, &child_rel, false, trash_dir, in_trash || is_trash) {
                Ok(cat) => children.push(cat),
                Err(e) => tracing::warn!("skipping unreadable category {}: {e}", child_rel.display()),
            }
        }
    }

    Ok(Category {
        name: abs
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("")
            .to_string(),
        path: rel.to_path_buf(),
        items,
        children,
    })
}
