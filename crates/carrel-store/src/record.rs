//! On-disk record layout: one directory per item, `meta.json` + `body.md`.
//! Human-readable, git-friendly files.

use std::path::{Path, PathBuf};

use carrel_core::{Item, Result};

/// Metadata file name. A directory containing this file is an item, not a
/// category.
pub const META_FILE: &str = "meta.json";
/// Plain-text body file name.
pub const BODY_FILE: &str = "body.md";

/// A fully loaded item record.
#[derive(Debug, Clone)]
pub struct Record {
    pub item: Item,
    pub body: String,
    /// Store-relative path of the item's directory.
    pub path: PathBuf,
    /// Derived from location: true while the record sits under the trash
    /// container. Trashed items are excluded from scheduling.
    pub in_trash: bool,
}

impl Record {
    /// Load a record from its absolute directory, tagging it with the
    /// store-relative `rel` path.
    pub(crate) fn load(abs: &Path, rel: &Path, in_trash: bool) -> Result<Self> {
        let meta = std::fs::read_to_string(abs.join(META_FILE))?;
        let item: Item = serde_json::from_str(&meta)?;
        // A missing body file is an empty body, not an error; the metadata
        // write and body write are two steps and a crash can land between.
        let body = std::fs::read_to_string(abs.join(BODY_FILE)).unwrap_or_default();
        Ok(Self {
            item,
            body,
            path: rel.to_path_buf(),
            in_trash,
        })
    }

    /// True when this record is a task the scheduler should consider.
    pub fn is_schedulable(&self) -> bool {
        self.item.kind == carrel_core::ItemKind::Task && !self.in_trash
    }
}

/// True if the directory holds an item record.
pub(crate) fn is_item_dir(abs: &Path) -> bool {
    abs.join(META_FILE).is_file()
}
