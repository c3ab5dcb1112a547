//! The record store: read/write/move/trash/restore/delete primitives.
//!
//! Mutating operations either fully succeed or return a typed error.
//! Metadata is written before the body; callers tolerate eventual
//! consistency between the two if the process dies in between.
//!
//! Relocation (move, rename, trash, restore) tries a direct `fs::rename`
//! first and falls back to copy, byte-level verify, then
//! delete-original-with-retry when the OS reports a lock conflict. If the
//! delete budget is exhausted the copy is rolled back, so the store is
//! never left with both a half-copied destination and a half-deleted
//! source.

use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use carrel_core::{CarrelError, Item, Result, StoreConfig};
use chrono::Utc;

use crate::record::{BODY_FILE, META_FILE, Record, is_item_dir};
use crate::retry::RetryPolicy;
use crate::scan::{self, Tree};

/// Filesystem-backed record store rooted at a single directory.
pub struct RecordStore {
    root: PathBuf,
    config: StoreConfig,
    retry: RetryPolicy,
}

impl RecordStore {
    /// Open (creating if needed) a store at `root`.
    pub fn new(root: &Path, config: StoreConfig) -> Result<Self> {
        std::fs::create_dir_all(root)?;
        std::fs::create_dir_all(root.join(&config.trash_dir))?;
        let retry = RetryPolicy::new(
            config.retry_max_attempts,
            Duration::from_millis(config.retry_backoff_ms),
        );
        Ok(Self {
            root: root.to_path_buf(),
            config,
            retry,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Store-relative path of the trash container.
    pub fn trash_path(&self) -> PathBuf {
        PathBuf::from(&self.config.trash_dir)
    }

    /// Traversal guard: map a store-relative path to an absolute one,
    /// rejecting anything that would escape the root.
    fn resolve(&self, rel: &Path) -> Result<PathBuf> {
        let mut abs = self.root.clone();
        for comp in rel.components() {
            match comp {
                Component::Normal(c) => abs.push(c),
                Component::CurDir => {}
                _ => return Err(CarrelError::PathOutsideStore(rel.to_path_buf())),
            }
        }
        Ok(abs)
    }

    /// Scan the whole store into a category tree.
    pub fn scan(&self) -> Result<Tree> {
        scan::scan_tree(&self.root, &self.config.trash_dir)
    }

    /// Locate a record by item id (full scan; the store keeps no index).
    pub fn find(&self, id: &str) -> Result<Record> {
        let tree = self.scan()?;
        tree.flatten()
            .into_iter()
            .find(|r| r.item.id == id)
            .cloned()
            .ok_or_else(|| CarrelError::NotFound(id.to_string()))
    }

    /// Read the record at a store-relative path.
    pub fn read(&self, rel: &Path) -> Result<Record> {
        let abs = self.resolve(rel)?;
        if !is_item_dir(&abs) {
            return Err(CarrelError::NotFound(rel.display().to_string()));
        }
        Record::load(&abs, rel, rel.starts_with(self.trash_path()))
    }

    /// Persist metadata and body at `rel`, creating parent directories as
    /// needed. Returns the item with its `updated_at` stamp refreshed.
    pub fn write(&self, rel: &Path, item: &Item, body: &str) -> Result<Item> {
        let abs = self.resolve(rel)?;
        std::fs::create_dir_all(&abs)?;
        let updated = self.write_meta_at(&abs, item)?;
        std::fs::write(abs.join(BODY_FILE), body).map_err(|e| CarrelError::Persistence {
            path: abs.join(BODY_FILE),
            reason: e.to_string(),
        })?;
        Ok(updated)
    }

    /// Metadata-only patch (the scheduler's `last_notified` stamps go
    /// through here; the body is left untouched).
    pub fn write_meta(&self, rel: &Path, item: &Item) -> Result<Item> {
        let abs = self.resolve(rel)?;
        std::fs::create_dir_all(&abs)?;
        self.write_meta_at(&abs, item)
    }

    fn write_meta_at(&self, abs: &Path, item: &Item) -> Result<Item> {
        let mut updated = item.clone();
        updated.updated_at = Utc::now();
        let json = serde_json::to_string_pretty(&updated)?;
        std::fs::write(abs.join(META_FILE), json).map_err(|e| CarrelError::Persistence {
            path: abs.join(META_FILE),
            reason: e.to_string(),
        })?;
        Ok(updated)
    }

    /// Create a new item under `parent`, naming its directory from the
    /// title and disambiguating collisions with a numeric suffix.
    pub fn create(&self, parent: &Path, item: Item, body: &str) -> Result<Record> {
        let parent_abs = self.resolve(parent)?;
        std::fs::create_dir_all(&parent_abs)?;
        let name = unique_child_name(&parent_abs, &dir_name_for(&item));
        let rel = parent.join(&name);
        let abs = parent_abs.join(&name);
        std::fs::create_dir_all(&abs)?;
        let updated = self.write_meta_at(&abs, &item)?;
        std::fs::write(abs.join(BODY_FILE), body).map_err(|e| CarrelError::Persistence {
            path: abs.join(BODY_FILE),
            reason: e.to_string(),
        })?;
        Ok(Record {
            item: updated,
            body: body.to_string(),
            path: rel,
            in_trash: false,
        })
    }

    /// Relocate an item into another category, suffixing on name collision.
    pub fn move_item(&self, rel: &Path, new_parent: &Path) -> Result<Record> {
        let src = self.resolve(rel)?;
        if !is_item_dir(&src) {
            return Err(CarrelError::NotFound(rel.display().to_string()));
        }
        let parent_abs = self.resolve(new_parent)?;
        std::fs::create_dir_all(&parent_abs)?;
        let name = file_name_of(rel)?;
        let dest_name = unique_child_name(&parent_abs, &name);
        self.relocate(&src, &parent_abs.join(&dest_name))?;
        self.read(&new_parent.join(dest_name))
    }

    /// Rename a category directory in place. Direct rename first; lock
    /// conflicts fall back to copy-verify-delete with rollback.
    pub fn rename_container(&self, rel: &Path, new_name: &str) -> Result<PathBuf> {
        let src = self.resolve(rel)?;
        if !src.is_dir() {
            return Err(CarrelError::NotFound(rel.display().to_string()));
        }
        let parent_rel = rel.parent().unwrap_or(Path::new("")).to_path_buf();
        let new_rel = parent_rel.join(new_name);
        // Re-resolving validates the new name (no separators, no dot-dot).
        let dst = self.resolve(&new_rel)?;
        if new_name.is_empty() || dst.components().count() != src.components().count() {
            return Err(CarrelError::PathOutsideStore(PathBuf::from(new_name)));
        }
        if dst.exists() {
            return Err(CarrelError::Persistence {
                path: dst,
                reason: "destination already exists".into(),
            });
        }
        self.relocate(&src, &dst)?;
        Ok(new_rel)
    }

    /// Soft-delete: record the original location in the item's own
    /// metadata, then relocate it into the trash container.
    pub fn trash(&self, rel: &Path) -> Result<Record> {
        let record = self.read(rel)?;
        if record.in_trash {
            return Ok(record);
        }
        let mut item = record.item;
        item.original_path = Some(rel.to_string_lossy().into_owned());
        let src = self.resolve(rel)?;
        self.write_meta_at(&src, &item)?;

        let trash_abs = self.root.join(&self.config.trash_dir);
        std::fs::create_dir_all(&trash_abs)?;
        let dest_name = unique_child_name(&trash_abs, &file_name_of(rel)?);
        self.relocate(&src, &trash_abs.join(&dest_name))?;
        tracing::info!("🗑️ Trashed '{}' from {}", item.title, rel.display());
        self.read(&self.trash_path().join(dest_name))
    }

    /// Restore a trashed item to its saved original location, falling back
    /// to the default container when that location is gone.
    pub fn restore(&self, rel: &Path) -> Result<Record> {
        let record = self.read(rel)?;
        let saved = record.item.original_path.clone().map(PathBuf::from);

        let (mut parent_rel, name) = match &saved {
            Some(orig) => (
                orig.parent().unwrap_or(Path::new("")).to_path_buf(),
                file_name_of(orig)?,
            ),
            None => (
                PathBuf::from(&self.config.default_container),
                file_name_of(rel)?,
            ),
        };
        let mut parent_abs = self.resolve(&parent_rel)?;
        if !parent_abs.is_dir() {
            parent_rel = PathBuf::from(&self.config.default_container);
            parent_abs = self.resolve(&parent_rel)?;
            std::fs::create_dir_all(&parent_abs)?;
        }

        let src = self.resolve(rel)?;
        let dest_name = unique_child_name(&parent_abs, &name);
        let dest_abs = parent_abs.join(&dest_name);
        self.relocate(&src, &dest_abs)?;

        // Clear the saved location only once the item has left the trash;
        // a failed relocation must keep it for the retried restore.
        let mut item = record.item;
        item.original_path = None;
        self.write_meta_at(&dest_abs, &item)?;
        tracing::info!("♻️ Restored '{}' to {}", item.title, parent_rel.display());
        self.read(&parent_rel.join(dest_name))
    }

    /// Unconditional recursive removal (with the contention retry budget,
    /// since deletes hit the same transient locks renames do).
    pub fn delete_permanent(&self, rel: &Path) -> Result<()> {
        let abs = self.resolve(rel)?;
        if !abs.exists() {
            return Err(CarrelError::NotFound(rel.display().to_string()));
        }
        self.retry
            .run(|| remove_tree_once(&abs), std::thread::sleep)
            .map_err(|e| CarrelError::Contention {
                path: abs.clone(),
                attempts: self.retry.max_attempts,
                source: e,
            })
    }

    /// Move a directory, falling back to copy-then-delete on lock errors.
    fn relocate(&self, src: &Path, dst: &Path) -> Result<()> {
        match std::fs::rename(src, dst) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(CarrelError::NotFound(src.display().to_string()))
            }
            Err(e)
                if CarrelError::is_contention_kind(&e)
                    || e.kind() == io::ErrorKind::CrossesDevices =>
            {
                tracing::warn!(
                    "direct rename {} -> {} failed ({e}), falling back to copy-then-delete",
                    src.display(),
                    dst.display()
                );
                self.copy_then_delete(src, dst)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn copy_then_delete(&self, src: &Path, dst: &Path) -> Result<()> {
        self.copy_then_delete_with(src, dst, &mut remove_tree_once, &mut std::thread::sleep)
    }

    /// Fallback relocation: recursive copy, byte-level verify, then delete
    /// the original under the retry budget. `remove` and `sleep` are
    /// injected so contention and rollback are testable without real locks
    /// or real delays.
    pub(crate) fn copy_then_delete_with(
        &self,
        src: &Path,
        dst: &Path,
        remove: &mut dyn FnMut(&Path) -> io::Result<()>,
        sleep: &mut dyn FnMut(Duration),
    ) -> Result<()> {
        copy_dir_recursive(src, dst)?;
        if let Err(mismatch) = verify_copy(src, dst) {
            std::fs::remove_dir_all(dst).ok();
            return Err(CarrelError::Persistence {
                path: dst.to_path_buf(),
                reason: format!("copy verification failed: {mismatch}"),
            });
        }
        match self.retry.run(|| remove(src), sleep) {
            Ok(()) => Ok(()),
            Err(e) => {
                // Roll back the copy rather than leaving two half-states.
                std::fs::remove_dir_all(dst).ok();
                Err(CarrelError::Contention {
                    path: src.to_path_buf(),
                    attempts: self.retry.max_attempts,
                    source: e,
                })
            }
        }
    }
}

/// Directory name for a new item: slugified title, id prefix as fallback.
fn dir_name_for(item: &Item) -> String {
    let mut out = String::new();
    for c in item.title.trim().chars() {
        if c.is_alphanumeric() {
            out.extend(c.to_lowercase());
        } else if !out.is_empty() && !out.ends_with('-') {
            out.push('-');
        }
    }
    let out = out.trim_matches('-').to_string();
    if out.is_empty() {
        format!("item-{}", &item.id[..item.id.len().min(8)])
    } else {
        out
    }
}

/// First free name under `parent`: `name`, then `name-2`, `name-3`, ...
fn unique_child_name(parent_abs: &Path, name: &str) -> String {
    if !parent_abs.join(name).exists() {
        return name.to_string();
    }
    let mut n = 2;
    loop {
        let candidate = format!("{name}-{n}");
        if !parent_abs.join(&candidate).exists() {
            return candidate;
        }
        n += 1;
    }
}

fn file_name_of(rel: &Path) -> Result<String> {
    rel.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| CarrelError::PathOutsideStore(rel.to_path_buf()))
}

/// One deletion attempt: children first, then the emptied directory.
fn remove_tree_once(path: &Path) -> io::Result<()> {
    for entry in std::fs::read_dir(path)? {
        let entry = entry?;
        let p = entry.path();
        if entry.file_type()?.is_dir() {
            remove_tree_once(&p)?;
        } else {
            std::fs::remove_file(&p)?;
        }
    }
    std::fs::remove_dir(path)
}

fn copy_dir_recursive(src: &Path, dst: &Path) -> io::Result<()> {
    std::fs::create_dir_all(dst)?;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let from = entry.path();
        let to = dst.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_recursive(&from, &to)?;
        } else {
            std::fs::copy(&from, &to)?;
        }
    }
    Ok(())
}

/// Compare the copied tree byte-for-byte against the source.
fn verify_copy(src: &Path, dst: &Path) -> std::result::Result<(), String> {
    let entries = std::fs::read_dir(src).map_err(|e| format!("read {}: {e}", src.display()))?;
    for entry in entries {
        let entry = entry.map_err(|e| e.to_string())?;
        let from = entry.path();
        let to = dst.join(entry.file_name());
        let is_dir = entry
            .file_type()
            .map_err(|e| e.to_string())?
            .is_dir();
        if is_dir {
            verify_copy(&from, &to)?;
        } else {
            let a = std::fs::read(&from).map_err(|e| format!("read {}: {e}", from.display()))?;
            let b = std::fs::read(&to)
                .map_err(|_| format!("missing in copy: {}", to.display()))?;
            if a != b {
                return Err(format!("content mismatch: {}", to.display()));
            }
        }
    }
    Ok(())
}
