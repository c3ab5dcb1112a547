//! # Carrel Store
//!
//! Durable, contention-tolerant record store plus the stateless tree
//! scanner the scheduler re-runs every tick.
//!
//! Layout on disk: each item is a directory holding `meta.json` (metadata
//! key/values) and `body.md` (plain text). Every other directory is a
//! category. Soft-deleted items live under the `.trash` container.
//!
//! The store assumes a single owning process; concurrent external mutation
//! of the same files is undefined behavior. What it does tolerate is the
//! OS briefly locking a file mid-rename (indexers, antivirus, cloud sync):
//! relocation falls back to copy, verify, then delete-with-retry.

pub mod record;
pub mod retry;
pub mod scan;
pub mod store;

pub use record::{BODY_FILE, META_FILE, Record};
pub use retry::RetryPolicy;
pub use scan::{Category, Tree};
pub use store::RecordStore;
