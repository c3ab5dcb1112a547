//! # Carrel Core
//!
//! Shared foundation for the Carrel workbench crates:
//! - Item data model (notes, tasks, recurrence rules)
//! - Typed error taxonomy
//! - TOML configuration (~/.carrel/config.toml)

pub mod config;
pub mod error;
pub mod item;
pub mod recurrence;

pub use config::{CarrelConfig, SchedulerConfig, StoreConfig};
pub use error::{CarrelError, Result};
pub use item::{Item, ItemKind};
pub use recurrence::{ClockTime, Recurrence};
