//! Durable state - operator override stores.

pub mod overrides;

pub use overrides::{Override, OverrideStore};

/// File name of the display label override store.
pub const LABELS_FILE: &str = "labels.json";

/// File name of the task assignment override store.
pub const ASSIGNMENTS_FILE: &str = "tasks.json";
