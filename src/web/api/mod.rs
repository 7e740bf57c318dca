//! Read-only JSON endpoints.

pub mod catalog;
pub mod nodes;
pub mod tasks;

pub use catalog::list_catalog;
pub use nodes::{get_node, list_nodes};
pub use tasks::{get_task, list_tasks};
