//! Session and request correlation state for the command relay.

pub mod correlation;
pub mod sessions;

pub use correlation::{CorrelationEntry, CorrelationTable};
pub use sessions::SessionDirectory;
