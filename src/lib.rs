//! pistat library root.

pub mod agent;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod controller;
pub mod engine;
pub mod error;
pub mod hub;
pub mod logging;
pub mod presence;
pub mod protocol;
pub mod registry;
pub mod relay;
pub mod store;
pub mod telemetry;
pub mod web;

pub use cli::Commands;
pub use config::{load_settings, Settings};
pub use controller::Controller;
pub use error::{Error, Result};
pub use web::{run_server, WebServerConfig};
