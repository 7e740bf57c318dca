//! Web server module (Axum websockets + read-only API).

pub mod api;
pub mod dispatch;
pub mod router;
pub mod server;
pub mod socket;

pub use server::{run_server, WebServerConfig};
