//! Static file server for the local network.
//!
//! Serves a directory over HTTP on all interfaces, disables client-side
//! caching, and prints the LAN address together with a QR code so another
//! device can open it by pointing a camera at the terminal.

pub mod announce;
pub mod config;
pub mod error;
pub mod handlers;
pub mod net;
pub mod routes;
pub mod server;

use std::path::PathBuf;

pub use config::ServerConfig;
pub use error::{AnnounceError, ConfigError, RequestError, ServeError};
pub use server::Server;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Root directory to serve files from
    pub root_dir: PathBuf,
}

impl AppState {
    /// Create a new AppState serving the given root directory.
    pub fn new(root_dir: PathBuf) -> Self {
        Self { root_dir }
    }
}
