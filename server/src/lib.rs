// Library exports for the binaries and integration tests

pub mod acceptor;
pub mod client;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod monitor;
pub mod session;
pub mod tls;

pub use error::{MobileServerError, Result};
pub use lifecycle::{MobileServer, ServerState};
