//! Contract with the monitoring engine that owns the status tree.
//!
//! The engine is an external collaborator: this crate only logs users in
//! and reads snapshots. Both calls may block on a remote backend, so the
//! session layer runs them on tokio's blocking pool.

pub mod fixture;

use std::sync::Arc;

use mobile_protocol::NodeSnapshot;

pub use fixture::{FixtureAccount, MonitorFixture, StaticMonitor, StaticRoot};

#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Monitoring backend unavailable: {0}")]
    Unavailable(String),
}

/// Handle on the tree visible to one authenticated user.
pub trait RootNode: Send + Sync + 'static {
    /// Returns an immutable point-in-time copy of the tree.
    ///
    /// Must be safe to call concurrently from many sessions.
    fn snapshot(&self) -> Result<Arc<NodeSnapshot>, MonitorError>;
}

/// Login entry point of the monitoring engine.
pub trait Monitor: Send + Sync + 'static {
    /// Authenticates `username`.
    ///
    /// Every failure (bad password, unknown user, backend down) is an `Err`;
    /// callers never distinguish them on the wire.
    fn login(
        &self,
        locale: &str,
        username: &str,
        password: &str,
    ) -> Result<Arc<dyn RootNode>, MonitorError>;
}
