//! In-process monitor backed by a static TOML fixture.
//!
//! Stands in for the real monitoring engine in development deployments and
//! in tests. Every account sees the same tree.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

use mobile_protocol::NodeSnapshot;
use serde::Deserialize;

use super::{Monitor, MonitorError, RootNode};
use crate::error::{MobileServerError, Result};

#[derive(Debug, Clone, Deserialize)]
pub struct MonitorFixture {
    #[serde(default)]
    pub accounts: Vec<FixtureAccount>,
    pub tree: NodeSnapshot,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FixtureAccount {
    pub username: String,
    /// bcrypt hash; takes precedence over `password`.
    #[serde(default)]
    pub password_hash: Option<String>,
    /// Plain-text password, for local development only.
    #[serde(default)]
    pub password: Option<String>,
}

impl FixtureAccount {
    pub fn verify_password(&self, password: &str) -> std::result::Result<bool, MonitorError> {
        match (&self.password_hash, &self.password) {
            (Some(hash), _) => bcrypt::verify(password, hash).map_err(|e| {
                MonitorError::Unavailable(format!(
                    "unreadable password hash for '{}': {}",
                    self.username, e
                ))
            }),
            (None, Some(plain)) => Ok(plain == password),
            (None, None) => Ok(false),
        }
    }
}

impl MonitorFixture {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            MobileServerError::Config(format!("Failed to read monitor fixture: {}", e))
        })?;

        toml::from_str(&content).map_err(|e| {
            MobileServerError::Config(format!("Failed to parse monitor fixture: {}", e))
        })
    }
}

/// Root whose tree can be swapped out; readers keep the tree they got.
pub struct StaticRoot {
    tree: RwLock<Arc<NodeSnapshot>>,
}

impl StaticRoot {
    pub fn new(tree: NodeSnapshot) -> Self {
        Self {
            tree: RwLock::new(Arc::new(tree)),
        }
    }

    /// Publishes a new tree. Snapshots taken earlier are unaffected.
    pub fn replace(&self, tree: NodeSnapshot) {
        *self.tree.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(tree);
    }
}

impl RootNode for StaticRoot {
    fn snapshot(&self) -> std::result::Result<Arc<NodeSnapshot>, MonitorError> {
        Ok(self
            .tree
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }
}

pub struct StaticMonitor {
    accounts: HashMap<String, FixtureAccount>,
    root: Arc<StaticRoot>,
}

impl StaticMonitor {
    pub fn new(fixture: MonitorFixture) -> Self {
        let accounts = fixture
            .accounts
            .into_iter()
            .map(|account| (account.username.clone(), account))
            .collect();

        Self {
            accounts,
            root: Arc::new(StaticRoot::new(fixture.tree)),
        }
    }

    pub fn root(&self) -> Arc<StaticRoot> {
        self.root.clone()
    }

    pub fn account_count(&self) -> usize {
        self.accounts.len()
    }
}

impl Monitor for StaticMonitor {
    fn login(
        &self,
        locale: &str,
        username: &str,
        password: &str,
    ) -> std::result::Result<Arc<dyn RootNode>, MonitorError> {
        let account = self
            .accounts
            .get(username)
            .ok_or(MonitorError::InvalidCredentials)?;

        if !account.verify_password(password)? {
            return Err(MonitorError::InvalidCredentials);
        }

        log::debug!("Fixture login for {} (locale {})", username, locale);
        let root: Arc<dyn RootNode> = self.root.clone();
        Ok(root)
    }
}
