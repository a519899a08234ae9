use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::db::Database;
use crate::errors::{FdepError, Result};

/// Explicit handle on the code-analysis store, passed to every tool call.
///
/// Owns the configuration and at most one open [`Database`]. A handle that
/// failed to initialize stays usable: tools report the store as unavailable
/// and the next [`recover`](CodeService::recover) tries again.
pub struct CodeService {
    config: ServerConfig,
    db: Option<Database>,
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

impl CodeService {
    /// Creates an uninitialized service.
    pub fn new(config: ServerConfig) -> Self {
        Self { config, db: None }
    }

    /// Creates a service around an already open database.
    pub fn with_database(config: ServerConfig, db: Database) -> Self {
        Self {
            config,
            db: Some(db),
        }
    }

    /// Opens the configured database.
    ///
    /// Configuration problems are logged, not fatal: the database path is
    /// the only thing the store needs.
    pub fn initialize(&mut self) -> Result<()> {
        for problem in self.config.validate() {
            warn!(problem = %problem, "configuration issue");
        }

        let path = self.config.db_path.clone();
        info!(db = %path.display(), "opening code-analysis database");
        match Database::open(&path) {
            Ok(db) => {
                self.db = Some(db);
                info!("database ready");
                Ok(())
            }
            Err(e) => {
                self.db = None;
                warn!(error = %e, "database initialization failed");
                Err(e)
            }
        }
    }

    /// Returns `true` when a database is open.
    pub fn is_initialized(&self) -> bool {
        self.db.is_some()
    }

    /// Drops the current handle and reopens the database.
    pub fn recover(&mut self) -> Result<()> {
        warn!("recovering database session");
        if let Some(db) = self.db.take() {
            db.close();
        }
        self.initialize()
    }

    /// Closes the database. The service can be initialized again afterwards.
    pub fn cleanup(&mut self) {
        if let Some(db) = self.db.take() {
            debug!("closing database");
            db.close();
        }
    }

    /// The open database, or `Unavailable`.
    pub fn db(&self) -> Result<&Database> {
        self.db.as_ref().ok_or_else(|| FdepError::Unavailable {
            message: format!(
                "database not initialized; check that {} exists and was imported from FDEP_PATH",
                self.config.db_path.display()
            ),
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Clamps a caller-supplied limit to the configured maximum.
    pub fn clamp_limit(&self, limit: usize) -> usize {
        limit.clamp(1, self.config.max_results)
    }

    /// Clamps a caller-supplied depth to the configured maximum.
    pub fn clamp_depth(&self, depth: usize) -> usize {
        depth.min(self.config.max_depth)
    }
}

impl Drop for CodeService {
    fn drop(&mut self) {
        self.cleanup();
    }
}
