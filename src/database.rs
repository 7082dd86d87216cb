use crate::catalog::Catalog;
use crate::config::EngineConfig;
use crate::session::Session;
use log::info;
use parking_lot::RwLock;
use std::sync::Arc;

/// An in-memory database: the catalog shared by all of its sessions
pub struct Database {
    catalog: Arc<Catalog>,
    config: EngineConfig,
    lock: Arc<RwLock<()>>,
}

impl Database {
    pub fn new(config: EngineConfig) -> Self {
        info!(
            "database opened (max recursive rounds {}, default match {:?})",
            config.max_recursive_rounds, config.default_match_type
        );
        Self {
            catalog: Arc::new(Catalog::new()),
            config,
            lock: Arc::new(RwLock::new(())),
        }
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Open a session over this database
    pub fn session(&self) -> Session {
        Session::new(self.catalog.clone(), self.config.clone(), self.lock.clone())
    }

    /// Names of all tables, in creation order
    pub fn list_tables(&self) -> Vec<String> {
        self.catalog
            .list_tables()
            .iter()
            .map(|t| t.name().to_string())
            .collect()
    }
}

impl Default for Database {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::Value;

    #[test]
    fn test_sessions_share_catalog() {
        let db = Database::default();
        let mut first = db.session();
        let mut second = db.session();

        first.execute("CREATE TABLE t (a INT)").unwrap();
        first.execute("INSERT INTO t VALUES (7)").unwrap();
        let result = second.execute("SELECT a FROM t").unwrap();
        assert_eq!(result.rows().unwrap().first_column(), vec![Value::Int32(7)]);
        assert_eq!(db.list_tables(), vec!["t".to_string()]);
    }

    #[test]
    fn test_config_reaches_sessions() {
        let db = Database::new(EngineConfig::default().with_max_recursive_rounds(3));
        assert_eq!(db.session().config().max_recursive_rounds, 3);
        assert_eq!(db.config().max_recursive_rounds, 3);
    }
}
