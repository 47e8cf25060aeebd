//! Driver registry for managing available database drivers

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use dbpool_core::DatabaseDriver;

/// Registry of available database drivers, keyed by DSN scheme
#[derive(Clone, Default)]
pub struct DriverRegistry {
    drivers: HashMap<String, Arc<dyn DatabaseDriver>>,
}

impl DriverRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            drivers: HashMap::new(),
        }
    }

    /// Create a registry with all built-in drivers registered
    pub fn with_defaults() -> Self {
        #[allow(unused_mut)]
        let mut registry = Self::new();

        #[cfg(feature = "mysql")]
        registry.register(Arc::new(crate::mysql::MySqlDriver::new()));

        registry
    }

    /// Register a new driver, replacing any driver with the same name
    pub fn register(&mut self, driver: Arc<dyn DatabaseDriver>) {
        let name = driver.name().to_string();
        tracing::info!(driver = %name, "registering database driver");
        self.drivers.insert(name, driver);
    }

    /// Get a driver by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn DatabaseDriver>> {
        let driver = self.drivers.get(name).cloned();
        if driver.is_none() {
            tracing::warn!(driver = %name, "driver not found in registry");
        }
        driver
    }

    /// List all registered driver names, sorted
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.drivers.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Check if a driver is registered
    pub fn has(&self, name: &str) -> bool {
        self.drivers.contains_key(name)
    }
}

impl fmt::Debug for DriverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverRegistry")
            .field("drivers", &self.list())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use dbpool_core::{Connection, DbPoolError, Dsn, Result};
    use pretty_assertions::assert_eq;

    struct NamedDriver(&'static str);

    #[async_trait]
    impl DatabaseDriver for NamedDriver {
        fn name(&self) -> &'static str {
            self.0
        }

        async fn connect(&self, _dsn: &Dsn) -> Result<Arc<dyn Connection>> {
            Err(DbPoolError::Connect("not a real driver".into()))
        }
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = DriverRegistry::new();
        assert!(!registry.has("fake"));
        assert!(registry.get("fake").is_none());

        registry.register(Arc::new(NamedDriver("fake")));
        registry.register(Arc::new(NamedDriver("another")));

        assert!(registry.has("fake"));
        assert_eq!(registry.get("fake").map(|d| d.name()), Some("fake"));
        assert_eq!(registry.list(), vec!["another", "fake"]);
    }

    #[cfg(feature = "mysql")]
    #[test]
    fn test_defaults_include_mysql() {
        let registry = DriverRegistry::with_defaults();
        assert!(registry.has("mysql"));
        assert_eq!(registry.get("mysql").and_then(|d| d.default_port()), Some(3306));
    }
}
