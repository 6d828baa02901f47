//! Named SQL templates.
//!
//! The core never inspects or rewrites template bodies; it resolves a name
//! to an opaque string and hands it to the driver.

use crate::error::AccessError;
use std::collections::HashMap;

/// Template names the core itself consumes.
pub mod names {
    pub const CHECK_HEALTH: &str = "CHECK_HEALTH";
    pub const LOG_INSIGHT: &str = "LOG_INSIGHT";
    pub const LOG_PROVENANCE: &str = "LOG_PROVENANCE";
    pub const GET_PROVENANCE: &str = "GET_PROVENANCE";
    pub const GET_INSIGHTS_BY_CUSTOMER: &str = "GET_INSIGHTS_BY_CUSTOMER";
    pub const GET_INSIGHTS_BY_SUBJECT: &str = "GET_INSIGHTS_BY_SUBJECT";
    pub const GET_INSIGHTS_BY_SUBJECT_METRIC: &str = "GET_INSIGHTS_BY_SUBJECT_METRIC";
}

/// Catalog mapping template names to SQL bodies.
#[derive(Debug, Clone, Default)]
pub struct TemplateCatalog {
    templates: HashMap<String, String>,
}

impl TemplateCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a template, replacing any previous body under the name.
    pub fn insert(&mut self, name: impl Into<String>, sql: impl Into<String>) -> &mut Self {
        self.templates.insert(name.into(), sql.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.templates.get(name).map(String::as_str)
    }

    /// Resolve a name or fail with [`AccessError::UnknownTemplate`].
    pub fn resolve(&self, name: &str) -> Result<&str, AccessError> {
        self.get(name)
            .ok_or_else(|| AccessError::UnknownTemplate(name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_known_and_unknown() {
        let mut catalog = TemplateCatalog::new();
        catalog.insert(names::CHECK_HEALTH, "SELECT 1");

        assert_eq!(catalog.resolve(names::CHECK_HEALTH).unwrap(), "SELECT 1");
        let err = catalog.resolve("NOPE").unwrap_err();
        assert!(matches!(err, AccessError::UnknownTemplate(name) if name == "NOPE"));
    }

    #[test]
    fn insert_replaces() {
        let mut catalog = TemplateCatalog::new();
        catalog.insert("T", "SELECT 1");
        catalog.insert("T", "SELECT 2");
        assert_eq!(catalog.get("T"), Some("SELECT 2"));
        assert_eq!(catalog.len(), 1);
    }
}
