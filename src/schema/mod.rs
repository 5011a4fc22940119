//! Schema Registry: the static table graph tests draw from
//!
//! Each entry maps a table name to the SQL that creates it and the tables it
//! needs to exist first. The registry is built once, then shared read-only by
//! every test invocation.
//!
//! ## Example
//!
//! ```rust,ignore
//! use pg_isolate::schema::SchemaRegistry;
//!
//! let registry = SchemaRegistry::new()
//!     .with_table("users", "CREATE TABLE users (id INT PRIMARY KEY)", &[])
//!     .with_table("clients", "CREATE TABLE clients (user_id INT REFERENCES users)", &["users"]);
//!
//! assert_eq!(registry.resolve(&["clients"])?, vec!["users", "clients"]);
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::dependency;
use crate::error::{IsolateError, IsolateResult};

/// Setup SQL and direct dependencies of one table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Executed verbatim inside the test namespace; never inspected
    pub setup_sql: String,
    /// Tables that must be created first, in declaration order
    #[serde(default)]
    pub deps: Vec<String>,
}

impl TableSchema {
    pub fn new(setup_sql: impl Into<String>, deps: &[&str]) -> Self {
        Self {
            setup_sql: setup_sql.into(),
            deps: deps.iter().map(|d| d.to_string()).collect(),
        }
    }
}

/// Immutable table name → `TableSchema` mapping
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchemaRegistry {
    tables: BTreeMap<String, TableSchema>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a table, replacing any previous entry with the same name
    #[must_use]
    pub fn with_table(mut self, name: &str, setup_sql: impl Into<String>, deps: &[&str]) -> Self {
        self.tables.insert(name.to_string(), TableSchema::new(setup_sql, deps));
        self
    }

    /// Parse a registry from JSON: `{"users": {"setup_sql": "...", "deps": []}}`
    pub fn from_json(json: &str) -> IsolateResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Parse a registry from an already decoded JSON value
    pub fn from_value(value: serde_json::Value) -> IsolateResult<Self> {
        Ok(serde_json::from_value(value)?)
    }

    pub fn to_json(&self) -> IsolateResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn get(&self, name: &str) -> Option<&TableSchema> {
        self.tables.get(name)
    }

    /// Look up a table that must exist
    pub(crate) fn require(&self, name: &str, referenced_by: Option<&str>) -> IsolateResult<&TableSchema> {
        self.tables.get(name).ok_or_else(|| IsolateError::UnknownTable {
            table: name.to_string(),
            referenced_by: referenced_by.map(str::to_string),
        })
    }

    /// Registry key for `name`, borrowed from the registry itself
    pub(crate) fn key(&self, name: &str) -> Option<&str> {
        self.tables.get_key_value(name).map(|(k, _)| k.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Table names in sorted order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    /// Expand `requested` into a dependency-ordered, duplicate-free build list
    pub fn resolve<S: AsRef<str>>(&self, requested: &[S]) -> IsolateResult<Vec<&str>> {
        dependency::resolve(self, requested)
    }

    /// Check the whole graph for unknown dependencies and cycles
    ///
    /// Resolution already checks the subgraph a test actually requests; this
    /// lets a suite fail fast on a broken registry before any test runs.
    pub fn validate(&self) -> IsolateResult<()> {
        let all: Vec<&str> = self.names().collect();
        dependency::resolve(self, all.as_slice()).map(|_| ())
    }
}

impl<S: Into<String>> FromIterator<(S, TableSchema)> for SchemaRegistry {
    fn from_iter<I: IntoIterator<Item = (S, TableSchema)>>(iter: I) -> Self {
        Self {
            tables: iter.into_iter().map(|(name, table)| (name.into(), table)).collect(),
        }
    }
}
