use pgrx::prelude::*;
use pgrx::{FromDatum, IntoDatum};

use crate::backend::{drop_schema_statement, Connector, Executor, ScopedSession};
use crate::error::{IsolateError, IsolateResult};
use crate::namespace::Isolator;
use crate::schema::SchemaRegistry;
use crate::utils::{spi_get_string, spi_run};
use crate::validation::{quote_ident, quote_literal, validate_namespace_name};

/// Runs everything in the calling backend, inside the caller's transaction
///
/// A PostgreSQL ERROR raised by a setup statement or the test body aborts the
/// whole transaction, which rolls back the namespace along with it.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpiConnector;

/// Admin handle; SPI needs no connection of its own
#[derive(Debug)]
pub struct SpiConnection;

impl Executor for SpiConnection {
    fn execute(&mut self, statement: &str) -> IsolateResult<()> {
        spi_run(statement)
    }

    fn rolls_back_on_panic(&self) -> bool {
        true
    }

    /// A failing DROP would raise an ERROR and abort the caller's
    /// transaction, so a vanished namespace is caught before issuing it
    fn drop_schema(&mut self, namespace: &str) -> IsolateResult<()> {
        let statement = drop_schema_statement(namespace);
        let lookup = format!(
            "SELECT EXISTS(SELECT 1 FROM pg_catalog.pg_namespace WHERE nspname = {})",
            quote_literal(namespace)
        );
        let exists = Spi::get_one::<bool>(&lookup).map_err(|e| IsolateError::SpiError {
            query: lookup.clone(),
            error: e.to_string(),
        })?;

        if exists != Some(true) {
            return Err(IsolateError::ExecutionFailed {
                statement,
                error: format!("schema \"{namespace}\" does not exist"),
            });
        }
        spi_run(&statement)
    }
}

/// search_path is switched to the namespace for the session's lifetime
#[derive(Debug)]
pub struct SpiSession {
    namespace: String,
    previous_search_path: Option<String>,
}

impl SpiSession {
    /// Fetch a single value with the session's search_path in effect
    pub fn get_one<A: FromDatum + IntoDatum>(&self, query: &str) -> IsolateResult<Option<A>> {
        Spi::get_one::<A>(query).map_err(|e| IsolateError::SpiError {
            query: query.to_string(),
            error: e.to_string(),
        })
    }
}

impl Executor for SpiSession {
    fn execute(&mut self, statement: &str) -> IsolateResult<()> {
        spi_run(statement)
    }

    fn rolls_back_on_panic(&self) -> bool {
        true
    }
}

impl ScopedSession for SpiSession {
    fn namespace(&self) -> &str {
        &self.namespace
    }
}

impl Drop for SpiSession {
    fn drop(&mut self) {
        // An aborting transaction reverts the SET on its own
        if std::thread::panicking() {
            return;
        }
        if let Some(previous) = self.previous_search_path.take() {
            let restore = format!(
                "SELECT pg_catalog.set_config('search_path', {}, false)",
                quote_literal(&previous)
            );
            if let Err(e) = spi_run(&restore) {
                log::warn!("could not restore search_path after namespace {}: {}", self.namespace, e);
            }
        }
    }
}

impl Connector for SpiConnector {
    type Conn = SpiConnection;
    type Session = SpiSession;

    fn target(&self) -> String {
        "current backend (SPI)".to_string()
    }

    fn connect(&self) -> IsolateResult<SpiConnection> {
        Ok(SpiConnection)
    }

    fn connect_scoped(&self, namespace: &str) -> IsolateResult<SpiSession> {
        validate_namespace_name(namespace)?;

        let previous_search_path =
            spi_get_string("SELECT pg_catalog.current_setting('search_path')")?;
        spi_run(&format!("SET search_path TO {}", quote_ident(namespace)))?;

        Ok(SpiSession {
            namespace: namespace.to_string(),
            previous_search_path,
        })
    }
}

impl Isolator<SpiConnector> {
    /// Isolator for code already running inside PostgreSQL
    pub fn in_process(registry: SchemaRegistry) -> IsolateResult<Self> {
        Self::new(SpiConnector, registry)
    }
}

#[cfg(any(test, feature = "pg_test"))]
#[pg_schema]
mod tests {
    use pgrx::prelude::*;

    use super::*;

    fn namespace_exists(name: &str) -> bool {
        Spi::get_one::<bool>(&format!(
            "SELECT EXISTS(SELECT 1 FROM pg_namespace WHERE nspname = {})",
            quote_literal(name)
        ))
        .unwrap()
        .unwrap_or(false)
    }

    #[pg_test]
    fn test_scoped_session_switches_and_restores_search_path() {
        let before = spi_get_string("SELECT pg_catalog.current_setting('search_path')").unwrap();

        Spi::run("CREATE SCHEMA \"ScopedCheck\"").unwrap();
        {
            let mut session = SpiConnector.connect_scoped("ScopedCheck").unwrap();
            assert_eq!(session.namespace(), "ScopedCheck");
            session.execute("CREATE TABLE marker (id INT)").unwrap();

            let schema = session
                .get_one::<String>("SELECT table_schema::text FROM information_schema.tables WHERE table_name = 'marker'")
                .unwrap();
            assert_eq!(schema.as_deref(), Some("ScopedCheck"));
        }

        assert_eq!(spi_get_string("SELECT pg_catalog.current_setting('search_path')").unwrap(), before);
        Spi::run("DROP SCHEMA \"ScopedCheck\" CASCADE").unwrap();
        assert!(!namespace_exists("ScopedCheck"));
    }

    #[pg_test]
    fn test_drop_schema_of_missing_namespace_is_err() {
        let mut conn = SpiConnector.connect().unwrap();

        let err = conn.drop_schema("NeverCreated").unwrap_err();
        assert!(err.cause().contains("does not exist"));

        // The transaction is still usable afterwards
        assert_eq!(Spi::get_one::<i32>("SELECT 1").unwrap(), Some(1));
    }

    #[pg_test]
    fn test_drop_schema_removes_namespace_and_contents() {
        Spi::run("CREATE SCHEMA \"DropCheck\"").unwrap();
        Spi::run("CREATE TABLE \"DropCheck\".t (id INT)").unwrap();

        SpiConnector.connect().unwrap().drop_schema("DropCheck").unwrap();
        assert!(!namespace_exists("DropCheck"));
    }

    #[pg_test]
    fn test_scoped_session_rejects_bad_name() {
        let err = SpiConnector.connect_scoped("x; DROP SCHEMA public").unwrap_err();
        assert_eq!(err.sqlstate(), "42602");
    }
}
