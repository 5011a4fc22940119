//! Namespace lifecycle: create, populate, run, destroy
//!
//! Every invocation gets a schema of its own, named by a fresh random
//! identifier. The requested tables and their dependencies are created in it,
//! the test body runs against a session whose search_path is that schema, and
//! the schema is dropped with everything in it afterwards, whatever happened
//! in between.

pub mod guard;

pub use guard::NamespaceGuard;

use crate::backend::{Connector, Executor, ScopedSession};
use crate::config::IsolatorConfig;
use crate::error::{IsolateError, IsolateResult};
use crate::ident::IdGenerator;
use crate::metrics::metrics_api;
use crate::schema::SchemaRegistry;

/// Runs tests in throwaway namespaces of one database
///
/// Cheap to share across threads: the registry is read-only, every
/// invocation opens its own connections, and the name generator locks
/// internally.
#[derive(Debug)]
pub struct Isolator<C: Connector> {
    connector: C,
    registry: SchemaRegistry,
    ids: IdGenerator,
}

impl<C: Connector> Isolator<C> {
    /// Build an isolator, checking that the database is reachable
    pub fn new(connector: C, registry: SchemaRegistry) -> IsolateResult<Self> {
        Self::with_config(connector, registry, &IsolatorConfig::default())
    }

    pub fn with_config(connector: C, registry: SchemaRegistry, config: &IsolatorConfig) -> IsolateResult<Self> {
        let ids = IdGenerator::from_config(config)?;

        // Opened only to fail early on a bad target
        drop(connector.connect()?);
        log::debug!(
            "isolator ready: {} tables registered, target {}",
            registry.len(),
            connector.target()
        );

        Ok(Self {
            connector,
            registry,
            ids,
        })
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Run `body` in a fresh namespace holding `tables` and their dependencies
    ///
    /// The namespace is dropped before this returns, on success, on error and
    /// during unwinding. A failed drop is logged and counted but never
    /// replaces the result.
    ///
    /// # Errors
    /// Resolution errors (`UnknownTable`, `DependencyCycle`) before anything is
    /// created; `ConnectionFailed`, `NamespaceCreateFailed` or `SetupFailed`
    /// before the body runs; otherwise whatever `body` returns.
    pub fn run_isolated<S, T, E, F>(&self, tables: &[S], body: F) -> Result<T, E>
    where
        S: AsRef<str>,
        E: From<IsolateError>,
        F: FnOnce(&mut C::Session) -> Result<T, E>,
    {
        metrics_api::record_invocation();

        let result = self.invoke(tables, body);
        if result.is_err() {
            metrics_api::record_failed_invocation();
        }
        result
    }

    /// `run_isolated` for test functions: any setup failure panics
    ///
    /// # Panics
    /// If resolution, connection, namespace creation or table setup fails.
    pub fn runner<S, T, F>(&self, tables: &[S], body: F) -> T
    where
        S: AsRef<str>,
        F: FnOnce(&mut C::Session) -> T,
    {
        match self.run_isolated(tables, |session| Ok::<T, IsolateError>(body(session))) {
            Ok(value) => value,
            Err(e) => panic!("pg_isolate: {e}"),
        }
    }

    fn invoke<S, T, E, F>(&self, tables: &[S], body: F) -> Result<T, E>
    where
        S: AsRef<str>,
        E: From<IsolateError>,
        F: FnOnce(&mut C::Session) -> Result<T, E>,
    {
        let build_list = self.registry.resolve(tables)?;
        let namespace = self.ids.next_id();

        let guard = NamespaceGuard::create(self.connector.connect()?, &namespace)?;
        let outcome = self.populate_and_run(guard.name(), &build_list, body);

        if let Err(e) = guard.destroy() {
            log::warn!("{}", e);
        }
        outcome
    }

    /// Session lives only inside this call, so it is closed before the drop
    fn populate_and_run<T, E, F>(&self, namespace: &str, build_list: &[&str], body: F) -> Result<T, E>
    where
        E: From<IsolateError>,
        F: FnOnce(&mut C::Session) -> Result<T, E>,
    {
        let mut session = self.connector.connect_scoped(namespace)?;
        self.populate(&mut session, build_list)?;
        body(&mut session)
    }

    fn populate(&self, session: &mut C::Session, build_list: &[&str]) -> IsolateResult<()> {
        for &table in build_list {
            let schema = self.registry.require(table, None)?;
            log::debug!("{}: creating table {}", session.namespace(), table);

            session
                .execute(&schema.setup_sql)
                .map_err(|e| IsolateError::SetupFailed {
                    table: table.to_string(),
                    statement: schema.setup_sql.clone(),
                    error: e.cause(),
                })?;
            metrics_api::record_setup_statement();
        }
        Ok(())
    }
}
