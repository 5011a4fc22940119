use pgrx::prelude::*;
use pgrx::JsonB;

pub mod backend;
pub mod config;
pub mod dependency;
pub mod error;
pub mod ident;
pub mod metrics;
pub mod namespace;
pub mod pglog;
pub mod schema;
pub mod validation;
mod utils;

pub use backend::spi::SpiConnector;
pub use backend::{Connector, Executor, ScopedSession};
pub use config::IsolatorConfig;
pub use error::{IsolateError, IsolateResult};
pub use ident::new_id;
pub use namespace::{Isolator, NamespaceGuard};
pub use schema::{SchemaRegistry, TableSchema};

#[cfg(feature = "client")]
pub use backend::client::PgConnector;

pg_module_magic!();

#[pg_guard]
extern "C" fn _PG_init() {
    pglog::init();
}

/// Get the version of the pg_isolate extension
#[pg_extern]
fn pg_isolate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Fresh random namespace name
#[pg_extern]
fn pg_isolate_new_id() -> String {
    new_id()
}

/// Build list for `tables` against a registry given as
/// `{"name": {"setup_sql": "...", "deps": ["..."]}}`
#[pg_extern]
fn pg_isolate_resolve(registry: JsonB, tables: Vec<String>) -> Vec<String> {
    let registry = match SchemaRegistry::from_value(registry.0) {
        Ok(registry) => registry,
        Err(e) => error!("{}", e),
    };
    match registry.resolve(tables.as_slice()) {
        Ok(order) => order.into_iter().map(str::to_string).collect(),
        Err(e) => error!("{}", e),
    }
}

/// Process-wide isolation counters
#[pg_extern]
fn pg_isolate_stats() -> JsonB {
    match serde_json::to_value(metrics::metrics_api::snapshot()) {
        Ok(value) => JsonB(value),
        Err(e) => error!("Failed to serialize stats: {}", e),
    }
}

#[cfg(any(test, feature = "pg_test"))]
#[pg_schema]
mod tests {
    use pgrx::prelude::*;

    use crate::backend::{Executor, ScopedSession};
    use crate::validation::quote_literal;
    use crate::{Isolator, SchemaRegistry};

    fn registry() -> SchemaRegistry {
        SchemaRegistry::new()
            .with_table(
                "users",
                "CREATE TABLE users (id SERIAL PRIMARY KEY, name TEXT NOT NULL)",
                &[],
            )
            .with_table(
                "clients",
                "CREATE TABLE clients (id SERIAL PRIMARY KEY, user_id INT NOT NULL REFERENCES users (id))",
                &["users"],
            )
            .with_table(
                "territories",
                "CREATE TABLE territories (id SERIAL PRIMARY KEY, code TEXT NOT NULL UNIQUE)",
                &[],
            )
            .with_table(
                "client_territories",
                "CREATE TABLE client_territories (\
                     client_id INT NOT NULL REFERENCES clients (id), \
                     territory_id INT NOT NULL REFERENCES territories (id), \
                     PRIMARY KEY (client_id, territory_id))",
                &["clients", "territories"],
            )
    }

    fn namespace_exists(name: &str) -> bool {
        Spi::get_one::<bool>(&format!(
            "SELECT EXISTS(SELECT 1 FROM pg_namespace WHERE nspname = {})",
            quote_literal(name)
        ))
        .unwrap()
        .unwrap_or(false)
    }

    #[pg_test]
    fn test_version_callable_from_sql() {
        let version = Spi::get_one::<String>("SELECT pg_isolate_version()").unwrap();
        assert_eq!(version.as_deref(), Some(env!("CARGO_PKG_VERSION")));
    }

    #[pg_test]
    fn test_new_id_from_sql() {
        let id = Spi::get_one::<String>("SELECT pg_isolate_new_id()").unwrap().unwrap();
        assert_eq!(id.len(), 10);
        assert!(id.chars().all(|c| c.is_ascii_alphabetic()));
    }

    #[pg_test]
    fn test_resolve_from_sql() {
        let order = Spi::get_one::<Vec<String>>(
            r#"SELECT pg_isolate_resolve(
                '{"users": {"setup_sql": ""},
                  "clients": {"setup_sql": "", "deps": ["users"]},
                  "territories": {"setup_sql": ""},
                  "client_territories": {"setup_sql": "", "deps": ["clients", "territories"]}}'::jsonb,
                ARRAY['client_territories', 'users'])"#,
        )
        .unwrap()
        .unwrap();

        assert_eq!(order, vec!["users", "clients", "territories", "client_territories"]);
    }

    #[pg_test]
    #[should_panic(expected = "Table 'nope' is not registered")]
    fn test_resolve_unknown_table_raises() {
        Spi::run(r#"SELECT pg_isolate_resolve('{"users": {"setup_sql": ""}}'::jsonb, ARRAY['nope'])"#)
            .unwrap();
    }

    #[pg_test]
    fn test_stats_from_sql() {
        let stats = Spi::get_one::<pgrx::JsonB>("SELECT pg_isolate_stats()").unwrap().unwrap();
        assert!(stats.0.get("namespaces_created").is_some());
    }

    #[pg_test]
    fn test_run_isolated_creates_and_drops_namespace() {
        let isolator = Isolator::in_process(registry()).unwrap();
        let search_path = Spi::get_one::<String>("SELECT pg_catalog.current_setting('search_path')").unwrap();

        let namespace = isolator.runner(&["client_territories"], |session| {
            let ns = session.namespace().to_string();
            assert!(namespace_exists(&ns));

            session.execute("INSERT INTO users (name) VALUES ('ada')").unwrap();
            session.execute("INSERT INTO clients (user_id) SELECT id FROM users").unwrap();
            session.execute("INSERT INTO territories (code) VALUES ('NL')").unwrap();
            session
                .execute("INSERT INTO client_territories SELECT c.id, t.id FROM clients c, territories t")
                .unwrap();

            let rows = session
                .get_one::<i64>("SELECT count(*) FROM client_territories")
                .unwrap();
            assert_eq!(rows, Some(1));

            let schemas = session
                .get_one::<i64>(
                    "SELECT count(DISTINCT table_schema) FROM information_schema.tables \
                     WHERE table_name IN ('users', 'clients', 'territories', 'client_territories')",
                )
                .unwrap();
            assert_eq!(schemas, Some(1));
            ns
        });

        assert!(!namespace_exists(&namespace));
        assert_eq!(
            Spi::get_one::<String>("SELECT pg_catalog.current_setting('search_path')").unwrap(),
            search_path
        );
    }

    #[pg_test]
    fn test_only_requested_closure_is_created() {
        let isolator = Isolator::in_process(registry()).unwrap();

        isolator.runner(&["clients"], |session| {
            let tables = session
                .get_one::<i64>(&format!(
                    "SELECT count(*) FROM information_schema.tables WHERE table_schema = '{}'",
                    session.namespace()
                ))
                .unwrap();
            assert_eq!(tables, Some(2));
        });
    }

    #[pg_test]
    fn test_body_dropping_its_namespace_keeps_result() {
        let isolator = Isolator::in_process(registry()).unwrap();
        let before = crate::metrics::metrics_api::snapshot().cleanup_failures;
        let mut namespace = String::new();

        let value = isolator.runner(&["users"], |session| {
            namespace = session.namespace().to_string();
            session
                .execute(&format!("DROP SCHEMA \"{}\" CASCADE", session.namespace()))
                .unwrap();
            1
        });

        assert_eq!(value, 1);
        assert!(!namespace_exists(&namespace));
        assert!(crate::metrics::metrics_api::snapshot().cleanup_failures > before);
        assert_eq!(Spi::get_one::<i32>("SELECT 1").unwrap(), Some(1));
    }

    #[pg_test]
    fn test_resolution_error_creates_nothing() {
        let isolator = Isolator::in_process(registry()).unwrap();
        let before = Spi::get_one::<i64>("SELECT count(*) FROM pg_namespace").unwrap();

        let result = isolator.run_isolated(&["accounts"], |_| Ok::<_, crate::IsolateError>(()));

        assert!(matches!(result, Err(crate::IsolateError::UnknownTable { .. })));
        assert_eq!(Spi::get_one::<i64>("SELECT count(*) FROM pg_namespace").unwrap(), before);
    }
}
