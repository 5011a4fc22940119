use postgres::{Client, Config, NoTls};

use crate::backend::{Connector, Executor, ScopedSession};
use crate::config;
use crate::error::{IsolateError, IsolateResult};
use crate::namespace::Isolator;
use crate::schema::SchemaRegistry;
use crate::validation::{quote_ident, validate_namespace_name};

/// Connects to PostgreSQL over a libpq-style connection string
///
/// Every call opens a fresh connection, so concurrently running tests never
/// share a session or its search_path.
#[derive(Debug, Clone)]
pub struct PgConnector {
    config: Config,
    target: String,
}

impl PgConnector {
    /// Parse `conninfo` (`host=... dbname=...` or a `postgresql://` URL)
    pub fn new(conninfo: &str) -> IsolateResult<Self> {
        let config: Config = conninfo.parse().map_err(|e: postgres::Error| IsolateError::ConfigError {
            setting: "conninfo".to_string(),
            // May carry a password
            value: "<redacted>".to_string(),
            reason: e.to_string(),
        })?;
        let target = config.get_dbname().unwrap_or("postgres").to_string();

        Ok(Self { config, target })
    }

    /// Connection string from `PG_ISOLATE_DATABASE_URL`
    pub fn from_env() -> IsolateResult<Self> {
        Self::new(&config::database_url()?)
    }

    fn open(&self) -> IsolateResult<PgConnection> {
        let client = self.config.connect(NoTls).map_err(|e| IsolateError::ConnectionFailed {
            target: self.target.clone(),
            error: e.to_string(),
        })?;
        Ok(PgConnection { client })
    }
}

pub struct PgConnection {
    client: Client,
}

impl PgConnection {
    pub fn client(&mut self) -> &mut Client {
        &mut self.client
    }
}

impl Executor for PgConnection {
    fn execute(&mut self, statement: &str) -> IsolateResult<()> {
        self.client.batch_execute(statement).map_err(|e| IsolateError::ExecutionFailed {
            statement: statement.to_string(),
            error: e.to_string(),
        })
    }
}

/// Connection whose search_path is the test namespace
pub struct PgSession {
    conn: PgConnection,
    namespace: String,
}

impl PgSession {
    pub fn client(&mut self) -> &mut Client {
        self.conn.client()
    }
}

impl Executor for PgSession {
    fn execute(&mut self, statement: &str) -> IsolateResult<()> {
        self.conn.execute(statement)
    }
}

impl ScopedSession for PgSession {
    fn namespace(&self) -> &str {
        &self.namespace
    }
}

impl Connector for PgConnector {
    type Conn = PgConnection;
    type Session = PgSession;

    fn target(&self) -> String {
        self.target.clone()
    }

    fn connect(&self) -> IsolateResult<PgConnection> {
        self.open()
    }

    fn connect_scoped(&self, namespace: &str) -> IsolateResult<PgSession> {
        validate_namespace_name(namespace)?;

        let mut conn = self.open()?;
        conn.execute(&format!("SET search_path TO {}", quote_ident(namespace)))
            .map_err(|e| IsolateError::ConnectionFailed {
                target: format!("{} (namespace {})", self.target, namespace),
                error: e.cause(),
            })?;

        Ok(PgSession {
            conn,
            namespace: namespace.to_string(),
        })
    }
}

impl Isolator<PgConnector> {
    /// Isolator for a database reachable at `conninfo`
    pub fn connect(conninfo: &str, registry: SchemaRegistry) -> IsolateResult<Self> {
        Self::new(PgConnector::new(conninfo)?, registry)
    }
}
