//! Database backends
//!
//! The lifecycle manager only needs two things from a database: run a
//! statement, and open a session whose unqualified names resolve inside a
//! given namespace. `Connector` produces both kinds of handle.
//!
//! - `spi::SpiConnector`: in-process, through SPI, inside a PostgreSQL backend
//! - `client::PgConnector` (feature `client`): over a connection string

pub mod spi;

#[cfg(feature = "client")]
pub mod client;

#[cfg(test)]
pub(crate) mod mock;

use crate::error::IsolateResult;
use crate::validation::quote_ident;

/// Handle that executes SQL verbatim
pub trait Executor {
    fn execute(&mut self, statement: &str) -> IsolateResult<()>;

    /// True when a panic aborts the surrounding transaction, undoing any DDL
    /// this handle ran; cleanup is then skipped during unwinding
    fn rolls_back_on_panic(&self) -> bool {
        false
    }

    /// Drop `namespace` with everything in it
    ///
    /// Must report a missing namespace as `Err`, never by unwinding.
    fn drop_schema(&mut self, namespace: &str) -> IsolateResult<()> {
        self.execute(&drop_schema_statement(namespace))
    }
}

pub(crate) fn drop_schema_statement(namespace: &str) -> String {
    format!("DROP SCHEMA {} CASCADE", quote_ident(namespace))
}

/// Handle whose default object resolution is confined to one namespace
pub trait ScopedSession: Executor {
    fn namespace(&self) -> &str;
}

/// Opens handles to one database
pub trait Connector {
    /// Handle used to create and drop namespaces
    type Conn: Executor;
    /// Handle given to setup statements and the test body
    type Session: ScopedSession;

    /// Human-readable name of the database, for error messages
    fn target(&self) -> String;

    fn connect(&self) -> IsolateResult<Self::Conn>;

    /// Open a handle scoped to `namespace` (search_path)
    fn connect_scoped(&self, namespace: &str) -> IsolateResult<Self::Session>;
}
