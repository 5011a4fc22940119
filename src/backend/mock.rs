//! In-memory backend that records statements and tracks schemas

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::backend::{Connector, Executor, ScopedSession};
use crate::error::{IsolateError, IsolateResult};

#[derive(Debug, Default)]
struct MockState {
    statements: Vec<String>,
    schemas: BTreeSet<String>,
    fail_on: Vec<String>,
    refuse_connections: bool,
    refuse_scoped: bool,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct MockConnector {
    state: Arc<Mutex<MockState>>,
}

impl MockConnector {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fail every statement containing `pattern`
    pub(crate) fn failing_on(self, pattern: &str) -> Self {
        self.lock().fail_on.push(pattern.to_string());
        self
    }

    pub(crate) fn refuse_connections(self) -> Self {
        self.lock().refuse_connections = true;
        self
    }

    pub(crate) fn refuse_scoped(self) -> Self {
        self.lock().refuse_scoped = true;
        self
    }

    /// Every statement run so far, prefixed with `admin: ` or `<namespace>: `
    pub(crate) fn statements(&self) -> Vec<String> {
        self.lock().statements.clone()
    }

    pub(crate) fn live_schemas(&self) -> Vec<String> {
        self.lock().schemas.iter().cloned().collect()
    }

    /// Simulate someone else dropping the schema mid-test
    pub(crate) fn drop_externally(&self, name: &str) {
        self.lock().schemas.remove(name);
    }
}

fn quoted_name(statement: &str, prefix: &str) -> Option<String> {
    let rest = statement.strip_prefix(prefix)?.strip_prefix('"')?;
    let end = rest.find('"')?;
    Some(rest[..end].to_string())
}

#[derive(Debug)]
pub(crate) struct MockConn {
    state: Arc<Mutex<MockState>>,
    scope: Option<String>,
}

impl Executor for MockConn {
    fn execute(&mut self, statement: &str) -> IsolateResult<()> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let origin = self.scope.as_deref().unwrap_or("admin");
        state.statements.push(format!("{origin}: {statement}"));

        let failure = |error: &str| IsolateError::ExecutionFailed {
            statement: statement.to_string(),
            error: error.to_string(),
        };

        if state.fail_on.iter().any(|p| statement.contains(p.as_str())) {
            return Err(failure("injected failure"));
        }

        if let Some(name) = quoted_name(statement, "CREATE SCHEMA ") {
            if !state.schemas.insert(name.clone()) {
                return Err(failure(&format!("schema \"{name}\" already exists")));
            }
        } else if let Some(name) = quoted_name(statement, "DROP SCHEMA ") {
            if !state.schemas.remove(&name) {
                return Err(failure(&format!("schema \"{name}\" does not exist")));
            }
        }

        Ok(())
    }
}

impl ScopedSession for MockConn {
    fn namespace(&self) -> &str {
        self.scope.as_deref().unwrap_or("")
    }
}

impl Connector for MockConnector {
    type Conn = MockConn;
    type Session = MockConn;

    fn target(&self) -> String {
        "mock".to_string()
    }

    fn connect(&self) -> IsolateResult<MockConn> {
        if self.lock().refuse_connections {
            return Err(IsolateError::ConnectionFailed {
                target: self.target(),
                error: "connection refused".to_string(),
            });
        }
        Ok(MockConn {
            state: Arc::clone(&self.state),
            scope: None,
        })
    }

    fn connect_scoped(&self, namespace: &str) -> IsolateResult<MockConn> {
        let state = self.lock();
        if state.refuse_connections || state.refuse_scoped {
            return Err(IsolateError::ConnectionFailed {
                target: format!("mock (namespace {namespace})"),
                error: "connection refused".to_string(),
            });
        }
        Ok(MockConn {
            state: Arc::clone(&self.state),
            scope: Some(namespace.to_string()),
        })
    }
}
