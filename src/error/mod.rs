use std::fmt;

pub mod testing;

/// Main error type for pg_isolate
#[derive(Debug, Clone, PartialEq)]
pub enum IsolateError {
    // ============ Configuration Errors (42xxx / 22xxx) ============
    /// Table name not present in the schema registry
    UnknownTable {
        table: String,
        /// Table whose dependency list named `table`; `None` for a direct request
        referenced_by: Option<String>,
    },

    /// Dependency cycle detected while resolving a build list
    DependencyCycle {
        cycle: Vec<String>,
    },

    /// Identifier cannot be embedded in SQL
    InvalidIdentifier {
        value: String,
        reason: String,
    },

    /// Configuration error (bad setting value)
    ConfigError {
        setting: String,
        value: String,
        reason: String,
    },

    /// Registry (de)serialization failed
    SerializationError {
        message: String,
    },

    // ============ Connectivity Errors (08xxx) ============
    /// Could not open a connection or a namespace-scoped session
    ConnectionFailed {
        target: String,
        error: String,
    },

    // ============ Execution Errors (XX000) ============
    /// CREATE SCHEMA failed
    NamespaceCreateFailed {
        namespace: String,
        error: String,
    },

    /// A table's setup statement failed
    SetupFailed {
        table: String,
        statement: String,
        error: String,
    },

    /// A statement outside of table setup failed
    ExecutionFailed {
        statement: String,
        error: String,
    },

    /// SPI operation failed
    SpiError {
        query: String,
        error: String,
    },

    // ============ Cleanup Errors ============
    /// DROP SCHEMA ... CASCADE failed; the namespace may have leaked
    CleanupFailed {
        namespace: String,
        error: String,
    },
}

impl IsolateError {
    /// Get PostgreSQL SQLSTATE code for this error
    pub fn sqlstate(&self) -> &'static str {
        use IsolateError::*;
        match self {
            UnknownTable { .. } => "42P01", // Undefined table
            DependencyCycle { .. } => "42P17", // Invalid object definition
            InvalidIdentifier { .. } => "42602", // Invalid name
            ConfigError { .. } => "22023", // Invalid parameter value
            SerializationError { .. } => "22P02", // Invalid text representation

            ConnectionFailed { .. } => "08001", // Unable to establish connection

            NamespaceCreateFailed { .. } => "3F000", // Invalid schema name
            SetupFailed { .. } => "XX000",
            ExecutionFailed { .. } => "XX000",
            SpiError { .. } => "XX000",

            CleanupFailed { .. } => "2BP01", // Dependent objects still exist
        }
    }

    /// True for errors caused by the registry or the request rather than the database
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            IsolateError::UnknownTable { .. }
                | IsolateError::DependencyCycle { .. }
                | IsolateError::InvalidIdentifier { .. }
                | IsolateError::ConfigError { .. }
                | IsolateError::SerializationError { .. }
        )
    }

    /// Underlying database message, without the statement it came from
    pub fn cause(&self) -> String {
        match self {
            IsolateError::ExecutionFailed { error, .. }
            | IsolateError::SpiError { error, .. }
            | IsolateError::ConnectionFailed { error, .. } => error.clone(),
            other => other.to_string(),
        }
    }
}

fn truncate(sql: &str) -> &str {
    match sql.char_indices().nth(100) {
        Some((idx, _)) => &sql[..idx],
        None => sql,
    }
}

impl fmt::Display for IsolateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use IsolateError::*;
        match self {
            UnknownTable { table, referenced_by: None } => {
                write!(f, "Table '{}' is not registered in the schema", table)
            }
            UnknownTable { table, referenced_by: Some(parent) } => {
                write!(f, "Table '{}' (dependency of '{}') is not registered in the schema",
                       table, parent)
            }
            DependencyCycle { cycle } => {
                write!(f, "Dependency cycle detected: {}", cycle.join(" → "))
            }
            InvalidIdentifier { value, reason } => {
                write!(f, "Invalid identifier '{}': {}", value, reason)
            }
            ConfigError { setting, value, reason } => {
                write!(f, "Configuration error for '{}': {} (value: {})", setting, reason, value)
            }
            SerializationError { message } => {
                write!(f, "Serialization error: {}", message)
            }
            ConnectionFailed { target, error } => {
                write!(f, "Failed to connect to '{}': {}", target, error)
            }
            NamespaceCreateFailed { namespace, error } => {
                write!(f, "Failed to create namespace '{}': {}", namespace, error)
            }
            SetupFailed { table, statement, error } => {
                write!(f, "Setup of table '{}' failed: {}\nStatement: {}",
                       table, error, truncate(statement))
            }
            ExecutionFailed { statement, error } => {
                write!(f, "Statement failed: {}\nStatement: {}", error, truncate(statement))
            }
            SpiError { query, error } => {
                write!(f, "SPI query failed: {}\nQuery: {}", error, truncate(query))
            }
            CleanupFailed { namespace, error } => {
                write!(f, "Failed to drop namespace '{}' (it may have leaked): {}",
                       namespace, error)
            }
        }
    }
}

impl std::error::Error for IsolateError {}

/// Result type for pg_isolate operations
pub type IsolateResult<T> = Result<T, IsolateError>;

/// Convert serde_json::Error to IsolateError
impl From<serde_json::Error> for IsolateError {
    fn from(e: serde_json::Error) -> Self {
        IsolateError::SerializationError {
            message: format!("JSON error: {}", e),
        }
    }
}

/// Convert postgres::Error to IsolateError
#[cfg(feature = "client")]
impl From<postgres::Error> for IsolateError {
    fn from(e: postgres::Error) -> Self {
        IsolateError::ExecutionFailed {
            statement: "(client query)".to_string(),
            error: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_table_message() {
        let err = IsolateError::UnknownTable {
            table: "languages".to_string(),
            referenced_by: None,
        };

        let msg = err.to_string();
        assert!(msg.contains("languages"));
        assert!(msg.contains("not registered"));
        assert_eq!(err.sqlstate(), "42P01");
        assert!(err.is_configuration());
    }

    #[test]
    fn test_unknown_dependency_names_parent() {
        let err = IsolateError::UnknownTable {
            table: "users".to_string(),
            referenced_by: Some("clients".to_string()),
        };

        assert!(err.to_string().contains("dependency of 'clients'"));
    }

    #[test]
    fn test_cycle_message() {
        let err = IsolateError::DependencyCycle {
            cycle: vec!["a".to_string(), "b".to_string(), "a".to_string()],
        };

        let msg = err.to_string();
        assert!(msg.contains("a → b → a"));
        assert_eq!(err.sqlstate(), "42P17");
        assert!(err.is_configuration());
    }

    #[test]
    fn test_setup_failed_truncates_statement() {
        let statement = "x".repeat(500);
        let err = IsolateError::SetupFailed {
            table: "users".to_string(),
            statement,
            error: "syntax error".to_string(),
        };

        let msg = err.to_string();
        assert!(msg.contains("'users'"));
        assert!(msg.contains("syntax error"));
        assert!(msg.len() < 200);
        assert!(!err.is_configuration());
    }

    #[test]
    fn test_json_error_conversion() {
        let parse: Result<serde_json::Value, _> = serde_json::from_str("{not json");
        let err: IsolateError = parse.unwrap_err().into();

        assert!(matches!(err, IsolateError::SerializationError { .. }));
        assert_eq!(err.sqlstate(), "22P02");
    }

    #[test]
    fn test_configuration_and_runtime_sqlstates_differ() {
        let config = [
            IsolateError::UnknownTable { table: "t".to_string(), referenced_by: None },
            IsolateError::DependencyCycle { cycle: vec![] },
            IsolateError::InvalidIdentifier { value: "t".to_string(), reason: "t".to_string() },
            IsolateError::ConfigError { setting: "t".to_string(), value: "t".to_string(), reason: "t".to_string() },
            IsolateError::SerializationError { message: "t".to_string() },
        ];
        let runtime = [
            IsolateError::ConnectionFailed { target: "t".to_string(), error: "t".to_string() },
            IsolateError::NamespaceCreateFailed { namespace: "t".to_string(), error: "t".to_string() },
            IsolateError::SetupFailed { table: "t".to_string(), statement: "t".to_string(), error: "t".to_string() },
            IsolateError::CleanupFailed { namespace: "t".to_string(), error: "t".to_string() },
        ];

        let config_states: std::collections::HashSet<&str> =
            config.iter().map(IsolateError::sqlstate).collect();
        assert_eq!(config_states.len(), config.len());

        for err in &runtime {
            assert!(!config_states.contains(err.sqlstate()), "{err}");
            assert!(!err.is_configuration());
        }
    }
}
