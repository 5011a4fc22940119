use chrono::{DateTime, Utc};

use crate::backend::Executor;
use crate::error::{IsolateError, IsolateResult};
use crate::metrics::metrics_api;
use crate::validation::{quote_ident, validate_namespace_name};

/// Owns one freshly created namespace and drops it, with everything inside,
/// when released
///
/// `destroy` reports the outcome. A guard that is simply dropped (early
/// return, panic) still attempts the drop and logs a failure instead.
pub struct NamespaceGuard<E: Executor> {
    conn: E,
    name: String,
    created_at: DateTime<Utc>,
    dropped: bool,
}

impl<E: Executor> NamespaceGuard<E> {
    /// Run `CREATE SCHEMA` for `name` on `conn`
    ///
    /// No guard exists if creation fails, so nothing is dropped afterwards.
    pub fn create(mut conn: E, name: &str) -> IsolateResult<Self> {
        validate_namespace_name(name)?;

        conn.execute(&format!("CREATE SCHEMA {}", quote_ident(name)))
            .map_err(|e| IsolateError::NamespaceCreateFailed {
                namespace: name.to_string(),
                error: e.cause(),
            })?;

        metrics_api::record_namespace_created();
        log::info!("created namespace {}", name);

        Ok(Self {
            conn,
            name: name.to_string(),
            created_at: Utc::now(),
            dropped: false,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Drop the namespace and report whether that worked
    pub fn destroy(mut self) -> IsolateResult<()> {
        self.drop_namespace()
    }

    fn drop_namespace(&mut self) -> IsolateResult<()> {
        if self.dropped {
            return Ok(());
        }
        self.dropped = true;

        match self.conn.drop_schema(&self.name) {
            Ok(()) => {
                metrics_api::record_namespace_dropped();
                let lifetime = Utc::now() - self.created_at;
                log::info!(
                    "dropped namespace {} after {}ms",
                    self.name,
                    lifetime.num_milliseconds()
                );
                Ok(())
            }
            Err(e) => {
                metrics_api::record_cleanup_failure();
                Err(IsolateError::CleanupFailed {
                    namespace: self.name.clone(),
                    error: e.cause(),
                })
            }
        }
    }
}

impl<E: Executor> Drop for NamespaceGuard<E> {
    fn drop(&mut self) {
        if self.dropped {
            return;
        }
        if std::thread::panicking() && self.conn.rolls_back_on_panic() {
            self.dropped = true;
            log::debug!("namespace {} left to transaction rollback", self.name);
            return;
        }
        if let Err(e) = self.drop_namespace() {
            log::warn!("{}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::MockConnector;
    use crate::backend::Connector;

    #[test]
    fn test_create_then_destroy() {
        let db = MockConnector::new();
        let guard = NamespaceGuard::create(db.connect().unwrap(), "abcDEFghij").unwrap();

        assert_eq!(guard.name(), "abcDEFghij");
        assert!(guard.created_at() <= Utc::now());
        assert_eq!(db.live_schemas(), vec!["abcDEFghij"]);

        guard.destroy().unwrap();
        assert!(db.live_schemas().is_empty());
        assert_eq!(
            db.statements(),
            vec![
                "admin: CREATE SCHEMA \"abcDEFghij\"",
                "admin: DROP SCHEMA \"abcDEFghij\" CASCADE",
            ]
        );
    }

    #[test]
    fn test_dropping_guard_drops_namespace() {
        let db = MockConnector::new();
        {
            let _guard = NamespaceGuard::create(db.connect().unwrap(), "scoped").unwrap();
            assert_eq!(db.live_schemas().len(), 1);
        }
        assert!(db.live_schemas().is_empty());
    }

    #[test]
    fn test_create_failure_leaves_nothing_to_drop() {
        let db = MockConnector::new().failing_on("CREATE SCHEMA");

        let err = NamespaceGuard::create(db.connect().unwrap(), "broken").err().unwrap();
        match err {
            IsolateError::NamespaceCreateFailed { namespace, error } => {
                assert_eq!(namespace, "broken");
                assert_eq!(error, "injected failure");
            }
            other => panic!("Wrong error type: {other:?}"),
        }
        assert_eq!(db.statements().len(), 1);
    }

    #[test]
    fn test_existing_namespace_is_not_reused() {
        let db = MockConnector::new();
        let _first = NamespaceGuard::create(db.connect().unwrap(), "taken").unwrap();

        let err = NamespaceGuard::create(db.connect().unwrap(), "taken").err().unwrap();
        assert!(err.to_string().contains("already exists"));
        assert_eq!(db.live_schemas(), vec!["taken"]);
    }

    #[test]
    fn test_invalid_name_runs_no_sql() {
        let db = MockConnector::new();
        let err = NamespaceGuard::create(db.connect().unwrap(), "bad name").err().unwrap();

        assert_eq!(err.sqlstate(), "42602");
        assert!(db.statements().is_empty());
    }

    #[test]
    fn test_destroy_reports_cleanup_failure() {
        let db = MockConnector::new();
        let guard = NamespaceGuard::create(db.connect().unwrap(), "vanished").unwrap();
        db.drop_externally("vanished");

        let before = metrics_api::snapshot().cleanup_failures;
        let err = guard.destroy().unwrap_err();

        assert_eq!(err.sqlstate(), "2BP01");
        assert!(err.to_string().contains("vanished"));
        assert!(metrics_api::snapshot().cleanup_failures > before);
    }

    #[test]
    fn test_drop_after_failed_cleanup_does_not_retry() {
        let db = MockConnector::new();
        let guard = NamespaceGuard::create(db.connect().unwrap(), "once").unwrap();
        db.drop_externally("once");

        assert!(guard.destroy().is_err());
        let drops = db
            .statements()
            .iter()
            .filter(|s| s.contains("DROP SCHEMA"))
            .count();
        assert_eq!(drops, 1);
    }
}
