//! Assertions over `IsolateResult` for this crate's tests

#![cfg(any(test, feature = "pg_test"))]

use crate::error::{IsolateError, IsolateResult};

/// Unwrap the error of a result that must have failed
///
/// # Panics
/// If `result` is `Ok`.
pub fn expect_error<T>(result: IsolateResult<T>) -> IsolateError {
    match result {
        Err(e) => e,
        Ok(_) => panic!("expected an isolation error, but the operation succeeded"),
    }
}

/// Failure caused by the registry or the request, rejected before any SQL ran
///
/// # Panics
/// If `result` is `Ok`, the error is a database failure, or the SQLSTATE differs.
pub fn assert_configuration_error<T>(result: IsolateResult<T>, sqlstate: &str) -> IsolateError {
    let err = expect_error(result);
    assert!(err.is_configuration(), "expected a configuration error, got: {err}");
    assert_eq!(err.sqlstate(), sqlstate, "wrong SQLSTATE for: {err}");
    err
}

/// Failure reported by the database or the connection
///
/// # Panics
/// If `result` is `Ok`, the error is a configuration error, or the SQLSTATE differs.
pub fn assert_database_error<T>(result: IsolateResult<T>, sqlstate: &str) -> IsolateError {
    let err = expect_error(result);
    assert!(!err.is_configuration(), "expected a database error, got: {err}");
    assert_eq!(err.sqlstate(), sqlstate, "wrong SQLSTATE for: {err}");
    err
}

/// Dependency cycle reported along exactly `path`
///
/// # Panics
/// If `result` is not a `DependencyCycle` over `path`.
pub fn assert_cycle<T>(result: IsolateResult<T>, path: &[&str]) {
    match expect_error(result) {
        IsolateError::DependencyCycle { cycle } => assert_eq!(cycle, path),
        other => panic!("expected a dependency cycle, got: {other}"),
    }
}
