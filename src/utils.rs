use pgrx::prelude::*;

use crate::error::{IsolateError, IsolateResult};

/// Run a statement through SPI, keeping the statement text in the error
pub fn spi_run(statement: &str) -> IsolateResult<()> {
    Spi::run(statement).map_err(|e| IsolateError::SpiError {
        query: statement.to_string(),
        error: e.to_string(),
    })
}

/// Fetch a single text value through SPI
pub fn spi_get_string(query: &str) -> IsolateResult<Option<String>> {
    Spi::get_one::<String>(query).map_err(|e| IsolateError::SpiError {
        query: query.to_string(),
        error: e.to_string(),
    })
}
