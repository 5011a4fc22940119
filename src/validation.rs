//! Identifier Validation
//!
//! Namespace names are spliced into `CREATE SCHEMA`, `SET search_path` and
//! `DROP SCHEMA` statements, so every name is checked here before it reaches
//! SQL. Generated names always pass; the check guards names that arrive from
//! configuration or SQL callers.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::MAX_IDENTIFIER_LENGTH;
use crate::error::{IsolateError, IsolateResult};

static NAMESPACE_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("namespace pattern compiles"));

/// Validate a namespace (schema) name
///
/// Allows ASCII letters, digits and underscores, not starting with a digit,
/// at most 63 characters.
///
/// ```rust,ignore
/// use pg_isolate::validation::validate_namespace_name;
///
/// assert!(validate_namespace_name("qWeRtYuIoP").is_ok());
/// assert!(validate_namespace_name("x; DROP SCHEMA public").is_err());
/// ```
pub fn validate_namespace_name(name: &str) -> IsolateResult<()> {
    if name.is_empty() {
        return Err(IsolateError::InvalidIdentifier {
            value: String::new(),
            reason: "Identifier cannot be empty".to_string(),
        });
    }

    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(IsolateError::InvalidIdentifier {
            value: format!("{}... ({} chars)", name.chars().take(20).collect::<String>(), name.len()),
            reason: format!("Identifier too long (max {MAX_IDENTIFIER_LENGTH} characters)"),
        });
    }

    if !NAMESPACE_NAME.is_match(name) {
        return Err(IsolateError::InvalidIdentifier {
            value: sanitize_for_logging(name),
            reason: "Identifier must contain only ASCII letters, digits and underscores, \
                     and cannot start with a digit"
                .to_string(),
        });
    }

    Ok(())
}

/// Double-quote an identifier so its case is preserved
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a value as a SQL string literal
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Truncate and strip control characters before logging
fn sanitize_for_logging(s: &str) -> String {
    let truncated: String = s.chars().take(50).collect();
    let truncated = if truncated.len() < s.len() {
        format!("{truncated}...")
    } else {
        truncated
    };

    truncated
        .replace('\0', "\\0")
        .replace('\n', "\\n")
        .replace('\r', "\\r")
}
