//! Allow-list validation for values interpolated into administrative SQL.
//!
//! DDL statements cannot bind identifiers as parameters, so user, database,
//! owner and extension names are formatted straight into the statement text.
//! [`validate`] is therefore the only injection defense and must run before
//! any statement is built. Passwords are the one free-form input; they are
//! embedded as string literals through [`escape_literal`].

use thiserror::Error;

use super::{ProvisionError, Result};

/// A value contained a character outside `[A-Za-z0-9_.]`
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid character {found:?} at position {position}")]
pub struct InvalidIdentifier {
    pub found: char,
    pub position: usize,
}

pub fn is_identifier_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '.'
}

/// Check a value against the identifier allow-list.
///
/// The empty string passes; use [`require_identifier`] where a name is mandatory.
pub fn validate(value: &str) -> std::result::Result<(), InvalidIdentifier> {
    match value.char_indices().find(|(_, c)| !is_identifier_char(*c)) {
        Some((position, found)) => Err(InvalidIdentifier { found, position }),
        None => Ok(()),
    }
}

/// Validate a mandatory identifier argument of a backend operation.
pub fn require_identifier(field: &'static str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(ProvisionError::InvalidArgument {
            field,
            reason: "must not be empty".to_string(),
        });
    }

    validate(value).map_err(|e| ProvisionError::InvalidArgument {
        field,
        reason: e.to_string(),
    })
}

/// Escape a value for use inside a single-quoted string literal.
///
/// Single quotes are doubled; backslash and double quote are
/// backslash-escaped. A doubled quote ends no literal in MySQL (with or
/// without `NO_BACKSLASH_ESCAPES`) or in a PostgreSQL `E'...'` literal. Under
/// `NO_BACKSLASH_ESCAPES` the backslash escapes are stored verbatim, so such
/// MySQL servers see a different password for values containing `\` or `"`.
pub fn escape_literal(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len() + 2);
    for c in value.chars() {
        match c {
            '\'' => escaped.push_str("''"),
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            other => escaped.push(other),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_allow_listed_values() {
        for value in ["", "testdb", "Test_DB.01", "a.b.c", "___", "0"] {
            assert!(validate(value).is_ok(), "{value:?} should be valid");
        }
    }

    #[test]
    fn test_rejects_other_characters() {
        let err = validate("bad name").unwrap_err();
        assert_eq!(err.found, ' ');
        assert_eq!(err.position, 3);

        for value in ["a;b", "a'b", "a\"b", "uuid-ossp", "a`b", "ünïcode", "a\nb", "x*"] {
            assert!(validate(value).is_err(), "{value:?} should be rejected");
        }
    }

    #[test]
    fn test_require_identifier_rejects_empty() {
        let err = require_identifier("username", "").unwrap_err();
        assert!(matches!(
            err,
            ProvisionError::InvalidArgument {
                field: "username",
                ..
            }
        ));
        assert!(require_identifier("username", "testdb").is_ok());
    }

    #[test]
    fn test_require_identifier_reports_field() {
        let err = require_identifier("extension", "uuid-ossp; DROP TABLE x").unwrap_err();
        assert!(err.to_string().starts_with("invalid format of extension"));
    }

    #[test]
    fn test_escape_literal() {
        assert_eq!(escape_literal("secret"), "secret");
        assert_eq!(escape_literal("it's"), "it''s");
        assert_eq!(escape_literal("say \"hi\""), "say \\\"hi\\\"");
        assert_eq!(escape_literal("back\\slash"), "back\\\\slash");
        // A trailing backslash cannot swallow the closing quote.
        assert_eq!(escape_literal("x\\'"), "x\\\\''");
    }

    #[test]
    fn test_escaped_quote_survives_no_backslash_escapes() {
        // With backslashes read literally, only a lone quote could end the
        // literal; every quote in the output comes in a pair.
        let escaped = escape_literal("a'; DROP USER root; --");
        assert_eq!(escaped, "a''; DROP USER root; --");
        assert!(escaped.split("''").all(|part| !part.contains('\'')));
    }
}
