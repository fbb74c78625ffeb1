//! The only way SQL text is assembled from names and secrets.
//!
//! Schema and user names cannot be bound as parameters in DDL, so they pass
//! through a strict allow-list before being quoted.

use super::error::ProvisionError;

/// Longest schema name MySQL accepts.
pub const MAX_SCHEMA_LEN: usize = 64;
/// Longest user name MySQL accepts.
pub const MAX_USER_LEN: usize = 32;

fn check_identifier(kind: &str, ident: &str, max_len: usize) -> Result<(), ProvisionError> {
    if ident.is_empty() || ident.len() > max_len {
        return Err(ProvisionError::Validation(format!(
            "{kind} name must be 1-{max_len} characters, got {}",
            ident.len()
        )));
    }
    if let Some(c) = ident
        .chars()
        .find(|c| !matches!(c, 'a'..='z' | '0'..='9' | '_'))
    {
        return Err(ProvisionError::Validation(format!(
            "{kind} name contains disallowed character {c:?}"
        )));
    }
    Ok(())
}

/// Backtick-quote a schema name after checking it against `[a-z0-9_]{1,64}`.
pub fn quote_ident(ident: &str) -> Result<String, ProvisionError> {
    check_identifier("schema", ident, MAX_SCHEMA_LEN)?;
    Ok(format!("`{ident}`"))
}

/// Single-quote a user name after checking it against `[a-z0-9_]{1,32}`.
pub fn quote_user(user: &str) -> Result<String, ProvisionError> {
    check_identifier("user", user, MAX_USER_LEN)?;
    Ok(format!("'{user}'"))
}

/// Single-quote a string literal. NUL, quotes, backslashes and control
/// characters are rejected rather than escaped.
pub fn quote_literal(value: &str) -> Result<String, ProvisionError> {
    if let Some(c) = value
        .chars()
        .find(|c| *c == '\'' || *c == '\\' || c.is_control())
    {
        return Err(ProvisionError::Validation(format!(
            "literal contains disallowed character {:?}",
            c.escape_default().to_string()
        )));
    }
    Ok(format!("'{value}'"))
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn identifiers_are_backticked() {
        assert_eq!(quote_ident("pp_web_abc").unwrap(), "`pp_web_abc`");
    }

    #[test]
    fn identifier_rejects_injection() {
        for bad in ["", "a`b", "a;drop", "Upper", "a-b", "a b", "x\0"] {
            assert!(quote_ident(bad).is_err(), "{bad:?} accepted");
        }
        assert!(quote_ident(&"a".repeat(65)).is_err());
        assert!(quote_ident(&"a".repeat(64)).is_ok());
    }

    #[test]
    fn user_names_have_tighter_limit() {
        assert!(quote_user(&"u".repeat(32)).is_ok());
        assert!(quote_user(&"u".repeat(33)).is_err());
    }

    #[test]
    fn literal_rejects_quote_backslash_nul() {
        assert_eq!(quote_literal("Abc123").unwrap(), "'Abc123'");
        for bad in ["it's", "a\\b", "nul\0", "line\nbreak"] {
            assert!(quote_literal(bad).is_err(), "{bad:?} accepted");
        }
    }
}
