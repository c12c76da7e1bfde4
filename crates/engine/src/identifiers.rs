use crate::{DataError, DataResult};

/// Accepts `table` or `schema.table`, each part a plain SQL identifier.
pub fn validate_table_name(table_name: &str) -> DataResult<()> {
    let mut parts = table_name.split('.');
    let (Some(first), second, None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(DataError::InvalidIdentifier(format!(
            "{table_name:?}: expected table or schema.table"
        )));
    };
    validate_identifier(first)?;
    if let Some(table) = second {
        validate_identifier(table)?;
    }
    Ok(())
}

pub fn validate_identifier(name: &str) -> DataResult<()> {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return Err(DataError::InvalidIdentifier("identifier is empty".into()));
    };
    if !is_ident_start(first) || !chars.all(is_ident_continue) {
        return Err(DataError::InvalidIdentifier(format!(
            "{name:?} must be alphanumeric or underscore and start with a letter or underscore"
        )));
    }
    Ok(())
}

/// Double-quotes an identifier for interpolation into SQL text.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn is_ident_start(value: char) -> bool {
    value == '_' || value.is_ascii_alphabetic()
}

fn is_ident_continue(value: char) -> bool {
    is_ident_start(value) || value.is_ascii_digit()
}
