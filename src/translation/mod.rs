use std::borrow::Cow;

mod parsers;
mod scanner;

use scanner::{Placeholder, find_placeholders};

use crate::error::SqlFluentError;

/// Placeholder syntax a backend expects in the final SQL text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaceholderStyle {
    /// Leave anonymous `?` placeholders as they are.
    #[default]
    Anonymous,
    /// SQLite-style numbered placeholders like `?1`.
    Sqlite,
    /// PostgreSQL-style placeholders like `$1`.
    Postgres,
}

/// Count the anonymous `?` placeholders in a caller-supplied fragment.
///
/// Fragments are concatenated into larger statements, so numbered placeholders (`?1`, `$1`)
/// are refused: their numbers would no longer line up with the combined parameter list.
///
/// # Errors
///
/// Returns `SqlFluentError::BindingError` if the fragment contains a numbered placeholder.
pub fn count_placeholders(fragment: &str) -> Result<usize, SqlFluentError> {
    let found = find_placeholders(fragment);
    if let Some(numbered) = found.iter().find(|p| p.number.is_some()) {
        return Err(SqlFluentError::BindingError(format!(
            "numbered placeholder `{}` is not allowed in a fragment; use `?`",
            &fragment[numbered.start..numbered.end]
        )));
    }
    Ok(found.len())
}

/// Number every anonymous `?` in order of appearance for the target style.
///
/// Returns a borrowed `Cow` when no changes are needed.
#[must_use]
pub fn number_placeholders(sql: &str, target: PlaceholderStyle) -> Cow<'_, str> {
    let sigil = match target {
        PlaceholderStyle::Anonymous => return Cow::Borrowed(sql),
        PlaceholderStyle::Sqlite => '?',
        PlaceholderStyle::Postgres => '$',
    };
    let anonymous: Vec<Placeholder> = find_placeholders(sql)
        .into_iter()
        .filter(|p| p.number.is_none())
        .collect();
    if anonymous.is_empty() {
        return Cow::Borrowed(sql);
    }

    let mut out = String::with_capacity(sql.len() + anonymous.len() * 2);
    let mut last = 0;
    for (n, placeholder) in anonymous.iter().enumerate() {
        out.push_str(&sql[last..placeholder.start]);
        out.push(sigil);
        out.push_str(&(n + 1).to_string());
        last = placeholder.end;
    }
    out.push_str(&sql[last..]);
    Cow::Owned(out)
}

/// Translate numbered placeholders between Postgres-style `$N` and SQLite-style `?N`.
///
/// Used for raw statements handed straight to a session. Quoted strings, comments and
/// dollar-quoted blocks are skipped.
#[must_use]
pub fn translate_placeholders(sql: &str, target: PlaceholderStyle) -> Cow<'_, str> {
    let (from, to) = match target {
        PlaceholderStyle::Anonymous => return Cow::Borrowed(sql),
        PlaceholderStyle::Sqlite => (b'$', '?'),
        PlaceholderStyle::Postgres => (b'?', '$'),
    };
    let convertible: Vec<Placeholder> = find_placeholders(sql)
        .into_iter()
        .filter(|p| p.sigil == from && p.number.is_some())
        .collect();
    if convertible.is_empty() {
        return Cow::Borrowed(sql);
    }

    let mut out = String::with_capacity(sql.len());
    let mut last = 0;
    for placeholder in &convertible {
        out.push_str(&sql[last..placeholder.start]);
        out.push(to);
        out.push_str(placeholder.number.as_deref().unwrap_or_default());
        last = placeholder.end;
    }
    out.push_str(&sql[last..]);
    Cow::Owned(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_anonymous_placeholders() {
        assert_eq!(count_placeholders("a = ? and b in (?, ?)").unwrap(), 3);
        assert_eq!(count_placeholders("a = 1").unwrap(), 0);
    }

    #[test]
    fn counting_skips_literals_and_comments() {
        let sql = "a = '?' and b = ? -- ?\n/* ? /* ? */ */ and c = \"?\"";
        assert_eq!(count_placeholders(sql).unwrap(), 1);
    }

    #[test]
    fn numbered_fragment_is_rejected() {
        let err = count_placeholders("a = ?1").unwrap_err();
        assert!(matches!(err, SqlFluentError::BindingError(_)));
        let err = count_placeholders("a = $2").unwrap_err();
        assert!(matches!(err, SqlFluentError::BindingError(_)));
    }

    #[test]
    fn numbers_for_sqlite_and_postgres() {
        let sql = "select * from t where a = ? and b = ?";
        assert_eq!(
            number_placeholders(sql, PlaceholderStyle::Sqlite),
            "select * from t where a = ?1 and b = ?2"
        );
        assert_eq!(
            number_placeholders(sql, PlaceholderStyle::Postgres),
            "select * from t where a = $1 and b = $2"
        );
        assert!(matches!(
            number_placeholders(sql, PlaceholderStyle::Anonymous),
            Cow::Borrowed(_)
        ));
    }

    #[test]
    fn numbering_leaves_literals_alone() {
        let sql = "select '?' from t where a = ?";
        assert_eq!(
            number_placeholders(sql, PlaceholderStyle::Sqlite),
            "select '?' from t where a = ?1"
        );
    }

    #[test]
    fn translates_postgres_to_sqlite() {
        let sql = "insert into t values($1, $2)";
        let res = translate_placeholders(sql, PlaceholderStyle::Sqlite);
        assert_eq!(res, "insert into t values(?1, ?2)");
    }

    #[test]
    fn translates_sqlite_to_postgres() {
        let sql = "select * from t where a = ?1 and b = ?2";
        let res = translate_placeholders(sql, PlaceholderStyle::Postgres);
        assert_eq!(res, "select * from t where a = $1 and b = $2");
    }

    #[test]
    fn skips_dollar_quoted_blocks() {
        let sql = "$foo$ select $1 from t $foo$ where a = $1";
        let res = translate_placeholders(sql, PlaceholderStyle::Sqlite);
        assert_eq!(res, "$foo$ select $1 from t $foo$ where a = ?1");
    }
}
