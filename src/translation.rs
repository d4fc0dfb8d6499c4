use std::borrow::Cow;

use regex::{Captures, Regex};
use tracing::warn;

use crate::engines::EngineKind;

/// Rewrites positional-parameter placeholders between SQL dialects.
///
/// Implementations are pure: the same input always produces the same output
/// and nothing is persisted. Translation happens once per statement
/// execution, inside the driver interceptor, immediately before the text
/// reaches the backend.
pub trait SyntaxTranslator: Send + Sync {
    fn translate<'a>(&self, query: &'a str) -> Cow<'a, str>;
}

/// Identity translator for same-dialect configurations and test doubles.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTranslator;

impl SyntaxTranslator for NoopTranslator {
    fn translate<'a>(&self, query: &'a str) -> Cow<'a, str> {
        Cow::Borrowed(query)
    }
}

/// Translates Oracle-style ordinal placeholders (`:1`..`:9`) into
/// PostgreSQL-style ones (`$1`..`$9`).
///
/// The rewrite rule covers single-digit ordinals only. Ordinals of two or
/// more digits are outside the rule: they are left untouched and flagged
/// with a warning so they are never silently mis-translated. For any source
/// dialect other than Oracle the translator is the identity.
pub struct PostgresTranslator {
    pattern: Regex,
    source: EngineKind,
}

impl PostgresTranslator {
    /// # Panics
    /// Never: the placeholder pattern is a valid literal regex.
    #[must_use]
    pub fn new(source: EngineKind) -> Self {
        Self {
            pattern: Regex::new(r":([0-9]+)").expect("placeholder pattern is valid"),
            source,
        }
    }
}

impl SyntaxTranslator for PostgresTranslator {
    fn translate<'a>(&self, query: &'a str) -> Cow<'a, str> {
        if self.source != EngineKind::Oracle {
            return Cow::Borrowed(query);
        }

        self.pattern.replace_all(query, |caps: &Captures| {
            let ordinal = &caps[1];
            if ordinal.len() == 1 && ordinal != "0" {
                format!("${ordinal}")
            } else {
                warn!(
                    marker = %&caps[0],
                    "positional ordinal outside :1..:9 left untranslated"
                );
                caps[0].to_string()
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewrites_oracle_ordinals_to_dollar_markers() {
        let t = PostgresTranslator::new(EngineKind::Oracle);
        let sql = "INSERT INTO customers (name, age) VALUES (:1, :2)";
        assert_eq!(
            t.translate(sql),
            "INSERT INTO customers (name, age) VALUES ($1, $2)"
        );
    }

    #[test]
    fn rewrites_all_nine_ordinals() {
        let t = PostgresTranslator::new(EngineKind::Oracle);
        let sql = ":1 :2 :3 :4 :5 :6 :7 :8 :9";
        assert_eq!(t.translate(sql), "$1 $2 $3 $4 $5 $6 $7 $8 $9");
    }

    #[test]
    fn translation_is_idempotent() {
        let t = PostgresTranslator::new(EngineKind::Oracle);
        let sql = "UPDATE customers SET age = :1 WHERE name = :2";
        let once = t.translate(sql).into_owned();
        let twice = t.translate(&once).into_owned();
        assert_eq!(once, twice);
        assert!(!twice.contains(':'));
    }

    #[test]
    fn multi_digit_ordinals_are_left_untouched() {
        let t = PostgresTranslator::new(EngineKind::Oracle);
        let sql = "SELECT * FROM t WHERE a = :1 AND b = :10";
        assert_eq!(t.translate(sql), "SELECT * FROM t WHERE a = $1 AND b = :10");
    }

    #[test]
    fn zero_ordinal_is_left_untouched() {
        let t = PostgresTranslator::new(EngineKind::Oracle);
        assert_eq!(t.translate("WHERE a = :0"), "WHERE a = :0");
    }

    #[test]
    fn non_oracle_source_passes_through() {
        let t = PostgresTranslator::new(EngineKind::Postgres);
        let sql = "SELECT * FROM t WHERE a = :1";
        let out = t.translate(sql);
        assert!(matches!(out, Cow::Borrowed(_)));
        assert_eq!(out, sql);
    }

    #[test]
    fn noop_translator_is_identity() {
        let sql = "SELECT :1 FROM t";
        assert_eq!(NoopTranslator.translate(sql), sql);
    }
}
