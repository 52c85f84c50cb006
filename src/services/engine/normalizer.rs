// Query Normalizer
//
// Rewrites generator-produced SQL for the engine's dialect before the first
// execution attempt. Pure text transformation: an ordered pipeline of
// pattern-based passes, no AST, no semantic validation. Re-applying the
// pipeline to its own output is a no-op.

use std::sync::LazyLock;

use regex::Regex;

/// Backtick-quoted identifier, the MySQL convention generators often emit.
static BACKTICK_IDENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"`([^`]*)`").expect("valid regex"));

/// An identifier wrapped in two pairs of double quotes, usually the result
/// of a generator quoting an already-quoted name.
static DOUBLED_QUOTES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""{2}([A-Za-z_][A-Za-z0-9_ ]*)"{2}"#).expect("valid regex")
});

/// Cross-database string-to-temporal spellings with an explicit format
/// argument: STR_TO_DATE / TO_DATE / TO_TIMESTAMP (expr, 'format').
static STRING_TO_TEMPORAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:STR_TO_DATE|TO_DATE|TO_TIMESTAMP)\s*\(\s*([^(),]+?)\s*,\s*('[^']*')\s*\)")
        .expect("valid regex")
});

/// MySQL-style date-part extraction functions and the engine field each
/// maps to. The argument may still be text-typed after inference, so the
/// rewrite wraps it in a tolerant temporal cast.
static PART_EXTRACTORS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        ("YEAR", "year"),
        ("MONTH", "month"),
        ("DAY", "day"),
        ("QUARTER", "quarter"),
        ("WEEK", "week"),
        ("DAYOFWEEK", "dow"),
    ]
    .into_iter()
    .map(|(func, field)| {
        let pattern = format!(r"(?i)\b{func}\s*\(\s*([^()]+?)\s*\)");
        (Regex::new(&pattern).expect("valid regex"), field)
    })
    .collect()
});

/// Name-rendering extractors: DAYNAME / MONTHNAME map onto to_char formats.
static NAME_EXTRACTORS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [("DAYNAME", "%A"), ("MONTHNAME", "%B")]
        .into_iter()
        .map(|(func, fmt)| {
            let pattern = format!(r"(?i)\b{func}\s*\(\s*([^()]+?)\s*\)");
            (Regex::new(&pattern).expect("valid regex"), fmt)
        })
        .collect()
});

/// EXTRACT(field FROM ident) where the source is a bare or quoted
/// identifier. A wrapped argument contains parentheses and no longer
/// matches, which keeps the pass idempotent.
static EXTRACT_BARE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\bEXTRACT\s*\(\s*(\w+)\s+FROM\s+("[^"]+"|[A-Za-z_][A-Za-z0-9_]*)\s*\)"#)
        .expect("valid regex")
});

/// DATE_FORMAT(expr, 'format') in the MySQL spelling.
static DATE_FORMAT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bDATE_FORMAT\s*\(\s*([^(),]+?)\s*,\s*('[^']*')\s*\)")
        .expect("valid regex")
});

/// Strict cast invocation. The underscore in TRY_CAST is a word character,
/// so `\bCAST` never re-matches inside already-rewritten text.
static STRICT_CAST: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bCAST\s*\(").expect("valid regex"));

/// date_part / date_trunc with a bare identifier as the value argument.
static DATE_PART_BARE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)\b(date_part|date_trunc)\s*\(\s*('[^']*')\s*,\s*("[^"]+"|[A-Za-z_][A-Za-z0-9_]*)\s*\)"#,
    )
    .expect("valid regex")
});

/// to_char with a bare identifier as the value argument.
static TO_CHAR_BARE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\bto_char\s*\(\s*("[^"]+"|[A-Za-z_][A-Za-z0-9_]*)\s*,\s*('[^']*')\s*\)"#)
        .expect("valid regex")
});

/// Ordered rewrite pipeline for generator SQL.
pub struct QueryNormalizer;

impl QueryNormalizer {
    /// Apply all passes in order. Total function: any input yields output.
    pub fn normalize(sql: &str) -> String {
        let quoted = Self::normalize_quotes(sql);
        let parsed = Self::rewrite_string_to_temporal(&quoted);
        let wrapped = Self::force_temporal_extraction_casts(&parsed);
        Self::downgrade_strict_casts(&wrapped)
    }

    /// Pass 1: backtick identifiers become double-quoted identifiers, and
    /// accidentally doubled quote pairs collapse back to one.
    pub fn normalize_quotes(sql: &str) -> String {
        let dequoted = BACKTICK_IDENT.replace_all(sql, r#""$1""#);
        DOUBLED_QUOTES.replace_all(&dequoted, r#""$1""#).into_owned()
    }

    /// Pass 2: cross-database string-to-date spellings become the engine's
    /// tolerant parse function, keeping the format argument.
    pub fn rewrite_string_to_temporal(sql: &str) -> String {
        STRING_TO_TEMPORAL
            .replace_all(sql, "try_to_timestamp($1, $2)")
            .into_owned()
    }

    /// Pass 3: date-part extraction over a possibly text-typed expression
    /// gets a forced tolerant cast to TIMESTAMP.
    pub fn force_temporal_extraction_casts(sql: &str) -> String {
        let mut out = sql.to_string();
        for (pattern, field) in PART_EXTRACTORS.iter() {
            let replacement = format!("date_part('{field}', TRY_CAST($1 AS TIMESTAMP))");
            out = pattern.replace_all(&out, replacement.as_str()).into_owned();
        }
        for (pattern, fmt) in NAME_EXTRACTORS.iter() {
            let replacement = format!("to_char(TRY_CAST($1 AS TIMESTAMP), '{fmt}')");
            out = pattern.replace_all(&out, replacement.as_str()).into_owned();
        }
        out = EXTRACT_BARE
            .replace_all(&out, "EXTRACT($1 FROM TRY_CAST($2 AS TIMESTAMP))")
            .into_owned();
        DATE_FORMAT
            .replace_all(&out, "to_char(TRY_CAST($1 AS TIMESTAMP), $2)")
            .into_owned()
    }

    /// Pass 4: every strict cast becomes a tolerant cast, so one bad cell
    /// nulls out instead of aborting the whole query.
    pub fn downgrade_strict_casts(sql: &str) -> String {
        STRICT_CAST.replace_all(sql, "TRY_CAST(").into_owned()
    }

    /// Narrow rewrite used by the repair loop after an execution failure
    /// that mentions a temporal construct: wrap bare identifier arguments
    /// of date_part / date_trunc / to_char / EXTRACT in a tolerant cast.
    pub fn repair_temporal_arguments(sql: &str) -> String {
        let mut out = DATE_PART_BARE
            .replace_all(sql, "$1($2, TRY_CAST($3 AS TIMESTAMP))")
            .into_owned();
        out = TO_CHAR_BARE
            .replace_all(&out, "to_char(TRY_CAST($1 AS TIMESTAMP), $2)")
            .into_owned();
        EXTRACT_BARE
            .replace_all(&out, "EXTRACT($1 FROM TRY_CAST($2 AS TIMESTAMP))")
            .into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backticks_become_double_quotes() {
        let sql = "SELECT `order_date` FROM data";
        assert_eq!(
            QueryNormalizer::normalize_quotes(sql),
            r#"SELECT "order_date" FROM data"#
        );
    }

    #[test]
    fn test_doubled_quotes_collapse() {
        let sql = r#"SELECT ""order_date"" FROM data"#;
        assert_eq!(
            QueryNormalizer::normalize_quotes(sql),
            r#"SELECT "order_date" FROM data"#
        );
    }

    #[test]
    fn test_string_to_temporal_rewrites() {
        let sql = "SELECT STR_TO_DATE(order_date, '%m/%d/%Y') FROM data";
        assert_eq!(
            QueryNormalizer::rewrite_string_to_temporal(sql),
            "SELECT try_to_timestamp(order_date, '%m/%d/%Y') FROM data"
        );

        let sql = "SELECT TO_TIMESTAMP(ts, '%Y-%m-%d %H:%M:%S') FROM data";
        assert!(QueryNormalizer::rewrite_string_to_temporal(sql)
            .contains("try_to_timestamp(ts, '%Y-%m-%d %H:%M:%S')"));
    }

    #[test]
    fn test_month_extraction_gets_forced_cast() {
        let sql = "SELECT MONTH(`order_date`) AS m FROM data";
        let normalized = QueryNormalizer::normalize(sql);
        assert_eq!(
            normalized,
            r#"SELECT date_part('month', TRY_CAST("order_date" AS TIMESTAMP)) AS m FROM data"#
        );
    }

    #[test]
    fn test_extract_wraps_bare_identifier() {
        let sql = "SELECT EXTRACT(month FROM order_date) FROM data";
        assert_eq!(
            QueryNormalizer::force_temporal_extraction_casts(sql),
            "SELECT EXTRACT(month FROM TRY_CAST(order_date AS TIMESTAMP)) FROM data"
        );
    }

    #[test]
    fn test_date_format_becomes_to_char() {
        let sql = "SELECT DATE_FORMAT(order_date, '%Y-%m') FROM data";
        assert_eq!(
            QueryNormalizer::force_temporal_extraction_casts(sql),
            "SELECT to_char(TRY_CAST(order_date AS TIMESTAMP), '%Y-%m') FROM data"
        );
    }

    #[test]
    fn test_strict_cast_downgrade() {
        let sql = "SELECT CAST(amount AS DOUBLE) FROM data";
        assert_eq!(
            QueryNormalizer::downgrade_strict_casts(sql),
            "SELECT TRY_CAST(amount AS DOUBLE) FROM data"
        );
        // already-tolerant casts are left alone
        let sql = "SELECT TRY_CAST(amount AS DOUBLE) FROM data";
        assert_eq!(QueryNormalizer::downgrade_strict_casts(sql), sql);
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let inputs = [
            "SELECT MONTH(`order_date`) AS m FROM data",
            "SELECT CAST(amount AS DOUBLE), STR_TO_DATE(d, '%m/%d/%Y') FROM data",
            "SELECT EXTRACT(year FROM order_date), DAYNAME(order_date) FROM data",
            "SELECT * FROM data WHERE category = 'CAST(x)'",
        ];
        for sql in inputs {
            let once = QueryNormalizer::normalize(sql);
            let twice = QueryNormalizer::normalize(&once);
            assert_eq!(once, twice, "normalization not idempotent for {sql}");
        }
    }

    #[test]
    fn test_repair_wraps_date_part_argument() {
        let sql = r#"SELECT date_part('month', "order_date") FROM data"#;
        assert_eq!(
            QueryNormalizer::repair_temporal_arguments(sql),
            r#"SELECT date_part('month', TRY_CAST("order_date" AS TIMESTAMP)) FROM data"#
        );
    }

    #[test]
    fn test_repair_wraps_to_char_argument() {
        let sql = "SELECT to_char(order_date, '%Y-%m') FROM data";
        assert_eq!(
            QueryNormalizer::repair_temporal_arguments(sql),
            "SELECT to_char(TRY_CAST(order_date AS TIMESTAMP), '%Y-%m') FROM data"
        );
    }

    #[test]
    fn test_repair_leaves_wrapped_arguments_alone() {
        let sql = r#"SELECT date_part('month', TRY_CAST("order_date" AS TIMESTAMP)) FROM data"#;
        assert_eq!(QueryNormalizer::repair_temporal_arguments(sql), sql);
    }

    #[test]
    fn test_dayofweek_not_confused_with_week() {
        let sql = "SELECT DAYOFWEEK(order_date) FROM data";
        let rewritten = QueryNormalizer::force_temporal_extraction_casts(sql);
        assert!(rewritten.contains("date_part('dow'"));
        assert!(!rewritten.contains("date_part('week'"));
    }
}
