// SQL module - SQL parsing and statement compilation

pub mod ast;
pub mod lexer;
pub mod parser;
pub mod statement;
pub mod token;

pub use ast::*;
pub use lexer::Lexer;
pub use parser::Parser;
pub use statement::{CompiledStatement, StatementCompiler};
pub use token::*;

use crate::error::SqlResult;
use crate::expression::Expression;

/// Parse one statement
pub fn parse_statement(sql: &str) -> SqlResult<Statement> {
    Parser::new(sql)?.parse()
}

/// Parse a value expression such as a stored CHECK condition
pub fn parse_expression(sql: &str) -> SqlResult<Expression> {
    Parser::new(sql)?.parse_standalone_expression()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SqlError;

    #[test]
    fn test_entry_points() {
        assert!(matches!(
            parse_statement("select 1"),
            Ok(Statement::Query(_))
        ));
        assert_eq!(parse_expression("a + 1").unwrap().get_sql(), "(a + 1)");
        assert!(matches!(
            parse_expression("a +"),
            Err(SqlError::Parse(_))
        ));
    }
}
