//! SQL scripts: `;`-separated statements run in order on one session.

use crate::error::SqlResult;
use crate::session::{Session, StatementResult};
use crate::sql::{Lexer, Token};
use anyhow::{Context, Result};
use log::info;
use std::io::Write;
use std::path::Path;

/// Split a script into statement texts. Semicolons inside string literals,
/// quoted identifiers and comments do not end a statement; pieces holding
/// only comments are dropped.
pub fn split_statements(script: &str) -> SqlResult<Vec<String>> {
    let tokens = Lexer::new(script).tokenize()?;
    let mut statements = Vec::new();
    let mut start: Option<usize> = None;
    let mut end = 0;

    for spanned in tokens {
        match spanned.token {
            Token::Semicolon | Token::Eof => {
                if let Some(begin) = start.take() {
                    statements.push(script[begin..end].to_string());
                }
            }
            _ => {
                start.get_or_insert(spanned.start);
                end = spanned.end;
            }
        }
    }
    Ok(statements)
}

/// Run every statement of `script`, writing results to `out`. Stops at the
/// first failing statement. Returns the number of statements run.
pub fn run_script<W: Write>(session: &mut Session, script: &str, out: &mut W) -> Result<usize> {
    let statements = split_statements(script).context("failed to split script")?;
    for (number, sql) in statements.iter().enumerate() {
        let result = session
            .execute(sql)
            .with_context(|| format!("statement {} failed: {}", number + 1, sql))?;
        write_result(out, &result)?;
        for warning in session.take_warnings() {
            writeln!(out, "warning: {}", warning)?;
        }
    }
    Ok(statements.len())
}

pub fn run_script_file<W: Write>(session: &mut Session, path: &Path, out: &mut W) -> Result<usize> {
    let script = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read script {}", path.display()))?;
    let count = run_script(session, &script, out)?;
    info!("ran {} statements from {}", count, path.display());
    Ok(count)
}

fn write_result<W: Write>(out: &mut W, result: &StatementResult) -> Result<()> {
    match result {
        StatementResult::Rows(rows) => writeln!(out, "{}", rows)?,
        StatementResult::UpdateCount(count) => writeln!(
            out,
            "{} row{} affected",
            count,
            if *count == 1 { "" } else { "s" }
        )?,
        StatementResult::Ok => writeln!(out, "OK")?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;
    use tempfile::NamedTempFile;

    #[test]
    fn test_split_statements() {
        let script = "CREATE TABLE t (a VARCHAR(5));\n\
                      -- comment; not a statement\n\
                      INSERT INTO t VALUES ('a;b') ;\n\
                      /* trailing */ ;";
        assert_eq!(
            split_statements(script).unwrap(),
            vec![
                "CREATE TABLE t (a VARCHAR(5))".to_string(),
                "INSERT INTO t VALUES ('a;b')".to_string(),
            ]
        );
        assert_eq!(split_statements("SELECT 1").unwrap(), vec!["SELECT 1".to_string()]);
        assert!(split_statements("SELECT 'open").is_err());
    }

    #[test]
    fn test_run_script_prints_results() {
        let db = Database::default();
        let mut session = db.session();
        let mut out = Vec::new();
        let count = run_script(
            &mut session,
            "CREATE TABLE t (a INT); INSERT INTO t VALUES (1), (2); SELECT a FROM t ORDER BY a DESC;",
            &mut out,
        )
        .unwrap();
        assert_eq!(count, 3);
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("OK\n2 rows affected\n"));
        assert!(text.contains("(2 rows)"));
    }

    #[test]
    fn test_run_script_file_stops_at_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "CREATE TABLE t (a INT PRIMARY KEY);").unwrap();
        writeln!(file, "INSERT INTO t VALUES (1);").unwrap();
        writeln!(file, "INSERT INTO t VALUES (1);").unwrap();
        writeln!(file, "INSERT INTO t VALUES (2);").unwrap();

        let db = Database::default();
        let mut session = db.session();
        let mut out = Vec::new();
        let err = run_script_file(&mut session, file.path(), &mut out).unwrap_err();
        assert!(format!("{:#}", err).contains("statement 3 failed"));

        let rows = session.execute("SELECT COUNT(*) FROM t").unwrap();
        assert_eq!(
            rows.rows().unwrap().first_column(),
            vec![crate::access::Value::BigInt(1)]
        );
    }

    #[test]
    fn test_missing_script_file() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::default();
        let mut session = db.session();
        let err = run_script_file(&mut session, &dir.path().join("none.sql"), &mut Vec::new())
            .unwrap_err();
        assert!(err.to_string().contains("failed to read script"));
    }
}
