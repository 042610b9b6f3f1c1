//! Gate for model-generated Cypher. Only single read statements get through.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnsafeQuery {
    #[error("empty query")]
    Empty,
    #[error("unterminated string literal")]
    UnterminatedLiteral,
    #[error("comments are not allowed")]
    Comment,
    #[error("multiple statements are not allowed")]
    MultipleStatements,
    #[error("forbidden clause: {0}")]
    Forbidden(String),
    #[error("query must start with a read clause")]
    MissingReadClause,
}

const FORBIDDEN: &[&str] = &[
    "CREATE", "MERGE", "DELETE", "DETACH", "SET", "REMOVE", "DROP", "FOREACH", "LOAD", "CALL",
];

const READ_CLAUSES: &[&str] = &["MATCH", "OPTIONAL", "WITH", "RETURN", "UNWIND"];

#[derive(Debug, Clone, Copy, Default)]
pub struct CypherSafetyChecker;

impl CypherSafetyChecker {
    pub fn new() -> Self {
        Self
    }

    /// Accept a read-only statement and return it without its trailing `;`
    pub fn check(&self, query: &str) -> Result<String, UnsafeQuery> {
        let statement = query.trim();
        let statement = statement.strip_suffix(';').unwrap_or(statement).trim_end();
        if statement.is_empty() {
            return Err(UnsafeQuery::Empty);
        }

        // Keywords inside string literals are data, not clauses
        let code = strip_literals(statement)?;
        if code.contains("//") || code.contains("/*") {
            return Err(UnsafeQuery::Comment);
        }
        if code.contains(';') {
            return Err(UnsafeQuery::MultipleStatements);
        }

        let keywords: Vec<String> = code
            .split(|c: char| !(c.is_alphanumeric() || c == '_'))
            .filter(|word| !word.is_empty())
            .map(str::to_uppercase)
            .collect();

        if let Some(word) = keywords.iter().find(|w| FORBIDDEN.contains(&w.as_str())) {
            return Err(UnsafeQuery::Forbidden(word.clone()));
        }

        match keywords.first() {
            Some(first) if READ_CLAUSES.contains(&first.as_str()) => Ok(statement.to_string()),
            _ => Err(UnsafeQuery::MissingReadClause),
        }
    }
}

/// Replace quoted strings and backtick identifiers with blanks
fn strip_literals(query: &str) -> Result<String, UnsafeQuery> {
    let mut code = String::with_capacity(query.len());
    let mut chars = query.chars();

    while let Some(c) = chars.next() {
        if !matches!(c, '\'' | '"' | '`') {
            code.push(c);
            continue;
        }

        let mut closed = false;
        while let Some(inner) = chars.next() {
            if inner == '\\' && c != '`' {
                chars.next();
            } else if inner == c {
                closed = true;
                break;
            }
        }
        if !closed {
            return Err(UnsafeQuery::UnterminatedLiteral);
        }
        code.push(' ');
    }

    Ok(code)
}
