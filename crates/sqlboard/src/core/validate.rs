//! Allow-list check for user SQL: one read-only `SELECT`, nothing else.
//!
//! This is a lexical scan, not a parser. It only has to tell quoted text and
//! comments apart from keywords; whether the query is valid SQL is left to
//! the engine.

use serde::Serialize;

use crate::error::{AppError, AppResult};

/// Keywords rejected anywhere outside literals and comments.
const FORBIDDEN_CLAUSES: &[&str] = &["ATTACH", "DETACH", "PRAGMA", "VACUUM", "REINDEX"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ValidationResult {
    pub fn accepted() -> Self {
        Self { ok: true, reason: None }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            ok: false,
            reason: Some(reason.into()),
        }
    }

    pub fn into_result(self) -> AppResult<()> {
        match self.reason {
            Some(reason) if !self.ok => Err(AppError::Validation(reason)),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Word(String),
    Semicolon,
    Other,
}

/// Checks `query` against the rules below; the first violated rule wins.
///
/// 1. no `;` outside quoted text
/// 2. the leading keyword is `SELECT`
/// 3. none of [`FORBIDDEN_CLAUSES`] appear
///
/// An empty query is a malformed request rather than a rejected one, so it
/// comes back as `Err`.
pub fn validate(query: &str) -> AppResult<ValidationResult> {
    if query.trim().is_empty() {
        return Err(AppError::InvalidRequest("Query is required".into()));
    }

    let tokens = tokenize(query);

    if tokens.iter().any(|t| *t == Token::Semicolon) {
        return Ok(ValidationResult::rejected("Semicolons are not allowed"));
    }

    match tokens.first() {
        Some(Token::Word(w)) if w == "SELECT" => {}
        Some(Token::Word(w)) => {
            return Ok(ValidationResult::rejected(format!("{w} operations are not allowed")));
        }
        _ => {
            return Ok(ValidationResult::rejected("Non-SELECT operations are not allowed"));
        }
    }

    for t in &tokens {
        if let Token::Word(w) = t {
            if FORBIDDEN_CLAUSES.contains(&w.as_str()) {
                return Ok(ValidationResult::rejected(format!("{w} clauses are not allowed")));
            }
        }
    }

    Ok(ValidationResult::accepted())
}

/// Validates and turns a rejection into [`AppError::Validation`].
pub fn ensure_valid(query: &str) -> AppResult<()> {
    validate(query)?.into_result()
}

fn tokenize(sql: &str) -> Vec<Token> {
    let chars: Vec<char> = sql.chars().collect();
    let mut out = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '\'' => i = skip_quoted(&chars, i, '\''),
            '"' => i = skip_quoted(&chars, i, '"'),
            '`' => i = skip_quoted(&chars, i, '`'),
            '[' => i = skip_quoted(&chars, i, ']'),
            '-' if chars.get(i + 1) == Some(&'-') => {
                let end = chars[i..]
                    .iter()
                    .position(|&ch| ch == '\n')
                    .map_or(chars.len(), |p| i + p);
                // A `;` hidden in a comment still counts.
                if chars[i..end].contains(&';') {
                    out.push(Token::Semicolon);
                }
                i = end;
            }
            '/' if chars.get(i + 1) == Some(&'*') => {
                let end = find_block_end(&chars, i + 2);
                if chars[i..end].contains(&';') {
                    out.push(Token::Semicolon);
                }
                i = end;
            }
            ';' => {
                out.push(Token::Semicolon);
                i += 1;
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_' || chars[i] == '$') {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                out.push(Token::Word(word.to_ascii_uppercase()));
            }
            c if c.is_ascii_digit() => {
                // Numeric literals like `1e5` must not yield a keyword.
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '.') {
                    i += 1;
                }
                out.push(Token::Other);
            }
            _ => {
                out.push(Token::Other);
                i += 1;
            }
        }
    }

    out
}

/// Returns the index just past the closing `close`; a doubled closer is an escape.
/// Unterminated quotes swallow the rest of the input.
fn skip_quoted(chars: &[char], open: usize, close: char) -> usize {
    let mut i = open + 1;
    while i < chars.len() {
        if chars[i] == close {
            if chars.get(i + 1) == Some(&close) && close != ']' {
                i += 2;
                continue;
            }
            return i + 1;
        }
        i += 1;
    }
    chars.len()
}

fn find_block_end(chars: &[char], from: usize) -> usize {
    let mut i = from;
    while i + 1 < chars.len() {
        if chars[i] == '*' && chars[i + 1] == '/' {
            return i + 2;
        }
        i += 1;
    }
    chars.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reason(q: &str) -> Option<String> {
        validate(q).unwrap().reason
    }

    #[test]
    fn accepts_plain_select() {
        assert_eq!(validate("SELECT * FROM users").unwrap(), ValidationResult::accepted());
        assert!(validate("  select id, name from users where id > 3 order by name").unwrap().ok);
    }

    #[test]
    fn rejects_mutating_statements() {
        assert_eq!(reason("DROP TABLE users").as_deref(), Some("DROP operations are not allowed"));
        assert_eq!(reason("DELETE FROM users").as_deref(), Some("DELETE operations are not allowed"));
        assert_eq!(
            reason("insert into users values (1)").as_deref(),
            Some("INSERT operations are not allowed")
        );
        assert_eq!(reason("PRAGMA table_info(users)").as_deref(), Some("PRAGMA operations are not allowed"));
    }

    #[test]
    fn rejects_statement_chaining() {
        assert_eq!(
            reason("SELECT * FROM users; DROP TABLE users;").as_deref(),
            Some("Semicolons are not allowed")
        );
        assert_eq!(reason("SELECT 1;").as_deref(), Some("Semicolons are not allowed"));
    }

    #[test]
    fn semicolon_inside_string_literal_is_fine() {
        assert!(validate("SELECT * FROM users WHERE name = 'a;b'").unwrap().ok);
        assert!(validate("SELECT 'it''s; fine' AS x").unwrap().ok);
        assert!(validate("SELECT \"odd;col\" FROM t").unwrap().ok);
    }

    #[test]
    fn semicolon_wins_over_operation_rule() {
        assert_eq!(reason("DROP TABLE users;").as_deref(), Some("Semicolons are not allowed"));
    }

    #[test]
    fn leading_comments_are_skipped() {
        assert!(validate("-- totals\n/* by user */ SELECT 1").unwrap().ok);
        assert_eq!(
            reason("/* sneaky */ DELETE FROM users").as_deref(),
            Some("DELETE operations are not allowed")
        );
    }

    #[test]
    fn rejects_forbidden_clauses_mid_query() {
        assert_eq!(
            reason("SELECT * FROM pragma_table_info('users') WHERE 1 = 1 AND PRAGMA").as_deref(),
            Some("PRAGMA clauses are not allowed")
        );
        assert_eq!(
            reason("SELECT 1 FROM t ATTACH DATABASE 'x' AS y").as_deref(),
            Some("ATTACH clauses are not allowed")
        );
    }

    #[test]
    fn keyword_inside_literal_is_ignored() {
        assert!(validate("SELECT * FROM logs WHERE msg = 'VACUUM done'").unwrap().ok);
        // Identifier that merely contains a keyword.
        assert!(validate("SELECT * FROM pragma_table_info('users')").unwrap().ok);
    }

    #[test]
    fn non_word_start_is_rejected() {
        assert_eq!(
            reason("(SELECT 1)").as_deref(),
            Some("Non-SELECT operations are not allowed")
        );
    }

    #[test]
    fn empty_query_is_a_request_error() {
        assert!(matches!(validate("   "), Err(AppError::InvalidRequest(_))));
    }

    #[test]
    fn ensure_valid_maps_to_validation_error() {
        match ensure_valid("UPDATE users SET name = 'x'") {
            Err(AppError::Validation(r)) => assert_eq!(r, "UPDATE operations are not allowed"),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
