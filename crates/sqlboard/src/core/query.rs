use rusqlite::{params, Connection, Params};

use crate::core::limits::{PageMeta, PageRequest};
use crate::core::readonly;
use crate::core::types::{QueryResult, Row, Value};
use crate::error::AppResult;

/// How `totalRows` was obtained for a query.
#[derive(Debug, Clone, PartialEq)]
pub enum CountOutcome {
    /// `SELECT COUNT(*) FROM (<query>)` prepared and ran.
    Wrapped(u64),
    /// Wrapping did not prepare, so the inner query ran in full. The rows are
    /// kept so the page can be cut from memory instead of running it again.
    Buffered { columns: Vec<String>, rows: Vec<Row> },
}

impl CountOutcome {
    pub fn total(&self) -> u64 {
        match self {
            CountOutcome::Wrapped(n) => *n,
            CountOutcome::Buffered { rows, .. } => rows.len() as u64,
        }
    }

    fn strategy(&self) -> &'static str {
        match self {
            CountOutcome::Wrapped(_) => "wrapped",
            CountOutcome::Buffered { .. } => "buffered",
        }
    }
}

/// Counts the rows `sql` produces, falling back to running it in full when
/// the engine refuses the `COUNT(*)` wrapper (e.g. a trailing `--` comment
/// swallowing the closing parenthesis).
pub fn count_rows(conn: &Connection, sql: &str) -> AppResult<CountOutcome> {
    let wrapped = format!("SELECT COUNT(*) FROM ({sql})");
    match conn.prepare(&wrapped) {
        Ok(mut stmt) => {
            readonly::ensure_readonly(&stmt)?;
            let n: i64 = stmt.query_row([], |r| r.get(0))?;
            Ok(CountOutcome::Wrapped(n.max(0) as u64))
        }
        Err(e) if e.sqlite_error_code() == Some(rusqlite::ErrorCode::NotADatabase) => Err(e.into()),
        Err(e) => {
            tracing::debug!(error = %e, "count wrapper rejected; buffering inner query");
            let (columns, rows) = collect_rows(conn, sql, params![])?;
            Ok(CountOutcome::Buffered { columns, rows })
        }
    }
}

/// Runs one page of `sql`. `sql` is expected to have passed
/// [`crate::core::validate`] already.
pub fn run_paginated(conn: &Connection, sql: &str, req: &PageRequest) -> AppResult<QueryResult> {
    let count = count_rows(conn, sql)?;
    let total_rows = count.total();
    tracing::debug!(strategy = count.strategy(), total_rows, page = req.page, page_size = req.page_size, "counted rows");

    let (columns, rows) = match count {
        CountOutcome::Wrapped(_) => {
            let page_sql = format!("SELECT * FROM ({sql}) LIMIT ?1 OFFSET ?2");
            let limit = i64::try_from(req.page_size).unwrap_or(i64::MAX);
            let offset = i64::try_from(req.offset()).unwrap_or(i64::MAX);
            let (_, rows) = collect_rows(conn, &page_sql, params![limit, offset])?;
            // The outer `SELECT *` renames duplicates (`id`, `id:1`); report the
            // names the query itself declares.
            (declared_columns(conn, sql)?, rows)
        }
        CountOutcome::Buffered { columns, rows } => {
            let offset = usize::try_from(req.offset()).unwrap_or(usize::MAX);
            let page: Vec<Row> = rows
                .into_iter()
                .skip(offset)
                .take(req.page_size as usize)
                .collect();
            (columns, page)
        }
    };

    // Column names of an empty page are not reported.
    let columns = if rows.is_empty() { Vec::new() } else { columns };
    let meta = PageMeta::compute(total_rows, req);

    Ok(QueryResult {
        columns,
        rows,
        total_rows,
        page: req.page,
        page_size: req.page_size,
        total_pages: meta.total_pages,
        has_more: meta.has_more,
    })
}

/// Column names of `sql` as written. Prepares without stepping.
fn declared_columns(conn: &Connection, sql: &str) -> AppResult<Vec<String>> {
    let stmt = conn.prepare(sql)?;
    Ok(stmt.column_names().into_iter().map(String::from).collect())
}

fn collect_rows<P: Params>(conn: &Connection, sql: &str, params: P) -> AppResult<(Vec<String>, Vec<Row>)> {
    let mut stmt = conn.prepare(sql)?;
    readonly::ensure_readonly(&stmt)?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let width = columns.len();

    let mut rows = Vec::new();
    let mut r = stmt.query(params)?;
    while let Some(row) = r.next()? {
        let mut out = Vec::with_capacity(width);
        for i in 0..width {
            out.push(Value::from(row.get_ref(i)?));
        }
        rows.push(out);
    }
    Ok((columns, rows))
}
