use rusqlite::{Connection, Row};

use crate::core::types::{ColumnInfo, Schema, TableInfo};
use crate::error::AppResult;

/// Snapshot of every user table: columns in declared order plus an exact row count.
pub fn get_schema(conn: &Connection) -> AppResult<Schema> {
    let mut schema = Schema::new();
    for table in list_tables(conn)? {
        let columns = list_columns(conn, &table)?;
        let row_count = count_table_rows(conn, &table)?;
        schema.insert(table, TableInfo { columns, row_count });
    }
    Ok(schema)
}

pub fn list_tables(conn: &Connection) -> AppResult<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%' ORDER BY rowid",
    )?;
    let rows = stmt
        .query_map([], |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn list_columns(conn: &Connection, table: &str) -> AppResult<Vec<ColumnInfo>> {
    // The table-valued form takes the name as a bound parameter, so no
    // identifier has to be spliced into the SQL.
    let mut stmt = conn.prepare("SELECT name, type, \"notnull\", pk FROM pragma_table_info(?1) ORDER BY cid")?;
    let cols = stmt
        .query_map([table], |row: &Row<'_>| {
            let not_null: i64 = row.get(2)?;
            let pk: i64 = row.get(3)?;
            Ok(ColumnInfo {
                name: row.get(0)?,
                column_type: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                primary_key: pk > 0,
                nullable: not_null == 0,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(cols)
}

fn count_table_rows(conn: &Connection, table: &str) -> AppResult<u64> {
    let sql = format!("SELECT COUNT(*) FROM {}", quote_identifier(table));
    let n: i64 = conn.query_row(&sql, [], |r| r.get(0))?;
    Ok(n.max(0) as u64)
}

pub(crate) fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
