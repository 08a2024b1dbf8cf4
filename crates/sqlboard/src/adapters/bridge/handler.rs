use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{
    chart::{
        contract::{ChartData, ChartFailure},
        validator,
    },
    cli::Args,
    core::{
        connection::DatabaseStore,
        limits::PageRequest,
        query, schema,
        validate::{self, ValidationResult},
    },
    error::{AppError, AppResult},
};

use super::protocol::*;

/// A failed command: the error plus optional extra context for the caller.
struct Failure {
    error: AppError,
    details: Option<Value>,
}

impl From<AppError> for Failure {
    fn from(error: AppError) -> Self {
        Self { error, details: None }
    }
}

type CmdResult = Result<Value, Failure>;

pub struct BridgeHandler {
    store: DatabaseStore,
    max_page_size: usize,
}

impl BridgeHandler {
    pub fn new(args: &Args) -> Self {
        Self::with_store(
            DatabaseStore::new(&args.data_dir, Duration::from_millis(args.busy_timeout_ms)),
            args.max_page_size,
        )
    }

    pub fn with_store(store: DatabaseStore, max_page_size: usize) -> Self {
        Self { store, max_page_size }
    }

    pub async fn handle(&self, req: BridgeRequest) -> BridgeResponse {
        if req.v != PROTOCOL_VERSION {
            let e = AppError::InvalidRequest(format!("unsupported protocol version: {}", req.v));
            return BridgeResponse::err(req.v, req.id, &e, None);
        }

        let res = match req.cmd.as_str() {
            "schema" => self.handle_schema(req.payload).await,
            "query" => self.handle_query(req.payload).await,
            "validate_query" => handle_validate_query(req.payload),
            "validate_chart" => handle_validate_chart(req.payload),
            other => Err(AppError::InvalidRequest(format!("unknown cmd: {other}")).into()),
        };

        match res {
            Ok(data) => BridgeResponse::ok(req.v, req.id, data),
            Err(Failure { error, details }) => {
                if error.status() >= 500 {
                    tracing::warn!(cmd = %req.cmd, code = error.code(), error = %error, "command failed");
                } else {
                    tracing::debug!(cmd = %req.cmd, code = error.code(), reason = %error, "command rejected");
                }
                BridgeResponse::err(req.v, req.id, &error, details)
            }
        }
    }

    async fn handle_schema(&self, payload: Value) -> CmdResult {
        let p: SchemaPayload = parse_payload(payload)?;
        let schema = self.store.with_database(&p.filename, schema::get_schema).await?;
        to_data(&SchemaData {
            schema: &schema,
            filename: &p.filename,
        })
    }

    async fn handle_query(&self, payload: Value) -> CmdResult {
        let p: QueryPayload = parse_payload(payload)?;
        validate::ensure_valid(&p.query)?;

        let page = PageRequest::clamped(p.page, p.page_size, self.max_page_size);
        tracing::debug!(filename = %p.filename, page = page.page, page_size = page.page_size, "running query");
        let sql = p.query;
        let qr = self
            .store
            .with_database(&p.filename, move |conn| query::run_paginated(conn, &sql, &page))
            .await?;
        to_data(&qr)
    }
}

fn handle_validate_query(payload: Value) -> CmdResult {
    let p: ValidateQueryPayload = parse_payload(payload)?;
    validate::ensure_valid(&p.query)?;
    Ok(Value::Null)
}

fn handle_validate_chart(payload: Value) -> CmdResult {
    let p: ValidateChartPayload = parse_payload(payload)?;
    let data = p
        .query_result
        .as_ref()
        .map(ChartData::from_result)
        .unwrap_or_else(|| ChartData {
            records: Vec::new(),
            total_rows: 0,
        });

    match validator::validate_chart_function(&p.chart_function_source)? {
        ValidationResult { ok: true, .. } => to_data(&ChartReady { data: &data }),
        ValidationResult { reason, .. } => {
            let failure = ChartFailure::new(reason.unwrap_or_default(), &data);
            let details = serde_json::to_value(&failure).map_err(AppError::from)?;
            Err(Failure {
                error: AppError::Validation(failure.error),
                details: Some(details),
            })
        }
    }
}

fn parse_payload<T: DeserializeOwned>(payload: Value) -> AppResult<T> {
    serde_json::from_value(payload).map_err(|e| AppError::InvalidRequest(e.to_string()))
}

fn to_data<T: serde::Serialize>(data: &T) -> CmdResult {
    Ok(serde_json::to_value(data).map_err(AppError::from)?)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::core::limits::MAX_PAGE_SIZE;
    use crate::core::test_support::users_file;

    fn req(cmd: &str, payload: Value) -> BridgeRequest {
        BridgeRequest {
            v: 1,
            id: "t".into(),
            cmd: cmd.into(),
            payload,
        }
    }

    async fn call(h: &BridgeHandler, cmd: &str, payload: Value) -> Value {
        serde_json::to_value(h.handle(req(cmd, payload)).await).unwrap()
    }

    fn handler(dir: &std::path::Path) -> BridgeHandler {
        BridgeHandler::with_store(DatabaseStore::new(dir, Duration::from_millis(100)), MAX_PAGE_SIZE)
    }

    #[tokio::test]
    async fn schema_command() {
        let (dir, name) = users_file();
        let v = call(&handler(dir.path()), "schema", json!({ "filename": name })).await;
        assert_eq!(v["success"], true);
        assert_eq!(v["filename"], "users.db");
        assert_eq!(v["schema"]["users"]["rowCount"], 10);
        assert_eq!(v["schema"]["users"]["columns"][0]["primaryKey"], true);
        assert_eq!(v["schema"]["users"]["columns"][1]["nullable"], false);
    }

    #[tokio::test]
    async fn query_command_end_to_end() {
        let (dir, name) = users_file();
        let v = call(
            &handler(dir.path()),
            "query",
            json!({ "filename": name, "query": "SELECT * FROM users WHERE name LIKE 'A%'" }),
        )
        .await;
        assert_eq!(v["columns"], json!(["id", "name", "email"]));
        assert_eq!(v["rows"], json!([[1, "Alice Johnson", "alice@example.com"]]));
        assert_eq!(v["totalRows"], 1);
        assert_eq!(v["hasMore"], false);
        assert!(v.get("error").is_none());
    }

    #[tokio::test]
    async fn query_clamps_pagination() {
        let (dir, name) = users_file();
        let h = handler(dir.path());
        let v = call(&h, "query", json!({ "filename": name, "query": "SELECT id FROM users", "page": -5, "pageSize": 0 })).await;
        assert_eq!((v["page"].clone(), v["pageSize"].clone()), (json!(1), json!(1)));
        assert_eq!(v["totalPages"], 10);
        assert_eq!(v["hasMore"], true);

        let v = call(&h, "query", json!({ "filename": name, "query": "SELECT id FROM users", "pageSize": 5000 })).await;
        assert_eq!(v["pageSize"], 1000);
    }

    #[tokio::test]
    async fn query_rejections_are_distinct() {
        let (dir, name) = users_file();
        let h = handler(dir.path());

        let v = call(&h, "query", json!({ "filename": name, "query": "DROP TABLE users" })).await;
        assert_eq!(v["error"], "DROP operations are not allowed");
        assert_eq!(v["status"], 400);

        let v = call(&h, "query", json!({ "filename": "missing.db", "query": "SELECT 1" })).await;
        assert_eq!(v["code"], "NOT_FOUND");
        assert_eq!(v["status"], 404);

        let v = call(&h, "query", json!({ "filename": name, "query": "SELECT nope FROM users" })).await;
        assert_eq!(v["code"], "QUERY_FAILED");
        assert_eq!(v["status"], 500);

        let v = call(&h, "query", json!({ "filename": "../users.db", "query": "SELECT 1" })).await;
        assert_eq!(v["code"], "INVALID_REQUEST");
    }

    #[tokio::test]
    async fn corrupt_file_is_client_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("broken.db"), vec![b'z'; 4096]).unwrap();
        let v = call(&handler(dir.path()), "schema", json!({ "filename": "broken.db" })).await;
        assert_eq!(v["code"], "CORRUPT_DATABASE");
        assert_eq!(v["status"], 400);
    }

    #[tokio::test]
    async fn validate_chart_reports_preview() {
        let dir = tempfile::tempdir().unwrap();
        let h = handler(dir.path());
        let qr = json!({
            "columns": ["n"],
            "rows": [[1], [2], [3], [4], [5], [6], [7]],
            "totalRows": 7, "page": 1, "pageSize": 50, "totalPages": 1, "hasMore": false
        });

        let v = call(&h, "validate_chart", json!({
            "chartFunctionSource": "function(data, svg) { while(true){} }",
            "queryResult": qr,
        }))
        .await;
        assert_eq!(v["error"], "while loops are not allowed");
        assert_eq!(v["details"]["previewSummary"], "Showing 5 of 7 rows");
        assert_eq!(v["details"]["preview"].as_array().map(Vec::len), Some(5));
        let data = ChartData::from_result(&serde_json::from_value(qr.clone()).unwrap());
        let expected = ChartFailure::new("while loops are not allowed", &data);
        assert_eq!(v["details"], serde_json::to_value(&expected).unwrap());

        let v = call(&h, "validate_chart", json!({
            "chartFunctionSource": "function(data, svg) { return svg; }",
            "queryResult": qr,
        }))
        .await;
        assert_eq!(v["success"], true);
        assert_eq!(v["data"]["records"][6]["n"], 7);
    }

    #[tokio::test]
    async fn validate_query_and_unknown_cmd() {
        let dir = tempfile::tempdir().unwrap();
        let h = handler(dir.path());
        let v = call(&h, "validate_query", json!({ "query": "SELECT 1" })).await;
        assert_eq!(v, json!({ "v": 1, "id": "t", "success": true }));

        let v = call(&h, "validate_query", json!({ "query": "SELECT 1; SELECT 2" })).await;
        assert_eq!(v["error"], "Semicolons are not allowed");

        let v = call(&h, "explode", json!({})).await;
        assert_eq!(v["code"], "INVALID_REQUEST");
    }

    #[tokio::test]
    async fn wrong_protocol_version() {
        let dir = tempfile::tempdir().unwrap();
        let mut r = req("schema", json!({}));
        r.v = 2;
        let resp = handler(dir.path()).handle(r).await;
        assert!(resp.is_error());
    }
}
