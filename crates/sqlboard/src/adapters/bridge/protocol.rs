use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::chart::contract::ChartData;
use crate::core::limits::DEFAULT_PAGE_SIZE;
use crate::core::types::{QueryResult, Schema};
use crate::error::AppError;

pub const PROTOCOL_VERSION: u32 = 1;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BridgeRequest {
    pub v: u32,
    pub id: String,
    pub cmd: String,
    #[serde(default)]
    pub payload: Value,
}

/// `{v, id}` plus either `{success: true, ...data}` or `{error, code, status, details?}`.
/// A success body never carries an `error` key.
#[derive(Debug, Serialize)]
pub struct BridgeResponse {
    pub v: u32,
    pub id: String,
    #[serde(flatten)]
    pub body: Map<String, Value>,
}

impl BridgeResponse {
    /// `data` must serialize to a JSON object; its fields sit next to `success`.
    pub fn ok(v: u32, id: String, data: Value) -> Self {
        let mut body = Map::new();
        body.insert("success".into(), Value::Bool(true));
        match data {
            Value::Object(fields) => body.extend(fields.into_iter().filter(|(k, _)| k != "error")),
            Value::Null => {}
            other => {
                body.insert("data".into(), other);
            }
        }
        Self { v, id, body }
    }

    pub fn err(v: u32, id: String, e: &AppError, details: Option<Value>) -> Self {
        let mut body = Map::new();
        body.insert("error".into(), Value::from(e.to_string()));
        body.insert("code".into(), Value::from(e.code()));
        body.insert("status".into(), Value::from(e.status()));
        if let Some(d) = details {
            body.insert("details".into(), d);
        }
        Self { v, id, body }
    }

    /// Answer to a line that did not parse as a request; the id is unknown.
    pub fn protocol_error(msg: String) -> Self {
        Self::err(PROTOCOL_VERSION, String::new(), &AppError::InvalidRequest(msg), None)
    }

    pub fn is_error(&self) -> bool {
        self.body.contains_key("error")
    }
}

// Payloads

#[derive(Debug, Deserialize)]
pub struct SchemaPayload {
    pub filename: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryPayload {
    pub filename: String,
    pub query: String,
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_page_size")]
    pub page_size: i64,
}

#[derive(Debug, Deserialize)]
pub struct ValidateQueryPayload {
    pub query: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateChartPayload {
    pub chart_function_source: String,
    #[serde(default)]
    pub query_result: Option<QueryResult>,
}

fn default_page() -> i64 {
    1
}

fn default_page_size() -> i64 {
    DEFAULT_PAGE_SIZE
}

// Response data

#[derive(Debug, Serialize)]
pub struct SchemaData<'a> {
    pub schema: &'a Schema,
    pub filename: &'a str,
}

#[derive(Debug, Serialize)]
pub struct ChartReady<'a> {
    pub data: &'a ChartData,
}
