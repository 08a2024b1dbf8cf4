use std::panic::{self, AssertUnwindSafe};

use serde::Serialize;
use thiserror::Error;

use crate::chart::validator::validate_chart_function;
use crate::core::types::QueryResult;

/// Rows shown next to a chart error.
pub const PREVIEW_ROWS: usize = 5;
pub const RETURN_CONTRACT: &str = "Chart function must return a DOM element";

/// One query row keyed by column name, columns in query order.
pub type Record = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartData {
    pub records: Vec<Record>,
    pub total_rows: u64,
}

impl ChartData {
    pub fn from_result(result: &QueryResult) -> Self {
        let records = result
            .rows
            .iter()
            .map(|row| {
                result
                    .columns
                    .iter()
                    .zip(row)
                    .map(|(name, value)| (name.clone(), value.to_json()))
                    .collect()
            })
            .collect();
        Self {
            records,
            total_rows: result.total_rows,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChartSize {
    pub width: u32,
    pub height: u32,
}

impl Default for ChartSize {
    fn default() -> Self {
        Self { width: 600, height: 400 }
    }
}

/// What the user function handed back.
#[derive(Debug, Clone, PartialEq)]
pub enum ChartReturn<S> {
    /// A drawable surface (the one passed in or a compatible one).
    Surface(S),
    /// Anything else; carries the host's description of the value's type.
    Other(String),
}

/// An error thrown inside the user function, message kept as thrown.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ChartRuntimeError {
    pub message: String,
}

impl ChartRuntimeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

/// The script host that actually runs chart functions.
pub trait ChartRenderer {
    type Surface;

    fn render(
        &self,
        source: &str,
        data: &[Record],
        surface: Self::Surface,
        size: ChartSize,
    ) -> Result<ChartReturn<Self::Surface>, ChartRuntimeError>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartFailure {
    pub error: String,
    pub preview: Vec<Record>,
    pub preview_summary: String,
    pub total_rows: u64,
}

impl ChartFailure {
    pub fn new(error: impl Into<String>, data: &ChartData) -> Self {
        let preview: Vec<Record> = data.records.iter().take(PREVIEW_ROWS).cloned().collect();
        Self {
            error: error.into(),
            preview_summary: format!("Showing {} of {} rows", preview.len(), data.total_rows),
            preview,
            total_rows: data.total_rows,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChartOutcome<S> {
    Rendered(S),
    Failed(ChartFailure),
}

/// Validates `source`, then invokes it exactly once. Every failure, including
/// a panicking host, ends up as [`ChartOutcome::Failed`].
pub fn run_chart<R: ChartRenderer>(
    renderer: &R,
    source: &str,
    result: &QueryResult,
    surface: R::Surface,
    size: ChartSize,
) -> ChartOutcome<R::Surface> {
    let data = ChartData::from_result(result);

    match validate_chart_function(source) {
        Ok(v) if v.ok => {}
        Ok(v) => return ChartOutcome::Failed(ChartFailure::new(v.reason.unwrap_or_default(), &data)),
        Err(e) => return ChartOutcome::Failed(ChartFailure::new(e.to_string(), &data)),
    }

    let invoked = panic::catch_unwind(AssertUnwindSafe(|| renderer.render(source, &data.records, surface, size)));
    match invoked {
        Ok(Ok(ChartReturn::Surface(s))) => ChartOutcome::Rendered(s),
        Ok(Ok(ChartReturn::Other(kind))) => {
            tracing::debug!(returned = %kind, "chart function returned a non-drawable value");
            ChartOutcome::Failed(ChartFailure::new(RETURN_CONTRACT, &data))
        }
        Ok(Err(e)) => ChartOutcome::Failed(ChartFailure::new(e.message, &data)),
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "chart renderer panicked".to_string());
            tracing::warn!(%message, "chart renderer panicked");
            ChartOutcome::Failed(ChartFailure::new(message, &data))
        }
    }
}
