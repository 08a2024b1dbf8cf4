//! Query, schema and chart-function core behind the SQLite dashboard.
//!
//! User SQL is checked by [`core::validate`], paginated by [`core::query`]
//! against a read-only handle from [`core::connection`]. User chart scripts
//! are checked by [`chart::validator`] before they reach a host renderer
//! through [`chart::contract`].

pub mod adapters;
pub mod chart;
pub mod cli;
pub mod core;
pub mod error;
pub mod logging;
