//! Metric-derivation pipeline for business dashboards.
//!
//! Raw transactions flow through `loader -> window -> aggregate -> derive ->
//! pivot -> catalog`; `reports` wires the stages into one catalog per
//! dashboard. Every stage is a pure function of its input.

pub mod aggregate;
pub mod catalog;
pub mod config;
pub mod derive;
pub mod error;
pub mod loader;
pub mod logger;
pub mod output;
pub mod pivot;
pub mod reports;
pub mod types;
pub mod util;
pub mod window;

pub use catalog::{MetricCatalog, MetricSeries, MetricValue};
pub use config::PipelineConfig;
pub use derive::{DerivedMetric, Status, StatusBands, Unit};
pub use error::{PipelineError, Result};
pub use types::{OrderRecord, TransactionRecord};
pub use window::{Activity, WindowSelector};
