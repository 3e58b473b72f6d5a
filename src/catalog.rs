//! The immutable hand-off structure between the pipeline and whatever draws
//! the dashboards.
//!
//! A catalog is only obtainable through [`CatalogBuilder::build`], which
//! checks every declared metric against the fallback policy first. Once
//! built there is no way to mutate it.

use crate::aggregate::Aggregate;
use crate::config::{Fallback, FallbackPolicy};
use crate::derive::{DerivedMetric, Unit};
use crate::error::{PipelineError, Result};
use crate::pivot::PivotTable;
use crate::window::Activity;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesPoint {
    pub bucket: String,
    pub value: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricSeries {
    pub name: String,
    pub unit: Unit,
    pub points: Vec<SeriesPoint>,
    pub activity: Activity,
}

impl MetricSeries {
    /// One point per aggregate row, labels taken from the whole group key.
    pub fn from_aggregate(name: impl Into<String>, agg: &Aggregate, unit: Unit) -> Self {
        let points = agg
            .rows
            .iter()
            .map(|r| SeriesPoint { bucket: r.key.label(), value: r.value })
            .collect();
        let activity = if agg.rows.iter().any(|r| r.count > 0) {
            Activity::Observed
        } else {
            Activity::NoActivity
        };
        MetricSeries { name: name.into(), unit, points, activity }
    }

    pub fn map_values(mut self, f: impl Fn(Decimal) -> Decimal) -> Self {
        for p in &mut self.points {
            p.value = f(p.value);
        }
        self
    }

    pub fn rename(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn value(&self, bucket: &str) -> Option<Decimal> {
        self.points.iter().find(|p| p.bucket == bucket).map(|p| p.value)
    }

    pub fn total(&self) -> Decimal {
        self.points.iter().map(|p| p.value).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MetricValue {
    Scalar(DerivedMetric),
    Series(MetricSeries),
    Table(PivotTable),
}

impl MetricValue {
    pub fn activity(&self) -> Activity {
        match self {
            MetricValue::Scalar(m) => m.activity,
            MetricValue::Series(s) => s.activity,
            MetricValue::Table(t) => t.activity,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Scalar,
    Series,
    Table,
}

#[derive(Debug, Clone, Copy)]
pub struct MetricDecl {
    pub name: &'static str,
    pub kind: MetricKind,
    pub unit: Unit,
}

impl MetricDecl {
    pub const fn scalar(name: &'static str, unit: Unit) -> Self {
        MetricDecl { name, kind: MetricKind::Scalar, unit }
    }

    pub const fn series(name: &'static str, unit: Unit) -> Self {
        MetricDecl { name, kind: MetricKind::Series, unit }
    }

    pub const fn table(name: &'static str, unit: Unit) -> Self {
        MetricDecl { name, kind: MetricKind::Table, unit }
    }

    fn zero(&self) -> MetricValue {
        match self.kind {
            MetricKind::Scalar => MetricValue::Scalar(DerivedMetric::zero(self.name, self.unit)),
            MetricKind::Series => MetricValue::Series(MetricSeries {
                name: self.name.to_string(),
                unit: self.unit,
                points: Vec::new(),
                activity: Activity::NoActivity,
            }),
            MetricKind::Table => MetricValue::Table(PivotTable::empty(self.name, Vec::new())),
        }
    }
}

/// The metrics a dashboard promises to deliver.
#[derive(Debug, Clone)]
pub struct CatalogSchema {
    pub dashboard: &'static str,
    pub metrics: Vec<MetricDecl>,
}

impl CatalogSchema {
    pub fn decl(&self, name: &str) -> Option<&MetricDecl> {
        self.metrics.iter().find(|m| m.name == name)
    }
}

pub struct CatalogBuilder<'p> {
    schema: CatalogSchema,
    policy: &'p FallbackPolicy,
    entries: BTreeMap<String, MetricValue>,
}

impl<'p> CatalogBuilder<'p> {
    pub fn new(schema: CatalogSchema, policy: &'p FallbackPolicy) -> Self {
        CatalogBuilder { schema, policy, entries: BTreeMap::new() }
    }

    fn insert(&mut self, name: &str, kind: MetricKind, value: MetricValue) -> Result<&mut Self> {
        let decl = self.schema.decl(name).ok_or_else(|| {
            PipelineError::config(format!("metric '{}' is not declared for {}", name, self.schema.dashboard))
        })?;
        if decl.kind != kind {
            return Err(PipelineError::config(format!(
                "metric '{}' is declared as {:?}, got {:?}",
                name, decl.kind, kind
            )));
        }
        debug!(metric = name, activity = ?value.activity(), "metric staged");
        self.entries.insert(name.to_string(), value);
        Ok(self)
    }

    pub fn scalar(&mut self, metric: DerivedMetric) -> Result<&mut Self> {
        let name = metric.name.clone();
        self.insert(&name, MetricKind::Scalar, MetricValue::Scalar(metric))
    }

    pub fn series(&mut self, series: MetricSeries) -> Result<&mut Self> {
        let name = series.name.clone();
        self.insert(&name, MetricKind::Series, MetricValue::Series(series))
    }

    pub fn table(&mut self, name: &str, table: PivotTable) -> Result<&mut Self> {
        self.insert(name, MetricKind::Table, MetricValue::Table(table))
    }

    /// Every declared metric either carries data, or falls back to a
    /// zero-valued no-activity entry when its policy allows it. Anything else
    /// fails here, before a catalog exists.
    pub fn build(mut self) -> Result<MetricCatalog> {
        let mut entries = BTreeMap::new();
        for decl in &self.schema.metrics {
            let staged = self.entries.remove(decl.name);
            let observed = staged.as_ref().map(|v| v.activity()) == Some(Activity::Observed);
            let value = if observed {
                staged
            } else {
                match self.policy.for_metric(decl.name) {
                    Fallback::ZeroFill => Some(staged.unwrap_or_else(|| decl.zero())),
                    Fallback::None => None,
                }
            };
            match value {
                Some(v) => {
                    entries.insert(decl.name.to_string(), v);
                }
                None => {
                    return Err(PipelineError::IncompleteMetric { name: decl.name.to_string() });
                }
            }
        }
        info!(dashboard = self.schema.dashboard, metrics = entries.len(), "catalog built");
        Ok(MetricCatalog { dashboard: self.schema.dashboard.to_string(), entries })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricCatalog {
    dashboard: String,
    entries: BTreeMap<String, MetricValue>,
}

impl MetricCatalog {
    pub fn dashboard(&self) -> &str {
        &self.dashboard
    }

    pub fn get(&self, name: &str) -> Option<&MetricValue> {
        self.entries.get(name)
    }

    pub fn scalar(&self, name: &str) -> Option<&DerivedMetric> {
        match self.entries.get(name)? {
            MetricValue::Scalar(m) => Some(m),
            _ => None,
        }
    }

    pub fn series(&self, name: &str) -> Option<&MetricSeries> {
        match self.entries.get(name)? {
            MetricValue::Series(s) => Some(s),
            _ => None,
        }
    }

    pub fn table(&self, name: &str) -> Option<&PivotTable> {
        match self.entries.get(name)? {
            MetricValue::Table(t) => Some(t),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &MetricValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    fn schema() -> CatalogSchema {
        CatalogSchema {
            dashboard: "test",
            metrics: vec![
                MetricDecl::scalar("gross", Unit::Currency),
                MetricDecl::series("by_month", Unit::Currency),
            ],
        }
    }

    fn policy(default: Fallback) -> FallbackPolicy {
        FallbackPolicy { fallback: default, metrics: HashMap::new() }
    }

    #[test]
    fn observed_metrics_pass_through() {
        let policy = policy(Fallback::None);
        let mut builder = CatalogBuilder::new(schema(), &policy);
        builder
            .scalar(DerivedMetric::new("gross", dec!(12), Unit::Currency, Activity::Observed))
            .unwrap();
        builder
            .series(MetricSeries {
                name: "by_month".into(),
                unit: Unit::Currency,
                points: vec![SeriesPoint { bucket: "2024-01".into(), value: dec!(12) }],
                activity: Activity::Observed,
            })
            .unwrap();
        let catalog = builder.build().unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.scalar("gross").unwrap().value, dec!(12));
        assert_eq!(catalog.series("by_month").unwrap().value("2024-01"), Some(dec!(12)));
    }

    #[test]
    fn zero_fill_marks_no_activity() {
        let policy = policy(Fallback::ZeroFill);
        let mut builder = CatalogBuilder::new(schema(), &policy);
        builder.scalar(DerivedMetric::zero("gross", Unit::Currency)).unwrap();
        let catalog = builder.build().unwrap();
        let gross = catalog.scalar("gross").unwrap();
        assert_eq!(gross.value, Decimal::ZERO);
        assert_eq!(gross.activity, Activity::NoActivity);
        assert_eq!(catalog.series("by_month").unwrap().activity, Activity::NoActivity);
    }

    #[test]
    fn missing_data_without_fallback_fails() {
        let mut policy = policy(Fallback::ZeroFill);
        policy.metrics.insert("gross".to_string(), Fallback::None);
        let mut builder = CatalogBuilder::new(schema(), &policy);
        builder.scalar(DerivedMetric::zero("gross", Unit::Currency)).unwrap();
        match builder.build() {
            Err(PipelineError::IncompleteMetric { name }) => assert_eq!(name, "gross"),
            other => panic!("expected incomplete metric, got {other:?}"),
        }
    }

    #[test]
    fn zero_valued_table_with_records_is_observed() {
        let schema = CatalogSchema {
            dashboard: "test",
            metrics: vec![MetricDecl::table("monthly", Unit::Currency)],
        };
        let policy = policy(Fallback::None);
        let table = PivotTable {
            row_dimension: "Month".into(),
            rows: vec!["2024-01".into()],
            columns: vec!["Revenue Lost".into()],
            cells: vec![vec![Decimal::ZERO]],
            activity: Activity::Observed,
        };
        let mut builder = CatalogBuilder::new(schema.clone(), &policy);
        builder.table("monthly", table.clone()).unwrap();
        let catalog = builder.build().unwrap();
        assert_eq!(catalog.table("monthly").unwrap().cell("2024-01", "Revenue Lost"), Some(Decimal::ZERO));

        let mut builder = CatalogBuilder::new(schema, &policy);
        builder
            .table("monthly", PivotTable { activity: Activity::NoActivity, ..table })
            .unwrap();
        assert!(matches!(builder.build(), Err(PipelineError::IncompleteMetric { .. })));
    }

    #[test]
    fn undeclared_or_mistyped_metric_is_rejected() {
        let policy = policy(Fallback::ZeroFill);
        let mut builder = CatalogBuilder::new(schema(), &policy);
        assert!(builder.scalar(DerivedMetric::zero("unknown", Unit::Count)).is_err());
        assert!(builder.scalar(DerivedMetric::zero("by_month", Unit::Count)).is_err());
    }

    #[test]
    fn serializes_with_kind_tag() {
        let policy = policy(Fallback::ZeroFill);
        let catalog = CatalogBuilder::new(schema(), &policy).build().unwrap();
        let json = serde_json::to_value(&catalog).unwrap();
        assert_eq!(json["entries"]["gross"]["kind"], "scalar");
        assert_eq!(json["entries"]["by_month"]["kind"], "series");
    }
}
