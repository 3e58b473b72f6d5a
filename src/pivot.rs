//! Long-form aggregates to dense wide tables.

use crate::aggregate::Aggregate;
use crate::error::{PipelineError, Result};
use crate::window::Activity;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;

/// Optional explicit ordering for either axis. Labels listed here come first
/// (with zero cells if absent from the data); unlisted labels follow in
/// first-appearance order.
#[derive(Debug, Clone, Default)]
pub struct PivotOrder {
    pub rows: Option<Vec<String>>,
    pub columns: Option<Vec<String>>,
}

impl PivotOrder {
    pub fn rows<S: ToString>(mut self, labels: &[S]) -> Self {
        self.rows = Some(labels.iter().map(ToString::to_string).collect());
        self
    }

    pub fn columns<S: ToString>(mut self, labels: &[S]) -> Self {
        self.columns = Some(labels.iter().map(ToString::to_string).collect());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PivotTable {
    pub row_dimension: String,
    pub rows: Vec<String>,
    pub columns: Vec<String>,
    /// `cells[row][column]`
    pub cells: Vec<Vec<Decimal>>,
    /// Observed when at least one record reached a cell, even if every
    /// cell sums to zero.
    pub activity: Activity,
}

impl PivotTable {
    pub fn empty(row_dimension: impl Into<String>, columns: Vec<String>) -> Self {
        PivotTable {
            row_dimension: row_dimension.into(),
            rows: Vec::new(),
            columns,
            cells: Vec::new(),
            activity: Activity::NoActivity,
        }
    }

    pub fn row_total(&self, row: usize) -> Decimal {
        self.cells.get(row).map(|r| r.iter().copied().sum()).unwrap_or(Decimal::ZERO)
    }

    pub fn cell(&self, row: &str, column: &str) -> Option<Decimal> {
        let r = self.rows.iter().position(|l| l == row)?;
        let c = self.columns.iter().position(|l| l == column)?;
        Some(self.cells[r][c])
    }

    /// Prepend a column holding each row's total.
    pub fn with_total_column(mut self, label: &str) -> Self {
        for row in &mut self.cells {
            let total: Decimal = row.iter().copied().sum();
            row.insert(0, total);
        }
        self.columns.insert(0, label.to_string());
        self
    }
}

/// Observed when any row of any source aggregate had contributing records.
pub fn activity_of(aggs: &[&Aggregate]) -> Activity {
    if aggs.iter().any(|a| a.rows.iter().any(|r| r.count > 0)) {
        Activity::Observed
    } else {
        Activity::NoActivity
    }
}

fn axis(order: Option<&Vec<String>>, seen: Vec<String>) -> Vec<String> {
    let mut labels: Vec<String> = order.cloned().unwrap_or_default();
    for label in seen {
        if !labels.contains(&label) {
            labels.push(label);
        }
    }
    labels
}

/// Spread a two-dimensional aggregate: `row_dim`'s values become rows,
/// `col_dim`'s values become columns, missing combinations are zero and
/// repeated combinations are summed.
pub fn pivot(agg: &Aggregate, row_dim: usize, col_dim: usize, order: &PivotOrder) -> Result<PivotTable> {
    let width = agg.group_by.len();
    if row_dim >= width || col_dim >= width || row_dim == col_dim {
        return Err(PipelineError::config(format!(
            "cannot pivot key parts {} x {} of a {}-part key",
            row_dim, col_dim, width
        )));
    }

    let mut seen_rows = Vec::new();
    let mut seen_cols = Vec::new();
    for row in &agg.rows {
        let r = row.key.part(row_dim).to_string();
        let c = row.key.part(col_dim).to_string();
        if !seen_rows.contains(&r) {
            seen_rows.push(r);
        }
        if !seen_cols.contains(&c) {
            seen_cols.push(c);
        }
    }
    let rows = axis(order.rows.as_ref(), seen_rows);
    let columns = axis(order.columns.as_ref(), seen_cols);

    let row_idx: HashMap<&str, usize> = rows.iter().enumerate().map(|(i, l)| (l.as_str(), i)).collect();
    let col_idx: HashMap<&str, usize> = columns.iter().enumerate().map(|(i, l)| (l.as_str(), i)).collect();
    let mut cells = vec![vec![Decimal::ZERO; columns.len()]; rows.len()];
    for row in &agg.rows {
        if let (Some(r), Some(c)) = (row_idx.get(row.key.part(row_dim)), col_idx.get(row.key.part(col_dim))) {
            cells[*r][*c] += row.value;
        }
    }

    Ok(PivotTable {
        row_dimension: agg.group_by[row_dim].to_string(),
        rows,
        columns,
        cells,
        activity: activity_of(&[agg]),
    })
}

/// Side-by-side join of single-dimension aggregates sharing a key space,
/// one column per aggregate. This is the "outer merge" of several series.
pub fn merge_columns(row_dimension: &str, parts: &[(&str, &Aggregate)], row_order: Option<&[String]>) -> PivotTable {
    let mut seen = Vec::new();
    for (_, agg) in parts {
        for row in &agg.rows {
            let label = row.key.part(0).to_string();
            if !seen.contains(&label) {
                seen.push(label);
            }
        }
    }
    let explicit = row_order.map(|o| o.to_vec());
    let rows = axis(explicit.as_ref(), seen);
    let columns: Vec<String> = parts.iter().map(|(name, _)| name.to_string()).collect();
    let cells = rows
        .iter()
        .map(|label| {
            parts
                .iter()
                .map(|(_, agg)| agg.get(&[label.as_str()]).map(|r| r.value).unwrap_or(Decimal::ZERO))
                .collect()
        })
        .collect();
    let sources: Vec<&Aggregate> = parts.iter().map(|(_, agg)| *agg).collect();
    PivotTable {
        row_dimension: row_dimension.to_string(),
        rows,
        columns,
        cells,
        activity: activity_of(&sources),
    }
}
