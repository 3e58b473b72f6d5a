use crate::catalog::{MetricCatalog, MetricValue};
use crate::derive::{DerivedMetric, Unit};
use crate::error::Result;
use crate::pivot::PivotTable;
use crate::types::{ScalarPreviewRow, SeriesPreviewRow};
use crate::util::format_number;
use rust_decimal::Decimal;
use serde::Serialize;
use std::path::Path;
use tabled::{builder::Builder, settings::Style, Table};

pub fn write_json<T: Serialize>(path: impl AsRef<Path>, value: &T) -> Result<()> {
    let s = serde_json::to_string_pretty(value)?;
    std::fs::write(path, s)?;
    Ok(())
}

/// A pivot table as CSV: header row, then one line per row label.
pub fn write_table_csv(path: impl AsRef<Path>, table: &PivotTable) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;
    let mut header = vec![table.row_dimension.clone()];
    header.extend(table.columns.iter().cloned());
    wtr.write_record(&header)?;
    for (label, cells) in table.rows.iter().zip(&table.cells) {
        let mut record = vec![label.clone()];
        record.extend(cells.iter().map(Decimal::to_string));
        wtr.write_record(&record)?;
    }
    wtr.flush()?;
    Ok(())
}

fn render_value(value: Decimal, unit: Unit) -> String {
    match unit {
        Unit::Currency => format!("€ {}", format_number(value, 2)),
        Unit::Percent => format!("{}%", format_number(value * Decimal::ONE_HUNDRED, 2)),
        Unit::Count => format_number(value, 0),
        Unit::Score => format_number(value, 2),
    }
}

fn scalar_row(metric: &DerivedMetric) -> ScalarPreviewRow {
    ScalarPreviewRow {
        metric: metric.name.clone(),
        value: render_value(metric.value, metric.unit),
        unit: format!("{:?}", metric.unit),
        status: metric.status.map(|s| format!("{:?}", s)).unwrap_or_default(),
        activity: format!("{:?}", metric.activity),
    }
}

fn table_string(table: &PivotTable, max_rows: usize) -> String {
    let mut builder = Builder::default();
    let mut header = vec![table.row_dimension.clone()];
    header.extend(table.columns.iter().cloned());
    builder.push_record(header);
    for (label, cells) in table.rows.iter().zip(&table.cells).take(max_rows) {
        let mut record = vec![label.clone()];
        record.extend(cells.iter().map(|c| format_number(*c, 2)));
        builder.push_record(record);
    }
    builder.build().with(Style::markdown()).to_string()
}

/// Print a markdown preview of every metric in the catalog: scalars in one
/// table, then each series and table truncated to `max_rows`.
pub fn preview_catalog(catalog: &MetricCatalog, max_rows: usize) {
    println!("Dashboard: {}\n", catalog.dashboard());
    let scalars: Vec<ScalarPreviewRow> = catalog
        .iter()
        .filter_map(|(_, v)| match v {
            MetricValue::Scalar(m) => Some(scalar_row(m)),
            _ => None,
        })
        .collect();
    if !scalars.is_empty() {
        println!("{}\n", Table::new(scalars).with(Style::markdown()));
    }

    for (name, value) in catalog.iter() {
        match value {
            MetricValue::Scalar(_) => {}
            MetricValue::Series(series) => {
                println!("{} ({:?}, {:?})", name, series.unit, series.activity);
                let rows: Vec<SeriesPreviewRow> = series
                    .points
                    .iter()
                    .take(max_rows)
                    .map(|p| SeriesPreviewRow {
                        bucket: p.bucket.clone(),
                        value: render_value(p.value, series.unit),
                    })
                    .collect();
                preview_table_rows(&rows);
            }
            MetricValue::Table(table) => {
                println!("{}", name);
                if table.rows.is_empty() {
                    println!("(no rows)\n");
                } else {
                    println!("{}\n", table_string(table, max_rows));
                }
            }
        }
    }
}

pub fn preview_table_rows<T>(rows: &[T])
where
    T: tabled::Tabled + Clone,
{
    if rows.is_empty() {
        println!("(no rows)\n");
        return;
    }
    let table_str = Table::new(rows.to_vec()).with(Style::markdown()).to_string();
    println!("{}\n", table_str);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::window::Activity;
    use rust_decimal_macros::dec;

    fn table() -> PivotTable {
        PivotTable {
            row_dimension: "Month".to_string(),
            rows: vec!["2024-01".to_string(), "2024-02".to_string()],
            columns: vec!["Orders".to_string(), "Revenue Lost".to_string()],
            cells: vec![vec![dec!(3), dec!(12.5)], vec![dec!(0), dec!(0)]],
            activity: Activity::Observed,
        }
    }

    #[test]
    fn table_csv_has_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("monthly.csv");
        write_table_csv(&path, &table()).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "Month,Orders,Revenue Lost");
        assert_eq!(lines[1], "2024-01,3,12.5");
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn rendered_units() {
        assert_eq!(render_value(dec!(1234.5), Unit::Currency), "€ 1,234.50");
        assert_eq!(render_value(dec!(0.125), Unit::Percent), "12.50%");
        assert_eq!(render_value(dec!(42), Unit::Count), "42");
    }

    #[test]
    fn table_preview_is_markdown() {
        let s = table_string(&table(), 1);
        assert!(s.contains("| Month"));
        assert!(s.contains("2024-01"));
        assert!(!s.contains("2024-02"));
    }
}
