//! Group-by and reduce over typed records.
//!
//! Grouping keys are the projected text labels of the selected dimensions,
//! so `2024-01-03` and `2024-01-28` fall into the same `Month` group.

use crate::error::{PipelineError, Result};
use crate::types::{OrderRecord, TransactionRecord};
use crate::util::{calendar_month_label, month_label, month_range, weekday_label};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Dimension {
    Product,
    Client,
    Campaign,
    /// `YYYY-MM`
    Month,
    /// `Jan`..`Dec`, year ignored.
    CalendarMonth,
    Weekday,
    Gender,
    SaleType,
    Satisfaction,
    Returned,
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Measure {
    Price,
    Cost,
    NetRevenue,
    Amount,
    /// Order amount when the order was returned, zero otherwise.
    ReturnedAmount,
    Score,
}

/// A record the aggregator and the window selector can work on. A record
/// type answers `None` for dimensions or measures it does not carry.
pub trait Fact {
    fn date(&self) -> NaiveDate;
    fn dimension(&self, dim: Dimension) -> Option<String>;
    fn measure(&self, measure: Measure) -> Option<Decimal>;
}

fn date_dimension(date: NaiveDate, dim: Dimension) -> Option<String> {
    match dim {
        Dimension::Month => Some(month_label(date)),
        Dimension::CalendarMonth => Some(calendar_month_label(date).to_string()),
        Dimension::Weekday => Some(weekday_label(date).to_string()),
        _ => None,
    }
}

impl Fact for TransactionRecord {
    fn date(&self) -> NaiveDate {
        self.purchase_date
    }

    fn dimension(&self, dim: Dimension) -> Option<String> {
        match dim {
            Dimension::Product => Some(self.product_name.clone()),
            Dimension::Client => Some(self.client_id.clone()),
            Dimension::Campaign => Some(self.origin_campaign.clone()),
            Dimension::Gender => Some(self.gender.to_string()),
            Dimension::SaleType => Some(self.sale_type.to_string()),
            Dimension::Satisfaction | Dimension::Returned => None,
            other => date_dimension(self.purchase_date, other),
        }
    }

    fn measure(&self, measure: Measure) -> Option<Decimal> {
        match measure {
            Measure::Price => Some(self.price),
            Measure::Cost => Some(self.cost),
            Measure::NetRevenue => Some(self.net_revenue()),
            _ => None,
        }
    }
}

impl Fact for OrderRecord {
    fn date(&self) -> NaiveDate {
        self.order_date
    }

    fn dimension(&self, dim: Dimension) -> Option<String> {
        match dim {
            Dimension::Client => Some(self.customer_id.clone()),
            Dimension::Satisfaction => Some(self.satisfaction_label().to_string()),
            Dimension::Returned => Some(if self.returned { "Returned" } else { "Kept" }.to_string()),
            Dimension::Product | Dimension::Campaign | Dimension::Gender | Dimension::SaleType => None,
            other => date_dimension(self.order_date, other),
        }
    }

    fn measure(&self, measure: Measure) -> Option<Decimal> {
        match measure {
            Measure::Amount => Some(self.amount),
            Measure::ReturnedAmount => Some(if self.returned { self.amount } else { Decimal::ZERO }),
            Measure::Score => Some(Decimal::from(self.satisfaction)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reducer {
    Sum(Measure),
    Count,
}

/// Rows are sorted by reduced value; ties keep first-seen order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonthFill {
    /// Only months that have records.
    Sparse,
    /// Every calendar month from `from` to `to` inclusive, zero when empty.
    Dense { from: NaiveDate, to: NaiveDate },
}

#[derive(Debug, Clone)]
pub struct AggregateSpec {
    pub group_by: Vec<Dimension>,
    pub reducer: Reducer,
    pub sort: Option<SortOrder>,
    pub fill: MonthFill,
}

impl AggregateSpec {
    pub fn new(group_by: impl Into<Vec<Dimension>>, reducer: Reducer) -> Self {
        AggregateSpec { group_by: group_by.into(), reducer, sort: None, fill: MonthFill::Sparse }
    }

    pub fn sorted(mut self, sort: SortOrder) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn dense_months(mut self, from: NaiveDate, to: NaiveDate) -> Self {
        self.fill = MonthFill::Dense { from, to };
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct GroupKey(pub Vec<String>);

impl GroupKey {
    pub fn part(&self, idx: usize) -> &str {
        self.0.get(idx).map(String::as_str).unwrap_or("")
    }

    pub fn label(&self) -> String {
        self.0.join(" / ")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateRow {
    pub key: GroupKey,
    pub value: Decimal,
    /// Records that fell into the group; zero only for dense-filled months.
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Aggregate {
    pub group_by: Vec<Dimension>,
    pub rows: Vec<AggregateRow>,
}

impl Aggregate {
    pub fn total(&self) -> Decimal {
        self.rows.iter().map(|r| r.value).sum()
    }

    pub fn get(&self, key: &[&str]) -> Option<&AggregateRow> {
        self.rows
            .iter()
            .find(|r| r.key.0.len() == key.len() && r.key.0.iter().zip(key).all(|(a, b)| a == b))
    }

    /// Keep the first `n` rows; callers sort first.
    pub fn top_n(mut self, n: usize) -> Self {
        self.rows.truncate(n);
        self
    }
}

pub fn aggregate<'a, T, I>(records: I, spec: &AggregateSpec) -> Result<Aggregate>
where
    T: Fact + 'a,
    I: IntoIterator<Item = &'a T>,
{
    if spec.group_by.is_empty() {
        return Err(PipelineError::config("aggregate needs at least one group-by dimension"));
    }
    if let MonthFill::Dense { from, to } = spec.fill {
        if spec.group_by != [Dimension::Month] {
            return Err(PipelineError::config(
                "dense month fill requires grouping by Month alone",
            ));
        }
        if from > to {
            return Err(PipelineError::config("dense month fill range is reversed"));
        }
    }

    let mut index: HashMap<GroupKey, usize> = HashMap::new();
    let mut rows: Vec<AggregateRow> = Vec::new();
    for record in records {
        let mut parts = Vec::with_capacity(spec.group_by.len());
        for dim in &spec.group_by {
            let label = record
                .dimension(*dim)
                .ok_or_else(|| PipelineError::config(format!("dimension {} is not available", dim)))?;
            parts.push(label);
        }
        let contribution = match spec.reducer {
            Reducer::Count => Decimal::ONE,
            Reducer::Sum(measure) => record
                .measure(measure)
                .ok_or_else(|| PipelineError::config(format!("measure {:?} is not available", measure)))?,
        };
        let key = GroupKey(parts);
        let slot = match index.get(&key) {
            Some(slot) => *slot,
            None => {
                index.insert(key.clone(), rows.len());
                rows.push(AggregateRow { key, value: Decimal::ZERO, count: 0 });
                rows.len() - 1
            }
        };
        let row = &mut rows[slot];
        match row.value.checked_add(contribution) {
            Some(value) => row.value = value,
            None => {
                return Err(PipelineError::schema(format!(
                    "sum for group '{}' overflows",
                    row.key.label()
                )))
            }
        }
        row.count += 1;
    }

    if let MonthFill::Dense { from, to } = spec.fill {
        rows = fill_months(rows, from, to);
    }

    if let Some(sort) = spec.sort {
        // `sort_by` is stable, so ties keep first-seen order.
        rows.sort_by(|a, b| match sort {
            SortOrder::Ascending => a.value.cmp(&b.value),
            SortOrder::Descending => b.value.cmp(&a.value),
        });
    }

    debug!(groups = rows.len(), group_by = ?spec.group_by, "aggregated");
    Ok(Aggregate { group_by: spec.group_by.clone(), rows })
}

/// Months outside `[from, to]` are dropped; months inside with no records
/// get a zero row.
fn fill_months(rows: Vec<AggregateRow>, from: NaiveDate, to: NaiveDate) -> Vec<AggregateRow> {
    let mut by_label: HashMap<String, AggregateRow> =
        rows.into_iter().map(|r| (r.key.part(0).to_string(), r)).collect();
    month_range(from, to)
        .into_iter()
        .map(|label| {
            by_label.remove(&label).unwrap_or(AggregateRow {
                key: GroupKey(vec![label]),
                value: Decimal::ZERO,
                count: 0,
            })
        })
        .collect()
}
