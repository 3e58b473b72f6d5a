//! Second-order metrics computed from aggregates, and threshold status bands.

use crate::aggregate::Fact;
use crate::aggregate::Measure;
use crate::error::{PipelineError, Result};
use crate::types::{OrderRecord, TransactionRecord};
use crate::util::round_half_even;
use crate::window::Activity;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Good,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    HigherIsWorse,
    LowerIsWorse,
}

/// Two thresholds splitting a value range into good / warning / critical.
/// A value sitting exactly on a threshold belongs to the better band.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StatusBands {
    pub warning: Decimal,
    pub critical: Decimal,
    #[serde(default = "default_direction")]
    pub direction: Direction,
}

fn default_direction() -> Direction {
    Direction::HigherIsWorse
}

impl StatusBands {
    pub fn higher_is_worse(warning: Decimal, critical: Decimal) -> Result<Self> {
        let bands = StatusBands { warning, critical, direction: Direction::HigherIsWorse };
        bands.validate()?;
        Ok(bands)
    }

    pub fn lower_is_worse(warning: Decimal, critical: Decimal) -> Result<Self> {
        let bands = StatusBands { warning, critical, direction: Direction::LowerIsWorse };
        bands.validate()?;
        Ok(bands)
    }

    pub fn validate(&self) -> Result<()> {
        let ordered = match self.direction {
            Direction::HigherIsWorse => self.warning < self.critical,
            Direction::LowerIsWorse => self.warning > self.critical,
        };
        if ordered {
            Ok(())
        } else {
            Err(PipelineError::config(format!(
                "status thresholds out of order: warning={} critical={} ({:?})",
                self.warning, self.critical, self.direction
            )))
        }
    }

    pub fn classify(&self, value: Decimal) -> Status {
        match self.direction {
            Direction::HigherIsWorse => {
                if value <= self.warning {
                    Status::Good
                } else if value <= self.critical {
                    Status::Warning
                } else {
                    Status::Critical
                }
            }
            Direction::LowerIsWorse => {
                if value >= self.warning {
                    Status::Good
                } else if value >= self.critical {
                    Status::Warning
                } else {
                    Status::Critical
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Unit {
    Currency,
    /// Fraction in `[0, 1]`.
    Percent,
    Count,
    Score,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DerivedMetric {
    pub name: String,
    pub value: Decimal,
    pub status: Option<Status>,
    pub unit: Unit,
    pub activity: Activity,
}

impl DerivedMetric {
    pub fn new(name: impl Into<String>, value: Decimal, unit: Unit, activity: Activity) -> Self {
        DerivedMetric { name: name.into(), value, status: None, unit, activity }
    }

    pub fn zero(name: impl Into<String>, unit: Unit) -> Self {
        DerivedMetric::new(name, Decimal::ZERO, unit, Activity::NoActivity)
    }

    pub fn with_status(mut self, bands: &StatusBands) -> Self {
        self.status = Some(bands.classify(self.value));
        self
    }
}

fn activity_of(n: usize) -> Activity {
    if n == 0 {
        Activity::NoActivity
    } else {
        Activity::Observed
    }
}

/// Sum that fails instead of overflowing `Decimal`'s range.
pub fn checked_sum(values: impl IntoIterator<Item = Decimal>) -> Result<Decimal> {
    values.into_iter().try_fold(Decimal::ZERO, |acc, v| {
        acc.checked_add(v)
            .ok_or_else(|| PipelineError::schema(format!("sum overflows after {}", acc)))
    })
}

pub fn sum_measure<'a, T, I>(records: I, measure: Measure) -> Result<Decimal>
where
    T: Fact + 'a,
    I: IntoIterator<Item = &'a T>,
{
    checked_sum(records.into_iter().filter_map(|r| r.measure(measure)))
}

pub fn gross_sales<'a, I>(name: &str, records: I) -> Result<DerivedMetric>
where
    I: IntoIterator<Item = &'a TransactionRecord>,
{
    let prices: Vec<Decimal> = records.into_iter().map(|r| r.price).collect();
    let total = checked_sum(prices.iter().copied())?;
    Ok(DerivedMetric::new(name, total, Unit::Currency, activity_of(prices.len())))
}

/// `sum(price) - sum(cost)`.
pub fn net_revenue<'a, I>(name: &str, records: I) -> Result<DerivedMetric>
where
    I: IntoIterator<Item = &'a TransactionRecord>,
{
    let records: Vec<&TransactionRecord> = records.into_iter().collect();
    let price = checked_sum(records.iter().map(|r| r.price))?;
    let cost = checked_sum(records.iter().map(|r| r.cost))?;
    let net = price
        .checked_sub(cost)
        .ok_or_else(|| PipelineError::schema("net revenue overflows"))?;
    Ok(DerivedMetric::new(name, net, Unit::Currency, activity_of(records.len())))
}

/// `with_returns / total`, zero when there is nothing to divide by.
pub fn return_rate(with_returns: usize, total: usize) -> Decimal {
    if total == 0 {
        return Decimal::ZERO;
    }
    let rate = Decimal::from(with_returns.min(total)) / Decimal::from(total);
    rate.clamp(Decimal::ZERO, Decimal::ONE)
}

/// `part / whole` as a fraction in [0, 1], four places. Zero when `whole` is zero.
pub fn share(part: Decimal, whole: Decimal) -> Decimal {
    if whole <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    (part / whole).clamp(Decimal::ZERO, Decimal::ONE).round_dp(4)
}

/// Returned order amounts in whole currency units, ties to even.
pub fn revenue_lost(orders: &[OrderRecord]) -> Result<Decimal> {
    let lost = checked_sum(orders.iter().filter(|o| o.returned).map(|o| o.amount))?;
    Ok(round_half_even(lost.max(Decimal::ZERO)))
}

pub fn customers_with_returns_rate(orders: &[OrderRecord]) -> Decimal {
    let customers: HashSet<&str> = orders.iter().map(|o| o.customer_id.as_str()).collect();
    let returning: HashSet<&str> = orders
        .iter()
        .filter(|o| o.returned)
        .map(|o| o.customer_id.as_str())
        .collect();
    return_rate(returning.len(), customers.len())
}

pub fn orders_with_returns_rate(orders: &[OrderRecord]) -> Decimal {
    return_rate(orders.iter().filter(|o| o.returned).count(), orders.len())
}

pub fn average(total: Decimal, count: usize) -> Decimal {
    if count == 0 {
        Decimal::ZERO
    } else {
        total / Decimal::from(count)
    }
}
