use crate::error::{PipelineError, Result};
use crate::types::{Gender, OrderRecord, RawOrderRow, RawTransactionRow, SaleType, TransactionRecord};
use crate::util::{parse_bool_safe, parse_date_safe, parse_decimal, parse_score_safe, DecimalConvention};
use csv::ReaderBuilder;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info, warn};

pub const TRANSACTION_COLUMNS: [&str; 8] = [
    "purchase_date",
    "product_name",
    "price",
    "cost",
    "client_id",
    "sale_type",
    "gender",
    "origin_campaign",
];

/// Largest accepted monetary cell. Keeps every downstream sum far inside
/// `Decimal`'s range.
pub const MAX_AMOUNT: Decimal = dec!(1000000000000000);

pub const ORDER_COLUMNS: [&str; 6] = [
    "order_id",
    "customer_id",
    "order_date",
    "amount",
    "returned",
    "satisfaction",
];

#[derive(Debug, Clone, Serialize)]
pub struct LoadReport {
    pub total_rows: usize,
    pub decimal_convention: DecimalConvention,
    /// Both `.` and `,` appeared in the monetary columns. The comma
    /// convention was still applied to every row.
    pub mixed_separators: bool,
}

pub fn load_transactions(path: impl AsRef<Path>) -> Result<(Vec<TransactionRecord>, LoadReport)> {
    let path = path.as_ref();
    info!(path = %path.display(), "loading transactions");
    read_transactions(File::open(path)?)
}

pub fn load_orders(path: impl AsRef<Path>) -> Result<(Vec<OrderRecord>, LoadReport)> {
    let path = path.as_ref();
    info!(path = %path.display(), "loading orders");
    read_orders(File::open(path)?)
}

pub fn read_transactions<R: Read>(reader: R) -> Result<(Vec<TransactionRecord>, LoadReport)> {
    let rows: Vec<RawTransactionRow> = read_raw(reader, &TRANSACTION_COLUMNS)?;
    let monetary = rows
        .iter()
        .flat_map(|r| [r.price.as_deref(), r.cost.as_deref()])
        .flatten();
    let report = decide_convention(monetary, rows.len());

    let mut records = Vec::with_capacity(rows.len());
    for (idx, row) in rows.into_iter().enumerate() {
        let line = idx + 2;
        let price = money(row.price.as_deref(), "price", line, report.decimal_convention)?;
        let cost = money(row.cost.as_deref(), "cost", line, report.decimal_convention)?;
        let purchase_date = parse_date_safe(row.purchase_date.as_deref())
            .ok_or_else(|| invalid("purchase_date", line, row.purchase_date.as_deref()))?;
        let sale_type = row
            .sale_type
            .as_deref()
            .and_then(SaleType::parse)
            .ok_or_else(|| invalid("sale_type", line, row.sale_type.as_deref()))?;
        let gender = Gender::parse(row.gender.as_deref().unwrap_or(""));

        records.push(TransactionRecord {
            id: text(row.id).unwrap_or_else(|| (idx + 1).to_string()),
            client_id: required_text(row.client_id, "client_id", line)?,
            email: text(row.email),
            product_name: required_text(row.product_name, "product_name", line)?,
            price,
            cost,
            purchase_date,
            sale_type,
            gender,
            origin_campaign: text(row.origin_campaign).unwrap_or_else(|| "Unknown".to_string()),
        });
    }

    info!(
        rows = report.total_rows,
        convention = ?report.decimal_convention,
        "transactions loaded"
    );
    Ok((records, report))
}

pub fn read_orders<R: Read>(reader: R) -> Result<(Vec<OrderRecord>, LoadReport)> {
    let rows: Vec<RawOrderRow> = read_raw(reader, &ORDER_COLUMNS)?;
    let monetary = rows.iter().filter_map(|r| r.amount.as_deref());
    let report = decide_convention(monetary, rows.len());

    let mut records = Vec::with_capacity(rows.len());
    for (idx, row) in rows.into_iter().enumerate() {
        let line = idx + 2;
        let amount = money(row.amount.as_deref(), "amount", line, report.decimal_convention)?;
        let order_date = parse_date_safe(row.order_date.as_deref())
            .ok_or_else(|| invalid("order_date", line, row.order_date.as_deref()))?;
        let returned = parse_bool_safe(row.returned.as_deref())
            .ok_or_else(|| invalid("returned", line, row.returned.as_deref()))?;
        let satisfaction = parse_score_safe(row.satisfaction.as_deref())
            .ok_or_else(|| invalid("satisfaction", line, row.satisfaction.as_deref()))?;

        records.push(OrderRecord {
            order_id: required_text(row.order_id, "order_id", line)?,
            customer_id: required_text(row.customer_id, "customer_id", line)?,
            order_date,
            amount,
            returned,
            satisfaction,
        });
    }

    info!(rows = report.total_rows, convention = ?report.decimal_convention, "orders loaded");
    Ok((records, report))
}

/// Check the header against `required` before touching any row, then pull
/// every row in as raw text.
fn read_raw<R: Read, T: DeserializeOwned>(reader: R, required: &[&str]) -> Result<Vec<T>> {
    let mut rdr = ReaderBuilder::new().trim(csv::Trim::Headers).from_reader(reader);
    let headers = rdr.headers()?.clone();
    let missing: Vec<&str> = required
        .iter()
        .copied()
        .filter(|col| !headers.iter().any(|h| h == *col))
        .collect();
    if !missing.is_empty() {
        return Err(PipelineError::schema(format!(
            "missing required column(s): {}",
            missing.join(", ")
        )));
    }

    let mut rows = Vec::new();
    for (idx, result) in rdr.deserialize::<T>().enumerate() {
        let row = result.map_err(|e| PipelineError::schema(format!("row {}: {}", idx + 2, e)))?;
        rows.push(row);
    }
    debug!(rows = rows.len(), "raw rows read");
    Ok(rows)
}

fn decide_convention<'a, I>(values: I, total_rows: usize) -> LoadReport
where
    I: Iterator<Item = &'a str> + Clone,
{
    let decimal_convention = DecimalConvention::detect(values.clone());
    let mixed_separators = decimal_convention == DecimalConvention::Comma
        && values.into_iter().any(|v| v.contains('.'));
    if mixed_separators {
        warn!("monetary columns mix '.' and ',' separators; reading every value with ',' as the decimal point");
    }
    LoadReport { total_rows, decimal_convention, mixed_separators }
}

fn money(value: Option<&str>, column: &str, line: usize, convention: DecimalConvention) -> Result<Decimal> {
    match value.and_then(|v| parse_decimal(v, convention)) {
        Some(v) if v > MAX_AMOUNT => Err(PipelineError::schema(format!(
            "line {}: value {} in column '{}' exceeds {}",
            line, v, column, MAX_AMOUNT
        ))),
        Some(v) if v >= Decimal::ZERO => Ok(v),
        _ => Err(invalid(column, line, value)),
    }
}

fn text(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn required_text(value: Option<String>, column: &str, line: usize) -> Result<String> {
    text(value).ok_or_else(|| invalid(column, line, None))
}

fn invalid(column: &str, line: usize, value: Option<&str>) -> PipelineError {
    PipelineError::schema(format!(
        "line {}: invalid value {:?} in column '{}'",
        line,
        value.unwrap_or(""),
        column
    ))
}
