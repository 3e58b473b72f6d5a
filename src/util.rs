// Utility helpers for parsing, calendar arithmetic and number formatting.
//
// This module centralizes the "dirty" CSV/number/date handling so the
// pipeline stages can assume clean, typed values.
use chrono::{Datelike, Months, NaiveDate};
use num_format::{Locale, ToFormattedString};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use std::str::FromStr;

pub const CALENDAR_MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

pub const WEEKDAYS: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

/// Which character separates the integer and fractional part of the
/// monetary columns. Chosen once per dataset, never per row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DecimalConvention {
    Dot,
    Comma,
}

impl DecimalConvention {
    /// Any comma in any of the values switches the whole dataset to the
    /// comma convention.
    pub fn detect<'a, I>(values: I) -> DecimalConvention
    where
        I: IntoIterator<Item = &'a str>,
    {
        if values.into_iter().any(|v| v.contains(',')) {
            DecimalConvention::Comma
        } else {
            DecimalConvention::Dot
        }
    }
}

/// Strip currency symbols and whitespace, then parse according to the
/// dataset-wide convention. Returns `None` for anything that is not a number.
pub fn parse_decimal(s: &str, convention: DecimalConvention) -> Option<Decimal> {
    let cleaned: String = s
        .trim()
        .chars()
        .filter(|c| !matches!(c, '€' | '$' | '£') && !c.is_whitespace())
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    let normalized = match convention {
        DecimalConvention::Dot => cleaned,
        DecimalConvention::Comma => cleaned.replace(',', "."),
    };
    Decimal::from_str(&normalized).ok()
}

pub fn parse_date_safe(s: Option<&str>) -> Option<NaiveDate> {
    // CSV dates are expected in `YYYY-MM-DD` format.
    let s = s?.trim();
    if s.is_empty() {
        return None;
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

pub fn parse_bool_safe(s: Option<&str>) -> Option<bool> {
    match s?.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "y" | "1" => Some(true),
        "false" | "no" | "n" | "0" => Some(false),
        _ => None,
    }
}

pub fn parse_score_safe(s: Option<&str>) -> Option<u8> {
    let s = s?.trim();
    match s.parse::<u8>() {
        Ok(v) if (1..=5).contains(&v) => Some(v),
        _ => None,
    }
}

/// Whole currency units, ties to the even neighbour (2.5 -> 2, 3.5 -> 4).
pub fn round_half_even(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(0, RoundingStrategy::MidpointNearestEven)
}

pub fn first_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

/// First day of the month `n` months before `date`'s month. Saturates at the
/// calendar's lower bound instead of panicking.
pub fn months_before(date: NaiveDate, n: u32) -> NaiveDate {
    first_of_month(date)
        .checked_sub_months(Months::new(n))
        .unwrap_or(NaiveDate::MIN)
}

pub fn month_label(date: NaiveDate) -> String {
    date.format("%Y-%m").to_string()
}

pub fn calendar_month_label(date: NaiveDate) -> &'static str {
    CALENDAR_MONTHS[date.month0() as usize]
}

pub fn weekday_label(date: NaiveDate) -> &'static str {
    WEEKDAYS[date.weekday().num_days_from_monday() as usize]
}

/// Contiguous `YYYY-MM` labels from `from`'s month up to and including `to`'s.
pub fn month_range(from: NaiveDate, to: NaiveDate) -> Vec<String> {
    let mut labels = Vec::new();
    let mut cursor = first_of_month(from);
    let last = first_of_month(to);
    while cursor <= last {
        labels.push(month_label(cursor));
        match cursor.checked_add_months(Months::new(1)) {
            Some(next) => cursor = next,
            None => break,
        }
    }
    labels
}

pub fn format_number(n: Decimal, decimals: u32) -> String {
    // Format a decimal value with:
    // - a fixed number of decimal places, and
    // - locale-aware thousands separators (e.g., `1,234,567.89`).
    let neg = n.is_sign_negative() && !n.is_zero();
    let rounded = n
        .abs()
        .round_dp_with_strategy(decimals, RoundingStrategy::MidpointNearestEven);
    let s = format!("{:.*}", decimals as usize, rounded);
    let mut parts = s.split('.');
    let int_part = parts.next().unwrap_or("0");
    let frac_part = parts.next();
    // Use `num-format` to insert commas into the integer portion. The
    // digits of any `Decimal` fit in a u128.
    let mut res = match int_part.parse::<u128>() {
        Ok(v) => v.to_formatted_string(&Locale::en),
        Err(_) => int_part.to_string(),
    };
    if let Some(frac) = frac_part {
        if decimals > 0 {
            res.push('.');
            res.push_str(frac);
        }
    }
    if neg {
        format!("-{}", res)
    } else {
        res
    }
}

pub fn format_int<T>(n: T) -> String
where
    T: ToFormattedString,
{
    n.to_formatted_string(&Locale::en)
}
