use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use tabled::Tabled;

/// One row of the transactions CSV as it comes off the reader. Everything is
/// kept as text so the loader can decide on a decimal convention for the
/// whole file before any number is parsed.
#[derive(Debug, Deserialize)]
pub struct RawTransactionRow {
    pub id: Option<String>,
    pub client_id: Option<String>,
    pub email: Option<String>,
    pub product_name: Option<String>,
    pub price: Option<String>,
    pub cost: Option<String>,
    pub purchase_date: Option<String>,
    pub sale_type: Option<String>,
    pub gender: Option<String>,
    pub origin_campaign: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RawOrderRow {
    pub order_id: Option<String>,
    pub customer_id: Option<String>,
    pub order_date: Option<String>,
    pub amount: Option<String>,
    pub returned: Option<String>,
    pub satisfaction: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SaleType {
    Online,
    InStore,
}

impl SaleType {
    pub fn parse(s: &str) -> Option<SaleType> {
        match s.trim().to_ascii_lowercase().as_str() {
            "online" => Some(SaleType::Online),
            "in-store" | "in store" | "instore" => Some(SaleType::InStore),
            _ => None,
        }
    }
}

impl fmt::Display for SaleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SaleType::Online => write!(f, "Online"),
            SaleType::InStore => write!(f, "In-Store"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Gender {
    Male,
    Female,
    Unknown,
}

impl Gender {
    /// Anything that is not recognisably male or female (`na`, `NA`, blank)
    /// folds into `Unknown` rather than failing the load.
    pub fn parse(s: &str) -> Gender {
        match s.trim().to_ascii_lowercase().as_str() {
            "male" | "m" => Gender::Male,
            "female" | "f" => Gender::Female,
            _ => Gender::Unknown,
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Gender::Male => write!(f, "Male"),
            Gender::Female => write!(f, "Female"),
            Gender::Unknown => write!(f, "Unknown"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransactionRecord {
    pub id: String,
    pub client_id: String,
    pub email: Option<String>,
    pub product_name: String,
    pub price: Decimal,
    pub cost: Decimal,
    pub purchase_date: NaiveDate,
    pub sale_type: SaleType,
    pub gender: Gender,
    pub origin_campaign: String,
}

impl TransactionRecord {
    pub fn net_revenue(&self) -> Decimal {
        self.price - self.cost
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderRecord {
    pub order_id: String,
    pub customer_id: String,
    pub order_date: NaiveDate,
    pub amount: Decimal,
    pub returned: bool,
    pub satisfaction: u8,
}

impl OrderRecord {
    pub fn satisfaction_label(&self) -> &'static str {
        match self.satisfaction {
            5 => "Very satisfied",
            4 => "Satisfied",
            3 => "Neutral",
            2 => "Unsatisfied",
            _ => "Very unsatisfied",
        }
    }
}

pub const SATISFACTION_LABELS: [&str; 5] = [
    "Very satisfied",
    "Satisfied",
    "Neutral",
    "Unsatisfied",
    "Very unsatisfied",
];

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct SeriesPreviewRow {
    #[tabled(rename = "Bucket")]
    pub bucket: String,
    #[tabled(rename = "Value")]
    pub value: String,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct ScalarPreviewRow {
    #[tabled(rename = "Metric")]
    pub metric: String,
    #[tabled(rename = "Value")]
    pub value: String,
    #[tabled(rename = "Unit")]
    pub unit: String,
    #[tabled(rename = "Status")]
    pub status: String,
    #[tabled(rename = "Activity")]
    pub activity: String,
}
