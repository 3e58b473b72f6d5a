use crate::derive::StatusBands;
use crate::error::Result;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::info;

/// Everything a pipeline run needs besides the records and the reference
/// timestamp. Every section has defaults so a partial TOML file is fine.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PipelineConfig {
    pub input: InputConfig,
    pub ecommerce: EcommerceConfig,
    pub thresholds: ThresholdConfig,
    pub catalog: FallbackPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    pub transactions: PathBuf,
    pub orders: PathBuf,
}

impl Default for InputConfig {
    fn default() -> Self {
        InputConfig {
            transactions: PathBuf::from("data/transactions.csv"),
            orders: PathBuf::from("data/orders.csv"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EcommerceConfig {
    /// Length of the top products / top clients lists.
    pub top_n: usize,
    /// Months shown in the active users breakdown.
    pub trailing_months: u32,
}

impl Default for EcommerceConfig {
    fn default() -> Self {
        EcommerceConfig { top_n: 5, trailing_months: 6 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    /// Shared by customers-with-returns and orders-with-returns.
    pub return_rate: StatusBands,
    /// Monthly average satisfaction score.
    pub satisfaction: StatusBands,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        ThresholdConfig {
            return_rate: StatusBands {
                warning: dec!(0.10),
                critical: dec!(0.25),
                direction: crate::derive::Direction::HigherIsWorse,
            },
            satisfaction: StatusBands {
                warning: dec!(4.0),
                critical: dec!(3.0),
                direction: crate::derive::Direction::LowerIsWorse,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Fallback {
    /// Substitute a zero-valued entry flagged as no activity.
    ZeroFill,
    /// Missing data is an error.
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackPolicy {
    pub fallback: Fallback,
    pub metrics: HashMap<String, Fallback>,
}

impl Default for FallbackPolicy {
    fn default() -> Self {
        FallbackPolicy { fallback: Fallback::ZeroFill, metrics: HashMap::new() }
    }
}

impl FallbackPolicy {
    pub fn for_metric(&self, name: &str) -> Fallback {
        self.metrics.get(name).copied().unwrap_or(self.fallback)
    }
}

impl PipelineConfig {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&content)?;
        info!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: PipelineConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.thresholds.return_rate.validate()?;
        self.thresholds.satisfaction.validate()?;
        Ok(())
    }
}
