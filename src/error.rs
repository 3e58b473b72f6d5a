use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Schema error: {message}")]
    Schema { message: String },

    #[error("Metric '{name}' has no contributing data and no configured fallback")]
    IncompleteMetric { name: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("CSV processing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl PipelineError {
    pub fn schema(message: impl Into<String>) -> Self {
        PipelineError::Schema { message: message.into() }
    }

    pub fn config(message: impl Into<String>) -> Self {
        PipelineError::Config { message: message.into() }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
