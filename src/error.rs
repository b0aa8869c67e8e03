use crate::domain::store::ConfigTable;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DescriptorError {
    #[error("Invalid identity: {0}")]
    InvalidIdentity(String),
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Unsupported combination: {0}")]
    Unsupported(String),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Settings error: {0}")]
    SettingsError(#[from] toml::de::Error),
    #[error("Invalid settings: {0}")]
    InvalidSettings(String),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("Task error: {0}")]
    TaskError(#[from] tokio::task::JoinError),
}

/// Authoring errors in the configuration tables.
///
/// These are fatal for the request that hit them. The integrity validator exists to
/// surface the same problems before deployment.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("no row in {table} matches id \"{id}\"")]
    NotFound { table: ConfigTable, id: String },
    #[error("display sequence cycle: {}", .path.join(" -> "))]
    Cycle { path: Vec<String> },
    #[error("no display hint found for id \"{hint_id}\" in country \"{country}\"")]
    UnknownHint { hint_id: String, country: String },
    #[error("property hint \"{hint_id}\" links to \"{property}\" which is not in the data schema")]
    DanglingProperty { hint_id: String, property: String },
    #[error("poll chain \"{chain}\" continues past its last stage {stage}")]
    DanglingContinuation { chain: String, stage: u32 },
    #[error("{table} line {line}: {message}")]
    MalformedRow {
        table: ConfigTable,
        line: u64,
        message: String,
    },
}

pub type Result<T> = std::result::Result<T, DescriptorError>;
